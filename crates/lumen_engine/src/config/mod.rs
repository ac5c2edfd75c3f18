//! Configuration system
//!
//! Any serializable configuration type can be loaded from and saved to TOML
//! or RON files through the [`Config`] trait. [`EngineConfig`] gathers the
//! settings of every engine subsystem.

pub use serde::{Serialize, Deserialize};

/// Configuration trait
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Load configuration from file
    fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(ConfigError::Io)?;

        // Try different formats
        if path.ends_with(".toml") {
            toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else if path.ends_with(".ron") {
            ron::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else {
            Err(ConfigError::UnsupportedFormat(path.to_string()))
        }
    }

    /// Save configuration to file
    fn save_to_file(&self, path: &str) -> Result<(), ConfigError> {
        let contents = if path.ends_with(".toml") {
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else if path.ends_with(".ron") {
            ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
                .map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else {
            return Err(ConfigError::UnsupportedFormat(path.to_string()));
        };

        std::fs::write(path, contents).map_err(ConfigError::Io)
    }
}

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Unsupported format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// A value is out of its valid range
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Maximum number of light-space matrices the shadow uniform block holds
pub const MAX_SHADOW_MATRICES: usize = 16;

/// Top-level engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Default log filter used when `RUST_LOG` is unset
    pub log_level: String,

    /// Window settings handed to the platform layer
    pub window: WindowConfig,

    /// Frame timing
    pub time: TimeConfig,

    /// Render pipeline settings
    pub graphics: GraphicsConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            window: WindowConfig::default(),
            time: TimeConfig::default(),
            graphics: GraphicsConfig::default(),
        }
    }
}

impl Config for EngineConfig {}

impl EngineConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.time.fixed_timestep <= 0.0 {
            return Err(ConfigError::Invalid("fixed_timestep must be positive".to_string()));
        }
        if self.time.max_fixed_steps == 0 {
            return Err(ConfigError::Invalid("max_fixed_steps must be at least 1".to_string()));
        }

        let shadows = &self.graphics.shadows;
        if shadows.cascade_fractions.is_empty() {
            return Err(ConfigError::Invalid("at least one shadow cascade split is required".to_string()));
        }
        // One matrix per band, bands = splits + 1
        if shadows.cascade_fractions.len() + 1 > MAX_SHADOW_MATRICES {
            return Err(ConfigError::Invalid(format!(
                "{} cascade splits exceed the shadow block capacity of {} matrices",
                shadows.cascade_fractions.len(),
                MAX_SHADOW_MATRICES
            )));
        }
        if shadows.resolution == 0 {
            return Err(ConfigError::Invalid("shadow resolution must be positive".to_string()));
        }
        if shadows.far_plane <= 0.0 {
            return Err(ConfigError::Invalid("shadow far plane must be positive".to_string()));
        }

        Ok(())
    }
}

/// Window configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Window title
    pub title: String,

    /// Window width
    pub width: u32,

    /// Window height
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Lumen Engine Application".to_string(),
            width: 1280,
            height: 720,
        }
    }
}

/// Frame timing configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeConfig {
    /// Fixed update step in seconds
    pub fixed_timestep: f32,

    /// Maximum fixed steps drained in a single frame
    pub max_fixed_steps: u32,
}

impl Default for TimeConfig {
    fn default() -> Self {
        Self {
            fixed_timestep: 1.0 / 50.0,
            max_fixed_steps: 8,
        }
    }
}

/// Render pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphicsConfig {
    /// Clear color for cameras created by the engine
    pub clear_color: [f32; 4],

    /// Shadow mapping settings
    pub shadows: ShadowConfig,

    /// Distance fog settings
    pub fog: FogConfig,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            clear_color: [0.1, 0.1, 0.1, 1.0],
            shadows: ShadowConfig::default(),
            fog: FogConfig::default(),
        }
    }
}

/// Cascaded shadow map configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowConfig {
    /// Whether the shadow pass runs
    pub enabled: bool,

    /// Width and height of each cascade layer in texels
    pub resolution: u32,

    /// Depth bias applied by the lighting shader
    pub bias: f32,

    /// Reference far plane the split fractions are taken from
    pub far_plane: f32,

    /// Split distances as divisors of `far_plane` (50 means far / 50)
    pub cascade_fractions: Vec<f32>,
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            resolution: 2048,
            bias: 0.005,
            far_plane: 1000.0,
            cascade_fractions: vec![50.0, 25.0, 10.0, 2.0],
        }
    }
}

impl ShadowConfig {
    /// Split distances in world units, nearest first
    pub fn cascade_levels(&self) -> Vec<f32> {
        self.cascade_fractions
            .iter()
            .map(|divisor| self.far_plane / divisor)
            .collect()
    }
}

/// Distance fog configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FogConfig {
    /// Whether fog is applied
    pub enabled: bool,

    /// Fog color (RGBA)
    pub color: [f32; 4],

    /// Exponential density
    pub density: f32,

    /// Falloff gradient
    pub gradient: f32,
}

impl Default for FogConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            color: [0.5, 0.5, 0.5, 1.0],
            density: 0.007,
            gradient: 1.5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_default_cascade_levels() {
        let levels = ShadowConfig::default().cascade_levels();
        assert_eq!(levels, vec![20.0, 40.0, 100.0, 500.0]);
    }

    #[test]
    fn test_rejects_too_many_cascades() {
        let mut config = EngineConfig::default();
        config.graphics.shadows.cascade_fractions = vec![2.0; MAX_SHADOW_MATRICES];
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_toml_round_trip_keeps_overrides() {
        let mut config = EngineConfig::default();
        config.time.fixed_timestep = 0.01;
        config.graphics.fog.enabled = true;

        let text = toml::to_string_pretty(&config).expect("serialize");
        let parsed: EngineConfig = toml::from_str(&text).expect("parse");
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_partial_ron_uses_defaults() {
        let parsed: EngineConfig = ron::from_str("(log_level: \"debug\")").expect("parse");
        assert_eq!(parsed.log_level, "debug");
        assert_eq!(parsed.time, TimeConfig::default());
    }

    #[test]
    fn test_unsupported_extension() {
        let result = EngineConfig::load_from_file("engine.yaml");
        assert!(result.is_err());
    }
}
