//! Light sources
//!
//! A [`Light`] is a component: it carries color and attenuation only. Its
//! position and direction come from the owning transform (the light shines
//! along the transform's forward axis, -Z). Up to [`MAX_LIGHTS`] lights are
//! packed into the lights uniform block each frame.

use serde::{Deserialize, Serialize};

use crate::foundation::math::{utils, Vec3};
use crate::render::uniforms::{LightRecord, LightsBlock, MAX_LIGHTS};

/// Light types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LightType {
    /// Parallel rays (sunlight); casts the cascaded shadows when it is the main light
    #[default]
    Directional,
    /// Omnidirectional, attenuated with distance
    Point,
}

impl LightType {
    /// Shader-side discriminant
    pub fn shader_index(self) -> i32 {
        match self {
            LightType::Directional => 0,
            LightType::Point => 1,
        }
    }
}

/// Light component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Light {
    /// Light type
    pub light_type: LightType,
    /// Base color
    pub color: Vec3,
    /// Ambient contribution
    pub ambient: Vec3,
    /// Diffuse contribution
    pub diffuse: Vec3,
    /// Specular contribution
    pub specular: Vec3,
    /// Constant attenuation
    pub constant: f32,
    /// Linear attenuation
    pub linear: f32,
    /// Quadratic attenuation
    pub quadratic: f32,
    /// Intensity multiplier
    pub strength: f32,
}

impl Default for Light {
    fn default() -> Self {
        Self::directional(Vec3::new(1.0, 1.0, 1.0), 1.0)
    }
}

impl Light {
    /// Create a directional light
    pub fn directional(color: Vec3, strength: f32) -> Self {
        Self {
            light_type: LightType::Directional,
            color,
            ambient: Vec3::repeat(0.1),
            diffuse: Vec3::repeat(0.8),
            specular: Vec3::repeat(0.5),
            constant: 1.0,
            linear: 0.0,
            quadratic: 0.0,
            strength,
        }
    }

    /// Create a point light with attenuation for roughly `range` units
    pub fn point(color: Vec3, strength: f32, range: f32) -> Self {
        let range = range.max(f32::EPSILON);
        Self {
            light_type: LightType::Point,
            color,
            ambient: Vec3::repeat(0.05),
            diffuse: Vec3::repeat(0.8),
            specular: Vec3::repeat(1.0),
            constant: 1.0,
            linear: 4.5 / range,
            quadratic: 75.0 / (range * range),
            strength,
        }
    }

    /// Uniform record for this light at the given world pose
    pub fn to_record(&self, position: Vec3, direction: Vec3) -> LightRecord {
        LightRecord {
            active: 1,
            light_type: self.light_type.shader_index(),
            constant: self.constant,
            linear: self.linear,
            quadratic: self.quadratic,
            strength: self.strength,
            _padding: [0.0; 2],
            position: utils::vec3_to_padded(&position, 1.0),
            direction: utils::vec3_to_padded(&direction, 0.0),
            color: utils::vec3_to_padded(&self.color, 1.0),
            ambient: utils::vec3_to_padded(&self.ambient, 1.0),
            diffuse: utils::vec3_to_padded(&self.diffuse, 1.0),
            specular: utils::vec3_to_padded(&self.specular, 1.0),
        }
    }
}

/// Pack lights into the uniform block, first come first served
///
/// Slots beyond the lights supplied are left inactive. Lights past
/// [`MAX_LIGHTS`] are dropped; returns how many were dropped.
pub fn pack_lights<'a, I>(lights: I, block: &mut LightsBlock) -> usize
where
    I: IntoIterator<Item = (&'a Light, Vec3, Vec3)>,
{
    *block = LightsBlock::default();
    let mut dropped = 0;
    for (index, (light, position, direction)) in lights.into_iter().enumerate() {
        if index < MAX_LIGHTS {
            block.lights[index] = light.to_record(position, direction);
        } else {
            dropped += 1;
        }
    }
    dropped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_carries_pose() {
        let light = Light::point(Vec3::new(1.0, 0.5, 0.25), 2.0, 10.0);
        let record = light.to_record(Vec3::new(1.0, 2.0, 3.0), Vec3::new(0.0, 0.0, -1.0));
        assert_eq!(record.active, 1);
        assert_eq!(record.light_type, 1);
        assert_eq!(record.position, [1.0, 2.0, 3.0, 1.0]);
        assert_eq!(record.direction, [0.0, 0.0, -1.0, 0.0]);
        assert_eq!(record.strength, 2.0);
    }

    #[test]
    fn test_pack_clears_unused_slots_and_drops_overflow() {
        let light = Light::default();
        let mut block = LightsBlock::default();
        block.lights[5].active = 1;

        let lights = vec![(&light, Vec3::zeros(), Vec3::z()); 2];
        assert_eq!(pack_lights(lights, &mut block), 0);
        assert_eq!(block.lights[1].active, 1);
        assert_eq!(block.lights[5].active, 0);

        let many = vec![(&light, Vec3::zeros(), Vec3::z()); MAX_LIGHTS + 3];
        assert_eq!(pack_lights(many, &mut block), 3);
        assert_eq!(block.lights[MAX_LIGHTS - 1].active, 1);
    }
}
