//! Rendering system
//!
//! The render core is written against the [`device::GraphicsDevice`] trait,
//! an OpenGL-shaped interface. A windowed host supplies a real GL
//! implementation; tests and headless tools use [`device::HeadlessDevice`].
//!
//! # Layout
//!
//! - [`device`]: the device seam and its in-memory implementation
//! - [`primitives`]: camera, frustum, bounds, meshes and mesh generation
//! - [`uniforms`]: std140 uniform blocks shared with every shader
//! - [`shader`], [`texture`], [`material`]: GPU programs, images and the
//!   materials that bind them
//! - [`renderers`]: components that turn objects into draw calls
//! - [`render_queue`]: stable priority ordering of renderers
//! - [`shadow_map`]: cascaded shadow maps for the main directional light
//! - [`graphics`]: the per-frame pipeline tying everything together
//! - [`graphics2d`]: the immediate-mode 2D draw-list batcher

pub mod device;
pub mod graphics;
pub mod graphics2d;
pub mod lighting;
pub mod material;
pub mod primitives;
pub mod render_queue;
pub mod renderers;
pub mod shader;
pub mod shadow_map;
pub mod texture;
pub mod uniforms;

pub use device::{DeviceError, GraphicsDevice, HeadlessDevice, Viewport};
pub use graphics::{FrameStats, Graphics, Overlay};
pub use graphics2d::Graphics2D;
pub use lighting::{Light, LightType};
pub use material::{DepthMaterial, DiffuseMaterial, DrawPart, Material, RenderSettings};
pub use primitives::{BoundingBox, Camera, Frustum, Mesh, MeshGenerator, Ray, Vertex};
pub use render_queue::RenderQueue;
pub use renderers::{BatchRenderer, MeshRenderer, RenderPass, Renderer, Terrain};
pub use shader::Shader;
pub use shadow_map::ShadowMap;
pub use texture::Texture;

use thiserror::Error;

/// Errors raised while setting up the render pipeline
///
/// Only setup can fail: a shader that does not compile or a framebuffer
/// that is incomplete means the build is broken. Per-frame problems such as
/// a missing mesh are logged and skipped instead.
#[derive(Error, Debug)]
pub enum RenderError {
    /// Renderer initialization failed during setup
    ///
    /// Raised for invalid pipeline configuration, such as a shadow map
    /// without cascades or with more cascades than the shadow block holds.
    #[error("Renderer initialization failed: {0}")]
    InitializationFailed(String),

    /// A rendering operation failed during execution
    #[error("Rendering failed: {0}")]
    RenderingFailed(String),

    /// Resource creation or management failed
    ///
    /// Covers GPU resources (buffers, textures) and the files they are
    /// created from.
    #[error("Resource creation failed: {0}")]
    ResourceCreationFailed(String),

    /// A named shader failed to compile or link
    #[error("Failed to compile shader '{name}': {source}")]
    Shader {
        /// Name the shader was registered under
        name: String,
        /// Device diagnostic
        #[source]
        source: DeviceError,
    },

    /// Any other device failure
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),
}
