//! Asset registry
//!
//! Shaders, textures, meshes, materials and fonts live in [`Resources`] and
//! are referenced everywhere else through copyable handles.

pub mod resource_manager;

pub use resource_manager::{
    Defaults, FontHandle, MaterialHandle, MeshHandle, NamedUniformBuffer, Resources, ShaderHandle,
    TextureHandle, CUBE_MESH, DEFAULT_MATERIAL, DEFAULT_SHADER, DEPTH_MATERIAL, DEPTH_SHADER,
    WHITE_TEXTURE,
};
