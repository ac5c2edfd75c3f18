//! Materials and per-draw render settings
//!
//! A material binds its shader and writes its own uniforms right before a
//! renderer issues a draw. Returning `false` from [`Material::apply`] tells
//! the renderer that something it needs is missing and the draw is skipped.

use std::any::Any;

use serde::{Deserialize, Serialize};

use crate::assets::{MaterialHandle, Resources, ShaderHandle, TextureHandle};
use crate::foundation::math::{Mat4, Vec4};
use crate::render::device::{
    BlendFactor, Capability, DepthFunc, GraphicsDevice, PolygonMode, TextureId,
};
use crate::render::primitives::Camera;
use crate::render::shader::{DIFFUSE_TEXTURE_UNIT, SHADOW_TEXTURE_UNIT};

/// Everything a material may read while binding itself
pub struct MaterialContext<'a> {
    /// Device to bind state on
    pub device: &'a mut dyn GraphicsDevice,
    /// Shader and texture lookup
    pub resources: &'a Resources,
    /// Object to world
    pub model: &'a Mat4,
    /// Camera of the current pass
    pub camera: &'a Camera,
    /// Whether the renderer samples the shadow map
    pub receive_shadows: bool,
    /// Cascade depth array of the shadow pass
    pub shadow_map: TextureId,
}

/// Shader plus the uniforms it needs for one draw
pub trait Material: Any {
    /// Shader this material binds
    fn shader(&self) -> ShaderHandle;

    /// Bind the shader and write uniforms; `false` skips the draw
    fn apply(&self, ctx: &mut MaterialContext<'_>) -> bool;

    /// Downcast support
    fn as_any(&self) -> &dyn Any;

    /// Mutable downcast support
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Lit material with an optional diffuse texture and a tint
#[derive(Debug, Clone, PartialEq)]
pub struct DiffuseMaterial {
    /// Lit shader
    pub shader: ShaderHandle,
    /// Diffuse map; the white texture is used when absent
    pub texture: Option<TextureHandle>,
    /// Multiplied with the diffuse map
    pub color: Vec4,
}

impl DiffuseMaterial {
    /// Create an untextured material
    pub fn new(shader: ShaderHandle, color: Vec4) -> Self {
        Self { shader, texture: None, color }
    }

    /// Use a diffuse texture
    pub fn with_texture(mut self, texture: TextureHandle) -> Self {
        self.texture = Some(texture);
        self
    }
}

impl Material for DiffuseMaterial {
    fn shader(&self) -> ShaderHandle {
        self.shader
    }

    fn apply(&self, ctx: &mut MaterialContext<'_>) -> bool {
        let Some(shader) = ctx.resources.shader(self.shader) else {
            return false;
        };

        let texture = self
            .texture
            .and_then(|handle| ctx.resources.texture(handle))
            .or_else(|| ctx.resources.white_texture())
            .map(|texture| texture.id())
            .unwrap_or(TextureId::NONE);

        let device = &mut *ctx.device;
        shader.use_program(device);
        shader.set_mat4(device, "uModel", ctx.model);
        shader.set_vec4(device, "uDiffuseColor", &self.color);
        shader.set_int(device, "uReceiveShadows", i32::from(ctx.receive_shadows));

        device.bind_texture(DIFFUSE_TEXTURE_UNIT, texture);
        shader.set_int(device, "uTexture", DIFFUSE_TEXTURE_UNIT as i32);
        device.bind_texture(SHADOW_TEXTURE_UNIT, ctx.shadow_map);
        shader.set_int(device, "uShadowMap", SHADOW_TEXTURE_UNIT as i32);
        true
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Depth-only material used by the shadow pass
#[derive(Debug, Clone, PartialEq)]
pub struct DepthMaterial {
    /// Layered depth shader
    pub shader: ShaderHandle,
}

impl Material for DepthMaterial {
    fn shader(&self) -> ShaderHandle {
        self.shader
    }

    fn apply(&self, ctx: &mut MaterialContext<'_>) -> bool {
        let Some(shader) = ctx.resources.shader(self.shader) else {
            return false;
        };
        shader.use_program(ctx.device);
        shader.set_mat4(ctx.device, "uModel", ctx.model);
        true
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Fixed-function state a renderer applies before each of its draws
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    /// Rasterize as lines
    pub wireframe: bool,
    /// Depth testing
    pub depth_test: bool,
    /// Back-face culling
    pub cull_face: bool,
    /// Alpha blending (src alpha, one minus src alpha)
    pub blend: bool,
    /// Depth comparison
    pub depth_func: DepthFunc,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            wireframe: false,
            depth_test: true,
            cull_face: true,
            blend: false,
            depth_func: DepthFunc::Less,
        }
    }
}

impl RenderSettings {
    /// Settings for alpha-blended geometry
    pub fn transparent() -> Self {
        Self { blend: true, ..Self::default() }
    }

    /// Write the state to the device
    ///
    /// The shadow pass owns face culling while it is bound and always writes
    /// opaque filled depth, so `shadow_pass` only takes the depth function.
    pub fn apply(&self, device: &mut dyn GraphicsDevice, shadow_pass: bool) {
        device.depth_func(self.depth_func);
        if shadow_pass {
            device.enable(Capability::DepthTest);
            device.disable(Capability::Blend);
            device.polygon_mode(PolygonMode::Fill);
            return;
        }

        device.set_enabled(Capability::DepthTest, self.depth_test);
        device.set_enabled(Capability::CullFace, self.cull_face);
        device.set_enabled(Capability::Blend, self.blend);
        if self.blend {
            device.blend_func(BlendFactor::SrcAlpha, BlendFactor::OneMinusSrcAlpha);
        }
        device.polygon_mode(if self.wireframe { PolygonMode::Line } else { PolygonMode::Fill });
    }
}

/// Mesh/material pair drawn with its own settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawPart {
    /// Geometry
    pub mesh: crate::assets::MeshHandle,
    /// Material
    pub material: MaterialHandle,
    /// Fixed-function state
    pub settings: RenderSettings,
}

impl DrawPart {
    /// Pair with default settings
    pub fn new(mesh: crate::assets::MeshHandle, material: MaterialHandle) -> Self {
        Self { mesh, material, settings: RenderSettings::default() }
    }

    /// Replace the settings
    pub fn with_settings(mut self, settings: RenderSettings) -> Self {
        self.settings = settings;
        self
    }
}
