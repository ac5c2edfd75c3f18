//! Shared uniform blocks
//!
//! Four std140 blocks are shared by every shader the engine compiles. Their
//! binding indices are part of the ABI between the engine and GLSL:
//!
//! | Block    | Binding | Size (bytes) |
//! |----------|---------|--------------|
//! | Lights   | 0       | 32 × 128     |
//! | Camera   | 1       | 208          |
//! | World    | 2       | 32           |
//! | Shadow   | 3       | 1296         |
//!
//! Each Rust struct mirrors the GLSL declaration field for field, with the
//! padding std140 inserts written out explicitly.

use bytemuck::{Pod, Zeroable};

use crate::config::MAX_SHADOW_MATRICES;
use crate::render::device::{BufferId, BufferTarget, BufferUsage, GraphicsDevice};

/// Binding point of the lights block
pub const LIGHTS_BINDING: u32 = 0;
/// Binding point of the camera block
pub const CAMERA_BINDING: u32 = 1;
/// Binding point of the world/fog block
pub const WORLD_BINDING: u32 = 2;
/// Binding point of the shadow block
pub const SHADOW_BINDING: u32 = 3;

/// Number of light slots in the lights block
pub const MAX_LIGHTS: usize = 32;

/// One light slot
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct LightRecord {
    /// Non-zero when the slot is in use
    pub active: i32,
    /// 0 = directional, 1 = point
    pub light_type: i32,
    /// Constant attenuation term
    pub constant: f32,
    /// Linear attenuation term
    pub linear: f32,
    /// Quadratic attenuation term
    pub quadratic: f32,
    /// Intensity multiplier
    pub strength: f32,
    /// std140 padding
    pub _padding: [f32; 2],
    /// World position (w unused)
    pub position: [f32; 4],
    /// World direction (w unused)
    pub direction: [f32; 4],
    /// Base color
    pub color: [f32; 4],
    /// Ambient term
    pub ambient: [f32; 4],
    /// Diffuse term
    pub diffuse: [f32; 4],
    /// Specular term
    pub specular: [f32; 4],
}

/// Lights block
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct LightsBlock {
    /// Fixed light slots
    pub lights: [LightRecord; MAX_LIGHTS],
}

impl Default for LightsBlock {
    fn default() -> Self {
        Self::zeroed()
    }
}

/// Camera block
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct CameraBlock {
    /// World to view
    pub view: [[f32; 4]; 4],
    /// View to clip
    pub projection: [[f32; 4]; 4],
    /// `projection * view`
    pub view_projection: [[f32; 4]; 4],
    /// World position (w = 1)
    pub position: [f32; 4],
}

/// World/fog block
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct WorldBlock {
    /// Fog color
    pub fog_color: [f32; 4],
    /// Exponential fog density
    pub fog_density: f32,
    /// Fog falloff gradient
    pub fog_gradient: f32,
    /// Non-zero when fog is applied
    pub fog_enabled: i32,
    /// Seconds since startup
    pub time: f32,
}

/// Shadow block
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ShadowBlock {
    /// Number of split distances; `count + 1` matrices are meaningful
    pub cascade_count: i32,
    /// Depth bias
    pub bias: f32,
    /// Camera far plane the last band ends at
    pub far_plane: f32,
    /// Non-zero when shadows are sampled
    pub enabled: i32,
    /// Light-space `projection * view` per band
    pub light_space_matrices: [[[f32; 4]; 4]; MAX_SHADOW_MATRICES],
    /// Split distances, one float per 16-byte slot
    pub cascade_planes: [[f32; 4]; MAX_SHADOW_MATRICES],
}

impl Default for ShadowBlock {
    fn default() -> Self {
        Self::zeroed()
    }
}

const _: () = assert!(std::mem::size_of::<LightRecord>() == 128);
const _: () = assert!(std::mem::size_of::<LightsBlock>() == MAX_LIGHTS * 128);
const _: () = assert!(std::mem::size_of::<CameraBlock>() == 208);
const _: () = assert!(std::mem::size_of::<WorldBlock>() == 32);
const _: () = assert!(std::mem::size_of::<ShadowBlock>() == 16 + 16 * 64 + 16 * 16);

/// GPU uniform buffer holding one `T`, bound to a fixed binding point
#[derive(Debug)]
pub struct UniformBuffer<T: Pod> {
    buffer: BufferId,
    binding: u32,
    data: T,
}

impl<T: Pod + Default> UniformBuffer<T> {
    /// Allocate the buffer and bind it
    pub fn new(device: &mut dyn GraphicsDevice, binding: u32) -> Self {
        let data = T::default();
        let buffer = device.create_buffer(BufferTarget::Uniform);
        device.buffer_data(buffer, bytemuck::bytes_of(&data), BufferUsage::Dynamic);
        device.bind_buffer_base(binding, buffer);
        log::debug!(
            "Uniform buffer {:?} ({} bytes) bound at {}",
            buffer,
            std::mem::size_of::<T>(),
            binding
        );
        Self { buffer, binding, data }
    }
}

impl<T: Pod> UniformBuffer<T> {
    /// CPU copy of the block
    pub fn data(&self) -> &T {
        &self.data
    }

    /// Mutable CPU copy; call [`upload`](Self::upload) to publish changes
    pub fn data_mut(&mut self) -> &mut T {
        &mut self.data
    }

    /// GL buffer name
    pub fn buffer(&self) -> BufferId {
        self.buffer
    }

    /// Binding point
    pub fn binding(&self) -> u32 {
        self.binding
    }

    /// Replace the block and upload it
    pub fn set(&mut self, device: &mut dyn GraphicsDevice, data: T) {
        self.data = data;
        self.upload(device);
    }

    /// Write the CPU copy to the GPU and rebind
    pub fn upload(&self, device: &mut dyn GraphicsDevice) {
        device.buffer_sub_data(self.buffer, 0, bytemuck::bytes_of(&self.data));
        device.bind_buffer_base(self.binding, self.buffer);
    }

    /// Delete the GPU buffer
    pub fn release(&mut self, device: &mut dyn GraphicsDevice) {
        if !self.buffer.is_none() {
            device.delete_buffer(self.buffer);
            self.buffer = BufferId::NONE;
        }
    }
}
