//! Graphics device abstraction
//!
//! The render core speaks to OpenGL through the [`GraphicsDevice`] trait. The
//! trait mirrors the subset of GL the engine uses (capabilities, blend and
//! depth state, buffers, programs, textures, framebuffers and indexed draws),
//! so a windowed host can forward each call to its GL context one-to-one.
//!
//! All object handles are plain GL names: non-zero when valid, zero for
//! "none" (the default framebuffer, no program bound, and so on).
//!
//! [`HeadlessDevice`] is an in-memory implementation that tracks the full
//! state machine and records every state change and draw call.

mod headless;

pub use headless::{DeviceCommand, HeadlessDevice};

use bitflags::bitflags;
use thiserror::Error;

macro_rules! gl_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);

        impl $name {
            /// The zero handle
            pub const NONE: Self = Self(0);

            /// Whether this is the zero handle
            pub fn is_none(self) -> bool {
                self.0 == 0
            }
        }
    };
}

gl_handle!(
    /// GL buffer object name
    BufferId
);
gl_handle!(
    /// GL vertex array object name
    VertexArrayId
);
gl_handle!(
    /// GL program object name
    ProgramId
);
gl_handle!(
    /// GL texture object name
    TextureId
);
gl_handle!(
    /// GL framebuffer object name
    FramebufferId
);

/// Location of a uniform inside a linked program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformLocation(pub i32);

/// Server-side capabilities toggled with enable/disable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Depth testing
    DepthTest,
    /// Face culling
    CullFace,
    /// Color blending
    Blend,
    /// Scissor rectangle clipping
    ScissorTest,
}

/// Depth comparison function
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum DepthFunc {
    /// Never passes
    Never,
    /// Passes if incoming depth is less than stored
    #[default]
    Less,
    /// Passes if depths are equal
    Equal,
    /// Passes if incoming depth is less than or equal to stored
    LessEqual,
    /// Passes if incoming depth is greater than stored
    Greater,
    /// Passes if depths differ
    NotEqual,
    /// Passes if incoming depth is greater than or equal to stored
    GreaterEqual,
    /// Always passes
    Always,
}

/// Polygon face selector for culling
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Face {
    /// Front-facing polygons
    Front,
    /// Back-facing polygons
    #[default]
    Back,
    /// Both faces
    FrontAndBack,
}

/// Blend factor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    /// 0
    Zero,
    /// 1
    One,
    /// Source alpha
    SrcAlpha,
    /// 1 - source alpha
    OneMinusSrcAlpha,
    /// Source color
    SrcColor,
    /// 1 - source color
    OneMinusSrcColor,
    /// Destination alpha
    DstAlpha,
    /// 1 - destination alpha
    OneMinusDstAlpha,
}

/// Blend equation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum BlendEquation {
    /// src + dst
    #[default]
    Add,
    /// src - dst
    Subtract,
    /// dst - src
    ReverseSubtract,
    /// min(src, dst)
    Min,
    /// max(src, dst)
    Max,
}

/// Polygon rasterization mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum PolygonMode {
    /// Filled triangles
    #[default]
    Fill,
    /// Wireframe
    Line,
}

/// Buffer binding target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferTarget {
    /// Vertex attribute data
    Vertex,
    /// Element indices
    Index,
    /// Uniform block storage
    Uniform,
}

/// Buffer usage hint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    /// Written once, drawn many times
    Static,
    /// Rewritten frequently
    Dynamic,
    /// Rewritten every frame
    Stream,
}

/// Primitive topology for draw calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveMode {
    /// Independent triangles
    Triangles,
    /// Independent lines
    Lines,
}

/// Texel format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    /// 8-bit RGBA
    Rgba8,
    /// 8-bit single channel (font atlases)
    R8,
    /// 32-bit float depth
    Depth32F,
}

/// Texture sampling filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFilter {
    /// Nearest texel
    Nearest,
    /// Bilinear
    Linear,
}

bitflags! {
    /// Buffers cleared by [`GraphicsDevice::clear`]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ClearFlags: u32 {
        /// Color attachment
        const COLOR = 1 << 0;
        /// Depth attachment
        const DEPTH = 1 << 1;
    }
}

/// Pixel rectangle used for viewports and scissor boxes (bottom-left origin)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Viewport {
    /// Left edge
    pub x: i32,
    /// Bottom edge
    pub y: i32,
    /// Width in pixels
    pub width: i32,
    /// Height in pixels
    pub height: i32,
}

impl Viewport {
    /// Create a new rectangle
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    /// Width over height, 1.0 for degenerate rectangles
    pub fn aspect_ratio(&self) -> f32 {
        if self.height > 0 {
            self.width as f32 / self.height as f32
        } else {
            1.0
        }
    }
}

/// One float vertex attribute inside an interleaved vertex buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    /// Shader attribute location
    pub location: u32,
    /// Number of f32 components
    pub components: u32,
    /// Byte offset inside the vertex
    pub offset: usize,
}

/// Interleaved vertex buffer layout
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexLayout {
    /// Size of one vertex in bytes
    pub stride: usize,
    /// Attribute list
    pub attributes: Vec<VertexAttribute>,
}

/// Value written to a program uniform
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    /// `int` / `sampler` / `bool`
    Int(i32),
    /// `float`
    Float(f32),
    /// `vec2`
    Vec2([f32; 2]),
    /// `vec3`
    Vec3([f32; 3]),
    /// `vec4`
    Vec4([f32; 4]),
    /// `mat4`, column-major
    Mat4([[f32; 4]; 4]),
}

/// Device-level failures
///
/// These only occur during setup and indicate a broken build rather than a
/// runtime data problem.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// A shader stage failed to compile
    #[error("Shader compilation failed: {0}")]
    ShaderCompilation(String),

    /// A program failed to link
    #[error("Program link failed: {0}")]
    ProgramLink(String),

    /// A framebuffer is not complete
    #[error("Framebuffer incomplete: {0}")]
    IncompleteFramebuffer(String),

    /// A texture could not be created
    #[error("Texture creation failed: {0}")]
    TextureCreation(String),
}

/// OpenGL-shaped device interface consumed by the render core
pub trait GraphicsDevice {
    // === Fixed-function state ===

    /// Enable a capability
    fn enable(&mut self, capability: Capability);

    /// Disable a capability
    fn disable(&mut self, capability: Capability);

    /// Query a capability
    fn is_enabled(&self, capability: Capability) -> bool;

    /// Enable or disable a capability
    fn set_enabled(&mut self, capability: Capability, enabled: bool) {
        if enabled {
            self.enable(capability);
        } else {
            self.disable(capability);
        }
    }

    /// Set the depth comparison function
    fn depth_func(&mut self, func: DepthFunc);

    /// Current depth comparison function
    fn current_depth_func(&self) -> DepthFunc;

    /// Enable or disable depth writes
    fn depth_mask(&mut self, write: bool);

    /// Whether depth writes are enabled
    fn current_depth_mask(&self) -> bool;

    /// Set the blend factors
    fn blend_func(&mut self, src: BlendFactor, dst: BlendFactor);

    /// Current blend factors
    fn current_blend_func(&self) -> (BlendFactor, BlendFactor);

    /// Set the blend equation
    fn blend_equation(&mut self, equation: BlendEquation);

    /// Current blend equation
    fn current_blend_equation(&self) -> BlendEquation;

    /// Select which faces are culled
    fn cull_face(&mut self, face: Face);

    /// Currently culled face
    fn current_cull_face(&self) -> Face;

    /// Set the polygon rasterization mode
    fn polygon_mode(&mut self, mode: PolygonMode);

    /// Current polygon rasterization mode
    fn current_polygon_mode(&self) -> PolygonMode;

    /// Set the viewport rectangle
    fn set_viewport(&mut self, viewport: Viewport);

    /// Current viewport rectangle
    fn current_viewport(&self) -> Viewport;

    /// Set the scissor rectangle
    fn scissor(&mut self, rect: Viewport);

    /// Set the color used by color clears
    fn clear_color(&mut self, color: [f32; 4]);

    /// Clear the selected buffers of the bound framebuffer
    fn clear(&mut self, flags: ClearFlags);

    // === Buffers ===

    /// Generate a buffer name
    fn create_buffer(&mut self, target: BufferTarget) -> BufferId;

    /// Allocate storage and upload `data`, replacing any previous storage
    fn buffer_data(&mut self, buffer: BufferId, data: &[u8], usage: BufferUsage);

    /// Overwrite part of the existing storage
    fn buffer_sub_data(&mut self, buffer: BufferId, offset: usize, data: &[u8]);

    /// Bind a uniform buffer to an indexed binding point
    fn bind_buffer_base(&mut self, binding: u32, buffer: BufferId);

    /// Delete a buffer
    fn delete_buffer(&mut self, buffer: BufferId);

    /// Create a vertex array wiring `layout` over the given buffers
    fn create_vertex_array(
        &mut self,
        vertex_buffer: BufferId,
        index_buffer: Option<BufferId>,
        layout: &VertexLayout,
    ) -> VertexArrayId;

    /// Bind a vertex array
    fn bind_vertex_array(&mut self, vertex_array: VertexArrayId);

    /// Delete a vertex array
    fn delete_vertex_array(&mut self, vertex_array: VertexArrayId);

    // === Programs ===

    /// Compile and link a program from GLSL sources
    fn create_program(&mut self, vertex_source: &str, fragment_source: &str) -> Result<ProgramId, DeviceError>;

    /// Compile and link a program with a geometry stage (layered rendering)
    fn create_layered_program(
        &mut self,
        vertex_source: &str,
        geometry_source: &str,
        fragment_source: &str,
    ) -> Result<ProgramId, DeviceError>;

    /// Make a program current
    fn use_program(&mut self, program: ProgramId);

    /// Look up a uniform by name
    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation>;

    /// Write a uniform of the current program
    fn set_uniform(&mut self, location: UniformLocation, value: UniformValue);

    /// Delete a program
    fn delete_program(&mut self, program: ProgramId);

    // === Textures and framebuffers ===

    /// Create a 2D texture, optionally uploading tightly packed pixels
    fn create_texture_2d(
        &mut self,
        width: u32,
        height: u32,
        format: TextureFormat,
        pixels: Option<&[u8]>,
        filter: TextureFilter,
    ) -> Result<TextureId, DeviceError>;

    /// Create a depth-only 2D texture array
    fn create_depth_texture_array(&mut self, width: u32, height: u32, layers: u32) -> Result<TextureId, DeviceError>;

    /// Bind a texture to a texture unit
    fn bind_texture(&mut self, unit: u32, texture: TextureId);

    /// Delete a texture
    fn delete_texture(&mut self, texture: TextureId);

    /// Create a framebuffer with a depth texture array as its only attachment
    fn create_depth_framebuffer(&mut self, depth_array: TextureId) -> Result<FramebufferId, DeviceError>;

    /// Bind a framebuffer (zero for the default framebuffer)
    fn bind_framebuffer(&mut self, framebuffer: FramebufferId);

    /// Delete a framebuffer
    fn delete_framebuffer(&mut self, framebuffer: FramebufferId);

    // === Draws ===

    /// Draw `count` u32 indices starting at `offset` bytes into the bound index buffer
    fn draw_elements(&mut self, mode: PrimitiveMode, count: u32, offset: usize);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_handles_are_none() {
        assert!(BufferId::NONE.is_none());
        assert!(!TextureId(3).is_none());
    }

    #[test]
    fn test_viewport_aspect() {
        assert_eq!(Viewport::new(0, 0, 200, 100).aspect_ratio(), 2.0);
        assert_eq!(Viewport::new(0, 0, 200, 0).aspect_ratio(), 1.0);
    }
}
