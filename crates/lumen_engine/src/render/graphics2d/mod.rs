//! # Immediate-mode 2D draw list
//!
//! [`Graphics2D`] accepts shapes, images and text during a frame and draws
//! them all with as few indexed draw calls as possible at the end of it.
//!
//! ## Frame protocol
//!
//! 1. Every `add_*` call builds its geometry in scratch buffers, applies the
//!    optional rotation and appends the result to the persistent vertex and
//!    index buffers. Consecutive submissions with identical state (shader,
//!    texture, clip rectangle, font flags, no user data) share one draw item.
//! 2. [`Graphics2D::flush`] uploads the live ranges, walks the items in
//!    submission order switching shader/texture/scissor only on change, then
//!    restores the GL state it touched and resets the per-frame counters.
//!
//! All buffers keep their capacity across frames. GPU storage is resized at
//! flush time when the CPU side has grown.
//!
//! Coordinates are pixels with the origin at the top-left of the viewport.

mod buffers;
pub mod text;

pub use buffers::{GrowableBuffer, Vertex2D};
pub use text::{Font, Glyph, PlacedGlyph, TextLayout};

use std::any::Any;
use std::rc::Rc;

use crate::foundation::math::{constants::PI, utils, Mat4, Mat4Ext, Vec2, Vec4};
use crate::render::device::{
    BlendEquation, BlendFactor, BufferId, BufferTarget, BufferUsage, Capability, DepthFunc,
    GraphicsDevice, PolygonMode, PrimitiveMode, ProgramId, TextureId, UniformValue, VertexArrayId,
    VertexAttribute, VertexLayout, Viewport,
};
use crate::render::shader::{self, Shader};
use crate::render::texture::Texture;
use crate::render::RenderError;

const INITIAL_VERTICES: usize = 1024;
const INITIAL_INDICES: usize = 1536;
const TEXTURE_UNIT: u32 = 0;

/// Host hook for custom 2D shaders: receives the device, the bound program
/// and the user data attached to the item being drawn
pub type UniformCallback = Box<dyn FnMut(&mut dyn GraphicsDevice, ProgramId, Option<&dyn Any>)>;

/// Rectangle in pixels, top-left origin
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    /// Left edge
    pub x: f32,
    /// Top edge
    pub y: f32,
    /// Width
    pub width: f32,
    /// Height
    pub height: f32,
}

impl Rect {
    /// The zero rectangle, meaning "no clipping" when used as a clip rect
    pub const NONE: Rect = Rect { x: 0.0, y: 0.0, width: 0.0, height: 0.0 };

    /// Create a rectangle
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    /// Whether all components are zero
    pub fn is_zero(&self) -> bool {
        *self == Self::NONE
    }
}

/// Batch key and extras of a submission
#[derive(Clone, Default)]
pub struct DrawState {
    /// Program, or `ProgramId::NONE` for the built-in shader
    pub shader: ProgramId,
    /// Texture, or `TextureId::NONE` for the white texture
    pub texture: TextureId,
    /// Clip rectangle in top-left pixel coordinates; zero disables clipping
    pub clip: Rect,
    /// Glyph quads from a font atlas
    pub is_font: bool,
    /// Font atlas holds distance fields
    pub is_sdf: bool,
    /// Passed to the uniform callback for custom shaders
    pub user_data: Option<Rc<dyn Any>>,
}

impl std::fmt::Debug for DrawState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DrawState")
            .field("shader", &self.shader)
            .field("texture", &self.texture)
            .field("clip", &self.clip)
            .field("is_font", &self.is_font)
            .field("is_sdf", &self.is_sdf)
            .field("user_data", &self.user_data.is_some())
            .finish()
    }
}

/// One recorded draw
#[derive(Clone)]
pub struct DrawItem {
    /// Program, `ProgramId::NONE` for the built-in shader
    pub shader: ProgramId,
    /// Bound texture (never zero once recorded)
    pub texture: TextureId,
    /// Byte offset of the first vertex
    pub vertex_offset: usize,
    /// Byte length of the vertex range
    pub vertex_size: usize,
    /// Byte offset of the first index
    pub index_offset: usize,
    /// Number of indices
    pub index_count: usize,
    /// GL scissor box (bottom-left origin); zero disables clipping
    pub scissor: Viewport,
    /// Glyph quads
    pub is_font: bool,
    /// Distance-field glyphs
    pub is_sdf: bool,
    /// Opaque data for the uniform callback
    pub user_data: Option<Rc<dyn Any>>,
}

impl std::fmt::Debug for DrawItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DrawItem")
            .field("shader", &self.shader)
            .field("texture", &self.texture)
            .field("vertex_offset", &self.vertex_offset)
            .field("vertex_size", &self.vertex_size)
            .field("index_offset", &self.index_offset)
            .field("index_count", &self.index_count)
            .field("scissor", &self.scissor)
            .field("is_font", &self.is_font)
            .field("is_sdf", &self.is_sdf)
            .finish()
    }
}

impl DrawItem {
    fn accepts(&self, shader: ProgramId, texture: TextureId, scissor: Viewport, state: &DrawState) -> bool {
        self.user_data.is_none()
            && state.user_data.is_none()
            && self.shader == shader
            && self.texture == texture
            && self.scissor == scissor
            && self.is_font == state.is_font
            && self.is_sdf == state.is_sdf
    }
}

/// GL state saved around a flush
#[derive(Debug, Clone, Copy)]
struct SavedState {
    depth_test: bool,
    blend: bool,
    scissor_test: bool,
    cull_face: bool,
    polygon_mode: PolygonMode,
    blend_func: (BlendFactor, BlendFactor),
    blend_equation: BlendEquation,
    depth_func: DepthFunc,
    depth_mask: bool,
}

impl SavedState {
    fn capture(device: &dyn GraphicsDevice) -> Self {
        Self {
            depth_test: device.is_enabled(Capability::DepthTest),
            blend: device.is_enabled(Capability::Blend),
            scissor_test: device.is_enabled(Capability::ScissorTest),
            cull_face: device.is_enabled(Capability::CullFace),
            polygon_mode: device.current_polygon_mode(),
            blend_func: device.current_blend_func(),
            blend_equation: device.current_blend_equation(),
            depth_func: device.current_depth_func(),
            depth_mask: device.current_depth_mask(),
        }
    }

    fn restore(&self, device: &mut dyn GraphicsDevice) {
        device.set_enabled(Capability::DepthTest, self.depth_test);
        device.set_enabled(Capability::Blend, self.blend);
        device.set_enabled(Capability::ScissorTest, self.scissor_test);
        device.set_enabled(Capability::CullFace, self.cull_face);
        device.polygon_mode(self.polygon_mode);
        device.blend_func(self.blend_func.0, self.blend_func.1);
        device.blend_equation(self.blend_equation);
        device.depth_func(self.depth_func);
        device.depth_mask(self.depth_mask);
    }
}

/// Per-frame counters of the last flush
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushStats {
    /// Draw items recorded
    pub items: usize,
    /// Draw calls issued
    pub draw_calls: usize,
    /// Vertices uploaded
    pub vertices: usize,
    /// Indices uploaded
    pub indices: usize,
}

/// Batched 2D renderer
pub struct Graphics2D {
    shader: Shader,
    white_texture: Texture,
    vertex_array: VertexArrayId,
    vertex_buffer: BufferId,
    index_buffer: BufferId,
    gpu_vertex_capacity: usize,
    gpu_index_capacity: usize,

    scratch_vertices: GrowableBuffer<Vertex2D>,
    scratch_indices: GrowableBuffer<u32>,
    vertices: GrowableBuffer<Vertex2D>,
    indices: GrowableBuffer<u32>,
    items: Vec<DrawItem>,

    viewport: Viewport,
    time: f32,
    uniform_callback: Option<UniformCallback>,
    last_stats: FlushStats,
}

impl Graphics2D {
    /// Compile the built-in shader and allocate the buffers
    pub fn new(device: &mut dyn GraphicsDevice) -> Result<Self, RenderError> {
        let shader = Shader::compile(
            device,
            "graphics2d",
            &shader::ui_vertex_source(),
            &shader::ui_fragment_source(),
        )?;
        let white_texture = Texture::solid(device, [255, 255, 255, 255])?;

        let vertices = GrowableBuffer::with_capacity(INITIAL_VERTICES);
        let indices = GrowableBuffer::with_capacity(INITIAL_INDICES);

        let vertex_buffer = device.create_buffer(BufferTarget::Vertex);
        device.buffer_data(vertex_buffer, vertices.storage_bytes(), BufferUsage::Dynamic);
        let index_buffer = device.create_buffer(BufferTarget::Index);
        device.buffer_data(index_buffer, indices.storage_bytes(), BufferUsage::Dynamic);

        let layout = VertexLayout {
            stride: std::mem::size_of::<Vertex2D>(),
            attributes: vec![
                VertexAttribute { location: 0, components: 2, offset: 0 },
                VertexAttribute { location: 1, components: 2, offset: 8 },
                VertexAttribute { location: 2, components: 4, offset: 16 },
            ],
        };
        let vertex_array = device.create_vertex_array(vertex_buffer, Some(index_buffer), &layout);

        log::debug!("Graphics2D ready ({} vertices, {} indices reserved)", INITIAL_VERTICES, INITIAL_INDICES);

        Ok(Self {
            shader,
            white_texture,
            vertex_array,
            vertex_buffer,
            index_buffer,
            gpu_vertex_capacity: INITIAL_VERTICES,
            gpu_index_capacity: INITIAL_INDICES,
            scratch_vertices: GrowableBuffer::with_capacity(64),
            scratch_indices: GrowableBuffer::with_capacity(96),
            vertices,
            indices,
            items: Vec::new(),
            viewport: device.current_viewport(),
            time: 0.0,
            uniform_callback: None,
            last_stats: FlushStats::default(),
        })
    }

    /// Set the viewport clip rects are flipped against and the elapsed time
    pub fn begin_frame(&mut self, viewport: Viewport, time: f32) {
        self.viewport = viewport;
        self.time = time;
    }

    /// Built-in shader program
    pub fn builtin_program(&self) -> ProgramId {
        self.shader.program()
    }

    /// Register the hook invoked for items drawn with a custom shader
    pub fn set_uniform_callback(&mut self, callback: UniformCallback) {
        self.uniform_callback = Some(callback);
    }

    /// Items recorded this frame
    pub fn items(&self) -> &[DrawItem] {
        &self.items
    }

    /// Vertices recorded this frame
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Indices recorded this frame
    pub fn index_count(&self) -> usize {
        self.indices.len()
    }

    /// Recorded vertices
    pub fn vertices(&self) -> &[Vertex2D] {
        self.vertices.as_slice()
    }

    /// Recorded indices
    pub fn indices(&self) -> &[u32] {
        self.indices.as_slice()
    }

    /// Persistent buffer capacities (vertices, indices)
    pub fn capacity(&self) -> (usize, usize) {
        (self.vertices.capacity(), self.indices.capacity())
    }

    /// Counters of the last flush
    pub fn last_stats(&self) -> FlushStats {
        self.last_stats
    }

    fn scissor_for(&self, clip: Rect) -> Viewport {
        if clip.is_zero() {
            return Viewport::default();
        }
        Viewport::new(
            clip.x as i32,
            self.viewport.height - (clip.y + clip.height) as i32,
            clip.width as i32,
            clip.height as i32,
        )
    }

    /// Append vertices and indices (relative to `vertices`) as one submission
    ///
    /// Indices are rebased onto the persistent vertex buffer. The submission
    /// joins the previous item when its state matches.
    pub fn add_vertices(&mut self, vertices: &[Vertex2D], indices: &[u32], state: DrawState) {
        if vertices.is_empty() || indices.is_empty() {
            return;
        }

        let texture = if state.texture.is_none() { self.white_texture.id() } else { state.texture };
        let scissor = self.scissor_for(state.clip);

        let base_vertex = self.vertices.extend_from_slice(vertices);
        let base_index = self.indices.len();
        self.indices.reset_to(base_index + indices.len());
        for (slot, index) in self.indices.as_mut_slice()[base_index..].iter_mut().zip(indices) {
            *slot = base_vertex as u32 + index;
        }

        let vertex_stride = std::mem::size_of::<Vertex2D>();
        let index_stride = std::mem::size_of::<u32>();

        if let Some(last) = self.items.last_mut() {
            if last.accepts(state.shader, texture, scissor, &state) {
                last.vertex_size += vertices.len() * vertex_stride;
                last.index_count += indices.len();
                return;
            }
        }

        self.items.push(DrawItem {
            shader: state.shader,
            texture,
            vertex_offset: base_vertex * vertex_stride,
            vertex_size: vertices.len() * vertex_stride,
            index_offset: base_index * index_stride,
            index_count: indices.len(),
            scissor,
            is_font: state.is_font,
            is_sdf: state.is_sdf,
            user_data: state.user_data,
        });
    }

    /// Rotate the scratch geometry about its centroid and submit it
    fn submit_scratch(&mut self, rotation: f32, state: DrawState) {
        if rotation != 0.0 {
            rotate_about_centroid(self.scratch_vertices.as_mut_slice(), rotation);
        }
        let vertices = std::mem::replace(&mut self.scratch_vertices, GrowableBuffer::with_capacity(0));
        let indices = std::mem::replace(&mut self.scratch_indices, GrowableBuffer::with_capacity(0));
        self.add_vertices(vertices.as_slice(), indices.as_slice(), state);
        self.scratch_vertices = vertices;
        self.scratch_indices = indices;
    }

    fn solid(clip: Rect) -> DrawState {
        DrawState { clip, ..DrawState::default() }
    }

    fn write_quad(&mut self, corners: [Vec2; 4], uv_min: Vec2, uv_max: Vec2, color: Vec4) {
        let color: [f32; 4] = color.into();
        let uvs = [
            [uv_min.x, uv_min.y],
            [uv_max.x, uv_min.y],
            [uv_max.x, uv_max.y],
            [uv_min.x, uv_max.y],
        ];
        let vertices = self.scratch_vertices.reset_to(4);
        for ((vertex, corner), uv) in vertices.iter_mut().zip(corners).zip(uvs) {
            *vertex = Vertex2D::new(corner.into(), uv, color);
        }
        self.scratch_indices.reset_to(6).copy_from_slice(&[0, 1, 2, 2, 3, 0]);
    }

    fn rect_corners(position: Vec2, size: Vec2) -> [Vec2; 4] {
        [
            position,
            Vec2::new(position.x + size.x, position.y),
            position + size,
            Vec2::new(position.x, position.y + size.y),
        ]
    }

    /// Filled rectangle
    pub fn add_rectangle(&mut self, position: Vec2, size: Vec2, rotation: f32, color: Vec4, clip: Rect) {
        self.write_quad(Self::rect_corners(position, size), Vec2::zeros(), Vec2::new(1.0, 1.0), color);
        self.submit_scratch(rotation, Self::solid(clip));
    }

    /// Filled rectangle with rounded corners
    pub fn add_rounded_rectangle(
        &mut self,
        position: Vec2,
        size: Vec2,
        radius: f32,
        segments: u32,
        rotation: f32,
        color: Vec4,
        clip: Rect,
    ) {
        let radius = radius.clamp(0.0, size.x.min(size.y) * 0.5);
        if radius <= 0.0 {
            self.add_rectangle(position, size, rotation, color, clip);
            return;
        }
        let segments = segments.max(1) as usize;
        let color: [f32; 4] = color.into();

        // Corner arc centers, clockwise from top-left on screen
        let centers = [
            (position + Vec2::new(radius, radius), PI),
            (position + Vec2::new(size.x - radius, radius), 1.5 * PI),
            (position + Vec2::new(size.x - radius, size.y - radius), 0.0),
            (position + Vec2::new(radius, size.y - radius), 0.5 * PI),
        ];

        let perimeter = 4 * (segments + 1);
        let center = position + size * 0.5;
        let vertices = self.scratch_vertices.reset_to(perimeter + 1);
        vertices[0] = Vertex2D::new(center.into(), [0.5, 0.5], color);
        let mut slot = 1;
        for (corner, start) in centers {
            for step in 0..=segments {
                let angle = start + 0.5 * PI * step as f32 / segments as f32;
                let point = corner + Vec2::new(angle.cos(), angle.sin()) * radius;
                let uv = [(point.x - position.x) / size.x, (point.y - position.y) / size.y];
                vertices[slot] = Vertex2D::new(point.into(), uv, color);
                slot += 1;
            }
        }

        let indices = self.scratch_indices.reset_to(perimeter * 3);
        fill_fan(indices, perimeter as u32);
        self.submit_scratch(rotation, Self::solid(clip));
    }

    /// Filled circle
    pub fn add_circle(&mut self, center: Vec2, radius: f32, segments: u32, rotation: f32, color: Vec4, clip: Rect) {
        let segments = segments.max(3) as usize;
        let color: [f32; 4] = color.into();

        let vertices = self.scratch_vertices.reset_to(segments + 1);
        vertices[0] = Vertex2D::new(center.into(), [0.5, 0.5], color);
        for i in 0..segments {
            let angle = 2.0 * PI * i as f32 / segments as f32;
            let direction = Vec2::new(angle.cos(), angle.sin());
            let point = center + direction * radius;
            let uv = [0.5 + direction.x * 0.5, 0.5 + direction.y * 0.5];
            vertices[i + 1] = Vertex2D::new(point.into(), uv, color);
        }

        let indices = self.scratch_indices.reset_to(segments * 3);
        fill_fan(indices, segments as u32);
        self.submit_scratch(rotation, Self::solid(clip));
    }

    /// Filled triangle
    pub fn add_triangle(&mut self, a: Vec2, b: Vec2, c: Vec2, rotation: f32, color: Vec4, clip: Rect) {
        let color: [f32; 4] = color.into();
        let vertices = self.scratch_vertices.reset_to(3);
        vertices[0] = Vertex2D::new(a.into(), [0.0, 0.0], color);
        vertices[1] = Vertex2D::new(b.into(), [1.0, 0.0], color);
        vertices[2] = Vertex2D::new(c.into(), [0.5, 1.0], color);
        self.scratch_indices.reset_to(3).copy_from_slice(&[0, 1, 2]);
        self.submit_scratch(rotation, Self::solid(clip));
    }

    /// Line segment as a quad `thickness` pixels wide
    pub fn add_line(&mut self, from: Vec2, to: Vec2, thickness: f32, rotation: f32, color: Vec4, clip: Rect) {
        let Some(corners) = line_quad(from, to, thickness) else {
            return;
        };
        self.write_quad(corners, Vec2::zeros(), Vec2::new(1.0, 1.0), color);
        self.submit_scratch(rotation, Self::solid(clip));
    }

    /// Connected line segments, one quad per segment
    ///
    /// The whole strip rotates about its centroid.
    pub fn add_polyline(&mut self, points: &[Vec2], thickness: f32, rotation: f32, color: Vec4, clip: Rect) {
        let quads: Vec<[Vec2; 4]> = points
            .windows(2)
            .filter_map(|pair| line_quad(pair[0], pair[1], thickness))
            .collect();
        if quads.is_empty() {
            return;
        }

        let color: [f32; 4] = color.into();
        let vertices = self.scratch_vertices.reset_to(quads.len() * 4);
        for (chunk, corners) in vertices.chunks_exact_mut(4).zip(&quads) {
            for (vertex, corner) in chunk.iter_mut().zip(corners) {
                *vertex = Vertex2D::new((*corner).into(), [0.0, 0.0], color);
            }
        }
        let indices = self.scratch_indices.reset_to(quads.len() * 6);
        for (quad, chunk) in indices.chunks_exact_mut(6).enumerate() {
            let base = quad as u32 * 4;
            chunk.copy_from_slice(&[base, base + 1, base + 2, base + 2, base + 3, base]);
        }
        self.submit_scratch(rotation, Self::solid(clip));
    }

    /// Plot `values` as a polyline stretched over a rectangle
    ///
    /// `min` maps to the bottom edge and `max` to the top edge.
    pub fn add_plot(
        &mut self,
        position: Vec2,
        size: Vec2,
        values: &[f32],
        min: f32,
        max: f32,
        thickness: f32,
        rotation: f32,
        color: Vec4,
        clip: Rect,
    ) {
        if values.len() < 2 {
            return;
        }
        let range = if (max - min).abs() > f32::EPSILON { max - min } else { 1.0 };
        let step = size.x / (values.len() - 1) as f32;
        let points: Vec<Vec2> = values
            .iter()
            .enumerate()
            .map(|(i, value)| {
                let t = ((value - min) / range).clamp(0.0, 1.0);
                Vec2::new(position.x + i as f32 * step, position.y + size.y * (1.0 - t))
            })
            .collect();
        self.add_polyline(&points, thickness, rotation, color, clip);
    }

    /// Rectangle outline `thickness` pixels wide, drawn inside the rectangle
    pub fn add_border(&mut self, position: Vec2, size: Vec2, thickness: f32, rotation: f32, color: Vec4, clip: Rect) {
        let t = thickness.clamp(0.0, size.x.min(size.y) * 0.5);
        if t <= 0.0 {
            return;
        }
        let color: [f32; 4] = color.into();
        let outer = Self::rect_corners(position, size);
        let inner = Self::rect_corners(position + Vec2::new(t, t), size - Vec2::new(2.0 * t, 2.0 * t));

        let vertices = self.scratch_vertices.reset_to(8);
        for (i, corner) in outer.iter().chain(inner.iter()).enumerate() {
            let uv = [(corner.x - position.x) / size.x, (corner.y - position.y) / size.y];
            vertices[i] = Vertex2D::new((*corner).into(), uv, color);
        }

        let indices = self.scratch_indices.reset_to(24);
        for side in 0..4u32 {
            let next = (side + 1) % 4;
            let (o0, o1, i0, i1) = (side, next, side + 4, next + 4);
            let start = side as usize * 6;
            indices[start..start + 6].copy_from_slice(&[o0, o1, i1, i1, i0, o0]);
        }
        self.submit_scratch(rotation, Self::solid(clip));
    }

    /// Textured quad tinted by `color`
    pub fn add_image(
        &mut self,
        position: Vec2,
        size: Vec2,
        rotation: f32,
        color: Vec4,
        clip: Rect,
        texture: TextureId,
        uv_min: Vec2,
        uv_max: Vec2,
    ) {
        self.write_quad(Self::rect_corners(position, size), uv_min, uv_max, color);
        self.submit_scratch(rotation, DrawState { texture, clip, ..DrawState::default() });
    }

    /// Textured quad drawn with a custom program
    ///
    /// The uniform callback receives `user_data` when the item is drawn.
    pub fn add_image_with_shader(
        &mut self,
        position: Vec2,
        size: Vec2,
        rotation: f32,
        color: Vec4,
        clip: Rect,
        texture: TextureId,
        shader: ProgramId,
        user_data: Option<Rc<dyn Any>>,
    ) {
        self.write_quad(Self::rect_corners(position, size), Vec2::zeros(), Vec2::new(1.0, 1.0), color);
        self.submit_scratch(
            rotation,
            DrawState { shader, texture, clip, user_data, ..DrawState::default() },
        );
    }

    /// Text run; `position` is the top-left of the block
    pub fn add_text(
        &mut self,
        font: &Font,
        text: &str,
        position: Vec2,
        font_size: f32,
        rotation: f32,
        color: Vec4,
        clip: Rect,
    ) {
        let laid_out = text::layout(font, text, position, font_size);
        if laid_out.glyphs.is_empty() {
            return;
        }

        let color: [f32; 4] = color.into();
        let vertices = self.scratch_vertices.reset_to(laid_out.glyphs.len() * 4);
        for (chunk, glyph) in vertices.chunks_exact_mut(4).zip(&laid_out.glyphs) {
            chunk[0] = Vertex2D::new([glyph.min.x, glyph.min.y], [glyph.uv_min.x, glyph.uv_min.y], color);
            chunk[1] = Vertex2D::new([glyph.max.x, glyph.min.y], [glyph.uv_max.x, glyph.uv_min.y], color);
            chunk[2] = Vertex2D::new([glyph.max.x, glyph.max.y], [glyph.uv_max.x, glyph.uv_max.y], color);
            chunk[3] = Vertex2D::new([glyph.min.x, glyph.max.y], [glyph.uv_min.x, glyph.uv_max.y], color);
        }
        let indices = self.scratch_indices.reset_to(laid_out.glyphs.len() * 6);
        for (quad, chunk) in indices.chunks_exact_mut(6).enumerate() {
            let base = quad as u32 * 4;
            chunk.copy_from_slice(&[base, base + 1, base + 2, base + 2, base + 3, base]);
        }

        let state = DrawState {
            texture: font.texture().id(),
            clip,
            is_font: true,
            is_sdf: font.is_sdf(),
            ..DrawState::default()
        };
        self.submit_scratch(rotation, state);
    }

    /// Size a text run would occupy
    pub fn measure_text(&self, font: &Font, text: &str, font_size: f32) -> Vec2 {
        text::layout(font, text, Vec2::zeros(), font_size).size
    }

    fn sync_gpu_buffers(&mut self, device: &mut dyn GraphicsDevice) {
        if self.vertices.capacity() > self.gpu_vertex_capacity {
            log::debug!("Growing 2D vertex buffer to {} vertices", self.vertices.capacity());
            device.buffer_data(self.vertex_buffer, self.vertices.storage_bytes(), BufferUsage::Dynamic);
            self.gpu_vertex_capacity = self.vertices.capacity();
        } else {
            device.buffer_sub_data(self.vertex_buffer, 0, self.vertices.live_bytes());
        }

        if self.indices.capacity() > self.gpu_index_capacity {
            log::debug!("Growing 2D index buffer to {} indices", self.indices.capacity());
            device.buffer_data(self.index_buffer, self.indices.storage_bytes(), BufferUsage::Dynamic);
            self.gpu_index_capacity = self.indices.capacity();
        } else {
            device.buffer_sub_data(self.index_buffer, 0, self.indices.live_bytes());
        }
    }

    fn set_frame_uniforms(&self, device: &mut dyn GraphicsDevice, program: ProgramId, projection: &Mat4) {
        let uniforms = [
            ("uTexture", UniformValue::Int(TEXTURE_UNIT as i32)),
            ("uProjection", UniformValue::Mat4(utils::mat4_to_cols(projection))),
            ("uTime", UniformValue::Float(self.time)),
            (
                "uResolution",
                UniformValue::Vec2([self.viewport.width as f32, self.viewport.height as f32]),
            ),
        ];
        for (name, value) in uniforms {
            if let Some(location) = device.uniform_location(program, name) {
                device.set_uniform(location, value);
            }
        }
    }

    /// Draw everything recorded this frame and reset the counters
    pub fn flush(&mut self, device: &mut dyn GraphicsDevice) {
        if self.items.is_empty() {
            self.last_stats = FlushStats::default();
            return;
        }

        let saved = SavedState::capture(device);
        // Quads wind clockwise under the top-left origin projection
        device.disable(Capability::DepthTest);
        device.disable(Capability::CullFace);
        device.polygon_mode(PolygonMode::Fill);
        device.enable(Capability::Blend);
        device.blend_func(BlendFactor::SrcAlpha, BlendFactor::OneMinusSrcAlpha);
        device.blend_equation(BlendEquation::Add);

        self.sync_gpu_buffers(device);
        device.bind_vertex_array(self.vertex_array);

        let projection = Mat4::orthographic(
            0.0,
            self.viewport.width as f32,
            self.viewport.height as f32,
            0.0,
            -1.0,
            1.0,
        );
        let builtin = self.shader.program();

        let mut current_program = None;
        let mut current_texture = None;
        let mut current_font_flags = None;
        let mut scissor_enabled = saved.scissor_test;
        let mut draw_calls = 0;

        let items = std::mem::take(&mut self.items);
        for item in &items {
            let program = if item.shader.is_none() { builtin } else { item.shader };

            if current_program != Some(program) {
                device.use_program(program);
                self.set_frame_uniforms(device, program, &projection);
                current_program = Some(program);
                current_font_flags = None;
            }

            if program == builtin {
                let flags = (item.is_font, item.is_sdf);
                if current_font_flags != Some(flags) {
                    self.shader.set_int(device, "uIsFont", i32::from(item.is_font));
                    self.shader.set_int(device, "uIsSDF", i32::from(item.is_sdf));
                    current_font_flags = Some(flags);
                }
            } else if let Some(callback) = self.uniform_callback.as_mut() {
                callback(&mut *device, program, item.user_data.as_deref());
            }

            if current_texture != Some(item.texture) {
                device.bind_texture(TEXTURE_UNIT, item.texture);
                current_texture = Some(item.texture);
            }

            let clipped = item.scissor != Viewport::default();
            if clipped {
                if !scissor_enabled {
                    device.enable(Capability::ScissorTest);
                    scissor_enabled = true;
                }
                device.scissor(item.scissor);
            } else if scissor_enabled {
                device.disable(Capability::ScissorTest);
                scissor_enabled = false;
            }

            if item.is_font {
                device.depth_mask(false);
            }
            device.draw_elements(PrimitiveMode::Triangles, item.index_count as u32, item.index_offset);
            draw_calls += 1;
            if item.is_font {
                device.depth_mask(saved.depth_mask);
            }
        }

        device.bind_vertex_array(VertexArrayId::NONE);
        saved.restore(device);

        self.last_stats = FlushStats {
            items: items.len(),
            draw_calls,
            vertices: self.vertices.len(),
            indices: self.indices.len(),
        };

        self.items = items;
        self.items.clear();
        self.vertices.clear();
        self.indices.clear();
    }

    /// Delete GPU objects
    pub fn release(&mut self, device: &mut dyn GraphicsDevice) {
        device.delete_vertex_array(self.vertex_array);
        device.delete_buffer(self.vertex_buffer);
        device.delete_buffer(self.index_buffer);
        self.shader.release(device);
        self.white_texture.release(device);
        self.vertex_array = VertexArrayId::NONE;
        self.vertex_buffer = BufferId::NONE;
        self.index_buffer = BufferId::NONE;
    }
}

/// Triangle fan around vertex 0 over `rim` perimeter vertices (closed)
fn fill_fan(indices: &mut [u32], rim: u32) {
    for (i, chunk) in indices.chunks_exact_mut(3).enumerate() {
        let i = i as u32;
        chunk.copy_from_slice(&[0, 1 + i, 1 + (i + 1) % rim]);
    }
}

/// Quad around the segment `from -> to`
fn line_quad(from: Vec2, to: Vec2, thickness: f32) -> Option<[Vec2; 4]> {
    let direction = to - from;
    let length = direction.norm();
    if length <= f32::EPSILON {
        return None;
    }
    let normal = Vec2::new(-direction.y, direction.x) / length * (thickness * 0.5);
    Some([from + normal, to + normal, to - normal, from - normal])
}

/// Rotate vertices in place about the mean of their positions
fn rotate_about_centroid(vertices: &mut [Vertex2D], degrees: f32) {
    if vertices.is_empty() {
        return;
    }
    let sum = vertices
        .iter()
        .fold(Vec2::zeros(), |acc, v| acc + Vec2::from(v.position));
    let centroid = sum / vertices.len() as f32;
    let (sin, cos) = utils::deg_to_rad(degrees).sin_cos();
    for vertex in vertices {
        let offset = Vec2::from(vertex.position) - centroid;
        let rotated = Vec2::new(offset.x * cos - offset.y * sin, offset.x * sin + offset.y * cos);
        vertex.position = (centroid + rotated).into();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::device::{DeviceCommand, HeadlessDevice};
    use approx::assert_relative_eq;

    const WHITE: Vec4 = Vec4::new(1.0, 1.0, 1.0, 1.0);

    fn setup() -> (HeadlessDevice, Graphics2D) {
        let mut device = HeadlessDevice::new(800, 600);
        let mut graphics = Graphics2D::new(&mut device).expect("graphics2d");
        graphics.begin_frame(Viewport::new(0, 0, 800, 600), 0.0);
        device.clear_commands();
        (device, graphics)
    }

    #[test]
    fn test_empty_flush_touches_nothing() {
        let (mut device, mut graphics) = setup();
        graphics.flush(&mut device);
        assert!(device.commands().is_empty());
        assert_eq!(device.draw_call_count(), 0);
    }

    #[test]
    fn test_line_is_one_quad() {
        let (_, mut graphics) = setup();
        graphics.add_line(Vec2::new(10.0, 10.0), Vec2::new(110.0, 10.0), 2.0, 0.0, WHITE, Rect::NONE);
        assert_eq!(graphics.vertex_count(), 4);
        assert_eq!(graphics.index_count(), 6);
        // Two pixels wide, centered on the segment
        let ys: Vec<f32> = graphics.vertices().iter().map(|v| v.position[1]).collect();
        assert_relative_eq!(ys.iter().cloned().fold(f32::MIN, f32::max), 11.0);
        assert_relative_eq!(ys.iter().cloned().fold(f32::MAX, f32::min), 9.0);
    }

    #[test]
    fn test_rotated_line_turns_about_its_midpoint() {
        let (_, mut graphics) = setup();
        graphics.add_line(Vec2::new(10.0, 10.0), Vec2::new(110.0, 10.0), 2.0, 90.0, WHITE, Rect::NONE);
        let xs: Vec<f32> = graphics.vertices().iter().map(|v| v.position[0]).collect();
        let ys: Vec<f32> = graphics.vertices().iter().map(|v| v.position[1]).collect();
        assert_relative_eq!(xs.iter().cloned().fold(f32::MIN, f32::max), 61.0, epsilon = 1e-3);
        assert_relative_eq!(xs.iter().cloned().fold(f32::MAX, f32::min), 59.0, epsilon = 1e-3);
        assert_relative_eq!(ys.iter().cloned().fold(f32::MIN, f32::max), 60.0, epsilon = 1e-3);
        assert_relative_eq!(ys.iter().cloned().fold(f32::MAX, f32::min), -40.0, epsilon = 1e-3);
    }

    #[test]
    fn test_same_state_rectangles_share_an_item() {
        let (_, mut graphics) = setup();
        graphics.add_rectangle(Vec2::zeros(), Vec2::new(10.0, 10.0), 0.0, WHITE, Rect::NONE);
        graphics.add_rectangle(Vec2::new(20.0, 0.0), Vec2::new(10.0, 10.0), 0.0, WHITE, Rect::NONE);
        assert_eq!(graphics.items().len(), 1);
        assert_eq!(graphics.items()[0].index_count, 12);
        assert_eq!(graphics.items()[0].vertex_size, 8 * std::mem::size_of::<Vertex2D>());
        // Second quad's indices point at its own vertices
        assert_eq!(&graphics.indices()[6..], &[4, 5, 6, 6, 7, 4]);
    }

    #[test]
    fn test_different_clip_rects_split_items() {
        let (_, mut graphics) = setup();
        graphics.add_rectangle(Vec2::zeros(), Vec2::new(10.0, 10.0), 0.0, WHITE, Rect::NONE);
        graphics.add_rectangle(Vec2::zeros(), Vec2::new(10.0, 10.0), 0.0, WHITE, Rect::new(0.0, 0.0, 50.0, 50.0));
        assert_eq!(graphics.items().len(), 2);
        assert_eq!(graphics.items()[1].index_offset, 6 * std::mem::size_of::<u32>());
    }

    #[test]
    fn test_clip_rect_is_flipped_to_gl_scissor() {
        let (_, mut graphics) = setup();
        graphics.add_rectangle(Vec2::zeros(), Vec2::new(10.0, 10.0), 0.0, WHITE, Rect::new(10.0, 20.0, 100.0, 50.0));
        assert_eq!(graphics.items()[0].scissor, Viewport::new(10, 600 - 70, 100, 50));
    }

    #[test]
    fn test_user_data_never_merges() {
        let (_, mut graphics) = setup();
        let program = graphics.builtin_program();
        for _ in 0..2 {
            graphics.add_image_with_shader(
                Vec2::zeros(),
                Vec2::new(4.0, 4.0),
                0.0,
                WHITE,
                Rect::NONE,
                TextureId::NONE,
                program,
                Some(Rc::new(7u32)),
            );
        }
        assert_eq!(graphics.items().len(), 2);
    }

    #[test]
    fn test_rotation_pivots_on_centroid() {
        let (_, mut graphics) = setup();
        graphics.add_rectangle(Vec2::new(0.0, 0.0), Vec2::new(20.0, 10.0), 90.0, WHITE, Rect::NONE);
        let first = graphics.vertices()[0].position;
        // (0,0) relative to centre (10,5) is (-10,-5); rotated 90 degrees -> (5,-10)
        assert_relative_eq!(first[0], 15.0, epsilon = 1e-4);
        assert_relative_eq!(first[1], -5.0, epsilon = 1e-4);
    }

    #[test]
    fn test_flush_restores_state_and_keeps_capacity() {
        let (mut device, mut graphics) = setup();
        device.enable(Capability::DepthTest);
        device.depth_func(DepthFunc::LessEqual);

        for i in 0..400 {
            graphics.add_rectangle(Vec2::new(i as f32, 0.0), Vec2::new(1.0, 1.0), 0.0, WHITE, Rect::NONE);
        }
        let capacity = graphics.capacity();
        assert!(capacity.0 > INITIAL_VERTICES);

        graphics.flush(&mut device);
        assert_eq!(device.draw_call_count(), 1);
        assert!(device.is_enabled(Capability::DepthTest));
        assert!(!device.is_enabled(Capability::Blend));
        assert_eq!(device.current_depth_func(), DepthFunc::LessEqual);
        assert_eq!(graphics.vertex_count(), 0);
        assert_eq!(graphics.items().len(), 0);
        assert_eq!(graphics.capacity(), capacity);

        // GPU storage followed the growth once
        let vbo_allocations = device
            .commands()
            .iter()
            .filter(|c| matches!(c, DeviceCommand::BufferData { .. }))
            .count();
        assert_eq!(vbo_allocations, 2);
    }

    #[test]
    fn test_flush_draws_filled_without_culling() {
        let (mut device, mut graphics) = setup();
        device.enable(Capability::CullFace);
        device.polygon_mode(PolygonMode::Line);
        device.clear_commands();

        graphics.add_rectangle(Vec2::zeros(), Vec2::new(10.0, 10.0), 0.0, WHITE, Rect::NONE);
        graphics.flush(&mut device);

        let commands = device.commands();
        let draw = commands
            .iter()
            .position(|c| matches!(c, DeviceCommand::DrawElements { .. }))
            .expect("draw");
        assert!(commands[..draw].contains(&DeviceCommand::Disable(Capability::CullFace)));
        assert!(commands[..draw].contains(&DeviceCommand::PolygonMode(PolygonMode::Fill)));

        assert!(device.is_enabled(Capability::CullFace));
        assert_eq!(device.current_polygon_mode(), PolygonMode::Line);
    }

    #[test]
    fn test_state_switches_only_on_change() {
        let (mut device, mut graphics) = setup();
        let texture = device
            .create_texture_2d(2, 2, crate::render::device::TextureFormat::Rgba8, None, crate::render::device::TextureFilter::Nearest)
            .expect("texture");
        graphics.add_rectangle(Vec2::zeros(), Vec2::new(1.0, 1.0), 0.0, WHITE, Rect::NONE);
        graphics.add_rectangle(Vec2::zeros(), Vec2::new(1.0, 1.0), 0.0, WHITE, Rect::new(0.0, 0.0, 5.0, 5.0));
        graphics.add_image(Vec2::zeros(), Vec2::new(1.0, 1.0), 0.0, WHITE, Rect::new(0.0, 0.0, 5.0, 5.0), texture, Vec2::zeros(), Vec2::new(1.0, 1.0));
        graphics.flush(&mut device);

        let count = |wanted: fn(&DeviceCommand) -> bool| device.commands().iter().filter(|c| wanted(c)).count();
        assert_eq!(device.draw_call_count(), 3);
        assert_eq!(count(|c| matches!(c, DeviceCommand::UseProgram(_))), 1);
        assert_eq!(count(|c| matches!(c, DeviceCommand::BindTexture { .. })), 2);
        assert_eq!(count(|c| matches!(c, DeviceCommand::Enable(Capability::ScissorTest))), 1);
    }

    #[test]
    fn test_font_draws_disable_depth_writes() {
        let (mut device, mut graphics) = setup();
        let font = text::tests::test_font(&mut device);
        graphics.add_text(&font, "la", Vec2::new(5.0, 5.0), 32.0, 0.0, WHITE, Rect::NONE);
        assert!(graphics.items()[0].is_font);
        assert_eq!(graphics.vertex_count(), 8);

        graphics.flush(&mut device);
        let commands = device.commands();
        let draw = commands
            .iter()
            .position(|c| matches!(c, DeviceCommand::DrawElements { .. }))
            .expect("draw");
        assert_eq!(commands[draw - 1], DeviceCommand::DepthMask(false));
        assert_eq!(commands[draw + 1], DeviceCommand::DepthMask(true));
        assert_eq!(
            device.uniform_value(graphics.builtin_program(), "uIsFont"),
            Some(UniformValue::Int(1))
        );
    }

    #[test]
    fn test_custom_shader_invokes_callback() {
        use std::cell::Cell;

        let (mut device, mut graphics) = setup();
        let custom = device
            .create_program("uniform float uTime;\nvoid main() {}", "uniform float uGlow;\nvoid main() {}")
            .expect("program");
        let seen = Rc::new(Cell::new(0u32));
        let sink = Rc::clone(&seen);
        graphics.set_uniform_callback(Box::new(move |_, program, data| {
            assert_eq!(program, custom);
            if let Some(value) = data.and_then(|d| d.downcast_ref::<u32>()) {
                sink.set(sink.get() + value);
            }
        }));

        graphics.add_image_with_shader(
            Vec2::zeros(),
            Vec2::new(4.0, 4.0),
            0.0,
            WHITE,
            Rect::NONE,
            TextureId::NONE,
            custom,
            Some(Rc::new(5u32)),
        );
        graphics.begin_frame(Viewport::new(0, 0, 800, 600), 1.5);
        graphics.flush(&mut device);
        assert_eq!(seen.get(), 5);
        assert_eq!(device.uniform_value(custom, "uTime"), Some(UniformValue::Float(1.5)));
    }
}
