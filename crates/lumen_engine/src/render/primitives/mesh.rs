//! Mesh representation for 3D models
//!
//! A [`Mesh`] owns its CPU-side geometry and, once generated, the GPU buffer
//! objects holding it. Vertex attributes live at fixed shader locations:
//! position = 0, normal = 1, uv = 2.

use bytemuck::{Pod, Zeroable};

use super::bounds::BoundingBox;
use crate::foundation::math::Vec3;
use crate::render::device::{
    BufferId, BufferTarget, BufferUsage, GraphicsDevice, PrimitiveMode, VertexArrayId,
    VertexAttribute, VertexLayout,
};

/// Attribute location of the vertex position
pub const POSITION_LOCATION: u32 = 0;
/// Attribute location of the vertex normal
pub const NORMAL_LOCATION: u32 = 1;
/// Attribute location of the texture coordinate
pub const UV_LOCATION: u32 = 2;

/// Vertex with position, normal and texture coordinate
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct Vertex {
    /// Position in object space
    pub position: [f32; 3],

    /// Normal vector
    pub normal: [f32; 3],

    /// Texture coordinates
    pub uv: [f32; 2],
}

impl Vertex {
    /// Create a new vertex
    pub fn new(position: [f32; 3], normal: [f32; 3], uv: [f32; 2]) -> Self {
        Self { position, normal, uv }
    }

    /// Interleaved layout for GPU upload
    pub fn layout() -> VertexLayout {
        VertexLayout {
            stride: std::mem::size_of::<Vertex>(),
            attributes: vec![
                VertexAttribute { location: POSITION_LOCATION, components: 3, offset: 0 },
                VertexAttribute { location: NORMAL_LOCATION, components: 3, offset: 12 },
                VertexAttribute { location: UV_LOCATION, components: 2, offset: 24 },
            ],
        }
    }
}

/// GPU objects backing a generated mesh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshBuffers {
    /// Vertex array object
    pub vertex_array: VertexArrayId,
    /// Vertex buffer
    pub vertex_buffer: BufferId,
    /// Index buffer
    pub index_buffer: BufferId,
    /// Vertices currently uploaded
    pub vertex_count: usize,
    /// Indices currently uploaded
    pub index_count: usize,
}

/// Geometry plus its GPU buffers and bounds
#[derive(Debug, Clone)]
pub struct Mesh {
    vertices: Vec<Vertex>,
    indices: Vec<u32>,
    bounds: BoundingBox,
    buffers: Option<MeshBuffers>,
}

impl Mesh {
    /// Create a mesh from vertices and an optional index list
    ///
    /// Without indices the vertices are drawn in order as a triangle list.
    pub fn new(vertices: Vec<Vertex>, indices: Option<Vec<u32>>) -> Self {
        let indices = indices.unwrap_or_else(|| (0..vertices.len() as u32).collect());
        let mut mesh = Self {
            vertices,
            indices,
            bounds: BoundingBox::empty(),
            buffers: None,
        };
        mesh.recalculate_bounds();
        mesh
    }

    /// Vertex data
    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    /// Index data
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// Object-space bounds
    pub fn bounds(&self) -> &BoundingBox {
        &self.bounds
    }

    /// GPU buffers, once generated
    pub fn buffers(&self) -> Option<&MeshBuffers> {
        self.buffers.as_ref()
    }

    /// Replace the geometry; takes effect on the GPU at the next [`generate`](Self::generate)
    pub fn set_geometry(&mut self, vertices: Vec<Vertex>, indices: Option<Vec<u32>>) {
        self.indices = indices.unwrap_or_else(|| (0..vertices.len() as u32).collect());
        self.vertices = vertices;
    }

    /// Mutable access to vertices; call [`generate`](Self::generate) afterwards
    pub fn vertices_mut(&mut self) -> &mut [Vertex] {
        &mut self.vertices
    }

    /// Upload the geometry
    ///
    /// The first call allocates the buffers and wires the vertex layout.
    /// Later calls overwrite in place when the element count is unchanged and
    /// reallocate otherwise. Bounds are rebuilt from the vertex positions.
    pub fn generate(&mut self, device: &mut dyn GraphicsDevice) {
        let vertex_bytes: &[u8] = bytemuck::cast_slice(&self.vertices);
        let index_bytes: &[u8] = bytemuck::cast_slice(&self.indices);

        match self.buffers.as_mut() {
            None => {
                let vertex_buffer = device.create_buffer(BufferTarget::Vertex);
                device.buffer_data(vertex_buffer, vertex_bytes, BufferUsage::Static);
                let index_buffer = device.create_buffer(BufferTarget::Index);
                device.buffer_data(index_buffer, index_bytes, BufferUsage::Static);
                let vertex_array =
                    device.create_vertex_array(vertex_buffer, Some(index_buffer), &Vertex::layout());

                self.buffers = Some(MeshBuffers {
                    vertex_array,
                    vertex_buffer,
                    index_buffer,
                    vertex_count: self.vertices.len(),
                    index_count: self.indices.len(),
                });
            }
            Some(buffers) => {
                if buffers.vertex_count == self.vertices.len() {
                    device.buffer_sub_data(buffers.vertex_buffer, 0, vertex_bytes);
                } else {
                    device.buffer_data(buffers.vertex_buffer, vertex_bytes, BufferUsage::Static);
                    buffers.vertex_count = self.vertices.len();
                }

                if buffers.index_count == self.indices.len() {
                    device.buffer_sub_data(buffers.index_buffer, 0, index_bytes);
                } else {
                    device.buffer_data(buffers.index_buffer, index_bytes, BufferUsage::Static);
                    buffers.index_count = self.indices.len();
                }
            }
        }

        self.recalculate_bounds();
    }

    /// Rebuild bounds from the current vertex positions
    pub fn recalculate_bounds(&mut self) {
        self.bounds.clear();
        for vertex in &self.vertices {
            self.bounds.grow(Vec3::from(vertex.position));
        }
    }

    /// Issue the indexed draw; returns `false` if the mesh was never generated
    pub fn draw(&self, device: &mut dyn GraphicsDevice, mode: PrimitiveMode) -> bool {
        let Some(buffers) = self.buffers else {
            return false;
        };
        if buffers.index_count == 0 {
            return false;
        }
        device.bind_vertex_array(buffers.vertex_array);
        device.draw_elements(mode, buffers.index_count as u32, 0);
        true
    }

    /// Delete the GPU objects, keeping the CPU geometry
    pub fn release(&mut self, device: &mut dyn GraphicsDevice) {
        if let Some(buffers) = self.buffers.take() {
            device.delete_vertex_array(buffers.vertex_array);
            device.delete_buffer(buffers.vertex_buffer);
            device.delete_buffer(buffers.index_buffer);
        }
    }
}
