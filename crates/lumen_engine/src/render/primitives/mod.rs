//! Core primitive types for rendering
//!
//! This module contains fundamental data structures used throughout
//! the rendering system: meshes and their generators, bounding volumes,
//! the view frustum and the camera.

pub mod bounds;
pub mod camera;
pub mod frustum;
pub mod mesh;
pub mod mesh_generator;

// Re-export commonly used types
pub use bounds::{BoundingBox, Ray};
pub use camera::Camera;
pub use frustum::{Frustum, FrustumPlane};
pub use mesh::{Mesh, MeshBuffers, Vertex};
pub use mesh_generator::MeshGenerator;
