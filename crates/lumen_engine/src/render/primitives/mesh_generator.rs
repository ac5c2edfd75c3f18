//! Procedural primitive generation
//!
//! Every generator returns a CPU-side [`Mesh`]; call [`Mesh::generate`] to
//! upload it. All shapes are centered on the origin, use counter-clockwise
//! front faces and a right-handed, Y-up frame.

use super::mesh::{Mesh, Vertex};
use crate::foundation::math::{constants::PI, Vec3};

/// Namespace for procedural mesh constructors
pub struct MeshGenerator;

impl MeshGenerator {
    /// Unit cube (edge length 1) with per-face normals
    ///
    /// 24 vertices (4 per face) and 36 indices.
    pub fn cube() -> Mesh {
        // (normal, tangent u, tangent v) per face; u x v == normal
        let faces: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
            ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),   // front
            ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]), // back
            ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),  // right
            ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),  // left
            ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),  // top
            ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),  // bottom
        ];

        let mut vertices = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);

        for (normal, u, v) in faces {
            let n = Vec3::from(normal);
            let u = Vec3::from(u);
            let v = Vec3::from(v);
            let base = vertices.len() as u32;

            for (su, sv) in [(-0.5, -0.5), (0.5, -0.5), (0.5, 0.5), (-0.5, 0.5)] {
                let p = n * 0.5 + u * su + v * sv;
                vertices.push(Vertex::new(p.into(), normal, [su + 0.5, sv + 0.5]));
            }
            indices.extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 3, base]);
        }

        Mesh::new(vertices, Some(indices))
    }

    /// Horizontal plane on XZ facing +Y, split into `subdivisions` cells per side
    pub fn plane(size: f32, subdivisions: u32) -> Mesh {
        let cells = subdivisions.max(1);
        let heights = vec![0.0; ((cells + 1) * (cells + 1)) as usize];
        Self::grid(size, size, cells, cells, &heights, false)
    }

    /// Vertical unit quad on XY facing +Z
    pub fn quad() -> Mesh {
        let normal = [0.0, 0.0, 1.0];
        let vertices = vec![
            Vertex::new([-0.5, -0.5, 0.0], normal, [0.0, 0.0]),
            Vertex::new([0.5, -0.5, 0.0], normal, [1.0, 0.0]),
            Vertex::new([0.5, 0.5, 0.0], normal, [1.0, 1.0]),
            Vertex::new([-0.5, 0.5, 0.0], normal, [0.0, 1.0]),
        ];
        Mesh::new(vertices, Some(vec![0, 1, 2, 2, 3, 0]))
    }

    /// UV sphere
    pub fn sphere(radius: f32, segments: u32, rings: u32) -> Mesh {
        let segments = segments.max(3);
        let rings = rings.max(2);

        let mut vertices = Vec::with_capacity(((segments + 1) * (rings + 1)) as usize);
        for ring in 0..=rings {
            let v = ring as f32 / rings as f32;
            let theta = v * PI;
            for segment in 0..=segments {
                let u = segment as f32 / segments as f32;
                let phi = u * 2.0 * PI;
                let normal = Vec3::new(theta.sin() * phi.cos(), theta.cos(), -theta.sin() * phi.sin());
                vertices.push(Vertex::new((normal * radius).into(), normal.into(), [u, 1.0 - v]));
            }
        }

        let stride = segments + 1;
        let mut indices = Vec::with_capacity((segments * rings * 6) as usize);
        for ring in 0..rings {
            for segment in 0..segments {
                let a = ring * stride + segment;
                let b = a + stride;
                indices.extend_from_slice(&[a, b, a + 1, a + 1, b, b + 1]);
            }
        }

        Mesh::new(vertices, Some(indices))
    }

    /// Heightmap grid on XZ
    ///
    /// `heights` holds `(cells_x + 1) * (cells_z + 1)` samples in row-major
    /// order (x fastest). Normals are accumulated from the adjacent triangles.
    pub fn terrain(width: f32, depth: f32, cells_x: u32, cells_z: u32, heights: &[f32]) -> Mesh {
        Self::grid(width, depth, cells_x.max(1), cells_z.max(1), heights, true)
    }

    fn grid(width: f32, depth: f32, cells_x: u32, cells_z: u32, heights: &[f32], smooth: bool) -> Mesh {
        let columns = cells_x + 1;
        let rows = cells_z + 1;
        let expected = (columns * rows) as usize;
        if heights.len() != expected {
            log::warn!(
                "Heightmap has {} samples, expected {}; missing samples are flat",
                heights.len(),
                expected
            );
        }

        let mut vertices = Vec::with_capacity(expected);
        for z in 0..rows {
            for x in 0..columns {
                let u = x as f32 / cells_x as f32;
                let v = z as f32 / cells_z as f32;
                let height = heights.get((z * columns + x) as usize).copied().unwrap_or(0.0);
                vertices.push(Vertex::new(
                    [(u - 0.5) * width, height, (v - 0.5) * depth],
                    [0.0, 1.0, 0.0],
                    [u, v],
                ));
            }
        }

        let mut indices = Vec::with_capacity((cells_x * cells_z * 6) as usize);
        for z in 0..cells_z {
            for x in 0..cells_x {
                let a = z * columns + x;
                let b = a + columns;
                // Counter-clockwise seen from +Y
                indices.extend_from_slice(&[a, b, a + 1, a + 1, b, b + 1]);
            }
        }

        if smooth {
            Self::compute_normals(&mut vertices, &indices);
        }

        Mesh::new(vertices, Some(indices))
    }

    /// Area-weighted vertex normals from triangle faces
    pub fn compute_normals(vertices: &mut [Vertex], indices: &[u32]) {
        let mut accumulated = vec![Vec3::zeros(); vertices.len()];

        for triangle in indices.chunks_exact(3) {
            let [a, b, c] = [triangle[0] as usize, triangle[1] as usize, triangle[2] as usize];
            if a >= vertices.len() || b >= vertices.len() || c >= vertices.len() {
                continue;
            }
            let pa = Vec3::from(vertices[a].position);
            let pb = Vec3::from(vertices[b].position);
            let pc = Vec3::from(vertices[c].position);
            let face = (pb - pa).cross(&(pc - pa));
            accumulated[a] += face;
            accumulated[b] += face;
            accumulated[c] += face;
        }

        for (vertex, normal) in vertices.iter_mut().zip(accumulated) {
            if normal.norm_squared() > f32::EPSILON {
                vertex.normal = normal.normalize().into();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_cube_is_unit_sized() {
        let cube = MeshGenerator::cube();
        assert_eq!(cube.vertices().len(), 24);
        assert_eq!(cube.indices().len(), 36);
        assert_relative_eq!(cube.bounds().min, Vec3::repeat(-0.5));
        assert_relative_eq!(cube.bounds().max, Vec3::repeat(0.5));
    }

    #[test]
    fn test_cube_faces_wind_outward() {
        let cube = MeshGenerator::cube();
        for triangle in cube.indices().chunks_exact(3) {
            let v: Vec<Vec3> = triangle
                .iter()
                .map(|&i| Vec3::from(cube.vertices()[i as usize].position))
                .collect();
            let face = (v[1] - v[0]).cross(&(v[2] - v[0]));
            let normal = Vec3::from(cube.vertices()[triangle[0] as usize].normal);
            assert!(face.dot(&normal) > 0.0);
        }
    }

    #[test]
    fn test_plane_subdivision_counts() {
        let plane = MeshGenerator::plane(10.0, 4);
        assert_eq!(plane.vertices().len(), 25);
        assert_eq!(plane.indices().len(), 4 * 4 * 6);
        assert_relative_eq!(plane.bounds().extents(), Vec3::new(5.0, 0.0, 5.0));
    }

    #[test]
    fn test_sphere_vertices_lie_on_radius() {
        let sphere = MeshGenerator::sphere(2.0, 16, 8);
        for vertex in sphere.vertices() {
            assert_relative_eq!(Vec3::from(vertex.position).norm(), 2.0, epsilon = 1e-4);
        }
    }

    #[test]
    fn test_sloped_terrain_normals_tilt() {
        // Height rises along +x, so normals lean towards -x
        let heights: Vec<f32> = (0..9).map(|i| (i % 3) as f32).collect();
        let terrain = MeshGenerator::terrain(2.0, 2.0, 2, 2, &heights);
        for vertex in terrain.vertices() {
            assert!(vertex.normal[0] < 0.0);
            assert!(vertex.normal[1] > 0.0);
        }
    }
}
