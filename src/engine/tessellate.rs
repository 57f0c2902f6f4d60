//! Triangle meshes for every [`MeshGeometry`].
//!
//! Builders emit indexed triangle lists with per-vertex normals and texture
//! coordinates. Vertex counts match [`MeshGeometry::vertex_count`].

use crate::engine::import::ImportedMesh;
use crate::engine::mesh::{Aabb, MeshGeometry};
use glam::Vec3;
use std::f32::consts::{PI, TAU};

pub const CYLINDER_TESSELLATION: usize = 24;
pub const TORUS_TESSELLATION: usize = 16;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub uvs: Vec<[f32; 2]>,
    pub indices: Vec<u32>,
}

impl MeshData {
    fn push(&mut self, position: Vec3, normal: Vec3, uv: [f32; 2]) -> u32 {
        let index = self.positions.len() as u32;
        self.positions.push(position);
        self.normals.push(normal);
        self.uvs.push(uv);
        index
    }

    fn quad(&mut self, a: u32, b: u32, c: u32, d: u32) {
        self.indices.extend_from_slice(&[a, b, c, a, c, d]);
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn bounds(&self) -> Aabb {
        Aabb::from_points(&self.positions)
    }
}

impl MeshGeometry {
    pub fn tessellate(&self) -> MeshData {
        match self {
            MeshGeometry::Box { size } => box_mesh(*size),
            MeshGeometry::Sphere { diameter, segments } => sphere_mesh(*diameter, *segments),
            MeshGeometry::Cylinder { height, diameter } => cylinder_mesh(*height, *diameter),
            MeshGeometry::Torus {
                diameter,
                thickness,
            } => torus_mesh(*diameter, *thickness),
            MeshGeometry::Ground { width, height } => ground_mesh(*width, *height),
            MeshGeometry::Plane { width, height } => plane_mesh(*width, *height),
            MeshGeometry::Imported(mesh) => imported_mesh(mesh),
            MeshGeometry::Node => MeshData::default(),
        }
    }
}

fn box_mesh(size: f32) -> MeshData {
    let half = size * 0.5;
    // (outward normal, u axis, v axis) with u x v == normal.
    let faces = [
        (Vec3::Z, Vec3::X, Vec3::Y),
        (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
        (Vec3::X, Vec3::NEG_Z, Vec3::Y),
        (Vec3::NEG_X, Vec3::Z, Vec3::Y),
        (Vec3::Y, Vec3::X, Vec3::NEG_Z),
        (Vec3::NEG_Y, Vec3::X, Vec3::Z),
    ];
    let mut data = MeshData::default();
    for (normal, u, v) in faces {
        let center = normal * half;
        let a = data.push(center - (u + v) * half, normal, [0.0, 1.0]);
        let b = data.push(center + (u - v) * half, normal, [1.0, 1.0]);
        let c = data.push(center + (u + v) * half, normal, [1.0, 0.0]);
        let d = data.push(center + (v - u) * half, normal, [0.0, 0.0]);
        data.quad(a, b, c, d);
    }
    data
}

fn sphere_mesh(diameter: f32, segments: u32) -> MeshData {
    let rings = segments.max(2) as usize;
    let slices = rings * 2;
    let radius = diameter * 0.5;
    let mut data = MeshData::default();
    for ring in 0..=rings {
        let theta = PI * ring as f32 / rings as f32;
        for slice in 0..=slices {
            let phi = TAU * slice as f32 / slices as f32;
            let normal = Vec3::new(theta.sin() * phi.cos(), theta.cos(), theta.sin() * phi.sin());
            data.push(
                normal * radius,
                normal,
                [slice as f32 / slices as f32, ring as f32 / rings as f32],
            );
        }
    }
    let stride = (slices + 1) as u32;
    for ring in 0..rings as u32 {
        for slice in 0..slices as u32 {
            let a = ring * stride + slice;
            let b = a + stride;
            data.indices.extend_from_slice(&[a, b, a + 1, a + 1, b, b + 1]);
        }
    }
    data
}

fn cylinder_mesh(height: f32, diameter: f32) -> MeshData {
    let radius = diameter * 0.5;
    let half = height * 0.5;
    let steps = CYLINDER_TESSELLATION;
    let mut data = MeshData::default();

    for step in 0..=steps {
        let angle = TAU * step as f32 / steps as f32;
        let normal = Vec3::new(angle.cos(), 0.0, angle.sin());
        let u = step as f32 / steps as f32;
        data.push(normal * radius - Vec3::Y * half, normal, [u, 1.0]);
        data.push(normal * radius + Vec3::Y * half, normal, [u, 0.0]);
    }
    for step in 0..steps as u32 {
        let (bottom, top) = (step * 2, step * 2 + 1);
        data.quad(bottom, top, top + 2, bottom + 2);
    }

    for (normal, y) in [(Vec3::Y, half), (Vec3::NEG_Y, -half)] {
        let first = data.positions.len() as u32;
        for step in 0..=steps {
            let angle = TAU * step as f32 / steps as f32;
            let (sin, cos) = angle.sin_cos();
            data.push(
                Vec3::new(cos * radius, y, sin * radius),
                normal,
                [0.5 + 0.5 * cos, 0.5 + 0.5 * sin],
            );
        }
        // The ring's last vertex repeats the first, so the fan stops short.
        for step in 1..steps as u32 - 1 {
            data.indices
                .extend_from_slice(&[first, first + step, first + step + 1]);
        }
    }
    data
}

fn torus_mesh(diameter: f32, thickness: f32) -> MeshData {
    let ring_radius = diameter * 0.5;
    let tube_radius = thickness * 0.5;
    let steps = TORUS_TESSELLATION;
    let mut data = MeshData::default();
    for i in 0..=steps {
        let u = TAU * i as f32 / steps as f32;
        let center = Vec3::new(u.cos(), 0.0, u.sin()) * ring_radius;
        for j in 0..=steps {
            let v = TAU * j as f32 / steps as f32;
            let normal = Vec3::new(v.cos() * u.cos(), v.sin(), v.cos() * u.sin());
            data.push(
                center + normal * tube_radius,
                normal,
                [i as f32 / steps as f32, j as f32 / steps as f32],
            );
        }
    }
    let stride = (steps + 1) as u32;
    for i in 0..steps as u32 {
        for j in 0..steps as u32 {
            let a = i * stride + j;
            let b = a + stride;
            data.quad(a, b, b + 1, a + 1);
        }
    }
    data
}

fn ground_mesh(width: f32, depth: f32) -> MeshData {
    let (hx, hz) = (width * 0.5, depth * 0.5);
    let mut data = MeshData::default();
    let a = data.push(Vec3::new(-hx, 0.0, -hz), Vec3::Y, [0.0, 1.0]);
    let b = data.push(Vec3::new(-hx, 0.0, hz), Vec3::Y, [0.0, 0.0]);
    let c = data.push(Vec3::new(hx, 0.0, hz), Vec3::Y, [1.0, 0.0]);
    let d = data.push(Vec3::new(hx, 0.0, -hz), Vec3::Y, [1.0, 1.0]);
    data.quad(a, b, c, d);
    data
}

/// Faces -Z.
fn plane_mesh(width: f32, height: f32) -> MeshData {
    let (hx, hy) = (width * 0.5, height * 0.5);
    let mut data = MeshData::default();
    let a = data.push(Vec3::new(-hx, -hy, 0.0), Vec3::NEG_Z, [0.0, 1.0]);
    let b = data.push(Vec3::new(-hx, hy, 0.0), Vec3::NEG_Z, [0.0, 0.0]);
    let c = data.push(Vec3::new(hx, hy, 0.0), Vec3::NEG_Z, [1.0, 0.0]);
    let d = data.push(Vec3::new(hx, -hy, 0.0), Vec3::NEG_Z, [1.0, 1.0]);
    data.quad(a, b, c, d);
    data
}

fn imported_mesh(mesh: &ImportedMesh) -> MeshData {
    let count = mesh.positions.len();
    let indices: Vec<u32> = if mesh.indices.is_empty() {
        (0..(count - count % 3) as u32).collect()
    } else {
        mesh.indices
            .chunks_exact(3)
            .filter(|tri| tri.iter().all(|&index| (index as usize) < count))
            .flatten()
            .copied()
            .collect()
    };
    let normals = if mesh.normals.len() == count {
        mesh.normals.clone()
    } else {
        smooth_normals(&mesh.positions, &indices)
    };
    let uvs = if mesh.uvs.len() == count {
        mesh.uvs.clone()
    } else {
        vec![[0.0, 0.0]; count]
    };
    MeshData {
        positions: mesh.positions.clone(),
        normals,
        uvs,
        indices,
    }
}

/// Area-weighted vertex normals; isolated vertices point up.
fn smooth_normals(positions: &[Vec3], indices: &[u32]) -> Vec<Vec3> {
    let mut normals = vec![Vec3::ZERO; positions.len()];
    for tri in indices.chunks_exact(3) {
        let [a, b, c] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
        let face = (positions[b] - positions[a]).cross(positions[c] - positions[a]);
        normals[a] += face;
        normals[b] += face;
        normals[c] += face;
    }
    normals
        .into_iter()
        .map(|normal| normal.try_normalize().unwrap_or(Vec3::Y))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn primitives() -> Vec<MeshGeometry> {
        vec![
            MeshGeometry::Box { size: 1.5 },
            MeshGeometry::Sphere {
                diameter: 2.0,
                segments: 32,
            },
            MeshGeometry::Cylinder {
                height: 2.0,
                diameter: 2.0,
            },
            MeshGeometry::Torus {
                diameter: 3.0,
                thickness: 0.7,
            },
            MeshGeometry::Ground {
                width: 20.0,
                height: 20.0,
            },
            MeshGeometry::Plane {
                width: 12.0,
                height: 6.0,
            },
        ]
    }

    #[test]
    fn test_tessellation_matches_declared_bounds() {
        for geometry in primitives() {
            let data = geometry.tessellate();
            let declared = geometry.local_bounds();
            let built = data.bounds();
            assert!(
                (built.min - declared.min).abs().max_element() < 1e-4
                    && (built.max - declared.max).abs().max_element() < 1e-4,
                "{geometry:?}: {built:?} vs {declared:?}"
            );
        }
    }

    #[test]
    fn test_vertex_counts_and_indices_are_consistent() {
        for geometry in primitives() {
            let data = geometry.tessellate();
            assert_eq!(data.positions.len(), geometry.vertex_count(), "{geometry:?}");
            assert_eq!(data.normals.len(), data.positions.len());
            assert_eq!(data.uvs.len(), data.positions.len());
            assert_eq!(data.indices.len() % 3, 0);
            assert!(data
                .indices
                .iter()
                .all(|&index| (index as usize) < data.positions.len()));
            assert!(data.triangle_count() > 0);
        }
    }

    #[test]
    fn test_sphere_normals_point_outward() {
        let data = MeshGeometry::Sphere {
            diameter: 2.0,
            segments: 8,
        }
        .tessellate();
        for (position, normal) in data.positions.iter().zip(&data.normals) {
            assert!((*position - *normal).length() < 1e-5);
        }
    }

    #[test]
    fn test_imported_mesh_without_normals_gets_face_normals() {
        let mesh = ImportedMesh {
            name: "tri".to_string(),
            positions: vec![Vec3::ZERO, Vec3::X, Vec3::Y],
            indices: vec![0, 1, 2, 0, 1, 9],
            ..Default::default()
        };
        let data = MeshGeometry::Imported(mesh).tessellate();
        assert_eq!(data.indices, vec![0, 1, 2]);
        assert!(data.normals.iter().all(|normal| *normal == Vec3::Z));
        assert_eq!(data.uvs.len(), 3);
    }

    #[test]
    fn test_node_has_no_triangles() {
        assert!(MeshGeometry::Node.tessellate().is_empty());
    }
}
