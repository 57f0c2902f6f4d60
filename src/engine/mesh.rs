use crate::engine::import::ImportedMesh;
use crate::engine::tessellate::{CYLINDER_TESSELLATION, TORUS_TESSELLATION};
use crate::engine::{Entity, MaterialId};
use glam::{EulerRot, Mat4, Quat, Vec3};

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub const EMPTY: Self = Self {
        min: Vec3::ZERO,
        max: Vec3::ZERO,
    };

    pub fn from_extent(half: Vec3) -> Self {
        Self {
            min: -half,
            max: half,
        }
    }

    pub fn from_points(points: &[Vec3]) -> Self {
        let Some(first) = points.first() else {
            return Self::EMPTY;
        };
        let mut bounds = Self {
            min: *first,
            max: *first,
        };
        for point in &points[1..] {
            bounds.min = bounds.min.min(*point);
            bounds.max = bounds.max.max(*point);
        }
        bounds
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn transformed(&self, matrix: &Mat4) -> Aabb {
        let corners = [
            Vec3::new(self.min.x, self.min.y, self.min.z),
            Vec3::new(self.max.x, self.min.y, self.min.z),
            Vec3::new(self.min.x, self.max.y, self.min.z),
            Vec3::new(self.max.x, self.max.y, self.min.z),
            Vec3::new(self.min.x, self.min.y, self.max.z),
            Vec3::new(self.max.x, self.min.y, self.max.z),
            Vec3::new(self.min.x, self.max.y, self.max.z),
            Vec3::new(self.max.x, self.max.y, self.max.z),
        ];
        let moved: Vec<Vec3> = corners
            .iter()
            .map(|corner| matrix.transform_point3(*corner))
            .collect();
        Aabb::from_points(&moved)
    }
}

/// What produced a mesh's vertex data.
#[derive(Debug, Clone, PartialEq)]
pub enum MeshGeometry {
    Box { size: f32 },
    Sphere { diameter: f32, segments: u32 },
    Cylinder { height: f32, diameter: f32 },
    Torus { diameter: f32, thickness: f32 },
    Ground { width: f32, height: f32 },
    Plane { width: f32, height: f32 },
    Imported(ImportedMesh),
    /// Empty transform node (import roots, skybox parents).
    Node,
}

impl MeshGeometry {
    pub fn local_bounds(&self) -> Aabb {
        match self {
            MeshGeometry::Box { size } => Aabb::from_extent(Vec3::splat(size * 0.5)),
            MeshGeometry::Sphere { diameter, .. } => Aabb::from_extent(Vec3::splat(diameter * 0.5)),
            MeshGeometry::Cylinder { height, diameter } => {
                Aabb::from_extent(Vec3::new(diameter * 0.5, height * 0.5, diameter * 0.5))
            }
            MeshGeometry::Torus {
                diameter,
                thickness,
            } => {
                let outer = diameter * 0.5 + thickness * 0.5;
                Aabb::from_extent(Vec3::new(outer, thickness * 0.5, outer))
            }
            MeshGeometry::Ground { width, height } => {
                Aabb::from_extent(Vec3::new(width * 0.5, 0.0, height * 0.5))
            }
            MeshGeometry::Plane { width, height } => {
                Aabb::from_extent(Vec3::new(width * 0.5, height * 0.5, 0.0))
            }
            MeshGeometry::Imported(mesh) => Aabb::from_points(&mesh.positions),
            MeshGeometry::Node => Aabb::EMPTY,
        }
    }

    /// Vertex count of the builder's tessellation.
    pub fn vertex_count(&self) -> usize {
        match self {
            MeshGeometry::Box { .. } => 24,
            MeshGeometry::Sphere { segments, .. } => {
                let segments = *segments as usize;
                (segments + 1) * (2 * segments + 1)
            }
            MeshGeometry::Cylinder { .. } => 4 * (CYLINDER_TESSELLATION + 1),
            MeshGeometry::Torus { .. } => (TORUS_TESSELLATION + 1) * (TORUS_TESSELLATION + 1),
            MeshGeometry::Ground { .. } | MeshGeometry::Plane { .. } => 4,
            MeshGeometry::Imported(mesh) => mesh.positions.len(),
            MeshGeometry::Node => 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Mesh {
    pub name: String,
    pub geometry: MeshGeometry,
    pub position: Vec3,
    pub rotation: Vec3,
    pub scaling: Vec3,
    pub parent: Option<Entity>,
    pub receive_shadows: bool,
    pub material: Option<MaterialId>,
    pub infinite_distance: bool,
}

impl Mesh {
    pub fn new(name: &str, geometry: MeshGeometry) -> Self {
        Self {
            name: name.to_string(),
            geometry,
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scaling: Vec3::ONE,
            parent: None,
            receive_shadows: false,
            material: None,
            infinite_distance: false,
        }
    }

    pub fn local_matrix(&self) -> Mat4 {
        let rotation = Quat::from_euler(
            EulerRot::YXZ,
            self.rotation.y,
            self.rotation.x,
            self.rotation.z,
        );
        Mat4::from_scale_rotation_translation(self.scaling, rotation, self.position)
    }

    pub fn vertex_count(&self) -> usize {
        self.geometry.vertex_count()
    }
}
