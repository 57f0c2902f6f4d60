//! GPU-side data layouts. Every struct here mirrors a WGSL struct in
//! `shaders.rs` field for field.

use crate::engine::frame::{DrawItem, FrameSnapshot, Shading, MAX_POINT_LIGHTS};
use crate::engine::tessellate::MeshData;
use glam::Mat4;

#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex {
    const ATTRIBUTES: [wgpu::VertexAttribute; 3] =
        wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3, 2 => Float32x2];

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBUTES,
        }
    }
}

pub fn vertices(data: &MeshData) -> Vec<Vertex> {
    data.positions
        .iter()
        .zip(&data.normals)
        .zip(&data.uvs)
        .map(|((position, normal), uv)| Vertex {
            position: position.to_array(),
            normal: normal.to_array(),
            uv: *uv,
        })
        .collect()
}

#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct FrameUniform {
    pub view_proj: [[f32; 4]; 4],
    pub inv_view_proj: [[f32; 4]; 4],
    pub light_view_proj: [[f32; 4]; 4],
    pub camera_position: [f32; 4],
    /// xyz direction, w intensity (0 without a hemispheric light)
    pub ambient: [f32; 4],
    /// xyz position, w intensity
    pub point_lights: [[f32; 4]; MAX_POINT_LIGHTS],
    /// x light count, y shadows on, z shadow bias, w PCF radius
    pub lighting: [f32; 4],
    /// x environment on, y last environment mip level
    pub environment: [f32; 4],
}

impl FrameUniform {
    pub fn new(frame: &FrameSnapshot<'_>, environment_levels: u32) -> Self {
        let view_proj = frame.camera.view_projection();
        let mut point_lights = [[0.0; 4]; MAX_POINT_LIGHTS];
        for (slot, light) in point_lights.iter_mut().zip(&frame.point_lights) {
            *slot = light.position.extend(light.intensity).to_array();
        }
        let ambient = frame
            .ambient
            .map_or([0.0; 4], |ambient| {
                ambient.direction.normalize_or_zero().extend(ambient.intensity).to_array()
            });
        let (light_view_proj, shadow_on, bias, radius) = match &frame.shadow {
            Some(shadow) => (
                shadow.view_projection,
                1.0,
                shadow.bias,
                shadow.filter_radius as f32,
            ),
            None => (Mat4::IDENTITY, 0.0, 0.0, 0.0),
        };
        let environment_on = frame.environment.is_some() && environment_levels > 0;
        Self {
            view_proj: view_proj.to_cols_array_2d(),
            inv_view_proj: view_proj.inverse().to_cols_array_2d(),
            light_view_proj: light_view_proj.to_cols_array_2d(),
            camera_position: frame.camera.position.extend(1.0).to_array(),
            ambient,
            point_lights,
            lighting: [
                frame.point_lights.len().min(MAX_POINT_LIGHTS) as f32,
                shadow_on,
                bias,
                radius,
            ],
            environment: [
                if environment_on { 1.0 } else { 0.0 },
                environment_levels.saturating_sub(1) as f32,
                0.0,
                0.0,
            ],
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ObjectUniform {
    pub model: [[f32; 4]; 4],
    pub normal_matrix: [[f32; 4]; 4],
    /// rgb base color, a opacity
    pub base_color: [f32; 4],
    /// x metallic, y roughness, z specular strength, w receives shadows
    pub surface: [f32; 4],
    /// x grid on, y cell size, z major line frequency, w opacity between lines
    pub grid: [f32; 4],
    pub grid_line_color: [f32; 4],
}

impl ObjectUniform {
    pub fn new(item: &DrawItem<'_>) -> Self {
        let normal_matrix = if item.world.determinant().abs() > 1e-12 {
            item.world.inverse().transpose()
        } else {
            Mat4::IDENTITY
        };
        let receive = if item.receive_shadows { 1.0 } else { 0.0 };
        let (base_color, surface, grid, grid_line_color) = match &item.shading {
            Shading::Lit {
                base_color,
                metallic,
                roughness,
                alpha,
                specular,
                ..
            } => (
                base_color.extend(*alpha).to_array(),
                [*metallic, *roughness, *specular, receive],
                [0.0; 4],
                [0.0; 4],
            ),
            Shading::Grid(params) => (
                params.main_color.extend(1.0).to_array(),
                [0.0, 1.0, 0.0, receive],
                [
                    1.0,
                    params.grid_ratio,
                    params.major_unit_frequency.max(1) as f32,
                    params.opacity,
                ],
                params.line_color.extend(1.0).to_array(),
            ),
        };
        Self {
            model: item.world.to_cols_array_2d(),
            normal_matrix: normal_matrix.to_cols_array_2d(),
            base_color,
            surface,
            grid,
            grid_line_color,
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ShadowPassUniform {
    pub light_view_proj: [[f32; 4]; 4],
}

impl Default for ShadowPassUniform {
    fn default() -> Self {
        Self {
            light_view_proj: Mat4::IDENTITY.to_cols_array_2d(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::frame::{CameraView, PointLight};
    use crate::engine::material::GridParams;
    use crate::engine::mesh::MeshGeometry;
    use crate::engine::Entity;
    use glam::Vec3;

    fn empty_frame() -> FrameSnapshot<'static> {
        FrameSnapshot {
            width: 4,
            height: 4,
            clear_color: [0.0; 4],
            camera: CameraView {
                position: Vec3::new(0.0, 0.0, -5.0),
                view: Mat4::look_at_rh(Vec3::new(0.0, 0.0, -5.0), Vec3::ZERO, Vec3::Y),
                projection: Mat4::perspective_rh(0.8, 1.0, 0.1, 100.0),
            },
            ambient: None,
            point_lights: Vec::new(),
            shadow: None,
            environment: None,
            skybox: false,
            items: Vec::new(),
        }
    }

    #[test]
    fn test_uniform_sizes_follow_wgsl_alignment() {
        assert_eq!(std::mem::size_of::<Vertex>(), 32);
        assert_eq!(std::mem::size_of::<FrameUniform>() % 16, 0);
        assert_eq!(std::mem::size_of::<FrameUniform>(), 320);
        assert_eq!(std::mem::size_of::<ObjectUniform>(), 192);
    }

    #[test]
    fn test_frame_uniform_caps_point_lights() {
        let mut frame = empty_frame();
        frame.point_lights = (0..6)
            .map(|index| PointLight {
                position: Vec3::splat(index as f32),
                intensity: 0.5,
            })
            .collect();
        let uniform = FrameUniform::new(&frame, 0);
        assert_eq!(uniform.lighting[0], MAX_POINT_LIGHTS as f32);
        assert_eq!(uniform.point_lights[1], [1.0, 1.0, 1.0, 0.5]);
        assert_eq!(uniform.environment[0], 0.0);
        assert_eq!(uniform.ambient, [0.0; 4]);
    }

    #[test]
    fn test_grid_object_uniform_flags_grid() {
        let params = GridParams {
            main_color: Vec3::ONE,
            line_color: Vec3::new(0.0, 1.0, 1.0),
            grid_ratio: 1.0,
            major_unit_frequency: 5,
            opacity: 0.5,
        };
        let geometry = MeshGeometry::Ground {
            width: 1.0,
            height: 1.0,
        };
        let item = DrawItem {
            entity: Entity { id: 1 },
            geometry: &geometry,
            world: Mat4::IDENTITY,
            shading: Shading::Grid(&params),
            blend: true,
            receive_shadows: false,
        };
        let uniform = ObjectUniform::new(&item);
        assert_eq!(uniform.grid, [1.0, 1.0, 5.0, 0.5]);
        assert_eq!(uniform.grid_line_color, [0.0, 1.0, 1.0, 1.0]);
    }
}
