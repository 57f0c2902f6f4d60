//! Per-frame draw description.
//!
//! [`FrameSnapshot`] is everything a renderer needs to draw one view of a
//! scene: camera matrices, lights, the shadow pass, the environment and one
//! [`DrawItem`] per visible mesh with its resolved shading. It borrows from
//! the engine and is rebuilt every frame.

use crate::engine::light::{FilteringQuality, ShadowFilter};
use crate::engine::material::{GridParams, MaterialKind, TransparencyMode};
use crate::engine::mesh::{Aabb, MeshGeometry};
use crate::engine::{Camera, Entity};
use glam::{Mat4, Vec3};
use std::path::Path;

pub const MAX_POINT_LIGHTS: usize = 4;
pub const CAMERA_FOV_Y: f32 = 0.8;
pub const CAMERA_NEAR: f32 = 0.1;
pub const CAMERA_FAR: f32 = 5000.0;

const SHADOW_NEAR: f32 = 0.1;
const SHADOW_FRUSTUM_MARGIN: f32 = 1.25;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraView {
    pub position: Vec3,
    pub view: Mat4,
    pub projection: Mat4,
}

impl CameraView {
    pub fn from_camera(camera: &Camera, aspect: f32) -> Self {
        let mut target = camera.target;
        if (target - camera.position).length_squared() < 1e-10 {
            target = camera.position + Vec3::Z;
        }
        Self {
            position: camera.position,
            view: Mat4::look_at_rh(camera.position, target, Vec3::Y),
            projection: Mat4::perspective_rh(CAMERA_FOV_Y, aspect, CAMERA_NEAR, CAMERA_FAR),
        }
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }
}

/// Hemispheric light: full intensity along `direction`, none opposite.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmbientLight {
    pub direction: Vec3,
    pub intensity: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointLight {
    pub position: Vec3,
    pub intensity: f32,
}

/// Depth pass rendered from the shadow light. The light is always the first
/// entry of [`FrameSnapshot::point_lights`].
#[derive(Debug, Clone, PartialEq)]
pub struct ShadowPass {
    pub map_size: u32,
    pub view_projection: Mat4,
    pub bias: f32,
    /// PCF kernel radius in texels; 0 takes a single tap.
    pub filter_radius: u32,
    pub casters: Vec<Entity>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Shading<'a> {
    Lit {
        base_color: Vec3,
        texture: Option<&'a Path>,
        metallic: f32,
        roughness: f32,
        alpha: f32,
        specular: f32,
    },
    Grid(&'a GridParams),
}

impl Shading<'static> {
    pub const DEFAULT: Shading<'static> = Shading::Lit {
        base_color: Vec3::ONE,
        texture: None,
        metallic: 0.0,
        roughness: 0.5,
        alpha: 1.0,
        specular: 1.0,
    };
}

#[derive(Debug, Clone)]
pub struct DrawItem<'a> {
    pub entity: Entity,
    pub geometry: &'a MeshGeometry,
    pub world: Mat4,
    pub shading: Shading<'a>,
    pub blend: bool,
    pub receive_shadows: bool,
}

#[derive(Debug, Clone)]
pub struct FrameSnapshot<'a> {
    pub width: u32,
    pub height: u32,
    pub clear_color: [f32; 4],
    pub camera: CameraView,
    pub ambient: Option<AmbientLight>,
    pub point_lights: Vec<PointLight>,
    pub shadow: Option<ShadowPass>,
    /// Cube texture used for reflections and, with `skybox`, the background.
    pub environment: Option<&'a Path>,
    pub skybox: bool,
    pub items: Vec<DrawItem<'a>>,
}

impl FrameSnapshot<'_> {
    pub fn item(&self, entity: Entity) -> Option<&DrawItem<'_>> {
        self.items.iter().find(|item| item.entity == entity)
    }

    /// Opaque items in scene order, then blended items back to front.
    pub fn draw_order(&self) -> Vec<&DrawItem<'_>> {
        let mut opaque: Vec<&DrawItem<'_>> = self.items.iter().filter(|item| !item.blend).collect();
        let mut blended: Vec<(f32, &DrawItem<'_>)> = self
            .items
            .iter()
            .filter(|item| item.blend)
            .map(|item| {
                let center = item.world.transform_point3(item.geometry.local_bounds().center());
                (center.distance_squared(self.camera.position), item)
            })
            .collect();
        blended.sort_by(|a, b| b.0.total_cmp(&a.0));
        opaque.extend(blended.into_iter().map(|(_, item)| item));
        opaque
    }
}

/// Shading for a mesh bound to `material`; `None` marks the skybox, which is
/// drawn as the background instead of as geometry.
pub(crate) fn resolve_shading(material: Option<&MaterialKind>) -> Option<(Shading<'_>, bool)> {
    let Some(kind) = material else {
        return Some((Shading::DEFAULT, false));
    };
    match kind {
        MaterialKind::Pbr(params) => Some((
            Shading::Lit {
                base_color: params.albedo_color,
                texture: params.albedo_texture.as_deref(),
                metallic: params.metallic,
                roughness: params.roughness,
                alpha: params.alpha,
                specular: 1.0,
            },
            params.transparency_mode == TransparencyMode::AlphaBlend || params.alpha < 1.0,
        )),
        MaterialKind::Standard { diffuse, specular } => Some((
            Shading::Lit {
                base_color: *diffuse,
                texture: None,
                metallic: 0.0,
                roughness: 0.5,
                alpha: 1.0,
                specular: specular.max_element(),
            },
            false,
        )),
        MaterialKind::Grid(params) => Some((Shading::Grid(params), true)),
        MaterialKind::Skybox => None,
    }
}

pub(crate) fn filter_radius(filter: ShadowFilter) -> u32 {
    match filter {
        ShadowFilter::None => 0,
        ShadowFilter::PercentageCloser(FilteringQuality::Low) => 1,
        ShadowFilter::PercentageCloser(FilteringQuality::Medium) => 2,
        ShadowFilter::PercentageCloser(FilteringQuality::High) => 3,
    }
}

/// Perspective frustum from `light` that encloses `casters`.
pub(crate) fn shadow_view_projection(light: Vec3, casters: Option<Aabb>) -> Mat4 {
    let (center, radius) = match casters {
        Some(bounds) => (bounds.center(), (bounds.size().length() * 0.5).max(0.5)),
        None => (Vec3::ZERO, 1.0),
    };
    let to_center = center - light;
    let distance = to_center.length().max(radius + SHADOW_NEAR);
    let direction = to_center.try_normalize().unwrap_or(Vec3::NEG_Y);
    let up = if direction.cross(Vec3::Y).length_squared() < 1e-4 {
        Vec3::Z
    } else {
        Vec3::Y
    };
    let fov = (2.0 * (radius / distance).min(0.999).asin() * SHADOW_FRUSTUM_MARGIN).clamp(0.1, 2.8);
    let view = Mat4::look_at_rh(light, light + direction, up);
    let projection = Mat4::perspective_rh(fov, 1.0, SHADOW_NEAR, distance + radius * 4.0 + 50.0);
    projection * view
}
