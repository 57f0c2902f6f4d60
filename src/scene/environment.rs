//! Environment construction.
//!
//! Builds the camera, lights and supporting geometry for one environment
//! into a freshly created scene. Callers replace the whole scene on every
//! environment change, so nothing here ever edits an existing setup.

use crate::assets::AssetPaths;
use crate::engine::{
    BeforeRender, Camera, Engine, EngineError, Entity, FilteringQuality, GridParams, MaterialKind,
    ObserverId, SceneEntities, SceneId, ShadowFilter, ShadowGeneratorId, TextureId, TextureKind,
};
use crate::scene::EnvironmentKind;
use glam::Vec3;
use std::f32::consts::PI;

pub const CLEAR_COLOR: [f32; 4] = [0.2, 0.2, 0.2, 0.9];
pub const FLOOR_Y: f32 = -0.8;

pub const ROOM_OFFSET_MIN: f32 = -5.0;
pub const ROOM_OFFSET_MAX: f32 = 5.0;
pub const ROOM_OFFSET_STEP: f32 = 0.1;

const SHADOW_MAP_SIZE: u32 = 1024;
const SHADOW_BIAS: f32 = 0.0005;
const SKYBOX_SIZE: f32 = 1000.0;

const ROOM_SIZE: f32 = 12.0;
const ROOM_WALL_HEIGHT: f32 = 6.0;
const ROOM_CAMERA_HEIGHT: f32 = 1.2;
const ROOM_CAMERA_DEPTH: f32 = -5.0;
const ROOM_AIM_HEIGHT: f32 = 0.5;
const ROOM_LIGHT_POSITION: Vec3 = Vec3::new(0.0, 4.0, -1.0);

/// Handles created for one environment. Everything lives in the scene it
/// was built into and goes away with it.
#[derive(Debug, Clone, Default)]
pub struct EnvironmentActors {
    pub camera: Option<Entity>,
    pub lights: Vec<Entity>,
    pub staging: Vec<Entity>,
    pub shadow_generator: Option<ShadowGeneratorId>,
    pub environment_texture: Option<TextureId>,
    /// Room light that tracks the camera's x position.
    pub follow_light: Option<Entity>,
    pub follow_observer: Option<ObserverId>,
}

/// Populates `scene` for `kind`. The room camera starts at `room_offset`.
pub fn build_environment(
    engine: &mut Engine,
    scene: SceneId,
    kind: EnvironmentKind,
    assets: &AssetPaths,
    room_offset: f32,
) -> Result<EnvironmentActors, EngineError> {
    engine.set_clear_color(scene, CLEAR_COLOR)?;
    let actors = match kind {
        EnvironmentKind::None => build_ground_stage(engine, scene)?,
        EnvironmentKind::Room => build_room(engine, scene, room_offset)?,
        EnvironmentKind::Road | EnvironmentKind::Night | EnvironmentKind::Studio => {
            build_image_based(engine, scene, kind, assets)?
        }
    };
    log::info!(
        "Environment '{}' built: {} lights, {} staged meshes, shadows {}",
        kind,
        actors.lights.len(),
        actors.staging.len(),
        if actors.shadow_generator.is_some() { "on" } else { "off" }
    );
    Ok(actors)
}

/// Orbiting camera around the origin with user controls attached.
fn orbit_camera(engine: &mut Engine, scene: SceneId) -> Result<Entity, EngineError> {
    let mut camera = Camera::arc_rotate("camera", PI / 1.5, PI / 3.0, 5.0, Vec3::ZERO);
    camera.set_radius_limits(2.0, 20.0);
    camera.controls_attached = true;
    engine.create_camera(scene, camera)
}

fn soft_shadows(
    engine: &mut Engine,
    scene: SceneId,
    light: Entity,
) -> Result<ShadowGeneratorId, EngineError> {
    let id = engine.create_shadow_generator(scene, light, SHADOW_MAP_SIZE)?;
    if let Some(generator) = engine.shadow_generator_mut(id) {
        generator.filter = ShadowFilter::PercentageCloser(FilteringQuality::Medium);
        generator.bias = SHADOW_BIAS;
    }
    Ok(id)
}

fn build_ground_stage(engine: &mut Engine, scene: SceneId) -> Result<EnvironmentActors, EngineError> {
    let camera = orbit_camera(engine, scene)?;

    let ambient = engine.create_hemispheric_light(scene, "ambient", Vec3::Y, 0.6)?;
    let point = engine.create_point_light(scene, "pointLight", Vec3::new(2.0, 5.0, -2.0), 0.8)?;

    let ground = engine.create_ground(scene, "ground", 20.0, 20.0)?;
    let ground_material = engine.create_material(
        scene,
        "groundMat",
        MaterialKind::Standard {
            diffuse: Vec3::splat(0.4),
            specular: Vec3::ZERO,
        },
    )?;
    engine.set_mesh_material(ground, ground_material);
    if let Some(mesh) = engine.mesh_mut(ground) {
        mesh.position.y = FLOOR_Y;
        mesh.receive_shadows = true;
    }

    // Lifted slightly off the ground to avoid z-fighting.
    let grid = engine.create_ground(scene, "grid", 20.0, 20.0)?;
    let grid_material = engine.create_material(
        scene,
        "gridMat",
        MaterialKind::Grid(GridParams {
            main_color: Vec3::splat(0.4),
            line_color: Vec3::splat(0.6),
            grid_ratio: 1.0,
            major_unit_frequency: 5,
            opacity: 0.5,
        }),
    )?;
    engine.set_mesh_material(grid, grid_material);
    if let Some(mesh) = engine.mesh_mut(grid) {
        mesh.position.y = FLOOR_Y + 0.001;
    }

    let shadow_generator = soft_shadows(engine, scene, point)?;

    Ok(EnvironmentActors {
        camera: Some(camera),
        lights: vec![ambient, point],
        staging: vec![ground, grid],
        shadow_generator: Some(shadow_generator),
        ..EnvironmentActors::default()
    })
}

fn build_room(
    engine: &mut Engine,
    scene: SceneId,
    room_offset: f32,
) -> Result<EnvironmentActors, EngineError> {
    let offset = clamp_room_offset(room_offset);
    let mut camera = Camera::universal(
        "camera",
        Vec3::new(offset, ROOM_CAMERA_HEIGHT, ROOM_CAMERA_DEPTH),
    );
    camera.set_target(Vec3::new(offset, ROOM_AIM_HEIGHT, 0.0));
    let camera = engine.create_camera(scene, camera)?;

    let ambient = engine.create_hemispheric_light(scene, "ambient", Vec3::Y, 0.6)?;
    let follow = engine.create_point_light(
        scene,
        "roomLight",
        ROOM_LIGHT_POSITION + Vec3::X * offset,
        0.8,
    )?;

    let wall_material = engine.create_material(
        scene,
        "wallMat",
        MaterialKind::Standard {
            diffuse: Vec3::splat(0.8),
            specular: Vec3::ZERO,
        },
    )?;

    let half = ROOM_SIZE * 0.5;
    let wall_center = FLOOR_Y + ROOM_WALL_HEIGHT * 0.5;
    let mut staging = Vec::with_capacity(5);

    let floor = engine.create_ground(scene, "floor", ROOM_SIZE, ROOM_SIZE)?;
    if let Some(mesh) = engine.mesh_mut(floor) {
        mesh.position.y = FLOOR_Y;
        mesh.receive_shadows = true;
    }
    staging.push(floor);

    let ceiling = engine.create_ground(scene, "ceiling", ROOM_SIZE, ROOM_SIZE)?;
    if let Some(mesh) = engine.mesh_mut(ceiling) {
        mesh.position.y = FLOOR_Y + ROOM_WALL_HEIGHT;
        mesh.rotation.x = PI;
    }
    staging.push(ceiling);

    // Planes face -Z by default; side walls turn a quarter around Y.
    let walls = [
        ("backWall", Vec3::new(0.0, wall_center, half), 0.0),
        ("leftWall", Vec3::new(-half, wall_center, 0.0), -PI / 2.0),
        ("rightWall", Vec3::new(half, wall_center, 0.0), PI / 2.0),
    ];
    for (name, position, yaw) in walls {
        let wall = engine.create_plane(scene, name, ROOM_SIZE, ROOM_WALL_HEIGHT)?;
        if let Some(mesh) = engine.mesh_mut(wall) {
            mesh.position = position;
            mesh.rotation.y = yaw;
            mesh.receive_shadows = true;
        }
        staging.push(wall);
    }

    for entity in &staging {
        engine.set_mesh_material(*entity, wall_material);
    }

    let shadow_generator = engine.create_shadow_generator(scene, follow, SHADOW_MAP_SIZE)?;
    if let Some(generator) = engine.shadow_generator_mut(shadow_generator) {
        generator.filter = ShadowFilter::PercentageCloser(FilteringQuality::Medium);
    }

    let observer: BeforeRender = Box::new(move |view: &mut SceneEntities<'_>| {
        let Some(x) = view.camera(camera).map(|camera| camera.position.x) else {
            return;
        };
        if let Some(light) = view.light_mut(follow) {
            light.position.x = x;
        }
    });
    let follow_observer = engine.add_before_render(scene, observer)?;

    Ok(EnvironmentActors {
        camera: Some(camera),
        lights: vec![ambient, follow],
        staging,
        shadow_generator: Some(shadow_generator),
        environment_texture: None,
        follow_light: Some(follow),
        follow_observer: Some(follow_observer),
    })
}

fn build_image_based(
    engine: &mut Engine,
    scene: SceneId,
    kind: EnvironmentKind,
    assets: &AssetPaths,
) -> Result<EnvironmentActors, EngineError> {
    let path = assets.environment_texture(kind);
    let texture = engine.create_texture(scene, &path, TextureKind::PrefilteredCube)?;
    let skybox = engine.create_default_skybox(scene, texture, SKYBOX_SIZE)?;
    let camera = orbit_camera(engine, scene)?;

    Ok(EnvironmentActors {
        camera: Some(camera),
        staging: vec![skybox],
        environment_texture: Some(texture),
        ..EnvironmentActors::default()
    })
}

pub fn clamp_room_offset(offset: f32) -> f32 {
    if offset.is_finite() {
        offset.clamp(ROOM_OFFSET_MIN, ROOM_OFFSET_MAX)
    } else {
        0.0
    }
}

/// Slides the room camera and its aim point along x. Returns the applied
/// (clamped) offset, or `None` when the camera is not a room camera.
pub fn move_room_camera(engine: &mut Engine, camera: Entity, offset: f32) -> Option<f32> {
    let offset = clamp_room_offset(offset);
    let camera = engine.camera_mut(camera)?;
    if camera.is_orbiting() {
        return None;
    }
    camera.position.x = offset;
    camera.target = Vec3::new(offset, ROOM_AIM_HEIGHT, 0.0);
    Some(offset)
}
