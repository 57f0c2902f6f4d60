use glam::Vec3;
use shapeview::assets::{AssetPaths, UploadedModel};
use image::RgbaImage;
use shapeview::engine::{
    Entity, GpuContext, MeshGeometry, Renderer, ResourceCounts, Shading, TransparencyMode,
};
use shapeview::scene::{
    ActiveMesh, EnvironmentKind, FrameCapture, MaterialPreset, PrimitiveKind, SceneController,
    ShapeSelection, ViewerEvent, IMPORT_TARGET_HEIGHT,
};
use std::time::Duration;

const TALL_OBJ: &str = "o body\nv 0 0 0\nv 1 0 0\nv 0 6 0\nf 1 2 3\n";
const IMPORT_TIMEOUT: Duration = Duration::from_secs(5);

fn mounted() -> SceneController {
    let mut controller = SceneController::new(AssetPaths::new("assets"));
    assert!(controller.mount(800, 600));
    controller
}

/// Controller drawing through a real device, or `None` on machines
/// without a usable GPU adapter.
fn gpu_mounted() -> Option<SceneController> {
    let context = match GpuContext::headless() {
        Ok(context) => context,
        Err(err) => {
            eprintln!("skipping GPU checks: {err}");
            return None;
        }
    };
    let mut controller = SceneController::new(AssetPaths::new("assets"));
    assert!(controller.mount_with_renderer(Renderer::new(&context), 800, 600));
    Some(controller)
}

fn is_uniform(image: &RgbaImage) -> bool {
    let first = image.get_pixel(0, 0);
    image.pixels().all(|pixel| pixel == first)
}

fn active_root(controller: &SceneController) -> Option<Entity> {
    controller
        .session()
        .and_then(|session| session.mesh())
        .map(ActiveMesh::root)
}

fn live(controller: &SceneController) -> ResourceCounts {
    controller.engine().unwrap().live_counts()
}

fn created(controller: &SceneController) -> ResourceCounts {
    controller.engine().unwrap().created_counts()
}

#[test]
fn test_shape_switch_disposes_previous_and_builds_one() {
    let mut controller = mounted();
    for kind in [
        PrimitiveKind::Sphere,
        PrimitiveKind::Cylinder,
        PrimitiveKind::Torus,
        PrimitiveKind::Box,
    ] {
        let previous = active_root(&controller).unwrap();
        let meshes_created = created(&controller).meshes;

        controller.dispatch(ViewerEvent::SelectShape(kind.name().to_string()));

        let engine = controller.engine().unwrap();
        assert!(!engine.is_alive(previous));
        assert_eq!(engine.created_counts().meshes, meshes_created + 1);
        let current = engine.mesh(active_root(&controller).unwrap()).unwrap();
        let expected = match kind {
            PrimitiveKind::Box => MeshGeometry::Box { size: 1.5 },
            PrimitiveKind::Sphere => MeshGeometry::Sphere {
                diameter: 2.0,
                segments: 32,
            },
            PrimitiveKind::Cylinder => MeshGeometry::Cylinder {
                height: 2.0,
                diameter: 2.0,
            },
            PrimitiveKind::Torus => MeshGeometry::Torus {
                diameter: 3.0,
                thickness: 0.7,
            },
        };
        assert_eq!(current.geometry, expected);
    }
}

#[test]
fn test_material_is_bound_with_preset_parameters() {
    let mut controller = mounted();
    controller.dispatch(ViewerEvent::SelectMaterial(MaterialPreset::Glass));

    let engine = controller.engine().unwrap();
    let session = controller.session().unwrap();
    let mesh = engine.mesh(active_root(&controller).unwrap()).unwrap();
    assert_eq!(mesh.material, session.material());
    let params = engine
        .material(session.material().unwrap())
        .and_then(|material| material.pbr_params())
        .unwrap();
    assert_eq!(params.alpha, 0.3);
    assert_eq!(params.roughness, 0.05);
    assert_eq!(params.transparency_mode, TransparencyMode::AlphaBlend);
}

#[test]
fn test_material_switches_do_not_accumulate() {
    let mut controller = mounted();
    let baseline = live(&controller);
    for _ in 0..3 {
        for preset in MaterialPreset::ALL {
            controller.dispatch(ViewerEvent::SelectMaterial(preset));
        }
    }
    controller.dispatch(ViewerEvent::SelectMaterial(MaterialPreset::None));
    assert_eq!(live(&controller), baseline);
}

#[test]
fn test_environment_switch_replaces_everything() {
    let mut controller = mounted();
    for environment in [
        EnvironmentKind::None,
        EnvironmentKind::Room,
        EnvironmentKind::Night,
        EnvironmentKind::Studio,
        EnvironmentKind::Road,
    ] {
        let old = controller.session().unwrap();
        let old_scene = old.scene();
        let mut old_entities = old.actors().lights.clone();
        old_entities.extend(old.actors().staging.iter().copied());
        old_entities.extend(old.camera());

        controller.dispatch(ViewerEvent::SelectEnvironment(environment));

        let engine = controller.engine().unwrap();
        assert!(!engine.is_scene_alive(old_scene));
        for entity in old_entities {
            assert!(!engine.is_alive(entity), "{environment}: {entity:?} survived");
        }
        assert_eq!(engine.live_counts().scenes, 1);
        assert_eq!(controller.session().unwrap().environment(), environment);
    }
}

#[test]
fn test_environment_round_trip_does_not_leak() {
    let mut controller = mounted();
    let baseline = live(&controller);
    for environment in EnvironmentKind::ALL {
        controller.dispatch(ViewerEvent::SelectEnvironment(environment));
    }
    controller.dispatch(ViewerEvent::SelectEnvironment(EnvironmentKind::Road));
    assert_eq!(live(&controller), baseline);
}

#[test]
fn test_upload_selects_model_and_imports_it() {
    let mut controller = mounted();
    controller.dispatch(ViewerEvent::UploadModel(UploadedModel::new(
        "model.obj",
        TALL_OBJ.as_bytes().to_vec(),
    )));

    assert_eq!(controller.library().names(), vec!["model.obj"]);
    assert_eq!(
        controller.shape(),
        &ShapeSelection::Model("model.obj".to_string())
    );
    assert!(controller.is_import_pending());
    assert!(active_root(&controller).is_none());

    assert!(controller.wait_for_import(IMPORT_TIMEOUT));
    let session = controller.session().unwrap();
    let Some(ActiveMesh::Imported { primary, .. }) = session.mesh() else {
        panic!("expected the imported model to be active");
    };
    let engine = controller.engine().unwrap();
    let height = engine.world_bounds(*primary).unwrap().size().y;
    assert!((height - IMPORT_TARGET_HEIGHT).abs() < 1e-4);
    assert_eq!(engine.mesh(*primary).unwrap().material, session.material());
}

#[test]
fn test_selecting_missing_model_shows_nothing() {
    let mut controller = mounted();
    controller.dispatch(ViewerEvent::SelectShape("ghost.obj".to_string()));
    assert!(controller.wait_for_import(IMPORT_TIMEOUT));
    assert!(active_root(&controller).is_none());
    assert!(controller.session().unwrap().material().is_none());
}

#[test]
fn test_failed_import_reports_status() {
    let mut controller = mounted();
    controller.dispatch(ViewerEvent::UploadModel(UploadedModel::new(
        "broken.obj",
        b"v x y z\n".to_vec(),
    )));
    assert!(controller.wait_for_import(IMPORT_TIMEOUT));
    assert!(active_root(&controller).is_none());
    let status = controller.take_status().unwrap();
    assert!(status.contains("broken.obj"), "{status}");
    assert!(controller.take_status().is_none());
}

#[test]
fn test_import_started_before_environment_switch_lands_in_new_scene() {
    let mut controller = mounted();
    controller.dispatch(ViewerEvent::UploadModel(UploadedModel::new(
        "model.obj",
        TALL_OBJ.as_bytes().to_vec(),
    )));
    controller.dispatch(ViewerEvent::SelectEnvironment(EnvironmentKind::Room));

    assert!(controller.wait_for_import(IMPORT_TIMEOUT));
    let root = active_root(&controller).unwrap();
    let engine = controller.engine().unwrap();
    let scene = controller.session().unwrap().scene();
    assert_eq!(engine.entity_scene(root), Some(scene));
    let roots = engine
        .scene_entities(scene)
        .into_iter()
        .filter(|entity| engine.mesh(*entity).is_some_and(|mesh| mesh.name == "__root__"))
        .count();
    assert_eq!(roots, 1);
}

#[test]
fn test_stale_import_is_discarded() {
    let mut controller = mounted();
    controller.dispatch(ViewerEvent::UploadModel(UploadedModel::new(
        "model.obj",
        TALL_OBJ.as_bytes().to_vec(),
    )));
    controller.dispatch(ViewerEvent::SelectShape("Box".to_string()));
    assert!(!controller.is_import_pending());
    let meshes_created = created(&controller).meshes;

    std::thread::sleep(Duration::from_millis(200));
    controller.frame();
    controller.frame();

    assert_eq!(created(&controller).meshes, meshes_created);
    let engine = controller.engine().unwrap();
    let mesh = engine.mesh(active_root(&controller).unwrap()).unwrap();
    assert_eq!(mesh.geometry, MeshGeometry::Box { size: 1.5 });
}

#[test]
fn test_screenshot_requires_mount() {
    let mut controller = SceneController::new(AssetPaths::new("assets"));
    assert!(controller.capture_frame().is_none());
    assert!(controller.snapshot().is_none());

    controller.mount(800, 600);
    let frame = controller.snapshot().unwrap();
    assert_eq!((frame.width, frame.height), (1920, 1080));

    controller.unmount();
    assert!(controller.snapshot().is_none());
    assert!(controller.capture_frame().is_none());
}

#[test]
fn test_screenshot_follows_rebuilt_camera() {
    let mut controller = mounted();
    controller.dispatch(ViewerEvent::SelectEnvironment(EnvironmentKind::Room));
    let room = controller.snapshot().unwrap().camera;
    controller.dispatch(ViewerEvent::SelectEnvironment(EnvironmentKind::Night));
    let night = controller.snapshot().unwrap().camera;
    assert_ne!(room, night);

    let Some(mut controller) = gpu_mounted() else {
        return;
    };
    controller.dispatch(ViewerEvent::SelectEnvironment(EnvironmentKind::Room));
    assert!(controller.capture_frame().is_some());
    controller.dispatch(ViewerEvent::SelectEnvironment(EnvironmentKind::Night));
    let screenshot = controller.capture_frame().unwrap();
    assert_eq!(screenshot.label, "Night-Box");
    assert_eq!((screenshot.width(), screenshot.height()), (1920, 1080));
}

#[test]
fn test_frame_reflects_environment_shape_and_material() {
    let mut controller = mounted();
    controller.dispatch(ViewerEvent::SelectEnvironment(EnvironmentKind::None));
    {
        let frame = controller.snapshot().unwrap();
        assert!(frame.ambient.is_some());
        assert!(frame.shadow.is_some());
        assert!(!frame.skybox);
        assert!(frame.environment.is_none());
        assert!(frame
            .items
            .iter()
            .any(|item| matches!(item.shading, Shading::Grid(_))));
    }

    controller.dispatch(ViewerEvent::SelectShape("Torus".to_string()));
    controller.dispatch(ViewerEvent::SelectMaterial(MaterialPreset::Metal));
    {
        let frame = controller.snapshot().unwrap();
        let item = frame.item(active_root(&controller).unwrap()).unwrap();
        assert!(matches!(item.geometry, MeshGeometry::Torus { .. }));
        assert!(matches!(item.shading, Shading::Lit { metallic, .. } if metallic == 1.0));
        let casters = &frame.shadow.as_ref().unwrap().casters;
        assert!(casters.contains(&item.entity));
    }

    controller.dispatch(ViewerEvent::SelectEnvironment(EnvironmentKind::Night));
    let frame = controller.snapshot().unwrap();
    assert!(frame.skybox);
    assert!(frame.environment.unwrap().ends_with("night.env"));
    assert!(frame.ambient.is_none());
    assert!(frame.point_lights.is_empty());
}

#[test]
fn test_captures_differ_between_scenes() {
    let Some(mut controller) = gpu_mounted() else {
        return;
    };
    controller.dispatch(ViewerEvent::SelectEnvironment(EnvironmentKind::None));
    let plain = controller.capture_frame().unwrap().image;

    controller.dispatch(ViewerEvent::SelectShape("Torus".to_string()));
    controller.dispatch(ViewerEvent::SelectMaterial(MaterialPreset::Metal));
    let metal_torus = controller.capture_frame().unwrap().image;

    controller.dispatch(ViewerEvent::SelectEnvironment(EnvironmentKind::Night));
    let night = controller.capture_frame().unwrap().image;

    for image in [&plain, &metal_torus, &night] {
        assert_eq!(image.dimensions(), (1920, 1080));
        assert!(!is_uniform(image));
    }
    assert_ne!(plain, metal_torus);
    assert_ne!(metal_torus, night);
    assert_ne!(plain, night);
}

#[test]
fn test_room_slider_moves_camera_and_resets() {
    let mut controller = mounted();
    controller.dispatch(ViewerEvent::SelectEnvironment(EnvironmentKind::Room));
    controller.dispatch(ViewerEvent::SetRoomOffset(5.0));

    let camera_entity = controller.session().unwrap().camera().unwrap();
    let camera = controller.engine().unwrap().camera(camera_entity).unwrap();
    assert_eq!(camera.position.x, 5.0);
    assert_eq!(camera.target, Vec3::new(5.0, 0.5, 0.0));
    assert_eq!(controller.room_offset(), 5.0);

    controller.frame();
    let follow = controller.session().unwrap().actors().follow_light.unwrap();
    let light = controller.engine().unwrap().light(follow).unwrap();
    assert_eq!(light.position.x, 5.0);

    controller.dispatch(ViewerEvent::SelectEnvironment(EnvironmentKind::Road));
    controller.dispatch(ViewerEvent::SelectEnvironment(EnvironmentKind::Room));
    assert_eq!(controller.room_offset(), 0.0);
    let camera_entity = controller.session().unwrap().camera().unwrap();
    let camera = controller.engine().unwrap().camera(camera_entity).unwrap();
    assert_eq!(camera.position.x, 0.0);
}

#[test]
fn test_repeated_selection_is_a_no_op() {
    let mut controller = mounted();
    controller.dispatch(ViewerEvent::SelectShape("Sphere".to_string()));
    controller.dispatch(ViewerEvent::SelectMaterial(MaterialPreset::Metal));
    controller.dispatch(ViewerEvent::SelectEnvironment(EnvironmentKind::None));
    let before = created(&controller);

    for _ in 0..5 {
        controller.dispatch(ViewerEvent::SelectShape("Sphere".to_string()));
        controller.dispatch(ViewerEvent::SelectMaterial(MaterialPreset::Metal));
        controller.dispatch(ViewerEvent::SelectEnvironment(EnvironmentKind::None));
    }
    assert_eq!(created(&controller), before);
}

#[test]
fn test_unmount_releases_engine() {
    let mut controller = mounted();
    controller.dispatch(ViewerEvent::SelectEnvironment(EnvironmentKind::Room));
    controller.unmount();
    assert!(controller.engine().is_none());
    assert!(controller.session().is_none());
    controller.frame();
    assert!(controller.mount(800, 600));
    assert_eq!(controller.session().unwrap().environment(), EnvironmentKind::Room);
}
