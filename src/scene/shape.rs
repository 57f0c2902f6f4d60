//! Active mesh resolution for the current shape selection.

use crate::assets::{ModelLibrary, UploadedModel};
use crate::engine::{Engine, EngineError, Entity, ImportedModel, SceneId, ShadowGeneratorId};
use crate::scene::PrimitiveKind;
use glam::Vec3;

/// Height at which every primitive's lowest point rests.
pub const GROUND_OFFSET: f32 = -0.8;
/// Bounding-box height an imported model's primary mesh is scaled to.
pub const IMPORT_TARGET_HEIGHT: f32 = 2.0;

const MIN_SCALABLE_HEIGHT: f32 = 1e-6;

/// The mesh (or imported mesh set) owned by the current session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActiveMesh {
    Primitive(Entity),
    Imported {
        root: Entity,
        meshes: Vec<Entity>,
        primary: Entity,
    },
}

impl ActiveMesh {
    /// Disposing this entity releases the whole active mesh.
    pub fn root(&self) -> Entity {
        match self {
            ActiveMesh::Primitive(entity) => *entity,
            ActiveMesh::Imported { root, .. } => *root,
        }
    }

    /// Meshes that carry geometry and receive the bound material.
    pub fn surfaces(&self) -> Vec<Entity> {
        match self {
            ActiveMesh::Primitive(entity) => vec![*entity],
            ActiveMesh::Imported { meshes, .. } => meshes.clone(),
        }
    }
}

/// Builds the primitive with its preset dimensions and rests it on the ground.
pub fn resolve_primitive(
    engine: &mut Engine,
    scene: SceneId,
    kind: PrimitiveKind,
    shadow_generator: Option<ShadowGeneratorId>,
) -> Result<ActiveMesh, EngineError> {
    let name = kind.name();
    let entity = match kind {
        PrimitiveKind::Box => engine.create_box(scene, name, 1.5)?,
        PrimitiveKind::Sphere => engine.create_sphere(scene, name, 2.0, 32)?,
        PrimitiveKind::Cylinder => engine.create_cylinder(scene, name, 2.0, 2.0)?,
        PrimitiveKind::Torus => engine.create_torus(scene, name, 3.0, 0.7)?,
    };
    ground_mesh(engine, entity);
    cast_shadows(engine, shadow_generator, &[entity]);
    log::debug!("Created primitive '{}' as {:?}", name, entity);
    Ok(ActiveMesh::Primitive(entity))
}

/// Moves the mesh vertically so its lowest point sits at [`GROUND_OFFSET`].
pub fn ground_mesh(engine: &mut Engine, entity: Entity) -> bool {
    let Some(bounds) = engine.world_bounds(entity) else {
        return false;
    };
    let Some(mesh) = engine.mesh_mut(entity) else {
        return false;
    };
    mesh.position.y += GROUND_OFFSET - bounds.min.y;
    true
}

/// Uploaded model for `name`, or an empty placeholder when nothing matches.
pub fn prepare_import(library: &ModelLibrary, name: &str) -> UploadedModel {
    match library.find(name) {
        Some(model) => model.clone(),
        None => {
            log::warn!("No uploaded model named '{}', using an empty placeholder", name);
            UploadedModel::placeholder(name)
        }
    }
}

/// Adds a parsed model to the scene. The first sub-mesh with vertices is
/// the primary one; the root is scaled so the primary mesh stands
/// [`IMPORT_TARGET_HEIGHT`] tall. Models without vertices yield `None`
/// and create nothing.
pub fn attach_import(
    engine: &mut Engine,
    scene: SceneId,
    model: &ImportedModel,
    shadow_generator: Option<ShadowGeneratorId>,
) -> Result<Option<ActiveMesh>, EngineError> {
    if model.is_empty() {
        log::info!("Model '{}' has no vertices, nothing to show", model.source_name);
        return Ok(None);
    }

    let (root, children) = engine.import_meshes(scene, model)?;
    let meshes: Vec<Entity> = children
        .into_iter()
        .filter(|child| engine.mesh(*child).is_some_and(|mesh| mesh.vertex_count() > 0))
        .collect();
    let Some(&primary) = meshes.first() else {
        engine.dispose_entity(root);
        return Ok(None);
    };

    let height = engine
        .world_bounds(primary)
        .map_or(0.0, |bounds| bounds.size().y);
    if height > MIN_SCALABLE_HEIGHT {
        let scale = IMPORT_TARGET_HEIGHT / height;
        if let Some(root_mesh) = engine.mesh_mut(root) {
            root_mesh.scaling = Vec3::splat(scale);
        }
    } else {
        log::warn!("Model '{}' is flat, keeping its original scale", model.source_name);
    }

    cast_shadows(engine, shadow_generator, &meshes);
    log::info!(
        "Attached model '{}' ({} meshes)",
        model.source_name,
        meshes.len()
    );
    Ok(Some(ActiveMesh::Imported {
        root,
        meshes,
        primary,
    }))
}

fn cast_shadows(engine: &mut Engine, shadow_generator: Option<ShadowGeneratorId>, casters: &[Entity]) {
    let Some(generator) = shadow_generator.and_then(|id| engine.shadow_generator_mut(id)) else {
        return;
    };
    for caster in casters {
        generator.add_caster(*caster);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::import::ImportedMesh;
    use crate::engine::MeshGeometry;

    fn scene() -> (Engine, SceneId) {
        let mut engine = Engine::new(320, 200);
        let scene = engine.create_scene().unwrap();
        (engine, scene)
    }

    #[test]
    fn test_primitives_use_preset_dimensions() {
        let (mut engine, scene) = scene();
        let expected = [
            (PrimitiveKind::Box, MeshGeometry::Box { size: 1.5 }),
            (
                PrimitiveKind::Sphere,
                MeshGeometry::Sphere {
                    diameter: 2.0,
                    segments: 32,
                },
            ),
            (
                PrimitiveKind::Cylinder,
                MeshGeometry::Cylinder {
                    height: 2.0,
                    diameter: 2.0,
                },
            ),
            (
                PrimitiveKind::Torus,
                MeshGeometry::Torus {
                    diameter: 3.0,
                    thickness: 0.7,
                },
            ),
        ];
        for (kind, geometry) in expected {
            let active = resolve_primitive(&mut engine, scene, kind, None).unwrap();
            let mesh = engine.mesh(active.root()).unwrap();
            assert_eq!(mesh.geometry, geometry);
            assert_eq!(mesh.name, kind.name());
        }
    }

    #[test]
    fn test_primitives_rest_on_ground() {
        let (mut engine, scene) = scene();
        for kind in PrimitiveKind::ALL {
            let active = resolve_primitive(&mut engine, scene, kind, None).unwrap();
            let bounds = engine.world_bounds(active.root()).unwrap();
            assert!((bounds.min.y - GROUND_OFFSET).abs() < 1e-5, "{kind:?}");
        }
    }

    #[test]
    fn test_import_scales_primary_to_target_height() {
        let (mut engine, scene) = scene();
        let model = ImportedModel {
            source_name: "tall.obj".to_string(),
            meshes: vec![
                ImportedMesh {
                    name: "empty".to_string(),
                    positions: Vec::new(),
                    ..Default::default()
                },
                ImportedMesh {
                    name: "body".to_string(),
                    positions: vec![Vec3::ZERO, Vec3::new(1.0, 8.0, 1.0)],
                    ..Default::default()
                },
            ],
        };
        let active = attach_import(&mut engine, scene, &model, None)
            .unwrap()
            .unwrap();
        let ActiveMesh::Imported { meshes, primary, .. } = &active else {
            panic!("expected an imported mesh");
        };
        assert_eq!(meshes.len(), 1);
        assert_eq!(engine.mesh(*primary).unwrap().name, "body");
        let height = engine.world_bounds(*primary).unwrap().size().y;
        assert!((height - IMPORT_TARGET_HEIGHT).abs() < 1e-4);
    }

    #[test]
    fn test_empty_import_creates_nothing() {
        let (mut engine, scene) = scene();
        let before = engine.live_counts();
        let model = ImportedModel::default();
        assert!(attach_import(&mut engine, scene, &model, None).unwrap().is_none());
        assert_eq!(engine.live_counts(), before);
    }

    #[test]
    fn test_missing_upload_yields_placeholder() {
        let library = ModelLibrary::new();
        let model = prepare_import(&library, "ghost.obj");
        assert_eq!(model.name, "ghost.obj");
        assert!(model.bytes.is_empty());
    }

    #[test]
    fn test_meshes_join_shadow_casters() {
        let (mut engine, scene) = scene();
        let light = engine
            .create_point_light(scene, "light", Vec3::Y, 1.0)
            .unwrap();
        let generator = engine.create_shadow_generator(scene, light, 1024).unwrap();
        let active = resolve_primitive(&mut engine, scene, PrimitiveKind::Box, Some(generator))
            .unwrap();
        assert_eq!(
            engine.shadow_generator(generator).unwrap().casters,
            vec![active.root()]
        );
    }
}
