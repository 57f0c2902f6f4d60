//! One environment's worth of scene resources.
//!
//! A session owns the scene together with its camera, lights, staging,
//! shadow generator, active mesh and active material. The handles are only
//! released as a whole through [`SceneSession::close`].

use crate::assets::AssetPaths;
use crate::engine::{Engine, EngineError, Entity, MaterialId, SceneId, ShadowGeneratorId};
use crate::scene::environment::{build_environment, move_room_camera, EnvironmentActors};
use crate::scene::material::bind_material;
use crate::scene::shape::ActiveMesh;
use crate::scene::{EnvironmentKind, MaterialPreset};

#[derive(Debug)]
pub struct SceneSession {
    scene: SceneId,
    environment: EnvironmentKind,
    actors: EnvironmentActors,
    room_offset: f32,
    mesh: Option<ActiveMesh>,
    material: Option<MaterialId>,
}

impl SceneSession {
    /// Creates a scene and builds the environment into it.
    pub fn open(
        engine: &mut Engine,
        environment: EnvironmentKind,
        assets: &AssetPaths,
    ) -> Result<Self, EngineError> {
        let scene = engine.create_scene()?;
        let actors = match build_environment(engine, scene, environment, assets, 0.0) {
            Ok(actors) => actors,
            Err(err) => {
                engine.dispose_scene(scene);
                return Err(err);
            }
        };
        log::info!("Scene session opened for '{}' ({:?})", environment, scene);
        Ok(Self {
            scene,
            environment,
            actors,
            room_offset: 0.0,
            mesh: None,
            material: None,
        })
    }

    /// Tears the session down: follow observer, mesh, material, then the
    /// scene with everything left in it.
    pub fn close(mut self, engine: &mut Engine) {
        if let Some(observer) = self.actors.follow_observer.take() {
            engine.remove_before_render(self.scene, observer);
        }
        self.clear_mesh(engine);
        self.clear_material(engine);
        engine.dispose_scene(self.scene);
        log::info!(
            "Scene session closed for '{}' ({:?})",
            self.environment,
            self.scene
        );
    }

    pub fn scene(&self) -> SceneId {
        self.scene
    }

    pub fn environment(&self) -> EnvironmentKind {
        self.environment
    }

    pub fn actors(&self) -> &EnvironmentActors {
        &self.actors
    }

    pub fn camera(&self) -> Option<Entity> {
        self.actors.camera
    }

    pub fn shadow_generator(&self) -> Option<ShadowGeneratorId> {
        self.actors.shadow_generator
    }

    pub fn is_alive(&self, engine: &Engine) -> bool {
        engine.is_scene_alive(self.scene)
    }

    pub fn room_offset(&self) -> f32 {
        self.room_offset
    }

    /// Moves the room camera. Only the room environment has a slider, so
    /// other sessions ignore this and return `None`.
    pub fn set_room_offset(&mut self, engine: &mut Engine, offset: f32) -> Option<f32> {
        if self.environment != EnvironmentKind::Room {
            return None;
        }
        let applied = move_room_camera(engine, self.actors.camera?, offset)?;
        self.room_offset = applied;
        Some(applied)
    }

    pub fn mesh(&self) -> Option<&ActiveMesh> {
        self.mesh.as_ref()
    }

    pub fn material(&self) -> Option<MaterialId> {
        self.material
    }

    /// Installs a new active mesh, disposing the previous one.
    pub fn set_mesh(&mut self, engine: &mut Engine, mesh: ActiveMesh) {
        self.clear_mesh(engine);
        self.mesh = Some(mesh);
    }

    pub fn clear_mesh(&mut self, engine: &mut Engine) {
        if let Some(previous) = self.mesh.take() {
            engine.dispose_entity(previous.root());
            log::debug!("Disposed mesh {:?}", previous.root());
        }
    }

    /// Binds `preset` to the active mesh. Without a mesh the previous
    /// material is released and nothing new is created.
    pub fn bind_material(
        &mut self,
        engine: &mut Engine,
        preset: MaterialPreset,
        assets: &AssetPaths,
    ) -> Result<(), EngineError> {
        let Some(mesh) = self.mesh.as_ref() else {
            self.clear_material(engine);
            return Ok(());
        };
        let targets = mesh.surfaces();
        let previous = self.material.take();
        self.material = Some(bind_material(
            engine, self.scene, preset, assets, &targets, previous,
        )?);
        Ok(())
    }

    pub fn clear_material(&mut self, engine: &mut Engine) {
        if let Some(previous) = self.material.take() {
            engine.dispose_material(previous);
            log::debug!("Disposed material {:?}", previous);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ResourceCounts;
    use crate::scene::shape::resolve_primitive;
    use crate::scene::PrimitiveKind;

    #[test]
    fn test_close_releases_every_resource() {
        let assets = AssetPaths::new("assets");
        let mut engine = Engine::new(320, 200);
        for environment in EnvironmentKind::ALL {
            let mut session = SceneSession::open(&mut engine, environment, &assets).unwrap();
            let mesh = resolve_primitive(
                &mut engine,
                session.scene(),
                PrimitiveKind::Sphere,
                session.shadow_generator(),
            )
            .unwrap();
            session.set_mesh(&mut engine, mesh);
            session
                .bind_material(&mut engine, MaterialPreset::Wood, &assets)
                .unwrap();
            session.close(&mut engine);
            assert_eq!(engine.live_counts(), ResourceCounts::default(), "{environment}");
        }
    }

    #[test]
    fn test_set_mesh_disposes_previous() {
        let assets = AssetPaths::new("assets");
        let mut engine = Engine::new(320, 200);
        let mut session = SceneSession::open(&mut engine, EnvironmentKind::Road, &assets).unwrap();
        let scene = session.scene();
        let first = resolve_primitive(&mut engine, scene, PrimitiveKind::Box, None).unwrap();
        let first_root = first.root();
        session.set_mesh(&mut engine, first);
        let second = resolve_primitive(&mut engine, scene, PrimitiveKind::Torus, None).unwrap();
        session.set_mesh(&mut engine, second);
        assert!(!engine.is_alive(first_root));
        assert!(engine.is_alive(session.mesh().unwrap().root()));
    }

    #[test]
    fn test_room_offset_only_applies_in_room() {
        let assets = AssetPaths::new("assets");
        let mut engine = Engine::new(320, 200);
        let mut road = SceneSession::open(&mut engine, EnvironmentKind::Road, &assets).unwrap();
        assert_eq!(road.set_room_offset(&mut engine, 2.0), None);
        assert_eq!(road.room_offset(), 0.0);
        road.close(&mut engine);

        let mut room = SceneSession::open(&mut engine, EnvironmentKind::Room, &assets).unwrap();
        assert_eq!(room.set_room_offset(&mut engine, 2.0), Some(2.0));
        let camera = engine.camera(room.camera().unwrap()).unwrap();
        assert_eq!(camera.position.x, 2.0);
    }

    #[test]
    fn test_material_without_mesh_is_released() {
        let assets = AssetPaths::new("assets");
        let mut engine = Engine::new(320, 200);
        let mut session = SceneSession::open(&mut engine, EnvironmentKind::None, &assets).unwrap();
        let mesh = resolve_primitive(&mut engine, session.scene(), PrimitiveKind::Box, None).unwrap();
        session.set_mesh(&mut engine, mesh);
        session
            .bind_material(&mut engine, MaterialPreset::Metal, &assets)
            .unwrap();
        let staged_materials = engine.live_counts().materials - 1;

        session.clear_mesh(&mut engine);
        session
            .bind_material(&mut engine, MaterialPreset::Metal, &assets)
            .unwrap();
        assert!(session.material().is_none());
        assert_eq!(engine.live_counts().materials, staged_materials);
    }
}
