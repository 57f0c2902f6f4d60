//! Retained-mode scene engine.
//!
//! Owns scenes and everything placed in them: meshes, lights, cameras,
//! materials, textures, shadow generators and before-render observers.
//! Every resource is addressed by a small copyable handle and lives until it
//! is disposed, either directly or together with its scene. Live counters
//! make leaked resources observable.
//!
//! Drawing goes through an optional [`Renderer`]. Each frame the engine
//! flattens a scene into a [`FrameSnapshot`] and hands it to the renderer;
//! an engine without one still runs observers and keeps every handle valid.

mod camera;
mod frame;
pub mod gpu;
pub mod import;
mod light;
mod material;
mod mesh;
mod tessellate;

pub use camera::{Camera, CameraInput, CameraKind};
pub use import::{ImportedModel, ImportError};
pub use light::{FilteringQuality, Light, LightKind, ShadowFilter, ShadowGenerator};
pub use material::{
    GridParams, Material, MaterialKind, PbrParams, Texture, TextureKind, TransparencyMode,
};
pub use frame::{
    AmbientLight, CameraView, DrawItem, FrameSnapshot, PointLight, ShadowPass, Shading,
    MAX_POINT_LIGHTS,
};
pub use gpu::{GpuContext, GpuError, Renderer};
pub use mesh::{Aabb, Mesh, MeshGeometry};
pub use tessellate::MeshData;

use glam::{Mat4, Vec3};
use image::RgbaImage;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Entity {
    pub id: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SceneId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShadowGeneratorId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(pub u32);

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("engine has been disposed")]
    Disposed,
    #[error("scene {0:?} is not alive")]
    SceneNotAlive(SceneId),
    #[error("entity {0:?} is not a camera")]
    NotACamera(Entity),
    #[error("entity {0:?} is not a light")]
    NotALight(Entity),
    #[error("invalid capture size {width}x{height}")]
    InvalidCaptureSize { width: u32, height: u32 },
    #[error("no rendering device attached")]
    NoDevice,
    #[error(transparent)]
    Gpu(#[from] GpuError),
}

#[derive(Debug, Clone)]
pub enum EntityKind {
    Mesh(Mesh),
    Light(Light),
    Camera(Camera),
}

#[derive(Debug, Clone)]
struct EntityRecord {
    scene: SceneId,
    kind: EntityKind,
}

/// Callback run before every render of the scene it is registered on.
pub type BeforeRender = Box<dyn FnMut(&mut SceneEntities<'_>)>;

struct SceneRecord {
    clear_color: [f32; 4],
    environment_texture: Option<TextureId>,
    observers: Vec<(ObserverId, BeforeRender)>,
    frames: u64,
}

/// Per-kind resource tallies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceCounts {
    pub scenes: usize,
    pub meshes: usize,
    pub lights: usize,
    pub cameras: usize,
    pub materials: usize,
    pub textures: usize,
    pub shadow_generators: usize,
    pub observers: usize,
}

/// Entity access handed to before-render observers.
pub struct SceneEntities<'a> {
    scene: SceneId,
    entities: &'a mut BTreeMap<Entity, EntityRecord>,
}

impl SceneEntities<'_> {
    pub fn camera(&self, entity: Entity) -> Option<&Camera> {
        match self.entities.get(&entity) {
            Some(EntityRecord {
                scene,
                kind: EntityKind::Camera(camera),
            }) if *scene == self.scene => Some(camera),
            _ => None,
        }
    }

    pub fn light_mut(&mut self, entity: Entity) -> Option<&mut Light> {
        match self.entities.get_mut(&entity) {
            Some(EntityRecord {
                scene,
                kind: EntityKind::Light(light),
            }) if *scene == self.scene => Some(light),
            _ => None,
        }
    }
}

pub struct Engine {
    width: u32,
    height: u32,
    disposed: bool,
    next_id: u32,
    scenes: BTreeMap<SceneId, SceneRecord>,
    entities: BTreeMap<Entity, EntityRecord>,
    materials: HashMap<MaterialId, (SceneId, Material)>,
    textures: HashMap<TextureId, (SceneId, Texture)>,
    shadow_generators: HashMap<ShadowGeneratorId, (SceneId, ShadowGenerator)>,
    created: ResourceCounts,
    renderer: Option<Renderer>,
}

impl Engine {
    /// Engine without a rendering device. Frames run observers only and
    /// [`Engine::capture`] fails with [`EngineError::NoDevice`].
    pub fn new(width: u32, height: u32) -> Self {
        log::info!("Engine created for {}x{} surface", width, height);
        Self {
            width: width.max(1),
            height: height.max(1),
            disposed: false,
            next_id: 1,
            scenes: BTreeMap::new(),
            entities: BTreeMap::new(),
            materials: HashMap::new(),
            textures: HashMap::new(),
            shadow_generators: HashMap::new(),
            created: ResourceCounts::default(),
            renderer: None,
        }
    }

    pub fn with_renderer(renderer: Renderer, width: u32, height: u32) -> Self {
        let mut engine = Self::new(width, height);
        engine.renderer = Some(renderer);
        engine
    }

    pub fn has_renderer(&self) -> bool {
        self.renderer.is_some()
    }

    fn allocate(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width.max(1);
        self.height = height.max(1);
    }

    pub fn backbuffer_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Releases every scene. Later calls are no-ops.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        let scenes: Vec<SceneId> = self.scenes.keys().copied().collect();
        for scene in scenes {
            self.dispose_scene(scene);
        }
        self.renderer = None;
        self.disposed = true;
        log::info!("Engine disposed");
    }

    // ------------------------------------------------------------------
    // Scenes
    // ------------------------------------------------------------------

    pub fn create_scene(&mut self) -> Result<SceneId, EngineError> {
        if self.disposed {
            return Err(EngineError::Disposed);
        }
        let id = SceneId(self.allocate());
        self.scenes.insert(
            id,
            SceneRecord {
                clear_color: [0.0, 0.0, 0.0, 1.0],
                environment_texture: None,
                observers: Vec::new(),
                frames: 0,
            },
        );
        self.created.scenes += 1;
        Ok(id)
    }

    pub fn is_scene_alive(&self, scene: SceneId) -> bool {
        self.scenes.contains_key(&scene)
    }

    fn scene_record(&mut self, scene: SceneId) -> Result<&mut SceneRecord, EngineError> {
        self.scenes
            .get_mut(&scene)
            .ok_or(EngineError::SceneNotAlive(scene))
    }

    pub fn set_clear_color(&mut self, scene: SceneId, color: [f32; 4]) -> Result<(), EngineError> {
        self.scene_record(scene)?.clear_color = color;
        Ok(())
    }

    pub fn clear_color(&self, scene: SceneId) -> Option<[f32; 4]> {
        self.scenes.get(&scene).map(|record| record.clear_color)
    }

    pub fn frames_rendered(&self, scene: SceneId) -> u64 {
        self.scenes.get(&scene).map_or(0, |record| record.frames)
    }

    /// Removes the scene and everything bound to it.
    pub fn dispose_scene(&mut self, scene: SceneId) -> bool {
        let Some(record) = self.scenes.remove(&scene) else {
            return false;
        };
        let entity_count = self.entities.len();
        self.entities.retain(|_, entity| entity.scene != scene);
        self.materials.retain(|_, (owner, _)| *owner != scene);
        self.textures.retain(|_, (owner, _)| *owner != scene);
        self.shadow_generators.retain(|_, (owner, _)| *owner != scene);
        log::debug!(
            "Disposed scene {:?} ({} entities, {} observers)",
            scene,
            entity_count - self.entities.len(),
            record.observers.len()
        );
        true
    }

    // ------------------------------------------------------------------
    // Entities
    // ------------------------------------------------------------------

    fn insert_entity(&mut self, scene: SceneId, kind: EntityKind) -> Result<Entity, EngineError> {
        if !self.scenes.contains_key(&scene) {
            return Err(EngineError::SceneNotAlive(scene));
        }
        match &kind {
            EntityKind::Mesh(_) => self.created.meshes += 1,
            EntityKind::Light(_) => self.created.lights += 1,
            EntityKind::Camera(_) => self.created.cameras += 1,
        }
        let entity = Entity { id: self.allocate() };
        self.entities.insert(entity, EntityRecord { scene, kind });
        Ok(entity)
    }

    pub fn is_alive(&self, entity: Entity) -> bool {
        self.entities.contains_key(&entity)
    }

    pub fn entity_scene(&self, entity: Entity) -> Option<SceneId> {
        self.entities.get(&entity).map(|record| record.scene)
    }

    pub fn scene_entities(&self, scene: SceneId) -> Vec<Entity> {
        self.entities
            .iter()
            .filter(|(_, record)| record.scene == scene)
            .map(|(entity, _)| *entity)
            .collect()
    }

    /// Disposes an entity. Meshes take their children with them and leave
    /// every shadow caster list.
    pub fn dispose_entity(&mut self, entity: Entity) -> bool {
        if self.entities.remove(&entity).is_none() {
            return false;
        }
        for (_, generator) in self.shadow_generators.values_mut() {
            generator.remove_caster(entity);
        }
        let children: Vec<Entity> = self
            .entities
            .iter()
            .filter(|(_, record)| {
                matches!(&record.kind, EntityKind::Mesh(mesh) if mesh.parent == Some(entity))
            })
            .map(|(child, _)| *child)
            .collect();
        for child in children {
            self.dispose_entity(child);
        }
        true
    }

    // ------------------------------------------------------------------
    // Meshes
    // ------------------------------------------------------------------

    pub fn create_mesh(&mut self, scene: SceneId, mesh: Mesh) -> Result<Entity, EngineError> {
        self.insert_entity(scene, EntityKind::Mesh(mesh))
    }

    pub fn create_box(&mut self, scene: SceneId, name: &str, size: f32) -> Result<Entity, EngineError> {
        self.create_mesh(scene, Mesh::new(name, MeshGeometry::Box { size }))
    }

    pub fn create_sphere(
        &mut self,
        scene: SceneId,
        name: &str,
        diameter: f32,
        segments: u32,
    ) -> Result<Entity, EngineError> {
        self.create_mesh(
            scene,
            Mesh::new(name, MeshGeometry::Sphere { diameter, segments }),
        )
    }

    pub fn create_cylinder(
        &mut self,
        scene: SceneId,
        name: &str,
        height: f32,
        diameter: f32,
    ) -> Result<Entity, EngineError> {
        self.create_mesh(
            scene,
            Mesh::new(name, MeshGeometry::Cylinder { height, diameter }),
        )
    }

    pub fn create_torus(
        &mut self,
        scene: SceneId,
        name: &str,
        diameter: f32,
        thickness: f32,
    ) -> Result<Entity, EngineError> {
        self.create_mesh(
            scene,
            Mesh::new(
                name,
                MeshGeometry::Torus {
                    diameter,
                    thickness,
                },
            ),
        )
    }

    pub fn create_ground(
        &mut self,
        scene: SceneId,
        name: &str,
        width: f32,
        height: f32,
    ) -> Result<Entity, EngineError> {
        self.create_mesh(scene, Mesh::new(name, MeshGeometry::Ground { width, height }))
    }

    pub fn create_plane(
        &mut self,
        scene: SceneId,
        name: &str,
        width: f32,
        height: f32,
    ) -> Result<Entity, EngineError> {
        self.create_mesh(scene, Mesh::new(name, MeshGeometry::Plane { width, height }))
    }

    /// Adds an imported model as a root node with one child per sub-mesh.
    /// Returns the root followed by the children in file order.
    pub fn import_meshes(
        &mut self,
        scene: SceneId,
        model: &ImportedModel,
    ) -> Result<(Entity, Vec<Entity>), EngineError> {
        let root = self.create_mesh(scene, Mesh::new("__root__", MeshGeometry::Node))?;
        let mut children = Vec::with_capacity(model.meshes.len());
        for imported in &model.meshes {
            let mut mesh = Mesh::new(&imported.name, MeshGeometry::Imported(imported.clone()));
            mesh.parent = Some(root);
            children.push(self.create_mesh(scene, mesh)?);
        }
        Ok((root, children))
    }

    pub fn mesh(&self, entity: Entity) -> Option<&Mesh> {
        match self.entities.get(&entity) {
            Some(EntityRecord {
                kind: EntityKind::Mesh(mesh),
                ..
            }) => Some(mesh),
            _ => None,
        }
    }

    pub fn mesh_mut(&mut self, entity: Entity) -> Option<&mut Mesh> {
        match self.entities.get_mut(&entity) {
            Some(EntityRecord {
                kind: EntityKind::Mesh(mesh),
                ..
            }) => Some(mesh),
            _ => None,
        }
    }

    pub fn world_matrix(&self, entity: Entity) -> Option<Mat4> {
        let mesh = self.mesh(entity)?;
        let local = mesh.local_matrix();
        match mesh.parent {
            Some(parent) => Some(self.world_matrix(parent).unwrap_or(Mat4::IDENTITY) * local),
            None => Some(local),
        }
    }

    pub fn world_bounds(&self, entity: Entity) -> Option<Aabb> {
        let mesh = self.mesh(entity)?;
        let matrix = self.world_matrix(entity)?;
        Some(mesh.geometry.local_bounds().transformed(&matrix))
    }

    // ------------------------------------------------------------------
    // Lights, cameras, shadows
    // ------------------------------------------------------------------

    pub fn create_hemispheric_light(
        &mut self,
        scene: SceneId,
        name: &str,
        direction: Vec3,
        intensity: f32,
    ) -> Result<Entity, EngineError> {
        self.insert_entity(
            scene,
            EntityKind::Light(Light {
                name: name.to_string(),
                kind: LightKind::Hemispheric,
                position: direction,
                intensity,
            }),
        )
    }

    pub fn create_point_light(
        &mut self,
        scene: SceneId,
        name: &str,
        position: Vec3,
        intensity: f32,
    ) -> Result<Entity, EngineError> {
        self.insert_entity(
            scene,
            EntityKind::Light(Light {
                name: name.to_string(),
                kind: LightKind::Point,
                position,
                intensity,
            }),
        )
    }

    pub fn light(&self, entity: Entity) -> Option<&Light> {
        match self.entities.get(&entity) {
            Some(EntityRecord {
                kind: EntityKind::Light(light),
                ..
            }) => Some(light),
            _ => None,
        }
    }

    pub fn create_camera(&mut self, scene: SceneId, camera: Camera) -> Result<Entity, EngineError> {
        self.insert_entity(scene, EntityKind::Camera(camera))
    }

    pub fn camera(&self, entity: Entity) -> Option<&Camera> {
        match self.entities.get(&entity) {
            Some(EntityRecord {
                kind: EntityKind::Camera(camera),
                ..
            }) => Some(camera),
            _ => None,
        }
    }

    pub fn camera_mut(&mut self, entity: Entity) -> Option<&mut Camera> {
        match self.entities.get_mut(&entity) {
            Some(EntityRecord {
                kind: EntityKind::Camera(camera),
                ..
            }) => Some(camera),
            _ => None,
        }
    }

    pub fn create_shadow_generator(
        &mut self,
        scene: SceneId,
        light: Entity,
        map_size: u32,
    ) -> Result<ShadowGeneratorId, EngineError> {
        if !self.scenes.contains_key(&scene) {
            return Err(EngineError::SceneNotAlive(scene));
        }
        if self.light(light).is_none() {
            return Err(EngineError::NotALight(light));
        }
        let id = ShadowGeneratorId(self.allocate());
        self.shadow_generators
            .insert(id, (scene, ShadowGenerator::new(light, map_size)));
        self.created.shadow_generators += 1;
        Ok(id)
    }

    pub fn shadow_generator(&self, id: ShadowGeneratorId) -> Option<&ShadowGenerator> {
        self.shadow_generators.get(&id).map(|(_, generator)| generator)
    }

    pub fn shadow_generator_mut(&mut self, id: ShadowGeneratorId) -> Option<&mut ShadowGenerator> {
        self.shadow_generators
            .get_mut(&id)
            .map(|(_, generator)| generator)
    }

    // ------------------------------------------------------------------
    // Materials and textures
    // ------------------------------------------------------------------

    pub fn create_texture(
        &mut self,
        scene: SceneId,
        path: &Path,
        kind: TextureKind,
    ) -> Result<TextureId, EngineError> {
        if !self.scenes.contains_key(&scene) {
            return Err(EngineError::SceneNotAlive(scene));
        }
        if !path.exists() {
            log::warn!("Texture source not found (loading anyway): {}", path.display());
        }
        let id = TextureId(self.allocate());
        self.textures.insert(
            id,
            (
                scene,
                Texture {
                    path: path.to_path_buf(),
                    kind,
                },
            ),
        );
        self.created.textures += 1;
        Ok(id)
    }

    pub fn texture(&self, id: TextureId) -> Option<&Texture> {
        self.textures.get(&id).map(|(_, texture)| texture)
    }

    pub fn create_material(
        &mut self,
        scene: SceneId,
        name: &str,
        kind: MaterialKind,
    ) -> Result<MaterialId, EngineError> {
        if !self.scenes.contains_key(&scene) {
            return Err(EngineError::SceneNotAlive(scene));
        }
        let mut textures = Vec::new();
        if let MaterialKind::Pbr(PbrParams {
            albedo_texture: Some(path),
            ..
        }) = &kind
        {
            textures.push(self.create_texture(scene, path, TextureKind::Image)?);
        }
        let id = MaterialId(self.allocate());
        self.materials.insert(
            id,
            (
                scene,
                Material {
                    name: name.to_string(),
                    kind,
                    textures,
                },
            ),
        );
        self.created.materials += 1;
        Ok(id)
    }

    pub fn material(&self, id: MaterialId) -> Option<&Material> {
        self.materials.get(&id).map(|(_, material)| material)
    }

    /// Disposes a material with its textures and unbinds it from meshes.
    pub fn dispose_material(&mut self, id: MaterialId) -> bool {
        let Some((_, material)) = self.materials.remove(&id) else {
            return false;
        };
        for texture in material.textures {
            self.textures.remove(&texture);
        }
        for record in self.entities.values_mut() {
            if let EntityKind::Mesh(mesh) = &mut record.kind {
                if mesh.material == Some(id) {
                    mesh.material = None;
                }
            }
        }
        true
    }

    pub fn set_mesh_material(&mut self, entity: Entity, material: MaterialId) -> bool {
        if !self.materials.contains_key(&material) {
            return false;
        }
        let Some(mesh) = self.mesh_mut(entity) else {
            return false;
        };
        mesh.material = Some(material);
        true
    }

    pub fn set_environment_texture(
        &mut self,
        scene: SceneId,
        texture: Option<TextureId>,
    ) -> Result<(), EngineError> {
        self.scene_record(scene)?.environment_texture = texture;
        Ok(())
    }

    pub fn environment_texture(&self, scene: SceneId) -> Option<TextureId> {
        self.scenes
            .get(&scene)
            .and_then(|record| record.environment_texture)
    }

    /// Large inward-facing box textured with the environment cubemap.
    pub fn create_default_skybox(
        &mut self,
        scene: SceneId,
        texture: TextureId,
        size: f32,
    ) -> Result<Entity, EngineError> {
        let material = self.create_material(scene, "skyBox", MaterialKind::Skybox)?;
        let mut mesh = Mesh::new("hdrSkyBox", MeshGeometry::Box { size });
        mesh.material = Some(material);
        mesh.infinite_distance = true;
        let entity = self.create_mesh(scene, mesh)?;
        self.set_environment_texture(scene, Some(texture))?;
        Ok(entity)
    }

    // ------------------------------------------------------------------
    // Frame loop
    // ------------------------------------------------------------------

    pub fn add_before_render(
        &mut self,
        scene: SceneId,
        observer: BeforeRender,
    ) -> Result<ObserverId, EngineError> {
        let id = ObserverId(self.allocate());
        self.scene_record(scene)?.observers.push((id, observer));
        self.created.observers += 1;
        Ok(id)
    }

    pub fn remove_before_render(&mut self, scene: SceneId, id: ObserverId) -> bool {
        let Some(record) = self.scenes.get_mut(&scene) else {
            return false;
        };
        let before = record.observers.len();
        record.observers.retain(|(observer, _)| *observer != id);
        record.observers.len() != before
    }

    /// Runs the scene's observers and accounts one frame.
    pub fn render(&mut self, scene: SceneId) -> Result<(), EngineError> {
        if self.disposed {
            return Err(EngineError::Disposed);
        }
        let mut observers = std::mem::take(&mut self.scene_record(scene)?.observers);
        {
            let mut view = SceneEntities {
                scene,
                entities: &mut self.entities,
            };
            for (_, observer) in observers.iter_mut() {
                observer(&mut view);
            }
        }
        let record = self.scene_record(scene)?;
        record.observers = observers;
        record.frames += 1;
        Ok(())
    }

    /// Flattens `scene` as seen from `camera` into a `width` x `height`
    /// frame description.
    pub fn snapshot(
        &self,
        scene: SceneId,
        camera: Entity,
        width: u32,
        height: u32,
    ) -> Result<FrameSnapshot<'_>, EngineError> {
        if self.disposed {
            return Err(EngineError::Disposed);
        }
        if width == 0 || height == 0 {
            return Err(EngineError::InvalidCaptureSize { width, height });
        }
        let record = self
            .scenes
            .get(&scene)
            .ok_or(EngineError::SceneNotAlive(scene))?;
        let view = match self.entities.get(&camera) {
            Some(EntityRecord {
                scene: owner,
                kind: EntityKind::Camera(camera),
            }) if *owner == scene => CameraView::from_camera(camera, width as f32 / height as f32),
            _ => return Err(EngineError::NotACamera(camera)),
        };

        let generator = self
            .shadow_generators
            .iter()
            .filter(|(_, (owner, _))| *owner == scene)
            .min_by_key(|(id, _)| **id)
            .map(|(_, (_, generator))| generator);
        let shadow_light = generator.map(|generator| generator.light);

        let mut sky = Vec3::ZERO;
        let mut sky_intensity = 0.0;
        let mut point_lights: Vec<(Entity, PointLight)> = Vec::new();
        let mut skybox = false;
        let mut items = Vec::new();
        for (entity, entity_record) in &self.entities {
            if entity_record.scene != scene {
                continue;
            }
            match &entity_record.kind {
                EntityKind::Light(light) => match light.kind {
                    LightKind::Hemispheric => {
                        sky += light.position.normalize_or_zero() * light.intensity;
                        sky_intensity += light.intensity;
                    }
                    LightKind::Point => point_lights.push((
                        *entity,
                        PointLight {
                            position: light.position,
                            intensity: light.intensity,
                        },
                    )),
                },
                EntityKind::Mesh(mesh) => {
                    let material = mesh
                        .material
                        .and_then(|id| self.material(id))
                        .map(|material| &material.kind);
                    let Some((shading, blend)) = frame::resolve_shading(material) else {
                        skybox = true;
                        continue;
                    };
                    if mesh.geometry.vertex_count() == 0 {
                        continue;
                    }
                    let Some(world) = self.world_matrix(*entity) else {
                        continue;
                    };
                    items.push(DrawItem {
                        entity: *entity,
                        geometry: &mesh.geometry,
                        world,
                        shading,
                        blend,
                        receive_shadows: mesh.receive_shadows,
                    });
                }
                EntityKind::Camera(_) => {}
            }
        }

        // The shadow light leads so the shader can pair it with the map.
        point_lights.sort_by_key(|(entity, _)| Some(*entity) != shadow_light);
        if point_lights.len() > MAX_POINT_LIGHTS {
            log::debug!(
                "Scene {:?} has {} point lights; drawing the first {}",
                scene,
                point_lights.len(),
                MAX_POINT_LIGHTS
            );
            point_lights.truncate(MAX_POINT_LIGHTS);
        }
        let shadow = generator.and_then(|generator| {
            let (first, light) = point_lights.first()?;
            if *first != generator.light {
                return None;
            }
            let casters: Vec<Entity> = generator
                .casters
                .iter()
                .copied()
                .filter(|caster| self.is_alive(*caster))
                .collect();
            let bounds = casters
                .iter()
                .filter_map(|caster| self.world_bounds(*caster))
                .reduce(|a, b| a.union(&b));
            Some(ShadowPass {
                map_size: generator.map_size,
                view_projection: frame::shadow_view_projection(light.position, bounds),
                bias: generator.bias,
                filter_radius: frame::filter_radius(generator.filter),
                casters,
            })
        });

        Ok(FrameSnapshot {
            width,
            height,
            clear_color: record.clear_color,
            camera: view,
            ambient: (sky_intensity > 0.0).then(|| AmbientLight {
                direction: sky.try_normalize().unwrap_or(Vec3::Y),
                intensity: sky_intensity,
            }),
            point_lights: point_lights.into_iter().map(|(_, light)| light).collect(),
            shadow,
            environment: record
                .environment_texture
                .and_then(|id| self.texture(id))
                .map(|texture| texture.path.as_path()),
            skybox,
            items,
        })
    }

    /// Draws `scene` from `camera` into `target`, a view of the surface at
    /// the backbuffer size.
    pub fn draw(
        &mut self,
        scene: SceneId,
        camera: Entity,
        target: &wgpu::TextureView,
        format: wgpu::TextureFormat,
    ) -> Result<(), EngineError> {
        let mut renderer = self.renderer.take().ok_or(EngineError::NoDevice)?;
        let result = self
            .snapshot(scene, camera, self.width, self.height)
            .map(|frame| renderer.render(&frame, target, format));
        self.renderer = Some(renderer);
        result
    }

    /// Renders the scene from `camera` into an off-screen target and reads
    /// the pixels back.
    pub fn capture(
        &mut self,
        scene: SceneId,
        camera: Entity,
        width: u32,
        height: u32,
    ) -> Result<RgbaImage, EngineError> {
        if width == 0 || height == 0 {
            return Err(EngineError::InvalidCaptureSize { width, height });
        }
        if self.entity_scene(camera) != Some(scene) || self.camera(camera).is_none() {
            return Err(EngineError::NotACamera(camera));
        }
        if self.renderer.is_none() {
            return Err(EngineError::NoDevice);
        }
        self.render(scene)?;
        let mut renderer = self.renderer.take().ok_or(EngineError::NoDevice)?;
        let result = self
            .snapshot(scene, camera, width, height)
            .and_then(|frame| renderer.render_to_image(&frame).map_err(EngineError::from));
        self.renderer = Some(renderer);
        result
    }

    // ------------------------------------------------------------------
    // Accounting
    // ------------------------------------------------------------------

    pub fn live_counts(&self) -> ResourceCounts {
        let mut counts = ResourceCounts {
            scenes: self.scenes.len(),
            materials: self.materials.len(),
            textures: self.textures.len(),
            shadow_generators: self.shadow_generators.len(),
            observers: self
                .scenes
                .values()
                .map(|record| record.observers.len())
                .sum(),
            ..ResourceCounts::default()
        };
        for record in self.entities.values() {
            match record.kind {
                EntityKind::Mesh(_) => counts.meshes += 1,
                EntityKind::Light(_) => counts.lights += 1,
                EntityKind::Camera(_) => counts.cameras += 1,
            }
        }
        counts
    }

    /// Totals of everything ever created, disposed or not.
    pub fn created_counts(&self) -> ResourceCounts {
        self.created
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn test_dispose_scene_releases_everything() {
        let mut engine = Engine::new(640, 480);
        let scene = engine.create_scene().unwrap();
        let light = engine
            .create_point_light(scene, "light", Vec3::Y, 1.0)
            .unwrap();
        engine.create_box(scene, "box", 1.0).unwrap();
        engine
            .create_material(scene, "mat", MaterialKind::Pbr(PbrParams::default()))
            .unwrap();
        engine.create_shadow_generator(scene, light, 512).unwrap();
        engine
            .add_before_render(scene, Box::new(|_view: &mut SceneEntities<'_>| {}))
            .unwrap();

        assert!(engine.dispose_scene(scene));
        assert_eq!(engine.live_counts(), ResourceCounts::default());
        assert!(!engine.dispose_scene(scene));
    }

    #[test]
    fn test_dispose_mesh_removes_children_and_casters() {
        let mut engine = Engine::new(640, 480);
        let scene = engine.create_scene().unwrap();
        let model = ImportedModel {
            source_name: "m.obj".to_string(),
            meshes: vec![import::ImportedMesh {
                name: "part".to_string(),
                positions: vec![Vec3::ZERO, Vec3::ONE],
                ..Default::default()
            }],
        };
        let (root, children) = engine.import_meshes(scene, &model).unwrap();
        let light = engine
            .create_point_light(scene, "light", Vec3::Y, 1.0)
            .unwrap();
        let generator = engine.create_shadow_generator(scene, light, 512).unwrap();
        engine
            .shadow_generator_mut(generator)
            .unwrap()
            .add_caster(children[0]);

        assert!(engine.dispose_entity(root));
        assert!(!engine.is_alive(children[0]));
        assert!(engine.shadow_generator(generator).unwrap().casters.is_empty());
    }

    #[test]
    fn test_dispose_material_takes_texture() {
        let mut engine = Engine::new(640, 480);
        let scene = engine.create_scene().unwrap();
        let params = PbrParams {
            albedo_texture: Some("textures/wood.jpg".into()),
            ..PbrParams::default()
        };
        let material = engine
            .create_material(scene, "wood", MaterialKind::Pbr(params))
            .unwrap();
        let mesh = engine.create_box(scene, "box", 1.0).unwrap();
        assert!(engine.set_mesh_material(mesh, material));
        assert_eq!(engine.live_counts().textures, 1);

        assert!(engine.dispose_material(material));
        assert_eq!(engine.live_counts().textures, 0);
        assert_eq!(engine.mesh(mesh).unwrap().material, None);
    }

    #[test]
    fn test_render_runs_observers_until_removed() {
        let mut engine = Engine::new(640, 480);
        let scene = engine.create_scene().unwrap();
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        let id = engine
            .add_before_render(
                scene,
                Box::new(move |_view: &mut SceneEntities<'_>| counter.set(counter.get() + 1)),
            )
            .unwrap();
        engine.render(scene).unwrap();
        engine.render(scene).unwrap();
        assert!(engine.remove_before_render(scene, id));
        engine.render(scene).unwrap();
        assert_eq!(calls.get(), 2);
        assert_eq!(engine.frames_rendered(scene), 3);
    }

    #[test]
    fn test_capture_without_device_is_an_error() {
        let mut engine = Engine::new(320, 200);
        let scene = engine.create_scene().unwrap();
        let camera = engine
            .create_camera(scene, Camera::universal("cam", Vec3::ZERO))
            .unwrap();
        assert!(matches!(
            engine.capture(scene, camera, 0, 1080),
            Err(EngineError::InvalidCaptureSize { .. })
        ));
        assert!(matches!(
            engine.capture(scene, camera, 1920, 1080),
            Err(EngineError::NoDevice)
        ));
        assert_eq!(engine.frames_rendered(scene), 0);
    }

    #[test]
    fn test_snapshot_puts_shadow_light_first() {
        let mut engine = Engine::new(320, 200);
        let scene = engine.create_scene().unwrap();
        engine.set_clear_color(scene, [0.2, 0.2, 0.3, 1.0]).unwrap();
        engine
            .create_hemispheric_light(scene, "sky", Vec3::Y, 0.6)
            .unwrap();
        engine
            .create_point_light(scene, "fill", Vec3::new(-3.0, 2.0, 0.0), 0.3)
            .unwrap();
        let key = engine
            .create_point_light(scene, "key", Vec3::new(2.0, 5.0, -2.0), 0.8)
            .unwrap();
        let shape = engine.create_box(scene, "box", 1.0).unwrap();
        let generator = engine.create_shadow_generator(scene, key, 1024).unwrap();
        engine
            .shadow_generator_mut(generator)
            .unwrap()
            .add_caster(shape);
        let camera = engine
            .create_camera(scene, Camera::arc_rotate("cam", 1.0, 1.0, 5.0, Vec3::ZERO))
            .unwrap();

        let frame = engine.snapshot(scene, camera, 1920, 1080).unwrap();
        assert_eq!(frame.clear_color, [0.2, 0.2, 0.3, 1.0]);
        assert_eq!(frame.point_lights[0].intensity, 0.8);
        assert_eq!(frame.point_lights.len(), 2);
        assert_eq!(frame.ambient.unwrap().intensity, 0.6);
        let shadow = frame.shadow.as_ref().unwrap();
        assert_eq!(shadow.casters, vec![shape]);
        assert_eq!(shadow.map_size, 1024);
        assert_eq!(frame.item(shape).unwrap().shading, Shading::DEFAULT);
        assert!(!frame.skybox);
    }

    #[test]
    fn test_snapshot_draws_skybox_as_background() {
        let mut engine = Engine::new(320, 200);
        let scene = engine.create_scene().unwrap();
        let texture = engine
            .create_texture(scene, Path::new("textures/night.env"), TextureKind::PrefilteredCube)
            .unwrap();
        let skybox = engine.create_default_skybox(scene, texture, 1000.0).unwrap();
        let camera = engine
            .create_camera(scene, Camera::universal("cam", Vec3::new(0.0, 0.0, -5.0)))
            .unwrap();

        let frame = engine.snapshot(scene, camera, 64, 64).unwrap();
        assert!(frame.skybox);
        assert!(frame.item(skybox).is_none());
        assert_eq!(frame.environment, Some(Path::new("textures/night.env")));
        assert!(frame.ambient.is_none());
        assert!(frame.shadow.is_none());
    }

    #[test]
    fn test_snapshot_rejects_foreign_camera() {
        let mut engine = Engine::new(320, 200);
        let scene = engine.create_scene().unwrap();
        let other = engine.create_scene().unwrap();
        let camera = engine
            .create_camera(other, Camera::universal("cam", Vec3::ZERO))
            .unwrap();
        assert!(matches!(
            engine.snapshot(scene, camera, 64, 64),
            Err(EngineError::NotACamera(_))
        ));
    }

    #[test]
    fn test_capture_draws_mesh_over_clear_color() {
        let Ok(context) = GpuContext::headless() else {
            eprintln!("no GPU adapter; skipping");
            return;
        };
        let mut engine = Engine::with_renderer(Renderer::new(&context), 64, 64);
        let scene = engine.create_scene().unwrap();
        engine.set_clear_color(scene, [0.0, 0.0, 1.0, 1.0]).unwrap();
        engine
            .create_point_light(scene, "light", Vec3::new(0.0, 0.0, -5.0), 1.0)
            .unwrap();
        let material = engine
            .create_material(
                scene,
                "red",
                MaterialKind::Pbr(PbrParams {
                    albedo_color: Vec3::X,
                    ..PbrParams::default()
                }),
            )
            .unwrap();
        let shape = engine.create_box(scene, "box", 1.0).unwrap();
        engine.set_mesh_material(shape, material);
        let camera = engine
            .create_camera(scene, Camera::universal("cam", Vec3::new(0.0, 0.0, -4.0)))
            .unwrap();

        let image = engine.capture(scene, camera, 64, 48).unwrap();
        assert_eq!(image.dimensions(), (64, 48));
        assert_eq!(image.get_pixel(0, 0).0, [0, 0, 255, 255]);
        let center = image.get_pixel(32, 24).0;
        assert!(center[0] > center[2], "{center:?}");
        assert_eq!(engine.frames_rendered(scene), 1);
    }

    #[test]
    fn test_builders_fail_on_dead_scene() {
        let mut engine = Engine::new(320, 200);
        let scene = engine.create_scene().unwrap();
        engine.dispose_scene(scene);
        assert!(matches!(
            engine.create_box(scene, "box", 1.0),
            Err(EngineError::SceneNotAlive(_))
        ));
    }

    #[test]
    fn test_dispose_is_idempotent() {
        let mut engine = Engine::new(320, 200);
        engine.create_scene().unwrap();
        engine.dispose();
        engine.dispose();
        assert!(engine.is_disposed());
        assert!(engine.create_scene().is_err());
        assert_eq!(engine.live_counts().scenes, 0);
    }
}
