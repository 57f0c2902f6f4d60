//! Scene lifecycle controller.
//!
//! Holds the user's selections and keeps the engine-side resources in step
//! with them. Every resource category has a dependency snapshot; an update
//! only rebuilds a category when its snapshot changed, disposing the old
//! resource first.

use crate::assets::{AssetPaths, ImportResult, ImportWorker, ModelLibrary, UploadedModel};
use crate::engine::{CameraInput, Engine, EngineError, Entity, FrameSnapshot, Renderer};
use crate::scene::capture::{DEFAULT_CAPTURE_HEIGHT, DEFAULT_CAPTURE_WIDTH};
use crate::scene::shape::{attach_import, prepare_import, resolve_primitive};
use crate::scene::{
    EnvironmentKind, FrameCapture, MaterialPreset, SceneSession, Screenshot, ShapeSelection,
};
use std::time::{Duration, Instant};

/// User-driven state changes.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewerEvent {
    /// Selector value: a primitive name or an uploaded model's name.
    SelectShape(String),
    SelectMaterial(MaterialPreset),
    SelectEnvironment(EnvironmentKind),
    /// Appends the model to the library and selects it.
    UploadModel(UploadedModel),
    SetRoomOffset(f32),
}

#[derive(Debug, Clone, PartialEq)]
struct MeshDeps {
    shape: ShapeSelection,
    models_revision: u64,
    material: MaterialPreset,
    session: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct MaterialDeps {
    preset: MaterialPreset,
    mesh: Option<Entity>,
    session: u64,
}

pub struct SceneController {
    assets: AssetPaths,
    capture_size: (u32, u32),

    shape: ShapeSelection,
    material: MaterialPreset,
    environment: EnvironmentKind,
    library: ModelLibrary,

    engine: Option<Engine>,
    session: Option<SceneSession>,
    worker: Option<ImportWorker>,

    session_generation: u64,
    environment_deps: Option<EnvironmentKind>,
    mesh_deps: Option<MeshDeps>,
    material_deps: Option<MaterialDeps>,

    import_epoch: u64,
    pending_import: Option<u64>,
    status: Option<String>,
}

impl SceneController {
    pub fn new(assets: AssetPaths) -> Self {
        Self {
            assets,
            capture_size: (DEFAULT_CAPTURE_WIDTH, DEFAULT_CAPTURE_HEIGHT),
            shape: ShapeSelection::default(),
            material: MaterialPreset::default(),
            environment: EnvironmentKind::default(),
            library: ModelLibrary::new(),
            engine: None,
            session: None,
            worker: None,
            session_generation: 0,
            environment_deps: None,
            mesh_deps: None,
            material_deps: None,
            import_epoch: 0,
            pending_import: None,
            status: None,
        }
    }

    /// Selections used at mount time.
    pub fn with_selection(
        mut self,
        shape: ShapeSelection,
        material: MaterialPreset,
        environment: EnvironmentKind,
    ) -> Self {
        self.shape = shape;
        self.material = material;
        self.environment = environment;
        self
    }

    pub fn with_capture_size(mut self, width: u32, height: u32) -> Self {
        self.capture_size = (width, height);
        self
    }

    // ------------------------------------------------------------------
    // Surface lifecycle
    // ------------------------------------------------------------------

    /// Creates an engine without a rendering device for a surface of the
    /// given size and builds the current selections. Returns `false` if
    /// already mounted.
    pub fn mount(&mut self, width: u32, height: u32) -> bool {
        self.mount_engine(|| Engine::new(width, height))
    }

    /// Like [`SceneController::mount`], drawing through `renderer`.
    pub fn mount_with_renderer(&mut self, renderer: Renderer, width: u32, height: u32) -> bool {
        self.mount_engine(|| Engine::with_renderer(renderer, width, height))
    }

    fn mount_engine(&mut self, create: impl FnOnce() -> Engine) -> bool {
        if self.engine.is_some() {
            log::debug!("Scene controller already mounted");
            return false;
        }
        let engine = create();
        let (width, height) = engine.backbuffer_size();
        self.engine = Some(engine);
        self.worker = Some(ImportWorker::spawn());
        log::info!("Scene controller mounted ({}x{})", width, height);
        self.update();
        true
    }

    /// Releases the session, engine and import worker. Safe to call twice.
    pub fn unmount(&mut self) {
        let Some(mut engine) = self.engine.take() else {
            return;
        };
        if let Some(session) = self.session.take() {
            session.close(&mut engine);
        }
        engine.dispose();
        if let Some(mut worker) = self.worker.take() {
            worker.stop();
        }
        self.environment_deps = None;
        self.mesh_deps = None;
        self.material_deps = None;
        self.pending_import = None;
        log::info!("Scene controller unmounted");
    }

    pub fn is_mounted(&self) -> bool {
        self.engine.is_some()
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if let Some(engine) = self.engine.as_mut() {
            engine.resize(width, height);
        }
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    pub fn dispatch(&mut self, event: ViewerEvent) {
        match event {
            ViewerEvent::SelectShape(name) => self.shape = ShapeSelection::parse(&name),
            ViewerEvent::SelectMaterial(preset) => self.material = preset,
            ViewerEvent::SelectEnvironment(environment) => self.environment = environment,
            ViewerEvent::UploadModel(model) => {
                // Same resolution as the selector: a file named like a
                // primitive selects the primitive.
                let shape = ShapeSelection::parse(&model.name);
                self.library.push(model);
                self.shape = shape;
            }
            ViewerEvent::SetRoomOffset(offset) => {
                if let (Some(engine), Some(session)) = (self.engine.as_mut(), self.session.as_mut()) {
                    if session.set_room_offset(engine, offset).is_none() {
                        log::debug!("Room offset ignored outside the room environment");
                    }
                }
            }
        }
        self.update();
    }

    fn update(&mut self) {
        if self.engine.is_none() {
            return;
        }
        self.sync_environment();
        self.sync_mesh();
        self.sync_material();
    }

    fn sync_environment(&mut self) {
        if self.environment_deps == Some(self.environment) && self.session.is_some() {
            return;
        }
        let Some(engine) = self.engine.as_mut() else {
            return;
        };
        if let Some(previous) = self.session.take() {
            previous.close(engine);
        }
        self.session_generation += 1;
        self.environment_deps = Some(self.environment);
        match SceneSession::open(engine, self.environment, &self.assets) {
            Ok(session) => self.session = Some(session),
            Err(err) => {
                log::warn!("Failed to build environment '{}': {}", self.environment, err);
                self.status = Some(format!("Environment '{}' unavailable", self.environment));
            }
        }
    }

    fn sync_mesh(&mut self) {
        let deps = MeshDeps {
            shape: self.shape.clone(),
            models_revision: self.library.revision(),
            material: self.material,
            session: self.session_generation,
        };
        if self.mesh_deps.as_ref() == Some(&deps) {
            return;
        }
        let (Some(engine), Some(session)) = (self.engine.as_mut(), self.session.as_mut()) else {
            return;
        };
        self.mesh_deps = Some(deps);
        session.clear_mesh(engine);
        self.pending_import = None;

        match &self.shape {
            ShapeSelection::Primitive(kind) => {
                match resolve_primitive(engine, session.scene(), *kind, session.shadow_generator()) {
                    Ok(mesh) => session.set_mesh(engine, mesh),
                    Err(err) => log::warn!("Failed to create '{}': {}", kind.name(), err),
                }
            }
            ShapeSelection::Model(name) => {
                let Some(worker) = self.worker.as_ref() else {
                    return;
                };
                let upload = prepare_import(&self.library, name);
                self.import_epoch += 1;
                if worker.request(self.import_epoch, &upload.name, upload.bytes) {
                    self.pending_import = Some(self.import_epoch);
                } else {
                    self.status = Some(format!("Could not load '{}'", upload.name));
                }
            }
        }
    }

    fn sync_material(&mut self) {
        let (Some(engine), Some(session)) = (self.engine.as_mut(), self.session.as_mut()) else {
            return;
        };
        let deps = MaterialDeps {
            preset: self.material,
            mesh: session.mesh().map(|mesh| mesh.root()),
            session: self.session_generation,
        };
        if self.material_deps == Some(deps) {
            return;
        }
        self.material_deps = Some(deps);
        if let Err(err) = session.bind_material(engine, self.material, &self.assets) {
            log::warn!("Failed to bind material '{}': {}", self.material, err);
        }
    }

    // ------------------------------------------------------------------
    // Frame loop and imports
    // ------------------------------------------------------------------

    /// Applies finished imports and renders the current scene.
    pub fn frame(&mut self) {
        while let Some(result) = self.worker.as_ref().and_then(|worker| worker.try_recv()) {
            self.finish_import(result);
        }
        let (Some(engine), Some(session)) = (self.engine.as_mut(), self.session.as_ref()) else {
            return;
        };
        if let Err(err) = engine.render(session.scene()) {
            log::warn!("Render failed: {}", err);
        }
    }

    /// Draws the current scene into `target`, a surface view at the size
    /// last passed to [`SceneController::resize`].
    pub fn draw(&mut self, target: &wgpu::TextureView, format: wgpu::TextureFormat) {
        let (Some(engine), Some(session)) = (self.engine.as_mut(), self.session.as_ref()) else {
            return;
        };
        let Some(camera) = session.camera() else {
            return;
        };
        match engine.draw(session.scene(), camera, target, format) {
            Ok(()) | Err(EngineError::NoDevice) => {}
            Err(err) => log::warn!("Draw failed: {}", err),
        }
    }

    /// What a screenshot would contain right now: the current scene from
    /// the session camera at the capture size.
    pub fn snapshot(&self) -> Option<FrameSnapshot<'_>> {
        let engine = self.engine.as_ref()?;
        let session = self.session.as_ref()?;
        let (width, height) = self.capture_size;
        engine
            .snapshot(session.scene(), session.camera()?, width, height)
            .ok()
    }

    pub fn is_import_pending(&self) -> bool {
        self.pending_import.is_some()
    }

    /// Blocks until the pending import has been applied or `timeout`
    /// elapses. Returns whether an import was applied.
    pub fn wait_for_import(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while let Some(epoch) = self.pending_import {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let Some(result) = self
                .worker
                .as_ref()
                .and_then(|worker| worker.recv_timeout(remaining))
            else {
                return false;
            };
            let current = result.epoch == epoch;
            self.finish_import(result);
            if current {
                return true;
            }
        }
        false
    }

    fn finish_import(&mut self, result: ImportResult) {
        if self.pending_import != Some(result.epoch) {
            log::debug!(
                "Discarding stale import of '{}' (epoch {})",
                result.name,
                result.epoch
            );
            return;
        }
        self.pending_import = None;

        let (Some(engine), Some(session)) = (self.engine.as_mut(), self.session.as_mut()) else {
            return;
        };
        if !session.is_alive(engine) {
            log::debug!("Discarding import of '{}': scene is gone", result.name);
            return;
        }

        let model = match result.model {
            Ok(model) => model,
            Err(err) => {
                log::warn!("Import failed: {}", err);
                self.status = Some(format!("Could not load '{}'", result.name));
                return;
            }
        };
        match attach_import(engine, session.scene(), &model, session.shadow_generator()) {
            Ok(Some(mesh)) => session.set_mesh(engine, mesh),
            Ok(None) => self.status = Some(format!("'{}' has no geometry", result.name)),
            Err(err) => log::warn!("Failed to attach '{}': {}", result.name, err),
        }
        self.sync_material();
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn shape(&self) -> &ShapeSelection {
        &self.shape
    }

    pub fn material(&self) -> MaterialPreset {
        self.material
    }

    pub fn environment(&self) -> EnvironmentKind {
        self.environment
    }

    pub fn library(&self) -> &ModelLibrary {
        &self.library
    }

    pub fn engine(&self) -> Option<&Engine> {
        self.engine.as_ref()
    }

    pub fn session(&self) -> Option<&SceneSession> {
        self.session.as_ref()
    }

    pub fn room_offset(&self) -> f32 {
        self.session.as_ref().map_or(0.0, |session| session.room_offset())
    }

    /// Status message for the UI, cleared once taken.
    pub fn take_status(&mut self) -> Option<String> {
        self.status.take()
    }

    /// Forwards pointer input to the active camera.
    pub fn apply_camera_input(&mut self, input: CameraInput) -> bool {
        let (Some(engine), Some(session)) = (self.engine.as_mut(), self.session.as_ref()) else {
            return false;
        };
        session
            .camera()
            .and_then(|camera| engine.camera_mut(camera))
            .is_some_and(|camera| camera.apply_input(input))
    }
}

impl FrameCapture for SceneController {
    fn capture_frame(&mut self) -> Option<Screenshot> {
        let engine = self.engine.as_mut()?;
        let session = self.session.as_ref()?;
        let camera = session.camera()?;
        let (width, height) = self.capture_size;
        match engine.capture(session.scene(), camera, width, height) {
            Ok(image) => Some(Screenshot {
                image,
                label: format!("{}-{}", self.environment, self.shape),
            }),
            Err(err) => {
                log::warn!("Screenshot failed: {}", err);
                None
            }
        }
    }
}

impl Drop for SceneController {
    fn drop(&mut self) {
        self.unmount();
    }
}
