mod egui_host;
mod input;
mod timing;

use crate::assets::UploadedModel;
use crate::config::ViewerConfig;
use crate::engine::CameraInput;
use crate::render::{RenderContext, RenderError};
use crate::scene::{SceneController, ViewerEvent};
use crate::ui::{UiResponse, UiState};
use egui_host::EguiHost;
use input::{InputAction, InputState};
use timing::FrameTiming;

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, MouseButton, MouseScrollDelta, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowAttributes, WindowId};

const WINDOW_TITLE: &str = "Shapeview";
const ORBIT_RADIANS_PER_PIXEL: f32 = 0.005;
const ZOOM_PER_LINE: f32 = 0.5;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("event loop error: {0}")]
    EventLoop(#[from] winit::error::EventLoopError),
}

pub struct App {
    config: ViewerConfig,
    window: Option<Arc<Window>>,
    egui: Option<EguiHost>,
    ui: UiState,
    input: InputState,
    timing: FrameTiming,
    target_frame_duration: Duration,
    next_frame_time: Instant,
    render: Option<RenderContext>,
}

impl App {
    fn new(config: ViewerConfig) -> Self {
        Self {
            config,
            window: None,
            egui: None,
            ui: UiState::new(),
            input: InputState::default(),
            timing: FrameTiming::new(WINDOW_TITLE.to_string()),
            target_frame_duration: Duration::from_millis(16),
            next_frame_time: Instant::now(),
            render: None,
        }
    }

    fn init_render(&mut self, window: &Arc<Window>) -> Result<(), RenderError> {
        let controller = SceneController::new(self.config.asset_paths())
            .with_selection(
                self.config.shape.clone(),
                self.config.material,
                self.config.environment,
            )
            .with_capture_size(self.config.screenshot_width, self.config.screenshot_height);
        let mut render =
            RenderContext::new(window.clone(), controller, &self.config.screenshot_dir)?;
        self.ui.update(render.controller_mut());
        self.egui = Some(EguiHost::new(window));
        self.render = Some(render);
        Ok(())
    }

    fn handle_resize(&mut self, new_size: PhysicalSize<u32>) {
        if let Some(render) = &mut self.render {
            render.resize(new_size);
        }
    }

    fn egui_wants_pointer(&self) -> bool {
        self.egui
            .as_ref()
            .is_some_and(EguiHost::wants_pointer_input)
    }

    fn egui_wants_keyboard(&self) -> bool {
        self.egui
            .as_ref()
            .is_some_and(EguiHost::wants_keyboard_input)
    }

    fn update_target_frame_duration(&mut self, window: &Window) {
        let mut target = Duration::from_millis(16);
        if let Some(monitor) = window.current_monitor() {
            if let Some(millihz) = monitor.refresh_rate_millihertz() {
                let hz = millihz as f32 / 1000.0;
                if hz > 1.0 {
                    target = Duration::from_secs_f32(1.0 / hz);
                }
            }
        }
        self.target_frame_duration = target;
        self.next_frame_time = Instant::now() + self.target_frame_duration;
    }

    fn dispatch(&mut self, event: ViewerEvent) {
        let Some(render) = &mut self.render else {
            return;
        };
        render.controller_mut().dispatch(event);
        self.ui.update(render.controller_mut());
    }

    fn handle_action(&mut self, action: InputAction, event_loop: &ActiveEventLoop) {
        match action {
            InputAction::SelectPrimitive(index) => {
                if let Some(event) = self.ui.select_primitive(index) {
                    self.dispatch(event);
                }
            }
            InputAction::CycleShape { forward } => {
                let event = self.ui.cycle_shape(forward);
                self.dispatch(event);
            }
            InputAction::CycleMaterial { forward } => {
                let event = self.ui.cycle_material(forward);
                self.dispatch(event);
            }
            InputAction::CycleEnvironment { forward } => {
                let event = self.ui.cycle_environment(forward);
                self.dispatch(event);
            }
            InputAction::NudgeRoom(steps) => {
                if let Some(event) = self.ui.nudge_room_slider(steps) {
                    self.dispatch(event);
                }
            }
            InputAction::Screenshot => self.handle_screenshot_action(),
            InputAction::OpenModel => self.handle_open_model_action(),
            InputAction::Quit => event_loop.exit(),
            InputAction::None => {}
        }
    }

    fn apply_ui_response(&mut self, response: UiResponse) {
        for event in response.events {
            self.dispatch(event);
        }
        if response.add_model {
            self.handle_open_model_action();
        }
        if response.screenshot {
            self.handle_screenshot_action();
        }
    }

    fn handle_screenshot_action(&mut self) {
        let Some(render) = &mut self.render else {
            return;
        };
        match render.capture_screenshot_png() {
            Ok(Some(path)) => self.ui.set_status(format!("Saved {}", path.display())),
            Ok(None) => {}
            Err(err) => {
                log::warn!("Screenshot failed: {}", err);
                self.ui.set_status("Screenshot failed");
            }
        }
    }

    #[cfg(feature = "dialogs")]
    fn handle_open_model_action(&mut self) {
        let Some(path) = rfd::FileDialog::new()
            .add_filter("Wavefront OBJ", &["obj"])
            .pick_file()
        else {
            return;
        };
        self.upload_file(&path);
    }

    #[cfg(not(feature = "dialogs"))]
    fn handle_open_model_action(&mut self) {
        log::info!("File dialogs are disabled in this build; drop a model onto the window");
        self.ui.set_status("Drop a .obj file onto the window");
    }

    fn upload_file(&mut self, path: &Path) {
        match UploadedModel::from_path(path) {
            Ok(model) => self.dispatch(ViewerEvent::UploadModel(model)),
            Err(err) => {
                log::warn!("Upload failed: {}", err);
                self.ui.set_status("Upload failed");
            }
        }
    }

    fn orbit(&mut self, input: CameraInput) {
        if let Some(render) = &mut self.render {
            render.controller_mut().apply_camera_input(input);
        }
    }

    fn render(&mut self) {
        let (Some(window), Some(egui)) = (self.window.clone(), self.egui.as_mut()) else {
            return;
        };
        let ui = &mut self.ui;
        let mut response = UiResponse::default();
        let output = egui.run_ui(&window, |ctx| response = ui.show(ctx));
        self.apply_ui_response(response);

        let Some(render) = &mut self.render else {
            return;
        };
        let render_ms = render.render(&output.paint());
        self.ui.update(render.controller_mut());
        self.timing.set_render_ms(render_ms);
        self.timing
            .update(self.window.as_deref(), Instant::now(), self.ui.summary());
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window_attrs = WindowAttributes::default()
            .with_title(WINDOW_TITLE)
            .with_inner_size(PhysicalSize::new(
                self.config.window_width,
                self.config.window_height,
            ))
            .with_resizable(true);

        let window = match event_loop.create_window(window_attrs) {
            Ok(window) => Arc::new(window),
            Err(err) => {
                log::error!("Failed to create window: {}", err);
                event_loop.exit();
                return;
            }
        };

        if let Err(err) = self.init_render(&window) {
            log::error!("Failed to initialize rendering: {}", err);
            event_loop.exit();
            return;
        }
        self.update_target_frame_duration(&window);
        self.window = Some(window);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        let consumed = match (self.egui.as_mut(), self.window.as_deref()) {
            (Some(egui), Some(window)) => egui.on_window_event(window, &event),
            _ => false,
        };

        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }
            WindowEvent::Focused(focused) => {
                if !focused {
                    self.input.dragging = false;
                    self.input.cursor = None;
                }
            }
            WindowEvent::KeyboardInput { event, .. } => {
                // Typing into a widget is not a shortcut; releases still
                // reach the input state.
                let pressed = event.state == ElementState::Pressed;
                if pressed && (consumed || self.egui_wants_keyboard()) {
                    return;
                }
                let is_arrow = matches!(
                    event.physical_key,
                    PhysicalKey::Code(KeyCode::ArrowLeft | KeyCode::ArrowRight)
                );
                // Only the room slider keys auto-repeat.
                if event.repeat && !is_arrow {
                    return;
                }
                let action = self.input.handle_key(event.physical_key, pressed);
                self.handle_action(action, event_loop);
            }
            WindowEvent::ModifiersChanged(modifiers) => {
                self.input.shift = modifiers.state().shift_key();
            }
            WindowEvent::Resized(new_size) => {
                self.handle_resize(new_size);
                if let Some(window) = self.window.clone() {
                    self.update_target_frame_duration(&window);
                }
            }
            WindowEvent::ScaleFactorChanged { .. } => {
                if let Some(size) = self.window.as_ref().map(|window| window.inner_size()) {
                    self.handle_resize(size);
                }
            }
            WindowEvent::Moved(_) => {
                if let Some(window) = self.window.clone() {
                    self.update_target_frame_duration(&window);
                }
            }
            WindowEvent::DroppedFile(path) => {
                log::info!("File dropped: {}", path.display());
                self.upload_file(&path);
            }
            WindowEvent::CursorMoved { position, .. } => {
                if let Some((dx, dy)) = self.input.drag_to(position.x as f32, position.y as f32) {
                    self.orbit(CameraInput::Rotate {
                        delta_alpha: -dx * ORBIT_RADIANS_PER_PIXEL,
                        delta_beta: -dy * ORBIT_RADIANS_PER_PIXEL,
                    });
                }
            }
            WindowEvent::CursorLeft { .. } => {
                self.input.cursor = None;
            }
            WindowEvent::MouseInput { state, button, .. } => {
                if button == MouseButton::Left {
                    // Drags that start on the panel stay with the panel.
                    let pressed = state == ElementState::Pressed;
                    self.input.dragging =
                        pressed && !consumed && !self.egui_wants_pointer();
                }
            }
            WindowEvent::MouseWheel { delta, .. } => {
                if consumed || self.egui_wants_pointer() {
                    return;
                }
                let lines = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(pos) => pos.y as f32 / 40.0,
                };
                self.orbit(CameraInput::Zoom {
                    delta: -lines * ZOOM_PER_LINE,
                });
            }
            WindowEvent::RedrawRequested => {
                self.render();
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let now = Instant::now();
        if now >= self.next_frame_time {
            if let Some(window) = &self.window {
                window.request_redraw();
            }
            self.next_frame_time = now + self.target_frame_duration;
        }
        event_loop.set_control_flow(ControlFlow::WaitUntil(self.next_frame_time));
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(render) = &mut self.render {
            render.shutdown();
        }
    }
}

pub fn run(config: ViewerConfig) -> Result<(), AppError> {
    log::info!("Shapeview starting (assets in {})", config.asset_root.display());
    log::info!("   1-4 shapes, S/M/E cycle, P screenshot, O open, ESC quit");

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Wait);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    log::info!("Goodbye");
    Ok(())
}
