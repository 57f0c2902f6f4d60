//! Surface binding: owns the window surface and the GPU device, draws the
//! scene controller's frames with the UI painted on top, and writes
//! screenshots to disk.

use crate::engine::{GpuContext, GpuError, Renderer};
use crate::scene::{FrameCapture, SceneController, Screenshot};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use winit::dpi::PhysicalSize;
use winit::window::Window;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("failed creating window surface: {0}")]
    Surface(#[from] wgpu::CreateSurfaceError),
    #[error("window surface reports no supported formats")]
    UnsupportedSurface,
    #[error(transparent)]
    Gpu(#[from] GpuError),
    #[error("failed creating screenshot directory '{path}': {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed writing screenshot '{path}': {source}")]
    Save {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// UI geometry for one frame, produced by the egui pass.
pub struct UiPaint<'a> {
    pub clipped_primitives: &'a [egui::ClippedPrimitive],
    pub textures_delta: &'a egui::TexturesDelta,
    pub pixels_per_point: f32,
}

pub struct RenderContext {
    surface: wgpu::Surface<'static>,
    surface_config: wgpu::SurfaceConfiguration,
    gpu: GpuContext,
    ui_renderer: egui_wgpu::Renderer,
    controller: SceneController,
    screenshot_dir: PathBuf,
}

impl RenderContext {
    /// Opens a device for `window`'s surface and mounts the controller on it.
    pub fn new(
        window: Arc<Window>,
        mut controller: SceneController,
        screenshot_dir: impl Into<PathBuf>,
    ) -> Result<Self, RenderError> {
        let (width, height) = surface_extent(window.inner_size());
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let surface = instance.create_surface(window)?;
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .ok_or(GpuError::NoAdapter)?;
        let gpu = GpuContext::from_adapter(&adapter)?;

        let capabilities = surface.get_capabilities(&adapter);
        let format = capabilities
            .formats
            .iter()
            .copied()
            .find(wgpu::TextureFormat::is_srgb)
            .or_else(|| capabilities.formats.first().copied())
            .ok_or(RenderError::UnsupportedSurface)?;
        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width,
            height,
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: capabilities
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: Vec::new(),
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&gpu.device, &surface_config);
        log::info!("Surface configured: {}x{} {:?}", width, height, format);

        controller.mount_with_renderer(Renderer::new(&gpu), width, height);
        let ui_renderer = egui_wgpu::Renderer::new(&gpu.device, format, None, 1, false);

        Ok(Self {
            surface,
            surface_config,
            gpu,
            ui_renderer,
            controller,
            screenshot_dir: screenshot_dir.into(),
        })
    }

    pub fn controller(&self) -> &SceneController {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut SceneController {
        &mut self.controller
    }

    pub fn viewport_size(&self) -> (u32, u32) {
        (self.surface_config.width, self.surface_config.height)
    }

    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        let (width, height) = surface_extent(new_size);
        if (width, height) == self.viewport_size() {
            return;
        }
        self.surface_config.width = width;
        self.surface_config.height = height;
        self.surface.configure(&self.gpu.device, &self.surface_config);
        self.controller.resize(width, height);
        log::debug!("Viewport resized to {}x{}", width, height);
    }

    /// Renders one frame with `ui` on top and presents it. Returns the time
    /// spent in milliseconds.
    pub fn render(&mut self, ui: &UiPaint<'_>) -> f32 {
        let start = Instant::now();
        self.controller.frame();

        // Texture uploads must not be lost when the surface skips a frame.
        for (id, delta) in &ui.textures_delta.set {
            self.ui_renderer
                .update_texture(&self.gpu.device, &self.gpu.queue, *id, delta);
        }

        match self.surface.get_current_texture() {
            Ok(frame) => {
                let view = frame
                    .texture
                    .create_view(&wgpu::TextureViewDescriptor::default());
                self.controller.draw(&view, self.surface_config.format);
                self.paint_ui(&view, ui);
                frame.present();
            }
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                log::debug!("Surface lost; reconfiguring");
                self.surface.configure(&self.gpu.device, &self.surface_config);
            }
            Err(wgpu::SurfaceError::Timeout) => log::debug!("Surface timed out; skipping frame"),
            Err(err) => log::error!("Surface error: {}", err),
        }

        for id in &ui.textures_delta.free {
            self.ui_renderer.free_texture(id);
        }
        start.elapsed().as_secs_f32() * 1000.0
    }

    fn paint_ui(&mut self, target: &wgpu::TextureView, ui: &UiPaint<'_>) {
        let screen = egui_wgpu::ScreenDescriptor {
            size_in_pixels: [self.surface_config.width, self.surface_config.height],
            pixels_per_point: ui.pixels_per_point,
        };
        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("ui_encoder"),
            });
        let callbacks = self.ui_renderer.update_buffers(
            &self.gpu.device,
            &self.gpu.queue,
            &mut encoder,
            ui.clipped_primitives,
            &screen,
        );
        {
            let mut pass = encoder
                .begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("ui_pass"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: target,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Load,
                            store: wgpu::StoreOp::Store,
                        },
                    })],
                    depth_stencil_attachment: None,
                    timestamp_writes: None,
                    occlusion_query_set: None,
                })
                .forget_lifetime();
            self.ui_renderer
                .render(&mut pass, ui.clipped_primitives, &screen);
        }
        self.gpu
            .queue
            .submit(callbacks.into_iter().chain(std::iter::once(encoder.finish())));
    }

    /// Captures the current frame into the screenshot directory. `Ok(None)`
    /// when there is nothing to capture yet.
    pub fn capture_screenshot_png(&mut self) -> Result<Option<PathBuf>, RenderError> {
        let Some(screenshot) = self.controller.capture_frame() else {
            log::debug!("Screenshot requested before the scene is ready");
            return Ok(None);
        };
        let path = self.screenshot_dir.join(screenshot_file_name(SystemTime::now()));
        save_png(&path, &screenshot)?;
        log::info!(
            "Saved {}x{} screenshot of {} to {}",
            screenshot.width(),
            screenshot.height(),
            screenshot.label,
            path.display()
        );
        Ok(Some(path))
    }

    /// Unmounts the controller, releasing the engine and its renderer.
    pub fn shutdown(&mut self) {
        self.controller.unmount();
    }
}

/// Surface size for a window size; a minimized window still gets one texel.
pub fn surface_extent(size: PhysicalSize<u32>) -> (u32, u32) {
    (size.width.max(1), size.height.max(1))
}

/// `screenshot-<unix-ms>.png`
pub fn screenshot_file_name(now: SystemTime) -> String {
    let millis = now
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_millis());
    format!("screenshot-{}.png", millis)
}

pub fn save_png(path: &Path, screenshot: &Screenshot) -> Result<(), RenderError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|source| RenderError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
    }

    image::save_buffer_with_format(
        path,
        screenshot.image.as_raw(),
        screenshot.width(),
        screenshot.height(),
        image::ColorType::Rgba8,
        image::ImageFormat::Png,
    )
    .map_err(|source| RenderError::Save {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use std::time::Duration;

    #[test]
    fn test_screenshot_file_name_uses_unix_millis() {
        let at = UNIX_EPOCH + Duration::from_millis(1_700_000_000_123);
        assert_eq!(screenshot_file_name(at), "screenshot-1700000000123.png");
    }

    #[test]
    fn test_save_png_creates_directory_and_keeps_pixels() {
        let dir = tempfile::tempdir().unwrap();
        let mut image = RgbaImage::from_pixel(64, 32, Rgba([10, 20, 30, 255]));
        image.put_pixel(5, 6, Rgba([200, 0, 0, 255]));
        let screenshot = Screenshot {
            image,
            label: "Road-Box".to_string(),
        };
        let path = dir.path().join("shots").join("frame.png");

        save_png(&path, &screenshot).unwrap();
        let saved = image::open(&path).unwrap().to_rgba8();
        assert_eq!(saved.dimensions(), (64, 32));
        assert_eq!(saved.get_pixel(5, 6).0, [200, 0, 0, 255]);
        assert_eq!(saved.get_pixel(0, 0).0, [10, 20, 30, 255]);
    }

    #[test]
    fn test_save_png_reports_blocked_directory() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("shots");
        std::fs::write(&blocker, b"not a directory").unwrap();
        let screenshot = Screenshot {
            image: RgbaImage::new(2, 2),
            label: String::new(),
        };
        let err = save_png(&blocker.join("frame.png"), &screenshot).unwrap_err();
        assert!(matches!(err, RenderError::CreateDir { .. }));
    }

    #[test]
    fn test_surface_extent_clamps_to_one_pixel() {
        assert_eq!(surface_extent(PhysicalSize::new(0, 0)), (1, 1));
        assert_eq!(surface_extent(PhysicalSize::new(1280, 0)), (1280, 1));
        assert_eq!(surface_extent(PhysicalSize::new(800, 600)), (800, 600));
    }
}
