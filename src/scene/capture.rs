use image::RgbaImage;

pub const DEFAULT_CAPTURE_WIDTH: u32 = 1920;
pub const DEFAULT_CAPTURE_HEIGHT: u32 = 1080;

/// A captured frame at the fixed output resolution.
#[derive(Debug, Clone)]
pub struct Screenshot {
    pub image: RgbaImage,
    /// Environment and shape the frame was taken of, for naming.
    pub label: String,
}

impl Screenshot {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Capability to capture the current scene from the active camera.
///
/// Implementors return `None` while there is nothing to capture (no engine,
/// scene or camera yet) instead of failing.
pub trait FrameCapture {
    fn capture_frame(&mut self) -> Option<Screenshot>;
}
