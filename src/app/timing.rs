use std::time::{Duration, Instant};
use winit::window::Window;

pub struct FrameTiming {
    last_fps_time: Instant,
    frame_count: u32,
    fps: f32,
    render_ms: f32,
    base_title: String,
}

impl FrameTiming {
    pub fn new(base_title: String) -> Self {
        Self {
            last_fps_time: Instant::now(),
            frame_count: 0,
            fps: 0.0,
            render_ms: 0.0,
            base_title,
        }
    }

    pub fn set_render_ms(&mut self, render_ms: f32) {
        self.render_ms = render_ms;
    }

    /// Counts a frame; twice a second refreshes the fps figure and the
    /// window title.
    pub fn update(&mut self, window: Option<&Window>, now: Instant, summary: &str) {
        self.frame_count = self.frame_count.saturating_add(1);
        let elapsed = now.saturating_duration_since(self.last_fps_time);
        if elapsed < Duration::from_millis(500) {
            return;
        }
        self.fps = self.frame_count as f32 / elapsed.as_secs_f32();
        if let Some(window) = window {
            window.set_title(&self.title(summary));
        }
        self.frame_count = 0;
        self.last_fps_time = now;
    }

    pub fn title(&self, summary: &str) -> String {
        format!(
            "{} - {} - {:.1} fps (render {:.2} ms)",
            self.base_title, summary, self.fps, self.render_ms
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fps_refreshes_after_half_second() {
        let mut timing = FrameTiming::new("shapeview".to_string());
        let start = timing.last_fps_time;
        for frame in 1..=30 {
            timing.update(None, start + Duration::from_millis(frame * 20), "Box");
        }
        assert!((timing.fps - 30.0 / 0.6).abs() < 0.5, "fps = {}", timing.fps);
        assert!(timing.title("Box | None | Road").starts_with("shapeview - Box | None | Road"));
    }
}
