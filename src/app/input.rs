use winit::keyboard::{KeyCode, PhysicalKey};

/// What a key press asks the viewer to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputAction {
    SelectPrimitive(usize),
    CycleShape { forward: bool },
    CycleMaterial { forward: bool },
    CycleEnvironment { forward: bool },
    NudgeRoom(i32),
    Screenshot,
    OpenModel,
    Quit,
    None,
}

/// Pointer state for orbit dragging.
#[derive(Default, Debug, Clone, Copy)]
pub struct InputState {
    pub shift: bool,
    pub dragging: bool,
    pub cursor: Option<(f32, f32)>,
}

impl InputState {
    /// Maps a key event to an action. Releases never act.
    pub fn handle_key(&self, key: PhysicalKey, pressed: bool) -> InputAction {
        if !pressed {
            return InputAction::None;
        }
        let forward = !self.shift;
        match key {
            PhysicalKey::Code(KeyCode::Digit1) => InputAction::SelectPrimitive(0),
            PhysicalKey::Code(KeyCode::Digit2) => InputAction::SelectPrimitive(1),
            PhysicalKey::Code(KeyCode::Digit3) => InputAction::SelectPrimitive(2),
            PhysicalKey::Code(KeyCode::Digit4) => InputAction::SelectPrimitive(3),
            PhysicalKey::Code(KeyCode::KeyS) => InputAction::CycleShape { forward },
            PhysicalKey::Code(KeyCode::KeyM) => InputAction::CycleMaterial { forward },
            PhysicalKey::Code(KeyCode::KeyE) => InputAction::CycleEnvironment { forward },
            PhysicalKey::Code(KeyCode::ArrowLeft) => InputAction::NudgeRoom(-1),
            PhysicalKey::Code(KeyCode::ArrowRight) => InputAction::NudgeRoom(1),
            PhysicalKey::Code(KeyCode::KeyP) | PhysicalKey::Code(KeyCode::F12) => {
                InputAction::Screenshot
            }
            PhysicalKey::Code(KeyCode::KeyO) => InputAction::OpenModel,
            PhysicalKey::Code(KeyCode::Escape) => InputAction::Quit,
            _ => InputAction::None,
        }
    }

    /// Cursor movement since the last event while dragging.
    pub fn drag_to(&mut self, x: f32, y: f32) -> Option<(f32, f32)> {
        let previous = self.cursor.replace((x, y));
        if !self.dragging {
            return None;
        }
        previous.map(|(px, py)| (x - px, y - py))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shift_reverses_cycling() {
        let mut input = InputState::default();
        let key = PhysicalKey::Code(KeyCode::KeyM);
        assert_eq!(
            input.handle_key(key, true),
            InputAction::CycleMaterial { forward: true }
        );
        input.shift = true;
        assert_eq!(
            input.handle_key(key, true),
            InputAction::CycleMaterial { forward: false }
        );
        assert_eq!(input.handle_key(key, false), InputAction::None);
    }

    #[test]
    fn test_screenshot_keys() {
        let input = InputState::default();
        for code in [KeyCode::KeyP, KeyCode::F12] {
            assert_eq!(
                input.handle_key(PhysicalKey::Code(code), true),
                InputAction::Screenshot
            );
        }
    }

    #[test]
    fn test_drag_reports_deltas_only_while_dragging() {
        let mut input = InputState::default();
        assert_eq!(input.drag_to(10.0, 10.0), None);
        input.dragging = true;
        assert_eq!(input.drag_to(14.0, 7.0), Some((4.0, -3.0)));
    }
}
