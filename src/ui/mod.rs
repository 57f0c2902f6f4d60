//! Selector panel drawn with egui, plus the same selections behind
//! keyboard shortcuts.
//!
//! Mirrors the controller's selections as option lists with a selected
//! index, turns widget changes and shortcuts into [`ViewerEvent`]s and
//! builds the status summary shown in the window title.

use crate::scene::{
    clamp_room_offset, EnvironmentKind, MaterialPreset, PrimitiveKind, SceneController,
    ShapeSelection, ViewerEvent, ROOM_OFFSET_MAX, ROOM_OFFSET_MIN, ROOM_OFFSET_STEP,
};

/// What the panel asked for during one frame.
#[derive(Debug, Default, PartialEq)]
pub struct UiResponse {
    pub events: Vec<ViewerEvent>,
    pub add_model: bool,
    pub screenshot: bool,
}

pub struct UiState {
    shape_options: Vec<String>,
    shape_index: usize,
    material_index: usize,
    environment_index: usize,
    room_offset: f32,
    import_pending: bool,
    status: String,
    summary: String,
}

impl Default for UiState {
    fn default() -> Self {
        Self::new()
    }
}

impl UiState {
    pub fn new() -> Self {
        Self {
            shape_options: PrimitiveKind::ALL
                .iter()
                .map(|kind| kind.name().to_string())
                .collect(),
            shape_index: 0,
            material_index: 0,
            environment_index: 0,
            room_offset: 0.0,
            import_pending: false,
            status: String::new(),
            summary: String::new(),
        }
    }

    /// Pulls selections, uploaded model names and status from the controller.
    pub fn update(&mut self, controller: &mut SceneController) {
        let mut options: Vec<String> = PrimitiveKind::ALL
            .iter()
            .map(|kind| kind.name().to_string())
            .collect();
        for name in controller.library().names() {
            if !options.iter().any(|option| option == name) {
                options.push(name.to_string());
            }
        }

        // A selected model may not be in the library yet, e.g. one named on
        // the command line that is still importing.
        let shape = controller.shape().name();
        self.shape_index = match options.iter().position(|option| option == shape) {
            Some(index) => index,
            None => {
                options.push(shape.to_string());
                options.len() - 1
            }
        };
        self.shape_options = options;
        self.material_index = index_of(&MaterialPreset::ALL, controller.material());
        self.environment_index = index_of(&EnvironmentKind::ALL, controller.environment());
        self.room_offset = controller.room_offset();
        self.import_pending = controller.is_import_pending();

        if let Some(status) = controller.take_status() {
            log::info!("{}", status);
            self.status = status;
        }

        let mut summary = format!(
            "{} | {} | {}",
            self.shape_options[self.shape_index],
            self.material().name(),
            self.environment().name()
        );
        if self.room_slider_visible() {
            summary.push_str(&format!(" | x {:+.1}", self.room_offset));
        }
        if self.import_pending {
            summary.push_str(" | loading...");
        }
        if !self.status.is_empty() {
            summary.push_str(" | ");
            summary.push_str(&self.status);
        }
        self.summary = summary;
    }

    /// Draws the selector panel and reports what changed.
    pub fn show(&mut self, ctx: &egui::Context) -> UiResponse {
        let mut response = UiResponse::default();
        egui::Window::new("Scene")
            .anchor(egui::Align2::LEFT_TOP, [12.0, 12.0])
            .resizable(false)
            .show(ctx, |ui| {
                egui::Grid::new("scene_selectors")
                    .num_columns(2)
                    .spacing([12.0, 6.0])
                    .show(ui, |ui| {
                        ui.label("Shape");
                        let mut shape_index = self.shape_index;
                        egui::ComboBox::from_id_salt("shape")
                            .selected_text(self.shape_options[self.shape_index].as_str())
                            .show_ui(ui, |ui| {
                                for (index, name) in self.shape_options.iter().enumerate() {
                                    ui.selectable_value(&mut shape_index, index, name.as_str());
                                }
                            });
                        ui.end_row();
                        if let Some(event) = self.select_shape_index(shape_index) {
                            response.events.push(event);
                        }

                        ui.label("Material");
                        let mut material_index = self.material_index;
                        egui::ComboBox::from_id_salt("material")
                            .selected_text(self.material().name())
                            .show_ui(ui, |ui| {
                                for (index, preset) in MaterialPreset::ALL.iter().enumerate() {
                                    ui.selectable_value(&mut material_index, index, preset.name());
                                }
                            });
                        ui.end_row();
                        if let Some(event) = self.select_material_index(material_index) {
                            response.events.push(event);
                        }

                        ui.label("Environment");
                        let mut environment_index = self.environment_index;
                        egui::ComboBox::from_id_salt("environment")
                            .selected_text(self.environment().name())
                            .show_ui(ui, |ui| {
                                for (index, kind) in EnvironmentKind::ALL.iter().enumerate() {
                                    ui.selectable_value(&mut environment_index, index, kind.name());
                                }
                            });
                        ui.end_row();
                        if let Some(event) = self.select_environment_index(environment_index) {
                            response.events.push(event);
                        }

                        if self.room_slider_visible() {
                            ui.label("Camera X");
                            let mut offset = self.room_offset;
                            let slider = egui::Slider::new(
                                &mut offset,
                                ROOM_OFFSET_MIN..=ROOM_OFFSET_MAX,
                            )
                            .step_by(f64::from(ROOM_OFFSET_STEP))
                            .fixed_decimals(1);
                            if ui.add(slider).changed() {
                                if let Some(event) = self.set_room_slider(offset) {
                                    response.events.push(event);
                                }
                            }
                            ui.end_row();
                        }
                    });

                ui.separator();
                ui.horizontal(|ui| {
                    let add = ui.add_enabled(!self.import_pending, egui::Button::new("Add model"));
                    response.add_model = add.clicked();
                    response.screenshot = ui.button("Screenshot").clicked();
                });
                if self.import_pending {
                    ui.horizontal(|ui| {
                        ui.spinner();
                        ui.label("Loading model...");
                    });
                }
                if !self.status.is_empty() {
                    ui.label(self.status.as_str());
                }
            });
        response
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn shape_options(&self) -> &[String] {
        &self.shape_options
    }

    pub fn selected_shape(&self) -> ShapeSelection {
        ShapeSelection::parse(&self.shape_options[self.shape_index])
    }

    pub fn material(&self) -> MaterialPreset {
        MaterialPreset::ALL[self.material_index]
    }

    pub fn environment(&self) -> EnvironmentKind {
        EnvironmentKind::ALL[self.environment_index]
    }

    pub fn room_offset(&self) -> f32 {
        self.room_offset
    }

    pub fn room_slider_visible(&self) -> bool {
        self.environment() == EnvironmentKind::Room
    }

    pub fn set_status(&mut self, status: impl Into<String>) {
        self.status = status.into();
    }

    /// Selects the primitive at `index` in selector order.
    pub fn select_primitive(&mut self, index: usize) -> Option<ViewerEvent> {
        let kind = PrimitiveKind::ALL.get(index)?;
        self.shape_index = index;
        Some(ViewerEvent::SelectShape(kind.name().to_string()))
    }

    pub fn cycle_shape(&mut self, forward: bool) -> ViewerEvent {
        self.shape_index = step(self.shape_index, self.shape_options.len(), forward);
        ViewerEvent::SelectShape(self.shape_options[self.shape_index].clone())
    }

    pub fn cycle_material(&mut self, forward: bool) -> ViewerEvent {
        self.material_index = step(self.material_index, MaterialPreset::ALL.len(), forward);
        ViewerEvent::SelectMaterial(self.material())
    }

    pub fn cycle_environment(&mut self, forward: bool) -> ViewerEvent {
        let index = step(self.environment_index, EnvironmentKind::ALL.len(), forward);
        self.environment_index = index;
        self.room_offset = 0.0;
        ViewerEvent::SelectEnvironment(self.environment())
    }

    /// Moves the room slider by `steps` increments. Hidden outside the room.
    pub fn nudge_room_slider(&mut self, steps: i32) -> Option<ViewerEvent> {
        self.set_room_slider(self.room_offset + steps as f32 * ROOM_OFFSET_STEP)
    }

    /// Sets the room slider, snapped to its step and clamped to its range.
    /// Hidden outside the room.
    pub fn set_room_slider(&mut self, value: f32) -> Option<ViewerEvent> {
        if !self.room_slider_visible() {
            return None;
        }
        // Snap to the slider grid so repeated steps do not drift.
        let snapped = (value / ROOM_OFFSET_STEP).round() * ROOM_OFFSET_STEP;
        self.room_offset = clamp_room_offset(snapped);
        Some(ViewerEvent::SetRoomOffset(self.room_offset))
    }

    fn select_shape_index(&mut self, index: usize) -> Option<ViewerEvent> {
        if index == self.shape_index || index >= self.shape_options.len() {
            return None;
        }
        self.shape_index = index;
        Some(ViewerEvent::SelectShape(self.shape_options[index].clone()))
    }

    fn select_material_index(&mut self, index: usize) -> Option<ViewerEvent> {
        if index == self.material_index || index >= MaterialPreset::ALL.len() {
            return None;
        }
        self.material_index = index;
        Some(ViewerEvent::SelectMaterial(self.material()))
    }

    fn select_environment_index(&mut self, index: usize) -> Option<ViewerEvent> {
        if index == self.environment_index || index >= EnvironmentKind::ALL.len() {
            return None;
        }
        self.environment_index = index;
        self.room_offset = 0.0;
        Some(ViewerEvent::SelectEnvironment(self.environment()))
    }
}

fn index_of<T: PartialEq + Copy>(options: &[T], value: T) -> usize {
    options
        .iter()
        .position(|option| *option == value)
        .unwrap_or(0)
}

fn step(index: usize, len: usize, forward: bool) -> usize {
    if len == 0 {
        return 0;
    }
    if forward {
        (index + 1) % len
    } else {
        (index + len - 1) % len
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::{AssetPaths, UploadedModel};

    fn run_frame(ui: &mut UiState) -> UiResponse {
        let ctx = egui::Context::default();
        let mut response = UiResponse::default();
        let _ = ctx.run(egui::RawInput::default(), |ctx| {
            response = ui.show(ctx);
        });
        response
    }

    #[test]
    fn test_cycling_wraps_both_ways() {
        let mut ui = UiState::new();
        assert_eq!(
            ui.cycle_shape(false),
            ViewerEvent::SelectShape("Torus".to_string())
        );
        assert_eq!(
            ui.cycle_shape(true),
            ViewerEvent::SelectShape("Box".to_string())
        );
        assert_eq!(
            ui.cycle_shape(true),
            ViewerEvent::SelectShape("Cylinder".to_string())
        );
        assert_eq!(
            ui.cycle_material(true),
            ViewerEvent::SelectMaterial(MaterialPreset::Metal)
        );
        assert_eq!(
            ui.cycle_environment(false),
            ViewerEvent::SelectEnvironment(EnvironmentKind::Studio)
        );
    }

    #[test]
    fn test_room_slider_only_in_room_and_clamped() {
        let mut ui = UiState::new();
        assert!(ui.nudge_room_slider(1).is_none());

        ui.cycle_environment(true);
        assert_eq!(ui.environment(), EnvironmentKind::Room);
        let Some(ViewerEvent::SetRoomOffset(offset)) = ui.nudge_room_slider(3) else {
            panic!("expected a room offset event");
        };
        assert!((offset - 0.3).abs() < 1e-6);
        assert_eq!(
            ui.nudge_room_slider(500),
            Some(ViewerEvent::SetRoomOffset(5.0))
        );

        ui.cycle_environment(true);
        ui.cycle_environment(false);
        assert_eq!(ui.room_offset(), 0.0);
    }

    #[test]
    fn test_set_room_slider_snaps_and_clamps() {
        let mut ui = UiState::new();
        assert!(ui.set_room_slider(1.0).is_none());

        ui.cycle_environment(true);
        let Some(ViewerEvent::SetRoomOffset(offset)) = ui.set_room_slider(1.234) else {
            panic!("expected a room offset event");
        };
        assert!((offset - 1.2).abs() < 1e-5);
        assert_eq!(
            ui.set_room_slider(-9.0),
            Some(ViewerEvent::SetRoomOffset(-5.0))
        );
    }

    #[test]
    fn test_update_lists_uploaded_models() {
        let mut controller = SceneController::new(AssetPaths::new("assets"));
        controller.dispatch(ViewerEvent::UploadModel(UploadedModel::placeholder("chair.obj")));
        controller.dispatch(ViewerEvent::SelectMaterial(MaterialPreset::Glass));

        let mut ui = UiState::new();
        ui.update(&mut controller);
        assert_eq!(ui.shape_options().last().map(String::as_str), Some("chair.obj"));
        assert_eq!(
            ui.selected_shape(),
            ShapeSelection::Model("chair.obj".to_string())
        );
        assert_eq!(ui.material(), MaterialPreset::Glass);
        assert!(ui.summary().starts_with("chair.obj | Glass | Road"));
    }

    #[test]
    fn test_update_lists_selected_model_missing_from_library() {
        let mut controller = SceneController::new(AssetPaths::new("assets")).with_selection(
            ShapeSelection::Model("ghost.obj".to_string()),
            MaterialPreset::Metal,
            EnvironmentKind::Studio,
        );

        let mut ui = UiState::new();
        ui.update(&mut controller);
        assert_eq!(ui.shape_options().len(), PrimitiveKind::ALL.len() + 1);
        assert_eq!(
            ui.selected_shape(),
            ShapeSelection::Model("ghost.obj".to_string())
        );
        assert!(ui.summary().starts_with("ghost.obj | Metal | Studio"));
    }

    #[test]
    fn test_select_primitive_by_index() {
        let mut ui = UiState::new();
        assert_eq!(
            ui.select_primitive(2),
            Some(ViewerEvent::SelectShape("Sphere".to_string()))
        );
        assert!(ui.select_primitive(4).is_none());
    }

    #[test]
    fn test_panel_without_interaction_emits_nothing() {
        let mut ui = UiState::new();
        assert_eq!(run_frame(&mut ui), UiResponse::default());

        // The room slider appears without emitting on its own.
        ui.cycle_environment(true);
        assert_eq!(run_frame(&mut ui), UiResponse::default());
        assert_eq!(ui.room_offset(), 0.0);
    }

    #[test]
    fn test_widget_selection_emits_once() {
        let mut ui = UiState::new();
        assert_eq!(
            ui.select_material_index(2),
            Some(ViewerEvent::SelectMaterial(MaterialPreset::ALL[2]))
        );
        assert!(ui.select_material_index(2).is_none());
        assert!(ui.select_shape_index(99).is_none());

        ui.cycle_environment(true);
        ui.nudge_room_slider(4);
        assert_eq!(
            ui.select_environment_index(0),
            Some(ViewerEvent::SelectEnvironment(EnvironmentKind::ALL[0]))
        );
        assert_eq!(ui.room_offset(), 0.0);
    }
}
