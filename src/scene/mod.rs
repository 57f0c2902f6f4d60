mod capture;
mod controller;
mod environment;
mod material;
mod session;
mod shape;

pub use capture::{FrameCapture, Screenshot, DEFAULT_CAPTURE_HEIGHT, DEFAULT_CAPTURE_WIDTH};
pub use controller::{SceneController, ViewerEvent};
pub use environment::{
    build_environment, clamp_room_offset, move_room_camera, EnvironmentActors, ROOM_OFFSET_MAX,
    ROOM_OFFSET_MIN, ROOM_OFFSET_STEP,
};
pub use material::{bind_material, material_params};
pub use session::SceneSession;
pub use shape::{
    attach_import, ground_mesh, prepare_import, resolve_primitive, ActiveMesh, GROUND_OFFSET,
    IMPORT_TARGET_HEIGHT,
};

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrimitiveKind {
    Box,
    Sphere,
    Cylinder,
    Torus,
}

impl PrimitiveKind {
    /// Selector order.
    pub const ALL: [PrimitiveKind; 4] = [
        PrimitiveKind::Box,
        PrimitiveKind::Cylinder,
        PrimitiveKind::Sphere,
        PrimitiveKind::Torus,
    ];

    pub fn name(self) -> &'static str {
        match self {
            PrimitiveKind::Box => "Box",
            PrimitiveKind::Sphere => "Sphere",
            PrimitiveKind::Cylinder => "Cylinder",
            PrimitiveKind::Torus => "Torus",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }
}

/// Current shape: a primitive, or the name of an uploaded model.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ShapeSelection {
    Primitive(PrimitiveKind),
    Model(String),
}

impl ShapeSelection {
    /// Exact primitive names select the primitive; anything else names a model.
    pub fn parse(name: &str) -> Self {
        match PrimitiveKind::from_name(name) {
            Some(kind) => ShapeSelection::Primitive(kind),
            None => ShapeSelection::Model(name.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ShapeSelection::Primitive(kind) => kind.name(),
            ShapeSelection::Model(name) => name,
        }
    }
}

impl Default for ShapeSelection {
    fn default() -> Self {
        ShapeSelection::Primitive(PrimitiveKind::Box)
    }
}

impl From<String> for ShapeSelection {
    fn from(value: String) -> Self {
        ShapeSelection::parse(&value)
    }
}

impl From<ShapeSelection> for String {
    fn from(value: ShapeSelection) -> Self {
        value.name().to_string()
    }
}

impl fmt::Display for ShapeSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MaterialPreset {
    #[default]
    None,
    Metal,
    Glass,
    Wood,
}

impl MaterialPreset {
    pub const ALL: [MaterialPreset; 4] = [
        MaterialPreset::None,
        MaterialPreset::Metal,
        MaterialPreset::Glass,
        MaterialPreset::Wood,
    ];

    pub fn name(self) -> &'static str {
        match self {
            MaterialPreset::None => "None",
            MaterialPreset::Metal => "Metal",
            MaterialPreset::Glass => "Glass",
            MaterialPreset::Wood => "Wood",
        }
    }
}

impl fmt::Display for MaterialPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EnvironmentKind {
    None,
    Room,
    #[default]
    Road,
    Night,
    Studio,
}

impl EnvironmentKind {
    pub const ALL: [EnvironmentKind; 5] = [
        EnvironmentKind::None,
        EnvironmentKind::Room,
        EnvironmentKind::Road,
        EnvironmentKind::Night,
        EnvironmentKind::Studio,
    ];

    pub fn name(self) -> &'static str {
        match self {
            EnvironmentKind::None => "None",
            EnvironmentKind::Room => "Room",
            EnvironmentKind::Road => "Road",
            EnvironmentKind::Night => "Night",
            EnvironmentKind::Studio => "Studio",
        }
    }

    /// Procedural ground/room with lights and shadows rather than a skybox.
    pub fn is_staged(self) -> bool {
        matches!(self, EnvironmentKind::None | EnvironmentKind::Room)
    }
}

impl fmt::Display for EnvironmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_names_parse_to_primitives() {
        for kind in PrimitiveKind::ALL {
            assert_eq!(ShapeSelection::parse(kind.name()), ShapeSelection::Primitive(kind));
        }
    }

    #[test]
    fn test_other_names_are_models() {
        assert_eq!(
            ShapeSelection::parse("model.obj"),
            ShapeSelection::Model("model.obj".to_string())
        );
        // Case matters: only the exact selector labels are primitives.
        assert_eq!(
            ShapeSelection::parse("box"),
            ShapeSelection::Model("box".to_string())
        );
    }

    #[test]
    fn test_shape_serializes_as_plain_name() {
        let json = serde_json::to_string(&ShapeSelection::Primitive(PrimitiveKind::Torus)).unwrap();
        assert_eq!(json, "\"Torus\"");
        let model: ShapeSelection = serde_json::from_str("\"chair.obj\"").unwrap();
        assert_eq!(model, ShapeSelection::Model("chair.obj".to_string()));
    }

    #[test]
    fn test_only_none_and_room_are_staged() {
        let staged: Vec<_> = EnvironmentKind::ALL
            .into_iter()
            .filter(|kind| kind.is_staged())
            .collect();
        assert_eq!(staged, vec![EnvironmentKind::None, EnvironmentKind::Room]);
    }
}
