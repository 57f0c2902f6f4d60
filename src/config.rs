use crate::assets::AssetPaths;
use crate::scene::{EnvironmentKind, MaterialPreset, ShapeSelection};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_ENV_VAR: &str = "SHAPEVIEW_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "shapeview.json";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid {field}: {width}x{height}")]
    InvalidSize {
        field: &'static str,
        width: u32,
        height: u32,
    },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Viewer settings. Missing fields fall back to their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub asset_root: PathBuf,
    pub window_width: u32,
    pub window_height: u32,
    pub screenshot_width: u32,
    pub screenshot_height: u32,
    pub screenshot_dir: PathBuf,
    pub shape: ShapeSelection,
    pub material: MaterialPreset,
    pub environment: EnvironmentKind,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            asset_root: PathBuf::from("assets"),
            window_width: 1280,
            window_height: 720,
            screenshot_width: 1920,
            screenshot_height: 1080,
            screenshot_dir: PathBuf::from("screenshots"),
            shape: ShapeSelection::default(),
            material: MaterialPreset::None,
            environment: EnvironmentKind::Road,
        }
    }
}

impl ViewerConfig {
    /// Reads `$SHAPEVIEW_CONFIG`, else `./shapeview.json` when present,
    /// else the defaults.
    pub fn load() -> Result<Self> {
        if let Some(path) = std::env::var_os(CONFIG_ENV_VAR) {
            return Self::load_from_file(Path::new(&path));
        }
        let local = Path::new(DEFAULT_CONFIG_FILE);
        if local.is_file() {
            return Self::load_from_file(local);
        }
        Ok(Self::default())
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config: ViewerConfig = serde_json::from_str(&json)?;
        config.validate()?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        let sizes = [
            ("window size", self.window_width, self.window_height),
            ("screenshot size", self.screenshot_width, self.screenshot_height),
        ];
        for (field, width, height) in sizes {
            if width == 0 || height == 0 {
                return Err(ConfigError::InvalidSize {
                    field,
                    width,
                    height,
                });
            }
        }
        Ok(())
    }

    pub fn asset_paths(&self) -> AssetPaths {
        AssetPaths::new(self.asset_root.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::PrimitiveKind;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shapeview.json");
        std::fs::write(&path, r#"{ "environment": "Room", "shape": "Torus" }"#).unwrap();

        let config = ViewerConfig::load_from_file(&path).unwrap();
        assert_eq!(config.environment, EnvironmentKind::Room);
        assert_eq!(config.shape, ShapeSelection::Primitive(PrimitiveKind::Torus));
        assert_eq!(config.material, MaterialPreset::None);
        assert_eq!((config.screenshot_width, config.screenshot_height), (1920, 1080));
    }

    #[test]
    fn test_save_then_load_via_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let config = ViewerConfig {
            asset_root: PathBuf::from("/opt/shapeview/assets"),
            material: MaterialPreset::Glass,
            ..ViewerConfig::default()
        };
        config.save_to_file(&path).unwrap();
        assert_eq!(ViewerConfig::load_from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_zero_sizes_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"{ "screenshot_width": 0 }"#).unwrap();
        assert!(matches!(
            ViewerConfig::load_from_file(&path),
            Err(ConfigError::InvalidSize { .. })
        ));
    }

    #[test]
    fn test_malformed_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            ViewerConfig::load_from_file(&path),
            Err(ConfigError::Json(_))
        ));
    }
}
