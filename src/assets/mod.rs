mod import;

pub use import::{ImportResult, ImportWorker};

use crate::scene::EnvironmentKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("failed to read model at {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("model file has no name: {path}")]
    Unnamed { path: String },
}

/// Resolves the fixed asset path conventions under one root.
#[derive(Debug, Clone)]
pub struct AssetPaths {
    root: PathBuf,
}

impl AssetPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `textures/<lowercased environment name>.env`
    pub fn environment_texture(&self, environment: EnvironmentKind) -> PathBuf {
        self.root
            .join("textures")
            .join(format!("{}.env", environment.name().to_lowercase()))
    }

    pub fn wood_texture(&self) -> PathBuf {
        self.root.join("textures").join("wood.jpg")
    }
}

/// A user-supplied model file: display name plus raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedModel {
    pub name: String,
    pub bytes: Arc<[u8]>,
}

impl UploadedModel {
    pub fn new(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    /// Stand-in for a name with no uploaded file behind it.
    pub fn placeholder(name: &str) -> Self {
        Self::new(name, Vec::<u8>::new())
    }

    pub fn from_path(path: &Path) -> Result<Self, AssetError> {
        let name = path
            .file_name()
            .and_then(|value| value.to_str())
            .ok_or_else(|| AssetError::Unnamed {
                path: path.display().to_string(),
            })?
            .to_string();
        let bytes = std::fs::read(path).map_err(|source| AssetError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Self::new(name, bytes))
    }
}

/// Ordered, append-only list of uploaded models.
#[derive(Debug, Default)]
pub struct ModelLibrary {
    models: Vec<UploadedModel>,
    revision: u64,
}

impl ModelLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, model: UploadedModel) {
        log::info!("Model uploaded: {} ({} bytes)", model.name, model.bytes.len());
        self.models.push(model);
        self.revision += 1;
    }

    /// First model uploaded under `name`.
    pub fn find(&self, name: &str) -> Option<&UploadedModel> {
        self.models.iter().find(|model| model.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.models.iter().map(|model| model.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Bumped on every upload.
    pub fn revision(&self) -> u64 {
        self.revision
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_texture_path_is_lowercased() {
        let paths = AssetPaths::new("/srv/assets");
        assert_eq!(
            paths.environment_texture(EnvironmentKind::Night),
            PathBuf::from("/srv/assets/textures/night.env")
        );
        assert_eq!(
            paths.environment_texture(EnvironmentKind::Studio),
            PathBuf::from("/srv/assets/textures/studio.env")
        );
    }

    #[test]
    fn test_library_keeps_upload_order_and_first_match() {
        let mut library = ModelLibrary::new();
        library.push(UploadedModel::new("a.obj", b"v 0 0 0\n".to_vec()));
        library.push(UploadedModel::new("b.obj", Vec::<u8>::new()));
        library.push(UploadedModel::new("a.obj", Vec::<u8>::new()));
        assert_eq!(library.names(), vec!["a.obj", "b.obj", "a.obj"]);
        assert_eq!(library.find("a.obj").unwrap().bytes.len(), 8);
        assert!(library.find("c.obj").is_none());
        assert_eq!(library.revision(), 3);
    }

    #[test]
    fn test_from_path_reads_name_and_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.obj");
        std::fs::write(&path, "v 0 0 0\n").unwrap();
        let model = UploadedModel::from_path(&path).unwrap();
        assert_eq!(model.name, "model.obj");
        assert_eq!(&model.bytes[..], b"v 0 0 0\n");
    }

    #[test]
    fn test_from_path_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = UploadedModel::from_path(&dir.path().join("gone.obj"));
        assert!(matches!(result, Err(AssetError::Read { .. })));
    }
}
