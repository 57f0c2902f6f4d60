//! OBJ model importer.
//!
//! Parsing runs off the render thread, so everything here works on plain
//! CPU-side data and is `Send`.

use glam::Vec3;
use std::io::Cursor;

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("failed to parse model '{name}': {source}")]
    Parse {
        name: String,
        #[source]
        source: tobj::LoadError,
    },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportedMesh {
    pub name: String,
    pub positions: Vec<Vec3>,
    /// Per-vertex normals; empty when the file has none.
    pub normals: Vec<Vec3>,
    /// Per-vertex texture coordinates; empty when the file has none.
    pub uvs: Vec<[f32; 2]>,
    pub indices: Vec<u32>,
}


#[derive(Debug, Clone, Default)]
pub struct ImportedModel {
    pub source_name: String,
    pub meshes: Vec<ImportedMesh>,
}

impl ImportedModel {
    pub fn is_empty(&self) -> bool {
        self.meshes.iter().all(|mesh| mesh.positions.is_empty())
    }
}

/// Parses OBJ bytes. Empty input yields an empty model.
pub fn parse_obj(name: &str, bytes: &[u8]) -> Result<ImportedModel, ImportError> {
    let options = tobj::LoadOptions {
        triangulate: true,
        single_index: true,
        ..Default::default()
    };
    let mut reader = Cursor::new(bytes);
    // Uploaded models arrive without their .mtl side files.
    let (models, _materials) = tobj::load_obj_buf(&mut reader, &options, |_| {
        Err(tobj::LoadError::OpenFileFailed)
    })
    .map_err(|source| ImportError::Parse {
        name: name.to_string(),
        source,
    })?;

    let meshes = models
        .into_iter()
        .map(|model| {
            let mesh = model.mesh;
            let positions: Vec<Vec3> = mesh
                .positions
                .chunks_exact(3)
                .map(|p| Vec3::new(p[0], p[1], p[2]))
                .collect();
            let normals: Vec<Vec3> = mesh
                .normals
                .chunks_exact(3)
                .map(|n| Vec3::new(n[0], n[1], n[2]))
                .collect();
            // OBJ texture space has v pointing up.
            let uvs: Vec<[f32; 2]> = mesh
                .texcoords
                .chunks_exact(2)
                .map(|t| [t[0], 1.0 - t[1]])
                .collect();
            ImportedMesh {
                name: model.name,
                normals: if normals.len() == positions.len() {
                    normals
                } else {
                    Vec::new()
                },
                uvs: if uvs.len() == positions.len() {
                    uvs
                } else {
                    Vec::new()
                },
                positions,
                indices: mesh.indices,
            }
        })
        .collect();

    Ok(ImportedModel {
        source_name: name.to_string(),
        meshes,
    })
}
