use crate::engine::TextureId;
use glam::Vec3;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransparencyMode {
    Opaque,
    AlphaBlend,
}

/// Metallic/roughness shading parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct PbrParams {
    pub albedo_color: Vec3,
    pub albedo_texture: Option<PathBuf>,
    pub metallic: f32,
    pub roughness: f32,
    pub alpha: f32,
    pub transparency_mode: TransparencyMode,
}

impl Default for PbrParams {
    fn default() -> Self {
        Self {
            albedo_color: Vec3::ONE,
            albedo_texture: None,
            metallic: 0.0,
            roughness: 1.0,
            alpha: 1.0,
            transparency_mode: TransparencyMode::Opaque,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GridParams {
    pub main_color: Vec3,
    pub line_color: Vec3,
    pub grid_ratio: f32,
    pub major_unit_frequency: u32,
    pub opacity: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MaterialKind {
    Pbr(PbrParams),
    Standard { diffuse: Vec3, specular: Vec3 },
    Grid(GridParams),
    Skybox,
}

#[derive(Debug, Clone)]
pub struct Material {
    pub name: String,
    pub kind: MaterialKind,
    /// Textures disposed together with the material.
    pub textures: Vec<TextureId>,
}

impl Material {
    pub fn pbr_params(&self) -> Option<&PbrParams> {
        match &self.kind {
            MaterialKind::Pbr(params) => Some(params),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureKind {
    Image,
    PrefilteredCube,
}

#[derive(Debug, Clone)]
pub struct Texture {
    pub path: PathBuf,
    pub kind: TextureKind,
}
