use crate::assets::AssetPaths;
use crate::engine::{
    Engine, EngineError, Entity, MaterialId, MaterialKind, PbrParams, SceneId, TransparencyMode,
};
use crate::scene::MaterialPreset;
use glam::Vec3;

/// Shading parameters for a preset. Same preset, same parameters.
pub fn material_params(preset: MaterialPreset, assets: &AssetPaths) -> PbrParams {
    match preset {
        MaterialPreset::None => PbrParams::default(),
        MaterialPreset::Metal => PbrParams {
            albedo_color: Vec3::splat(0.8),
            metallic: 1.0,
            roughness: 0.2,
            ..PbrParams::default()
        },
        MaterialPreset::Glass => PbrParams {
            roughness: 0.05,
            alpha: 0.3,
            transparency_mode: TransparencyMode::AlphaBlend,
            ..PbrParams::default()
        },
        MaterialPreset::Wood => PbrParams {
            albedo_texture: Some(assets.wood_texture()),
            ..PbrParams::default()
        },
    }
}

/// Creates the preset's material and binds it to every target mesh,
/// disposing `previous` first.
pub fn bind_material(
    engine: &mut Engine,
    scene: SceneId,
    preset: MaterialPreset,
    assets: &AssetPaths,
    targets: &[Entity],
    previous: Option<MaterialId>,
) -> Result<MaterialId, EngineError> {
    if let Some(previous) = previous {
        if engine.dispose_material(previous) {
            log::debug!("Disposed material {:?}", previous);
        }
    }
    let params = material_params(preset, assets);
    let material = engine.create_material(scene, preset.name(), MaterialKind::Pbr(params))?;
    for target in targets {
        engine.set_mesh_material(*target, material);
    }
    Ok(material)
}
