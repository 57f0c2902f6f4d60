use crate::engine::Entity;
use glam::Vec3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LightKind {
    /// Ambient sky/ground light; `position` holds its direction.
    Hemispheric,
    Point,
}

#[derive(Debug, Clone)]
pub struct Light {
    pub name: String,
    pub kind: LightKind,
    pub position: Vec3,
    pub intensity: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilteringQuality {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadowFilter {
    None,
    PercentageCloser(FilteringQuality),
}

#[derive(Debug, Clone)]
pub struct ShadowGenerator {
    pub light: Entity,
    pub map_size: u32,
    pub filter: ShadowFilter,
    pub bias: f32,
    pub casters: Vec<Entity>,
}

impl ShadowGenerator {
    pub fn new(light: Entity, map_size: u32) -> Self {
        Self {
            light,
            map_size,
            filter: ShadowFilter::None,
            bias: 0.0,
            casters: Vec::new(),
        }
    }

    pub fn add_caster(&mut self, entity: Entity) {
        if !self.casters.contains(&entity) {
            self.casters.push(entity);
        }
    }

    pub fn remove_caster(&mut self, entity: Entity) {
        self.casters.retain(|caster| *caster != entity);
    }
}
