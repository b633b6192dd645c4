use super::{FieldRegion, FieldSample, PhysicsField};
use crate::math::Vec3;

/// Uniform gravitational acceleration
#[derive(Debug, Clone, PartialEq)]
pub struct GravityField {
    pub g: Vec3,
    region: FieldRegion,
}

impl Default for GravityField {
    fn default() -> Self {
        Self::earth()
    }
}

impl GravityField {
    pub fn new(g: Vec3) -> Self {
        Self {
            g,
            region: FieldRegion::unbounded(),
        }
    }

    /// 9.81 m/s² along -y
    pub fn earth() -> Self {
        Self::new(Vec3::new(0.0, -9.81, 0.0))
    }

    pub fn with_region(mut self, region: FieldRegion) -> Self {
        self.region = region;
        self
    }
}

impl PhysicsField for GravityField {
    fn region(&self) -> &FieldRegion {
        &self.region
    }

    fn force(&self, body: &FieldSample, _time: f32) -> Vec3 {
        self.g * body.mass
    }
}
