use super::{FieldRegion, FieldSample, PhysicsField};
use crate::math::Vec3;

/// Pulls bodies toward a point with a bell-shaped falloff, so both very
/// near and very far bodies are only weakly affected
#[derive(Debug, Clone, PartialEq)]
pub struct AttractorField {
    /// Peak force
    pub strength: f32,
    /// Distance of the peak
    pub offset: f32,
    /// Width of the bell
    pub spread: f32,
    region: FieldRegion,
}

impl AttractorField {
    pub fn new(center: Vec3) -> Self {
        Self {
            strength: 0.05,
            offset: 0.01,
            spread: 0.1,
            region: FieldRegion::new(center, Vec3::repeat(1.0)),
        }
    }

    pub fn with_strength(mut self, strength: f32) -> Self {
        self.strength = strength;
        self
    }

    pub fn with_half_extent(mut self, half_extent: Vec3) -> Self {
        self.region.half_extent = half_extent;
        self
    }
}

impl PhysicsField for AttractorField {
    fn region(&self) -> &FieldRegion {
        &self.region
    }

    fn force(&self, body: &FieldSample, _time: f32) -> Vec3 {
        let delta = self.region.center - body.center_of_mass;
        let distance = delta.norm();
        if distance > 0.0 {
            let falloff = (-(distance - self.offset).powi(2) / (2.0 * self.spread)).exp();
            delta / distance * self.strength * falloff
        } else {
            Vec3::zeros()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::RigidBody;
    use approx::assert_relative_eq;

    #[test]
    fn test_pulls_toward_center() {
        let field = AttractorField::new(Vec3::new(0.0, 1.5, 0.0));
        // Center of mass at (0, 0.5, 0)
        let body = RigidBody::internode("b", 1.0, 0.1, 1.0);
        let force = field.force(&FieldSample::from(&body), 0.0);
        assert!(force.y > 0.0);
        assert_relative_eq!(force.x, 0.0);
        let expected = 0.05 * (-(1.0f32 - 0.01).powi(2) / 0.2).exp();
        assert_relative_eq!(force.norm(), expected, epsilon = 1e-6);
    }

    #[test]
    fn test_no_force_at_center() {
        let field = AttractorField::new(Vec3::new(0.0, 0.5, 0.0));
        let body = RigidBody::internode("b", 1.0, 0.1, 1.0);
        assert_eq!(field.force(&FieldSample::from(&body), 0.0), Vec3::zeros());
    }
}
