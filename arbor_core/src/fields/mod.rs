//! Force fields acting on dynamic bodies
//!
//! A field is queried at a body's center of mass. If [`PhysicsField::applies`]
//! holds, its force (and optional torque) is accumulated on the body before
//! the composite pass.

mod attractor;
mod gravity;
mod wind;

pub use attractor::AttractorField;
pub use gravity::GravityField;
pub use wind::WindField;

use crate::body::{RigidBody, Shape};
use crate::math::{Mat3, Quat, Vec3};
use std::fmt::Debug;

/// Axis-aligned box a field is confined to
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldRegion {
    pub center: Vec3,
    pub half_extent: Vec3,
}

impl Default for FieldRegion {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl FieldRegion {
    pub fn unbounded() -> Self {
        Self {
            center: Vec3::zeros(),
            half_extent: Vec3::repeat(f32::INFINITY),
        }
    }

    pub fn new(center: Vec3, half_extent: Vec3) -> Self {
        Self {
            center,
            half_extent,
        }
    }

    /// Inclusive on the faces
    pub fn contains(&self, point: &Vec3) -> bool {
        let offset = point - self.center;
        (0..3).all(|i| offset[i].abs() <= self.half_extent[i])
    }
}

/// What a field may read about a body
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldSample {
    pub mass: f32,
    pub center_of_mass: Vec3,
    pub velocity: Vec3,
    pub angular_velocity: Vec3,
    pub rotation: Quat,
    pub inertia: Mat3,
    pub shape: Option<Shape>,
}

impl From<&RigidBody> for FieldSample {
    fn from(body: &RigidBody) -> Self {
        let state = body.state();
        Self {
            mass: body.mass(),
            center_of_mass: state.center_of_mass,
            velocity: state.velocity,
            angular_velocity: state.angular_velocity,
            rotation: state.rotation,
            inertia: state.inertia,
            shape: body.shape(),
        }
    }
}

/// A source of external force. `time` is the simulated time in seconds.
pub trait PhysicsField: Debug + Send + Sync {
    fn region(&self) -> &FieldRegion;

    fn applies(&self, at: &Vec3) -> bool {
        self.region().contains(at)
    }

    fn force(&self, body: &FieldSample, time: f32) -> Vec3;

    fn torque(&self, _body: &FieldSample, _time: f32) -> Option<Vec3> {
        None
    }
}

/// Sum of every applicable field's force and torque on one body
pub fn evaluate_fields(
    fields: &[Box<dyn PhysicsField>],
    body: &FieldSample,
    time: f32,
) -> (Vec3, Vec3) {
    let mut force = Vec3::zeros();
    let mut torque = Vec3::zeros();
    for field in fields {
        if !field.applies(&body.center_of_mass) {
            continue;
        }
        force += field.force(body, time);
        if let Some(t) = field.torque(body, time) {
            torque += t;
        }
    }
    (force, torque)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unbounded_region_contains_everything() {
        let region = FieldRegion::unbounded();
        assert!(region.contains(&Vec3::new(1e20, -1e20, 0.0)));
    }

    #[test]
    fn test_bounded_region_edges() {
        let region = FieldRegion::new(Vec3::new(1.0, 0.0, 0.0), Vec3::repeat(1.0));
        assert!(region.contains(&Vec3::new(2.0, 1.0, -1.0)));
        assert!(!region.contains(&Vec3::new(2.01, 0.0, 0.0)));
        assert!(!region.contains(&Vec3::new(-0.5, 0.0, 0.0)));
    }

    #[test]
    fn test_fields_outside_region_are_skipped() {
        let fields: Vec<Box<dyn PhysicsField>> = vec![
            Box::new(GravityField::new(Vec3::new(0.0, -10.0, 0.0))),
            Box::new(
                GravityField::new(Vec3::new(5.0, 0.0, 0.0))
                    .with_region(FieldRegion::new(Vec3::new(100.0, 0.0, 0.0), Vec3::repeat(1.0))),
            ),
        ];
        let body = RigidBody::internode("b", 1.0, 0.1, 1.0);
        let (force, torque) = evaluate_fields(&fields, &FieldSample::from(&body), 0.0);
        assert_eq!(force, Vec3::new(0.0, -10.0 * body.mass(), 0.0));
        assert_eq!(torque, Vec3::zeros());
    }
}
