use super::{BodyId, BodyState};
use crate::config::JointConfig;
use crate::math::{Mat3, Quat, Vec3};
use crate::solver::SpringDamper;

/// World-space frame of a joint, derived from its parent every tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointFrame {
    pub rotation: Quat,
    pub position: Vec3,
    /// Velocity of the joint point
    pub velocity: Vec3,
    /// Acceleration of the joint point
    pub acceleration: Vec3,
}

impl JointFrame {
    /// Frame of a joint at `local_position` / `local_rotation` in `parent`'s frame
    pub fn from_parent(parent: &BodyState, local_rotation: &Quat, local_position: &Vec3) -> Self {
        let rotation = Quat::new_normalize((parent.rotation * local_rotation).into_inner());
        let position = parent.pivot + parent.rotation * local_position;
        let lever = position - parent.center_of_mass;
        let omega = parent.angular_velocity;
        Self {
            rotation,
            position,
            velocity: parent.velocity + omega.cross(&lever),
            acceleration: parent.acceleration
                + parent.angular_acceleration.cross(&lever)
                + omega.cross(&omega.cross(&lever)),
        }
    }
}

/// Flexible connector between a parent and a child body.
///
/// Owned by the child. `theta` holds one row per derivative (angle,
/// angular velocity, angular acceleration) and one column per local axis.
#[derive(Debug, Clone)]
pub struct Joint {
    parent: BodyId,
    child: BodyId,
    local_rotation: Quat,
    local_position: Vec3,
    config: JointConfig,
    pub(crate) frame: JointFrame,
    pub(crate) theta: Mat3,
}

impl Joint {
    pub(crate) fn new(
        parent: BodyId,
        child: BodyId,
        config: JointConfig,
        local_rotation: Quat,
        local_position: Vec3,
        parent_state: &BodyState,
    ) -> Self {
        Self {
            parent,
            child,
            local_rotation,
            local_position,
            config,
            frame: JointFrame::from_parent(parent_state, &local_rotation, &local_position),
            theta: Mat3::zeros(),
        }
    }

    pub fn parent(&self) -> BodyId {
        self.parent
    }

    pub fn child(&self) -> BodyId {
        self.child
    }

    pub fn local_rotation(&self) -> &Quat {
        &self.local_rotation
    }

    pub fn local_position(&self) -> &Vec3 {
        &self.local_position
    }

    pub fn config(&self) -> &JointConfig {
        &self.config
    }

    pub fn frame(&self) -> &JointFrame {
        &self.frame
    }

    pub fn rotation(&self) -> Quat {
        self.frame.rotation
    }

    pub fn position(&self) -> Vec3 {
        self.frame.position
    }

    pub fn theta(&self) -> &Mat3 {
        &self.theta
    }

    pub fn angle(&self) -> Vec3 {
        self.theta.row(0).transpose()
    }

    pub fn angular_velocity(&self) -> Vec3 {
        self.theta.row(1).transpose()
    }

    pub fn angular_acceleration(&self) -> Vec3 {
        self.theta.row(2).transpose()
    }

    pub fn spring(&self) -> SpringDamper {
        SpringDamper {
            stiffness: self.config.stiffness,
            damping: self.config.damping,
            stiffness_damping: self.config.stiffness_damping,
        }
    }

    /// Strictly above the threshold breaks
    pub fn breaks_under(&self, torque: &Vec3) -> bool {
        torque.norm() > self.config.torque_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f32::consts::FRAC_PI_2;

    fn parent_state() -> BodyState {
        BodyState {
            rotation: Quat::from_axis_angle(&Vec3::z_axis(), FRAC_PI_2),
            pivot: Vec3::new(1.0, 0.0, 0.0),
            center_of_mass: Vec3::new(0.0, 0.0, 0.0),
            inertia: Mat3::identity(),
            velocity: Vec3::zeros(),
            acceleration: Vec3::zeros(),
            angular_velocity: Vec3::new(0.0, 0.0, 2.0),
            angular_acceleration: Vec3::zeros(),
            angular_momentum: Vec3::zeros(),
        }
    }

    #[test]
    fn test_frame_follows_parent_rotation() {
        let frame =
            JointFrame::from_parent(&parent_state(), &Quat::identity(), &Vec3::new(0.0, 1.0, 0.0));
        // Local +y rotated a quarter turn about z points along -x
        assert_relative_eq!(frame.position, Vec3::new(0.0, 0.0, 0.0), epsilon = 1e-6);
    }

    #[test]
    fn test_frame_point_velocity() {
        let frame = JointFrame::from_parent(&parent_state(), &Quat::identity(), &Vec3::zeros());
        // Joint at (1, 0, 0), spinning at 2 rad/s about z around the origin
        assert_relative_eq!(frame.velocity, Vec3::new(0.0, 2.0, 0.0), epsilon = 1e-6);
        assert_relative_eq!(frame.acceleration, Vec3::new(-4.0, 0.0, 0.0), epsilon = 1e-6);
    }

    #[test]
    fn test_breaking_is_strict() {
        let state = parent_state();
        let config = JointConfig::leaf().with_torque_threshold(0.30);
        let joint =
            Joint::new(BodyId(0), BodyId(1), config, Quat::identity(), Vec3::zeros(), &state);
        assert!(joint.breaks_under(&Vec3::new(0.0, 0.31, 0.0)));
        assert!(!joint.breaks_under(&Vec3::new(0.0, 0.29, 0.0)));
        assert!(!joint.breaks_under(&Vec3::new(0.0, 0.30, 0.0)));
    }
}
