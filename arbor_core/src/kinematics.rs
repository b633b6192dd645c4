//! Per-body motion updates shared by both simulator backends
//!
//! Every function here is a pure map from inputs to a new [`BodyState`],
//! so the reference and parallel backends produce identical results as
//! long as they feed the same inputs.

use crate::body::{BodyState, JointFrame};
use crate::error::{Degeneracy, SolveResult};
use crate::math::{
    mat3_is_finite, rotate_tensor, rotation_from_angles, vec3_is_finite, Mat3, Quat, Vec3,
};
use nalgebra::Quaternion;

/// Mass properties a body carries in its own frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalFrame {
    pub mass: f32,
    pub inertia: Mat3,
    pub pivot: Vec3,
}

/// State of a body hanging from a joint whose frame is already up to date.
///
/// `theta` rows are the joint's angle, angular velocity and angular
/// acceleration in joint space.
pub fn articulated_state(
    parent: &BodyState,
    joint: &JointFrame,
    theta: &Mat3,
    local: &LocalFrame,
    angular_momentum: Vec3,
) -> BodyState {
    let angle = theta.row(0).transpose();
    let joint_velocity = theta.row(1).transpose();
    let joint_acceleration = theta.row(2).transpose();

    let rotation =
        Quat::new_normalize((joint.rotation * rotation_from_angles(&angle)).into_inner());
    let pivot = joint.position;
    let center_of_mass = pivot + rotation * (-local.pivot);
    let lever = center_of_mass - pivot;

    let angular_velocity = parent.angular_velocity + joint.rotation * joint_velocity;
    let angular_acceleration = parent.angular_acceleration
        + joint.rotation * joint_acceleration
        + parent.angular_velocity.cross(&angular_velocity);

    BodyState {
        rotation,
        pivot,
        center_of_mass,
        inertia: rotate_tensor(&rotation, &local.inertia),
        velocity: joint.velocity + angular_velocity.cross(&lever),
        acceleration: joint.acceleration
            + angular_acceleration.cross(&lever)
            + angular_velocity.cross(&angular_velocity.cross(&lever)),
        angular_velocity,
        angular_acceleration,
        angular_momentum,
    }
}

/// One semi-implicit Euler step of an unconstrained body.
///
/// `torque` is about the center of mass.
pub fn integrate_free_body(
    state: &BodyState,
    local: &LocalFrame,
    force: &Vec3,
    torque: &Vec3,
    dt: f32,
) -> SolveResult<BodyState> {
    let acceleration = force / local.mass;
    let angular_momentum = state.angular_momentum + torque * dt;
    let velocity = state.velocity + acceleration * dt;
    let inertia_inverse = state
        .inertia
        .try_inverse()
        .ok_or(Degeneracy::SingularInertia)?;
    let angular_velocity = inertia_inverse * angular_momentum;
    let center_of_mass = state.center_of_mass + velocity * dt;

    let spin = Quaternion::new(0.0, angular_velocity.x, angular_velocity.y, angular_velocity.z);
    let q = state.rotation.into_inner();
    let rotation = Quat::new_normalize(q + spin * q * (0.5 * dt));

    let inertia = rotate_tensor(&rotation, &local.inertia);
    let next = BodyState {
        rotation,
        pivot: center_of_mass + rotation * local.pivot,
        center_of_mass,
        inertia,
        velocity,
        acceleration,
        angular_velocity,
        angular_acceleration: (angular_velocity - state.angular_velocity) / dt,
        angular_momentum,
    };
    if !state_is_finite(&next) {
        return Err(Degeneracy::NonFinite);
    }
    Ok(next)
}

/// State a body carries into free flight when its joint breaks: its spin
/// becomes angular momentum
pub fn released_state(state: &BodyState) -> BodyState {
    BodyState {
        angular_momentum: state.inertia * state.angular_velocity,
        ..*state
    }
}

/// Torque about the center of mass from one accumulated about the pivot
pub fn released_torque(state: &BodyState, force: &Vec3, torque: &Vec3) -> Vec3 {
    torque - (state.center_of_mass - state.pivot).cross(force)
}

/// First non-finite quantity of a state, if any
pub fn first_non_finite(state: &BodyState) -> Option<&'static str> {
    let checks: [(&'static str, bool); 9] = [
        ("rotation", state.rotation.coords.iter().all(|x| x.is_finite())),
        ("pivot", vec3_is_finite(&state.pivot)),
        ("center of mass", vec3_is_finite(&state.center_of_mass)),
        ("inertia tensor", mat3_is_finite(&state.inertia)),
        ("velocity", vec3_is_finite(&state.velocity)),
        ("acceleration", vec3_is_finite(&state.acceleration)),
        ("angular velocity", vec3_is_finite(&state.angular_velocity)),
        ("angular acceleration", vec3_is_finite(&state.angular_acceleration)),
        ("angular momentum", vec3_is_finite(&state.angular_momentum)),
    ];
    checks.iter().find(|(_, ok)| !ok).map(|(name, _)| *name)
}

pub fn state_is_finite(state: &BodyState) -> bool {
    first_non_finite(state).is_none()
}
