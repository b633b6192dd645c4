//! Joint-space spring-damper solve
//!
//! Each joint obeys `I·θ'' + (α·I + β·K)·θ' + K·θ = τ` in its own frame.
//! With `I = L·Lᵀ` and `L⁻¹·K·L⁻ᵀ = X·Λ·Xᵀ`, the change of basis
//! `θ = U·y`, `U = L⁻ᵀ·X` decouples the system into three scalar
//! equations `y'' + (α + β·Λᵢ)·y' + Λᵢ·y = (Uᵀ·τ)ᵢ`.

use super::ode::solve_differential;
use crate::error::{Degeneracy, SolveResult};
use crate::math::{mat3_is_finite, skew_squared, Mat3, Quat, Vec3};
use nalgebra::{Cholesky, Matrix3, SymmetricEigen};

const EIGEN_EPSILON: f64 = 1e-12;
const EIGEN_MAX_ITERATIONS: usize = 64;

/// Spring and damper coefficients of one joint
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpringDamper {
    pub stiffness: f32,
    pub damping: f32,
    pub stiffness_damping: f32,
}

/// Everything one joint solve reads
#[derive(Debug, Clone, Copy)]
pub struct JointSolveInput {
    pub rotation: Quat,
    pub position: Vec3,
    pub spring: SpringDamper,
    /// Rows: angle, angular velocity, angular acceleration
    pub theta: Mat3,
    pub composite_mass: f32,
    pub composite_center_of_mass: Vec3,
    pub composite_inertia: Mat3,
    pub composite_torque: Vec3,
}

/// Composite inertia about the joint, expressed in joint space
pub fn joint_space_inertia(input: &JointSolveInput) -> Mat3 {
    let inverse = input.rotation.inverse();
    let r = inverse.to_rotation_matrix().into_inner();
    let offset = inverse * (input.composite_center_of_mass - input.position);
    r * input.composite_inertia * r.transpose() - input.composite_mass * skew_squared(&offset)
}

/// Advance a joint's θ by `dt`
pub fn solve_joint(input: &JointSolveInput, dt: f32) -> SolveResult<Mat3> {
    let spring = input.spring;
    if spring.stiffness.is_infinite() {
        return Ok(Mat3::zeros());
    }

    let inertia = joint_space_inertia(input);
    let torque = input.rotation.inverse() * input.composite_torque;

    let l = Cholesky::new(inertia)
        .ok_or(Degeneracy::NotPositiveDefinite)?
        .unpack();
    let l_inverse = l.try_inverse().ok_or(Degeneracy::NotPositiveDefinite)?;

    let a = l_inverse * (Mat3::identity() * spring.stiffness) * l_inverse.transpose();
    let a: Matrix3<f64> = ((a + a.transpose()) * 0.5).cast();
    let eigen = SymmetricEigen::try_new(a, EIGEN_EPSILON, EIGEN_MAX_ITERATIONS)
        .ok_or(Degeneracy::EigenNotConverged)?;
    let lambda = eigen.eigenvalues.cast::<f32>();
    let x: Mat3 = eigen.eigenvectors.cast();

    let u = l_inverse.transpose() * x;
    let u_inverse = u.try_inverse().ok_or(Degeneracy::SingularBasis)?;

    let torque_diagonal = u.transpose() * torque;
    let angle_diagonal = u_inverse * input.theta.row(0).transpose();
    let velocity_diagonal = u_inverse * input.theta.row(1).transpose();

    let mut modal = Mat3::zeros();
    for i in 0..3 {
        let stiffness = lambda[i];
        if !(stiffness > 0.0) {
            return Err(Degeneracy::NonPositiveEigenvalue(stiffness));
        }
        let damping = spring.damping + spring.stiffness_damping * stiffness;
        let solution = solve_differential(
            1.0,
            damping,
            stiffness,
            torque_diagonal[i],
            angle_diagonal[i],
            velocity_diagonal[i],
        );
        // Column i holds (y, y', y'') of decoupled axis i
        modal.set_column(i, &solution.evaluate(dt));
    }

    // Row k of θ is U applied to the k-th derivative across all axes.
    let theta = (u * modal.transpose()).transpose();
    if !mat3_is_finite(&theta) {
        return Err(Degeneracy::NonFinite);
    }
    Ok(theta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn rod_input(torque: Vec3) -> JointSolveInput {
        JointSolveInput {
            rotation: Quat::identity(),
            position: Vec3::zeros(),
            spring: SpringDamper {
                stiffness: 1.0,
                damping: 1.0,
                stiffness_damping: 1.0,
            },
            theta: Mat3::zeros(),
            composite_mass: 1.0,
            composite_center_of_mass: Vec3::new(0.0, 0.5, 0.0),
            composite_inertia: Mat3::from_diagonal(&Vec3::new(1.0 / 3.0, 0.5, 1.0 / 3.0)),
            composite_torque: torque,
        }
    }

    #[test]
    fn test_joint_space_inertia_parallel_axis() {
        let inertia = joint_space_inertia(&rod_input(Vec3::zeros()));
        let expected = Mat3::from_diagonal(&Vec3::new(1.0 / 3.0 + 0.25, 0.5, 1.0 / 3.0 + 0.25));
        assert_relative_eq!(inertia, expected, epsilon = 1e-6);
    }

    #[test]
    fn test_rigid_joint_never_moves() {
        let mut input = rod_input(Vec3::new(0.0, 0.0, -5.0));
        input.spring.stiffness = f32::INFINITY;
        assert_eq!(solve_joint(&input, 1.0 / 60.0).unwrap(), Mat3::zeros());
    }

    #[test]
    fn test_single_axis_matches_scalar_ode() {
        let dt = 1.0 / 60.0;
        let theta = solve_joint(&rod_input(Vec3::new(0.0, 0.0, -1.0)), dt).unwrap();

        let moment = 1.0 / 3.0 + 0.25;
        let expected = solve_differential(moment, moment + 1.0, 1.0, -1.0, 0.0, 0.0).evaluate(dt);
        assert_relative_eq!(theta[(0, 2)], expected.x, epsilon = 1e-5);
        assert_relative_eq!(theta[(1, 2)], expected.y, epsilon = 1e-4);
        assert_relative_eq!(theta[(2, 2)], expected.z, epsilon = 1e-3);
        for row in 0..3 {
            assert_relative_eq!(theta[(row, 0)], 0.0, epsilon = 1e-6);
            assert_relative_eq!(theta[(row, 1)], 0.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_singular_inertia_is_reported() {
        let mut input = rod_input(Vec3::new(1.0, 0.0, 0.0));
        input.composite_mass = 0.0;
        input.composite_inertia = Mat3::zeros();
        assert_eq!(
            solve_joint(&input, 1.0 / 60.0),
            Err(Degeneracy::NotPositiveDefinite)
        );
    }

    #[test]
    fn test_spring_returns_toward_rest() {
        let mut input = rod_input(Vec3::zeros());
        input.theta = Mat3::from_rows(&[
            Vec3::new(0.0, 0.0, 0.2).transpose(),
            Vec3::zeros().transpose(),
            Vec3::zeros().transpose(),
        ]);
        let theta = solve_joint(&input, 1.0 / 60.0).unwrap();
        assert!(theta[(0, 2)] < 0.2);
        assert!(theta[(1, 2)] < 0.0);
    }
}
