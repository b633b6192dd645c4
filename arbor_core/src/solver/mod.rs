//! Analytic joint solver
//!
//! - [`ode`]: closed-form scalar second-order ODEs
//! - [`joint_space`]: Cholesky + eigen decoupling of a 3-axis joint

pub mod joint_space;
pub mod ode;

pub use joint_space::{joint_space_inertia, solve_joint, JointSolveInput, SpringDamper};
pub use ode::{solve_differential, solve_quadratic, DifferentialSolution, QuadraticRoots};
