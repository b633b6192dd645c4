//! # ARBOR Core
//!
//! Articulated-body dynamics for branching structures such as plants.
//!
//! A world is a forest of rigid bodies. Each non-root body hangs from its
//! parent by a three-axis spring-damper joint. Every tick the engine:
//!
//! - **Fields**: accumulates gravity, wind and attractor forces
//! - **Composites**: folds every subtree into one equivalent body
//! - **Joints**: breaks overloaded joints, then solves each joint's
//!   decoupled modal ODE in closed form
//! - **Kinematics**: places every body from its parent and joint angles
//! - **Free bodies**: integrates detached trees in free flight
//!
//! Two backends run these passes: [`CpuSimulator`] sequentially and
//! [`ParallelSimulator`] level by level on a worker pool.
//!
//! ## Quick Start
//!
//! ```rust
//! use arbor_core::prelude::*;
//!
//! let mut world = PhysicsWorld::new();
//! let ground = world.add_root(RigidBody::anchor("ground")).unwrap();
//! world
//!     .attach(
//!         ground,
//!         RigidBody::internode("trunk", 1.0, 0.05, 750.0),
//!         JointConfig::internode(),
//!         Quat::identity(),
//!         Vec3::zeros(),
//!     )
//!     .unwrap();
//! world.add_field(GravityField::earth());
//!
//! let mut simulation = Simulation::new(world, SimulationConfig::realtime()).unwrap();
//! simulation.run(60).unwrap();
//! assert!(simulation.world().is_finite());
//! ```

pub mod body;
pub mod config;
pub mod device;
pub mod error;
pub mod fields;
pub mod hierarchy;
pub mod kinematics;
pub mod math;
pub mod simulator;
pub mod solver;
pub mod world;

pub use body::{BodyId, BodyKind, BodyState, CompositeBody, Joint, JointFrame, RigidBody, Shape};
pub use config::{Backend, DegeneracyPolicy, JointConfig, SimulationConfig};
pub use device::ParallelSimulator;
pub use error::{ArborError, ArborResult, ConfigError, Degeneracy};
pub use fields::{AttractorField, FieldRegion, GravityField, PhysicsField, WindField};
pub use simulator::{build_simulator, CpuSimulator, Simulation, Simulator, TickReport};
pub use world::{BodyTransform, PhysicsWorld};

/// Everything needed to build and run a world
pub mod prelude {
    pub use crate::body::{BodyId, BodyKind, RigidBody};
    pub use crate::config::{Backend, DegeneracyPolicy, JointConfig, SimulationConfig};
    pub use crate::device::ParallelSimulator;
    pub use crate::error::{ArborError, ArborResult};
    pub use crate::fields::{AttractorField, FieldRegion, GravityField, WindField};
    pub use crate::math::{Mat3, Quat, Vec3};
    pub use crate::simulator::{CpuSimulator, Simulation, Simulator, TickReport};
    pub use crate::world::{BodyTransform, PhysicsWorld};
}
