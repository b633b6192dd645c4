//! Rigid bodies, the joints that hang them from their parents, and the
//! per-body composite aggregate.
//!
//! Bodies live in the [`PhysicsWorld`](crate::world::PhysicsWorld) arena and
//! refer to each other by [`BodyId`]. A body owns the joint to its parent;
//! the parent only keeps the ids of its children.

mod composite;
mod joint;

pub use composite::CompositeBody;
pub use joint::{Joint, JointFrame};

use crate::error::ConfigError;
use crate::math::{rotate_tensor, vec3_is_finite, Mat3, Quat, Vec3};
use nalgebra::SymmetricEigen;
use serde::Serialize;
use std::f32::consts::PI;
use std::fmt;

/// Leaf blades are modeled as plates this thick
const LEAF_THICKNESS: f32 = 0.001;

/// Index of a body in its world
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct BodyId(pub(crate) u32);

impl BodyId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for BodyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Whether the body takes part in the dynamics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyKind {
    /// Fixed anchor: never integrated, never pushed by fields
    Static,
    Dynamic,
}

/// Geometry a body was built from, used by aerodynamic fields
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Shape {
    /// Solid cylinder along the local y axis
    Internode { length: f32, radius: f32 },
    /// Square blade in the local xy plane, normal along local z
    Leaf { length: f32 },
}

impl Shape {
    /// Area presented to the air
    pub fn area(&self) -> f32 {
        match *self {
            Shape::Internode { length, radius } => 2.0 * radius * length,
            Shape::Leaf { length } => length * length,
        }
    }
}

/// Time-varying world-space state of a body
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyState {
    pub rotation: Quat,
    /// Where the parent joint attaches
    pub pivot: Vec3,
    pub center_of_mass: Vec3,
    /// Inertia tensor about the center of mass, world frame
    pub inertia: Mat3,
    pub velocity: Vec3,
    pub acceleration: Vec3,
    pub angular_velocity: Vec3,
    pub angular_acceleration: Vec3,
    pub angular_momentum: Vec3,
}

impl BodyState {
    fn at_rest(rotation: Quat, pivot: Vec3, local_pivot: &Vec3, local_inertia: &Mat3) -> Self {
        Self {
            rotation,
            pivot,
            center_of_mass: pivot + rotation * (-local_pivot),
            inertia: rotate_tensor(&rotation, local_inertia),
            velocity: Vec3::zeros(),
            acceleration: Vec3::zeros(),
            angular_velocity: Vec3::zeros(),
            angular_acceleration: Vec3::zeros(),
            angular_momentum: Vec3::zeros(),
        }
    }
}

/// A rigid segment of the structure
#[derive(Debug, Clone)]
pub struct RigidBody {
    pub(crate) id: BodyId,
    name: String,
    kind: BodyKind,
    shape: Option<Shape>,
    mass: f32,
    local_inertia: Mat3,
    /// From the center of mass to the parent attachment, body frame
    local_pivot: Vec3,
    pub(crate) state: BodyState,
    pub(crate) force: Vec3,
    pub(crate) torque: Vec3,
    pub(crate) parent_joint: Option<Joint>,
    pub(crate) children: Vec<BodyId>,
    pub(crate) composite: CompositeBody,
}

impl RigidBody {
    /// Dynamic body with explicit mass properties
    pub fn new(name: impl Into<String>, mass: f32, local_inertia: Mat3, local_pivot: Vec3) -> Self {
        let state =
            BodyState::at_rest(Quat::identity(), Vec3::zeros(), &local_pivot, &local_inertia);
        Self {
            id: BodyId(u32::MAX),
            name: name.into(),
            kind: BodyKind::Dynamic,
            shape: None,
            mass,
            local_inertia,
            local_pivot,
            state,
            force: Vec3::zeros(),
            torque: Vec3::zeros(),
            parent_joint: None,
            children: Vec::new(),
            composite: CompositeBody::default(),
        }
    }

    /// Massless static anchor
    pub fn anchor(name: impl Into<String>) -> Self {
        let mut body = Self::new(name, 0.0, Mat3::zeros(), Vec3::zeros());
        body.kind = BodyKind::Static;
        body
    }

    /// Solid cylinder of the given size and density, hanging from its base
    pub fn internode(name: impl Into<String>, length: f32, radius: f32, density: f32) -> Self {
        let mass = PI * radius * radius * length * density;
        let across = mass * radius * radius / 4.0 + mass * length * length / 12.0;
        let along = mass * radius * radius / 2.0;
        let inertia = Mat3::from_diagonal(&Vec3::new(across, along, across));
        let mut body = Self::new(name, mass, inertia, Vec3::new(0.0, -length / 2.0, 0.0));
        body.shape = Some(Shape::Internode { length, radius });
        body
    }

    /// Thin square blade of side `length`
    pub fn leaf(name: impl Into<String>, length: f32, density: f32) -> Self {
        let mass = density * length * length * LEAF_THICKNESS;
        let edge = mass * length * length / 12.0;
        let inertia = Mat3::from_diagonal(&Vec3::new(edge, edge, 2.0 * edge));
        let mut body = Self::new(name, mass, inertia, Vec3::new(0.0, -length / 2.0, 0.0));
        body.shape = Some(Shape::Leaf { length });
        body
    }

    pub fn with_kind(mut self, kind: BodyKind) -> Self {
        self.kind = kind;
        self
    }

    /// Place a root body so its pivot sits at `pivot` with `rotation`
    pub fn with_pose(mut self, pivot: Vec3, rotation: Quat) -> Self {
        self.state = BodyState::at_rest(rotation, pivot, &self.local_pivot, &self.local_inertia);
        self
    }

    pub fn id(&self) -> BodyId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> BodyKind {
        self.kind
    }

    pub fn is_static(&self) -> bool {
        self.kind == BodyKind::Static
    }

    pub fn shape(&self) -> Option<Shape> {
        self.shape
    }

    pub fn mass(&self) -> f32 {
        self.mass
    }

    pub fn local_inertia(&self) -> &Mat3 {
        &self.local_inertia
    }

    pub fn local_pivot(&self) -> &Vec3 {
        &self.local_pivot
    }

    pub fn state(&self) -> &BodyState {
        &self.state
    }

    pub fn rotation(&self) -> Quat {
        self.state.rotation
    }

    pub fn pivot(&self) -> Vec3 {
        self.state.pivot
    }

    pub fn center_of_mass(&self) -> Vec3 {
        self.state.center_of_mass
    }

    pub fn force(&self) -> Vec3 {
        self.force
    }

    pub fn torque(&self) -> Vec3 {
        self.torque
    }

    pub fn parent_joint(&self) -> Option<&Joint> {
        self.parent_joint.as_ref()
    }

    pub fn parent(&self) -> Option<BodyId> {
        self.parent_joint.as_ref().map(|joint| joint.parent())
    }

    pub fn children(&self) -> &[BodyId] {
        &self.children
    }

    pub fn composite(&self) -> &CompositeBody {
        &self.composite
    }

    /// Attached bodies are held by a joint
    pub fn is_attached(&self) -> bool {
        self.parent_joint.is_some()
    }

    /// Accumulate a force at the center of mass plus a pure torque.
    ///
    /// Attached bodies store torque about their pivot, so the force's lever
    /// arm from the pivot is added.
    pub fn apply_force(&mut self, force: Vec3, torque: Vec3) {
        let lever = self
            .is_attached()
            .then(|| self.state.center_of_mass - self.state.pivot);
        accumulate_load(&mut self.force, &mut self.torque, lever, &force, &torque);
    }

    /// Accumulate a force acting at a world-space point
    pub fn apply_force_at(&mut self, force: Vec3, point: Vec3) {
        let reference = if self.is_attached() {
            self.state.pivot
        } else {
            self.state.center_of_mass
        };
        self.force += force;
        self.torque += (point - reference).cross(&force);
    }

    pub fn apply_torque(&mut self, torque: Vec3) {
        self.torque += torque;
    }

    pub(crate) fn reset_forces(&mut self) {
        self.force = Vec3::zeros();
        self.torque = Vec3::zeros();
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if !self.mass.is_finite() || self.mass < 0.0 {
            return Err(ConfigError::InvalidMass {
                body: self.name.clone(),
                mass: self.mass,
            });
        }
        if self.kind == BodyKind::Dynamic && self.mass == 0.0 {
            return Err(ConfigError::MasslessDynamicBody(self.name.clone()));
        }
        if !vec3_is_finite(&self.local_pivot)
            || !vec3_is_finite(&self.state.pivot)
            || !self.state.rotation.coords.iter().all(|x| x.is_finite())
        {
            return Err(ConfigError::InvalidPivot(self.name.clone()));
        }
        if !is_symmetric_psd(&self.local_inertia) {
            return Err(ConfigError::InvalidInertia(self.name.clone()));
        }
        Ok(())
    }
}

/// Add a force through the center of mass and a pure torque. `lever` is
/// the center of mass relative to the pivot when torque is kept about the
/// pivot.
pub(crate) fn accumulate_load(
    force: &mut Vec3,
    torque: &mut Vec3,
    lever: Option<Vec3>,
    applied_force: &Vec3,
    applied_torque: &Vec3,
) {
    *force += applied_force;
    *torque += applied_torque;
    if let Some(lever) = lever {
        *torque += lever.cross(applied_force);
    }
}

fn is_symmetric_psd(m: &Mat3) -> bool {
    if !m.iter().all(|x| x.is_finite()) {
        return false;
    }
    let scale = m.amax().max(f32::MIN_POSITIVE);
    if (m - m.transpose()).amax() > 1e-5 * scale {
        return false;
    }
    SymmetricEigen::new(*m)
        .eigenvalues
        .iter()
        .all(|&value| value >= -1e-5 * scale)
}
