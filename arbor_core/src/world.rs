//! Physics world: the body arena, its force fields and its schedule
//!
//! # Example
//!
//! ```rust,ignore
//! use arbor_core::prelude::*;
//!
//! let mut world = PhysicsWorld::new();
//! let root = world.add_root(RigidBody::anchor("ground"))?;
//! let trunk = world.attach(
//!     root,
//!     RigidBody::internode("trunk", 1.0, 0.05, 750.0),
//!     JointConfig::internode(),
//!     Quat::identity(),
//!     Vec3::zeros(),
//! )?;
//! world.add_field(GravityField::earth());
//! ```

use crate::body::{BodyId, Joint, RigidBody};
use crate::config::JointConfig;
use crate::error::{ArborError, ArborResult, ConfigError};
use crate::fields::PhysicsField;
use crate::hierarchy::{Schedule, Topology};
use crate::kinematics::{self, articulated_state, LocalFrame};
use crate::math::{mat3_is_finite, quat_to_array, vec3_is_finite, vec3_to_array, Quat, Vec3};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

static NEXT_WORLD_ID: AtomicU64 = AtomicU64::new(1);

/// Pose of one body for a renderer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BodyTransform {
    pub id: BodyId,
    pub name: String,
    /// Center of mass
    pub position: [f32; 3],
    pub pivot: [f32; 3],
    /// `[x, y, z, w]`
    pub rotation: [f32; 4],
    pub articulated: bool,
}

/// Owns every body and field of a simulation
#[derive(Debug)]
pub struct PhysicsWorld {
    /// Unique per process, so cached device layouts can tell worlds apart
    world_id: u64,
    bodies: Vec<RigidBody>,
    fields: Vec<Box<dyn PhysicsField>>,
    schedule: Option<Schedule>,
    generation: u64,
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self {
            world_id: NEXT_WORLD_ID.fetch_add(1, Ordering::Relaxed),
            bodies: Vec::new(),
            fields: Vec::new(),
            schedule: None,
            generation: 0,
        }
    }
}

/// Disjoint borrows handed to a simulator pass
pub(crate) struct WorldParts<'a> {
    pub bodies: &'a mut [RigidBody],
    pub fields: &'a [Box<dyn PhysicsField>],
    pub schedule: &'a Schedule,
}

impl PhysicsWorld {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a body that hangs from nothing: a static anchor or a free body
    pub fn add_root(&mut self, mut body: RigidBody) -> ArborResult<BodyId> {
        body.validate()?;
        let id = self.next_id();
        body.id = id;
        debug!("added root {} ({})", id, body.name());
        self.bodies.push(body);
        self.topology_changed();
        Ok(id)
    }

    /// Hang `body` from `parent` by a joint at `local_position`, rotated by
    /// `local_rotation`, both in the parent's frame. The body starts at
    /// rest with the joint undeflected.
    pub fn attach(
        &mut self,
        parent: BodyId,
        mut body: RigidBody,
        joint: JointConfig,
        local_rotation: Quat,
        local_position: Vec3,
    ) -> ArborResult<BodyId> {
        let parent_state = *self
            .bodies
            .get(parent.index())
            .ok_or(ConfigError::ParentNotFound(parent))?
            .state();
        if body.is_static() {
            return Err(ConfigError::StaticChild(body.name().to_string()).into());
        }
        joint.validate(body.name())?;
        if !vec3_is_finite(&local_position)
            || !local_rotation.coords.iter().all(|x| x.is_finite())
        {
            return Err(ConfigError::InvalidPivot(body.name().to_string()).into());
        }
        body.validate()?;

        let id = self.next_id();
        let joint = Joint::new(parent, id, joint, local_rotation, local_position, &parent_state);
        let local = local_frame(&body);
        body.state = articulated_state(
            &parent_state,
            joint.frame(),
            joint.theta(),
            &local,
            Vec3::zeros(),
        );
        body.id = id;
        body.parent_joint = Some(joint);

        self.bodies.push(body);
        self.bodies[parent.index()].children.push(id);
        self.topology_changed();
        Ok(id)
    }

    pub fn add_field(&mut self, field: impl PhysicsField + 'static) {
        self.fields.push(Box::new(field));
    }

    pub fn fields(&self) -> &[Box<dyn PhysicsField>] {
        &self.fields
    }

    pub fn body(&self, id: BodyId) -> Option<&RigidBody> {
        self.bodies.get(id.index())
    }

    pub fn body_mut(&mut self, id: BodyId) -> Option<&mut RigidBody> {
        self.bodies.get_mut(id.index())
    }

    pub fn bodies(&self) -> &[RigidBody] {
        &self.bodies
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    /// Look a body up by name
    pub fn find(&self, name: &str) -> Option<BodyId> {
        self.bodies.iter().find(|b| b.name() == name).map(|b| b.id)
    }

    /// Accumulate a force at a world-space point for the next tick
    pub fn apply_force_at(&mut self, id: BodyId, force: Vec3, point: Vec3) -> ArborResult<()> {
        self.body_mut(id)
            .ok_or(ArborError::UnknownBody(id))?
            .apply_force_at(force, point);
        Ok(())
    }

    /// Bodies without a parent joint
    pub fn roots(&self) -> impl Iterator<Item = BodyId> + '_ {
        self.bodies.iter().filter(|b| !b.is_attached()).map(|b| b.id)
    }

    /// Dynamic bodies without a parent joint
    pub fn free_bodies(&self) -> impl Iterator<Item = BodyId> + '_ {
        self.bodies
            .iter()
            .filter(|b| !b.is_attached() && !b.is_static())
            .map(|b| b.id)
    }

    pub fn world_id(&self) -> u64 {
        self.world_id
    }

    /// Bumped every time the tree structure changes
    pub fn topology_generation(&self) -> u64 {
        self.generation
    }

    /// Traversal orders, recomputed only after the topology changed
    pub fn schedule(&mut self) -> &Schedule {
        if self.schedule.is_none() {
            let roots: Vec<BodyId> = self.roots().collect();
            let schedule = Schedule::build(&*self, &roots);
            debug!(
                "rebuilt schedule: {} roots, {} levels",
                schedule.roots().len(),
                schedule.levels().len()
            );
            self.schedule = Some(schedule);
        }
        self.schedule.get_or_insert_with(Schedule::default)
    }

    pub(crate) fn parts(&mut self) -> WorldParts<'_> {
        self.schedule();
        let schedule = self.schedule.get_or_insert_with(Schedule::default);
        WorldParts {
            bodies: &mut self.bodies,
            fields: &self.fields,
            schedule,
        }
    }

    /// Break the joint above `id`. The body and its subtree become a free
    /// tree and its pending torque is taken about its center of mass.
    /// Returns `false` if it was already free.
    pub fn detach(&mut self, id: BodyId) -> ArborResult<bool> {
        let body = self.bodies.get_mut(id.index()).ok_or(ArborError::UnknownBody(id))?;
        if !body.is_attached() {
            return Ok(false);
        }
        body.torque = kinematics::released_torque(&body.state, &body.force, &body.torque);
        body.state = kinematics::released_state(&body.state);
        self.unlink(id)
    }

    /// Drop the joint above `id` without touching its state
    pub(crate) fn unlink(&mut self, id: BodyId) -> ArborResult<bool> {
        let body = self.bodies.get_mut(id.index()).ok_or(ArborError::UnknownBody(id))?;
        let Some(joint) = body.parent_joint.take() else {
            return Ok(false);
        };
        let parent = joint.parent();
        self.bodies[parent.index()].children.retain(|&child| child != id);
        info!("detached {} from {}", id, parent);
        self.topology_changed();
        Ok(true)
    }

    /// Fails on the first NaN or infinity in any tracked quantity
    pub fn check_finite(&self) -> ArborResult<()> {
        for body in &self.bodies {
            let non_finite = |quantity| ArborError::NonFinite {
                body: body.id,
                quantity,
            };
            if let Some(quantity) = kinematics::first_non_finite(body.state()) {
                return Err(non_finite(quantity));
            }
            if !vec3_is_finite(&body.force) || !vec3_is_finite(&body.torque) {
                return Err(non_finite("applied force"));
            }
            let composite = body.composite();
            if !composite.mass.is_finite()
                || !vec3_is_finite(&composite.force)
                || !vec3_is_finite(&composite.torque)
                || !vec3_is_finite(&composite.center_of_mass)
                || !mat3_is_finite(&composite.inertia)
            {
                return Err(non_finite("composite"));
            }
            if let Some(joint) = body.parent_joint() {
                if !mat3_is_finite(joint.theta()) {
                    return Err(non_finite("joint state"));
                }
                let frame = joint.frame();
                if !vec3_is_finite(&frame.position)
                    || !vec3_is_finite(&frame.velocity)
                    || !vec3_is_finite(&frame.acceleration)
                    || !frame.rotation.coords.iter().all(|x| x.is_finite())
                {
                    return Err(non_finite("joint frame"));
                }
            }
        }
        Ok(())
    }

    pub fn is_finite(&self) -> bool {
        self.check_finite().is_ok()
    }

    /// Current pose of every body
    pub fn transforms(&self) -> Vec<BodyTransform> {
        self.bodies
            .iter()
            .map(|body| BodyTransform {
                id: body.id,
                name: body.name().to_string(),
                position: vec3_to_array(&body.center_of_mass()),
                pivot: vec3_to_array(&body.pivot()),
                rotation: quat_to_array(&body.rotation()),
                articulated: body.is_attached(),
            })
            .collect()
    }

    fn next_id(&self) -> BodyId {
        BodyId(self.bodies.len() as u32)
    }

    fn topology_changed(&mut self) {
        self.schedule = None;
        self.generation += 1;
    }
}

impl Topology for PhysicsWorld {
    fn parent(&self, id: BodyId) -> Option<BodyId> {
        self.bodies[id.index()].parent()
    }

    fn children(&self, id: BodyId) -> &[BodyId] {
        &self.bodies[id.index()].children
    }
}

pub(crate) fn local_frame(body: &RigidBody) -> LocalFrame {
    LocalFrame {
        mass: body.mass(),
        inertia: *body.local_inertia(),
        pivot: *body.local_pivot(),
    }
}
