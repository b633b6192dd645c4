//! Flat buffer layout shared by the parallel kernels
//!
//! Bodies are stored so every level's units of work are one contiguous
//! range, followed by all climbers (each unit's chain contiguous, nearest
//! ancestor first) and finally the roots:
//!
//! ```text
//! | level 0 units | level 1 units | ... | climbers | roots |
//! ```
//!
//! Children are referenced through a CSR table of device indices. A
//! broken link is overwritten with [`DETACHED`] in place.

use crate::body::{BodyId, BodyState, CompositeBody, JointFrame, RigidBody, Shape};
use crate::fields::FieldSample;
use crate::kinematics::LocalFrame;
use crate::math::{
    mat3_from_array, mat3_to_array, quat_from_array, quat_to_array, vec3_from_array,
    vec3_to_array, Mat3, Quat, Vec3,
};
use crate::solver::SpringDamper;
use crate::world::PhysicsWorld;
use bytemuck::{Pod, Zeroable};
use std::ops::Range;

/// Child slot of a link broken during the current tick
pub const DETACHED: u32 = u32::MAX;

/// `parent` of a body with no parent joint
pub const NO_PARENT: i32 = -1;

pub const FLAG_DYNAMIC: u32 = 1;
pub const FLAG_ATTACHED: u32 = 1 << 1;

pub const SHAPE_NONE: u32 = 0;
pub const SHAPE_INTERNODE: u32 = 1;
pub const SHAPE_LEAF: u32 = 2;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct RigidBodyStruct {
    pub parent: i32,
    pub first_child: u32,
    pub child_count: u32,
    pub first_climber: u32,
    pub climber_count: u32,
    pub flags: u32,
    pub shape_kind: u32,
    pub shape_length: f32,
    pub shape_radius: f32,
    pub mass: f32,
    pub local_pivot: [f32; 3],
    pub local_inertia: [[f32; 3]; 3],
    pub rotation: [f32; 4],
    pub pivot: [f32; 3],
    pub center_of_mass: [f32; 3],
    pub inertia: [[f32; 3]; 3],
    pub velocity: [f32; 3],
    pub acceleration: [f32; 3],
    pub angular_velocity: [f32; 3],
    pub angular_acceleration: [f32; 3],
    pub angular_momentum: [f32; 3],
    pub force: [f32; 3],
    pub torque: [f32; 3],
}

impl RigidBodyStruct {
    pub fn is_dynamic(&self) -> bool {
        self.flags & FLAG_DYNAMIC != 0
    }

    pub fn is_attached(&self) -> bool {
        self.flags & FLAG_ATTACHED != 0
    }

    pub fn state(&self) -> BodyState {
        BodyState {
            rotation: quat_from_array(self.rotation),
            pivot: vec3_from_array(self.pivot),
            center_of_mass: vec3_from_array(self.center_of_mass),
            inertia: mat3_from_array(self.inertia),
            velocity: vec3_from_array(self.velocity),
            acceleration: vec3_from_array(self.acceleration),
            angular_velocity: vec3_from_array(self.angular_velocity),
            angular_acceleration: vec3_from_array(self.angular_acceleration),
            angular_momentum: vec3_from_array(self.angular_momentum),
        }
    }

    pub fn set_state(&mut self, state: &BodyState) {
        self.rotation = quat_to_array(&state.rotation);
        self.pivot = vec3_to_array(&state.pivot);
        self.center_of_mass = vec3_to_array(&state.center_of_mass);
        self.inertia = mat3_to_array(&state.inertia);
        self.velocity = vec3_to_array(&state.velocity);
        self.acceleration = vec3_to_array(&state.acceleration);
        self.angular_velocity = vec3_to_array(&state.angular_velocity);
        self.angular_acceleration = vec3_to_array(&state.angular_acceleration);
        self.angular_momentum = vec3_to_array(&state.angular_momentum);
    }

    pub fn local_frame(&self) -> LocalFrame {
        LocalFrame {
            mass: self.mass,
            inertia: mat3_from_array(self.local_inertia),
            pivot: vec3_from_array(self.local_pivot),
        }
    }

    pub fn shape(&self) -> Option<Shape> {
        match self.shape_kind {
            SHAPE_INTERNODE => Some(Shape::Internode {
                length: self.shape_length,
                radius: self.shape_radius,
            }),
            SHAPE_LEAF => Some(Shape::Leaf {
                length: self.shape_length,
            }),
            _ => None,
        }
    }

    pub fn field_sample(&self) -> FieldSample {
        FieldSample {
            mass: self.mass,
            center_of_mass: vec3_from_array(self.center_of_mass),
            velocity: vec3_from_array(self.velocity),
            angular_velocity: vec3_from_array(self.angular_velocity),
            rotation: quat_from_array(self.rotation),
            inertia: mat3_from_array(self.inertia),
            shape: self.shape(),
        }
    }

    pub fn force(&self) -> Vec3 {
        vec3_from_array(self.force)
    }

    pub fn torque(&self) -> Vec3 {
        vec3_from_array(self.torque)
    }

    /// The body's own load as a single-body composite
    pub fn own_composite(&self) -> CompositeBody {
        CompositeBody {
            mass: self.mass,
            force: self.force(),
            torque: self.torque(),
            center_of_mass: vec3_from_array(self.center_of_mass),
            inertia: mat3_from_array(self.inertia),
        }
    }

    fn from_body(body: &RigidBody) -> Self {
        let mut out = Self::zeroed();
        out.parent = NO_PARENT;
        out.flags = if body.is_static() { 0 } else { FLAG_DYNAMIC };
        let (shape_kind, shape_length, shape_radius) = match body.shape() {
            Some(Shape::Internode { length, radius }) => (SHAPE_INTERNODE, length, radius),
            Some(Shape::Leaf { length }) => (SHAPE_LEAF, length, 0.0),
            None => (SHAPE_NONE, 0.0, 0.0),
        };
        out.shape_kind = shape_kind;
        out.shape_length = shape_length;
        out.shape_radius = shape_radius;
        out.mass = body.mass();
        out.local_pivot = vec3_to_array(body.local_pivot());
        out.local_inertia = mat3_to_array(body.local_inertia());
        out.upload_dynamic(body);
        out
    }

    fn upload_dynamic(&mut self, body: &RigidBody) {
        self.set_state(body.state());
        self.force = vec3_to_array(&body.force());
        self.torque = vec3_to_array(&body.torque());
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct JointStruct {
    pub local_rotation: [f32; 4],
    pub local_position: [f32; 3],
    pub stiffness: f32,
    pub damping: f32,
    pub stiffness_damping: f32,
    pub torque_threshold: f32,
    pub rotation: [f32; 4],
    pub position: [f32; 3],
    pub velocity: [f32; 3],
    pub acceleration: [f32; 3],
    pub theta: [[f32; 3]; 3],
}

impl JointStruct {
    pub fn local_rotation(&self) -> Quat {
        quat_from_array(self.local_rotation)
    }

    pub fn local_position(&self) -> Vec3 {
        vec3_from_array(self.local_position)
    }

    pub fn frame(&self) -> JointFrame {
        JointFrame {
            rotation: quat_from_array(self.rotation),
            position: vec3_from_array(self.position),
            velocity: vec3_from_array(self.velocity),
            acceleration: vec3_from_array(self.acceleration),
        }
    }

    pub fn set_frame(&mut self, frame: &JointFrame) {
        self.rotation = quat_to_array(&frame.rotation);
        self.position = vec3_to_array(&frame.position);
        self.velocity = vec3_to_array(&frame.velocity);
        self.acceleration = vec3_to_array(&frame.acceleration);
    }

    pub fn theta(&self) -> Mat3 {
        mat3_from_array(self.theta)
    }

    pub fn spring(&self) -> SpringDamper {
        SpringDamper {
            stiffness: self.stiffness,
            damping: self.damping,
            stiffness_damping: self.stiffness_damping,
        }
    }

    pub fn breaks_under(&self, torque: &Vec3) -> bool {
        torque.norm() > self.torque_threshold
    }

    fn upload_dynamic(&mut self, body: &RigidBody) {
        if let Some(joint) = body.parent_joint() {
            self.set_frame(joint.frame());
            self.theta = mat3_to_array(joint.theta());
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct CompositeBodyStruct {
    pub mass: f32,
    pub force: [f32; 3],
    pub torque: [f32; 3],
    pub center_of_mass: [f32; 3],
    pub inertia: [[f32; 3]; 3],
}

impl From<&CompositeBody> for CompositeBodyStruct {
    fn from(c: &CompositeBody) -> Self {
        Self {
            mass: c.mass,
            force: vec3_to_array(&c.force),
            torque: vec3_to_array(&c.torque),
            center_of_mass: vec3_to_array(&c.center_of_mass),
            inertia: mat3_to_array(&c.inertia),
        }
    }
}

impl From<&CompositeBodyStruct> for CompositeBody {
    fn from(c: &CompositeBodyStruct) -> Self {
        Self {
            mass: c.mass,
            force: vec3_from_array(c.force),
            torque: vec3_from_array(c.torque),
            center_of_mass: vec3_from_array(c.center_of_mass),
            inertia: mat3_from_array(c.inertia),
        }
    }
}

/// Device-resident copy of a world
#[derive(Debug, Clone, Default)]
pub struct MemoryLayout {
    pub bodies: Vec<RigidBodyStruct>,
    /// Indexed like `bodies`; zeroed for roots
    pub joints: Vec<JointStruct>,
    pub composites: Vec<CompositeBodyStruct>,
    pub child_ids: Vec<u32>,
    /// Unit-of-work bodies of each level
    pub ranges: Vec<Range<usize>>,
    pub climber_range: Range<usize>,
    pub root_range: Range<usize>,
    /// Device index to world id
    ids: Vec<BodyId>,
    /// World id to device index
    index: Vec<u32>,
    world_id: u64,
    generation: u64,
}

impl MemoryLayout {
    /// Lay out every body of `world` and upload its state
    pub fn build(world: &mut PhysicsWorld) -> Self {
        let schedule = world.schedule().clone();

        let mut ids = Vec::with_capacity(world.len());
        let mut ranges = Vec::with_capacity(schedule.levels().len());
        for level in schedule.levels() {
            let start = ids.len();
            ids.extend(level.iter().map(|unit| unit.body));
            ranges.push(start..ids.len());
        }
        let climber_start = ids.len();
        let mut first_climbers = Vec::new();
        for level in schedule.levels() {
            for unit in level {
                first_climbers.push((ids.len(), unit.climbers.len()));
                ids.extend(unit.climbers.iter().copied());
            }
        }
        let climber_range = climber_start..ids.len();
        ids.extend(schedule.roots().iter().copied());
        let root_range = climber_range.end..ids.len();

        let mut index = vec![0u32; world.len()];
        for (device, id) in ids.iter().enumerate() {
            index[id.index()] = device as u32;
        }

        let mut bodies: Vec<RigidBodyStruct> = ids
            .iter()
            .map(|&id| RigidBodyStruct::from_body(&world.bodies()[id.index()]))
            .collect();
        let mut joints = vec![JointStruct::zeroed(); ids.len()];
        let mut child_ids = Vec::new();

        for (device, &id) in ids.iter().enumerate() {
            let body = &world.bodies()[id.index()];
            let out = &mut bodies[device];
            out.first_child = child_ids.len() as u32;
            out.child_count = body.children().len() as u32;
            child_ids.extend(body.children().iter().map(|c| index[c.index()]));

            if let Some(joint) = body.parent_joint() {
                out.parent = index[joint.parent().index()] as i32;
                out.flags |= FLAG_ATTACHED;
                let config = joint.config();
                joints[device] = JointStruct {
                    local_rotation: quat_to_array(joint.local_rotation()),
                    local_position: vec3_to_array(joint.local_position()),
                    stiffness: config.stiffness,
                    damping: config.damping,
                    stiffness_damping: config.stiffness_damping,
                    torque_threshold: config.torque_threshold,
                    ..JointStruct::zeroed()
                };
                joints[device].upload_dynamic(body);
            }
        }

        let unit_count: usize = ranges.iter().map(|r| r.len()).sum();
        for (unit, (first, count)) in (0..unit_count).zip(first_climbers) {
            bodies[unit].first_climber = first as u32;
            bodies[unit].climber_count = count as u32;
        }

        Self {
            composites: vec![CompositeBodyStruct::zeroed(); ids.len()],
            bodies,
            joints,
            child_ids,
            ranges,
            climber_range,
            root_range,
            ids,
            index,
            world_id: world.world_id(),
            generation: world.topology_generation(),
        }
    }

    /// Whether this layout was built from `world` and still matches its tree structure
    pub fn matches(&self, world: &PhysicsWorld) -> bool {
        self.world_id == world.world_id()
            && self.generation == world.topology_generation()
            && self.ids.len() == world.len()
    }

    /// Refresh per-tick state from the host
    pub fn upload(&mut self, world: &PhysicsWorld) {
        for (device, &id) in self.ids.iter().enumerate() {
            let body = &world.bodies()[id.index()];
            self.bodies[device].upload_dynamic(body);
            self.joints[device].upload_dynamic(body);
        }
    }

    /// Copy state, joint state and composites back to the host
    pub fn download(&self, world: &mut PhysicsWorld) {
        for (device, &id) in self.ids.iter().enumerate() {
            let Some(body) = world.body_mut(id) else {
                continue;
            };
            let src = &self.bodies[device];
            body.state = src.state();
            body.force = src.force();
            body.torque = src.torque();
            body.composite = CompositeBody::from(&self.composites[device]);
            if let Some(joint) = body.parent_joint.as_mut() {
                let j = &self.joints[device];
                joint.frame = j.frame();
                joint.theta = j.theta();
            }
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn body_id(&self, device: usize) -> BodyId {
        self.ids[device]
    }

    pub fn device_index(&self, id: BodyId) -> usize {
        self.index[id.index()] as usize
    }

    /// Device indices of the live children of `device`
    pub fn children(&self, device: usize) -> impl Iterator<Item = usize> + '_ {
        let body = &self.bodies[device];
        let start = body.first_child as usize;
        self.child_ids[start..start + body.child_count as usize]
            .iter()
            .filter(|&&c| c != DETACHED)
            .map(|&c| c as usize)
    }

    /// Unit body followed by its climbers
    pub fn chain(&self, unit: usize) -> impl Iterator<Item = usize> + Clone {
        let body = &self.bodies[unit];
        let first = body.first_climber as usize;
        std::iter::once(unit).chain(first..first + body.climber_count as usize)
    }

    /// Unlink `device` from its parent within this layout
    pub fn unlink(&mut self, device: usize) {
        let parent = self.bodies[device].parent;
        if parent == NO_PARENT {
            return;
        }
        let parent = parent as usize;
        let start = self.bodies[parent].first_child as usize;
        let count = self.bodies[parent].child_count as usize;
        for slot in &mut self.child_ids[start..start + count] {
            if *slot == device as u32 {
                *slot = DETACHED;
            }
        }
        let body = &mut self.bodies[device];
        body.parent = NO_PARENT;
        body.flags &= !FLAG_ATTACHED;
    }

    /// Raw bytes of the body buffer, as handed to an accelerator
    pub fn body_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.bodies)
    }
}
