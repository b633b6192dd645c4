use super::{on_degeneracy, Simulator, TickReport};
use crate::body::{BodyId, CompositeBody, JointFrame, RigidBody};
use crate::config::{DegeneracyPolicy, SimulationConfig};
use crate::error::ArborResult;
use crate::fields::{evaluate_fields, FieldSample};
use crate::kinematics::{articulated_state, integrate_free_body};
use crate::solver::{solve_joint, JointSolveInput};
use crate::world::{local_frame, PhysicsWorld};
use tracing::trace;

/// Sequential reference simulator
#[derive(Debug, Clone)]
pub struct CpuSimulator {
    policy: DegeneracyPolicy,
}

impl Default for CpuSimulator {
    fn default() -> Self {
        Self::new(&SimulationConfig::default())
    }
}

impl CpuSimulator {
    pub fn new(config: &SimulationConfig) -> Self {
        Self {
            policy: config.degeneracy_policy,
        }
    }

    pub fn with_policy(mut self, policy: DegeneracyPolicy) -> Self {
        self.policy = policy;
        self
    }

    fn apply_fields(&self, world: &mut PhysicsWorld, time: f32) {
        let parts = world.parts();
        if parts.fields.is_empty() {
            return;
        }
        for body in parts.bodies.iter_mut().filter(|b| !b.is_static()) {
            let (force, torque) = evaluate_fields(parts.fields, &FieldSample::from(&*body), time);
            body.apply_force(force, torque);
        }
    }

    fn update_composites(&self, world: &mut PhysicsWorld) {
        let parts = world.parts();
        for id in parts.schedule.bottom_up() {
            let composite = composite_of(parts.bodies, id);
            parts.bodies[id.index()].composite = composite;
        }
    }

    fn break_joints(&self, world: &mut PhysicsWorld, report: &mut TickReport) -> ArborResult<()> {
        let breaking: Vec<BodyId> = world
            .bodies()
            .iter()
            .filter(|body| {
                body.parent_joint()
                    .is_some_and(|joint| joint.breaks_under(&body.torque()))
            })
            .map(|body| body.id())
            .collect();
        for id in breaking {
            world.detach(id)?;
            report.detached.push(id);
        }
        Ok(())
    }

    fn update_joints(
        &self,
        world: &mut PhysicsWorld,
        dt: f32,
        report: &mut TickReport,
    ) -> ArborResult<()> {
        let parts = world.parts();
        for body in parts.bodies.iter_mut() {
            let composite = body.composite;
            let Some(joint) = body.parent_joint.as_mut() else {
                continue;
            };
            let input = JointSolveInput {
                rotation: joint.frame.rotation,
                position: joint.frame.position,
                spring: joint.spring(),
                theta: joint.theta,
                composite_mass: composite.mass,
                composite_center_of_mass: composite.center_of_mass,
                composite_inertia: composite.inertia,
                composite_torque: composite.torque,
            };
            match solve_joint(&input, dt) {
                Ok(theta) => joint.theta = theta,
                Err(cause) => on_degeneracy(self.policy, body.id, cause, report)?,
            }
        }
        Ok(())
    }

    fn update_articulated_bodies(&self, world: &mut PhysicsWorld) {
        let parts = world.parts();
        for level in parts.schedule.levels().iter().rev() {
            for unit in level {
                for id in unit.top_down() {
                    update_articulated(parts.bodies, id);
                }
            }
        }
    }

    fn update_free_bodies(
        &self,
        world: &mut PhysicsWorld,
        dt: f32,
        report: &mut TickReport,
    ) -> ArborResult<()> {
        let parts = world.parts();
        for body in parts.bodies.iter_mut() {
            if body.is_attached() || body.is_static() {
                continue;
            }
            let local = local_frame(body);
            match integrate_free_body(&body.state, &local, &body.force, &body.torque, dt) {
                Ok(state) => body.state = state,
                Err(cause) => on_degeneracy(self.policy, body.id, cause, report)?,
            }
        }
        Ok(())
    }
}

impl Simulator for CpuSimulator {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn step(&mut self, world: &mut PhysicsWorld, time: f32, dt: f32) -> ArborResult<TickReport> {
        let mut report = TickReport::new(time);

        self.apply_fields(world, time);
        trace!("fields applied");
        self.update_composites(world);
        trace!("composites updated");
        self.break_joints(world, &mut report)?;
        self.update_joints(world, dt, &mut report)?;
        trace!("joints solved");
        self.update_articulated_bodies(world);
        self.update_free_bodies(world, dt, &mut report)?;
        trace!("bodies integrated");

        for body in world.parts().bodies.iter_mut() {
            body.reset_forces();
        }
        Ok(report)
    }
}

/// Composite of `id` from its own load and its children's finished composites
pub(crate) fn composite_of(bodies: &[RigidBody], id: BodyId) -> CompositeBody {
    let body = &bodies[id.index()];
    let own = CompositeBody {
        mass: body.mass(),
        force: body.force,
        torque: body.torque,
        center_of_mass: body.state.center_of_mass,
        inertia: body.state.inertia,
    };
    let children = body.children.iter().map(|&child| {
        let child = &bodies[child.index()];
        let joint_position = child
            .parent_joint
            .as_ref()
            .map_or(child.state.pivot, |joint| joint.frame.position);
        (joint_position, &child.composite)
    });
    CompositeBody::aggregate(&own, &body.state.pivot, children)
}

fn update_articulated(bodies: &mut [RigidBody], id: BodyId) {
    let Some(parent) = bodies[id.index()].parent() else {
        return;
    };
    let parent_state = bodies[parent.index()].state;
    let body = &mut bodies[id.index()];
    let local = local_frame(body);
    let angular_momentum = body.state.angular_momentum;
    let Some(joint) = body.parent_joint.as_mut() else {
        return;
    };
    joint.frame =
        JointFrame::from_parent(&parent_state, joint.local_rotation(), joint.local_position());
    body.state =
        articulated_state(&parent_state, &joint.frame, &joint.theta, &local, angular_momentum);
}
