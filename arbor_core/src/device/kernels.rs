//! Per-pass kernels over a [`MemoryLayout`]
//!
//! Each kernel computes its results against a shared view of the buffers
//! and scatters them afterwards, so no two workers ever write the same
//! slot. Units of work carry their climbers, which are processed in order
//! inside the same task.

use super::layout::{CompositeBodyStruct, MemoryLayout};
use crate::body::{accumulate_load, BodyId, BodyState, CompositeBody, JointFrame};
use crate::error::{Degeneracy, SolveResult};
use crate::fields::{evaluate_fields, PhysicsField};
use crate::kinematics::{articulated_state, integrate_free_body, released_state, released_torque};
use crate::math::{mat3_from_array, mat3_to_array, vec3_from_array, vec3_to_array, Mat3, Vec3};
use crate::solver::{solve_joint, JointSolveInput};
use rayon::prelude::*;
use rayon::ThreadPool;

pub(super) fn apply_fields(
    pool: &ThreadPool,
    layout: &mut MemoryLayout,
    fields: &[Box<dyn PhysicsField>],
    time: f32,
) {
    if fields.is_empty() {
        return;
    }
    pool.install(|| {
        layout
            .bodies
            .par_iter_mut()
            .filter(|body| body.is_dynamic())
            .for_each(|body| {
                let (force, torque) = evaluate_fields(fields, &body.field_sample(), time);
                let lever = body
                    .is_attached()
                    .then(|| vec3_from_array(body.center_of_mass) - vec3_from_array(body.pivot));
                let mut total_force = body.force();
                let mut total_torque = body.torque();
                accumulate_load(&mut total_force, &mut total_torque, lever, &force, &torque);
                body.force = vec3_to_array(&total_force);
                body.torque = vec3_to_array(&total_torque);
            });
    });
}

pub(super) fn update_composites(pool: &ThreadPool, layout: &mut MemoryLayout) {
    for range in layout.ranges.clone() {
        let results: Vec<(usize, CompositeBodyStruct)> = {
            let view = &*layout;
            pool.install(|| {
                range
                    .into_par_iter()
                    .flat_map_iter(|unit| composite_chain(view, unit))
                    .collect()
            })
        };
        scatter_composites(layout, results);
    }

    let roots = layout.root_range.clone();
    let results: Vec<(usize, CompositeBodyStruct)> = {
        let view = &*layout;
        pool.install(|| {
            roots
                .into_par_iter()
                .map(|root| (root, CompositeBodyStruct::from(&composite_at(view, root, &[]))))
                .collect()
        })
    };
    scatter_composites(layout, results);
}

fn scatter_composites(layout: &mut MemoryLayout, results: Vec<(usize, CompositeBodyStruct)>) {
    for (device, composite) in results {
        layout.composites[device] = composite;
    }
}

fn composite_chain(view: &MemoryLayout, unit: usize) -> Vec<(usize, CompositeBodyStruct)> {
    let mut done: Vec<(usize, CompositeBody)> = Vec::new();
    for device in view.chain(unit) {
        let composite = composite_at(view, device, &done);
        done.push((device, composite));
    }
    done.iter()
        .map(|(device, composite)| (*device, CompositeBodyStruct::from(composite)))
        .collect()
}

/// Composite of one body. `done` holds results of this task not yet
/// scattered into the buffer.
fn composite_at(
    view: &MemoryLayout,
    device: usize,
    done: &[(usize, CompositeBody)],
) -> CompositeBody {
    let body = &view.bodies[device];
    let children: Vec<(Vec3, CompositeBody)> = view
        .children(device)
        .map(|child| {
            let joint_position = if view.bodies[child].is_attached() {
                vec3_from_array(view.joints[child].position)
            } else {
                vec3_from_array(view.bodies[child].pivot)
            };
            let composite = done
                .iter()
                .rev()
                .find(|(index, _)| *index == child)
                .map_or_else(|| CompositeBody::from(&view.composites[child]), |(_, c)| *c);
            (joint_position, composite)
        })
        .collect();
    CompositeBody::aggregate(
        &body.own_composite(),
        &vec3_from_array(body.pivot),
        children.iter().map(|(position, composite)| (*position, composite)),
    )
}

/// Release and unlink every body whose joint gives way. Returns the world
/// ids of the released bodies in body order.
pub(super) fn break_joints(pool: &ThreadPool, layout: &mut MemoryLayout) -> Vec<BodyId> {
    let breaking: Vec<usize> = {
        let view = &*layout;
        pool.install(|| {
            (0..view.len())
                .into_par_iter()
                .filter(|&device| {
                    let body = &view.bodies[device];
                    body.is_attached() && view.joints[device].breaks_under(&body.torque())
                })
                .collect()
        })
    };

    let mut released: Vec<(BodyId, usize)> = breaking
        .into_iter()
        .map(|device| (layout.body_id(device), device))
        .collect();
    released.sort_by_key(|(id, _)| *id);
    for &(_, device) in &released {
        let body = &mut layout.bodies[device];
        let state = body.state();
        body.torque = vec3_to_array(&released_torque(&state, &body.force(), &body.torque()));
        body.set_state(&released_state(&state));
        layout.unlink(device);
    }
    released.into_iter().map(|(id, _)| id).collect()
}

/// Solve every attached joint. Failed solves keep their previous state and
/// are returned in body order.
pub(super) fn solve_joints(
    pool: &ThreadPool,
    layout: &mut MemoryLayout,
    dt: f32,
) -> Vec<(BodyId, Degeneracy)> {
    let results: Vec<(usize, SolveResult<Mat3>)> = {
        let view = &*layout;
        pool.install(|| {
            (0..view.len())
                .into_par_iter()
                .filter(|&device| view.bodies[device].is_attached())
                .map(|device| (device, solve_joint(&joint_input(view, device), dt)))
                .collect()
        })
    };

    let mut faults = Vec::new();
    for (device, result) in results {
        match result {
            Ok(theta) => layout.joints[device].theta = mat3_to_array(&theta),
            Err(cause) => faults.push((layout.body_id(device), cause)),
        }
    }
    faults.sort_by_key(|(id, _)| *id);
    faults
}

fn joint_input(view: &MemoryLayout, device: usize) -> JointSolveInput {
    let joint = &view.joints[device];
    let composite = &view.composites[device];
    let frame = joint.frame();
    JointSolveInput {
        rotation: frame.rotation,
        position: frame.position,
        spring: joint.spring(),
        theta: joint.theta(),
        composite_mass: composite.mass,
        composite_center_of_mass: vec3_from_array(composite.center_of_mass),
        composite_inertia: mat3_from_array(composite.inertia),
        composite_torque: vec3_from_array(composite.torque),
    }
}

pub(super) fn update_articulated(pool: &ThreadPool, layout: &mut MemoryLayout) {
    for range in layout.ranges.clone().into_iter().rev() {
        let results: Vec<(usize, JointFrame, BodyState)> = {
            let view = &*layout;
            pool.install(|| {
                range
                    .into_par_iter()
                    .flat_map_iter(|unit| articulate_chain(view, unit))
                    .collect()
            })
        };
        for (device, frame, state) in results {
            layout.joints[device].set_frame(&frame);
            layout.bodies[device].set_state(&state);
        }
    }
}

fn articulate_chain(view: &MemoryLayout, unit: usize) -> Vec<(usize, JointFrame, BodyState)> {
    let chain: Vec<usize> = view.chain(unit).collect();
    let mut done: Vec<(usize, JointFrame, BodyState)> = Vec::with_capacity(chain.len());
    for &device in chain.iter().rev() {
        let body = &view.bodies[device];
        if !body.is_attached() {
            continue;
        }
        let parent = body.parent as usize;
        let parent_state = done
            .iter()
            .rev()
            .find(|(index, ..)| *index == parent)
            .map_or_else(|| view.bodies[parent].state(), |(_, _, state)| *state);

        let joint = &view.joints[device];
        let frame = JointFrame::from_parent(
            &parent_state,
            &joint.local_rotation(),
            &joint.local_position(),
        );
        let state = articulated_state(
            &parent_state,
            &frame,
            &joint.theta(),
            &body.local_frame(),
            vec3_from_array(body.angular_momentum),
        );
        done.push((device, frame, state));
    }
    done
}

pub(super) fn update_free_bodies(
    pool: &ThreadPool,
    layout: &mut MemoryLayout,
    dt: f32,
) -> Vec<(BodyId, Degeneracy)> {
    let results: Vec<(usize, SolveResult<BodyState>)> = {
        let view = &*layout;
        pool.install(|| {
            (0..view.len())
                .into_par_iter()
                .filter(|&device| {
                    let body = &view.bodies[device];
                    body.is_dynamic() && !body.is_attached()
                })
                .map(|device| {
                    let body = &view.bodies[device];
                    let next = integrate_free_body(
                        &body.state(),
                        &body.local_frame(),
                        &body.force(),
                        &body.torque(),
                        dt,
                    );
                    (device, next)
                })
                .collect()
        })
    };

    let mut faults = Vec::new();
    for (device, result) in results {
        match result {
            Ok(state) => layout.bodies[device].set_state(&state),
            Err(cause) => faults.push((layout.body_id(device), cause)),
        }
    }
    faults.sort_by_key(|(id, _)| *id);
    faults
}

pub(super) fn reset_forces(pool: &ThreadPool, layout: &mut MemoryLayout) {
    pool.install(|| {
        layout.bodies.par_iter_mut().for_each(|body| {
            body.force = [0.0; 3];
            body.torque = [0.0; 3];
        });
    });
}
