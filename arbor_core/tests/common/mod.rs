//! Shared world builders for the integration suites

#![allow(dead_code)]

use arbor_core::prelude::*;
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

pub const DT: f32 = 1.0 / 60.0;

/// A static anchor at the origin and a single vertical rod hanging from it
pub fn single_rod(
    length: f32,
    radius: f32,
    density: f32,
    joint: JointConfig,
) -> (PhysicsWorld, BodyId, BodyId) {
    let mut world = PhysicsWorld::new();
    let root = world.add_root(RigidBody::anchor("root")).unwrap();
    let rod = world
        .attach(
            root,
            RigidBody::internode("rod", length, radius, density),
            joint,
            Quat::identity(),
            Vec3::zeros(),
        )
        .unwrap();
    (world, root, rod)
}

/// Random branching tree of `segments` internodes, each attached at the
/// tip of a random earlier segment with a small random bend. Every third
/// segment also carries a leaf when `leaves` is set.
pub fn random_tree(seed: u64, segments: usize, leaves: bool) -> PhysicsWorld {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut world = PhysicsWorld::new();
    let root = world.add_root(RigidBody::anchor("ground")).unwrap();

    let mut tips: Vec<(BodyId, f32)> = Vec::with_capacity(segments);
    for i in 0..segments {
        let (parent, offset) = if tips.is_empty() {
            (root, 0.0)
        } else {
            tips[rng.gen_range(0..tips.len())]
        };
        let length = rng.gen_range(0.3..1.0);
        let radius = rng.gen_range(0.02..0.08);
        let bend = Quat::from_euler_angles(rng.gen_range(-0.6..0.6), 0.0, rng.gen_range(-0.6..0.6));
        let id = world
            .attach(
                parent,
                RigidBody::internode(format!("internode-{}", i), length, radius, 700.0),
                JointConfig::internode(),
                bend,
                Vec3::new(0.0, offset, 0.0),
            )
            .unwrap();
        tips.push((id, length));

        if leaves && i % 3 == 2 {
            world
                .attach(
                    id,
                    RigidBody::leaf(format!("leaf-{}", i), 0.1, 500.0),
                    JointConfig::leaf(),
                    Quat::from_euler_angles(0.0, 0.0, 0.8),
                    Vec3::new(0.0, length, 0.0),
                )
                .unwrap();
        }
    }
    world
}

/// Uniformly random force with components in `[-scale, scale)`
pub fn random_force(rng: &mut ChaCha8Rng, scale: f32) -> Vec3 {
    Vec3::new(
        rng.gen_range(-scale..scale),
        rng.gen_range(-scale..scale),
        rng.gen_range(-scale..scale),
    )
}
