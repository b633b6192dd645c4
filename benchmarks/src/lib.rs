//! Tree fixtures shared by the ARBOR benches

use arbor_core::prelude::*;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Tree sizes exercised by the benches
pub const TREE_SIZES: &[usize] = &[64, 512, 4096];

/// A reproducible branching tree of `segments` internodes with a leaf on
/// every fourth one, under gravity and wind.
pub fn benchmark_tree(segments: usize, seed: u64) -> ArborResult<PhysicsWorld> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut world = PhysicsWorld::new();
    let ground = world.add_root(RigidBody::anchor("ground"))?;

    let mut tips: Vec<(BodyId, f32)> = Vec::with_capacity(segments);
    for i in 0..segments {
        let (parent, offset) = if tips.is_empty() {
            (ground, 0.0)
        } else {
            // Favour recent segments so the tree grows deep as well as wide
            let low = tips.len().saturating_sub(16);
            tips[rng.gen_range(low..tips.len())]
        };
        let length = rng.gen_range(0.2..0.8);
        let bend = Quat::from_euler_angles(rng.gen_range(-0.5..0.5), 0.0, rng.gen_range(-0.5..0.5));
        let id = world.attach(
            parent,
            RigidBody::internode(format!("internode-{}", i), length, 0.03, 700.0),
            JointConfig::internode(),
            bend,
            Vec3::new(0.0, offset, 0.0),
        )?;
        tips.push((id, length));

        if i % 4 == 3 {
            world.attach(
                id,
                RigidBody::leaf(format!("leaf-{}", i), 0.08, 500.0),
                JointConfig::leaf(),
                Quat::from_euler_angles(0.0, 0.0, 0.7),
                Vec3::new(0.0, length, 0.0),
            )?;
        }
    }

    world.add_field(GravityField::earth());
    world.add_field(WindField::new(Vec3::new(3.0, 0.0, 1.0)).with_seed(seed as u32));
    Ok(world)
}
