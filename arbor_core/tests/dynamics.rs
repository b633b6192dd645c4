//! End-to-end behaviour of the reference simulator

mod common;

use approx::{assert_abs_diff_eq, assert_relative_eq};
use arbor_core::prelude::*;
use arbor_core::solver::{joint_space_inertia, solve_differential, JointSolveInput};
use common::{random_force, random_tree, single_rod, DT};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::f32::consts::PI;

fn step(world: &mut PhysicsWorld, time: f32) -> TickReport {
    CpuSimulator::default().step(world, time, DT).unwrap()
}

#[test]
fn test_unit_rod_matches_closed_form() {
    // Solid cylinder of unit length and radius with unit mass
    let (mut world, _, rod) = single_rod(1.0, 1.0, 1.0 / PI, JointConfig::default());
    assert_relative_eq!(world.body(rod).unwrap().mass(), 1.0, epsilon = 1e-6);

    world
        .apply_force_at(rod, Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 1.0, 0.0))
        .unwrap();
    step(&mut world, 0.0);

    // Inertia about the joint: (1/4 + 1/12) about the center of mass plus
    // m·(l/2)² from the offset. Rayleigh damping b = d·I + s·k.
    let inertia = (1.0 / 4.0 + 1.0 / 12.0) + 0.25;
    let expected = solve_differential(inertia, inertia + 1.0, 1.0, -1.0, 0.0, 0.0).evaluate(DT);

    let theta = world.body(rod).unwrap().parent_joint().unwrap().theta();
    for row in 0..3 {
        assert_abs_diff_eq!(theta[(row, 2)], expected[row], epsilon = 1e-4);
        assert_abs_diff_eq!(theta[(row, 0)], 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(theta[(row, 1)], 0.0, epsilon = 1e-6);
    }
    assert!(theta[(0, 2)] < 0.0, "rod should bend toward the force");
}

#[test]
fn test_composite_conserves_mass_and_force() {
    let mut rng = ChaCha8Rng::seed_from_u64(11);
    for seed in 0..20 {
        let mut world = random_tree(seed, 25, seed % 2 == 0);
        let root = world.roots().next().unwrap();

        let mut total_mass = 0.0;
        let mut total_force = Vec3::zeros();
        let dynamic: Vec<BodyId> = world
            .bodies()
            .iter()
            .filter(|b| !b.is_static())
            .map(|b| b.id())
            .collect();
        for id in dynamic {
            let force = random_force(&mut rng, 2.0);
            let body = world.body_mut(id).unwrap();
            body.apply_force(force, Vec3::zeros());
            total_mass += body.mass();
            total_force += force;
        }

        step(&mut world, 0.0);
        let composite = world.body(root).unwrap().composite();
        assert_relative_eq!(composite.mass, total_mass, max_relative = 1e-5);
        assert_abs_diff_eq!(composite.force, total_force, epsilon = 1e-4);
    }
}

#[test]
fn test_parallel_axis_on_two_body_chain() {
    // Two unit-mass rods stacked along +y under a static anchor
    let density = 1.0 / (PI * 0.01);
    let (mut world, _, lower) = single_rod(1.0, 0.1, density, JointConfig::default());
    let upper = world
        .attach(
            lower,
            RigidBody::internode("upper", 1.0, 0.1, density),
            JointConfig::default(),
            Quat::identity(),
            Vec3::new(0.0, 1.0, 0.0),
        )
        .unwrap();
    world
        .apply_force_at(upper, Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 2.0, 0.0))
        .unwrap();
    step(&mut world, 0.0);

    let across = 0.01 / 4.0 + 1.0 / 12.0;
    let along = 0.01 / 2.0;
    let composite = *world.body(lower).unwrap().composite();
    assert_relative_eq!(composite.mass, 2.0, epsilon = 1e-5);
    assert_abs_diff_eq!(composite.center_of_mass, Vec3::new(0.0, 1.0, 0.0), epsilon = 1e-5);

    // Each rod's center of mass sits 0.5 from the shared one
    let about_com = Mat3::from_diagonal(&Vec3::new(
        2.0 * (across + 0.25),
        2.0 * along,
        2.0 * (across + 0.25),
    ));
    assert_abs_diff_eq!(composite.inertia, about_com, epsilon = 1e-5);

    // Lever arm of the upper force about the lower pivot
    assert_abs_diff_eq!(composite.torque, Vec3::new(0.0, 0.0, -2.0), epsilon = 1e-5);

    let joint = world.body(lower).unwrap().parent_joint().unwrap();
    let input = JointSolveInput {
        rotation: joint.rotation(),
        position: joint.position(),
        spring: joint.spring(),
        theta: *joint.theta(),
        composite_mass: composite.mass,
        composite_center_of_mass: composite.center_of_mass,
        composite_inertia: composite.inertia,
        composite_torque: composite.torque,
    };
    let about_joint = about_com + Mat3::from_diagonal(&Vec3::new(2.0, 0.0, 2.0));
    assert_abs_diff_eq!(joint_space_inertia(&input), about_joint, epsilon = 1e-4);
}

#[test]
fn test_unloaded_tree_stays_put() {
    let mut world = random_tree(3, 12, true);
    let before = world.transforms();
    let mut simulator = CpuSimulator::default();
    for tick in 0..600 {
        simulator.step(&mut world, tick as f32 * DT, DT).unwrap();
    }
    let after = world.transforms();
    for (a, b) in before.iter().zip(&after) {
        assert_eq!(a.id, b.id);
        for i in 0..3 {
            assert_abs_diff_eq!(a.position[i], b.position[i], epsilon = 1e-5);
        }
        for i in 0..4 {
            assert_abs_diff_eq!(a.rotation[i], b.rotation[i], epsilon = 1e-5);
        }
    }
}

#[test]
fn test_joint_breaks_only_above_threshold() {
    for backend in [Backend::Cpu, Backend::Parallel] {
        for _ in 0..5 {
            for (torque, breaks) in [(0.31, true), (0.29, false), (0.30, false)] {
                let joint = JointConfig::default().with_torque_threshold(0.30);
                let (mut world, root, rod) = single_rod(1.0, 0.05, 100.0, joint);
                world.body_mut(rod).unwrap().apply_torque(Vec3::new(0.0, 0.0, torque));

                let config = SimulationConfig::realtime()
                    .with_backend(backend)
                    .with_worker_threads(2);
                let mut simulation = Simulation::new(world, config).unwrap();
                let report = simulation.tick().unwrap();
                let world = simulation.world();

                assert_eq!(
                    report.detached.contains(&rod),
                    breaks,
                    "{:?} torque {}",
                    backend,
                    torque
                );
                assert_eq!(world.body(rod).unwrap().is_attached(), !breaks);
                assert_eq!(world.body(root).unwrap().children().is_empty(), breaks);
            }
        }
    }
}

#[test]
fn test_detached_body_falls_freely() {
    let (mut world, _, rod) = single_rod(1.0, 0.05, 100.0, JointConfig::default());
    world.detach(rod).unwrap();
    world.add_field(GravityField::earth());
    let start = world.body(rod).unwrap().center_of_mass();
    let rotation = world.body(rod).unwrap().rotation();

    let mut simulation = Simulation::new(world, SimulationConfig::realtime()).unwrap();
    let ticks = 60;
    simulation.run(ticks).unwrap();

    let body = simulation.world().body(rod).unwrap();
    let k = ticks as f32;
    // Semi-implicit Euler: v_k = -g·k·dt, y_k = y_0 - g·dt²·k(k+1)/2
    assert_relative_eq!(body.state().velocity.y, -9.81 * k * DT, max_relative = 1e-4);
    assert_relative_eq!(
        body.center_of_mass().y,
        start.y - 9.81 * DT * DT * k * (k + 1.0) / 2.0,
        max_relative = 1e-4
    );
    assert_abs_diff_eq!(body.center_of_mass().x, start.x, epsilon = 1e-6);
    assert_abs_diff_eq!(body.rotation().into_inner(), rotation.into_inner(), epsilon = 1e-6);
    assert_relative_eq!(body.rotation().into_inner().norm(), 1.0, epsilon = 1e-6);
}

#[test]
fn test_loaded_tree_stays_finite() {
    let mut world = random_tree(5, 40, true);
    world.add_field(GravityField::earth());
    world.add_field(WindField::new(Vec3::new(3.0, 0.0, 1.0)).with_seed(9));

    let config = SimulationConfig::realtime()
        .with_degeneracy_policy(DegeneracyPolicy::Freeze)
        .with_finite_check(true);
    let mut simulation = Simulation::new(world, config).unwrap();
    simulation.run(300).unwrap();

    let world = simulation.world();
    world.check_finite().unwrap();
    for body in world.bodies() {
        assert_relative_eq!(body.rotation().into_inner().norm(), 1.0, epsilon = 1e-5);
    }
}
