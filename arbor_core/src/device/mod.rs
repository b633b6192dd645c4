//! Data-parallel backend
//!
//! The world is mirrored into flat `#[repr(C)]` buffers ([`MemoryLayout`]),
//! every pass is dispatched level by level on a dedicated worker pool and
//! the result is copied back at the end of the tick. The kernels call the
//! same per-body functions as [`CpuSimulator`](crate::simulator::CpuSimulator)
//! in the same order, so both backends agree bit for bit.

mod kernels;
pub mod layout;

pub use layout::{CompositeBodyStruct, JointStruct, MemoryLayout, RigidBodyStruct};

use crate::config::{DegeneracyPolicy, SimulationConfig};
use crate::error::{ArborResult, ConfigError};
use crate::simulator::{on_degeneracy, Simulator, TickReport};
use crate::world::PhysicsWorld;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, info, trace};

#[derive(Debug)]
pub struct ParallelSimulator {
    pool: ThreadPool,
    policy: DegeneracyPolicy,
    layout: Option<MemoryLayout>,
}

impl ParallelSimulator {
    /// Spawn the worker pool. `config.worker_threads` of `None` lets rayon
    /// pick one worker per core.
    pub fn new(config: &SimulationConfig) -> ArborResult<Self> {
        config.validate()?;
        let mut builder = ThreadPoolBuilder::new().thread_name(|i| format!("arbor-worker-{}", i));
        if let Some(threads) = config.worker_threads {
            builder = builder.num_threads(threads);
        }
        let pool = builder
            .build()
            .map_err(|e| ConfigError::InvalidSetting(format!("cannot start worker pool: {}", e)))?;
        info!("parallel backend using {} workers", pool.current_num_threads());
        Ok(Self {
            pool,
            policy: config.degeneracy_policy,
            layout: None,
        })
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Current device buffers, if a tick has run
    pub fn layout(&self) -> Option<&MemoryLayout> {
        self.layout.as_ref()
    }

    fn prepare(&mut self, world: &mut PhysicsWorld) {
        let stale = self.layout.as_ref().map_or(true, |layout| !layout.matches(world));
        if stale {
            let layout = MemoryLayout::build(world);
            debug!(
                "built device layout: {} bodies in {} levels",
                layout.len(),
                layout.ranges.len()
            );
            self.layout = Some(layout);
        } else if let Some(layout) = self.layout.as_mut() {
            layout.upload(world);
        }
    }

    fn execute(
        &mut self,
        world: &mut PhysicsWorld,
        report: &mut TickReport,
        dt: f32,
    ) -> ArborResult<()> {
        self.prepare(world);
        let policy = self.policy;
        let pool = &self.pool;
        let Some(layout) = self.layout.as_mut() else {
            return Ok(());
        };

        kernels::apply_fields(pool, layout, world.fields(), report.time);
        kernels::update_composites(pool, layout);
        trace!("composites updated");
        report.detached = kernels::break_joints(pool, layout);
        for (body, cause) in kernels::solve_joints(pool, layout, dt) {
            on_degeneracy(policy, body, cause, report)?;
        }
        trace!("joints solved");
        kernels::update_articulated(pool, layout);
        for (body, cause) in kernels::update_free_bodies(pool, layout, dt) {
            on_degeneracy(policy, body, cause, report)?;
        }
        kernels::reset_forces(pool, layout);

        for &id in &report.detached {
            world.unlink(id)?;
        }
        layout.download(world);
        Ok(())
    }
}

impl Simulator for ParallelSimulator {
    fn name(&self) -> &'static str {
        "parallel"
    }

    fn step(&mut self, world: &mut PhysicsWorld, time: f32, dt: f32) -> ArborResult<TickReport> {
        let mut report = TickReport::new(time);
        if let Err(e) = self.execute(world, &mut report, dt) {
            // Buffers may be half way through a tick
            self.layout = None;
            return Err(e);
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::RigidBody;
    use crate::config::{Backend, JointConfig};
    use crate::math::{Quat, Vec3};

    fn config() -> SimulationConfig {
        SimulationConfig::realtime()
            .with_backend(Backend::Parallel)
            .with_worker_threads(2)
    }

    #[test]
    fn test_pool_size_follows_config() {
        let simulator = ParallelSimulator::new(&config()).unwrap();
        assert_eq!(simulator.workers(), 2);
        assert_eq!(simulator.name(), "parallel");
        assert!(simulator.layout().is_none());

        assert!(ParallelSimulator::new(&config().with_worker_threads(0)).is_err());
    }

    #[test]
    fn test_layout_reused_until_topology_changes() {
        let mut world = PhysicsWorld::new();
        let root = world.add_root(RigidBody::anchor("root")).unwrap();
        let rod = world
            .attach(
                root,
                RigidBody::internode("rod", 1.0, 0.1, 1.0),
                JointConfig::default(),
                Quat::identity(),
                Vec3::zeros(),
            )
            .unwrap();

        let mut simulator = ParallelSimulator::new(&config()).unwrap();
        simulator.step(&mut world, 0.0, 1.0 / 60.0).unwrap();
        assert!(simulator.layout().unwrap().matches(&world));

        world.detach(rod).unwrap();
        assert!(!simulator.layout().unwrap().matches(&world));
        simulator.step(&mut world, 1.0 / 60.0, 1.0 / 60.0).unwrap();
        assert_eq!(simulator.layout().unwrap().root_range.len(), 2);
    }

    #[test]
    fn test_layout_not_shared_between_worlds() {
        let build = || {
            let mut world = PhysicsWorld::new();
            let root = world.add_root(RigidBody::anchor("root")).unwrap();
            world
                .attach(
                    root,
                    RigidBody::internode("rod", 1.0, 0.1, 1.0),
                    JointConfig::default(),
                    Quat::identity(),
                    Vec3::zeros(),
                )
                .unwrap();
            world
        };
        let (mut first, mut second) = (build(), build());
        assert_ne!(first.world_id(), second.world_id());
        assert_eq!(first.topology_generation(), second.topology_generation());

        let mut simulator = ParallelSimulator::new(&config()).unwrap();
        simulator.step(&mut first, 0.0, 1.0 / 60.0).unwrap();
        assert!(simulator.layout().unwrap().matches(&first));
        assert!(!simulator.layout().unwrap().matches(&second));

        simulator.step(&mut second, 0.0, 1.0 / 60.0).unwrap();
        assert!(simulator.layout().unwrap().matches(&second));
    }
}
