//! Tick orchestration
//!
//! A tick runs these passes in order, each completing before the next:
//!
//! 1. apply force fields to dynamic bodies
//! 2. aggregate composites, leaves to roots
//! 3. break joints whose torque exceeds their threshold
//! 4. solve every joint's spring-damper ODE
//! 5. propagate kinematics, roots to leaves
//! 6. integrate free bodies
//! 7. reset accumulated forces
//!
//! [`CpuSimulator`] is the sequential reference. The parallel backend in
//! [`crate::device`] runs the same per-body kernels over flat buffers.

mod cpu;

pub use cpu::CpuSimulator;

use crate::body::BodyId;
use crate::config::{Backend, DegeneracyPolicy, SimulationConfig};
use crate::device::ParallelSimulator;
use crate::error::{ArborError, ArborResult, Degeneracy};
use crate::world::PhysicsWorld;
use tracing::{debug, warn};

/// What happened during one tick besides ordinary motion
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    /// Simulated time at the start of the tick
    pub time: f32,
    /// Bodies whose joint broke, in body order
    pub detached: Vec<BodyId>,
    /// Bodies left at their previous state by [`DegeneracyPolicy::Freeze`]
    pub frozen: Vec<(BodyId, Degeneracy)>,
}

impl TickReport {
    pub fn new(time: f32) -> Self {
        Self {
            time,
            ..Default::default()
        }
    }
}

/// A backend that advances a world by one tick
pub trait Simulator: Send {
    fn name(&self) -> &'static str;

    /// Advance `world` from `time` to `time + dt`
    fn step(&mut self, world: &mut PhysicsWorld, time: f32, dt: f32) -> ArborResult<TickReport>;
}

/// Instantiate the backend named in `config`
pub fn build_simulator(config: &SimulationConfig) -> ArborResult<Box<dyn Simulator>> {
    config.validate()?;
    Ok(match config.backend {
        Backend::Cpu => Box::new(CpuSimulator::new(config)),
        Backend::Parallel => Box::new(ParallelSimulator::new(config)?),
    })
}

/// Apply the degeneracy policy to a failed solve
pub(crate) fn on_degeneracy(
    policy: DegeneracyPolicy,
    body: BodyId,
    cause: Degeneracy,
    report: &mut TickReport,
) -> ArborResult<()> {
    match policy {
        DegeneracyPolicy::Abort => Err(ArborError::Degenerate { body, cause }),
        DegeneracyPolicy::Freeze => {
            warn!("freezing {} for this tick: {}", body, cause);
            report.frozen.push((body, cause));
            Ok(())
        }
    }
}

/// A world, a backend and a clock
pub struct Simulation {
    world: PhysicsWorld,
    simulator: Box<dyn Simulator>,
    config: SimulationConfig,
    time: f32,
    ticks: u64,
}

impl Simulation {
    pub fn new(world: PhysicsWorld, config: SimulationConfig) -> ArborResult<Self> {
        let simulator = build_simulator(&config)?;
        Ok(Self {
            world,
            simulator,
            config,
            time: 0.0,
            ticks: 0,
        })
    }

    pub fn world(&self) -> &PhysicsWorld {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut PhysicsWorld {
        &mut self.world
    }

    pub fn into_world(self) -> PhysicsWorld {
        self.world
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn time(&self) -> f32 {
        self.time
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn backend(&self) -> &'static str {
        self.simulator.name()
    }

    /// Advance by one configured time step
    pub fn tick(&mut self) -> ArborResult<TickReport> {
        let dt = self.config.time_step;
        let report = self.simulator.step(&mut self.world, self.time, dt)?;
        if self.config.check_finite {
            self.world.check_finite()?;
        }
        self.time += dt;
        self.ticks += 1;
        debug!(
            "tick {} at t={:.4}: {} detached, {} frozen",
            self.ticks,
            report.time,
            report.detached.len(),
            report.frozen.len()
        );
        Ok(report)
    }

    /// Run `ticks` steps and merge their reports
    pub fn run(&mut self, ticks: u64) -> ArborResult<TickReport> {
        let mut summary = TickReport::new(self.time);
        for _ in 0..ticks {
            let report = self.tick()?;
            summary.detached.extend(report.detached);
            summary.frozen.extend(report.frozen);
        }
        Ok(summary)
    }
}
