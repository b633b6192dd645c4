use anyhow::{Context, Result};
use arbor_core::{Backend, DegeneracyPolicy, Simulation, SimulationConfig};
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;

mod output;
mod scene;

use output::{Frame, Snapshot};
use scene::SceneConfig;

#[derive(Parser)]
#[command(name = "arbor")]
#[command(about = "ARBOR - articulated tree dynamics, headless")]
#[command(version = "0.1.0")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Simulate a scene and write body transforms as JSON
    Run {
        /// Scene TOML (defaults to the built-in demo tree)
        #[arg(short = 's', long = "scene")]
        scene: Option<PathBuf>,

        /// Simulation TOML (defaults to realtime settings)
        #[arg(short = 'c', long = "config")]
        config: Option<PathBuf>,

        /// Number of ticks to run
        #[arg(short = 'n', long = "ticks", default_value = "600")]
        ticks: u64,

        /// Override the configured backend
        #[arg(short = 'b', long = "backend", value_enum)]
        backend: Option<BackendArg>,

        /// Worker threads for the parallel backend
        #[arg(short = 'j', long = "threads")]
        threads: Option<usize>,

        /// Freeze degenerate joints instead of aborting
        #[arg(long = "freeze")]
        freeze: bool,

        /// Also record a frame every N ticks
        #[arg(long = "record-every", value_name = "N")]
        record_every: Option<u64>,

        /// Output file (defaults to stdout)
        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,
    },

    /// Validate scene and simulation config files
    Check {
        #[arg(short = 's', long = "scene")]
        scene: Option<PathBuf>,

        #[arg(short = 'c', long = "config")]
        config: Option<PathBuf>,
    },

    /// Print the default scene and simulation config as TOML
    Defaults,
}

#[derive(Clone, Copy, ValueEnum)]
enum BackendArg {
    Cpu,
    Parallel,
}

impl From<BackendArg> for Backend {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Cpu => Backend::Cpu,
            BackendArg::Parallel => Backend::Parallel,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays clean JSON
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            scene,
            config,
            ticks,
            backend,
            threads,
            freeze,
            record_every,
            output,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(backend) = backend {
                config.backend = backend.into();
            }
            if let Some(threads) = threads {
                config = config.with_worker_threads(threads);
            }
            if freeze {
                config.degeneracy_policy = DegeneracyPolicy::Freeze;
            }
            let scene = load_scene(scene.as_deref())?;
            run(&scene, config, ticks, record_every, output.as_deref())
        }
        Commands::Check { scene, config } => {
            let config = load_config(config.as_deref())?;
            let scene = load_scene(scene.as_deref())?;
            let world = scene.build()?;
            eprintln!("{} simulation config", "✓".green());
            eprintln!("    time step {:.5} s on {:?} backend", config.time_step, config.backend);
            eprintln!("{} scene", "✓".green());
            eprintln!(
                "    {} internodes, {} leaves, {} fields",
                scene.segment_count(),
                scene.leaf_count(),
                world.fields().len()
            );
            Ok(())
        }
        Commands::Defaults => {
            println!("# simulation config");
            println!("{}", toml::to_string_pretty(&SimulationConfig::default())?);
            println!("# scene");
            println!("{}", toml::to_string_pretty(&SceneConfig::default())?);
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<SimulationConfig> {
    match path {
        Some(path) => SimulationConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => Ok(SimulationConfig::realtime()),
    }
}

fn load_scene(path: Option<&Path>) -> Result<SceneConfig> {
    match path {
        Some(path) => SceneConfig::from_file(path),
        None => Ok(SceneConfig::default()),
    }
}

fn run(
    scene: &SceneConfig,
    config: SimulationConfig,
    ticks: u64,
    record_every: Option<u64>,
    output: Option<&Path>,
) -> Result<()> {
    let world = scene.build()?;
    let mut simulation = Simulation::new(world, config)?;
    info!("running {} ticks on the {} backend", ticks, simulation.backend());

    let started = Instant::now();
    let mut detached = Vec::new();
    let mut frozen = 0;
    let mut frames = Vec::new();
    for _ in 0..ticks {
        let report = simulation
            .tick()
            .with_context(|| format!("tick {} at t={:.4}", simulation.ticks(), simulation.time()))?;
        detached.extend(report.detached);
        frozen += report.frozen.len();

        if let Some(every) = record_every.filter(|&n| n > 0) {
            if simulation.ticks() % every == 0 {
                let world = simulation.world();
                frames.push(Frame::capture(world, simulation.ticks(), simulation.time()));
            }
        }
    }

    let elapsed = started.elapsed();
    info!(
        "simulated {:.2} s in {:.2?} ({:.1} µs/tick), {} detached, {} frozen",
        simulation.time(),
        elapsed,
        elapsed.as_secs_f64() * 1e6 / ticks.max(1) as f64,
        detached.len(),
        frozen
    );

    let snapshot = Snapshot {
        backend: simulation.backend(),
        ticks: simulation.ticks(),
        time: simulation.time(),
        detached,
        frozen,
        frames,
        bodies: simulation.world().transforms(),
    };
    snapshot.write(output)
}
