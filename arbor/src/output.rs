//! JSON export of body transforms for a renderer

use anyhow::{Context, Result};
use arbor_core::{BodyId, BodyTransform, PhysicsWorld};
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

#[derive(Debug, Clone, Serialize)]
pub struct Frame {
    pub tick: u64,
    pub time: f32,
    pub bodies: Vec<BodyTransform>,
}

impl Frame {
    pub fn capture(world: &PhysicsWorld, tick: u64, time: f32) -> Self {
        Self {
            tick,
            time,
            bodies: world.transforms(),
        }
    }
}

/// Everything a run writes out
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub backend: &'static str,
    pub ticks: u64,
    pub time: f32,
    pub detached: Vec<BodyId>,
    pub frozen: usize,
    /// Intermediate frames, oldest first, when recording was requested
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub frames: Vec<Frame>,
    pub bodies: Vec<BodyTransform>,
}

impl Snapshot {
    /// Write as pretty JSON to `path`, or stdout when `None`
    pub fn write(&self, path: Option<&Path>) -> Result<()> {
        match path {
            Some(path) => {
                let file = File::create(path)
                    .with_context(|| format!("creating {}", path.display()))?;
                let mut writer = BufWriter::new(file);
                serde_json::to_writer_pretty(&mut writer, self)?;
                writer.flush()?;
            }
            None => {
                let stdout = io::stdout();
                let mut writer = stdout.lock();
                serde_json::to_writer_pretty(&mut writer, self)?;
                writeln!(writer)?;
            }
        }
        Ok(())
    }
}
