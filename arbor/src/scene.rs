//! Scene description and the demo tree builder
//!
//! A scene is a recursively branching tree: the trunk splits into
//! `branching` children per generation for `depth` generations, and every
//! terminal segment carries `leaves_per_tip` leaves.

use anyhow::{ensure, Context, Result};
use arbor_core::prelude::*;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::f32::consts::TAU;
use std::path::Path;
use tracing::info;

/// Upper bound on generated segments
const MAX_SEGMENTS: u64 = 200_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// Seed for the bend jitter
    pub seed: u64,
    /// Segment generations, trunk included
    pub depth: u32,
    /// Children per segment
    pub branching: u32,
    pub trunk_length: f32,
    pub trunk_radius: f32,
    /// Length ratio between a child and its parent
    pub length_decay: f32,
    pub radius_decay: f32,
    /// Wood density in kg/m³
    pub density: f32,
    /// Tilt of a child branch away from its parent's axis, radians
    pub spread: f32,
    /// Random perturbation added to every bend, radians
    pub jitter: f32,
    pub leaves_per_tip: u32,
    pub leaf_length: f32,
    pub leaf_density: f32,
    pub internode_joint: JointConfig,
    pub leaf_joint: JointConfig,
    pub fields: FieldsConfig,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            depth: 4,
            branching: 2,
            trunk_length: 1.0,
            trunk_radius: 0.06,
            length_decay: 0.75,
            radius_decay: 0.65,
            density: 750.0,
            spread: 0.5,
            jitter: 0.15,
            leaves_per_tip: 3,
            leaf_length: 0.08,
            leaf_density: 500.0,
            internode_joint: JointConfig::internode(),
            leaf_joint: JointConfig::leaf(),
            fields: FieldsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldsConfig {
    /// Uniform acceleration, `None` for no gravity
    pub gravity: Option<[f32; 3]>,
    pub wind: Option<WindConfig>,
    pub attractor: Option<AttractorConfig>,
}

impl Default for FieldsConfig {
    fn default() -> Self {
        Self {
            gravity: Some([0.0, -9.81, 0.0]),
            wind: None,
            attractor: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindConfig {
    pub velocity: [f32; 3],
    #[serde(default)]
    pub seed: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttractorConfig {
    pub center: [f32; 3],
    #[serde(default = "default_attractor_strength")]
    pub strength: f32,
    #[serde(default = "default_attractor_extent")]
    pub half_extent: [f32; 3],
}

fn default_attractor_strength() -> f32 {
    0.05
}

fn default_attractor_extent() -> [f32; 3] {
    [1.0; 3]
}

struct Bud {
    parent: BodyId,
    offset: f32,
    generation: u32,
    length: f32,
    radius: f32,
    rotation: Quat,
}

impl SceneConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("reading scene {}", path.display()))?;
        let scene: Self = toml::from_str(&source)
            .with_context(|| format!("parsing scene {}", path.display()))?;
        scene.validate()?;
        Ok(scene)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.depth >= 1, "depth must be at least 1");
        ensure!(self.branching >= 1, "branching must be at least 1");
        ensure!(
            self.segment_count() <= MAX_SEGMENTS,
            "scene would have {} segments, limit is {}",
            self.segment_count(),
            MAX_SEGMENTS
        );
        for (name, value) in [
            ("trunk_length", self.trunk_length),
            ("trunk_radius", self.trunk_radius),
            ("length_decay", self.length_decay),
            ("radius_decay", self.radius_decay),
            ("density", self.density),
            ("leaf_length", self.leaf_length),
            ("leaf_density", self.leaf_density),
        ] {
            ensure!(value.is_finite() && value > 0.0, "{} must be positive, got {}", name, value);
        }
        ensure!(self.jitter.is_finite() && self.jitter >= 0.0, "jitter must be non-negative");
        ensure!(self.spread.is_finite(), "spread must be finite");
        self.internode_joint.validate("internode_joint")?;
        self.leaf_joint.validate("leaf_joint")?;
        Ok(())
    }

    /// Internodes in the generated tree
    pub fn segment_count(&self) -> u64 {
        let branching = self.branching as u64;
        (0..self.depth)
            .map(|g| branching.saturating_pow(g))
            .fold(0u64, u64::saturating_add)
    }

    pub fn leaf_count(&self) -> u64 {
        (self.branching as u64)
            .saturating_pow(self.depth.saturating_sub(1))
            .saturating_mul(self.leaves_per_tip as u64)
    }

    /// Build the world: a static ground anchor, the tree and its fields
    pub fn build(&self) -> Result<PhysicsWorld> {
        self.validate()?;
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut world = PhysicsWorld::new();
        let ground = world.add_root(RigidBody::anchor("ground"))?;

        let mut buds = VecDeque::new();
        buds.push_back(Bud {
            parent: ground,
            offset: 0.0,
            generation: 0,
            length: self.trunk_length,
            radius: self.trunk_radius,
            rotation: Quat::identity(),
        });

        let mut segments = 0usize;
        while let Some(bud) = buds.pop_front() {
            let id = world.attach(
                bud.parent,
                RigidBody::internode(
                    format!("internode-{}", segments),
                    bud.length,
                    bud.radius,
                    self.density,
                ),
                self.internode_joint,
                bud.rotation,
                Vec3::new(0.0, bud.offset, 0.0),
            )?;
            segments += 1;

            if bud.generation + 1 < self.depth {
                let phase = rng.gen_range(0.0..TAU);
                for k in 0..self.branching {
                    let yaw = phase + TAU * k as f32 / self.branching as f32;
                    let tilt = if self.branching == 1 { 0.0 } else { self.spread };
                    buds.push_back(Bud {
                        parent: id,
                        offset: bud.length,
                        generation: bud.generation + 1,
                        length: bud.length * self.length_decay,
                        radius: bud.radius * self.radius_decay,
                        rotation: self.bend(&mut rng, yaw, tilt),
                    });
                }
            } else {
                for k in 0..self.leaves_per_tip {
                    let yaw = TAU * k as f32 / self.leaves_per_tip as f32;
                    world.attach(
                        id,
                        RigidBody::leaf(
                            format!("leaf-{}-{}", segments - 1, k),
                            self.leaf_length,
                            self.leaf_density,
                        ),
                        self.leaf_joint,
                        self.bend(&mut rng, yaw, 1.0),
                        Vec3::new(0.0, bud.length, 0.0),
                    )?;
                }
            }
        }

        let fields = &self.fields;
        if let Some(g) = fields.gravity {
            world.add_field(GravityField::new(Vec3::from(g)));
        }
        if let Some(wind) = &fields.wind {
            world.add_field(WindField::new(Vec3::from(wind.velocity)).with_seed(wind.seed));
        }
        if let Some(attractor) = &fields.attractor {
            world.add_field(
                AttractorField::new(Vec3::from(attractor.center))
                    .with_strength(attractor.strength)
                    .with_half_extent(Vec3::from(attractor.half_extent)),
            );
        }

        info!(
            "built scene: {} internodes, {} bodies, {} fields",
            segments,
            world.len(),
            world.fields().len()
        );
        Ok(world)
    }

    /// Yaw about the parent axis, then tilt away from it, both jittered
    fn bend(&self, rng: &mut ChaCha8Rng, yaw: f32, tilt: f32) -> Quat {
        let yaw = yaw + rng.gen_range(-self.jitter..=self.jitter);
        let tilt = tilt + rng.gen_range(-self.jitter..=self.jitter);
        Quat::from_axis_angle(&Vec3::y_axis(), yaw) * Quat::from_axis_angle(&Vec3::z_axis(), tilt)
    }
}
