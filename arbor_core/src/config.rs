//! Simulation and joint configuration
//!
//! Both types load from TOML and come with presets for the common cases.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// What a tick does when a single solve degenerates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegeneracyPolicy {
    /// Fail the tick with the offending body and cause
    #[default]
    Abort,
    /// Keep the last valid state for that body and carry on
    Freeze,
}

/// Which simulator implementation runs the passes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// Sequential reference implementation
    #[default]
    Cpu,
    /// Level-range dispatch over flat device buffers
    Parallel,
}

/// Per-joint spring, damper and breaking parameters
///
/// Damping follows `(damping·I + stiffness_damping·K)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JointConfig {
    /// Isotropic stiffness K; `inf` makes the joint rigid
    pub stiffness: f32,
    /// Inertia-proportional damping
    pub damping: f32,
    /// Stiffness-proportional damping
    pub stiffness_damping: f32,
    /// Torque magnitude above which the joint breaks; `inf` never breaks
    pub torque_threshold: f32,
}

impl Default for JointConfig {
    fn default() -> Self {
        Self {
            stiffness: 1.0,
            damping: 1.0,
            stiffness_damping: 1.0,
            torque_threshold: f32::INFINITY,
        }
    }
}

impl JointConfig {
    /// Branch joints of a tree: stiff, lightly stiffness-damped, unbreakable
    pub fn internode() -> Self {
        Self {
            stiffness: 2000.0,
            damping: 0.0,
            stiffness_damping: 0.02,
            torque_threshold: f32::INFINITY,
        }
    }

    /// Petiole of a leaf: soft and tears off under strong torque
    pub fn leaf() -> Self {
        Self {
            stiffness: 0.1,
            damping: 0.0,
            stiffness_damping: 0.02,
            torque_threshold: 0.30,
        }
    }

    /// Welded joint
    pub fn rigid() -> Self {
        Self {
            stiffness: f32::INFINITY,
            damping: 0.0,
            stiffness_damping: 0.0,
            torque_threshold: f32::INFINITY,
        }
    }

    pub fn with_stiffness(mut self, stiffness: f32) -> Self {
        self.stiffness = stiffness;
        self
    }

    pub fn with_damping(mut self, damping: f32) -> Self {
        self.damping = damping;
        self
    }

    pub fn with_stiffness_damping(mut self, stiffness_damping: f32) -> Self {
        self.stiffness_damping = stiffness_damping;
        self
    }

    pub fn with_torque_threshold(mut self, threshold: f32) -> Self {
        self.torque_threshold = threshold;
        self
    }

    /// Check the parameters of a joint above `body`
    pub fn validate(&self, body: &str) -> Result<(), ConfigError> {
        if !(self.stiffness > 0.0) {
            return Err(ConfigError::InvalidStiffness {
                body: body.to_string(),
                stiffness: self.stiffness,
            });
        }
        for damping in [self.damping, self.stiffness_damping] {
            if !damping.is_finite() || damping < 0.0 {
                return Err(ConfigError::InvalidDamping {
                    body: body.to_string(),
                    damping,
                });
            }
        }
        if !(self.torque_threshold > 0.0) {
            return Err(ConfigError::InvalidTorqueThreshold {
                body: body.to_string(),
                threshold: self.torque_threshold,
            });
        }
        Ok(())
    }
}

/// Top-level simulation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Seconds advanced per tick
    pub time_step: f32,
    pub backend: Backend,
    /// Worker threads for the parallel backend (None = one per core)
    pub worker_threads: Option<usize>,
    pub degeneracy_policy: DegeneracyPolicy,
    /// Run the finiteness check after every tick
    pub check_finite: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self::realtime()
    }
}

impl SimulationConfig {
    /// 60 Hz on the reference backend, aborting on degeneracy
    pub fn realtime() -> Self {
        Self {
            time_step: 1.0 / 60.0,
            backend: Backend::Cpu,
            worker_threads: None,
            degeneracy_policy: DegeneracyPolicy::Abort,
            check_finite: false,
        }
    }

    /// Smaller steps on the parallel backend, tolerating bad joints
    pub fn offline() -> Self {
        Self {
            time_step: 1.0 / 240.0,
            backend: Backend::Parallel,
            worker_threads: None,
            degeneracy_policy: DegeneracyPolicy::Freeze,
            check_finite: true,
        }
    }

    pub fn with_time_step(mut self, time_step: f32) -> Self {
        self.time_step = time_step;
        self
    }

    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = Some(threads);
        self
    }

    pub fn with_degeneracy_policy(mut self, policy: DegeneracyPolicy) -> Self {
        self.degeneracy_policy = policy;
        self
    }

    pub fn with_finite_check(mut self, enabled: bool) -> Self {
        self.check_finite = enabled;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.time_step > 0.0) || !self.time_step.is_finite() {
            return Err(ConfigError::InvalidSetting(format!(
                "time_step must be positive, got {}",
                self.time_step
            )));
        }
        if self.worker_threads == Some(0) {
            return Err(ConfigError::InvalidSetting(
                "worker_threads must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_realtime() {
        let config = SimulationConfig::default();
        assert_eq!(config, SimulationConfig::realtime());
        assert_eq!(config.degeneracy_policy, DegeneracyPolicy::Abort);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = SimulationConfig::from_toml_str(
            r#"
            backend = "parallel"
            degeneracy_policy = "freeze"
            "#,
        )
        .unwrap();
        assert_eq!(config.backend, Backend::Parallel);
        assert_eq!(config.degeneracy_policy, DegeneracyPolicy::Freeze);
        assert_eq!(config.time_step, 1.0 / 60.0);
    }

    #[test]
    fn test_rejects_bad_time_step() {
        let err = SimulationConfig::from_toml_str("time_step = -0.1").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSetting(_)));
    }

    #[test]
    fn test_rejects_zero_worker_threads() {
        let config = SimulationConfig::realtime().with_worker_threads(0);
        assert_eq!(config.worker_threads, Some(0));
        assert!(matches!(config.validate(), Err(ConfigError::InvalidSetting(_))));
        assert!(SimulationConfig::realtime().with_worker_threads(1).validate().is_ok());
    }

    #[test]
    fn test_rejects_malformed_toml() {
        let err = SimulationConfig::from_toml_str("time_step = [").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_joint_presets_validate() {
        for joint in [
            JointConfig::default(),
            JointConfig::internode(),
            JointConfig::leaf(),
            JointConfig::rigid(),
        ] {
            joint.validate("b").unwrap();
        }
    }

    #[test]
    fn test_joint_rejects_non_positive_stiffness() {
        for stiffness in [0.0, -1.0, f32::NAN] {
            let err = JointConfig::default()
                .with_stiffness(stiffness)
                .validate("b")
                .unwrap_err();
            assert!(matches!(err, ConfigError::InvalidStiffness { .. }));
        }
    }

    #[test]
    fn test_joint_toml_accepts_infinity() {
        let joint: JointConfig = toml::from_str("stiffness = inf\ndamping = 0.5").unwrap();
        assert!(joint.stiffness.is_infinite());
        assert_eq!(joint.damping, 0.5);
        assert_eq!(joint.stiffness_damping, 1.0);
    }
}
