//! Error types for the articulated-body engine
//!
//! Construction problems are [`ConfigError`]s and are reported before any
//! tick runs. Numerical trouble inside one solve is a [`Degeneracy`]; the
//! simulator either freezes the offending joint or aborts the tick,
//! depending on the configured [`DegeneracyPolicy`](crate::config::DegeneracyPolicy).

use crate::body::BodyId;
use thiserror::Error;

/// Errors raised while building a world or loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("joint above body {body} has invalid stiffness {stiffness} (must be > 0)")]
    InvalidStiffness { body: String, stiffness: f32 },

    #[error("joint above body {body} has invalid damping {damping} (must be finite and >= 0)")]
    InvalidDamping { body: String, damping: f32 },

    #[error("joint above body {body} has invalid torque threshold {threshold} (must be > 0)")]
    InvalidTorqueThreshold { body: String, threshold: f32 },

    #[error("body {body} has invalid mass {mass}")]
    InvalidMass { body: String, mass: f32 },

    #[error("dynamic body {0} has zero mass")]
    MasslessDynamicBody(String),

    #[error("body {0} has an inertia tensor that is not symmetric positive semi-definite")]
    InvalidInertia(String),

    #[error("body {0} has a non-finite pivot or joint offset")]
    InvalidPivot(String),

    #[error("static body {0} cannot be attached below another body")]
    StaticChild(String),

    #[error("parent body {0} does not exist")]
    ParentNotFound(BodyId),

    #[error("invalid simulation config: {0}")]
    InvalidSetting(String),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
}

/// Numerical failure of a single joint or free-body solve
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum Degeneracy {
    #[error("joint-space inertia is not positive definite")]
    NotPositiveDefinite,

    #[error("eigen decomposition did not converge")]
    EigenNotConverged,

    #[error("decoupled stiffness {0} is not positive")]
    NonPositiveEigenvalue(f32),

    #[error("modal basis is singular")]
    SingularBasis,

    #[error("world inertia tensor is singular")]
    SingularInertia,

    #[error("solve produced non-finite values")]
    NonFinite,
}

/// Top-level engine error
#[derive(Debug, Error)]
pub enum ArborError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("body {body}: {cause}")]
    Degenerate { body: BodyId, cause: Degeneracy },

    #[error("body {body} has non-finite {quantity}")]
    NonFinite { body: BodyId, quantity: &'static str },

    #[error("body {0} does not exist")]
    UnknownBody(BodyId),
}

/// Result type for engine operations
pub type ArborResult<T> = Result<T, ArborError>;

/// Result type for a single numerical solve
pub type SolveResult<T> = Result<T, Degeneracy>;
