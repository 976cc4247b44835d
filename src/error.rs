//! Error handling module for vm-bootstrap
//!
//! Once a run has started it fails in one of two ways: a step exits non-zero
//! (`StepFailed`) or the operator interrupts it (`Interrupted`). The remaining
//! variants cover work that happens before the first step, such as loading
//! configuration or pre-flight checks.

use thiserror::Error;

/// Exit code used for failures that happen before any step runs.
pub const EXIT_SETUP_FAILURE: i32 = 1;

/// Exit code a shell reports when a program cannot be found.
pub const EXIT_NOT_FOUND: i32 = 127;

/// Exit code a shell reports when a program exists but cannot be executed.
pub const EXIT_NOT_EXECUTABLE: i32 = 126;

/// Main error type for vm-bootstrap
#[derive(Error, Debug)]
pub enum BootstrapError {
    /// A provisioning step exited non-zero, was killed, or could not be spawned.
    ///
    /// `index` is zero-based; messages print it one-based.
    #[error("Step {} ({step}) failed with exit code {exit_code}", .index + 1)]
    StepFailed {
        index: usize,
        step: String,
        exit_code: i32,
    },

    /// The runner received SIGINT/SIGTERM/SIGHUP and stopped the current step
    #[error("Interrupted by signal {signal}")]
    Interrupted { signal: i32 },

    /// IO errors outside of step execution (config files, PATH lookups)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors (loading, parsing)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation errors (plan or config values)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Pre-flight check failures
    #[error("Pre-flight check failed: {0}")]
    Preflight(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for vm-bootstrap operations
pub type Result<T> = std::result::Result<T, BootstrapError>;

impl BootstrapError {
    /// Create a step failure
    pub fn step_failed(index: usize, step: impl Into<String>, exit_code: i32) -> Self {
        Self::StepFailed {
            index,
            step: step.into(),
            exit_code,
        }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a pre-flight error
    pub fn preflight(msg: impl Into<String>) -> Self {
        Self::Preflight(msg.into())
    }

    /// Process exit code the invoker should see for this error.
    ///
    /// Step failures propagate the step's own code, interrupts report
    /// `128 + signal` like a shell; everything else is 1.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::StepFailed { exit_code, .. } => *exit_code,
            Self::Interrupted { signal } => 128 + signal,
            _ => EXIT_SETUP_FAILURE,
        }
    }
}
