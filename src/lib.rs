//! vm-bootstrap library
//!
//! Provisions a development VM: refresh package indices, upgrade, install a
//! Python toolchain, then register a local project in development mode. Steps
//! run strictly in order and the first failure ends the run.

pub mod cli;
pub mod command;
pub mod config_file;
pub mod error;
pub mod executor;
pub mod package_manager;
pub mod plan;
pub mod process_guard;
pub mod runner;
pub mod sanity;
pub mod types;

// Re-export main types for convenience
pub use command::CommandSpec;
pub use config_file::BootstrapConfig;
pub use error::{BootstrapError, Result};
pub use executor::{DryRunExecutor, Executor, StepOutput, SystemExecutor};
pub use package_manager::{AptGet, Dnf, PackageManager, Pacman};
pub use plan::{ProvisioningPlan, Step, StepAction};
pub use process_guard::{ChildRegistry, CommandProcessGroup, InterruptFlag, TrackedChild};
pub use runner::{BootstrapRunner, RunSummary};
pub use types::PackageManagerKind;
