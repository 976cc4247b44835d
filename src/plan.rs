//! Provisioning Plan
//!
//! A plan is an ordered list of step descriptors. It is built fresh on every
//! invocation, executed once by the runner, and thrown away. Nothing here
//! touches the host: `resolve` turns the plan into concrete `CommandSpec`s so
//! it can be inspected, printed, or asserted on in tests.
//!
//! # Default plan
//!
//! ```text
//! update-index
//!     ↓
//! upgrade
//!     ↓
//! install (python, pip, headers)
//!     ↓
//! setup-develop   (in the project directory, privileged)
//! ```

use crate::command::CommandSpec;
use crate::error::{BootstrapError, Result};
use crate::package_manager::PackageManager;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Project directory used when nothing else is configured (Vagrant's shared folder)
pub const DEFAULT_PROJECT_DIR: &str = "/vagrant";

/// Program used to run privileged steps when not already root
pub const DEFAULT_ESCALATION: &str = "sudo";

/// What a step does
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepAction {
    /// Refresh the package index
    UpdateIndex,
    /// Upgrade installed packages
    Upgrade,
    /// Install named packages
    Install { packages: Vec<String> },
    /// `python setup.py develop`: editable install of the project
    SetupDevelop {
        python: String,
        #[serde(default = "default_setup_script")]
        setup_script: String,
    },
    /// Any other command
    Command {
        program: String,
        #[serde(default)]
        args: Vec<String>,
    },
}

fn default_setup_script() -> String {
    "setup.py".to_string()
}

fn default_escalation() -> String {
    DEFAULT_ESCALATION.to_string()
}

impl StepAction {
    /// True for actions that go through the package manager
    pub fn is_package_operation(&self) -> bool {
        matches!(self, Self::UpdateIndex | Self::Upgrade | Self::Install { .. })
    }
}

/// One unit of the plan: an action plus where and how to run it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub name: String,
    pub action: StepAction,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub privileged: bool,
}

impl Step {
    pub fn new(name: impl Into<String>, action: StepAction) -> Self {
        Self {
            name: name.into(),
            action,
            working_dir: None,
            env: BTreeMap::new(),
            privileged: false,
        }
    }

    pub fn update_index() -> Self {
        Self::new("update-index", StepAction::UpdateIndex)
    }

    pub fn upgrade() -> Self {
        Self::new("upgrade", StepAction::Upgrade)
    }

    pub fn install<I, S>(packages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            "install",
            StepAction::Install {
                packages: packages.into_iter().map(Into::into).collect(),
            },
        )
    }

    /// Editable install of the project found in `project_dir`
    pub fn setup_develop(python: impl Into<String>, project_dir: impl AsRef<Path>) -> Self {
        Self::new(
            "setup-develop",
            StepAction::SetupDevelop {
                python: python.into(),
                setup_script: default_setup_script(),
            },
        )
        .in_dir(project_dir)
    }

    pub fn command<I, S>(name: impl Into<String>, program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            name,
            StepAction::Command {
                program: program.into(),
                args: args.into_iter().map(Into::into).collect(),
            },
        )
    }

    pub fn in_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.working_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn privileged(mut self) -> Self {
        self.privileged = true;
        self
    }

    fn validate(&self, index: usize) -> Result<()> {
        let label = format!("step {} ({})", index + 1, self.name);

        if self.name.trim().is_empty() {
            return Err(BootstrapError::validation(format!(
                "step {} has an empty name",
                index + 1
            )));
        }

        match &self.action {
            StepAction::Install { packages } => {
                if packages.is_empty() {
                    return Err(BootstrapError::validation(format!(
                        "{label}: install needs at least one package"
                    )));
                }
                for package in packages {
                    validate_package_name(package)
                        .map_err(|msg| BootstrapError::validation(format!("{label}: {msg}")))?;
                }
            }
            StepAction::SetupDevelop {
                python,
                setup_script,
            } => {
                if python.trim().is_empty() || setup_script.trim().is_empty() {
                    return Err(BootstrapError::validation(format!(
                        "{label}: python and setup_script must be set"
                    )));
                }
            }
            StepAction::Command { program, .. } => {
                if program.trim().is_empty() {
                    return Err(BootstrapError::validation(format!(
                        "{label}: program must be set"
                    )));
                }
            }
            StepAction::UpdateIndex | StepAction::Upgrade => {}
        }

        validate_env(&self.env).map_err(|msg| BootstrapError::validation(format!("{label}: {msg}")))
    }
}

/// Package names are passed as separate argv entries, never through a shell,
/// but a leading dash would still be read as an option.
pub fn validate_package_name(name: &str) -> std::result::Result<(), String> {
    if name.trim().is_empty() {
        return Err("package name cannot be empty".to_string());
    }
    if name.contains(char::is_whitespace) {
        return Err(format!("package name '{name}' cannot contain whitespace"));
    }
    if name.starts_with('-') {
        return Err(format!("package name '{name}' cannot start with '-'"));
    }
    Ok(())
}

fn validate_env(env: &BTreeMap<String, String>) -> std::result::Result<(), String> {
    for key in env.keys() {
        if key.is_empty() || key.contains('=') || key.contains('\0') {
            return Err(format!("invalid environment variable name '{key}'"));
        }
    }
    Ok(())
}

/// Ordered list of steps plus plan-wide settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisioningPlan {
    pub steps: Vec<Step>,
    /// Environment overrides applied to every step (steps may override)
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Program wrapping privileged steps
    #[serde(default = "default_escalation")]
    pub escalation: String,
}

impl Default for ProvisioningPlan {
    fn default() -> Self {
        Self::new()
    }
}

impl ProvisioningPlan {
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            env: BTreeMap::new(),
            escalation: default_escalation(),
        }
    }

    /// The standard Python development bootstrap:
    /// update → upgrade → install → editable install of the project.
    pub fn python_develop(
        packages: Vec<String>,
        project_dir: impl AsRef<Path>,
        python: impl Into<String>,
    ) -> Self {
        Self::new()
            .step(Step::update_index())
            .step(Step::upgrade())
            .step(Step::install(packages))
            .step(Step::setup_develop(python, project_dir).privileged())
    }

    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn has_privileged_steps(&self) -> bool {
        self.steps.iter().any(|s| s.privileged)
    }

    /// Check the plan is well-formed before anything runs
    pub fn validate(&self) -> Result<()> {
        for (index, step) in self.steps.iter().enumerate() {
            step.validate(index)?;
        }
        validate_env(&self.env).map_err(|msg| BootstrapError::validation(format!("plan: {msg}")))?;
        if self.has_privileged_steps() && self.escalation.trim().is_empty() {
            return Err(BootstrapError::validation(
                "plan has privileged steps but no escalation program",
            ));
        }
        Ok(())
    }

    /// Resolve one step to the command that will run.
    ///
    /// Layering, last wins: plan env, step env, then the backend's
    /// non-interactive env for package operations so it can never be dropped.
    pub fn resolve_step(
        &self,
        step: &Step,
        package_manager: &dyn PackageManager,
        running_as_root: bool,
    ) -> CommandSpec {
        let base = match &step.action {
            StepAction::UpdateIndex => package_manager.update_index(),
            StepAction::Upgrade => package_manager.upgrade(),
            StepAction::Install { packages } => package_manager.install(packages),
            StepAction::SetupDevelop {
                python,
                setup_script,
            } => CommandSpec::new(python.as_str()).args([setup_script.as_str(), "develop"]),
            StepAction::Command { program, args } => {
                CommandSpec::new(program.as_str()).args(args.iter().cloned())
            }
        };

        let mut spec = base
            .envs(self.env.iter().map(|(k, v)| (k.clone(), v.clone())))
            .envs(step.env.iter().map(|(k, v)| (k.clone(), v.clone())));

        if step.action.is_package_operation() {
            spec = spec.envs(package_manager.noninteractive_env());
        }

        if let Some(dir) = &step.working_dir {
            spec = spec.current_dir(dir);
        }

        if step.privileged && !running_as_root {
            spec = spec.elevated(&self.escalation);
        }

        spec
    }

    /// Resolve every step, in order
    pub fn resolve(
        &self,
        package_manager: &dyn PackageManager,
        running_as_root: bool,
    ) -> Vec<CommandSpec> {
        self.steps
            .iter()
            .map(|step| self.resolve_step(step, package_manager, running_as_root))
            .collect()
    }
}
