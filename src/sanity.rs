//! Pre-flight checks
//!
//! Verifies the host can plausibly run a plan before the first step mutates
//! anything:
//! - the package manager binary is on `PATH`
//! - every working directory the plan uses exists
//! - the project directory contains its setup script
//! - privileged steps have an escalation program when not running as root
//!
//! Package steps that are not privileged need root; running them as another
//! user is a warning, not a failure, since a wrapper may grant the access.

use crate::plan::{ProvisioningPlan, StepAction};
use crate::types::PackageManagerKind;
use std::path::{Path, PathBuf};

/// Problems found by `verify_environment`
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SanityCheckResult {
    pub missing_binaries: Vec<String>,
    pub missing_paths: Vec<PathBuf>,
    /// Steps expected to fail for lack of root
    pub unprivileged_package_steps: Vec<String>,
    pub is_root: bool,
}

impl SanityCheckResult {
    /// Returns true if all checks passed
    pub fn is_ok(&self) -> bool {
        self.missing_binaries.is_empty() && self.missing_paths.is_empty()
    }

    /// One line per problem, for logs and the failure banner
    pub fn problems(&self) -> Vec<String> {
        let binaries = self
            .missing_binaries
            .iter()
            .map(|b| format!("required program not found on PATH: {b}"));
        let paths = self
            .missing_paths
            .iter()
            .map(|p| format!("required path does not exist: {}", p.display()));
        binaries.chain(paths).collect()
    }

    /// One line per non-fatal finding
    pub fn warnings(&self) -> Vec<String> {
        if self.unprivileged_package_steps.is_empty() {
            return Vec::new();
        }
        vec![format!(
            "not running as root: package step(s) {} need root and will fail; \
             run vm-bootstrap as root or mark them privileged",
            self.unprivileged_package_steps.join(", ")
        )]
    }
}

/// Check if running as root (EUID 0)
pub fn is_running_as_root() -> bool {
    nix::unistd::geteuid().is_root()
}

/// Locate `name` the way `execvp` would: as-is if it contains a slash,
/// otherwise in each `PATH` entry.
pub fn find_binary(name: &str) -> Option<PathBuf> {
    if name.contains('/') {
        let path = PathBuf::from(name);
        return is_executable(&path).then_some(path);
    }
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
}

fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

/// Run every check for `plan` on this host
pub fn verify_environment(plan: &ProvisioningPlan, kind: PackageManagerKind) -> SanityCheckResult {
    verify_with(plan, kind, is_running_as_root(), find_binary)
}

/// `verify_environment` with the host lookups injected
pub fn verify_with<F>(
    plan: &ProvisioningPlan,
    kind: PackageManagerKind,
    is_root: bool,
    lookup: F,
) -> SanityCheckResult
where
    F: Fn(&str) -> Option<PathBuf>,
{
    let mut result = SanityCheckResult {
        is_root,
        ..SanityCheckResult::default()
    };
    let mut require = |binary: &str| {
        if lookup(binary).is_none() && !result.missing_binaries.iter().any(|b| b == binary) {
            result.missing_binaries.push(binary.to_string());
        }
    };

    if plan.steps.iter().any(|s| s.action.is_package_operation()) {
        require(kind.binary());
    }
    if plan.has_privileged_steps() && !is_root {
        require(plan.escalation.as_str());
    }
    if !is_root {
        result.unprivileged_package_steps = plan
            .steps
            .iter()
            .filter(|s| s.action.is_package_operation() && !s.privileged)
            .map(|s| s.name.clone())
            .collect();
    }

    for step in &plan.steps {
        let Some(dir) = &step.working_dir else {
            continue;
        };
        if !dir.is_dir() {
            push_unique(&mut result.missing_paths, dir.clone());
            continue;
        }
        if let StepAction::SetupDevelop { setup_script, .. } = &step.action {
            let script = dir.join(setup_script);
            if !script.is_file() {
                push_unique(&mut result.missing_paths, script);
            }
        }
    }

    for warning in result.warnings() {
        tracing::warn!("pre-flight: {warning}");
    }
    if !result.is_ok() {
        for problem in result.problems() {
            tracing::warn!("pre-flight: {problem}");
        }
    }
    result
}

fn push_unique(paths: &mut Vec<PathBuf>, path: PathBuf) {
    if !paths.contains(&path) {
        paths.push(path);
    }
}

/// Print the failure banner to stderr and exit 1
pub fn print_error_and_exit(result: &SanityCheckResult) -> ! {
    eprintln!();
    eprintln!("╔══════════════════════════════════════════════════════════════════╗");
    eprintln!("║              vm-bootstrap - Pre-flight Check Failed              ║");
    eprintln!("╚══════════════════════════════════════════════════════════════════╝");
    eprintln!();
    for problem in result.problems() {
        eprintln!("   • {problem}");
    }
    if !result.is_root && result.missing_binaries.iter().any(|b| b == "sudo") {
        eprintln!();
        eprintln!("   Privileged steps need sudo, or run vm-bootstrap as root.");
    }
    for warning in result.warnings() {
        eprintln!("   • {warning}");
    }
    eprintln!();
    eprintln!("   Re-run with --skip-preflight to attempt the plan anyway.");
    eprintln!();
    std::process::exit(crate::error::EXIT_SETUP_FAILURE);
}
