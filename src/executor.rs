//! Step execution
//!
//! `Executor` is the seam between a resolved `CommandSpec` and the host.
//! `SystemExecutor` is the only place that spawns provisioning commands;
//! `DryRunExecutor` records what would have run.
//!
//! # Execution contract
//!
//! - stdin is `/dev/null`: a prompt that slips past the non-interactive
//!   settings reads EOF instead of hanging the run
//! - stdout/stderr are inherited so the operator sees the package manager's
//!   own output, unmodified
//! - the child runs in its own process group and is tracked until it exits

use crate::command::CommandSpec;
use crate::process_guard::{CommandProcessGroup, TrackedChild};
use std::os::unix::process::ExitStatusExt;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

/// Runs resolved commands
pub trait Executor {
    /// Run `spec` to completion.
    ///
    /// `Err` means the process could not be started, or could not be waited
    /// on and was killed; a process that started and failed is `Ok` with
    /// `success == false`.
    fn execute(&mut self, spec: &CommandSpec) -> std::io::Result<StepOutput>;
}

impl<E: Executor + ?Sized> Executor for &mut E {
    fn execute(&mut self, spec: &CommandSpec) -> std::io::Result<StepOutput> {
        (**self).execute(spec)
    }
}

/// Outcome of one executed command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutput {
    /// Exit code (None if terminated by signal)
    pub exit_code: Option<i32>,
    /// Terminating signal, if any
    pub signal: Option<i32>,
    /// Whether the command exited with status 0
    pub success: bool,
    /// Whether execution was skipped (dry-run)
    pub dry_run: bool,
    pub elapsed: Duration,
}

impl StepOutput {
    pub fn from_status(status: ExitStatus, elapsed: Duration) -> Self {
        Self {
            exit_code: status.code(),
            signal: status.signal(),
            success: status.success(),
            dry_run: false,
            elapsed,
        }
    }

    /// Successful output carrying only an exit code. Used by dry runs and fakes.
    pub fn exited(code: i32) -> Self {
        Self {
            exit_code: Some(code),
            signal: None,
            success: code == 0,
            dry_run: false,
            elapsed: Duration::ZERO,
        }
    }

    /// Exit status to report for a failed step.
    ///
    /// Signals map to `128 + signal` as a shell would; a zero code on a
    /// failed output cannot happen from a real process but is clamped to 1 so
    /// a failure is never reported as success.
    pub fn failure_code(&self) -> i32 {
        match (self.exit_code, self.signal) {
            (Some(code), _) if code != 0 => code,
            (_, Some(sig)) => 128 + sig,
            _ => 1,
        }
    }
}

/// Executes commands on the host
#[derive(Debug, Default)]
pub struct SystemExecutor;

impl SystemExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl Executor for SystemExecutor {
    fn execute(&mut self, spec: &CommandSpec) -> std::io::Result<StepOutput> {
        tracing::info!(command = %spec, "executing");

        let mut cmd = spec.to_command();
        cmd.stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .in_new_process_group();

        let started = Instant::now();
        let mut child = cmd.spawn()?;
        let tracked = TrackedChild::new(child.id(), spec.to_string());

        let status = match child.wait() {
            Ok(status) => status,
            Err(err) => {
                // Never leave a step running unobserved
                tracing::error!(pid = tracked.pid(), "lost track of step, killing it: {err}");
                tracked.kill();
                let _ = child.wait();
                return Err(err);
            }
        };
        drop(tracked);

        let output = StepOutput::from_status(status, started.elapsed());
        tracing::debug!(
            pid = child.id(),
            exit_code = ?output.exit_code,
            signal = ?output.signal,
            elapsed_ms = output.elapsed.as_millis() as u64,
            "command finished"
        );
        Ok(output)
    }
}

/// Logs commands instead of running them
#[derive(Debug, Default)]
pub struct DryRunExecutor {
    executed: Vec<CommandSpec>,
}

impl DryRunExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands seen so far, in order
    pub fn commands(&self) -> &[CommandSpec] {
        &self.executed
    }
}

impl Executor for DryRunExecutor {
    fn execute(&mut self, spec: &CommandSpec) -> std::io::Result<StepOutput> {
        tracing::info!(command = %spec, "[DRY RUN] skipped");
        self.executed.push(spec.clone());
        Ok(StepOutput {
            dry_run: true,
            ..StepOutput::exited(0)
        })
    }
}
