//! Bootstrap Runner
//!
//! Executes a `ProvisioningPlan` in order and stops at the first step that
//! fails. The fail-fast rule is a `try_fold` over the steps: the first `Err`
//! short-circuits the rest. Nothing is retried and nothing already done is
//! rolled back.
//!
//! An operator interrupt is checked before each step starts and after it
//! ends, so no step starts once the interrupt flag is raised and a step
//! the runner killed is reported as `Interrupted`, not as a step failure.

use crate::error::{BootstrapError, EXIT_NOT_EXECUTABLE, EXIT_NOT_FOUND, Result};
use crate::executor::Executor;
use crate::package_manager::PackageManager;
use crate::plan::{ProvisioningPlan, Step};
use crate::process_guard::InterruptFlag;
use std::time::{Duration, Instant};

/// What a successful run did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub steps_completed: usize,
    pub elapsed: Duration,
}

/// Runs provisioning plans against one package manager through one executor
pub struct BootstrapRunner<E: Executor> {
    package_manager: Box<dyn PackageManager>,
    executor: E,
    running_as_root: bool,
    interrupt: InterruptFlag,
}

impl<E: Executor> BootstrapRunner<E> {
    /// Create a runner. Root detection is done once, here.
    pub fn new(package_manager: Box<dyn PackageManager>, executor: E) -> Self {
        Self {
            package_manager,
            executor,
            running_as_root: crate::sanity::is_running_as_root(),
            interrupt: InterruptFlag::global(),
        }
    }

    /// Override root detection (privileged steps skip escalation when root)
    pub fn with_root(mut self, running_as_root: bool) -> Self {
        self.running_as_root = running_as_root;
        self
    }

    /// Watch `interrupt` instead of the process-wide flag
    pub fn with_interrupt(mut self, interrupt: InterruptFlag) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Execute every step in order; abort on the first failure.
    pub fn run(&mut self, plan: &ProvisioningPlan) -> Result<RunSummary> {
        let started = Instant::now();
        let total = plan.len();
        tracing::info!(
            steps = total,
            package_manager = %self.package_manager.kind(),
            "starting provisioning run"
        );

        let steps_completed = plan
            .steps
            .iter()
            .enumerate()
            .try_fold(0usize, |completed, (index, step)| {
                self.run_step(plan, index, step)?;
                Ok::<_, BootstrapError>(completed + 1)
            })
            .inspect_err(|err| tracing::error!("{err}; remaining steps skipped"))?;

        let elapsed = started.elapsed();
        tracing::info!(
            steps = steps_completed,
            elapsed_s = elapsed.as_secs(),
            "provisioning complete"
        );
        Ok(RunSummary {
            steps_completed,
            elapsed,
        })
    }

    fn run_step(&mut self, plan: &ProvisioningPlan, index: usize, step: &Step) -> Result<()> {
        self.check_interrupt()?;
        let spec = plan.resolve_step(step, self.package_manager.as_ref(), self.running_as_root);
        tracing::info!(step = index + 1, of = plan.len(), step_name = %step.name, "running step");

        let result = self.executor.execute(&spec);
        self.check_interrupt()?;

        let output = match result {
            Ok(output) => output,
            Err(err) => {
                let code = if err.kind() == std::io::ErrorKind::NotFound {
                    EXIT_NOT_FOUND
                } else {
                    EXIT_NOT_EXECUTABLE
                };
                tracing::error!(program = %spec.program, "could not run step: {err}");
                return Err(BootstrapError::step_failed(index, &step.name, code));
            }
        };

        if output.success {
            tracing::info!(step_name = %step.name, "step succeeded");
            Ok(())
        } else {
            Err(BootstrapError::step_failed(
                index,
                &step.name,
                output.failure_code(),
            ))
        }
    }

    fn check_interrupt(&self) -> Result<()> {
        match self.interrupt.signal() {
            Some(signal) => Err(BootstrapError::Interrupted { signal }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandSpec;
    use crate::executor::{DryRunExecutor, StepOutput};
    use crate::package_manager::AptGet;
    use std::collections::VecDeque;

    /// Replays scripted results and records every command
    #[derive(Default)]
    struct Scripted {
        results: VecDeque<std::io::Result<StepOutput>>,
        seen: Vec<CommandSpec>,
    }

    impl Executor for Scripted {
        fn execute(&mut self, spec: &CommandSpec) -> std::io::Result<StepOutput> {
            self.seen.push(spec.clone());
            self.results
                .pop_front()
                .unwrap_or_else(|| Ok(StepOutput::exited(0)))
        }
    }

    fn echo_plan(n: usize) -> ProvisioningPlan {
        (0..n).fold(ProvisioningPlan::new(), |plan, i| {
            plan.step(Step::command(format!("echo-{i}"), "echo", [i.to_string()]))
        })
    }

    #[test]
    fn test_empty_plan_succeeds() {
        let mut runner = BootstrapRunner::new(Box::new(AptGet), DryRunExecutor::new());
        let summary = runner.run(&ProvisioningPlan::new()).unwrap();
        assert_eq!(summary.steps_completed, 0);
    }

    #[test]
    fn test_stops_at_first_failure() {
        let mut executor = Scripted::default();
        executor.results.push_back(Ok(StepOutput::exited(0)));
        executor.results.push_back(Ok(StepOutput::exited(9)));

        let mut runner = BootstrapRunner::new(Box::new(AptGet), executor).with_root(true);
        let err = runner.run(&echo_plan(4)).unwrap_err();

        assert!(matches!(
            err,
            BootstrapError::StepFailed { index: 1, exit_code: 9, .. }
        ));
        assert_eq!(runner.executor().seen.len(), 2);
    }

    #[test]
    fn test_spawn_failure_maps_to_shell_codes() {
        let mut executor = Scripted::default();
        executor
            .results
            .push_back(Err(std::io::Error::from(std::io::ErrorKind::NotFound)));
        let mut runner = BootstrapRunner::new(Box::new(AptGet), executor);
        assert_eq!(runner.run(&echo_plan(2)).unwrap_err().exit_code(), 127);

        let mut executor = Scripted::default();
        executor
            .results
            .push_back(Err(std::io::Error::from(std::io::ErrorKind::PermissionDenied)));
        let mut runner = BootstrapRunner::new(Box::new(AptGet), executor);
        assert_eq!(runner.run(&echo_plan(2)).unwrap_err().exit_code(), 126);
    }

    /// Raises the interrupt flag while its first command runs
    struct InterruptedMidStep {
        flag: InterruptFlag,
        calls: usize,
    }

    impl Executor for InterruptedMidStep {
        fn execute(&mut self, _spec: &CommandSpec) -> std::io::Result<StepOutput> {
            self.calls += 1;
            self.flag.raise(2);
            // What a step killed by the runner's SIGTERM looks like
            Ok(StepOutput {
                exit_code: None,
                signal: Some(15),
                success: false,
                dry_run: false,
                elapsed: Duration::ZERO,
            })
        }
    }

    #[test]
    fn test_interrupt_during_step_reports_interrupted() {
        let flag = InterruptFlag::default();
        let executor = InterruptedMidStep {
            flag: flag.clone(),
            calls: 0,
        };
        let mut runner = BootstrapRunner::new(Box::new(AptGet), executor)
            .with_root(true)
            .with_interrupt(flag);

        let err = runner.run(&echo_plan(3)).unwrap_err();
        assert!(matches!(err, BootstrapError::Interrupted { signal: 2 }));
        assert_eq!(err.exit_code(), 130);
        assert_eq!(runner.executor().calls, 1, "no step may start after an interrupt");
    }

    #[test]
    fn test_interrupt_before_run_starts_nothing() {
        let flag = InterruptFlag::default();
        flag.raise(15);
        let mut runner = BootstrapRunner::new(Box::new(AptGet), DryRunExecutor::new())
            .with_interrupt(flag);

        let err = runner.run(&echo_plan(2)).unwrap_err();
        assert_eq!(err.exit_code(), 143);
        assert!(runner.executor().commands().is_empty());
    }

    #[test]
    fn test_privileged_step_escalates_unless_root() {
        let plan = ProvisioningPlan::new().step(Step::command("whoami", "id", ["-u"]).privileged());

        let mut runner =
            BootstrapRunner::new(Box::new(AptGet), DryRunExecutor::new()).with_root(false);
        runner.run(&plan).unwrap();
        assert_eq!(runner.executor().commands()[0].program, "sudo");

        let mut runner =
            BootstrapRunner::new(Box::new(AptGet), DryRunExecutor::new()).with_root(true);
        runner.run(&plan).unwrap();
        assert_eq!(runner.executor().commands()[0].program, "id");
    }
}
