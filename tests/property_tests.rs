//! Property-Based Tests for the fail-fast runner
//!
//! Uses proptest to check, for arbitrary plan lengths and failure positions:
//! - exactly the steps up to and including the failing one execute
//! - the run reports the failing step's own exit code
//! - a plan with no failures completes every step

use proptest::prelude::*;

use vm_bootstrap::error::BootstrapError;
use vm_bootstrap::{
    AptGet, BootstrapRunner, CommandSpec, Executor, ProvisioningPlan, Step, StepOutput,
};

/// Returns scripted exit codes by position and counts calls
struct Scripted {
    codes: Vec<i32>,
    calls: usize,
}

impl Executor for Scripted {
    fn execute(&mut self, _spec: &CommandSpec) -> std::io::Result<StepOutput> {
        let code = self.codes.get(self.calls).copied().unwrap_or(0);
        self.calls += 1;
        Ok(StepOutput::exited(code))
    }
}

fn plan_of(len: usize) -> ProvisioningPlan {
    (0..len).fold(ProvisioningPlan::new(), |plan, i| {
        plan.step(Step::command(format!("step-{i}"), "true", Vec::<String>::new()))
    })
}

/// Plan length, failing index within it, and a non-zero exit code
fn failing_plan_strategy() -> impl Strategy<Value = (usize, usize, i32)> {
    (1usize..12).prop_flat_map(|len| (Just(len), 0..len, 1i32..=255))
}

proptest! {
    /// Step k fails: steps 0..=k run, nothing after, exit code is step k's
    #[test]
    fn failure_stops_after_failing_step((len, k, code) in failing_plan_strategy()) {
        let mut codes = vec![0; len];
        codes[k] = code;
        let mut runner = BootstrapRunner::new(Box::new(AptGet), Scripted { codes, calls: 0 })
            .with_root(true);

        let err = runner.run(&plan_of(len)).unwrap_err();
        prop_assert_eq!(runner.executor().calls, k + 1);
        prop_assert_eq!(err.exit_code(), code);
        let failed_at_k = matches!(err, BootstrapError::StepFailed { index, .. } if index == k);
        prop_assert!(failed_at_k);
    }

    /// No failures: every step runs and the run succeeds
    #[test]
    fn success_runs_every_step(len in 0usize..16) {
        let mut runner = BootstrapRunner::new(
            Box::new(AptGet),
            Scripted { codes: vec![0; len], calls: 0 },
        )
        .with_root(true);

        let summary = runner.run(&plan_of(len)).unwrap();
        prop_assert_eq!(summary.steps_completed, len);
        prop_assert_eq!(runner.executor().calls, len);
    }

    /// Arbitrary well-formed package names survive validation and reach argv intact
    #[test]
    fn package_names_pass_through(names in prop::collection::vec("[a-z][a-z0-9+.-]{0,20}", 1..6)) {
        let plan = ProvisioningPlan::new().step(Step::install(names.clone()));
        prop_assert!(plan.validate().is_ok());

        let spec = plan.resolve(&AptGet, true).remove(0);
        prop_assert_eq!(&spec.args[2..], names.as_slice());
    }
}
