//! Tests for real process execution
//!
//! These tests spawn `sh` to verify:
//! - Exit codes, signals and spawn failures map to the right step failure
//! - Working directory and environment overrides reach the child
//! - stdin is closed, so a prompt reads EOF instead of blocking

use std::fs;

use vm_bootstrap::error::BootstrapError;
use vm_bootstrap::{
    AptGet, BootstrapRunner, CommandSpec, Executor, ProvisioningPlan, Step,
    SystemExecutor,
};

fn sh(name: &str, script: &str) -> Step {
    Step::command(name, "sh", ["-c", script])
}

fn run(plan: &ProvisioningPlan) -> vm_bootstrap::Result<vm_bootstrap::RunSummary> {
    BootstrapRunner::new(Box::new(AptGet), SystemExecutor::new())
        .with_root(true)
        .run(plan)
}

#[test]
fn test_successful_plan_exits_zero() {
    let plan = ProvisioningPlan::new()
        .step(sh("one", "true"))
        .step(sh("two", "exit 0"));
    let summary = run(&plan).unwrap();
    assert_eq!(summary.steps_completed, 2);
}

#[test]
fn test_failing_step_stops_the_run() {
    let scratch = tempfile::tempdir().unwrap();
    let marker = scratch.path().join("after");

    let plan = ProvisioningPlan::new()
        .step(sh("fails", "exit 42"))
        .step(sh("never", &format!("touch '{}'", marker.display())));

    let err = run(&plan).unwrap_err();
    assert_eq!(err.exit_code(), 42);
    assert!(!marker.exists(), "step after the failure must not run");
}

#[test]
fn test_working_dir_and_env_reach_child() {
    let project = tempfile::tempdir().unwrap();
    let plan = ProvisioningPlan::new().env("PLAN_VAR", "plan").step(
        sh("record", r#"printf '%s %s' "$PLAN_VAR" "$STEP_VAR" > seen.txt"#)
            .in_dir(project.path())
            .with_env("STEP_VAR", "step"),
    );

    run(&plan).unwrap();
    let seen = fs::read_to_string(project.path().join("seen.txt")).unwrap();
    assert_eq!(seen, "plan step");
}

#[test]
fn test_prompt_reads_eof_instead_of_blocking() {
    // `read` on a closed stdin fails immediately
    let plan = ProvisioningPlan::new().step(sh("prompt", "read answer"));
    let err = run(&plan).unwrap_err();
    assert!(matches!(err, BootstrapError::StepFailed { index: 0, .. }));
    assert_ne!(err.exit_code(), 0);
}

#[test]
fn test_missing_program_is_127() {
    let plan = ProvisioningPlan::new().step(Step::command(
        "ghost",
        "vm-bootstrap-definitely-missing",
        Vec::<String>::new(),
    ));
    let err = run(&plan).unwrap_err();
    assert_eq!(err.exit_code(), 127);
}

#[test]
fn test_missing_working_dir_fails_the_step() {
    let plan = ProvisioningPlan::new().step(sh("cd", "true").in_dir("/nonexistent/vm-bootstrap"));
    let err = run(&plan).unwrap_err();
    assert!(matches!(err, BootstrapError::StepFailed { index: 0, .. }));
}

#[test]
fn test_signal_maps_to_128_plus_signal() {
    let plan = ProvisioningPlan::new().step(sh("killed", "kill -TERM $$"));
    let err = run(&plan).unwrap_err();
    assert_eq!(err.exit_code(), 128 + 15);
}

#[test]
fn test_child_runs_in_own_process_group() {
    let scratch = tempfile::tempdir().unwrap();
    let out = scratch.path().join("pgid");
    let spec = CommandSpec::new("sh").args([
        "-c".to_string(),
        format!(
            "command -v ps >/dev/null || exit 99; ps -o pgid= -p $$ | tr -d ' ' > '{0}'; echo $$ >> '{0}'",
            out.display()
        ),
    ]);

    let output = SystemExecutor::new().execute(&spec).unwrap();
    if output.exit_code == Some(99) {
        // ps is not installed everywhere
        return;
    }
    assert!(output.success);
    let text = fs::read_to_string(&out).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0], lines[1], "child should lead its own process group");
}
