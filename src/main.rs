//! vm-bootstrap - main entry point
//!
//! With no arguments, runs the default provisioning plan and exits with the
//! status of the first failing step (0 if every step succeeded, 128 + signal
//! if interrupted).

use anyhow::Context;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use vm_bootstrap::cli::{Cli, Commands};
use vm_bootstrap::error::EXIT_SETUP_FAILURE;
use vm_bootstrap::{
    BootstrapConfig, BootstrapError, BootstrapRunner, DryRunExecutor, RunSummary, SystemExecutor,
    process_guard, sanity,
};

/// Initialize the logger with appropriate settings
fn init_logger() {
    // RUST_LOG overrides the default level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    init_logger();
    info!("vm-bootstrap starting up");

    // Relays Ctrl+C to the running step's process group
    if let Err(e) = process_guard::init_signal_handlers() {
        warn!("Failed to initialize signal handlers: {}", e);
    }

    let cli = Cli::parse_args();
    debug!(?cli, "CLI arguments parsed");

    let result = match &cli.command {
        None | Some(Commands::Run) => run_plan(&cli),
        Some(Commands::Plan { json }) => print_plan(&cli, *json),
        Some(Commands::Validate { file }) => validate_config(file),
        Some(Commands::InitConfig { path, force }) => init_config(path, *force),
    };

    if let Err(err) = result {
        let code = err
            .downcast_ref::<BootstrapError>()
            .map_or(EXIT_SETUP_FAILURE, BootstrapError::exit_code);
        error!("{:#}", err);
        eprintln!("\n✗ {:#}", err);
        std::process::exit(code);
    }
}

/// Run the provisioning plan described by the CLI and configuration
fn run_plan(cli: &Cli) -> anyhow::Result<()> {
    let config = cli.load_config()?;
    let plan = config.to_plan();
    plan.validate()?;

    if cli.skip_preflight {
        info!("Pre-flight checks skipped");
    } else {
        let checks = sanity::verify_environment(&plan, config.package_manager);
        if !checks.is_ok() {
            if cli.dry_run {
                warn!("Pre-flight checks failed; continuing because this is a dry run");
            } else {
                sanity::print_error_and_exit(&checks);
            }
        }
    }

    let backend = config.package_manager.backend();
    let summary: RunSummary = if cli.dry_run {
        BootstrapRunner::new(backend, DryRunExecutor::new()).run(&plan)?
    } else {
        BootstrapRunner::new(backend, SystemExecutor::new()).run(&plan)?
    };

    println!(
        "\n✓ Provisioning complete: {} step(s) in {:.1}s{}",
        summary.steps_completed,
        summary.elapsed.as_secs_f64(),
        if cli.dry_run { " (dry run)" } else { "" }
    );
    Ok(())
}

/// Print the resolved plan
fn print_plan(cli: &Cli, json: bool) -> anyhow::Result<()> {
    let config = cli.load_config()?;
    let plan = config.to_plan();
    plan.validate()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    let backend = config.package_manager.backend();
    let commands = plan.resolve(backend.as_ref(), sanity::is_running_as_root());
    for (index, (step, command)) in plan.steps.iter().zip(&commands).enumerate() {
        println!("{:>2}. {:<14} {}", index + 1, step.name, command);
    }
    Ok(())
}

/// Validate a configuration file and the plan it produces
fn validate_config(path: &std::path::Path) -> anyhow::Result<()> {
    info!("Validating configuration file: {:?}", path);
    let config = BootstrapConfig::load_from_file(path)?;
    config
        .validate()
        .with_context(|| format!("Configuration validation failed for {:?}", path))?;
    config.to_plan().validate()?;

    info!("Configuration validation successful");
    println!("✓ Configuration file is valid: {}", path.display());
    Ok(())
}

/// Write the default configuration
fn init_config(path: &std::path::Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    BootstrapConfig::default().save_to_file(path)?;
    println!("✓ Default configuration written to {}", path.display());
    Ok(())
}
