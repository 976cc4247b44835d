use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config_file::BootstrapConfig;

/// vm-bootstrap - provision a development VM for a Python project
#[derive(Parser, Debug)]
#[command(name = "vm-bootstrap")]
#[command(about = "Update packages, install Python and register the project in development mode")]
#[command(version)]
pub struct Cli {
    /// Configuration file (JSON). Defaults reproduce the stock Vagrant bootstrap.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Project directory containing setup.py (overrides the config file)
    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    /// Dry-run mode: log every command without executing anything.
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Skip pre-flight checks (missing binaries, missing project directory)
    #[arg(long, global = true)]
    pub skip_preflight: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Run the provisioning plan (the default when no command is given)
    Run,
    /// Print the resolved commands without running them
    Plan {
        /// Print the plan as JSON instead of command lines
        #[arg(long)]
        json: bool,
    },
    /// Validate a configuration file
    Validate {
        /// Path to configuration file to validate
        file: PathBuf,
    },
    /// Write the default configuration to a file
    InitConfig {
        /// Destination path
        path: PathBuf,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        <Self as clap::Parser>::parse()
    }

    /// Load the configuration named on the command line (or defaults) and
    /// apply command-line overrides.
    pub fn load_config(&self) -> anyhow::Result<BootstrapConfig> {
        let mut config = match &self.config {
            Some(path) => BootstrapConfig::load_from_file(path)?,
            None => BootstrapConfig::default(),
        };
        if let Some(dir) = &self.project_dir {
            config.project_dir.clone_from(dir);
        }
        config.validate()?;
        Ok(config)
    }
}
