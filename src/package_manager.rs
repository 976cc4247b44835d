//! Host package manager backends
//!
//! The package database is external, process-wide state. Instead of driving it
//! directly, each backend describes the three operations a provisioning plan
//! needs as `CommandSpec`s. The runner executes them, and tests substitute a
//! fake backend without touching the host.
//!
//! # Non-interactive contract
//!
//! Every spec a backend returns must already auto-confirm (`-y`,
//! `--noconfirm`) and carry `noninteractive_env()`. Installing a package that
//! is already present must be a no-op so re-running a plan is safe.

use crate::command::CommandSpec;
use crate::types::PackageManagerKind;

/// Operations a provisioning plan performs against the host package database.
pub trait PackageManager {
    /// Which family this backend drives
    fn kind(&self) -> PackageManagerKind;

    /// Refresh the package index
    fn update_index(&self) -> CommandSpec;

    /// Upgrade every installed package
    fn upgrade(&self) -> CommandSpec;

    /// Install the named packages
    fn install(&self, packages: &[String]) -> CommandSpec;

    /// Environment that suppresses all interactive prompts
    fn noninteractive_env(&self) -> Vec<(String, String)> {
        Vec::new()
    }
}

impl PackageManagerKind {
    /// Construct the backend for this package manager family
    pub fn backend(self) -> Box<dyn PackageManager> {
        match self {
            Self::Apt => Box::new(AptGet),
            Self::Dnf => Box::new(Dnf),
            Self::Pacman => Box::new(Pacman),
        }
    }
}

/// Debian/Ubuntu `apt-get`
#[derive(Debug, Clone, Copy, Default)]
pub struct AptGet;

impl AptGet {
    fn base(&self) -> CommandSpec {
        CommandSpec::new("apt-get").envs(self.noninteractive_env())
    }
}

impl PackageManager for AptGet {
    fn kind(&self) -> PackageManagerKind {
        PackageManagerKind::Apt
    }

    fn update_index(&self) -> CommandSpec {
        self.base().arg("update")
    }

    fn upgrade(&self) -> CommandSpec {
        self.base().args(["-y", "upgrade"])
    }

    fn install(&self, packages: &[String]) -> CommandSpec {
        self.base().args(["-y", "install"]).args(packages.iter().cloned())
    }

    fn noninteractive_env(&self) -> Vec<(String, String)> {
        vec![("DEBIAN_FRONTEND".to_string(), "noninteractive".to_string())]
    }
}

/// Fedora/RHEL `dnf`
#[derive(Debug, Clone, Copy, Default)]
pub struct Dnf;

impl PackageManager for Dnf {
    fn kind(&self) -> PackageManagerKind {
        PackageManagerKind::Dnf
    }

    fn update_index(&self) -> CommandSpec {
        CommandSpec::new("dnf").args(["-y", "makecache"])
    }

    fn upgrade(&self) -> CommandSpec {
        CommandSpec::new("dnf").args(["-y", "upgrade"])
    }

    fn install(&self, packages: &[String]) -> CommandSpec {
        CommandSpec::new("dnf")
            .args(["-y", "install"])
            .args(packages.iter().cloned())
    }
}

/// Arch Linux `pacman`
#[derive(Debug, Clone, Copy, Default)]
pub struct Pacman;

impl PackageManager for Pacman {
    fn kind(&self) -> PackageManagerKind {
        PackageManagerKind::Pacman
    }

    fn update_index(&self) -> CommandSpec {
        CommandSpec::new("pacman").args(["-Sy", "--noconfirm"])
    }

    fn upgrade(&self) -> CommandSpec {
        CommandSpec::new("pacman").args(["-Su", "--noconfirm"])
    }

    // --needed skips packages that are already up to date
    fn install(&self, packages: &[String]) -> CommandSpec {
        CommandSpec::new("pacman")
            .args(["-S", "--needed", "--noconfirm"])
            .args(packages.iter().cloned())
    }
}
