//! Type-safe configuration types for vm-bootstrap

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// Host package manager family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PackageManagerKind {
    /// Debian/Ubuntu `apt-get`
    #[default]
    #[serde(alias = "apt-get")]
    #[strum(to_string = "apt", serialize = "apt-get")]
    Apt,
    /// Fedora/RHEL `dnf`
    Dnf,
    /// Arch Linux `pacman`
    Pacman,
}

impl PackageManagerKind {
    /// Executable that must be on `PATH` for this backend
    pub fn binary(&self) -> &'static str {
        match self {
            Self::Apt => "apt-get",
            Self::Dnf => "dnf",
            Self::Pacman => "pacman",
        }
    }

    /// Python runtime, pip and development headers for this distribution family
    pub fn default_python_packages(&self) -> Vec<String> {
        let names: &[&str] = match self {
            Self::Apt => &["python", "python-pip", "python-dev"],
            Self::Dnf => &["python3", "python3-pip", "python3-devel"],
            // Arch ships headers inside the main python package
            Self::Pacman => &["python", "python-pip"],
        };
        names.iter().map(|s| (*s).to_string()).collect()
    }
}
