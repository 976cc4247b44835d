//! Configuration file handling.
//!
//! Every field has a default, so running without a file (or with `{}`)
//! reproduces the stock Vagrant bootstrap: apt-get, Python with pip and
//! headers, editable install of `/vagrant`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::plan::{
    DEFAULT_ESCALATION, DEFAULT_PROJECT_DIR, ProvisioningPlan, Step, StepAction,
    validate_package_name,
};
use crate::types::PackageManagerKind;

/// Bootstrap configuration that can be saved/loaded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BootstrapConfig {
    pub package_manager: PackageManagerKind,
    /// Packages to install; `None` means the distribution's Python set
    pub packages: Option<Vec<String>>,
    pub project_dir: PathBuf,
    pub python: String,
    pub setup_script: String,
    /// Run `setup.py develop` through the escalation program
    pub privileged_setup: bool,
    pub escalation: String,
    /// Extra environment for every step
    pub env: BTreeMap<String, String>,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            package_manager: PackageManagerKind::default(),
            packages: None,
            project_dir: PathBuf::from(DEFAULT_PROJECT_DIR),
            python: "python".to_string(),
            setup_script: "setup.py".to_string(),
            privileged_setup: true,
            escalation: DEFAULT_ESCALATION.to_string(),
            env: BTreeMap::new(),
        }
    }
}

impl BootstrapConfig {
    /// Save configuration to a JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .context("Failed to serialize configuration to JSON")?;

        fs::write(&path, json + "\n")
            .with_context(|| format!("Failed to write configuration to {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Load configuration from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read configuration from {:?}", path.as_ref()))?;

        let config: Self =
            serde_json::from_str(&content).context("Failed to parse configuration JSON")?;

        Ok(config)
    }

    /// Packages the install step will request
    pub fn effective_packages(&self) -> Vec<String> {
        self.packages
            .clone()
            .unwrap_or_else(|| self.package_manager.default_python_packages())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let packages = self.effective_packages();
        if packages.is_empty() {
            anyhow::bail!("At least one package must be listed");
        }
        for package in &packages {
            validate_package_name(package).map_err(anyhow::Error::msg)?;
        }

        if self.project_dir.as_os_str().is_empty() {
            anyhow::bail!("Project directory must be specified");
        }
        if !self.project_dir.is_absolute() {
            anyhow::bail!(
                "Project directory must be an absolute path, got {:?}",
                self.project_dir
            );
        }

        if self.python.trim().is_empty() {
            anyhow::bail!("Python interpreter must be specified");
        }
        if self.setup_script.trim().is_empty() || self.setup_script.contains('/') {
            anyhow::bail!("Setup script must be a file name inside the project directory");
        }
        if self.privileged_setup && self.escalation.trim().is_empty() {
            anyhow::bail!("Escalation program must be specified when setup is privileged");
        }

        for key in self.env.keys() {
            if key.is_empty() || key.contains('=') {
                anyhow::bail!("Invalid environment variable name: {:?}", key);
            }
        }

        Ok(())
    }

    /// Build the provisioning plan this configuration describes
    pub fn to_plan(&self) -> ProvisioningPlan {
        let mut setup = Step::new(
            "setup-develop",
            StepAction::SetupDevelop {
                python: self.python.clone(),
                setup_script: self.setup_script.clone(),
            },
        )
        .in_dir(&self.project_dir);
        if self.privileged_setup {
            setup = setup.privileged();
        }

        let mut plan = ProvisioningPlan::new()
            .step(Step::update_index())
            .step(Step::upgrade())
            .step(Step::install(self.effective_packages()))
            .step(setup);
        plan.escalation.clone_from(&self.escalation);
        plan.env = self.env.clone();
        plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package_manager::AptGet;

    #[test]
    fn test_default_config_matches_vagrant_bootstrap() {
        let config = BootstrapConfig::default();
        assert!(config.validate().is_ok());

        let plan = config.to_plan();
        assert_eq!(
            plan,
            ProvisioningPlan::python_develop(
                vec!["python".into(), "python-pip".into(), "python-dev".into()],
                "/vagrant",
                "python",
            )
        );
    }

    #[test]
    fn test_empty_json_is_default() {
        let config: BootstrapConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, BootstrapConfig::default());
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let err = serde_json::from_str::<BootstrapConfig>(r#"{"pakages": ["x"]}"#);
        assert!(err.is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bootstrap.json");

        let config = BootstrapConfig {
            package_manager: PackageManagerKind::Dnf,
            project_dir: PathBuf::from("/srv/site"),
            python: "python3".to_string(),
            ..BootstrapConfig::default()
        };
        config.save_to_file(&path).unwrap();

        let loaded = BootstrapConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.effective_packages(), vec!["python3", "python3-pip", "python3-devel"]);
    }

    #[test]
    fn test_load_missing_file_has_context() {
        let err = BootstrapConfig::load_from_file("/nonexistent/bootstrap.json").unwrap_err();
        assert!(err.to_string().contains("Failed to read configuration"));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let relative = BootstrapConfig {
            project_dir: PathBuf::from("vagrant"),
            ..BootstrapConfig::default()
        };
        assert!(relative.validate().is_err());

        let no_packages = BootstrapConfig {
            packages: Some(vec![]),
            ..BootstrapConfig::default()
        };
        assert!(no_packages.validate().is_err());

        let flag_package = BootstrapConfig {
            packages: Some(vec!["-y".into()]),
            ..BootstrapConfig::default()
        };
        assert!(flag_package.validate().is_err());

        let nested_script = BootstrapConfig {
            setup_script: "../setup.py".into(),
            ..BootstrapConfig::default()
        };
        assert!(nested_script.validate().is_err());
    }

    #[test]
    fn test_custom_setup_script_and_env_reach_plan() {
        let config = BootstrapConfig {
            setup_script: "install.py".into(),
            privileged_setup: false,
            env: BTreeMap::from([("PIP_NO_INPUT".to_string(), "1".to_string())]),
            ..BootstrapConfig::default()
        };
        let commands = config.to_plan().resolve(&AptGet, false);
        let setup = &commands[3];
        assert_eq!(setup.program, "python");
        assert_eq!(setup.args, vec!["install.py", "develop"]);
        assert_eq!(setup.env_var("PIP_NO_INPUT"), Some("1"));
    }
}
