//! Resolved command lines.
//!
//! A `CommandSpec` is what a plan step becomes once the package manager
//! backend, environment overrides, working directory and privilege escalation
//! have been applied. It is plain data: building one never touches the host.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

/// A fully resolved command: program, argv, env overrides and working directory.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set one environment override. Later calls win.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (key, value) in vars {
            self.env.insert(key.into(), value.into());
        }
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.working_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Wrap the command in a privilege escalation program.
    ///
    /// Both sudo and doas reset the environment, so overrides are carried
    /// across explicitly:
    /// - sudo: `sudo -n [--preserve-env=K1,K2] <program> <args...>`
    /// - doas: `doas -n [env K1=V1 K2=V2] <program> <args...>`
    /// - anything else: `<escalation> [env K1=V1 K2=V2] <program> <args...>`
    ///
    /// `-n` makes sudo and doas fail instead of prompting for a password.
    pub fn elevated(self, escalation: &str) -> Self {
        let name = Path::new(escalation)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(escalation);

        let mut args = Vec::new();
        match name {
            "sudo" => {
                args.push("-n".to_string());
                if !self.env.is_empty() {
                    let keys: Vec<&str> = self.env.keys().map(String::as_str).collect();
                    args.push(format!("--preserve-env={}", keys.join(",")));
                }
            }
            _ => {
                if name == "doas" {
                    args.push("-n".to_string());
                }
                if !self.env.is_empty() {
                    args.push("env".to_string());
                    args.extend(self.env.iter().map(|(k, v)| format!("{k}={v}")));
                }
            }
        }
        args.push(self.program);
        args.extend(self.args);

        Self {
            program: escalation.to_string(),
            args,
            env: self.env,
            working_dir: self.working_dir,
        }
    }

    /// Look up an environment override
    pub fn env_var(&self, key: &str) -> Option<&str> {
        self.env.get(key).map(String::as_str)
    }

    /// Build a `std::process::Command` carrying program, args, env and cwd.
    ///
    /// Stdio and process-group setup are left to the executor.
    pub fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).envs(&self.env);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        cmd
    }
}

impl fmt::Display for CommandSpec {
    /// Shell-like rendering used in logs: `(cd DIR &&) KEY=VALUE program args`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(dir) = &self.working_dir {
            write!(f, "cd {} && ", quote(&dir.display().to_string()))?;
        }
        for (key, value) in &self.env {
            write!(f, "{}={} ", key, quote(value))?;
        }
        write!(f, "{}", quote(&self.program))?;
        for arg in &self.args {
            write!(f, " {}", quote(arg))?;
        }
        Ok(())
    }
}

/// Single-quote a word for display if it contains anything a shell would split on
fn quote(word: &str) -> String {
    let plain = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c));
    if plain {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}
