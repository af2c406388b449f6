//! Editable install of the judge package

use std::path::Path;
use std::process::{Command, Stdio};

use tracing::debug;

use crate::environment::ProcessEnvironment;
use crate::error::{EntrypointError, Result};

/// Materializes the package at the working root. Must be safe to repeat.
pub trait Installer {
    fn install(&self, root: &Path, env: &ProcessEnvironment) -> Result<()>;
}

/// `pip install -e .`, quiet, stdout discarded
#[derive(Debug, Clone)]
pub struct PipInstaller {
    program: String,
}

impl PipInstaller {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn command(&self, root: &Path, env: &ProcessEnvironment) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(["install", "-q", "-e", "."])
            .env_clear()
            .envs(env.iter())
            .current_dir(root)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit());
        cmd
    }
}

impl Installer for PipInstaller {
    fn install(&self, root: &Path, env: &ProcessEnvironment) -> Result<()> {
        debug!(program = %self.program, root = %root.display(), "installing package");

        let status = self
            .command(root, env)
            .status()
            .map_err(|source| EntrypointError::InstallerSpawn {
                program: self.program.clone(),
                source,
            })?;

        if !status.success() {
            return Err(EntrypointError::InstallFailed {
                code: status.code(),
            });
        }
        Ok(())
    }
}
