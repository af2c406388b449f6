//! Privilege drop and process replacement
//!
//! The resolved `Invocation` is handed to a `Launcher`, which switches to
//! the service account and runs the target in place of the entrypoint.
//! With `exec` a successful launch never returns; with spawn-and-wait it
//! returns the exit code the entrypoint must report.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{Command, ExitStatus, Stdio};

use serde::{Serialize, Serializer};
use tracing::debug;

use crate::environment::ProcessEnvironment;
use crate::error::{EntrypointError, Result};
use crate::mode::Mode;
use crate::signal_handler::{clear_child, forward_signals_to, setup_signal_forwarding};

/// Default identity-switch mechanism
pub const DEFAULT_SWITCH_PROGRAM: &str = "runuser";

/// Everything needed to start the target command
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Invocation {
    pub mode: Mode,
    /// Account the target runs as
    pub user: String,
    pub program: String,
    /// Fixed mode arguments followed by the forwarded tail
    #[serde(serialize_with = "serialize_lossy")]
    pub args: Vec<OsString>,
    pub working_dir: PathBuf,
    pub env: ProcessEnvironment,
}

impl Invocation {
    /// Program followed by its arguments
    pub fn argv(&self) -> Vec<OsString> {
        std::iter::once(OsString::from(&self.program))
            .chain(self.args.iter().cloned())
            .collect()
    }
}

fn serialize_lossy<S>(args: &[OsString], serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_seq(args.iter().map(|arg| arg.to_string_lossy()))
}

/// How the target replaces the entrypoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LaunchStrategy {
    /// Replace the process image
    #[default]
    Exec,
    /// Spawn, wait, and report the child's status
    Spawn,
}

/// Runs an invocation as its unprivileged user
pub trait Launcher {
    /// Returns the exit code the entrypoint should exit with. Launchers
    /// that replace the process image only ever return errors.
    fn launch(&self, invocation: &Invocation) -> Result<i32>;
}

/// Switches identity with `runuser -u <user> -- <argv>`
#[derive(Debug, Clone)]
pub struct RunuserLauncher {
    switch_program: String,
    strategy: LaunchStrategy,
}

impl Default for RunuserLauncher {
    fn default() -> Self {
        Self::new(LaunchStrategy::default())
    }
}

impl RunuserLauncher {
    pub fn new(strategy: LaunchStrategy) -> Self {
        let strategy = if cfg!(unix) {
            strategy
        } else {
            LaunchStrategy::Spawn
        };
        Self {
            switch_program: DEFAULT_SWITCH_PROGRAM.to_string(),
            strategy,
        }
    }

    pub fn with_switch_program(mut self, program: impl Into<String>) -> Self {
        self.switch_program = program.into();
        self
    }

    /// The full command line. `--` ends runuser's own options so the
    /// forwarded arguments are never read as runuser flags.
    pub fn command(&self, invocation: &Invocation) -> Command {
        let mut cmd = Command::new(&self.switch_program);
        cmd.arg("-u")
            .arg(&invocation.user)
            .arg("--")
            .arg(&invocation.program)
            .args(&invocation.args)
            .env_clear()
            .envs(invocation.env.iter())
            .current_dir(&invocation.working_dir)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        cmd
    }

    fn launch_error(&self, source: std::io::Error) -> EntrypointError {
        EntrypointError::Launch {
            program: self.switch_program.clone(),
            source,
        }
    }

    #[cfg(unix)]
    fn exec(&self, mut cmd: Command) -> Result<i32> {
        use std::os::unix::process::CommandExt;
        // exec only returns on failure
        Err(self.launch_error(cmd.exec()))
    }

    #[cfg(not(unix))]
    fn exec(&self, cmd: Command) -> Result<i32> {
        self.spawn_and_wait(cmd)
    }

    fn spawn_and_wait(&self, mut cmd: Command) -> Result<i32> {
        let mut child = cmd.spawn().map_err(|e| self.launch_error(e))?;

        // Record the child before any handler can run
        forward_signals_to(child.id());
        setup_signal_forwarding();
        let status = child.wait();
        clear_child();

        let code = exit_code_of(status.map_err(|e| self.launch_error(e))?);
        debug!(code, "target exited");
        Ok(code)
    }
}

impl Launcher for RunuserLauncher {
    fn launch(&self, invocation: &Invocation) -> Result<i32> {
        let cmd = self.command(invocation);
        debug!(
            user = %invocation.user,
            argv = ?invocation.argv(),
            strategy = ?self.strategy,
            "launching target"
        );
        match self.strategy {
            LaunchStrategy::Exec => self.exec(cmd),
            LaunchStrategy::Spawn => self.spawn_and_wait(cmd),
        }
    }
}

/// Exit status as a shell reports it: the code, or 128 + signal
pub fn exit_code_of(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}
