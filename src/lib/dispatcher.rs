//! Bootstrap-Dispatcher
//!
//! Runs the startup sequence in a fixed order and stops at the first
//! failure:
//! 1. normalize the environment (at construction)
//! 2. enter the working root
//! 3. install the package
//! 4. resolve the mode keyword
//! 5. split off the argument tail
//! 6. re-source the service account's profile
//! 7. drop privileges and launch

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::config::EntrypointConfig;
use crate::environment::ProcessEnvironment;
use crate::error::{EntrypointError, Result};
use crate::identity::{is_privileged, Identity};
use crate::installer::{Installer, PipInstaller};
use crate::launcher::{
    Invocation, LaunchStrategy, Launcher, RunuserLauncher, DEFAULT_SWITCH_PROGRAM,
};
use crate::mode::split_mode;
use crate::profile::{ProfileLoader, ShellProfileLoader};

/// The production collaborators
pub type SystemDispatcher = Dispatcher<PipInstaller, ShellProfileLoader, RunuserLauncher>;

pub struct Dispatcher<I, P, L> {
    config: EntrypointConfig,
    env: ProcessEnvironment,
    identity: Option<Identity>,
    installer: I,
    profiles: P,
    launcher: L,
}

impl SystemDispatcher {
    /// Dispatcher over the real installer, shell and runuser, inheriting
    /// the current process environment. As root the profile is sourced
    /// through runuser so it never runs with root privileges.
    pub fn from_config(config: EntrypointConfig) -> Self {
        let installer = PipInstaller::new(config.pip.clone());
        let strategy = if config.no_exec {
            LaunchStrategy::Spawn
        } else {
            LaunchStrategy::Exec
        };
        let profiles = if is_privileged() {
            ShellProfileLoader::as_account(DEFAULT_SWITCH_PROGRAM)
        } else {
            ShellProfileLoader::default()
        };
        Dispatcher::new(
            config,
            std::env::vars_os(),
            installer,
            profiles,
            RunuserLauncher::new(strategy),
        )
    }
}

impl<I, P, L> Dispatcher<I, P, L>
where
    I: Installer,
    P: ProfileLoader,
    L: Launcher,
{
    pub fn new<E, K, V>(
        config: EntrypointConfig,
        inherited: E,
        installer: I,
        profiles: P,
        launcher: L,
    ) -> Self
    where
        E: IntoIterator<Item = (K, V)>,
        K: Into<OsString>,
        V: Into<OsString>,
    {
        Self {
            config,
            env: ProcessEnvironment::normalized(inherited),
            identity: None,
            installer,
            profiles,
            launcher,
        }
    }

    /// Use a known account instead of looking it up in passwd
    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identity = Some(identity);
        self
    }

    /// The normalized environment. Available before any argument is
    /// looked at, so it holds on the usage-error path too.
    pub fn environment(&self) -> &ProcessEnvironment {
        &self.env
    }

    pub fn config(&self) -> &EntrypointConfig {
        &self.config
    }

    pub fn installer(&self) -> &I {
        &self.installer
    }

    pub fn profiles(&self) -> &P {
        &self.profiles
    }

    pub fn launcher(&self) -> &L {
        &self.launcher
    }

    /// Steps 2 through 6: everything short of launching
    pub fn resolve(&self, args: &[OsString]) -> Result<Invocation> {
        let root = self.enter_root()?;

        if self.config.skip_install {
            info!("package installation skipped");
        } else {
            self.installer.install(&root, &self.env)?;
        }

        let (mode, tail) = split_mode(args)?;
        let target = mode.target(&self.config.python);
        debug!(%mode, program = %target.program, tail = ?tail, "mode resolved");

        let identity = match &self.identity {
            Some(identity) => identity.clone(),
            None => Identity::lookup(&self.config.user)?,
        };
        // A relative profile path is taken from the working root
        let profile = match &self.config.profile {
            Some(profile) if profile.is_relative() => root.join(profile),
            Some(profile) => profile.clone(),
            None => identity.default_profile(),
        };
        let defaults = self.profiles.load(&profile, &identity, &self.env, &root)?;
        let env = self.env.merged_with_defaults(&defaults);

        let mut forwarded: Vec<OsString> =
            target.fixed_args.into_iter().map(OsString::from).collect();
        forwarded.extend(tail);

        Ok(Invocation {
            mode,
            user: identity.name,
            program: target.program,
            args: forwarded,
            working_dir: root,
            env,
        })
    }

    /// Resolve and launch. Returns the exit code to report when the
    /// launcher waited on the target instead of replacing the process.
    pub fn dispatch(&self, args: &[OsString]) -> Result<i32> {
        let invocation = self.resolve(args)?;
        if !is_privileged() {
            warn!(
                user = %invocation.user,
                "not running as root; switching identity will likely fail"
            );
        }
        self.launcher.launch(&invocation)
    }

    fn enter_root(&self) -> Result<PathBuf> {
        let root = &self.config.root;
        let working_root_error = |source: io::Error| EntrypointError::WorkingRoot {
            path: root.clone(),
            source,
        };

        let metadata = fs::metadata(root).map_err(working_root_error)?;
        if !metadata.is_dir() {
            return Err(working_root_error(io::Error::other("not a directory")));
        }
        let root = fs::canonicalize(root).map_err(working_root_error)?;
        debug!(root = %root.display(), "entered working root");
        Ok(root)
    }
}
