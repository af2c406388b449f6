//! Entrypoint configuration
//!
//! Fixed defaults for the judge image, each overridable through a
//! `JUDGE_ENTRY_*` environment variable. Read once at startup.

use std::env;
use std::path::PathBuf;

use crate::error::{EntrypointError, Result};

/// Default install root and working directory
pub const DEFAULT_ROOT: &str = "/judge";
/// Default unprivileged service account
pub const DEFAULT_USER: &str = "judge";
/// Default installer executable
pub const DEFAULT_PIP: &str = "pip3";
/// Default interpreter for test mode
pub const DEFAULT_PYTHON: &str = "python3";
/// Profile file name inside the account's home
pub const PROFILE_FILE_NAME: &str = ".profile";

/// useradd's portable naming rule
const USERNAME_REGEX: &str = r"^[a-z_][a-z0-9_-]*[$]?$";
const USERNAME_MAX_LEN: usize = 32;

/// Configuration from environment variables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntrypointConfig {
    /// Install root; becomes the working directory
    pub root: PathBuf,
    /// Account the target command runs as
    pub user: String,
    /// Profile to re-source (default: `<home>/.profile`)
    pub profile: Option<PathBuf>,
    /// Installer executable
    pub pip: String,
    /// Interpreter for the test suite
    pub python: String,
    /// Skip the editable install
    pub skip_install: bool,
    /// Spawn and wait instead of replacing the process image
    pub no_exec: bool,
    /// Print the resolved invocation instead of launching
    pub dry_run: bool,
    /// Debug-level logging
    pub debug: bool,
}

impl Default for EntrypointConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(DEFAULT_ROOT),
            user: DEFAULT_USER.to_string(),
            profile: None,
            pip: DEFAULT_PIP.to_string(),
            python: DEFAULT_PYTHON.to_string(),
            skip_install: false,
            no_exec: false,
            dry_run: false,
            debug: false,
        }
    }
}

impl EntrypointConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |name: &str| lookup(name).filter(|v| !v.is_empty());
        let flag = |name: &str| lookup(name).is_some_and(|v| v == "1" || v == "true");

        Self {
            root: non_empty("JUDGE_ENTRY_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.root),
            user: non_empty("JUDGE_ENTRY_USER").unwrap_or(defaults.user),
            profile: non_empty("JUDGE_ENTRY_PROFILE").map(PathBuf::from),
            pip: non_empty("JUDGE_ENTRY_PIP").unwrap_or(defaults.pip),
            python: non_empty("JUDGE_ENTRY_PYTHON").unwrap_or(defaults.python),
            skip_install: flag("JUDGE_ENTRY_SKIP_INSTALL"),
            no_exec: flag("JUDGE_ENTRY_NO_EXEC"),
            dry_run: flag("JUDGE_ENTRY_DRY_RUN"),
            debug: flag("JUDGE_ENTRY_DEBUG"),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !is_valid_username(&self.user) {
            return Err(EntrypointError::Config(format!(
                "\"{}\" is not a valid user name",
                self.user
            )));
        }
        if self.user == "root" {
            return Err(EntrypointError::Config(
                "refusing to run the judge as root".to_string(),
            ));
        }
        if self.pip.trim().is_empty() || self.python.trim().is_empty() {
            return Err(EntrypointError::Config(
                "installer and interpreter names must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Check a name against useradd's portable naming rule
pub fn is_valid_username(name: &str) -> bool {
    name.len() <= USERNAME_MAX_LEN
        && regex::Regex::new(USERNAME_REGEX)
            .map(|re| re.is_match(name))
            .unwrap_or(false)
}
