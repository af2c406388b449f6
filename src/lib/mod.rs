//! judge-entrypoint library
//!
//! Bootstraps the judge container: normalizes the environment, installs
//! the package, picks the target for a mode keyword and launches it as
//! the unprivileged service account.

pub mod config;
pub mod dispatcher;
pub mod environment;
pub mod error;
pub mod identity;
pub mod installer;
pub mod launcher;
pub mod mode;
pub mod profile;
pub mod signal_handler;

// Re-export commonly used items
pub use config::{is_valid_username, EntrypointConfig, DEFAULT_ROOT, DEFAULT_USER};
pub use dispatcher::{Dispatcher, SystemDispatcher};
pub use environment::{ProcessEnvironment, CORE_KEYS};
pub use error::{EntrypointError, Result};
pub use identity::{is_privileged, parse_passwd_entry, Identity};
pub use installer::{Installer, PipInstaller};
pub use launcher::{exit_code_of, Invocation, LaunchStrategy, Launcher, RunuserLauncher};
pub use mode::{split_mode, usage, Mode, TargetCommand, VALID_MODES};
pub use profile::{parse_env_dump, ProfileLoader, ShellProfileLoader};
