//! Error types for the entrypoint
//!
//! Every failure is terminal. Each variant knows the exit status the
//! container should report for it.

use std::io;
use std::path::PathBuf;

use crate::mode::usage;

/// A terminal failure of the bootstrap sequence
#[derive(Debug, thiserror::Error)]
pub enum EntrypointError {
    /// Invalid `JUDGE_ENTRY_*` settings
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The install root is missing or not a directory
    #[error("Cannot enter working root {}: {source}", path.display())]
    WorkingRoot {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Mode keyword not in the fixed set
    #[error("{}", usage())]
    Usage { keyword: Option<String> },

    /// The installer could not be started
    #[error("Failed to start installer \"{program}\": {source}")]
    InstallerSpawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// The installer ran and reported failure
    #[error("Package installation failed with exit code {}", display_code(*code))]
    InstallFailed { code: Option<i32> },

    /// The passwd database could not be queried
    #[error("Failed to query the passwd database with \"{program}\": {source}")]
    AccountLookup {
        program: String,
        #[source]
        source: io::Error,
    },

    /// The service account is not in the passwd database
    #[error("Unknown user \"{0}\"")]
    UnknownUser(String),

    /// The profile file does not exist or cannot be read
    #[error("Cannot read profile {}: {source}", path.display())]
    ProfileMissing {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Sourcing the profile failed
    #[error("Failed to source profile {}: {reason}", path.display())]
    ProfileSourcing { path: PathBuf, reason: String },

    /// The identity switch or the process replacement failed
    #[error("Failed to launch \"{program}\": {source}")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },
}

impl EntrypointError {
    /// Exit status reported when this error ends the entrypoint
    pub fn exit_code(&self) -> i32 {
        match self {
            EntrypointError::InstallFailed { code: Some(code) } if *code != 0 => *code,
            EntrypointError::Launch { source, .. } => match source.kind() {
                io::ErrorKind::NotFound => 127,
                io::ErrorKind::PermissionDenied => 126,
                _ => 1,
            },
            _ => 1,
        }
    }

    /// Whether this is the bad-mode-keyword case
    pub fn is_usage(&self) -> bool {
        matches!(self, EntrypointError::Usage { .. })
    }
}

fn display_code(code: Option<i32>) -> String {
    code.map(|c| c.to_string())
        .unwrap_or_else(|| "unknown (terminated by signal)".to_string())
}

pub type Result<T> = std::result::Result<T, EntrypointError>;
