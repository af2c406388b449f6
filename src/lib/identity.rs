//! The unprivileged service account
//!
//! Resolved from the passwd database so the profile path and the
//! account's HOME are known before privileges are dropped.

use std::path::PathBuf;
use std::process::{Command, Stdio};

use crate::config::PROFILE_FILE_NAME;
use crate::error::{EntrypointError, Result};

const PASSWD_LOOKUP_PROGRAM: &str = "getent";

/// Account the target command runs as
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    pub home: PathBuf,
}

impl Identity {
    /// Look the account up with `getent passwd`
    pub fn lookup(name: &str) -> Result<Self> {
        lookup_with(PASSWD_LOOKUP_PROGRAM, name)
    }

    /// `<home>/.profile`
    pub fn default_profile(&self) -> PathBuf {
        self.home.join(PROFILE_FILE_NAME)
    }
}

fn lookup_with(program: &str, name: &str) -> Result<Identity> {
    let output = Command::new(program)
        .args(["passwd", name])
        .stderr(Stdio::null())
        .output()
        .map_err(|source| EntrypointError::AccountLookup {
            program: program.to_string(),
            source,
        })?;

    // getent exits 2 for a missing key
    if !output.status.success() {
        return Err(EntrypointError::UnknownUser(name.to_string()));
    }

    let line = String::from_utf8_lossy(&output.stdout);
    parse_passwd_entry(line.trim())
        .filter(|identity| identity.name == name)
        .ok_or_else(|| EntrypointError::UnknownUser(name.to_string()))
}

/// Parse one `name:passwd:uid:gid:gecos:home:shell` line
pub fn parse_passwd_entry(line: &str) -> Option<Identity> {
    let parts: Vec<&str> = line.split(':').collect();
    if parts.len() < 7 || parts[0].is_empty() || parts[5].is_empty() {
        return None;
    }
    // uid and gid must be numeric for the entry to be well-formed
    parts[2].parse::<u32>().ok()?;
    parts[3].parse::<u32>().ok()?;
    Some(Identity {
        name: parts[0].to_string(),
        home: PathBuf::from(parts[5]),
    })
}

/// Whether the entrypoint itself runs with root privileges
#[cfg(unix)]
pub fn is_privileged() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail
    unsafe { libc::geteuid() == 0 }
}

#[cfg(not(unix))]
pub fn is_privileged() -> bool {
    false
}
