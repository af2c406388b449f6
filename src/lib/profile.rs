//! Profile re-initialization
//!
//! Sources the service account's shell profile in a throwaway shell and
//! captures the environment it leaves behind, so the target command sees
//! what an interactive login as that account would.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs;
use std::path::Path;
use std::process::{Command, Stdio};

use tracing::debug;

use crate::environment::ProcessEnvironment;
use crate::error::{EntrypointError, Result};
use crate::identity::Identity;

/// Source `$1` quietly, then dump the environment NUL-separated.
/// The profile's own exit status is ignored, as a login shell would.
const SOURCE_SCRIPT: &str = r#". "$1" >/dev/null 2>&1; exec env -0"#;

const SHELL: &str = "sh";

/// Produces the environment defaults declared by an account's profile
pub trait ProfileLoader {
    fn load(
        &self,
        profile: &Path,
        identity: &Identity,
        base: &ProcessEnvironment,
        working_dir: &Path,
    ) -> Result<BTreeMap<OsString, OsString>>;
}

/// Loads a profile by sourcing it in a POSIX shell
#[derive(Debug, Clone, Default)]
pub struct ShellProfileLoader {
    /// When set, the shell runs as the account through this program
    switch_program: Option<String>,
}

impl ShellProfileLoader {
    /// Source the profile with the account's own privileges, through
    /// `<switch_program> -u <user> -- sh ...`
    pub fn as_account(switch_program: impl Into<String>) -> Self {
        Self {
            switch_program: Some(switch_program.into()),
        }
    }

    pub fn command(
        &self,
        profile: &Path,
        identity: &Identity,
        base: &ProcessEnvironment,
        working_dir: &Path,
    ) -> Command {
        let mut cmd = match &self.switch_program {
            Some(switch) => {
                let mut cmd = Command::new(switch);
                cmd.args(["-u", identity.name.as_str(), "--", SHELL]);
                cmd
            }
            None => Command::new(SHELL),
        };
        cmd.args(["-c", SOURCE_SCRIPT, SHELL])
            .arg(profile)
            .env_clear()
            .envs(base.iter())
            .env("HOME", &identity.home)
            .env("USER", &identity.name)
            .env("LOGNAME", &identity.name)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stderr(Stdio::inherit());
        cmd
    }
}

impl ProfileLoader for ShellProfileLoader {
    fn load(
        &self,
        profile: &Path,
        identity: &Identity,
        base: &ProcessEnvironment,
        working_dir: &Path,
    ) -> Result<BTreeMap<OsString, OsString>> {
        let metadata = fs::metadata(profile).map_err(|source| EntrypointError::ProfileMissing {
            path: profile.to_path_buf(),
            source,
        })?;
        if !metadata.is_file() {
            return Err(EntrypointError::ProfileSourcing {
                path: profile.to_path_buf(),
                reason: "not a regular file".to_string(),
            });
        }

        let mut cmd = self.command(profile, identity, base, working_dir);
        debug!(
            profile = %profile.display(),
            user = %identity.name,
            switched = self.switch_program.is_some(),
            "sourcing profile"
        );

        let output = cmd.output().map_err(|e| EntrypointError::ProfileSourcing {
            path: profile.to_path_buf(),
            reason: format!("cannot start {:?}: {}", cmd.get_program(), e),
        })?;

        if !output.status.success() {
            return Err(EntrypointError::ProfileSourcing {
                path: profile.to_path_buf(),
                reason: format!(
                    "shell exited with {}",
                    output
                        .status
                        .code()
                        .map(|c| c.to_string())
                        .unwrap_or_else(|| "a signal".to_string())
                ),
            });
        }

        let vars = parse_env_dump(&output.stdout);
        if vars.is_empty() {
            // The profile called `exit` before the dump ran
            return Err(EntrypointError::ProfileSourcing {
                path: profile.to_path_buf(),
                reason: "profile produced no environment".to_string(),
            });
        }

        debug!(count = vars.len(), "profile environment captured");
        Ok(vars)
    }
}

/// Parse `env -0` output into a map. Entries without `=` are skipped.
/// Names and values keep their exact bytes.
pub fn parse_env_dump(dump: &[u8]) -> BTreeMap<OsString, OsString> {
    dump.split(|b| *b == 0)
        .filter_map(|entry| {
            let split = entry.iter().position(|b| *b == b'=')?;
            if split == 0 {
                return None;
            }
            Some((os_from_bytes(&entry[..split]), os_from_bytes(&entry[split + 1..])))
        })
        .collect()
}

#[cfg(unix)]
fn os_from_bytes(bytes: &[u8]) -> OsString {
    use std::os::unix::ffi::OsStringExt;
    OsString::from_vec(bytes.to_vec())
}

#[cfg(not(unix))]
fn os_from_bytes(bytes: &[u8]) -> OsString {
    String::from_utf8_lossy(bytes).into_owned().into()
}
