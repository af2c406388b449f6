//! Mode keywords and their target commands
//!
//! The first positional argument selects one of three fixed programs:
//! run   -> the judge service
//! cli   -> the administrative client
//! test  -> the test suite under the interpreter

use std::ffi::OsString;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::EntrypointError;

/// Valid mode keywords, in usage order
pub const VALID_MODES: [&str; 3] = ["run", "cli", "test"];

/// One-line diagnostic printed for an unknown mode
pub fn usage() -> String {
    format!("Invalid command, must be one of [{}]", VALID_MODES.join(", "))
}

/// Judge service executable
pub const JUDGE_PROGRAM: &str = "dmoj";

/// Administrative client executable
pub const CLI_PROGRAM: &str = "dmoj-cli";

/// Module run by the interpreter in test mode
pub const TESTSUITE_MODULE: &str = "dmoj.testsuite";

/// Fixed argument the test suite module expects first
pub const TESTSUITE_TARGET: &str = "testsuite";

/// Operating mode selected by the first argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Run,
    Cli,
    Test,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Run => "run",
            Mode::Cli => "cli",
            Mode::Test => "test",
        }
    }

    /// Resolve the program and fixed arguments for this mode.
    /// `python` is only used by `test`.
    pub fn target(&self, python: &str) -> TargetCommand {
        match self {
            Mode::Run => TargetCommand::new(JUDGE_PROGRAM, &[]),
            Mode::Cli => TargetCommand::new(CLI_PROGRAM, &[]),
            Mode::Test => {
                TargetCommand::new(python, &["-m", TESTSUITE_MODULE, TESTSUITE_TARGET])
            }
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = EntrypointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "run" => Ok(Mode::Run),
            "cli" => Ok(Mode::Cli),
            "test" => Ok(Mode::Test),
            other => Err(EntrypointError::Usage {
                keyword: Some(other.to_string()),
            }),
        }
    }
}

/// Program plus the arguments always passed before the user's
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetCommand {
    pub program: String,
    pub fixed_args: Vec<String>,
}

impl TargetCommand {
    fn new(program: &str, fixed_args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            fixed_args: fixed_args.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Split raw arguments into the mode and the untouched tail.
///
/// Matching is exact and case-sensitive; a missing or non-UTF-8 keyword
/// is a usage error just like an unknown one. The tail is never decoded.
pub fn split_mode(args: &[OsString]) -> Result<(Mode, Vec<OsString>), EntrypointError> {
    let (keyword, tail) = args
        .split_first()
        .ok_or(EntrypointError::Usage { keyword: None })?;
    let mode = match keyword.to_str() {
        Some(keyword) => keyword.parse::<Mode>()?,
        None => {
            return Err(EntrypointError::Usage {
                keyword: Some(keyword.to_string_lossy().into_owned()),
            })
        }
    };
    Ok((mode, tail.to_vec()))
}
