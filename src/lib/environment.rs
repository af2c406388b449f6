//! Normalized process environment
//!
//! The entrypoint never mutates its own environment. It builds one
//! `ProcessEnvironment` at startup and hands it to every child it starts.
//! Names and values are kept as raw OS strings; only the JSON dump is
//! lossy.

use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};

use serde::{Serialize, Serializer};

/// Marks execution inside the managed container
pub const IN_CONTAINER_KEY: &str = "DMOJ_IN_DOCKER";
/// Disables interpreter output buffering
pub const UNBUFFERED_KEY: &str = "PYTHONUNBUFFERED";
/// Locale for text handling
pub const LOCALE_KEY: &str = "LANG";
/// Encoding for stdio
pub const IO_ENCODING_KEY: &str = "PYTHONIOENCODING";

/// Keys the entrypoint always sets, with their values
pub const CORE_KEYS: [(&str, &str); 4] = [
    (IN_CONTAINER_KEY, "1"),
    (UNBUFFERED_KEY, "1"),
    (LOCALE_KEY, "C.UTF-8"),
    (IO_ENCODING_KEY, "utf8"),
];

/// Variables a sourcing shell sets for itself, not for the child
const SHELL_BOOKKEEPING: [&str; 4] = ["PWD", "OLDPWD", "SHLVL", "_"];

/// Name to value mapping handed to child processes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessEnvironment {
    vars: BTreeMap<OsString, OsString>,
}

impl ProcessEnvironment {
    /// Core keys only
    pub fn core() -> Self {
        Self::default().with_core_keys()
    }

    /// `inherited` overlaid with the core keys
    pub fn normalized<I, K, V>(inherited: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<OsString>,
        V: Into<OsString>,
    {
        <Self as FromIterator<(K, V)>>::from_iter(inherited).with_core_keys()
    }

    fn with_core_keys(mut self) -> Self {
        for (key, value) in CORE_KEYS {
            self.vars.insert(key.into(), value.into());
        }
        self
    }

    /// Merge `defaults` underneath this environment.
    ///
    /// Values from `defaults` replace inherited ones, but the core keys
    /// always keep their normalized values. Shell bookkeeping variables
    /// from `defaults` are dropped.
    pub fn merged_with_defaults(&self, defaults: &BTreeMap<OsString, OsString>) -> Self {
        let mut merged = self.clone();
        for (key, value) in defaults {
            if SHELL_BOOKKEEPING.iter().any(|k| key == k) {
                continue;
            }
            merged.vars.insert(key.clone(), value.clone());
        }
        merged.with_core_keys()
    }

    pub fn get(&self, key: impl AsRef<OsStr>) -> Option<&OsStr> {
        self.vars.get(key.as_ref()).map(OsString::as_os_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&OsStr, &OsStr)> {
        self.vars.iter().map(|(k, v)| (k.as_os_str(), v.as_os_str()))
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Whether every core key carries its normalized value
    pub fn has_core_keys(&self) -> bool {
        CORE_KEYS
            .iter()
            .all(|&(key, value)| self.get(key) == Some(OsStr::new(value)))
    }
}

impl<K: Into<OsString>, V: Into<OsString>> FromIterator<(K, V)> for ProcessEnvironment {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl Serialize for ProcessEnvironment {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(
            self.vars
                .iter()
                .map(|(k, v)| (k.to_string_lossy(), v.to_string_lossy())),
        )
    }
}
