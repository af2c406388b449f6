//! Integration tests for the bootstrap sequence.
//!
//! The installer, profile loader and launcher are replaced by recording
//! doubles so the sequence can be checked without root.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

use judge_entrypoint::{
    Dispatcher, EntrypointConfig, EntrypointError, Identity, Installer, Invocation, Launcher,
    Mode, ProcessEnvironment, ProfileLoader, Result, CORE_KEYS, usage,
};

fn to_os_vec(strs: &[&str]) -> Vec<OsString> {
    strs.iter().map(OsString::from).collect()
}

fn env_str<'a>(inv: &'a Invocation, key: &str) -> Option<&'a str> {
    inv.env.get(key).and_then(OsStr::to_str)
}

#[derive(Default)]
struct RecordingInstaller {
    runs: Cell<usize>,
    seen_env: RefCell<Option<ProcessEnvironment>>,
    fail_with: Option<i32>,
}

impl Installer for RecordingInstaller {
    fn install(&self, _root: &Path, env: &ProcessEnvironment) -> Result<()> {
        self.runs.set(self.runs.get() + 1);
        *self.seen_env.borrow_mut() = Some(env.clone());
        match self.fail_with {
            Some(code) => Err(EntrypointError::InstallFailed { code: Some(code) }),
            None => Ok(()),
        }
    }
}

#[derive(Default)]
struct StaticProfile {
    vars: BTreeMap<OsString, OsString>,
    loaded: RefCell<Vec<PathBuf>>,
}

impl StaticProfile {
    fn with(pairs: &[(&str, &str)]) -> Self {
        Self {
            vars: pairs
                .iter()
                .map(|(k, v)| (OsString::from(k), OsString::from(v)))
                .collect(),
            ..Default::default()
        }
    }
}

impl ProfileLoader for StaticProfile {
    fn load(
        &self,
        profile: &Path,
        _identity: &Identity,
        _base: &ProcessEnvironment,
        _working_dir: &Path,
    ) -> Result<BTreeMap<OsString, OsString>> {
        self.loaded.borrow_mut().push(profile.to_path_buf());
        Ok(self.vars.clone())
    }
}

#[derive(Default)]
struct RecordingLauncher {
    launched: RefCell<Vec<Invocation>>,
    exit_code: i32,
}

impl Launcher for RecordingLauncher {
    fn launch(&self, invocation: &Invocation) -> Result<i32> {
        self.launched.borrow_mut().push(invocation.clone());
        Ok(self.exit_code)
    }
}

fn judge_identity() -> Identity {
    Identity {
        name: "judge".to_string(),
        home: PathBuf::from("/home/judge"),
    }
}

type TestDispatcher = Dispatcher<RecordingInstaller, StaticProfile, RecordingLauncher>;

fn dispatcher_in(root: &Path, installer: RecordingInstaller, profile: StaticProfile) -> TestDispatcher {
    let config = EntrypointConfig {
        root: root.to_path_buf(),
        ..EntrypointConfig::default()
    };
    Dispatcher::new(
        config,
        [("PATH", "/usr/bin:/bin"), ("LANG", "en_US.ISO-8859-1")],
        installer,
        profile,
        RecordingLauncher::default(),
    )
    .with_identity(judge_identity())
}

fn dispatcher(root: &Path) -> TestDispatcher {
    dispatcher_in(root, RecordingInstaller::default(), StaticProfile::default())
}

fn launched_once(dispatcher: &TestDispatcher, args: &[&str]) -> Invocation {
    assert_eq!(dispatcher.dispatch(&to_os_vec(args)).unwrap(), 0);
    let launched = dispatcher.launcher().launched.borrow();
    assert_eq!(launched.len(), 1);
    launched[0].clone()
}

mod mode_dispatch_tests {
    use super::*;

    #[test]
    fn test_run_forwards_tail_verbatim() {
        let root = tempfile::tempdir().unwrap();
        let d = dispatcher(root.path());
        let inv = launched_once(&d, &["run", "-v", "--port", "5000"]);
        assert_eq!(inv.mode, Mode::Run);
        assert_eq!(inv.user, "judge");
        assert_eq!(inv.argv(), vec!["dmoj", "-v", "--port", "5000"]);
    }

    #[test]
    fn test_cli_without_arguments() {
        let root = tempfile::tempdir().unwrap();
        let d = dispatcher(root.path());
        let inv = launched_once(&d, &["cli"]);
        assert_eq!(inv.program, "dmoj-cli");
        assert!(inv.args.is_empty());
    }

    #[test]
    fn test_test_mode_prepends_testsuite_target() {
        let root = tempfile::tempdir().unwrap();
        let d = dispatcher(root.path());
        let inv = launched_once(&d, &["test", "mypackage"]);
        assert_eq!(
            inv.argv(),
            vec!["python3", "-m", "dmoj.testsuite", "testsuite", "mypackage"]
        );
    }

    #[test]
    fn test_tail_order_and_bytes_preserved() {
        let root = tempfile::tempdir().unwrap();
        let d = dispatcher(root.path());
        let tail = ["--", "-u", "root", "two  spaces", "", "ünïcode", "run", "$HOME", "*"];
        let mut args = vec!["run"];
        args.extend(tail);
        let inv = launched_once(&d, &args);
        assert_eq!(inv.args, to_os_vec(&tail));
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_tail_is_forwarded_byte_for_byte() {
        use std::os::unix::ffi::OsStrExt;

        let root = tempfile::tempdir().unwrap();
        let d = dispatcher(root.path());
        let args = vec![
            OsString::from("run"),
            OsStr::from_bytes(b"caf\xe9").to_os_string(),
        ];
        d.dispatch(&args).unwrap();
        let launched = d.launcher().launched.borrow();
        assert_eq!(launched[0].args[0].as_bytes(), b"caf\xe9");
    }

    #[test]
    fn test_launcher_exit_code_is_reported() {
        let root = tempfile::tempdir().unwrap();
        let config = EntrypointConfig {
            root: root.path().to_path_buf(),
            ..EntrypointConfig::default()
        };
        let launcher = RecordingLauncher {
            exit_code: 3,
            ..Default::default()
        };
        let d = Dispatcher::new(
            config,
            std::iter::empty::<(String, String)>(),
            RecordingInstaller::default(),
            StaticProfile::default(),
            launcher,
        )
        .with_identity(judge_identity());
        assert_eq!(d.dispatch(&to_os_vec(&["cli"])).unwrap(), 3);
    }

    #[test]
    fn test_working_dir_is_the_root() {
        let root = tempfile::tempdir().unwrap();
        let d = dispatcher(root.path());
        let inv = launched_once(&d, &["run"]);
        assert_eq!(inv.working_dir, root.path().canonicalize().unwrap());
    }
}

mod usage_error_tests {
    use super::*;

    #[test]
    fn test_unknown_mode_is_usage_error_without_launch() {
        for keyword in ["serve", "", "RUN", "--help"] {
            let root = tempfile::tempdir().unwrap();
            let d = dispatcher(root.path());
            let err = d.dispatch(&to_os_vec(&[keyword, "x"])).unwrap_err();
            assert!(err.is_usage(), "'{}' should be a usage error", keyword);
            assert_eq!(err.exit_code(), 1);
            assert_eq!(err.to_string(), usage());
            assert!(d.launcher().launched.borrow().is_empty());
        }
    }

    #[test]
    fn test_no_arguments_is_usage_error() {
        let root = tempfile::tempdir().unwrap();
        let d = dispatcher(root.path());
        let err = d.dispatch(&[]).unwrap_err();
        assert!(err.is_usage());
        assert!(d.launcher().launched.borrow().is_empty());
    }

    #[test]
    fn test_environment_normalized_on_usage_error_path() {
        let root = tempfile::tempdir().unwrap();
        let d = dispatcher(root.path());
        let err = d.dispatch(&to_os_vec(&["bogus"])).unwrap_err();
        assert!(err.is_usage());
        assert!(d.environment().has_core_keys());
        // The installer already ran with the normalized environment
        let seen = d.installer_env();
        assert!(seen.has_core_keys());
    }
}

mod environment_tests {
    use super::*;

    #[test]
    fn test_core_keys_in_every_mode() {
        for mode in ["run", "cli", "test"] {
            let root = tempfile::tempdir().unwrap();
            let d = dispatcher(root.path());
            let inv = launched_once(&d, &[mode]);
            for (key, value) in CORE_KEYS {
                assert_eq!(env_str(&inv, key), Some(value), "{} in mode {}", key, mode);
            }
        }
    }

    #[test]
    fn test_profile_defaults_merge_under_core_keys() {
        let root = tempfile::tempdir().unwrap();
        let profile = StaticProfile::with(&[
            ("PATH", "/home/judge/.local/bin:/usr/bin:/bin"),
            ("LANG", "C"),
            ("HOME", "/home/judge"),
        ]);
        let d = dispatcher_in(root.path(), RecordingInstaller::default(), profile);
        let inv = launched_once(&d, &["run"]);
        assert_eq!(env_str(&inv, "PATH"), Some("/home/judge/.local/bin:/usr/bin:/bin"));
        assert_eq!(env_str(&inv, "HOME"), Some("/home/judge"));
        assert_eq!(env_str(&inv, "LANG"), Some("C.UTF-8"));
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_inherited_variable_survives() {
        use std::os::unix::ffi::OsStrExt;

        let root = tempfile::tempdir().unwrap();
        let config = EntrypointConfig {
            root: root.path().to_path_buf(),
            ..EntrypointConfig::default()
        };
        let inherited = vec![
            (OsString::from("PATH"), OsString::from("/usr/bin:/bin")),
            (
                OsString::from("SOME_VAR"),
                OsStr::from_bytes(b"\xff").to_os_string(),
            ),
        ];
        let d = Dispatcher::new(
            config,
            inherited,
            RecordingInstaller::default(),
            StaticProfile::default(),
            RecordingLauncher::default(),
        )
        .with_identity(judge_identity());
        assert!(d.environment().has_core_keys());
        let inv = launched_once(&d, &["run"]);
        assert_eq!(inv.env.get("SOME_VAR").map(OsStr::as_bytes), Some(&b"\xff"[..]));
    }

    #[test]
    fn test_relative_profile_is_taken_from_the_root() {
        let root = tempfile::tempdir().unwrap();
        let config = EntrypointConfig {
            root: root.path().to_path_buf(),
            profile: Some(PathBuf::from("judge.profile")),
            ..EntrypointConfig::default()
        };
        let d = Dispatcher::new(
            config,
            std::iter::empty::<(String, String)>(),
            RecordingInstaller::default(),
            StaticProfile::default(),
            RecordingLauncher::default(),
        )
        .with_identity(judge_identity());
        launched_once(&d, &["run"]);
        assert_eq!(
            d.profile_loads(),
            vec![root.path().canonicalize().unwrap().join("judge.profile")]
        );
    }

    #[test]
    fn test_default_profile_is_in_account_home() {
        let root = tempfile::tempdir().unwrap();
        let d = dispatcher(root.path());
        launched_once(&d, &["cli"]);
        assert_eq!(
            d.profile_loads(),
            vec![PathBuf::from("/home/judge/.profile")]
        );
    }
}

mod failure_tests {
    use super::*;

    #[test]
    fn test_missing_root_aborts_before_install() {
        let root = tempfile::tempdir().unwrap();
        let missing = root.path().join("nope");
        let d = dispatcher(&missing);
        let err = d.dispatch(&to_os_vec(&["run"])).unwrap_err();
        assert!(matches!(err, EntrypointError::WorkingRoot { .. }));
        assert_eq!(d.installer_runs(), 0);
        assert!(d.launcher().launched.borrow().is_empty());
    }

    #[test]
    fn test_root_that_is_a_file_aborts() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let d = dispatcher(file.path());
        let err = d.dispatch(&to_os_vec(&["run"])).unwrap_err();
        assert!(matches!(err, EntrypointError::WorkingRoot { .. }));
    }

    #[test]
    fn test_install_failure_is_fatal() {
        let root = tempfile::tempdir().unwrap();
        let installer = RecordingInstaller {
            fail_with: Some(2),
            ..Default::default()
        };
        let d = dispatcher_in(root.path(), installer, StaticProfile::default());
        let err = d.dispatch(&to_os_vec(&["run"])).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(d.profile_loads().is_empty());
        assert!(d.launcher().launched.borrow().is_empty());
    }

    #[test]
    fn test_skip_install() {
        let root = tempfile::tempdir().unwrap();
        let config = EntrypointConfig {
            root: root.path().to_path_buf(),
            skip_install: true,
            ..EntrypointConfig::default()
        };
        let d = Dispatcher::new(
            config,
            std::iter::empty::<(String, String)>(),
            RecordingInstaller::default(),
            StaticProfile::default(),
            RecordingLauncher::default(),
        )
        .with_identity(judge_identity());
        launched_once(&d, &["run"]);
        assert_eq!(d.installer_runs(), 0);
    }
}

mod idempotence_tests {
    use super::*;

    #[test]
    fn test_repeated_resolution_is_identical() {
        let root = tempfile::tempdir().unwrap();
        let d = dispatcher(root.path());
        let args = to_os_vec(&["test", "mypackage", "--verbose"]);
        let first = d.resolve(&args).unwrap();
        let second = d.resolve(&args).unwrap();
        assert_eq!(first, second);
        assert_eq!(d.installer_runs(), 2);
    }
}

/// Accessors for the recording doubles
trait Recorded {
    fn installer_runs(&self) -> usize;
    fn installer_env(&self) -> ProcessEnvironment;
    fn profile_loads(&self) -> Vec<PathBuf>;
}

impl Recorded for TestDispatcher {
    fn installer_runs(&self) -> usize {
        self.installer().runs.get()
    }

    fn installer_env(&self) -> ProcessEnvironment {
        self.installer()
            .seen_env
            .borrow()
            .clone()
            .unwrap_or_default()
    }

    fn profile_loads(&self) -> Vec<PathBuf> {
        self.profiles().loaded.borrow().clone()
    }
}
