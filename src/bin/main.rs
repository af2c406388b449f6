//! judge-entrypoint CLI
//!
//! `entrypoint <run|cli|test> [args...]`
//!
//! Prepares the container and replaces itself with the judge service,
//! the admin client or the test suite, running as the service account.

use std::env;
use std::ffi::OsString;
use std::process;

use tracing::debug;
use tracing_subscriber::EnvFilter;

use judge_entrypoint::{EntrypointConfig, EntrypointError, SystemDispatcher};

fn init_logging(config: &EntrypointConfig) {
    let default_filter = if config.debug {
        "judge_entrypoint=debug"
    } else {
        "judge_entrypoint=warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let config = EntrypointConfig::from_env();
    init_logging(&config);

    // Normalize the environment before the arguments are looked at
    let dispatcher = SystemDispatcher::from_config(config);
    let args: Vec<OsString> = env::args_os().skip(1).collect();

    if let Err(e) = dispatcher.config().validate() {
        fail(e);
    }

    if dispatcher.config().dry_run {
        match dispatcher.resolve(&args) {
            Ok(invocation) => match serde_json::to_string_pretty(&invocation) {
                Ok(json) => {
                    println!("{}", json);
                    process::exit(0);
                }
                Err(e) => {
                    eprintln!("Error: {}", e);
                    process::exit(1);
                }
            },
            Err(e) => fail(e),
        }
    }

    match dispatcher.dispatch(&args) {
        Ok(code) => process::exit(code),
        Err(e) => fail(e),
    }
}

fn fail(e: EntrypointError) -> ! {
    if e.is_usage() {
        eprintln!("{}", e);
    } else {
        debug!(error = ?e, "entrypoint failed");
        eprintln!("Error: {}", e);
    }
    process::exit(e.exit_code());
}
