//! Tracing subscriber configuration for the controller runtime.
//!
//! Log levels follow these conventions:
//! - ERROR: the runtime cannot continue
//! - WARN: exhausted retries, aborted replays, dropped notifications
//! - INFO: completed operations (node added, routes assigned, replay done)
//! - DEBUG: state machine transitions and rejected operations
//! - TRACE: every frame received and every transmit status

use tracing_subscriber::EnvFilter;

use crate::config::LoggingSection;

fn filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Initialize the tracing subscriber with human-readable output.
///
/// Log level can be controlled via the `RUST_LOG` environment variable.
/// Defaults to `info` if not set.
pub fn init() {
    tracing_subscriber::fmt().with_env_filter(filter("info")).init();
}

/// Initialize the tracing subscriber with JSON output.
pub fn init_json() {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter("info"))
        .init();
}

/// Pick the output format from `RUST_LOG_FORMAT` (`json` or anything else).
pub fn init_from_env() {
    match std::env::var("RUST_LOG_FORMAT").as_deref() {
        Ok("json") => init_json(),
        _ => init(),
    }
}

/// Initialize from the `[logging]` section; `RUST_LOG` still wins when set.
pub fn init_from_config(logging: &LoggingSection) {
    let filter = filter(&logging.level);
    if logging.json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Initialize the tracing subscriber for tests.
///
/// Uses `try_init` so repeated calls are harmless.
pub fn init_for_tests() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter("debug"))
        .with_test_writer()
        .try_init();
}
