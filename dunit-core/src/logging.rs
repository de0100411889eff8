//! Tracing setup driven by the `log-level` property.
//!
//! Level names follow the distributed system's vocabulary
//! (`severe`, `warning`, `config`, `fine`, ...) and are mapped onto tracing
//! levels. Plain tracing names (`warn`, `debug`, `trace`, ...) are accepted
//! too. `RUST_LOG`, when set, takes precedence.

use dunit_types::{keys, PropertyMap};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::merge::DEFAULT_LOG_LEVEL;

/// Map a log level name to a tracing level filter.
pub fn level_filter(level: &str) -> Option<LevelFilter> {
    let filter = match level.trim().to_ascii_lowercase().as_str() {
        "none" | "off" => LevelFilter::OFF,
        "severe" | "error" => LevelFilter::ERROR,
        "warning" | "warn" => LevelFilter::WARN,
        "info" | "config" => LevelFilter::INFO,
        "fine" | "debug" => LevelFilter::DEBUG,
        "finer" | "finest" | "all" | "trace" => LevelFilter::TRACE,
        _ => return None,
    };
    Some(filter)
}

/// Build the filter for a property map.
///
/// Unknown level names fall back to the default level.
pub fn env_filter(props: &PropertyMap) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    let level = props
        .get(keys::LOG_LEVEL)
        .map(|v| v.to_string())
        .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());

    let filter = level_filter(&level).unwrap_or(LevelFilter::INFO);
    EnvFilter::default().add_directive(filter.into())
}

/// Install a stderr tracing subscriber for `props`.
///
/// Returns false if a global subscriber was already installed.
pub fn init(props: &PropertyMap) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(props))
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}
