//! Configuration loading for dunit-launcher.
//!
//! Configuration is loaded from a TOML file. Every field has a default, so
//! an empty file (or [`LauncherConfig::default`]) starts one host with four
//! workers.

use dunit_types::PropertyMap;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable that overrides where the worker binary is found.
pub const ENV_WORKER_BINARY: &str = "DUNIT_WORKER_BINARY";

/// Name of the stock worker binary.
pub const DEFAULT_WORKER_BINARY: &str = "dunit-worker";

/// Root configuration for a harness run.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LauncherConfig {
    /// How many workers to start and where.
    #[serde(default)]
    pub topology: TopologyConfig,
    /// Locator service configuration.
    #[serde(default)]
    pub locator: LocatorConfig,
    /// Timeouts and the bounce policy.
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    /// Distributed system properties handed to every worker.
    #[serde(default)]
    pub properties: PropertyMap,
}

/// Worker topology.
#[derive(Debug, Clone, Deserialize)]
pub struct TopologyConfig {
    /// Number of logical hosts (default: 1).
    #[serde(default = "default_hosts")]
    pub hosts: usize,
    /// Workers per host (default: 4).
    #[serde(default = "default_vms_per_host")]
    pub vms_per_host: usize,
    /// Worker binary. Falls back to `DUNIT_WORKER_BINARY`, then to
    /// `dunit-worker` next to the current executable.
    pub worker_binary: Option<PathBuf>,
    /// Directory holding one `vm<id>` working directory per worker.
    /// Defaults to a fresh `dunit-<uuid>` directory under the system temp dir.
    pub base_dir: Option<PathBuf>,
}

/// Locator service configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LocatorConfig {
    /// Address the locator and the handshake hub bind to (default: 127.0.0.1).
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Locator port (default: 0 = pick a free port).
    #[serde(default)]
    pub port: u16,
}

/// What an invocation does when it finds its VM bouncing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BouncePolicy {
    /// Block until the VM is RUNNING or DEAD, bounded by the invoke timeout.
    #[default]
    Wait,
    /// Fail immediately with `Bouncing`.
    Fail,
}

/// Timeouts, all in milliseconds.
#[derive(Debug, Clone, Deserialize)]
pub struct TimeoutConfig {
    /// Default invocation timeout (default: 60s).
    #[serde(default = "default_invoke_ms")]
    pub invoke_ms: u64,
    /// Time allowed for all workers to complete their handshake at launch (default: 30s).
    #[serde(default = "default_startup_ms")]
    pub startup_ms: u64,
    /// Time allowed for a terminated worker to exit (default: 10s).
    #[serde(default = "default_exit_ms")]
    pub exit_ms: u64,
    /// Time allowed for a replacement worker to complete its handshake (default: 30s).
    #[serde(default = "default_restart_ms")]
    pub restart_ms: u64,
    /// Invocations issued while a VM is bouncing (default: wait).
    #[serde(default)]
    pub invoke_during_bounce: BouncePolicy,
}

// Default value functions
fn default_hosts() -> usize {
    1
}

fn default_vms_per_host() -> usize {
    4
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_invoke_ms() -> u64 {
    60_000
}

fn default_startup_ms() -> u64 {
    30_000
}

fn default_exit_ms() -> u64 {
    10_000
}

fn default_restart_ms() -> u64 {
    30_000
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            hosts: default_hosts(),
            vms_per_host: default_vms_per_host(),
            worker_binary: None,
            base_dir: None,
        }
    }
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: 0,
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            invoke_ms: default_invoke_ms(),
            startup_ms: default_startup_ms(),
            exit_ms: default_exit_ms(),
            restart_ms: default_restart_ms(),
            invoke_during_bounce: BouncePolicy::default(),
        }
    }
}

impl TimeoutConfig {
    /// Default invocation timeout.
    pub fn invoke(&self) -> Duration {
        Duration::from_millis(self.invoke_ms)
    }

    /// Launch handshake timeout.
    pub fn startup(&self) -> Duration {
        Duration::from_millis(self.startup_ms)
    }

    /// Exit wait after the termination signal.
    pub fn exit(&self) -> Duration {
        Duration::from_millis(self.exit_ms)
    }

    /// Handshake wait for a replacement process.
    pub fn restart(&self) -> Duration {
        Duration::from_millis(self.restart_ms)
    }
}

impl TopologyConfig {
    /// Total number of workers across all hosts.
    pub fn total_vms(&self) -> usize {
        self.hosts * self.vms_per_host
    }

    /// Locate the worker binary.
    pub fn resolve_worker_binary(&self) -> Result<PathBuf, ConfigError> {
        let mut candidates = Vec::new();

        if let Some(path) = &self.worker_binary {
            candidates.push(path.clone());
        } else if let Some(path) = std::env::var_os(ENV_WORKER_BINARY) {
            candidates.push(PathBuf::from(path));
        } else if let Ok(exe) = std::env::current_exe() {
            // Test executables live one level down, in target/<profile>/deps
            for dir in exe.ancestors().skip(1).take(2) {
                candidates.push(dir.join(DEFAULT_WORKER_BINARY));
            }
        }

        if let Some(found) = candidates.iter().find(|path| path.is_file()).cloned() {
            return Ok(found);
        }
        Err(ConfigError::WorkerBinaryNotFound {
            searched: candidates,
        })
    }
}

impl LauncherConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or describes
    /// an empty topology.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check the topology makes sense.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.topology.hosts == 0 {
            return Err(ConfigError::InvalidTopology(
                "at least one host is required".into(),
            ));
        }
        if i32::try_from(self.topology.total_vms()).is_err() {
            return Err(ConfigError::InvalidTopology(format!(
                "{} workers is more than VmId can number",
                self.topology.total_vms()
            )));
        }
        Ok(())
    }

    /// Convenience for tests: set the host and worker counts.
    pub fn with_topology(mut self, hosts: usize, vms_per_host: usize) -> Self {
        self.topology.hosts = hosts;
        self.topology.vms_per_host = vms_per_host;
        self
    }

    /// Convenience for tests: use a specific worker binary.
    pub fn with_worker_binary(mut self, path: impl Into<PathBuf>) -> Self {
        self.topology.worker_binary = Some(path.into());
        self
    }

    /// Convenience for tests: put working directories under `dir`.
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.topology.base_dir = Some(dir.into());
        self
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
    /// The topology cannot be started.
    #[error("invalid topology: {0}")]
    InvalidTopology(String),
    /// No worker binary at any of the searched locations.
    #[error("worker binary not found (searched {searched:?})")]
    WorkerBinaryNotFound {
        /// Paths that were tried.
        searched: Vec<PathBuf>,
    },
}
