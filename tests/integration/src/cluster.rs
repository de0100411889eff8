//! Launching a run of integration workers in a scratch directory.

use anyhow::{Context, Result};
use dunit_launcher::{Harness, Launcher, LauncherConfig};
use std::ops::Deref;
use std::path::PathBuf;
use tempfile::TempDir;

/// Invocation timeout used by the scenarios.
pub const INVOKE_MS: u64 = 30_000;
/// Grace period for a worker to exit.
pub const EXIT_MS: u64 = 5_000;

/// Config for `hosts` x `vms_per_host` workers running `worker_binary`.
pub fn config(
    worker_binary: impl Into<PathBuf>,
    hosts: usize,
    vms_per_host: usize,
) -> LauncherConfig {
    let mut config = LauncherConfig::default()
        .with_topology(hosts, vms_per_host)
        .with_worker_binary(worker_binary);
    config.timeouts.invoke_ms = INVOKE_MS;
    config.timeouts.exit_ms = EXIT_MS;
    config
}

/// A launched harness plus the directory its workers live in.
///
/// Derefs to [`Harness`]. Dropping it kills the workers and removes the
/// directory.
#[derive(Debug)]
pub struct TestCluster {
    harness: Harness,
    dir: TempDir,
}

impl TestCluster {
    /// Launch `config` with a fresh base directory.
    pub async fn launch(config: LauncherConfig) -> Result<Self> {
        let dir = tempfile::tempdir().context("creating base directory")?;
        let harness = Launcher::new(config.with_base_dir(dir.path()))
            .launch()
            .await
            .context("launching workers")?;
        Ok(Self { harness, dir })
    }

    /// Shut the workers down cleanly. The directory is handed back so logs
    /// can still be read.
    pub async fn shutdown(self) -> TempDir {
        self.harness.shutdown().await;
        self.dir
    }
}

impl Deref for TestCluster {
    type Target = Harness;

    fn deref(&self) -> &Harness {
        &self.harness
    }
}
