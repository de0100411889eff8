//! Starting a worker: spawn the process and wait for its handshake.

use dunit_types::{DistributedSystemProperties, LocatorInfo, Pid, VmId};
use dunit_worker::WorkerArgs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use crate::channel::WorkerChannel;
use crate::hub::HandshakeHub;
use crate::process::WorkerProcess;
use crate::ProcessError;

/// A worker that completed its handshake.
#[derive(Debug)]
pub struct LiveWorker {
    /// The OS process.
    pub process: WorkerProcess,
    /// Invocation channel to it.
    pub channel: WorkerChannel,
    /// Pid the worker reported in its Hello.
    pub pid: Pid,
}

/// Everything needed to start a worker, shared by launch and bounce.
#[derive(Debug)]
pub struct Spawner {
    binary: PathBuf,
    hub: HandshakeHub,
    locator: LocatorInfo,
    properties: DistributedSystemProperties,
}

impl Spawner {
    /// Create a spawner.
    pub fn new(
        binary: PathBuf,
        hub: HandshakeHub,
        locator: LocatorInfo,
        properties: DistributedSystemProperties,
    ) -> Self {
        Self {
            binary,
            hub,
            locator,
            properties,
        }
    }

    /// The property snapshot every worker receives.
    pub fn properties(&self) -> &DistributedSystemProperties {
        &self.properties
    }

    /// Arguments for worker `vm_id`.
    pub fn worker_args(&self, vm_id: VmId, working_dir: &Path) -> WorkerArgs {
        WorkerArgs {
            vm_id: vm_id.get(),
            controller: self.hub.address().to_string(),
            working_dir: working_dir.to_path_buf(),
            locator: Some(self.locator.clone()),
            properties: Some(self.properties.clone()),
        }
    }

    /// Spawn worker `vm_id` and wait up to `timeout` for its Hello.
    ///
    /// Fails early if the process exits before saying hello. On any failure
    /// the process is killed.
    pub async fn start(
        &self,
        vm_id: VmId,
        working_dir: &Path,
        timeout: Duration,
    ) -> Result<LiveWorker, ProcessError> {
        let hello = self.hub.expect(vm_id);
        let args = self.worker_args(vm_id, working_dir);
        let mut process = match WorkerProcess::spawn(&self.binary, &args) {
            Ok(process) => process,
            Err(e) => {
                self.hub.cancel(vm_id);
                return Err(e);
            }
        };

        let outcome = tokio::time::timeout(timeout, async {
            tokio::select! {
                handshake = hello => handshake.map_err(|_| ProcessError::HubClosed),
                status = process.wait() => Err(ProcessError::ExitedEarly {
                    status: match status {
                        Ok(status) => status.to_string(),
                        Err(e) => e.to_string(),
                    },
                }),
            }
        })
        .await;

        let handshake = match outcome {
            Ok(Ok(handshake)) => handshake,
            Ok(Err(e)) => {
                self.hub.cancel(vm_id);
                return Err(e);
            }
            Err(_) => {
                self.hub.cancel(vm_id);
                if let Err(e) = process.reap(Duration::ZERO).await {
                    debug!(%vm_id, error = %e, "reaping unresponsive worker failed");
                }
                return Err(ProcessError::HandshakeTimeout { timeout });
            }
        };

        let pid = handshake.hello.pid;
        if pid != process.pid() {
            warn!(%vm_id, reported = %pid, spawned = %process.pid(), "worker reported a different pid");
        }

        let channel = WorkerChannel::new(vm_id, handshake.stream);
        Ok(LiveWorker {
            process,
            channel,
            pid,
        })
    }
}
