//! Error types for dunit-launcher.

use dunit_types::{Pid, RemoteError, VmId, WireError};
use std::path::PathBuf;
use std::time::Duration;

/// Errors that stop a harness from starting or shutting down.
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// The locator service could not be started.
    #[error("failed to start locator: {0}")]
    Locator(#[source] std::io::Error),

    /// The handshake hub could not be started.
    #[error("failed to start handshake hub: {0}")]
    Hub(#[source] std::io::Error),

    /// A working directory could not be created.
    #[error("cannot create working directory {path}: {source}")]
    WorkingDir {
        /// Directory that could not be created.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A worker process could not be started.
    #[error("worker {vm_id} failed to start: {source}")]
    Worker {
        /// Worker that failed.
        vm_id: VmId,
        /// What went wrong.
        source: ProcessError,
    },

    /// A startup task was lost before reporting.
    #[error("startup task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Errors from starting, signalling and reaping worker processes.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    /// Worker arguments could not be turned into environment variables.
    #[error("invalid worker arguments: {0}")]
    Args(#[from] dunit_worker::WorkerError),

    /// The per-VM log file could not be opened.
    #[error("cannot open log file {path}: {source}")]
    Log {
        /// Log file path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The worker binary could not be executed.
    #[error("failed to spawn {binary}: {source}")]
    Spawn {
        /// Binary that was executed.
        binary: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The child exited before the OS reported a pid.
    #[error("worker exited before reporting a pid")]
    NoPid,

    /// Sending a signal failed.
    #[error("failed to signal pid {pid}: {source}")]
    Signal {
        /// Target process.
        pid: Pid,
        /// Errno from kill(2).
        source: nix::errno::Errno,
    },

    /// The worker exited before completing its handshake.
    #[error("worker exited before its handshake ({status})")]
    ExitedEarly {
        /// Exit status as reported by the OS.
        status: String,
    },

    /// No handshake arrived in time.
    #[error("no handshake within {timeout:?}")]
    HandshakeTimeout {
        /// How long we waited.
        timeout: Duration,
    },

    /// The handshake hub stopped while we were waiting.
    #[error("handshake hub closed")]
    HubClosed,

    /// I/O error while waiting on or killing the child.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors returned by [`crate::Vm::invoke`].
#[derive(Debug, thiserror::Error)]
pub enum InvokeError {
    /// The task failed inside the worker. Kind and message are preserved.
    #[error("{vm_id}: {error}")]
    Remote {
        /// Worker the task ran in.
        vm_id: VmId,
        /// Error raised by the task.
        #[source]
        error: RemoteError,
    },

    /// No result arrived in time. The VM's state is unchanged.
    #[error("{vm_id}: invocation timed out after {timeout:?}")]
    Timeout {
        /// Target worker.
        vm_id: VmId,
        /// Timeout that elapsed.
        timeout: Duration,
    },

    /// The VM is DEAD.
    #[error("{vm_id} is dead")]
    VmDead {
        /// Target worker.
        vm_id: VmId,
    },

    /// The VM is bouncing and the configured policy is to fail.
    #[error("{vm_id} is bouncing")]
    Bouncing {
        /// Target worker.
        vm_id: VmId,
    },

    /// The connection to the worker process is gone.
    #[error("{vm_id}: worker disconnected")]
    Disconnected {
        /// Target worker.
        vm_id: VmId,
    },

    /// Arguments or result could not be encoded or decoded.
    #[error("codec error: {0}")]
    Wire(#[from] WireError),
}

impl InvokeError {
    /// The worker-side error, if the task itself failed.
    pub fn remote(&self) -> Option<&RemoteError> {
        match self {
            InvokeError::Remote { error, .. } => Some(error),
            _ => None,
        }
    }
}
