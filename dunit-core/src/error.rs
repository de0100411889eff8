//! Error types for the environment facade.

use dunit_types::{Pid, VmId};
use std::fmt;
use thiserror::Error;

/// Which step of a bounce ran out of time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BouncePhase {
    /// Waiting for the old process to exit after the termination signal.
    Exit,
    /// Waiting for the replacement process to complete its handshake.
    Restart,
}

impl fmt::Display for BouncePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BouncePhase::Exit => write!(f, "exit"),
            BouncePhase::Restart => write!(f, "restart"),
        }
    }
}

/// Errors from environment facade operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvError {
    /// No backend was installed before first use.
    #[error("distributed unit test environment is not initialized")]
    NotInitialized,

    /// A backend was already installed for this process.
    #[error("distributed unit test environment is already initialized")]
    AlreadyInitialized,

    /// Locator discovery has not completed.
    #[error("locator discovery has not completed")]
    LocatorUnavailable,

    /// The pid does not belong to a known VM in a state that allows the operation.
    #[error("unknown process: pid {pid}")]
    UnknownProcess {
        /// The pid that was passed in.
        pid: Pid,
    },

    /// A bounce step exceeded its timeout. The VM is now DEAD.
    #[error("bounce of {vm_id} timed out waiting for {phase}")]
    BounceTimeout {
        /// VM being bounced.
        vm_id: VmId,
        /// Step that timed out.
        phase: BouncePhase,
    },

    /// A bounce failed for a reason other than a timeout. The VM is now DEAD.
    #[error("bounce of {vm_id} failed: {reason}")]
    BounceFailure {
        /// VM being bounced.
        vm_id: VmId,
        /// What went wrong.
        reason: String,
    },

    /// The backend does not support this operation.
    #[error("unsupported operation: {0}")]
    Unsupported(String),
}

impl EnvError {
    /// Harness-level failures after which later tests cannot assume a
    /// consistent topology.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EnvError::NotInitialized
                | EnvError::BounceTimeout { .. }
                | EnvError::BounceFailure { .. }
        )
    }

    /// Errors caused by the caller passing a bad argument.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, EnvError::UnknownProcess { .. })
    }
}
