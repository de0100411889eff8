//! VM lifecycle state machine.
//!
//! Pure transitions only. The launcher owns the processes and applies the
//! events below as things happen; this module decides which transitions are
//! legal so every caller agrees on them.
//!
//! ```text
//! STARTING --Ready--> RUNNING --BounceRequested--> BOUNCING --Restarted--> RUNNING
//!     |                                               |
//!     +--StartFailed--> DEAD <---- ExitTimedOut / RestartTimedOut / RestartFailed
//! ```
//!
//! DEAD is terminal for the VM.

use std::fmt;
use thiserror::Error;

/// Lifecycle state of one VM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VmState {
    /// Process spawned, handshake not yet received.
    Starting,
    /// Serving invocations.
    Running,
    /// Being killed and restarted; invocations wait or fail.
    Bouncing,
    /// Failed to start or restart. Unrecoverable for the rest of the run.
    Dead,
}

/// Things that happen to a VM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// The process completed its readiness handshake.
    Ready,
    /// The initial process failed to spawn or never completed its handshake.
    StartFailed,
    /// A bounce was requested.
    BounceRequested,
    /// The replacement process completed its handshake.
    Restarted,
    /// The old process did not exit in time.
    ExitTimedOut,
    /// The replacement process did not complete its handshake in time.
    RestartTimedOut,
    /// The replacement process could not be spawned.
    RestartFailed,
}

/// An event that is not legal in the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid lifecycle transition: {event:?} while {from}")]
pub struct InvalidTransition {
    /// State the VM was in.
    pub from: VmState,
    /// Event that was rejected.
    pub event: LifecycleEvent,
}

impl VmState {
    /// Process an event and return the new state.
    pub fn on_event(self, event: LifecycleEvent) -> Result<Self, InvalidTransition> {
        use LifecycleEvent as E;

        match (self, event) {
            // From Starting
            (Self::Starting, E::Ready) => Ok(Self::Running),
            (Self::Starting, E::StartFailed) => Ok(Self::Dead),

            // From Running
            (Self::Running, E::BounceRequested) => Ok(Self::Bouncing),

            // From Bouncing
            (Self::Bouncing, E::Restarted) => Ok(Self::Running),
            (Self::Bouncing, E::ExitTimedOut | E::RestartTimedOut | E::RestartFailed) => {
                Ok(Self::Dead)
            }

            (from, event) => Err(InvalidTransition { from, event }),
        }
    }

    /// True once the VM can never serve again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Dead)
    }

    /// True if an invocation may be sent right now.
    pub fn accepts_invocations(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// True while the VM is between processes and might still come back.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Starting | Self::Bouncing)
    }
}

impl fmt::Display for VmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VmState::Starting => write!(f, "STARTING"),
            VmState::Running => write!(f, "RUNNING"),
            VmState::Bouncing => write!(f, "BOUNCING"),
            VmState::Dead => write!(f, "DEAD"),
        }
    }
}
