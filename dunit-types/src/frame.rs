//! Controller ⇄ worker protocol frames.
//!
//! Workers dial the controller and open with [`Hello`], the readiness
//! handshake carrying the worker's own pid. After that the controller sends
//! [`Invoke`] frames and the worker answers each with an [`InvokeResult`]
//! under the same correlation id, until [`Frame::Shutdown`] or EOF.

use serde::{Deserialize, Serialize};

use crate::{Pid, RemoteError, Task, VmId};

/// Current protocol version.
pub const PROTOCOL_VERSION: u8 = 1;

/// All frames exchanged on a controller channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Frame {
    /// Worker is up and ready to serve (worker → controller)
    Hello(Hello),
    /// Run a task (controller → worker)
    Invoke(Invoke),
    /// Outcome of a task (worker → controller)
    InvokeResult(InvokeResult),
    /// Exit cleanly (controller → worker)
    Shutdown,
}

/// Readiness handshake sent by a freshly started worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hello {
    /// Protocol version spoken by the worker
    pub protocol_version: u8,
    /// Logical identity the worker was started as
    pub vm_id: VmId,
    /// The worker's own process id
    pub pid: Pid,
}

impl Hello {
    /// Handshake for the calling process.
    pub fn new(vm_id: VmId) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            vm_id,
            pid: Pid::current(),
        }
    }
}

/// A task invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoke {
    /// Matches the result to its caller
    pub correlation_id: u64,
    /// Work to run
    pub task: Task,
}

/// Result of an invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvokeResult {
    /// Correlation id of the originating [`Invoke`]
    pub correlation_id: u64,
    /// MessagePack-encoded return value, or the error the task raised
    pub outcome: Result<Vec<u8>, RemoteError>,
}

/// Outcome of a successful bounce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BounceResult {
    /// Pid of the replacement process
    pub new_pid: Pid,
    /// Pid of the process that was terminated
    pub previous_pid: Pid,
    /// True when the replacement completed its handshake
    pub success: bool,
}
