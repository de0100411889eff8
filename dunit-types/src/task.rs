//! Tasks - serializable units of remote work.
//!
//! A task is an operation name plus a MessagePack argument payload. The
//! worker looks the name up in its registry, decodes the arguments into
//! whatever type the handler expects and encodes the handler's result the
//! same way.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{codec, WireError};

/// A unit of work dispatched from the controller to a worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Operation name, resolved in the worker's task registry.
    pub name: String,
    /// MessagePack-encoded arguments.
    pub args: Vec<u8>,
}

impl Task {
    /// Create a task that takes no arguments.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            // MessagePack nil, which decodes as `()`
            args: vec![0xc0],
        }
    }

    /// Create a task with typed arguments.
    pub fn with_args<A: Serialize>(name: impl Into<String>, args: &A) -> Result<Self, WireError> {
        Ok(Self {
            name: name.into(),
            args: codec::encode(args)?,
        })
    }

    /// Decode the arguments into the handler's type.
    pub fn decode_args<A: DeserializeOwned>(&self) -> Result<A, WireError> {
        codec::decode(&self.args)
    }
}

/// An error raised by a task inside a worker, carried back to the caller.
///
/// Preserves the original error kind and message verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct RemoteError {
    /// Error kind (one of the constants below, or a task-chosen kind).
    pub kind: String,
    /// Original error message.
    pub message: String,
}

impl RemoteError {
    /// The task returned an error.
    pub const TASK_FAILED: &'static str = "task-failed";
    /// The task panicked.
    pub const PANIC: &'static str = "panic";
    /// No task with that name is registered in the worker.
    pub const UNKNOWN_TASK: &'static str = "unknown-task";
    /// The arguments did not decode into the handler's type.
    pub const BAD_ARGUMENTS: &'static str = "bad-arguments";

    /// Create a remote error of the given kind.
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Shorthand for a [`RemoteError::TASK_FAILED`] error.
    pub fn task_failed(message: impl Into<String>) -> Self {
        Self::new(Self::TASK_FAILED, message)
    }
}
