//! Error types for dunit-worker.

use thiserror::Error;

/// Errors that end a worker's run.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// Framing or encoding error on a socket.
    #[error("wire error: {0}")]
    Wire(#[from] dunit_types::WireError),

    /// Could not reach the controller.
    #[error("cannot connect to controller at {address}: {source}")]
    Connect {
        /// Controller address.
        address: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Could not reach the locator.
    #[error("cannot connect to locator at {address}: {source}")]
    LocatorConnect {
        /// Locator address.
        address: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The process environment could not be set up.
    #[error("environment error: {0}")]
    Env(#[from] dunit_core::EnvError),

    /// Locator request failed.
    #[error("locator error: {0}")]
    Locator(String),

    /// Startup arguments could not be interpreted.
    #[error("invalid worker arguments: {0}")]
    InvalidArgs(String),

    /// A task runner thread died without producing a result.
    #[error("task runner failed: {0}")]
    Runner(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
