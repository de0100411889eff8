//! Error types for the dunit wire format.

use thiserror::Error;

/// Errors that can occur while encoding, decoding or framing messages.
#[derive(Debug, Error)]
pub enum WireError {
    /// MessagePack serialization failed
    #[error("serialization failed: {0}")]
    Serialization(#[source] rmp_serde::encode::Error),

    /// MessagePack deserialization failed
    #[error("deserialization failed: {0}")]
    Deserialization(#[source] rmp_serde::decode::Error),

    /// Frame exceeds the maximum allowed size
    #[error("frame too large: {size} bytes (limit: {limit} bytes)")]
    FrameTooLarge {
        /// Size announced by the length prefix.
        size: usize,
        /// Maximum allowed size.
        limit: usize,
    },

    /// The stream ended part way through a length prefix
    #[error("stream ended after {read} of 4 length prefix bytes")]
    TruncatedPrefix {
        /// Prefix bytes received before the end of the stream.
        read: usize,
    },

    /// Invalid data format
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Underlying stream error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
