//! Length-prefixed MessagePack framing.
//!
//! Every frame on a dunit socket is a 4-byte big-endian length followed by
//! a MessagePack body.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::WireError;

/// Maximum frame body size (16 MiB).
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Serialize a value to MessagePack bytes.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, WireError> {
    rmp_serde::to_vec(value).map_err(WireError::Serialization)
}

/// Deserialize a value from MessagePack bytes.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, WireError> {
    rmp_serde::from_slice(bytes).map_err(WireError::Deserialization)
}

/// Write one length-prefixed frame and flush.
pub async fn write_frame<W, T>(writer: &mut W, value: &T) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
    T: Serialize + ?Sized,
{
    let bytes = encode(value)?;
    if bytes.len() > MAX_FRAME_SIZE {
        return Err(WireError::FrameTooLarge {
            size: bytes.len(),
            limit: MAX_FRAME_SIZE,
        });
    }

    let mut buf = Vec::with_capacity(4 + bytes.len());
    buf.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    buf.extend_from_slice(&bytes);

    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one length-prefixed frame.
///
/// Returns `Ok(None)` when the peer closed the stream at a frame boundary.
/// A stream that ends inside the length prefix is a `TruncatedPrefix` error.
pub async fn read_frame<R, T>(reader: &mut R) -> Result<Option<T>, WireError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    // Only an end of stream before the first prefix byte is a clean close
    if reader.read(&mut len_buf[..1]).await? == 0 {
        return Ok(None);
    }
    let mut read = 1;
    while read < len_buf.len() {
        let n = reader.read(&mut len_buf[read..]).await?;
        if n == 0 {
            return Err(WireError::TruncatedPrefix { read });
        }
        read += n;
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(WireError::FrameTooLarge {
            size: len,
            limit: MAX_FRAME_SIZE,
        });
    }

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    decode(&buf).map(Some)
}
