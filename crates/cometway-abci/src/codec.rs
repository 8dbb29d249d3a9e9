//! Length-prefixed framing used on the ABCI socket.
//!
//! Each message is preceded by its byte length encoded as an unsigned
//! base-128 varint: seven bits per byte, least significant group first, high
//! bit set on every byte except the last.

use std::io;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest payload accepted in a single frame
pub const MAX_FRAME_SIZE: u64 = 64 * 1024 * 1024;

/// Longest varint that still fits in 64 bits
pub const MAX_VARINT_LEN: usize = 10;

/// Framing failure. Never retryable: the connection it happened on is done.
#[derive(Error, Debug)]
#[error("{reason}")]
pub struct FrameError {
    reason: String,
    closed: bool,
    #[source]
    source: Option<io::Error>,
}

impl FrameError {
    fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            closed: false,
            source: None,
        }
    }

    fn io(reason: &str, err: io::Error) -> Self {
        Self {
            reason: format!("{reason}: {err}"),
            closed: false,
            source: Some(err),
        }
    }

    fn closed() -> Self {
        Self {
            reason: "connection closed by peer".to_string(),
            closed: true,
            source: None,
        }
    }

    /// Human-readable reason
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// True when the peer closed the stream cleanly between two frames
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

/// Append the varint encoding of `value` to `buf`
pub fn encode_varint(mut value: u64, buf: &mut Vec<u8>) {
    while value >= 0x80 {
        buf.push((value as u8 & 0x7f) | 0x80);
        value >>= 7;
    }
    buf.push(value as u8);
}

/// Decode a varint from the front of `buf`, returning the value and the
/// number of bytes it occupied.
pub fn decode_varint(buf: &[u8]) -> Result<(u64, usize), FrameError> {
    let mut value = 0u64;
    let mut shift = 0u32;
    for (i, byte) in buf.iter().enumerate() {
        if shift >= 64 {
            return Err(FrameError::new("frame length varint is longer than 64 bits"));
        }
        if shift == 63 && *byte > 1 {
            return Err(FrameError::new("frame length varint is longer than 64 bits"));
        }
        value |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
        shift += 7;
    }
    if shift >= 64 {
        return Err(FrameError::new("frame length varint is longer than 64 bits"));
    }
    Err(FrameError::new("truncated frame length varint"))
}

fn check_length(len: u64) -> Result<usize, FrameError> {
    if len == 0 {
        return Err(FrameError::new("frame length is zero"));
    }
    if len > MAX_FRAME_SIZE {
        return Err(FrameError::new(format!(
            "frame length {len} exceeds maximum of {MAX_FRAME_SIZE} bytes"
        )));
    }
    usize::try_from(len).map_err(|_| FrameError::new(format!("frame length {len} overflows usize")))
}

async fn read_length<R>(reader: &mut R) -> Result<u64, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut value = 0u64;
    let mut shift = 0u32;
    loop {
        if shift >= 64 {
            return Err(FrameError::new("frame length varint is longer than 64 bits"));
        }
        let byte = match reader.read_u8().await {
            Ok(byte) => byte,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof && shift == 0 => {
                return Err(FrameError::closed());
            }
            Err(e) => return Err(FrameError::io("failed to read frame length", e)),
        };
        // the tenth byte holds only the top bit of a u64
        if shift == 63 && byte > 1 {
            return Err(FrameError::new("frame length varint is longer than 64 bits"));
        }
        value |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
    }
}

/// Read one complete frame.
///
/// The length is validated before any payload byte is consumed, and exactly
/// the declared number of payload bytes is read.
pub async fn read_frame<R>(reader: &mut R) -> Result<Vec<u8>, FrameError>
where
    R: AsyncRead + Unpin,
{
    let len = check_length(read_length(reader).await?)?;
    let mut payload = vec![0u8; len];
    reader
        .read_exact(&mut payload)
        .await
        .map_err(|e| FrameError::io("failed to read frame payload", e))?;
    Ok(payload)
}

/// Write `payload` as one frame and flush it
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    check_length(payload.len() as u64)?;
    let mut buf = Vec::with_capacity(payload.len() + MAX_VARINT_LEN);
    encode_varint(payload.len() as u64, &mut buf);
    buf.extend_from_slice(payload);
    writer
        .write_all(&buf)
        .await
        .map_err(|e| FrameError::io("failed to write frame", e))?;
    writer
        .flush()
        .await
        .map_err(|e| FrameError::io("failed to flush frame", e))?;
    Ok(())
}
