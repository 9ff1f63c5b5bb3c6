//! Browser native-messaging framing and the host serve loop.
//!
//! # Responsibility
//! - Encode/decode length-prefixed JSON frames (32-bit native-endian length,
//!   then UTF-8 JSON).
//! - Pump frames from a reader through the broker actor into a writer.
//!
//! # Invariants
//! - A clean EOF before a new prefix ends the stream without error.
//! - Outbound frames never exceed `MAX_OUTBOUND_FRAME_BYTES`.
//! - Requests without a reply write nothing.
//! - A frame whose body is not JSON is skipped; the stream stays aligned.
//! - A reply too large to send is replaced by an `{ error }` frame.

use crate::broker::actor::{BrokerClosed, BrokerHandle};
use crate::broker::reply::Reply;
use log::{debug, info, warn};
use serde::Serialize;
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Browsers reject host-to-extension messages above 1 MiB.
pub const MAX_OUTBOUND_FRAME_BYTES: usize = 1024 * 1024;
/// Guard against absurd inbound allocations.
pub const MAX_INBOUND_FRAME_BYTES: usize = 64 * 1024 * 1024;

const PREFIX_LEN: usize = 4;

/// Framing failure.
#[derive(Debug)]
pub enum FrameError {
    Io(std::io::Error),
    Json(serde_json::Error),
    /// Stream ended inside a prefix or body.
    Truncated { expected: usize, received: usize },
    TooLarge { len: usize, limit: usize },
}

impl Display for FrameError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "frame io failed: {err}"),
            Self::Json(err) => write!(f, "frame is not valid JSON: {err}"),
            Self::Truncated { expected, received } => write!(
                f,
                "frame truncated: expected {expected} bytes, received {received}"
            ),
            Self::TooLarge { len, limit } => {
                write!(f, "frame of {len} bytes exceeds limit of {limit}")
            }
        }
    }
}

impl Error for FrameError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for FrameError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for FrameError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

/// Serve-loop failure.
#[derive(Debug)]
pub enum ServeError {
    Frame(FrameError),
    Broker(BrokerClosed),
}

impl Display for ServeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Frame(err) => write!(f, "{err}"),
            Self::Broker(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ServeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Frame(err) => Some(err),
            Self::Broker(err) => Some(err),
        }
    }
}

impl From<FrameError> for ServeError {
    fn from(value: FrameError) -> Self {
        Self::Frame(value)
    }
}

impl From<BrokerClosed> for ServeError {
    fn from(value: BrokerClosed) -> Self {
        Self::Broker(value)
    }
}

/// Counters reported when a serve loop ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServeStats {
    pub received: u64,
    pub replied: u64,
    /// Frames dropped because their body was not JSON.
    pub skipped: u64,
}

/// Reads one frame; `Ok(None)` on clean EOF.
pub async fn read_frame<R>(reader: &mut R, max_len: usize) -> Result<Option<Value>, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; PREFIX_LEN];
    let mut filled = 0;
    while filled < PREFIX_LEN {
        let read = reader.read(&mut prefix[filled..]).await?;
        if read == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(FrameError::Truncated {
                expected: PREFIX_LEN,
                received: filled,
            });
        }
        filled += read;
    }

    let len = u32::from_ne_bytes(prefix) as usize;
    if len > max_len {
        return Err(FrameError::TooLarge {
            len,
            limit: max_len,
        });
    }

    let mut body = vec![0u8; len];
    let mut received = 0;
    while received < len {
        let read = reader.read(&mut body[received..]).await?;
        if read == 0 {
            return Err(FrameError::Truncated {
                expected: len,
                received,
            });
        }
        received += read;
    }

    Ok(Some(serde_json::from_slice(&body)?))
}

/// Writes one frame and flushes.
pub async fn write_frame<W, T>(writer: &mut W, message: &T) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
    T: Serialize + ?Sized,
{
    let body = serde_json::to_vec(message)?;
    let len = u32::try_from(body.len())
        .ok()
        .filter(|len| (*len as usize) <= MAX_OUTBOUND_FRAME_BYTES)
        .ok_or(FrameError::TooLarge {
            len: body.len(),
            limit: MAX_OUTBOUND_FRAME_BYTES,
        })?;

    writer.write_all(&len.to_ne_bytes()).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;
    Ok(())
}

/// Pumps requests from `reader` through the broker until EOF.
///
/// Requests are answered one at a time in arrival order.
pub async fn serve<R, W>(
    handle: &BrokerHandle,
    mut reader: R,
    mut writer: W,
) -> Result<ServeStats, ServeError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut stats = ServeStats::default();
    info!("event=host_serve module=transport status=start");

    loop {
        let request = match read_frame(&mut reader, MAX_INBOUND_FRAME_BYTES).await {
            Ok(Some(request)) => request,
            Ok(None) => break,
            Err(FrameError::Json(err)) => {
                stats.skipped += 1;
                warn!(
                    "event=host_serve module=transport status=skipped error_code=invalid_json error={err}"
                );
                continue;
            }
            Err(err) => return Err(err.into()),
        };
        stats.received += 1;

        match handle.request(request).await? {
            Some(reply) => {
                send_reply(&mut writer, &reply).await?;
                stats.replied += 1;
            }
            None => debug!("event=host_serve module=transport status=no_reply"),
        }
    }

    info!(
        "event=host_serve module=transport status=stop received={} replied={} skipped={}",
        stats.received, stats.replied, stats.skipped
    );
    Ok(stats)
}

async fn send_reply<W>(writer: &mut W, reply: &Reply) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    match write_frame(writer, reply).await {
        Err(FrameError::TooLarge { len, limit }) => {
            warn!(
                "event=host_serve module=transport status=error error_code=reply_too_large len={len} limit={limit}"
            );
            let replacement = Reply::error(FrameError::TooLarge { len, limit }.to_string());
            write_frame(writer, &replacement).await
        }
        Err(err) => {
            warn!("event=host_serve module=transport status=error error={err}");
            Err(err)
        }
        Ok(()) => Ok(()),
    }
}
