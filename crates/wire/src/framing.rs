// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Frame codec: 4-byte big-endian length prefix + JSON payload.
//!
//! This is the transport the core depends on to satisfy the peer-transport
//! contract of spec §4.2/§6: any implementation that can frame, send and
//! receive messages over a socket and deliver a `Disconnected` notification
//! on close is acceptable. We implement our own rather than reach for an
//! external message-bus crate because none of the workspace's sibling
//! examples carry one; the framing convention itself mirrors the daemon's
//! own documented wire format.

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Frames larger than this are rejected outright rather than trusted to
/// allocate — a peer that sends a bogus length prefix should not be able to
/// make the orchestrator attempt a multi-gigabyte allocation.
pub const MAX_FRAME_BYTES: u32 = 16 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("connection closed")]
    Closed,

    #[error("frame of {0} bytes exceeds the {MAX_FRAME_BYTES} byte limit")]
    FrameTooLarge(u32),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed json payload: {0}")]
    Json(#[from] serde_json::Error),
}

/// Read one length-prefixed frame. Returns `Err(ProtocolError::Closed)` on a
/// clean EOF before any bytes of a new frame arrive.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>, ProtocolError> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(ProtocolError::Closed)
        }
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_BYTES {
        return Err(ProtocolError::FrameTooLarge(len));
    }
    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await?;
    Ok(payload)
}

/// Write one length-prefixed frame.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    payload: &[u8],
) -> Result<(), ProtocolError> {
    let len = u32::try_from(payload.len()).map_err(|_| ProtocolError::FrameTooLarge(u32::MAX))?;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Serialize `value` and write it as a single frame.
pub async fn write_json<W: AsyncWrite + Unpin, T: serde::Serialize>(
    writer: &mut W,
    value: &T,
) -> Result<(), ProtocolError> {
    let payload = serde_json::to_vec(value)?;
    write_frame(writer, &payload).await
}

/// Read one frame and deserialize it.
pub async fn read_json<R: AsyncRead + Unpin, T: serde::de::DeserializeOwned>(
    reader: &mut R,
) -> Result<T, ProtocolError> {
    let payload = read_frame(reader).await?;
    Ok(serde_json::from_slice(&payload)?)
}
