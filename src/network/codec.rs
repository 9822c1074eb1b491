/// Wire frames exchanged with the backend process
///
/// One JSON object per line. Every frame carries a `kind` tag:
/// - `request`: command sent to the backend, correlated by `id`
/// - `response`: exactly one per request, either `ok` or `error`
/// - `event`: pushed by the backend without a request

use crate::error::{BridgeError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace, warn};
use uuid::Uuid;

/// Default upper bound for a single encoded frame (1 MiB)
pub const DEFAULT_MAX_FRAME_LEN: usize = 1024 * 1024;

/// Failure reported by the backend for a single command
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteError {
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<i64>,
}

/// A single message on the wire
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Frame {
    Request {
        id: Uuid,
        command: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        args: Option<Value>,
    },

    Response {
        id: Uuid,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ok: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<RemoteError>,
    },

    Event {
        event: String,
        #[serde(default)]
        payload: Value,
    },
}

impl Frame {
    /// Successful response to request `id`
    pub fn ok(id: Uuid, value: Value) -> Self {
        Frame::Response {
            id,
            ok: Some(value),
            error: None,
        }
    }

    /// Failed response to request `id`
    pub fn error(id: Uuid, message: impl Into<String>, code: Option<i64>) -> Self {
        Frame::Response {
            id,
            ok: None,
            error: Some(RemoteError {
                message: message.into(),
                code,
            }),
        }
    }

    /// Backend push event
    pub fn event(event: impl Into<String>, payload: Value) -> Self {
        Frame::Event {
            event: event.into(),
            payload,
        }
    }

    /// Short label for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Request { .. } => "request",
            Frame::Response { .. } => "response",
            Frame::Event { .. } => "event",
        }
    }
}

/// Line-delimited JSON codec with a frame size limit
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    max_frame_len: usize,
}

impl FrameCodec {
    pub fn new(max_frame_len: usize) -> Self {
        Self { max_frame_len }
    }

    pub fn max_frame_len(&self) -> usize {
        self.max_frame_len
    }

    /// Encode a frame as a single newline-terminated line
    pub fn encode(&self, frame: &Frame) -> Result<Vec<u8>> {
        let mut bytes = serde_json::to_vec(frame)?;

        if bytes.len() > self.max_frame_len {
            warn!("Refusing to encode {} frame of {} bytes", frame.kind(), bytes.len());
            return Err(BridgeError::FrameTooLong {
                length: bytes.len(),
                max: self.max_frame_len,
            });
        }

        bytes.push(b'\n');
        Ok(bytes)
    }

    /// Decode a single line (trailing newline optional)
    pub fn decode(&self, line: &str) -> Result<Frame> {
        let line = line.trim_end_matches(['\r', '\n']);

        if line.len() > self.max_frame_len {
            return Err(BridgeError::FrameTooLong {
                length: line.len(),
                max: self.max_frame_len,
            });
        }

        serde_json::from_str(line).map_err(|e| BridgeError::Codec(e.to_string()))
    }

    /// Read the next frame, skipping blank lines
    ///
    /// Returns `Ok(None)` at end of stream. A line that is not UTF-8 is
    /// consumed whole and reported as `BridgeError::Codec`, so the stream
    /// stays aligned for the next read.
    pub async fn read_frame<R>(&self, reader: &mut R) -> Result<Option<Frame>>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut buf = Vec::new();

        loop {
            buf.clear();

            // +2 leaves room for "\r\n" after a maximum-sized frame
            let limit = (self.max_frame_len + 2) as u64;
            let n = (&mut *reader).take(limit).read_until(b'\n', &mut buf).await?;

            if n == 0 {
                debug!("Frame stream reached end of input");
                return Ok(None);
            }

            if !buf.ends_with(b"\n") && n as u64 == limit {
                return Err(BridgeError::FrameTooLong {
                    length: n,
                    max: self.max_frame_len,
                });
            }

            let line = std::str::from_utf8(&buf).map_err(|e| {
                warn!("Received {} byte line that is not UTF-8", n);
                BridgeError::Codec(format!("frame is not valid UTF-8: {}", e))
            })?;

            if line.trim().is_empty() {
                continue;
            }

            let frame = self.decode(line)?;
            trace!("Read {} frame ({} bytes)", frame.kind(), n);
            return Ok(Some(frame));
        }
    }

    /// Write one frame and flush
    pub async fn write_frame<W>(&self, writer: &mut W, frame: &Frame) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let bytes = self.encode(frame)?;
        writer.write_all(&bytes).await?;
        writer.flush().await?;
        trace!("Wrote {} frame ({} bytes)", frame.kind(), bytes.len());
        Ok(())
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_LEN)
    }
}
