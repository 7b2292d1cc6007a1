// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Newline-delimited JSON framing over a pair of byte streams.

use anyhow::{Context, Result};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Stdin, Stdout};
use tracing::trace;

use super::error::ErrorCode;
use super::types::{Notification, Request, RequestId, Response};

/// One decoded inbound frame.
#[derive(Debug, Clone)]
pub enum Incoming {
    /// A request that expects a response.
    Request(Request),
    /// A notification (no `id`, no response).
    Notification(Notification),
    /// A frame that could not be decoded.
    ///
    /// `id` is set when one could be recovered, in which case the caller
    /// should answer with an error response.
    Malformed {
        /// Recovered request id, if any.
        id: Option<RequestId>,
        /// Parse or invalid-request.
        code: ErrorCode,
        /// Diagnostic.
        message: String,
    },
}

/// Decodes one frame.
#[must_use]
pub fn decode(frame: &str) -> Incoming {
    let mut value: Value = match serde_json::from_str(frame) {
        Ok(v) => v,
        Err(e) => {
            return Incoming::Malformed {
                id: None,
                code: ErrorCode::ParseError,
                message: format!("Parse error: {e}"),
            };
        }
    };

    let Some(object) = value.as_object_mut() else {
        return Incoming::Malformed {
            id: None,
            code: ErrorCode::InvalidRequest,
            message: "frame is not a JSON object (batches are not supported)".to_string(),
        };
    };

    if !object.contains_key("method") {
        // Responses to server-initiated requests land here; we never send any.
        return Incoming::Malformed {
            id: None,
            code: ErrorCode::InvalidRequest,
            message: "frame has no method".to_string(),
        };
    }

    let Some(raw_id) = object.get("id") else {
        return match serde_json::from_value::<Notification>(value) {
            Ok(notification) => Incoming::Notification(notification),
            Err(e) => Incoming::Malformed {
                id: None,
                code: ErrorCode::InvalidRequest,
                message: format!("Invalid notification: {e}"),
            },
        };
    };

    let Some(id) = RequestId::from_value(raw_id) else {
        // Unusable id: answer with a null id so the client is not left waiting.
        return Incoming::Malformed {
            id: Some(RequestId::Null),
            code: ErrorCode::InvalidRequest,
            message: format!("Invalid request id: {raw_id}"),
        };
    };

    // Normalizes integral floats such as `1.0`.
    object.insert("id".to_string(), id.to_value());

    match serde_json::from_value::<Request>(value) {
        Ok(request) => Incoming::Request(request),
        Err(e) => Incoming::Malformed {
            id: Some(id),
            code: ErrorCode::InvalidRequest,
            message: format!("Invalid request: {e}"),
        },
    }
}

/// Best-effort id recovery from a frame that is not valid UTF-8.
fn recover_id(bytes: &[u8]) -> Option<RequestId> {
    let text = String::from_utf8_lossy(bytes);
    let value: Value = serde_json::from_str(text.trim()).ok()?;
    value
        .as_object()
        .filter(|object| object.contains_key("method"))
        .and_then(|object| object.get("id"))
        .and_then(RequestId::from_value)
}

/// Reads frames from `R` and writes responses to `W`.
///
/// Each frame is one line. Responses are flushed as soon as they are
/// written so the next frame is never read while output is buffered.
pub struct Transport<R, W> {
    reader: R,
    writer: W,
    buf: Vec<u8>,
}

impl Transport<BufReader<Stdin>, Stdout> {
    /// A transport over the process's stdin and stdout.
    #[must_use]
    pub fn stdio() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}

impl<R, W> Transport<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Wraps a reader and writer.
    pub const fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            buf: Vec::new(),
        }
    }

    /// Reads the next non-blank frame.
    ///
    /// Returns `Ok(None)` once the inbound stream is closed. Bytes that are
    /// not UTF-8 come back as [`Incoming::Malformed`] instead of an error.
    ///
    /// # Errors
    ///
    /// Returns an error only if the underlying read fails.
    pub async fn recv(&mut self) -> Result<Option<Incoming>> {
        loop {
            self.buf.clear();
            let n = self
                .reader
                .read_until(b'\n', &mut self.buf)
                .await
                .context("Failed to read from input stream")?;
            if n == 0 {
                return Ok(None);
            }

            let Ok(line) = std::str::from_utf8(&self.buf) else {
                return Ok(Some(Incoming::Malformed {
                    id: recover_id(&self.buf),
                    code: ErrorCode::ParseError,
                    message: "frame is not valid UTF-8".to_string(),
                }));
            };

            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            trace!("Received: {}", line);
            return Ok(Some(decode(line)));
        }
    }

    /// Writes one response frame and flushes.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub async fn send(&mut self, response: &Response) -> Result<()> {
        let mut frame = serde_json::to_vec(response).context("Failed to encode response")?;
        trace!("Sending: {}", String::from_utf8_lossy(&frame));
        frame.push(b'\n');
        self.writer
            .write_all(&frame)
            .await
            .context("Failed to write to output stream")?;
        self.writer
            .flush()
            .await
            .context("Failed to flush output stream")
    }

    /// Flushes and closes the outbound stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the final flush fails.
    pub async fn close(&mut self) -> Result<()> {
        self.writer
            .shutdown()
            .await
            .context("Failed to close output stream")
    }

    /// Gives back the writer, mostly for inspecting output in tests.
    pub fn into_writer(self) -> W {
        self.writer
    }
}
