//! Wire frames (one JSON object per line).
//!
//! The bridge only ever sends `call` frames; the backend only ever sends
//! `response` and `push` frames. Payloads are JSON carried as text so the
//! backend can forward them without re-encoding.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{BridgeError, Result};
use crate::CallId;

/// A single frame on the channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    /// Outbound query tagged with its correlation id.
    Call { id: CallId, query: String },
    /// Answer to the call with the same id.
    Response { id: CallId, payload: String },
    /// Unsolicited notification, no correlation id.
    Push { payload: String },
}

impl Frame {
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Call { .. } => "call",
            Frame::Response { .. } => "response",
            Frame::Push { .. } => "push",
        }
    }
}

/// Decode one frame from a line (trailing `\r\n` / `\n` tolerated).
pub fn decode_line(line: &str) -> Result<Frame> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.is_empty() {
        return Err(BridgeError::BadRequest("empty frame".into()));
    }
    serde_json::from_str(line)
        .map_err(|e| BridgeError::BadRequest(format!("invalid frame json: {e}")))
}

/// Encode a frame as a newline-terminated line.
pub fn encode_line(frame: &Frame) -> Result<String> {
    let mut s = serde_json::to_string(frame)
        .map_err(|e| BridgeError::Internal(format!("frame encode failed: {e}")))?;
    s.push('\n');
    Ok(s)
}

/// Decode a response or push payload the same way the backend encoded it.
pub fn decode_payload(text: &str) -> Result<Value> {
    serde_json::from_str(text).map_err(|e| BridgeError::MalformedResponse(e.to_string()))
}
