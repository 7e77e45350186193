//! Outbound SSE frames
//!
//! Every frame is a single `data: ...\n\n` unit. A stream ends with either
//! the `[DONE]` sentinel or one error-status event.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::Status;

/// Payload of the sentinel frame
pub const DONE_SENTINEL: &str = "[DONE]";

/// Event relayed to the browser
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StreamEvent {
    pub message: String,
    pub status: Status,
}

impl StreamEvent {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: Status::Success,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: Status::Error,
        }
    }
}

/// One unit of the outbound event stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Event(StreamEvent),
    Done,
}

impl Frame {
    /// Serialize as `data: <payload>\n\n`.
    pub fn to_bytes(&self) -> Bytes {
        match self {
            Frame::Event(event) => {
                let json =
                    serde_json::to_string(event).expect("StreamEvent should always serialize");
                Bytes::from(format!("data: {}\n\n", json))
            }
            Frame::Done => Bytes::from(format!("data: {}\n\n", DONE_SENTINEL)),
        }
    }

    /// Parse one frame as produced by [`Frame::to_bytes`].
    ///
    /// Accepts the frame with or without its trailing blank line.
    pub fn parse(raw: &str) -> Option<Frame> {
        let payload = raw.trim_end_matches('\n').strip_prefix("data: ")?;
        if payload == DONE_SENTINEL {
            return Some(Frame::Done);
        }
        serde_json::from_str(payload).ok().map(Frame::Event)
    }

    /// Split a full response body into frames, skipping anything unparseable.
    pub fn parse_all(body: &str) -> Vec<Frame> {
        body.split("\n\n")
            .filter(|part| !part.is_empty())
            .filter_map(Frame::parse)
            .collect()
    }

    /// Sentinel or error event; nothing follows either.
    pub fn is_terminal(&self) -> bool {
        match self {
            Frame::Done => true,
            Frame::Event(event) => event.status == Status::Error,
        }
    }
}
