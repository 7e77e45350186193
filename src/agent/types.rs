//! Wire types exchanged with the agent service

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Message author role
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
}

/// One typed content item of a message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentPart {
    Text { text: String },
}

/// Message sent to the agent
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageCreate {
    pub role: Role,
    pub content: Vec<ContentPart>,
}

impl MessageCreate {
    /// A user message carrying a single text item
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![ContentPart::Text { text: text.into() }],
        }
    }
}

/// Body of a streaming message request
#[derive(Debug, Clone, Serialize)]
pub struct StreamRequest<'a> {
    pub messages: &'a [MessageCreate],
    /// Whole messages rather than token deltas
    pub stream_tokens: bool,
}

pub const ASSISTANT_MESSAGE: &str = "assistant_message";
pub const USAGE_STATISTICS: &str = "usage_statistics";

/// One chunk yielded by the agent stream, classified once on arrival.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamChunk {
    /// Reply text from the agent
    AssistantMessage { content: String },
    /// Token accounting; never shown to clients
    UsageStatistics,
    /// Any other chunk carrying a `message_type`
    Typed {
        message_type: String,
        content: Option<String>,
    },
    /// Chunk without a recognizable type
    Other(Value),
}

impl UpstreamChunk {
    /// Classify a decoded JSON chunk.
    pub fn from_value(value: Value) -> Self {
        let message_type = value
            .get("message_type")
            .and_then(Value::as_str)
            .map(str::to_string);

        match message_type.as_deref() {
            Some(ASSISTANT_MESSAGE) => UpstreamChunk::AssistantMessage {
                content: extract_content(&value).unwrap_or_default(),
            },
            Some(USAGE_STATISTICS) => UpstreamChunk::UsageStatistics,
            Some(_) => UpstreamChunk::Typed {
                content: extract_content(&value),
                message_type: message_type.unwrap_or_default(),
            },
            None => UpstreamChunk::Other(value),
        }
    }

    /// The chunk's `message_type`, if it has one
    pub fn message_type(&self) -> Option<&str> {
        match self {
            UpstreamChunk::AssistantMessage { .. } => Some(ASSISTANT_MESSAGE),
            UpstreamChunk::UsageStatistics => Some(USAGE_STATISTICS),
            UpstreamChunk::Typed { message_type, .. } => Some(message_type),
            UpstreamChunk::Other(_) => None,
        }
    }

    /// True for falsy chunks: null, false, zero, and empty strings, arrays or objects.
    pub fn is_empty(&self) -> bool {
        match self {
            UpstreamChunk::Other(value) => match value {
                Value::Null => true,
                Value::Bool(b) => !b,
                Value::String(s) => s.is_empty(),
                Value::Array(a) => a.is_empty(),
                Value::Object(o) => o.is_empty(),
                Value::Number(n) => n.as_f64() == Some(0.0),
            },
            _ => false,
        }
    }
}

/// Content is either a plain string or a list of `{type: "text", text}` parts.
fn extract_content(value: &Value) -> Option<String> {
    match value.get("content")? {
        Value::String(s) => Some(s.clone()),
        Value::Array(parts) => {
            let text: String = parts
                .iter()
                .filter_map(|part| match part {
                    Value::String(s) => Some(s.as_str()),
                    other => other.get("text").and_then(Value::as_str),
                })
                .collect();
            Some(text)
        }
        _ => None,
    }
}
