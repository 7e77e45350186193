//! Which upstream chunks reach the browser

use std::collections::HashSet;

use serde_json::Value;

use super::frame::StreamEvent;
use crate::agent::{types::ASSISTANT_MESSAGE, UpstreamChunk};
use crate::config::Config;

/// Outcome of inspecting one upstream chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Forward(StreamEvent),
    /// Dropped, with a short reason used for logs and metrics
    Drop(&'static str),
}

/// Allow-list of upstream `message_type` values relayed to clients.
///
/// Usage statistics are never relayed. Untyped chunks are always relayed in
/// their string form.
#[derive(Debug, Clone)]
pub struct RelayPolicy {
    forward_types: HashSet<String>,
}

impl RelayPolicy {
    pub fn new<I, S>(forward_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            forward_types: forward_types.into_iter().map(Into::into).collect(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.forward_message_types.iter().cloned())
    }

    pub fn forwards(&self, message_type: &str) -> bool {
        self.forward_types.contains(message_type)
    }

    pub fn decide(&self, chunk: &UpstreamChunk) -> Decision {
        if chunk.is_empty() {
            return Decision::Drop("empty");
        }

        match chunk {
            UpstreamChunk::UsageStatistics => Decision::Drop("usage_statistics"),
            UpstreamChunk::AssistantMessage { content } => {
                self.typed(ASSISTANT_MESSAGE, Some(content))
            }
            UpstreamChunk::Typed {
                message_type,
                content,
            } => self.typed(message_type, content.as_ref()),
            UpstreamChunk::Other(raw) => Decision::Forward(StreamEvent::success(stringify(raw))),
        }
    }

    fn typed(&self, message_type: &str, content: Option<&String>) -> Decision {
        if !self.forwards(message_type) {
            return Decision::Drop("not_forwarded");
        }
        match content {
            Some(content) if !content.is_empty() => {
                Decision::Forward(StreamEvent::success(content.clone()))
            }
            _ => Decision::Drop("no_content"),
        }
    }
}

impl Default for RelayPolicy {
    fn default() -> Self {
        Self::new([ASSISTANT_MESSAGE])
    }
}

/// String form of an untyped chunk; bare strings are not re-quoted.
fn stringify(raw: &Value) -> String {
    match raw {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
