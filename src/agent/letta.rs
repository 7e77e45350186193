//! Letta agent client
//!
//! Opens `POST /v1/agents/{agent_id}/messages/stream` and decodes the SSE
//! response into classified chunks.

use async_trait::async_trait;
use eventsource_stream::{Event, EventStreamError, Eventsource};
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde_json::Value;
use tracing::{debug, error, instrument};

use super::{
    types::{MessageCreate, StreamRequest, UpstreamChunk},
    AgentClient, ChunkStream, UpstreamError,
};
use crate::config::Config;

/// Data payload marking the end of the upstream stream
const DONE_MARKER: &str = "[DONE]";

/// Letta REST client
pub struct LettaClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl LettaClient {
    /// Create a new Letta client
    pub fn new(client: reqwest::Client, config: &Config) -> Self {
        Self {
            client,
            base_url: config.agent_api_url.clone(),
            api_key: config.agent_api_key.clone(),
        }
    }

    /// Build default headers for agent requests
    fn default_headers(&self) -> Result<HeaderMap, UpstreamError> {
        let mut headers = HeaderMap::new();
        if let Some(key) = &self.api_key {
            let value = HeaderValue::from_str(&format!("Bearer {}", key))
                .map_err(|_| UpstreamError::NotConfigured("a valid LETTA_API_KEY"))?;
            headers.insert(AUTHORIZATION, value);
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
        Ok(headers)
    }
}

#[async_trait]
impl AgentClient for LettaClient {
    fn name(&self) -> &'static str {
        "letta"
    }

    #[instrument(skip(self, messages))]
    async fn create_stream(
        &self,
        agent_id: &str,
        messages: Vec<MessageCreate>,
    ) -> Result<ChunkStream, UpstreamError> {
        let url = format!("{}/v1/agents/{}/messages/stream", self.base_url, agent_id);
        let body = StreamRequest {
            messages: &messages,
            stream_tokens: false,
        };

        debug!(url = %url, "Opening agent stream");

        let response = self
            .client
            .post(&url)
            .headers(self.default_headers()?)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(url = %url, error = %e, "Failed to reach agent service");
                UpstreamError::Http(e)
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Status { status, body });
        }

        let events = response.bytes_stream().eventsource();
        let chunks = async_stream::stream! {
            futures::pin_mut!(events);

            while let Some(item) = events.next().await {
                let event = match item {
                    Ok(event) => event,
                    Err(e) => {
                        yield Err(stream_error(e));
                        return;
                    }
                };
                // Comment-only blocks carry no data
                if event.data.is_empty() {
                    continue;
                }
                match decode_event(&event) {
                    Ok(Some(chunk)) => yield Ok(chunk),
                    Ok(None) => return,
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }
        };

        Ok(Box::pin(chunks))
    }
}

fn stream_error(e: EventStreamError<reqwest::Error>) -> UpstreamError {
    match e {
        EventStreamError::Transport(e) => UpstreamError::Http(e),
        other => UpstreamError::MalformedChunk(other.to_string()),
    }
}

/// Decode one SSE event. `Ok(None)` is the end-of-stream marker.
fn decode_event(event: &Event) -> Result<Option<UpstreamChunk>, UpstreamError> {
    let data = event.data.trim();
    if data == DONE_MARKER {
        return Ok(None);
    }

    if event.event == "error" {
        let detail = serde_json::from_str::<Value>(data)
            .map(|v| error_detail(&v).unwrap_or_else(|| v.to_string()))
            .unwrap_or_else(|_| data.to_string());
        return Err(UpstreamError::Agent(detail));
    }

    let value: Value = serde_json::from_str(data)
        .map_err(|e| UpstreamError::MalformedChunk(format!("{} in {:?}", e, truncate(data, 200))))?;

    if value.get("message_type").is_none() {
        if let Some(detail) = value.get("error").map(|_| error_detail(&value)) {
            return Err(UpstreamError::Agent(
                detail.unwrap_or_else(|| value["error"].to_string()),
            ));
        }
    }

    Ok(Some(UpstreamChunk::from_value(value)))
}

/// Pull a human-readable message out of an error payload.
fn error_detail(value: &Value) -> Option<String> {
    let error = value.get("error").unwrap_or(value);
    if let Some(s) = error.as_str() {
        return Some(s.to_string());
    }
    ["message", "detail"]
        .iter()
        .find_map(|key| error.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
