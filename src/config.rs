//! Configuration management for the relay
//!
//! Configuration is loaded from environment variables.

use anyhow::{Context, Result};
use std::env;
use std::time::Duration;

/// Message types forwarded to clients when no allow-list is configured
pub const DEFAULT_FORWARD_MESSAGE_TYPES: &str = "assistant_message";

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,

    /// Agent service base URL
    pub agent_api_url: String,
    /// Agent service API key
    pub agent_api_key: Option<String>,
    /// Identifier of the agent every chat is sent to
    pub agent_id: Option<String>,

    /// Upstream `message_type` values relayed to clients
    pub forward_message_types: Vec<String>,

    /// Max wait for the first upstream chunk (in seconds)
    pub first_chunk_timeout_secs: u64,
    /// Max duration of a whole relayed stream (in seconds)
    pub stream_timeout_secs: u64,
    /// Max time to read a request body (in seconds)
    pub request_timeout_secs: u64,

    /// Emit logs as JSON lines
    pub log_json: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        Ok(Self {
            host: var("RELAY_HOST", "127.0.0.1"),
            port: var("RELAY_PORT", "5000")
                .parse()
                .context("Invalid RELAY_PORT")?,

            agent_api_url: var("LETTA_BASE_URL", "https://api.letta.com")
                .trim_end_matches('/')
                .to_string(),
            agent_api_key: lookup("LETTA_API_KEY").filter(|v| !v.is_empty()),
            agent_id: lookup("LETTA_AGENT_ID").filter(|v| !v.is_empty()),

            forward_message_types: parse_list(&var(
                "RELAY_FORWARD_MESSAGE_TYPES",
                DEFAULT_FORWARD_MESSAGE_TYPES,
            )),

            first_chunk_timeout_secs: var("RELAY_FIRST_CHUNK_TIMEOUT_SECS", "60")
                .parse()
                .context("Invalid RELAY_FIRST_CHUNK_TIMEOUT_SECS")?,
            stream_timeout_secs: var("RELAY_STREAM_TIMEOUT_SECS", "600")
                .parse()
                .context("Invalid RELAY_STREAM_TIMEOUT_SECS")?,
            request_timeout_secs: var("RELAY_REQUEST_TIMEOUT_SECS", "30")
                .parse()
                .context("Invalid RELAY_REQUEST_TIMEOUT_SECS")?,

            log_json: lookup("LOG_FORMAT")
                .map(|v| v.eq_ignore_ascii_case("json"))
                .unwrap_or(false),
        })
    }

    /// Wait bound for the first upstream chunk
    pub fn first_chunk_timeout(&self) -> Duration {
        Duration::from_secs(self.first_chunk_timeout_secs)
    }

    /// Wait bound for a whole relayed stream
    pub fn stream_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_timeout_secs)
    }

    /// Wait bound for reading a POST body
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
