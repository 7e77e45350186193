//! Agent service abstraction
//!
//! Defines the trait the relay talks to, so the Letta backend can be swapped
//! for a scripted source in tests.

pub mod letta;
pub mod types;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use thiserror::Error;

pub use letta::LettaClient;
pub use types::{MessageCreate, UpstreamChunk};

/// Stream of classified chunks from one agent call
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<UpstreamChunk, UpstreamError>> + Send>>;

/// Failures while opening or reading an agent stream
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("request to agent service failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("agent service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed chunk from agent service: {0}")]
    MalformedChunk(String),

    #[error("agent service reported an error: {0}")]
    Agent(String),

    #[error("timed out waiting for {0}")]
    Timeout(&'static str),
}

/// Interface to a remote conversational agent
///
/// # Security
///
/// Implementations use the credential from configuration and never forward
/// anything from the inbound HTTP request other than the message text.
#[async_trait]
pub trait AgentClient: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &'static str;

    /// Open one streaming call to `agent_id` with the given messages.
    async fn create_stream(
        &self,
        agent_id: &str,
        messages: Vec<MessageCreate>,
    ) -> Result<ChunkStream, UpstreamError>;
}
