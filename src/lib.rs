//! Agent Relay - streams a remote agent's replies to browsers over SSE
//!
//! Each chat request opens one streaming call to the agent service and
//! relays the reply as `text/event-stream` frames.

pub mod agent;
pub mod config;
pub mod error;
pub mod relay;
pub mod routes;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;

pub use crate::agent::{AgentClient, LettaClient};
pub use crate::config::Config;
pub use crate::relay::{Frame, RelayLimits, RelayPolicy, StreamEvent};

/// Application state shared across all request handlers
pub struct AppState {
    pub config: Config,
    /// Agent backend every chat is relayed from
    pub agent: Arc<dyn AgentClient>,
    /// Which upstream chunks reach clients
    pub policy: Arc<RelayPolicy>,
    pub limits: RelayLimits,
    pub start_time: Instant,
}

impl AppState {
    /// Create a new application state backed by the Letta API
    pub fn new(config: Config) -> Result<Self> {
        // No overall request timeout: relayed streams are bounded by RelayLimits
        let http_client = reqwest::Client::builder()
            .pool_max_idle_per_host(100)
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        let agent: Arc<dyn AgentClient> = Arc::new(LettaClient::new(http_client, &config));

        Ok(Self::with_agent(config, agent))
    }

    /// Create an application state around any agent backend
    pub fn with_agent(config: Config, agent: Arc<dyn AgentClient>) -> Self {
        let policy = Arc::new(RelayPolicy::from_config(&config));
        let limits = RelayLimits::from_config(&config);

        Self {
            config,
            agent,
            policy,
            limits,
            start_time: Instant::now(),
        }
    }
}
