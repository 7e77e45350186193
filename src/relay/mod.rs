//! Agent-to-browser relay
//!
//! Opens one agent call per chat request and turns its chunks into a lazy,
//! finite stream of outbound frames:
//!
//! `upstream-open -> relaying -> terminated(done | error)`
//!
//! Upstream failures never escape as errors; they become a single terminal
//! error frame. The upstream stream is owned by the relay, so dropping the
//! relay (client disconnect) closes the upstream connection too.

pub mod frame;
pub mod policy;

use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, StreamExt};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::agent::{AgentClient, MessageCreate, UpstreamError};
use crate::config::Config;
use crate::routes::metrics::{
    adjust_active_streams, record_dropped_chunk, record_frame, record_relay_outcome,
    record_stream_duration,
};

pub use frame::{Frame, StreamEvent, DONE_SENTINEL};
pub use policy::{Decision, RelayPolicy};

/// Time bounds for one relay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayLimits {
    /// Max wait for the call to open and yield its first chunk
    pub first_chunk: Duration,
    /// Max duration of the whole relay
    pub total: Duration,
}

impl RelayLimits {
    pub fn from_config(config: &Config) -> Self {
        Self {
            first_chunk: config.first_chunk_timeout(),
            total: config.stream_timeout(),
        }
    }
}

impl Default for RelayLimits {
    fn default() -> Self {
        Self {
            first_chunk: Duration::from_secs(60),
            total: Duration::from_secs(600),
        }
    }
}

/// One chat message on its way to the agent and back
pub struct Relay {
    agent: Arc<dyn AgentClient>,
    agent_id: Option<String>,
    message: String,
    policy: Arc<RelayPolicy>,
    limits: RelayLimits,
}

impl Relay {
    pub fn new(
        agent: Arc<dyn AgentClient>,
        agent_id: Option<String>,
        message: String,
        policy: Arc<RelayPolicy>,
        limits: RelayLimits,
    ) -> Self {
        Self {
            agent,
            agent_id,
            message,
            policy,
            limits,
        }
    }

    /// Run the relay as a stream of frames.
    ///
    /// Nothing happens until the stream is polled. The last frame is always
    /// either [`Frame::Done`] or an error-status event.
    pub fn into_frames(self) -> impl Stream<Item = Frame> + Send + 'static {
        let Relay {
            agent,
            agent_id,
            message,
            policy,
            limits,
        } = self;

        async_stream::stream! {
            let mut guard = RelayGuard::start();
            let relay_id = guard.relay_id;

            let deadline = Instant::now() + limits.total;
            let first_deadline = (Instant::now() + limits.first_chunk).min(deadline);

            let opened = match agent_id.as_deref() {
                None => Err(UpstreamError::NotConfigured("LETTA_AGENT_ID")),
                Some(agent_id) => {
                    debug!(%relay_id, agent = agent.name(), %agent_id, "Starting streaming response from agent");
                    let messages = vec![MessageCreate::user_text(message)];
                    match timeout_at(first_deadline, agent.create_stream(agent_id, messages)).await {
                        Ok(result) => result,
                        Err(_) => Err(UpstreamError::Timeout("the agent service to respond")),
                    }
                }
            };

            let mut chunks = match opened {
                Ok(chunks) => chunks,
                Err(e) => {
                    yield guard.fail(e);
                    return;
                }
            };

            let mut received_any = false;
            loop {
                let wait_until = if received_any { deadline } else { first_deadline };
                let next = match timeout_at(wait_until, chunks.next()).await {
                    Ok(next) => next,
                    Err(_) if received_any => {
                        yield guard.fail(UpstreamError::Timeout("the stream to finish"));
                        return;
                    }
                    Err(_) => {
                        yield guard.fail(UpstreamError::Timeout("the first chunk"));
                        return;
                    }
                };

                let chunk = match next {
                    None => break,
                    Some(Ok(chunk)) => chunk,
                    Some(Err(e)) => {
                        yield guard.fail(e);
                        return;
                    }
                };
                received_any = true;
                debug!(%relay_id, ?chunk, "Received chunk");

                match policy.decide(&chunk) {
                    Decision::Forward(event) => {
                        debug!(%relay_id, message = %event.message, "Sending content to client");
                        record_frame("event");
                        yield Frame::Event(event);
                    }
                    Decision::Drop(reason) => {
                        debug!(%relay_id, reason, "Dropping chunk");
                        record_dropped_chunk(reason);
                    }
                }
            }

            debug!(%relay_id, "Streaming complete");
            yield guard.complete();
        }
    }
}

/// Tracks how a relay ended, including the case where it never got to.
struct RelayGuard {
    relay_id: Uuid,
    started: std::time::Instant,
    finished: bool,
}

impl RelayGuard {
    fn start() -> Self {
        adjust_active_streams(1.0);
        Self {
            relay_id: Uuid::new_v4(),
            started: std::time::Instant::now(),
            finished: false,
        }
    }

    fn fail(&mut self, e: UpstreamError) -> Frame {
        error!(relay_id = %self.relay_id, error = %e, "Error in stream generation");
        self.finish("upstream_error");
        record_frame("error");
        Frame::Event(StreamEvent::error(format!("Error: {}", e)))
    }

    fn complete(&mut self) -> Frame {
        self.finish("completed");
        record_frame("done");
        Frame::Done
    }

    fn finish(&mut self, outcome: &'static str) {
        self.finished = true;
        record_relay_outcome(outcome);
        record_stream_duration(self.started.elapsed().as_secs_f64());
    }
}

impl Drop for RelayGuard {
    fn drop(&mut self) {
        adjust_active_streams(-1.0);
        if !self.finished {
            info!(
                relay_id = %self.relay_id,
                elapsed_ms = self.started.elapsed().as_millis() as u64,
                "Client disconnected before stream completed"
            );
            record_relay_outcome("disconnected");
        }
    }
}
