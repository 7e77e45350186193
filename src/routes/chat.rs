//! Chat endpoint
//!
//! `GET /chat?message=...` and `POST /chat {"message": ...}` both validate the
//! message, then answer with a `text/event-stream` relay of the agent's reply.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{Query, Request, State},
    http::{header, HeaderMap, Method, StatusCode},
    response::Response,
};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{
    error::{AppError, AppResult},
    relay::Relay,
    routes::metrics::record_relay_outcome,
    AppState,
};

/// Largest accepted POST body
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// A validated inbound chat message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    pub message: String,
}

impl ChatRequest {
    /// Accept a message only if it is present and non-empty.
    pub fn new(message: Option<String>) -> AppResult<Self> {
        match message {
            Some(message) if !message.is_empty() => Ok(Self { message }),
            _ => Err(no_message()),
        }
    }

    /// Validate a decoded JSON body.
    pub fn from_json(body: &Value) -> AppResult<Self> {
        match body.get("message") {
            None | Some(Value::Null) => Err(no_message()),
            Some(Value::String(message)) => Self::new(Some(message.clone())),
            Some(_) => Err(AppError::BadRequest("Message must be a string".to_string())),
        }
    }
}

fn no_message() -> AppError {
    AppError::BadRequest("No message provided".to_string())
}

/// Query string of `GET /chat`
#[derive(Debug, Deserialize)]
struct ChatQuery {
    message: Option<String>,
}

/// Whether the request declares a JSON body (`application/json` or `application/*+json`).
fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|mime| {
            let mime = mime.trim().to_ascii_lowercase();
            mime == "application/json"
                || (mime.starts_with("application/") && mime.ends_with("+json"))
        })
        .unwrap_or(false)
}

/// Pull the chat message out of a GET query or POST JSON body.
///
/// Reading the body is bounded by `body_timeout`; a stalled client gets the
/// usual JSON error body rather than a bare timeout status.
async fn extract_chat_request(request: Request, body_timeout: Duration) -> AppResult<ChatRequest> {
    if *request.method() == Method::GET {
        let Query(query) = Query::<ChatQuery>::try_from_uri(request.uri())
            .map_err(|e| AppError::BadRequest(format!("Invalid query string: {}", e)))?;
        return ChatRequest::new(query.message);
    }

    if !is_json(request.headers()) {
        return Err(AppError::BadRequest("Request must be JSON".to_string()));
    }

    let body = tokio::time::timeout(
        body_timeout,
        axum::body::to_bytes(request.into_body(), MAX_BODY_BYTES),
    )
    .await
    .map_err(|_| AppError::BadRequest("Timed out reading request body".to_string()))?
    .map_err(|e| AppError::BadRequest(format!("Failed to read request body: {}", e)))?;
    let body: Value = serde_json::from_slice(&body)?;

    ChatRequest::from_json(&body)
}

/// Handle chat requests
///
/// Validation failures answer `400` with a JSON error body and never reach the
/// agent. Anything after that is reported inside the event stream.
pub async fn chat(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Response, AppError> {
    let method = request.method().clone();

    let chat_request = match extract_chat_request(request, state.config.request_timeout()).await {
        Ok(chat_request) => chat_request,
        Err(e) => {
            warn!(method = %method, error = %e, "Rejected chat request");
            record_relay_outcome("rejected");
            return Err(e);
        }
    };

    info!(
        method = %method,
        message_len = chat_request.message.len(),
        agent_id = ?state.config.agent_id,
        "Processing chat request"
    );
    debug!(message = %chat_request.message, "Received message");

    let relay = Relay::new(
        state.agent.clone(),
        state.config.agent_id.clone(),
        chat_request.message,
        state.policy.clone(),
        state.limits,
    );
    let frames = relay
        .into_frames()
        .map(|frame| Ok::<_, Infallible>(frame.to_bytes()));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .header("X-Accel-Buffering", "no")
        .body(Body::from_stream(frames))
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to build response: {}", e)))
}
