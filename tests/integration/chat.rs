//! Chat Endpoint Integration Tests
//!
//! Tests for `GET /chat` and `POST /chat`:
//! - Request validation (missing, empty, non-JSON)
//! - Relay of assistant messages and filtering of other chunks
//! - In-stream error frames for upstream failures
//! - Frame well-formedness and repeatability

use std::sync::Arc;

use agent_relay::{agent::UpstreamChunk, Frame, StreamEvent};
use axum::http::{header, StatusCode};
use bytes::Bytes;
use pretty_assertions::assert_eq;
use serde_json::json;

use crate::common::{constants, parse_frames, server_with_agent, FailingAgent, TestHarness};
use crate::mocks::letta::{LettaTestData, MockLetta};

fn success(message: &str) -> Frame {
    Frame::Event(StreamEvent::success(message))
}

fn assert_single_error_frame(frames: &[Frame], expected_fragment: &str) {
    assert_eq!(frames.len(), 1, "expected one frame, got {:?}", frames);
    match &frames[0] {
        Frame::Event(event) => {
            assert_eq!(event.status, agent_relay::error::Status::Error);
            assert!(event.message.starts_with("Error: "), "{}", event.message);
            assert!(
                event.message.contains(expected_fragment),
                "{:?} should contain {:?}",
                event.message,
                expected_fragment
            );
        }
        Frame::Done => panic!("expected an error frame"),
    }
}

// =============================================================================
// Validation
// =============================================================================

#[tokio::test]
async fn test_get_without_message_is_rejected() {
    let harness = TestHarness::new().await;

    let response = harness.server.get("/chat").await;

    response.assert_status(StatusCode::BAD_REQUEST);
    response.assert_json(&json!({"message": "No message provided", "status": "error"}));
    assert!(harness.letta.received_requests().await.is_empty());
}

#[tokio::test]
async fn test_get_with_empty_message_is_rejected() {
    let harness = TestHarness::new().await;

    let response = harness
        .server
        .get("/chat")
        .add_query_param("message", "")
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert!(harness.letta.received_requests().await.is_empty());
}

#[tokio::test]
async fn test_post_without_message_is_rejected() {
    let harness = TestHarness::new().await;

    let response = harness
        .server
        .post("/chat")
        .json(&json!({"text": "wrong field"}))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    response.assert_json(&json!({"message": "No message provided", "status": "error"}));
    assert!(harness.letta.received_requests().await.is_empty());
}

#[tokio::test]
async fn test_post_with_empty_message_is_rejected() {
    let harness = TestHarness::new().await;

    let response = harness
        .server
        .post("/chat")
        .json(&json!({"message": ""}))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert!(harness.letta.received_requests().await.is_empty());
}

#[tokio::test]
async fn test_post_non_json_is_rejected() {
    let harness = TestHarness::new().await;

    let response = harness.server.post("/chat").text("message=hello").await;

    response.assert_status(StatusCode::BAD_REQUEST);
    response.assert_json(&json!({"message": "Request must be JSON", "status": "error"}));
    assert!(harness.letta.received_requests().await.is_empty());
}

#[tokio::test]
async fn test_post_malformed_json_is_rejected() {
    let harness = TestHarness::new().await;

    let response = harness
        .server
        .post("/chat")
        .content_type("application/json")
        .bytes(Bytes::from_static(b"{\"message\": "))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "error");
    assert!(harness.letta.received_requests().await.is_empty());
}

// =============================================================================
// Relay
// =============================================================================

#[tokio::test]
async fn test_get_relays_assistant_messages_in_order() {
    let harness = TestHarness::new().await;
    harness
        .letta
        .mock_stream(
            constants::TEST_AGENT_ID,
            vec![
                LettaTestData::assistant("Hi"),
                LettaTestData::usage(),
                LettaTestData::assistant("there"),
            ],
        )
        .await;

    let response = harness
        .server
        .get("/chat")
        .add_query_param("message", "Hello")
        .await;

    response.assert_status_ok();
    assert_eq!(
        response.header(header::CONTENT_TYPE).to_str().unwrap(),
        "text/event-stream"
    );
    assert_eq!(
        parse_frames(&response.text()),
        vec![success("Hi"), success("there"), Frame::Done]
    );
}

#[tokio::test]
async fn test_post_sends_exact_message_once() {
    let harness = TestHarness::new().await;
    harness
        .letta
        .mock_stream_expecting(
            constants::TEST_AGENT_ID,
            "What's the weather like?",
            vec![LettaTestData::assistant("Sunny.")],
        )
        .await;

    let response = harness
        .server
        .post("/chat")
        .json(&json!({"message": "What's the weather like?"}))
        .await;

    response.assert_status_ok();
    assert_eq!(
        parse_frames(&response.text()),
        vec![success("Sunny."), Frame::Done]
    );

    let requests = harness.letta.received_requests().await;
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0].url.path(),
        MockLetta::stream_path(constants::TEST_AGENT_ID)
    );
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body, LettaTestData::stream_request("What's the weather like?"));
}

#[tokio::test]
async fn test_unrecognized_typed_chunks_are_dropped() {
    let harness = TestHarness::new().await;
    harness
        .letta
        .mock_stream(
            constants::TEST_AGENT_ID,
            vec![
                LettaTestData::reasoning("The user greeted me."),
                LettaTestData::assistant("Hello!"),
                LettaTestData::stop_reason(),
                LettaTestData::usage(),
            ],
        )
        .await;

    let response = harness
        .server
        .get("/chat")
        .add_query_param("message", "Hi")
        .await;

    assert_eq!(
        parse_frames(&response.text()),
        vec![success("Hello!"), Frame::Done]
    );
}

#[tokio::test]
async fn test_allow_list_forwards_configured_types() {
    let harness = TestHarness::with_vars(&[(
        "RELAY_FORWARD_MESSAGE_TYPES",
        "assistant_message,reasoning_message",
    )])
    .await;
    harness
        .letta
        .mock_stream(
            constants::TEST_AGENT_ID,
            vec![
                LettaTestData::reasoning("Thinking..."),
                LettaTestData::assistant("Done thinking."),
            ],
        )
        .await;

    let response = harness
        .server
        .get("/chat")
        .add_query_param("message", "Hi")
        .await;

    assert_eq!(
        parse_frames(&response.text()),
        vec![success("Thinking..."), success("Done thinking."), Frame::Done]
    );
}

#[tokio::test]
async fn test_untyped_chunk_is_forwarded_as_string() {
    let harness = TestHarness::new().await;
    harness
        .letta
        .mock_stream(constants::TEST_AGENT_ID, vec![json!({"note": "X"})])
        .await;

    let response = harness
        .server
        .get("/chat")
        .add_query_param("message", "Hi")
        .await;

    assert_eq!(
        parse_frames(&response.text()),
        vec![success("{\"note\":\"X\"}"), Frame::Done]
    );
}

#[tokio::test]
async fn test_falsy_untyped_chunks_are_skipped() {
    let harness = TestHarness::new().await;
    harness
        .letta
        .mock_stream(
            constants::TEST_AGENT_ID,
            vec![
                json!(0),
                LettaTestData::assistant("kept"),
                json!(0.0),
                json!(false),
                json!(""),
                json!(7),
            ],
        )
        .await;

    let response = harness
        .server
        .get("/chat")
        .add_query_param("message", "Hi")
        .await;

    assert_eq!(
        parse_frames(&response.text()),
        vec![success("kept"), success("7"), Frame::Done]
    );
}

#[tokio::test]
async fn test_crlf_framed_upstream_is_decoded() {
    let harness = TestHarness::new().await;
    let body = concat!(
        ": keep-alive\r\n\r\n",
        "data: {\"message_type\":\"assistant_message\",\"content\":\"first\"}\r\n\r\n",
        "event: message\r\n",
        "data: {\"message_type\":\"assistant_message\",\r\n",
        "data: \"content\":\"second\"}\r\n\r\n",
        "data: [DONE]\r\n\r\n",
    );
    harness
        .letta
        .mock_raw_stream(constants::TEST_AGENT_ID, body)
        .await;

    let response = harness
        .server
        .get("/chat")
        .add_query_param("message", "Hi")
        .await;

    assert_eq!(
        parse_frames(&response.text()),
        vec![success("first"), success("second"), Frame::Done]
    );
}

#[tokio::test]
async fn test_malformed_chunk_mid_stream_ends_with_error() {
    let harness = TestHarness::new().await;
    let body = format!(
        "data: {}\n\ndata: this is not json\n\ndata: {}\n\ndata: [DONE]\n\n",
        LettaTestData::assistant("partial"),
        LettaTestData::assistant("never relayed"),
    );
    harness
        .letta
        .mock_raw_stream(constants::TEST_AGENT_ID, &body)
        .await;

    let response = harness
        .server
        .get("/chat")
        .add_query_param("message", "Hi")
        .await;

    response.assert_status_ok();
    let frames = parse_frames(&response.text());
    assert_eq!(frames[0], success("partial"));
    assert_single_error_frame(&frames[1..], "malformed chunk");
    assert!(!frames.contains(&Frame::Done));
}

#[tokio::test]
async fn test_upstream_error_event_becomes_error_frame() {
    let harness = TestHarness::new().await;
    harness
        .letta
        .mock_raw_stream(
            constants::TEST_AGENT_ID,
            "event: error\ndata: {\"error\":{\"type\":\"internal_error\",\"message\":\"LLM unavailable\"}}\n\n",
        )
        .await;

    let response = harness
        .server
        .get("/chat")
        .add_query_param("message", "Hi")
        .await;

    assert_single_error_frame(&parse_frames(&response.text()), "LLM unavailable");
}

#[tokio::test]
async fn test_upstream_auth_failure_becomes_error_frame() {
    let harness = TestHarness::new().await;
    harness
        .letta
        .mock_error(
            constants::TEST_AGENT_ID,
            401,
            json!({"detail": "Invalid API key"}),
        )
        .await;

    let response = harness
        .server
        .post("/chat")
        .json(&json!({"message": "Hi"}))
        .await;

    // Headers are already sent when the upstream call fails
    response.assert_status_ok();
    assert_single_error_frame(&parse_frames(&response.text()), "401");
}

#[tokio::test]
async fn test_missing_agent_id_becomes_error_frame() {
    let harness = TestHarness::with_vars(&[("LETTA_AGENT_ID", "")]).await;

    let response = harness
        .server
        .get("/chat")
        .add_query_param("message", "Hi")
        .await;

    response.assert_status_ok();
    assert_single_error_frame(
        &parse_frames(&response.text()),
        "LETTA_AGENT_ID is not configured",
    );
    assert!(harness.letta.received_requests().await.is_empty());
}

#[tokio::test]
async fn test_connection_failure_mid_stream() {
    let agent = Arc::new(FailingAgent::new(vec![UpstreamChunk::AssistantMessage {
        content: "Hello".to_string(),
    }]));
    let server = server_with_agent(agent.clone());

    let response = server.get("/chat").add_query_param("message", "Hi").await;

    let frames = parse_frames(&response.text());
    assert_eq!(frames[0], success("Hello"));
    assert_single_error_frame(&frames[1..], "connection reset by peer");
    assert_eq!(agent.call_count(), 1);
}

#[tokio::test]
async fn test_repeated_requests_yield_identical_frames() {
    let harness = TestHarness::new().await;
    harness
        .letta
        .mock_stream(
            constants::TEST_AGENT_ID,
            vec![
                LettaTestData::assistant("One"),
                LettaTestData::usage(),
                json!("raw text"),
                LettaTestData::assistant("Two"),
            ],
        )
        .await;

    let first = harness
        .server
        .post("/chat")
        .json(&json!({"message": "Same"}))
        .await
        .text();
    let second = harness
        .server
        .post("/chat")
        .json(&json!({"message": "Same"}))
        .await
        .text();

    assert_eq!(first, second);
    assert_eq!(
        parse_frames(&first),
        vec![success("One"), success("raw text"), success("Two"), Frame::Done]
    );
    assert_eq!(harness.letta.received_requests().await.len(), 2);
}

#[tokio::test]
async fn test_every_frame_is_sentinel_or_event() {
    let harness = TestHarness::new().await;
    harness
        .letta
        .mock_stream(
            constants::TEST_AGENT_ID,
            vec![
                LettaTestData::assistant("multi\nline \"quoted\" text"),
                json!([1, 2, 3]),
                LettaTestData::assistant("ünïcødé ✓"),
            ],
        )
        .await;

    let response = harness
        .server
        .get("/chat")
        .add_query_param("message", "Hi")
        .await;

    let body = response.text();
    for part in body.split("\n\n").filter(|p| !p.is_empty()) {
        let payload = part.strip_prefix("data: ").expect("frame should start with data:");
        if payload != "[DONE]" {
            let value: serde_json::Value = serde_json::from_str(payload).unwrap();
            assert!(value["message"].is_string());
            assert!(value["status"] == "success" || value["status"] == "error");
        }
    }
    assert_eq!(
        parse_frames(&body),
        vec![
            success("multi\nline \"quoted\" text"),
            success("[1,2,3]"),
            success("ünïcødé ✓"),
            Frame::Done,
        ]
    );
}
