//! End-to-end: live session mock -> bridge -> dispatcher -> wiremock relay.

mod mock_providers;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use mock_providers::{LiveMockState, client_text, model_text, tool_call, turn_complete};
use voice_relay::core::relay::HttpRelayClient;
use voice_relay::core::session::{FunctionDeclaration, ResponseModality, SessionConfig};
use voice_relay::{DispatchOutcome, EntryKind, Role, SessionBridge, create_session};

fn session_config(endpoint: &str) -> SessionConfig {
    SessionConfig {
        api_key: "test-key".to_string(),
        response_modality: ResponseModality::Text,
        functions: vec![
            FunctionDeclaration::new("send_message", "Forward a request").required("message"),
            FunctionDeclaration::new("create_task", "Create a task")
                .required("title")
                .optional("notes"),
        ],
        endpoint: Some(endpoint.to_string()),
        ..Default::default()
    }
}

/// Replies with `call` to the first user text, with "Done." to the tool
/// response and with a short answer to any later text.
fn assistant_calling(state: &LiveMockState, call: serde_json::Value) {
    let called = AtomicBool::new(false);
    state.set_responder(Arc::new(move |message: &serde_json::Value| {
        if client_text(message).is_some() {
            if called.swap(true, Ordering::SeqCst) {
                vec![model_text("Nothing else."), turn_complete()]
            } else {
                vec![call.clone()]
            }
        } else if message.get("toolResponse").is_some() {
            vec![model_text("Done."), turn_complete()]
        } else {
            Vec::new()
        }
    }));
}

async fn wait_until(mut check: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not met in time");
}

async fn bridge_for(state: Arc<LiveMockState>, relay: &MockServer) -> SessionBridge {
    let url = mock_providers::spawn_live_mock(state).await;
    let session = create_session("gemini", session_config(&url)).unwrap();
    let relay = HttpRelayClient::new(relay.uri(), "s3cret").unwrap();
    SessionBridge::new(session, Arc::new(relay))
}

#[tokio::test]
async fn test_action_dispatched_once_and_answered() {
    let relay = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/action"))
        .and(body_json(json!({
            "secret": "s3cret",
            "action": "create_task",
            "params": { "title": "Buy milk" }
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "status": "sent", "message": "Task created" })),
        )
        .expect(1)
        .mount(&relay)
        .await;

    let state = LiveMockState::new();
    assistant_calling(
        &state,
        tool_call("call-1", "create_task", json!({ "title": "Buy milk" })),
    );
    let bridge = bridge_for(state.clone(), &relay).await;

    bridge.start().await.unwrap();
    assert!(bridge.is_connected());

    bridge.send_text("add buy milk to my tasks").await.unwrap();

    wait_until(|| {
        bridge
            .records()
            .iter()
            .any(|r| r.outcome == DispatchOutcome::Sent)
    })
    .await;
    wait_until(|| {
        bridge
            .conversation()
            .iter()
            .any(|e| e.text == "Done.")
    })
    .await;

    let records = bridge.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].name, "create_task");
    assert_eq!(records[0].message.as_deref(), Some("Task created"));

    let tool_response = state
        .received()
        .into_iter()
        .find(|m| m.get("toolResponse").is_some())
        .unwrap();
    let response = &tool_response["toolResponse"]["functionResponses"][0];
    assert_eq!(response["id"], "call-1");
    assert_eq!(response["response"]["status"], "sent");
    assert_eq!(response["response"]["success"], true);

    let conversation = bridge.conversation();
    let texts: Vec<(Role, EntryKind, &str)> = conversation
        .iter()
        .map(|e| (e.role, e.kind, e.text.as_str()))
        .collect();
    assert_eq!(
        texts,
        vec![
            (Role::User, EntryKind::Speech, "add buy milk to my tasks"),
            (
                Role::Assistant,
                EntryKind::Dispatch,
                "Dispatching create_task(title=\"Buy milk\")"
            ),
            (
                Role::Assistant,
                EntryKind::DispatchResult,
                "create_task sent: Task created"
            ),
            (Role::Assistant, EntryKind::Speech, "Done."),
        ]
    );

    bridge.stop().await.unwrap();
    assert!(!bridge.is_connected());
    assert!(!bridge.state().connected);
}

#[tokio::test]
async fn test_send_message_failure_is_recorded_not_retried() {
    let relay = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/command"))
        .and(body_json(json!({ "secret": "s3cret", "command": "status please" })))
        .respond_with(ResponseTemplate::new(500).set_body_string("relay down"))
        .expect(1)
        .mount(&relay)
        .await;
    Mock::given(method("POST"))
        .and(path("/action"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "sent" })))
        .expect(0)
        .mount(&relay)
        .await;

    let state = LiveMockState::new();
    assistant_calling(
        &state,
        tool_call("call-9", "send_message", json!({ "message": "status please" })),
    );
    let bridge = bridge_for(state.clone(), &relay).await;

    bridge.start().await.unwrap();
    bridge.send_text("ask the relay for status").await.unwrap();

    wait_until(|| {
        bridge
            .records()
            .iter()
            .any(|r| r.outcome == DispatchOutcome::Failed)
    })
    .await;
    bridge.wait_for_dispatches().await;

    // Later events rescan the log without dispatching again
    bridge.send_text("anything else?").await.unwrap();
    wait_until(|| {
        bridge
            .conversation()
            .iter()
            .any(|e| e.text == "anything else?")
    })
    .await;
    bridge.wait_for_dispatches().await;

    let records = bridge.records();
    assert_eq!(records.len(), 1);
    assert!(records[0].message.as_deref().unwrap_or("").contains("500"));

    let conversation = bridge.conversation();
    assert!(conversation.iter().any(|e| e.kind == EntryKind::Dispatch
        && e.text == "Sending message to relay: \"status please\""));
    assert!(
        conversation
            .iter()
            .any(|e| e.kind == EntryKind::DispatchResult && e.text.starts_with("send_message failed"))
    );

    bridge.stop().await.unwrap();
}

#[tokio::test]
async fn test_conversation_survives_server_close() {
    let relay = MockServer::start().await;

    let state = LiveMockState::new();
    state.push_initial(model_text("Hello there."));
    state.push_initial(turn_complete());
    state
        .close_after_initial
        .store(true, Ordering::Relaxed);
    let bridge = bridge_for(state.clone(), &relay).await;

    let mut state_rx = bridge.subscribe();
    bridge.start().await.unwrap();

    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let snapshot = state_rx.borrow_and_update().clone();
            if !snapshot.connected && !snapshot.conversation.is_empty() {
                break;
            }
            if state_rx.changed().await.is_err() {
                break;
            }
        }
    })
    .await
    .expect("disconnect not published");

    let conversation = bridge.conversation();
    assert_eq!(conversation.len(), 1);
    assert_eq!(conversation[0].role, Role::Assistant);
    assert_eq!(conversation[0].text, "Hello there.");
    assert!(!bridge.is_connected());

    assert!(bridge.send_text("are you there?").await.is_err());
}
