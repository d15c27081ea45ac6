//! End-to-end tests for the DeskPilot runtime.
//!
//! A local stub speaks the OpenAI chat-completions protocol, so these tests
//! run the real provider adapter, the agent loop, the demo helpdesk tools,
//! the file-backed memory and the HTTP gateway together.

use std::collections::HashMap;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use deskpilot_agent::InboundMessage;
use deskpilot_config::{AppConfig, ProviderConfig};
use deskpilot_core::memory::ConversationStore;
use deskpilot_core::message::Role;
use deskpilot_core::reply::AgentReply;
use deskpilot_gateway::runtime::{demo_toolset, Runtime};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceExt;

// ── Stub model ───────────────────────────────────────────────────────────

fn tool_call(id: &str, name: &str, arguments: Value) -> Value {
    json!({
        "model": "stub-model",
        "choices": [{ "message": {
            "role": "assistant",
            "content": null,
            "tool_calls": [{
                "id": id,
                "type": "function",
                "function": { "name": name, "arguments": arguments.to_string() }
            }]
        }}],
        "usage": { "prompt_tokens": 100, "completion_tokens": 10, "total_tokens": 110 }
    })
}

fn text(content: &str) -> Value {
    json!({
        "model": "stub-model",
        "choices": [{ "message": { "role": "assistant", "content": content } }],
        "usage": { "prompt_tokens": 120, "completion_tokens": 20, "total_tokens": 140 }
    })
}

/// Decides the next step from the last message, like a well-behaved model.
async fn chat_completions(Json(body): Json<Value>) -> Json<Value> {
    let messages = body["messages"].as_array().cloned().unwrap_or_default();
    let last = messages.last().cloned().unwrap_or_default();

    if last["role"] == "tool" {
        let result: Value = serde_json::from_str(last["content"].as_str().unwrap_or("{}")).unwrap_or_default();
        let ids: Vec<String> = result["tickets"]
            .as_array()
            .into_iter()
            .flatten()
            .map(|t| format!("#{}", t["id"]))
            .collect();
        return Json(text(&format!("Você tem {} chamados: {}.", result["total"], ids.join(", "))));
    }

    let user_text = last["content"].as_str().unwrap_or_default();
    if user_text.contains("meus chamados") {
        Json(tool_call("call_1", "list_my_tickets", json!({})))
    } else if user_text.contains("abrir chamado") {
        Json(tool_call(
            "call_2",
            "respond_interactive",
            json!({
                "message_type": "buttons",
                "text": "Confirma a abertura do chamado?",
                "buttons": [{ "id": "confirmar", "title": "Confirmar" }, { "id": "cancelar", "title": "Cancelar" }]
            }),
        ))
    } else {
        Json(text(&format!("Histórico com {} mensagens.", messages.len())))
    }
}

async fn serve_stub() -> String {
    let app = Router::new().route("/chat/completions", post(chat_completions));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn config(stub_url: &str, memory_file: &std::path::Path) -> AppConfig {
    let mut providers = HashMap::new();
    providers.insert(
        "openai".to_string(),
        ProviderConfig {
            api_key: Some("sk-test".into()),
            api_url: Some(stub_url.to_string()),
            default_model: None,
        },
    );
    let mut config = AppConfig {
        providers,
        ..AppConfig::default()
    };
    config.memory.backend = "file".into();
    config.memory.path = Some(memory_file.display().to_string());
    config
}

async fn runtime(config: AppConfig) -> Runtime {
    let toolsets = demo_toolset(&config.tools);
    Runtime::from_config(config, toolsets).await.unwrap()
}

// ── Tests ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn tickets_listed_through_the_whole_stack() {
    let stub = serve_stub().await;
    let dir = tempfile::tempdir().unwrap();
    let runtime = runtime(config(&stub, &dir.path().join("memory.json"))).await;

    let reply = runtime
        .dispatcher
        .dispatch(&InboundMessage::new("5511999990000", "quais são meus chamados?"))
        .await
        .unwrap();
    for id in ["#1201", "#1202", "#1203"] {
        assert!(reply.body().contains(id), "missing {id} in {}", reply.body());
    }

    let turns = runtime.memory.get("5511999990000").await;
    let roles: Vec<Role> = turns.iter().map(|t| t.role).collect();
    assert_eq!(roles, vec![Role::User, Role::Assistant, Role::Tool, Role::Assistant]);
}

#[tokio::test]
async fn conversation_survives_a_restart() {
    let stub = serve_stub().await;
    let dir = tempfile::tempdir().unwrap();
    let memory_file = dir.path().join("memory.json");

    {
        let first = runtime(config(&stub, &memory_file)).await;
        first
            .dispatcher
            .dispatch(&InboundMessage::new("5511", "quais são meus chamados?"))
            .await
            .unwrap();
    }

    let second = runtime(config(&stub, &memory_file)).await;
    let reply = second
        .dispatcher
        .dispatch(&InboundMessage::new("5511", "e agora?"))
        .await
        .unwrap();
    // system prompt, the four stored turns and the new user turn
    assert_eq!(reply.body(), "Histórico com 6 mensagens.");
}

#[tokio::test]
async fn interactive_reply_over_http() {
    let stub = serve_stub().await;
    let dir = tempfile::tempdir().unwrap();
    let runtime = Arc::new(runtime(config(&stub, &dir.path().join("memory.json"))).await);

    let req = Request::builder()
        .method("POST")
        .uri("/v1/messages")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({ "user_id": "5511", "message_id": "wamid.1", "text": "quero abrir chamado" }).to_string(),
        ))
        .unwrap();
    let response = deskpilot_gateway::build_router(runtime.clone()).oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["status"], "ok");
    let reply: AgentReply = serde_json::from_value(body["reply"].clone()).unwrap();
    match reply {
        AgentReply::Choices { text, choices } => {
            assert_eq!(text, "Confirma a abertura do chamado?");
            assert_eq!(choices[0].id, "confirmar");
        }
        other => panic!("unexpected reply {other:?}"),
    }

    // The stored exchange stays protocol-valid for the next run.
    let turns = runtime.memory.get("5511").await;
    assert_eq!(turns.len(), 3);
    assert_eq!(turns[2].role, Role::Tool);
}
