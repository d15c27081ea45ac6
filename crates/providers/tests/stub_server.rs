//! Adapters against a local stub of the vendor endpoints.

use axum::extract::Path;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use deskpilot_core::error::ProviderError;
use deskpilot_core::message::ConversationTurn;
use deskpilot_core::provider::{Provider, ProviderRequest};
use deskpilot_providers::{GeminiProvider, OpenAiCompatProvider};
use serde_json::{json, Value};
use tokio::net::TcpListener;

async fn serve(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn request(text: &str) -> ProviderRequest {
    ProviderRequest {
        model: "test-model".into(),
        system: "Você é Laia".into(),
        messages: vec![ConversationTurn::user(text)],
        tools: vec![],
        temperature: 0.3,
        max_tokens: Some(256),
    }
}

async fn chat_completions(headers: HeaderMap, Json(body): Json<Value>) -> impl IntoResponse {
    if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some("Bearer sk-good") {
        return (StatusCode::UNAUTHORIZED, "invalid api key").into_response();
    }
    let last = body["messages"].as_array().and_then(|m| m.last()).cloned().unwrap_or_default();
    match last["content"].as_str().unwrap_or_default() {
        "overflow" => (
            StatusCode::BAD_REQUEST,
            r#"{"error":{"code":"context_length_exceeded","message":"maximum context length is 8192 tokens"}}"#,
        )
            .into_response(),
        "busy" => (StatusCode::TOO_MANY_REQUESTS, [("retry-after", "7")], "slow down").into_response(),
        "garbage" => (StatusCode::OK, "not json").into_response(),
        "empty" => Json(json!({ "model": "test-model", "choices": [] })).into_response(),
        _ => Json(json!({
            "model": body["model"],
            "choices": [{ "message": { "role": "assistant", "content": format!("{} mensagens", body["messages"].as_array().map_or(0, Vec::len)) } }],
            "usage": { "prompt_tokens": 3, "completion_tokens": 2, "total_tokens": 5 }
        }))
        .into_response(),
    }
}

#[tokio::test]
async fn openai_success_and_error_mapping() {
    let base = serve(Router::new().route("/chat/completions", post(chat_completions))).await;
    let provider = OpenAiCompatProvider::new("stub", &base, "sk-good");

    let ok = provider.complete(request("oi")).await.unwrap();
    assert_eq!(ok.choices[0].content, "2 mensagens");
    assert_eq!(ok.model, "test-model");

    let overflow = provider.complete(request("overflow")).await.unwrap_err();
    assert!(overflow.is_context_overflow());

    let busy = provider.complete(request("busy")).await.unwrap_err();
    assert!(matches!(busy, ProviderError::RateLimited { retry_after_secs: 7 }));

    let garbage = provider.complete(request("garbage")).await.unwrap_err();
    assert!(matches!(garbage, ProviderError::InvalidResponse(_)));
    assert!(garbage.is_retryable());

    let empty = provider.complete(request("empty")).await.unwrap();
    assert!(empty.choices.is_empty());

    let unauthorized = OpenAiCompatProvider::new("stub", &base, "sk-bad");
    let err = unauthorized.complete(request("oi")).await.unwrap_err();
    assert!(matches!(err, ProviderError::AuthenticationFailed(_)));
}

#[tokio::test]
async fn unreachable_endpoint_is_network_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let provider = OpenAiCompatProvider::new("stub", format!("http://{addr}"), "sk");
    let err = provider.complete(request("oi")).await.unwrap_err();
    assert!(matches!(err, ProviderError::Network(_)));
    assert!(err.is_retryable());
}

async fn generate_content(Path(target): Path<String>, headers: HeaderMap, Json(body): Json<Value>) -> impl IntoResponse {
    assert_eq!(headers.get("x-goog-api-key").and_then(|v| v.to_str().ok()), Some("g-key"));
    assert_eq!(target, "gemini-test:generateContent");
    assert_eq!(body["systemInstruction"]["parts"][0]["text"], "Você é Laia");
    assert_eq!(body["generationConfig"]["maxOutputTokens"], 256);
    Json(json!({
        "candidates": [{
            "content": { "role": "model", "parts": [
                { "text": "Vou verificar." },
                { "functionCall": { "name": "list_my_tickets", "args": {} } }
            ] }
        }],
        "modelVersion": "gemini-test"
    }))
}

#[tokio::test]
async fn gemini_round_trip() {
    let base = serve(Router::new().route("/models/{target}", post(generate_content))).await;
    let provider = GeminiProvider::new("g-key").with_base_url(&base);

    let mut req = request("meus chamados");
    req.model = "gemini-test".into();
    let response = provider.complete(req).await.unwrap();

    let choice = &response.choices[0];
    assert_eq!(choice.content, "Vou verificar.");
    assert_eq!(choice.tool_calls[0].name, "list_my_tickets");
    assert_eq!(choice.tool_calls[0].id, "call_0_list_my_tickets");
    assert_eq!(choice.tool_calls[0].arguments, "{}");
}
