//! HTTP gateway for DeskPilot.
//!
//! The messaging layer posts inbound messages here and renders the replies.
//! Routes:
//! - `GET /health`
//! - `POST /v1/messages`
//! - `GET /v1/conversations/{user_id}`
//! - `DELETE /v1/conversations/{user_id}`
//!
//! Built on Axum.

pub mod runtime;

use axum::extract::DefaultBodyLimit;
use axum::{
    Router,
    extract::{Path, State},
    http::{HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use deskpilot_agent::{AgentError, InboundMessage};
use deskpilot_core::memory::ConversationStore;
use deskpilot_core::message::{estimate_turns_tokens, ConversationTurn};
use deskpilot_core::reply::AgentReply;
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

pub use runtime::Runtime;

type SharedState = Arc<Runtime>;

/// Build the Axum router with all gateway routes.
pub fn build_router(state: SharedState) -> Router {
    let origin = format!("http://{}:{}", state.config.gateway.host, state.config.gateway.port);
    let mut cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .max_age(std::time::Duration::from_secs(3600));
    if let Ok(origin) = HeaderValue::from_str(&origin) {
        cors = cors.allow_origin(origin);
    }

    Router::new()
        .route("/health", get(health_handler))
        .route("/v1/messages", post(message_handler))
        .route(
            "/v1/conversations/{user_id}",
            get(get_conversation_handler).delete(clear_conversation_handler),
        )
        .with_state(state)
        .layer(DefaultBodyLimit::max(64 * 1024))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Start the gateway HTTP server and the background sweepers.
pub async fn start(runtime: Runtime) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", runtime.config.gateway.host, runtime.config.gateway.port);
    let runtime = Arc::new(runtime);
    let sweepers = runtime.spawn_sweepers();

    let app = build_router(runtime);

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let served = axum::serve(listener, app).await;

    for handle in sweepers {
        handle.abort();
    }
    served?;
    Ok(())
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    memory_backend: String,
}

async fn health_handler(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        memory_backend: state.memory.backend_name().to_string(),
    })
}

#[derive(Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum MessageResponse {
    Ok { reply: AgentReply },
    AuthRequired { message: String },
    Error { reply: AgentReply },
    Invalid { message: String },
}

async fn message_handler(State(state): State<SharedState>, Json(message): Json<InboundMessage>) -> Response {
    if message.user_id.trim().is_empty() || message.text.trim().is_empty() {
        let body = MessageResponse::Invalid {
            message: "user_id e text são obrigatórios.".into(),
        };
        return (StatusCode::BAD_REQUEST, Json(body)).into_response();
    }

    info!(user_id = %message.user_id, text_len = message.text.len(), "Inbound message");

    match state.dispatcher.dispatch(&message).await {
        Ok(reply) => Json(MessageResponse::Ok { reply }).into_response(),
        Err(e @ AgentError::Authentication { .. }) => {
            warn!(user_id = %message.user_id, error = %e, "Account needs re-linking");
            let body = MessageResponse::AuthRequired {
                message: e.user_message(),
            };
            (StatusCode::UNAUTHORIZED, Json(body)).into_response()
        }
        Err(e) => {
            error!(user_id = %message.user_id, error = %e, "Agent run failed");
            Json(MessageResponse::Error {
                reply: AgentReply::text(e.user_message()),
            })
            .into_response()
        }
    }
}

#[derive(Serialize)]
struct ConversationResponse {
    user_id: String,
    turns: Vec<ConversationTurn>,
    estimated_tokens: usize,
}

async fn get_conversation_handler(
    State(state): State<SharedState>,
    Path(user_id): Path<String>,
) -> Json<ConversationResponse> {
    let turns = state.memory.get(&user_id).await;
    Json(ConversationResponse {
        estimated_tokens: estimate_turns_tokens(&turns),
        user_id,
        turns,
    })
}

async fn clear_conversation_handler(State(state): State<SharedState>, Path(user_id): Path<String>) -> StatusCode {
    state.memory.clear(&user_id).await;
    info!(user_id = %user_id, "Conversation cleared");
    StatusCode::NO_CONTENT
}
