//! Error types for the DeskPilot domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error type; the classified
//! [`ToolError`] is plain data that travels back to the model.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// --- Provider errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// Transport failures, throttling, selected 5xx statuses and unparsable
    /// bodies are worth another attempt with backoff.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) | Self::RateLimited { .. } | Self::InvalidResponse(_) => true,
            Self::ApiError { status_code, .. } => matches!(status_code, 429 | 500 | 502 | 503),
            _ => false,
        }
    }

    /// The backend rejected the request because the assembled input is too large.
    pub fn is_context_overflow(&self) -> bool {
        let text = self.to_string().to_lowercase();
        text.contains("context_length_exceeded") || text.contains("maximum context length")
    }

    /// A generic 400 that is not an explicit overflow.
    pub fn is_bad_request(&self) -> bool {
        matches!(self, Self::ApiError { status_code: 400, .. }) && !self.is_context_overflow()
    }

    /// Either flavor of failure that shrinking the transcript may fix.
    pub fn is_context_error(&self) -> bool {
        self.is_context_overflow() || self.is_bad_request()
    }
}

// --- Memory errors ---

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Corrupt record for {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

// --- Tool execution failures (pre-classification) ---

/// What went wrong inside the execution wrapper, before classification.
#[derive(Debug, Clone, Error)]
pub enum ToolFailure {
    #[error("Tool not found: {0}")]
    UnknownTool(String),

    #[error("argumentos inválidos para {tool_name}: {reason}")]
    InvalidArguments { tool_name: String, reason: String },

    #[error("Tool timeout: {tool_name} after {timeout_secs}s (deadline exceeded)")]
    Timeout { tool_name: String, timeout_secs: u64 },

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },
}

impl ToolFailure {
    /// Shorthand for tool implementations reporting an upstream failure.
    pub fn failed(tool_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ExecutionFailed {
            tool_name: tool_name.into(),
            reason: reason.into(),
        }
    }
}

// --- Classified tool errors ---

/// The closed taxonomy produced by the error classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Timeout,
    Auth,
    NotFound,
    RateLimit,
    ServerError,
    SessionError,
    Validation,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Auth => "auth",
            Self::NotFound => "not_found",
            Self::RateLimit => "rate_limit",
            Self::ServerError => "server_error",
            Self::SessionError => "session_error",
            Self::Validation => "validation",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified failure. Never mutated after creation.
///
/// `raw` is for logs only; `user_message` is the only text end users see.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("{kind}: {raw}")]
pub struct ToolError {
    pub kind: ErrorKind,
    pub user_message: String,
    pub raw: String,
    pub retryable: bool,
}

impl ToolError {
    pub fn is_auth(&self) -> bool {
        self.kind == ErrorKind::Auth
    }

    /// The `{type, message}` object placed under `error` in a tool result.
    pub fn to_result_error(&self) -> serde_json::Value {
        serde_json::json!({
            "type": self.kind.as_str(),
            "message": self.user_message,
        })
    }
}
