//! Error classifier: opaque failure text → [`ToolError`].
//!
//! Matching is on the lower-cased text, first rule wins:
//!
//! | Kind | Markers | Retryable |
//! |------|---------|-----------|
//! | Timeout | deadline, timeout | yes |
//! | Auth | 401, unauthorized, invalid/expired token | no |
//! | NotFound | 404, not found | no |
//! | RateLimit | 429, rate limit, too many requests | yes |
//! | ServerError | 500/502/503/504, server/internal error | yes |
//! | SessionError | session, sessão | no |
//! | Validation | argumento, obrigatório, inválido, deve ser | no |
//! | ServerError (fallback) | anything else | no |
//!
//! Status codes only match as whole numbers, so "ticket 14010" is not a 401.

use deskpilot_core::error::{ErrorKind, ToolError, ToolFailure};

const DEFAULT_SERVICE_NAME: &str = "Nexus";

const TIMEOUT_MARKERS: &[&str] = &["context deadline exceeded", "deadline", "timeout", "timed out"];
const AUTH_MARKERS: &[&str] = &[
    "unauthorized",
    "invalid token",
    "invalid_token",
    "token invalid",
    "token_invalid",
    "expired token",
    "token expired",
    "error_session_token_invalid",
];
const NOT_FOUND_MARKERS: &[&str] = &["not found", "não encontrad"];
const RATE_LIMIT_MARKERS: &[&str] = &["rate limit", "rate_limit", "too many requests"];
const SERVER_MARKERS: &[&str] = &["server error", "internal error", "internal server", "bad gateway", "service unavailable"];
const SESSION_MARKERS: &[&str] = &["initsession", "session", "sessão"];
const VALIDATION_MARKERS: &[&str] = &["argumento", "obrigatório", "inválido", "deve ser", "parâmetro"];

/// Maps raw failures to the closed taxonomy with PT-BR user messages
/// naming the upstream service.
#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    service_name: String,
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_SERVICE_NAME)
    }
}

impl ErrorClassifier {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }

    pub fn classify(&self, raw: &str) -> ToolError {
        let text = raw.to_lowercase();
        let service = &self.service_name;

        let (kind, retryable, user_message) = if contains_any(&text, TIMEOUT_MARKERS) {
            (
                ErrorKind::Timeout,
                true,
                format!("O {service} demorou para responder. Tentando novamente..."),
            )
        } else if has_code(&text, "401") || contains_any(&text, AUTH_MARKERS) {
            (ErrorKind::Auth, false, "Sua sessão expirou. Reconectando...".to_string())
        } else if has_code(&text, "404") || contains_any(&text, NOT_FOUND_MARKERS) {
            (
                ErrorKind::NotFound,
                false,
                format!("Recurso não encontrado no {service}. Verifique o ID informado."),
            )
        } else if has_code(&text, "429") || contains_any(&text, RATE_LIMIT_MARKERS) {
            (ErrorKind::RateLimit, true, "Servidor ocupado, tentando novamente...".to_string())
        } else if ["500", "502", "503", "504"].iter().any(|c| has_code(&text, c))
            || contains_any(&text, SERVER_MARKERS)
        {
            (
                ErrorKind::ServerError,
                true,
                format!("O {service} está temporariamente indisponível. Tente novamente em alguns minutos."),
            )
        } else if contains_any(&text, SESSION_MARKERS) {
            (
                ErrorKind::SessionError,
                false,
                format!("Erro na sessão do {service}. Pode ser necessário vincular novamente."),
            )
        } else if contains_any(&text, VALIDATION_MARKERS) {
            (ErrorKind::Validation, false, raw.to_string())
        } else {
            (
                ErrorKind::ServerError,
                false,
                format!("Erro inesperado ao acessar o {service}."),
            )
        };

        ToolError {
            kind,
            user_message,
            raw: raw.to_string(),
            retryable,
        }
    }

    /// Wrapper failures whose kind is already known skip the text rules.
    pub fn classify_failure(&self, failure: &ToolFailure) -> ToolError {
        match failure {
            ToolFailure::UnknownTool(name) => validation(
                format!("A ferramenta {name} não existe. Use apenas as ferramentas disponíveis."),
                failure,
            ),
            ToolFailure::InvalidArguments { reason, .. } => validation(reason.clone(), failure),
            ToolFailure::Timeout { .. } => ToolError {
                kind: ErrorKind::Timeout,
                user_message: format!(
                    "O {} demorou para responder. Tentando novamente...",
                    self.service_name
                ),
                raw: failure.to_string(),
                retryable: true,
            },
            ToolFailure::ExecutionFailed { reason, .. } => self.classify(reason),
        }
    }
}

/// Classify with the default service name.
pub fn classify(raw: &str) -> ToolError {
    ErrorClassifier::default().classify(raw)
}

fn validation(user_message: String, failure: &ToolFailure) -> ToolError {
    ToolError {
        kind: ErrorKind::Validation,
        user_message,
        raw: failure.to_string(),
        retryable: false,
    }
}

fn contains_any(text: &str, markers: &[&str]) -> bool {
    markers.iter().any(|m| text.contains(m))
}

/// `code` appears with no digit directly before or after it.
fn has_code(text: &str, code: &str) -> bool {
    text.match_indices(code).any(|(start, _)| {
        let before = text[..start].chars().next_back();
        let after = text[start + code.len()..].chars().next();
        !before.is_some_and(|c| c.is_ascii_digit()) && !after.is_some_and(|c| c.is_ascii_digit())
    })
}
