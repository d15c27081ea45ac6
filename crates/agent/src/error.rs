//! Run-level failures surfaced to the caller.

use deskpilot_core::error::{ProviderError, ToolError};
use thiserror::Error;

pub const GENERIC_ERROR_MESSAGE: &str =
    "Desculpe, ocorreu um erro ao processar sua mensagem. Tente novamente mais tarde.";
pub const RESET_MESSAGE: &str = "Nossa conversa ficou muito longa. Comece uma nova pergunta, por favor.";
const AUTH_MESSAGE: &str = "Sua sessão expirou. Vincule sua conta novamente para continuar.";
const CANCELLED_MESSAGE: &str = "Sua solicitação demorou demais. Tente novamente em instantes.";

#[derive(Debug, Error)]
pub enum AgentError {
    /// The user's credential was rejected; the caller must re-link the account
    #[error("authentication failed in {tool}: {error}")]
    Authentication { tool: String, error: ToolError },

    #[error("toolset unavailable: {0}")]
    ToolsetUnavailable(ToolError),

    /// Every pruning attempt, and the fresh-start retry, was rejected
    #[error("context could not be reduced enough for the model")]
    ContextExhausted,

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("run exceeded its {0}s deadline")]
    Cancelled(u64),
}

impl AgentError {
    pub fn is_auth_required(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }

    /// Short PT-BR text safe to show the end user.
    pub fn user_message(&self) -> String {
        match self {
            Self::Authentication { .. } => AUTH_MESSAGE.into(),
            Self::ToolsetUnavailable(error) => error.user_message.clone(),
            Self::ContextExhausted => RESET_MESSAGE.into(),
            Self::Provider(_) => GENERIC_ERROR_MESSAGE.into(),
            Self::Cancelled(_) => CANCELLED_MESSAGE.into(),
        }
    }
}
