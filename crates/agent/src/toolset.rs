//! Per-user tool registries.
//!
//! A registry is built fresh for every run from the caller's identity, so
//! tools can carry the user's credential without any shared state.

use async_trait::async_trait;
use deskpilot_core::error::ToolFailure;
use deskpilot_tools::ToolRegistry;

/// The already-authenticated caller of one run.
#[derive(Debug, Clone, Default)]
pub struct UserContext {
    pub user_id: String,
    pub name: Option<String>,
    /// Long-lived credential the domain tools need, if any
    pub credential: Option<String>,
}

impl UserContext {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Self::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_credential(mut self, credential: impl Into<String>) -> Self {
        self.credential = Some(credential.into());
        self
    }

    /// The name to address the user by, falling back to the id.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().filter(|n| !n.trim().is_empty()).unwrap_or(&self.user_id)
    }
}

/// Builds the tool registry for one user's run.
///
/// A failure classified as an authentication error means the user must
/// re-link their account.
#[async_trait]
pub trait ToolsetFactory: Send + Sync {
    async fn build(&self, user: &UserContext) -> Result<ToolRegistry, ToolFailure>;
}

/// Adapts a plain function into a [`ToolsetFactory`].
pub struct FnToolset<F>(pub F);

#[async_trait]
impl<F> ToolsetFactory for FnToolset<F>
where
    F: Fn(&UserContext) -> Result<ToolRegistry, ToolFailure> + Send + Sync,
{
    async fn build(&self, user: &UserContext) -> Result<ToolRegistry, ToolFailure> {
        (self.0)(user)
    }
}
