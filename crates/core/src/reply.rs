//! The outward response of one agent run.
//!
//! The messaging layer renders these into its own wire format and enforces
//! its own length limits.

use serde::{Deserialize, Serialize};

/// Maximum number of quick-reply choices.
pub const MAX_CHOICES: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListRow {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListSection {
    pub title: String,
    pub rows: Vec<ListRow>,
}

/// Plain text, a small set of labeled choices, or a sectioned list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AgentReply {
    Text {
        text: String,
    },
    Choices {
        text: String,
        choices: Vec<Choice>,
    },
    List {
        text: String,
        button_text: String,
        sections: Vec<ListSection>,
    },
}

impl AgentReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// The body text regardless of shape.
    pub fn body(&self) -> &str {
        match self {
            Self::Text { text } | Self::Choices { text, .. } | Self::List { text, .. } => text,
        }
    }
}
