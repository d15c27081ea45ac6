//! # DeskPilot Core
//!
//! Domain types, traits, and error definitions for the DeskPilot agent runtime.
//! This crate has **zero framework dependencies**. It defines the domain model
//! that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every subsystem is defined as a trait here. Implementations live in their
//! respective crates:
//! - `Provider` (model backends) in `deskpilot-providers`
//! - `MemoryBackend` / `ConversationStore` in `deskpilot-memory`
//! - `Tool` implementations and the execution wrapper in `deskpilot-tools`

pub mod error;
pub mod event;
pub mod memory;
pub mod message;
pub mod provider;
pub mod reply;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{ErrorKind, MemoryError, ProviderError, ToolError, ToolFailure};
pub use event::{DomainEvent, EventBus};
pub use memory::{ConversationStore, MemoryBackend};
pub use message::{Arguments, ConversationTurn, Part, Role};
pub use provider::{ModelMessage, ModelToolCall, Provider, ProviderRequest, ProviderResponse, Usage};
pub use reply::{AgentReply, Choice, ListRow, ListSection};
pub use tool::{ParamSchema, Tool, ToolDescriptor};
