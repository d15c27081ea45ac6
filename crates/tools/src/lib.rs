//! Tool registry, execution wrapper and built-in tools for DeskPilot.
//!
//! Every tool call goes through [`ToolRegistry::execute`], which validates
//! arguments against the tool's schema, enforces a deadline, and shapes the
//! output so oversized results never reach the model verbatim.

pub mod demo;
pub mod interactive;
pub mod registry;
pub mod shaping;
pub mod validation;

pub use interactive::RESPOND_INTERACTIVE;
pub use registry::{ExecutionPolicy, ToolRegistry};
pub use shaping::ShapingPolicy;
pub use validation::validate_arguments;
