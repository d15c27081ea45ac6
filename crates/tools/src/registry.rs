//! The tool registry and execution wrapper.
//!
//! A registry is built fresh for each user run and is the only caller of
//! [`Tool::execute`]. Each call is:
//! 1. validated against the tool's schema (short-circuits on failure)
//! 2. run under a fixed deadline
//! 3. shaped so oversized outputs are truncated instead of failing

use deskpilot_core::error::ToolFailure;
use deskpilot_core::message::Arguments;
use deskpilot_core::tool::{Tool, ToolDescriptor};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use crate::shaping::{shape_output, ShapingPolicy};
use crate::validation::validate_arguments;

/// Per-call limits applied by the wrapper.
#[derive(Debug, Clone)]
pub struct ExecutionPolicy {
    pub timeout: Duration,
    pub shaping: ShapingPolicy,
}

impl Default for ExecutionPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            shaping: ShapingPolicy::default(),
        }
    }
}

pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
    policy: ExecutionPolicy,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::with_policy(ExecutionPolicy::default())
    }

    pub fn with_policy(policy: ExecutionPolicy) -> Self {
        Self {
            tools: HashMap::new(),
            policy,
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Descriptors sent to the model, sorted by name for stable requests.
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        let mut descriptors: Vec<ToolDescriptor> = self.tools.values().map(|t| t.to_descriptor()).collect();
        descriptors.sort_by(|a, b| a.name.cmp(&b.name));
        descriptors
    }

    /// Unknown tools are treated as mutating.
    pub fn is_read_only(&self, name: &str) -> bool {
        self.tools.get(name).is_some_and(|t| t.is_read_only())
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn policy(&self) -> &ExecutionPolicy {
        &self.policy
    }

    /// Validate, execute under the deadline, and shape the result.
    pub async fn execute(&self, name: &str, arguments: &Arguments) -> Result<Arguments, ToolFailure> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolFailure::UnknownTool(name.to_string()))?;

        if let Some(schema) = tool.parameter_schema() {
            validate_arguments(&schema, arguments).map_err(|reason| ToolFailure::InvalidArguments {
                tool_name: name.to_string(),
                reason,
            })?;
        }

        let started = Instant::now();
        let outcome = tokio::time::timeout(self.policy.timeout, tool.execute(arguments)).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(Ok(result)) => {
                debug!(tool = name, elapsed_ms, "Tool succeeded");
                Ok(shape_output(result, &self.policy.shaping))
            }
            Ok(Err(failure)) => {
                warn!(tool = name, elapsed_ms, error = %failure, "Tool failed");
                Err(failure)
            }
            Err(_) => {
                warn!(tool = name, timeout_secs = self.policy.timeout.as_secs(), "Tool timed out");
                Err(ToolFailure::Timeout {
                    tool_name: name.to_string(),
                    timeout_secs: self.policy.timeout.as_secs(),
                })
            }
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use deskpilot_core::tool::ParamSchema;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct EchoTool {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str { "echo" }
        fn description(&self) -> &str { "Echoes back the input" }
        fn parameter_schema(&self) -> Option<ParamSchema> {
            Some(ParamSchema::object().property("text", ParamSchema::string("Text"), true))
        }
        fn is_read_only(&self) -> bool { true }
        async fn execute(&self, arguments: &Arguments) -> Result<Arguments, ToolFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(arguments.clone())
        }
    }

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str { "slow" }
        fn description(&self) -> &str { "Never finishes in time" }
        fn parameter_schema(&self) -> Option<ParamSchema> { None }
        fn is_read_only(&self) -> bool { false }
        async fn execute(&self, _arguments: &Arguments) -> Result<Arguments, ToolFailure> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Arguments::new())
        }
    }

    struct ListTool;

    #[async_trait]
    impl Tool for ListTool {
        fn name(&self) -> &str { "list" }
        fn description(&self) -> &str { "Returns many records" }
        fn parameter_schema(&self) -> Option<ParamSchema> { None }
        fn is_read_only(&self) -> bool { true }
        async fn execute(&self, _arguments: &Arguments) -> Result<Arguments, ToolFailure> {
            let items: Vec<_> = (0..40).map(|i| json!({ "id": i })).collect();
            Ok(json!({ "items": items }).as_object().cloned().unwrap_or_default())
        }
    }

    fn registry() -> (ToolRegistry, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool { calls: calls.clone() }));
        registry.register(Box::new(SlowTool));
        registry.register(Box::new(ListTool));
        (registry, calls)
    }

    fn args(value: serde_json::Value) -> Arguments {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn descriptors_sorted_and_flagged() {
        let (registry, _) = registry();
        let names: Vec<_> = registry.descriptors().into_iter().map(|d| (d.name, d.read_only)).collect();
        assert_eq!(
            names,
            vec![("echo".to_string(), true), ("list".to_string(), true), ("slow".to_string(), false)]
        );
        assert!(registry.is_read_only("echo"));
        assert!(!registry.is_read_only("slow"));
        assert!(!registry.is_read_only("missing"));
    }

    #[tokio::test]
    async fn execute_success() {
        let (registry, calls) = registry();
        let out = registry.execute("echo", &args(json!({ "text": "olá" }))).await.unwrap();
        assert_eq!(out["text"], "olá");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn validation_short_circuits() {
        let (registry, calls) = registry();
        let err = registry.execute("echo", &Arguments::new()).await.unwrap_err();
        match err {
            ToolFailure::InvalidArguments { tool_name, reason } => {
                assert_eq!(tool_name, "echo");
                assert!(reason.contains("text"));
            }
            other => panic!("unexpected failure: {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_tool() {
        let (registry, _) = registry();
        let err = registry.execute("nope", &Arguments::new()).await.unwrap_err();
        assert!(matches!(err, ToolFailure::UnknownTool(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_enforced() {
        let (registry, _) = registry();
        let err = registry.execute("slow", &Arguments::new()).await.unwrap_err();
        assert!(matches!(err, ToolFailure::Timeout { timeout_secs: 30, .. }));
    }

    #[tokio::test]
    async fn output_shaped() {
        let (registry, _) = registry();
        let out = registry.execute("list", &Arguments::new()).await.unwrap();
        assert_eq!(out["items"].as_array().unwrap().len(), 10);
        assert_eq!(out["_original_counts"]["items"], 40);
    }
}
