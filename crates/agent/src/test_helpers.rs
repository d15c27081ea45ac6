//! Shared test helpers: a scripted provider and configurable tools.

use async_trait::async_trait;
use deskpilot_core::error::{ProviderError, ToolFailure};
use deskpilot_core::message::Arguments;
use deskpilot_core::provider::{ModelMessage, ModelToolCall, Provider, ProviderRequest, ProviderResponse, Usage};
use deskpilot_core::tool::{ParamSchema, Tool};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A mock provider that replays scripted outcomes and records every request.
///
/// Panics if more calls are made than outcomes provided.
pub struct SequentialMockProvider {
    outcomes: Mutex<Vec<Result<ProviderResponse, ProviderError>>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl SequentialMockProvider {
    pub fn new(outcomes: Vec<Result<ProviderResponse, ProviderError>>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Every outcome succeeds with the given responses.
    pub fn replies(responses: Vec<ProviderResponse>) -> Self {
        Self::new(responses.into_iter().map(Ok).collect())
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let call = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request);
            requests.len()
        };
        let mut outcomes = self.outcomes.lock().unwrap();
        if outcomes.is_empty() {
            panic!("SequentialMockProvider: no more responses (call #{call})");
        }
        outcomes.remove(0)
    }
}

fn usage() -> Option<Usage> {
    Some(Usage {
        prompt_tokens: 10,
        completion_tokens: 5,
        total_tokens: 15,
    })
}

/// A final text answer.
pub fn text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        choices: vec![ModelMessage {
            content: text.into(),
            tool_calls: vec![],
        }],
        usage: usage(),
        model: "mock-model".into(),
    }
}

/// A response requesting the given tool calls.
pub fn tool_call_response(tool_calls: Vec<ModelToolCall>) -> ProviderResponse {
    ProviderResponse {
        choices: vec![ModelMessage {
            content: String::new(),
            tool_calls,
        }],
        usage: usage(),
        model: "mock-model".into(),
    }
}

/// A response with no candidates at all.
pub fn empty_response() -> ProviderResponse {
    ProviderResponse {
        choices: vec![],
        usage: None,
        model: "mock-model".into(),
    }
}

pub fn tool_call(id: &str, name: &str, args: serde_json::Value) -> ModelToolCall {
    ModelToolCall {
        id: id.into(),
        name: name.into(),
        arguments: args.to_string(),
    }
}

pub fn overflow_error() -> ProviderError {
    ProviderError::ApiError {
        status_code: 400,
        message: "This model's maximum context length is 8192 tokens".into(),
    }
}

type Behavior = Box<dyn Fn(usize, &Arguments) -> Result<Arguments, ToolFailure> + Send + Sync>;

/// A tool whose outcome is a closure of (call number, arguments).
pub struct ScriptedTool {
    name: String,
    read_only: bool,
    delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
    log: Arc<Mutex<Vec<String>>>,
    behavior: Behavior,
}

impl ScriptedTool {
    pub fn new(
        name: &str,
        read_only: bool,
        behavior: impl Fn(usize, &Arguments) -> Result<Arguments, ToolFailure> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            read_only,
            delay: None,
            calls: Arc::new(AtomicUsize::new(0)),
            log: Arc::new(Mutex::new(Vec::new())),
            behavior: Box::new(behavior),
        }
    }

    /// Always succeeds with `{ "ok": true }`.
    pub fn ok(name: &str, read_only: bool) -> Self {
        Self::new(name, read_only, |_, _| Ok(ok_result()))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Share an execution log with other tools to assert ordering.
    pub fn with_log(mut self, log: Arc<Mutex<Vec<String>>>) -> Self {
        self.log = log;
        self
    }

    pub fn counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

#[async_trait]
impl Tool for ScriptedTool {
    fn name(&self) -> &str {
        &self.name
    }
    fn description(&self) -> &str {
        "scripted test tool"
    }
    fn parameter_schema(&self) -> Option<ParamSchema> {
        None
    }
    fn is_read_only(&self) -> bool {
        self.read_only
    }

    async fn execute(&self, arguments: &Arguments) -> Result<Arguments, ToolFailure> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.log.lock().unwrap().push(format!("start:{}", self.name));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.log.lock().unwrap().push(format!("end:{}", self.name));
        (self.behavior)(n, arguments)
    }
}

pub fn ok_result() -> Arguments {
    let mut map = Arguments::new();
    map.insert("ok".into(), true.into());
    map
}
