//! The agent reasoning loop implementation.

use std::sync::Arc;
use std::time::{Duration, Instant};
use chrono::Utc;
use deskpilot_config::{AgentConfig, AppConfig, AssistantConfig};
use deskpilot_core::error::{ErrorKind, ToolError};
use deskpilot_core::event::{DomainEvent, EventBus};
use deskpilot_core::memory::ConversationStore;
use deskpilot_core::message::{Arguments, ConversationTurn, Part};
use deskpilot_core::provider::{ModelToolCall, Provider, ProviderRequest, ProviderResponse};
use deskpilot_core::reply::AgentReply;
use deskpilot_core::tool::ToolDescriptor;
use deskpilot_tools::interactive::{self, RESPOND_INTERACTIVE};
use deskpilot_tools::ToolRegistry;
use futures::future::try_join_all;
use serde_json::Value;
use tracing::{debug, info, warn};
use crate::classifier::ErrorClassifier;
use crate::context::{enforce_budget, prune_oldest, PruneReason};
use crate::doom_loop::DoomLoopGuard;
use crate::error::AgentError;
use crate::prompt::build_system_prompt;
use crate::rate_limit::RateLimiter;
use crate::retry::{complete_with_retry, RetryPolicy};
use crate::toolset::{ToolsetFactory, UserContext};

pub const THROTTLE_MESSAGE: &str =
    "Você está enviando mensagens muito rápido. Aguarde um minuto e tente novamente.";
pub const EXHAUSTED_MESSAGE: &str = "Sua solicitação precisou de muitas etapas. Tente dividir em perguntas menores.";
pub const EMPTY_TEXT_MESSAGE: &str = "Não consegui formular uma resposta. Pode repetir ou reformular sua pergunta?";
pub const NO_CHOICES_MESSAGE: &str = "Não recebi resposta do sistema de IA. Tente novamente em alguns segundos.";
pub const REPLY_BUILD_FAILED_MESSAGE: &str = "Desculpe, houve um erro ao montar a resposta. Tente novamente.";

fn doom_loop_message(tool: &str) -> String {
    format!("A ferramenta {tool} travou em um loop. Tente reformular seu pedido ou dividir em perguntas menores.")
}

fn invalid_arguments_message(tool: &str) -> String {
    format!("Argumentos inválidos para {tool}. Verifique e tente novamente.")
}

/// Loop limits. Defaults mirror [`AgentConfig`].
#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub max_iterations: usize,
    pub doom_loop_exact: usize,
    pub doom_loop_name: usize,
    pub max_prune_attempts: usize,
    pub request_token_budget: usize,
    /// Pause before the single retry of a retryable tool failure
    pub tool_retry_delay: Duration,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self::from_config(&AgentConfig::default(), Duration::from_secs(2))
    }
}

impl LoopSettings {
    pub fn from_config(config: &AgentConfig, tool_retry_delay: Duration) -> Self {
        Self {
            max_iterations: config.max_iterations,
            doom_loop_exact: config.doom_loop_exact,
            doom_loop_name: config.doom_loop_name,
            max_prune_attempts: config.max_prune_attempts,
            request_token_budget: config.request_token_budget,
            tool_retry_delay,
        }
    }
}

/// A model-requested call with its arguments parsed (or not).
struct PendingCall {
    id: String,
    name: String,
    arguments: Option<Arguments>,
    raw_arguments: String,
}

impl PendingCall {
    fn parse(call: ModelToolCall) -> Self {
        let arguments = if call.arguments.trim().is_empty() {
            Some(Arguments::new())
        } else {
            serde_json::from_str::<Arguments>(&call.arguments).ok()
        };
        Self {
            id: call.id,
            name: call.name,
            arguments,
            raw_arguments: call.arguments,
        }
    }

    fn signature_value(&self) -> Value {
        match &self.arguments {
            Some(args) => Value::Object(args.clone()),
            None => Value::String(self.raw_arguments.clone()),
        }
    }

    fn invocation(&self) -> Part {
        Part::ToolInvocation {
            id: self.id.clone(),
            name: self.name.clone(),
            arguments: self.arguments.clone().unwrap_or_default(),
        }
    }
}

/// The working transcript of one run. Indices before `run_start` are
/// history loaded from memory; `run_start` is the current user turn.
struct Transcript {
    turns: Vec<ConversationTurn>,
    run_start: usize,
}

/// The core agent loop that orchestrates model calls and tool execution.
pub struct AgentLoop {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    toolsets: Arc<dyn ToolsetFactory>,
    memory: Arc<dyn ConversationStore>,
    event_bus: Arc<EventBus>,
    rate_limiter: Arc<RateLimiter>,
    classifier: ErrorClassifier,
    assistant: AssistantConfig,
    settings: LoopSettings,
    retry: RetryPolicy,
}

impl AgentLoop {
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        toolsets: Arc<dyn ToolsetFactory>,
        memory: Arc<dyn ConversationStore>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        let limits = AgentConfig::default().rate_limit;
        Self {
            provider,
            model: model.into(),
            temperature: 0.3,
            max_tokens: None,
            toolsets,
            memory,
            event_bus,
            rate_limiter: Arc::new(RateLimiter::new(
                limits.max_messages,
                Duration::from_secs(limits.window_secs),
            )),
            classifier: ErrorClassifier::default(),
            assistant: AssistantConfig::default(),
            settings: LoopSettings::default(),
            retry: RetryPolicy::default(),
        }
    }

    /// Wire every limit from the application config.
    pub fn from_config(
        config: &AppConfig,
        provider: Arc<dyn Provider>,
        toolsets: Arc<dyn ToolsetFactory>,
        memory: Arc<dyn ConversationStore>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        let agent = &config.agent;
        Self::new(provider, &config.default_model, toolsets, memory, event_bus)
            .with_temperature(config.default_temperature)
            .with_max_tokens(config.default_max_tokens)
            .with_rate_limiter(Arc::new(RateLimiter::new(
                agent.rate_limit.max_messages,
                Duration::from_secs(agent.rate_limit.window_secs),
            )))
            .with_assistant(config.assistant.clone())
            .with_settings(LoopSettings::from_config(
                agent,
                Duration::from_millis(config.tools.retry_delay_ms),
            ))
            .with_retry_policy(RetryPolicy::from(&agent.retry))
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.rate_limiter = limiter;
        self
    }

    /// Also sets the classifier's service name.
    pub fn with_assistant(mut self, assistant: AssistantConfig) -> Self {
        self.classifier = ErrorClassifier::new(&assistant.service_name);
        self.assistant = assistant;
        self
    }

    pub fn with_settings(mut self, settings: LoopSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    pub fn memory(&self) -> &Arc<dyn ConversationStore> {
        &self.memory
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    /// Process one user message and produce the outward reply.
    ///
    /// Memory is written only at terminal points, so a cancelled run leaves
    /// the stored conversation untouched.
    pub async fn handle(&self, user: &UserContext, text: &str) -> Result<AgentReply, AgentError> {
        let user_id = user.user_id.as_str();

        if !self.rate_limiter.allow(user_id) {
            info!(user_id, "Message throttled");
            self.event_bus.publish(DomainEvent::RateLimited {
                user_id: user_id.to_string(),
                timestamp: Utc::now(),
            });
            return Ok(AgentReply::text(THROTTLE_MESSAGE));
        }

        let registry = self.toolsets.build(user).await.map_err(|failure| {
            let error = self.classifier.classify_failure(&failure);
            warn!(user_id, kind = %error.kind, error = %error.raw, "Toolset unavailable");
            if error.is_auth() {
                AgentError::Authentication {
                    tool: "toolset".into(),
                    error,
                }
            } else {
                AgentError::ToolsetUnavailable(error)
            }
        })?;

        let mut tools = registry.descriptors();
        tools.push(interactive::descriptor());
        let system = build_system_prompt(&self.assistant, user, &tools);

        let mut turns = self.memory.get(user_id).await;
        let run_start = turns.len();
        turns.push(ConversationTurn::user(text));
        let mut transcript = Transcript { turns, run_start };

        info!(
            user_id,
            history = run_start,
            tools = tools.len(),
            "Processing message"
        );

        let mut guard = DoomLoopGuard::new(self.settings.doom_loop_exact, self.settings.doom_loop_name);
        let mut tokens_used = 0u32;

        for iteration in 1..=self.settings.max_iterations {
            debug!(user_id, iteration, "Agent loop iteration");

            let response = self.call_model(user_id, &system, &tools, &mut transcript).await?;
            if let Some(usage) = &response.usage {
                tokens_used = tokens_used.saturating_add(usage.total_tokens);
            }
            let model = response.model.clone();

            let Some(choice) = response.choices.into_iter().next() else {
                warn!(user_id, iteration, "Model returned no choices");
                return Ok(AgentReply::text(NO_CHOICES_MESSAGE));
            };

            if choice.tool_calls.is_empty() {
                let mut answer = choice.content.trim().to_string();
                if answer.is_empty() {
                    warn!(user_id, iteration, "Model returned empty text");
                    answer = EMPTY_TEXT_MESSAGE.to_string();
                }
                transcript.turns.push(ConversationTurn::assistant_text(&answer));
                self.finish(user_id, transcript, &model, iteration, tokens_used).await;
                return Ok(AgentReply::text(answer));
            }

            let calls: Vec<PendingCall> = choice.tool_calls.into_iter().map(PendingCall::parse).collect();

            if let Some(call) = calls.iter().find(|c| c.name == RESPOND_INTERACTIVE) {
                let reply = self.deliver_interactive(call, &choice.content, &mut transcript);
                self.finish(user_id, transcript, &model, iteration, tokens_used).await;
                return Ok(reply);
            }

            let signatures: Vec<Value> = calls.iter().map(PendingCall::signature_value).collect();
            let trip = guard.observe_batch(calls.iter().map(|c| c.name.as_str()).zip(signatures.iter()));
            if let Some(trip) = trip {
                warn!(
                    user_id,
                    tool = %trip.tool_name,
                    rule = trip.rule.as_str(),
                    count = trip.count,
                    threshold = trip.threshold,
                    "Doom loop detected, aborting run"
                );
                self.event_bus.publish(DomainEvent::DoomLoopDetected {
                    user_id: user_id.to_string(),
                    tool_name: trip.tool_name.clone(),
                    rule: trip.rule.as_str().into(),
                    count: trip.count,
                    threshold: trip.threshold,
                    timestamp: Utc::now(),
                });
                self.memory.save(user_id, transcript.turns).await;
                return Ok(AgentReply::text(doom_loop_message(&trip.tool_name)));
            }

            let mut parts = Vec::with_capacity(calls.len() + 1);
            if !choice.content.trim().is_empty() {
                parts.push(Part::Text {
                    text: choice.content.clone(),
                });
            }
            parts.extend(calls.iter().map(PendingCall::invocation));

            let results = self.dispatch(user_id, &registry, &calls).await?;

            transcript.turns.push(ConversationTurn::assistant(parts));
            transcript.turns.push(ConversationTurn::tool(results));
        }

        warn!(user_id, max_iterations = self.settings.max_iterations, "Iteration cap reached");
        self.memory.save(user_id, transcript.turns).await;
        Ok(AgentReply::text(EXHAUSTED_MESSAGE))
    }

    async fn finish(&self, user_id: &str, transcript: Transcript, model: &str, iterations: usize, tokens_used: u32) {
        self.memory.save(user_id, transcript.turns).await;
        self.event_bus.publish(DomainEvent::ResponseGenerated {
            user_id: user_id.to_string(),
            model: model.to_string(),
            iterations,
            tokens_used,
            timestamp: Utc::now(),
        });
    }

    /// Record the pseudo-tool exchange so the stored transcript stays
    /// protocol-valid, and turn its arguments into the reply.
    fn deliver_interactive(&self, call: &PendingCall, content: &str, transcript: &mut Transcript) -> AgentReply {
        let mut reply = match &call.arguments {
            Some(args) => interactive::parse_reply(args),
            None if content.trim().is_empty() => {
                warn!(tool = %call.name, raw = %call.raw_arguments, "Unparseable interactive reply");
                AgentReply::text(REPLY_BUILD_FAILED_MESSAGE)
            }
            None => AgentReply::text(content.trim()),
        };
        if reply.body().trim().is_empty() {
            reply = match reply {
                AgentReply::Text { .. } if !content.trim().is_empty() => AgentReply::text(content.trim()),
                AgentReply::Text { .. } => AgentReply::text(EMPTY_TEXT_MESSAGE),
                other => other,
            };
        }

        let mut delivered = Arguments::new();
        delivered.insert("status".into(), "delivered".into());
        transcript.turns.push(ConversationTurn::assistant(vec![call.invocation()]));
        transcript.turns.push(ConversationTurn::tool(vec![Part::ToolResult {
            call_id: call.id.clone(),
            name: call.name.clone(),
            result: delivered,
        }]));
        reply
    }

    /// Read-only batches fan out; anything else runs in request order.
    /// An authentication failure aborts the batch immediately.
    async fn dispatch(
        &self,
        user_id: &str,
        registry: &ToolRegistry,
        calls: &[PendingCall],
    ) -> Result<Vec<Part>, AgentError> {
        let parallel = calls.len() > 1 && calls.iter().all(|c| registry.is_read_only(&c.name));
        debug!(user_id, count = calls.len(), parallel, "Dispatching tool calls");

        if parallel {
            try_join_all(calls.iter().map(|call| self.run_call(user_id, registry, call))).await
        } else {
            let mut results = Vec::with_capacity(calls.len());
            for call in calls {
                results.push(self.run_call(user_id, registry, call).await?);
            }
            Ok(results)
        }
    }

    async fn run_call(&self, user_id: &str, registry: &ToolRegistry, call: &PendingCall) -> Result<Part, AgentError> {
        let started = Instant::now();

        let result = match &call.arguments {
            None => {
                warn!(user_id, tool = %call.name, raw = %call.raw_arguments, "Model sent invalid JSON arguments");
                let error = ToolError {
                    kind: ErrorKind::Validation,
                    user_message: invalid_arguments_message(&call.name),
                    raw: call.raw_arguments.clone(),
                    retryable: false,
                };
                Err(error)
            }
            Some(arguments) => self.execute_with_retry(user_id, registry, call, arguments).await,
        };

        let success = result.is_ok();
        self.event_bus.publish(DomainEvent::ToolExecuted {
            user_id: user_id.to_string(),
            tool_name: call.name.clone(),
            success,
            duration_ms: started.elapsed().as_millis() as u64,
            timestamp: Utc::now(),
        });

        let result = match result {
            Ok(output) => output,
            Err(error) if error.is_auth() => {
                warn!(user_id, tool = %call.name, error = %error.raw, "Authentication failed, aborting run");
                return Err(AgentError::Authentication {
                    tool: call.name.clone(),
                    error,
                });
            }
            Err(error) => error_result(&error),
        };

        Ok(Part::ToolResult {
            call_id: call.id.clone(),
            name: call.name.clone(),
            result,
        })
    }

    /// Execute once; a retryable failure of a read-only tool gets one more try.
    async fn execute_with_retry(
        &self,
        user_id: &str,
        registry: &ToolRegistry,
        call: &PendingCall,
        arguments: &Arguments,
    ) -> Result<Arguments, ToolError> {
        let first = match registry.execute(&call.name, arguments).await {
            Ok(output) => return Ok(output),
            Err(failure) => self.classifier.classify_failure(&failure),
        };
        warn!(user_id, tool = %call.name, kind = %first.kind, error = %first.raw, "Tool call failed");

        if !first.retryable || !registry.is_read_only(&call.name) {
            return Err(first);
        }

        tokio::time::sleep(self.settings.tool_retry_delay).await;
        debug!(user_id, tool = %call.name, "Retrying tool call");
        registry.execute(&call.name, arguments).await.map_err(|failure| {
            let error = self.classifier.classify_failure(&failure);
            warn!(user_id, tool = %call.name, kind = %error.kind, error = %error.raw, "Tool retry failed");
            error
        })
    }

    /// One model call with proactive budgeting, transport retries and
    /// context-overflow recovery.
    async fn call_model(
        &self,
        user_id: &str,
        system: &str,
        tools: &[ToolDescriptor],
        transcript: &mut Transcript,
    ) -> Result<ProviderResponse, AgentError> {
        let mut request = ProviderRequest {
            model: self.model.clone(),
            system: system.to_string(),
            messages: transcript.turns.clone(),
            tools: tools.to_vec(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let dropped = enforce_budget(&mut request, self.settings.request_token_budget, transcript.run_start);
        if dropped > 0 {
            transcript.turns = request.messages.clone();
            transcript.run_start -= dropped;
            self.publish_pruned(user_id, PruneReason::Budget, dropped, transcript.turns.len(), 0);
        }

        let mut attempt = 0;
        loop {
            let error = match complete_with_retry(self.provider.as_ref(), &request, &self.retry).await {
                Ok(response) => return Ok(response),
                Err(error) => error,
            };
            let Some(reason) = PruneReason::for_error(&error) else {
                warn!(user_id, error = %error, "Model call failed");
                return Err(error.into());
            };

            attempt += 1;
            if attempt > self.settings.max_prune_attempts {
                break;
            }
            let dropped = prune_oldest(&mut transcript.turns, reason.drop_count(attempt), transcript.run_start);
            if dropped == 0 {
                break;
            }
            transcript.run_start -= dropped;
            request.messages = transcript.turns.clone();
            self.publish_pruned(user_id, reason, dropped, transcript.turns.len(), attempt);
        }

        warn!(user_id, "Context recovery exhausted, resetting conversation");
        self.memory.clear(user_id).await;
        self.event_bus.publish(DomainEvent::ConversationReset {
            user_id: user_id.to_string(),
            timestamp: Utc::now(),
        });

        let current = transcript.turns.swap_remove(transcript.run_start);
        transcript.turns = vec![current];
        transcript.run_start = 0;
        request.messages = transcript.turns.clone();

        complete_with_retry(self.provider.as_ref(), &request, &self.retry)
            .await
            .map_err(|error| {
                warn!(user_id, error = %error, "Fresh-start retry failed");
                if error.is_context_error() {
                    AgentError::ContextExhausted
                } else {
                    AgentError::Provider(error)
                }
            })
    }

    fn publish_pruned(&self, user_id: &str, reason: PruneReason, dropped: usize, remaining: usize, attempt: usize) {
        warn!(user_id, reason = reason.as_str(), dropped, remaining, attempt, "Pruned conversation context");
        self.event_bus.publish(DomainEvent::ContextPruned {
            user_id: user_id.to_string(),
            reason: reason.as_str().into(),
            dropped,
            remaining,
            attempt,
            timestamp: Utc::now(),
        });
    }
}

/// The `{status: "error", error: {type, message}}` result the model sees.
fn error_result(error: &ToolError) -> Arguments {
    let mut map = Arguments::new();
    map.insert("status".into(), "error".into());
    map.insert("error".into(), error.to_result_error());
    map
}
