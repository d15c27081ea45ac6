//! Wiring the runtime from configuration.
//!
//! Provider, memory backend, event bus, rate limiter and session table are
//! built once and shared by every request.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use deskpilot_agent::{AgentLoop, Dispatcher, RateLimiter, SessionLockTable, ToolsetFactory, FnToolset, UserContext};
use deskpilot_config::{AppConfig, MemoryConfig, ToolsConfig};
use deskpilot_core::error::ToolFailure;
use deskpilot_core::event::EventBus;
use deskpilot_core::memory::MemoryBackend;
use deskpilot_core::provider::Provider;
use deskpilot_memory::{CompactionPolicy, ConversationMemory};
use deskpilot_tools::demo::{demo_registry, DemoDesk};
use deskpilot_tools::{ExecutionPolicy, ShapingPolicy, ToolRegistry};
use tokio::task::JoinHandle;
use tracing::info;

pub fn execution_policy(tools: &ToolsConfig) -> ExecutionPolicy {
    ExecutionPolicy {
        timeout: Duration::from_secs(tools.timeout_secs),
        shaping: ShapingPolicy {
            max_list_items: tools.max_list_items,
            max_output_bytes: tools.max_output_bytes,
            verbose_fields: tools.verbose_fields.clone(),
        },
    }
}

pub fn compaction_policy(memory: &MemoryConfig) -> CompactionPolicy {
    CompactionPolicy {
        max_turns: memory.max_turns,
        keep_recent: memory.keep_recent,
        token_budget: memory.token_budget,
        text_clip_chars: memory.text_clip_chars,
    }
}

/// The in-process helpdesk, one shared desk for every user.
pub fn demo_toolset(tools: &ToolsConfig) -> Arc<dyn ToolsetFactory> {
    let desk = Arc::new(Mutex::new(DemoDesk::seeded()));
    let policy = execution_policy(tools);
    Arc::new(FnToolset(move |_: &UserContext| -> Result<ToolRegistry, ToolFailure> {
        Ok(demo_registry(desk.clone(), policy.clone()))
    }))
}

pub struct Runtime {
    pub config: AppConfig,
    pub dispatcher: Arc<Dispatcher>,
    pub memory: Arc<ConversationMemory>,
    pub event_bus: Arc<EventBus>,
}

impl Runtime {
    /// Build everything from config: the default provider and the
    /// configured memory backend.
    pub async fn from_config(
        config: AppConfig,
        toolsets: Arc<dyn ToolsetFactory>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let router = deskpilot_providers::build_from_config(&config);
        let provider = router
            .default()
            .ok_or("No default provider configured. Set an API key or run `deskpilot config init`")?;

        let backend =
            deskpilot_memory::open_backend(&config.memory.backend, &config.memory_path()).await?;

        info!(
            provider = provider.name(),
            model = %config.default_model,
            memory = backend.name(),
            "Runtime ready"
        );
        Ok(Self::assemble(config, provider, toolsets, backend))
    }

    /// Build around an explicit provider and backend.
    pub fn assemble(
        config: AppConfig,
        provider: Arc<dyn Provider>,
        toolsets: Arc<dyn ToolsetFactory>,
        backend: Arc<dyn MemoryBackend>,
    ) -> Self {
        let memory = Arc::new(ConversationMemory::new(backend, compaction_policy(&config.memory)));
        let event_bus = Arc::new(EventBus::default());
        let agent = AgentLoop::from_config(&config, provider, toolsets, memory.clone(), event_bus.clone());
        let dispatcher = Dispatcher::new(
            Arc::new(agent),
            Arc::new(SessionLockTable::new()),
            Duration::from_secs(config.agent.run_timeout_secs),
        );

        Self {
            config,
            dispatcher: Arc::new(dispatcher),
            memory,
            event_bus,
        }
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        self.dispatcher.agent().rate_limiter()
    }

    /// Periodic cleanup of idle rate-limit buckets and session locks.
    pub fn spawn_sweepers(&self) -> Vec<JoinHandle<()>> {
        let session = &self.config.session;
        let interval = Duration::from_secs(session.sweep_interval_secs);
        vec![
            self.rate_limiter().spawn_sweeper(interval),
            self.dispatcher
                .sessions()
                .spawn_sweeper(interval, Duration::from_secs(session.lock_ttl_secs)),
        ]
    }
}
