//! Configuration loading, validation, and management for DeskPilot.
//!
//! Loads configuration from `~/.deskpilot/config.toml` (or the path in
//! `DESKPILOT_CONFIG`) with environment variable overrides. Every heuristic
//! threshold of the agent loop lives here so it can be tuned without a rebuild.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.deskpilot/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default model provider ("openai", "gemini", or any OpenAI-compatible name)
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Default temperature
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Default max tokens per model response
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Agent loop limits and heuristics
    #[serde(default)]
    pub agent: AgentConfig,

    /// Tool execution wrapper settings
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Conversation memory configuration
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Per-user session lock settings
    #[serde(default)]
    pub session: SessionConfig,

    /// Gateway configuration
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Assistant persona
    #[serde(default)]
    pub assistant: AssistantConfig,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

fn default_provider() -> String {
    "openai".into()
}
fn default_model() -> String {
    "gpt-4.1-mini".into()
}
fn default_temperature() -> f32 {
    0.3
}
fn default_max_tokens() -> u32 {
    2048
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("agent", &self.agent)
            .field("tools", &self.tools)
            .field("memory", &self.memory)
            .field("session", &self.session)
            .field("gateway", &self.gateway)
            .field("assistant", &self.assistant)
            .field("providers", &self.providers)
            .finish()
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

/// Limits of the model/tool iteration loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Model calls per user message before giving up
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Consecutive identical tool calls tolerated
    #[serde(default = "default_doom_loop_exact")]
    pub doom_loop_exact: usize,

    /// Calls to one tool name tolerated within a run
    #[serde(default = "default_doom_loop_name")]
    pub doom_loop_name: usize,

    /// Incremental pruning attempts after a context error
    #[serde(default = "default_max_prune_attempts")]
    pub max_prune_attempts: usize,

    /// Estimated request size that triggers proactive pruning
    #[serde(default = "default_request_token_budget")]
    pub request_token_budget: usize,

    /// Wall-clock deadline for one run, in seconds
    #[serde(default = "default_run_timeout_secs")]
    pub run_timeout_secs: u64,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

fn default_max_iterations() -> usize {
    5
}
fn default_doom_loop_exact() -> usize {
    2
}
fn default_doom_loop_name() -> usize {
    4
}
fn default_max_prune_attempts() -> usize {
    3
}
fn default_request_token_budget() -> usize {
    6000
}
fn default_run_timeout_secs() -> u64 {
    120
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            doom_loop_exact: default_doom_loop_exact(),
            doom_loop_name: default_doom_loop_name(),
            max_prune_attempts: default_max_prune_attempts(),
            request_token_budget: default_request_token_budget(),
            run_timeout_secs: default_run_timeout_secs(),
            retry: RetryConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

/// Exponential backoff for model calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_retry_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_retry_attempts() -> u32 {
    3
}
fn default_initial_delay_ms() -> u64 {
    2000
}
fn default_max_delay_ms() -> u64 {
    30_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_retry_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

/// Fixed-window per-user admission control.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_rate_limit_messages")]
    pub max_messages: u32,

    #[serde(default = "default_rate_limit_window")]
    pub window_secs: u64,
}

fn default_rate_limit_messages() -> u32 {
    10
}
fn default_rate_limit_window() -> u64 {
    60
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_messages: default_rate_limit_messages(),
            window_secs: default_rate_limit_window(),
        }
    }
}

/// Execution wrapper settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_tool_timeout")]
    pub timeout_secs: u64,

    /// List fields longer than this are truncated
    #[serde(default = "default_max_list_items")]
    pub max_list_items: usize,

    /// Serialized result ceiling in bytes
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,

    /// Pause before the single retry of a retryable failure
    #[serde(default = "default_tool_retry_delay")]
    pub retry_delay_ms: u64,

    /// Fields removed from the items of a truncated list
    #[serde(default = "default_verbose_fields")]
    pub verbose_fields: Vec<String>,
}

fn default_tool_timeout() -> u64 {
    30
}
fn default_max_list_items() -> usize {
    10
}
fn default_max_output_bytes() -> usize {
    8192
}
fn default_tool_retry_delay() -> u64 {
    2000
}
fn default_verbose_fields() -> Vec<String> {
    ["descricao", "conteudo", "preview", "content", "description"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_tool_timeout(),
            max_list_items: default_max_list_items(),
            max_output_bytes: default_max_output_bytes(),
            retry_delay_ms: default_tool_retry_delay(),
            verbose_fields: default_verbose_fields(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// "in_memory", "file" or "sqlite"
    #[serde(default = "default_memory_backend")]
    pub backend: String,

    /// Storage location for file/sqlite backends (defaults under the config dir)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Hard cap on persisted turns
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,

    /// Most recent turns kept uncompressed
    #[serde(default = "default_keep_recent")]
    pub keep_recent: usize,

    /// Approximate token budget for a persisted conversation
    #[serde(default = "default_memory_token_budget")]
    pub token_budget: usize,

    /// Free-text fields longer than this are clipped during compression
    #[serde(default = "default_text_clip_chars")]
    pub text_clip_chars: usize,
}

fn default_memory_backend() -> String {
    "in_memory".into()
}
fn default_max_turns() -> usize {
    50
}
fn default_keep_recent() -> usize {
    4
}
fn default_memory_token_budget() -> usize {
    3500
}
fn default_text_clip_chars() -> usize {
    100
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            backend: default_memory_backend(),
            path: None,
            max_turns: default_max_turns(),
            keep_recent: default_keep_recent(),
            token_budget: default_memory_token_budget(),
            text_clip_chars: default_text_clip_chars(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Idle time after which a user's lock may be reclaimed
    #[serde(default = "default_lock_ttl")]
    pub lock_ttl_secs: u64,

    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

fn default_lock_ttl() -> u64 {
    3600
}
fn default_sweep_interval() -> u64 {
    1800
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            lock_ttl_secs: default_lock_ttl(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,
}

fn default_port() -> u16 {
    42617
}
fn default_host() -> String {
    "127.0.0.1".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantConfig {
    #[serde(default = "default_assistant_name")]
    pub name: String,

    /// Name of the helpdesk system the tools talk to
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Replace the built-in system prompt (`{user_name}` and `{assistant_name}` are substituted)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

fn default_assistant_name() -> String {
    "Laia".into()
}
fn default_service_name() -> String {
    "Nexus".into()
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            name: default_assistant_name(),
            service_name: default_service_name(),
            system_prompt: None,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

const MEMORY_BACKENDS: &[&str] = &["in_memory", "file", "sqlite"];

impl AppConfig {
    /// Load configuration from the default path.
    ///
    /// Environment overrides:
    /// - `DESKPILOT_CONFIG` replaces the file path
    /// - `DESKPILOT_API_KEY`, then `OPENAI_API_KEY` / `GEMINI_API_KEY`
    /// - `DESKPILOT_PROVIDER`, `DESKPILOT_MODEL`
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_from(&Self::config_path())?;

        if config.api_key.is_none() {
            let vendor_var = if config.default_provider == "gemini" {
                "GEMINI_API_KEY"
            } else {
                "OPENAI_API_KEY"
            };
            config.api_key = std::env::var("DESKPILOT_API_KEY")
                .ok()
                .or_else(|| std::env::var(vendor_var).ok());
        }

        if let Ok(provider) = std::env::var("DESKPILOT_PROVIDER") {
            config.default_provider = provider;
        }

        if let Ok(model) = std::env::var("DESKPILOT_MODEL") {
            config.default_model = model;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".deskpilot")
    }

    /// The config file in effect (`DESKPILOT_CONFIG` or the default location).
    pub fn config_path() -> PathBuf {
        std::env::var("DESKPILOT_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| Self::config_dir().join("config.toml"))
    }

    /// Storage path for the memory backend, defaulting under the config dir.
    pub fn memory_path(&self) -> PathBuf {
        match &self.memory.path {
            Some(p) => PathBuf::from(p),
            None => {
                let file = if self.memory.backend == "sqlite" { "memory.db" } else { "memory.json" };
                Self::config_dir().join(file)
            }
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_temperature < 0.0 || self.default_temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.agent.max_iterations == 0 {
            return Err(ConfigError::ValidationError("agent.max_iterations must be > 0".into()));
        }

        if self.agent.doom_loop_exact > self.agent.doom_loop_name {
            return Err(ConfigError::ValidationError(
                "agent.doom_loop_exact must not exceed agent.doom_loop_name".into(),
            ));
        }

        if self.agent.rate_limit.max_messages == 0 || self.agent.rate_limit.window_secs == 0 {
            return Err(ConfigError::ValidationError(
                "agent.rate_limit values must be > 0".into(),
            ));
        }

        if self.session.sweep_interval_secs == 0 || self.session.lock_ttl_secs == 0 {
            return Err(ConfigError::ValidationError(
                "session.sweep_interval_secs and session.lock_ttl_secs must be > 0".into(),
            ));
        }

        if self.tools.max_list_items == 0 {
            return Err(ConfigError::ValidationError("tools.max_list_items must be > 0".into()));
        }

        if self.memory.keep_recent > self.memory.max_turns {
            return Err(ConfigError::ValidationError(
                "memory.keep_recent must not exceed memory.max_turns".into(),
            ));
        }

        if !MEMORY_BACKENDS.contains(&self.memory.backend.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "unknown memory backend '{}' (expected one of: {})",
                self.memory.backend,
                MEMORY_BACKENDS.join(", ")
            )));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
            || self
                .providers
                .get(&self.default_provider)
                .is_some_and(|p| p.api_key.is_some())
    }

    /// Generate a default config TOML string (for `config init`).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            agent: AgentConfig::default(),
            tools: ToolsConfig::default(),
            memory: MemoryConfig::default(),
            session: SessionConfig::default(),
            gateway: GatewayConfig::default(),
            assistant: AssistantConfig::default(),
            providers: HashMap::new(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert_eq!(config.default_provider, "openai");
        assert_eq!(config.default_model, "gpt-4.1-mini");
        assert_eq!(config.agent.max_iterations, 5);
        assert_eq!(config.tools.max_list_items, 10);
        assert_eq!(config.memory.max_turns, 50);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.default_provider, config.default_provider);
        assert_eq!(parsed.agent.doom_loop_name, config.agent.doom_loop_name);
        assert_eq!(parsed.tools.verbose_fields, config.tools.verbose_fields);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let toml_str = r#"
default_provider = "gemini"

[agent]
max_iterations = 8

[agent.rate_limit]
max_messages = 3

[memory]
backend = "file"
path = "/var/lib/deskpilot/memory.json"
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.default_provider, "gemini");
        assert_eq!(config.agent.max_iterations, 8);
        assert_eq!(config.agent.doom_loop_exact, 2);
        assert_eq!(config.agent.rate_limit.max_messages, 3);
        assert_eq!(config.agent.rate_limit.window_secs, 60);
        assert_eq!(config.memory_path(), PathBuf::from("/var/lib/deskpilot/memory.json"));
    }

    #[test]
    fn invalid_temperature_rejected() {
        let config = AppConfig {
            default_temperature: 5.0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn inverted_doom_thresholds_rejected() {
        let mut config = AppConfig::default();
        config.agent.doom_loop_exact = 6;
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_memory_backend_rejected() {
        let mut config = AppConfig::default();
        config.memory.backend = "redis".into();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("redis"));
    }

    #[test]
    fn zero_session_intervals_rejected() {
        let mut config = AppConfig::default();
        config.session.sweep_interval_secs = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("sweep_interval_secs"));

        let mut config = AppConfig::default();
        config.session.lock_ttl_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn keep_recent_bounded_by_max_turns() {
        let mut config = AppConfig::default();
        config.memory.max_turns = 3;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let result = AppConfig::load_from(Path::new("/nonexistent/config.toml"));
        assert!(result.is_ok());
        assert_eq!(result.unwrap().default_provider, "openai");
    }

    #[test]
    fn load_from_file_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[tools]\nmax_list_items = 0\n").unwrap();
        assert!(matches!(
            AppConfig::load_from(&path),
            Err(ConfigError::ValidationError(_))
        ));

        std::fs::write(&path, "not = [valid").unwrap();
        assert!(matches!(AppConfig::load_from(&path), Err(ConfigError::ParseError { .. })));
    }

    #[test]
    fn debug_output_redacts_keys() {
        let mut config = AppConfig {
            api_key: Some("sk-secret".into()),
            ..AppConfig::default()
        };
        config.providers.insert(
            "gemini".into(),
            ProviderConfig {
                api_key: Some("g-secret".into()),
                api_url: None,
                default_model: None,
            },
        );
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(!debug.contains("g-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("gpt-4.1-mini"));
        assert!(toml_str.contains("42617"));
        assert!(toml_str.contains("max_iterations"));
    }

    #[test]
    fn default_memory_path_depends_on_backend() {
        let mut config = AppConfig::default();
        config.memory.backend = "sqlite".into();
        assert!(config.memory_path().ends_with("memory.db"));
        config.memory.backend = "file".into();
        assert!(config.memory_path().ends_with("memory.json"));
    }
}
