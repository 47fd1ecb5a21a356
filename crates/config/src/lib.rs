//! Configuration loading, validation, and management for Luminous.
//!
//! Loads configuration from `~/.luminous/config.toml` with environment
//! variable overrides. Validates all settings at startup. A missing
//! credential never fails loading; it only leaves the matching capability
//! unconfigured.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.luminous/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// LLM API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// LLM provider ("gemini" or an OpenAI-compatible name)
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Model name
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Max tokens per LLM response
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Orchestration loop bounds
    #[serde(default)]
    pub agent: AgentSettings,

    /// Capability credentials and limits
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Session persistence
    #[serde(default)]
    pub storage: StorageConfig,

    /// HTTP gateway
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Autonomous reflection trigger
    #[serde(default)]
    pub reflection: ReflectionConfig,

    /// Persona text overrides
    #[serde(default)]
    pub persona: PersonaConfig,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

fn default_provider() -> String {
    "gemini".into()
}
fn default_model() -> String {
    "gemini-2.5-pro".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    8192
}
fn default_true() -> bool {
    true
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
            .field("storage", &self.storage)
            .field("gateway", &self.gateway)
            .field("reflection", &self.reflection)
            .field("persona", &self.persona)
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

impl std::fmt::Debug for ToolsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolsConfig")
            .field("serpapi_key", &redact(&self.serpapi_key))
            .field("shopify_store", &self.shopify_store)
            .field("shopify_access_token", &redact(&self.shopify_access_token))
            .field("shopify_api_version", &self.shopify_api_version)
            .field("sandbox_fuel", &self.sandbox_fuel)
            .finish()
    }
}

/// Bounds for one `advance` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Maximum model calls that may request capabilities
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,

    /// Wall-clock deadline for the whole loop
    #[serde(default = "default_loop_timeout")]
    pub loop_timeout_secs: u64,

    /// Timeout for each LLM request
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Timeout for each capability execution
    #[serde(default = "default_tool_timeout")]
    pub tool_timeout_secs: u64,

    /// Run independent capabilities of one round concurrently
    #[serde(default = "default_true")]
    pub parallel_tools: bool,
}

fn default_max_rounds() -> usize {
    8
}
fn default_loop_timeout() -> u64 {
    120
}
fn default_request_timeout() -> u64 {
    30
}
fn default_tool_timeout() -> u64 {
    20
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            loop_timeout_secs: default_loop_timeout(),
            request_timeout_secs: default_request_timeout(),
            tool_timeout_secs: default_tool_timeout(),
            parallel_tools: true,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// SerpApi key for `webSearch`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serpapi_key: Option<String>,

    /// Shopify store domain, e.g. `my-shop.myshopify.com`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shopify_store: Option<String>,

    /// Shopify Admin API access token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shopify_access_token: Option<String>,

    #[serde(default = "default_shopify_api_version")]
    pub shopify_api_version: String,

    /// Instruction budget for one `codeInterpreter` run
    #[serde(default = "default_sandbox_fuel")]
    pub sandbox_fuel: u64,
}

fn default_shopify_api_version() -> String {
    "2024-01".into()
}
fn default_sandbox_fuel() -> u64 {
    100_000
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            serpapi_key: None,
            shopify_store: None,
            shopify_access_token: None,
            shopify_api_version: default_shopify_api_version(),
            sandbox_fuel: default_sandbox_fuel(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// "sqlite", "file" or "memory"
    #[serde(default = "default_storage_backend")]
    pub backend: String,

    /// Database file or directory; defaults under the config dir
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Key the session blob is stored under
    #[serde(default = "default_session_key")]
    pub session_key: String,
}

fn default_storage_backend() -> String {
    "sqlite".into()
}
fn default_session_key() -> String {
    "luminous_session".into()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            path: None,
            session_key: default_session_key(),
        }
    }
}

impl StorageConfig {
    /// The effective storage path for the configured backend.
    pub fn resolved_path(&self) -> PathBuf {
        if let Some(path) = &self.path {
            return path.clone();
        }
        match self.backend.as_str() {
            "file" => AppConfig::config_dir().join("sessions"),
            _ => AppConfig::config_dir().join("luminous.db"),
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
    8787
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

/// When the model is nudged to reflect without user input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReflectionConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Seconds between trigger checks
    #[serde(default = "default_reflection_interval")]
    pub interval_secs: u64,

    /// Chance that a check fires
    #[serde(default = "default_reflection_probability")]
    pub probability: f64,

    /// Fire unconditionally after this many idle minutes (0 = never)
    #[serde(default = "default_idle_minutes")]
    pub idle_minutes: u64,
}

fn default_reflection_interval() -> u64 {
    120
}
fn default_reflection_probability() -> f64 {
    0.1
}
fn default_idle_minutes() -> u64 {
    30
}

impl Default for ReflectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_reflection_interval(),
            probability: default_reflection_probability(),
            idle_minutes: default_idle_minutes(),
        }
    }
}

/// Overrides for the built-in persona text.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersonaConfig {
    /// Replace the built-in system instruction
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<String>,

    /// Replace the built-in core-memory axioms
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub core_memory: Option<String>,
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

impl AppConfig {
    /// Load configuration from the default path (~/.luminous/config.toml).
    ///
    /// Environment variables override the file:
    /// - `LUMINOUS_API_KEY`, `GEMINI_API_KEY`, `API_KEY` (first found wins)
    /// - `LUMINOUS_PROVIDER`, `LUMINOUS_MODEL`
    /// - `SERPAPI_API_KEY`, `SHOPIFY_STORE`, `SHOPIFY_ACCESS_TOKEN`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok());
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

    /// Apply environment overrides through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if self.api_key.is_none() {
            self.api_key = non_empty("LUMINOUS_API_KEY")
                .or_else(|| non_empty("GEMINI_API_KEY"))
                .or_else(|| non_empty("API_KEY"));
        }
        if let Some(provider) = non_empty("LUMINOUS_PROVIDER") {
            self.default_provider = provider;
        }
        if let Some(model) = non_empty("LUMINOUS_MODEL") {
            self.default_model = model;
        }
        if let Some(key) = non_empty("SERPAPI_API_KEY") {
            self.tools.serpapi_key = Some(key);
        }
        if let Some(store) = non_empty("SHOPIFY_STORE") {
            self.tools.shopify_store = Some(store);
        }
        if let Some(token) = non_empty("SHOPIFY_ACCESS_TOKEN") {
            self.tools.shopify_access_token = Some(token);
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".luminous")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.default_temperature) {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.agent.max_rounds == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_rounds must be at least 1".into(),
            ));
        }

        if self.agent.loop_timeout_secs == 0
            || self.agent.request_timeout_secs == 0
            || self.agent.tool_timeout_secs == 0
        {
            return Err(ConfigError::ValidationError(
                "agent timeouts must be greater than 0".into(),
            ));
        }

        if !(0.0..=1.0).contains(&self.reflection.probability) {
            return Err(ConfigError::ValidationError(
                "reflection.probability must be between 0.0 and 1.0".into(),
            ));
        }

        if self.reflection.interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "reflection.interval_secs must be greater than 0".into(),
            ));
        }

        if !matches!(self.storage.backend.as_str(), "sqlite" | "file" | "memory") {
            return Err(ConfigError::ValidationError(format!(
                "unknown storage backend '{}'",
                self.storage.backend
            )));
        }

        Ok(())
    }

    /// Check if an LLM API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
            || self
                .providers
                .get(&self.default_provider)
                .is_some_and(|p| p.api_key.is_some())
    }

    /// Generate a default config TOML string (for `onboard` command).
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
            agent: AgentSettings::default(),
            tools: ToolsConfig::default(),
            storage: StorageConfig::default(),
            gateway: GatewayConfig::default(),
            reflection: ReflectionConfig::default(),
            persona: PersonaConfig::default(),
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
