//! Configuration loading, validation, and management for Taskwright.
//!
//! Loads configuration from `~/.taskwright/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.taskwright/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default LLM provider
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Default temperature
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Default max tokens per LLM response
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Agent loop settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// Lesson store settings
    #[serde(default)]
    pub lessons: LessonsConfig,

    /// Built-in tool settings
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

fn default_provider() -> String {
    "openrouter".into()
}
fn default_model() -> String {
    "openai/gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    4096
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
            .field("lessons", &self.lessons)
            .field("tools", &self.tools)
            .field("providers", &self.providers)
            .finish()
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .finish()
    }
}

/// `[agent]`: the think/act loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Step budget per task
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,

    /// How many recent messages are inspected for transient context
    /// (browser prompt, classifier context)
    #[serde(default = "default_context_lookback")]
    pub context_lookback: usize,

    /// Active role for ROLE-scoped lessons
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    /// Directory the agent may mention as its working area
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_root: Option<PathBuf>,

    /// Replace the built-in system prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt_override: Option<String>,

    /// Replace the built-in next-step prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_step_prompt_override: Option<String>,
}

fn default_max_steps() -> usize {
    20
}
fn default_context_lookback() -> usize {
    3
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            context_lookback: default_context_lookback(),
            role: None,
            workspace_root: None,
            system_prompt_override: None,
            next_step_prompt_override: None,
        }
    }
}

/// `[lessons]`: the tiered lesson store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LessonsConfig {
    /// "file", "sqlite" or "memory"
    #[serde(default = "default_lessons_backend")]
    pub backend: String,

    /// Store location; defaults under the config directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Flat legacy `lessons.json` imported when the store is empty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legacy_path: Option<PathBuf>,

    /// Maximum USER lessons injected
    #[serde(default = "default_user_cap")]
    pub user_cap: usize,

    /// Ranked ROLE / GENERAL lessons injected per tier
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Embedding model; ranking is keyword-only when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,

    /// Keyword fallback weights
    #[serde(default)]
    pub keyword: KeywordConfig,
}

fn default_lessons_backend() -> String {
    "file".into()
}
fn default_user_cap() -> usize {
    20
}
fn default_top_k() -> usize {
    5
}

impl Default for LessonsConfig {
    fn default() -> Self {
        Self {
            backend: default_lessons_backend(),
            path: None,
            legacy_path: None,
            user_cap: default_user_cap(),
            top_k: default_top_k(),
            embedding_model: None,
            keyword: KeywordConfig::default(),
        }
    }
}

impl LessonsConfig {
    /// Resolved store path for the configured backend.
    pub fn resolved_path(&self) -> PathBuf {
        if let Some(path) = &self.path {
            return path.clone();
        }
        let file = match self.backend.as_str() {
            "sqlite" => "lessons.db",
            _ => "lessons.v1.json",
        };
        AppConfig::config_dir().join(file)
    }
}

/// `[lessons.keyword]`: scoring used when no embedding index is available.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordConfig {
    #[serde(default = "default_content_weight")]
    pub content_weight: u32,

    #[serde(default = "default_tag_weight")]
    pub tag_weight: u32,

    /// Query words shorter than this are ignored
    #[serde(default = "default_min_word_len")]
    pub min_word_len: usize,
}

fn default_content_weight() -> u32 {
    1
}
fn default_tag_weight() -> u32 {
    2
}
fn default_min_word_len() -> usize {
    3
}

impl Default for KeywordConfig {
    fn default() -> Self {
        Self {
            content_weight: default_content_weight(),
            tag_weight: default_tag_weight(),
            min_word_len: default_min_word_len(),
        }
    }
}

/// `[tools]`: built-in tool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Search providers tried in order ("duckduckgo", "mock")
    #[serde(default = "default_search_providers")]
    pub search_providers: Vec<String>,

    /// Results returned by web_search
    #[serde(default = "default_search_results")]
    pub search_results: usize,

    /// HTTP timeout for search and page fetches
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Characters of page text kept by the browser tool
    #[serde(default = "default_max_page_chars")]
    pub max_page_chars: usize,
}

fn default_search_providers() -> Vec<String> {
    vec!["duckduckgo".into()]
}
fn default_search_results() -> usize {
    5
}
fn default_request_timeout() -> u64 {
    30
}
fn default_max_page_chars() -> usize {
    8000
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            search_providers: default_search_providers(),
            search_results: default_search_results(),
            request_timeout_secs: default_request_timeout(),
            max_page_chars: default_max_page_chars(),
        }
    }
}

/// `[providers.<name>]`: endpoint overrides for one OpenAI-compatible provider.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
}

impl AppConfig {
    /// Load configuration from the default path (~/.taskwright/config.toml).
    ///
    /// Also checks environment variables for API keys:
    /// - `TASKWRIGHT_API_KEY` (highest priority)
    /// - `OPENROUTER_API_KEY`
    /// - `OPENAI_API_KEY`
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

    /// Apply environment overrides through the given lookup.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.api_key.is_none() {
            self.api_key = lookup("TASKWRIGHT_API_KEY")
                .or_else(|| lookup("OPENROUTER_API_KEY"))
                .or_else(|| lookup("OPENAI_API_KEY"));
        }

        if let Some(provider) = lookup("TASKWRIGHT_PROVIDER") {
            self.default_provider = provider;
        }

        if let Some(model) = lookup("TASKWRIGHT_MODEL") {
            self.default_model = model;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".taskwright")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_temperature < 0.0 || self.default_temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.agent.max_steps == 0 {
            return Err(ConfigError::ValidationError("agent.max_steps must be > 0".into()));
        }

        if self.lessons.top_k == 0 {
            return Err(ConfigError::ValidationError("lessons.top_k must be > 0".into()));
        }

        if self.lessons.keyword.min_word_len == 0 {
            return Err(ConfigError::ValidationError(
                "lessons.keyword.min_word_len must be > 0".into(),
            ));
        }

        if !matches!(self.lessons.backend.as_str(), "file" | "sqlite" | "memory") {
            return Err(ConfigError::ValidationError(format!(
                "unknown lessons.backend '{}' (expected file, sqlite or memory)",
                self.lessons.backend
            )));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string.
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
            lessons: LessonsConfig::default(),
            tools: ToolsConfig::default(),
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
