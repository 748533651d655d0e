//! Configuration loading, validation, and management for mathtutor.
//!
//! Loads configuration from `~/.mathtutor/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use mathtutor_core::provider::GenerationOptions;
use mathtutor_core::retrieval::DocumentScope;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.mathtutor/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default LLM provider
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default chat model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Fixed generation parameters for every tutoring reply
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Retrieval (vector store) configuration
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Conversation history configuration
    #[serde(default)]
    pub history: HistoryConfig,

    /// Gateway configuration
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// System prompt configuration
    #[serde(default)]
    pub prompt: PromptConfig,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    /// Topic table override. Empty = built-in textbook topics.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub topics: Vec<TopicConfig>,
}

fn default_provider() -> String {
    "ollama".into()
}
fn default_model() -> String {
    "llama3.1".into()
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
            .field("generation", &self.generation)
            .field("retrieval", &self.retrieval)
            .field("history", &self.history)
            .field("gateway", &self.gateway)
            .field("prompt", &self.prompt)
            .field("providers", &self.providers)
            .field("topics", &self.topics)
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

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_top_p")]
    pub top_p: f32,

    #[serde(default = "default_context_window")]
    pub context_window: u32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_temperature() -> f32 {
    0.7
}
fn default_top_p() -> f32 {
    0.9
}
fn default_context_window() -> u32 {
    4096
}
fn default_max_tokens() -> u32 {
    1024
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            top_p: default_top_p(),
            context_window: default_context_window(),
            max_tokens: default_max_tokens(),
        }
    }
}

impl GenerationConfig {
    pub fn options(&self) -> GenerationOptions {
        GenerationOptions {
            temperature: self.temperature,
            top_p: self.top_p,
            context_window: Some(self.context_window),
            max_tokens: Some(self.max_tokens),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// "postgres", "in_memory", or "none"
    #[serde(default = "default_retrieval_backend")]
    pub backend: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,

    #[serde(default = "default_table")]
    pub table: String,

    #[serde(default = "default_top_k")]
    pub top_k: usize,

    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,

    /// Prepended to `"<topic> <utterance>"` to form the search query
    #[serde(default = "default_query_prefix")]
    pub query_prefix: String,

    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// JSON passage file for the in-memory backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corpus_path: Option<PathBuf>,
}

fn default_retrieval_backend() -> String {
    "none".into()
}
fn default_table() -> String {
    "vector_store".into()
}
fn default_top_k() -> usize {
    3
}
fn default_similarity_threshold() -> f32 {
    0.6
}
fn default_query_prefix() -> String {
    "Steps to find the solution. How to Solve. ".into()
}
fn default_embedding_model() -> String {
    "nomic-embed-text".into()
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            backend: default_retrieval_backend(),
            database_url: None,
            table: default_table(),
            top_k: default_top_k(),
            similarity_threshold: default_similarity_threshold(),
            query_prefix: default_query_prefix(),
            embedding_model: default_embedding_model(),
            corpus_path: None,
        }
    }
}

impl std::fmt::Debug for RetrievalConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievalConfig")
            .field("backend", &self.backend)
            .field("database_url", &redact(&self.database_url))
            .field("table", &self.table)
            .field("top_k", &self.top_k)
            .field("similarity_threshold", &self.similarity_threshold)
            .field("query_prefix", &self.query_prefix)
            .field("embedding_model", &self.embedding_model)
            .field("corpus_path", &self.corpus_path)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// User/assistant pairs kept per session
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
}

fn default_max_turns() -> usize {
    5
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// Browser origin allowed by CORS
    #[serde(default = "default_allowed_origin")]
    pub allowed_origin: String,
}

fn default_port() -> u16 {
    8080
}
fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_allowed_origin() -> String {
    "http://localhost:8080".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            allowed_origin: default_allowed_origin(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptConfig {
    /// Path to a system prompt template with `{topic}` placeholders.
    /// `None` = built-in template.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_path: Option<PathBuf>,
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

/// One configured topic: a name, a learner-facing definition, and the
/// document scopes retrieval is restricted to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicConfig {
    pub name: String,

    #[serde(default)]
    pub definition: String,

    #[serde(default)]
    pub scopes: Vec<ScopeConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopeConfig {
    pub source: String,
    pub page_min: u32,
    pub page_max: u32,
}

impl From<&ScopeConfig> for DocumentScope {
    fn from(s: &ScopeConfig) -> Self {
        DocumentScope::new(&s.source, s.page_min, s.page_max)
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.mathtutor/config.toml).
    ///
    /// Also checks environment variables:
    /// - `MATHTUTOR_API_KEY` (highest priority), then `OPENAI_API_KEY`
    /// - `MATHTUTOR_PROVIDER`, `MATHTUTOR_MODEL`
    /// - `DATABASE_URL` for the retrieval backend
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();
        let mut config = Self::load_from(&config_path)?;

        if config.api_key.is_none() {
            config.api_key = std::env::var("MATHTUTOR_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(provider) = std::env::var("MATHTUTOR_PROVIDER") {
            config.default_provider = provider;
        }

        if let Ok(model) = std::env::var("MATHTUTOR_MODEL") {
            config.default_model = model;
        }

        if config.retrieval.database_url.is_none() {
            config.retrieval.database_url = std::env::var("DATABASE_URL").ok();
        }

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
        dirs_home().join(".mathtutor")
    }

    /// Get the default configuration file path.
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let generation = &self.generation;
        if !(0.0..=2.0).contains(&generation.temperature) {
            return Err(ConfigError::ValidationError(
                "generation.temperature must be between 0.0 and 2.0".into(),
            ));
        }
        if generation.top_p <= 0.0 || generation.top_p > 1.0 {
            return Err(ConfigError::ValidationError(
                "generation.top_p must be in (0.0, 1.0]".into(),
            ));
        }

        if self.retrieval.top_k == 0 {
            return Err(ConfigError::ValidationError(
                "retrieval.top_k must be at least 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.retrieval.similarity_threshold) {
            return Err(ConfigError::ValidationError(
                "retrieval.similarity_threshold must be between 0.0 and 1.0".into(),
            ));
        }

        if self.history.max_turns == 0 {
            return Err(ConfigError::ValidationError(
                "history.max_turns must be at least 1".into(),
            ));
        }

        let mut seen = HashSet::new();
        for topic in &self.topics {
            let key = topic.name.trim().to_lowercase();
            if key.is_empty() {
                return Err(ConfigError::ValidationError("topic name must not be blank".into()));
            }
            if !seen.insert(key) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate topic '{}'",
                    topic.name
                )));
            }
            if let Some(bad) = topic.scopes.iter().find(|s| s.page_min > s.page_max) {
                return Err(ConfigError::ValidationError(format!(
                    "topic '{}': page_min {} exceeds page_max {} for {}",
                    topic.name, bad.page_min, bad.page_max, bad.source
                )));
            }
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string (for the `init` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }

    /// Write the default configuration to `path` unless a file already exists.
    ///
    /// Returns `true` when a file was written.
    pub fn write_default(path: &Path) -> Result<bool, ConfigError> {
        if path.exists() {
            return Ok(false);
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError {
                path: parent.to_path_buf(),
                reason: e.to_string(),
            })?;
        }
        std::fs::write(path, Self::default_toml()).map_err(|e| ConfigError::WriteError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok(true)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            generation: GenerationConfig::default(),
            retrieval: RetrievalConfig::default(),
            history: HistoryConfig::default(),
            gateway: GatewayConfig::default(),
            prompt: PromptConfig::default(),
            providers: HashMap::new(),
            topics: vec![],
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

    #[error("Failed to write config file at {path}: {reason}")]
    WriteError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
