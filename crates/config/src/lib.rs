//! Configuration loading, validation, and management for ragachat.
//!
//! Loads configuration from `~/.ragachat/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The answer substituted when generation stays unavailable after every retry.
pub const DEFAULT_FALLBACK_MESSAGE: &str =
    "Sorry, the LLM service is temporarily unavailable. Please try again later.";

/// The root configuration structure.
///
/// Maps directly to `~/.ragachat/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Persistence backend
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Embedding service
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Generation endpoint and retry policy
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Knowledge and history retrieval limits
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Chat orchestration behavior
    #[serde(default)]
    pub chat: ChatConfig,

    /// HTTP gateway
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Knowledge ingestion
    #[serde(default)]
    pub knowledge: KnowledgeConfig,
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

fn default_true() -> bool {
    true
}

// ── Database ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// `sqlite`, `postgres`, or `memory`
    #[serde(default = "default_database_backend")]
    pub backend: String,

    /// Connection string. Defaults to `~/.ragachat/chat.sqlite` for SQLite.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_backend() -> String {
    "sqlite".into()
}
fn default_max_connections() -> u32 {
    4
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: default_database_backend(),
            url: None,
            max_connections: default_max_connections(),
        }
    }
}

// ── Embedding ─────────────────────────────────────────────────────────────

#[derive(Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// `cohere` or `openai`
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    #[serde(default = "default_embedding_url")]
    pub url: String,

    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Input-type tag sent with each request (Cohere only)
    #[serde(default = "default_input_type")]
    pub input_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_embedding_timeout")]
    pub request_timeout_secs: u64,
}

fn default_embedding_provider() -> String {
    "cohere".into()
}
fn default_embedding_url() -> String {
    "https://api.cohere.com/v1/embed".into()
}
fn default_embedding_model() -> String {
    "embed-english-v3.0".into()
}
fn default_input_type() -> String {
    "search_document".into()
}
fn default_embedding_timeout() -> u64 {
    30
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            url: default_embedding_url(),
            model: default_embedding_model(),
            input_type: default_input_type(),
            api_key: None,
            request_timeout_secs: default_embedding_timeout(),
        }
    }
}

impl std::fmt::Debug for EmbeddingConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingConfig")
            .field("provider", &self.provider)
            .field("url", &self.url)
            .field("model", &self.model)
            .field("input_type", &self.input_type)
            .field("api_key", &redact(&self.api_key))
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

// ── Generation ────────────────────────────────────────────────────────────

#[derive(Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// `gemini` or `openai`
    #[serde(default = "default_generation_provider")]
    pub provider: String,

    #[serde(default = "default_generation_base_url")]
    pub base_url: String,

    #[serde(default = "default_generation_model")]
    pub model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Per-attempt HTTP timeout
    #[serde(default = "default_generation_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_generation_provider() -> String {
    "gemini".into()
}
fn default_generation_base_url() -> String {
    "https://generativelanguage.googleapis.com".into()
}
fn default_generation_model() -> String {
    "gemini-2.0-flash".into()
}
fn default_generation_timeout() -> u64 {
    120
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            base_url: default_generation_base_url(),
            model: default_generation_model(),
            api_key: None,
            request_timeout_secs: default_generation_timeout(),
            retry: RetryConfig::default(),
        }
    }
}

impl std::fmt::Debug for GenerationConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationConfig")
            .field("provider", &self.provider)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &redact(&self.api_key))
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("retry", &self.retry)
            .finish()
    }
}

/// Retry policy for generation attempts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Additional attempts after the first failure
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Fraction of each delay randomized in either direction (0.0 disables jitter)
    #[serde(default = "default_jitter")]
    pub jitter: f64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Wall-clock bound across all attempts; 0 disables it
    #[serde(default = "default_overall_deadline_secs")]
    pub overall_deadline_secs: u64,
}

fn default_max_retries() -> u32 {
    3
}
fn default_initial_backoff_ms() -> u64 {
    2_000
}
fn default_multiplier() -> f64 {
    2.0
}
fn default_jitter() -> f64 {
    0.5
}
fn default_max_backoff_ms() -> u64 {
    30_000
}
fn default_overall_deadline_secs() -> u64 {
    300
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            multiplier: default_multiplier(),
            jitter: default_jitter(),
            max_backoff_ms: default_max_backoff_ms(),
            overall_deadline_secs: default_overall_deadline_secs(),
        }
    }
}

// ── Retrieval ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Dimensionality of every stored and query embedding
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    /// Minimum `1 - cosine_distance` for a document to be used
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,

    #[serde(default = "default_top_n")]
    pub knowledge_top_n: usize,

    /// How many prior messages feed the conversation context
    #[serde(default = "default_top_n")]
    pub history_limit: usize,
}

fn default_dimensions() -> usize {
    1024
}
fn default_similarity_threshold() -> f32 {
    0.20
}
fn default_top_n() -> usize {
    5
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            dimensions: default_dimensions(),
            similarity_threshold: default_similarity_threshold(),
            knowledge_top_n: default_top_n(),
            history_limit: default_top_n(),
        }
    }
}

// ── Chat ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Sender label of assistant messages and chunk events
    #[serde(default = "default_assistant_label")]
    pub assistant_label: String,

    /// Hold a per-session lock while a message is being answered
    #[serde(default = "default_true")]
    pub serialize_session_appends: bool,

    #[serde(default = "default_fallback_message")]
    pub fallback_message: String,

    /// Replaces the built-in prompt framing when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_framing: Option<String>,
}

fn default_assistant_label() -> String {
    "AI".into()
}
fn default_fallback_message() -> String {
    DEFAULT_FALLBACK_MESSAGE.into()
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            assistant_label: default_assistant_label(),
            serialize_session_appends: true,
            fallback_message: default_fallback_message(),
            system_framing: None,
        }
    }
}

// ── Gateway ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_port() -> u16 {
    8080
}
fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_max_body_bytes() -> usize {
    1024 * 1024
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

// ── Knowledge ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    /// Directory ingested by `ragachat ingest` when no path is given
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_dir: Option<PathBuf>,
}

// ── Loading ───────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from the default path (~/.ragachat/config.toml).
    ///
    /// Environment variables override the file:
    /// - `RAGACHAT_EMBEDDING_API_KEY`, then `COHERE_API_KEY`
    /// - `RAGACHAT_GENERATION_API_KEY`, then `GEMINI_API_KEY`
    /// - `RAGACHAT_DATABASE_URL`
    /// - `RAGACHAT_GENERATION_MODEL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
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

    /// Apply overrides from an environment lookup. Secrets only fill gaps;
    /// the database URL and model replace what the file says.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.embedding.api_key.is_none() {
            self.embedding.api_key =
                lookup("RAGACHAT_EMBEDDING_API_KEY").or_else(|| lookup("COHERE_API_KEY"));
        }

        if self.generation.api_key.is_none() {
            self.generation.api_key =
                lookup("RAGACHAT_GENERATION_API_KEY").or_else(|| lookup("GEMINI_API_KEY"));
        }

        if let Some(url) = lookup("RAGACHAT_DATABASE_URL") {
            self.database.url = Some(url);
        }

        if let Some(model) = lookup("RAGACHAT_GENERATION_MODEL") {
            self.generation.model = model;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".ragachat")
    }

    /// The effective database connection string.
    pub fn database_url(&self) -> String {
        match &self.database.url {
            Some(url) => url.clone(),
            None => Self::config_dir()
                .join("chat.sqlite")
                .to_string_lossy()
                .into_owned(),
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !matches!(self.database.backend.as_str(), "sqlite" | "postgres" | "memory") {
            return Err(ConfigError::ValidationError(format!(
                "unknown database backend '{}'",
                self.database.backend
            )));
        }

        if !matches!(self.embedding.provider.as_str(), "cohere" | "openai") {
            return Err(ConfigError::ValidationError(format!(
                "unknown embedding provider '{}'",
                self.embedding.provider
            )));
        }

        if !matches!(self.generation.provider.as_str(), "gemini" | "openai") {
            return Err(ConfigError::ValidationError(format!(
                "unknown generation provider '{}'",
                self.generation.provider
            )));
        }

        let retrieval = &self.retrieval;
        if retrieval.dimensions == 0 {
            return Err(ConfigError::ValidationError(
                "retrieval.dimensions must be > 0".into(),
            ));
        }
        if !(-1.0..=1.0).contains(&retrieval.similarity_threshold) {
            return Err(ConfigError::ValidationError(
                "retrieval.similarity_threshold must be between -1.0 and 1.0".into(),
            ));
        }
        if retrieval.knowledge_top_n == 0 || retrieval.history_limit == 0 {
            return Err(ConfigError::ValidationError(
                "retrieval.knowledge_top_n and retrieval.history_limit must be > 0".into(),
            ));
        }

        let retry = &self.generation.retry;
        if retry.multiplier < 1.0 {
            return Err(ConfigError::ValidationError(
                "generation.retry.multiplier must be >= 1.0".into(),
            ));
        }
        if !(0.0..=1.0).contains(&retry.jitter) {
            return Err(ConfigError::ValidationError(
                "generation.retry.jitter must be between 0.0 and 1.0".into(),
            ));
        }

        if self.chat.assistant_label.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "chat.assistant_label must not be blank".into(),
            ));
        }

        Ok(())
    }

    /// Generate a default config TOML string (for the `init` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
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
