//! Configuration management for the resume chat gateway.
//!
//! The gateway reads a single configuration file at `~/.resume-chat/config.json`
//! (override the path with `RESUME_CONFIG`).
//!
//! # Configuration Priority
//!
//! 1. Environment variables (after `.env` has been loaded)
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `GEMINI_API_KEY` / `GOOGLE_API_KEY` → secrets.gemini_api_key
//! - `RESUME_BIND_ADDRESS` → network.bind
//! - `RESUME_PORT` → network.port
//! - `RESUME_MODEL` → llm.model
//! - `RESUME_LOG_LEVEL` → observability.log_level
//! - `RESUME_LOG_FORMAT` → observability.log_format
//! - `RESUME_MAX_SESSIONS` → sessions.max_sessions
//! - `RESUME_SESSION_TTL_SECS` → sessions.idle_ttl_secs
//! - `RESUME_STATIC_DIR` → web.static_dir

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".resume-chat"),
        |dirs| dirs.home_dir().join(".resume-chat"),
    )
}

/// Get the configuration file path.
///
/// `RESUME_CONFIG` takes precedence over the default location.
pub fn config_path() -> PathBuf {
    std::env::var("RESUME_CONFIG")
        .ok()
        .filter(|p| !p.is_empty())
        .map_or_else(|| config_dir().join("config.json"), PathBuf::from)
}

/// Load variables from a `.env` file in the working directory, if present.
///
/// Returns the path that was loaded. A missing file is not an error.
pub fn load_dotenv() -> Option<PathBuf> {
    match dotenvy::dotenv() {
        Ok(path) => Some(path),
        Err(e) if e.not_found() => None,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to load .env file");
            None
        }
    }
}

// ============================================================================
// Network Configuration
// ============================================================================

/// Listener configuration.
///
/// Default bind is `127.0.0.1` (local only). Set to `0.0.0.0` to allow remote access.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Bind address for the HTTP listener.
    #[serde(default = "default_bind_address")]
    pub bind: String,

    /// Listener port.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind: default_bind_address(),
            port: default_port(),
        }
    }
}

fn default_bind_address() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    5000
}

// ============================================================================
// Secrets
// ============================================================================

/// Credentials for external services.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecretsConfig {
    /// Google Generative Language API key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gemini_api_key: Option<String>,
}

// ============================================================================
// LLM Configuration
// ============================================================================

/// Generative model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Model name, e.g. "gemini-1.5-flash"
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f64,

    /// Upper bound on generated tokens per reply
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: i64,

    /// Per-request timeout against the provider
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    /// Base URL of the Generative Language API
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_llm_model(),
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
            timeout_secs: default_llm_timeout(),
            base_url: default_llm_base_url(),
        }
    }
}

fn default_llm_model() -> String {
    "gemini-1.5-flash".into()
}

fn default_temperature() -> f64 {
    0.7
}

fn default_max_output_tokens() -> i64 {
    8192
}

fn default_llm_timeout() -> u64 {
    120
}

fn default_llm_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".into()
}

// ============================================================================
// Session Configuration
// ============================================================================

/// Conversation session bookkeeping.
///
/// `max_sessions` and `idle_ttl_secs` are off by default, which keeps every
/// conversation alive until it is cleared explicitly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// Session id used when a request does not carry one
    #[serde(default = "default_session_id")]
    pub default_session_id: String,

    /// Suffix appended to a session id to form its resume analysis key
    #[serde(default = "default_resume_suffix")]
    pub resume_suffix: String,

    /// Maximum number of live conversations (least recently used is evicted)
    #[serde(default)]
    pub max_sessions: Option<usize>,

    /// Drop conversations idle for longer than this many seconds
    #[serde(default)]
    pub idle_ttl_secs: Option<u64>,

    /// How often the expiry sweeper runs when `idle_ttl_secs` is set
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            default_session_id: default_session_id(),
            resume_suffix: default_resume_suffix(),
            max_sessions: None,
            idle_ttl_secs: None,
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

fn default_session_id() -> String {
    "default_session".into()
}

fn default_resume_suffix() -> String {
    "_resume".into()
}

fn default_sweep_interval() -> u64 {
    60
}

// ============================================================================
// Web Configuration
// ============================================================================

/// Web front-end settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    /// Directory served under `/static`
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,

    /// Maximum accepted request body for uploads
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            static_dir: default_static_dir(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("static")
}

fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}

// ============================================================================
// Observability Configuration
// ============================================================================

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,

    /// Additional module targets to force to `warn`.
    ///
    /// Built-in noisy modules (hyper, reqwest, h2, rustls, ...) are always
    /// filtered; this list adds to them.
    #[serde(default)]
    pub excluded_targets: Vec<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            excluded_targets: Vec::new(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration for the gateway.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Listener configuration
    #[serde(default)]
    pub network: NetworkConfig,

    /// Credentials
    #[serde(default)]
    pub secrets: SecretsConfig,

    /// Generative model settings
    #[serde(default)]
    pub llm: LlmConfig,

    /// Session store settings
    #[serde(default)]
    pub sessions: SessionsConfig,

    /// Web front-end settings
    #[serde(default)]
    pub web: WebConfig,

    /// Logging configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            tracing::info!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration and apply environment variable overrides.
    pub fn load_with_env() -> Result<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply overrides from an arbitrary variable source.
    ///
    /// Split out from [`Config::apply_env_overrides`] so overrides can be
    /// exercised without touching the process environment.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        if let Some(key) = non_empty("GEMINI_API_KEY").or_else(|| non_empty("GOOGLE_API_KEY")) {
            self.secrets.gemini_api_key = Some(key);
        }

        if let Some(bind) = lookup("RESUME_BIND_ADDRESS") {
            self.network.bind = bind;
        }
        if let Some(p) = lookup("RESUME_PORT").and_then(|v| v.parse().ok()) {
            self.network.port = p;
        }

        if let Some(model) = lookup("RESUME_MODEL") {
            self.llm.model = model;
        }

        if let Some(level) = lookup("RESUME_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Some(format) = lookup("RESUME_LOG_FORMAT") {
            self.observability.log_format = format;
        }

        if let Some(max) = lookup("RESUME_MAX_SESSIONS").and_then(|v| v.parse().ok()) {
            self.sessions.max_sessions = Some(max);
        }
        if let Some(ttl) = lookup("RESUME_SESSION_TTL_SECS").and_then(|v| v.parse().ok()) {
            self.sessions.idle_ttl_secs = Some(ttl);
        }

        if let Some(dir) = lookup("RESUME_STATIC_DIR") {
            self.web.static_dir = PathBuf::from(dir);
        }
    }

    /// The Gemini API key, if one is configured and non-empty.
    pub fn gemini_api_key(&self) -> Option<&str> {
        self.secrets
            .gemini_api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
    }

    /// Listener address as `host:port`.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.network.bind, self.network.port)
    }
}
