//! Configuration validation.
//!
//! Each configuration section validates itself; [`Config::validate`] collects
//! the failures of every section.

use thiserror::Error;

use crate::config::{
    Config, LlmConfig, NetworkConfig, ObservabilityConfig, SessionsConfig, WebConfig,
};

/// Configuration validation error.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid port {port}: must be between 1 and 65535")]
    InvalidPort { port: u16, field: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Multiple validation errors: {0:?}")]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Trait for validatable configuration sections.
pub trait Validate {
    /// Validate this configuration section.
    fn validate(&self) -> ValidationResult<()>;
}

impl Config {
    /// Validate the entire configuration.
    ///
    /// A missing API key is deliberately not checked here: the service starts
    /// without one and reports the problem on the first model call.
    pub fn validate(&self) -> ValidationResult<()> {
        let results = [
            self.network.validate(),
            self.llm.validate(),
            self.sessions.validate(),
            self.web.validate(),
            self.observability.validate(),
        ];

        let mut errors: Vec<ValidationError> =
            results.into_iter().filter_map(Result::err).collect();

        if errors.is_empty() {
            Ok(())
        } else if errors.len() == 1 {
            Err(errors.remove(0))
        } else {
            Err(ValidationError::Multiple(errors))
        }
    }

    /// Load, apply environment overrides, and validate configuration.
    pub fn load_and_validate() -> anyhow::Result<Self> {
        let config = Self::load_with_env()?;
        config.validate().map_err(|e| anyhow::anyhow!("{}", e))?;
        Ok(config)
    }
}

impl Validate for NetworkConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort {
                port: self.port,
                field: "network.port".into(),
            });
        }
        if self.bind.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "network.bind".into(),
            });
        }
        Ok(())
    }
}

impl Validate for LlmConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.model.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "llm.model".into(),
            });
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ValidationError::InvalidValue {
                field: "llm.temperature".into(),
                reason: format!("{} is outside 0.0..=2.0", self.temperature),
            });
        }
        if self.max_output_tokens <= 0 {
            return Err(ValidationError::InvalidValue {
                field: "llm.max_output_tokens".into(),
                reason: "must be greater than 0".into(),
            });
        }
        if self.timeout_secs == 0 {
            return Err(ValidationError::InvalidValue {
                field: "llm.timeout_secs".into(),
                reason: "must be greater than 0".into(),
            });
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ValidationError::InvalidValue {
                field: "llm.base_url".into(),
                reason: format!("'{}' is not an http(s) URL", self.base_url),
            });
        }
        Ok(())
    }
}

impl Validate for SessionsConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.default_session_id.is_empty() {
            return Err(ValidationError::MissingField {
                field: "sessions.default_session_id".into(),
            });
        }
        if self.resume_suffix.is_empty() {
            return Err(ValidationError::MissingField {
                field: "sessions.resume_suffix".into(),
            });
        }
        if self.max_sessions == Some(0) {
            return Err(ValidationError::InvalidValue {
                field: "sessions.max_sessions".into(),
                reason: "must be greater than 0 when set".into(),
            });
        }
        if self.idle_ttl_secs == Some(0) {
            return Err(ValidationError::InvalidValue {
                field: "sessions.idle_ttl_secs".into(),
                reason: "must be greater than 0 when set".into(),
            });
        }
        if self.sweep_interval_secs == 0 {
            return Err(ValidationError::InvalidValue {
                field: "sessions.sweep_interval_secs".into(),
                reason: "must be greater than 0".into(),
            });
        }
        Ok(())
    }
}

impl Validate for WebConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.max_upload_bytes == 0 {
            return Err(ValidationError::InvalidValue {
                field: "web.max_upload_bytes".into(),
                reason: "must be greater than 0".into(),
            });
        }
        Ok(())
    }
}

impl Validate for ObservabilityConfig {
    fn validate(&self) -> ValidationResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_level".into(),
                reason: format!(
                    "'{}' is not one of {}",
                    self.log_level,
                    valid_levels.join(", ")
                ),
            });
        }

        if !matches!(self.log_format.as_str(), "pretty" | "json") {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_format".into(),
                reason: format!("'{}' must be 'pretty' or 'json'", self.log_format),
            });
        }
        Ok(())
    }
}
