//! Resume Common - Shared configuration, errors, and logging for the resume chat gateway.
//!
//! This crate provides:
//! - Configuration types and loading
//! - Configuration validation
//! - Error types and handling utilities
//! - Logging setup and the request tracing middleware
//! - Small string utilities used when logging prompts and errors

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod logging;
pub mod util;
pub mod validation;

pub use config::{
    Config, LlmConfig, NetworkConfig, ObservabilityConfig, SecretsConfig, SessionsConfig,
    WebConfig,
};
pub use error::{Error, Result};
pub use validation::{Validate, ValidationError, ValidationResult};
