//! Configuration loading, validation, and env substitution.
//!
//! Config files: `courier.toml`, `courier.yaml`, or `courier.json`
//! Searched in `./` then `~/.config/courier/`.
//!
//! Supports `${ENV_VAR}` substitution in all string values.

pub mod env_subst;
pub mod error;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    error::{Error, Result},
    loader::{apply_env_overrides, config_dir, discover_and_load, load_config},
    schema::{
        CourierConfig, DatabaseConfig, DispatchConfig, GithubConfig, IngestConfig, IngestMode,
        MetricsConfig, PolicyConfig, PolicyMode, ProvidersConfig, SlackConfig, TwilioConfig,
        WhatsAppCloudConfig,
    },
    validate::{Diagnostic, Severity, ValidationResult, validate},
};
