//! `corpsewatch-config`: runtime configuration for the CorpseWatch bot.
//!
//! Provides:
//! - Typed config schema (bot credentials, chats, cycle, jobs, storage, texts)
//! - YAML loading from the config directory
//! - `${ENV_VAR}` substitution and deployment env overrides
//! - Default value application
//! - Validation into typed [`Settings`], fatal on any error
//! - Config redaction for safe logging

pub mod defaults;
pub mod env;
pub mod io;
pub mod redact;
pub mod schema;
pub mod validation;

pub use defaults::apply_all_defaults;
pub use env::{apply_env_overrides, resolve_env_vars, resolve_env_vars_with, MissingEnvVarError};
pub use io::{config_dir, config_file_path, load_raw};
pub use redact::redact;
pub use schema::CorpseWatchConfig;
pub use validation::{validate, ConfigError, ConfigValidationError, Settings};

use anyhow::{Context, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;

/// Validated settings plus a secret-masked copy of the effective config for
/// the startup log.
#[derive(Debug, Clone)]
pub struct PreparedConfig {
    pub settings: Settings,
    pub redacted: Value,
}

/// Load, substitute env vars, apply overrides and defaults, and validate a
/// config file. Relative storage and log paths resolve against the file's
/// directory.
///
/// This is the main entry point for loading a config at runtime.
pub async fn load_and_prepare(path: &Path) -> Result<PreparedConfig> {
    let raw = load_raw(path).await?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    prepare(raw, &std::env::vars().collect(), base_dir)
}

/// The load pipeline after the file has been read.
pub fn prepare(
    raw: Value,
    env: &HashMap<String, String>,
    base_dir: &Path,
) -> Result<PreparedConfig> {
    let value = resolve_env_vars_with(&raw, env).context("Failed to resolve env vars in config")?;
    let config = io::from_value(value)?;
    let config = apply_env_overrides(config, env);
    let mut config = apply_all_defaults(config);

    config.storage.db_path = config
        .storage
        .db_path
        .map(|p| io::resolve_relative(base_dir, &p));
    config.logging.dir = config
        .logging
        .dir
        .map(|p| io::resolve_relative(base_dir, &p));

    let settings = validate(&config)?;
    let redacted = redact(
        &serde_json::to_value(&config).context("Failed to serialize config for logging")?,
    );
    Ok(PreparedConfig { settings, redacted })
}
