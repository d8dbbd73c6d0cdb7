//! Config file location and loading.

use crate::schema::CorpseWatchConfig;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Default config file name within the config directory.
const CONFIG_FILE_NAME: &str = "config.yaml";

/// Env var naming the config directory.
pub const CONFIG_DIR_ENV: &str = "CORPSEWATCH_CONFIG_DIR";

/// Resolve the CorpseWatch config directory.
/// Priority: `CORPSEWATCH_CONFIG_DIR` env > `~/.corpsewatch/` > `./.corpsewatch/`
pub fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV) {
        return PathBuf::from(dir);
    }
    match dirs::home_dir() {
        Some(home) => home.join(".corpsewatch"),
        None => PathBuf::from(".corpsewatch"),
    }
}

/// Resolve the full path to the main config file.
pub fn config_file_path(config_dir: &Path) -> PathBuf {
    config_dir.join(CONFIG_FILE_NAME)
}

/// Read the config as an untyped value tree, ready for env substitution.
///
/// Returns an empty object if the file doesn't exist, so defaults and
/// validation decide what is missing.
pub async fn load_raw(path: &Path) -> Result<serde_json::Value> {
    if !path.exists() {
        debug!(path = %path.display(), "Config file does not exist; using defaults");
        return Ok(serde_json::Value::Object(Default::default()));
    }

    let raw = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let value: serde_json::Value = serde_yaml::from_str(&raw)
        .with_context(|| format!("Failed to parse config YAML at: {}", path.display()))?;

    info!(path = %path.display(), "Loaded config");
    Ok(match value {
        serde_json::Value::Null => serde_json::Value::Object(Default::default()),
        other => other,
    })
}

/// Typed view of a value tree.
pub fn from_value(value: serde_json::Value) -> Result<CorpseWatchConfig> {
    serde_json::from_value(value).context("Failed to deserialize config")
}

/// Resolve `path` against `base` unless it is already absolute.
pub fn resolve_relative(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
