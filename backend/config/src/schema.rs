//! CorpseWatch configuration schema.
//!
//! Typed for serde YAML/JSON deserialization with camelCase keys. Scalar
//! settings are optional here; `defaults::apply_all_defaults` fills them in.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use corpsewatch_core::{ChatId, ReportTemplates};

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorpseWatchConfig {
    /// Bot credentials
    #[serde(default)]
    pub telegram: TelegramConfig,

    /// Allow-listed chats and the report chat
    #[serde(default)]
    pub chats: ChatsConfig,

    /// Weekly boundary
    #[serde(default)]
    pub cycle: CycleConfig,

    /// Cache-to-store flush cadence
    #[serde(default)]
    pub sync: IntervalConfig,

    /// Countdown log cadence
    #[serde(default)]
    pub countdown: IntervalConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Username to nickname
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub nicknames: HashMap<String, String>,

    /// Everything the bot says
    #[serde(default)]
    pub messages: ReportTemplates,
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelegramConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatsConfig {
    #[serde(default)]
    pub allowed: Vec<ChatId>,
    /// Bind reports to this chat up front instead of the first active one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_chat: Option<ChatId>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleConfig {
    /// e.g. "sunday"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weekday: Option<String>,
    /// "HH:MM"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    /// "+HH:MM"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utc_offset: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntervalConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageConfig {
    /// Relative paths resolve against the config file's directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_path: Option<PathBuf>,
    /// "eager" | "lazy"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rehydration: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    /// Relative paths resolve against the config file's directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}
