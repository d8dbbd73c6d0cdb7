//! Config validation: resolves the defaulted config into typed runtime
//! settings, collecting every problem in one pass.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use corpsewatch_core::{
    report::{COUNT_PLACEHOLDER, NAME_PLACEHOLDER},
    ChatBinding, ChatId, Nicknames, ReportTemplates, WeeklyBoundary,
};
use corpsewatch_memory::RehydrationPolicy;

use crate::schema::CorpseWatchConfig;

/// A config validation error with field path and message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("'{path}': {message}")]
pub struct ConfigValidationError {
    pub path: String,
    pub message: String,
}

/// Fatal startup error: the configuration cannot run the bot.
#[derive(Debug, Error)]
#[error("invalid configuration: {}", render(.errors))]
pub struct ConfigError {
    pub errors: Vec<ConfigValidationError>,
}

fn render(errors: &[ConfigValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Everything the process needs, typed and checked.
#[derive(Debug, Clone)]
pub struct Settings {
    pub bot_token: String,
    pub bot_name: String,
    pub allowed_chats: BTreeSet<ChatId>,
    pub report_chat: Option<ChatId>,
    pub boundary: WeeklyBoundary,
    pub sync_interval: Duration,
    pub countdown_interval: Duration,
    pub db_path: PathBuf,
    pub rehydration: RehydrationPolicy,
    pub log_level: String,
    pub log_dir: PathBuf,
    pub nicknames: Nicknames,
    pub templates: ReportTemplates,
}

impl Settings {
    /// Fresh chat binding, pre-bound when a report chat is configured.
    pub fn binding(&self) -> ChatBinding {
        let binding = ChatBinding::new(self.allowed_chats.iter().copied());
        match self.report_chat {
            Some(chat) => binding.with_target(chat),
            None => binding,
        }
    }
}

#[derive(Default)]
struct Collector {
    errors: Vec<ConfigValidationError>,
}

impl Collector {
    fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            path: path.into(),
            message: message.into(),
        });
    }

    fn require<'a>(&mut self, path: &str, value: &'a Option<String>) -> &'a str {
        match value.as_deref().map(str::trim) {
            Some(v) if !v.is_empty() => v,
            _ => {
                self.error(path, "is required");
                ""
            }
        }
    }
}

/// Validate a defaulted config and resolve it into [`Settings`].
pub fn validate(config: &CorpseWatchConfig) -> Result<Settings, ConfigError> {
    let mut c = Collector::default();

    let bot_token = c.require("telegram.botToken", &config.telegram.bot_token).to_string();
    let bot_name = c.require("telegram.botName", &config.telegram.bot_name).to_string();

    let allowed_chats: BTreeSet<ChatId> = config.chats.allowed.iter().copied().collect();
    if allowed_chats.is_empty() {
        c.error("chats.allowed", "at least one chat must be allow-listed");
    }
    if let Some(chat) = config.chats.report_chat {
        if !allowed_chats.contains(&chat) {
            c.error("chats.reportChat", format!("chat {chat} is not in chats.allowed"));
        }
    }

    let boundary = WeeklyBoundary::parse(
        c.require("cycle.weekday", &config.cycle.weekday),
        c.require("cycle.time", &config.cycle.time),
        c.require("cycle.utcOffset", &config.cycle.utc_offset),
    );
    let boundary = match boundary {
        Ok(b) => Some(b),
        Err(e) => {
            c.error("cycle", e.to_string());
            None
        }
    };

    let sync_interval = interval(&mut c, "sync.intervalSecs", config.sync.interval_secs);
    let countdown_interval =
        interval(&mut c, "countdown.intervalSecs", config.countdown.interval_secs);

    let rehydration = match config
        .storage
        .rehydration
        .as_deref()
        .unwrap_or_default()
        .parse::<RehydrationPolicy>()
    {
        Ok(policy) => policy,
        Err(e) => {
            c.error("storage.rehydration", e);
            RehydrationPolicy::default()
        }
    };

    let db_path = config.storage.db_path.clone().unwrap_or_default();
    if db_path.as_os_str().is_empty() {
        c.error("storage.dbPath", "is required");
    }

    let log_level = c.require("logging.level", &config.logging.level).to_string();
    let log_dir = config.logging.dir.clone().unwrap_or_default();

    validate_templates(&mut c, &config.messages);

    match (c.errors.is_empty(), boundary) {
        (true, Some(boundary)) => Ok(Settings {
            bot_token,
            bot_name,
            allowed_chats,
            report_chat: config.chats.report_chat,
            boundary,
            sync_interval,
            countdown_interval,
            db_path,
            rehydration,
            log_level,
            log_dir,
            nicknames: Nicknames::new(config.nicknames.clone()),
            templates: config.messages.clone(),
        }),
        _ => Err(ConfigError { errors: c.errors }),
    }
}

fn interval(c: &mut Collector, path: &str, secs: Option<u64>) -> Duration {
    match secs {
        Some(0) | None => {
            c.error(path, "must be >= 1");
            Duration::ZERO
        }
        Some(secs) => Duration::from_secs(secs),
    }
}

fn validate_templates(c: &mut Collector, templates: &ReportTemplates) {
    let required = [
        ("messages.rankingLine", &templates.ranking_line, &[NAME_PLACEHOLDER, COUNT_PLACEHOLDER][..]),
        ("messages.loser", &templates.loser, &[NAME_PLACEHOLDER][..]),
    ];
    for (path, template, placeholders) in required {
        for placeholder in placeholders {
            if !template.contains(placeholder) {
                c.error(path, format!("must contain {placeholder}"));
            }
        }
    }
}
