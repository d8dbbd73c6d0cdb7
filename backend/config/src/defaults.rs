//! Config defaults: applies sensible default values to parsed config.

use crate::schema::CorpseWatchConfig;

pub const DEFAULT_BOT_NAME: &str = "corpsewatch";

/// Sunday 16:00 UTC.
pub const DEFAULT_CYCLE_WEEKDAY: &str = "sunday";
pub const DEFAULT_CYCLE_TIME: &str = "16:00";
pub const DEFAULT_UTC_OFFSET: &str = "+00:00";

/// Five minutes.
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 300;

/// One hour.
pub const DEFAULT_COUNTDOWN_INTERVAL_SECS: u64 = 3600;

pub const DEFAULT_DB_PATH: &str = "corpsewatch.db";
pub const DEFAULT_REHYDRATION: &str = "eager";
pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_LOG_DIR: &str = "logs";

/// Apply all defaults to a freshly loaded config.
pub fn apply_all_defaults(config: CorpseWatchConfig) -> CorpseWatchConfig {
    let config = apply_telegram_defaults(config);
    let config = apply_cycle_defaults(config);
    let config = apply_interval_defaults(config);
    let config = apply_storage_defaults(config);
    apply_logging_defaults(config)
}

fn apply_telegram_defaults(mut config: CorpseWatchConfig) -> CorpseWatchConfig {
    config
        .telegram
        .bot_name
        .get_or_insert_with(|| DEFAULT_BOT_NAME.to_string());
    config
}

fn apply_cycle_defaults(mut config: CorpseWatchConfig) -> CorpseWatchConfig {
    let cycle = &mut config.cycle;
    cycle.weekday.get_or_insert_with(|| DEFAULT_CYCLE_WEEKDAY.to_string());
    cycle.time.get_or_insert_with(|| DEFAULT_CYCLE_TIME.to_string());
    cycle.utc_offset.get_or_insert_with(|| DEFAULT_UTC_OFFSET.to_string());
    config
}

fn apply_interval_defaults(mut config: CorpseWatchConfig) -> CorpseWatchConfig {
    config.sync.interval_secs.get_or_insert(DEFAULT_SYNC_INTERVAL_SECS);
    config
        .countdown
        .interval_secs
        .get_or_insert(DEFAULT_COUNTDOWN_INTERVAL_SECS);
    config
}

fn apply_storage_defaults(mut config: CorpseWatchConfig) -> CorpseWatchConfig {
    let storage = &mut config.storage;
    storage.db_path.get_or_insert_with(|| DEFAULT_DB_PATH.into());
    storage.rehydration.get_or_insert_with(|| DEFAULT_REHYDRATION.to_string());
    config
}

fn apply_logging_defaults(mut config: CorpseWatchConfig) -> CorpseWatchConfig {
    let logging = &mut config.logging;
    logging.level.get_or_insert_with(|| DEFAULT_LOG_LEVEL.to_string());
    logging.dir.get_or_insert_with(|| DEFAULT_LOG_DIR.into());
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::IntervalConfig;

    #[test]
    fn fills_every_scalar() {
        let cfg = apply_all_defaults(CorpseWatchConfig::default());
        assert_eq!(cfg.cycle.weekday.as_deref(), Some("sunday"));
        assert_eq!(cfg.cycle.time.as_deref(), Some("16:00"));
        assert_eq!(cfg.cycle.utc_offset.as_deref(), Some("+00:00"));
        assert_eq!(cfg.sync.interval_secs, Some(300));
        assert_eq!(cfg.countdown.interval_secs, Some(3600));
        assert_eq!(cfg.storage.rehydration.as_deref(), Some("eager"));
        assert_eq!(cfg.logging.level.as_deref(), Some("info"));
        assert!(cfg.telegram.bot_token.is_none());
    }

    #[test]
    fn does_not_override_user_values() {
        let cfg = CorpseWatchConfig {
            sync: IntervalConfig { interval_secs: Some(60) },
            ..Default::default()
        };
        let cfg = apply_all_defaults(cfg);
        assert_eq!(cfg.sync.interval_secs, Some(60));
    }
}
