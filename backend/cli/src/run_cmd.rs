//! `corpsewatch run`: wire the cache, store, jobs and Telegram together.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use corpsewatch_channels::{ChannelAdapter, Intake, TelegramAdapter};
use corpsewatch_config::load_and_prepare;
use corpsewatch_core::{PersistenceGateway, ReportGenerator};
use corpsewatch_memory::{ActivityCache, SqliteGateway};
use corpsewatch_scheduler::{Cadence, CountdownJob, CycleJob, Scheduler, SyncJob};

pub async fn run(config_path: &Path) -> Result<()> {
    let prepared = load_and_prepare(config_path).await?;
    let settings = prepared.settings;
    logging::init_logger(&settings.log_dir, &settings.log_level)?;

    info!(
        path = %config_path.display(),
        config = %prepared.redacted,
        "Starting CorpseWatch"
    );

    let gateway: Arc<dyn PersistenceGateway> = Arc::new(
        SqliteGateway::open(&settings.db_path)
            .with_context(|| format!("Failed to open {}", settings.db_path.display()))?,
    );
    let cache = Arc::new(ActivityCache::open(Arc::clone(&gateway), settings.rehydration).await);
    let binding = Arc::new(settings.binding());
    if let Some(chat) = binding.target() {
        info!(chat_id = chat, "Report chat configured");
    }

    let telegram = Arc::new(TelegramAdapter::new(
        settings.bot_token.clone(),
        settings.bot_name.clone(),
    ));
    let generator = ReportGenerator::new(settings.nicknames.clone(), settings.templates.clone());

    let sync = Arc::new(SyncJob::new(Arc::clone(&cache), Arc::clone(&gateway)));
    let cycle = Arc::new(CycleJob::new(
        Arc::clone(&cache),
        Arc::clone(&gateway),
        generator,
        telegram.clone(),
        Arc::clone(&binding),
    ));
    let countdown = Arc::new(CountdownJob::new(settings.boundary));

    let mut scheduler = Scheduler::new();
    scheduler.spawn(sync.clone(), Cadence::every_immediately(settings.sync_interval));
    scheduler.spawn(cycle, Cadence::Weekly(settings.boundary));
    scheduler.spawn(countdown, Cadence::every_immediately(settings.countdown_interval));
    info!(jobs = scheduler.len(), boundary = %settings.boundary, "All jobs scheduled");

    let intake = Arc::new(Intake::new(
        binding,
        Arc::clone(&cache),
        settings.templates.restricted.clone(),
    ));

    // Returns on Ctrl-C.
    if let Err(e) = telegram.start(intake).await {
        error!(error = %format!("{e:#}"), "Telegram adapter failed");
    }

    info!("Shutting down");
    scheduler.shutdown().await;

    let summary = sync.sync_once().await;
    if summary.failed > 0 || summary.deferred > 0 {
        warn!(
            failed = summary.failed,
            deferred = summary.deferred,
            "Final sync incomplete; unsynced counts are lost"
        );
    }
    info!(
        updated = summary.updated,
        repaired = summary.repaired,
        "Final sync complete"
    );
    Ok(())
}
