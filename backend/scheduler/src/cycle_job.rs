//! Weekly report-and-reset.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{info, warn};

use corpsewatch_core::{
    ActivityRecord, Announcer, ChatBinding, PersistenceGateway, ReportError, ReportGenerator, UserId,
};
use corpsewatch_memory::ActivityCache;

use crate::scheduler::Job;

/// What one weekly firing did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Reported { loser: UserId, participants: usize },
    /// Nobody has been tracked yet; nothing was announced or reset.
    Empty,
}

pub struct CycleJob {
    cache: Arc<ActivityCache>,
    gateway: Arc<dyn PersistenceGateway>,
    generator: ReportGenerator,
    announcer: Arc<dyn Announcer>,
    binding: Arc<ChatBinding>,
}

impl CycleJob {
    pub fn new(
        cache: Arc<ActivityCache>,
        gateway: Arc<dyn PersistenceGateway>,
        generator: ReportGenerator,
        announcer: Arc<dyn Announcer>,
        binding: Arc<ChatBinding>,
    ) -> Self {
        Self {
            cache,
            gateway,
            generator,
            announcer,
            binding,
        }
    }

    /// Close the current cycle: roll the cache over, zero the durable
    /// counters, then announce the ranking and the loser.
    ///
    /// Transport failures never undo the reset. A failed durable reset is
    /// returned as an error once the announcements are out.
    pub async fn close_cycle(&self) -> Result<CycleOutcome> {
        let (snapshot, durable_reset) = {
            let _flush = self.cache.flush_guard().await;
            // Users silent since a lazy restart only exist in the store.
            if let Err(e) = self.cache.warm().await {
                warn!(error = %e, "Could not load durable records before the report");
            }
            let snapshot = self.cache.rollover();
            (snapshot, self.gateway.reset_counts().await)
        };

        let outcome = self.report(&snapshot).await?;
        let rows = durable_reset.context("Cycle closed in memory but durable counters were not reset")?;
        info!(rows, "Durable counters reset for the new cycle");
        Ok(outcome)
    }

    async fn report(&self, snapshot: &[ActivityRecord]) -> Result<CycleOutcome, ReportError> {
        match self.generator.generate(snapshot) {
            Ok(report) => {
                info!(
                    loser = %report.loser,
                    loser_count = report.loser_count,
                    participants = snapshot.len(),
                    "Corpse of the week selected"
                );
                let templates = self.generator.templates();
                self.send(&[&templates.preamble, &report.ranking, &report.announcement])
                    .await;
                Ok(CycleOutcome::Reported {
                    loser: report.loser,
                    participants: snapshot.len(),
                })
            }
            Err(ReportError::EmptySnapshot) => {
                info!("No participants this cycle; skipping the report");
                if let Some(notice) = &self.generator.templates().empty_cycle {
                    self.send(&[notice]).await;
                }
                Ok(CycleOutcome::Empty)
            }
            Err(e) => Err(e),
        }
    }

    async fn send(&self, texts: &[&String]) {
        let Some(chat_id) = self.binding.target() else {
            warn!("No report chat bound yet; weekly announcement skipped");
            return;
        };
        for text in texts {
            let text = text.trim_end();
            if text.is_empty() {
                continue;
            }
            if let Err(e) = self.announcer.announce(chat_id, text).await {
                warn!(
                    transport = self.announcer.name(),
                    chat_id,
                    error = %e,
                    "Failed to deliver weekly announcement"
                );
            }
        }
    }
}

#[async_trait]
impl Job for CycleJob {
    fn name(&self) -> &str {
        "cycle"
    }

    async fn run(&self) -> Result<()> {
        self.close_cycle().await?;
        Ok(())
    }
}
