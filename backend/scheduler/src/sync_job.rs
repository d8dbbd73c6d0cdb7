//! Periodic flush of the activity cache into the durable store.

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tracing::{debug, info, warn};

use corpsewatch_core::PersistenceGateway;
use corpsewatch_memory::ActivityCache;

use crate::scheduler::Job;

/// Outcome of one sync pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub updated: usize,
    /// Users whose durable row was missing (failed registration) and was
    /// inserted instead.
    pub repaired: usize,
    pub failed: usize,
    /// Users skipped because their durable counters could not be loaded, so
    /// writing the cached count would clobber the stored one.
    pub deferred: usize,
}

pub struct SyncJob {
    cache: Arc<ActivityCache>,
    gateway: Arc<dyn PersistenceGateway>,
}

impl SyncJob {
    pub fn new(cache: Arc<ActivityCache>, gateway: Arc<dyn PersistenceGateway>) -> Self {
        Self { cache, gateway }
    }

    /// Write every cached record's counters to the durable store.
    ///
    /// Last-write-wins and keyed by user id. Runs under the cache's flush
    /// lock, so it never interleaves with the weekly durable reset. A failed
    /// user is logged and skipped.
    pub async fn sync_once(&self) -> SyncSummary {
        let _flush = self.cache.flush_guard().await;
        let mut summary = SyncSummary {
            deferred: self.cache.hydrate_pending().await,
            ..SyncSummary::default()
        };
        let snapshot = self.cache.hydrated_snapshot();

        for record in &snapshot {
            let result = self
                .gateway
                .update_counts(record.user_id, record.message_count, record.last_message_at)
                .await;
            match result {
                Ok(()) => summary.updated += 1,
                Err(e) if e.is_not_found() => match self.gateway.insert(record).await {
                    Ok(()) => {
                        info!(user_id = %record.user_id, "Registered user missing from durable store");
                        summary.repaired += 1;
                    }
                    Err(e) => {
                        warn!(user_id = %record.user_id, op = e.op, error = %e, "Sync repair failed");
                        summary.failed += 1;
                    }
                },
                Err(e) => {
                    warn!(user_id = %record.user_id, op = e.op, error = %e, "Sync update failed");
                    summary.failed += 1;
                }
            }
        }

        debug!(?summary, "Sync pass finished");
        summary
    }
}

#[async_trait]
impl Job for SyncJob {
    fn name(&self) -> &str {
        "sync"
    }

    async fn run(&self) -> Result<()> {
        let summary = self.sync_once().await;
        if summary.failed > 0 || summary.deferred > 0 {
            bail!(
                "{} of {} users failed to sync, {} deferred",
                summary.failed,
                summary.updated + summary.repaired + summary.failed,
                summary.deferred
            );
        }
        info!(
            updated = summary.updated,
            repaired = summary.repaired,
            "Cache synced to durable store"
        );
        Ok(())
    }
}
