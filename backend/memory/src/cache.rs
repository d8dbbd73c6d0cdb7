//! In-memory activity cache, the authoritative per-cycle state.
//!
//! The hot path (`observe`) synchronizes only on the key it touches:
//! a `DashMap` shard lock for the brief insert-if-absent of a slot, a
//! `OnceCell` for exactly-once initialization of that slot, and a per-record
//! mutex for the increment. Durable I/O happens inside the `OnceCell`
//! initializer, which blocks only concurrent first observations of the
//! same user.
//!
//! `snapshot`, `reset` and `rollover` serialize with each other through the
//! cycle lock, which `observe` never takes. Passes that write cache state
//! back to the store hold the flush lock instead.
//!
//! A record whose durable row could not be read when it was initialized is
//! kept *unhydrated*: it counts in memory, is left out of
//! `hydrated_snapshot`, and gets the stored count added once
//! `hydrate_pending` or `warm` can read the row.

use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard, OnceCell};
use tracing::{debug, info, warn};

use corpsewatch_core::{ActivityRecord, PersistenceError, PersistenceGateway, UserId};

type Slot = OnceCell<Mutex<Entry>>;

struct Entry {
    record: ActivityRecord,
    /// False until the durable counters have been folded into `record`.
    hydrated: bool,
}

impl Entry {
    fn hydrated(record: ActivityRecord) -> Self {
        Self { record, hydrated: true }
    }

    fn pending(record: ActivityRecord) -> Self {
        Self { record, hydrated: false }
    }

    fn absorb(&mut self, stored: &ActivityRecord) {
        self.record.message_count += stored.message_count;
        self.record.first_message_at = self.record.first_message_at.min(stored.first_message_at);
        self.record.last_message_at = self.record.last_message_at.max(stored.last_message_at);
        self.hydrated = true;
    }
}

/// How durable state reaches the cache after a cold start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RehydrationPolicy {
    /// Load every durable record at construction.
    #[default]
    Eager,
    /// Load a user's durable counters on their first observation.
    Lazy,
}

impl FromStr for RehydrationPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "eager" => Ok(Self::Eager),
            "lazy" => Ok(Self::Lazy),
            other => Err(format!("unknown rehydration policy '{other}' (expected eager or lazy)")),
        }
    }
}

pub struct ActivityCache {
    entries: DashMap<UserId, Arc<Slot>>,
    gateway: Arc<dyn PersistenceGateway>,
    cycle: Mutex<()>,
    flush: AsyncMutex<()>,
}

impl ActivityCache {
    /// An empty cache that rehydrates lazily.
    pub fn new(gateway: Arc<dyn PersistenceGateway>) -> Self {
        Self {
            entries: DashMap::new(),
            gateway,
            cycle: Mutex::new(()),
            flush: AsyncMutex::new(()),
        }
    }

    /// Build a cache according to `policy`. A failed eager warm-up is logged
    /// and leaves the cache to rehydrate lazily.
    pub async fn open(gateway: Arc<dyn PersistenceGateway>, policy: RehydrationPolicy) -> Self {
        let cache = Self::new(gateway);
        if policy == RehydrationPolicy::Eager {
            match cache.warm().await {
                Ok(loaded) => info!(loaded, "Activity cache warmed from durable store"),
                Err(e) => warn!(error = %e, "Eager rehydration failed; falling back to lazy"),
            }
        }
        cache
    }

    /// Load all durable records not yet present in the cache, and fold the
    /// stored counts into unhydrated ones. Returns how many records changed.
    pub async fn warm(&self) -> Result<usize, PersistenceError> {
        let records = self.gateway.fetch_all().await?;
        let mut loaded = 0;
        for record in records {
            let slot = self.slot(record.user_id);
            if let Some(entry) = slot.get() {
                let mut entry = lock(entry);
                if !entry.hydrated {
                    entry.absorb(&record);
                    loaded += 1;
                }
            } else if slot.set(Mutex::new(Entry::hydrated(record))).is_ok() {
                loaded += 1;
            }
        }
        Ok(loaded)
    }

    /// Count one message from `user_id`.
    ///
    /// The first observation of a user rehydrates their durable counters or
    /// registers them, exactly once even under concurrent first observations.
    /// The triggering message is counted on top of what was loaded, so a
    /// rehydrated user ends at the stored count plus one and a new user at 1.
    ///
    /// Persistence failures are logged; the observation is always counted.
    /// If the durable row could not be read, the record stays unhydrated
    /// until a later sync pass folds the stored count in.
    pub async fn observe(&self, user_id: UserId, display_name: &str, now: DateTime<Utc>) {
        let slot = self.slot(user_id);
        let entry = slot
            .get_or_init(|| self.load_or_register(user_id, display_name, now))
            .await;
        let mut entry = lock(entry);
        entry.record.observe(display_name, now);
        debug!(user_id = %user_id, count = entry.record.message_count, "Observed message");
    }

    /// Point-in-time copies of every record, ordered by user id.
    pub fn snapshot(&self) -> Vec<ActivityRecord> {
        let _cycle = lock(&self.cycle);
        self.collect(|entry| Some(entry.record.clone()))
    }

    /// Like `snapshot`, minus records whose durable counters are not yet
    /// folded in. Only these may overwrite durable rows.
    pub fn hydrated_snapshot(&self) -> Vec<ActivityRecord> {
        let _cycle = lock(&self.cycle);
        self.collect(|entry| entry.hydrated.then(|| entry.record.clone()))
    }

    /// Zero every record's counter. Stored counts from before the reset no
    /// longer apply, so every record counts as hydrated afterwards.
    pub fn reset(&self) {
        let _cycle = lock(&self.cycle);
        let reset = self.collect(|entry| {
            entry.record.reset();
            entry.hydrated = true;
            Some(entry.record.clone())
        });
        info!(users = reset.len(), "Activity counters reset");
    }

    /// Snapshot and reset in one pass: each record is copied and zeroed under
    /// its own lock, so a concurrent observation lands either in the returned
    /// snapshot or in the next cycle, never both and never neither.
    pub fn rollover(&self) -> Vec<ActivityRecord> {
        let _cycle = lock(&self.cycle);
        let snapshot = self.collect(|entry| {
            let copy = entry.record.clone();
            entry.record.reset();
            entry.hydrated = true;
            Some(copy)
        });
        info!(users = snapshot.len(), "Cycle rolled over");
        snapshot
    }

    /// Retry loading durable counters for unhydrated records. Returns the
    /// number that are still unhydrated.
    pub async fn hydrate_pending(&self) -> usize {
        let pending: Vec<(UserId, String, Arc<Slot>)> = self
            .slots()
            .into_iter()
            .filter_map(|(user_id, slot)| {
                let name = slot
                    .get()
                    .map(|entry| lock(entry))
                    .filter(|entry| !entry.hydrated)
                    .map(|entry| entry.record.display_name.clone())?;
                Some((user_id, name, slot))
            })
            .collect();

        let mut still_pending = 0;
        for (user_id, name, slot) in pending {
            let stored = match self.gateway.exists(user_id).await {
                Ok(true) => match self.rehydrate(user_id, &name).await {
                    Ok(record) => Some(record),
                    Err(e) if e.is_not_found() => None,
                    Err(e) => {
                        warn!(user_id = %user_id, op = e.op, error = %e, "Deferred rehydration failed again");
                        still_pending += 1;
                        continue;
                    }
                },
                Ok(false) => None,
                Err(e) => {
                    warn!(user_id = %user_id, op = e.op, error = %e, "Deferred rehydration failed again");
                    still_pending += 1;
                    continue;
                }
            };

            let Some(entry) = slot.get() else { continue };
            let mut entry = lock(entry);
            if entry.hydrated {
                continue;
            }
            match stored {
                Some(record) => {
                    entry.absorb(&record);
                    info!(user_id = %user_id, count = entry.record.message_count, "Deferred rehydration succeeded");
                }
                None => entry.hydrated = true,
            }
        }
        still_pending
    }

    /// Hold while writing cache state to the durable store, so a sync built
    /// from a pre-rollover snapshot cannot land after the durable reset.
    pub async fn flush_guard(&self) -> AsyncMutexGuard<'_, ()> {
        self.flush.lock().await
    }

    /// Copy of one user's record, if it has been initialized.
    pub fn get(&self, user_id: UserId) -> Option<ActivityRecord> {
        let slot = self.entries.get(&user_id).map(|entry| Arc::clone(entry.value()))?;
        slot.get().map(|entry| lock(entry).record.clone())
    }

    /// Number of initialized records.
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|entry| entry.value().initialized()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of initialized records still waiting for their durable counters.
    pub fn pending_len(&self) -> usize {
        self.slots()
            .into_iter()
            .filter(|(_, slot)| slot.get().is_some_and(|entry| !lock(entry).hydrated))
            .count()
    }

    fn slot(&self, user_id: UserId) -> Arc<Slot> {
        Arc::clone(self.entries.entry(user_id).or_default().value())
    }

    fn slots(&self) -> Vec<(UserId, Arc<Slot>)> {
        self.entries
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect()
    }

    fn collect(&self, mut f: impl FnMut(&mut Entry) -> Option<ActivityRecord>) -> Vec<ActivityRecord> {
        let mut records: Vec<ActivityRecord> = self
            .slots()
            .iter()
            .filter_map(|(_, slot)| slot.get())
            .filter_map(|entry| f(&mut lock(entry)))
            .collect();
        records.sort_by_key(|record| record.user_id);
        records
    }

    /// Initial state of a slot, before the triggering observation is counted.
    async fn load_or_register(
        &self,
        user_id: UserId,
        display_name: &str,
        now: DateTime<Utc>,
    ) -> Mutex<Entry> {
        let baseline = ActivityRecord::empty(user_id, display_name, now);

        let entry = match self.gateway.exists(user_id).await {
            Ok(true) => match self.rehydrate(user_id, display_name).await {
                Ok(record) => {
                    info!(user_id = %user_id, count = record.message_count, "Rehydrated user from durable store");
                    Entry::hydrated(record)
                }
                Err(e) if e.is_not_found() => Entry::hydrated(baseline),
                Err(e) => {
                    warn!(user_id = %user_id, op = e.op, error = %e, "Rehydration failed; deferring to the next sync");
                    Entry::pending(baseline)
                }
            },
            Ok(false) => {
                info!(user_id = %user_id, name = %display_name, "Registering new user");
                let registered = ActivityRecord::registered(user_id, display_name, now);
                if let Err(e) = self.gateway.insert(&registered).await {
                    warn!(user_id = %user_id, op = e.op, error = %e, "Durable registration failed; next sync retries");
                }
                Entry::hydrated(baseline)
            }
            Err(e) => {
                warn!(user_id = %user_id, op = e.op, error = %e, "Registration check failed; deferring to the next sync");
                Entry::pending(baseline)
            }
        };
        Mutex::new(entry)
    }

    async fn rehydrate(&self, user_id: UserId, display_name: &str) -> Result<ActivityRecord, PersistenceError> {
        let message_count = self.gateway.fetch_count(user_id).await?;
        let first_message_at = self.gateway.fetch_first_message(user_id).await?;
        let last_message_at = self.gateway.fetch_last_message(user_id).await?;
        Ok(ActivityRecord {
            user_id,
            display_name: display_name.to_string(),
            message_count,
            first_message_at,
            last_message_at: last_message_at.max(first_message_at),
        })
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
