use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use corpsewatch_core::WeeklyBoundary;

/// A unit of periodic work driven by the [`Scheduler`].
#[async_trait]
pub trait Job: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self) -> Result<()>;
}

/// When a job fires.
#[derive(Debug, Clone, Copy)]
pub enum Cadence {
    /// Fixed period. With `immediate` the first firing happens at spawn
    /// time, otherwise one period later.
    Every { period: Duration, immediate: bool },
    /// Weekly boundary: first the next occurrence on or after spawn time,
    /// then exactly seven days after each firing.
    Weekly(WeeklyBoundary),
}

impl Cadence {
    pub fn every(period: Duration) -> Self {
        Self::Every { period, immediate: false }
    }

    pub fn every_immediately(period: Duration) -> Self {
        Self::Every { period, immediate: true }
    }

    fn first(&self, now: DateTime<Utc>) -> NextFire {
        match self {
            Self::Every { period, immediate } => {
                let start = Instant::now();
                NextFire::At(if *immediate { start } else { start + *period })
            }
            Self::Weekly(boundary) => NextFire::Boundary(boundary.next_on_or_after(now)),
        }
    }

    fn after(&self, fired: NextFire, now: DateTime<Utc>) -> NextFire {
        match (self, fired) {
            (Self::Every { period, .. }, NextFire::At(at)) => {
                // Fixed rate; firings missed while a slow run was in flight are dropped.
                let current = Instant::now();
                let mut next = at + *period;
                while next <= current {
                    next += *period;
                }
                NextFire::At(next)
            }
            (Self::Weekly(boundary), NextFire::Boundary(at)) => {
                NextFire::Boundary(boundary.following(at, now))
            }
            _ => self.first(now),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum NextFire {
    At(Instant),
    Boundary(DateTime<Utc>),
}

impl NextFire {
    fn deadline(&self) -> Instant {
        match self {
            Self::At(at) => *at,
            Self::Boundary(at) => {
                let wait = (*at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
                Instant::now() + wait
            }
        }
    }
}

enum Command {
    RunNow(oneshot::Sender<Result<()>>),
    Stop,
}

/// Cancellable handle to one spawned job loop.
pub struct JobHandle {
    name: String,
    tx: mpsc::Sender<Command>,
    task: JoinHandle<()>,
}

impl JobHandle {
    /// Start driving `job` on `cadence`.
    pub fn spawn(job: Arc<dyn Job>, cadence: Cadence) -> Self {
        let (tx, rx) = mpsc::channel(8);
        let name = job.name().to_string();
        let task = tokio::spawn(drive(job, cadence, rx));
        Self { name, tx, task }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fire the job out of band and wait for that firing to finish.
    ///
    /// Waits behind a firing already in progress; firings never overlap.
    pub async fn run_now(&self) -> Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.tx
            .send(Command::RunNow(done_tx))
            .await
            .map_err(|_| anyhow!("job '{}' is no longer running", self.name))?;
        done_rx
            .await
            .with_context(|| format!("job '{}' dropped a manual firing", self.name))?
    }

    /// Suppress further firings and wait for the loop to exit. A firing in
    /// progress is allowed to finish.
    pub async fn stop(self) -> Result<()> {
        let _ = self.tx.send(Command::Stop).await;
        self.task
            .await
            .with_context(|| format!("job '{}' loop panicked", self.name))
    }
}

/// Owns the handles of every scheduled job in the process.
#[derive(Default)]
pub struct Scheduler {
    handles: Vec<JobHandle>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn(&mut self, job: Arc<dyn Job>, cadence: Cadence) -> &JobHandle {
        info!(job = job.name(), cadence = ?cadence, "Scheduling job");
        self.handles.push(JobHandle::spawn(job, cadence));
        let last = self.handles.len() - 1;
        &self.handles[last]
    }

    pub fn handle(&self, name: &str) -> Option<&JobHandle> {
        self.handles.iter().find(|h| h.name == name)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Stop every job, in spawn order.
    pub async fn shutdown(self) {
        for handle in self.handles {
            let name = handle.name.clone();
            if let Err(e) = handle.stop().await {
                warn!(job = %name, error = %e, "Job did not stop cleanly");
            }
        }
        info!("Scheduler stopped");
    }
}

async fn drive(job: Arc<dyn Job>, cadence: Cadence, mut rx: mpsc::Receiver<Command>) {
    let mut next = cadence.first(Utc::now());
    if let NextFire::Boundary(at) = next {
        info!(job = job.name(), next = %at, "Next weekly firing");
    }

    loop {
        tokio::select! {
            _ = time::sleep_until(next.deadline()) => {
                let _ = fire(&job, "scheduled").await;
                next = cadence.after(next, Utc::now());
                if let NextFire::Boundary(at) = next {
                    info!(job = job.name(), next = %at, "Next weekly firing");
                }
            }
            cmd = rx.recv() => {
                match cmd {
                    Some(Command::RunNow(done)) => {
                        let result = fire(&job, "manual").await;
                        let _ = done.send(result);
                    }
                    Some(Command::Stop) | None => {
                        debug!(job = job.name(), "Job loop exiting");
                        break;
                    }
                }
            }
        }
    }
}

/// Run one firing in its own task so a panicking job is reported like any
/// other failure and the loop keeps going.
async fn fire(job: &Arc<dyn Job>, trigger: &'static str) -> Result<()> {
    let run_id = Uuid::new_v4();
    let started = Instant::now();
    info!(job = job.name(), run_id = %run_id, trigger, "Job fired");

    let task_job = Arc::clone(job);
    let result = match tokio::spawn(async move { task_job.run().await }).await {
        Ok(result) => result,
        Err(e) => Err(anyhow!("job task aborted: {e}")),
    };

    let elapsed_ms = started.elapsed().as_millis() as u64;
    match &result {
        Ok(()) => info!(job = job.name(), run_id = %run_id, elapsed_ms, "Job completed"),
        Err(e) => error!(job = job.name(), run_id = %run_id, elapsed_ms, error = %format!("{e:#}"), "Job failed"),
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting {
        runs: AtomicUsize,
        active: AtomicUsize,
        max_active: AtomicUsize,
        work: Option<Duration>,
        fail: bool,
    }

    #[async_trait]
    impl Job for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        async fn run(&self) -> Result<()> {
            let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(active, Ordering::SeqCst);
            if let Some(work) = self.work {
                time::sleep(work).await;
            }
            self.runs.fetch_add(1, Ordering::SeqCst);
            self.active.fetch_sub(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("boom");
            }
            Ok(())
        }
    }

    fn runs(job: &Counting) -> usize {
        job.runs.load(Ordering::SeqCst)
    }

    #[tokio::test(start_paused = true)]
    async fn fires_once_per_period() {
        let job = Arc::new(Counting::default());
        let handle = JobHandle::spawn(job.clone(), Cadence::every(Duration::from_secs(60)));

        time::sleep(Duration::from_secs(59)).await;
        assert_eq!(runs(&job), 0);
        time::sleep(Duration::from_secs(122)).await;
        assert_eq!(runs(&job), 3);

        handle.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn immediate_cadence_fires_at_spawn() {
        let job = Arc::new(Counting::default());
        let handle = JobHandle::spawn(job.clone(), Cadence::every_immediately(Duration::from_secs(300)));

        time::sleep(Duration::from_millis(1)).await;
        assert_eq!(runs(&job), 1);
        time::sleep(Duration::from_secs(300)).await;
        assert_eq!(runs(&job), 2);

        handle.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn stop_suppresses_further_firings() {
        let job = Arc::new(Counting::default());
        let handle = JobHandle::spawn(job.clone(), Cadence::every(Duration::from_secs(10)));

        time::sleep(Duration::from_secs(25)).await;
        handle.stop().await.unwrap();
        let before = runs(&job);
        time::sleep(Duration::from_secs(100)).await;

        assert_eq!(before, 2);
        assert_eq!(runs(&job), before);
    }

    #[tokio::test(start_paused = true)]
    async fn run_now_fires_out_of_band() {
        let job = Arc::new(Counting::default());
        let handle = JobHandle::spawn(job.clone(), Cadence::every(Duration::from_secs(3600)));

        handle.run_now().await.unwrap();
        handle.run_now().await.unwrap();
        assert_eq!(runs(&job), 2);

        handle.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn failures_do_not_stop_the_loop() {
        let job = Arc::new(Counting { fail: true, ..Default::default() });
        let handle = JobHandle::spawn(job.clone(), Cadence::every(Duration::from_secs(5)));

        time::sleep(Duration::from_secs(21)).await;
        assert_eq!(runs(&job), 4);
        assert!(handle.run_now().await.is_err());
        assert_eq!(runs(&job), 5);

        handle.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn firings_never_overlap() {
        let job = Arc::new(Counting {
            work: Some(Duration::from_secs(90)),
            ..Default::default()
        });
        let handle = JobHandle::spawn(job.clone(), Cadence::every_immediately(Duration::from_secs(60)));

        time::sleep(Duration::from_secs(600)).await;
        assert_eq!(job.max_active.load(Ordering::SeqCst), 1);
        assert!(runs(&job) >= 3);

        handle.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn run_now_after_stop_is_an_error() {
        let job = Arc::new(Counting::default());
        let mut scheduler = Scheduler::new();
        scheduler.spawn(job.clone(), Cadence::every(Duration::from_secs(60)));
        assert!(scheduler.handle("counting").is_some());
        assert!(scheduler.handle("missing").is_none());

        let handle = JobHandle::spawn(job, Cadence::every(Duration::from_secs(60)));
        let tx = handle.tx.clone();
        let name = handle.name.clone();
        handle.stop().await.unwrap();
        let orphan = JobHandle {
            name,
            tx,
            task: tokio::spawn(async {}),
        };
        assert!(orphan.run_now().await.is_err());

        scheduler.shutdown().await;
    }

    #[test]
    fn weekly_cadence_targets_the_boundary() {
        use chrono::TimeZone;
        let boundary = WeeklyBoundary::parse("sunday", "16:00", "+00:00").unwrap();
        let cadence = Cadence::Weekly(boundary);
        // Wednesday 2024-01-03 12:00 UTC.
        let now = Utc.with_ymd_and_hms(2024, 1, 3, 12, 0, 0).unwrap();
        let first = match cadence.first(now) {
            NextFire::Boundary(at) => at,
            NextFire::At(_) => unreachable!(),
        };
        assert_eq!(first, Utc.with_ymd_and_hms(2024, 1, 7, 16, 0, 0).unwrap());

        let second = match cadence.after(NextFire::Boundary(first), first) {
            NextFire::Boundary(at) => at,
            NextFire::At(_) => unreachable!(),
        };
        assert_eq!(second, Utc.with_ymd_and_hms(2024, 1, 14, 16, 0, 0).unwrap());
    }
}
