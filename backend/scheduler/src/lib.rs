pub mod countdown;
pub mod cycle_job;
pub mod scheduler;
pub mod sync_job;

pub use countdown::CountdownJob;
pub use cycle_job::{CycleJob, CycleOutcome};
pub use scheduler::{Cadence, Job, JobHandle, Scheduler};
pub use sync_job::{SyncJob, SyncSummary};
