use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use tracing::info;

use corpsewatch_core::{describe_remaining, WeeklyBoundary};

use crate::scheduler::Job;

/// Logs how long remains until the next weekly report.
pub struct CountdownJob {
    boundary: WeeklyBoundary,
}

impl CountdownJob {
    pub fn new(boundary: WeeklyBoundary) -> Self {
        Self { boundary }
    }

    pub fn remaining_at(&self, now: DateTime<Utc>) -> TimeDelta {
        self.boundary.next_on_or_after(now) - now
    }
}

#[async_trait]
impl Job for CountdownJob {
    fn name(&self) -> &str {
        "countdown"
    }

    async fn run(&self) -> Result<()> {
        let now = Utc::now();
        let remaining = self.remaining_at(now);
        info!(
            remaining = %describe_remaining(remaining),
            next = %self.boundary.next_on_or_after(now),
            "Time until the next weekly report"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn remaining_switches_from_days_to_hours() {
        let job = CountdownJob::new(WeeklyBoundary::parse("sunday", "16:00", "+00:00").unwrap());

        // Wednesday noon: 4 days 4 hours left.
        let wed = Utc.with_ymd_and_hms(2024, 1, 3, 12, 0, 0).unwrap();
        assert_eq!(describe_remaining(job.remaining_at(wed)), "4 days");

        // Sunday 09:00: 7 hours left.
        let sun = Utc.with_ymd_and_hms(2024, 1, 7, 9, 0, 0).unwrap();
        assert_eq!(describe_remaining(job.remaining_at(sun)), "7 hours");
    }

    #[tokio::test]
    async fn run_never_fails() {
        let job = CountdownJob::new(WeeklyBoundary::parse("friday", "08:30", "+02:00").unwrap());
        assert!(job.run().await.is_ok());
    }
}
