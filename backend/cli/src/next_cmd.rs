//! `corpsewatch next-report`: print the next weekly boundary.

use std::path::Path;

use anyhow::Result;
use chrono::{DateTime, Utc};

use corpsewatch_config::load_and_prepare;
use corpsewatch_core::{describe_remaining, WeeklyBoundary};

pub async fn run(config_path: &Path) -> Result<()> {
    let settings = load_and_prepare(config_path).await?.settings;
    println!("{}", render(&settings.boundary, Utc::now()));
    Ok(())
}

pub fn render(boundary: &WeeklyBoundary, now: DateTime<Utc>) -> String {
    let next = boundary.next_on_or_after(now);
    format!(
        "Next report: {} (every {boundary}), in {}",
        next.to_rfc3339(),
        describe_remaining(next - now)
    )
}
