//! `corpsewatch standings`: print durable standings.

use std::fmt::Write;
use std::path::Path;

use anyhow::Result;

use corpsewatch_config::load_and_prepare;
use corpsewatch_core::{ActivityRecord, PersistenceGateway, ReportError, ReportGenerator};
use corpsewatch_memory::SqliteGateway;

pub async fn run(config_path: &Path) -> Result<()> {
    let settings = load_and_prepare(config_path).await?.settings;
    let gateway = SqliteGateway::open(&settings.db_path)?;
    let records = gateway.fetch_all().await?;
    let generator = ReportGenerator::new(settings.nicknames, settings.templates);
    print!("{}", render(&records, &generator)?);
    Ok(())
}

/// Standings as last synced, in user-id order, plus the would-be corpse.
pub fn render(records: &[ActivityRecord], generator: &ReportGenerator) -> Result<String> {
    let mut out = String::new();
    match generator.generate(records) {
        Ok(report) => {
            writeln!(out, "Standings ({} participants):", records.len())?;
            for line in report.ranking.lines() {
                writeln!(out, "  {line}")?;
            }
            writeln!(out, "Corpse if the week ended now: {}", report.announcement)?;
        }
        Err(ReportError::EmptySnapshot) => writeln!(out, "No participants recorded yet.")?,
        Err(e) => return Err(e.into()),
    }
    Ok(out)
}
