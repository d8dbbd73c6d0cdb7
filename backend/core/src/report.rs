//! Weekly ranking and "corpse of the week" selection.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::ReportError;
use crate::types::{ActivityRecord, UserId};

/// Placeholder replaced with the participant's nickname.
pub const NAME_PLACEHOLDER: &str = "{name}";
/// Placeholder replaced with the participant's message count.
pub const COUNT_PLACEHOLDER: &str = "{count}";

/// Text templates for everything the bot says.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReportTemplates {
    /// Sent right before the ranking.
    pub preamble: String,
    /// One line per participant; uses `{name}` and `{count}`.
    pub ranking_line: String,
    /// Final announcement; uses `{name}`.
    pub loser: String,
    /// Reply to events from chats outside the allow-list.
    pub restricted: String,
    /// Sent instead of the report when nobody was tracked this cycle.
    pub empty_cycle: Option<String>,
}

impl Default for ReportTemplates {
    fn default() -> Self {
        Self {
            preamble: "The week is over. Choosing the corpse...".to_string(),
            ranking_line: "{name} sent {count} messages this week.".to_string(),
            loser: "{name} wrote the least. {name} is the corpse of the week. Congratulations."
                .to_string(),
            restricted: "Sorry, this bot only works in certain chats at the moment. \
                         Please try again later."
                .to_string(),
            empty_cycle: None,
        }
    }
}

/// Username to nickname lookup used when rendering names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Nicknames(HashMap<String, String>);

impl Nicknames {
    pub fn new(table: HashMap<String, String>) -> Self {
        Self(table)
    }

    /// Nickname for the record, falling back to its display name.
    pub fn resolve<'a>(&'a self, record: &'a ActivityRecord) -> &'a str {
        self.0
            .get(&record.display_name)
            .map(String::as_str)
            .unwrap_or(record.display_name.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Output of one weekly report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    /// One line per participant, in snapshot order.
    pub ranking: String,
    pub announcement: String,
    pub loser: UserId,
    pub loser_count: u64,
}

/// Pure computation over a cache snapshot.
#[derive(Debug, Clone, Default)]
pub struct ReportGenerator {
    nicknames: Nicknames,
    templates: ReportTemplates,
}

impl ReportGenerator {
    pub fn new(nicknames: Nicknames, templates: ReportTemplates) -> Self {
        Self { nicknames, templates }
    }

    pub fn templates(&self) -> &ReportTemplates {
        &self.templates
    }

    /// Rank every record in the given order and pick the loser.
    ///
    /// The loser is the first record holding the strictly lowest count, so
    /// ties go to whoever comes first in the snapshot (ascending user id for
    /// cache snapshots).
    pub fn generate(&self, snapshot: &[ActivityRecord]) -> Result<Report, ReportError> {
        if snapshot.is_empty() {
            return Err(ReportError::EmptySnapshot);
        }

        let mut seen = HashSet::with_capacity(snapshot.len());
        let mut ranking = String::new();
        let mut loser: Option<&ActivityRecord> = None;

        for record in snapshot {
            if !seen.insert(record.user_id) {
                return Err(ReportError::DataIntegrity(format!(
                    "user {} appears twice in the snapshot",
                    record.user_id
                )));
            }
            if loser.map_or(true, |current| record.message_count < current.message_count) {
                loser = Some(record);
            }
            ranking.push_str(&self.render(&self.templates.ranking_line, record));
            ranking.push('\n');
        }

        let loser = loser.ok_or_else(|| {
            ReportError::DataIntegrity("no loser selected from a non-empty snapshot".to_string())
        })?;

        Ok(Report {
            ranking,
            announcement: self.render(&self.templates.loser, loser),
            loser: loser.user_id,
            loser_count: loser.message_count,
        })
    }

    fn render(&self, template: &str, record: &ActivityRecord) -> String {
        template
            .replace(NAME_PLACEHOLDER, self.nicknames.resolve(record))
            .replace(COUNT_PLACEHOLDER, &record.message_count.to_string())
    }
}
