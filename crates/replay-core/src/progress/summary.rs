//! Read model returned to callers after every progress read or write.

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use super::record::{ProgressThresholds, WeeklyProgressRecord};
use crate::week::{next_week_start, week_start};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSummary {
    pub week_start: NaiveDate,
    pub next_week_start: NaiveDate,
    pub timezone: String,
    pub journal_count: u32,
    pub meditation_count: u32,
    pub meditations_unlocked: bool,
    pub report_ready: bool,
    pub report_sent: bool,
    pub eligible: bool,
    pub next_report_at_utc: Option<DateTime<Utc>>,
    pub journals_to_unlock: u32,
    /// Journals still needed on the journal-only report path.
    pub journals_to_report: u32,
    /// Journals still needed on the combined report path.
    pub combo_journals_remaining: u32,
    /// Meditations still needed on the combined report path.
    pub combo_meditations_remaining: u32,
}

/// Project a stored row (or its absence) into a [`ProgressSummary`].
///
/// `None` yields the zero summary for the week containing `now`. Never fails.
pub fn build_progress_summary(
    record: Option<&WeeklyProgressRecord>,
    thresholds: &ProgressThresholds,
    tz: Tz,
    now: DateTime<Utc>,
) -> ProgressSummary {
    let week = record.map_or_else(|| week_start(now, tz), |r| r.week_start);
    let journals = record.map_or(0, |r| r.journal_count);
    let meditations = record.map_or(0, |r| r.meditation_count);

    ProgressSummary {
        week_start: week,
        next_week_start: next_week_start(week),
        timezone: record
            .and_then(|r| r.week_timezone.clone())
            .unwrap_or_else(|| tz.name().to_string()),
        journal_count: journals,
        meditation_count: meditations,
        meditations_unlocked: record.is_some_and(|r| r.meditations_unlocked_at.is_some())
            || thresholds.meditations_unlocked(journals),
        report_ready: record.is_some_and(|r| r.weekly_report_ready_at.is_some()),
        report_sent: record.is_some_and(WeeklyProgressRecord::report_sent),
        eligible: record.is_some_and(|r| r.eligible),
        next_report_at_utc: record.and_then(|r| r.next_report_at_utc),
        journals_to_unlock: thresholds.unlock_journals.saturating_sub(journals),
        journals_to_report: thresholds.report_journals_only.saturating_sub(journals),
        combo_journals_remaining: thresholds.report_combo_journals.saturating_sub(journals),
        combo_meditations_remaining: thresholds
            .report_combo_meditations
            .saturating_sub(meditations),
    }
}
