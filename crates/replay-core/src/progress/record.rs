//! Persisted weekly progress row and the thresholds that drive it.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One row per user per local calendar week, keyed by `(user_id, week_start)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyProgressRecord {
    pub user_id: String,
    /// Monday of the user's local week. Fixed for the row's lifetime.
    pub week_start: NaiveDate,
    /// Timezone captured on first write, backfilled lazily for older rows.
    pub week_timezone: Option<String>,
    pub journal_count: u32,
    pub meditation_count: u32,
    pub meditations_unlocked_at: Option<DateTime<Utc>>,
    pub last_journal_at: Option<DateTime<Utc>>,
    pub last_meditation_at: Option<DateTime<Utc>>,
    pub eligible: bool,
    pub next_report_at_utc: Option<DateTime<Utc>>,
    pub weekly_report_ready_at: Option<DateTime<Utc>>,
    /// Terminal for the week once set.
    pub weekly_report_sent_at: Option<DateTime<Utc>>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub retry_attempts: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WeeklyProgressRecord {
    /// Fresh zero-count row.
    pub fn new(
        user_id: impl Into<String>,
        week_start: NaiveDate,
        timezone: Option<&str>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            week_start,
            week_timezone: timezone.map(str::to_string),
            journal_count: 0,
            meditation_count: 0,
            meditations_unlocked_at: None,
            last_journal_at: None,
            last_meditation_at: None,
            eligible: false,
            next_report_at_utc: None,
            weekly_report_ready_at: None,
            weekly_report_sent_at: None,
            claimed_at: None,
            retry_attempts: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn report_sent(&self) -> bool {
        self.weekly_report_sent_at.is_some()
    }
}

/// Count thresholds for meditation unlock and weekly report eligibility.
///
/// A report is earned through either path:
/// `journals >= report_journals_only`, or
/// `journals >= report_combo_journals && meditations >= report_combo_meditations`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressThresholds {
    #[serde(default = "default_unlock_journals")]
    pub unlock_journals: u32,
    #[serde(default = "default_report_journals_only")]
    pub report_journals_only: u32,
    #[serde(default = "default_report_combo_journals")]
    pub report_combo_journals: u32,
    #[serde(default = "default_report_combo_meditations")]
    pub report_combo_meditations: u32,
}

fn default_unlock_journals() -> u32 {
    3
}
fn default_report_journals_only() -> u32 {
    5
}
fn default_report_combo_journals() -> u32 {
    3
}
fn default_report_combo_meditations() -> u32 {
    2
}

impl Default for ProgressThresholds {
    fn default() -> Self {
        Self {
            unlock_journals: default_unlock_journals(),
            report_journals_only: default_report_journals_only(),
            report_combo_journals: default_report_combo_journals(),
            report_combo_meditations: default_report_combo_meditations(),
        }
    }
}

impl ProgressThresholds {
    pub fn meditations_unlocked(&self, journal_count: u32) -> bool {
        journal_count >= self.unlock_journals
    }

    pub fn report_thresholds_met(&self, journal_count: u32, meditation_count: u32) -> bool {
        journal_count >= self.report_journals_only
            || (journal_count >= self.report_combo_journals
                && meditation_count >= self.report_combo_meditations)
    }
}
