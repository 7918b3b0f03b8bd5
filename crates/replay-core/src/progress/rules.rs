//! Pure state transitions applied to a [`WeeklyProgressRecord`].
//!
//! The ledger runs these inside the store's atomic update so the counter
//! change and the derived flags land in the same write.

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;

use super::record::{ProgressThresholds, WeeklyProgressRecord};
use crate::week::next_report_at_utc;

/// Which counter an event adjusts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressEvent {
    JournalCreated,
    JournalDeleted,
    MeditationCompleted,
}

/// Apply one event and recompute everything derived from the counts.
pub fn apply_event(
    record: &mut WeeklyProgressRecord,
    event: ProgressEvent,
    thresholds: &ProgressThresholds,
    tz: Tz,
    at: DateTime<Utc>,
) {
    match event {
        ProgressEvent::JournalCreated => {
            record.journal_count = record.journal_count.saturating_add(1);
            record.last_journal_at = Some(at);
        }
        ProgressEvent::JournalDeleted => {
            record.journal_count = record.journal_count.saturating_sub(1);
        }
        ProgressEvent::MeditationCompleted => {
            record.meditation_count = record.meditation_count.saturating_add(1);
            record.last_meditation_at = Some(at);
        }
    }
    update_unlock(record, thresholds, at);
    determine_report_scheduling(record, thresholds, tz, at);
    record.updated_at = at;
}

/// Stamp the unlock the first time the threshold is reached; clear it when
/// deletions take the count back below.
pub fn update_unlock(
    record: &mut WeeklyProgressRecord,
    thresholds: &ProgressThresholds,
    at: DateTime<Utc>,
) {
    if thresholds.meditations_unlocked(record.journal_count) {
        if record.meditations_unlocked_at.is_none() {
            record.meditations_unlocked_at = Some(at);
        }
    } else {
        record.meditations_unlocked_at = None;
    }
}

/// Recompute `eligible`, `next_report_at_utc` and the ready stamp.
///
/// A sent report is terminal: the row never becomes eligible again. The
/// ready stamp survives recomputes and is cleared only when the counts no
/// longer meet either threshold path. Any outstanding dispatch claim is
/// dropped.
pub fn determine_report_scheduling(
    record: &mut WeeklyProgressRecord,
    thresholds: &ProgressThresholds,
    tz: Tz,
    now: DateTime<Utc>,
) {
    let met = thresholds.report_thresholds_met(record.journal_count, record.meditation_count);
    let sent = record.report_sent();

    record.eligible = met && !sent;
    record.next_report_at_utc = if record.eligible {
        Some(next_report_at_utc(record.week_start, tz))
    } else {
        None
    };

    if met {
        if record.weekly_report_ready_at.is_none() {
            record.weekly_report_ready_at = Some(now);
        }
    } else {
        record.weekly_report_ready_at = None;
    }

    record.claimed_at = None;
    record.retry_attempts = 0;
}

/// Terminal transition. Keeps the first sent stamp on repeat calls.
pub fn mark_report_sent(record: &mut WeeklyProgressRecord, at: DateTime<Utc>) {
    if record.weekly_report_sent_at.is_none() {
        record.weekly_report_sent_at = Some(at);
    }
    record.eligible = false;
    record.next_report_at_utc = None;
    record.claimed_at = None;
    record.retry_attempts = 0;
    record.updated_at = at;
}

/// Whether an external scheduler should dispatch this week's report now.
pub fn should_queue_weekly_report(record: &WeeklyProgressRecord, now: DateTime<Utc>) -> bool {
    record.eligible
        && !record.report_sent()
        && record.next_report_at_utc.is_some_and(|next| now >= next)
}

/// A claim older than `timeout` is treated as abandoned.
pub fn claim_is_live(
    record: &WeeklyProgressRecord,
    now: DateTime<Utc>,
    timeout: Duration,
) -> bool {
    record.claimed_at.is_some_and(|claimed| now - claimed < timeout)
}
