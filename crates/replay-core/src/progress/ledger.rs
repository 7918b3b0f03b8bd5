//! Weekly progress ledger: fetch-or-create rows and apply counter events.
//!
//! Every mutation goes through [`ProgressStore::update_week`], so the
//! counter change and the recomputed unlock/report fields are written in
//! one atomic step per `(user_id, week_start)`.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use tracing::{debug, warn};

use super::record::{ProgressThresholds, WeeklyProgressRecord};
use super::rules::{self, ProgressEvent};
use crate::error::StoreError;
use crate::storage::{DueReportQuery, ProgressStore, ReportsConfig};
use crate::week::week_start;

pub struct ProgressLedger<'a, S: ProgressStore + ?Sized> {
    store: &'a S,
    thresholds: ProgressThresholds,
    claim_timeout: Duration,
    max_retry_attempts: u32,
}

impl<'a, S: ProgressStore + ?Sized> ProgressLedger<'a, S> {
    pub fn new(store: &'a S, thresholds: ProgressThresholds) -> Self {
        let reports = ReportsConfig::default();
        Self {
            store,
            thresholds,
            claim_timeout: reports.claim_timeout(),
            max_retry_attempts: reports.max_retry_attempts,
        }
    }

    pub fn with_reports(mut self, reports: &ReportsConfig) -> Self {
        self.claim_timeout = reports.claim_timeout();
        self.max_retry_attempts = reports.max_retry_attempts;
        self
    }

    pub fn thresholds(&self) -> &ProgressThresholds {
        &self.thresholds
    }

    /// Fetch the row for `(user_id, week_start)`, creating it if missing.
    ///
    /// A concurrent creator winning the insert is not an error: the
    /// conflict is answered by re-reading the row it wrote. A row that
    /// predates timezone capture gets `timezone` backfilled.
    pub fn ensure_week(
        &self,
        user_id: &str,
        week_start: NaiveDate,
        timezone: Option<Tz>,
        now: DateTime<Utc>,
    ) -> Result<WeeklyProgressRecord, StoreError> {
        let tz_name = timezone.map(|tz| tz.name());

        if let Some(mut existing) = self.store.find_week(user_id, week_start)? {
            match tz_name {
                Some(name) if existing.week_timezone.is_none() => {
                    if self.store.backfill_week_timezone(user_id, week_start, name)? {
                        existing.week_timezone = Some(name.to_string());
                    }
                }
                _ => {}
            }
            return Ok(existing);
        }

        let fresh = WeeklyProgressRecord::new(user_id, week_start, tz_name, now);
        match self.store.insert_week(&fresh) {
            Ok(()) => {
                debug!(user_id, %week_start, "created weekly progress row");
                Ok(fresh)
            }
            Err(e) if e.is_conflict() => {
                warn!(user_id, %week_start, "weekly progress row created concurrently, re-fetching");
                self.store
                    .find_week(user_id, week_start)?
                    .ok_or_else(|| StoreError::QueryFailed(format!(
                        "weekly progress row {user_id}/{week_start} vanished after conflict"
                    )))
            }
            Err(e) => Err(e),
        }
    }

    /// A journal entry was created. The week is taken from `note_date`, so
    /// backdated entries count toward the week they belong to.
    pub fn increment_journal(
        &self,
        user_id: &str,
        note_date: DateTime<Utc>,
        event_at: DateTime<Utc>,
        tz: Tz,
    ) -> Result<WeeklyProgressRecord, StoreError> {
        self.apply(user_id, week_start(note_date, tz), ProgressEvent::JournalCreated, tz, event_at)
    }

    /// A journal entry was deleted. Counts floor at zero.
    pub fn decrement_journal(
        &self,
        user_id: &str,
        note_date: DateTime<Utc>,
        event_at: DateTime<Utc>,
        tz: Tz,
    ) -> Result<WeeklyProgressRecord, StoreError> {
        self.apply(user_id, week_start(note_date, tz), ProgressEvent::JournalDeleted, tz, event_at)
    }

    /// A meditation was completed at `reference_date`.
    pub fn increment_meditation(
        &self,
        user_id: &str,
        reference_date: DateTime<Utc>,
        event_at: DateTime<Utc>,
        tz: Tz,
    ) -> Result<WeeklyProgressRecord, StoreError> {
        self.apply(
            user_id,
            week_start(reference_date, tz),
            ProgressEvent::MeditationCompleted,
            tz,
            event_at,
        )
    }

    fn apply(
        &self,
        user_id: &str,
        week: NaiveDate,
        event: ProgressEvent,
        tz: Tz,
        at: DateTime<Utc>,
    ) -> Result<WeeklyProgressRecord, StoreError> {
        self.ensure_week(user_id, week, Some(tz), at)?;
        let thresholds = self.thresholds;
        let updated = self
            .store
            .update_week(user_id, week, &mut |record| {
                rules::apply_event(record, event, &thresholds, tz, at);
                true
            })?
            .ok_or_else(|| missing_row(user_id, week))?;
        debug!(
            user_id,
            week_start = %week,
            ?event,
            journals = updated.journal_count,
            meditations = updated.meditation_count,
            eligible = updated.eligible,
            "weekly progress updated"
        );
        Ok(updated)
    }

    /// Terminal transition for the week's report. Safe to repeat.
    pub fn mark_weekly_report_sent(
        &self,
        user_id: &str,
        week_start: NaiveDate,
        at: DateTime<Utc>,
    ) -> Result<WeeklyProgressRecord, StoreError> {
        self.store
            .update_week(user_id, week_start, &mut |record| {
                rules::mark_report_sent(record, at);
                true
            })?
            .ok_or_else(|| missing_row(user_id, week_start))
    }

    /// Rows a report worker may pick up: due, unclaimed (or claim expired)
    /// and under the retry limit.
    pub fn due_reports(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<WeeklyProgressRecord>, StoreError> {
        let rows = self.store.list_due_weeks(&DueReportQuery {
            now,
            stale_before: now - self.claim_timeout,
            max_retry_attempts: self.max_retry_attempts,
            limit,
        })?;
        Ok(rows
            .into_iter()
            .filter(|r| self.claimable(r, now))
            .collect())
    }

    /// Claim a due report for dispatch. Returns `None` when the row is not
    /// due, already sent, out of retries or held by a live claim.
    pub fn claim_weekly_report(
        &self,
        user_id: &str,
        week_start: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Option<WeeklyProgressRecord>, StoreError> {
        let mut claimed = false;
        let row = self.store.update_week(user_id, week_start, &mut |record| {
            if !self.claimable(record, now) {
                return false;
            }
            record.claimed_at = Some(now);
            record.updated_at = now;
            claimed = true;
            true
        })?;
        Ok(row.filter(|_| claimed))
    }

    /// Dispatch failed: drop the claim and count the attempt. A row with no
    /// outstanding claim is returned unchanged.
    pub fn release_weekly_report(
        &self,
        user_id: &str,
        week_start: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<WeeklyProgressRecord, StoreError> {
        self.store
            .update_week(user_id, week_start, &mut |record| {
                if record.report_sent() || record.claimed_at.is_none() {
                    return false;
                }
                record.claimed_at = None;
                record.retry_attempts = record.retry_attempts.saturating_add(1);
                record.updated_at = now;
                true
            })?
            .ok_or_else(|| missing_row(user_id, week_start))
    }

    fn claimable(&self, record: &WeeklyProgressRecord, now: DateTime<Utc>) -> bool {
        rules::should_queue_weekly_report(record, now)
            && record.retry_attempts < self.max_retry_attempts
            && !rules::claim_is_live(record, now, self.claim_timeout)
    }
}

fn missing_row(user_id: &str, week_start: NaiveDate) -> StoreError {
    StoreError::QueryFailed(format!(
        "weekly progress row {user_id}/{week_start} not found"
    ))
}
