//! Entry points for journal and meditation lifecycle events.
//!
//! Route handlers call these after creating or deleting a note and after a
//! meditation finishes. Each call resolves the user's timezone, applies the
//! event through the ledger and hands back a [`ProgressSummary`]; when a
//! tag synchronizer is attached, the current week's tags are pushed too.

use chrono::{DateTime, Days, NaiveDate, Utc};
use chrono_tz::Tz;
use tracing::warn;

use super::ledger::ProgressLedger;
use super::record::{ProgressThresholds, WeeklyProgressRecord};
use super::summary::{build_progress_summary, ProgressSummary};
use crate::error::{Result, TagSyncError, ValidationError};
use crate::storage::{Config, ProfileStore, ProgressStore, ReportsConfig};
use crate::tags::{AudienceClient, OneSignalClient, SyncOutcome, TagSynchronizer};
use crate::week::{parse_timezone, timezone_or, week_start, TimezoneResolver};

/// Result of a counter mutation.
#[derive(Debug)]
pub struct ProgressUpdate {
    pub summary: ProgressSummary,
    /// `None` when no synchronizer is attached. A failed push is reported
    /// here rather than failing the mutation, which is already committed.
    pub tag_sync: Option<Result<SyncOutcome, TagSyncError>>,
}

#[derive(Debug)]
pub struct RecomputeOutcome {
    pub summary: ProgressSummary,
    pub sync: Option<SyncOutcome>,
}

pub struct ProgressService<S, A = OneSignalClient>
where
    S: ProgressStore + ProfileStore,
    A: AudienceClient,
{
    store: S,
    thresholds: ProgressThresholds,
    reports: ReportsConfig,
    timezones: TimezoneResolver,
    tags: Option<TagSynchronizer<A>>,
}

impl<S> ProgressService<S>
where
    S: ProgressStore + ProfileStore,
{
    pub fn new(store: S, thresholds: ProgressThresholds) -> Self {
        Self {
            store,
            thresholds,
            reports: ReportsConfig::default(),
            timezones: TimezoneResolver::default(),
            tags: None,
        }
    }

    /// Thresholds, report limits and default timezone from `config`.
    /// Tag sync is left detached; see [`ProgressService::with_tag_sync`].
    pub fn from_config(store: S, config: &Config) -> Self {
        Self::new(store, config.thresholds)
            .with_reports(config.reports.clone())
            .with_timezone_resolver(config.timezone_resolver())
    }
}

impl<S, A> ProgressService<S, A>
where
    S: ProgressStore + ProfileStore,
    A: AudienceClient,
{
    pub fn with_timezone_resolver(mut self, timezones: TimezoneResolver) -> Self {
        self.timezones = timezones;
        self
    }

    pub fn with_reports(mut self, reports: ReportsConfig) -> Self {
        self.reports = reports;
        self
    }

    pub fn with_tag_sync<B: AudienceClient>(self, sync: TagSynchronizer<B>) -> ProgressService<S, B> {
        ProgressService {
            store: self.store,
            thresholds: self.thresholds,
            reports: self.reports,
            timezones: self.timezones,
            tags: Some(sync),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn ledger(&self) -> ProgressLedger<'_, S> {
        ProgressLedger::new(&self.store, self.thresholds).with_reports(&self.reports)
    }

    /// The user's timezone, or the configured default. Never fails.
    pub fn timezone_for(&self, user_id: &str) -> Tz {
        self.timezones.resolve(&self.store, user_id)
    }

    pub fn journal_created(
        &self,
        user_id: &str,
        note_date: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<ProgressUpdate> {
        check_user(user_id)?;
        let tz = self.timezone_for(user_id);
        let record = self.ledger().increment_journal(user_id, note_date, now, tz)?;
        Ok(self.after_mutation(user_id, &record, tz, now))
    }

    pub fn journal_deleted(
        &self,
        user_id: &str,
        note_date: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<ProgressUpdate> {
        check_user(user_id)?;
        let tz = self.timezone_for(user_id);
        let record = self.ledger().decrement_journal(user_id, note_date, now, tz)?;
        Ok(self.after_mutation(user_id, &record, tz, now))
    }

    pub fn meditation_completed(
        &self,
        user_id: &str,
        completed_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<ProgressUpdate> {
        check_user(user_id)?;
        let tz = self.timezone_for(user_id);
        let record = self.ledger().increment_meditation(user_id, completed_at, now, tz)?;
        Ok(self.after_mutation(user_id, &record, tz, now))
    }

    /// Dashboard read: resolves or creates the current week's row without
    /// touching its counts.
    pub fn current_week(&self, user_id: &str, now: DateTime<Utc>) -> Result<ProgressSummary> {
        check_user(user_id)?;
        let tz = self.timezone_for(user_id);
        let record = self
            .ledger()
            .ensure_week(user_id, week_start(now, tz), Some(tz), now)?;
        Ok(build_progress_summary(Some(&record), &self.thresholds, tz, now))
    }

    /// Stored weeks within the last `weeks` weeks (current included),
    /// newest first. Weeks with no activity have no row and are omitted.
    pub fn history(
        &self,
        user_id: &str,
        weeks: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<ProgressSummary>> {
        check_user(user_id)?;
        let tz = self.timezone_for(user_id);
        let to = week_start(now, tz);
        // Past the calendar's start there is no lower bound.
        let from = to.checked_sub_days(Days::new(7 * (u64::from(weeks.max(1)) - 1)));
        let rows = self.store.list_weeks(user_id, from, Some(to))?;
        Ok(rows
            .iter()
            .map(|row| {
                let row_tz = timezone_or(row.week_timezone.as_deref(), tz);
                build_progress_summary(Some(row), &self.thresholds, row_tz, now)
            })
            .collect())
    }

    /// Rebuild the current week's summary and push its tags. Sync errors
    /// propagate.
    pub fn recompute_weekly_progress(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<RecomputeOutcome> {
        let summary = self.current_week(user_id, now)?;
        let sync = match &self.tags {
            Some(tags) => Some(tags.sync(&self.store, user_id, &summary, now)?),
            None => None,
        };
        Ok(RecomputeOutcome { summary, sync })
    }

    /// Validate and store the user's IANA timezone.
    pub fn set_timezone(&self, user_id: &str, timezone: &str, now: DateTime<Utc>) -> Result<Tz> {
        check_user(user_id)?;
        let tz = parse_timezone(timezone)?;
        self.store.set_profile_timezone(user_id, tz.name(), now)?;
        Ok(tz)
    }

    pub fn mark_weekly_report_sent(
        &self,
        user_id: &str,
        week_start: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<ProgressSummary> {
        check_user(user_id)?;
        let record = self.ledger().mark_weekly_report_sent(user_id, week_start, now)?;
        Ok(self.summarize(&record, now))
    }

    pub fn due_reports(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<WeeklyProgressRecord>> {
        Ok(self.ledger().due_reports(now, limit)?)
    }

    pub fn claim_weekly_report(
        &self,
        user_id: &str,
        week_start: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Option<WeeklyProgressRecord>> {
        check_user(user_id)?;
        Ok(self.ledger().claim_weekly_report(user_id, week_start, now)?)
    }

    pub fn release_weekly_report(
        &self,
        user_id: &str,
        week_start: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<WeeklyProgressRecord> {
        check_user(user_id)?;
        Ok(self.ledger().release_weekly_report(user_id, week_start, now)?)
    }

    /// Summary for a stored row, in the timezone the row was recorded in.
    pub fn summarize(&self, record: &WeeklyProgressRecord, now: DateTime<Utc>) -> ProgressSummary {
        let tz = timezone_or(
            record.week_timezone.as_deref(),
            self.timezones.default_timezone(),
        );
        build_progress_summary(Some(record), &self.thresholds, tz, now)
    }

    fn after_mutation(
        &self,
        user_id: &str,
        record: &WeeklyProgressRecord,
        tz: Tz,
        now: DateTime<Utc>,
    ) -> ProgressUpdate {
        let summary = build_progress_summary(Some(record), &self.thresholds, tz, now);
        let tag_sync = self.tags.as_ref().map(|tags| {
            // Tags always describe the current week, even when the event
            // landed in an earlier one.
            let current = week_start(now, tz);
            let result = if record.week_start == current {
                tags.sync(&self.store, user_id, &summary, now)
            } else {
                self.store
                    .find_week(user_id, current)
                    .map_err(TagSyncError::from)
                    .and_then(|row| {
                        let current_summary =
                            build_progress_summary(row.as_ref(), &self.thresholds, tz, now);
                        tags.sync(&self.store, user_id, &current_summary, now)
                    })
            };
            if let Err(e) = &result {
                warn!(user_id, error = %e, "audience tag sync failed");
            }
            result
        });
        ProgressUpdate { summary, tag_sync }
    }
}

fn check_user(user_id: &str) -> Result<(), ValidationError> {
    if user_id.trim().is_empty() {
        return Err(ValidationError::EmptyUserId);
    }
    Ok(())
}
