use chrono::{DateTime, NaiveDate, Utc};

use crate::error::StoreError;
use crate::progress::WeeklyProgressRecord;
use crate::tags::TagSyncState;

/// Row store for per-user-per-week progress.
///
/// Implementations must make [`ProgressStore::update_week`] atomic with
/// respect to other writers of the same row, and must report a duplicate
/// `(user_id, week_start)` insert as [`StoreError::Conflict`].
pub trait ProgressStore: Send + Sync {
    fn find_week(
        &self,
        user_id: &str,
        week_start: NaiveDate,
    ) -> Result<Option<WeeklyProgressRecord>, StoreError>;

    /// Insert a new row. A row that already exists is a `Conflict`.
    fn insert_week(&self, record: &WeeklyProgressRecord) -> Result<(), StoreError>;

    /// Fill `week_timezone` if it is still null. Returns whether it wrote.
    fn backfill_week_timezone(
        &self,
        user_id: &str,
        week_start: NaiveDate,
        timezone: &str,
    ) -> Result<bool, StoreError>;

    /// Read-modify-write the row as one atomic step.
    ///
    /// `apply` returns whether it changed anything; unchanged rows are not
    /// written back. Returns the row as it stands afterwards, or `None` if
    /// it does not exist.
    fn update_week(
        &self,
        user_id: &str,
        week_start: NaiveDate,
        apply: &mut dyn FnMut(&mut WeeklyProgressRecord) -> bool,
    ) -> Result<Option<WeeklyProgressRecord>, StoreError>;

    /// Rows for `user_id` with `from <= week_start <= to`, newest first.
    fn list_weeks(
        &self,
        user_id: &str,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<WeeklyProgressRecord>, StoreError>;

    /// Eligible, unsent rows whose `next_report_at_utc <= now`, oldest
    /// first, filtered by the query's claim and retry bounds before the
    /// limit is applied.
    fn list_due_weeks(
        &self,
        query: &DueReportQuery,
    ) -> Result<Vec<WeeklyProgressRecord>, StoreError>;
}

/// Selection bounds for report rows a worker may claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DueReportQuery {
    pub now: DateTime<Utc>,
    /// Claims stamped at or before this instant are abandoned.
    pub stale_before: DateTime<Utc>,
    pub max_retry_attempts: u32,
    pub limit: usize,
}

/// Per-user profile data: timezone preference and tag-sync bookkeeping.
pub trait ProfileStore: Send + Sync {
    fn profile_timezone(&self, user_id: &str) -> Result<Option<String>, StoreError>;

    fn set_profile_timezone(
        &self,
        user_id: &str,
        timezone: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    fn tag_sync_state(&self, user_id: &str) -> Result<Option<TagSyncState>, StoreError>;

    /// First write for a user. An existing row is a `Conflict`.
    fn insert_tag_sync_state(&self, state: &TagSyncState) -> Result<(), StoreError>;

    fn update_tag_sync_state(&self, state: &TagSyncState) -> Result<(), StoreError>;

    /// Record that a sync ran and found nothing to push.
    fn touch_tag_sync_checked(&self, user_id: &str, at: DateTime<Utc>) -> Result<(), StoreError>;
}
