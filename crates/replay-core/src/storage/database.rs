//! SQLite-backed progress and profile store.
//!
//! Provides persistent storage for:
//! - Weekly progress rows, one per user per local week
//! - User profile timezone preferences
//! - Tag-sync bookkeeping (last pushed week key and hash)

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use tracing::debug;

use super::data_dir;
use super::migrations;
use super::traits::{DueReportQuery, ProfileStore, ProgressStore};
use crate::error::StoreError;
use crate::progress::WeeklyProgressRecord;
use crate::tags::TagSyncState;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const WEEK_COLUMNS: &str = "user_id, week_start, week_timezone, journal_count, meditation_count,
    meditations_unlocked_at, last_journal_at, last_meditation_at, eligible, next_report_at_utc,
    weekly_report_ready_at, weekly_report_sent_at, claimed_at, retry_attempts,
    created_at, updated_at";

/// SQLite database implementing [`ProgressStore`] and [`ProfileStore`].
///
/// The connection sits behind a mutex so one `Database` can be shared
/// across request threads; row updates additionally run in `IMMEDIATE`
/// transactions so separate connections to the same file serialize too.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open the database at `~/.config/replay/replay.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the data directory, database or migrations fail.
    pub fn open() -> Result<Self, StoreError> {
        let dir = data_dir().map_err(|e| StoreError::QueryFailed(e.to_string()))?;
        Self::open_at(dir.join("replay.db"))
    }

    /// Open (or create) a database file at `path`.
    pub fn open_at(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|source| StoreError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Self::from_connection(conn)
    }

    /// Open an in-memory database (for tests and one-shot tooling).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        migrations::migrate(&conn).map_err(|e| StoreError::MigrationFailed(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::QueryFailed("connection mutex poisoned".into()))
    }
}

fn ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn opt_ts(dt: &Option<DateTime<Utc>>) -> Option<String> {
    dt.as_ref().map(ts)
}

fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn conversion_error(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn get_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn get_opt_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| conversion_error(idx, e))
    })
    .transpose()
}

fn get_date(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d").map_err(|e| conversion_error(idx, e))
}

fn row_to_week(row: &Row<'_>) -> rusqlite::Result<WeeklyProgressRecord> {
    Ok(WeeklyProgressRecord {
        user_id: row.get(0)?,
        week_start: get_date(row, 1)?,
        week_timezone: row.get(2)?,
        journal_count: row.get(3)?,
        meditation_count: row.get(4)?,
        meditations_unlocked_at: get_opt_ts(row, 5)?,
        last_journal_at: get_opt_ts(row, 6)?,
        last_meditation_at: get_opt_ts(row, 7)?,
        eligible: row.get(8)?,
        next_report_at_utc: get_opt_ts(row, 9)?,
        weekly_report_ready_at: get_opt_ts(row, 10)?,
        weekly_report_sent_at: get_opt_ts(row, 11)?,
        claimed_at: get_opt_ts(row, 12)?,
        retry_attempts: row.get(13)?,
        created_at: get_ts(row, 14)?,
        updated_at: get_ts(row, 15)?,
    })
}

fn find_week_in(
    conn: &Connection,
    user_id: &str,
    week_start: NaiveDate,
) -> rusqlite::Result<Option<WeeklyProgressRecord>> {
    conn.query_row(
        &format!("SELECT {WEEK_COLUMNS} FROM weekly_progress WHERE user_id = ?1 AND week_start = ?2"),
        params![user_id, date_key(week_start)],
        row_to_week,
    )
    .optional()
}

fn write_week(conn: &Connection, r: &WeeklyProgressRecord) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE weekly_progress SET
            week_timezone = ?3,
            journal_count = ?4,
            meditation_count = ?5,
            meditations_unlocked_at = ?6,
            last_journal_at = ?7,
            last_meditation_at = ?8,
            eligible = ?9,
            next_report_at_utc = ?10,
            weekly_report_ready_at = ?11,
            weekly_report_sent_at = ?12,
            claimed_at = ?13,
            retry_attempts = ?14,
            updated_at = ?15
         WHERE user_id = ?1 AND week_start = ?2",
        params![
            r.user_id,
            date_key(r.week_start),
            r.week_timezone,
            r.journal_count,
            r.meditation_count,
            opt_ts(&r.meditations_unlocked_at),
            opt_ts(&r.last_journal_at),
            opt_ts(&r.last_meditation_at),
            r.eligible,
            opt_ts(&r.next_report_at_utc),
            opt_ts(&r.weekly_report_ready_at),
            opt_ts(&r.weekly_report_sent_at),
            opt_ts(&r.claimed_at),
            r.retry_attempts,
            ts(&r.updated_at),
        ],
    )
}

/// Re-label a generic unique violation with the table and key it hit.
fn conflict_on(table: &'static str, key: String) -> impl FnOnce(rusqlite::Error) -> StoreError {
    move |err| match StoreError::from(err) {
        StoreError::Conflict { .. } => StoreError::Conflict { table, key },
        other => other,
    }
}

impl ProgressStore for Database {
    fn find_week(
        &self,
        user_id: &str,
        week_start: NaiveDate,
    ) -> Result<Option<WeeklyProgressRecord>, StoreError> {
        let conn = self.conn()?;
        Ok(find_week_in(&conn, user_id, week_start)?)
    }

    fn insert_week(&self, r: &WeeklyProgressRecord) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            &format!(
                "INSERT INTO weekly_progress ({WEEK_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)"
            ),
            params![
                r.user_id,
                date_key(r.week_start),
                r.week_timezone,
                r.journal_count,
                r.meditation_count,
                opt_ts(&r.meditations_unlocked_at),
                opt_ts(&r.last_journal_at),
                opt_ts(&r.last_meditation_at),
                r.eligible,
                opt_ts(&r.next_report_at_utc),
                opt_ts(&r.weekly_report_ready_at),
                opt_ts(&r.weekly_report_sent_at),
                opt_ts(&r.claimed_at),
                r.retry_attempts,
                ts(&r.created_at),
                ts(&r.updated_at),
            ],
        )
        .map_err(conflict_on(
            "weekly_progress",
            format!("{}/{}", r.user_id, r.week_start),
        ))?;
        Ok(())
    }

    fn backfill_week_timezone(
        &self,
        user_id: &str,
        week_start: NaiveDate,
        timezone: &str,
    ) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE weekly_progress SET week_timezone = ?3
             WHERE user_id = ?1 AND week_start = ?2 AND week_timezone IS NULL",
            params![user_id, date_key(week_start), timezone],
        )?;
        Ok(changed > 0)
    }

    fn update_week(
        &self,
        user_id: &str,
        week_start: NaiveDate,
        apply: &mut dyn FnMut(&mut WeeklyProgressRecord) -> bool,
    ) -> Result<Option<WeeklyProgressRecord>, StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let Some(mut record) = find_week_in(&tx, user_id, week_start)? else {
            return Ok(None);
        };
        if apply(&mut record) {
            write_week(&tx, &record)?;
        }
        tx.commit()?;
        Ok(Some(record))
    }

    fn list_weeks(
        &self,
        user_id: &str,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<WeeklyProgressRecord>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {WEEK_COLUMNS} FROM weekly_progress
             WHERE user_id = ?1
               AND (?2 IS NULL OR week_start >= ?2)
               AND (?3 IS NULL OR week_start <= ?3)
             ORDER BY week_start DESC"
        ))?;
        let rows = stmt.query_map(
            params![user_id, from.map(date_key), to.map(date_key)],
            row_to_week,
        )?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn list_due_weeks(
        &self,
        query: &DueReportQuery,
    ) -> Result<Vec<WeeklyProgressRecord>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {WEEK_COLUMNS} FROM weekly_progress
             WHERE eligible = 1
               AND weekly_report_sent_at IS NULL
               AND next_report_at_utc IS NOT NULL
               AND next_report_at_utc <= ?1
               AND retry_attempts < ?2
               AND (claimed_at IS NULL OR claimed_at <= ?3)
             ORDER BY next_report_at_utc ASC
             LIMIT ?4"
        ))?;
        let limit = i64::try_from(query.limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(
            params![
                ts(&query.now),
                query.max_retry_attempts,
                ts(&query.stale_before),
                limit
            ],
            row_to_week,
        )?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

impl ProfileStore for Database {
    fn profile_timezone(&self, user_id: &str) -> Result<Option<String>, StoreError> {
        let conn = self.conn()?;
        let tz = conn
            .query_row(
                "SELECT timezone FROM user_profiles WHERE user_id = ?1",
                params![user_id],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()?;
        Ok(tz.flatten())
    }

    fn set_profile_timezone(
        &self,
        user_id: &str,
        timezone: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO user_profiles (user_id, timezone, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id) DO UPDATE SET
                timezone = excluded.timezone,
                updated_at = excluded.updated_at",
            params![user_id, timezone, ts(&now)],
        )?;
        debug!(user_id, timezone, "profile timezone updated");
        Ok(())
    }

    fn tag_sync_state(&self, user_id: &str) -> Result<Option<TagSyncState>, StoreError> {
        let conn = self.conn()?;
        let state = conn
            .query_row(
                "SELECT user_id, week_key, tag_hash, synced_at, checked_at
                 FROM tag_sync_state WHERE user_id = ?1",
                params![user_id],
                |row| {
                    Ok(TagSyncState {
                        user_id: row.get(0)?,
                        week_key: row.get(1)?,
                        tag_hash: row.get(2)?,
                        synced_at: get_ts(row, 3)?,
                        checked_at: get_ts(row, 4)?,
                    })
                },
            )
            .optional()?;
        Ok(state)
    }

    fn insert_tag_sync_state(&self, state: &TagSyncState) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO tag_sync_state (user_id, week_key, tag_hash, synced_at, checked_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                state.user_id,
                state.week_key,
                state.tag_hash,
                ts(&state.synced_at),
                ts(&state.checked_at),
            ],
        )
        .map_err(conflict_on("tag_sync_state", state.user_id.clone()))?;
        Ok(())
    }

    fn update_tag_sync_state(&self, state: &TagSyncState) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE tag_sync_state
             SET week_key = ?2, tag_hash = ?3, synced_at = ?4, checked_at = ?5
             WHERE user_id = ?1",
            params![
                state.user_id,
                state.week_key,
                state.tag_hash,
                ts(&state.synced_at),
                ts(&state.checked_at),
            ],
        )?;
        Ok(())
    }

    fn touch_tag_sync_checked(&self, user_id: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE tag_sync_state SET checked_at = ?2 WHERE user_id = ?1",
            params![user_id, ts(&at)],
        )?;
        Ok(())
    }
}
