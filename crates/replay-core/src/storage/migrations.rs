//! Database schema migrations for replay.
//!
//! Migrations are versioned and applied automatically when opening the database.
//! The `schema_version` table tracks the current migration version.

use rusqlite::{Connection, Result as SqliteResult};
use tracing::{debug, warn};

/// Current schema version.
///
/// Increment this when adding new migrations.
pub const SCHEMA_VERSION: i32 = 3;

/// Apply all pending migrations to bring the database to the current schema version.
///
/// # Errors
/// Returns an error if migration fails.
pub fn migrate(conn: &Connection) -> SqliteResult<()> {
    create_schema_version_table(conn)?;

    let current_version = get_schema_version(conn);

    if current_version < 1 {
        migrate_v1(conn)?;
    }
    if current_version < 2 {
        migrate_v2(conn)?;
    }
    if current_version < 3 {
        migrate_v3(conn)?;
    }

    Ok(())
}

fn create_schema_version_table(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )
}

/// Returns 0 if no version is set (initial database).
pub(crate) fn get_schema_version(conn: &Connection) -> i32 {
    conn.query_row("SELECT version FROM schema_version", [], |row| {
        row.get::<_, i32>(0)
    })
    .unwrap_or_else(|e| {
        if !matches!(e, rusqlite::Error::QueryReturnedNoRows) {
            warn!(error = %e, "failed to read schema_version");
        }
        0
    })
}

fn set_schema_version(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    debug!(version, "schema migrated");
    Ok(())
}

/// Migration v1: profiles and weekly progress counters.
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS user_profiles (
            user_id     TEXT PRIMARY KEY,
            timezone    TEXT,
            updated_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS weekly_progress (
            user_id                 TEXT NOT NULL,
            week_start              TEXT NOT NULL,
            week_timezone           TEXT,
            journal_count           INTEGER NOT NULL DEFAULT 0 CHECK (journal_count >= 0),
            meditation_count        INTEGER NOT NULL DEFAULT 0 CHECK (meditation_count >= 0),
            meditations_unlocked_at TEXT,
            last_journal_at         TEXT,
            last_meditation_at      TEXT,
            eligible                INTEGER NOT NULL DEFAULT 0,
            next_report_at_utc      TEXT,
            weekly_report_ready_at  TEXT,
            weekly_report_sent_at   TEXT,
            created_at              TEXT NOT NULL,
            updated_at              TEXT NOT NULL,
            PRIMARY KEY (user_id, week_start)
        );

        CREATE INDEX IF NOT EXISTS idx_weekly_progress_user_week
            ON weekly_progress(user_id, week_start DESC);",
    )?;

    set_schema_version(&tx, 1)?;
    tx.commit()?;
    Ok(())
}

/// Migration v2: tag-sync bookkeeping for the push audience service.
fn migrate_v2(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS tag_sync_state (
            user_id     TEXT PRIMARY KEY,
            week_key    TEXT NOT NULL,
            tag_hash    TEXT NOT NULL,
            synced_at   TEXT NOT NULL,
            checked_at  TEXT NOT NULL
        );",
    )?;

    set_schema_version(&tx, 2)?;
    tx.commit()?;
    Ok(())
}

/// Migration v3: report dispatch claim/retry columns.
///
/// Adds `claimed_at` and `retry_attempts` to weekly_progress, plus an
/// index over the columns the dispatch worker scans.
fn migrate_v3(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "ALTER TABLE weekly_progress ADD COLUMN claimed_at TEXT;
         ALTER TABLE weekly_progress ADD COLUMN retry_attempts INTEGER NOT NULL DEFAULT 0;

         CREATE INDEX IF NOT EXISTS idx_weekly_progress_due
            ON weekly_progress(eligible, next_report_at_utc)
            WHERE weekly_report_sent_at IS NULL;",
    )?;

    set_schema_version(&tx, 3)?;
    tx.commit()?;
    Ok(())
}
