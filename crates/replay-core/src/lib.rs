//! # Replay Core Library
//!
//! This library provides the weekly progress ledger behind Replay's journaling
//! and meditation features. Every user accumulates journal and meditation
//! counts per local calendar week; those counts unlock meditations, make the
//! user eligible for a weekly report, and feed audience tags on the push
//! notification service.
//!
//! ## Architecture
//!
//! - **Week**: Timezone-aware week boundaries (Monday 00:00 local) and
//!   local-to-UTC conversion that survives DST transitions
//! - **Progress**: The per-user-per-week ledger, eligibility rules and the
//!   read model returned to callers
//! - **Storage**: SQLite persistence and TOML-based configuration
//! - **Tags**: Hash-deduplicated push of weekly state to the audience service
//!
//! ## Key Components
//!
//! - [`ProgressService`]: Entry points called on journal and meditation events
//! - [`ProgressLedger`]: Row-level operations on weekly progress
//! - [`Database`]: Weekly progress, profile and sync state persistence
//! - [`Config`]: Application configuration management
//! - [`TagSynchronizer`]: Pushes tags only when they changed

pub mod error;
pub mod progress;
pub mod storage;
pub mod tags;
pub mod week;

pub use error::{ConfigError, CoreError, StoreError, TagSyncError, ValidationError};
pub use progress::{
    build_progress_summary, determine_report_scheduling, should_queue_weekly_report,
    ProgressEvent, ProgressLedger, ProgressService, ProgressSummary, ProgressThresholds,
    ProgressUpdate, RecomputeOutcome, WeeklyProgressRecord,
};
pub use storage::{Config, Database, ProfileStore, ProgressStore};
pub use tags::{AudienceClient, OneSignalClient, SyncOutcome, TagSyncState, TagSynchronizer};
pub use week::{next_report_at_utc, next_week_start, week_start, TimezoneResolver};
