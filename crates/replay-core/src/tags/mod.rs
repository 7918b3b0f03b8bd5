//! Weekly tag sync to the push audience service.
//!
//! The derived tag set is hashed together with its ISO week key; the
//! external call is made only when that `(week_key, hash)` pair differs
//! from the one last pushed for the user.

pub mod client;
pub mod payload;
pub mod synchronizer;
pub mod week_key;

pub use client::{AudienceClient, OneSignalClient};
pub use payload::{build_weekly_tags, tag_hash, TagMap};
pub use synchronizer::{SyncOutcome, TagSynchronizer};
pub use week_key::iso_week_key;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Last pushed tag set for a user, stored alongside the profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagSyncState {
    pub user_id: String,
    pub week_key: String,
    pub tag_hash: String,
    /// When the tags were last pushed.
    pub synced_at: DateTime<Utc>,
    /// When a sync last ran, pushed or not.
    pub checked_at: DateTime<Utc>,
}
