use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use super::client::AudienceClient;
use super::payload::{build_weekly_tags, tag_hash};
use super::week_key::iso_week_key;
use super::TagSyncState;
use crate::error::TagSyncError;
use crate::progress::ProgressSummary;
use crate::storage::ProfileStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncOutcome {
    /// Tags unchanged since the last push; no external call made.
    Skipped { week_key: String },
    Pushed { week_key: String, tag_hash: String },
}

impl SyncOutcome {
    pub fn pushed(&self) -> bool {
        matches!(self, SyncOutcome::Pushed { .. })
    }
}

pub struct TagSynchronizer<A: AudienceClient> {
    client: A,
}

impl<A: AudienceClient> TagSynchronizer<A> {
    pub fn new(client: A) -> Self {
        Self { client }
    }

    /// Push the summary's tags if they differ from the last push.
    ///
    /// The stored hash only advances after the external call succeeds, so
    /// a failed push is retried with the same diff on the next sync.
    pub fn sync<P: ProfileStore + ?Sized>(
        &self,
        store: &P,
        user_id: &str,
        summary: &ProgressSummary,
        now: DateTime<Utc>,
    ) -> Result<SyncOutcome, TagSyncError> {
        let week_key = iso_week_key(summary.week_start);
        let tags = build_weekly_tags(summary, &week_key);
        let hash = tag_hash(&week_key, &tags)?;

        let previous = store.tag_sync_state(user_id)?;
        if previous
            .as_ref()
            .is_some_and(|p| p.week_key == week_key && p.tag_hash == hash)
        {
            store.touch_tag_sync_checked(user_id, now)?;
            debug!(user_id, %week_key, "audience tags unchanged, skipping push");
            return Ok(SyncOutcome::Skipped { week_key });
        }

        self.client.update_user_tags(user_id, &tags)?;

        let state = TagSyncState {
            user_id: user_id.to_string(),
            week_key: week_key.clone(),
            tag_hash: hash.clone(),
            synced_at: now,
            checked_at: now,
        };
        if previous.is_some() {
            store.update_tag_sync_state(&state)?;
        } else {
            match store.insert_tag_sync_state(&state) {
                Ok(()) => {}
                Err(e) if e.is_conflict() => store.update_tag_sync_state(&state)?,
                Err(e) => return Err(e.into()),
            }
        }

        info!(user_id, %week_key, "audience tags pushed");
        Ok(SyncOutcome::Pushed {
            week_key,
            tag_hash: hash,
        })
    }
}
