//! Push audience client -- writes per-user tags used for campaign targeting.

use std::sync::Arc;
use std::time::Duration;

use reqwest::blocking::Client;
use serde_json::json;
use tracing::debug;
use url::Url;

use super::payload::TagMap;
use crate::error::TagSyncError;
use crate::storage::NotificationsConfig;

/// External service that stores user-scoped tags.
pub trait AudienceClient: Send + Sync {
    /// Replace the given tags on the user identified by `external_id`.
    fn update_user_tags(&self, external_id: &str, tags: &TagMap) -> Result<(), TagSyncError>;
}

impl<T: AudienceClient + ?Sized> AudienceClient for Arc<T> {
    fn update_user_tags(&self, external_id: &str, tags: &TagMap) -> Result<(), TagSyncError> {
        (**self).update_user_tags(external_id, tags)
    }
}

/// OneSignal user-tags API.
pub struct OneSignalClient {
    http: Client,
    api_base: Url,
    app_id: String,
    api_key: String,
}

impl OneSignalClient {
    pub fn new(
        api_base: &str,
        app_id: &str,
        api_key: &str,
        timeout: Duration,
    ) -> Result<Self, TagSyncError> {
        if app_id.is_empty() || api_key.is_empty() {
            return Err(TagSyncError::NotConfigured);
        }
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            api_base: Url::parse(api_base)?,
            app_id: app_id.to_string(),
            api_key: api_key.to_string(),
        })
    }

    /// Build from config. Disabled or incomplete config is `NotConfigured`.
    pub fn from_config(config: &NotificationsConfig) -> Result<Self, TagSyncError> {
        if !config.is_configured() {
            return Err(TagSyncError::NotConfigured);
        }
        Self::new(
            &config.api_base,
            &config.app_id,
            &config.api_key,
            Duration::from_secs(config.timeout_secs),
        )
    }

    fn user_url(&self, external_id: &str) -> Result<Url, TagSyncError> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|()| TagSyncError::Url(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .extend(["apps", self.app_id.as_str(), "users", "by", "external_id", external_id]);
        Ok(url)
    }
}

impl AudienceClient for OneSignalClient {
    fn update_user_tags(&self, external_id: &str, tags: &TagMap) -> Result<(), TagSyncError> {
        let url = self.user_url(external_id)?;
        let body = json!({ "properties": { "tags": tags } });

        let resp = self
            .http
            .patch(url)
            .header("Authorization", format!("Key {}", self.api_key))
            .json(&body)
            .send()?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(TagSyncError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        debug!(external_id, tag_count = tags.len(), "audience tags updated");
        Ok(())
    }
}
