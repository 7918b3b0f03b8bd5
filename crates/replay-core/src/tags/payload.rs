use std::collections::BTreeMap;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::progress::ProgressSummary;

pub type TagMap = BTreeMap<String, String>;

/// Flatten a summary into string tags for audience segmentation.
pub fn build_weekly_tags(summary: &ProgressSummary, week_key: &str) -> TagMap {
    let flag = |b: bool| if b { "true" } else { "false" }.to_string();
    let mut tags = TagMap::new();
    tags.insert("week_key".into(), week_key.to_string());
    tags.insert("week_start".into(), summary.week_start.to_string());
    tags.insert("journal_count".into(), summary.journal_count.to_string());
    tags.insert("meditation_count".into(), summary.meditation_count.to_string());
    tags.insert("meditations_unlocked".into(), flag(summary.meditations_unlocked));
    tags.insert("report_ready".into(), flag(summary.report_ready));
    tags.insert("report_sent".into(), flag(summary.report_sent));
    tags.insert("report_eligible".into(), flag(summary.eligible));
    tags.insert(
        "next_report_at".into(),
        summary
            .next_report_at_utc
            .map(|at| at.timestamp().to_string())
            .unwrap_or_default(),
    );
    tags.insert("journals_to_unlock".into(), summary.journals_to_unlock.to_string());
    tags.insert("journals_to_report".into(), summary.journals_to_report.to_string());
    tags
}

#[derive(Serialize)]
struct HashInput<'a> {
    #[serde(rename = "weekKey")]
    week_key: &'a str,
    tags: &'a TagMap,
}

/// SHA-256 hex digest of `{weekKey, tags}` in stable JSON form.
pub fn tag_hash(week_key: &str, tags: &TagMap) -> Result<String, serde_json::Error> {
    let json = serde_json::to_string(&HashInput { week_key, tags })?;
    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}
