//! Integration tests for the weekly progress flow.
//!
//! Drives the service end to end against an in-memory database: journal and
//! meditation events, eligibility, the report claim protocol and audience
//! tag sync.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, NaiveDate, Utc};
use replay_core::tags::TagMap;
use replay_core::{
    next_report_at_utc, next_week_start, AudienceClient, Database, ProfileStore,
    ProgressService, ProgressStore, ProgressThresholds, TagSyncError, TagSynchronizer,
};
use replay_core::storage::ReportsConfig;

fn utc(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
}

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn service() -> ProgressService<Database> {
    let svc = ProgressService::new(Database::open_in_memory().unwrap(), ProgressThresholds::default());
    svc.set_timezone("u1", "America/New_York", utc("2025-05-01T00:00:00Z"))
        .unwrap();
    svc
}

#[derive(Default)]
struct CapturingClient {
    pushes: Mutex<Vec<(String, TagMap)>>,
}

impl AudienceClient for CapturingClient {
    fn update_user_tags(&self, external_id: &str, tags: &TagMap) -> Result<(), TagSyncError> {
        self.pushes
            .lock()
            .unwrap()
            .push((external_id.to_string(), tags.clone()));
        Ok(())
    }
}

#[test]
fn test_sunday_night_entry_counts_toward_current_local_week() {
    let svc = service();

    let monday = utc("2025-05-19T04:30:00Z");
    let first = svc.journal_created("u1", monday, monday).unwrap();
    assert_eq!(first.summary.week_start, date("2025-05-19"));

    let sunday_night = utc("2025-05-26T03:00:00Z");
    let second = svc.journal_created("u1", sunday_night, sunday_night).unwrap();
    assert_eq!(second.summary.week_start, date("2025-05-19"));
    assert_eq!(second.summary.journal_count, 2);

    let rows = svc.store().list_weeks("u1", None, None).unwrap();
    assert_eq!(rows.len(), 1);
}

#[test]
fn test_five_journals_schedule_report_for_next_local_monday() {
    let svc = service();
    let base = utc("2025-05-20T15:00:00Z");

    let mut last = None;
    for _ in 0..5 {
        last = Some(svc.journal_created("u1", base, base).unwrap());
    }
    let summary = last.unwrap().summary;

    assert_eq!(summary.journal_count, 5);
    assert_eq!(summary.meditation_count, 0);
    assert!(summary.eligible);
    assert!(summary.report_ready);
    assert!(summary.meditations_unlocked);
    assert_eq!(summary.next_report_at_utc, Some(utc("2025-05-26T04:00:00Z")));
    assert_eq!(summary.journals_to_report, 0);
}

#[test]
fn test_combined_path_needs_both_counts() {
    let svc = service();
    let at = utc("2025-05-20T15:00:00Z");

    for _ in 0..3 {
        svc.journal_created("u1", at, at).unwrap();
    }
    let one = svc.meditation_completed("u1", at, at).unwrap();
    assert!(one.summary.meditations_unlocked);
    assert!(!one.summary.eligible);
    assert_eq!(one.summary.combo_meditations_remaining, 1);

    let two = svc.meditation_completed("u1", at, at).unwrap();
    assert!(two.summary.eligible);

    // Dropping under the combo journal count withdraws eligibility.
    let after_delete = svc.journal_deleted("u1", at, at).unwrap();
    assert!(!after_delete.summary.eligible);
    assert!(!after_delete.summary.report_ready);
    assert_eq!(after_delete.summary.next_report_at_utc, None);
}

#[test]
fn test_report_after_spring_forward_uses_daylight_offset() {
    let svc = service();
    // Week of 2025-03-03; the following Monday is after the 2025-03-09 switch.
    let at = utc("2025-03-05T15:00:00Z");
    let mut summary = None;
    for _ in 0..5 {
        summary = Some(svc.journal_created("u1", at, at).unwrap().summary);
    }
    let summary = summary.unwrap();
    assert_eq!(summary.week_start, date("2025-03-03"));
    assert_eq!(summary.next_report_at_utc, Some(utc("2025-03-10T04:00:00Z")));

    let tz = chrono_tz::America::New_York;
    assert_eq!(next_week_start(date("2025-03-09")), date("2025-03-16"));
    assert_eq!(next_report_at_utc(date("2025-03-09"), tz), utc("2025-03-16T04:00:00Z"));
}

#[test]
fn test_deletes_never_go_negative() {
    let svc = service();
    let at = utc("2025-05-20T15:00:00Z");
    let update = svc.journal_deleted("u1", at, at).unwrap();
    assert_eq!(update.summary.journal_count, 0);
    assert!(!update.summary.meditations_unlocked);
}

#[test]
fn test_report_claim_dispatch_and_send() {
    let svc = service();
    let at = utc("2025-05-20T15:00:00Z");
    for _ in 0..5 {
        svc.journal_created("u1", at, at).unwrap();
    }
    let week = date("2025-05-19");

    // Not due until local Monday midnight.
    assert!(svc.due_reports(utc("2025-05-26T03:59:59Z"), 10).unwrap().is_empty());

    let due_at = utc("2025-05-26T04:00:00Z");
    let due = svc.due_reports(due_at, 10).unwrap();
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].week_start, week);

    let claimed = svc.claim_weekly_report("u1", week, due_at).unwrap();
    assert!(claimed.is_some());
    // A live claim blocks a second worker.
    assert!(svc.claim_weekly_report("u1", week, due_at).unwrap().is_none());
    assert!(svc.due_reports(due_at, 10).unwrap().is_empty());

    let released = svc.release_weekly_report("u1", week, due_at).unwrap();
    assert_eq!(released.retry_attempts, 1);
    assert!(released.claimed_at.is_none());

    let sent_at = utc("2025-05-26T04:05:00Z");
    let sent = svc.mark_weekly_report_sent("u1", week, sent_at).unwrap();
    assert!(sent.report_sent);
    assert!(!sent.eligible);

    let again = svc
        .mark_weekly_report_sent("u1", week, utc("2025-05-26T05:00:00Z"))
        .unwrap();
    assert!(again.report_sent);
    let row = svc.store().find_week("u1", week).unwrap().unwrap();
    assert_eq!(row.weekly_report_sent_at, Some(sent_at));
    assert!(svc.due_reports(utc("2025-06-01T00:00:00Z"), 10).unwrap().is_empty());
}

#[test]
fn test_sent_report_stays_sent_after_more_activity() {
    let svc = service();
    let at = utc("2025-05-20T15:00:00Z");
    for _ in 0..5 {
        svc.journal_created("u1", at, at).unwrap();
    }
    svc.mark_weekly_report_sent("u1", date("2025-05-19"), at).unwrap();

    let update = svc.journal_created("u1", at, at).unwrap();
    assert_eq!(update.summary.journal_count, 6);
    assert!(update.summary.report_sent);
    assert!(!update.summary.eligible);
    assert_eq!(update.summary.next_report_at_utc, None);
}

#[test]
fn test_tag_sync_follows_mutations_and_skips_duplicates() {
    let client = Arc::new(CapturingClient::default());
    let svc = service().with_tag_sync(TagSynchronizer::new(client.clone()));
    let at = utc("2025-05-20T15:00:00Z");

    let update = svc.journal_created("u1", at, at).unwrap();
    assert!(update.tag_sync.unwrap().unwrap().pushed());

    let recompute = svc.recompute_weekly_progress("u1", at).unwrap();
    assert!(!recompute.sync.unwrap().pushed());
    let recompute = svc.recompute_weekly_progress("u1", at).unwrap();
    assert!(!recompute.sync.unwrap().pushed());

    svc.meditation_completed("u1", at, at).unwrap();

    let pushes = client.pushes.lock().unwrap();
    assert_eq!(pushes.len(), 2);
    assert_eq!(pushes[0].0, "u1");
    assert_eq!(pushes[0].1["week_key"], "2025-21");
    assert_eq!(pushes[1].1["meditation_count"], "1");

    let state = svc.store().tag_sync_state("u1").unwrap().unwrap();
    assert_eq!(state.week_key, "2025-21");
}

#[test]
fn test_new_week_pushes_fresh_tags() {
    let client = Arc::new(CapturingClient::default());
    let svc = service().with_tag_sync(TagSynchronizer::new(client.clone()));

    svc.recompute_weekly_progress("u1", utc("2025-05-20T15:00:00Z")).unwrap();
    let next = svc
        .recompute_weekly_progress("u1", utc("2025-05-27T15:00:00Z"))
        .unwrap();
    assert!(next.sync.unwrap().pushed());
    assert_eq!(next.summary.week_start, date("2025-05-26"));

    let pushes = client.pushes.lock().unwrap();
    assert_eq!(pushes.len(), 2);
    assert_eq!(pushes[1].1["week_key"], "2025-22");
    assert_eq!(pushes[1].1["journal_count"], "0");
}

#[test]
fn test_exhausted_report_leaves_room_for_later_due_reports() {
    let svc = ProgressService::new(Database::open_in_memory().unwrap(), ProgressThresholds::default())
        .with_reports(ReportsConfig {
            claim_timeout_minutes: 15,
            max_retry_attempts: 1,
        });

    let early = utc("2025-05-13T15:00:00Z");
    let late = utc("2025-05-20T15:00:00Z");
    for _ in 0..5 {
        svc.journal_created("old", early, early).unwrap();
        svc.journal_created("new", late, late).unwrap();
    }
    let old_week = date("2025-05-12");
    let old_due = utc("2025-05-19T04:00:00Z");
    assert!(svc.claim_weekly_report("old", old_week, old_due).unwrap().is_some());
    svc.release_weekly_report("old", old_week, old_due).unwrap();

    let now = utc("2025-05-26T05:00:00Z");
    let first: Vec<String> = svc
        .due_reports(now, 1)
        .unwrap()
        .into_iter()
        .map(|r| r.user_id)
        .collect();
    assert_eq!(first, vec!["new"]);
}

#[test]
fn test_history_window_larger_than_calendar() {
    let svc = service();
    let at = utc("2025-05-20T15:00:00Z");
    svc.journal_created("u1", at, at).unwrap();
    let weeks = svc.history("u1", u32::MAX, at).unwrap();
    assert_eq!(weeks.len(), 1);
    assert_eq!(weeks[0].week_start, date("2025-05-19"));
}
