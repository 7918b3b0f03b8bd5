//! Timezone-aware week arithmetic.
//!
//! A progress week is the Monday-to-Sunday calendar week in the user's
//! local timezone. Everything here is pure except [`TimezoneResolver`],
//! which reads the user's preference from a [`ProfileStore`] and degrades
//! to the configured default instead of failing.

use chrono::{
    DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveTime, Offset, TimeZone, Utc,
};
use chrono_tz::Tz;
use tracing::warn;

use crate::error::ValidationError;
use crate::storage::ProfileStore;

/// Fallback when a user has no usable timezone preference.
pub const DEFAULT_TIMEZONE: Tz = chrono_tz::America::New_York;

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S";

/// Monday of the local week containing `instant`.
pub fn week_start(instant: DateTime<Utc>, tz: Tz) -> NaiveDate {
    let local = instant.with_timezone(&tz).date_naive();
    let offset = i64::from(local.weekday().num_days_from_monday());
    local - Duration::days(offset)
}

/// Calendar shift by one week. No timezone involved.
pub fn next_week_start(week_start: NaiveDate) -> NaiveDate {
    week_start + Duration::days(7)
}

/// Convert a local wall-clock date and time in `tz` to the exact UTC instant.
///
/// The offset is the one in force at that local moment, so DST weeks get
/// the post-transition offset. An ambiguous time (clocks going back)
/// resolves to the earlier instant. A time inside a spring-forward gap is
/// read with the pre-gap offset, which lands it just after the gap.
pub fn utc_from_local(date: NaiveDate, tz: Tz, time: NaiveTime) -> DateTime<Utc> {
    let naive = date.and_time(time);
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt.with_timezone(&Utc),
        LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        LocalResult::None => {
            let before_gap = tz
                .offset_from_utc_datetime(&(naive - Duration::days(1)))
                .fix();
            let utc = naive - Duration::seconds(i64::from(before_gap.local_minus_utc()));
            Utc.from_utc_datetime(&utc)
        }
    }
}

/// String-typed variant of [`utc_from_local`] for values coming off the wire.
pub fn utc_from_local_str(
    date: &str,
    tz: Tz,
    time: &str,
) -> Result<DateTime<Utc>, ValidationError> {
    Ok(utc_from_local(parse_date(date)?, tz, parse_time(time)?))
}

/// Local midnight at the start of the week after `week_start`, in UTC.
pub fn next_report_at_utc(week_start: NaiveDate, tz: Tz) -> DateTime<Utc> {
    utc_from_local(next_week_start(week_start), tz, NaiveTime::MIN)
}

/// Whether `now`, seen from `tz`, is at or past the given local moment.
///
/// Both sides are rendered as zero-padded `YYYY-MM-DD HH:MM:SS` so plain
/// string ordering matches chronological ordering.
pub fn has_reached_local_moment(
    target_date: NaiveDate,
    target_time: NaiveTime,
    tz: Tz,
    now: DateTime<Utc>,
) -> bool {
    let local = now.with_timezone(&tz);
    let now_key = format!(
        "{} {}",
        local.format(DATE_FORMAT),
        local.format(TIME_FORMAT)
    );
    let target_key = format!(
        "{} {}",
        target_date.format(DATE_FORMAT),
        target_time.format(TIME_FORMAT)
    );
    now_key >= target_key
}

pub fn parse_date(value: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
        .map_err(|_| ValidationError::InvalidDate(value.to_string()))
}

/// Accepts `HH:MM:SS` or `HH:MM`.
pub fn parse_time(value: &str) -> Result<NaiveTime, ValidationError> {
    let trimmed = value.trim();
    NaiveTime::parse_from_str(trimmed, TIME_FORMAT)
        .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M"))
        .map_err(|_| ValidationError::InvalidTime(value.to_string()))
}

pub fn parse_timezone(name: &str) -> Result<Tz, ValidationError> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| ValidationError::InvalidTimezone(name.to_string()))
}

/// Parse `name`, or fall back to `default` when it is missing or unknown.
pub fn timezone_or(name: Option<&str>, default: Tz) -> Tz {
    match name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(n) => parse_timezone(n).unwrap_or_else(|_| {
            warn!(timezone = n, fallback = %default, "unknown timezone, using fallback");
            default
        }),
        None => default,
    }
}

/// Resolves a user's timezone with an injected default.
#[derive(Debug, Clone, Copy)]
pub struct TimezoneResolver {
    default: Tz,
}

impl Default for TimezoneResolver {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEZONE)
    }
}

impl TimezoneResolver {
    pub fn new(default: Tz) -> Self {
        Self { default }
    }

    pub fn default_timezone(&self) -> Tz {
        self.default
    }

    /// Never fails: a missing profile, bad value or store error all yield
    /// the default timezone.
    pub fn resolve<S: ProfileStore + ?Sized>(&self, store: &S, user_id: &str) -> Tz {
        match store.profile_timezone(user_id) {
            Ok(name) => timezone_or(name.as_deref(), self.default),
            Err(e) => {
                warn!(user_id, error = %e, "timezone lookup failed, using default");
                self.default
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Weekday;
    use proptest::prelude::*;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn date(s: &str) -> NaiveDate {
        parse_date(s).unwrap()
    }

    const ZONES: &[Tz] = &[
        chrono_tz::America::New_York,
        chrono_tz::America::Los_Angeles,
        chrono_tz::Europe::Berlin,
        chrono_tz::Asia::Tokyo,
        chrono_tz::Australia::Lord_Howe,
        chrono_tz::Asia::Kolkata,
        chrono_tz::Pacific::Pago_Pago,
        chrono_tz::UTC,
    ];

    #[test]
    fn local_monday_just_after_midnight_starts_the_week() {
        let ny = chrono_tz::America::New_York;
        assert_eq!(week_start(utc("2025-05-19T04:30:00Z"), ny), date("2025-05-19"));
    }

    #[test]
    fn sunday_night_local_stays_in_previous_week() {
        let ny = chrono_tz::America::New_York;
        // 2025-05-25 23:00 EDT
        assert_eq!(week_start(utc("2025-05-26T03:00:00Z"), ny), date("2025-05-19"));
        // Same instant is already Monday in UTC
        assert_eq!(week_start(utc("2025-05-26T03:00:00Z"), chrono_tz::UTC), date("2025-05-26"));
    }

    #[test]
    fn next_report_after_spring_forward_uses_daylight_offset() {
        let ny = chrono_tz::America::New_York;
        let next = next_report_at_utc(date("2025-03-09"), ny);
        // Local midnight 2025-03-16 EDT (-04:00)
        assert_eq!(next, utc("2025-03-16T04:00:00Z"));
    }

    #[test]
    fn spring_forward_week_start_still_uses_standard_offset() {
        let ny = chrono_tz::America::New_York;
        let at = utc_from_local(date("2025-03-03"), ny, NaiveTime::MIN);
        assert_eq!(at, utc("2025-03-03T05:00:00Z"));
    }

    #[test]
    fn gap_time_lands_after_the_gap() {
        let ny = chrono_tz::America::New_York;
        let at = utc_from_local_str("2025-03-09", ny, "02:30:00").unwrap();
        // 03:30 EDT
        assert_eq!(at, utc("2025-03-09T07:30:00Z"));

        let berlin = chrono_tz::Europe::Berlin;
        let at = utc_from_local_str("2025-03-30", berlin, "02:30").unwrap();
        // 03:30 CEST
        assert_eq!(at, utc("2025-03-30T01:30:00Z"));
    }

    #[test]
    fn ambiguous_time_resolves_to_earlier_instant() {
        let ny = chrono_tz::America::New_York;
        let at = utc_from_local_str("2025-11-02", ny, "01:30:00").unwrap();
        // First 01:30, still EDT
        assert_eq!(at, utc("2025-11-02T05:30:00Z"));
    }

    #[test]
    fn local_moment_comparison() {
        let ny = chrono_tz::America::New_York;
        let target_date = date("2025-05-26");
        let target_time = NaiveTime::MIN;
        assert!(!has_reached_local_moment(target_date, target_time, ny, utc("2025-05-26T03:59:59Z")));
        assert!(has_reached_local_moment(target_date, target_time, ny, utc("2025-05-26T04:00:00Z")));
        assert!(has_reached_local_moment(target_date, target_time, ny, utc("2025-06-01T00:00:00Z")));
    }

    #[test]
    fn rejects_bad_inputs() {
        assert_eq!(
            parse_date("2025-13-01"),
            Err(ValidationError::InvalidDate("2025-13-01".into()))
        );
        assert!(parse_time("25:00").is_err());
        assert!(parse_timezone("Mars/Olympus_Mons").is_err());
        assert_eq!(parse_timezone("Europe/Paris").unwrap(), chrono_tz::Europe::Paris);
    }

    #[test]
    fn timezone_or_falls_back() {
        let default = chrono_tz::Asia::Tokyo;
        assert_eq!(timezone_or(None, default), default);
        assert_eq!(timezone_or(Some(""), default), default);
        assert_eq!(timezone_or(Some("Not/AZone"), default), default);
        assert_eq!(timezone_or(Some("UTC"), default), chrono_tz::UTC);
    }

    #[test]
    fn resolver_falls_back_when_store_fails() {
        use crate::error::StoreError;
        use crate::tags::TagSyncState;

        struct LockedProfiles;
        impl ProfileStore for LockedProfiles {
            fn profile_timezone(&self, _u: &str) -> Result<Option<String>, StoreError> {
                Err(StoreError::Locked)
            }
            fn set_profile_timezone(&self, _u: &str, _tz: &str, _now: DateTime<Utc>) -> Result<(), StoreError> {
                Err(StoreError::Locked)
            }
            fn tag_sync_state(&self, _u: &str) -> Result<Option<TagSyncState>, StoreError> {
                Err(StoreError::Locked)
            }
            fn insert_tag_sync_state(&self, _s: &TagSyncState) -> Result<(), StoreError> {
                Err(StoreError::Locked)
            }
            fn update_tag_sync_state(&self, _s: &TagSyncState) -> Result<(), StoreError> {
                Err(StoreError::Locked)
            }
            fn touch_tag_sync_checked(&self, _u: &str, _at: DateTime<Utc>) -> Result<(), StoreError> {
                Err(StoreError::Locked)
            }
        }

        let resolver = TimezoneResolver::new(chrono_tz::Europe::Berlin);
        assert_eq!(resolver.resolve(&LockedProfiles, "u1"), chrono_tz::Europe::Berlin);
        assert_eq!(TimezoneResolver::default().resolve(&LockedProfiles, "u1"), DEFAULT_TIMEZONE);
    }

    proptest! {
        #[test]
        fn week_start_is_a_local_monday_containing_the_instant(
            secs in 0i64..4_102_444_800,
            zone in 0usize..ZONES.len(),
        ) {
            let tz = ZONES[zone];
            let instant = Utc.timestamp_opt(secs, 0).unwrap();
            let start = week_start(instant, tz);
            let local = instant.with_timezone(&tz).date_naive();
            prop_assert_eq!(start.weekday(), Weekday::Mon);
            prop_assert!(start <= local);
            prop_assert!(local < next_week_start(start));
        }

        #[test]
        fn next_week_start_is_exactly_seven_days(
            secs in 0i64..4_102_444_800,
            zone in 0usize..ZONES.len(),
        ) {
            let start = week_start(Utc.timestamp_opt(secs, 0).unwrap(), ZONES[zone]);
            let next = next_week_start(start);
            prop_assert_eq!((next - start).num_days(), 7);
            prop_assert_eq!(next.weekday(), Weekday::Mon);
        }

        #[test]
        fn next_report_is_local_midnight(
            secs in 0i64..4_102_444_800,
            zone in 0usize..ZONES.len(),
        ) {
            let tz = ZONES[zone];
            let start = week_start(Utc.timestamp_opt(secs, 0).unwrap(), tz);
            let report = next_report_at_utc(start, tz).with_timezone(&tz);
            prop_assert_eq!(report.date_naive(), next_week_start(start));
        }
    }
}
