use chrono::{Datelike, Duration, NaiveDate};

/// ISO-8601 week key (`YYYY-WW`) for the week containing `date`.
///
/// The ISO year is the calendar year of that week's Thursday; week 1 is
/// the week holding the year's first Thursday.
pub fn iso_week_key(date: NaiveDate) -> String {
    let from_monday = i64::from(date.weekday().num_days_from_monday());
    let thursday = date + Duration::days(3 - from_monday);
    let iso_year = thursday.year();

    let ordinal0 = i64::from(thursday.ordinal0());
    // Thursday is weekday 3; walk back to January 1st of the ISO year.
    let jan1_weekday = (3 - ordinal0).rem_euclid(7);
    let first_thursday = (3 - jan1_weekday).rem_euclid(7);
    let week = 1 + (ordinal0 - first_thursday) / 7;

    format!("{iso_year:04}-{week:02}")
}
