//! Naive local calendar arithmetic shared by the whole engine.
//!
//! All dates and times are wall-clock values in a single configured zone.
//! The canonical string forms (`YYYY-MM-DD`, `HH:MM`, `YYYY-MM-DDTHH:MM:SS`)
//! are fixed-width, so lexicographic order matches chronological order.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Weekday};
use once_cell::sync::Lazy;

use crate::errors::EngineError;

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Parses a `YYYY-MM-DD` date, including the Gregorian leap rule.
pub fn parse_date(input: &str) -> Result<NaiveDate, EngineError> {
    NaiveDate::parse_from_str(input, DATE_FORMAT)
        .map_err(|_| EngineError::Validation(format!("invalid date `{}`", input)))
}

/// Parses `HH:MM` or `HH:MM:SS`; seconds are not used internally and must be zero.
pub fn parse_time(input: &str) -> Result<NaiveTime, EngineError> {
    let time = NaiveTime::parse_from_str(input, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(input, "%H:%M"))
        .map_err(|_| EngineError::Validation(format!("invalid time `{}`", input)))?;
    if time.second() != 0 {
        return Err(EngineError::Validation(format!(
            "time `{}` carries non-zero seconds",
            input
        )));
    }
    Ok(time)
}

/// Parses `YYYY-MM-DDTHH:MM:SS` (or the second-less `YYYY-MM-DDTHH:MM`).
pub fn parse_datetime(input: &str) -> Result<NaiveDateTime, EngineError> {
    let datetime = NaiveDateTime::parse_from_str(input, DATETIME_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M"))
        .map_err(|_| EngineError::Validation(format!("invalid datetime `{}`", input)))?;
    if datetime.time().second() != 0 {
        return Err(EngineError::Validation(format!(
            "datetime `{}` carries non-zero seconds",
            input
        )));
    }
    Ok(datetime)
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn format_datetime(datetime: NaiveDateTime) -> String {
    datetime.format(DATETIME_FORMAT).to_string()
}

pub fn add_days(date: NaiveDate, days: i64) -> NaiveDate {
    date + Duration::days(days)
}

/// Signed day count `b - a`; exclusive-on-right when used for ranges.
pub fn days_between(a: NaiveDate, b: NaiveDate) -> i64 {
    (b - a).num_days()
}

pub fn add_minutes(datetime: NaiveDateTime, minutes: i64) -> NaiveDateTime {
    datetime + Duration::minutes(minutes)
}

/// Signed minute count `b - a`.
pub fn minutes_between(a: NaiveDateTime, b: NaiveDateTime) -> i64 {
    (b - a).num_minutes()
}

pub fn at_midnight(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}

pub fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

pub fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 => {
            if is_leap_year(year) {
                29
            } else {
                28
            }
        }
        _ => 0,
    }
}

pub fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, days_in_month(year, month))
}

/// Numeric weekday under the exchange convention: 0=sun .. 6=sat.
pub fn weekday_index(weekday: Weekday) -> u8 {
    weekday.num_days_from_sunday() as u8
}

/// Inverse of [`weekday_index`]; 7 wraps to 0, anything above is rejected.
pub fn weekday_from_index(index: u8) -> Result<Weekday, EngineError> {
    match index {
        0 | 7 => Ok(Weekday::Sun),
        1 => Ok(Weekday::Mon),
        2 => Ok(Weekday::Tue),
        3 => Ok(Weekday::Wed),
        4 => Ok(Weekday::Thu),
        5 => Ok(Weekday::Fri),
        6 => Ok(Weekday::Sat),
        _ => Err(EngineError::Validation(format!(
            "weekday index {} out of range 0..=7",
            index
        ))),
    }
}

static WEEKDAY_NAMES: Lazy<Vec<(&'static str, Weekday)>> = Lazy::new(|| {
    vec![
        ("sun", Weekday::Sun),
        ("sunday", Weekday::Sun),
        ("mon", Weekday::Mon),
        ("monday", Weekday::Mon),
        ("tue", Weekday::Tue),
        ("tuesday", Weekday::Tue),
        ("wed", Weekday::Wed),
        ("wednesday", Weekday::Wed),
        ("thu", Weekday::Thu),
        ("thursday", Weekday::Thu),
        ("fri", Weekday::Fri),
        ("friday", Weekday::Fri),
        ("sat", Weekday::Sat),
        ("saturday", Weekday::Sat),
    ]
});

/// Accepts 3-letter and full English weekday names, case-insensitively.
pub fn weekday_from_name(name: &str) -> Result<Weekday, EngineError> {
    let lowered = name.to_ascii_lowercase();
    WEEKDAY_NAMES
        .iter()
        .find(|(candidate, _)| *candidate == lowered)
        .map(|(_, weekday)| *weekday)
        .ok_or_else(|| EngineError::Validation(format!("unknown weekday `{}`", name)))
}
