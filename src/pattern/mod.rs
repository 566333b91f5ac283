//! Recurrence pattern algebra.
//!
//! A [`Pattern`] is a declarative rule over calendar dates, closed under
//! union and except. Expansion over a half-open range is pure: same inputs,
//! same ordered duplicate-free output.

use chrono::{Datelike, NaiveDate, Weekday};

use crate::calendar::{add_days, days_between, days_in_month, weekday_index};
use crate::errors::EngineError;

mod exchange;

pub use exchange::PatternSpec;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pattern {
    Daily,
    EveryNDays {
        n: u32,
    },
    /// Weekday defaults to the series start's weekday when absent.
    Weekly {
        weekday: Option<Weekday>,
    },
    EveryNWeeks {
        n: u32,
        weekday: Option<Weekday>,
    },
    /// Months without the day are skipped, never coerced.
    Monthly {
        day: u32,
    },
    LastDayOfMonth,
    /// Month and day default to the series start's when absent.
    Yearly {
        month: Option<u32>,
        day: Option<u32>,
    },
    Weekdays {
        days: Vec<Weekday>,
    },
    WeekdaysOnly,
    WeekendsOnly,
    NthWeekdayOfMonth {
        n: u32,
        weekday: Weekday,
    },
    LastWeekdayOfMonth {
        weekday: Weekday,
    },
    NthToLastWeekdayOfMonth {
        n: u32,
        weekday: Weekday,
    },
    Union {
        patterns: Vec<Pattern>,
    },
    Except {
        base: Box<Pattern>,
        exceptions: Vec<Pattern>,
    },
}

/// Series-level bounds applied after raw pattern matching.
#[derive(Debug, Clone, Default)]
pub struct ExpandOptions {
    /// Exclusive series end bound.
    pub end_date: Option<NaiveDate>,
    /// Keep only the first `count` emitted dates.
    pub count: Option<u32>,
}

impl Pattern {
    /// Checks every domain precondition; deserialized patterns go through this
    /// before they are accepted into a series.
    pub fn validate(&self) -> Result<(), EngineError> {
        match self {
            Pattern::Daily
            | Pattern::Weekly { .. }
            | Pattern::LastDayOfMonth
            | Pattern::WeekdaysOnly
            | Pattern::WeekendsOnly
            | Pattern::LastWeekdayOfMonth { .. } => Ok(()),
            Pattern::EveryNDays { n } | Pattern::EveryNWeeks { n, .. } => {
                if *n == 0 {
                    return Err(EngineError::InvalidPattern(
                        "interval n must be at least 1".into(),
                    ));
                }
                Ok(())
            }
            Pattern::Monthly { day } => check_day_of_month(*day),
            Pattern::Yearly { month, day } => {
                if let Some(month) = month {
                    if !(1..=12).contains(month) {
                        return Err(EngineError::InvalidPattern(format!(
                            "month {} outside 1..=12",
                            month
                        )));
                    }
                }
                if let Some(day) = day {
                    check_day_of_month(*day)?;
                }
                Ok(())
            }
            Pattern::Weekdays { days } => {
                if days.is_empty() {
                    return Err(EngineError::InvalidPattern(
                        "weekday set must not be empty".into(),
                    ));
                }
                Ok(())
            }
            Pattern::NthWeekdayOfMonth { n, .. } | Pattern::NthToLastWeekdayOfMonth { n, .. } => {
                if !(1..=5).contains(n) {
                    return Err(EngineError::InvalidPattern(format!(
                        "occurrence index {} outside 1..=5",
                        n
                    )));
                }
                Ok(())
            }
            Pattern::Union { patterns } => patterns.iter().try_for_each(Pattern::validate),
            Pattern::Except { base, exceptions } => {
                base.validate()?;
                exceptions.iter().try_for_each(Pattern::validate)
            }
        }
    }

    /// Expands the pattern over `[range_start, range_end)`.
    ///
    /// Raw matching is restricted to `series_start ≤ d < opts.end_date`, then
    /// to the range, then truncated to `opts.count`. The result is ascending
    /// and duplicate-free.
    pub fn expand(
        &self,
        range_start: NaiveDate,
        range_end: NaiveDate,
        series_start: NaiveDate,
        opts: &ExpandOptions,
    ) -> Result<Vec<NaiveDate>, EngineError> {
        if range_start > range_end {
            return Err(EngineError::InvalidRange(format!(
                "range start {} after range end {}",
                range_start, range_end
            )));
        }
        self.validate()?;

        let mut upper = range_end;
        if let Some(end_date) = opts.end_date {
            upper = upper.min(end_date);
        }
        let mut dates = Vec::new();
        let mut day = range_start.max(series_start);
        while day < upper {
            if self.matches(day, series_start) {
                dates.push(day);
                if let Some(count) = opts.count {
                    if dates.len() as u32 >= count {
                        break;
                    }
                }
            }
            day = add_days(day, 1);
        }
        Ok(dates)
    }

    /// Pure membership test against a single date. Series bounds are the
    /// caller's concern; this only encodes the rule itself.
    fn matches(&self, date: NaiveDate, series_start: NaiveDate) -> bool {
        match self {
            Pattern::Daily => true,
            Pattern::EveryNDays { n } => days_between(series_start, date) % i64::from(*n) == 0,
            Pattern::Weekly { weekday } => {
                date.weekday() == weekday.unwrap_or_else(|| series_start.weekday())
            }
            Pattern::EveryNWeeks { n, weekday } => {
                let weekday = weekday.unwrap_or_else(|| series_start.weekday());
                let anchor = first_weekday_on_or_after(series_start, weekday);
                let offset = days_between(anchor, date);
                offset >= 0 && offset % i64::from(7 * n) == 0
            }
            Pattern::Monthly { day } => date.day() == *day,
            Pattern::LastDayOfMonth => date.day() == days_in_month(date.year(), date.month()),
            Pattern::Yearly { month, day } => {
                let month = month.unwrap_or_else(|| series_start.month());
                let day = day.unwrap_or_else(|| series_start.day());
                date.month() == month && date.day() == day
            }
            Pattern::Weekdays { days } => days.contains(&date.weekday()),
            Pattern::WeekdaysOnly => !is_weekend(date.weekday()),
            Pattern::WeekendsOnly => is_weekend(date.weekday()),
            Pattern::NthWeekdayOfMonth { n, weekday } => {
                date.weekday() == *weekday && (date.day() - 1) / 7 == n - 1
            }
            Pattern::LastWeekdayOfMonth { weekday } => {
                date.weekday() == *weekday
                    && date.day() + 7 > days_in_month(date.year(), date.month())
            }
            Pattern::NthToLastWeekdayOfMonth { n, weekday } => {
                date.weekday() == *weekday
                    && (days_in_month(date.year(), date.month()) - date.day()) / 7 == n - 1
            }
            Pattern::Union { patterns } => patterns
                .iter()
                .any(|pattern| pattern.matches(date, series_start)),
            Pattern::Except { base, exceptions } => {
                base.matches(date, series_start)
                    && !exceptions
                        .iter()
                        .any(|pattern| pattern.matches(date, series_start))
            }
        }
    }
}

fn check_day_of_month(day: u32) -> Result<(), EngineError> {
    if !(1..=31).contains(&day) {
        return Err(EngineError::InvalidPattern(format!(
            "day {} outside 1..=31",
            day
        )));
    }
    Ok(())
}

fn is_weekend(weekday: Weekday) -> bool {
    matches!(weekday, Weekday::Sat | Weekday::Sun)
}

fn first_weekday_on_or_after(date: NaiveDate, weekday: Weekday) -> NaiveDate {
    let gap = (7 + i64::from(weekday_index(weekday)) - i64::from(weekday_index(date.weekday()))) % 7;
    add_days(date, gap)
}

/// Sorts and deduplicates a weekday list into canonical 0=sun order.
pub fn normalize_weekdays(days: &mut Vec<Weekday>) {
    days.sort_by_key(|day| weekday_index(*day));
    days.dedup();
}
