//! Completion history and the windowed queries built on it.
//!
//! A completion is an immutable record that an instance was performed. The
//! queries here feed condition evaluation and adaptive duration; they are
//! plain functions over slices so reflow can run them against any snapshot.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::calendar::{add_days, days_between, minutes_between};
use crate::errors::EngineError;
use crate::series::{AdaptiveConfig, AdaptiveMode, Series};

/// Immutable record of a performed instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Completion {
    pub id: Uuid,
    pub series_id: Uuid,
    pub instance_date: NaiveDate,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub duration_minutes: u32,
    pub created_at: DateTime<Utc>,
}

impl Completion {
    /// Validates the time range and derives the duration. The id and audit
    /// stamp are assigned here; the caller only supplies observed times.
    pub fn new(
        series_id: Uuid,
        instance_date: NaiveDate,
        start_time: NaiveDateTime,
        end_time: NaiveDateTime,
    ) -> Result<Self, EngineError> {
        if end_time < start_time {
            return Err(EngineError::InvalidTimeRange);
        }
        Ok(Self {
            id: Uuid::new_v4(),
            series_id,
            instance_date,
            start_time,
            end_time,
            duration_minutes: minutes_between(start_time, end_time) as u32,
            created_at: Utc::now(),
        })
    }
}

/// Query target: one series, or every series carrying a tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged, rename_all = "camelCase")]
pub enum Target {
    Series {
        #[serde(rename = "seriesId")]
        series_id: Uuid,
    },
    Tag {
        tag: String,
    },
}

impl Target {
    pub fn series(series_id: Uuid) -> Self {
        Target::Series { series_id }
    }

    pub fn tag(tag: impl Into<String>) -> Self {
        Target::Tag { tag: tag.into() }
    }
}

/// Expands a target to a sorted list of series ids at query time.
pub fn resolve_target(series: &[Series], target: &Target) -> Vec<Uuid> {
    let mut ids: Vec<Uuid> = match target {
        Target::Series { series_id } => series
            .iter()
            .filter(|candidate| candidate.id == *series_id)
            .map(|candidate| candidate.id)
            .collect(),
        Target::Tag { tag } => series
            .iter()
            .filter(|candidate| candidate.tags.contains(tag))
            .map(|candidate| candidate.id)
            .collect(),
    };
    ids.sort();
    ids
}

/// Count of completions in the inclusive window `[as_of − days + 1, as_of]`.
pub fn count_in_window(
    series: &[Series],
    completions: &[Completion],
    target: &Target,
    window_days: u32,
    as_of: NaiveDate,
) -> usize {
    let ids = resolve_target(series, target);
    let window_start = add_days(as_of, -i64::from(window_days) + 1);
    completions
        .iter()
        .filter(|completion| ids.contains(&completion.series_id))
        .filter(|completion| {
            completion.instance_date >= window_start && completion.instance_date <= as_of
        })
        .count()
}

/// Whole days since the most recent completion on or before `as_of`, or
/// `None` when the resolved series have no history yet.
pub fn days_since_last_completion(
    series: &[Series],
    completions: &[Completion],
    target: &Target,
    as_of: NaiveDate,
) -> Option<i64> {
    let ids = resolve_target(series, target);
    completions
        .iter()
        .filter(|completion| ids.contains(&completion.series_id))
        .filter(|completion| completion.instance_date <= as_of)
        .map(|completion| completion.instance_date)
        .max()
        .map(|latest| days_between(latest, as_of))
}

/// Durations feeding the adaptive calculation, newest first.
pub fn durations_for_adaptive(
    completions: &[Completion],
    series_id: Uuid,
    mode: AdaptiveMode,
    as_of: NaiveDate,
) -> Vec<u32> {
    let mut history: Vec<&Completion> = completions
        .iter()
        .filter(|completion| completion.series_id == series_id)
        .filter(|completion| completion.instance_date <= as_of)
        .collect();
    history.sort_by_key(|completion| std::cmp::Reverse(completion.instance_date));
    match mode {
        AdaptiveMode::LastN { n } => history
            .iter()
            .take(n as usize)
            .map(|completion| completion.duration_minutes)
            .collect(),
        AdaptiveMode::WindowDays { days } => {
            let window_start = add_days(as_of, -i64::from(days) + 1);
            history
                .iter()
                .filter(|completion| completion.instance_date >= window_start)
                .map(|completion| completion.duration_minutes)
                .collect()
        }
    }
}

/// Mean of the durations (rounded half-up), scaled, clamped, floored at 1.
/// Empty history falls back to the configured minutes.
pub fn calculate_adaptive_duration(config: &AdaptiveConfig, durations: &[u32]) -> u32 {
    if durations.is_empty() {
        return config.fallback.max(1);
    }
    let sum: u64 = durations.iter().map(|minutes| u64::from(*minutes)).sum();
    let mean = round_half_up(sum as f64 / durations.len() as f64);
    let mut value = round_half_up(mean as f64 * config.multiplier);
    if let Some(minimum) = config.minimum {
        value = value.max(minimum);
    }
    if let Some(maximum) = config.maximum {
        value = value.min(maximum);
    }
    value.max(1)
}

fn round_half_up(value: f64) -> u32 {
    (value + 0.5).floor() as u32
}
