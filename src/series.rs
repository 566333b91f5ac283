use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::condition::Condition;
use crate::cycling::CyclingState;
use crate::errors::EngineError;
use crate::pattern::Pattern;

/// Inclusive time-of-day window a flexible instance may be placed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeWindow {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.start > self.end {
            return Err(EngineError::Validation(
                "time window start after end".into(),
            ));
        }
        Ok(())
    }
}

/// Ideal placement for each instance: a time of day, or none at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScheduleTime {
    AllDay,
    At(NaiveTime),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum AdaptiveMode {
    LastN { n: u32 },
    WindowDays { days: u32 },
}

/// Duration derived from completion history instead of a fixed figure.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdaptiveConfig {
    pub mode: AdaptiveMode,
    /// Minutes used when no history is available; at least 1.
    pub fallback: u32,
    /// Strictly positive scale applied to the historical mean.
    pub multiplier: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<u32>,
}

impl AdaptiveConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        match self.mode {
            AdaptiveMode::LastN { n } if n == 0 => {
                return Err(EngineError::Validation("adaptive lastN must be at least 1".into()))
            }
            AdaptiveMode::WindowDays { days } if days == 0 => {
                return Err(EngineError::Validation(
                    "adaptive window must be at least 1 day".into(),
                ))
            }
            _ => {}
        }
        if self.fallback == 0 {
            return Err(EngineError::Validation(
                "adaptive fallback must be at least 1 minute".into(),
            ));
        }
        if self.multiplier <= 0.0 {
            return Err(EngineError::Validation(
                "adaptive multiplier must be positive".into(),
            ));
        }
        if let (Some(minimum), Some(maximum)) = (self.minimum, self.maximum) {
            if minimum > maximum {
                return Err(EngineError::Validation(
                    "adaptive minimum exceeds maximum".into(),
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum DurationSpec {
    Fixed { minutes: u32 },
    Adaptive(AdaptiveConfig),
}

impl DurationSpec {
    pub fn validate(&self) -> Result<(), EngineError> {
        match self {
            DurationSpec::Fixed { minutes } => {
                if *minutes == 0 {
                    return Err(EngineError::Validation(
                        "duration must be at least 1 minute".into(),
                    ));
                }
                Ok(())
            }
            DurationSpec::Adaptive(config) => config.validate(),
        }
    }
}

/// A recurring obligation; the root aggregate of the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Series {
    pub id: Uuid,
    pub title: String,
    pub start_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    pub pattern: Pattern,
    pub time: ScheduleTime,
    pub duration: DurationSpec,
    /// Reflow may never move a fixed series off its ideal time.
    #[serde(default)]
    pub fixed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_window: Option<TimeWindow>,
    #[serde(default)]
    pub days_before: u32,
    #[serde(default)]
    pub days_after: u32,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cycling: Option<CyclingState>,
    #[serde(default)]
    pub locked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Series {
    pub fn new(
        title: impl Into<String>,
        start_date: NaiveDate,
        pattern: Pattern,
        time: ScheduleTime,
        duration: DurationSpec,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            start_date,
            end_date: None,
            pattern,
            time,
            duration,
            fixed: false,
            time_window: None,
            days_before: 0,
            days_after: 0,
            tags: BTreeSet::new(),
            condition: None,
            cycling: None,
            locked: false,
            count: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_end_date(mut self, end_date: NaiveDate) -> Self {
        self.end_date = Some(end_date);
        self
    }

    pub fn with_fixed(mut self, fixed: bool) -> Self {
        self.fixed = fixed;
        self
    }

    pub fn with_time_window(mut self, window: TimeWindow) -> Self {
        self.time_window = Some(window);
        self
    }

    pub fn with_wiggle(mut self, days_before: u32, days_after: u32) -> Self {
        self.days_before = days_before;
        self.days_after = days_after;
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn with_cycling(mut self, cycling: CyclingState) -> Self {
        self.cycling = Some(cycling);
        self
    }

    pub fn with_count(mut self, count: u32) -> Self {
        self.count = Some(count);
        self
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.title.trim().is_empty() {
            return Err(EngineError::Validation("series title must not be empty".into()));
        }
        if let Some(end_date) = self.end_date {
            if self.start_date > end_date {
                return Err(EngineError::Validation(
                    "series start date after end date".into(),
                ));
            }
        }
        self.pattern.validate()?;
        self.duration.validate()?;
        if let Some(window) = &self.time_window {
            window.validate()?;
        }
        if let Some(cycling) = &self.cycling {
            cycling.validate()?;
        }
        Ok(())
    }

    pub fn is_all_day(&self) -> bool {
        matches!(self.time, ScheduleTime::AllDay)
    }
}

/// Field-wise update for `updateSeries`; absent fields keep their value.
#[derive(Debug, Clone, Default)]
pub struct SeriesPatch {
    pub title: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<Option<NaiveDate>>,
    pub pattern: Option<Pattern>,
    pub time: Option<ScheduleTime>,
    pub duration: Option<DurationSpec>,
    pub fixed: Option<bool>,
    pub time_window: Option<Option<TimeWindow>>,
    pub days_before: Option<u32>,
    pub days_after: Option<u32>,
    pub tags: Option<BTreeSet<String>>,
    pub condition: Option<Option<Condition>>,
    pub cycling: Option<Option<CyclingState>>,
    pub count: Option<Option<u32>>,
}

impl SeriesPatch {
    pub(crate) fn apply(self, series: &mut Series) {
        if let Some(title) = self.title {
            series.title = title;
        }
        if let Some(start_date) = self.start_date {
            series.start_date = start_date;
        }
        if let Some(end_date) = self.end_date {
            series.end_date = end_date;
        }
        if let Some(pattern) = self.pattern {
            series.pattern = pattern;
        }
        if let Some(time) = self.time {
            series.time = time;
        }
        if let Some(duration) = self.duration {
            series.duration = duration;
        }
        if let Some(fixed) = self.fixed {
            series.fixed = fixed;
        }
        if let Some(time_window) = self.time_window {
            series.time_window = time_window;
        }
        if let Some(days_before) = self.days_before {
            series.days_before = days_before;
        }
        if let Some(days_after) = self.days_after {
            series.days_after = days_after;
        }
        if let Some(tags) = self.tags {
            series.tags = tags;
        }
        if let Some(condition) = self.condition {
            series.condition = condition;
        }
        if let Some(cycling) = self.cycling {
            series.cycling = cycling;
        }
        if let Some(count) = self.count {
            series.count = count;
        }
    }
}

/// Per-date override of a single instance, keyed by (series, date).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum InstanceException {
    Cancelled,
    Rescheduled { new_time: NaiveDateTime },
    Completed { completion_id: Uuid },
}
