//! Rendered views over the materialized schedule: the day/window overview
//! with resolved titles, and per-series summaries.
//!
//! These queries are read-only and deterministic; cycling resolution happens
//! here, at render time, never inside reflow.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::calendar::days_between;
use crate::errors::EngineError;
use crate::reflow::instances::generate_instances;
use crate::series::InstanceException;
use crate::store::Planner;

const PENDING_WINDOW_DAYS: i64 = 7;

/// Coarse urgency of a scheduled instance relative to a reference date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScheduledStatus {
    Overdue,
    Pending,
    Future,
    Done,
}

impl ScheduledStatus {
    fn classify(scheduled: NaiveDate, reference: NaiveDate, completed: bool) -> ScheduledStatus {
        if completed {
            return ScheduledStatus::Done;
        }
        if scheduled < reference {
            return ScheduledStatus::Overdue;
        }
        if scheduled <= reference + Duration::days(PENDING_WINDOW_DAYS) {
            ScheduledStatus::Pending
        } else {
            ScheduledStatus::Future
        }
    }
}

/// One row of the rendered schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverviewEntry {
    pub series_id: Uuid,
    pub instance_date: NaiveDate,
    /// Cycling-resolved display title.
    pub title: String,
    pub ideal_time: NaiveDateTime,
    pub duration_minutes: u32,
    pub all_day: bool,
    pub status: ScheduledStatus,
}

/// Standing state of one series as of a reference date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesSummary {
    pub series_id: Uuid,
    pub title: String,
    pub last_completed: Option<NaiveDate>,
    pub days_since_last: Option<i64>,
    pub next_due: Option<NaiveDate>,
    pub total_completions: usize,
    pub cancelled_instances: usize,
}

impl Planner {
    /// Materializes the window and renders each instance with its resolved
    /// title and urgency. Rows come back in (date, series) order.
    pub fn overview(
        &self,
        reference: NaiveDate,
        window_start: NaiveDate,
        window_end: NaiveDate,
    ) -> Result<Vec<OverviewEntry>, EngineError> {
        if window_start > window_end {
            return Err(EngineError::InvalidRange(format!(
                "window start {} after window end {}",
                window_start, window_end
            )));
        }
        let instances = generate_instances(self.snapshot(), window_start, window_end)?;
        let mut entries = Vec::with_capacity(instances.len());
        for instance in instances {
            let completed = self
                .completion_for(instance.series_id, instance.instance_date)
                .is_some();
            entries.push(OverviewEntry {
                series_id: instance.series_id,
                instance_date: instance.instance_date,
                title: self.resolved_title(instance.series_id, instance.instance_date)?,
                ideal_time: instance.ideal_time,
                duration_minutes: instance.duration,
                all_day: instance.all_day,
                status: ScheduledStatus::classify(instance.instance_date, reference, completed),
            });
        }
        Ok(entries)
    }

    /// Standing summary of one series: completion recency and the next date
    /// its pattern generates on or after the reference.
    pub fn series_summary(
        &self,
        series_id: Uuid,
        reference: NaiveDate,
    ) -> Result<SeriesSummary, EngineError> {
        let series = self
            .series(series_id)
            .ok_or(EngineError::SeriesNotFound(series_id))?;
        let mut completion_dates: Vec<NaiveDate> = self
            .completions
            .iter()
            .filter(|completion| completion.series_id == series_id)
            .map(|completion| completion.instance_date)
            .collect();
        completion_dates.sort();
        let last_completed = completion_dates.last().copied();
        let cancelled_instances = self
            .exceptions
            .iter()
            .filter(|record| {
                record.series_id == series_id
                    && matches!(record.exception, InstanceException::Cancelled)
            })
            .count();

        Ok(SeriesSummary {
            series_id,
            title: series.title.clone(),
            last_completed,
            days_since_last: last_completed
                .filter(|date| *date <= reference)
                .map(|date| days_between(date, reference)),
            next_due: self.next_due(series_id, reference)?,
            total_completions: completion_dates.len(),
            cancelled_instances,
        })
    }

    /// First non-cancelled generated date on or after `reference`, if the
    /// series still has one.
    fn next_due(
        &self,
        series_id: Uuid,
        reference: NaiveDate,
    ) -> Result<Option<NaiveDate>, EngineError> {
        let series = self
            .series(series_id)
            .ok_or(EngineError::SeriesNotFound(series_id))?;
        let opts = crate::pattern::ExpandOptions {
            end_date: series.end_date,
            count: series.count,
        };
        // Five years of lookahead bounds open-ended patterns.
        let horizon = reference + Duration::days(365 * 5);
        let dates = series
            .pattern
            .expand(series.start_date, horizon, series.start_date, &opts)?;
        Ok(dates.into_iter().find(|date| {
            *date >= reference
                && !matches!(
                    self.exception_for(series_id, *date),
                    Some(InstanceException::Cancelled)
                )
        }))
    }
}
