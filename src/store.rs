//! The root aggregate and command surface.
//!
//! A [`Planner`] owns every table the engine reads: series, completions,
//! instance exceptions, links, and relational constraints. Commands validate
//! eagerly and return a typed error before the first field is written, so a
//! failed call leaves the aggregate untouched.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::completion::{
    calculate_adaptive_duration, count_in_window, days_since_last_completion,
    durations_for_adaptive, Completion, Target,
};
use crate::errors::EngineError;
use crate::links::{check_new_link, Link, LinkSpec};
use crate::pattern::ExpandOptions;
use crate::reflow::constraints::RelationalConstraint;
use crate::series::{InstanceException, Series, SeriesPatch};

pub const CURRENT_SCHEMA_VERSION: u8 = 1;

/// One per-date override, keyed by (series, date).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionRecord {
    pub series_id: Uuid,
    pub instance_date: NaiveDate,
    pub exception: InstanceException,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Planner {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub series: Vec<Series>,
    #[serde(default)]
    pub completions: Vec<Completion>,
    #[serde(default)]
    pub exceptions: Vec<ExceptionRecord>,
    #[serde(default)]
    pub links: Vec<Link>,
    #[serde(default)]
    pub constraints: Vec<RelationalConstraint>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default = "Planner::schema_version_default")]
    pub schema_version: u8,
}

impl Planner {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            series: Vec::new(),
            completions: Vec::new(),
            exceptions: Vec::new(),
            links: Vec::new(),
            constraints: Vec::new(),
            created_at: now,
            updated_at: now,
            schema_version: CURRENT_SCHEMA_VERSION,
        }
    }

    fn schema_version_default() -> u8 {
        CURRENT_SCHEMA_VERSION
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    // ── lookups ─────────────────────────────────────────────────────────

    pub fn series(&self, id: Uuid) -> Option<&Series> {
        self.series.iter().find(|series| series.id == id)
    }

    fn series_mut(&mut self, id: Uuid) -> Option<&mut Series> {
        self.series.iter_mut().find(|series| series.id == id)
    }

    fn series_required(&self, id: Uuid) -> Result<&Series, EngineError> {
        self.series(id).ok_or(EngineError::SeriesNotFound(id))
    }

    fn unlocked_required(&self, id: Uuid) -> Result<&Series, EngineError> {
        let series = self.series_required(id)?;
        if series.locked {
            return Err(EngineError::Locked(id));
        }
        Ok(series)
    }

    pub fn completion(&self, id: Uuid) -> Result<&Completion, EngineError> {
        self.completions
            .iter()
            .find(|completion| completion.id == id)
            .ok_or(EngineError::CompletionNotFound(id))
    }

    pub fn completion_for(&self, series_id: Uuid, instance_date: NaiveDate) -> Option<&Completion> {
        self.completions
            .iter()
            .find(|completion| {
                completion.series_id == series_id && completion.instance_date == instance_date
            })
    }

    pub fn exception_for(
        &self,
        series_id: Uuid,
        instance_date: NaiveDate,
    ) -> Option<&InstanceException> {
        self.exceptions
            .iter()
            .find(|record| {
                record.series_id == series_id && record.instance_date == instance_date
            })
            .map(|record| &record.exception)
    }

    fn set_exception(
        &mut self,
        series_id: Uuid,
        instance_date: NaiveDate,
        exception: InstanceException,
    ) {
        if let Some(record) = self.exceptions.iter_mut().find(|record| {
            record.series_id == series_id && record.instance_date == instance_date
        }) {
            record.exception = exception;
        } else {
            self.exceptions.push(ExceptionRecord {
                series_id,
                instance_date,
                exception,
            });
        }
    }

    fn clear_exception(&mut self, series_id: Uuid, instance_date: NaiveDate) {
        self.exceptions.retain(|record| {
            record.series_id != series_id || record.instance_date != instance_date
        });
    }

    pub fn link_for_child(&self, child_id: Uuid) -> Option<&Link> {
        self.links.iter().find(|link| link.child_id == child_id)
    }

    pub fn links_for_parent(&self, parent_id: Uuid) -> Vec<&Link> {
        self.links
            .iter()
            .filter(|link| link.parent_id == parent_id)
            .collect()
    }

    // ── series commands ─────────────────────────────────────────────────

    pub fn create_series(&mut self, series: Series) -> Result<Uuid, EngineError> {
        series.validate()?;
        if self.series(series.id).is_some() {
            return Err(EngineError::Validation(format!(
                "series id {} already exists",
                series.id
            )));
        }
        let id = series.id;
        info!(series = %id, title = %series.title, "series created");
        self.series.push(series);
        self.touch();
        Ok(id)
    }

    pub fn update_series(&mut self, id: Uuid, patch: SeriesPatch) -> Result<(), EngineError> {
        let current = self.unlocked_required(id)?;
        let mut updated = current.clone();
        patch.apply(&mut updated);
        updated.updated_at = Utc::now();
        updated.validate()?;
        *self.series_mut(id).expect("series checked above") = updated;
        self.touch();
        Ok(())
    }

    pub fn delete_series(&mut self, id: Uuid) -> Result<(), EngineError> {
        self.unlocked_required(id)?;
        if !self.links_for_parent(id).is_empty() {
            return Err(EngineError::LinkedChildrenExist(id));
        }
        self.series.retain(|series| series.id != id);
        self.completions.retain(|completion| completion.series_id != id);
        self.exceptions.retain(|record| record.series_id != id);
        self.links.retain(|link| link.child_id != id);
        self.constraints.retain(|constraint| !constraint.mentions_series(id));
        info!(series = %id, "series deleted");
        self.touch();
        Ok(())
    }

    pub fn lock_series(&mut self, id: Uuid) -> Result<(), EngineError> {
        self.series_required(id)?;
        self.series_mut(id).expect("series checked above").locked = true;
        self.touch();
        Ok(())
    }

    pub fn unlock_series(&mut self, id: Uuid) -> Result<(), EngineError> {
        self.series_required(id)?;
        self.series_mut(id).expect("series checked above").locked = false;
        self.touch();
        Ok(())
    }

    // ── completion commands ─────────────────────────────────────────────

    pub fn log_completion(
        &mut self,
        series_id: Uuid,
        instance_date: NaiveDate,
        start_time: NaiveDateTime,
        end_time: NaiveDateTime,
    ) -> Result<Uuid, EngineError> {
        self.series_required(series_id)?;
        if self.completion_for(series_id, instance_date).is_some() {
            return Err(EngineError::DuplicateCompletion {
                series_id,
                instance_date,
            });
        }
        let completion = Completion::new(series_id, instance_date, start_time, end_time)?;
        let id = completion.id;
        self.completions.push(completion);
        self.set_exception(
            series_id,
            instance_date,
            InstanceException::Completed { completion_id: id },
        );
        info!(series = %series_id, date = %instance_date, "completion logged");
        self.touch();
        Ok(id)
    }

    pub fn delete_completion(&mut self, id: Uuid) -> Result<(), EngineError> {
        let completion = self.completion(id)?;
        let series_id = completion.series_id;
        let instance_date = completion.instance_date;
        self.completions.retain(|completion| completion.id != id);
        if matches!(
            self.exception_for(series_id, instance_date),
            Some(InstanceException::Completed { completion_id }) if *completion_id == id
        ) {
            self.clear_exception(series_id, instance_date);
        }
        self.touch();
        Ok(())
    }

    // ── instance exception commands ─────────────────────────────────────

    pub fn cancel_instance(
        &mut self,
        series_id: Uuid,
        instance_date: NaiveDate,
    ) -> Result<(), EngineError> {
        self.unlocked_required(series_id)?;
        if matches!(
            self.exception_for(series_id, instance_date),
            Some(InstanceException::Completed { .. })
        ) {
            return Err(EngineError::Validation(
                "cannot cancel a completed instance".into(),
            ));
        }
        self.set_exception(series_id, instance_date, InstanceException::Cancelled);
        self.touch();
        Ok(())
    }

    pub fn restore_instance(
        &mut self,
        series_id: Uuid,
        instance_date: NaiveDate,
    ) -> Result<(), EngineError> {
        self.unlocked_required(series_id)?;
        match self.exception_for(series_id, instance_date) {
            Some(InstanceException::Cancelled) => {
                self.clear_exception(series_id, instance_date);
                self.touch();
                Ok(())
            }
            _ => Err(EngineError::RestoreNotCancelled {
                series_id,
                instance_date,
            }),
        }
    }

    pub fn reschedule_instance(
        &mut self,
        series_id: Uuid,
        instance_date: NaiveDate,
        new_time: NaiveDateTime,
    ) -> Result<(), EngineError> {
        self.unlocked_required(series_id)?;
        match self.exception_for(series_id, instance_date) {
            Some(InstanceException::Cancelled) => Err(EngineError::RescheduleCancelled {
                series_id,
                instance_date,
            }),
            Some(InstanceException::Completed { .. }) => Err(EngineError::Validation(
                "cannot reschedule a completed instance".into(),
            )),
            _ => {
                self.set_exception(
                    series_id,
                    instance_date,
                    InstanceException::Rescheduled { new_time },
                );
                self.touch();
                Ok(())
            }
        }
    }

    // ── link commands ───────────────────────────────────────────────────

    pub fn link_series(
        &mut self,
        parent_id: Uuid,
        child_id: Uuid,
        spec: LinkSpec,
    ) -> Result<Uuid, EngineError> {
        self.unlocked_required(parent_id)?;
        self.unlocked_required(child_id)?;
        check_new_link(&self.links, parent_id, child_id)?;
        let link = Link::new(parent_id, child_id, spec);
        let id = link.id;
        info!(parent = %parent_id, child = %child_id, "series linked");
        self.links.push(link);
        self.touch();
        Ok(id)
    }

    pub fn unlink_series(&mut self, child_id: Uuid) -> Result<(), EngineError> {
        self.unlocked_required(child_id)?;
        if self.link_for_child(child_id).is_none() {
            return Err(EngineError::NoLink(child_id));
        }
        self.links.retain(|link| link.child_id != child_id);
        self.touch();
        Ok(())
    }

    pub fn update_link(&mut self, child_id: Uuid, spec: LinkSpec) -> Result<(), EngineError> {
        self.unlocked_required(child_id)?;
        let link = self
            .links
            .iter_mut()
            .find(|link| link.child_id == child_id)
            .ok_or(EngineError::NoLink(child_id))?;
        link.target_distance = spec.target_distance;
        link.early_wobble = spec.early_wobble;
        link.late_wobble = spec.late_wobble;
        self.touch();
        Ok(())
    }

    // ── constraint commands ─────────────────────────────────────────────

    pub fn add_constraint(&mut self, constraint: RelationalConstraint) -> Result<(), EngineError> {
        constraint.validate()?;
        self.constraints.push(constraint);
        self.touch();
        Ok(())
    }

    pub fn remove_constraint(
        &mut self,
        constraint: &RelationalConstraint,
    ) -> Result<(), EngineError> {
        let position = self
            .constraints
            .iter()
            .position(|candidate| candidate == constraint)
            .ok_or_else(|| EngineError::Validation("constraint not registered".into()))?;
        self.constraints.remove(position);
        self.touch();
        Ok(())
    }

    // ── cycling commands ────────────────────────────────────────────────

    pub fn advance_cycling(&mut self, series_id: Uuid) -> Result<(), EngineError> {
        self.unlocked_required(series_id)?;
        let series = self.series_mut(series_id).expect("series checked above");
        let cycling = series
            .cycling
            .as_mut()
            .ok_or_else(|| EngineError::Validation("series has no cycling config".into()))?;
        cycling.advance()?;
        self.touch();
        Ok(())
    }

    pub fn reset_cycling(&mut self, series_id: Uuid) -> Result<(), EngineError> {
        self.unlocked_required(series_id)?;
        let series = self.series_mut(series_id).expect("series checked above");
        let cycling = series
            .cycling
            .as_mut()
            .ok_or_else(|| EngineError::Validation("series has no cycling config".into()))?;
        cycling.reset()?;
        self.touch();
        Ok(())
    }

    // ── history queries ─────────────────────────────────────────────────

    pub fn count_in_window(&self, target: &Target, window_days: u32, as_of: NaiveDate) -> usize {
        count_in_window(&self.series, &self.completions, target, window_days, as_of)
    }

    pub fn days_since_last_completion(&self, target: &Target, as_of: NaiveDate) -> Option<i64> {
        days_since_last_completion(&self.series, &self.completions, target, as_of)
    }

    pub fn adaptive_duration_for(
        &self,
        series_id: Uuid,
        as_of: NaiveDate,
    ) -> Result<Option<u32>, EngineError> {
        let series = self.series_required(series_id)?;
        match &series.duration {
            crate::series::DurationSpec::Fixed { .. } => Ok(None),
            crate::series::DurationSpec::Adaptive(config) => {
                let durations =
                    durations_for_adaptive(&self.completions, series_id, config.mode, as_of);
                Ok(Some(calculate_adaptive_duration(config, &durations)))
            }
        }
    }

    // ── title resolution ────────────────────────────────────────────────

    /// 0-based position of `instance_date` among the series' generated dates.
    /// Cancelled dates still count; conditions and exceptions do not apply.
    pub fn instance_number(
        &self,
        series_id: Uuid,
        instance_date: NaiveDate,
    ) -> Result<u64, EngineError> {
        let series = self.series_required(series_id)?;
        let opts = ExpandOptions {
            end_date: series.end_date,
            count: series.count,
        };
        let dates = series.pattern.expand(
            series.start_date,
            crate::calendar::add_days(instance_date, 1),
            series.start_date,
            &opts,
        )?;
        dates
            .iter()
            .position(|date| *date == instance_date)
            .map(|position| position as u64)
            .ok_or_else(|| {
                EngineError::Validation(format!(
                    "{} is not a generated date of series {}",
                    instance_date, series_id
                ))
            })
    }

    /// Title for a rendered instance: the cycling item when cycling is
    /// configured, the series title otherwise.
    pub fn resolved_title(
        &self,
        series_id: Uuid,
        instance_date: NaiveDate,
    ) -> Result<String, EngineError> {
        let series = self.series_required(series_id)?;
        match &series.cycling {
            None => Ok(series.title.clone()),
            Some(cycling) => {
                let number = self.instance_number(series_id, instance_date)?;
                Ok(cycling.resolve(number).to_string())
            }
        }
    }

    /// Snapshot tuple handed to reflow and other pure readers.
    pub(crate) fn snapshot(&self) -> AggregateView<'_> {
        AggregateView {
            series: &self.series,
            completions: &self.completions,
            exceptions: &self.exceptions,
            links: &self.links,
            constraints: &self.constraints,
        }
    }
}

/// Borrowed read-only view over every table reflow needs.
#[derive(Clone, Copy)]
pub(crate) struct AggregateView<'a> {
    pub series: &'a [Series],
    pub completions: &'a [Completion],
    pub exceptions: &'a [ExceptionRecord],
    pub links: &'a [Link],
    pub constraints: &'a [RelationalConstraint],
}
