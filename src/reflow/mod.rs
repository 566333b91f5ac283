//! Reflow: the constraint-satisfaction scheduler.
//!
//! A reflow call is a pure function from an input snapshot to placements.
//! It never fails on infeasibility — when search exhausts the tree, every
//! instance is still placed best-effort and the violations are returned as
//! a structured conflict list.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

pub mod constraints;

pub(crate) mod instances;

mod conflicts;
mod domain;
mod propagate;
mod solver;

use crate::calendar::at_midnight;
use crate::completion::Completion;
use crate::errors::EngineError;
use crate::links::{Link, LinkGraph};
use crate::series::Series;
use crate::store::{AggregateView, ExceptionRecord, Planner};

pub use constraints::RelationalConstraint;

/// Exchange shape of a reflow request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReflowInput {
    pub series: Vec<Series>,
    #[serde(default)]
    pub constraints: Vec<RelationalConstraint>,
    #[serde(default)]
    pub chains: Vec<Link>,
    pub today: NaiveDate,
    pub window_start: NaiveDate,
    pub window_end: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub series_id: Uuid,
    pub instance_date: NaiveDate,
    pub time: NaiveDateTime,
}

/// Conflict kinds, declared in the lexicographic order of their wire names
/// so the derived order matches the §6 output sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConflictKind {
    ChainCannotFit,
    ConstraintViolation,
    NoValidSlot,
    Overlap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    #[serde(rename = "type")]
    pub kind: ConflictKind,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub instance_ids: Vec<String>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReflowOutput {
    pub assignments: Vec<Assignment>,
    pub conflicts: Vec<Conflict>,
}

/// Runs reflow over an exchange-shaped input plus the history snapshot it
/// reads. Validation failures surface before any scheduling work; an
/// infeasible schedule is not a failure.
pub fn reflow(
    input: &ReflowInput,
    completions: &[Completion],
    exceptions: &[ExceptionRecord],
) -> Result<ReflowOutput, EngineError> {
    for series in &input.series {
        series.validate()?;
    }
    for constraint in &input.constraints {
        constraint.validate()?;
    }
    if input.window_start > input.window_end {
        return Err(EngineError::InvalidRange(format!(
            "window start {} after window end {}",
            input.window_start, input.window_end
        )));
    }
    let view = AggregateView {
        series: &input.series,
        completions,
        exceptions,
        links: &input.chains,
        constraints: &input.constraints,
    };
    run(view, input.window_start, input.window_end)
}

impl Planner {
    /// Reflow over this aggregate's own tables.
    pub fn reflow(
        &self,
        window_start: NaiveDate,
        window_end: NaiveDate,
    ) -> Result<ReflowOutput, EngineError> {
        if window_start > window_end {
            return Err(EngineError::InvalidRange(format!(
                "window start {} after window end {}",
                window_start, window_end
            )));
        }
        run(self.snapshot(), window_start, window_end)
    }
}

fn run(
    view: AggregateView<'_>,
    window_start: NaiveDate,
    window_end: NaiveDate,
) -> Result<ReflowOutput, EngineError> {
    let all = instances::generate_instances(view, window_start, window_end)?;
    let domains = domain::build_domains(&all);
    let constraint_set = constraints::build_constraints(&all, view.series, view.constraints);
    let chain_depths = LinkGraph::build(view.links).depths();
    debug!(
        instances = all.len(),
        constraints = constraint_set.len(),
        "reflow window materialized"
    );

    let solve_input = solver::SolveInput {
        instances: &all,
        constraints: &constraint_set,
        chain_depths: &chain_depths,
    };

    let (placement, conflicts) = match solver::solve(&solve_input, &domains) {
        Some(assignment) => (assignment, Vec::new()),
        None => conflicts::report(&all, &constraint_set, &domains, &chain_depths),
    };

    let mut assignments: Vec<Assignment> = Vec::with_capacity(all.len());
    for (index, instance) in all.iter().enumerate() {
        let time = if instance.all_day {
            at_midnight(instance.instance_date)
        } else {
            match placement.get(&index) {
                Some(&time) => time,
                None => instance.ideal_time,
            }
        };
        assignments.push(Assignment {
            series_id: instance.series_id,
            instance_date: instance.instance_date,
            time,
        });
    }
    assignments.sort_by_key(|assignment| (assignment.instance_date, assignment.series_id));

    Ok(ReflowOutput {
        assignments,
        conflicts,
    })
}
