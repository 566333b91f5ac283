//! Arc-consistency pruning over the binary constraint set.
//!
//! Sound but incomplete: no globally-valid value is ever removed, while some
//! inconsistent combinations survive for the search to resolve. An emptied
//! domain means no solution under the current assumptions.

use std::collections::VecDeque;

use chrono::{Duration, NaiveDateTime};
use tracing::trace;

use super::constraints::{ConstraintKind, InstanceConstraint};
use super::domain::Domain;
use super::instances::Instance;

/// Prunes `domains` to arc consistency. Returns false when any participating
/// domain wipes out.
pub(crate) fn propagate(
    instances: &[Instance],
    constraints: &[InstanceConstraint],
    domains: &mut [Option<Domain>],
) -> bool {
    // Arcs are (constraint, endpoint-under-revision).
    let mut queue: VecDeque<(usize, bool)> = VecDeque::new();
    for index in 0..constraints.len() {
        queue.push_back((index, true));
        queue.push_back((index, false));
    }
    let mut touching: Vec<Vec<usize>> = vec![Vec::new(); domains.len()];
    for (index, constraint) in constraints.iter().enumerate() {
        touching[constraint.a].push(index);
        touching[constraint.b].push(index);
    }

    while let Some((index, revise_a)) = queue.pop_front() {
        let constraint = constraints[index];
        let target = if revise_a { constraint.a } else { constraint.b };
        let other = if revise_a { constraint.b } else { constraint.a };
        let changed = revise(instances, constraint, target, other, domains);
        if !changed {
            continue;
        }
        match &domains[target] {
            Some(domain) if domain.is_empty() => {
                trace!(instance = %instances[target].key(), "domain wiped");
                return false;
            }
            _ => {}
        }
        for &neighbor in &touching[target] {
            let neighbor_constraint = constraints[neighbor];
            if neighbor == index {
                continue;
            }
            // Re-revise the endpoint opposite the one that just changed.
            if neighbor_constraint.a != target {
                queue.push_back((neighbor, true));
            }
            if neighbor_constraint.b != target {
                queue.push_back((neighbor, false));
            }
        }
    }
    true
}

/// Removes from `domains[target]` every value with no support in
/// `domains[other]`. Returns whether anything was removed.
fn revise(
    instances: &[Instance],
    constraint: InstanceConstraint,
    target: usize,
    other: usize,
    domains: &mut [Option<Domain>],
) -> bool {
    let Some(other_domain) = domains[other].clone() else {
        return false;
    };
    let Some(target_domain) = domains[target].as_mut() else {
        return false;
    };
    if other_domain.is_empty() {
        let had_values = !target_domain.is_empty();
        target_domain.slots.clear();
        return had_values;
    }

    let target_is_a = target == constraint.a;
    let target_duration = i64::from(instances[target].duration);
    let other_duration = i64::from(instances[other].duration);
    let before = target_domain.len();
    target_domain.slots.retain(|&value| {
        supported(
            constraint.kind,
            target_is_a,
            value,
            target_duration,
            other_duration,
            &other_domain,
        )
    });
    target_domain.len() != before
}

/// Support check for one candidate value, using the sorted shape of the
/// neighbor domain instead of a full scan.
fn supported(
    kind: ConstraintKind,
    value_is_a: bool,
    value: NaiveDateTime,
    value_duration: i64,
    other_duration: i64,
    other: &Domain,
) -> bool {
    let minutes = Duration::minutes;
    match kind {
        ConstraintKind::NoOverlap => {
            // Some neighbor ends on or before this start, or starts on or
            // after this end; domain extremes decide both disjuncts.
            let value_end = value + minutes(value_duration);
            let earliest_end = other.min().map(|slot| slot + minutes(other_duration));
            let latest_start = other.max();
            earliest_end.is_some_and(|end| end <= value)
                || latest_start.is_some_and(|start| start >= value_end)
        }
        ConstraintKind::Before => {
            if value_is_a {
                other.max().is_some_and(|latest| value < latest)
            } else {
                other.min().is_some_and(|earliest| earliest < value)
            }
        }
        ConstraintKind::After => {
            if value_is_a {
                other.min().is_some_and(|earliest| value > earliest)
            } else {
                other.max().is_some_and(|latest| latest > value)
            }
        }
        ConstraintKind::Within { minutes: limit } => {
            other.has_in_range(value - minutes(i64::from(limit)), value + minutes(i64::from(limit)))
        }
        ConstraintKind::Chain {
            distance,
            early,
            late,
        } => {
            if value_is_a {
                // Parent candidate: some child start must sit in the window
                // around this end.
                let target_time = value + minutes(value_duration) + minutes(i64::from(distance));
                other.has_in_range(
                    target_time - minutes(i64::from(early)),
                    target_time + minutes(i64::from(late)),
                )
            } else {
                // Child candidate: some parent end must put this start in
                // window, i.e. a parent start in the reflected interval.
                let anchor = value - minutes(other_duration) - minutes(i64::from(distance));
                other.has_in_range(
                    anchor - minutes(i64::from(late)),
                    anchor + minutes(i64::from(early)),
                )
            }
        }
    }
}
