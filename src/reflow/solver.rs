//! Depth-first backtracking search with MRV variable ordering and
//! distance/workload value ordering.
//!
//! Fixed instances are pre-assigned and never branched on. Chain bounds and
//! relational constraints are hard; workload balance only orders values and
//! can never override them.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDateTime;
use tracing::{debug, trace};
use uuid::Uuid;

use super::constraints::InstanceConstraint;
use super::domain::Domain;
use super::instances::Instance;
use super::propagate::propagate;

pub(crate) struct SolveInput<'a> {
    pub instances: &'a [Instance],
    pub constraints: &'a [InstanceConstraint],
    /// Chain depth per series id; roots are 0 and branch first on ties.
    pub chain_depths: &'a HashMap<Uuid, usize>,
}

/// Returns a complete assignment (instance index → start), or `None` when
/// the search tree is exhausted.
pub(crate) fn solve(
    input: &SolveInput<'_>,
    domains: &[Option<Domain>],
) -> Option<BTreeMap<usize, NaiveDateTime>> {
    let mut domains = domains.to_vec();
    if !propagate(input.instances, input.constraints, &mut domains) {
        debug!("initial propagation wiped a domain");
        return None;
    }

    let mut assigned: BTreeMap<usize, NaiveDateTime> = BTreeMap::new();
    for (index, instance) in input.instances.iter().enumerate() {
        if instance.fixed && !instance.all_day {
            assigned.insert(index, instance.ideal_time);
        }
    }

    let solution = search(input, domains, &mut assigned);
    if solution.is_some() {
        debug!(instances = assigned.len(), "search found a full assignment");
    }
    solution.map(|_| assigned)
}

fn search(
    input: &SolveInput<'_>,
    domains: Vec<Option<Domain>>,
    assigned: &mut BTreeMap<usize, NaiveDateTime>,
) -> Option<()> {
    let Some(variable) = pick_variable(input, &domains, assigned) else {
        return Some(());
    };
    let domain = domains[variable]
        .as_ref()
        .expect("picked variables always carry a domain");

    let mut values = domain.slots.clone();
    order_values(input, assigned, variable, &mut values);

    for value in values {
        trace!(
            instance = %input.instances[variable].key(),
            slot = %value,
            "trying value"
        );
        let mut branched = domains.clone();
        branched[variable] = Some(Domain::singleton(value));
        if !propagate(input.instances, input.constraints, &mut branched) {
            continue;
        }
        assigned.insert(variable, value);
        if search(input, branched, assigned).is_some() {
            return Some(());
        }
        assigned.remove(&variable);
    }
    None
}

/// MRV over unassigned flexible instances; ties break chain-root-first, then
/// by series id and instance date so the search is deterministic.
fn pick_variable(
    input: &SolveInput<'_>,
    domains: &[Option<Domain>],
    assigned: &BTreeMap<usize, NaiveDateTime>,
) -> Option<usize> {
    domains
        .iter()
        .enumerate()
        .filter(|(index, domain)| domain.is_some() && !assigned.contains_key(index))
        .min_by_key(|(index, domain)| {
            let instance = &input.instances[*index];
            let depth = input
                .chain_depths
                .get(&instance.series_id)
                .copied()
                .unwrap_or(0);
            (
                domain.as_ref().map(Domain::len).unwrap_or(0),
                depth,
                instance.series_id,
                instance.instance_date,
            )
        })
        .map(|(index, _)| index)
}

/// Orders candidate slots by distance from ideal, then by the workload
/// already assigned to the slot's date, then by the slot itself.
fn order_values(
    input: &SolveInput<'_>,
    assigned: &BTreeMap<usize, NaiveDateTime>,
    variable: usize,
    values: &mut [NaiveDateTime],
) {
    let ideal = input.instances[variable].ideal_time;
    let mut workload: HashMap<chrono::NaiveDate, u64> = HashMap::new();
    for (&index, &start) in assigned {
        let instance = &input.instances[index];
        *workload.entry(start.date()).or_default() += u64::from(instance.duration);
    }
    values.sort_by_key(|&slot| {
        let distance = (slot - ideal).num_minutes().abs();
        let load = workload.get(&slot.date()).copied().unwrap_or(0);
        (distance, load, slot)
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::{parse_date, parse_datetime};
    use crate::reflow::constraints::ConstraintKind;
    use crate::reflow::domain::build_domains;

    fn instance(ideal: &str, duration: u32, fixed: bool) -> Instance {
        Instance {
            series_id: Uuid::new_v4(),
            instance_date: parse_date("2025-01-15").unwrap(),
            ideal_time: parse_datetime(ideal).unwrap(),
            duration,
            fixed,
            all_day: false,
            time_window: None,
            days_before: 0,
            days_after: 0,
            chain: None,
        }
    }

    fn no_depths() -> HashMap<Uuid, usize> {
        HashMap::new()
    }

    #[test]
    fn fixed_instances_are_pre_assigned() {
        let instances = vec![instance("2025-01-15T09:00:00", 60, true)];
        let depths = no_depths();
        let input = SolveInput {
            instances: &instances,
            constraints: &[],
            chain_depths: &depths,
        };
        let domains = build_domains(&instances);
        let solution = solve(&input, &domains).unwrap();
        assert_eq!(
            solution[&0],
            parse_datetime("2025-01-15T09:00:00").unwrap()
        );
    }

    #[test]
    fn flexible_instance_lands_on_its_ideal_slot() {
        let instances = vec![instance("2025-01-15T10:00:00", 30, false)];
        let depths = no_depths();
        let input = SolveInput {
            instances: &instances,
            constraints: &[],
            chain_depths: &depths,
        };
        let domains = build_domains(&instances);
        let solution = solve(&input, &domains).unwrap();
        assert_eq!(
            solution[&0],
            parse_datetime("2025-01-15T10:00:00").unwrap()
        );
    }

    #[test]
    fn overlap_pushes_the_flexible_instance_aside() {
        let instances = vec![
            instance("2025-01-15T09:00:00", 60, true),
            instance("2025-01-15T09:00:00", 30, false),
        ];
        let constraints = vec![InstanceConstraint {
            kind: ConstraintKind::NoOverlap,
            a: 0,
            b: 1,
        }];
        let depths = no_depths();
        let input = SolveInput {
            instances: &instances,
            constraints: &constraints,
            chain_depths: &depths,
        };
        let domains = build_domains(&instances);
        let solution = solve(&input, &domains).unwrap();
        assert_eq!(solution[&0], parse_datetime("2025-01-15T09:00:00").unwrap());
        // Nearest non-overlapping slot; adjacency is allowed.
        assert_eq!(solution[&1], parse_datetime("2025-01-15T08:30:00").unwrap());
    }

    #[test]
    fn two_fixed_overlapping_instances_are_unsolvable() {
        let instances = vec![
            instance("2025-01-15T09:00:00", 60, true),
            instance("2025-01-15T09:00:00", 60, true),
        ];
        let constraints = vec![InstanceConstraint {
            kind: ConstraintKind::NoOverlap,
            a: 0,
            b: 1,
        }];
        let depths = no_depths();
        let input = SolveInput {
            instances: &instances,
            constraints: &constraints,
            chain_depths: &depths,
        };
        let domains = build_domains(&instances);
        assert!(solve(&input, &domains).is_none());
    }

    #[test]
    fn chain_scenario_picks_the_near_end_of_the_window() {
        // Parent fixed 09:00+60; child wants 10:00, window allows up to 10:30.
        let parent = instance("2025-01-15T09:00:00", 60, true);
        let mut child = instance("2025-01-15T10:00:00", 30, false);
        child.chain = None; // edge is expressed through the constraint below
        let instances = vec![parent, child];
        let constraints = vec![InstanceConstraint {
            kind: ConstraintKind::Chain {
                distance: 0,
                early: 0,
                late: 30,
            },
            a: 0,
            b: 1,
        }];
        let depths = no_depths();
        let input = SolveInput {
            instances: &instances,
            constraints: &constraints,
            chain_depths: &depths,
        };
        let domains = build_domains(&instances);
        let solution = solve(&input, &domains).unwrap();
        assert_eq!(solution[&1], parse_datetime("2025-01-15T10:00:00").unwrap());
    }

    #[test]
    fn deterministic_across_runs() {
        let instances = vec![
            instance("2025-01-15T09:00:00", 45, false),
            instance("2025-01-15T09:00:00", 45, false),
            instance("2025-01-15T09:00:00", 45, false),
        ];
        let constraints = vec![
            InstanceConstraint {
                kind: ConstraintKind::NoOverlap,
                a: 0,
                b: 1,
            },
            InstanceConstraint {
                kind: ConstraintKind::NoOverlap,
                a: 0,
                b: 2,
            },
            InstanceConstraint {
                kind: ConstraintKind::NoOverlap,
                a: 1,
                b: 2,
            },
        ];
        let depths = no_depths();
        let input = SolveInput {
            instances: &instances,
            constraints: &constraints,
            chain_depths: &depths,
        };
        let domains = build_domains(&instances);
        let first = solve(&input, &domains).unwrap();
        let second = solve(&input, &domains).unwrap();
        assert_eq!(first, second);
        // All three were actually separated.
        let mut starts: Vec<_> = first.values().copied().collect();
        starts.sort();
        assert!(starts.windows(2).all(|pair| {
            (pair[1] - pair[0]).num_minutes() >= 45
        }));
    }
}
