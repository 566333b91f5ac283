//! Best-effort placement and conflict classification when search fails.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDateTime;
use uuid::Uuid;

use super::constraints::{ConstraintKind, InstanceConstraint};
use super::domain::Domain;
use super::instances::Instance;
use super::{Conflict, ConflictKind, Severity};

/// Places every instance anyway and reports each violated constraint. No
/// violation goes unreported.
pub(crate) fn report(
    instances: &[Instance],
    constraints: &[InstanceConstraint],
    domains: &[Option<Domain>],
    chain_depths: &HashMap<Uuid, usize>,
) -> (BTreeMap<usize, NaiveDateTime>, Vec<Conflict>) {
    let mut placement: BTreeMap<usize, NaiveDateTime> = BTreeMap::new();
    let mut conflicts = Vec::new();

    // Fixed instances sit on their ideal time unconditionally.
    for (index, instance) in instances.iter().enumerate() {
        if instance.all_day {
            continue;
        }
        if instance.fixed {
            placement.insert(index, instance.ideal_time);
        }
    }

    // Flexible instances follow in MRV order over the unpruned domains.
    let mut flexible: Vec<usize> = instances
        .iter()
        .enumerate()
        .filter(|(index, instance)| {
            !instance.all_day && !instance.fixed && domains[*index].is_some()
        })
        .map(|(index, _)| index)
        .collect();
    flexible.sort_by_key(|&index| {
        let instance = &instances[index];
        let depth = chain_depths
            .get(&instance.series_id)
            .copied()
            .unwrap_or(0);
        (
            domains[index].as_ref().map(Domain::len).unwrap_or(0),
            depth,
            instance.series_id,
            instance.instance_date,
        )
    });
    for index in flexible {
        let instance = &instances[index];
        let domain = domains[index].as_ref().expect("filtered on presence");
        let slot = domain
            .slots
            .iter()
            .copied()
            .min_by_key(|&slot| ((slot - instance.ideal_time).num_minutes().abs(), slot));
        match slot {
            Some(slot) => {
                placement.insert(index, slot);
            }
            None => {
                placement.insert(index, instance.ideal_time);
                conflicts.push(Conflict {
                    kind: ConflictKind::NoValidSlot,
                    severity: Severity::Warning,
                    instance_ids: vec![instance.key()],
                    message: format!(
                        "no candidate slot for {} on {}; falling back to its ideal time",
                        instance.series_id, instance.instance_date
                    ),
                });
            }
        }
    }

    // Re-evaluate every constraint against the final placement.
    for constraint in constraints {
        let (Some(&start_a), Some(&start_b)) =
            (placement.get(&constraint.a), placement.get(&constraint.b))
        else {
            continue;
        };
        if constraint.satisfied(instances, start_a, start_b) {
            continue;
        }
        let a = &instances[constraint.a];
        let b = &instances[constraint.b];
        let conflict = match constraint.kind {
            ConstraintKind::NoOverlap => Conflict {
                kind: ConflictKind::Overlap,
                severity: Severity::Warning,
                instance_ids: vec![a.key(), b.key()],
                message: format!(
                    "{} and {} occupy intersecting intervals",
                    a.series_id, b.series_id
                ),
            },
            ConstraintKind::Chain { .. } => Conflict {
                kind: ConflictKind::ChainCannotFit,
                severity: Severity::Error,
                instance_ids: vec![a.key(), b.key()],
                message: format!(
                    "chained child {} has no valid window under parent {}",
                    b.series_id, a.series_id
                ),
            },
            ConstraintKind::Before => Conflict {
                kind: ConflictKind::ConstraintViolation,
                severity: Severity::Error,
                instance_ids: vec![a.key(), b.key()],
                message: format!("{} must start before {}", a.series_id, b.series_id),
            },
            ConstraintKind::After => Conflict {
                kind: ConflictKind::ConstraintViolation,
                severity: Severity::Error,
                instance_ids: vec![a.key(), b.key()],
                message: format!("{} must start after {}", a.series_id, b.series_id),
            },
            ConstraintKind::Within { minutes } => Conflict {
                kind: ConflictKind::ConstraintViolation,
                severity: Severity::Error,
                instance_ids: vec![a.key(), b.key()],
                message: format!(
                    "{} must start within {} minutes of {}",
                    a.series_id, minutes, b.series_id
                ),
            },
        };
        conflicts.push(conflict);
    }

    conflicts.sort_by(|left, right| {
        (left.kind, &left.instance_ids).cmp(&(right.kind, &right.instance_ids))
    });
    (placement, conflicts)
}
