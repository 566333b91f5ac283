//! Relational constraints and their expansion to concrete instance pairs.
//!
//! Tag resolution happens once, when the runtime constraint set is built;
//! the set is frozen before propagation starts. A global no-overlap covers
//! every pair of scheduled instances — one person cannot do two things at
//! once — with explicit `noOverlap` records folding into the same pairs.

use std::collections::BTreeSet;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::calendar::add_minutes;
use crate::completion::{resolve_target, Target};
use crate::errors::EngineError;
use crate::series::Series;

use super::instances::Instance;

/// Declarative constraint between two targets, as registered by callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum RelationalConstraint {
    MustBeBefore {
        source: Target,
        dest: Target,
    },
    MustBeAfter {
        source: Target,
        dest: Target,
    },
    MustBeWithin {
        source: Target,
        dest: Target,
        within_minutes: u32,
    },
    NoOverlap {
        source: Target,
        dest: Target,
    },
}

impl RelationalConstraint {
    pub fn validate(&self) -> Result<(), EngineError> {
        if let RelationalConstraint::MustBeWithin { within_minutes, .. } = self {
            if *within_minutes == 0 {
                return Err(EngineError::Validation(
                    "withinMinutes must be at least 1".into(),
                ));
            }
        }
        Ok(())
    }

    pub fn mentions_series(&self, id: Uuid) -> bool {
        let (source, dest) = self.targets();
        let hits = |target: &Target| matches!(target, Target::Series { series_id } if *series_id == id);
        hits(source) || hits(dest)
    }

    fn targets(&self) -> (&Target, &Target) {
        match self {
            RelationalConstraint::MustBeBefore { source, dest }
            | RelationalConstraint::MustBeAfter { source, dest }
            | RelationalConstraint::MustBeWithin { source, dest, .. }
            | RelationalConstraint::NoOverlap { source, dest } => (source, dest),
        }
    }
}

/// Constraint over two concrete instances, by index into the instance list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct InstanceConstraint {
    pub kind: ConstraintKind,
    pub a: usize,
    pub b: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum ConstraintKind {
    /// Symmetric; adjacency is allowed.
    NoOverlap,
    /// start(a) < start(b).
    Before,
    /// start(a) > start(b).
    After,
    /// |start(a) − start(b)| ≤ minutes.
    Within { minutes: u32 },
    /// a is the parent, b the chained child.
    Chain {
        distance: u32,
        early: u32,
        late: u32,
    },
}

impl InstanceConstraint {
    /// Satisfaction predicate over candidate start times.
    pub(crate) fn satisfied(
        &self,
        instances: &[Instance],
        start_a: NaiveDateTime,
        start_b: NaiveDateTime,
    ) -> bool {
        let end_a = add_minutes(start_a, i64::from(instances[self.a].duration));
        let end_b = add_minutes(start_b, i64::from(instances[self.b].duration));
        match self.kind {
            ConstraintKind::NoOverlap => end_a <= start_b || end_b <= start_a,
            ConstraintKind::Before => start_a < start_b,
            ConstraintKind::After => start_a > start_b,
            ConstraintKind::Within { minutes } => {
                let gap = (start_a - start_b).num_minutes().abs();
                gap <= i64::from(minutes)
            }
            ConstraintKind::Chain {
                distance,
                early,
                late,
            } => {
                let target = add_minutes(end_a, i64::from(distance));
                start_b >= add_minutes(target, -i64::from(early))
                    && start_b <= add_minutes(target, i64::from(late))
            }
        }
    }
}

/// Expands the frozen constraint set for one reflow call.
pub(crate) fn build_constraints(
    instances: &[Instance],
    series: &[Series],
    relational: &[RelationalConstraint],
) -> Vec<InstanceConstraint> {
    let schedulable: Vec<usize> = instances
        .iter()
        .enumerate()
        .filter(|(_, instance)| !instance.all_day)
        .map(|(index, _)| index)
        .collect();

    let mut constraints = Vec::new();
    let mut seen = BTreeSet::new();
    let mut push = |constraints: &mut Vec<InstanceConstraint>, constraint: InstanceConstraint| {
        if seen.insert((constraint.kind, constraint.a, constraint.b)) {
            constraints.push(constraint);
        }
    };

    // Implicit pairwise no-overlap across the whole window.
    for (position, &a) in schedulable.iter().enumerate() {
        for &b in &schedulable[position + 1..] {
            push(
                &mut constraints,
                InstanceConstraint {
                    kind: ConstraintKind::NoOverlap,
                    a,
                    b,
                },
            );
        }
    }

    // Registered relational constraints, paired per instance date.
    for constraint in relational {
        let (source, dest, kind) = match constraint {
            RelationalConstraint::MustBeBefore { source, dest } => {
                (source, dest, ConstraintKind::Before)
            }
            RelationalConstraint::MustBeAfter { source, dest } => {
                (source, dest, ConstraintKind::After)
            }
            RelationalConstraint::MustBeWithin {
                source,
                dest,
                within_minutes,
            } => (
                source,
                dest,
                ConstraintKind::Within {
                    minutes: *within_minutes,
                },
            ),
            RelationalConstraint::NoOverlap { source, dest } => {
                (source, dest, ConstraintKind::NoOverlap)
            }
        };
        let source_ids = resolve_target(series, source);
        let dest_ids = resolve_target(series, dest);
        for &a in &schedulable {
            if !source_ids.contains(&instances[a].series_id) {
                continue;
            }
            for &b in &schedulable {
                if a == b || !dest_ids.contains(&instances[b].series_id) {
                    continue;
                }
                if instances[a].series_id == instances[b].series_id {
                    continue;
                }
                if instances[a].instance_date != instances[b].instance_date {
                    continue;
                }
                if kind == ConstraintKind::NoOverlap {
                    // Already covered by the implicit pass; keep pair order canonical.
                    let (low, high) = if a < b { (a, b) } else { (b, a) };
                    push(
                        &mut constraints,
                        InstanceConstraint {
                            kind,
                            a: low,
                            b: high,
                        },
                    );
                } else {
                    push(&mut constraints, InstanceConstraint { kind, a, b });
                }
            }
        }
    }

    // Chain edges, paired per instance date.
    for &child in &schedulable {
        let Some(edge) = &instances[child].chain else {
            continue;
        };
        let parent = schedulable.iter().copied().find(|&candidate| {
            instances[candidate].series_id == edge.parent_id
                && instances[candidate].instance_date == instances[child].instance_date
        });
        if let Some(parent) = parent {
            push(
                &mut constraints,
                InstanceConstraint {
                    kind: ConstraintKind::Chain {
                        distance: edge.target_distance,
                        early: edge.early_wobble,
                        late: edge.late_wobble,
                    },
                    a: parent,
                    b: child,
                },
            );
        }
    }

    constraints
}
