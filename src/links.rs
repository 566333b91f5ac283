//! Parent-child chain links.
//!
//! The link structure is a DAG with at most one inbound edge per child and a
//! bounded root-path depth. A child's valid times on a date are derived from
//! its parent's end on that date; nothing is cached, so rescheduling or
//! completing the parent moves the derived window automatically.

use std::collections::HashMap;

use chrono::NaiveDateTime;
use petgraph::algo::has_path_connecting;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::calendar::add_minutes;
use crate::errors::EngineError;

/// Longest permitted root-to-node path length, in edges.
pub const MAX_CHAIN_DEPTH: usize = 32;

/// Directed parent→child edge with the timing contract for the child.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Link {
    pub id: Uuid,
    pub parent_id: Uuid,
    pub child_id: Uuid,
    /// Minutes between the parent's end and the child's target start.
    pub target_distance: u32,
    pub early_wobble: u32,
    pub late_wobble: u32,
}

impl Link {
    pub fn new(parent_id: Uuid, child_id: Uuid, spec: LinkSpec) -> Self {
        Self {
            id: Uuid::new_v4(),
            parent_id,
            child_id,
            target_distance: spec.target_distance,
            early_wobble: spec.early_wobble,
            late_wobble: spec.late_wobble,
        }
    }

    /// Target start for the child once the parent's end is known.
    pub fn target_from(&self, parent_end: NaiveDateTime) -> NaiveDateTime {
        add_minutes(parent_end, i64::from(self.target_distance))
    }

    /// Hard valid window `[target − early, target + late]` around a target.
    pub fn window_around(&self, target: NaiveDateTime) -> (NaiveDateTime, NaiveDateTime) {
        (
            add_minutes(target, -i64::from(self.early_wobble)),
            add_minutes(target, i64::from(self.late_wobble)),
        )
    }
}

/// Timing parameters supplied by `linkSeries` / `updateLink`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkSpec {
    pub target_distance: u32,
    #[serde(default)]
    pub early_wobble: u32,
    #[serde(default)]
    pub late_wobble: u32,
}

/// Adjacency view over a set of links, rebuilt per validation or query.
pub struct LinkGraph {
    graph: StableDiGraph<Uuid, ()>,
    indices: HashMap<Uuid, NodeIndex>,
}

impl LinkGraph {
    pub fn build(links: &[Link]) -> Self {
        let mut graph = StableDiGraph::new();
        let mut indices = HashMap::new();
        for link in links {
            let parent = Self::intern(&mut graph, &mut indices, link.parent_id);
            let child = Self::intern(&mut graph, &mut indices, link.child_id);
            graph.add_edge(parent, child, ());
        }
        Self { graph, indices }
    }

    fn intern(
        graph: &mut StableDiGraph<Uuid, ()>,
        indices: &mut HashMap<Uuid, NodeIndex>,
        id: Uuid,
    ) -> NodeIndex {
        *indices.entry(id).or_insert_with(|| graph.add_node(id))
    }

    /// True when an edge parent→child would close a cycle, i.e. the parent is
    /// already reachable from the child.
    pub fn would_cycle(&self, parent: Uuid, child: Uuid) -> bool {
        match (self.indices.get(&child), self.indices.get(&parent)) {
            (Some(&child_idx), Some(&parent_idx)) => {
                has_path_connecting(&self.graph, child_idx, parent_idx, None)
            }
            _ => false,
        }
    }

    /// Length in edges of the unique path from this node up to its root.
    pub fn depth_of(&self, id: Uuid) -> usize {
        let mut depth = 0;
        let mut current = match self.indices.get(&id) {
            Some(&index) => index,
            None => return 0,
        };
        while let Some(parent) = self
            .graph
            .neighbors_directed(current, Direction::Incoming)
            .next()
        {
            depth += 1;
            current = parent;
            if depth > MAX_CHAIN_DEPTH {
                break;
            }
        }
        depth
    }

    /// Longest downward path, in edges, from this node into its subtree.
    pub fn height_of(&self, id: Uuid) -> usize {
        match self.indices.get(&id) {
            Some(&index) => self.height_from(index),
            None => 0,
        }
    }

    fn height_from(&self, index: NodeIndex) -> usize {
        self.graph
            .neighbors_directed(index, Direction::Outgoing)
            .map(|child| 1 + self.height_from(child))
            .max()
            .unwrap_or(0)
    }

    /// Depths keyed by series id, for chain-root-first solver ordering.
    pub fn depths(&self) -> HashMap<Uuid, usize> {
        self.indices
            .keys()
            .map(|id| (*id, self.depth_of(*id)))
            .collect()
    }
}

/// Validates a prospective edge against the §3 link invariants.
pub fn check_new_link(
    links: &[Link],
    parent_id: Uuid,
    child_id: Uuid,
) -> Result<(), EngineError> {
    if parent_id == child_id {
        return Err(EngineError::SelfLink);
    }
    if links.iter().any(|link| link.child_id == child_id) {
        return Err(EngineError::AlreadyLinked(child_id));
    }
    let graph = LinkGraph::build(links);
    if graph.would_cycle(parent_id, child_id) {
        return Err(EngineError::CycleDetected);
    }
    let depth_through_child = graph.depth_of(parent_id) + 1 + graph.height_of(child_id);
    if depth_through_child > MAX_CHAIN_DEPTH {
        return Err(EngineError::ChainDepthExceeded(MAX_CHAIN_DEPTH));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::parse_datetime;

    fn link_between(parent: Uuid, child: Uuid) -> Link {
        Link::new(
            parent,
            child,
            LinkSpec {
                target_distance: 0,
                early_wobble: 0,
                late_wobble: 0,
            },
        )
    }

    #[test]
    fn self_link_is_rejected() {
        let id = Uuid::new_v4();
        assert!(matches!(
            check_new_link(&[], id, id),
            Err(EngineError::SelfLink)
        ));
    }

    #[test]
    fn second_inbound_link_is_rejected() {
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let links = vec![link_between(a, b)];
        assert!(matches!(
            check_new_link(&links, c, b),
            Err(EngineError::AlreadyLinked(_))
        ));
    }

    #[test]
    fn cycle_is_rejected() {
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let links = vec![link_between(a, b), link_between(b, c)];
        assert!(matches!(
            check_new_link(&links, c, a),
            Err(EngineError::CycleDetected)
        ));
        // A fresh pair is fine.
        assert!(check_new_link(&links, c, Uuid::new_v4()).is_ok());
    }

    #[test]
    fn depth_bound_is_enforced() {
        // Chain of MAX_CHAIN_DEPTH edges: 0 → 1 → … → 32.
        let ids: Vec<Uuid> = (0..=MAX_CHAIN_DEPTH).map(|_| Uuid::new_v4()).collect();
        let links: Vec<Link> = ids
            .windows(2)
            .map(|pair| link_between(pair[0], pair[1]))
            .collect();
        let graph = LinkGraph::build(&links);
        assert_eq!(graph.depth_of(ids[MAX_CHAIN_DEPTH]), MAX_CHAIN_DEPTH);
        // One more edge below the deepest node pushes past the bound.
        assert!(matches!(
            check_new_link(&links, ids[MAX_CHAIN_DEPTH], Uuid::new_v4()),
            Err(EngineError::ChainDepthExceeded(_))
        ));
        // Attaching a parent above the root also pushes the leaf past 32.
        assert!(matches!(
            check_new_link(&links, Uuid::new_v4(), ids[0]),
            Err(EngineError::ChainDepthExceeded(_))
        ));
    }

    #[test]
    fn window_derivation() {
        let link = Link::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            LinkSpec {
                target_distance: 30,
                early_wobble: 10,
                late_wobble: 20,
            },
        );
        let parent_end = parse_datetime("2025-01-15T10:00:00").unwrap();
        let target = link.target_from(parent_end);
        assert_eq!(target, parse_datetime("2025-01-15T10:30:00").unwrap());
        let (earliest, latest) = link.window_around(target);
        assert_eq!(earliest, parse_datetime("2025-01-15T10:20:00").unwrap());
        assert_eq!(latest, parse_datetime("2025-01-15T10:50:00").unwrap());
    }

    #[test]
    fn depths_order_roots_first() {
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let links = vec![link_between(a, b), link_between(b, c)];
        let depths = LinkGraph::build(&links).depths();
        assert_eq!(depths[&a], 0);
        assert_eq!(depths[&b], 1);
        assert_eq!(depths[&c], 2);
    }
}
