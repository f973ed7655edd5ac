//! Corpus-wide processing order for compilation units.

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use rustc_hash::FxHashMap;

/// Position of a unit in the corpus: document ordinal, then unit index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitKey {
    pub document: usize,
    pub unit: usize,
}

/// Directed acyclic ordering over all units of a run.
///
/// Units of one document are chained in unit order, and the last unit of
/// each document precedes the first unit of the next document in
/// curriculum order. The schedule only decides processing order; it never
/// causes a unit to be skipped.
pub struct UnitSchedule {
    /// Edges go from the earlier unit to the later one
    graph: DiGraph<UnitKey, ()>,
    /// Unit key to node index mapping
    node_indices: FxHashMap<UnitKey, NodeIndex>,
}

impl UnitSchedule {
    /// Create an empty schedule.
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            node_indices: FxHashMap::default(),
        }
    }

    /// Build the curriculum chain for a set of unit keys.
    pub fn from_keys(keys: impl IntoIterator<Item = UnitKey>) -> Self {
        let mut keys: Vec<UnitKey> = keys.into_iter().collect();
        keys.sort_unstable();
        keys.dedup();

        let mut schedule = Self::new();
        for key in &keys {
            schedule.add_unit(*key);
        }
        for pair in keys.windows(2) {
            schedule.add_dependency(pair[0], pair[1]);
        }
        schedule
    }

    /// Add a unit node.
    pub fn add_unit(&mut self, key: UnitKey) {
        if !self.node_indices.contains_key(&key) {
            let idx = self.graph.add_node(key);
            self.node_indices.insert(key, idx);
        }
    }

    /// Require `before` to be processed ahead of `after`.
    pub fn add_dependency(&mut self, before: UnitKey, after: UnitKey) {
        self.add_unit(before);
        self.add_unit(after);
        let (a, b) = (self.node_indices[&before], self.node_indices[&after]);
        self.graph.add_edge(a, b, ());
    }

    /// Units in processing order.
    ///
    /// The chain built by [`UnitSchedule::from_keys`] is acyclic; if extra
    /// dependencies introduce a cycle the schedule falls back to key order.
    pub fn topological_order(&self) -> Vec<UnitKey> {
        match toposort(&self.graph, None) {
            Ok(nodes) => nodes.into_iter().map(|idx| self.graph[idx]).collect(),
            Err(cycle) => {
                tracing::warn!(
                    "Cycle in unit schedule at {:?}; falling back to document order",
                    self.graph[cycle.node_id()]
                );
                let mut keys: Vec<UnitKey> = self.graph.node_weights().copied().collect();
                keys.sort_unstable();
                keys
            }
        }
    }

    /// Number of scheduled units.
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    /// Check if the schedule is empty.
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }
}

impl Default for UnitSchedule {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(document: usize, unit: usize) -> UnitKey {
        UnitKey { document, unit }
    }

    #[test]
    fn test_empty_schedule() {
        let schedule = UnitSchedule::new();
        assert!(schedule.is_empty());
        assert!(schedule.topological_order().is_empty());
    }

    #[test]
    fn test_curriculum_chain() {
        let schedule = UnitSchedule::from_keys([key(1, 0), key(0, 1), key(0, 0), key(2, 0), key(1, 1)]);
        assert_eq!(schedule.len(), 5);
        assert_eq!(
            schedule.topological_order(),
            vec![key(0, 0), key(0, 1), key(1, 0), key(1, 1), key(2, 0)]
        );
    }

    #[test]
    fn test_cycle_falls_back_to_key_order() {
        let mut schedule = UnitSchedule::from_keys([key(0, 0), key(0, 1)]);
        schedule.add_dependency(key(0, 1), key(0, 0));
        assert_eq!(schedule.topological_order(), vec![key(0, 0), key(0, 1)]);
    }
}
