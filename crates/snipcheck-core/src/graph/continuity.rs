//! Continuity links between the snippets of one document.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use petgraph::algo::kosaraju_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::unionfind::UnionFind;
use rustc_hash::FxHashSet;
use serde::Serialize;

/// Directed edge: `to` is compiled together with, and after, `from`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ContinuityLink {
    /// Sequence index of the earlier snippet.
    pub from: usize,
    /// Sequence index of the continuing snippet.
    pub to: usize,
    /// Declared with `continues=` rather than inferred.
    pub explicit: bool,
}

/// Ordering of a group of linked snippets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnippetOrder {
    /// Snippet indices in compilation order.
    pub order: Vec<usize>,
    /// Snippets caught in a link cycle (empty when acyclic).
    pub cycle: Vec<usize>,
}

/// Link graph over the snippets of a single document.
///
/// Node `i` is the snippet with sequence index `i`.
pub struct ContinuityGraph {
    graph: DiGraph<usize, ()>,
}

impl ContinuityGraph {
    /// Create a graph with one node per snippet.
    pub fn new(snippet_count: usize) -> Self {
        let mut graph = DiGraph::with_capacity(snippet_count, snippet_count);
        for i in 0..snippet_count {
            graph.add_node(i);
        }
        Self { graph }
    }

    /// Record a link. Self-links are ignored.
    pub fn add_link(&mut self, link: &ContinuityLink) {
        if link.from == link.to {
            return;
        }
        let from = NodeIndex::new(link.from);
        let to = NodeIndex::new(link.to);
        if self.graph.find_edge(from, to).is_none() {
            self.graph.add_edge(from, to, ());
        }
    }

    /// Group `members` into connected components of the (undirected) link graph.
    ///
    /// Components are returned sorted by their lowest snippet index, each
    /// component sorted ascending.
    pub fn components(&self, members: &[usize]) -> Vec<Vec<usize>> {
        let member_set: FxHashSet<usize> = members.iter().copied().collect();
        let mut sets = UnionFind::<usize>::new(self.graph.node_count());

        for edge in self.graph.raw_edges() {
            let (a, b) = (edge.source().index(), edge.target().index());
            if member_set.contains(&a) && member_set.contains(&b) {
                sets.union(a, b);
            }
        }

        let mut groups: Vec<Vec<usize>> = Vec::new();
        let mut sorted: Vec<usize> = members.to_vec();
        sorted.sort_unstable();
        sorted.dedup();

        for member in sorted {
            let root = sets.find(member);
            match groups.iter_mut().find(|g| sets.find(g[0]) == root) {
                Some(group) => group.push(member),
                None => groups.push(vec![member]),
            }
        }

        groups
    }

    /// Snippets involved in link cycles, one list per cycle.
    pub fn cycles(&self) -> Vec<Vec<usize>> {
        kosaraju_scc(&self.graph)
            .into_iter()
            .filter(|scc| scc.len() > 1)
            .map(|scc| {
                let mut nodes: Vec<usize> = scc.iter().map(|&idx| self.graph[idx]).collect();
                nodes.sort_unstable();
                nodes
            })
            .collect()
    }

    /// Order a component topologically, breaking ties by document order.
    ///
    /// When the component contains a cycle, the whole component falls back
    /// to document order and the cycle is returned for reporting.
    pub fn order(&self, component: &[usize]) -> SnippetOrder {
        let in_component: FxHashSet<usize> = component.iter().copied().collect();

        let cycle: Vec<usize> = self
            .cycles()
            .into_iter()
            .filter(|scc| scc.iter().any(|n| in_component.contains(n)))
            .flatten()
            .collect();

        if !cycle.is_empty() {
            let mut order = component.to_vec();
            order.sort_unstable();
            return SnippetOrder { order, cycle };
        }

        // Kahn's algorithm with a min-heap for deterministic tie-breaking.
        let mut indegree: Vec<usize> = vec![0; self.graph.node_count()];
        for edge in self.graph.raw_edges() {
            let (a, b) = (edge.source().index(), edge.target().index());
            if in_component.contains(&a) && in_component.contains(&b) {
                indegree[b] += 1;
            }
        }

        let mut ready: BinaryHeap<Reverse<usize>> = component
            .iter()
            .copied()
            .filter(|&n| indegree[n] == 0)
            .map(Reverse)
            .collect();

        let mut order = Vec::with_capacity(component.len());
        while let Some(Reverse(node)) = ready.pop() {
            order.push(node);
            for next in self.graph.neighbors(NodeIndex::new(node)) {
                let next = self.graph[next];
                if !in_component.contains(&next) {
                    continue;
                }
                indegree[next] -= 1;
                if indegree[next] == 0 {
                    ready.push(Reverse(next));
                }
            }
        }

        SnippetOrder {
            order,
            cycle: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(from: usize, to: usize) -> ContinuityLink {
        ContinuityLink {
            from,
            to,
            explicit: false,
        }
    }

    #[test]
    fn test_components() {
        let mut graph = ContinuityGraph::new(6);
        graph.add_link(&link(0, 1));
        graph.add_link(&link(1, 2));
        graph.add_link(&link(4, 5));

        let groups = graph.components(&[0, 1, 2, 4, 5]);
        assert_eq!(groups, vec![vec![0, 1, 2], vec![4, 5]]);
    }

    #[test]
    fn test_components_ignore_non_members() {
        let mut graph = ContinuityGraph::new(3);
        graph.add_link(&link(0, 1));
        graph.add_link(&link(1, 2));

        // Snippet 1 is unchecked, so 0 and 2 stay apart.
        let groups = graph.components(&[0, 2]);
        assert_eq!(groups, vec![vec![0], vec![2]]);
    }

    #[test]
    fn test_forward_reference_reorders() {
        let mut graph = ContinuityGraph::new(3);
        // Snippet 0 continues snippet 2.
        graph.add_link(&link(2, 0));
        graph.add_link(&link(0, 1));

        let order = graph.order(&[0, 1, 2]);
        assert_eq!(order.order, vec![2, 0, 1]);
        assert!(order.cycle.is_empty());
    }

    #[test]
    fn test_cycle_falls_back_to_document_order() {
        let mut graph = ContinuityGraph::new(3);
        graph.add_link(&link(0, 1));
        graph.add_link(&link(1, 2));
        graph.add_link(&link(2, 1));

        assert_eq!(graph.cycles(), vec![vec![1, 2]]);

        let order = graph.order(&[0, 1, 2]);
        assert_eq!(order.order, vec![0, 1, 2]);
        assert_eq!(order.cycle, vec![1, 2]);
    }

    #[test]
    fn test_self_link_ignored() {
        let mut graph = ContinuityGraph::new(2);
        graph.add_link(&link(1, 1));
        assert!(graph.cycles().is_empty());
        assert_eq!(graph.order(&[0, 1]).order, vec![0, 1]);
    }
}
