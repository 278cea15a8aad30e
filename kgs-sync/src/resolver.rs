//! Dependency graph over loaded manifests.
//!
//! Edges run from prerequisite to dependent. Node indices follow load order,
//! which is also the tie-breaker wherever the partial order leaves a choice.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use tracing::warn;

use kgs_core::ManifestId;

use crate::depends::Declared;
use crate::error::SyncError;

pub struct DependencyGraph {
    graph: DiGraph<ManifestId, ()>,
    nodes: HashMap<ManifestId, NodeIndex>,
    /// Nodes named anywhere in the ordering file.
    declared: HashSet<NodeIndex>,
}

impl DependencyGraph {
    /// Build the graph for `ids` (in load order) from the ordering file.
    ///
    /// Keys that name no loaded manifest are ignored with a warning; a
    /// prerequisite that names no loaded manifest is an error, as is a cycle.
    pub fn build(ids: &[ManifestId], declared: &Declared) -> Result<Self, SyncError> {
        let mut graph = DiGraph::new();
        let mut nodes = HashMap::new();
        for id in ids {
            let idx = graph.add_node(id.clone());
            nodes.insert(id.clone(), idx);
        }

        let mut named = HashSet::new();
        for (id, prerequisites) in declared {
            let Some(&dependent) = nodes.get(&ManifestId::from(id.as_str())) else {
                warn!(id = %id, "depends.yaml names an unknown manifest; ignoring its entry");
                continue;
            };
            named.insert(dependent);
            for prerequisite in prerequisites {
                let Some(&before) = nodes.get(&ManifestId::from(prerequisite.as_str())) else {
                    return Err(SyncError::UnknownPrerequisite {
                        id: id.clone(),
                        prerequisite: prerequisite.clone(),
                    });
                };
                named.insert(before);
                graph.update_edge(before, dependent, ());
            }
        }

        let dag = Self {
            graph,
            nodes,
            declared: named,
        };
        dag.verify_acyclic()?;
        Ok(dag)
    }

    fn verify_acyclic(&self) -> Result<(), SyncError> {
        if toposort(&self.graph, None).is_ok() {
            return Ok(());
        }
        let mut members: Vec<String> = tarjan_scc(&self.graph)
            .into_iter()
            .filter(|scc| scc.len() > 1 || self.graph.contains_edge(scc[0], scc[0]))
            .flatten()
            .map(|idx| self.graph[idx].to_string())
            .collect();
        members.sort();
        Err(SyncError::Cycle { members })
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Direct prerequisites of `id`, in load order.
    pub fn prerequisites(&self, id: &ManifestId) -> Vec<ManifestId> {
        let Some(&idx) = self.nodes.get(id) else {
            return Vec::new();
        };
        let mut before: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(idx, Direction::Incoming)
            .collect();
        before.sort();
        before.into_iter().map(|i| self.graph[i].clone()).collect()
    }

    /// Total order for sequential runs: manifests named in the ordering file
    /// first, topologically sorted, then the rest in load order.
    pub fn sequential_order(&self) -> Vec<ManifestId> {
        let mut in_degree: HashMap<NodeIndex, usize> = self
            .declared
            .iter()
            .map(|&idx| (idx, self.graph.neighbors_directed(idx, Direction::Incoming).count()))
            .collect();
        let mut heap: BinaryHeap<Reverse<NodeIndex>> = in_degree
            .iter()
            .filter(|&(_, &deg)| deg == 0)
            .map(|(&idx, _)| Reverse(idx))
            .collect();

        let mut order = Vec::with_capacity(self.len());
        while let Some(Reverse(idx)) = heap.pop() {
            order.push(self.graph[idx].clone());
            for next in self.graph.neighbors_directed(idx, Direction::Outgoing) {
                if let Some(deg) = in_degree.get_mut(&next) {
                    *deg -= 1;
                    if *deg == 0 {
                        heap.push(Reverse(next));
                    }
                }
            }
        }

        order.extend(
            self.graph
                .node_indices()
                .filter(|idx| !self.declared.contains(idx))
                .map(|idx| self.graph[idx].clone()),
        );
        order
    }

    /// Readiness tracker for concurrent runs.
    pub fn ready_set(&self) -> ReadySet<'_> {
        let waiting = self
            .graph
            .node_indices()
            .map(|idx| self.graph.neighbors_directed(idx, Direction::Incoming).count())
            .collect();
        ReadySet {
            dag: self,
            waiting,
            handed_out: vec![false; self.len()],
            terminal: 0,
        }
    }
}

/// Hands out manifests whose prerequisites are all terminal.
///
/// Owned by the scheduler loop; completions are reported one at a time
/// through [`ReadySet::complete`].
pub struct ReadySet<'a> {
    dag: &'a DependencyGraph,
    /// Unfinished prerequisites per node.
    waiting: Vec<usize>,
    handed_out: Vec<bool>,
    terminal: usize,
}

impl ReadySet<'_> {
    /// Manifests that became ready since the last call, in load order.
    pub fn take_ready(&mut self) -> Vec<ManifestId> {
        let mut ready = Vec::new();
        for idx in self.dag.graph.node_indices() {
            let i = idx.index();
            if !self.handed_out[i] && self.waiting[i] == 0 {
                self.handed_out[i] = true;
                ready.push(self.dag.graph[idx].clone());
            }
        }
        ready
    }

    /// Record that `id` reached a terminal result.
    pub fn complete(&mut self, id: &ManifestId) {
        let Some(&idx) = self.dag.nodes.get(id) else {
            return;
        };
        self.terminal += 1;
        for next in self.dag.graph.neighbors_directed(idx, Direction::Outgoing) {
            let slot = &mut self.waiting[next.index()];
            *slot = slot.saturating_sub(1);
        }
    }

    /// Every manifest has been reported terminal.
    pub fn is_finished(&self) -> bool {
        self.terminal >= self.dag.len()
    }
}
