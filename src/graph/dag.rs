//! dag.rs
//! "Item depends on item" graph over line-item codes, backed by petgraph.
//! Edges are stored dependency -> dependent so a Kahn pass can pop ready
//! items directly.

use crate::error::EngineError;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    graph: DiGraph<String, ()>,
    index: HashMap<String, NodeIndex>,
}

impl DependencyGraph {
    pub fn new() -> Self { Self::default() }

    /// Adds a node once; returns the existing index for a known code.
    pub fn add_node(&mut self, code: &str) -> NodeIndex {
        if let Some(&idx) = self.index.get(code) {
            return idx;
        }
        let idx = self.graph.add_node(code.to_string());
        self.index.insert(code.to_string(), idx);
        idx
    }

    /// Records that `from` depends on `to`. Unknown codes become nodes.
    pub fn add_edge(&mut self, from: &str, to: &str) {
        let dependent = self.add_node(from);
        let dependency = self.add_node(to);
        self.graph.update_edge(dependency, dependent, ());
    }

    pub fn contains(&self, code: &str) -> bool { self.index.contains_key(code) }
    pub fn node_count(&self) -> usize { self.graph.node_count() }
    pub fn edge_count(&self) -> usize { self.graph.edge_count() }

    pub fn has_edge(&self, from: &str, to: &str) -> bool {
        match (self.index.get(from), self.index.get(to)) {
            (Some(&dependent), Some(&dependency)) => self.graph.contains_edge(dependency, dependent),
            _ => false,
        }
    }

    /// Codes `code` reads directly, in insertion order.
    pub fn dependencies_of(&self, code: &str) -> Vec<&str> {
        self.neighbours(code, Direction::Incoming)
    }

    /// Codes that read `code` directly, in insertion order.
    pub fn dependents_of(&self, code: &str) -> Vec<&str> {
        self.neighbours(code, Direction::Outgoing)
    }

    fn neighbours(&self, code: &str, dir: Direction) -> Vec<&str> {
        let Some(&idx) = self.index.get(code) else { return Vec::new() };
        let mut found: Vec<NodeIndex> = self.graph.neighbors_directed(idx, dir).collect();
        found.sort();
        found.into_iter().map(|n| self.graph[n].as_str()).collect()
    }

    // --- Graph Algorithms ---

    /// Kahn's algorithm. Among ready items the one added first goes first,
    /// so the order is stable for a given template.
    pub fn topological_order(&self) -> Result<Vec<String>, EngineError> {
        let count = self.graph.node_count();
        let mut in_degree = vec![0usize; count];
        let mut ready = BinaryHeap::with_capacity(count);
        let mut order = Vec::with_capacity(count);

        for idx in self.graph.node_indices() {
            in_degree[idx.index()] = self.graph.neighbors_directed(idx, Direction::Incoming).count();
            if in_degree[idx.index()] == 0 {
                ready.push(Reverse(idx));
            }
        }

        while let Some(Reverse(idx)) = ready.pop() {
            order.push(self.graph[idx].clone());
            for dependent in self.graph.neighbors_directed(idx, Direction::Outgoing) {
                in_degree[dependent.index()] -= 1;
                if in_degree[dependent.index()] == 0 {
                    ready.push(Reverse(dependent));
                }
            }
        }

        if order.len() != count {
            let cycle = self.find_cycle().unwrap_or_default();
            return Err(EngineError::CyclicDependency { cycle });
        }
        Ok(order)
    }

    pub fn has_cycle(&self) -> bool {
        self.find_cycle().is_some()
    }

    /// A cycle as `[A, B, ..., A]` where each code depends on the next, or
    /// `None` for an acyclic graph.
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        let remaining = self.cyclic_remainder();
        let start = *remaining.iter().min()?;

        // Every remaining node still depends on another remaining node, so
        // following dependencies must revisit a node.
        let mut path = vec![start];
        let mut position = HashMap::from([(start, 0usize)]);
        let mut current = start;
        loop {
            let next = self
                .graph
                .neighbors_directed(current, Direction::Incoming)
                .filter(|n| remaining.contains(n))
                .min()?;
            if let Some(&at) = position.get(&next) {
                let mut cycle: Vec<String> =
                    path[at..].iter().map(|&n| self.graph[n].clone()).collect();
                cycle.push(self.graph[next].clone());
                return Some(cycle);
            }
            position.insert(next, path.len());
            path.push(next);
            current = next;
        }
    }

    /// Nodes left over after repeatedly stripping nodes without remaining
    /// dependencies. Empty exactly when the graph is acyclic.
    fn cyclic_remainder(&self) -> HashSet<NodeIndex> {
        let mut in_degree: Vec<usize> = self
            .graph
            .node_indices()
            .map(|idx| self.graph.neighbors_directed(idx, Direction::Incoming).count())
            .collect();
        let mut queue: VecDeque<NodeIndex> =
            self.graph.node_indices().filter(|idx| in_degree[idx.index()] == 0).collect();
        let mut removed = HashSet::new();

        while let Some(idx) = queue.pop_front() {
            removed.insert(idx);
            for dependent in self.graph.neighbors_directed(idx, Direction::Outgoing) {
                in_degree[dependent.index()] -= 1;
                if in_degree[dependent.index()] == 0 {
                    queue.push_back(dependent);
                }
            }
        }
        self.graph.node_indices().filter(|idx| !removed.contains(idx)).collect()
    }

    /// Every code that transitively reads one of `start`, the start codes
    /// included.
    pub fn downstream_from(&self, start: &[&str]) -> HashSet<String> {
        let mut visited = HashSet::new();
        let mut queue: VecDeque<NodeIndex> =
            start.iter().filter_map(|code| self.index.get(*code).copied()).collect();

        while let Some(idx) = queue.pop_front() {
            if visited.insert(idx) {
                queue.extend(self.graph.neighbors_directed(idx, Direction::Outgoing));
            }
        }
        visited.into_iter().map(|idx| self.graph[idx].clone()).collect()
    }
}
