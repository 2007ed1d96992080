//! In-memory network topology.
//!
//! Vertices are the dense range `[0, n)`. Edges are undirected and stored as
//! two consistent directed entries. The original edge list and the per-edge
//! reliability map are kept separately from the live adjacency, so the
//! reliability updater can re-add edges it removed earlier.

pub mod document;
pub mod generators;

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::OnceLock;

use crate::error::{SimError, SimResult};

pub use document::{EdgeRecord, GraphBody, GraphDocument};
pub use generators::GraphSpec;

/// Undirected edge key with `u <= w`.
pub type EdgeKey = (usize, usize);

fn key(v: usize, w: usize) -> EdgeKey {
    if v <= w {
        (v, w)
    } else {
        (w, v)
    }
}

#[derive(Debug, Clone)]
pub struct Topology {
    adjacency: Vec<BTreeSet<usize>>,
    edges: Vec<EdgeKey>,
    reliability: HashMap<EdgeKey, f64>,
    diameter: OnceLock<usize>,
}

impl Topology {
    /// Create an edgeless topology on `order` vertices.
    pub fn new(order: usize) -> Self {
        Self {
            adjacency: vec![BTreeSet::new(); order],
            edges: Vec::new(),
            reliability: HashMap::new(),
            diameter: OnceLock::new(),
        }
    }

    /// Build a topology from an undirected edge list, giving every edge the
    /// same reliability probability.
    pub fn from_edges(
        order: usize,
        edges: impl IntoIterator<Item = EdgeKey>,
        reliability: f64,
    ) -> SimResult<Self> {
        let mut topology = Topology::new(order);
        for (v, w) in edges {
            topology.insert_edge(v, w, reliability)?;
        }
        Ok(topology)
    }

    /// Register an edge in the original edge set and make it present.
    /// Duplicates and self-loops are ignored.
    pub fn insert_edge(&mut self, v: usize, w: usize, reliability: f64) -> SimResult<()> {
        self.check_vertex(v)?;
        self.check_vertex(w)?;
        if v == w {
            return Ok(());
        }
        let k = key(v, w);
        if self.reliability.insert(k, reliability).is_none() {
            self.edges.push(k);
        }
        self.add_edge(v, w)
    }

    /// Number of vertices.
    pub fn order(&self) -> usize {
        self.adjacency.len()
    }

    /// Current number of neighbors of `v` (0 for unknown vertices).
    pub fn degree(&self, v: usize) -> usize {
        self.adjacency.get(v).map_or(0, BTreeSet::len)
    }

    /// Call `f(neighbor, weight)` for every current neighbor of `v` in
    /// ascending order. `f` returns `true` to stop early; the return value
    /// reports whether the visit was cut short.
    pub fn visit<F>(&self, v: usize, mut f: F) -> bool
    where
        F: FnMut(usize, i64) -> bool,
    {
        let Some(neighbors) = self.adjacency.get(v) else {
            return false;
        };
        for &w in neighbors {
            if f(w, 0) {
                return true;
            }
        }
        false
    }

    pub fn neighbors(&self, v: usize) -> impl Iterator<Item = usize> + '_ {
        self.adjacency.get(v).into_iter().flatten().copied()
    }

    pub fn edge_exists(&self, v: usize, w: usize) -> bool {
        self.adjacency.get(v).is_some_and(|n| n.contains(&w))
    }

    /// Make the undirected edge `{v, w}` present.
    pub fn add_edge(&mut self, v: usize, w: usize) -> SimResult<()> {
        self.check_vertex(v)?;
        self.check_vertex(w)?;
        if v != w {
            self.adjacency[v].insert(w);
            self.adjacency[w].insert(v);
        }
        Ok(())
    }

    /// Make the undirected edge `{v, w}` absent.
    pub fn remove_edge(&mut self, v: usize, w: usize) -> SimResult<()> {
        self.check_vertex(v)?;
        self.check_vertex(w)?;
        self.adjacency[v].remove(&w);
        self.adjacency[w].remove(&v);
        Ok(())
    }

    /// Per-vertex count of original edges, an upper bound on the degree
    /// under any edge churn.
    pub fn original_degrees(&self) -> Vec<usize> {
        let mut degrees = vec![0; self.order()];
        for &(v, w) in &self.edges {
            degrees[v] += 1;
            degrees[w] += 1;
        }
        degrees
    }

    /// Every edge the topology was built with, present or not.
    pub fn original_edges(&self) -> &[EdgeKey] {
        &self.edges
    }

    /// Edges currently present, each undirected edge once.
    pub fn current_edges(&self) -> Vec<EdgeKey> {
        self.adjacency
            .iter()
            .enumerate()
            .flat_map(|(v, n)| n.range(v + 1..).map(move |&w| (v, w)))
            .collect()
    }

    pub fn edge_count(&self) -> usize {
        self.adjacency.iter().map(BTreeSet::len).sum::<usize>() / 2
    }

    /// Reliability probability configured for `{v, w}`, `0.0` if unknown.
    pub fn reliability(&self, v: usize, w: usize) -> f64 {
        self.reliability.get(&key(v, w)).copied().unwrap_or(0.0)
    }

    /// Change the reliability of an edge from the original edge set.
    /// Unknown pairs are rejected so the original set never grows.
    pub fn set_reliability(&mut self, v: usize, w: usize, p: f64) -> SimResult<()> {
        match self.reliability.get_mut(&key(v, w)) {
            Some(slot) => {
                *slot = p;
                Ok(())
            }
            None => Err(SimError::Validation(format!(
                "{{{v}, {w}}} is not an edge of the topology"
            ))),
        }
    }

    /// Maximum finite shortest-path distance, computed once and cached.
    /// Disconnected pairs are ignored.
    pub fn diameter(&self) -> usize {
        *self.diameter.get_or_init(|| self.compute_diameter())
    }

    /// Override the cached diameter (e.g. with a closed-form value).
    pub fn set_diameter(&mut self, diameter: usize) {
        self.diameter = OnceLock::from(diameter);
    }

    fn compute_diameter(&self) -> usize {
        let n = self.order();
        let mut best = 0;
        let mut dist = vec![usize::MAX; n];
        let mut queue = VecDeque::new();
        for source in 0..n {
            dist.fill(usize::MAX);
            dist[source] = 0;
            queue.push_back(source);
            while let Some(v) = queue.pop_front() {
                for &w in &self.adjacency[v] {
                    if dist[w] == usize::MAX {
                        dist[w] = dist[v] + 1;
                        best = best.max(dist[w]);
                        queue.push_back(w);
                    }
                }
            }
        }
        best
    }

    fn check_vertex(&self, v: usize) -> SimResult<()> {
        if v < self.order() {
            Ok(())
        } else {
            Err(SimError::NodeNotFound(v))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(n: usize) -> Topology {
        Topology::from_edges(n, (0..n.saturating_sub(1)).map(|i| (i, i + 1)), 0.5).unwrap()
    }

    #[test]
    fn test_edges_are_symmetric() {
        let mut t = Topology::new(3);
        t.add_edge(0, 2).unwrap();
        assert!(t.edge_exists(0, 2));
        assert!(t.edge_exists(2, 0));
        assert_eq!(t.degree(0), 1);
        assert_eq!(t.degree(2), 1);

        t.remove_edge(2, 0).unwrap();
        assert!(!t.edge_exists(0, 2));
        assert!(!t.edge_exists(2, 0));
        assert_eq!(t.edge_count(), 0);
    }

    #[test]
    fn test_out_of_range_vertex_rejected() {
        let mut t = Topology::new(2);
        assert_eq!(t.add_edge(0, 5), Err(SimError::NodeNotFound(5)));
    }

    #[test]
    fn test_visit_supports_early_exit() {
        let t = Topology::from_edges(4, [(0, 1), (0, 2), (0, 3)], 0.0).unwrap();
        let mut seen = Vec::new();
        let stopped = t.visit(0, |w, _| {
            seen.push(w);
            w == 2
        });
        assert!(stopped);
        assert_eq!(seen, vec![1, 2]);
    }

    #[test]
    fn test_removed_edge_stays_in_original_set() {
        let mut t = path(3);
        t.remove_edge(0, 1).unwrap();
        assert_eq!(t.original_edges(), &[(0, 1), (1, 2)]);
        assert_eq!(t.current_edges(), vec![(1, 2)]);
        assert_eq!(t.reliability(1, 0), 0.5);
    }

    #[test]
    fn test_set_reliability_only_touches_known_edges() {
        let mut t = Topology::from_edges(3, [(0, 1)], 0.5).unwrap();
        t.remove_edge(0, 1).unwrap();
        t.set_reliability(1, 0, 0.25).unwrap();
        assert_eq!(t.reliability(0, 1), 0.25);

        assert!(matches!(
            t.set_reliability(1, 2, 0.9),
            Err(SimError::Validation(_))
        ));
        assert_eq!(t.original_edges(), &[(0, 1)]);
        assert_eq!(t.reliability(1, 2), 0.0);
        assert_eq!(t.original_degrees(), vec![1, 1, 0]);
    }

    #[test]
    fn test_path_diameter() {
        assert_eq!(path(1).diameter(), 0);
        assert_eq!(path(7).diameter(), 6);
    }

    #[test]
    fn test_diameter_ignores_disconnected_pairs() {
        let t = Topology::from_edges(5, [(0, 1), (1, 2), (3, 4)], 0.0).unwrap();
        assert_eq!(t.diameter(), 2);
    }

    #[test]
    fn test_diameter_is_cached_and_overridable() {
        let mut t = path(4);
        assert_eq!(t.diameter(), 3);
        t.remove_edge(1, 2).unwrap();
        assert_eq!(t.diameter(), 3);
        t.set_diameter(10);
        assert_eq!(t.diameter(), 10);
    }
}
