//! Directed graph with no isolated vertices and no duplicate edges.
//!
//! Keeps forward (`x -> {y}`) and backward (`y -> {x}`) adjacency as
//! mutual inverses. A vertex exists only while it has an incident edge.

use std::borrow::Borrow;
use std::collections::btree_set;
use std::collections::{BTreeMap, BTreeSet};

/// Directed graph over ordered vertices.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Digraph<V: Ord + Clone> {
    /// Out-neighbors of each vertex with out-edges
    fwd: BTreeMap<V, BTreeSet<V>>,
    /// In-neighbors of each vertex with in-edges
    bck: BTreeMap<V, BTreeSet<V>>,
    /// Returned for vertices without neighbors; never populated
    empty: BTreeSet<V>,
}

impl<V: Ord + Clone> Digraph<V> {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self {
            fwd: BTreeMap::new(),
            bck: BTreeMap::new(),
            empty: BTreeSet::new(),
        }
    }

    /// Add an edge from `x` to `y`. Adding an existing edge is a no-op.
    pub fn add_edge(&mut self, x: V, y: V) {
        self.bck.entry(y.clone()).or_default().insert(x.clone());
        self.fwd.entry(x).or_default().insert(y);
    }

    /// Whether the edge `x -> y` exists.
    pub fn has_edge<Q>(&self, x: &Q, y: &Q) -> bool
    where
        V: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.fwd.get(x).map_or(false, |out| out.contains(y))
    }

    /// Direct successors of `x` (what `x` depends on).
    pub fn edges_from<Q>(&self, x: &Q) -> &BTreeSet<V>
    where
        V: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.fwd.get(x).unwrap_or(&self.empty)
    }

    /// Direct predecessors of `x` (what depends on `x`).
    pub fn edges_to<Q>(&self, x: &Q) -> &BTreeSet<V>
    where
        V: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.bck.get(x).unwrap_or(&self.empty)
    }

    /// Delete all edges from `x`.
    pub fn del_edges_from<Q>(&mut self, x: &Q)
    where
        V: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        if let Some(targets) = self.fwd.remove(x) {
            for y in targets {
                if let Some(sources) = self.bck.get_mut::<V>(&y) {
                    sources.remove(x);
                    if sources.is_empty() {
                        self.bck.remove::<V>(&y);
                    }
                }
            }
        }
    }

    /// Delete all edges into `x`.
    pub fn del_edges_to<Q>(&mut self, x: &Q)
    where
        V: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        if let Some(sources) = self.bck.remove(x) {
            for y in sources {
                if let Some(targets) = self.fwd.get_mut::<V>(&y) {
                    targets.remove(x);
                    if targets.is_empty() {
                        self.fwd.remove::<V>(&y);
                    }
                }
            }
        }
    }

    /// Whether `x` has any incident edge.
    pub fn contains<Q>(&self, x: &Q) -> bool
    where
        V: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.fwd.contains_key(x) || self.bck.contains_key(x)
    }

    /// All vertices, each once.
    pub fn vertices(&self) -> BTreeSet<&V> {
        self.fwd.keys().chain(self.bck.keys()).collect()
    }

    /// Total number of edges.
    pub fn edge_count(&self) -> usize {
        self.fwd.values().map(BTreeSet::len).sum()
    }

    /// Whether the graph has no edges (and so no vertices).
    pub fn is_empty(&self) -> bool {
        self.fwd.is_empty()
    }

    /// Induced subgraph of exactly those vertices that reach `x` by a path.
    ///
    /// `x` itself is part of the result only when something points at it.
    pub fn subgraph_paths_to(&self, x: &V) -> Digraph<V> {
        let mut graph = Digraph::new();
        let mut seen = BTreeSet::new();
        let mut stack = vec![x];

        while let Some(v) = stack.pop() {
            if !seen.insert(v) {
                continue;
            }
            for pred in self.edges_to(v) {
                graph.add_edge(pred.clone(), v.clone());
                if !seen.contains(pred) {
                    stack.push(pred);
                }
            }
        }
        graph
    }

    /// Iterate vertices so that for every edge `x -> y`, `x` comes before
    /// `y`. Dependents are yielded before their dependencies.
    ///
    /// Cycles do not loop forever but have no well-defined order.
    pub fn topo_sort_fwd(&self) -> TopoSort<'_, V> {
        let seeds = self.fwd.keys().chain(self.bck.keys()).collect();
        TopoSort::new(&self.bck, &self.empty, seeds)
    }

    /// Iterate vertices so that for every edge `x -> y`, `x` comes after
    /// `y`. Dependencies are yielded before their dependents.
    pub fn topo_sort_bck(&self) -> TopoSort<'_, V> {
        let seeds = self.bck.keys().chain(self.fwd.keys()).collect();
        TopoSort::new(&self.fwd, &self.empty, seeds)
    }
}

impl<V: Ord + Clone> Default for Digraph<V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Lazy depth-first topological iterator.
///
/// Before yielding a vertex it yields everything reachable from it through
/// `adjacency`, each vertex exactly once.
pub struct TopoSort<'a, V: Ord> {
    adjacency: &'a BTreeMap<V, BTreeSet<V>>,
    empty: &'a BTreeSet<V>,
    seeds: std::vec::IntoIter<&'a V>,
    seen: BTreeSet<&'a V>,
    stack: Vec<(&'a V, btree_set::Iter<'a, V>)>,
}

impl<'a, V: Ord> TopoSort<'a, V> {
    fn new(
        adjacency: &'a BTreeMap<V, BTreeSet<V>>,
        empty: &'a BTreeSet<V>,
        seeds: Vec<&'a V>,
    ) -> Self {
        Self {
            adjacency,
            empty,
            seeds: seeds.into_iter(),
            seen: BTreeSet::new(),
            stack: Vec::new(),
        }
    }

    fn visit(&mut self, v: &'a V) {
        self.seen.insert(v);
        let neighbors = self.adjacency.get(v).unwrap_or(self.empty).iter();
        self.stack.push((v, neighbors));
    }
}

impl<'a, V: Ord> Iterator for TopoSort<'a, V> {
    type Item = &'a V;

    fn next(&mut self) -> Option<&'a V> {
        loop {
            match self.stack.last_mut() {
                Some((vertex, neighbors)) => {
                    let vertex: &'a V = *vertex;
                    let seen = &self.seen;
                    match neighbors.find(|n| !seen.contains(*n)) {
                        Some(n) => self.visit(n),
                        None => {
                            self.stack.pop();
                            return Some(vertex);
                        }
                    }
                }
                None => {
                    let seen = &self.seen;
                    let seed = self.seeds.find(|s| !seen.contains(*s))?;
                    self.visit(seed);
                }
            }
        }
    }
}
