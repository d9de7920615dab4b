//! Graph Module
//!
//! Dependency bookkeeping primitives:
//! - Directed graph with inverse adjacency
//! - Induced reachability subgraphs
//! - Forward and backward topological iteration

pub mod digraph;

pub use digraph::{Digraph, TopoSort};
