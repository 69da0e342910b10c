//! Enumeration of the strongly connected components of very large directed
//! graphs with divide-and-conquer strong connectivity (DCSC), executed in
//! bulk-synchronous rounds across a rank-parallel message fabric.
//!
//! The input is an edge list; the output is a component label per vertex
//! plus aggregate statistics (component count, size of the largest). Each
//! round trims trivial components, elects one pivot per weakly connected
//! component through a format-preserving random permutation, floods
//! forward/backward reachability from the pivots, freezes the both-reached
//! intersection, and shears the remaining graph into disjoint sub-problems.

pub mod algorithms;
pub mod config;
pub mod error;
pub mod fabric;
pub mod graph;
pub mod logger;
pub mod permuter;
pub mod stats;
pub mod util;
