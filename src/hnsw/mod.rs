//! Hierarchical Navigable Small World graph.
//!
//! Layered proximity graph with logarithmic-expected-time approximate
//! nearest neighbor search. Nodes mirror the storage slot table; deleted
//! vectors stay in the graph as tombstones until neighborhoods are
//! rewritten or the index is compacted on save.

/// Graph structure and tuning parameters.
pub mod graph;
/// Insertion with heuristic neighbor selection.
pub mod insert;
/// Layer search, k-NN queries, and filtered variants.
pub mod search;
/// Generation-stamped visited set for traversal.
pub mod visited;

pub use graph::{GraphConfig, HnswGraph};
pub use search::{knn_search, knn_search_filtered};
pub use visited::VisitedSet;
