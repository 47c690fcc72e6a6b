//! Hierarchical Navigable Small World (HNSW) approximate nearest neighbor index.
//!
//! The graph keeps exact f32 vectors in a fixed-capacity arena indexed by dense
//! internal ids, with one lock-protected neighbor list per node per layer. Layer
//! assignment follows an exponential distribution with multiplier `1 / ln(M)`, so
//! each layer holds roughly `1/M` of the nodes of the layer below.
//!
//! Inserts and searches both take `&self` and may run concurrently; searches only
//! ever take read locks.

/// Fixed-capacity node storage: vectors and per-layer adjacency lists.
pub mod arena;
/// Distance metrics: squared euclidean, inner product, and caller-supplied.
pub mod distance;
/// HNSW graph root: build parameters, entry point, and level generator.
pub mod graph;
/// HNSW insertion with bidirectional connections and heuristic pruning.
pub mod insert;
/// Label ↔ internal id mapping.
pub mod labels;
/// HNSW search: greedy descent, single-layer beam search, and multi-layer KNN.
pub mod search;
/// Epoch-stamped visited set for graph traversal.
pub mod visited;

pub use distance::{DistanceFn, DistanceKind};
pub use graph::{EntryPoint, HnswGraph, HnswParams};
pub use search::{brute_force_knn, knn_search, knn_search_filtered};
