//! # hnsw-index
//!
//! An embeddable approximate nearest neighbor engine built on a Hierarchical
//! Navigable Small World (HNSW) graph.
//!
//! ## Features
//!
//! - **Layered proximity graph** with exponential level assignment and
//!   diversity-pruned neighbor lists
//! - **Concurrent inserts and searches** through per-node adjacency locks; all
//!   item operations take `&self`
//! - **Fixed-capacity arena** with dense internal ids and a bijective label map
//! - **Checksummed binary snapshots** that restore the graph verbatim
//!
//! ## Architecture
//!
//! ```text
//! Index (facade) → HnswGraph → { Arena, LabelMap, EntryPoint }
//!                            → insert (graph builder) / search (beam search)
//! Persistence: codec (fixed little-endian layout + CRC32) → atomic file write
//! ```
//!
//! ## Example
//!
//! ```
//! use hnsw_index::{DistanceKind, Index};
//!
//! let index = Index::new(DistanceKind::Euclidean, 2);
//! index.init_new_index(100, 16, 200, 100).unwrap();
//! index.add_item(&[0.0, 0.0], 1).unwrap();
//! index.add_item(&[1.0, 1.0], 2).unwrap();
//!
//! let (labels, distances) = index.knn_query(&[0.9, 0.9], 1).unwrap();
//! assert_eq!(labels, vec![2]);
//! assert!(distances[0] < 0.1);
//! ```

/// Global configuration constants: defaults, limits, and snapshot format markers.
pub mod config;
/// Error taxonomy shared by every layer.
pub mod error;
/// HNSW engine: distance functions, arena, label map, graph builder, and search.
pub mod hnsw;
/// Collaborator-facing facade driving a single index.
pub mod index;
/// Binary snapshot codec and file persistence.
pub mod storage;

pub use error::{HnswError, Result};
pub use hnsw::{DistanceFn, DistanceKind, HnswGraph, HnswParams};
pub use index::Index;
