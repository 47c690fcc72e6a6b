//! Storage layer: binary snapshot codec and file persistence.
//!
//! Snapshots carry the full graph (vectors, per-layer adjacency lists, entry point,
//! label table) in a fixed little-endian layout with a CRC32 footer. Loading
//! restores the graph verbatim without re-running insertion.

/// Snapshot encoder/decoder with bounds-checked validation.
pub mod codec;
/// File and stream persistence with atomic writes.
pub mod persistence;

pub use persistence::{load_from_reader, load_graph, save_graph, save_to_writer};
