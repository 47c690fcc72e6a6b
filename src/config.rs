//! Global configuration constants for the HNSW engine.
//!
//! All tuning defaults, input validation limits, and snapshot format markers are
//! defined here. Runtime parameters are carried by [`HnswParams`](crate::HnswParams).

/// Default number of bidirectional links per node on layers above 0.
///
/// Layer 0 allows twice as many. Higher values improve recall but increase
/// memory and build time. Typical range: 8–64.
pub const HNSW_DEFAULT_M: usize = 16;

/// Default beam width during index construction.
///
/// Controls the size of the dynamic candidate list during insertion.
/// Higher values produce a better graph but slow down build time.
pub const HNSW_DEFAULT_EF_CONSTRUCTION: usize = 200;

/// Default beam width during search.
///
/// The effective width is always at least `k`.
pub const HNSW_DEFAULT_EF_SEARCH: usize = 10;

/// Default seed for the level generator.
pub const HNSW_DEFAULT_SEED: u64 = 100;

/// Number of layers a node may occupy. Levels are clamped to `HNSW_MAX_LEVEL - 1`.
pub const HNSW_MAX_LEVEL: usize = 16;

/// Smallest accepted `M`. The level multiplier `1 / ln(M)` is undefined below 2.
pub const HNSW_MIN_M: usize = 2;

/// Largest accepted `M`.
pub const HNSW_MAX_M: usize = 4096;

/// Maximum allowed vector dimension.
pub const MAX_DIMENSION: usize = 65_536;

/// Maximum arena capacity. Internal ids are `u32` and `u32::MAX` marks "no entry point".
pub const MAX_ELEMENTS: usize = (u32::MAX - 1) as usize;

/// Number of node slots committed at a time by the arena.
pub const ARENA_SEGMENT_SIZE: usize = 1024;

/// Number of segments per arena directory page. Pages are also committed on first use,
/// so an arena's fixed footprint is one pointer per `SEGMENT_SIZE * DIRECTORY_SIZE` slots.
pub const ARENA_DIRECTORY_SIZE: usize = 1024;

/// Leading magic bytes of a snapshot.
pub const SNAPSHOT_MAGIC: &[u8; 4] = b"HNSW";

/// Snapshot layout version written by this crate.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Magic bytes preceding the CRC32 footer of a snapshot.
pub const SNAPSHOT_CRC_MAGIC: &[u8; 4] = b"HCRC";
