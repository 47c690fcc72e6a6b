//! HNSW graph structure and build parameters.
//!
//! [`HnswParams`] carries the build-time tuning parameters (capacity, M,
//! ef_construction, seed). [`HnswGraph`] owns the arena, the label map, the entry
//! point, and the level generator, and is shared by `&self` between concurrent
//! inserters and searchers.

use crate::config;
use crate::error::{HnswError, Result};
use crate::hnsw::arena::Arena;
use crate::hnsw::distance::{DistanceFn, DistanceKind};
use crate::hnsw::labels::LabelMap;
use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Build parameters for an HNSW graph.
///
/// Controls the trade-off between build speed, search speed, recall, and memory usage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HnswParams {
    /// Fixed arena capacity. Inserts beyond it fail with `CapacityExceeded`.
    pub max_elements: usize,
    /// Number of links per node on layers above 0. Layer 0 allows `2 * m`.
    #[serde(default = "default_m")]
    pub m: usize,
    /// Beam width during index construction.
    #[serde(default = "default_ef_construction")]
    pub ef_construction: usize,
    /// Seed of the level generator.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_m() -> usize {
    config::HNSW_DEFAULT_M
}

fn default_ef_construction() -> usize {
    config::HNSW_DEFAULT_EF_CONSTRUCTION
}

fn default_seed() -> u64 {
    config::HNSW_DEFAULT_SEED
}

impl HnswParams {
    /// Parameters with default M, ef_construction, and seed.
    pub fn with_capacity(max_elements: usize) -> Self {
        Self {
            max_elements,
            m: config::HNSW_DEFAULT_M,
            ef_construction: config::HNSW_DEFAULT_EF_CONSTRUCTION,
            seed: config::HNSW_DEFAULT_SEED,
        }
    }

    /// Check ranges that the algorithm depends on.
    pub fn validate(&self) -> Result<()> {
        if self.max_elements > config::MAX_ELEMENTS {
            return Err(HnswError::InvalidConfig(format!(
                "max_elements {} exceeds limit {}",
                self.max_elements,
                config::MAX_ELEMENTS
            )));
        }
        if !(config::HNSW_MIN_M..=config::HNSW_MAX_M).contains(&self.m) {
            return Err(HnswError::InvalidConfig(format!(
                "M must be in {}..={}, got {}",
                config::HNSW_MIN_M,
                config::HNSW_MAX_M,
                self.m
            )));
        }
        if self.ef_construction == 0 {
            return Err(HnswError::InvalidConfig(
                "ef_construction must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// The topmost node and the layer it sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryPoint {
    pub id: u32,
    pub level: usize,
}

/// A concurrent HNSW graph.
///
/// Vectors and adjacency lists live in the [`Arena`] indexed by internal id; labels
/// resolve through the [`LabelMap`]. The entry point only moves to a higher layer.
pub struct HnswGraph {
    pub(crate) params: HnswParams,
    pub(crate) kind: DistanceKind,
    pub(crate) dist_fn: DistanceFn,
    pub(crate) arena: Arena,
    pub(crate) labels: LabelMap,
    pub(crate) entry: RwLock<Option<EntryPoint>>,
    level_rng: Mutex<StdRng>,
    level_mult: f64,
    ef_search: AtomicUsize,
}

impl std::fmt::Debug for HnswGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HnswGraph")
            .field("params", &self.params)
            .field("kind", &self.kind)
            .field("dimension", &self.dimension())
            .field("len", &self.len())
            .field("entry", &*self.entry.read())
            .finish()
    }
}

impl HnswGraph {
    /// Creates an empty graph. The distance function is resolved here, once.
    pub fn new(kind: DistanceKind, dimension: usize, params: HnswParams) -> Result<Self> {
        if dimension == 0 || dimension > config::MAX_DIMENSION {
            return Err(HnswError::InvalidConfig(format!(
                "dimension must be in 1..={}, got {}",
                config::MAX_DIMENSION,
                dimension
            )));
        }
        params.validate()?;

        Ok(Self {
            kind,
            dist_fn: kind.resolve(),
            arena: Arena::new(dimension, params.max_elements),
            labels: LabelMap::with_capacity(params.max_elements.min(1 << 16)),
            entry: RwLock::new(None),
            level_rng: Mutex::new(StdRng::seed_from_u64(params.seed)),
            level_mult: 1.0 / (params.m as f64).ln(),
            ef_search: AtomicUsize::new(config::HNSW_DEFAULT_EF_SEARCH),
            params,
        })
    }

    pub fn params(&self) -> &HnswParams {
        &self.params
    }

    pub fn kind(&self) -> DistanceKind {
        self.kind
    }

    pub fn dimension(&self) -> usize {
        self.arena.dimension()
    }

    /// Number of points in the graph.
    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.arena.capacity()
    }

    pub fn ef_search(&self) -> usize {
        self.ef_search.load(Ordering::Relaxed)
    }

    /// Set the search beam width. Values below 1 are raised to 1.
    pub fn set_ef_search(&self, ef: usize) {
        self.ef_search.store(ef.max(1), Ordering::Relaxed);
    }

    /// Current entry point, if any point has been inserted.
    pub fn entry_point(&self) -> Option<EntryPoint> {
        *self.entry.read()
    }

    /// Maximum neighbor-list length at `layer`.
    #[inline]
    pub fn max_links(&self, layer: usize) -> usize {
        if layer == 0 {
            self.params.m * 2
        } else {
            self.params.m
        }
    }

    /// Distance between two vectors under this graph's metric.
    #[inline]
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        (self.dist_fn)(a, b)
    }

    /// Distance from `query` to the stored vector of `id`.
    #[inline]
    pub(crate) fn distance_to(&self, query: &[f32], id: u32) -> f32 {
        match self.arena.vector(id) {
            Some(v) => (self.dist_fn)(query, v),
            None => f32::INFINITY,
        }
    }

    /// Draw a level with `P(level >= k) = (1/M)^k`, clamped to the level cap.
    pub fn random_level(&self) -> usize {
        let r: f64 = self.level_rng.lock().gen();
        // 1 - r lies in (0, 1], so the logarithm is finite
        let level = (-(1.0 - r).ln() * self.level_mult).floor() as usize;
        level.min(config::HNSW_MAX_LEVEL - 1)
    }

    /// Label stored on node `id`.
    #[inline]
    pub fn label_of(&self, id: u32) -> Option<u64> {
        self.arena.get(id).map(|n| n.label)
    }

    /// Copy of the vector bound to `label`.
    pub fn get_vector(&self, label: u64) -> Result<Vec<f32>> {
        let id = self.labels.resolve(label)?;
        self.arena
            .vector(id)
            .map(<[f32]>::to_vec)
            .ok_or(HnswError::LabelNotFound(label))
    }

    /// All labels in ascending order.
    pub fn labels(&self) -> Vec<u64> {
        self.labels.labels()
    }

    pub fn contains(&self, label: u64) -> bool {
        self.labels.contains(label)
    }

    /// Distance between the vectors bound to two labels.
    pub fn distance_between_labels(&self, a: u64, b: u64) -> Result<f32> {
        let va = self.arena.vector(self.labels.resolve(a)?);
        let vb = self.arena.vector(self.labels.resolve(b)?);
        match (va, vb) {
            (Some(va), Some(vb)) => Ok(self.distance(va, vb)),
            (None, _) => Err(HnswError::LabelNotFound(a)),
            (_, None) => Err(HnswError::LabelNotFound(b)),
        }
    }

    /// Neighbor list of the node bound to `label` at `layer`, as labels.
    pub fn neighbor_labels(&self, label: u64, layer: usize) -> Result<Vec<u64>> {
        let id = self.labels.resolve(label)?;
        Ok(self
            .arena
            .neighbors(id, layer)
            .into_iter()
            .filter_map(|n| self.label_of(n))
            .collect())
    }

    /// Layer count statistics: number of nodes whose top layer is `i`, per `i`.
    pub fn level_histogram(&self) -> Vec<usize> {
        let mut hist = Vec::new();
        for (_, node) in self.arena.iter() {
            let level = node.level();
            if hist.len() <= level {
                hist.resize(level + 1, 0);
            }
            hist[level] += 1;
        }
        hist
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(m: usize) -> HnswGraph {
        let params = HnswParams {
            max_elements: 16,
            m,
            ef_construction: 32,
            seed: 7,
        };
        HnswGraph::new(DistanceKind::Euclidean, 4, params).unwrap()
    }

    #[test]
    fn test_rejects_bad_parameters() {
        let params = HnswParams {
            m: 1,
            ..HnswParams::with_capacity(10)
        };
        assert!(matches!(
            HnswGraph::new(DistanceKind::Euclidean, 4, params),
            Err(HnswError::InvalidConfig(_))
        ));
        assert!(matches!(
            HnswGraph::new(DistanceKind::Euclidean, 0, HnswParams::with_capacity(10)),
            Err(HnswError::InvalidConfig(_))
        ));
        let params = HnswParams {
            ef_construction: 0,
            ..HnswParams::with_capacity(10)
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_max_links_doubles_on_layer_zero() {
        let g = graph(8);
        assert_eq!(g.max_links(0), 16);
        assert_eq!(g.max_links(1), 8);
        assert_eq!(g.max_links(5), 8);
    }

    #[test]
    fn test_random_level_is_seeded() {
        let a = graph(4);
        let b = graph(4);
        let la: Vec<usize> = (0..200).map(|_| a.random_level()).collect();
        let lb: Vec<usize> = (0..200).map(|_| b.random_level()).collect();
        assert_eq!(la, lb);
    }

    #[test]
    fn test_random_level_distribution_decays() {
        let g = graph(4);
        let draws = 20_000;
        let mut hist = [0usize; config::HNSW_MAX_LEVEL];
        for _ in 0..draws {
            hist[g.random_level()] += 1;
        }
        // P(level >= 1) = 1/4 for M = 4
        let above = draws - hist[0];
        let frac = above as f64 / draws as f64;
        assert!((0.22..0.28).contains(&frac), "P(level >= 1) = {frac}");
        assert!(hist[0] > hist[1] && hist[1] > hist[2]);
    }

    #[test]
    fn test_ef_search_floor() {
        let g = graph(4);
        assert_eq!(g.ef_search(), config::HNSW_DEFAULT_EF_SEARCH);
        g.set_ef_search(0);
        assert_eq!(g.ef_search(), 1);
        g.set_ef_search(64);
        assert_eq!(g.ef_search(), 64);
    }

    #[test]
    fn test_params_from_json_fill_defaults() {
        let params: HnswParams = serde_json::from_str(r#"{"max_elements": 500}"#).unwrap();
        assert_eq!(params, HnswParams::with_capacity(500));
        let params: HnswParams =
            serde_json::from_str(r#"{"max_elements": 10, "m": 8, "seed": 3}"#).unwrap();
        assert_eq!(params.m, 8);
        assert_eq!(params.seed, 3);
        assert_eq!(params.ef_construction, config::HNSW_DEFAULT_EF_CONSTRUCTION);
    }

    #[test]
    fn test_neighbor_labels_translate_ids() {
        let g = graph(4);
        g.insert(&[0.0, 0.0, 0.0, 0.0], 100).unwrap();
        g.insert(&[1.0, 0.0, 0.0, 0.0], 200).unwrap();
        assert_eq!(g.neighbor_labels(100, 0).unwrap(), vec![200]);
        assert_eq!(g.neighbor_labels(200, 0).unwrap(), vec![100]);
        assert!(g.neighbor_labels(100, config::HNSW_MAX_LEVEL).unwrap().is_empty());
        assert!(matches!(
            g.neighbor_labels(300, 0),
            Err(HnswError::LabelNotFound(300))
        ));
    }
}
