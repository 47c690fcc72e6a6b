//! Collaborator-facing index facade.
//!
//! An [`Index`] is created with a metric and a dimension, then either built empty
//! with [`init_new_index`](Index::init_new_index) or restored with
//! [`load`](Index::load). All item operations take `&self` and may run concurrently;
//! only (re)initialization swaps the underlying graph.

use crate::error::{HnswError, Result};
use crate::hnsw::distance::DistanceKind;
use crate::hnsw::graph::{HnswGraph, HnswParams};
use crate::hnsw::search::{knn_search, knn_search_filtered};
use crate::storage::persistence;
use parking_lot::RwLock;
use rayon::prelude::*;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;

/// A thread-safe handle to a single HNSW index.
#[derive(Debug)]
pub struct Index {
    kind: DistanceKind,
    dimension: usize,
    graph: RwLock<Option<Arc<HnswGraph>>>,
}

impl Index {
    /// Creates an uninitialized index for vectors of `dimension` components.
    pub fn new(kind: DistanceKind, dimension: usize) -> Self {
        Self {
            kind,
            dimension,
            graph: RwLock::new(None),
        }
    }

    /// Allocates an empty graph. Fails with `AlreadyInitialized` if one exists.
    pub fn init_new_index(
        &self,
        max_elements: usize,
        m: usize,
        ef_construction: usize,
        seed: u64,
    ) -> Result<()> {
        self.init_with_params(HnswParams {
            max_elements,
            m,
            ef_construction,
            seed,
        })
    }

    /// Same as [`init_new_index`](Self::init_new_index), from a parameter struct.
    pub fn init_with_params(&self, params: HnswParams) -> Result<()> {
        let mut slot = self.graph.write();
        if slot.is_some() {
            return Err(HnswError::AlreadyInitialized);
        }
        *slot = Some(Arc::new(HnswGraph::new(self.kind, self.dimension, params)?));
        Ok(())
    }

    fn graph(&self) -> Result<Arc<HnswGraph>> {
        self.graph.read().clone().ok_or(HnswError::NotInitialized)
    }

    pub fn is_initialized(&self) -> bool {
        self.graph.read().is_some()
    }

    pub fn kind(&self) -> DistanceKind {
        self.kind
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(HnswError::DimensionMismatch {
                expected: self.dimension,
                got: vector.len(),
            });
        }
        Ok(())
    }

    /// Number of points in the index (0 when uninitialized).
    pub fn len(&self) -> usize {
        self.graph.read().as_ref().map_or(0, |g| g.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_elements(&self) -> Result<usize> {
        Ok(self.graph()?.capacity())
    }

    /// Inserts `vector` under `label`.
    pub fn add_item(&self, vector: &[f32], label: u64) -> Result<()> {
        self.graph()?.insert(vector, label).map(|_| ())
    }

    /// Inserts a batch in parallel. On error, items inserted before the failure stay
    /// in the index; the first error encountered is returned.
    pub fn add_items(&self, items: &[(Vec<f32>, u64)]) -> Result<()> {
        let graph = self.graph()?;
        items
            .par_iter()
            .try_for_each(|(vector, label)| graph.insert(vector, *label).map(|_| ()))
    }

    /// Copy of the vector stored under `label`.
    pub fn get_vector(&self, label: u64) -> Result<Vec<f32>> {
        self.graph()?.get_vector(label)
    }

    /// All labels, ascending.
    pub fn labels(&self) -> Result<Vec<u64>> {
        Ok(self.graph()?.labels())
    }

    /// The `k` nearest labels to `vector` and their distances, ascending.
    pub fn knn_query(&self, vector: &[f32], k: usize) -> Result<(Vec<u64>, Vec<f32>)> {
        self.check_dimension(vector)?;
        let graph = self.graph()?;
        Ok(knn_search(&graph, vector, k).into_iter().unzip())
    }

    /// Like [`knn_query`](Self::knn_query), restricted to labels accepted by `filter`.
    pub fn knn_query_filtered<F: Fn(u64) -> bool>(
        &self,
        vector: &[f32],
        k: usize,
        filter: F,
    ) -> Result<(Vec<u64>, Vec<f32>)> {
        self.check_dimension(vector)?;
        let graph = self.graph()?;
        Ok(knn_search_filtered(&graph, vector, k, &filter)
            .into_iter()
            .unzip())
    }

    /// Distance between the vectors stored under two labels.
    pub fn distance_between_labels(&self, a: u64, b: u64) -> Result<f32> {
        self.graph()?.distance_between_labels(a, b)
    }

    /// Sets the search beam width.
    pub fn set_ef(&self, ef: usize) -> Result<()> {
        self.graph()?.set_ef_search(ef);
        Ok(())
    }

    pub fn ef(&self) -> Result<usize> {
        Ok(self.graph()?.ef_search())
    }

    /// Writes a snapshot to `path` atomically.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let graph = self.graph()?;
        persistence::save_graph(&graph, path.as_ref())
    }

    pub fn save_to_writer<W: Write>(&self, writer: W) -> Result<usize> {
        let graph = self.graph()?;
        persistence::save_to_writer(&graph, writer)
    }

    /// Replaces the index with the snapshot at `path`.
    ///
    /// An existing graph is discarded with a warning. If loading fails, the index is
    /// left uninitialized.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        self.replace_with(|| persistence::load_graph(path, self.kind, self.dimension))
    }

    pub fn load_from_reader<R: Read>(&self, reader: R) -> Result<()> {
        self.replace_with(|| persistence::load_from_reader(reader, self.kind, self.dimension))
    }

    fn replace_with<F>(&self, load: F) -> Result<()>
    where
        F: FnOnce() -> Result<HnswGraph>,
    {
        let mut slot = self.graph.write();
        if let Some(old) = slot.take() {
            tracing::warn!(
                "Loading into an already initialized index; discarding {} existing points",
                old.len()
            );
        }
        *slot = Some(Arc::new(load()?));
        Ok(())
    }
}
