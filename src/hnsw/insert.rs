//! HNSW insertion.
//!
//! Inserts a vector into the graph with bidirectional connections and heuristic
//! neighbor pruning (Algorithm 4 from the HNSW paper). Safe to call from many
//! threads at once: an inserter holds at most one adjacency-list write lock at a
//! time, and only for the duration of that list's update.

use crate::error::{HnswError, Result};
use crate::hnsw::arena::Node;
use crate::hnsw::graph::{EntryPoint, HnswGraph};
use crate::hnsw::search::{greedy_descent, search_layer, with_visited, Scored};

impl HnswGraph {
    /// Insert `vector` under `label`. Returns the new internal id.
    ///
    /// Fails with `DimensionMismatch`, `DuplicateLabel`, or `CapacityExceeded` before
    /// touching any state.
    pub fn insert(&self, vector: &[f32], label: u64) -> Result<u32> {
        if vector.len() != self.dimension() {
            return Err(HnswError::DimensionMismatch {
                expected: self.dimension(),
                got: vector.len(),
            });
        }

        let id = self.labels.reserve_with(label, || {
            if self.arena.is_full() {
                return Err(HnswError::CapacityExceeded {
                    capacity: self.capacity(),
                });
            }
            let level = self.random_level();
            self.arena.allocate(Node::new(label, vector, level))
        })?;
        let level = self.arena.get(id).map_or(0, Node::level);

        // First node becomes the entry point
        let ep = match self.entry_point() {
            Some(ep) => ep,
            None => {
                let mut entry = self.entry.write();
                match *entry {
                    Some(ep) => ep,
                    None => {
                        *entry = Some(EntryPoint { id, level });
                        return Ok(id);
                    }
                }
            }
        };

        // Phase 1: greedy descent down to level + 1
        let mut current = ep.id;
        if level < ep.level {
            current = greedy_descent(self, vector, ep.id, ep.level, level + 1).id;
        }

        // Phase 2: beam search and wiring on every layer the node shares with the graph
        let no_filter = |_: u32| true;
        with_visited(self.len(), |visited| {
            let mut layer_eps = vec![current];
            for layer in (0..=level.min(ep.level)).rev() {
                let mut candidates = search_layer(
                    self,
                    vector,
                    &layer_eps,
                    self.params.ef_construction,
                    layer,
                    visited,
                    &no_filter,
                );
                // A concurrent inserter may already have linked this node
                candidates.retain(|c| c.id != id);

                let selected = select_neighbors_heuristic(self, &candidates, self.max_links(layer));
                let selected_ids: Vec<u32> = selected.iter().map(|s| s.id).collect();
                self.arena.set_neighbors(id, layer, selected_ids.clone());
                for &neighbor in &selected_ids {
                    self.connect(neighbor, id, layer);
                }

                layer_eps.clear();
                layer_eps.extend(candidates.iter().map(|c| c.id));
                if layer_eps.is_empty() {
                    layer_eps.push(ep.id);
                }
            }
        });

        // Phase 3: promote to entry point if the node reaches above the current top
        if level > ep.level {
            let mut entry = self.entry.write();
            if entry.map_or(true, |e| level > e.level) {
                *entry = Some(EntryPoint { id, level });
            }
        }

        Ok(id)
    }

    /// Add `new_id` to the neighbor list of `node` at `layer`, re-pruning the list
    /// with the diversity heuristic if it overflows its bound.
    fn connect(&self, node: u32, new_id: u32, layer: usize) {
        let Some(base) = self.arena.vector(node) else {
            return;
        };
        let m_max = self.max_links(layer);

        self.arena.with_neighbors_mut(node, layer, |list| {
            if list.contains(&new_id) {
                return;
            }
            if list.len() < m_max {
                list.push(new_id);
                return;
            }

            let candidates: Vec<Scored> = list
                .iter()
                .chain(std::iter::once(&new_id))
                .map(|&c| Scored::new(self.distance_to(base, c), c))
                .collect();
            let kept = select_neighbors_heuristic(self, &candidates, m_max);
            *list = kept.iter().map(|s| s.id).collect();
        });
    }
}

/// Heuristic neighbor selection (Algorithm 4 from the HNSW paper).
///
/// Candidates are visited nearest first; one is kept only if it is at least as close
/// to the base node as to every neighbor already kept. This spreads edges across
/// directions instead of clustering them. Returns at most `m` entries, ascending.
///
/// The heuristic only runs on overflow: with `m` or fewer candidates, all are kept.
pub(crate) fn select_neighbors_heuristic(
    graph: &HnswGraph,
    candidates: &[Scored],
    m: usize,
) -> Vec<Scored> {
    let mut sorted = candidates.to_vec();
    sorted.sort_unstable();
    if sorted.len() <= m {
        return sorted;
    }

    let mut selected: Vec<Scored> = Vec::with_capacity(m);
    for cand in sorted {
        if selected.len() >= m {
            break;
        }
        let Some(cand_vec) = graph.arena.vector(cand.id) else {
            continue;
        };
        let is_diverse = selected
            .iter()
            .all(|s| cand.distance.0 <= graph.distance_to(cand_vec, s.id));
        if is_diverse {
            selected.push(cand);
        }
    }
    selected
}
