//! Fixed-capacity node arena.
//!
//! Nodes are addressed by a dense internal id in `[0, capacity)`. Capacity is set
//! once; slots are committed in segments of [`config::ARENA_SEGMENT_SIZE`], and
//! segments in directory pages of [`config::ARENA_DIRECTORY_SIZE`], both on first
//! use, so a large capacity does not cost memory up front.
//!
//! A slot is written exactly once, before its id can appear in any adjacency list
//! or as the entry point. Vectors are immutable after that; adjacency lists are the
//! only mutable state, one `RwLock` per node per layer.

use crate::config;
use crate::error::{HnswError, Result};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;

/// A graph node: the caller's label, its vector, and one neighbor list per layer.
#[derive(Debug)]
pub struct Node {
    pub label: u64,
    pub vector: Box<[f32]>,
    links: Box<[RwLock<Vec<u32>>]>,
}

impl Node {
    /// Node with empty neighbor lists on layers `0..=level`.
    pub fn new(label: u64, vector: &[f32], level: usize) -> Self {
        Self::with_links(label, vector, vec![Vec::new(); level + 1])
    }

    /// Node with pre-built neighbor lists, one per layer (used when restoring snapshots).
    pub fn with_links(label: u64, vector: &[f32], links: Vec<Vec<u32>>) -> Self {
        debug_assert!(!links.is_empty(), "a node occupies at least layer 0");
        Self {
            label,
            vector: vector.into(),
            links: links.into_iter().map(RwLock::new).collect(),
        }
    }

    /// Highest layer this node occupies.
    #[inline]
    pub fn level(&self) -> usize {
        self.links.len() - 1
    }

    /// Lock guarding this node's neighbor list at `layer`, if the node reaches that layer.
    #[inline]
    pub fn links(&self, layer: usize) -> Option<&RwLock<Vec<u32>>> {
        self.links.get(layer)
    }
}

type Segment = Box<[OnceLock<Node>]>;
type Page = Box<[OnceLock<Segment>]>;

const PAGE_SLOTS: usize = config::ARENA_SEGMENT_SIZE * config::ARENA_DIRECTORY_SIZE;

/// Page, segment, and slot index of `id`.
#[inline]
fn locate(id: usize) -> (usize, usize, usize) {
    (
        id / PAGE_SLOTS,
        (id / config::ARENA_SEGMENT_SIZE) % config::ARENA_DIRECTORY_SIZE,
        id % config::ARENA_SEGMENT_SIZE,
    )
}

fn lazy_slots<T>(n: usize) -> Box<[OnceLock<T>]> {
    (0..n).map(|_| OnceLock::new()).collect()
}

/// Segmented, write-once node storage.
#[derive(Debug)]
pub struct Arena {
    dimension: usize,
    capacity: usize,
    pages: Box<[OnceLock<Page>]>,
    reserved: AtomicUsize,
}

impl Arena {
    pub fn new(dimension: usize, capacity: usize) -> Self {
        Self {
            dimension,
            capacity,
            pages: lazy_slots(capacity.div_ceil(PAGE_SLOTS)),
            reserved: AtomicUsize::new(0),
        }
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of reserved ids. Every id below this value is stored, except for the
    /// brief window inside [`allocate`](Self::allocate) of a concurrent insertion.
    #[inline]
    pub fn len(&self) -> usize {
        self.reserved.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    /// Reserve the next dense id and store `node` in it.
    ///
    /// Fails with `CapacityExceeded` when every slot is taken; nothing is modified then.
    pub fn allocate(&self, node: Node) -> Result<u32> {
        debug_assert_eq!(node.vector.len(), self.dimension);
        let capacity = self.capacity;
        let id = self
            .reserved
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < capacity).then_some(n + 1)
            })
            .map_err(|_| HnswError::CapacityExceeded { capacity })?;

        let (page, segment, slot) = locate(id);
        let segment = self.pages[page]
            .get_or_init(|| lazy_slots(config::ARENA_DIRECTORY_SIZE))[segment]
            .get_or_init(|| lazy_slots(config::ARENA_SEGMENT_SIZE));
        let stored = segment[slot].set(node);
        debug_assert!(stored.is_ok(), "arena slot {id} written twice");
        Ok(id as u32)
    }

    /// Node stored under `id`, or `None` if the id is out of range or not yet stored.
    #[inline]
    pub fn get(&self, id: u32) -> Option<&Node> {
        let (page, segment, slot) = locate(id as usize);
        self.pages
            .get(page)?
            .get()?
            .get(segment)?
            .get()?
            .get(slot)?
            .get()
    }

    /// Vector stored under `id`.
    #[inline]
    pub fn vector(&self, id: u32) -> Option<&[f32]> {
        self.get(id).map(|n| &*n.vector)
    }

    /// Ordered copy of the neighbor list of `id` at `layer`; empty if the node does
    /// not reach that layer.
    pub fn neighbors(&self, id: u32, layer: usize) -> Vec<u32> {
        let mut out = Vec::new();
        self.neighbors_into(id, layer, &mut out);
        out
    }

    /// Replace `out` with the neighbor list of `id` at `layer`. The read lock is held
    /// only for the copy.
    #[inline]
    pub fn neighbors_into(&self, id: u32, layer: usize, out: &mut Vec<u32>) {
        out.clear();
        if let Some(lock) = self.get(id).and_then(|n| n.links(layer)) {
            out.extend_from_slice(&lock.read());
        }
    }

    /// Replace the neighbor list of `id` at `layer`. Returns `false` if the node does
    /// not reach that layer.
    pub fn set_neighbors(&self, id: u32, layer: usize, ids: Vec<u32>) -> bool {
        match self.get(id).and_then(|n| n.links(layer)) {
            Some(lock) => {
                *lock.write() = ids;
                true
            }
            None => false,
        }
    }

    /// Run `f` on the neighbor list of `id` at `layer` under its write lock.
    /// Returns `None` if the node does not reach that layer.
    pub fn with_neighbors_mut<R>(
        &self,
        id: u32,
        layer: usize,
        f: impl FnOnce(&mut Vec<u32>) -> R,
    ) -> Option<R> {
        let lock = self.get(id)?.links(layer)?;
        let mut list = lock.write();
        Some(f(&mut list))
    }

    /// Iterate over stored nodes in id order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &Node)> + '_ {
        (0..self.len() as u32).filter_map(move |id| self.get(id).map(|n| (id, n)))
    }
}
