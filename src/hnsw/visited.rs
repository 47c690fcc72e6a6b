//! Epoch-stamped visited set for graph traversal.
//!
//! Each traversal bumps an epoch instead of zeroing the marks, so resetting is O(1)
//! except once every `u16::MAX - 1` resets. The mark array is sized by the live node
//! count, not the arena capacity, and grows when a traversal meets an id reserved
//! after the search started.

/// Visited marks indexed by internal id.
#[derive(Debug)]
pub struct VisitedSet {
    marks: Vec<u16>,
    epoch: u16,
}

impl VisitedSet {
    pub fn new(capacity: usize) -> Self {
        Self {
            marks: vec![0u16; capacity],
            epoch: 1,
        }
    }

    /// Forget every mark.
    pub fn reset(&mut self) {
        if self.epoch == u16::MAX {
            self.marks.fill(0);
            self.epoch = 1;
        } else {
            self.epoch += 1;
        }
    }

    /// Grow to cover ids in `0..capacity`.
    pub fn reserve(&mut self, capacity: usize) {
        if capacity > self.marks.len() {
            self.marks.resize(capacity, 0);
        }
    }

    /// Mark `id`, growing the array if `id` is past its end. Returns `true` if it was
    /// not marked before.
    #[inline]
    pub fn mark(&mut self, id: u32) -> bool {
        let idx = id as usize;
        if idx >= self.marks.len() {
            let grown = (idx + 1).max(self.marks.len() * 2);
            self.marks.resize(grown, 0);
        }
        let slot = &mut self.marks[idx];
        if *slot == self.epoch {
            false
        } else {
            *slot = self.epoch;
            true
        }
    }

    /// Number of ids covered without growing.
    pub fn len(&self) -> usize {
        self.marks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }

    #[inline]
    pub fn is_marked(&self, id: u32) -> bool {
        self.marks
            .get(id as usize)
            .map_or(false, |&m| m == self.epoch)
    }
}

impl Default for VisitedSet {
    fn default() -> Self {
        Self::new(0)
    }
}
