//! Label map: caller-visible `u64` labels → dense internal ids.
//!
//! The reverse direction is stored on each arena node, written together with the
//! vector, so the two directions cannot drift apart. The map's write lock doubles as
//! the allocation lock: [`LabelMap::reserve_with`] checks for a duplicate, reserves
//! an arena slot, and binds the label in one critical section.

use crate::error::{HnswError, Result};
use parking_lot::{RwLock, RwLockReadGuard};
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct LabelMap {
    lookup: RwLock<HashMap<u64, u32>>,
}

impl LabelMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            lookup: RwLock::new(HashMap::with_capacity(capacity)),
        }
    }

    /// Bind `label` to `id`. Fails with `DuplicateLabel` if the label is taken.
    pub fn bind(&self, label: u64, id: u32) -> Result<()> {
        let mut lookup = self.lookup.write();
        if lookup.contains_key(&label) {
            return Err(HnswError::DuplicateLabel(label));
        }
        lookup.insert(label, id);
        Ok(())
    }

    /// Under the allocation lock: reject a duplicate `label`, then run `allocate` and
    /// bind its id. If either step fails nothing is bound.
    pub fn reserve_with<F>(&self, label: u64, allocate: F) -> Result<u32>
    where
        F: FnOnce() -> Result<u32>,
    {
        let mut lookup = self.lookup.write();
        if lookup.contains_key(&label) {
            return Err(HnswError::DuplicateLabel(label));
        }
        let id = allocate()?;
        lookup.insert(label, id);
        Ok(id)
    }

    pub fn resolve(&self, label: u64) -> Result<u32> {
        self.lookup
            .read()
            .get(&label)
            .copied()
            .ok_or(HnswError::LabelNotFound(label))
    }

    pub fn contains(&self, label: u64) -> bool {
        self.lookup.read().contains_key(&label)
    }

    /// All bound labels in ascending order.
    pub fn labels(&self) -> Vec<u64> {
        let mut labels: Vec<u64> = self.lookup.read().keys().copied().collect();
        labels.sort_unstable();
        labels
    }

    pub fn len(&self) -> usize {
        self.lookup.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hold the allocation lock shared: no label can be bound (and no arena slot
    /// reserved through [`reserve_with`](Self::reserve_with)) until the guard drops.
    pub(crate) fn freeze(&self) -> RwLockReadGuard<'_, HashMap<u64, u32>> {
        self.lookup.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_and_resolve() {
        let map = LabelMap::new();
        map.bind(42, 0).unwrap();
        map.bind(7, 1).unwrap();
        assert_eq!(map.resolve(42).unwrap(), 0);
        assert_eq!(map.resolve(7).unwrap(), 1);
        assert_eq!(map.labels(), vec![7, 42]);
    }

    #[test]
    fn test_duplicate_label_rejected() {
        let map = LabelMap::new();
        map.bind(1, 0).unwrap();
        assert!(matches!(map.bind(1, 5), Err(HnswError::DuplicateLabel(1))));
        assert_eq!(map.resolve(1).unwrap(), 0);
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_missing_label() {
        let map = LabelMap::new();
        assert!(matches!(map.resolve(9), Err(HnswError::LabelNotFound(9))));
        assert!(!map.contains(9));
    }

    #[test]
    fn test_reserve_with_skips_allocation_on_duplicate() {
        let map = LabelMap::new();
        map.reserve_with(3, || Ok(0)).unwrap();
        let mut called = false;
        let err = map.reserve_with(3, || {
            called = true;
            Ok(1)
        });
        assert!(matches!(err, Err(HnswError::DuplicateLabel(3))));
        assert!(!called);
    }

    #[test]
    fn test_reserve_with_binds_nothing_on_allocation_failure() {
        let map = LabelMap::new();
        let err = map.reserve_with(5, || Err(HnswError::CapacityExceeded { capacity: 0 }));
        assert!(matches!(err, Err(HnswError::CapacityExceeded { .. })));
        assert!(map.is_empty());
    }
}
