//! SlotPool: generational value storage built on [`SparseSet`].
//!
//! Values live packed in a `Vec<T>` that mirrors the set's dense array, so
//! every swap-back removal is replayed on the values with `swap_remove`.
//! Handles carry the slot generation and stop resolving once their entry is
//! removed, even if the slot is handed out again.

use crate::sparse_set::SparseSet;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Handle {
    index: u32,
    version: u32,
}

impl Handle {
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn version(&self) -> u32 {
        self.version
    }
}

const MIN_GROW: usize = 4;

#[derive(Debug)]
pub struct SlotPool<T> {
    set: SparseSet,
    versions: Vec<u32>,
    values: Vec<T>,
}

impl<T> SlotPool<T> {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            set: SparseSet::with_capacity(capacity),
            versions: vec![0; capacity],
            values: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.set.capacity()
    }

    /// Store `value`, doubling capacity when full.
    pub fn insert(&mut self, value: T) -> Handle {
        let grow_by = self.set.capacity().max(MIN_GROW);
        let (_, slot, version) = self
            .set
            .add_with_expand_check_versioned(grow_by, &mut self.versions);
        debug_assert_eq!(slot.dense as usize, self.values.len());
        self.values.push(value);
        Handle {
            index: slot.sparse,
            version,
        }
    }

    #[inline]
    fn dense_of(&self, handle: Handle) -> Option<usize> {
        self.set
            .dense_index_with_bounds_and_version_check(handle.index, handle.version, &self.versions)
            .map(|d| d as usize)
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.dense_of(handle).is_some()
    }

    pub fn get(&self, handle: Handle) -> Option<&T> {
        self.dense_of(handle).map(|d| &self.values[d])
    }

    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut T> {
        let dense = self.dense_of(handle)?;
        Some(&mut self.values[dense])
    }

    pub fn remove(&mut self, handle: Handle) -> Option<T> {
        let mut index = Some(handle.index);
        let swap = self.set.remove_with_bounds_and_version_check(
            &mut index,
            handle.version,
            &mut self.versions,
        )?;
        Some(self.values.swap_remove(swap.to as usize))
    }

    /// Remove everything; every outstanding handle goes stale.
    pub fn clear(&mut self) {
        self.set.clear_with_versions(&mut self.versions);
        self.values.clear();
    }

    /// Live entries in dense order.
    pub fn iter(&self) -> impl Iterator<Item = (Handle, &T)> + '_ {
        self.set
            .dense()
            .iter()
            .zip(self.values.iter())
            .map(|(&index, value)| {
                let handle = Handle {
                    index,
                    version: self.versions[index as usize],
                };
                (handle, value)
            })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Handle, &mut T)> + '_ {
        let versions = &self.versions;
        self.set
            .dense()
            .iter()
            .zip(self.values.iter_mut())
            .map(move |(&index, value)| {
                let handle = Handle {
                    index,
                    version: versions[index as usize],
                };
                (handle, value)
            })
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }
}

impl<T> Default for SlotPool<T> {
    fn default() -> Self {
        Self::new()
    }
}
