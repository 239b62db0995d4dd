//! SparseSet: stable sparse handles over a packed dense array.
//!
//! Layout: one storage block of `2 * capacity` words. The first half is the
//! sparse array (`sparse[handle] -> dense`), the second half the dense array
//! (`dense[i] -> handle`, live for `i < len`). Sparse slots that are not
//! live hold the next free handle instead, forming an intrusive free list
//! whose tail always holds `capacity`; growing the set therefore extends the
//! chain without touching it.
//!
//! Generation counters live in a caller-owned version array passed to the
//! `*_versioned` / `*_version_check` entry points. A handle is valid iff the
//! version it carries equals `versions[handle]`; counters only move forward
//! (wrapping after `u32::MAX` increments is accepted).

use crate::error::CapacityError;
use crate::pool::{ArrayPool, PooledStorage};
use crate::raw_storage::RawStorage;
use crate::storage::{Storage, MAX_CAPACITY};

/// Result of an allocation: the stable handle and its current dense slot.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Slot {
    pub sparse: u32,
    pub dense: u32,
}

/// Dense positions touched by a swap-back removal. Callers keeping parallel
/// per-entry arrays mirror it as `array.swap_remove(to)`; `from == to` when
/// the removed entry was last.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Swap {
    pub from: u32,
    pub to: u32,
}

#[derive(Debug)]
pub struct SparseSet<S = Vec<u32>> {
    storage: S,
    capacity: u32,
    len: u32,
    free_head: u32,
}

impl SparseSet<Vec<u32>> {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_storage(Vec::new(), capacity)
    }
}

impl Default for SparseSet<Vec<u32>> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'p> SparseSet<PooledStorage<'p, u32>> {
    /// Sparse set whose block is rented from `pool`.
    pub fn new_in(pool: &'p ArrayPool<u32>, capacity: usize) -> Self {
        Self::with_storage(PooledStorage::new(pool), capacity)
    }

    /// Return the block to its pool.
    pub fn dispose(self) {
        self.storage.dispose();
    }
}

impl SparseSet<RawStorage<u32>> {
    /// Sparse set over a manually allocated block.
    pub fn new_raw(capacity: usize) -> Self {
        Self::with_storage(RawStorage::new(), capacity)
    }

    /// Free the block.
    pub fn dispose(self) {
        self.storage.dispose();
    }
}

impl<S: Storage<u32>> SparseSet<S> {
    /// Build over `storage`, which must be empty.
    pub fn with_storage(mut storage: S, capacity: usize) -> Self {
        assert!(storage.is_empty(), "sparse set storage must start empty");
        assert!(capacity <= MAX_CAPACITY, "capacity overflow");
        storage.grow_with(2 * capacity, |i| {
            if i < capacity {
                i as u32 + 1
            } else {
                0
            }
        });
        Self {
            storage,
            capacity: capacity as u32,
            len: 0,
            free_head: 0,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity as usize
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.len == self.capacity
    }

    /// Live handles in dense order.
    #[inline]
    pub fn dense(&self) -> &[u32] {
        let cap = self.capacity as usize;
        &self.storage.as_slice()[cap..cap + self.len as usize]
    }

    pub fn sparse_index_at(&self, dense: u32) -> Option<u32> {
        self.dense().get(dense as usize).copied()
    }

    pub fn contains(&self, sparse: u32) -> bool {
        self.live_dense(sparse).is_some()
    }

    /// Grow `versions` so it covers every sparse slot. New counters start at 0.
    pub fn sync_versions<V: Storage<u32>>(&self, versions: &mut V) {
        versions.grow_with(self.capacity as usize, |_| 0);
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    #[inline]
    fn live_dense(&self, sparse: u32) -> Option<u32> {
        let cap = self.capacity as usize;
        let i = sparse as usize;
        if i >= cap {
            return None;
        }
        let slots = self.storage.as_slice();
        let dense = slots[i];
        (dense < self.len && slots[cap + dense as usize] == sparse).then_some(dense)
    }

    // ---- allocation ----

    /// Pop a handle off the free list.
    ///
    /// # Panics
    /// If the set is full; callers on this path have checked for room.
    pub fn add_unchecked(&mut self) -> Slot {
        assert!(
            self.len < self.capacity,
            "sparse set is full (capacity {})",
            self.capacity
        );
        let cap = self.capacity as usize;
        let sparse = self.free_head;
        let dense = self.len;
        let slots = self.storage.as_mut_slice();
        let next_free = slots[sparse as usize];
        slots[sparse as usize] = dense;
        slots[cap + dense as usize] = sparse;
        self.free_head = next_free;
        self.len += 1;
        Slot { sparse, dense }
    }

    /// As `add_unchecked`, also returning the slot's current generation.
    pub fn add_unchecked_versioned(&mut self, versions: &[u32]) -> (Slot, u32) {
        let slot = self.add_unchecked();
        (slot, versions[slot.sparse as usize])
    }

    /// Allocate, growing by `grow_by` (at least one) first if full. The flag
    /// reports whether growth happened so cached lengths can be refreshed.
    pub fn add_with_expand_check(&mut self, grow_by: usize) -> (bool, Slot) {
        let expanded = self.is_full();
        if expanded {
            self.expand(grow_by.max(1));
        }
        (expanded, self.add_unchecked())
    }

    pub fn add_with_expand_check_versioned<V: Storage<u32>>(
        &mut self,
        grow_by: usize,
        versions: &mut V,
    ) -> (bool, Slot, u32) {
        let expanded = self.is_full();
        if expanded {
            self.expand_with_versions(grow_by.max(1), versions);
        }
        let (slot, version) = self.add_unchecked_versioned(versions.as_slice());
        (expanded, slot, version)
    }

    // ---- lookup ladder ----

    /// Dense slot for `sparse` with no checks. The result is meaningless for
    /// a handle that is not live.
    #[inline]
    pub fn dense_index_unchecked(&self, sparse: u32) -> u32 {
        debug_assert!(sparse < self.capacity, "sparse index out of range");
        self.storage.as_slice()[sparse as usize]
    }

    /// `None` outside `[0, capacity)` or for a slot that is not live.
    #[inline]
    pub fn dense_index_with_bounds_check(&self, sparse: u32) -> Option<u32> {
        self.live_dense(sparse)
    }

    /// `None` unless `versions[sparse] == version`. Liveness is not
    /// re-verified; a matching generation is taken as proof of it.
    #[inline]
    pub fn dense_index_with_version_check(
        &self,
        sparse: u32,
        version: u32,
        versions: &[u32],
    ) -> Option<u32> {
        if versions.get(sparse as usize) != Some(&version) || sparse >= self.capacity {
            return None;
        }
        Some(self.storage.as_slice()[sparse as usize])
    }

    #[inline]
    pub fn dense_index_with_bounds_and_version_check(
        &self,
        sparse: u32,
        version: u32,
        versions: &[u32],
    ) -> Option<u32> {
        if versions.get(sparse as usize) != Some(&version) {
            return None;
        }
        self.live_dense(sparse)
    }

    // ---- removal ladder ----

    /// Free `sparse`, moving the last dense entry into its slot.
    ///
    /// # Panics
    /// If the set is empty. Removing a handle that is not live corrupts the
    /// free list (caught by a debug assertion).
    pub fn remove_unchecked(&mut self, sparse: u32) -> Swap {
        assert!(self.len > 0, "remove from empty sparse set");
        let cap = self.capacity as usize;
        let last = self.len - 1;
        let slots = self.storage.as_mut_slice();
        let removed = slots[sparse as usize];
        debug_assert!(
            removed <= last && slots[cap + removed as usize] == sparse,
            "removing a handle that is not live"
        );
        let moved = slots[cap + last as usize];
        slots[cap + removed as usize] = moved;
        slots[moved as usize] = removed;
        // After the fix-up above: when `moved == sparse` this overwrites it.
        slots[sparse as usize] = self.free_head;
        self.free_head = sparse;
        self.len = last;
        Swap {
            from: last,
            to: removed,
        }
    }

    /// As `remove_unchecked`, bumping the slot's generation.
    pub fn remove_unchecked_versioned(&mut self, sparse: u32, versions: &mut [u32]) -> Swap {
        let swap = self.remove_unchecked(sparse);
        let v = &mut versions[sparse as usize];
        *v = v.wrapping_add(1);
        swap
    }

    /// Remove if `sparse` is live. On success the caller's index is cleared
    /// so it cannot be reused by accident.
    pub fn remove_with_bounds_check(&mut self, sparse: &mut Option<u32>) -> Option<Swap> {
        let index = (*sparse)?;
        self.live_dense(index)?;
        let swap = self.remove_unchecked(index);
        *sparse = None;
        Some(swap)
    }

    /// Remove if the generation matches, bumping it. Liveness is still
    /// verified: after an unversioned `clear` a stale generation can match a
    /// free slot, and removing that would break the free list.
    pub fn remove_with_version_check(
        &mut self,
        sparse: &mut Option<u32>,
        version: u32,
        versions: &mut [u32],
    ) -> Option<Swap> {
        let index = (*sparse)?;
        if versions.get(index as usize) != Some(&version) {
            return None;
        }
        self.live_dense(index)?;
        let swap = self.remove_unchecked_versioned(index, versions);
        *sparse = None;
        Some(swap)
    }

    pub fn remove_with_bounds_and_version_check(
        &mut self,
        sparse: &mut Option<u32>,
        version: u32,
        versions: &mut [u32],
    ) -> Option<Swap> {
        match *sparse {
            Some(index) if index < self.capacity => {
                self.remove_with_version_check(sparse, version, versions)
            }
            _ => None,
        }
    }

    // ---- growth ----

    /// Grow capacity by `grow_by`. Live handles keep their dense slots.
    pub fn expand(&mut self, grow_by: usize) {
        if grow_by == 0 {
            return;
        }
        let new_cap = (self.capacity as usize)
            .checked_add(grow_by)
            .unwrap_or(usize::MAX);
        self.resize_to(new_cap);
    }

    pub fn expand_with_versions<V: Storage<u32>>(&mut self, grow_by: usize, versions: &mut V) {
        self.expand(grow_by);
        self.sync_versions(versions);
    }

    /// Ensure capacity is at least `total`; no-op when it already is.
    pub fn reserve(&mut self, total: usize) {
        if total > self.capacity as usize {
            self.resize_to(total);
        }
    }

    pub fn reserve_with_versions<V: Storage<u32>>(&mut self, total: usize, versions: &mut V) {
        self.reserve(total);
        self.sync_versions(versions);
    }

    pub fn try_reserve(&mut self, total: usize) -> Result<(), CapacityError> {
        if total > MAX_CAPACITY {
            return Err(CapacityError::Overflow {
                requested: total,
                max: MAX_CAPACITY,
            });
        }
        self.reserve(total);
        Ok(())
    }

    fn resize_to(&mut self, new_cap: usize) {
        assert!(new_cap <= MAX_CAPACITY, "capacity overflow");
        let old_cap = self.capacity as usize;
        let live = self.len as usize;
        self.storage.grow_with(2 * new_cap, |_| 0);
        let slots = self.storage.as_mut_slice();
        slots.copy_within(old_cap..old_cap + live, new_cap);
        // The old chain ends at `old_cap`, which is where the new chain starts.
        for (i, slot) in slots[old_cap..new_cap].iter_mut().enumerate() {
            *slot = (old_cap + i) as u32 + 1;
        }
        self.capacity = new_cap as u32;
        tracing::trace!(old_cap, new_cap, live, "sparse set expanded");
    }

    // ---- reset ----

    /// Drop every live handle and rebuild the free list in index order.
    /// Generations are untouched; outstanding handles are not invalidated.
    pub fn clear(&mut self) {
        let cap = self.capacity as usize;
        for (i, slot) in self.storage.as_mut_slice()[..cap].iter_mut().enumerate() {
            *slot = i as u32 + 1;
        }
        self.len = 0;
        self.free_head = 0;
    }

    /// Clear and bump every generation, invalidating all outstanding handles.
    pub fn clear_with_versions(&mut self, versions: &mut [u32]) {
        self.clear();
        for v in versions.iter_mut().take(self.capacity as usize) {
            *v = v.wrapping_add(1);
        }
    }

    /// Clear and restart every generation at 0.
    pub fn clear_with_version_array_reset(&mut self, versions: &mut [u32]) {
        self.clear();
        versions
            .iter_mut()
            .take(self.capacity as usize)
            .for_each(|v| *v = 0);
    }

    /// Walk every structural invariant; used by tests.
    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        let cap = self.capacity as usize;
        let slots = self.storage.as_slice();
        assert_eq!(slots.len(), 2 * cap);
        let mut seen = vec![false; cap];
        for (d, &s) in self.dense().iter().enumerate() {
            assert!((s as usize) < cap);
            assert_eq!(slots[s as usize], d as u32, "sparse/dense disagree");
            assert!(!seen[s as usize], "handle live twice");
            seen[s as usize] = true;
        }
        let mut cursor = self.free_head as usize;
        let mut free = 0;
        while cursor != cap {
            assert!(cursor < cap, "free chain escaped the sparse array");
            assert!(!seen[cursor], "slot both live and free");
            seen[cursor] = true;
            free += 1;
            cursor = slots[cursor] as usize;
        }
        assert_eq!(free + self.len as usize, cap);
    }
}
