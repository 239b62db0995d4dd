//! KeyedHashMap: chained hash map over a prime-sized entry pool.
//!
//! Structure
//! - `buckets[b]` holds the index of the first entry whose key hashes to
//!   `b`, or `END`.
//! - `entries[i]` holds `{hash, link, pair}`. `link` is overloaded: with the
//!   `FREE` bit clear it is the next entry in the bucket chain, with it set
//!   the low bits are the next entry on the free chain.
//! - Both arrays are `capacity` long, and capacity is always prime.
//!
//! Ordering
//! - New entries are spliced at the head of their chain, so among duplicate
//!   keys (possible through the non-unique `add_*` paths) the most recent
//!   one is found first. Rehashing preserves this.
//!
//! Iteration
//! - `Cursor` scans the entry pool, not the buckets. `move_next` compares
//!   the cursor's snapshot against the map's structure version, bumped by
//!   every add, remove, clear and resize, and reports `InvalidVersion` at
//!   the first step after a mutation.

use crate::error::{CapacityError, InsertError};
use crate::pool::{ArrayPool, PooledStorage};
use crate::primes::{expand_prime, get_prime};
use crate::raw_storage::RawStorage;
use crate::storage::Storage;
use core::borrow::Borrow;
use core::hash::Hasher;
use core::marker::PhantomData;
use core::ops::Index;
use fnv::FnvHasher;

const FREE: u32 = 1 << 31;
/// Terminates bucket chains and the free chain; also marks an empty bucket.
const END: u32 = FREE - 1;

/// Keys usable in a [`KeyedHashMap`].
pub trait MapKey: Eq {
    /// Hash of the key's content alone: no per-process seed and no
    /// dependence on pointer width, so a key lands in the same bucket on
    /// every run and every target.
    fn stable_hash(&self) -> u64;
}

macro_rules! int_map_key {
    ($($t:ty),*) => {
        $(
            impl MapKey for $t {
                #[inline]
                fn stable_hash(&self) -> u64 {
                    *self as u64
                }
            }
        )*
    };
}

int_map_key!(i8, i16, i32, i64, u8, u16, u32, u64, usize, isize);

// 64-bit FNV-1a over the UTF-8 bytes.
impl MapKey for str {
    #[inline]
    fn stable_hash(&self) -> u64 {
        let mut h = FnvHasher::default();
        h.write(self.as_bytes());
        h.finish()
    }
}

impl MapKey for String {
    #[inline]
    fn stable_hash(&self) -> u64 {
        self.as_str().stable_hash()
    }
}

impl<T: MapKey + ?Sized> MapKey for &T {
    #[inline]
    fn stable_hash(&self) -> u64 {
        (**self).stable_hash()
    }
}

/// One slot of the entry pool.
pub struct Entry<K, V> {
    hash: u64,
    link: u32,
    // `Some` while chained. A slot freed without clearing keeps its stale
    // pair until reuse; it is unreachable because the slot is off every chain.
    pair: Option<(K, V)>,
}

impl<K, V> Entry<K, V> {
    #[inline]
    fn is_free(&self) -> bool {
        self.link & FREE != 0
    }

    #[inline]
    pub fn is_occupied(&self) -> bool {
        !self.is_free()
    }

    #[inline]
    fn live_pair(&self) -> Option<&(K, V)> {
        if self.is_free() {
            None
        } else {
            self.pair.as_ref()
        }
    }
}

impl<K, V> Default for Entry<K, V> {
    fn default() -> Self {
        Self {
            hash: 0,
            link: FREE | END,
            pair: None,
        }
    }
}

impl<K: core::fmt::Debug, V: core::fmt::Debug> core::fmt::Debug for Entry<K, V> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut b = f.debug_struct("Entry");
        if self.is_free() {
            b.field("next_free", &(self.link & !FREE));
        } else {
            b.field("next", &self.link).field("pair", &self.pair);
        }
        b.finish()
    }
}

/// Position of an in-progress scan plus the structure version it started at.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Cursor {
    next: u32,
    version: u64,
}

/// Outcome of one `move_next` step.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ScanState {
    /// Entry index of the next live entry.
    FoundEntry(u32),
    /// The map changed structurally since the cursor was created.
    InvalidVersion,
    End,
}

pub struct KeyedHashMap<K, V, B = Vec<u32>, E = Vec<Entry<K, V>>> {
    buckets: B,
    entries: E,
    free_head: u32,
    len: u32,
    version: u64,
    _pd: PhantomData<(K, V)>,
}

/// Map keyed by `i32`; bucket is `key mod capacity`.
pub type IntHashMap<V> = KeyedHashMap<i32, V>;
/// Map keyed by owned strings; lookups accept `&str`.
pub type StrHashMap<V> = KeyedHashMap<String, V>;

impl<K: MapKey, V> KeyedHashMap<K, V> {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Capacity is rounded up to the next prime in the table.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_storage(Vec::new(), Vec::new(), capacity)
    }
}

impl<K: MapKey, V> Default for KeyedHashMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'p, K: MapKey, V> KeyedHashMap<K, V, PooledStorage<'p, u32>, PooledStorage<'p, Entry<K, V>>> {
    pub fn new_in(
        bucket_pool: &'p ArrayPool<u32>,
        entry_pool: &'p ArrayPool<Entry<K, V>>,
        capacity: usize,
    ) -> Self {
        Self::with_storage(
            PooledStorage::new(bucket_pool),
            PooledStorage::new(entry_pool),
            capacity,
        )
    }

    /// Return both arrays to their pools.
    pub fn dispose(self) {
        self.buckets.dispose();
        self.entries.dispose();
    }
}

impl<K: MapKey, V> KeyedHashMap<K, V, RawStorage<u32>, RawStorage<Entry<K, V>>> {
    pub fn new_raw(capacity: usize) -> Self {
        Self::with_storage(RawStorage::new(), RawStorage::new(), capacity)
    }

    /// Free both arrays, dropping every stored key and value.
    pub fn dispose(self) {
        self.buckets.dispose();
        self.entries.dispose();
    }
}

impl<K, V, B, E> KeyedHashMap<K, V, B, E>
where
    K: MapKey,
    B: Storage<u32>,
    E: Storage<Entry<K, V>>,
{
    /// Build over empty `buckets` and `entries` storages.
    pub fn with_storage(mut buckets: B, mut entries: E, capacity: usize) -> Self {
        assert!(
            buckets.is_empty() && entries.is_empty(),
            "hash map storage must start empty"
        );
        let cap = get_prime(capacity).unwrap_or_else(|| panic!("capacity overflow"));
        buckets.grow_with(cap, |_| END);
        entries.grow_with(cap, |i| Entry {
            hash: 0,
            link: FREE | free_successor(i, cap),
            pair: None,
        });
        Self {
            buckets,
            entries,
            free_head: 0,
            len: 0,
            version: 0,
            _pd: PhantomData,
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
        self.entries.len()
    }

    /// No free entry left; the next unchecked add would panic.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.free_head == END
    }

    /// Structure version; changes on every add, remove, clear and resize.
    #[inline]
    pub fn version(&self) -> u64 {
        self.version
    }

    #[inline]
    fn bucket_of(&self, hash: u64) -> usize {
        (hash % self.buckets.len() as u64) as usize
    }

    #[inline]
    fn bump_version(&mut self) {
        self.version = self.version.wrapping_add(1);
    }

    // ---- lookup ----

    /// Entry index of the most recently added entry for `key`.
    pub fn index_of<Q>(&self, key: &Q) -> Option<u32>
    where
        K: Borrow<Q>,
        Q: ?Sized + MapKey,
    {
        let entries = self.entries.as_slice();
        let mut i = self.buckets.as_slice()[self.bucket_of(key.stable_hash())];
        while i != END {
            let entry = &entries[i as usize];
            if let Some((k, _)) = &entry.pair {
                if k.borrow() == key {
                    return Some(i);
                }
            }
            i = entry.link;
        }
        None
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + MapKey,
    {
        self.index_of(key).is_some()
    }

    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: ?Sized + MapKey,
    {
        let i = self.index_of(key)?;
        self.value_at(i)
    }

    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: ?Sized + MapKey,
    {
        let i = self.index_of(key)?;
        self.value_at_mut(i)
    }

    /// Key and value stored at entry `index`, if it is live.
    pub fn entry_at(&self, index: u32) -> Option<(&K, &V)> {
        self.entries
            .as_slice()
            .get(index as usize)?
            .live_pair()
            .map(|(k, v)| (k, v))
    }

    pub fn key_at(&self, index: u32) -> Option<&K> {
        self.entry_at(index).map(|(k, _)| k)
    }

    pub fn value_at(&self, index: u32) -> Option<&V> {
        self.entry_at(index).map(|(_, v)| v)
    }

    pub fn value_at_mut(&mut self, index: u32) -> Option<&mut V> {
        let entry = self.entries.as_mut_slice().get_mut(index as usize)?;
        if entry.is_free() {
            return None;
        }
        entry.pair.as_mut().map(|(_, v)| v)
    }

    // ---- insertion ----

    fn push_entry(&mut self, hash: u64, key: K, value: V) -> u32 {
        let index = self.free_head;
        assert!(
            index != END,
            "hash map entry pool is exhausted (capacity {})",
            self.capacity()
        );
        let bucket = self.bucket_of(hash);
        let buckets = self.buckets.as_mut_slice();
        let entry = &mut self.entries.as_mut_slice()[index as usize];
        self.free_head = entry.link & !FREE;
        entry.hash = hash;
        entry.link = buckets[bucket];
        buckets[bucket] = index;
        // Assigned last: dropping a stale pair runs user code.
        entry.pair = Some((key, value));
        self.len += 1;
        self.bump_version();
        index
    }

    /// Insert without checking for room or for an existing key.
    ///
    /// # Panics
    /// If the entry pool is exhausted.
    pub fn add_unchecked(&mut self, key: K, value: V) -> u32 {
        let hash = key.stable_hash();
        self.push_entry(hash, key, value)
    }

    /// Insert, growing first if the pool is exhausted. Does not check for an
    /// existing key; a duplicate shadows the older entry.
    pub fn add_safe(&mut self, key: K, value: V) -> u32 {
        self.add_with_expand_check(key, value).1
    }

    /// As `add_safe`, also reporting whether the map grew.
    pub fn add_with_expand_check(&mut self, key: K, value: V) -> (bool, u32) {
        let expanded = self.is_full();
        if expanded {
            self.expand();
        }
        (expanded, self.add_unchecked(key, value))
    }

    /// Insert only if `key` is absent; otherwise leave the map untouched.
    pub fn add_with_unique_check(&mut self, key: K, value: V) -> Result<u32, InsertError> {
        if self.index_of(&key).is_some() {
            return Err(InsertError::DuplicateKey);
        }
        Ok(self.add_safe(key, value))
    }

    /// Overwrite the value for `key` if present, otherwise add it. Returns
    /// the previous value.
    pub fn set(&mut self, key: K, value: V) -> Option<V> {
        match self.get_mut(&key) {
            Some(slot) => Some(core::mem::replace(slot, value)),
            None => {
                self.add_safe(key, value);
                None
            }
        }
    }

    /// Overwrite in place; no structural change, so cursors stay valid.
    pub fn try_modify_value<Q>(&mut self, key: &Q, value: V) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + MapKey,
    {
        match self.get_mut(key) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    // ---- removal ----

    /// Take the first entry for `key` off its chain and push it on the free
    /// chain. The pair is left in the slot for the caller to deal with.
    fn unlink<Q>(&mut self, key: &Q) -> Option<u32>
    where
        K: Borrow<Q>,
        Q: ?Sized + MapKey,
    {
        let bucket = self.bucket_of(key.stable_hash());
        let buckets = self.buckets.as_mut_slice();
        let entries = self.entries.as_mut_slice();
        let mut prev = END;
        let mut i = buckets[bucket];
        while i != END {
            let entry = &entries[i as usize];
            let next = entry.link;
            if matches!(&entry.pair, Some((k, _)) if k.borrow() == key) {
                if prev == END {
                    buckets[bucket] = next;
                } else {
                    entries[prev as usize].link = next;
                }
                entries[i as usize].link = FREE | self.free_head;
                self.free_head = i;
                self.len -= 1;
                self.version = self.version.wrapping_add(1);
                return Some(i);
            }
            prev = i;
            i = next;
        }
        None
    }

    pub fn try_remove<Q>(&mut self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + MapKey,
    {
        match self.unlink(key) {
            Some(i) => {
                self.entries.as_mut_slice()[i as usize].pair = None;
                true
            }
            None => false,
        }
    }

    /// Remove without dropping the stored key and value; they stay in the
    /// freed slot until it is reused, cleared, or the map is dropped.
    pub fn try_remove_no_value_clear<Q>(&mut self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + MapKey,
    {
        self.unlink(key).is_some()
    }

    /// Remove and return the value.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized + MapKey,
    {
        let i = self.unlink(key)?;
        self.entries.as_mut_slice()[i as usize]
            .pair
            .take()
            .map(|(_, v)| v)
    }

    /// Drop every entry, empty all buckets and rebuild the free chain in
    /// index order.
    pub fn clear(&mut self) {
        let cap = self.capacity();
        for (i, entry) in self.entries.as_mut_slice().iter_mut().enumerate() {
            entry.link = FREE | free_successor(i, cap);
            entry.pair = None;
        }
        self.buckets.as_mut_slice().fill(END);
        self.free_head = 0;
        self.len = 0;
        self.bump_version();
    }

    // ---- growth ----

    /// Grow to the next prime capacity.
    ///
    /// # Panics
    /// Past the 31-bit index space.
    pub fn expand(&mut self) {
        let next = expand_prime(self.capacity()).unwrap_or_else(|| panic!("capacity overflow"));
        self.resize(next);
    }

    /// Ensure capacity `>= min_capacity`, rounding up to a prime. Existing
    /// entries keep their indices and stay reachable.
    pub fn reserve(&mut self, min_capacity: usize) {
        if let Err(e) = self.try_reserve(min_capacity) {
            panic!("{e}");
        }
    }

    pub fn try_reserve(&mut self, min_capacity: usize) -> Result<(), CapacityError> {
        if min_capacity <= self.capacity() {
            return Ok(());
        }
        let cap = get_prime(min_capacity).ok_or(CapacityError::Overflow {
            requested: min_capacity,
            max: crate::storage::MAX_CAPACITY,
        })?;
        self.resize(cap);
        Ok(())
    }

    fn resize(&mut self, new_cap: usize) {
        let old_cap = self.capacity();
        debug_assert!(new_cap > old_cap);
        let old_heads: Vec<u32> = self.buckets.as_slice().to_vec();

        // New entries chain onto the existing free list.
        let old_free = self.free_head;
        self.entries.grow_with(new_cap, |i| Entry {
            hash: 0,
            link: FREE | if i + 1 < new_cap { i as u32 + 1 } else { old_free },
            pair: None,
        });
        self.free_head = old_cap as u32;

        self.buckets.grow_with(new_cap, |_| END);
        let buckets = self.buckets.as_mut_slice();
        buckets.fill(END);
        let entries = self.entries.as_mut_slice();
        let mut chain = Vec::new();
        for head in old_heads {
            chain.clear();
            let mut i = head;
            while i != END {
                chain.push(i);
                i = entries[i as usize].link;
            }
            // Tail first, so the newest entry ends up at the head again.
            for &i in chain.iter().rev() {
                let entry = &mut entries[i as usize];
                let b = (entry.hash % new_cap as u64) as usize;
                entry.link = buckets[b];
                buckets[b] = i;
            }
        }
        self.bump_version();
        tracing::trace!(old_cap, new_cap, len = self.len, "hash map resized");
    }

    // ---- iteration ----

    /// Start a scan at the first entry, snapshotting the structure version.
    pub fn cursor(&self) -> Cursor {
        Cursor {
            next: 0,
            version: self.version,
        }
    }

    /// Advance without checking for intervening mutation.
    pub fn move_next_unchecked(&self, cursor: &mut Cursor) -> ScanState {
        let entries = self.entries.as_slice();
        while (cursor.next as usize) < entries.len() {
            let i = cursor.next;
            cursor.next += 1;
            if entries[i as usize].is_occupied() {
                return ScanState::FoundEntry(i);
            }
        }
        ScanState::End
    }

    /// Advance, failing with `InvalidVersion` if the map changed structurally
    /// since `cursor` was created.
    pub fn move_next(&self, cursor: &mut Cursor) -> ScanState {
        if cursor.version != self.version {
            return ScanState::InvalidVersion;
        }
        self.move_next_unchecked(cursor)
    }

    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            it: self.entries.as_slice().iter(),
        }
    }

    pub fn iter_mut(&mut self) -> IterMut<'_, K, V> {
        IterMut {
            it: self.entries.as_mut_slice().iter_mut(),
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> + '_ {
        self.iter().map(|(k, _)| k)
    }

    pub fn values(&self) -> impl Iterator<Item = &V> + '_ {
        self.iter().map(|(_, v)| v)
    }

    /// Walk every structural invariant; used by tests.
    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        let cap = self.capacity();
        assert!(crate::primes::is_prime(cap));
        assert_eq!(self.buckets.len(), cap);
        let entries = self.entries.as_slice();
        let mut seen = vec![false; cap];
        let mut chained = 0;
        for (b, &head) in self.buckets.as_slice().iter().enumerate() {
            let mut i = head;
            while i != END {
                let entry = &entries[i as usize];
                assert!(!entry.is_free(), "free entry on a bucket chain");
                assert_eq!(self.bucket_of(entry.hash), b, "entry in wrong bucket");
                assert!(!seen[i as usize], "entry on two chains");
                seen[i as usize] = true;
                chained += 1;
                i = entry.link;
            }
        }
        assert_eq!(chained, self.len());
        let mut i = self.free_head;
        let mut free = 0;
        while i != END {
            let entry = &entries[i as usize];
            assert!(entry.is_free());
            assert!(!seen[i as usize], "entry both live and free");
            seen[i as usize] = true;
            free += 1;
            i = entry.link & !FREE;
        }
        assert_eq!(chained + free, cap);
    }
}

#[inline]
fn free_successor(i: usize, cap: usize) -> u32 {
    if i + 1 < cap {
        i as u32 + 1
    } else {
        END
    }
}

impl<K, V, B, E, Q> Index<&Q> for KeyedHashMap<K, V, B, E>
where
    K: MapKey + Borrow<Q>,
    Q: ?Sized + MapKey,
    B: Storage<u32>,
    E: Storage<Entry<K, V>>,
{
    type Output = V;

    /// # Panics
    /// If `key` is absent.
    fn index(&self, key: &Q) -> &V {
        match self.get(key) {
            Some(v) => v,
            None => panic!("key not found in map"),
        }
    }
}

impl<K, V, B, E> core::fmt::Debug for KeyedHashMap<K, V, B, E>
where
    K: MapKey + core::fmt::Debug,
    V: core::fmt::Debug,
    B: Storage<u32>,
    E: Storage<Entry<K, V>>,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

/// Live entries in pool order.
pub struct Iter<'a, K, V> {
    it: core::slice::Iter<'a, Entry<K, V>>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);
    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.it
            .by_ref()
            .find_map(|e| e.live_pair().map(|(k, v)| (k, v)))
    }
}

pub struct IterMut<'a, K, V> {
    it: core::slice::IterMut<'a, Entry<K, V>>,
}

impl<'a, K, V> Iterator for IterMut<'a, K, V> {
    type Item = (&'a K, &'a mut V);
    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.it.by_ref().find_map(|e| {
            if e.is_free() {
                return None;
            }
            e.pair.as_mut().map(|(k, v)| (&*k, v))
        })
    }
}
