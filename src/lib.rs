//! slot-collections: sparse-set slot allocators and a chained hash map with
//! prime-sized capacity, each running over pluggable backing storage.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: O(1) handle allocation and keyed lookup that never reallocate
//!   caller values, only their own bookkeeping arrays, with growth that is
//!   explicit and reported back to the caller.
//! - Layers:
//!   - Storage<T>: a contiguous slice plus `grow_with`. Implemented by
//!     `Vec<T>` (owned), `PooledStorage` (rented from an `ArrayPool`, the
//!     pool's lifetime bounds the storage) and `RawStorage` (manual
//!     allocation, explicit `dispose`).
//!   - SparseSet<S>: stable sparse handles mapped to a packed dense array,
//!     with an intrusive free list and optional caller-owned generation
//!     counters.
//!   - SlotPool<T>: generational value pool on top of SparseSet that
//!     mirrors every swap-back on its packed values.
//!   - KeyedHashMap<K, V, B, E>: bucket heads into an entry pool whose free
//!     chain reuses the chain link with a high-bit marker.
//!
//! Constraints
//! - Single-threaded: no internal locking.
//! - Indices are `u32`; capacity is capped at `2^31 - 1` because the hash
//!   map reserves the high bit of its links.
//! - Every structure is built once over one algorithm; backends only
//!   differ in how memory is obtained and released.
//!
//! Strictness ladders
//! - `*_unchecked` entry points assume the caller verified room/validity and
//!   panic on violation.
//! - `*_with_expand_check` / `add_safe` grow instead of failing.
//! - `*_with_bounds_check` / `*_with_version_check` never panic for bad
//!   input; they answer `None`/`false`.
//!
//! Generations
//! - A generation counter is bumped each time its slot is freed. Handles
//!   compare with `!=`; after `u32::MAX` reuses of one slot a counter wraps
//!   and a very old handle could alias again. This is accepted.
//!
//! Iteration guard
//! - The hash map keeps a structure version bumped on every add, remove,
//!   clear and resize. `Cursor`-based scans check it at each step and report
//!   `ScanState::InvalidVersion` instead of skipping or repeating entries.
//!   Borrowing iterators (`iter`, `iter_mut`) need no check.
//!
//! Hashing
//! - Integer keys hash to themselves; strings hash with 64-bit FNV-1a. Both
//!   are seedless and width-independent, so bucket placement is identical
//!   across runs and targets.

pub mod error;
pub mod keyed_hash_map;
#[cfg(test)]
mod keyed_hash_map_proptest;
pub mod pool;
pub mod primes;
pub mod raw_storage;
pub mod slot_pool;
pub mod sparse_set;
#[cfg(test)]
mod sparse_set_proptest;
pub mod storage;

// Public surface
pub use error::{CapacityError, InsertError};
pub use keyed_hash_map::{
    Cursor, Entry, IntHashMap, KeyedHashMap, MapKey, ScanState, StrHashMap,
};
pub use pool::{ArrayPool, ClearPolicy, PoolConfig, PooledStorage};
pub use raw_storage::RawStorage;
pub use slot_pool::{Handle, SlotPool};
pub use sparse_set::{Slot, SparseSet, Swap};
pub use storage::{Storage, MAX_CAPACITY};
