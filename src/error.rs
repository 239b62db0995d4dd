//! Error types for the fallible entry points.
//!
//! Precondition violations on `*_unchecked` paths panic instead; these enums
//! only cover outcomes a caller is expected to branch on.

use thiserror::Error;

/// Returned by `KeyedHashMap::add_with_unique_check` when the key is already
/// present. The map is left untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InsertError {
    #[error("key already present in map")]
    DuplicateKey,
}

/// Returned by `try_reserve` when a request cannot be represented in the
/// 31-bit index space shared by both structures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CapacityError {
    #[error("requested capacity {requested} exceeds maximum {max}")]
    Overflow { requested: usize, max: usize },
}
