//! Prime capacities for the hash map.
//!
//! Bucket placement is `hash % capacity`, so capacities are drawn from an
//! ascending prime table (roughly 1.2x apart) to keep the modulus well
//! distributed. Requests past the table fall back to trial division.
//! Growth doubles before rounding up, so repeated expansion stays amortized
//! O(1) even past the table.

use crate::storage::MAX_CAPACITY;

pub const PRIMES: &[u32] = &[
    3, 7, 11, 17, 23, 29, 37, 47, 59, 71, 89, 107, 131, 163, 197, 239, 293, 353, 431, 521, 631,
    761, 919, 1103, 1327, 1597, 1931, 2333, 2801, 3371, 4049, 4861, 5839, 7013, 8419, 10103,
    12143, 14591, 17519, 21023, 25229, 30293, 36353, 43627, 52361, 62851, 75431, 90523, 108631,
    130363, 156437, 187751, 225307, 270371, 324449, 389357, 467237, 560689, 672827, 807403,
    968897, 1162687, 1395263, 1674319, 2009191, 2411033, 2893249, 3471899, 4166287, 4999559,
    5999471, 7199369,
];

pub fn is_prime(n: usize) -> bool {
    if n < 2 {
        return false;
    }
    if n % 2 == 0 {
        return n == 2;
    }
    let mut d = 3;
    while d * d <= n {
        if n % d == 0 {
            return false;
        }
        d += 2;
    }
    true
}

/// Smallest valid capacity `>= min`. Returns `None` past [`MAX_CAPACITY`].
pub fn get_prime(min: usize) -> Option<usize> {
    if let Some(&p) = PRIMES.iter().find(|&&p| p as usize >= min) {
        return Some(p as usize);
    }
    let mut candidate = min | 1;
    while candidate <= MAX_CAPACITY {
        if is_prime(candidate) {
            return Some(candidate);
        }
        candidate += 2;
    }
    None
}

/// Growth target for a full map: the smallest prime `>= 2 * current`,
/// clamped to [`MAX_CAPACITY`] (itself prime). `None` once `current` is
/// already at the maximum.
pub fn expand_prime(current: usize) -> Option<usize> {
    if current >= MAX_CAPACITY {
        return None;
    }
    let doubled = current.checked_mul(2).map_or(MAX_CAPACITY, |d| d.min(MAX_CAPACITY));
    get_prime(doubled.max(current + 1))
}
