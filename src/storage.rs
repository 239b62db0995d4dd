//! Storage: the backend seam every collection in this crate is written against.
//!
//! The algorithms only ever see a contiguous slice plus a way to grow it, so
//! the same code runs over an owned `Vec`, a buffer rented from an
//! [`ArrayPool`](crate::pool::ArrayPool), or a manually allocated block
//! ([`RawStorage`](crate::raw_storage::RawStorage)).

/// Largest element count any structure may reach. Indices are `u32` and the
/// hash map reserves the high bit of its links as the free-chain marker.
pub const MAX_CAPACITY: usize = (u32::MAX >> 1) as usize;

/// Contiguous, growable backing memory.
pub trait Storage<T> {
    fn as_slice(&self) -> &[T];

    fn as_mut_slice(&mut self) -> &mut [T];

    #[inline]
    fn len(&self) -> usize {
        self.as_slice().len()
    }

    #[inline]
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Grow to exactly `new_len` elements, initializing each new position
    /// `i` with `fill(i)`. Existing elements keep their positions. Requests
    /// at or below the current length are ignored; storage never shrinks.
    fn grow_with<F>(&mut self, new_len: usize, fill: F)
    where
        F: FnMut(usize) -> T;
}

impl<T> Storage<T> for Vec<T> {
    #[inline]
    fn as_slice(&self) -> &[T] {
        self
    }

    #[inline]
    fn as_mut_slice(&mut self) -> &mut [T] {
        self
    }

    fn grow_with<F>(&mut self, new_len: usize, mut fill: F)
    where
        F: FnMut(usize) -> T,
    {
        let len = Vec::len(self);
        if new_len <= len {
            return;
        }
        self.reserve_exact(new_len - len);
        self.extend((len..new_len).map(&mut fill));
    }
}
