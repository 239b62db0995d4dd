//! ArrayPool: size-classed buffer recycling, and the storage backend that
//! rents from it.
//!
//! Buffers handed out by `rent` always have a power-of-two length and are
//! fully initialized; whether the previous tenant's contents are wiped is
//! governed by [`ClearPolicy`].

use crate::storage::Storage;
use core::cell::RefCell;
use hashbrown::HashMap;

/// When to reset buffer contents to `T::default()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClearPolicy {
    /// Stale contents are left in place both ways.
    #[default]
    None,
    /// Wipe a buffer as it is given back to the pool.
    OnReturn,
    /// Wipe a recycled buffer before handing it out.
    OnRent,
    Both,
}

impl ClearPolicy {
    #[inline]
    fn on_return(self) -> bool {
        matches!(self, ClearPolicy::OnReturn | ClearPolicy::Both)
    }

    #[inline]
    fn on_rent(self) -> bool {
        matches!(self, ClearPolicy::OnRent | ClearPolicy::Both)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    pub clear_policy: ClearPolicy,
    /// Buffers kept per size class; extra returns are dropped.
    pub max_retained_per_class: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            clear_policy: ClearPolicy::None,
            max_retained_per_class: 8,
        }
    }
}

/// Single-threaded buffer pool keyed by size class (log2 of the length).
#[derive(Debug)]
pub struct ArrayPool<T> {
    config: PoolConfig,
    classes: RefCell<HashMap<u32, Vec<Vec<T>>>>,
}

#[inline]
fn size_class(min_len: usize) -> u32 {
    min_len.max(1).next_power_of_two().trailing_zeros()
}

impl<T: Default> ArrayPool<T> {
    pub fn new() -> Self {
        Self::with_config(PoolConfig::default())
    }

    pub fn with_config(config: PoolConfig) -> Self {
        Self {
            config,
            classes: RefCell::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Hand out a buffer whose length is the smallest power of two
    /// `>= min_len`, recycling a returned one when available.
    pub fn rent(&self, min_len: usize) -> Vec<T> {
        let class = size_class(min_len);
        let recycled = self
            .classes
            .borrow_mut()
            .get_mut(&class)
            .and_then(Vec::pop);
        match recycled {
            Some(mut buf) => {
                if self.config.clear_policy.on_rent() {
                    buf.iter_mut().for_each(|x| *x = T::default());
                }
                buf
            }
            None => {
                let len = 1usize << class;
                tracing::trace!(len, "array pool miss, allocating");
                let mut buf = Vec::with_capacity(len);
                buf.resize_with(len, T::default);
                buf
            }
        }
    }

    /// Take a buffer back for reuse. Buffers whose length is not a size
    /// class did not come from a pool and are simply dropped.
    pub fn give_back(&self, mut buf: Vec<T>) {
        let len = buf.len();
        if len == 0 || !len.is_power_of_two() {
            return;
        }
        if self.config.clear_policy.on_return() {
            buf.iter_mut().for_each(|x| *x = T::default());
        }
        let mut classes = self.classes.borrow_mut();
        let bucket = classes.entry(len.trailing_zeros()).or_default();
        if bucket.len() >= self.config.max_retained_per_class {
            tracing::trace!(len, "array pool class full, dropping buffer");
            return;
        }
        bucket.push(buf);
    }

    /// Number of idle buffers held for the size class that serves `len`.
    pub fn retained(&self, len: usize) -> usize {
        self.classes
            .borrow()
            .get(&size_class(len))
            .map_or(0, Vec::len)
    }
}

impl<T: Default> Default for ArrayPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Storage rented from an [`ArrayPool`]. The buffer goes back to the pool on
/// `dispose` or drop, after its live elements are reset to `T::default()`;
/// the borrow ties this storage's lifetime to the pool's.
pub struct PooledStorage<'p, T: Default> {
    pool: &'p ArrayPool<T>,
    buf: Vec<T>,
    len: usize,
}

impl<'p, T: Default> PooledStorage<'p, T> {
    /// Empty storage; nothing is rented until the first growth.
    pub fn new(pool: &'p ArrayPool<T>) -> Self {
        Self {
            pool,
            buf: Vec::new(),
            len: 0,
        }
    }

    /// Length of the rented buffer, which may exceed the logical length.
    pub fn rented_len(&self) -> usize {
        self.buf.len()
    }

    pub fn dispose(self) {
        drop(self);
    }
}

impl<'p, T: Default> Storage<T> for PooledStorage<'p, T> {
    #[inline]
    fn as_slice(&self) -> &[T] {
        &self.buf[..self.len]
    }

    #[inline]
    fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.buf[..self.len]
    }

    fn grow_with<F>(&mut self, new_len: usize, mut fill: F)
    where
        F: FnMut(usize) -> T,
    {
        if new_len <= self.len {
            return;
        }
        if new_len > self.buf.len() {
            let mut next = self.pool.rent(new_len);
            next[..self.len].swap_with_slice(&mut self.buf[..self.len]);
            let old = core::mem::replace(&mut self.buf, next);
            if !old.is_empty() {
                self.pool.give_back(old);
            }
        }
        for i in self.len..new_len {
            self.buf[i] = fill(i);
        }
        self.len = new_len;
    }
}

impl<'p, T: Default> Drop for PooledStorage<'p, T> {
    fn drop(&mut self) {
        let mut buf = core::mem::take(&mut self.buf);
        if buf.is_empty() {
            return;
        }
        // The logical contents die with their owner whatever the clear policy;
        // only the tail past `len` may carry stale values into the pool.
        buf[..self.len].iter_mut().for_each(|x| *x = T::default());
        self.pool.give_back(buf);
    }
}

impl<'p, T: Default + core::fmt::Debug> core::fmt::Debug for PooledStorage<'p, T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PooledStorage")
            .field("len", &self.len)
            .field("rented_len", &self.buf.len())
            .finish()
    }
}
