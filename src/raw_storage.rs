//! RawStorage: a manually allocated block with explicit release.
//!
//! Memory comes straight from the global allocator. Growth allocates a new
//! block, moves the live prefix over bitwise and frees the old block without
//! running destructors on the moved elements.

use crate::storage::Storage;
use core::marker::PhantomData;
use core::ptr::{self, NonNull};
use std::alloc::{self, Layout};

pub struct RawStorage<T> {
    ptr: NonNull<T>,
    len: usize,
    cap: usize,
    // Owns `T`s for drop check; raw pointer keeps this !Send/!Sync.
    _owns: PhantomData<T>,
}

fn alloc_block<T>(cap: usize) -> NonNull<T> {
    if cap == 0 || core::mem::size_of::<T>() == 0 {
        return NonNull::dangling();
    }
    let layout = Layout::array::<T>(cap).unwrap_or_else(|_| panic!("capacity overflow"));
    // SAFETY: layout has non-zero size (checked above).
    let raw = unsafe { alloc::alloc(layout) } as *mut T;
    match NonNull::new(raw) {
        Some(p) => p,
        None => alloc::handle_alloc_error(layout),
    }
}

/// # Safety
/// `ptr` must come from `alloc_block::<T>(cap)` and not have been freed.
unsafe fn dealloc_block<T>(ptr: NonNull<T>, cap: usize) {
    if cap == 0 || core::mem::size_of::<T>() == 0 {
        return;
    }
    if let Ok(layout) = Layout::array::<T>(cap) {
        alloc::dealloc(ptr.as_ptr() as *mut u8, layout);
    }
}

impl<T> RawStorage<T> {
    pub const fn new() -> Self {
        Self {
            ptr: NonNull::dangling(),
            len: 0,
            cap: 0,
            _owns: PhantomData,
        }
    }

    /// Release the block now. Consuming `self` rules out use after release.
    pub fn dispose(self) {
        tracing::debug!(len = self.len, "raw storage disposed");
        drop(self);
    }

    fn release(&mut self) {
        // SAFETY: the first `len` elements are initialized and owned by us;
        // the block was allocated with `cap`.
        unsafe {
            ptr::drop_in_place(ptr::slice_from_raw_parts_mut(self.ptr.as_ptr(), self.len));
            dealloc_block(self.ptr, self.cap);
        }
        self.ptr = NonNull::dangling();
        self.len = 0;
        self.cap = 0;
    }
}

impl<T> Default for RawStorage<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Storage<T> for RawStorage<T> {
    #[inline]
    fn as_slice(&self) -> &[T] {
        // SAFETY: `len` elements starting at `ptr` are initialized.
        unsafe { core::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    #[inline]
    fn as_mut_slice(&mut self) -> &mut [T] {
        // SAFETY: as above, and `&mut self` gives exclusive access.
        unsafe { core::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    fn grow_with<F>(&mut self, new_len: usize, mut fill: F)
    where
        F: FnMut(usize) -> T,
    {
        if new_len <= self.len {
            return;
        }
        if new_len > self.cap {
            let fresh = alloc_block::<T>(new_len);
            // SAFETY: both blocks hold at least `len` elements and do not
            // overlap. Moved elements are not dropped from the old block.
            unsafe {
                ptr::copy_nonoverlapping(self.ptr.as_ptr(), fresh.as_ptr(), self.len);
                dealloc_block(self.ptr, self.cap);
            }
            self.ptr = fresh;
            self.cap = new_len;
        }
        // `len` tracks each write so a panicking `fill` leaks rather than
        // exposing uninitialized memory.
        while self.len < new_len {
            let value = fill(self.len);
            // SAFETY: `len < cap`, slot is uninitialized.
            unsafe { ptr::write(self.ptr.as_ptr().add(self.len), value) };
            self.len += 1;
        }
    }
}

impl<T> Drop for RawStorage<T> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<T: core::fmt::Debug> core::fmt::Debug for RawStorage<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_list().entries(self.as_slice()).finish()
    }
}
