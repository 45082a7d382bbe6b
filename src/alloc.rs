//! A pluggable allocation strategy for descriptor-table-adjacent storage.
//!
//! The registry and plan structures are owned by Rust's allocator and freed
//! deterministically by `Drop`; this trait only exists for callers who want
//! to pool *their own* storage (e.g. batches of `Format` names built at
//! extension-load time). The crate's own registry never calls it on a hot
//! path.

use std::alloc::{GlobalAlloc, Layout, System};
use std::ptr;

/// A pluggable allocation strategy. The default, [`SystemAlloc`], forwards
/// straight to `std::alloc::System`.
///
/// # Safety
///
/// Implementations must uphold the usual `GlobalAlloc`-style contract:
/// `resize` and `free` may only be called with a `(ptr, size)` pair that was
/// previously returned by `alloc`/`resize`/`duplicate` on the same
/// instance, and `ptr` must not be used afterward.
pub unsafe trait AllocStrategy: Send + Sync {
    /// Allocate `size` bytes, or return a null pointer on failure. `size ==
    /// 0` is permitted and may return null without that being a failure.
    fn alloc(&self, size: usize) -> *mut u8;

    /// Resize a previous allocation: grows by at least 2x when a bigger
    /// backing allocation is needed, may shrink in place, `new_size == 0`
    /// frees and returns null, and `ptr == null` allocates fresh.
    fn resize(&self, ptr: *mut u8, old_size: usize, new_size: usize) -> *mut u8;

    /// Free a previous allocation.
    fn free(&self, ptr: *mut u8, size: usize);

    /// Allocate a fresh copy of `size` bytes starting at `ptr` and return the
    /// new allocation.
    fn duplicate(&self, ptr: *const u8, size: usize) -> *mut u8;
}

/// The default [`AllocStrategy`], backed by `std::alloc::System`.
pub struct SystemAlloc;

fn layout_for(size: usize) -> Layout {
    // Byte buffers only; alignment of 1 is always valid and matches what a
    // C `malloc`-alike hands back.
    Layout::from_size_align(size.max(1), 1).expect("size_align within isize::MAX")
}

unsafe impl AllocStrategy for SystemAlloc {
    fn alloc(&self, size: usize) -> *mut u8 {
        if size == 0 {
            return ptr::null_mut();
        }
        unsafe { System.alloc(layout_for(size)) }
    }

    fn resize(&self, ptr: *mut u8, old_size: usize, new_size: usize) -> *mut u8 {
        if new_size == 0 {
            if !ptr.is_null() {
                self.free(ptr, old_size);
            }
            return std::ptr::null_mut();
        }
        if ptr.is_null() {
            return self.alloc(new_size);
        }
        let grown = new_size.max(old_size.saturating_mul(2)).max(1);
        unsafe { System.realloc(ptr, layout_for(old_size), grown) }
    }

    fn free(&self, ptr: *mut u8, size: usize) {
        if ptr.is_null() {
            return;
        }
        unsafe { System.dealloc(ptr, layout_for(size)) }
    }

    fn duplicate(&self, ptr: *const u8, size: usize) -> *mut u8 {
        let new_ptr = self.alloc(size);
        if !new_ptr.is_null() && !ptr.is_null() && size > 0 {
            unsafe { core::ptr::copy_nonoverlapping(ptr, new_ptr, size) };
        }
        new_ptr
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resize_grows_by_at_least_two_x() {
        let a = SystemAlloc;
        let p = a.alloc(8);
        assert!(!p.is_null());
        unsafe { *p.add(0) = 7 };
        let p2 = a.resize(p, 8, 9);
        assert!(!p2.is_null());
        // We can't observe the backing capacity directly, but resizing must
        // at least preserve the written byte.
        assert_eq!(unsafe { *p2.add(0) }, 7);
        a.free(p2, 16);
    }

    #[test]
    fn resize_to_zero_frees() {
        let a = SystemAlloc;
        let p = a.alloc(4);
        assert_eq!(a.resize(p, 4, 0), std::ptr::null_mut());
    }

    #[test]
    fn duplicate_returns_new_allocation() {
        let a = SystemAlloc;
        let p = a.alloc(4);
        unsafe {
            *p.add(0) = 1;
            *p.add(1) = 2;
        }
        let d = a.duplicate(p, 4);
        assert!(!d.is_null());
        assert_ne!(d as usize, p as usize);
        assert_eq!(unsafe { *d.add(1) }, 2);
        a.free(p, 4);
        a.free(d, 4);
    }
}
