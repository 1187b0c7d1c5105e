//! RawAllocator
//!
//! The RawAllocator trait is used by block lists to request individually sized blocks of memory. By abstracting the
//! upstream allocator, it becomes possible to substitute a counting allocator in tests, or an arena, or the global
//! allocator.

use core::{alloc::Layout, ptr::NonNull};

use super::AllocError;

/// Abstraction of an upstream allocator.
pub trait RawAllocator {
    /// Allocates a fresh block of memory as per the specified layout.
    ///
    /// Returns an error if the allocation request cannot be satisfied; the error is propagated unchanged by callers.
    ///
    /// #   Safety
    ///
    /// The caller may assume that if the returned pointer is Ok then:
    /// -   The number of usable bytes is _greater than or equal_ to `layout.size()`.
    /// -   The pointer is _at least_ aligned to `layout.align()`.
    ///
    /// `allocate` assumes that:
    /// -   `layout.size()` is non-zero.
    unsafe fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError>;

    /// Deallocates the supplied block of memory.
    ///
    /// #   Safety
    ///
    /// The caller should no longer reference the memory after calling this function.
    ///
    /// `deallocate` assumes that:
    /// -   `pointer` was allocated by this instance of `RawAllocator`, with `layout` as argument.
    /// -   `pointer` is the value returned by `RawAllocator`, and not an interior pointer.
    unsafe fn deallocate(&self, pointer: NonNull<u8>, layout: Layout);
}

impl<'a, A> RawAllocator for &'a A
    where
        A: RawAllocator + ?Sized,
{
    unsafe fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> { (**self).allocate(layout) }

    unsafe fn deallocate(&self, pointer: NonNull<u8>, layout: Layout) { (**self).deallocate(pointer, layout) }
}

/// GlobalAllocator
///
/// Forwards to the global allocator of the program.
#[derive(Clone, Copy, Debug, Default)]
pub struct GlobalAllocator;

impl RawAllocator for GlobalAllocator {
    unsafe fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        debug_assert!(layout.size() > 0);

        //  Safety:
        //  -   `layout.size()` is assumed to be non-zero.
        NonNull::new(alloc::alloc::alloc(layout)).ok_or_else(|| AllocError::out_of_memory(layout))
    }

    unsafe fn deallocate(&self, pointer: NonNull<u8>, layout: Layout) {
        //  Safety:
        //  -   `pointer` is assumed to have been allocated with `layout`.
        alloc::alloc::dealloc(pointer.as_ptr(), layout);
    }
}

// mod tests
