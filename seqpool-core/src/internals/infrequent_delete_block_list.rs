//! List of individually sized blocks, released in bulk only.
//!
//! The blocks are threaded through an intrusive singly-linked list: each block header records the next block and the
//! layout used to obtain it, and nothing else.

use core::{
    alloc::Layout,
    mem,
    ptr::{self, NonNull},
};

use crate::{AllocError, GlobalAllocator, MAX_ALIGNMENT, RawAllocator};

use super::block_list::block_layout;

/// InfrequentDeleteBlockList
///
/// Provides individually sized, maximally aligned, blocks of memory obtained from an upstream `RawAllocator`.
///
/// Unlike `BlockList`, blocks cannot be returned individually: `deallocate` is a no-op, and the memory is only returned
/// upstream on `release` or drop. In exchange, the per-block bookkeeping is limited to a link in the block header.
pub struct InfrequentDeleteBlockList<A: RawAllocator = GlobalAllocator> {
    head: Option<NonNull<Header>>,
    length: usize,
    allocator: A,
}

//  Safety:
//  -   The blocks, headers included, are exclusively owned by the instance, and only accessed through it.
unsafe impl<A: RawAllocator + Send> Send for InfrequentDeleteBlockList<A> {}

impl<A: RawAllocator> InfrequentDeleteBlockList<A> {
    /// The number of bytes preceding each block.
    pub const BLOCK_HEADER_SIZE: usize = MAX_ALIGNMENT.round_up(mem::size_of::<Header>());

    /// Creates an empty instance.
    pub const fn new(allocator: A) -> Self { Self { head: None, length: 0, allocator } }

    /// Returns a reference to the upstream allocator.
    pub fn allocator(&self) -> &A { &self.allocator }

    /// Returns the number of blocks currently allocated.
    pub fn len(&self) -> usize { self.length }

    /// Returns whether no block is currently allocated.
    pub fn is_empty(&self) -> bool { self.head.is_none() }

    /// Allocates a block of at least `size` bytes, aligned on `MAX_ALIGNMENT`.
    ///
    /// Returns None, without allocating, if `size` is 0, and the error of the upstream allocator if it fails.
    pub fn allocate(&mut self, size: usize) -> Result<Option<NonNull<u8>>, AllocError> {
        if size == 0 {
            return Ok(None);
        }

        self.allocate_block(size).map(Some)
    }

    /// Allocates a block of at least `size` bytes, aligned on `MAX_ALIGNMENT`, `size` being non-zero.
    pub fn allocate_block(&mut self, size: usize) -> Result<NonNull<u8>, AllocError> {
        debug_assert!(size > 0);

        let layout = block_layout(size, Self::BLOCK_HEADER_SIZE)?;

        //  Safety:
        //  -   `layout.size()` is non-zero.
        let block = unsafe { self.allocator.allocate(layout)? };

        let header = block.cast::<Header>();

        //  Safety:
        //  -   `block` is aligned on `MAX_ALIGNMENT`, hence suitably aligned for `Header`.
        //  -   `block` is at least `BLOCK_HEADER_SIZE` bytes large.
        unsafe { ptr::write(header.as_ptr(), Header { next: self.head, layout }) };

        self.head = Some(header);
        self.length += 1;

        tracing::trace!(size = layout.size(), "InfrequentDeleteBlockList allocated block");

        //  Safety:
        //  -   `BLOCK_HEADER_SIZE` is strictly less than `layout.size()`.
        Ok(unsafe { NonNull::new_unchecked(block.as_ptr().add(Self::BLOCK_HEADER_SIZE)) })
    }

    /// Does nothing; the memory is only returned upstream on `release`.
    pub fn deallocate(&mut self, _address: Option<NonNull<u8>>) {}

    /// Returns all the blocks to the upstream allocator.
    ///
    /// The list is empty afterwards, and may be released again, or reused.
    pub fn release(&mut self) {
        let mut current = self.head.take();
        self.length = 0;

        while let Some(header) = current {
            //  Safety:
            //  -   `header` points to a live block, written by `allocate_block`.
            let Header { next, layout } = unsafe { ptr::read(header.as_ptr()) };

            //  Safety:
            //  -   `header` is the start of a block allocated by `self.allocator` with `layout`.
            unsafe { self.allocator.deallocate(header.cast(), layout) };

            current = next;
        }
    }
}

impl<A: RawAllocator> Drop for InfrequentDeleteBlockList<A> {
    fn drop(&mut self) { self.release(); }
}

impl<A: RawAllocator + Default> Default for InfrequentDeleteBlockList<A> {
    fn default() -> Self { Self::new(A::default()) }
}

//
//  Implementation
//

#[repr(C)]
struct Header {
    next: Option<NonNull<Header>>,
    layout: Layout,
}

// mod tests
