//! List of individually sized blocks, supporting individual deallocation.
//!
//! Each block is prefixed by a header recording the index of its descriptor within the list, so that a block can be
//! found, unlinked and returned upstream in O(1) from the pointer handed to the user.

use core::{
    alloc::Layout,
    mem,
    ptr::{self, NonNull},
};

use crate::{AllocError, GlobalAllocator, MAX_ALIGNMENT, RawAllocator};

use super::slots::Slots;

/// BlockList
///
/// Provides individually sized, maximally aligned, blocks of memory obtained from an upstream `RawAllocator`, and
/// returns them upstream either individually, or all at once on `release` or drop.
///
/// The upstream allocator is held, not owned: pass `&allocator` to share an allocator between several lists.
pub struct BlockList<A: RawAllocator = GlobalAllocator> {
    blocks: Slots<Block>,
    allocator: A,
}

//  Safety:
//  -   The blocks are exclusively owned by the instance, and only accessed through it.
unsafe impl<A: RawAllocator + Send> Send for BlockList<A> {}

impl<A: RawAllocator> BlockList<A> {
    /// The number of bytes preceding each block, to locate its descriptor.
    pub const BLOCK_HEADER_SIZE: usize = MAX_ALIGNMENT.round_up(mem::size_of::<Header>());

    /// Creates an empty instance.
    pub const fn new(allocator: A) -> Self { Self { blocks: Slots::new(), allocator } }

    /// Returns a reference to the upstream allocator.
    pub fn allocator(&self) -> &A { &self.allocator }

    /// Returns the number of blocks currently allocated.
    pub fn len(&self) -> usize { self.blocks.len() }

    /// Returns whether no block is currently allocated.
    pub fn is_empty(&self) -> bool { self.blocks.is_empty() }

    /// Allocates a block of at least `size` bytes, aligned on `MAX_ALIGNMENT`.
    ///
    /// Returns None, without allocating, if `size` is 0, and the error of the upstream allocator if it fails.
    pub fn allocate(&mut self, size: usize) -> Result<Option<NonNull<u8>>, AllocError> {
        if size == 0 {
            return Ok(None);
        }

        let layout = block_layout(size, Self::BLOCK_HEADER_SIZE)?;

        //  Safety:
        //  -   `layout.size()` is non-zero.
        let block = unsafe { self.allocator.allocate(layout)? };

        let index = self.blocks.insert(Block { pointer: block, layout });

        tracing::trace!(size = layout.size(), index, "BlockList allocated block");

        //  Safety:
        //  -   `block` is aligned on `MAX_ALIGNMENT`, hence suitably aligned for `Header`.
        //  -   `block` is at least `BLOCK_HEADER_SIZE` bytes large.
        #[allow(clippy::cast_ptr_alignment)]
        unsafe { ptr::write(block.as_ptr() as *mut Header, Header { index }) };

        //  Safety:
        //  -   `BLOCK_HEADER_SIZE` is strictly less than `layout.size()`.
        Ok(Some(unsafe { NonNull::new_unchecked(block.as_ptr().add(Self::BLOCK_HEADER_SIZE)) }))
    }

    /// Returns the block pointed to by `address` to the upstream allocator.
    ///
    /// Does nothing if `address` is None.
    ///
    /// #   Safety
    ///
    /// -   Assumes that `address` was returned by `allocate` on this instance.
    /// -   Assumes that `address` was not deallocated since, nor the list released.
    /// -   Assumes that the memory pointed to by `address` is no longer in use.
    pub unsafe fn deallocate(&mut self, address: Option<NonNull<u8>>) {
        let address = match address {
            Some(address) => address,
            None => return,
        };

        //  Safety:
        //  -   `address` is assumed to point `BLOCK_HEADER_SIZE` bytes past the start of a block.
        let header = address.as_ptr().sub(Self::BLOCK_HEADER_SIZE);

        #[allow(clippy::cast_ptr_alignment)]
        let index = ptr::read(header as *const Header).index;

        debug_assert!(self.blocks.get(index).map(|b| b.pointer.as_ptr() == header).unwrap_or(false),
            "{:x} was not allocated by this BlockList", address.as_ptr() as usize);

        if let Some(block) = self.blocks.remove(index) {
            self.allocator.deallocate(block.pointer, block.layout);
        }
    }

    /// Returns all the blocks to the upstream allocator.
    ///
    /// The list is empty afterwards, and may be released again, or reused.
    pub fn release(&mut self) {
        for block in self.blocks.drain() {
            //  Safety:
            //  -   `block` was allocated by `self.allocator` with `block.layout`.
            unsafe { self.allocator.deallocate(block.pointer, block.layout) };
        }
    }
}

impl<A: RawAllocator> Drop for BlockList<A> {
    fn drop(&mut self) { self.release(); }
}

impl<A: RawAllocator + Default> Default for BlockList<A> {
    fn default() -> Self { Self::new(A::default()) }
}

/// Returns the layout of a block able to hold `size` bytes past a header of `header` bytes.
pub(crate) fn block_layout(size: usize, header: usize) -> Result<Layout, AllocError> {
    let align = MAX_ALIGNMENT.value();
    let overflow = || AllocError::OutOfMemory { size, align };

    let total = size.checked_add(header)
        .and_then(|total| MAX_ALIGNMENT.checked_round_up(total))
        .ok_or_else(overflow)?;

    Layout::from_size_align(total, align).map_err(|_| overflow())
}

//
//  Implementation
//

//  Descriptor of a block, stored within the `Slots`.
struct Block {
    pointer: NonNull<u8>,
    layout: Layout,
}

//  Header of a block, stored at the front of the block.
#[repr(C)]
struct Header {
    index: usize,
}

// mod tests
