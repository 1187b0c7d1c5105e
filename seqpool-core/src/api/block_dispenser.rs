//! BlockDispenser
//!
//! The BlockDispenser trait is used to request blocks of memory whose protection can later be changed, such as
//! blocks of pages obtained directly from the OS. A dispenser deals in multiples of its minimum block size, typically
//! the page size, as the protection of a partial page cannot be changed independently of the rest of the page.

use core::ptr::NonNull;

use crate::PowerOf2;

use super::AllocError;

/// MemoryBlock
///
/// The descriptor of a block of memory handed out by a `BlockDispenser`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct MemoryBlock {
    pointer: NonNull<u8>,
    size: usize,
}

impl MemoryBlock {
    /// Creates an instance.
    pub fn new(pointer: NonNull<u8>, size: usize) -> Self { Self { pointer, size } }

    /// Returns the start of the block.
    pub fn pointer(&self) -> NonNull<u8> { self.pointer }

    /// Returns the size of the block, in bytes.
    pub fn size(&self) -> usize { self.size }

    /// Returns whether `address` lies within the block.
    pub fn contains(&self, address: usize) -> bool {
        let start = self.pointer.as_ptr() as usize;

        start <= address && address - start < self.size
    }
}

/// Abstraction of a dispenser of protectable blocks of memory.
pub trait BlockDispenser {
    /// Returns the granularity of the blocks handed out, and of protection changes.
    fn minimum_block_size(&self) -> PowerOf2;

    /// Allocates a fresh, writable, block of memory of at least `size` bytes.
    ///
    /// #   Safety
    ///
    /// The caller may assume that if the result is Ok then:
    /// -   The size of the block is _greater than or equal_ to `size`.
    /// -   The block is _at least_ aligned to `minimum_block_size()`.
    ///
    /// `allocate` assumes that:
    /// -   `size` is a non-zero multiple of `minimum_block_size()`.
    unsafe fn allocate(&self, size: usize) -> Result<MemoryBlock, AllocError>;

    /// Deallocates the supplied block of memory.
    ///
    /// #   Safety
    ///
    /// `deallocate` assumes that:
    /// -   `block` was allocated by this instance, and is not referenced any longer.
    /// -   `block` is writable, that is either never protected or unprotected since.
    unsafe fn deallocate(&self, block: MemoryBlock);

    /// Makes the block read-only.
    ///
    /// #   Safety
    ///
    /// `protect` assumes that `block` was allocated by this instance, and not deallocated since.
    unsafe fn protect(&self, block: MemoryBlock) -> Result<(), AllocError>;

    /// Makes the block writable again.
    ///
    /// #   Safety
    ///
    /// `unprotect` assumes that `block` was allocated by this instance, and not deallocated since.
    unsafe fn unprotect(&self, block: MemoryBlock) -> Result<(), AllocError>;
}

impl<'a, D> BlockDispenser for &'a D
    where
        D: BlockDispenser + ?Sized,
{
    fn minimum_block_size(&self) -> PowerOf2 { (**self).minimum_block_size() }

    unsafe fn allocate(&self, size: usize) -> Result<MemoryBlock, AllocError> { (**self).allocate(size) }

    unsafe fn deallocate(&self, block: MemoryBlock) { (**self).deallocate(block) }

    unsafe fn protect(&self, block: MemoryBlock) -> Result<(), AllocError> { (**self).protect(block) }

    unsafe fn unprotect(&self, block: MemoryBlock) -> Result<(), AllocError> { (**self).unprotect(block) }
}

// mod tests
