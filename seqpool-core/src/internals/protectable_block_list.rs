//! List of protectable blocks, obtained from a `BlockDispenser`.
//!
//! The whole list is either writable or read-only: protection is applied to, and removed from, every block at once.
//! While protected, the list refuses to hand out or take back blocks.

use core::{
    mem,
    ptr::{self, NonNull},
};

use crate::{AllocError, BlockDispenser, MAX_ALIGNMENT, MemoryBlock};

use super::slots::Slots;

/// ProtectableBlockList
///
/// Provides individually sized, maximally aligned, blocks of memory obtained from a `BlockDispenser`, each rounded up
/// to a multiple of the dispenser's minimum block size.
pub struct ProtectableBlockList<D: BlockDispenser> {
    blocks: Slots<MemoryBlock>,
    //  Total size of the blocks in `blocks`.
    bytes: usize,
    protected: bool,
    dispenser: D,
}

//  Safety:
//  -   The blocks are exclusively owned by the instance, and only accessed through it.
unsafe impl<D: BlockDispenser + Send> Send for ProtectableBlockList<D> {}

impl<D: BlockDispenser> ProtectableBlockList<D> {
    /// The number of bytes preceding each block.
    pub const BLOCK_HEADER_SIZE: usize = MAX_ALIGNMENT.round_up(mem::size_of::<Header>());

    /// Creates an empty, unprotected, instance.
    ///
    /// The minimum block size of the dispenser should be at least `MAX_ALIGNMENT`.
    pub fn new(dispenser: D) -> Self {
        debug_assert!(dispenser.minimum_block_size() >= MAX_ALIGNMENT);

        Self { blocks: Slots::new(), bytes: 0, protected: false, dispenser }
    }

    /// Returns a reference to the dispenser.
    pub fn dispenser(&self) -> &D { &self.dispenser }

    /// Returns the number of blocks currently allocated.
    pub fn len(&self) -> usize { self.blocks.len() }

    /// Returns whether no block is currently allocated.
    pub fn is_empty(&self) -> bool { self.blocks.is_empty() }

    /// Returns the number of bytes currently obtained from the dispenser, headers included.
    pub fn allocated_bytes(&self) -> usize { self.bytes }

    /// Returns whether the blocks are currently read-only.
    pub fn is_protected(&self) -> bool { self.protected }

    /// Allocates a block of at least `size` bytes, aligned on `MAX_ALIGNMENT`.
    ///
    /// Returns None, without allocating, if `size` is 0, `AllocError::Protected` if the list is protected, and the
    /// error of the dispenser if it fails.
    pub fn allocate(&mut self, size: usize) -> Result<Option<NonNull<u8>>, AllocError> {
        if size == 0 {
            return Ok(None);
        }

        self.allocate_block(size).map(|block| Some(block.pointer()))
    }

    /// Allocates a block of at least `size` bytes, aligned on `MAX_ALIGNMENT`, `size` being non-zero.
    ///
    /// The returned block describes the usable memory: it starts past the header, and spans up to the end of the
    /// block obtained from the dispenser.
    pub fn allocate_block(&mut self, size: usize) -> Result<MemoryBlock, AllocError> {
        debug_assert!(size > 0);

        if self.protected {
            return Err(AllocError::Protected);
        }

        let block_size = self.dispenser.minimum_block_size();

        let total = size.checked_add(Self::BLOCK_HEADER_SIZE)
            .and_then(|total| block_size.checked_round_up(total))
            .ok_or(AllocError::OutOfMemory { size, align: block_size.value() })?;

        debug_assert!(total % block_size == 0);

        //  Safety:
        //  -   `total` is a non-zero multiple of `block_size`.
        let block = unsafe { self.dispenser.allocate(total)? };

        debug_assert!(block.size() >= total);

        let index = self.blocks.insert(block);
        self.bytes += block.size();

        tracing::trace!(size = block.size(), index, "ProtectableBlockList allocated block");

        //  Safety:
        //  -   `block` is aligned on `block_size`, itself at least `MAX_ALIGNMENT`.
        //  -   `block` is at least `BLOCK_HEADER_SIZE` bytes large.
        #[allow(clippy::cast_ptr_alignment)]
        unsafe { ptr::write(block.pointer().as_ptr() as *mut Header, Header { index }) };

        //  Safety:
        //  -   `BLOCK_HEADER_SIZE` is strictly less than `block.size()`.
        let payload = unsafe { NonNull::new_unchecked(block.pointer().as_ptr().add(Self::BLOCK_HEADER_SIZE)) };

        Ok(MemoryBlock::new(payload, block.size() - Self::BLOCK_HEADER_SIZE))
    }

    /// Returns the block pointed to by `address` to the dispenser.
    ///
    /// Does nothing if `address` is None, returns `AllocError::Protected` if the list is protected.
    ///
    /// #   Safety
    ///
    /// -   Assumes that `address` was returned by `allocate` or `allocate_block` on this instance.
    /// -   Assumes that `address` was not deallocated since, nor the list released.
    pub unsafe fn deallocate(&mut self, address: Option<NonNull<u8>>) -> Result<(), AllocError> {
        let address = match address {
            Some(address) => address,
            None => return Ok(()),
        };

        if self.protected {
            return Err(AllocError::Protected);
        }

        let header = address.as_ptr().sub(Self::BLOCK_HEADER_SIZE);

        #[allow(clippy::cast_ptr_alignment)]
        let index = ptr::read(header as *const Header).index;

        let block = self.blocks.remove(index);

        debug_assert!(block.map(|b| b.pointer().as_ptr() == header && b.contains(address.as_ptr() as usize))
                .unwrap_or(false),
            "{:x} was not allocated by this ProtectableBlockList", address.as_ptr() as usize);

        if let Some(block) = block {
            self.bytes -= block.size();
            self.dispenser.deallocate(block);
        }

        Ok(())
    }

    /// Returns all the blocks to the dispenser, unprotecting them first if necessary.
    ///
    /// The list is empty and unprotected afterwards, and may be released again, or reused.
    pub fn release(&mut self) {
        if self.protected {
            for block in self.blocks.iter() {
                //  Safety:
                //  -   `block` was allocated by `self.dispenser`.
                if let Err(error) = unsafe { self.dispenser.unprotect(*block) } {
                    tracing::warn!(%error, "ProtectableBlockList failed to unprotect block on release");
                }
            }

            self.protected = false;
        }

        if !self.blocks.is_empty() {
            tracing::debug!(blocks = self.blocks.len(), bytes = self.bytes, "ProtectableBlockList release");
        }

        for block in self.blocks.drain() {
            //  Safety:
            //  -   `block` was allocated by `self.dispenser`, and is writable.
            unsafe { self.dispenser.deallocate(block) };
        }

        self.bytes = 0;
    }

    /// Makes all the blocks read-only.
    ///
    /// Does nothing if already protected. On failure, the blocks already protected are unprotected again, and the
    /// list stays unprotected.
    pub fn protect(&mut self) -> Result<(), AllocError> {
        if self.protected {
            return Ok(());
        }

        self.apply(|dispenser, block| unsafe { dispenser.protect(block) },
            |dispenser, block| unsafe { dispenser.unprotect(block) })?;

        tracing::debug!(blocks = self.blocks.len(), "ProtectableBlockList protected");

        self.protected = true;
        Ok(())
    }

    /// Makes all the blocks writable again.
    ///
    /// Does nothing if not protected. On failure, the blocks already unprotected are protected again, and the list
    /// stays protected.
    pub fn unprotect(&mut self) -> Result<(), AllocError> {
        if !self.protected {
            return Ok(());
        }

        self.apply(|dispenser, block| unsafe { dispenser.unprotect(block) },
            |dispenser, block| unsafe { dispenser.protect(block) })?;

        tracing::debug!(blocks = self.blocks.len(), "ProtectableBlockList unprotected");

        self.protected = false;
        Ok(())
    }

    //  Applies `change` to every block, rolling back with `undo` on the first failure.
    //
    //  Safety (of the closures):
    //  -   Every block was allocated by `self.dispenser`, and is still live.
    fn apply<C, U>(&self, change: C, undo: U) -> Result<(), AllocError>
        where
            C: Fn(&D, MemoryBlock) -> Result<(), AllocError>,
            U: Fn(&D, MemoryBlock) -> Result<(), AllocError>,
    {
        for (failed, block) in self.blocks.iter().enumerate() {
            let error = match change(&self.dispenser, *block) {
                Ok(()) => continue,
                Err(error) => error,
            };

            tracing::warn!(%error, "ProtectableBlockList failed to change protection");

            for block in self.blocks.iter().take(failed) {
                if let Err(error) = undo(&self.dispenser, *block) {
                    tracing::warn!(%error, "ProtectableBlockList failed to roll back protection");
                }
            }

            return Err(error);
        }

        Ok(())
    }
}

impl<D: BlockDispenser> Drop for ProtectableBlockList<D> {
    fn drop(&mut self) { self.release(); }
}

//
//  Implementation
//

#[repr(C)]
struct Header {
    index: usize,
}

// mod tests
