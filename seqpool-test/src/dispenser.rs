//! A BlockDispenser over the heap, recording the protection of its blocks.

use std::{
    alloc::Layout,
    sync::{Mutex, MutexGuard, PoisonError},
};

use seqpool_core::{AllocError, BlockDispenser, GlobalAllocator, MemoryBlock, PowerOf2, RawAllocator};

/// TestBlockDispenser
///
/// Hands out heap-allocated blocks, aligned on the block size.
///
/// Protection is only recorded, not enforced; the dispenser asserts that no block is deallocated while protected.
/// Protection may be instructed to fail, with `fail_protection`, and allocation after a given number of blocks, with
/// `fail_after`.
#[derive(Debug)]
pub struct TestBlockDispenser {
    block_size: PowerOf2,
    state: Mutex<State>,
}

impl TestBlockDispenser {
    /// The error code reported when protection is instructed to fail.
    pub const PROTECTION_ERROR_CODE: i32 = 13;

    /// Creates an instance.
    ///
    /// #   Panics
    ///
    /// If `block_size` is not a power of 2.
    pub fn new(block_size: usize) -> Self {
        let block_size = match PowerOf2::new(block_size) {
            Some(block_size) => block_size,
            None => panic!("Block size is not a power of 2: {}", block_size),
        };

        Self { block_size, state: Mutex::default() }
    }

    /// Returns the number of blocks currently allocated.
    pub fn blocks_in_use(&self) -> usize { self.state().blocks.len() }

    /// Returns the number of blocks currently protected.
    pub fn protected_blocks(&self) -> usize { self.state().blocks.iter().filter(|block| block.protected).count() }

    /// Returns the sizes requested so far, in order.
    pub fn requests(&self) -> Vec<usize> { self.state().requests.clone() }

    /// Instructs `protect` to fail, or succeed again.
    pub fn fail_protection(&self, fail: bool) { self.state().fail_protection = fail; }

    /// Lets the next `allocations` allocations succeed, and fails any further one.
    pub fn fail_after(&self, allocations: usize) { self.state().budget = Some(allocations); }

    /// Lets all allocations succeed again.
    pub fn succeed(&self) { self.state().budget = None; }

    fn state(&self) -> MutexGuard<'_, State> { self.state.lock().unwrap_or_else(PoisonError::into_inner) }

    fn layout(&self, size: usize) -> Layout {
        //  Safety:
        //  -   `block_size` is a non-zero power of 2.
        //  -   `size` is a multiple of `block_size`, hence does not overflow when rounded up.
        unsafe { Layout::from_size_align_unchecked(size, self.block_size.value()) }
    }

    fn set_protected(&self, block: MemoryBlock, protected: bool) {
        let address = block.pointer().as_ptr() as usize;

        let mut state = self.state();
        let entry = state.blocks.iter_mut().find(|entry| entry.address == address);

        match entry {
            Some(entry) => {
                assert_eq!(entry.size, block.size(), "Size mismatch for {:x}", address);
                entry.protected = protected;
            },
            None => panic!("Unknown block {:x}", address),
        }
    }
}

impl BlockDispenser for TestBlockDispenser {
    fn minimum_block_size(&self) -> PowerOf2 { self.block_size }

    unsafe fn allocate(&self, size: usize) -> Result<MemoryBlock, AllocError> {
        assert!(size > 0 && size % self.block_size == 0, "Invalid size {} for {}", size, self.block_size.value());

        {
            let mut state = self.state();

            state.requests.push(size);

            match state.budget {
                Some(0) => return Err(AllocError::out_of_memory(self.layout(size))),
                Some(budget) => state.budget = Some(budget - 1),
                None => (),
            }
        }

        let pointer = GlobalAllocator.allocate(self.layout(size))?;

        let address = pointer.as_ptr() as usize;
        self.state().blocks.push(Block { address, size, protected: false });

        Ok(MemoryBlock::new(pointer, size))
    }

    unsafe fn deallocate(&self, block: MemoryBlock) {
        let address = block.pointer().as_ptr() as usize;

        {
            let mut state = self.state();

            let index = state.blocks.iter().position(|entry| entry.address == address);
            let index = match index {
                Some(index) => index,
                None => panic!("Unknown block {:x}", address),
            };

            let entry = state.blocks.swap_remove(index);

            assert_eq!(entry.size, block.size(), "Size mismatch for {:x}", address);
            assert!(!entry.protected, "Deallocating protected block {:x}", address);
        }

        GlobalAllocator.deallocate(block.pointer(), self.layout(block.size()));
    }

    unsafe fn protect(&self, block: MemoryBlock) -> Result<(), AllocError> {
        if self.state().fail_protection {
            let address = block.pointer().as_ptr() as usize;
            return Err(AllocError::Protection { address, size: block.size(), code: Self::PROTECTION_ERROR_CODE });
        }

        self.set_protected(block, true);
        Ok(())
    }

    unsafe fn unprotect(&self, block: MemoryBlock) -> Result<(), AllocError> {
        self.set_protected(block, false);
        Ok(())
    }
}

//
//  Implementation
//

#[derive(Debug, Default)]
struct State {
    blocks: Vec<Block>,
    requests: Vec<usize>,
    fail_protection: bool,
    //  Number of allocations still allowed to succeed, unlimited if None.
    budget: Option<usize>,
}

#[derive(Debug)]
struct Block {
    address: usize,
    size: usize,
    protected: bool,
}

// mod tests
