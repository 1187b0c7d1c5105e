//! A RawAllocator counting the memory in use.

use std::{
    alloc::Layout,
    ptr::NonNull,
    sync::atomic::{AtomicUsize, Ordering},
};

use seqpool_core::{AllocError, GlobalAllocator, RawAllocator};

/// CountingAllocator
///
/// Forwards to the global allocator, keeping track of the number of blocks and bytes in use.
///
/// May be instructed to fail after a given number of allocations, with `fail_after`.
#[derive(Debug)]
pub struct CountingAllocator {
    blocks_in_use: AtomicUsize,
    bytes_in_use: AtomicUsize,
    allocations: AtomicUsize,
    deallocations: AtomicUsize,
    //  Number of allocations still allowed to succeed, or UNLIMITED.
    budget: AtomicUsize,
}

impl CountingAllocator {
    const UNLIMITED: usize = usize::MAX;

    /// Creates an instance, with no allocation in use.
    pub const fn new() -> Self {
        Self {
            blocks_in_use: AtomicUsize::new(0),
            bytes_in_use: AtomicUsize::new(0),
            allocations: AtomicUsize::new(0),
            deallocations: AtomicUsize::new(0),
            budget: AtomicUsize::new(Self::UNLIMITED),
        }
    }

    /// Returns the number of blocks currently allocated.
    pub fn blocks_in_use(&self) -> usize { self.blocks_in_use.load(Ordering::Relaxed) }

    /// Returns the number of bytes currently allocated.
    pub fn bytes_in_use(&self) -> usize { self.bytes_in_use.load(Ordering::Relaxed) }

    /// Returns the number of successful allocations so far.
    pub fn allocations(&self) -> usize { self.allocations.load(Ordering::Relaxed) }

    /// Returns the number of deallocations so far.
    pub fn deallocations(&self) -> usize { self.deallocations.load(Ordering::Relaxed) }

    /// Lets the next `allocations` allocations succeed, and fails any further one.
    pub fn fail_after(&self, allocations: usize) {
        debug_assert!(allocations < Self::UNLIMITED);

        self.budget.store(allocations, Ordering::Relaxed);
    }

    /// Lets all allocations succeed again.
    pub fn succeed(&self) { self.budget.store(Self::UNLIMITED, Ordering::Relaxed); }

    fn consume_budget(&self) -> bool {
        let result = self.budget.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |budget| {
            if budget == Self::UNLIMITED { Some(budget) } else { budget.checked_sub(1) }
        });

        result.is_ok()
    }
}

impl Default for CountingAllocator {
    fn default() -> Self { Self::new() }
}

impl RawAllocator for CountingAllocator {
    unsafe fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        if !self.consume_budget() {
            return Err(AllocError::out_of_memory(layout));
        }

        let pointer = GlobalAllocator.allocate(layout)?;

        self.blocks_in_use.fetch_add(1, Ordering::Relaxed);
        self.bytes_in_use.fetch_add(layout.size(), Ordering::Relaxed);
        self.allocations.fetch_add(1, Ordering::Relaxed);

        Ok(pointer)
    }

    unsafe fn deallocate(&self, pointer: NonNull<u8>, layout: Layout) {
        self.blocks_in_use.fetch_sub(1, Ordering::Relaxed);
        self.bytes_in_use.fetch_sub(layout.size(), Ordering::Relaxed);
        self.deallocations.fetch_add(1, Ordering::Relaxed);

        GlobalAllocator.deallocate(pointer, layout);
    }
}

#[cfg(test)]
mod tests {

use super::*;

fn layout(size: usize) -> Layout { Layout::from_size_align(size, 8).unwrap() }

#[test]
fn counting_allocator_counts() {
    let allocator = CountingAllocator::new();

    unsafe {
        let a = allocator.allocate(layout(16)).unwrap();
        let b = allocator.allocate(layout(32)).unwrap();

        assert_eq!(2, allocator.blocks_in_use());
        assert_eq!(48, allocator.bytes_in_use());

        allocator.deallocate(a, layout(16));

        assert_eq!(1, allocator.blocks_in_use());
        assert_eq!(32, allocator.bytes_in_use());

        allocator.deallocate(b, layout(32));
    }

    assert_eq!(0, allocator.blocks_in_use());
    assert_eq!(2, allocator.allocations());
    assert_eq!(2, allocator.deallocations());
}

#[test]
fn counting_allocator_fail_after() {
    let allocator = CountingAllocator::new();

    allocator.fail_after(1);

    unsafe {
        let a = allocator.allocate(layout(8)).unwrap();

        assert_eq!(Err(AllocError::OutOfMemory { size: 8, align: 8 }), allocator.allocate(layout(8)));

        allocator.succeed();

        let b = allocator.allocate(layout(8)).unwrap();

        allocator.deallocate(a, layout(8));
        allocator.deallocate(b, layout(8));
    }

    assert_eq!(2, allocator.allocations());
}

} // mod tests
