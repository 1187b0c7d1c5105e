//! Protectable sequential allocator.
//!
//! A thread-safe sequential allocator over blocks obtained from a `BlockDispenser`, whose memory may be made
//! read-only, and writable again, as a whole.

use std::{
    cmp,
    ptr::NonNull,
    sync::{Mutex, MutexGuard, PoisonError},
};

use seqpool_core::{
    AlignmentStrategy, AllocError, BlockDispenser, BufferCursor, Configuration, ConfigurationError, GrowthStrategy,
    MemoryBlock, ProtectableBlockList,
};

/// ProtectableSequentialAllocator
///
/// Allocates memory sequentially out of blocks obtained from a `BlockDispenser`, typically a `NativeBlockDispenser`.
///
/// The memory handed out can be write-protected with `protect`, and made writable again with `unprotect`. While
/// protected, no memory can be handed out.
///
/// Every operation is serialized by an internal lock, hence a single instance may be shared across threads.
pub struct ProtectableSequentialAllocator<'d, D: BlockDispenser> {
    inner: Mutex<Inner<'d, D>>,
}

impl<'d, D: BlockDispenser> ProtectableSequentialAllocator<'d, D> {
    /// Creates an instance with natural alignment, geometric growth, and no growth limit.
    ///
    /// The first block is a single minimum block of the dispenser.
    pub fn new(dispenser: &'d D) -> Self {
        let inner = Inner {
            cursor: BufferCursor::new(AlignmentStrategy::Natural),
            blocks: ProtectableBlockList::new(dispenser),
            growth: GrowthStrategy::Geometric,
            growth_limit: usize::MAX,
            initial_size: 0,
            block_size: 0,
        };

        Self { inner: Mutex::new(inner) }
    }

    /// Creates an instance with the alignment and growth strategies of `configuration`, growing up to its maximum
    /// buffer size, and whose first block holds at least its initial size.
    ///
    /// Returns an error if the configuration is inconsistent.
    pub fn with_configuration(configuration: Configuration, dispenser: &'d D) -> Result<Self, ConfigurationError> {
        configuration.validate()?;

        let mut result = Self::new(dispenser)
            .with_alignment(configuration.alignment())
            .with_growth(configuration.growth())
            .with_growth_limit(configuration.maximum_buffer_size());

        result.state_mut().initial_size = configuration.initial_size();

        Ok(result)
    }

    /// Sets the alignment strategy.
    pub fn with_alignment(mut self, alignment: AlignmentStrategy) -> Self {
        self.state_mut().cursor.set_alignment(alignment);
        self
    }

    /// Sets the growth strategy.
    pub fn with_growth(mut self, growth: GrowthStrategy) -> Self {
        self.state_mut().growth = growth;
        self
    }

    /// Sets the growth limit, the largest buffer size growth may reach.
    ///
    /// Buffers never exceed the limit, unless it is smaller than a single minimum block of the dispenser. Requests
    /// larger than the limit are served by standalone blocks.
    pub fn with_growth_limit(mut self, growth_limit: usize) -> Self {
        self.state_mut().growth_limit = growth_limit;
        self
    }

    /// Allocates `num_bytes` bytes, aligned as per the alignment strategy.
    ///
    /// Returns None, without allocating, if `num_bytes` is 0, `AllocError::Protected` if the memory is currently
    /// protected, and the error of the dispenser if it fails.
    pub fn allocate(&self, num_bytes: usize) -> Result<Option<NonNull<u8>>, AllocError> {
        if num_bytes == 0 {
            return Ok(None);
        }

        self.state().allocate(num_bytes).map(Some)
    }

    /// Does nothing; the memory is only reclaimed on `release`.
    pub fn deallocate(&self, _address: Option<NonNull<u8>>) {}

    /// Returns all the memory to the dispenser, unprotecting it first if necessary.
    ///
    /// All the memory handed out is invalidated. The allocator may be released again, or reused.
    pub fn release(&self) { self.state().release(); }

    /// Extends the allocation at `address`, of `original` bytes, in place, up to `maximum` bytes.
    ///
    /// Only the most recent allocation can be extended, and only while unprotected, for any other the result is
    /// `original`. Otherwise, the allocation is extended to `maximum` bytes, or to the end of the current buffer,
    /// whichever comes first, and the new size is returned.
    pub fn expand(&self, address: NonNull<u8>, original: usize, maximum: usize) -> usize {
        let mut state = self.state();

        if state.blocks.is_protected() {
            return original;
        }

        state.cursor.expand(address, original, maximum)
    }

    /// Shrinks the allocation at `address`, of `original` bytes, in place, to `new` bytes.
    ///
    /// Only the most recent allocation can be shrunk, and only while unprotected, for any other the result is
    /// `original`, otherwise it is `new`.
    pub fn truncate(&self, address: NonNull<u8>, original: usize, new: usize) -> usize {
        let mut state = self.state();

        if state.blocks.is_protected() {
            return original;
        }

        state.cursor.truncate(address, original, new)
    }

    /// Ensures that the next allocation of up to `num_bytes` bytes is served from the current buffer.
    ///
    /// Returns `AllocError::Protected` if the memory is currently protected, and the error of the dispenser if it
    /// fails.
    pub fn reserve_capacity(&self, num_bytes: usize) -> Result<(), AllocError> {
        if num_bytes == 0 {
            return Ok(());
        }

        self.state().reserve_capacity(num_bytes)
    }

    /// Makes all the memory read-only.
    pub fn protect(&self) -> Result<(), AllocError> { self.state().blocks.protect() }

    /// Makes all the memory writable again.
    pub fn unprotect(&self) -> Result<(), AllocError> { self.state().blocks.unprotect() }

    /// Returns whether the memory is currently read-only.
    pub fn is_protected(&self) -> bool { self.state().blocks.is_protected() }

    /// Returns the number of bytes currently obtained from the dispenser.
    pub fn num_bytes_allocated(&self) -> usize { self.state().blocks.allocated_bytes() }

    //  The state is consistent in between operations, hence a panic while holding the lock leaves it usable.
    fn state(&self) -> MutexGuard<'_, Inner<'d, D>> { self.inner.lock().unwrap_or_else(PoisonError::into_inner) }

    fn state_mut(&mut self) -> &mut Inner<'d, D> { self.inner.get_mut().unwrap_or_else(PoisonError::into_inner) }
}

//
//  Implementation
//

struct Inner<'d, D: BlockDispenser> {
    cursor: BufferCursor,
    blocks: ProtectableBlockList<&'d D>,
    growth: GrowthStrategy,
    growth_limit: usize,
    initial_size: usize,
    //  Size of the block backing the current buffer, header included, or 0 if none.
    block_size: usize,
}

impl<'d, D: BlockDispenser> Inner<'d, D> {
    const HEADER: usize = ProtectableBlockList::<&'d D>::BLOCK_HEADER_SIZE;

    fn allocate(&mut self, num_bytes: usize) -> Result<NonNull<u8>, AllocError> {
        debug_assert!(num_bytes > 0);

        if self.blocks.is_protected() {
            return Err(AllocError::Protected);
        }

        if let Some(result) = self.cursor.allocate(num_bytes) {
            return Ok(result);
        }

        self.allocate_slow(num_bytes)
    }

    #[cold]
    #[inline(never)]
    fn allocate_slow(&mut self, num_bytes: usize) -> Result<NonNull<u8>, AllocError> {
        match self.next_block_size(num_bytes)? {
            Some(block_size) => {
                self.replace_buffer(block_size)?;

                let align = self.cursor.alignment().alignment_for(num_bytes).value();

                self.cursor.allocate(num_bytes).ok_or(AllocError::OutOfMemory { size: num_bytes, align })
            },
            None => {
                tracing::debug!(num_bytes, "ProtectableSequentialAllocator standalone block");

                self.blocks.allocate_block(num_bytes).map(|block| block.pointer())
            },
        }
    }

    fn reserve_capacity(&mut self, num_bytes: usize) -> Result<(), AllocError> {
        if self.blocks.is_protected() {
            return Err(AllocError::Protected);
        }

        if self.cursor.has_capacity(num_bytes) {
            return Ok(());
        }

        let block_size = match self.next_block_size(num_bytes)? {
            Some(block_size) => block_size,
            None => self.fitting_block_size(num_bytes)?,
        };

        self.replace_buffer(block_size)
    }

    fn release(&mut self) {
        self.cursor.reset();
        self.blocks.release();
        self.block_size = 0;
    }

    //  Returns the size, header included, of the next block to serve `num_bytes` from, or None if `num_bytes`
    //  exceeds the growth limit.
    fn next_block_size(&self, num_bytes: usize) -> Result<Option<usize>, AllocError> {
        let minimum = self.blocks.dispenser().minimum_block_size();

        let needed = self.fitting_block_size(num_bytes)?;

        //  The largest block whose buffer fits within the growth limit, yet at least a minimum block.
        let limit = cmp::min(self.growth_limit.saturating_add(Self::HEADER), GrowthStrategy::MAXIMUM_SIZE);
        let limit = cmp::max(minimum.round_down(limit), minimum.value());

        if needed > limit {
            return Ok(None);
        }

        let first = cmp::max(minimum.value(), self.fitting_block_size(self.initial_size)?);

        let next = match self.growth {
            GrowthStrategy::Geometric if self.block_size > 0 => GrowthStrategy::grow(self.block_size, needed),
            GrowthStrategy::Geometric if first >= needed => first,
            GrowthStrategy::Geometric => GrowthStrategy::grow(first, needed),
            GrowthStrategy::Constant => first,
        };

        let next = cmp::min(next, limit);

        Ok(if next >= needed { Some(next) } else { None })
    }

    //  Returns the size of the smallest block holding `num_bytes` past its header.
    fn fitting_block_size(&self, num_bytes: usize) -> Result<usize, AllocError> {
        let minimum = self.blocks.dispenser().minimum_block_size();

        num_bytes.checked_add(Self::HEADER)
            .and_then(|size| minimum.checked_round_up(size))
            .ok_or(AllocError::OutOfMemory { size: num_bytes, align: minimum.value() })
    }

    fn replace_buffer(&mut self, block_size: usize) -> Result<(), AllocError> {
        let minimum = self.blocks.dispenser().minimum_block_size();
        let alloc_size = block_size - Self::HEADER;

        assert!((alloc_size + Self::HEADER) % minimum == 0,
            "({} + {}) % {} != 0", alloc_size, Self::HEADER, minimum.value());

        let block: MemoryBlock = self.blocks.allocate_block(alloc_size)?;

        tracing::trace!(size = block.size(), previous = self.cursor.size(),
            "ProtectableSequentialAllocator new buffer");

        //  Safety:
        //  -   `block` describes at least `block.size()` writable bytes, owned by `self.blocks` until `release`.
        unsafe { self.cursor.replace(block.pointer(), block.size()) };

        self.block_size = block_size;

        Ok(())
    }
}

#[cfg(test)]
mod tests {

use std::thread;

use seqpool_test::TestBlockDispenser;

use super::*;

const BLOCK: usize = 256;

type Allocator<'d> = ProtectableSequentialAllocator<'d, TestBlockDispenser>;

const HEADER: usize = Inner::<'static, TestBlockDispenser>::HEADER;

fn address(pointer: Option<NonNull<u8>>) -> usize { pointer.expect("Non-null").as_ptr() as usize }

#[test]
fn protectable_allocate_zero() {
    let dispenser = TestBlockDispenser::new(BLOCK);
    let allocator = Allocator::new(&dispenser);

    assert_eq!(None, allocator.allocate(0).unwrap());
    allocator.reserve_capacity(0).unwrap();

    assert_eq!(0, allocator.num_bytes_allocated());
    assert!(dispenser.requests().is_empty());
}

#[test]
fn protectable_block_sizes() {
    let dispenser = TestBlockDispenser::new(BLOCK);
    let allocator = Allocator::new(&dispenser);

    //  First block: a single minimum block.
    allocator.allocate(8).unwrap();

    //  Doubles, until large enough.
    allocator.allocate(BLOCK).unwrap();
    allocator.allocate(5 * BLOCK).unwrap();

    assert_eq!(vec![BLOCK, 2 * BLOCK, 8 * BLOCK], dispenser.requests());
    assert_eq!(11 * BLOCK, allocator.num_bytes_allocated());

    for request in dispenser.requests() {
        assert_eq!(0, request % BLOCK);
    }
}

#[test]
fn protectable_growth_limit() {
    let dispenser = TestBlockDispenser::new(BLOCK);
    let allocator = Allocator::new(&dispenser).with_growth_limit(2 * BLOCK);

    allocator.allocate(BLOCK / 2).unwrap();
    allocator.allocate(BLOCK).unwrap();
    allocator.allocate(2 * BLOCK - HEADER).unwrap();

    //  Capped: the buffer never exceeds the limit.
    assert_eq!(vec![BLOCK, 2 * BLOCK, 2 * BLOCK], dispenser.requests());
    assert!(allocator.state().cursor.size() <= 2 * BLOCK);

    //  Above the limit: standalone block, the current buffer is untouched.
    let before = allocator.state().cursor.cursor();

    allocator.allocate(10 * BLOCK).unwrap();

    assert_eq!(11 * BLOCK, *dispenser.requests().last().unwrap());
    assert_eq!(before, allocator.state().cursor.cursor());
}

#[test]
fn protectable_growth_limit_below_block() {
    let dispenser = TestBlockDispenser::new(BLOCK);
    let allocator = Allocator::new(&dispenser).with_growth_limit(BLOCK / 4);

    allocator.allocate(8).unwrap();
    allocator.allocate(BLOCK - HEADER).unwrap();

    //  A single minimum block at least, anything larger is standalone.
    let before = allocator.state().cursor.cursor();

    allocator.allocate(BLOCK).unwrap();

    assert_eq!(vec![BLOCK, BLOCK, 2 * BLOCK], dispenser.requests());
    assert_eq!(BLOCK - HEADER, allocator.state().cursor.size());
    assert_eq!(before, allocator.state().cursor.cursor());
}

#[test]
fn protectable_constant_growth() {
    let dispenser = TestBlockDispenser::new(BLOCK);
    let allocator = Allocator::new(&dispenser).with_growth(GrowthStrategy::Constant);

    allocator.allocate(BLOCK / 2).unwrap();
    allocator.allocate(BLOCK / 2).unwrap();
    allocator.allocate(3 * BLOCK).unwrap();

    assert_eq!(vec![BLOCK, BLOCK, 4 * BLOCK], dispenser.requests());
    assert_eq!(BLOCK - HEADER, allocator.state().cursor.size());
}

#[test]
fn protectable_with_configuration() {
    let dispenser = TestBlockDispenser::new(BLOCK);

    let configuration = Configuration::new().with_initial_size(0);
    assert!(Allocator::with_configuration(configuration, &dispenser).is_err());

    let configuration = Configuration::new()
        .with_initial_size(3 * BLOCK)
        .with_alignment(AlignmentStrategy::Maximum);
    let allocator = Allocator::with_configuration(configuration, &dispenser).unwrap();

    let a = allocator.allocate(1).unwrap();
    let b = allocator.allocate(1).unwrap();

    assert_eq!(vec![4 * BLOCK], dispenser.requests());
    assert_eq!(seqpool_core::MAX_ALIGNMENT.value(), address(b) - address(a));
}

#[test]
fn protectable_expand() {
    let dispenser = TestBlockDispenser::new(BLOCK);
    let allocator = Allocator::new(&dispenser);

    let a = allocator.allocate(16).unwrap().expect("Non-null");
    let b = allocator.allocate(16).unwrap().expect("Non-null");

    //  Not the most recent.
    assert_eq!(16, allocator.expand(a, 16, 1000));

    //  Expands to the end of the buffer.
    assert_eq!(BLOCK - HEADER - 16, allocator.expand(b, 16, usize::MAX));

    //  The buffer is exhausted, hence the next allocation goes elsewhere.
    allocator.allocate(1).unwrap();
    assert_eq!(2, dispenser.requests().len());
}

#[test]
fn protectable_truncate() {
    let dispenser = TestBlockDispenser::new(BLOCK);
    let allocator = Allocator::new(&dispenser);

    let a = allocator.allocate(64).unwrap().expect("Non-null");

    assert_eq!(8, allocator.truncate(a, 64, 8));

    let b = allocator.allocate(8).unwrap();
    assert_eq!(a.as_ptr() as usize + 8, address(b));
}

#[test]
fn protectable_reserve_capacity() {
    let dispenser = TestBlockDispenser::new(BLOCK);
    let allocator = Allocator::new(&dispenser).with_growth_limit(BLOCK);

    allocator.reserve_capacity(16).unwrap();
    assert_eq!(vec![BLOCK], dispenser.requests());

    allocator.reserve_capacity(BLOCK - HEADER).unwrap();
    assert_eq!(1, dispenser.requests().len());

    //  Beyond the growth limit, a buffer is still installed.
    allocator.reserve_capacity(2 * BLOCK).unwrap();
    assert_eq!(vec![BLOCK, 3 * BLOCK], dispenser.requests());

    allocator.allocate(2 * BLOCK).unwrap();
    assert_eq!(2, dispenser.requests().len());
}

#[test]
fn protectable_out_of_memory() {
    let dispenser = TestBlockDispenser::new(BLOCK);
    let allocator = Allocator::new(&dispenser);

    allocator.allocate(16).unwrap();

    dispenser.fail_after(0);

    let cursor = allocator.state().cursor.cursor();
    let expected = Err(AllocError::OutOfMemory { size: 2 * BLOCK, align: BLOCK });

    assert_eq!(expected, allocator.allocate(BLOCK).map(|_| ()));
    assert_eq!(expected, allocator.reserve_capacity(BLOCK));

    //  Nothing changed.
    assert_eq!(cursor, allocator.state().cursor.cursor());
    assert_eq!(BLOCK, allocator.num_bytes_allocated());
    assert_eq!(1, dispenser.blocks_in_use());

    dispenser.succeed();

    allocator.allocate(BLOCK).unwrap();
    assert_eq!(3 * BLOCK, allocator.num_bytes_allocated());
}

#[test]
fn protectable_protect_unprotect() {
    let dispenser = TestBlockDispenser::new(BLOCK);
    let allocator = Allocator::new(&dispenser);

    let a = allocator.allocate(16).unwrap().expect("Non-null");
    allocator.allocate(1000).unwrap();

    unsafe { a.as_ptr().write_bytes(0x77, 16) };

    allocator.protect().unwrap();

    assert!(allocator.is_protected());
    assert_eq!(2, dispenser.protected_blocks());

    assert_eq!(Err(AllocError::Protected), allocator.allocate(1));
    assert_eq!(Err(AllocError::Protected), allocator.reserve_capacity(1));
    assert_eq!(16, allocator.expand(a, 16, 32));
    assert_eq!(16, allocator.truncate(a, 16, 8));

    //  Still readable.
    assert_eq!(0x77, unsafe { *a.as_ptr().add(15) });

    allocator.unprotect().unwrap();

    assert!(!allocator.is_protected());
    assert_eq!(0, dispenser.protected_blocks());
    assert!(allocator.allocate(1).unwrap().is_some());
}

#[test]
fn protectable_protect_failure() {
    let dispenser = TestBlockDispenser::new(BLOCK);
    let allocator = Allocator::new(&dispenser);

    allocator.allocate(16).unwrap();
    allocator.allocate(1000).unwrap();

    dispenser.fail_protection(true);

    assert!(matches!(allocator.protect(), Err(AllocError::Protection { .. })));
    assert!(!allocator.is_protected());
    assert_eq!(0, dispenser.protected_blocks());

    dispenser.fail_protection(false);

    allocator.protect().unwrap();
    assert!(allocator.is_protected());
}

#[test]
fn protectable_release() {
    let dispenser = TestBlockDispenser::new(BLOCK);
    let allocator = Allocator::new(&dispenser);

    allocator.allocate(16).unwrap();
    allocator.allocate(1000).unwrap();
    allocator.protect().unwrap();

    allocator.release();

    assert!(!allocator.is_protected());
    assert_eq!(0, allocator.num_bytes_allocated());
    assert_eq!(0, dispenser.blocks_in_use());

    allocator.release();

    //  Starts over from a single block.
    allocator.allocate(16).unwrap();
    assert_eq!(BLOCK, *dispenser.requests().last().unwrap());
}

#[test]
fn protectable_drop() {
    let dispenser = TestBlockDispenser::new(BLOCK);

    {
        let allocator = Allocator::new(&dispenser);
        allocator.allocate(16).unwrap();
        allocator.protect().unwrap();
    }

    assert_eq!(0, dispenser.blocks_in_use());
}

#[test]
fn protectable_concurrent() {
    const THREADS: usize = 4;
    const ALLOCATIONS: usize = 200;

    let dispenser = TestBlockDispenser::new(BLOCK);
    let allocator = Allocator::new(&dispenser);

    let mut ranges: Vec<(usize, usize)> = thread::scope(|scope| {
        let handles: Vec<_> = (0..THREADS).map(|t| {
            let allocator = &allocator;

            scope.spawn(move || {
                (0..ALLOCATIONS).map(|i| {
                    let size = (i + t) % 50 + 1;
                    let pointer = allocator.allocate(size).unwrap().expect("Non-null");

                    unsafe { pointer.as_ptr().write_bytes(t as u8, size) };

                    (pointer.as_ptr() as usize, size)
                }).collect::<Vec<_>>()
            })
        }).collect();

        handles.into_iter().flat_map(|handle| handle.join().unwrap()).collect()
    });

    assert_eq!(THREADS * ALLOCATIONS, ranges.len());

    ranges.sort();

    for window in ranges.windows(2) {
        assert!(window[0].0 + window[0].1 <= window[1].0, "{:?}", window);
    }
}

} // mod tests
