//! Sequential pool.
//!
//! A bump allocator: memory is carved sequentially out of a current buffer, and once the buffer is exhausted a new
//! one is obtained from the block list. Individual deallocation is a no-op, the memory is only reclaimed in bulk on
//! `release` or drop.

use core::{alloc::Layout, cmp, ptr::{self, NonNull}};

use crate::{
    AllocError, Configuration, ConfigurationError, GlobalAllocator, GrowthStrategy, MAX_ALIGNMENT, PowerOf2,
    RawAllocator, utils,
};

use super::{buffer::BufferCursor, infrequent_delete_block_list::InfrequentDeleteBlockList};

/// SequentialPool
///
/// Allocates memory sequentially out of buffers obtained from an upstream `RawAllocator`.
///
/// Buffers are never reallocated, hence memory handed out is never moved, and remains valid until `release` or drop.
pub struct SequentialPool<A: RawAllocator = GlobalAllocator> {
    cursor: BufferCursor,
    blocks: InfrequentDeleteBlockList<A>,
    configuration: Configuration,
}

//  Safety:
//  -   The buffers referred to by `cursor` are owned by `blocks`, hence move along with the instance.
//  -   `blocks` is `Send` whenever `A` is.
unsafe impl<A: RawAllocator + Send> Send for SequentialPool<A> {}

impl<A: RawAllocator> SequentialPool<A> {
    /// Creates an instance with the default configuration.
    pub fn new(allocator: A) -> Self {
        let configuration = Configuration::default();

        Self {
            cursor: BufferCursor::new(configuration.alignment()),
            blocks: InfrequentDeleteBlockList::new(allocator),
            configuration,
        }
    }

    /// Creates an instance with the specified configuration.
    ///
    /// Returns an error if the configuration is inconsistent.
    pub fn with_configuration(configuration: Configuration, allocator: A) -> Result<Self, ConfigurationError> {
        configuration.validate()?;

        Ok(Self {
            cursor: BufferCursor::new(configuration.alignment()),
            blocks: InfrequentDeleteBlockList::new(allocator),
            configuration,
        })
    }

    /// Returns the configuration.
    pub fn configuration(&self) -> &Configuration { &self.configuration }

    /// Returns the cursor over the current buffer.
    pub fn cursor(&self) -> &BufferCursor { &self.cursor }

    /// Returns a reference to the upstream allocator.
    pub fn allocator(&self) -> &A { self.blocks.allocator() }

    /// Returns the number of blocks obtained from the upstream allocator, buffers and standalone blocks alike.
    pub fn num_blocks(&self) -> usize { self.blocks.len() }

    /// Allocates `size` bytes, aligned as per the alignment strategy.
    ///
    /// Returns None, without allocating, if `size` is 0, and the error of the upstream allocator if it fails.
    pub fn allocate(&mut self, size: usize) -> Result<Option<NonNull<u8>>, AllocError> {
        if size == 0 {
            return Ok(None);
        }

        if let Some(result) = self.cursor.allocate(size) {
            return Ok(Some(result));
        }

        self.allocate_slow(size).map(Some)
    }

    /// Allocates at least `*size` bytes, aligned as per the alignment strategy, and extends the allocation to the end
    /// of the buffer.
    ///
    /// On success, `*size` is updated to the number of bytes actually usable. Requests served by a standalone block
    /// are not extended.
    pub fn allocate_and_expand(&mut self, size: &mut usize) -> Result<Option<NonNull<u8>>, AllocError> {
        if *size == 0 {
            return Ok(None);
        }

        if let Some(result) = self.cursor.allocate_and_expand(size) {
            return Ok(Some(result));
        }

        match self.next_buffer_size(*size) {
            Some(buffer_size) => {
                self.replace_buffer(buffer_size)?;
                self.cursor.allocate_and_expand(size).map(Some).ok_or_else(|| self.out_of_memory(*size))
            },
            None => self.allocate_standalone(*size).map(Some),
        }
    }

    /// Ensures that the next allocation of up to `num_bytes` bytes is served from the current buffer.
    ///
    /// If the current buffer cannot accommodate `num_bytes`, it is replaced by a buffer of the next size, or of
    /// `num_bytes` if larger, even beyond the maximum buffer size.
    pub fn reserve_capacity(&mut self, num_bytes: usize) -> Result<(), AllocError> {
        if num_bytes == 0 || self.cursor.has_capacity(num_bytes) {
            return Ok(());
        }

        let buffer_size = self.next_buffer_size(num_bytes).unwrap_or(num_bytes);

        self.replace_buffer(cmp::max(buffer_size, num_bytes))
    }

    /// Shrinks the allocation at `address`, of `original` bytes, to `new` bytes.
    ///
    /// Only the most recent allocation can be shrunk, for any other the result is `original`, otherwise it is `new`.
    pub fn truncate(&mut self, address: NonNull<u8>, original: usize, new: usize) -> usize {
        self.cursor.truncate(address, original, new)
    }

    /// Does nothing; the memory is only reclaimed on `release`.
    pub fn deallocate(&mut self, _address: Option<NonNull<u8>>) {}

    /// Moves `value` into memory allocated from the pool, aligned as `T` requires whatever the alignment strategy.
    ///
    /// The value is never dropped by the pool, not even on `release`: use `delete_object` to drop it.
    pub fn new_object<T>(&mut self, value: T) -> Result<NonNull<T>, AllocError> {
        let layout = Layout::new::<T>();

        let pointer: NonNull<T> = match self.allocate_aligned(layout.size(), PowerOf2::align_of::<T>())? {
            Some(pointer) => pointer.cast(),
            None => NonNull::dangling(),
        };

        //  Safety:
        //  -   `pointer` is valid for writes of `layout.size()` bytes, and suitably aligned.
        unsafe { ptr::write(pointer.as_ptr(), value) };

        Ok(pointer)
    }

    /// Drops the object at `object` in place, then deallocates its memory, which is a no-op.
    ///
    /// #   Safety
    ///
    /// -   Assumes that `object` was obtained from `new_object` on this instance, and not released since.
    /// -   Assumes that `object` has not been deleted yet.
    pub unsafe fn delete_object<T>(&mut self, object: NonNull<T>) {
        ptr::drop_in_place(object.as_ptr());

        self.deallocate(Some(object.cast()));
    }

    /// Returns all the memory to the upstream allocator.
    ///
    /// All the memory handed out is invalidated. The pool may be released again, or reused.
    pub fn release(&mut self) {
        if !self.blocks.is_empty() {
            tracing::debug!(blocks = self.blocks.len(), "SequentialPool release");
        }

        self.cursor.reset();
        self.blocks.release();
    }

    #[cold]
    #[inline(never)]
    fn allocate_slow(&mut self, size: usize) -> Result<NonNull<u8>, AllocError> {
        match self.next_buffer_size(size) {
            Some(buffer_size) => {
                self.replace_buffer(buffer_size)?;
                self.cursor.allocate(size).ok_or_else(|| self.out_of_memory(size))
            },
            None => self.allocate_standalone(size),
        }
    }

    fn allocate_aligned(&mut self, size: usize, alignment: PowerOf2) -> Result<Option<NonNull<u8>>, AllocError> {
        if size == 0 {
            return Ok(None);
        }

        if let Some(result) = self.cursor.allocate_aligned(size, alignment) {
            return Ok(Some(result));
        }

        //  Buffers are only aligned on `MAX_ALIGNMENT`, stricter alignments require room for padding.
        let slack = alignment.value().saturating_sub(MAX_ALIGNMENT.value());
        let padded = size.checked_add(slack).ok_or(AllocError::OutOfMemory { size, align: alignment.value() })?;

        match self.next_buffer_size(padded) {
            Some(buffer_size) => {
                self.replace_buffer(buffer_size)?;
                self.cursor.allocate_aligned(size, alignment).map(Some).ok_or_else(|| self.out_of_memory(size))
            },
            None => {
                let block = self.allocate_standalone(padded)?;
                let offset = utils::alignment_offset(block.as_ptr() as usize, alignment);

                debug_assert!(offset <= slack);

                //  Safety:
                //  -   `offset <= slack`, hence `block + offset` is within the block, and non-null.
                Ok(Some(unsafe { NonNull::new_unchecked(block.as_ptr().add(offset)) }))
            },
        }
    }

    //  Returns the size of the next buffer, if a buffer is suitable to serve `size` bytes.
    fn next_buffer_size(&self, size: usize) -> Option<usize> {
        let initial = self.configuration.initial_size();
        let maximum = self.configuration.maximum_buffer_size();

        if size > maximum {
            return None;
        }

        let has_buffer = self.cursor.buffer().is_some();

        let next = match self.configuration.growth() {
            GrowthStrategy::Geometric if has_buffer => GrowthStrategy::grow(self.cursor.size(), size),
            GrowthStrategy::Geometric if initial >= size => initial,
            GrowthStrategy::Geometric => GrowthStrategy::grow(initial, size),
            GrowthStrategy::Constant => initial,
        };

        let next = cmp::min(next, maximum);

        if next >= size { Some(next) } else { None }
    }

    fn replace_buffer(&mut self, size: usize) -> Result<(), AllocError> {
        let buffer = self.blocks.allocate_block(size)?;

        tracing::trace!(size, previous = self.cursor.size(), "SequentialPool new buffer");

        //  Safety:
        //  -   `buffer` points to at least `size` bytes, owned by `self.blocks` until `release`.
        unsafe { self.cursor.replace(buffer, size) };

        Ok(())
    }

    fn allocate_standalone(&mut self, size: usize) -> Result<NonNull<u8>, AllocError> {
        tracing::debug!(size, "SequentialPool standalone block");

        self.blocks.allocate_block(size)
    }

    fn out_of_memory(&self, size: usize) -> AllocError {
        AllocError::OutOfMemory { size, align: self.cursor.alignment().alignment_for(size).value() }
    }
}

impl<A: RawAllocator + Default> Default for SequentialPool<A> {
    fn default() -> Self { Self::new(A::default()) }
}

// mod tests
