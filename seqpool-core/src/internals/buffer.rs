//! Bump cursor over a single buffer.
//!
//! The cursor does not own its buffer: the memory belongs to the block list it was obtained from, and the cursor is
//! merely pointed at it with `replace`, then reset on release.

use core::{cmp, ptr::NonNull};

use crate::{AlignmentStrategy, PowerOf2, utils};

/// BufferCursor
///
/// Hands out consecutive, suitably aligned, sections of a buffer.
///
/// Invariant: `cursor() <= size()`, and every pointer handed out lies within `[buffer, buffer + size)`.
#[derive(Debug)]
pub struct BufferCursor {
    buffer: Option<NonNull<u8>>,
    size: usize,
    cursor: usize,
    alignment: AlignmentStrategy,
}

//  Safety:
//  -   The cursor only ever reads its own fields; the buffer it points to is accessed by the holders of the pointers
//      it hands out, as synchronized by them.
unsafe impl Send for BufferCursor {}

impl BufferCursor {
    /// Creates an instance without buffer.
    pub const fn new(alignment: AlignmentStrategy) -> Self { Self { buffer: None, size: 0, cursor: 0, alignment } }

    /// Returns the alignment strategy.
    pub fn alignment(&self) -> AlignmentStrategy { self.alignment }

    /// Sets the alignment strategy, applied from the next allocation onwards.
    pub fn set_alignment(&mut self, alignment: AlignmentStrategy) { self.alignment = alignment; }

    /// Returns the start of the current buffer, if any.
    pub fn buffer(&self) -> Option<NonNull<u8>> { self.buffer }

    /// Returns the size of the current buffer, 0 if none.
    pub fn size(&self) -> usize { self.size }

    /// Returns the offset of the first free byte of the current buffer.
    pub fn cursor(&self) -> usize { self.cursor }

    /// Returns the number of free bytes left in the current buffer, ignoring alignment.
    pub fn remaining(&self) -> usize { self.size - self.cursor }

    /// Points the cursor at the start of a new buffer.
    ///
    /// #   Safety
    ///
    /// -   Assumes that `buffer` points to at least `size` writable bytes.
    /// -   Assumes that `buffer` outlives its use by the cursor, that is until the next `replace` or `reset`.
    pub unsafe fn replace(&mut self, buffer: NonNull<u8>, size: usize) {
        self.buffer = Some(buffer);
        self.size = size;
        self.cursor = 0;
    }

    /// Forgets the current buffer.
    pub fn reset(&mut self) {
        self.buffer = None;
        self.size = 0;
        self.cursor = 0;
    }

    /// Returns whether `size` bytes, once aligned, fit in the current buffer.
    pub fn has_capacity(&self, size: usize) -> bool { self.fits(size, self.alignment.alignment_for(size)) }

    /// Carves `size` bytes out of the current buffer, if they fit.
    ///
    /// `size` should be non-zero.
    pub fn allocate(&mut self, size: usize) -> Option<NonNull<u8>> { self.allocate_aligned(size, PowerOf2::ONE) }

    /// Carves `size` bytes out of the current buffer, if they fit, aligned on at least `alignment` in addition to
    /// the alignment strategy.
    ///
    /// `size` should be non-zero.
    pub fn allocate_aligned(&mut self, size: usize, alignment: PowerOf2) -> Option<NonNull<u8>> {
        debug_assert!(size > 0);

        let alignment = cmp::max(self.alignment.alignment_for(size), alignment);

        if !self.fits(size, alignment) {
            return None;
        }

        let buffer = self.buffer?;
        let start = self.cursor + self.padding(alignment)?;

        self.cursor = start + size;

        debug_assert!(self.cursor <= self.size);

        //  Safety:
        //  -   `start + size <= self.size`, hence `buffer + start` is within the buffer, and non-null.
        let result = unsafe { NonNull::new_unchecked(buffer.as_ptr().add(start)) };

        debug_assert!(utils::is_sufficiently_aligned_for(result, alignment));

        Some(result)
    }

    /// Carves at least `*size` bytes out of the current buffer, if they fit, extended to the end of the buffer.
    ///
    /// On success, `*size` is updated to the number of bytes actually handed out.
    pub fn allocate_and_expand(&mut self, size: &mut usize) -> Option<NonNull<u8>> {
        let result = self.allocate(*size)?;

        let start = self.cursor - *size;

        *size = self.size - start;
        self.cursor = self.size;

        Some(result)
    }

    /// Extends the allocation at `address`, of `original` bytes, in place, up to `maximum` bytes.
    ///
    /// Only the most recent allocation can be extended, for any other the result is `original`. Otherwise, the
    /// allocation is extended to `maximum` bytes, or to the end of the buffer, whichever comes first, and the new size
    /// is returned.
    pub fn expand(&mut self, address: NonNull<u8>, original: usize, maximum: usize) -> usize {
        debug_assert!(original <= maximum);

        let start = match self.offset_of_last(address, original) {
            Some(start) => start,
            None => return original,
        };

        let size = maximum.min(self.size - start);

        self.cursor = start + size;

        size
    }

    /// Shrinks the allocation at `address`, of `original` bytes, in place, to `new` bytes.
    ///
    /// Only the most recent allocation can be shrunk, for any other the result is `original`. Otherwise, the bytes
    /// past `new` are made available again, and `new` is returned.
    pub fn truncate(&mut self, address: NonNull<u8>, original: usize, new: usize) -> usize {
        debug_assert!(new <= original);

        let start = match self.offset_of_last(address, original) {
            Some(start) => start,
            None => return original,
        };

        self.cursor = start + new;

        new
    }

    fn fits(&self, size: usize, alignment: PowerOf2) -> bool {
        match self.padding(alignment) {
            Some(padding) => padding <= self.remaining() && size <= self.remaining() - padding,
            None => false,
        }
    }

    //  Returns the padding to insert before the next allocation, or None if there is no buffer.
    fn padding(&self, alignment: PowerOf2) -> Option<usize> {
        let buffer = self.buffer?;
        let address = buffer.as_ptr() as usize + self.cursor;

        Some(utils::alignment_offset(address, alignment))
    }

    //  Returns the offset of `address` within the buffer, if it is the start of the last allocation of `size` bytes.
    fn offset_of_last(&self, address: NonNull<u8>, size: usize) -> Option<usize> {
        let buffer = self.buffer?.as_ptr() as usize;
        let address = address.as_ptr() as usize;

        if address < buffer || address - buffer > self.cursor || self.cursor - (address - buffer) != size {
            return None;
        }

        Some(address - buffer)
    }
}

// mod tests
