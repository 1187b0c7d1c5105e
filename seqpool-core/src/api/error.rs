//! Errors reported by the allocators.
//!
//! Allocators never translate the errors of their upstream allocator or dispenser: an out-of-memory condition
//! surfaces exactly as the upstream reported it.

use core::alloc::Layout;

use thiserror::Error;

/// AllocError
///
/// The failure of an allocation, or of a protection change.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Error)]
pub enum AllocError {
    /// The upstream allocator or dispenser could not provide the memory.
    #[error("out of memory: cannot allocate {size} bytes aligned on {align}")]
    OutOfMemory {
        /// The number of bytes requested.
        size: usize,
        /// The alignment requested.
        align: usize,
    },
    /// The operating system refused to change the protection of a block.
    #[error("cannot change the protection of {size} bytes at {address:#x}: os error {code}")]
    Protection {
        /// The address of the block.
        address: usize,
        /// The size of the block.
        size: usize,
        /// The OS specific error code.
        code: i32,
    },
    /// The memory is currently write-protected, and cannot be handed out.
    #[error("cannot allocate from write-protected memory")]
    Protected,
}

impl AllocError {
    /// Creates an `OutOfMemory` error matching `layout`.
    pub fn out_of_memory(layout: Layout) -> Self {
        AllocError::OutOfMemory { size: layout.size(), align: layout.align() }
    }
}

/// ConfigurationError
///
/// An inconsistent `Configuration`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Error)]
pub enum ConfigurationError {
    /// A pool cannot grow from an initial buffer of 0 bytes.
    #[error("the initial size must be non-zero")]
    ZeroInitialSize,
    /// No buffer may exceed the maximum size, including the first.
    #[error("the maximum buffer size {maximum} is less than the initial size {initial}")]
    MaximumBelowInitial {
        /// The initial size.
        initial: usize,
        /// The maximum buffer size.
        maximum: usize,
    },
}
