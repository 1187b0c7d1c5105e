#![no_std]

#![deny(missing_docs)]

//! Building blocks for sequential allocators.
//!
//! seqpool-core is a set of building blocks to carve memory sequentially out of large blocks. It contains:
//! -   A raw allocator trait, used to obtain individually sized blocks, and a block dispenser trait, used to obtain
//!     page-sized blocks which may later be write-protected.
//! -   Block lists, tracking the blocks obtained from either and returning them in bulk.
//! -   A sequential pool, bump-allocating out of buffers obtained from a block list.

extern crate alloc;

mod api;
mod internals;
mod utils;

pub use api::*;
pub use internals::{BlockList, BufferCursor, InfrequentDeleteBlockList, ProtectableBlockList, SequentialPool};
pub use utils::{MAX_ALIGNMENT, PowerOf2};
