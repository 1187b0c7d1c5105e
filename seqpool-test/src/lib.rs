#![deny(missing_docs)]

//! Test support for seqpool.
//!
//! -   `CountingAllocator`, a `RawAllocator` tracking the memory in use, and failing on demand.
//! -   `TestBlockDispenser`, a heap-backed `BlockDispenser` tracking the protection of its blocks.
//! -   `Bursty`, a test-runner executing steps in lock-step across threads.

mod bursty;
mod counting_allocator;
mod dispenser;

pub use bursty::{Bursty, BurstyBuilder};
pub use counting_allocator::CountingAllocator;
pub use dispenser::TestBlockDispenser;
