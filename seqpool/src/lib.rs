#![deny(missing_docs)]

//! Sequential allocators.
//!
//! seqpool builds upon seqpool-core, re-exporting its API, and adds:
//!
//! -   `NativeBlockDispenser`, a `BlockDispenser` obtaining pages directly from the OS.
//! -   `ProtectableSequentialAllocator`, a thread-safe sequential allocator whose memory can be made read-only.
//!
//! #   Example
//!
//! ```
//! use seqpool::{Configuration, SequentialPool, GlobalAllocator};
//!
//! let configuration = Configuration::new().with_initial_size(64);
//! let mut pool = SequentialPool::with_configuration(configuration, GlobalAllocator).unwrap();
//!
//! let first = pool.allocate(50).unwrap();
//! let second = pool.allocate(30).unwrap();
//!
//! assert!(first.is_some() && second.is_some());
//! assert_eq!(128, pool.cursor().size());
//! ```

mod platform;
mod protectable;

pub use seqpool_core::*;

#[cfg(unix)]
pub use platform::NativeBlockDispenser;

pub use protectable::ProtectableSequentialAllocator;
