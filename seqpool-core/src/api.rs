//! The API of seqpool-core.

mod alignment;
mod block_dispenser;
mod configuration;
mod error;
mod growth;
mod raw_allocator;

pub use alignment::AlignmentStrategy;
pub use block_dispenser::{BlockDispenser, MemoryBlock};
pub use configuration::Configuration;
pub use error::{AllocError, ConfigurationError};
pub use growth::GrowthStrategy;
pub use raw_allocator::{GlobalAllocator, RawAllocator};
