//! The internals of seqpool-core.
//!
//! The internals provide all the heavy-lifting.

mod block_list;
mod buffer;
mod infrequent_delete_block_list;
mod protectable_block_list;
mod sequential_pool;
mod slots;


pub use block_list::BlockList;
pub use buffer::BufferCursor;
pub use infrequent_delete_block_list::InfrequentDeleteBlockList;
pub use protectable_block_list::ProtectableBlockList;
pub use sequential_pool::SequentialPool;
