//! A collection of utilities.

use core::ptr::NonNull;

mod power_of_2;

pub use power_of_2::PowerOf2;

/// The maximal fundamental alignment of the platform.
///
/// Blocks handed out by the block lists are always aligned on at least this boundary.
pub const MAX_ALIGNMENT: PowerOf2 = PowerOf2::align_of::<MaxAlignedType>();

/// Returns whether the pointer is sufficiently aligned for the given alignment.
pub(crate) fn is_sufficiently_aligned_for(ptr: NonNull<u8>, alignment: PowerOf2) -> bool {
    (ptr.as_ptr() as usize) % alignment == 0
}

/// Returns the number of bytes to skip from `address` to reach the next `alignment` boundary.
pub(crate) fn alignment_offset(address: usize, alignment: PowerOf2) -> usize {
    (alignment.value() - address % alignment) % alignment
}

//  The union of the most aligned fundamental types; never instantiated.
#[repr(C)]
#[allow(dead_code)]
union MaxAlignedType {
    integer: u64,
    float: f64,
    pointer: *const u8,
    size: usize,
    wide: u128,
}

// mod tests
