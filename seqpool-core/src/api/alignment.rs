//! Alignment strategies.
//!
//! A sequential allocator hands out consecutive slices of a buffer; the alignment strategy decides how much padding
//! is inserted before each slice.

use core::cmp;

use crate::{MAX_ALIGNMENT, PowerOf2};

/// AlignmentStrategy
///
/// The alignment applied to the memory returned by a sequential allocator.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum AlignmentStrategy {
    /// Aligned on the largest power of 2 dividing the requested size, up to `MAX_ALIGNMENT`.
    ///
    /// An object of `n` bytes cannot require a stricter alignment than this, so it is suitable for any type of that
    /// size, whilst wasting less memory than `Maximum`.
    Natural,
    /// Always aligned on `MAX_ALIGNMENT`.
    Maximum,
    /// Not aligned at all; allocations are packed back to back.
    Byte,
}

impl AlignmentStrategy {
    /// Returns the alignment of an allocation of `size` bytes.
    pub fn alignment_for(&self, size: usize) -> PowerOf2 {
        match self {
            AlignmentStrategy::Natural => PowerOf2::largest_dividing(size)
                .map(|alignment| cmp::min(alignment, MAX_ALIGNMENT))
                .unwrap_or(PowerOf2::ONE),
            AlignmentStrategy::Maximum => MAX_ALIGNMENT,
            AlignmentStrategy::Byte => PowerOf2::ONE,
        }
    }
}

impl Default for AlignmentStrategy {
    fn default() -> Self { AlignmentStrategy::Natural }
}

#[cfg(test)]
mod tests {

use super::*;

#[test]
fn alignment_strategy_default() {
    assert_eq!(AlignmentStrategy::Natural, AlignmentStrategy::default());
}

#[test]
fn alignment_strategy_natural() {
    fn natural(size: usize) -> usize { AlignmentStrategy::Natural.alignment_for(size).value() }

    assert_eq!(1, natural(0));
    assert_eq!(1, natural(1));
    assert_eq!(2, natural(2));
    assert_eq!(1, natural(3));
    assert_eq!(4, natural(4));
    assert_eq!(2, natural(6));
    assert_eq!(8, natural(8));
    assert_eq!(MAX_ALIGNMENT.value(), natural(MAX_ALIGNMENT.value()));
    assert_eq!(MAX_ALIGNMENT.value(), natural(MAX_ALIGNMENT.value() * 4));
}

#[test]
fn alignment_strategy_maximum() {
    for size in 0..64 {
        assert_eq!(MAX_ALIGNMENT, AlignmentStrategy::Maximum.alignment_for(size));
    }
}

#[test]
fn alignment_strategy_byte() {
    for size in 0..64 {
        assert_eq!(PowerOf2::ONE, AlignmentStrategy::Byte.alignment_for(size));
    }
}

} // mod tests
