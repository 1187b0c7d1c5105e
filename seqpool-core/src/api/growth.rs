//! Growth strategies.

/// GrowthStrategy
///
/// The policy governing the size of each successive buffer requested by a sequential allocator.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum GrowthStrategy {
    /// Each new buffer is at least twice as large as the previous one, up to the configured maximum.
    Geometric,
    /// Each new buffer has the initial size; larger requests are served by dedicated blocks.
    Constant,
}

impl GrowthStrategy {
    /// The factor by which buffers grow under `Geometric`.
    pub const GROWTH_FACTOR: usize = 2;

    /// The largest size growth may reach, as no allocation may exceed `isize::MAX` bytes.
    pub const MAXIMUM_SIZE: usize = isize::MAX as usize;

    /// Grows `current` by `GROWTH_FACTOR` at least once, and until it reaches `size`.
    ///
    /// Should the next step exceed `MAXIMUM_SIZE`, growth stops at the last representable step, hence the result may
    /// be less than `size`: callers are expected to check.
    ///
    /// `current` should be non-zero.
    pub fn grow(current: usize, size: usize) -> usize {
        debug_assert!(current > 0);

        let mut current = current;

        loop {
            match current.checked_mul(Self::GROWTH_FACTOR) {
                Some(next) if next <= Self::MAXIMUM_SIZE => current = next,
                _ => return current,
            }

            if current >= size {
                return current;
            }
        }
    }
}

impl Default for GrowthStrategy {
    fn default() -> Self { GrowthStrategy::Geometric }
}

// mod tests
