//! The configuration of a sequential pool.
//!
//! A Configuration gathers the knobs governing how a pool carves and replenishes its buffers:
//!
//! -   The size of the first buffer.
//! -   The maximum size of any buffer; larger requests are served by dedicated blocks.
//! -   The growth strategy, deciding the size of the next buffer.
//! -   The alignment strategy, deciding the padding between allocations.

use super::{AlignmentStrategy, ConfigurationError, GrowthStrategy};

/// Configuration
///
/// The configuration of a `SequentialPool`, built from `Default` and adjusted with the `with_*` methods.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct Configuration {
    initial_size: usize,
    maximum_buffer_size: usize,
    growth: GrowthStrategy,
    alignment: AlignmentStrategy,
}

impl Configuration {
    /// The initial buffer size, when none is specified.
    pub const DEFAULT_INITIAL_SIZE: usize = 256;

    /// The maximum buffer size, when none is specified.
    pub const DEFAULT_MAXIMUM_BUFFER_SIZE: usize = GrowthStrategy::MAXIMUM_SIZE;

    /// Creates the default configuration.
    pub const fn new() -> Self {
        Self {
            initial_size: Self::DEFAULT_INITIAL_SIZE,
            maximum_buffer_size: Self::DEFAULT_MAXIMUM_BUFFER_SIZE,
            growth: GrowthStrategy::Geometric,
            alignment: AlignmentStrategy::Natural,
        }
    }

    /// Sets the size of the first buffer.
    pub const fn with_initial_size(self, initial_size: usize) -> Self { Self { initial_size, ..self } }

    /// Sets the maximum size of a buffer.
    pub const fn with_maximum_buffer_size(self, maximum_buffer_size: usize) -> Self {
        Self { maximum_buffer_size, ..self }
    }

    /// Sets the growth strategy.
    pub const fn with_growth(self, growth: GrowthStrategy) -> Self { Self { growth, ..self } }

    /// Sets the alignment strategy.
    pub const fn with_alignment(self, alignment: AlignmentStrategy) -> Self { Self { alignment, ..self } }

    /// Returns the size of the first buffer.
    pub const fn initial_size(&self) -> usize { self.initial_size }

    /// Returns the maximum size of a buffer.
    pub const fn maximum_buffer_size(&self) -> usize { self.maximum_buffer_size }

    /// Returns the growth strategy.
    pub const fn growth(&self) -> GrowthStrategy { self.growth }

    /// Returns the alignment strategy.
    pub const fn alignment(&self) -> AlignmentStrategy { self.alignment }

    /// Checks the consistency of the configuration.
    ///
    /// Returns an error if:
    ///
    /// -   The initial size is 0.
    /// -   The maximum buffer size is less than the initial size.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.initial_size == 0 {
            return Err(ConfigurationError::ZeroInitialSize);
        }

        if self.maximum_buffer_size < self.initial_size {
            return Err(ConfigurationError::MaximumBelowInitial {
                initial: self.initial_size,
                maximum: self.maximum_buffer_size,
            });
        }

        Ok(())
    }
}

impl Default for Configuration {
    fn default() -> Self { Self::new() }
}

// mod tests
