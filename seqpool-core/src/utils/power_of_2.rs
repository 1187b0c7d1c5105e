//! An integer guaranteed to be a PowerOf2.

use core::{mem, num, ops};

/// PowerOf2
///
/// An integral guaranteed to be non-zero and a power of 2, used for alignments and block sizes.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct PowerOf2(num::NonZeroUsize);

impl PowerOf2 {
    /// 1 as a PowerOf2 instance.
    //  Safety:
    //  -   1 is a power of 2.
    pub const ONE: PowerOf2 = unsafe { PowerOf2::new_unchecked(1) };

    /// Creates a new instance of PowerOf2.
    ///
    /// Or nothing if the value is not a power of 2.
    pub fn new(value: usize) -> Option<PowerOf2> {
        if value.count_ones() == 1 {
            //  Safety:
            //  -   Value is a power of 2, as per the if check.
            Some(unsafe { PowerOf2::new_unchecked(value) })
        } else {
            None
        }
    }

    /// Creates a new instance of PowerOf2.
    ///
    /// #   Safety
    ///
    /// Assumes that the value is a power of 2.
    pub const unsafe fn new_unchecked(value: usize) -> PowerOf2 {
        //  Safety:
        //  -   A power of 2 cannot be 0.
        PowerOf2(num::NonZeroUsize::new_unchecked(value))
    }

    /// Creates a PowerOf2 matching the alignment of a type.
    pub const fn align_of<T>() -> PowerOf2 {
        //  Safety:
        //  -   Alignment is always a power of 2, and never 0.
        unsafe { PowerOf2::new_unchecked(mem::align_of::<T>()) }
    }

    /// Returns the largest power of 2 dividing `n`, or None if `n` is 0.
    ///
    /// This is the natural alignment of an object of `n` bytes.
    pub fn largest_dividing(n: usize) -> Option<PowerOf2> {
        if n == 0 {
            return None;
        }

        //  Safety:
        //  -   Isolating the lowest set bit of a non-zero value yields a power of 2.
        Some(unsafe { PowerOf2::new_unchecked(n & n.wrapping_neg()) })
    }

    /// Returns the inner value.
    pub const fn value(&self) -> usize { self.0.get() }

    /// Rounds the value up to the nearest higher multiple of `self`.
    ///
    /// The result is unspecified if the rounding overflows, see `checked_round_up`.
    pub const fn round_up(&self, n: usize) -> usize {
        let mask = self.mask();

        (n + mask) & !mask
    }

    /// Rounds the value up to the nearest higher multiple of `self`, or None if it would overflow.
    pub fn checked_round_up(&self, n: usize) -> Option<usize> {
        let mask = self.mask();

        n.checked_add(mask).map(|n| n & !mask)
    }

    /// Rounds the value down to the nearest lower multiple of `self`.
    pub const fn round_down(&self, n: usize) -> usize { n & !self.mask() }

    const fn mask(&self) -> usize { self.value() - 1 }
}

impl ops::Rem<PowerOf2> for usize {
    type Output = usize;

    #[allow(clippy::suspicious_arithmetic_impl)]
    fn rem(self, rhs: PowerOf2) -> usize { self & rhs.mask() }
}

// mod tests
