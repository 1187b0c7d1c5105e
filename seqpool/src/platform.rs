//! Abstraction over OS differences.

#[cfg(unix)]
mod unix;

#[cfg(unix)]
pub use unix::NativeBlockDispenser;
