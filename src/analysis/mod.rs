//! Analysis modules.
//!
//! Matrix construction lives in [`matrix`]; folding responses into it lives
//! in [`aggregator`].

pub mod aggregator;
pub mod matrix;

pub use aggregator::*;
pub use matrix::*;

#[cfg(test)]
pub(crate) mod strategies;
