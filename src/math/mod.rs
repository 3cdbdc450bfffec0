//! Numeric helpers shared by the imputer and the normalizer.

pub mod stats;

pub use stats::*;
