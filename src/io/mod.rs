//! Input/output helpers.
//!
//! - record, observation, and coverage CSVs plus `meta.json` (`export`)

pub mod export;

pub use export::*;
