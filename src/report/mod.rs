//! Reporting: run diagnostics and formatted terminal output.

pub mod format;
pub mod meta;

pub use format::*;
pub use meta::*;
