//! `country-risk` library crate.
//!
//! The binary (`crisk`) is a thin wrapper around this library so that:
//!
//! - the scoring engine is testable without spawning processes or touching the network
//! - source adapters can be swapped (live connectors, synthetic data, in-memory tables)

pub mod app;
pub mod catalog;
pub mod cli;
pub mod data;
pub mod domain;
pub mod engine;
pub mod error;
pub mod io;
pub mod math;
pub mod report;
