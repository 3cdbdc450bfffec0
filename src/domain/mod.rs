//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - catalog declarations (`IndicatorSpec`, `SourceRef`, `ImputationMethod`)
//! - the panel axes (`CountryMeta`, `YearRange`, `PanelScope`, `PanelKey`)
//! - per-key values and states (`Observation`, `Provenance`, `KeyState`)
//! - outputs (`CountryYearRecord`)

pub mod types;

pub use types::*;
