//! Error types.
//!
//! - `AppError`: binary boundary error carrying a process exit code
//! - `CatalogConfigError`: fatal, raised before any record is processed
//! - `PipelineError`: a run that could not produce any usable output
//!
//! Per-record degradations (source failures, exhausted imputation, zero
//! coverage) are *not* errors; they are recorded in `RunMeta`.

use thiserror::Error;

use crate::report::RunMeta;

/// Exit code for configuration, catalog, and input errors.
pub const EXIT_CONFIG: u8 = 2;
/// Exit code when the run produced no usable records.
pub const EXIT_NO_OUTPUT: u8 = 3;
/// Exit code for export failures.
pub const EXIT_EXPORT: u8 = 4;

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

/// Structural problems in the indicator catalog.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CatalogConfigError {
    #[error("failed to read catalog '{path}': {reason}")]
    Read { path: String, reason: String },

    #[error("failed to parse catalog: {0}")]
    Parse(String),

    #[error("catalog declares no indicators")]
    Empty,

    #[error("indicator at position {0} has an empty id")]
    EmptyId(usize),

    #[error("indicator `{0}` is declared more than once")]
    DuplicateIndicator(String),

    #[error("indicator `{id}` has invalid base weight {weight} (must be finite and > 0)")]
    InvalidWeight { id: String, weight: f64 },

    #[error("base weights sum to {sum:.6}, expected 1.0")]
    WeightSum { sum: f64 },

    #[error("indicator `{0}` has an empty source-priority list")]
    EmptySourcePriority(String),

    #[error("indicator `{id}` lists source `{source_id}` more than once")]
    DuplicateSource { id: String, source_id: String },

    #[error("indicator `{id}` lists imputation method `{method}` more than once")]
    DuplicateImputation { id: String, method: String },

    #[error("indicator `{id}` has invalid bounds [{min}, {max}]")]
    InvalidBounds { id: String, min: f64, max: f64 },

    #[error("indicator `{id}` has invalid {field} factor {value}")]
    InvalidFactor { id: String, field: &'static str, value: f64 },

    #[error("invalid year range {start}..={end} (years must be ordered and within 1900..=2100)")]
    InvalidYears { start: i32, end: i32 },

    #[error("indicator `{id}` references unknown source `{source_id}`")]
    UnknownSource { id: String, source_id: String },
}

/// A run that failed as a whole (as opposed to a degraded run).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    #[error("panel scope is empty ({countries} countries, {years} years)")]
    EmptyScope { countries: usize, years: usize },

    /// Still carries the finished diagnostics so they can be exported.
    #[error("every country-year has zero coverage ({keys} keys); no records produced")]
    NoCoverage { keys: usize, meta: Box<RunMeta> },
}

impl From<CatalogConfigError> for AppError {
    fn from(err: CatalogConfigError) -> Self {
        AppError::new(EXIT_CONFIG, format!("Catalog error: {err}"))
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::EmptyScope { .. } => AppError::new(EXIT_CONFIG, err.to_string()),
            PipelineError::NoCoverage { .. } => AppError::new(EXIT_NO_OUTPUT, err.to_string()),
        }
    }
}
