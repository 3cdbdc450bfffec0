//! Indicator catalog.
//!
//! The catalog is the only place indicator semantics are declared. It is read
//! once from YAML, validated, and then shared immutably by every phase.
//!
//! Validation is strict: any structural problem is a `CatalogConfigError` and
//! aborts the run before a single key is resolved.

use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info};

use crate::domain::{Bounds, Direction, ImputationMethod, IndicatorSpec, SourceRef, YearRange};
use crate::error::CatalogConfigError;

/// Tolerance on the sum of base weights.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

const DEFAULT_START_YEAR: i32 = 2015;
const DEFAULT_END_YEAR: i32 = 2024;
/// Panel years outside this range are rejected.
pub const MIN_YEAR: i32 = 1900;
pub const MAX_YEAR: i32 = 2100;

/// A validated, immutable indicator catalog.
#[derive(Debug, Clone)]
pub struct Catalog {
    indicators: Vec<IndicatorSpec>,
    years: YearRange,
}

impl Catalog {
    /// Load and validate a YAML catalog file.
    pub fn load(path: &Path) -> Result<Self, CatalogConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| CatalogConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let catalog = Self::from_yaml_str(&contents)?;
        info!(
            path = %path.display(),
            indicators = catalog.indicators.len(),
            "loaded indicator catalog"
        );
        Ok(catalog)
    }

    /// Parse and validate a YAML catalog document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, CatalogConfigError> {
        let file: CatalogFile =
            serde_yaml::from_str(yaml).map_err(|e| CatalogConfigError::Parse(e.to_string()))?;
        Self::from_file(file)
    }

    /// Build a catalog from already-constructed specs (validated the same way).
    pub fn new(indicators: Vec<IndicatorSpec>, years: YearRange) -> Result<Self, CatalogConfigError> {
        validate(&indicators, years)?;
        Ok(Self { indicators, years })
    }

    fn from_file(file: CatalogFile) -> Result<Self, CatalogConfigError> {
        let defaults = file.defaults;
        let default_chain = defaults.imputation.unwrap_or_else(default_imputation_chain);
        let years = defaults
            .years
            .unwrap_or(YearRange::new(DEFAULT_START_YEAR, DEFAULT_END_YEAR));

        let indicators = file
            .indicators
            .into_iter()
            .map(|raw| IndicatorSpec {
                name: raw.name.unwrap_or_else(|| raw.id.clone()),
                id: raw.id,
                pillar: raw.pillar,
                direction: raw.direction,
                base_weight: raw.weight,
                source_priority: raw.sources,
                imputation_chain: raw.imputation.unwrap_or_else(|| default_chain.clone()),
                lookback_years: raw.lookback_years.or(defaults.lookback_years),
                bounds: raw.bounds,
                scale: raw.scale,
            })
            .collect();

        Self::new(indicators, years)
    }

    pub fn indicators(&self) -> &[IndicatorSpec] {
        &self.indicators
    }

    pub fn indicator(&self, id: &str) -> Option<&IndicatorSpec> {
        self.indicators.iter().find(|spec| spec.id == id)
    }

    pub fn years(&self) -> YearRange {
        self.years
    }

    /// Same catalog over a different year range (e.g. CLI override).
    pub fn with_years(&self, years: YearRange) -> Result<Self, CatalogConfigError> {
        Self::new(self.indicators.clone(), years)
    }

    /// Distinct source ids referenced anywhere in the catalog, sorted.
    pub fn source_ids(&self) -> BTreeSet<String> {
        self.indicators
            .iter()
            .flat_map(|spec| spec.source_priority.iter().map(|s| s.source.clone()))
            .collect()
    }

    /// `(indicator_id, series_key)` pairs routed to `source_id`, in catalog order.
    pub fn series_for_source(&self, source_id: &str) -> Vec<(String, Option<String>)> {
        self.refs_for_source(source_id)
            .into_iter()
            .map(|(id, source)| (id, source.series))
            .collect()
    }

    /// Full source references routed to `source_id`, for adapters that need more than a series key.
    pub fn refs_for_source(&self, source_id: &str) -> Vec<(String, SourceRef)> {
        self.indicators
            .iter()
            .flat_map(|spec| {
                spec.source_priority
                    .iter()
                    .filter(move |s| s.source == source_id)
                    .map(move |s| (spec.id.clone(), s.clone()))
            })
            .collect()
    }

    /// Distinct pillar names, sorted.
    pub fn pillars(&self) -> BTreeSet<String> {
        self.indicators.iter().filter_map(|spec| spec.pillar.clone()).collect()
    }

    /// Reject source ids that no adapter kind understands.
    pub fn ensure_sources_known(&self, known: &[&str]) -> Result<(), CatalogConfigError> {
        for spec in &self.indicators {
            for source in &spec.source_priority {
                if !known.contains(&source.source.as_str()) {
                    return Err(CatalogConfigError::UnknownSource {
                        id: spec.id.clone(),
                        source_id: source.source.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

pub fn default_imputation_chain() -> Vec<ImputationMethod> {
    vec![
        ImputationMethod::CarryForward,
        ImputationMethod::RegionalMedian,
        ImputationMethod::IncomeGroupMedian,
        ImputationMethod::GlobalMedian,
    ]
}

fn validate(indicators: &[IndicatorSpec], years: YearRange) -> Result<(), CatalogConfigError> {
    if years.end < years.start || years.start < MIN_YEAR || years.end > MAX_YEAR {
        return Err(CatalogConfigError::InvalidYears {
            start: years.start,
            end: years.end,
        });
    }
    if indicators.is_empty() {
        return Err(CatalogConfigError::Empty);
    }

    let mut seen_ids = HashSet::new();
    let mut weight_sum = 0.0;

    for (idx, spec) in indicators.iter().enumerate() {
        if spec.id.trim().is_empty() {
            return Err(CatalogConfigError::EmptyId(idx));
        }
        if !seen_ids.insert(spec.id.as_str()) {
            return Err(CatalogConfigError::DuplicateIndicator(spec.id.clone()));
        }
        if !(spec.base_weight.is_finite() && spec.base_weight > 0.0) {
            return Err(CatalogConfigError::InvalidWeight {
                id: spec.id.clone(),
                weight: spec.base_weight,
            });
        }
        weight_sum += spec.base_weight;

        if spec.source_priority.is_empty() {
            return Err(CatalogConfigError::EmptySourcePriority(spec.id.clone()));
        }
        let mut seen_sources = HashSet::new();
        for source in &spec.source_priority {
            if !seen_sources.insert(source.source.as_str()) {
                return Err(CatalogConfigError::DuplicateSource {
                    id: spec.id.clone(),
                    source_id: source.source.clone(),
                });
            }
            if let Some(per) = source.per {
                if !(per.is_finite() && per > 0.0) {
                    return Err(CatalogConfigError::InvalidFactor {
                        id: spec.id.clone(),
                        field: "per",
                        value: per,
                    });
                }
            }
        }
        if let Some(scale) = spec.scale {
            if !(scale.is_finite() && scale != 0.0) {
                return Err(CatalogConfigError::InvalidFactor {
                    id: spec.id.clone(),
                    field: "scale",
                    value: scale,
                });
            }
        }

        let mut seen_methods = HashSet::new();
        for method in &spec.imputation_chain {
            if !seen_methods.insert(*method) {
                return Err(CatalogConfigError::DuplicateImputation {
                    id: spec.id.clone(),
                    method: method.to_string(),
                });
            }
        }

        if let Some(bounds) = spec.bounds {
            if !(bounds.min.is_finite() && bounds.max.is_finite() && bounds.min < bounds.max) {
                return Err(CatalogConfigError::InvalidBounds {
                    id: spec.id.clone(),
                    min: bounds.min,
                    max: bounds.max,
                });
            }
        }

        debug!(indicator = %spec.id, weight = spec.base_weight, "validated indicator");
    }

    if (weight_sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
        return Err(CatalogConfigError::WeightSum { sum: weight_sum });
    }

    Ok(())
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CatalogFile {
    #[serde(default)]
    defaults: CatalogDefaults,
    indicators: Vec<IndicatorEntry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct CatalogDefaults {
    lookback_years: Option<u32>,
    imputation: Option<Vec<ImputationMethod>>,
    years: Option<YearRange>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct IndicatorEntry {
    id: String,
    name: Option<String>,
    pillar: Option<String>,
    direction: Direction,
    weight: f64,
    #[serde(default)]
    sources: Vec<SourceRef>,
    imputation: Option<Vec<ImputationMethod>>,
    lookback_years: Option<u32>,
    bounds: Option<Bounds>,
    scale: Option<f64>,
}
