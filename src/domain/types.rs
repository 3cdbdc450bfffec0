//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - passed between pipeline phases (and worker threads) by value
//! - exported to CSV/JSON without an intermediate DTO layer

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Polarity of an indicator's raw value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Larger raw values mean more risk (e.g. conflict fatalities).
    HigherIsWorse,
    /// Larger raw values mean less risk (e.g. government effectiveness).
    HigherIsBetter,
}

/// One step of an imputation chain.
///
/// The chain order is declared per indicator in the catalog; the engine only
/// walks it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImputationMethod {
    /// Same country, most recent earlier year (bounded by the lookback).
    CarryForward,
    /// Same-year median over the country's region.
    RegionalMedian,
    /// Same-year median over the country's income group.
    IncomeGroupMedian,
    /// Same-year median over every country.
    GlobalMedian,
    /// Median over the indicator's whole panel.
    HistoricalMedian,
}

impl ImputationMethod {
    pub const ALL: [ImputationMethod; 5] = [
        ImputationMethod::CarryForward,
        ImputationMethod::RegionalMedian,
        ImputationMethod::IncomeGroupMedian,
        ImputationMethod::GlobalMedian,
        ImputationMethod::HistoricalMedian,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ImputationMethod::CarryForward => "carry_forward",
            ImputationMethod::RegionalMedian => "regional_median",
            ImputationMethod::IncomeGroupMedian => "income_group_median",
            ImputationMethod::GlobalMedian => "global_median",
            ImputationMethod::HistoricalMedian => "historical_median",
        }
    }
}

impl std::fmt::Display for ImputationMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A source in an indicator's priority list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    /// Adapter id (`worldbank`, `wgi`, `owid`, `owid_percap`, `acled`, `nd_gain`, `vendor_csv`).
    pub source: String,
    /// Source-specific series key: World Bank code, OWID slug, vendor file name.
    #[serde(default)]
    pub series: Option<String>,
    /// `owid_percap`: population slug the series is divided by.
    #[serde(default)]
    pub population: Option<String>,
    /// `owid_percap`: per-capita multiplier (e.g. 100000 for "per 100k").
    #[serde(default)]
    pub per: Option<f64>,
}

#[cfg(test)]
impl SourceRef {
    pub fn new(source: &str, series: Option<&str>) -> Self {
        Self {
            source: source.to_string(),
            series: series.map(str::to_string),
            population: None,
            per: None,
        }
    }
}

/// Fixed normalization range, replacing the panel min/max.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

/// Static declaration of one indicator. Owned by the `Catalog`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndicatorSpec {
    pub id: String,
    pub name: String,
    pub pillar: Option<String>,
    pub direction: Direction,
    pub base_weight: f64,
    pub source_priority: Vec<SourceRef>,
    pub imputation_chain: Vec<ImputationMethod>,
    /// Maximum age (in years) of a carried-forward value. `None` = unbounded.
    pub lookback_years: Option<u32>,
    pub bounds: Option<Bounds>,
    /// Multiplier applied to every sourced raw value (unit conversion).
    pub scale: Option<f64>,
}

/// Inclusive range of panel years.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearRange {
    pub start: i32,
    pub end: i32,
}

impl YearRange {
    pub fn new(start: i32, end: i32) -> Self {
        Self { start, end }
    }

    pub fn years(&self) -> std::ops::RangeInclusive<i32> {
        self.start..=self.end
    }

    pub fn len(&self) -> usize {
        if self.end < self.start {
            0
        } else {
            (i64::from(self.end) - i64::from(self.start)) as usize + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Country metadata used to key the panel and to group imputation medians.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountryMeta {
    pub iso3: String,
    pub name: String,
    pub region: Option<String>,
    pub income_group: Option<String>,
}

impl CountryMeta {
    pub fn new(iso3: &str, name: &str, region: Option<&str>, income_group: Option<&str>) -> Self {
        Self {
            iso3: iso3.to_string(),
            name: name.to_string(),
            region: region.map(str::to_string),
            income_group: income_group.map(str::to_string),
        }
    }
}

/// The set of (country, year) keys a run covers.
#[derive(Debug, Clone)]
pub struct PanelScope {
    countries: Vec<CountryMeta>,
    years: YearRange,
}

impl PanelScope {
    /// Countries are sorted and deduplicated by iso3 so key order is stable.
    pub fn new(mut countries: Vec<CountryMeta>, years: YearRange) -> Self {
        countries.sort_by(|a, b| a.iso3.cmp(&b.iso3));
        countries.dedup_by(|a, b| a.iso3 == b.iso3);
        Self { countries, years }
    }

    pub fn countries(&self) -> &[CountryMeta] {
        &self.countries
    }

    pub fn years(&self) -> YearRange {
        self.years
    }

    pub fn country(&self, iso3: &str) -> Option<&CountryMeta> {
        self.countries
            .binary_search_by(|c| c.iso3.as_str().cmp(iso3))
            .ok()
            .map(|idx| &self.countries[idx])
    }

    /// All keys, ordered by (iso3, year).
    pub fn keys(&self) -> Vec<PanelKey> {
        let mut out = Vec::with_capacity(self.len());
        for country in &self.countries {
            for year in self.years.years() {
                out.push(PanelKey::new(&country.iso3, year));
            }
        }
        out
    }

    pub fn len(&self) -> usize {
        self.countries.len() * self.years.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A (country, year) key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PanelKey {
    pub iso3: String,
    pub year: i32,
}

impl PanelKey {
    pub fn new(iso3: &str, year: i32) -> Self {
        Self {
            iso3: iso3.to_string(),
            year,
        }
    }
}

/// Where a value came from.
///
/// Being an enum, a value is either sourced or imputed, never both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Provenance {
    Source(String),
    Imputed(ImputationMethod),
}

/// One resolved or imputed value for (iso3, year, indicator).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub iso3: String,
    pub year: i32,
    pub indicator_id: String,
    pub raw_value: f64,
    pub provenance: Provenance,
}

impl Observation {
    pub fn sourced(key: &PanelKey, indicator_id: &str, raw_value: f64, source_id: &str) -> Self {
        Self {
            iso3: key.iso3.clone(),
            year: key.year,
            indicator_id: indicator_id.to_string(),
            raw_value,
            provenance: Provenance::Source(source_id.to_string()),
        }
    }

    pub fn imputed(key: &PanelKey, indicator_id: &str, raw_value: f64, method: ImputationMethod) -> Self {
        Self {
            iso3: key.iso3.clone(),
            year: key.year,
            indicator_id: indicator_id.to_string(),
            raw_value,
            provenance: Provenance::Imputed(method),
        }
    }

    pub fn is_imputed(&self) -> bool {
        matches!(self.provenance, Provenance::Imputed(_))
    }

    pub fn source_id(&self) -> Option<&str> {
        match &self.provenance {
            Provenance::Source(id) => Some(id),
            Provenance::Imputed(_) => None,
        }
    }

    pub fn imputation_method(&self) -> Option<ImputationMethod> {
        match self.provenance {
            Provenance::Imputed(method) => Some(method),
            Provenance::Source(_) => None,
        }
    }
}

/// Terminal state of a (country, year, indicator) key.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyState {
    Sourced(Observation),
    Imputed(Observation),
    Unavailable,
}

impl KeyState {
    pub fn observation(&self) -> Option<&Observation> {
        match self {
            KeyState::Sourced(obs) | KeyState::Imputed(obs) => Some(obs),
            KeyState::Unavailable => None,
        }
    }
}

/// The composite result for one country-year.
///
/// Maps are keyed by indicator id (or pillar name) and ordered, so exports are stable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountryYearRecord {
    pub iso3: String,
    pub year: i32,
    /// Normalized subscores of the available indicators.
    pub subscores: BTreeMap<String, f64>,
    pub composite: f64,
    /// Share of base weight backed by sourced or imputed data (pre-redistribution).
    pub coverage_ratio: f64,
    /// Effective weight of every catalog indicator (0 when unavailable).
    pub effective_weights: BTreeMap<String, f64>,
    /// Per-pillar subscores; a pillar with no available member is absent.
    pub pillars: BTreeMap<String, f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provenance_is_exclusive() {
        let key = PanelKey::new("USA", 2023);
        let sourced = Observation::sourced(&key, "gdp", 1.5, "worldbank");
        assert!(!sourced.is_imputed());
        assert_eq!(sourced.source_id(), Some("worldbank"));
        assert_eq!(sourced.imputation_method(), None);

        let imputed = Observation::imputed(&key, "gdp", 1.5, ImputationMethod::RegionalMedian);
        assert!(imputed.is_imputed());
        assert_eq!(imputed.source_id(), None);
        assert_eq!(imputed.imputation_method(), Some(ImputationMethod::RegionalMedian));
    }

    #[test]
    fn scope_keys_are_sorted_and_unique() {
        let scope = PanelScope::new(
            vec![
                CountryMeta::new("USA", "United States", None, None),
                CountryMeta::new("AUT", "Austria", None, None),
                CountryMeta::new("USA", "United States", None, None),
            ],
            YearRange::new(2022, 2023),
        );
        let keys = scope.keys();
        assert_eq!(keys.len(), 4);
        assert_eq!(keys[0], PanelKey::new("AUT", 2022));
        assert_eq!(keys[3], PanelKey::new("USA", 2023));
        assert!(scope.country("USA").is_some());
        assert!(scope.country("BRA").is_none());
    }

    #[test]
    fn year_range_len_does_not_overflow() {
        assert_eq!(YearRange::new(2020, 2023).len(), 4);
        assert!(YearRange::new(2024, 2023).is_empty());
        assert_eq!(YearRange::new(i32::MIN, i32::MAX).len() as u64, 1u64 << 32);
    }

    #[test]
    fn imputation_method_serializes_snake_case() {
        let json = serde_json::to_string(&ImputationMethod::RegionalMedian).unwrap();
        assert_eq!(json, "\"regional_median\"");
        for method in ImputationMethod::ALL {
            assert_eq!(serde_json::to_string(&method).unwrap(), format!("\"{method}\""));
        }
    }
}
