//! Source adapters.
//!
//! Every statistical source is exposed to the engine through one capability,
//! `SourceAdapter::fetch`. Connectors do their network/disk I/O when they are
//! constructed and keep either a loaded `SeriesTable` or the failure that
//! prevented loading; `fetch` is then a pure lookup. The engine therefore
//! never blocks on I/O.
//!
//! - `worldbank`: World Bank API (also serves WGI series)
//! - `owid`: Our World in Data grapher CSVs, raw and per capita
//! - `acled`: ACLED conflict fatalities (credentialed)
//! - `ndgain`: ND-GAIN climate index (CSV URL or vendor file)
//! - `population`: as-of population join for per-capita series
//! - `vendor_csv`: `iso3,year,value` files dropped in a vendor directory
//! - `sample`: deterministic synthetic data for offline demo runs
//! - `countries`: the panel's country directory

use std::collections::{BTreeMap, HashMap};

use thiserror::Error;

pub mod acled;
pub mod countries;
pub mod http;
pub mod ndgain;
pub mod owid;
pub mod population;
pub mod sample;
pub mod vendor_csv;
pub mod worldbank;

pub use acled::{AcledCredentials, AcledSource};
pub use countries::*;
pub use ndgain::NdGainSource;
pub use owid::{OwidPerCapitaSource, OwidSource};
pub use sample::{SampleConfig, SampleSource};
pub use vendor_csv::VendorCsvSource;
pub use worldbank::{WorldBankClient, WorldBankSource};

/// Source kinds the registry builder knows how to construct.
pub const KNOWN_SOURCES: [&str; 7] = [
    "worldbank",
    "wgi",
    "owid",
    "owid_percap",
    "acled",
    "nd_gain",
    "vendor_csv",
];

/// Why a source could not supply a value for one key.
///
/// All variants are non-fatal: the resolver simply moves to the next source.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SourceFailure {
    #[error("source is disabled")]
    Disabled,

    #[error("source does not serve this indicator")]
    NotServed,

    #[error("no value for this country-year")]
    Missing,

    #[error("malformed value: {0}")]
    Malformed(String),

    #[error("source unavailable: {0}")]
    Unavailable(String),
}

impl SourceFailure {
    /// Stable short label used as a tally key.
    pub fn reason(&self) -> &'static str {
        match self {
            SourceFailure::Disabled => "disabled",
            SourceFailure::NotServed => "not_served",
            SourceFailure::Missing => "missing",
            SourceFailure::Malformed(_) => "malformed",
            SourceFailure::Unavailable(_) => "unavailable",
        }
    }
}

/// The single capability the resolver needs from a source.
pub trait SourceAdapter: Send + Sync {
    /// Id matching `SourceRef::source` in the catalog.
    fn id(&self) -> &str;

    /// Availability signal (e.g. offline mode, missing vendor directory).
    fn is_enabled(&self) -> bool {
        true
    }

    /// Raw value for one key, or the reason there is none.
    fn fetch(&self, indicator_id: &str, iso3: &str, year: i32) -> Result<f64, SourceFailure>;
}

/// Loaded `(iso3, year) -> value` pairs for one series.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeriesTable {
    values: HashMap<(String, i32), f64>,
}

impl SeriesTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value; a later insert for the same key replaces the earlier one.
    pub fn insert(&mut self, iso3: &str, year: i32, value: f64) {
        self.values.insert((iso3.to_ascii_uppercase(), year), value);
    }

    pub fn get(&self, iso3: &str, year: i32) -> Option<f64> {
        self.values.get(&(iso3.to_ascii_uppercase(), year)).copied()
    }

    /// `(iso3, year, value)` triples in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, i32, f64)> + '_ {
        self.values.iter().map(|((iso3, year), value)| (iso3.as_str(), *year, *value))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Per-indicator loaded series (or the load failure) for table-backed adapters.
#[derive(Debug, Clone, Default)]
pub struct SeriesStore {
    series: HashMap<String, Result<SeriesTable, SourceFailure>>,
}

impl SeriesStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, indicator_id: &str, loaded: Result<SeriesTable, SourceFailure>) {
        self.series.insert(indicator_id.to_string(), loaded);
    }

    /// Shared `fetch` logic: not served, load failure, missing key, or a finite value.
    pub fn lookup(&self, indicator_id: &str, iso3: &str, year: i32) -> Result<f64, SourceFailure> {
        let table = match self.series.get(indicator_id) {
            None => return Err(SourceFailure::NotServed),
            Some(Err(failure)) => return Err(failure.clone()),
            Some(Ok(table)) => table,
        };
        let value = table.get(iso3, year).ok_or(SourceFailure::Missing)?;
        if value.is_finite() {
            Ok(value)
        } else {
            Err(SourceFailure::Malformed(format!("non-finite value {value}")))
        }
    }
}

/// Adapters by id.
#[derive(Default)]
pub struct SourceRegistry {
    adapters: BTreeMap<String, Box<dyn SourceAdapter>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under its own id; re-registering an id replaces it.
    pub fn register(&mut self, adapter: Box<dyn SourceAdapter>) {
        self.adapters.insert(adapter.id().to_string(), adapter);
    }

    pub fn get(&self, id: &str) -> Option<&dyn SourceAdapter> {
        self.adapters.get(id).map(|a| a.as_ref())
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.adapters.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

impl std::fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceRegistry")
            .field("adapters", &self.adapters.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// In-memory adapter, mainly for tests and embedding callers that already hold data.
#[derive(Debug, Clone)]
pub struct StaticSource {
    id: String,
    enabled: bool,
    store: SeriesStore,
}

impl StaticSource {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            enabled: true,
            store: SeriesStore::new(),
        }
    }

    pub fn disabled(id: &str) -> Self {
        Self {
            enabled: false,
            ..Self::new(id)
        }
    }

    /// Add one value, creating the indicator's table on first use.
    pub fn with_value(mut self, indicator_id: &str, iso3: &str, year: i32, value: f64) -> Self {
        let entry = self
            .store
            .series
            .entry(indicator_id.to_string())
            .or_insert_with(|| Ok(SeriesTable::new()));
        if let Ok(table) = entry {
            table.insert(iso3, year, value);
        }
        self
    }

    /// Mark an indicator's series as failed to load.
    pub fn with_failure(mut self, indicator_id: &str, failure: SourceFailure) -> Self {
        self.store.insert(indicator_id, Err(failure));
        self
    }
}

impl SourceAdapter for StaticSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn fetch(&self, indicator_id: &str, iso3: &str, year: i32) -> Result<f64, SourceFailure> {
        if !self.enabled {
            return Err(SourceFailure::Disabled);
        }
        self.store.lookup(indicator_id, iso3, year)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_lookup_distinguishes_failures() {
        let mut table = SeriesTable::new();
        table.insert("usa", 2023, 1.5);
        table.insert("BRA", 2023, f64::NAN);

        let mut store = SeriesStore::new();
        store.insert("gdp", Ok(table));
        store.insert("wgi", Err(SourceFailure::Unavailable("timeout".into())));

        assert_eq!(store.lookup("gdp", "USA", 2023), Ok(1.5));
        assert_eq!(store.lookup("gdp", "USA", 2022), Err(SourceFailure::Missing));
        assert!(matches!(store.lookup("gdp", "BRA", 2023), Err(SourceFailure::Malformed(_))));
        assert_eq!(store.lookup("other", "USA", 2023), Err(SourceFailure::NotServed));
        assert_eq!(
            store.lookup("wgi", "USA", 2023),
            Err(SourceFailure::Unavailable("timeout".into()))
        );
    }

    #[test]
    fn static_source_respects_enabled_flag() {
        let on = StaticSource::new("vendor").with_value("a", "USA", 2020, 3.0);
        assert_eq!(on.fetch("a", "USA", 2020), Ok(3.0));

        let off = StaticSource::disabled("vendor");
        assert!(!off.is_enabled());
        assert_eq!(off.fetch("a", "USA", 2020), Err(SourceFailure::Disabled));
    }

    #[test]
    fn registry_replaces_by_id() {
        let mut registry = SourceRegistry::new();
        registry.register(Box::new(StaticSource::new("x").with_value("a", "USA", 2020, 1.0)));
        registry.register(Box::new(StaticSource::new("x").with_value("a", "USA", 2020, 2.0)));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("x").unwrap().fetch("a", "USA", 2020), Ok(2.0));
        assert!(registry.get("y").is_none());
    }
}
