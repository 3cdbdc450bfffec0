//! Our World in Data grapher CSV integration.
//!
//! Grapher exports look like `Entity,Code,Year,<value column>`. Rows without
//! a three-letter country code (continents, income aggregates) are dropped.
//!
//! `owid` serves a grapher series as is; `owid_percap` divides it by an
//! as-of population series (see `population`).

use std::collections::HashMap;

use tracing::{info, warn};

use crate::data::http::HttpFetcher;
use crate::data::population::{PER_100K, PopulationTable};
use crate::data::vendor_csv::{build_header_map, parse_value};
use crate::data::{SeriesStore, SeriesTable, SourceAdapter, SourceFailure};
use crate::domain::SourceRef;

const GRAPHER_URL: &str = "https://ourworldindata.org/grapher";

/// OWID-specific codes mapped to ISO3.
const ISO_FIX: [(&str, &str); 1] = [("OWID_KOS", "XKX")];
/// Population slug used when a per-capita source names none.
pub const DEFAULT_POPULATION_SLUG: &str = "population";

pub struct OwidSource {
    enabled: bool,
    store: SeriesStore,
}

impl OwidSource {
    pub const ID: &'static str = "owid";

    /// Download every `(indicator_id, slug)` routed to OWID.
    ///
    /// `http = None` yields a disabled adapter (offline mode).
    pub fn load(http: Option<&HttpFetcher>, series: &[(String, Option<String>)]) -> Self {
        let Some(http) = http else {
            return Self {
                enabled: false,
                store: SeriesStore::new(),
            };
        };

        let mut store = SeriesStore::new();
        for (indicator_id, slug) in series {
            let loaded = match slug {
                Some(slug) => fetch_grapher(http, slug),
                None => Err(SourceFailure::Malformed(format!(
                    "no OWID slug configured for `{indicator_id}`"
                ))),
            };
            match &loaded {
                Ok(table) => info!(source = Self::ID, indicator = %indicator_id, values = table.len(), "loaded series"),
                Err(e) => warn!(source = Self::ID, indicator = %indicator_id, error = %e, "series unavailable"),
            }
            store.insert(indicator_id, loaded);
        }

        Self { enabled: true, store }
    }
}

impl SourceAdapter for OwidSource {
    fn id(&self) -> &str {
        Self::ID
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

pub fn fetch_grapher(http: &HttpFetcher, slug: &str) -> Result<SeriesTable, SourceFailure> {
    let url = format!("{GRAPHER_URL}/{slug}.csv");
    let body = http
        .get(&url, &[])?
        .bytes()
        .map_err(|e| SourceFailure::Unavailable(format!("failed to read OWID body: {e}")))?;
    parse_grapher_csv(&body)
}

/// Per-capita OWID series (`owid_percap`).
pub struct OwidPerCapitaSource {
    enabled: bool,
    store: SeriesStore,
}

impl OwidPerCapitaSource {
    pub const ID: &'static str = "owid_percap";

    /// Download each value series and its population series (each population slug once).
    ///
    /// `http = None` yields a disabled adapter (offline mode).
    pub fn load(http: Option<&HttpFetcher>, refs: &[(String, SourceRef)]) -> Self {
        let Some(http) = http else {
            return Self {
                enabled: false,
                store: SeriesStore::new(),
            };
        };

        let mut populations: HashMap<String, Result<PopulationTable, SourceFailure>> = HashMap::new();
        let mut store = SeriesStore::new();
        for (indicator_id, source) in refs {
            let population_slug = source.population.as_deref().unwrap_or(DEFAULT_POPULATION_SLUG);
            let population = populations
                .entry(population_slug.to_string())
                .or_insert_with(|| fetch_grapher(http, population_slug).map(|t| PopulationTable::from_series(&t)));

            let loaded = match (&source.series, &*population) {
                (None, _) => Err(SourceFailure::Malformed(format!(
                    "no OWID slug configured for `{indicator_id}`"
                ))),
                (Some(_), Err(e)) => Err(e.clone()),
                (Some(slug), Ok(population)) => fetch_grapher(http, slug)
                    .map(|values| population.per_capita(&values, source.per.unwrap_or(PER_100K))),
            };
            match &loaded {
                Ok(table) => info!(source = Self::ID, indicator = %indicator_id, values = table.len(), "loaded series"),
                Err(e) => warn!(source = Self::ID, indicator = %indicator_id, error = %e, "series unavailable"),
            }
            store.insert(indicator_id, loaded);
        }

        Self { enabled: true, store }
    }
}

impl SourceAdapter for OwidPerCapitaSource {
    fn id(&self) -> &str {
        Self::ID
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

/// Parse a grapher CSV; the first column other than Entity/Code/Year holds the values.
pub fn parse_grapher_csv(bytes: &[u8]) -> Result<SeriesTable, SourceFailure> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);

    let headers = reader
        .headers()
        .map_err(|e| SourceFailure::Malformed(format!("failed to read OWID headers: {e}")))?
        .clone();
    let header_map = build_header_map(&headers);

    let (Some(&code_idx), Some(&year_idx)) = (header_map.get("code"), header_map.get("year")) else {
        return Err(SourceFailure::Malformed("OWID CSV lacks Code/Year columns".into()));
    };
    let value_idx = headers
        .iter()
        .enumerate()
        .map(|(idx, _)| idx)
        .find(|idx| {
            *idx != code_idx && *idx != year_idx && header_map.get("entity") != Some(idx)
        })
        .ok_or_else(|| SourceFailure::Malformed("OWID CSV has no value column".into()))?;

    let mut table = SeriesTable::new();
    for record in reader.records().flatten() {
        let Some(code) = record.get(code_idx) else {
            continue;
        };
        let code = ISO_FIX
            .iter()
            .find(|(from, _)| *from == code)
            .map(|(_, to)| *to)
            .unwrap_or(code);
        if code.len() != 3 {
            continue;
        }
        let Some(year) = record.get(year_idx).and_then(|y| y.parse::<i32>().ok()) else {
            continue;
        };
        let Some(value) = record.get(value_idx).and_then(parse_value) else {
            continue;
        };
        table.insert(code, year, value);
    }

    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn parses_grapher_csv_and_fixes_codes() {
        let csv = "Entity,Code,Year,Homicide rate\n\
                   United States,USA,2021,6.8\n\
                   Kosovo,OWID_KOS,2021,2.1\n\
                   Africa,,2021,9.0\n\
                   Brazil,BRA,2021,\n";
        let table = parse_grapher_csv(csv.as_bytes()).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get("USA", 2021), Some(6.8));
        assert_eq!(table.get("XKX", 2021), Some(2.1));
        assert_eq!(table.get("BRA", 2021), None);
    }

    #[test]
    fn per_capita_from_grapher_tables() {
        let values = parse_grapher_csv(
            b"Entity,Code,Year,Deaths\nUnited States,USA,2021,600\nKenya,KEN,2021,30\n",
        )
        .unwrap();
        let population = parse_grapher_csv(
            b"Entity,Code,Year,Population\nUnited States,USA,2019,300000000\nKenya,KEN,2010,50000000\n",
        )
        .unwrap();
        let out = PopulationTable::from_series(&population).per_capita(&values, PER_100K);
        assert_relative_eq!(out.get("USA", 2021).unwrap(), 0.2, epsilon = 1e-12);
        // Kenya's population is older than the allowed lag.
        assert_eq!(out.get("KEN", 2021), None);
    }

    #[test]
    fn offline_per_capita_source_is_disabled() {
        let refs = vec![("conflict".to_string(), SourceRef::new(OwidPerCapitaSource::ID, Some("deaths")))];
        let source = OwidPerCapitaSource::load(None, &refs);
        assert!(!source.is_enabled());
        assert_eq!(source.fetch("conflict", "USA", 2021), Err(SourceFailure::Disabled));
    }

    #[test]
    fn rejects_csv_without_schema() {
        let err = parse_grapher_csv(b"Entity,Value\nX,1\n").unwrap_err();
        assert!(matches!(err, SourceFailure::Malformed(_)));
    }
}
