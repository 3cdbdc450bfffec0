//! ND-GAIN country index (climate vulnerability and readiness, higher is better).
//!
//! ND-GAIN publishes no stable API. The table is read from a CSV at
//! `ND_GAIN_URL` when set, otherwise from `nd_gain.csv` in the vendor
//! directory. Column names vary between releases, so the iso3/country, year,
//! and score columns are detected by name; rows keyed by country name are
//! mapped to iso3 through the country directory.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use csv::{ByteRecord, StringRecord};
use tracing::{info, warn};

use crate::data::http::HttpFetcher;
use crate::data::vendor_csv::{build_header_map, parse_value};
use crate::data::{SeriesStore, SeriesTable, SourceAdapter, SourceFailure};
use crate::domain::CountryMeta;

pub const ENV_URL: &str = "ND_GAIN_URL";
pub const VENDOR_FILE: &str = "nd_gain.csv";

/// Rows outside this range are release artifacts (projections, placeholders).
const FIRST_YEAR: i32 = 2000;
const LAST_YEAR: i32 = 2035;

const ISO_COLUMNS: [&str; 3] = ["iso3", "iso", "country code"];
const NAME_COLUMNS: [&str; 3] = ["country", "country_name", "name"];
const VALUE_COLUMNS: [&str; 9] = [
    "index",
    "score",
    "nd-gain",
    "nd_gain",
    "ndgain",
    "nd_gain_score",
    "indexscore",
    "country_index",
    "gain_score",
];

pub struct NdGainSource {
    enabled: bool,
    store: SeriesStore,
}

impl NdGainSource {
    pub const ID: &'static str = "nd_gain";

    /// Load the index for every indicator routed to ND-GAIN.
    ///
    /// The remote CSV wins when it yields values; the vendor file (series key,
    /// default `nd_gain.csv`) is the fallback. With neither available the
    /// adapter is disabled.
    pub fn load(
        http: Option<&HttpFetcher>,
        url: Option<&str>,
        vendor_dir: &Path,
        countries: &[CountryMeta],
        series: &[(String, Option<String>)],
    ) -> Self {
        let remote = match (http, url) {
            (Some(http), Some(url)) => Some(fetch_remote(http, url, countries)),
            _ => None,
        };
        if let Some(Err(e)) = &remote {
            warn!(source = Self::ID, error = %e, "remote ND-GAIN table unavailable");
        }

        let mut enabled = remote.is_some();
        let mut store = SeriesStore::new();
        for (indicator_id, file_name) in series {
            let local = vendor_dir.join(file_name.as_deref().unwrap_or(VENDOR_FILE));
            let loaded = match &remote {
                Some(Ok(table)) if !table.is_empty() => Ok(table.clone()),
                _ if local.is_file() => {
                    enabled = true;
                    read_local(&local, countries)
                }
                Some(Ok(table)) => Ok(table.clone()),
                Some(Err(e)) => Err(e.clone()),
                None => continue,
            };
            match &loaded {
                Ok(table) => info!(source = Self::ID, indicator = %indicator_id, values = table.len(), "loaded series"),
                Err(e) => warn!(source = Self::ID, indicator = %indicator_id, error = %e, "series unavailable"),
            }
            store.insert(indicator_id, loaded);
        }

        if !enabled {
            info!("no {ENV_URL} and no vendor ND-GAIN file; ND-GAIN source disabled");
        }
        Self { enabled, store }
    }
}

impl SourceAdapter for NdGainSource {
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

fn fetch_remote(http: &HttpFetcher, url: &str, countries: &[CountryMeta]) -> Result<SeriesTable, SourceFailure> {
    let body = http
        .get(url, &[])?
        .bytes()
        .map_err(|e| SourceFailure::Unavailable(format!("failed to read ND-GAIN body: {e}")))?;
    parse_index_csv(&body, countries)
}

fn read_local(path: &Path, countries: &[CountryMeta]) -> Result<SeriesTable, SourceFailure> {
    let bytes = fs::read(path).map_err(|e| {
        SourceFailure::Unavailable(format!("failed to read ND-GAIN file '{}': {e}", path.display()))
    })?;
    parse_index_csv(&bytes, countries)
}

/// Parse a long-format ND-GAIN table (UTF-8 or Latin-1).
pub fn parse_index_csv(bytes: &[u8], countries: &[CountryMeta]) -> Result<SeriesTable, SourceFailure> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);

    let headers = reader
        .byte_headers()
        .map_err(|e| SourceFailure::Malformed(format!("failed to read ND-GAIN headers: {e}")))?;
    let header_map = build_header_map(&decode_record(headers));
    let column = |names: &[&str]| names.iter().find_map(|n| header_map.get(*n).copied());

    let (Some(year_idx), Some(value_idx)) = (column(&["year"]), column(&VALUE_COLUMNS)) else {
        return Err(SourceFailure::Malformed("ND-GAIN table lacks year/score columns".into()));
    };
    let key = match (column(&ISO_COLUMNS), column(&NAME_COLUMNS)) {
        (Some(idx), _) => CountryKey::Iso3(idx),
        (None, Some(idx)) => CountryKey::Name(idx, name_index(countries)),
        (None, None) => {
            return Err(SourceFailure::Malformed("ND-GAIN table lacks an iso3 or country column".into()));
        }
    };

    let mut table = SeriesTable::new();
    let mut skipped = 0usize;
    for record in reader.byte_records() {
        let Ok(record) = record else {
            skipped += 1;
            continue;
        };
        let record = decode_record(&record);
        let row = (
            key.iso3(&record),
            record.get(year_idx).and_then(parse_year),
            record.get(value_idx).and_then(parse_value),
        );
        match row {
            (Some(iso3), Some(year), Some(value)) if (FIRST_YEAR..=LAST_YEAR).contains(&year) => {
                table.insert(&iso3, year, value)
            }
            _ => skipped += 1,
        }
    }
    if skipped > 0 {
        info!(skipped, "skipped ND-GAIN rows without iso3, year, or score");
    }
    Ok(table)
}

enum CountryKey {
    Iso3(usize),
    Name(usize, HashMap<String, String>),
}

impl CountryKey {
    fn iso3(&self, record: &StringRecord) -> Option<String> {
        let code = match self {
            CountryKey::Iso3(idx) => record.get(*idx)?.to_ascii_uppercase(),
            CountryKey::Name(idx, names) => names.get(&record.get(*idx)?.to_lowercase())?.clone(),
        };
        (code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic())).then_some(code)
    }
}

fn name_index(countries: &[CountryMeta]) -> HashMap<String, String> {
    countries
        .iter()
        .map(|c| (c.name.trim().to_lowercase(), c.iso3.clone()))
        .collect()
}

fn parse_year(raw: &str) -> Option<i32> {
    let year = raw.trim().parse::<f64>().ok()?;
    (year.fract() == 0.0 && year.abs() < 10_000.0).then_some(year as i32)
}

/// Fields that are not UTF-8 are read as Latin-1.
fn decode_record(record: &ByteRecord) -> StringRecord {
    let fields: Vec<String> = record
        .iter()
        .map(|field| match std::str::from_utf8(field) {
            Ok(s) => s.to_string(),
            Err(_) => field.iter().map(|&b| b as char).collect(),
        })
        .collect();
    StringRecord::from(fields)
}
