//! World Bank API integration (indicators, WGI series, country directory).

use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::data::http::HttpFetcher;
use crate::data::{SeriesStore, SeriesTable, SourceAdapter, SourceFailure};
use crate::domain::{CountryMeta, YearRange};

const BASE_URL: &str = "https://api.worldbank.org/v2";
const PER_PAGE: usize = 20000;
/// Hard cap on pagination; a full indicator history fits in one or two pages.
const MAX_PAGES: u32 = 50;
/// World Bank data-source id of the Worldwide Governance Indicators.
const WGI_SOURCE: &str = "3";

pub struct WorldBankClient {
    http: HttpFetcher,
}

impl WorldBankClient {
    pub fn new(http: HttpFetcher) -> Self {
        Self { http }
    }

    /// Fetch one indicator for all countries over `years`.
    ///
    /// `data_source` selects a World Bank database (e.g. WGI); `None` = WDI default.
    pub fn fetch_indicator(
        &self,
        code: &str,
        years: YearRange,
        data_source: Option<&str>,
    ) -> Result<SeriesTable, SourceFailure> {
        let url = format!("{BASE_URL}/country/all/indicator/{code}");
        let mut table = SeriesTable::new();
        let mut page = 1u32;

        loop {
            let mut query = vec![
                ("format", "json".to_string()),
                ("per_page", PER_PAGE.to_string()),
                ("page", page.to_string()),
                ("date", format!("{}:{}", years.start, years.end)),
            ];
            if let Some(source) = data_source {
                query.push(("source", source.to_string()));
            }

            let body: Value = self
                .http
                .get(&url, &query)?
                .json()
                .map_err(|e| SourceFailure::Malformed(format!("invalid World Bank JSON: {e}")))?;

            let parsed = parse_indicator_page(&body)?;
            for (iso3, year, value) in parsed.rows {
                table.insert(&iso3, year, value);
            }

            if page >= parsed.pages || page >= MAX_PAGES {
                break;
            }
            page += 1;
        }

        Ok(table)
    }

    /// Fetch country metadata (aggregates such as regions and income groups are skipped).
    pub fn fetch_countries(&self) -> Result<Vec<CountryMeta>, SourceFailure> {
        let url = format!("{BASE_URL}/country");
        let query = [("format", "json".to_string()), ("per_page", "400".to_string())];
        let body: Value = self
            .http
            .get(&url, &query)?
            .json()
            .map_err(|e| SourceFailure::Malformed(format!("invalid World Bank JSON: {e}")))?;
        parse_countries(&body)
    }
}

/// Adapter serving World Bank (`worldbank`) or WGI (`wgi`) series.
pub struct WorldBankSource {
    id: String,
    enabled: bool,
    store: SeriesStore,
}

impl WorldBankSource {
    /// Load every `(indicator_id, code)` routed to this source.
    ///
    /// `client = None` yields a disabled adapter (offline mode).
    pub fn load(
        id: &str,
        client: Option<&WorldBankClient>,
        series: &[(String, Option<String>)],
        years: YearRange,
    ) -> Self {
        let Some(client) = client else {
            return Self {
                id: id.to_string(),
                enabled: false,
                store: SeriesStore::new(),
            };
        };

        let data_source = (id == "wgi").then_some(WGI_SOURCE);
        let mut store = SeriesStore::new();
        for (indicator_id, code) in series {
            let loaded = match code {
                Some(code) => client.fetch_indicator(code, years, data_source),
                None => Err(SourceFailure::Malformed(format!(
                    "no World Bank code configured for `{indicator_id}`"
                ))),
            };
            match &loaded {
                Ok(table) => info!(source = id, indicator = %indicator_id, values = table.len(), "loaded series"),
                Err(e) => warn!(source = id, indicator = %indicator_id, error = %e, "series unavailable"),
            }
            store.insert(indicator_id, loaded);
        }

        Self {
            id: id.to_string(),
            enabled: true,
            store,
        }
    }
}

impl SourceAdapter for WorldBankSource {
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

#[derive(Debug)]
struct IndicatorPage {
    rows: Vec<(String, i32, f64)>,
    pages: u32,
}

#[derive(Debug, Deserialize)]
struct PageMeta {
    #[serde(default)]
    pages: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct IndicatorRow {
    #[serde(default)]
    countryiso3code: Option<String>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    value: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct CountryRow {
    id: String,
    name: String,
    #[serde(default)]
    region: Option<NamedRef>,
    #[serde(rename = "incomeLevel", default)]
    income_level: Option<NamedRef>,
}

#[derive(Debug, Deserialize)]
struct NamedRef {
    value: String,
}

/// Split the `[meta, rows]` envelope; an error envelope (`[{"message": ...}]`) is malformed.
fn split_envelope(body: &Value) -> Result<(&Value, &Value), SourceFailure> {
    let arr = body
        .as_array()
        .ok_or_else(|| SourceFailure::Malformed("World Bank response is not an array".into()))?;
    match arr.as_slice() {
        [meta, rows, ..] => Ok((meta, rows)),
        [meta] if meta.get("message").is_some() => Err(SourceFailure::Unavailable(format!(
            "World Bank API error: {}",
            meta["message"]
        ))),
        _ => Err(SourceFailure::Malformed("unexpected World Bank envelope".into())),
    }
}

fn parse_indicator_page(body: &Value) -> Result<IndicatorPage, SourceFailure> {
    let (meta, rows) = split_envelope(body)?;
    let pages = serde_json::from_value::<PageMeta>(meta.clone())
        .ok()
        .and_then(|m| m.pages)
        .unwrap_or(1);

    // `null` rows = indicator exists but has no data in range.
    if rows.is_null() {
        return Ok(IndicatorPage { rows: Vec::new(), pages });
    }
    let rows: Vec<IndicatorRow> = serde_json::from_value(rows.clone())
        .map_err(|e| SourceFailure::Malformed(format!("invalid World Bank rows: {e}")))?;

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let (Some(iso3), Some(date), Some(value)) = (row.countryiso3code, row.date, row.value) else {
            continue;
        };
        if iso3.len() != 3 || !value.is_finite() {
            continue;
        }
        let Ok(year) = date.trim().parse::<i32>() else {
            continue;
        };
        out.push((iso3, year, value));
    }

    Ok(IndicatorPage { rows: out, pages })
}

fn parse_countries(body: &Value) -> Result<Vec<CountryMeta>, SourceFailure> {
    let (_, rows) = split_envelope(body)?;
    let rows: Vec<CountryRow> = serde_json::from_value(rows.clone())
        .map_err(|e| SourceFailure::Malformed(format!("invalid World Bank country rows: {e}")))?;

    Ok(rows
        .into_iter()
        .filter(|row| row.id.len() == 3)
        .filter(|row| row.region.as_ref().is_some_and(|r| r.value.trim() != "Aggregates"))
        .map(|row| CountryMeta {
            iso3: row.id,
            name: row.name,
            region: row.region.map(|r| r.value.trim().to_string()),
            income_group: row
                .income_level
                .map(|r| r.value.trim().to_string())
                .filter(|v| !v.is_empty()),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_indicator_rows_and_skips_gaps() {
        let body = json!([
            { "page": 1, "pages": 2, "per_page": 20000, "total": 3 },
            [
                { "countryiso3code": "USA", "date": "2023", "value": 2.5 },
                { "countryiso3code": "BRA", "date": "2023", "value": null },
                { "countryiso3code": "", "date": "2023", "value": 1.0 },
                { "countryiso3code": "NGA", "date": "bad", "value": 1.0 }
            ]
        ]);
        let page = parse_indicator_page(&body).unwrap();
        assert_eq!(page.pages, 2);
        assert_eq!(page.rows, vec![("USA".to_string(), 2023, 2.5)]);
    }

    #[test]
    fn empty_and_error_envelopes() {
        let empty = json!([{ "page": 0, "pages": 0 }, null]);
        assert!(parse_indicator_page(&empty).unwrap().rows.is_empty());

        let error = json!([{ "message": [{ "id": "120", "value": "Invalid value" }] }]);
        assert!(matches!(
            parse_indicator_page(&error),
            Err(SourceFailure::Unavailable(_))
        ));

        assert!(matches!(
            parse_indicator_page(&json!({ "oops": true })),
            Err(SourceFailure::Malformed(_))
        ));
    }

    #[test]
    fn parses_countries_without_aggregates() {
        let body = json!([
            { "page": 1, "pages": 1 },
            [
                { "id": "AUT", "name": "Austria",
                  "region": { "id": "ECS", "value": "Europe & Central Asia" },
                  "incomeLevel": { "id": "HIC", "value": "High income" } },
                { "id": "ARB", "name": "Arab World",
                  "region": { "id": "NA", "value": "Aggregates" },
                  "incomeLevel": { "id": "NA", "value": "Aggregates" } }
            ]
        ]);
        let countries = parse_countries(&body).unwrap();
        assert_eq!(countries.len(), 1);
        assert_eq!(countries[0].iso3, "AUT");
        assert_eq!(countries[0].region.as_deref(), Some("Europe & Central Asia"));
        assert_eq!(countries[0].income_group.as_deref(), Some("High income"));
    }

    #[test]
    fn offline_source_is_disabled() {
        let source = WorldBankSource::load(
            "worldbank",
            None,
            &[("gdp".to_string(), Some("NY.GDP.MKTP.KD.ZG".to_string()))],
            YearRange::new(2020, 2023),
        );
        assert!(!source.is_enabled());
        assert_eq!(source.fetch("gdp", "USA", 2023), Err(SourceFailure::Disabled));
    }
}
