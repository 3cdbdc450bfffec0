//! ACLED conflict events (OAuth password grant + paginated read API).
//!
//! The only credentialed source: without `ACLED_USERNAME` (or `ACLED_EMAIL`)
//! and `ACLED_PASSWORD` the adapter is disabled, and every key falls through
//! to the next source in the priority list.
//!
//! Events are summed to fatalities per (iso3, year); the default series is
//! fatalities per 100k, joined with OWID population.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;
use tracing::{info, warn};

use crate::data::http::HttpFetcher;
use crate::data::owid::{DEFAULT_POPULATION_SLUG, fetch_grapher};
use crate::data::population::{PER_100K, PopulationTable};
use crate::data::{SeriesStore, SeriesTable, SourceAdapter, SourceFailure};
use crate::domain::YearRange;

const TOKEN_URL: &str = "https://acleddata.com/oauth/token";
const READ_URL: &str = "https://acleddata.com/api/acled/read";
const PAGE_LIMIT: usize = 5000;
/// Hard cap on pages per year.
const MAX_PAGES: u32 = 500;
/// Retry waits for the token and read endpoints.
const BACKOFF_SECS: [u64; 4] = [2, 4, 8, 16];

pub const ENV_USERNAME: &str = "ACLED_USERNAME";
pub const ENV_EMAIL: &str = "ACLED_EMAIL";
pub const ENV_PASSWORD: &str = "ACLED_PASSWORD";

/// Series keys the adapter understands; `None` means fatalities per 100k.
pub const SERIES_PER_100K: &str = "fatalities_per_100k";
pub const SERIES_TOTAL: &str = "fatalities";

#[derive(Clone)]
pub struct AcledCredentials {
    username: String,
    password: String,
}

impl AcledCredentials {
    /// Read credentials from the environment (and `.env`); `None` when incomplete.
    pub fn from_env() -> Option<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let present = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let username = present(ENV_USERNAME).or_else(|| present(ENV_EMAIL))?;
        let password = present(ENV_PASSWORD)?;
        Some(Self { username, password })
    }

    pub fn username(&self) -> &str {
        &self.username
    }
}

impl std::fmt::Debug for AcledCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcledCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

pub struct AcledClient {
    http: HttpFetcher,
    token: String,
}

impl AcledClient {
    /// Exchange credentials for a bearer token.
    pub fn login(http: &HttpFetcher, credentials: &AcledCredentials) -> Result<Self, SourceFailure> {
        info!(user = credentials.username(), "requesting ACLED access token");
        let http = http
            .clone()
            .with_backoff(BACKOFF_SECS.into_iter().map(Duration::from_secs).collect());
        let form = [
            ("username", credentials.username.clone()),
            ("password", credentials.password.clone()),
            ("grant_type", "password".to_string()),
            ("client_id", "acled".to_string()),
        ];
        let body: Value = http
            .post_form(TOKEN_URL, &form)?
            .json()
            .map_err(|e| SourceFailure::Malformed(format!("invalid ACLED token JSON: {e}")))?;
        let token = parse_token(&body)?;
        Ok(Self { http, token })
    }

    /// Total fatalities per (iso3, year) over `years`, one paginated query per year.
    pub fn fetch_fatalities(&self, years: YearRange) -> Result<SeriesTable, SourceFailure> {
        let mut totals: HashMap<(String, i32), f64> = HashMap::new();
        for year in years.years() {
            for page in 1..=MAX_PAGES {
                let query = [
                    ("_format", "json".to_string()),
                    ("fields", "iso3|year|fatalities".to_string()),
                    ("year", year.to_string()),
                    ("year_where", "=".to_string()),
                    ("limit", PAGE_LIMIT.to_string()),
                    ("page", page.to_string()),
                ];
                let body: Value = self
                    .http
                    .get_bearer(READ_URL, &query, &self.token)?
                    .json()
                    .map_err(|e| SourceFailure::Malformed(format!("invalid ACLED JSON: {e}")))?;
                let events = parse_events_page(&body)?;
                let n = events.len();
                for (iso3, event_year, fatalities) in events {
                    *totals.entry((iso3, event_year)).or_default() += fatalities;
                }
                if n < PAGE_LIMIT {
                    break;
                }
            }
        }

        let mut table = SeriesTable::new();
        for ((iso3, year), fatalities) in totals {
            table.insert(&iso3, year, fatalities);
        }
        Ok(table)
    }
}

pub struct AcledSource {
    enabled: bool,
    store: SeriesStore,
}

impl AcledSource {
    pub const ID: &'static str = "acled";

    /// Log in, pull fatalities once, and derive every series routed to ACLED.
    ///
    /// Missing credentials or `http = None` (offline) yield a disabled adapter.
    pub fn load(
        http: Option<&HttpFetcher>,
        credentials: Option<&AcledCredentials>,
        series: &[(String, Option<String>)],
        years: YearRange,
    ) -> Self {
        let (Some(http), Some(credentials)) = (http, credentials) else {
            info!(
                credentials = credentials.is_some(),
                online = http.is_some(),
                "ACLED source disabled"
            );
            return Self::disabled();
        };

        let totals = AcledClient::login(http, credentials).and_then(|client| client.fetch_fatalities(years));
        let needs_population = series
            .iter()
            .any(|(_, key)| key.as_deref().unwrap_or(SERIES_PER_100K) == SERIES_PER_100K);
        let population = if needs_population && totals.is_ok() {
            Some(fetch_grapher(http, DEFAULT_POPULATION_SLUG).map(|t| PopulationTable::from_series(&t)))
        } else {
            None
        };

        let mut store = SeriesStore::new();
        for (indicator_id, key) in series {
            let loaded = derive_series(key.as_deref(), &totals, population.as_ref());
            match &loaded {
                Ok(table) => info!(source = Self::ID, indicator = %indicator_id, values = table.len(), "loaded series"),
                Err(e) => warn!(source = Self::ID, indicator = %indicator_id, error = %e, "series unavailable"),
            }
            store.insert(indicator_id, loaded);
        }

        Self { enabled: true, store }
    }

    fn disabled() -> Self {
        Self {
            enabled: false,
            store: SeriesStore::new(),
        }
    }
}

impl SourceAdapter for AcledSource {
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

fn derive_series(
    key: Option<&str>,
    totals: &Result<SeriesTable, SourceFailure>,
    population: Option<&Result<PopulationTable, SourceFailure>>,
) -> Result<SeriesTable, SourceFailure> {
    let totals = totals.as_ref().map_err(Clone::clone)?;
    match key.unwrap_or(SERIES_PER_100K) {
        SERIES_TOTAL => Ok(totals.clone()),
        SERIES_PER_100K => match population {
            Some(Ok(population)) => Ok(population.per_capita(totals, PER_100K)),
            Some(Err(e)) => Err(e.clone()),
            None => Err(SourceFailure::Unavailable("population series not loaded".into())),
        },
        other => Err(SourceFailure::Malformed(format!("unknown ACLED series `{other}`"))),
    }
}

fn parse_token(body: &Value) -> Result<String, SourceFailure> {
    body.get("access_token")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .ok_or_else(|| SourceFailure::Unavailable("ACLED login returned no access token".into()))
}

/// `(iso3, year, fatalities)` of one read page; rows without iso3/year are skipped.
pub fn parse_events_page(body: &Value) -> Result<Vec<(String, i32, f64)>, SourceFailure> {
    let data = body
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| SourceFailure::Malformed("ACLED response has no `data` array".into()))?;

    let mut out = Vec::with_capacity(data.len());
    for row in data {
        let Some(iso3) = row.get("iso3").and_then(Value::as_str).filter(|s| s.len() == 3) else {
            continue;
        };
        let Some(year) = row.get("year").and_then(number).map(|y| y as i32) else {
            continue;
        };
        let fatalities = row.get("fatalities").and_then(number).unwrap_or(0.0);
        out.push((iso3.to_ascii_uppercase(), year, fatalities));
    }
    Ok(out)
}

/// ACLED sends numbers as JSON numbers or numeric strings.
fn number(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use serde_json::json;

    fn lookup<'a>(vars: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |name: &str| vars.iter().find(|(k, _)| *k == name).map(|(_, v)| v.to_string())
    }

    #[test]
    fn credentials_require_user_and_password() {
        assert!(AcledCredentials::from_lookup(lookup(&[])).is_none());
        assert!(AcledCredentials::from_lookup(lookup(&[(ENV_USERNAME, "me@example.org")])).is_none());
        assert!(AcledCredentials::from_lookup(lookup(&[(ENV_USERNAME, " "), (ENV_PASSWORD, "pw")])).is_none());

        let creds = AcledCredentials::from_lookup(lookup(&[(ENV_EMAIL, "me@example.org"), (ENV_PASSWORD, "pw")]))
            .unwrap();
        assert_eq!(creds.username(), "me@example.org");
        assert!(!format!("{creds:?}").contains("pw"));
    }

    #[test]
    fn disabled_without_credentials_or_network() {
        let series = vec![("conflict".to_string(), None)];
        let years = YearRange::new(2022, 2023);

        let source = AcledSource::load(None, None, &series, years);
        assert!(!source.is_enabled());
        assert_eq!(source.fetch("conflict", "USA", 2023), Err(SourceFailure::Disabled));

        let creds = AcledCredentials::from_lookup(lookup(&[(ENV_USERNAME, "u"), (ENV_PASSWORD, "p")]));
        let source = AcledSource::load(None, creds.as_ref(), &series, years);
        assert!(!source.is_enabled());
    }

    #[test]
    fn parses_event_rows() {
        let body = json!({
            "status": 200,
            "data": [
                { "iso3": "NGA", "year": "2023", "fatalities": "12" },
                { "iso3": "NGA", "year": 2023, "fatalities": 3 },
                { "iso3": "", "year": "2023", "fatalities": "5" },
                { "iso3": "KEN", "year": "2022", "fatalities": null }
            ]
        });
        let rows = parse_events_page(&body).unwrap();
        assert_eq!(
            rows,
            vec![
                ("NGA".to_string(), 2023, 12.0),
                ("NGA".to_string(), 2023, 3.0),
                ("KEN".to_string(), 2022, 0.0)
            ]
        );
        assert!(matches!(parse_events_page(&json!({ "error": "x" })), Err(SourceFailure::Malformed(_))));
    }

    #[test]
    fn token_must_be_present() {
        assert_eq!(parse_token(&json!({ "access_token": "abc" })).unwrap(), "abc");
        assert!(matches!(parse_token(&json!({ "error": "invalid_grant" })), Err(SourceFailure::Unavailable(_))));
    }

    #[test]
    fn derives_totals_and_per_capita() {
        let mut totals = SeriesTable::new();
        totals.insert("NGA", 2023, 200.0);
        let mut pop = SeriesTable::new();
        pop.insert("NGA", 2022, 200_000_000.0);
        let population = Ok(PopulationTable::from_series(&pop));
        let totals = Ok(totals);

        let total = derive_series(Some(SERIES_TOTAL), &totals, None).unwrap();
        assert_eq!(total.get("NGA", 2023), Some(200.0));

        let per_100k = derive_series(None, &totals, Some(&population)).unwrap();
        assert_relative_eq!(per_100k.get("NGA", 2023).unwrap(), 0.1, epsilon = 1e-12);

        assert!(matches!(derive_series(Some("events"), &totals, None), Err(SourceFailure::Malformed(_))));
        let failed: Result<SeriesTable, SourceFailure> = Err(SourceFailure::Unavailable("login".into()));
        assert!(matches!(derive_series(None, &failed, None), Err(SourceFailure::Unavailable(_))));
    }
}
