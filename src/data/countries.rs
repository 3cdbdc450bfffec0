//! Country directory: the panel's country axis plus grouping metadata.

use tracing::{info, warn};

use crate::data::worldbank::WorldBankClient;
use crate::domain::CountryMeta;

const EAP: &str = "East Asia & Pacific";
const ECA: &str = "Europe & Central Asia";
const LAC: &str = "Latin America & Caribbean";
const MENA: &str = "Middle East & North Africa";
const NAM: &str = "North America";
const SAS: &str = "South Asia";
const SSA: &str = "Sub-Saharan Africa";

const HIGH: &str = "High income";
const UPPER_MIDDLE: &str = "Upper middle income";
const LOWER_MIDDLE: &str = "Lower middle income";
const LOW: &str = "Low income";

/// Built-in directory used when the World Bank country endpoint is unreachable.
const FALLBACK: [(&str, &str, &str, &str); 24] = [
    ("ARG", "Argentina", LAC, UPPER_MIDDLE),
    ("AUS", "Australia", EAP, HIGH),
    ("AUT", "Austria", ECA, HIGH),
    ("BGD", "Bangladesh", SAS, LOWER_MIDDLE),
    ("BRA", "Brazil", LAC, UPPER_MIDDLE),
    ("CAN", "Canada", NAM, HIGH),
    ("CHN", "China", EAP, UPPER_MIDDLE),
    ("COL", "Colombia", LAC, UPPER_MIDDLE),
    ("DEU", "Germany", ECA, HIGH),
    ("EGY", "Egypt, Arab Rep.", MENA, LOWER_MIDDLE),
    ("ETH", "Ethiopia", SSA, LOW),
    ("FRA", "France", ECA, HIGH),
    ("GBR", "United Kingdom", ECA, HIGH),
    ("IDN", "Indonesia", EAP, UPPER_MIDDLE),
    ("IND", "India", SAS, LOWER_MIDDLE),
    ("JPN", "Japan", EAP, HIGH),
    ("KEN", "Kenya", SSA, LOWER_MIDDLE),
    ("MAR", "Morocco", MENA, LOWER_MIDDLE),
    ("MEX", "Mexico", LAC, UPPER_MIDDLE),
    ("NGA", "Nigeria", SSA, LOWER_MIDDLE),
    ("PAK", "Pakistan", SAS, LOWER_MIDDLE),
    ("TUR", "Turkiye", ECA, UPPER_MIDDLE),
    ("USA", "United States", NAM, HIGH),
    ("ZAF", "South Africa", SSA, UPPER_MIDDLE),
];

/// The built-in fallback directory.
pub fn fallback_countries() -> Vec<CountryMeta> {
    FALLBACK
        .iter()
        .map(|&(iso3, name, region, income)| CountryMeta::new(iso3, name, Some(region), Some(income)))
        .collect()
}

/// Load the directory from the World Bank, falling back to the built-in list.
///
/// Never fails: a missing client (offline) or an API error both fall back.
pub fn load_countries(client: Option<&WorldBankClient>) -> Vec<CountryMeta> {
    let Some(client) = client else {
        info!("offline: using built-in country directory");
        return fallback_countries();
    };

    match client.fetch_countries() {
        Ok(countries) if !countries.is_empty() => {
            info!(countries = countries.len(), "loaded World Bank country directory");
            countries
        }
        Ok(_) => {
            warn!("World Bank returned an empty country directory; using built-in list");
            fallback_countries()
        }
        Err(e) => {
            warn!(error = %e, "country directory unavailable; using built-in list");
            fallback_countries()
        }
    }
}

/// Keep only the requested iso3 codes (case-insensitive); an empty filter keeps all.
pub fn filter_countries(countries: Vec<CountryMeta>, only: &[String]) -> Vec<CountryMeta> {
    if only.is_empty() {
        return countries;
    }
    countries
        .into_iter()
        .filter(|c| only.iter().any(|iso| iso.eq_ignore_ascii_case(&c.iso3)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_has_regions_and_income_groups() {
        let countries = fallback_countries();
        assert_eq!(countries.len(), FALLBACK.len());
        assert!(countries.iter().all(|c| c.iso3.len() == 3));
        assert!(countries.iter().all(|c| c.region.is_some() && c.income_group.is_some()));
    }

    #[test]
    fn offline_load_uses_fallback() {
        assert_eq!(load_countries(None), fallback_countries());
    }

    #[test]
    fn filter_is_case_insensitive() {
        let kept = filter_countries(fallback_countries(), &["usa".to_string(), "BRA".to_string()]);
        let codes: Vec<_> = kept.iter().map(|c| c.iso3.as_str()).collect();
        assert_eq!(codes, vec!["BRA", "USA"]);
        assert_eq!(filter_countries(fallback_countries(), &[]).len(), FALLBACK.len());
    }
}
