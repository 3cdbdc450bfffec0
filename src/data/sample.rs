//! Synthetic panel generator for offline demo runs.
//!
//! Each indicator gets a per-country baseline drawn once (shared by every
//! source, so sources broadly agree), plus per-source yearly noise. Gaps and
//! whole-series outages are injected at configurable rates so a demo run
//! exercises source fallback, imputation, and reweighting.
//!
//! Everything is derived from `SampleConfig::seed`: the same seed always
//! produces the same panel.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;
use tracing::debug;

use crate::catalog::Catalog;
use crate::data::{SeriesStore, SeriesTable, SourceAdapter, SourceFailure};
use crate::domain::{IndicatorSpec, PanelScope};
use crate::error::{AppError, EXIT_CONFIG};

/// Default spread of country baselines when the indicator has no bounds.
const DEFAULT_SPREAD: f64 = 15.0;
const DEFAULT_CENTER: f64 = 50.0;
/// Year-to-year noise as a fraction of the baseline spread.
const YEARLY_NOISE_FRAC: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleConfig {
    pub seed: u64,
    /// Probability that a single (country, year) value is missing.
    pub missing_rate: f64,
    /// Probability that a whole (source, indicator) series is down.
    pub outage_rate: f64,
}

pub struct SampleSource {
    id: String,
    store: SeriesStore,
}

impl SampleSource {
    /// Generate data for every indicator the catalog routes to `id`.
    pub fn generate(
        id: &str,
        catalog: &Catalog,
        scope: &PanelScope,
        config: &SampleConfig,
    ) -> Result<Self, AppError> {
        for (name, rate) in [("missing_rate", config.missing_rate), ("outage_rate", config.outage_rate)] {
            if !(0.0..=1.0).contains(&rate) {
                return Err(AppError::new(
                    EXIT_CONFIG,
                    format!("Invalid {name} {rate}: must be within [0, 1]."),
                ));
            }
        }

        let mut store = SeriesStore::new();
        for (indicator_id, _) in catalog.series_for_source(id) {
            let Some(spec) = catalog.indicator(&indicator_id) else {
                continue;
            };
            let mut rng = StdRng::seed_from_u64(sample_seed(config.seed, &[id, indicator_id.as_str()]));
            if rng.gen_bool(config.outage_rate) {
                debug!(source = id, indicator = %indicator_id, "simulated outage");
                store.insert(
                    &indicator_id,
                    Err(SourceFailure::Unavailable("simulated outage".into())),
                );
                continue;
            }
            let table = generate_series(spec, scope, config, &mut rng)?;
            store.insert(&indicator_id, Ok(table));
        }

        Ok(Self {
            id: id.to_string(),
            store,
        })
    }
}

impl SourceAdapter for SampleSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn fetch(&self, indicator_id: &str, iso3: &str, year: i32) -> Result<f64, SourceFailure> {
        self.store.lookup(indicator_id, iso3, year)
    }
}

fn generate_series(
    spec: &IndicatorSpec,
    scope: &PanelScope,
    config: &SampleConfig,
    source_rng: &mut StdRng,
) -> Result<SeriesTable, AppError> {
    let (center, spread) = match spec.bounds {
        Some(b) => ((b.min + b.max) / 2.0, (b.max - b.min) / 6.0),
        None => (DEFAULT_CENTER, DEFAULT_SPREAD),
    };
    let baseline_dist = Normal::new(center, spread)
        .map_err(|e| AppError::new(EXIT_CONFIG, format!("Invalid sample distribution: {e}")))?;
    let noise_dist = Normal::new(0.0, spread * YEARLY_NOISE_FRAC)
        .map_err(|e| AppError::new(EXIT_CONFIG, format!("Invalid sample distribution: {e}")))?;

    let mut table = SeriesTable::new();
    for country in scope.countries() {
        // Baseline depends on (indicator, country) only, not on the source.
        let mut country_rng =
            StdRng::seed_from_u64(sample_seed(config.seed, &[spec.id.as_str(), country.iso3.as_str()]));
        let baseline = baseline_dist.sample(&mut country_rng);

        for year in scope.years().years() {
            let noise = noise_dist.sample(source_rng);
            if source_rng.gen_bool(config.missing_rate) {
                continue;
            }
            let mut value = baseline + noise;
            if let Some(b) = spec.bounds {
                value = value.clamp(b.min, b.max);
            }
            table.insert(&country.iso3, year, value);
        }
    }
    Ok(table)
}

fn sample_seed(seed: u64, parts: &[&str]) -> u64 {
    let mut hasher = DefaultHasher::new();
    seed.hash(&mut hasher);
    for part in parts {
        part.hash(&mut hasher);
    }
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::fallback_countries;
    use crate::domain::YearRange;

    const CATALOG: &str = r#"
indicators:
  - id: a
    direction: higher_is_worse
    weight: 0.5
    sources: [{ source: worldbank, series: A.CODE }, { source: owid, series: a-slug }]
  - id: b
    direction: higher_is_better
    weight: 0.5
    sources: [{ source: worldbank, series: B.CODE }]
    bounds: { min: -2.5, max: 2.5 }
"#;

    fn scope() -> PanelScope {
        PanelScope::new(fallback_countries(), YearRange::new(2020, 2023))
    }

    #[test]
    fn same_seed_same_panel() {
        let catalog = Catalog::from_yaml_str(CATALOG).unwrap();
        let config = SampleConfig {
            seed: 7,
            missing_rate: 0.2,
            outage_rate: 0.0,
        };
        let s1 = SampleSource::generate("worldbank", &catalog, &scope(), &config).unwrap();
        let s2 = SampleSource::generate("worldbank", &catalog, &scope(), &config).unwrap();
        for country in scope().countries() {
            for year in 2020..=2023 {
                assert_eq!(
                    s1.fetch("a", &country.iso3, year),
                    s2.fetch("a", &country.iso3, year)
                );
            }
        }
    }

    #[test]
    fn bounded_values_stay_in_bounds_and_unrouted_indicators_are_not_served() {
        let catalog = Catalog::from_yaml_str(CATALOG).unwrap();
        let config = SampleConfig {
            seed: 1,
            missing_rate: 0.0,
            outage_rate: 0.0,
        };
        let source = SampleSource::generate("owid", &catalog, &scope(), &config).unwrap();
        assert!(source.fetch("a", "USA", 2021).is_ok());
        assert_eq!(source.fetch("b", "USA", 2021), Err(SourceFailure::NotServed));

        let wb = SampleSource::generate("worldbank", &catalog, &scope(), &config).unwrap();
        for country in scope().countries() {
            let v = wb.fetch("b", &country.iso3, 2022).unwrap();
            assert!((-2.5..=2.5).contains(&v));
        }
    }

    #[test]
    fn full_outage_rate_fails_every_series() {
        let catalog = Catalog::from_yaml_str(CATALOG).unwrap();
        let config = SampleConfig {
            seed: 3,
            missing_rate: 0.0,
            outage_rate: 1.0,
        };
        let source = SampleSource::generate("worldbank", &catalog, &scope(), &config).unwrap();
        assert!(matches!(
            source.fetch("a", "USA", 2021),
            Err(SourceFailure::Unavailable(_))
        ));
    }

    #[test]
    fn rejects_invalid_rates() {
        let catalog = Catalog::from_yaml_str(CATALOG).unwrap();
        let config = SampleConfig {
            seed: 3,
            missing_rate: 1.5,
            outage_rate: 0.0,
        };
        let err = SampleSource::generate("worldbank", &catalog, &scope(), &config).err().unwrap();
        assert_eq!(err.exit_code(), EXIT_CONFIG);
    }
}
