//! As-of population join for per-capita series.
//!
//! A value for (iso3, year) is divided by the latest population of the same
//! country from `year` or earlier, at most `MAX_POPULATION_LAG_YEARS` old.

use std::collections::{BTreeMap, HashMap};

use crate::data::SeriesTable;

pub const MAX_POPULATION_LAG_YEARS: i32 = 5;
/// Default per-capita multiplier ("per 100k").
pub const PER_100K: f64 = 100_000.0;

#[derive(Debug, Clone, Default)]
pub struct PopulationTable {
    by_country: HashMap<String, BTreeMap<i32, f64>>,
}

impl PopulationTable {
    /// Index a population series; non-positive counts are dropped.
    pub fn from_series(table: &SeriesTable) -> Self {
        let mut by_country: HashMap<String, BTreeMap<i32, f64>> = HashMap::new();
        for (iso3, year, value) in table.iter().filter(|(_, _, v)| *v > 0.0) {
            by_country.entry(iso3.to_string()).or_default().insert(year, value);
        }
        Self { by_country }
    }

    pub fn as_of(&self, iso3: &str, year: i32) -> Option<f64> {
        let (&pop_year, &pop) = self.by_country.get(iso3)?.range(..=year).next_back()?;
        (i64::from(year) - i64::from(pop_year) <= i64::from(MAX_POPULATION_LAG_YEARS)).then_some(pop)
    }

    /// `value / population * per` for every value with a usable population.
    pub fn per_capita(&self, values: &SeriesTable, per: f64) -> SeriesTable {
        let mut out = SeriesTable::new();
        for (iso3, year, value) in values.iter() {
            if let Some(pop) = self.as_of(iso3, year) {
                out.insert(iso3, year, (value / pop * per).max(0.0));
            }
        }
        out
    }
}
