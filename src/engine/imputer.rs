//! Imputation chain.
//!
//! The panel a key is imputed from contains **sourced** observations only, so
//! imputed values never feed further imputation and the result does not
//! depend on the order keys are processed in.

use std::collections::{BTreeMap, HashMap};

use crate::domain::{CountryMeta, ImputationMethod, IndicatorSpec, Observation, PanelKey, PanelScope};
use crate::math::median;

#[derive(Debug, Clone, PartialEq)]
pub enum Imputation {
    Imputed(Observation),
    /// Every method in the chain was tried without a value.
    Exhausted { attempts: usize },
}

/// Sourced values of one indicator, indexed for the imputation methods.
#[derive(Debug, Clone)]
pub struct ImputationPanel<'a> {
    scope: &'a PanelScope,
    by_country: HashMap<String, BTreeMap<i32, f64>>,
    by_year: BTreeMap<i32, Vec<(String, f64)>>,
    all: Vec<f64>,
}

impl<'a> ImputationPanel<'a> {
    pub fn new(scope: &'a PanelScope, sourced: &[Observation]) -> Self {
        let mut by_country: HashMap<String, BTreeMap<i32, f64>> = HashMap::new();
        let mut by_year: BTreeMap<i32, Vec<(String, f64)>> = BTreeMap::new();
        let mut all = Vec::with_capacity(sourced.len());

        for obs in sourced.iter().filter(|o| !o.is_imputed()) {
            by_country
                .entry(obs.iso3.clone())
                .or_default()
                .insert(obs.year, obs.raw_value);
            by_year
                .entry(obs.year)
                .or_default()
                .push((obs.iso3.clone(), obs.raw_value));
            all.push(obs.raw_value);
        }

        Self {
            scope,
            by_country,
            by_year,
            all,
        }
    }

    fn value(&self, method: ImputationMethod, key: &PanelKey, lookback_years: Option<u32>) -> Option<f64> {
        match method {
            ImputationMethod::CarryForward => self.carry_forward(key, lookback_years),
            ImputationMethod::RegionalMedian => {
                let region = self.scope.country(&key.iso3)?.region.as_deref()?;
                self.peer_median(key.year, |c| c.region.as_deref() == Some(region))
            }
            ImputationMethod::IncomeGroupMedian => {
                let group = self.scope.country(&key.iso3)?.income_group.as_deref()?;
                self.peer_median(key.year, |c| c.income_group.as_deref() == Some(group))
            }
            ImputationMethod::GlobalMedian => {
                let values: Vec<f64> = self.by_year.get(&key.year)?.iter().map(|(_, v)| *v).collect();
                median(&values)
            }
            ImputationMethod::HistoricalMedian => median(&self.all),
        }
    }

    fn carry_forward(&self, key: &PanelKey, lookback_years: Option<u32>) -> Option<f64> {
        let (&year, &value) = self.by_country.get(&key.iso3)?.range(..key.year).next_back()?;
        match lookback_years {
            Some(limit) if i64::from(key.year) - i64::from(year) > i64::from(limit) => None,
            _ => Some(value),
        }
    }

    fn peer_median(&self, year: i32, is_peer: impl Fn(&CountryMeta) -> bool) -> Option<f64> {
        let values: Vec<f64> = self
            .by_year
            .get(&year)?
            .iter()
            .filter(|(iso3, _)| self.scope.country(iso3).is_some_and(|c| is_peer(c)))
            .map(|(_, v)| *v)
            .collect();
        median(&values)
    }
}

/// Try each method of `spec.imputation_chain` once, in declared order.
pub fn impute(key: &PanelKey, spec: &IndicatorSpec, panel: &ImputationPanel<'_>) -> Imputation {
    let mut attempts = 0;
    for &method in &spec.imputation_chain {
        attempts += 1;
        if let Some(value) = panel.value(method, key, spec.lookback_years) {
            return Imputation::Imputed(Observation::imputed(key, &spec.id, value, method));
        }
    }
    Imputation::Exhausted { attempts }
}
