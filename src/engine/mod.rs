//! Scoring engine.
//!
//! Per indicator, every key of the panel scope moves through
//!
//! - `resolver`: source priority list, first finite value wins
//! - `imputer`: declared imputation chain for keys no source could fill
//! - `normalizer`: one min-max scale over the indicator's whole panel
//!
//! and then, per country-year, `reweighter` combines the available subscores.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::data::SourceRegistry;
use crate::domain::{IndicatorSpec, KeyState, Observation, PanelKey, PanelScope};
use crate::report::RunTally;

pub mod imputer;
pub mod normalizer;
pub mod resolver;
pub mod reweighter;

pub use imputer::{impute, Imputation, ImputationPanel};
pub use normalizer::{normalize, MinMaxScale};
pub use resolver::{resolve, Resolution};
pub use reweighter::{combine, Combined};

/// Outcome of processing one indicator over the full scope.
#[derive(Debug, Clone)]
pub struct IndicatorPanel {
    pub indicator_id: String,
    /// Terminal state of every scope key, in key order.
    pub states: Vec<(PanelKey, KeyState)>,
    /// Subscores of the available keys.
    pub subscores: BTreeMap<PanelKey, f64>,
    /// Worker-local diagnostics, merged by the caller.
    pub tally: RunTally,
}

impl IndicatorPanel {
    pub fn observations(&self) -> impl Iterator<Item = &Observation> {
        self.states.iter().filter_map(|(_, state)| state.observation())
    }
}

/// Resolve, impute, and normalize one indicator.
pub fn process_indicator(spec: &IndicatorSpec, scope: &PanelScope, sources: &SourceRegistry) -> IndicatorPanel {
    let mut tally = RunTally::new();
    tally.touch_indicator(&spec.id);

    let keys = scope.keys();
    let resolutions: Vec<(PanelKey, Resolution)> = keys
        .into_iter()
        .map(|key| {
            let resolution = resolve(&key, spec, sources, &mut tally);
            (key, resolution)
        })
        .collect();

    let sourced: Vec<Observation> = resolutions
        .iter()
        .filter_map(|(_, r)| match r {
            Resolution::Sourced(obs) => Some(obs.clone()),
            Resolution::Unresolved => None,
        })
        .collect();
    let panel = ImputationPanel::new(scope, &sourced);

    let mut states = Vec::with_capacity(resolutions.len());
    for (key, resolution) in resolutions {
        let state = match resolution {
            Resolution::Sourced(obs) => {
                tally.sourced(&spec.id);
                KeyState::Sourced(obs)
            }
            Resolution::Unresolved => match impute(&key, spec, &panel) {
                Imputation::Imputed(obs) => {
                    if let Some(method) = obs.imputation_method() {
                        tally.imputed(&spec.id, method);
                    }
                    debug!(indicator = %spec.id, iso3 = %key.iso3, year = key.year, value = obs.raw_value, "imputed");
                    KeyState::Imputed(obs)
                }
                Imputation::Exhausted { attempts } => {
                    tally.imputation_exhausted(&spec.id, &key, attempts);
                    KeyState::Unavailable
                }
            },
        };
        states.push((key, state));
    }

    let values: Vec<f64> = states
        .iter()
        .filter_map(|(_, s)| s.observation().map(|o| o.raw_value))
        .collect();
    let scale = normalize(spec, &values);
    if scale.is_none() {
        warn!(indicator = %spec.id, "no sourced or imputed values; indicator unavailable for every key");
    }

    let subscores: BTreeMap<PanelKey, f64> = match &scale {
        Some(scale) => states
            .iter()
            .filter_map(|(key, s)| s.observation().map(|o| (key.clone(), scale.subscore(o.raw_value))))
            .collect(),
        None => BTreeMap::new(),
    };

    IndicatorPanel {
        indicator_id: spec.id.clone(),
        states,
        subscores,
        tally,
    }
}
