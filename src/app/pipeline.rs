//! Shared scoring pipeline used by the `run` and `demo` commands.
//!
//! Two parallel phases with one reduction point in between:
//!
//! 1) per indicator: resolve -> impute -> normalize (`engine::process_indicator`)
//! 2) per country-year: reweight and build records (`engine::combine`)
//!
//! Worker tallies are merged in catalog/key order afterwards, so parallel
//! execution never changes the output.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use tracing::{info, warn};

use crate::catalog::Catalog;
use crate::data::SourceRegistry;
use crate::domain::{CountryYearRecord, Observation, PanelKey, PanelScope};
use crate::engine::{IndicatorPanel, combine, process_indicator};
use crate::error::PipelineError;
use crate::report::{RunMeta, RunStatus, RunTally};

/// All computed outputs of a single run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    /// Sorted by (iso3, year).
    pub records: Vec<CountryYearRecord>,
    /// Sourced and imputed observations, sorted by (iso3, year, indicator_id).
    pub observations: Vec<Observation>,
    pub meta: RunMeta,
}

impl RunOutput {
    pub fn status(&self) -> RunStatus {
        self.meta.status
    }
}

/// Score every key of `scope`.
///
/// `generated_at` is injected so the run itself is a pure function of its inputs.
pub fn run_panel(
    catalog: &Catalog,
    sources: &SourceRegistry,
    scope: &PanelScope,
    generated_at: DateTime<Utc>,
) -> Result<RunOutput, PipelineError> {
    if scope.is_empty() {
        return Err(PipelineError::EmptyScope {
            countries: scope.countries().len(),
            years: scope.years().len(),
        });
    }

    info!(
        indicators = catalog.indicators().len(),
        countries = scope.countries().len(),
        years = scope.years().len(),
        sources = sources.len(),
        "scoring panel"
    );

    // Phase 1: per indicator.
    let panels: Vec<IndicatorPanel> = catalog
        .indicators()
        .par_iter()
        .map(|spec| process_indicator(spec, scope, sources))
        .collect();

    let mut tally = RunTally::new();
    let mut subscores_by_key: BTreeMap<PanelKey, BTreeMap<String, f64>> = BTreeMap::new();
    let mut observations = Vec::new();
    for panel in panels {
        for (key, subscore) in &panel.subscores {
            subscores_by_key
                .entry(key.clone())
                .or_default()
                .insert(panel.indicator_id.clone(), *subscore);
        }
        observations.extend(panel.observations().cloned());
        tally.merge(panel.tally);
    }
    observations.sort_by(|a, b| {
        (a.iso3.as_str(), a.year, a.indicator_id.as_str()).cmp(&(b.iso3.as_str(), b.year, b.indicator_id.as_str()))
    });

    // Phase 2: per country-year.
    let empty = BTreeMap::new();
    let keys = scope.keys();
    let combined: Vec<(PanelKey, Option<CountryYearRecord>)> = keys
        .into_par_iter()
        .map(|key| {
            let subscores = subscores_by_key.get(&key).unwrap_or(&empty);
            let record = combine(catalog, subscores).map(|c| CountryYearRecord {
                iso3: key.iso3.clone(),
                year: key.year,
                subscores: subscores.clone(),
                composite: c.composite,
                coverage_ratio: c.coverage_ratio,
                effective_weights: c.effective_weights,
                pillars: c.pillars,
            });
            (key, record)
        })
        .collect();

    let mut records = Vec::with_capacity(combined.len());
    for (key, record) in combined {
        match record {
            Some(record) => {
                tally.record_emitted(&record.effective_weights);
                records.push(record);
            }
            None => tally.zero_coverage(&key),
        }
    }

    let meta = tally.finish(generated_at);
    match meta.status {
        RunStatus::Complete => info!(records = records.len(), "run complete"),
        RunStatus::Degraded {
            imputed,
            unavailable,
            dropped_records,
        } => warn!(
            records = records.len(),
            imputed, unavailable, dropped_records, "run degraded"
        ),
        RunStatus::Failed {
            unavailable,
            dropped_records,
        } => warn!(unavailable, dropped_records, "no country-year has any coverage"),
    }

    if records.is_empty() {
        return Err(PipelineError::NoCoverage {
            keys: scope.len(),
            meta: Box::new(meta),
        });
    }

    Ok(RunOutput {
        records,
        observations,
        meta,
    })
}
