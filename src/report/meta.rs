//! Run diagnostics.
//!
//! `RunTally` is the accumulator each worker owns; tallies are combined with
//! `merge` (plain addition) at the pipeline's reduction point and turned into
//! the immutable `RunMeta` by `finish`. There is no shared mutable state.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{ImputationMethod, PanelKey};

/// Per-source fetch outcomes.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SourceTally {
    pub successes: u64,
    pub failures: u64,
    /// Failure count by `SourceFailure::reason()`.
    pub failure_reasons: BTreeMap<String, u64>,
}

impl SourceTally {
    fn merge(&mut self, other: SourceTally) {
        self.successes += other.successes;
        self.failures += other.failures;
        for (reason, n) in other.failure_reasons {
            *self.failure_reasons.entry(reason).or_default() += n;
        }
    }
}

/// Per-indicator key-state counts plus the realized weight accumulator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndicatorTally {
    pub sourced: u64,
    pub imputed: BTreeMap<ImputationMethod, u64>,
    pub unavailable: u64,
    weight_records: u64,
    weight_sum: f64,
    weight_min: Option<f64>,
    weight_max: Option<f64>,
}

impl IndicatorTally {
    pub fn imputed_total(&self) -> u64 {
        self.imputed.values().sum()
    }

    fn merge(&mut self, other: IndicatorTally) {
        self.sourced += other.sourced;
        for (method, n) in other.imputed {
            *self.imputed.entry(method).or_default() += n;
        }
        self.unavailable += other.unavailable;
        self.weight_records += other.weight_records;
        self.weight_sum += other.weight_sum;
        self.weight_min = min_opt(self.weight_min, other.weight_min);
        self.weight_max = max_opt(self.weight_max, other.weight_max);
    }

    fn record_weight(&mut self, weight: f64) {
        self.weight_records += 1;
        self.weight_sum += weight;
        self.weight_min = min_opt(self.weight_min, Some(weight));
        self.weight_max = max_opt(self.weight_max, Some(weight));
    }
}

fn min_opt(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.min(y)),
        (x, None) => x,
        (None, y) => y,
    }
}

fn max_opt(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.max(y)),
        (x, None) => x,
        (None, y) => y,
    }
}

/// A per-record degradation worth listing individually.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// Every imputation method failed; the key is `Unavailable`.
    ImputationExhausted {
        iso3: String,
        year: i32,
        indicator_id: String,
        attempts: usize,
    },
    /// No indicator available for the country-year; the record was dropped.
    ZeroCoverageRecord { iso3: String, year: i32 },
}

/// Explicit accumulator threaded through (or merged at the end of) the pipeline.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunTally {
    pub sources: BTreeMap<String, SourceTally>,
    pub indicators: BTreeMap<String, IndicatorTally>,
    pub diagnostics: Vec<Diagnostic>,
    pub records_emitted: u64,
}

impl RunTally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn source_success(&mut self, source_id: &str) {
        self.sources.entry(source_id.to_string()).or_default().successes += 1;
    }

    pub fn source_failure(&mut self, source_id: &str, reason: &str) {
        let tally = self.sources.entry(source_id.to_string()).or_default();
        tally.failures += 1;
        *tally.failure_reasons.entry(reason.to_string()).or_default() += 1;
    }

    /// Make sure an indicator appears in the output even if no key touched it.
    pub fn touch_indicator(&mut self, indicator_id: &str) {
        self.indicators.entry(indicator_id.to_string()).or_default();
    }

    pub fn sourced(&mut self, indicator_id: &str) {
        self.indicators.entry(indicator_id.to_string()).or_default().sourced += 1;
    }

    pub fn imputed(&mut self, indicator_id: &str, method: ImputationMethod) {
        let tally = self.indicators.entry(indicator_id.to_string()).or_default();
        *tally.imputed.entry(method).or_default() += 1;
    }

    pub fn imputation_exhausted(&mut self, indicator_id: &str, key: &PanelKey, attempts: usize) {
        self.indicators.entry(indicator_id.to_string()).or_default().unavailable += 1;
        self.diagnostics.push(Diagnostic::ImputationExhausted {
            iso3: key.iso3.clone(),
            year: key.year,
            indicator_id: indicator_id.to_string(),
            attempts,
        });
    }

    pub fn zero_coverage(&mut self, key: &PanelKey) {
        self.diagnostics.push(Diagnostic::ZeroCoverageRecord {
            iso3: key.iso3.clone(),
            year: key.year,
        });
    }

    /// Record one emitted record's effective weights (every catalog indicator, 0 included).
    pub fn record_emitted(&mut self, effective_weights: &BTreeMap<String, f64>) {
        self.records_emitted += 1;
        for (indicator_id, &weight) in effective_weights {
            self.indicators
                .entry(indicator_id.clone())
                .or_default()
                .record_weight(weight);
        }
    }

    pub fn merge(&mut self, other: RunTally) {
        for (id, tally) in other.sources {
            self.sources.entry(id).or_default().merge(tally);
        }
        for (id, tally) in other.indicators {
            self.indicators.entry(id).or_default().merge(tally);
        }
        self.diagnostics.extend(other.diagnostics);
        self.records_emitted += other.records_emitted;
    }

    pub fn imputed_total(&self) -> u64 {
        self.indicators.values().map(IndicatorTally::imputed_total).sum()
    }

    pub fn unavailable_total(&self) -> u64 {
        self.indicators.values().map(|t| t.unavailable).sum()
    }

    pub fn zero_coverage_total(&self) -> u64 {
        self.diagnostics
            .iter()
            .filter(|d| matches!(d, Diagnostic::ZeroCoverageRecord { .. }))
            .count() as u64
    }

    /// Freeze into the exported diagnostics object.
    ///
    /// A tally with dropped records but nothing emitted finishes as `Failed`.
    pub fn finish(mut self, generated_at: DateTime<Utc>) -> RunMeta {
        self.diagnostics.sort();

        let status = if self.records_emitted == 0 && self.zero_coverage_total() > 0 {
            RunStatus::Failed {
                unavailable: self.unavailable_total(),
                dropped_records: self.zero_coverage_total(),
            }
        } else {
            RunStatus::from_counts(
                self.imputed_total(),
                self.unavailable_total(),
                self.zero_coverage_total(),
            )
        };
        let records_dropped = self.zero_coverage_total();

        let indicators = self
            .indicators
            .into_iter()
            .map(|(id, t)| {
                let keys = t.sourced + t.imputed_total() + t.unavailable;
                let coverage_share = if keys == 0 {
                    0.0
                } else {
                    (t.sourced + t.imputed_total()) as f64 / keys as f64
                };
                let realized_weight = WeightSummary {
                    records: t.weight_records,
                    mean: if t.weight_records == 0 {
                        0.0
                    } else {
                        t.weight_sum / t.weight_records as f64
                    },
                    min: t.weight_min.unwrap_or(0.0),
                    max: t.weight_max.unwrap_or(0.0),
                };
                let summary = IndicatorSummary {
                    sourced: t.sourced,
                    imputed: t.imputed_total(),
                    imputed_by_method: t
                        .imputed
                        .iter()
                        .map(|(m, n)| (m.as_str().to_string(), *n))
                        .collect(),
                    unavailable: t.unavailable,
                    coverage_share,
                    realized_weight,
                };
                (id, summary)
            })
            .collect();

        RunMeta {
            generated_at,
            status,
            records_emitted: self.records_emitted,
            records_dropped,
            sources: self.sources,
            indicators,
            diagnostics: self.diagnostics,
        }
    }
}

/// Outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    /// Every key was sourced.
    Complete,
    /// Some keys were imputed or unavailable, or records were dropped.
    Degraded {
        imputed: u64,
        unavailable: u64,
        dropped_records: u64,
    },
    /// Every country-year had zero coverage; no record was emitted.
    Failed { unavailable: u64, dropped_records: u64 },
}

impl RunStatus {
    pub fn from_counts(imputed: u64, unavailable: u64, dropped_records: u64) -> Self {
        if imputed == 0 && unavailable == 0 && dropped_records == 0 {
            RunStatus::Complete
        } else {
            RunStatus::Degraded {
                imputed,
                unavailable,
                dropped_records,
            }
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, RunStatus::Degraded { .. })
    }
}

/// Distribution of an indicator's effective weight over emitted records.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WeightSummary {
    pub records: u64,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndicatorSummary {
    pub sourced: u64,
    pub imputed: u64,
    pub imputed_by_method: BTreeMap<String, u64>,
    pub unavailable: u64,
    /// Share of keys backed by sourced or imputed data.
    pub coverage_share: f64,
    pub realized_weight: WeightSummary,
}

/// Diagnostics of one run, exported next to the record table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunMeta {
    pub generated_at: DateTime<Utc>,
    pub status: RunStatus,
    pub records_emitted: u64,
    pub records_dropped: u64,
    pub sources: BTreeMap<String, SourceTally>,
    pub indicators: BTreeMap<String, IndicatorSummary>,
    pub diagnostics: Vec<Diagnostic>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 6, 0, 0, 0).unwrap()
    }

    #[test]
    fn merge_adds_counts() {
        let mut a = RunTally::new();
        a.source_success("worldbank");
        a.source_failure("worldbank", "missing");
        a.sourced("gdp");

        let mut b = RunTally::new();
        b.source_failure("worldbank", "missing");
        b.source_failure("owid", "disabled");
        b.imputed("gdp", ImputationMethod::RegionalMedian);
        b.imputation_exhausted("gdp", &PanelKey::new("USA", 2023), 2);

        a.merge(b);
        let wb = &a.sources["worldbank"];
        assert_eq!((wb.successes, wb.failures), (1, 2));
        assert_eq!(wb.failure_reasons["missing"], 2);
        assert_eq!(a.sources["owid"].failures, 1);

        let gdp = &a.indicators["gdp"];
        assert_eq!(gdp.sourced, 1);
        assert_eq!(gdp.imputed_total(), 1);
        assert_eq!(gdp.unavailable, 1);
        assert_eq!(a.diagnostics.len(), 1);
    }

    #[test]
    fn finish_summarizes_weights_and_status() {
        let mut t = RunTally::new();
        t.sourced("a");
        t.sourced("a");
        t.imputed("b", ImputationMethod::GlobalMedian);
        t.imputation_exhausted("b", &PanelKey::new("USA", 2023), 3);
        t.zero_coverage(&PanelKey::new("AUT", 2020));

        let w1 = BTreeMap::from([("a".to_string(), 0.25), ("b".to_string(), 0.75)]);
        let w2 = BTreeMap::from([("a".to_string(), 1.0), ("b".to_string(), 0.0)]);
        t.record_emitted(&w1);
        t.record_emitted(&w2);

        let meta = t.finish(ts());
        assert_eq!(meta.records_emitted, 2);
        assert_eq!(meta.records_dropped, 1);
        assert_eq!(
            meta.status,
            RunStatus::Degraded {
                imputed: 1,
                unavailable: 1,
                dropped_records: 1
            }
        );

        let b = &meta.indicators["b"];
        assert_relative_eq!(b.realized_weight.mean, 0.375);
        assert_relative_eq!(b.realized_weight.min, 0.0);
        assert_relative_eq!(b.realized_weight.max, 0.75);
        assert_relative_eq!(b.coverage_share, 0.5);
        assert_eq!(b.imputed_by_method["global_median"], 1);

        // Zero-coverage sorts after imputation-exhausted.
        assert!(matches!(meta.diagnostics[0], Diagnostic::ImputationExhausted { .. }));
        assert!(matches!(meta.diagnostics[1], Diagnostic::ZeroCoverageRecord { .. }));
    }

    #[test]
    fn all_dropped_finishes_failed() {
        let mut t = RunTally::new();
        t.imputation_exhausted("a", &PanelKey::new("USA", 2023), 1);
        t.zero_coverage(&PanelKey::new("USA", 2023));
        let meta = t.finish(ts());
        assert_eq!(
            meta.status,
            RunStatus::Failed {
                unavailable: 1,
                dropped_records: 1
            }
        );
        assert_eq!(meta.diagnostics.len(), 2);
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["status"]["status"], "failed");
    }

    #[test]
    fn clean_run_is_complete() {
        let mut t = RunTally::new();
        t.sourced("a");
        t.record_emitted(&BTreeMap::from([("a".to_string(), 1.0)]));
        let meta = t.finish(ts());
        assert_eq!(meta.status, RunStatus::Complete);
        assert!(!meta.status.is_degraded());
    }
}
