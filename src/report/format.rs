//! Formatted terminal output for `run` and `demo`.

use crate::domain::{CountryYearRecord, PanelScope};
use crate::report::{RunMeta, RunStatus};

/// Format the run summary (scope, status, per-source and per-indicator diagnostics).
pub fn format_run_summary(meta: &RunMeta, scope: &PanelScope) -> String {
    let mut out = String::new();

    out.push_str("=== crisk - Country Risk Composite ===\n");
    out.push_str(&format!("Generated: {}\n", meta.generated_at.format("%Y-%m-%d %H:%M:%S UTC")));
    out.push_str(&format!(
        "Scope: {} countries | years {}-{} | {} keys\n",
        scope.countries().len(),
        scope.years().start,
        scope.years().end,
        scope.len(),
    ));
    out.push_str(&format!(
        "Records: {} emitted | {} dropped (zero coverage)\n",
        meta.records_emitted, meta.records_dropped
    ));
    out.push_str(&format!("Status: {}\n", format_status(&meta.status)));

    out.push_str("\nSources:\n");
    out.push_str(
        format!("{:<12} {:>10} {:>10} {:<24}", "source", "hits", "misses", "top miss reason").trim_end(),
    );
    out.push('\n');
    for (id, tally) in &meta.sources {
        let top_reason = tally
            .failure_reasons
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(reason, n)| format!("{reason} ({n})"))
            .unwrap_or_default();
        out.push_str(
            format!(
                "{:<12} {:>10} {:>10} {:<24}",
                truncate(id, 12),
                tally.successes,
                tally.failures,
                top_reason
            )
            .trim_end(),
        );
        out.push('\n');
    }

    out.push_str("\nIndicators:\n");
    out.push_str(
        format!(
            "{:<20} {:>8} {:>8} {:>8} {:>9} {:>9}",
            "indicator", "sourced", "imputed", "unavail", "coverage", "mean_wt"
        )
        .trim_end(),
    );
    out.push('\n');
    for (id, summary) in &meta.indicators {
        out.push_str(
            format!(
                "{:<20} {:>8} {:>8} {:>8} {:>8.1}% {:>9.4}",
                truncate(id, 20),
                summary.sourced,
                summary.imputed,
                summary.unavailable,
                summary.coverage_share * 100.0,
                summary.realized_weight.mean,
            )
            .trim_end(),
        );
        out.push('\n');
    }

    if !meta.diagnostics.is_empty() {
        out.push_str(&format!("\nDiagnostics: {} (see meta.json)\n", meta.diagnostics.len()));
    }

    out
}

fn format_status(status: &RunStatus) -> String {
    match status {
        RunStatus::Complete => "complete".to_string(),
        RunStatus::Degraded {
            imputed,
            unavailable,
            dropped_records,
        } => format!("degraded (imputed={imputed}, unavailable={unavailable}, dropped={dropped_records})"),
        RunStatus::Failed {
            unavailable,
            dropped_records,
        } => format!("failed (unavailable={unavailable}, dropped={dropped_records})"),
    }
}

/// Highest-risk records of the latest year present.
pub fn format_top_records(records: &[CountryYearRecord], top_n: usize) -> String {
    let Some(year) = records.iter().map(|r| r.year).max() else {
        return "No records.\n".to_string();
    };

    let mut rows: Vec<&CountryYearRecord> = records.iter().filter(|r| r.year == year).collect();
    rows.sort_by(|a, b| {
        b.composite
            .total_cmp(&a.composite)
            .then_with(|| a.iso3.cmp(&b.iso3))
    });
    rows.truncate(top_n);

    let mut out = String::new();
    out.push_str(&format!("Highest risk ({year}):\n"));
    out.push_str(format!("{:<6} {:>10} {:>10}", "iso3", "composite", "coverage").trim_end());
    out.push('\n');
    out.push_str(format!("{:-<6} {:-<10} {:-<10}", "", "", "").trim_end());
    out.push('\n');
    for r in rows {
        out.push_str(
            format!("{:<6} {:>10.2} {:>9.1}%", r.iso3, r.composite, r.coverage_ratio * 100.0).trim_end(),
        );
        out.push('\n');
    }
    out
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('.');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use chrono::{TimeZone, Utc};

    use crate::data::fallback_countries;
    use crate::domain::{ImputationMethod, PanelKey, YearRange};
    use crate::report::RunTally;

    fn record(iso3: &str, year: i32, composite: f64) -> CountryYearRecord {
        CountryYearRecord {
            iso3: iso3.into(),
            year,
            subscores: BTreeMap::new(),
            composite,
            coverage_ratio: 1.0,
            effective_weights: BTreeMap::new(),
            pillars: BTreeMap::new(),
        }
    }

    #[test]
    fn summary_lists_sources_indicators_and_status() {
        let mut tally = RunTally::new();
        tally.source_success("worldbank");
        tally.source_failure("worldbank", "missing");
        tally.source_failure("owid", "disabled");
        tally.sourced("conflict");
        tally.imputed("conflict", ImputationMethod::CarryForward);
        tally.imputation_exhausted("conflict", &PanelKey::new("USA", 2023), 1);
        tally.record_emitted(&BTreeMap::from([("conflict".to_string(), 1.0)]));
        let meta = tally.finish(Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap());

        let scope = PanelScope::new(fallback_countries(), YearRange::new(2020, 2023));
        let text = format_run_summary(&meta, &scope);
        assert!(text.contains("Generated: 2025-03-01 12:00:00 UTC"));
        assert!(text.contains("degraded (imputed=1, unavailable=1, dropped=0)"));
        assert!(text.contains("owid"));
        assert!(text.contains("disabled (1)"));
        assert!(text.contains("conflict"));
        assert!(text.contains("Diagnostics: 1"));
    }

    #[test]
    fn top_records_use_latest_year_descending() {
        let records = vec![
            record("AAA", 2022, 99.0),
            record("BBB", 2023, 40.0),
            record("CCC", 2023, 70.0),
            record("DDD", 2023, 10.0),
        ];
        let text = format_top_records(&records, 2);
        assert!(text.starts_with("Highest risk (2023):"));
        let ccc = text.find("CCC").unwrap();
        let bbb = text.find("BBB").unwrap();
        assert!(ccc < bbb);
        assert!(!text.contains("AAA"));
        assert!(!text.contains("DDD"));
    }

    #[test]
    fn truncate_marks_cut() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a_very_long_indicator", 8), "a_very_.");
    }
}
