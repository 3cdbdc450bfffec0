//! Export run results.
//!
//! Plain CSV and JSON files written into one output directory:
//!
//! - `records.csv`: one row per country-year (composite, pillars, subscores, effective weights)
//! - `observations.csv`: long-form values with provenance
//! - `coverage.csv`: per country-year availability counts
//! - `indicator_coverage.csv`: per indicator key states, imputation methods, and realized weights
//! - `meta.json`: `RunMeta` diagnostics
//!
//! A run with no record at all still gets its `meta.json` (`write_diagnostics`).

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use tracing::info;

use crate::app::pipeline::RunOutput;
use crate::catalog::Catalog;
use crate::domain::{CountryYearRecord, ImputationMethod, Observation};
use crate::error::{AppError, EXIT_EXPORT};
use crate::report::RunMeta;

pub const RECORDS_FILE: &str = "records.csv";
pub const OBSERVATIONS_FILE: &str = "observations.csv";
pub const COVERAGE_FILE: &str = "coverage.csv";
pub const INDICATOR_COVERAGE_FILE: &str = "indicator_coverage.csv";
pub const META_FILE: &str = "meta.json";

/// Write every export into `dir` (created if missing); returns the written paths.
pub fn write_outputs(dir: &Path, output: &RunOutput, catalog: &Catalog) -> Result<Vec<PathBuf>, AppError> {
    create_dir(dir)?;

    let records = dir.join(RECORDS_FILE);
    let observations = dir.join(OBSERVATIONS_FILE);
    let coverage = dir.join(COVERAGE_FILE);
    let indicator_coverage = dir.join(INDICATOR_COVERAGE_FILE);
    let meta = dir.join(META_FILE);

    write_records_csv(&records, &output.records, catalog)?;
    write_observations_csv(&observations, &output.observations)?;
    write_coverage_csv(&coverage, &output.records, &output.observations, catalog)?;
    write_indicator_coverage_csv(&indicator_coverage, &output.meta)?;
    write_meta_json(&meta, &output.meta)?;

    info!(dir = %dir.display(), records = output.records.len(), "exports written");
    Ok(vec![records, observations, coverage, indicator_coverage, meta])
}

/// Write only `meta.json`, for runs that produced no record.
pub fn write_diagnostics(dir: &Path, meta: &RunMeta) -> Result<PathBuf, AppError> {
    create_dir(dir)?;
    let path = dir.join(META_FILE);
    write_meta_json(&path, meta)?;
    info!(path = %path.display(), "diagnostics written");
    Ok(path)
}

fn create_dir(dir: &Path) -> Result<(), AppError> {
    fs::create_dir_all(dir)
        .map_err(|e| AppError::new(EXIT_EXPORT, format!("Failed to create output dir '{}': {e}", dir.display())))
}

fn csv_writer(path: &Path) -> Result<csv::Writer<File>, AppError> {
    csv::Writer::from_path(path)
        .map_err(|e| AppError::new(EXIT_EXPORT, format!("Failed to create export CSV '{}': {e}", path.display())))
}

fn write_row(writer: &mut csv::Writer<File>, row: Vec<String>, path: &Path) -> Result<(), AppError> {
    writer
        .write_record(&row)
        .map_err(|e| AppError::new(EXIT_EXPORT, format!("Failed to write '{}': {e}", path.display())))
}

fn flush(mut writer: csv::Writer<File>, path: &Path) -> Result<(), AppError> {
    writer
        .flush()
        .map_err(|e| AppError::new(EXIT_EXPORT, format!("Failed to flush '{}': {e}", path.display())))
}

fn fmt_f64(v: f64) -> String {
    format!("{v:.6}")
}

/// Wide record table; indicator and pillar columns follow catalog order.
pub fn write_records_csv(path: &Path, records: &[CountryYearRecord], catalog: &Catalog) -> Result<(), AppError> {
    let pillars: Vec<String> = catalog.pillars().into_iter().collect();
    let ids: Vec<&str> = catalog.indicators().iter().map(|s| s.id.as_str()).collect();

    let mut header = vec!["iso3".to_string(), "year".into(), "composite".into(), "coverage_ratio".into()];
    header.extend(pillars.iter().map(|p| format!("pillar_{p}")));
    header.extend(ids.iter().map(|id| format!("score_{id}")));
    header.extend(ids.iter().map(|id| format!("weight_{id}")));

    let mut writer = csv_writer(path)?;
    write_row(&mut writer, header, path)?;

    for r in records {
        let mut row = vec![
            r.iso3.clone(),
            r.year.to_string(),
            fmt_f64(r.composite),
            fmt_f64(r.coverage_ratio),
        ];
        row.extend(pillars.iter().map(|p| r.pillars.get(p).map(|v| fmt_f64(*v)).unwrap_or_default()));
        row.extend(ids.iter().map(|id| r.subscores.get(*id).map(|v| fmt_f64(*v)).unwrap_or_default()));
        row.extend(ids.iter().map(|id| fmt_f64(r.effective_weights.get(*id).copied().unwrap_or(0.0))));
        write_row(&mut writer, row, path)?;
    }
    flush(writer, path)
}

pub fn write_observations_csv(path: &Path, observations: &[Observation]) -> Result<(), AppError> {
    let mut writer = csv_writer(path)?;
    write_row(
        &mut writer,
        [
            "iso3",
            "year",
            "indicator_id",
            "value",
            "is_imputed",
            "source_id",
            "imputation_method",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect(),
        path,
    )?;

    for o in observations {
        write_row(
            &mut writer,
            vec![
                o.iso3.clone(),
                o.year.to_string(),
                o.indicator_id.clone(),
                fmt_f64(o.raw_value),
                o.is_imputed().to_string(),
                o.source_id().unwrap_or_default().to_string(),
                o.imputation_method().map(|m| m.as_str().to_string()).unwrap_or_default(),
            ],
            path,
        )?;
    }
    flush(writer, path)
}

/// Per-record counts of sourced, imputed, and unavailable indicators.
pub fn write_coverage_csv(
    path: &Path,
    records: &[CountryYearRecord],
    observations: &[Observation],
    catalog: &Catalog,
) -> Result<(), AppError> {
    let mut imputed: BTreeMap<(&str, i32), usize> = BTreeMap::new();
    for o in observations.iter().filter(|o| o.is_imputed()) {
        *imputed.entry((o.iso3.as_str(), o.year)).or_default() += 1;
    }
    let total = catalog.indicators().len();

    let mut writer = csv_writer(path)?;
    write_row(
        &mut writer,
        ["iso3", "year", "sourced", "imputed", "unavailable", "coverage_ratio"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        path,
    )?;
    for r in records {
        let available = r.subscores.len();
        let n_imputed = imputed.get(&(r.iso3.as_str(), r.year)).copied().unwrap_or(0);
        write_row(
            &mut writer,
            vec![
                r.iso3.clone(),
                r.year.to_string(),
                available.saturating_sub(n_imputed).to_string(),
                n_imputed.to_string(),
                total.saturating_sub(available).to_string(),
                fmt_f64(r.coverage_ratio),
            ],
            path,
        )?;
    }
    flush(writer, path)
}

/// One row per catalog indicator, straight from the run diagnostics.
pub fn write_indicator_coverage_csv(path: &Path, meta: &RunMeta) -> Result<(), AppError> {
    let mut header: Vec<String> = ["indicator_id", "sourced", "imputed", "unavailable", "coverage_share"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    header.extend(ImputationMethod::ALL.iter().map(|m| format!("imputed_{m}")));
    header.extend(["mean_weight", "min_weight", "max_weight"].iter().map(|s| s.to_string()));

    let mut writer = csv_writer(path)?;
    write_row(&mut writer, header, path)?;
    for (id, summary) in &meta.indicators {
        let mut row = vec![
            id.clone(),
            summary.sourced.to_string(),
            summary.imputed.to_string(),
            summary.unavailable.to_string(),
            fmt_f64(summary.coverage_share),
        ];
        row.extend(
            ImputationMethod::ALL
                .iter()
                .map(|m| summary.imputed_by_method.get(m.as_str()).copied().unwrap_or(0).to_string()),
        );
        row.extend([
            fmt_f64(summary.realized_weight.mean),
            fmt_f64(summary.realized_weight.min),
            fmt_f64(summary.realized_weight.max),
        ]);
        write_row(&mut writer, row, path)?;
    }
    flush(writer, path)
}

pub fn write_meta_json(path: &Path, meta: &RunMeta) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(EXIT_EXPORT, format!("Failed to create meta JSON '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(file, meta)
        .map_err(|e| AppError::new(EXIT_EXPORT, format!("Failed to write meta JSON '{}': {e}", path.display())))
}
