//! Vendor CSV drop files.
//!
//! Licensed or manually curated data (e.g. Global Peace Index scores) is
//! delivered as `iso3,year,value` files into a vendor directory. Header names
//! are matched case-insensitively; bad rows are skipped and reported, never fatal.

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use csv::StringRecord;
use tracing::{info, warn};

use crate::data::{SeriesStore, SeriesTable, SourceAdapter, SourceFailure};

/// A row-level problem encountered while reading a vendor file.
#[derive(Debug, Clone, PartialEq)]
pub struct RowError {
    pub line: usize,
    pub message: String,
}

/// Parsed vendor file: values plus skipped rows.
#[derive(Debug, Clone)]
pub struct VendorFile {
    pub table: SeriesTable,
    pub row_errors: Vec<RowError>,
}

pub struct VendorCsvSource {
    enabled: bool,
    store: SeriesStore,
}

impl VendorCsvSource {
    pub const ID: &'static str = "vendor_csv";

    /// Read every `(indicator_id, file_name)` routed to the vendor source.
    ///
    /// The adapter is disabled when `dir` does not exist.
    pub fn load(dir: &Path, series: &[(String, Option<String>)]) -> Self {
        let enabled = dir.is_dir();
        let mut store = SeriesStore::new();

        if enabled {
            for (indicator_id, file_name) in series {
                let file_name = file_name
                    .clone()
                    .unwrap_or_else(|| format!("{indicator_id}.csv"));
                let loaded = read_vendor_file(&dir.join(&file_name)).map(|file| {
                    if !file.row_errors.is_empty() {
                        warn!(
                            file = %file_name,
                            skipped = file.row_errors.len(),
                            first_line = file.row_errors[0].line,
                            first_error = %file.row_errors[0].message,
                            "skipped malformed vendor rows"
                        );
                    }
                    file.table
                });
                match &loaded {
                    Ok(table) => info!(source = Self::ID, indicator = %indicator_id, values = table.len(), "loaded series"),
                    Err(e) => warn!(source = Self::ID, indicator = %indicator_id, error = %e, "series unavailable"),
                }
                store.insert(indicator_id, loaded);
            }
        } else {
            info!(dir = %dir.display(), "vendor directory not found; vendor source disabled");
        }

        Self { enabled, store }
    }
}

impl SourceAdapter for VendorCsvSource {
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

/// Read one `iso3,year,value` file.
pub fn read_vendor_file(path: &Path) -> Result<VendorFile, SourceFailure> {
    let file = File::open(path).map_err(|e| {
        SourceFailure::Unavailable(format!("failed to open vendor file '{}': {e}", path.display()))
    })?;

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(file);

    let headers = reader
        .headers()
        .map_err(|e| SourceFailure::Malformed(format!("failed to read vendor headers: {e}")))?
        .clone();
    let header_map = build_header_map(&headers);

    for column in ["iso3", "year", "value"] {
        if !header_map.contains_key(column) {
            return Err(SourceFailure::Malformed(format!(
                "vendor file '{}' is missing column `{column}`",
                path.display()
            )));
        }
    }

    let mut table = SeriesTable::new();
    let mut row_errors = Vec::new();

    for (idx, result) in reader.records().enumerate() {
        // +2: header is line 1, records are 1-based
        let line = idx + 2;
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                row_errors.push(RowError {
                    line,
                    message: format!("CSV parse error: {e}"),
                });
                continue;
            }
        };

        match parse_row(&record, &header_map) {
            Ok((iso3, year, value)) => table.insert(&iso3, year, value),
            Err(message) => row_errors.push(RowError { line, message }),
        }
    }

    Ok(VendorFile { table, row_errors })
}

fn parse_row(record: &StringRecord, header_map: &HashMap<String, usize>) -> Result<(String, i32, f64), String> {
    let iso3 = get_required(record, header_map, "iso3")?;
    if iso3.len() != 3 || !iso3.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(format!("invalid iso3 `{iso3}`"));
    }
    let year_raw = get_required(record, header_map, "year")?;
    let year = year_raw
        .parse::<f64>()
        .ok()
        .filter(|y| y.fract() == 0.0)
        .map(|y| y as i32)
        .ok_or_else(|| format!("invalid year `{year_raw}`"))?;
    let value_raw = get_required(record, header_map, "value")?;
    let value = parse_value(value_raw).ok_or_else(|| format!("invalid value `{value_raw}`"))?;
    Ok((iso3.to_ascii_uppercase(), year, value))
}

fn get_required<'a>(
    record: &'a StringRecord,
    header_map: &HashMap<String, usize>,
    column: &str,
) -> Result<&'a str, String> {
    header_map
        .get(column)
        .and_then(|&idx| record.get(idx))
        .filter(|s| !s.is_empty())
        .ok_or_else(|| format!("missing `{column}`"))
}

/// Header name → column index, names lowercased and BOM-stripped.
pub fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_header_name(name), idx))
        .collect()
}

fn normalize_header_name(name: &str) -> String {
    // Spreadsheet exports often prefix the first header with a UTF-8 BOM.
    let name = name.trim().trim_start_matches('\u{feff}');
    name.to_ascii_lowercase()
}

/// Parse a numeric cell; empty, `.`/`NA` placeholders, and non-finite values are `None`.
pub fn parse_value(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "." || trimmed.eq_ignore_ascii_case("na") {
        return None;
    }
    let v = trimmed.parse::<f64>().ok()?;
    if v.is_finite() { Some(v) } else { None }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, contents: &str) {
        let mut f = File::create(dir.join(name)).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
    }

    #[test]
    fn reads_rows_and_reports_bad_ones() {
        let dir = tempfile::tempdir().unwrap();
        write_file(
            dir.path(),
            "gpi.csv",
            "\u{feff}ISO3,Year,Value\nusa,2023,2.45\nBRA,2023,abc\nNG,2023,1.0\nAUT,2022.0,1.3\n",
        );

        let file = read_vendor_file(&dir.path().join("gpi.csv")).unwrap();
        assert_eq!(file.table.get("USA", 2023), Some(2.45));
        assert_eq!(file.table.get("AUT", 2022), Some(1.3));
        assert_eq!(file.table.len(), 2);
        assert_eq!(file.row_errors.len(), 2);
        assert_eq!(file.row_errors[0].line, 3);
    }

    #[test]
    fn missing_column_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "x.csv", "iso3,value\nUSA,1\n");
        let err = read_vendor_file(&dir.path().join("x.csv")).unwrap_err();
        assert!(matches!(err, SourceFailure::Malformed(_)));
    }

    #[test]
    fn source_serves_loaded_files_only() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "gpi.csv", "iso3,year,value\nUSA,2023,2.45\n");

        let source = VendorCsvSource::load(
            dir.path(),
            &[
                ("peace".to_string(), Some("gpi.csv".to_string())),
                ("absent".to_string(), Some("absent.csv".to_string())),
            ],
        );
        assert!(source.is_enabled());
        assert_eq!(source.fetch("peace", "USA", 2023), Ok(2.45));
        assert_eq!(source.fetch("peace", "USA", 2021), Err(SourceFailure::Missing));
        assert!(matches!(
            source.fetch("absent", "USA", 2023),
            Err(SourceFailure::Unavailable(_))
        ));
        assert_eq!(source.fetch("other", "USA", 2023), Err(SourceFailure::NotServed));
    }

    #[test]
    fn missing_directory_disables_source() {
        let source = VendorCsvSource::load(Path::new("/definitely/not/here"), &[]);
        assert!(!source.is_enabled());
        assert_eq!(source.fetch("x", "USA", 2023), Err(SourceFailure::Disabled));
    }

    #[test]
    fn parse_value_placeholders() {
        assert_eq!(parse_value(" 1.5 "), Some(1.5));
        assert_eq!(parse_value("."), None);
        assert_eq!(parse_value("NA"), None);
        assert_eq!(parse_value("inf"), None);
    }
}
