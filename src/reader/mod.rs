//! Data source adapter.
//!
//! The pipeline consumes plain polars `DataFrame`s; this module is the thin
//! wrapper that loads them from CSV files with automatic date parsing, so
//! temporal columns arrive typed rather than as strings. File parsing
//! beyond that is out of scope.

use std::path::Path;

use polars::prelude::*;

use crate::{ClinvizError, Result};

/// Read a CSV file into a DataFrame, parsing date-like columns.
pub fn read_csv(path: &Path) -> Result<DataFrame> {
    CsvReadOptions::default()
        .with_has_header(true)
        .map_parse_options(|opts| opts.with_try_parse_dates(true))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .map_err(|e| ClinvizError::ReaderError(format!("{}: {}", path.display(), e)))?
        .finish()
        .map_err(|e| ClinvizError::ReaderError(format!("{}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{detect_schema, ColumnType};
    use std::io::Write;

    #[test]
    fn test_read_csv_parses_dates() {
        let dir = std::env::temp_dir();
        let path = dir.join("clinviz_reader_test.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "patient_id,date,glucose_level").unwrap();
        writeln!(file, "1,2025-03-13,98.5").unwrap();
        writeln!(file, "2,2025-06-12,104.2").unwrap();
        drop(file);

        let df = read_csv(&path).unwrap();
        let schema = detect_schema(&df);
        assert_eq!(schema.column_type("date"), Some(ColumnType::Temporal));
        assert_eq!(
            schema.column_type("glucose_level"),
            Some(ColumnType::Quantitative)
        );
        assert_eq!(df.height(), 2);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_missing_file_is_reader_error() {
        let err = read_csv(Path::new("/no/such/file.csv")).unwrap_err();
        assert!(matches!(err, ClinvizError::ReaderError(_)));
    }
}
