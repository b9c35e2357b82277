//! Reading tables from disk.

use polars::prelude::*;
use std::fs::File;
use std::path::Path;
use tracing::{debug, info};

use crate::error::{Result, ResultExt, StatsError};

/// Rows sampled for CSV schema inference.
const INFER_SCHEMA_ROWS: usize = 1000;

/// Supported input formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    Csv,
    Parquet,
}

impl TableFormat {
    /// Detect the format from the file extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match extension.as_str() {
            "csv" | "txt" => Ok(TableFormat::Csv),
            "parquet" | "pq" => Ok(TableFormat::Parquet),
            other => Err(StatsError::TableLoad(format!(
                "unsupported file extension '{other}' for {}",
                path.display()
            ))),
        }
    }
}

/// Load a CSV (header row required) or Parquet file.
pub fn read_table(path: impl AsRef<Path>) -> Result<DataFrame> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(StatsError::TableLoad(format!("file not found: {}", path.display())));
    }

    let format = TableFormat::from_path(path)?;
    debug!(path = %path.display(), ?format, "Reading table");

    let df = match format {
        TableFormat::Csv => CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(INFER_SCHEMA_ROWS))
            .try_into_reader_with_file_path(Some(path.into()))?
            .finish()
            .context(format!("Failed to parse CSV {}", path.display()))?,
        TableFormat::Parquet => {
            let file = File::open(path)?;
            ParquetReader::new(file)
                .finish()
                .context(format!("Failed to parse Parquet {}", path.display()))?
        }
    };

    info!(
        path = %path.display(),
        rows = df.height(),
        columns = df.width(),
        "Loaded table"
    );
    Ok(df)
}

/// Dataset name derived from a file path (its stem).
pub fn dataset_name(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("dataset")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::Builder;

    #[test]
    fn test_read_csv() {
        let mut file = Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "Região,Idade").unwrap();
        writeln!(file, "Norte,30").unwrap();
        writeln!(file, "Sul,").unwrap();

        let df = read_table(file.path()).unwrap();
        assert_eq!(df.shape(), (2, 2));
        assert_eq!(df.column("Idade").unwrap().null_count(), 1);
    }

    #[test]
    fn test_parquet_round_trip() {
        let file = Builder::new().suffix(".parquet").tempfile().unwrap();
        let mut df = df! { "x" => &[1.0, 2.0, 3.0] }.unwrap();
        ParquetWriter::new(File::create(file.path()).unwrap())
            .finish(&mut df)
            .unwrap();

        let loaded = read_table(file.path()).unwrap();
        assert_eq!(loaded.height(), 3);
    }

    #[test]
    fn test_unsupported_extension() {
        let file = Builder::new().suffix(".xlsx").tempfile().unwrap();
        let err = read_table(file.path()).unwrap_err();
        assert_eq!(err.error_code(), "TABLE_LOAD_FAILED");
    }

    #[test]
    fn test_missing_file() {
        let err = read_table("/definitely/not/here.csv").unwrap_err();
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_dataset_name_from_stem() {
        assert_eq!(dataset_name(Path::new("/tmp/sales_2024.csv")), "sales_2024");
    }
}
