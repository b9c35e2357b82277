//! Dataset persistence seam.
//!
//! The engine only needs "given a dataset id, give me its column metadata and
//! its table". [`DatasetStore`] is that interface; [`InMemoryStore`] is the
//! implementation used by the CLI and the tests.

use chrono::Utc;
use parking_lot::RwLock;
use polars::prelude::DataFrame;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

use crate::config::TypeThresholds;
use crate::error::{Result, ResultExt, StatsError};
use crate::profiler::DataProfiler;
use crate::types::{ColumnMeta, DatasetId, DatasetRecord};

/// Storage of dataset records and their tables.
pub trait DatasetStore: Send + Sync {
    /// Metadata of a dataset.
    fn dataset(&self, id: DatasetId) -> Result<DatasetRecord>;

    /// The table with columns named by `col_key`.
    fn load_table(&self, id: DatasetId) -> Result<DataFrame>;

    /// Replace the metadata of one column (matched by `col_key`).
    fn update_column(&self, id: DatasetId, column: ColumnMeta) -> Result<()>;

    fn delete(&self, id: DatasetId) -> Result<()>;
}

#[derive(Debug, Clone)]
struct StoredDataset {
    record: DatasetRecord,
    table: DataFrame,
}

/// Process-local store.
#[derive(Debug)]
pub struct InMemoryStore {
    thresholds: TypeThresholds,
    next_id: AtomicU64,
    datasets: RwLock<BTreeMap<DatasetId, StoredDataset>>,
}

impl InMemoryStore {
    pub fn new(thresholds: TypeThresholds) -> Self {
        Self {
            thresholds,
            next_id: AtomicU64::new(1),
            datasets: RwLock::new(BTreeMap::new()),
        }
    }

    /// Profile a freshly ingested table and store it.
    ///
    /// Columns are classified, given unique keys and renamed to those keys.
    pub fn register(
        &self,
        name: impl Into<String>,
        original_filename: impl Into<String>,
        mut table: DataFrame,
    ) -> Result<DatasetRecord> {
        let columns = DataProfiler::analyze_columns(&table, &self.thresholds)
            .context("Failed to profile columns")?;
        DataProfiler::rename_columns_to_keys(&mut table, &columns)?;

        let id = DatasetId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let record = DatasetRecord {
            id,
            name: name.into(),
            original_filename: original_filename.into(),
            row_count: table.height(),
            col_count: table.width(),
            columns,
            created_at: Utc::now(),
        };

        info!(
            dataset_id = %id,
            name = %record.name,
            rows = record.row_count,
            columns = record.col_count,
            "Registered dataset"
        );

        self.datasets.write().insert(
            id,
            StoredDataset {
                record: record.clone(),
                table,
            },
        );
        Ok(record)
    }

    /// Every stored record, in id order.
    pub fn list(&self) -> Vec<DatasetRecord> {
        self.datasets
            .read()
            .values()
            .map(|d| d.record.clone())
            .collect()
    }

    pub fn thresholds(&self) -> TypeThresholds {
        self.thresholds
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new(TypeThresholds::default())
    }
}

impl DatasetStore for InMemoryStore {
    fn dataset(&self, id: DatasetId) -> Result<DatasetRecord> {
        self.datasets
            .read()
            .get(&id)
            .map(|d| d.record.clone())
            .ok_or(StatsError::DatasetNotFound(id))
    }

    fn load_table(&self, id: DatasetId) -> Result<DataFrame> {
        self.datasets
            .read()
            .get(&id)
            .map(|d| d.table.clone())
            .ok_or(StatsError::DatasetNotFound(id))
    }

    fn update_column(&self, id: DatasetId, column: ColumnMeta) -> Result<()> {
        let mut datasets = self.datasets.write();
        let stored = datasets.get_mut(&id).ok_or(StatsError::DatasetNotFound(id))?;
        let slot = stored
            .record
            .columns
            .iter_mut()
            .find(|c| c.col_key == column.col_key)
            .ok_or_else(|| StatsError::ColumnNotFound(column.col_key.clone()))?;
        *slot = column;
        Ok(())
    }

    fn delete(&self, id: DatasetId) -> Result<()> {
        self.datasets
            .write()
            .remove(&id)
            .map(|_| ())
            .ok_or(StatsError::DatasetNotFound(id))
    }
}
