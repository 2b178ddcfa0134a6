use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

use super::traits::{sha256_hex, StoredOutput, TableStore};
use crate::error::{PipelineError, Result};
use crate::types::{CanonicalPermit, GeoEnrichedPermit, MonthlyAggregate, RawTable, SourceSystem};

#[derive(Debug, Clone)]
enum StoredTable {
    Raw(RawTable),
    Unified(Vec<CanonicalPermit>),
    Enriched(Vec<GeoEnrichedPermit>),
    Aggregates(Vec<MonthlyAggregate>),
    Document(Vec<u8>),
}

/// In-memory table store for development/testing
#[derive(Debug, Clone, Default)]
pub struct InMemoryTableStore {
    tables: Arc<Mutex<HashMap<PathBuf, StoredTable>>>,
}

impl InMemoryTableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a raw feed at `path`
    pub fn insert_raw(&self, path: impl AsRef<Path>, table: RawTable) {
        self.tables()
            .insert(path.as_ref().to_path_buf(), StoredTable::Raw(table));
    }

    pub fn contains(&self, path: impl AsRef<Path>) -> bool {
        self.tables().contains_key(path.as_ref())
    }

    fn tables(&self) -> MutexGuard<'_, HashMap<PathBuf, StoredTable>> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn get(&self, path: &Path) -> Result<StoredTable> {
        self.tables()
            .get(path)
            .cloned()
            .ok_or_else(|| PipelineError::MissingInput(path.display().to_string()))
    }

    fn put(&self, path: &Path, table: StoredTable, bytes: &[u8], rows: usize) -> StoredOutput {
        self.tables().insert(path.to_path_buf(), table);
        debug!("Stored {} rows at {}", rows, path.display());
        StoredOutput {
            path: path.display().to_string(),
            rows,
            sha256: sha256_hex(bytes),
        }
    }
}

fn wrong_kind(path: &Path, expected: &str) -> PipelineError {
    PipelineError::Config(format!("{} does not hold a {} table", path.display(), expected))
}

impl TableStore for InMemoryTableStore {
    fn read_raw(&self, source: SourceSystem, path: &Path, columns: &[&str]) -> Result<RawTable> {
        let StoredTable::Raw(table) = self.get(path)? else {
            return Err(wrong_kind(path, "raw"));
        };

        let mut projected = RawTable::new(path.display().to_string());
        projected.len = table.len;
        for column in columns {
            let values = table.column(column).ok_or_else(|| PipelineError::MissingColumn {
                source_system: source.to_string(),
                column: column.to_string(),
                path: path.display().to_string(),
            })?;
            projected.columns.insert(column.to_string(), values.to_vec());
        }
        Ok(projected)
    }

    fn write_unified(&self, path: &Path, permits: &[CanonicalPermit]) -> Result<StoredOutput> {
        let bytes = serde_json::to_vec(permits)?;
        Ok(self.put(path, StoredTable::Unified(permits.to_vec()), &bytes, permits.len()))
    }

    fn read_unified(&self, path: &Path) -> Result<Vec<CanonicalPermit>> {
        match self.get(path)? {
            StoredTable::Unified(permits) => Ok(permits),
            _ => Err(wrong_kind(path, "unified")),
        }
    }

    fn write_enriched(&self, path: &Path, permits: &[GeoEnrichedPermit]) -> Result<StoredOutput> {
        let bytes = serde_json::to_vec(permits)?;
        Ok(self.put(path, StoredTable::Enriched(permits.to_vec()), &bytes, permits.len()))
    }

    fn read_enriched(&self, path: &Path) -> Result<Vec<GeoEnrichedPermit>> {
        match self.get(path)? {
            StoredTable::Enriched(permits) => Ok(permits),
            _ => Err(wrong_kind(path, "enriched")),
        }
    }

    fn write_aggregates(&self, path: &Path, rows: &[MonthlyAggregate]) -> Result<StoredOutput> {
        let bytes = serde_json::to_vec(rows)?;
        Ok(self.put(path, StoredTable::Aggregates(rows.to_vec()), &bytes, rows.len()))
    }

    fn read_aggregates(&self, path: &Path) -> Result<Vec<MonthlyAggregate>> {
        match self.get(path)? {
            StoredTable::Aggregates(rows) => Ok(rows),
            _ => Err(wrong_kind(path, "aggregate")),
        }
    }

    fn write_document(&self, path: &Path, contents: &[u8], rows: usize) -> Result<StoredOutput> {
        Ok(self.put(path, StoredTable::Document(contents.to_vec()), contents, rows))
    }

    fn read_document(&self, path: &Path) -> Result<Vec<u8>> {
        match self.get(path)? {
            StoredTable::Document(bytes) => Ok(bytes),
            _ => Err(wrong_kind(path, "document")),
        }
    }
}
