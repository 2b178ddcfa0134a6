use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;
use crate::types::{CanonicalPermit, GeoEnrichedPermit, MonthlyAggregate, RawTable, SourceSystem};

/// What a completed write produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredOutput {
    pub path: String,
    pub rows: usize,
    /// Hex SHA-256 of the bytes written
    pub sha256: String,
}

/// Durable home of every table the pipeline reads and writes.
///
/// Writes replace the whole target; a failed write leaves no partial output
/// behind.
pub trait TableStore {
    /// Read a raw feed as text, keeping only `columns`; each must exist
    fn read_raw(&self, source: SourceSystem, path: &Path, columns: &[&str]) -> Result<RawTable>;

    fn write_unified(&self, path: &Path, permits: &[CanonicalPermit]) -> Result<StoredOutput>;
    fn read_unified(&self, path: &Path) -> Result<Vec<CanonicalPermit>>;

    fn write_enriched(&self, path: &Path, permits: &[GeoEnrichedPermit]) -> Result<StoredOutput>;
    fn read_enriched(&self, path: &Path) -> Result<Vec<GeoEnrichedPermit>>;

    fn write_aggregates(&self, path: &Path, rows: &[MonthlyAggregate]) -> Result<StoredOutput>;
    fn read_aggregates(&self, path: &Path) -> Result<Vec<MonthlyAggregate>>;

    /// Store a JSON document such as a report or manifest
    fn write_document(&self, path: &Path, contents: &[u8], rows: usize) -> Result<StoredOutput>;
    fn read_document(&self, path: &Path) -> Result<Vec<u8>>;
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    hex::encode(Sha256::digest(bytes))
}
