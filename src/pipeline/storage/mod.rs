// Table persistence: the storage port plus Parquet and in-memory backends

pub mod in_memory;
pub mod manifest;
pub mod parquet;
pub mod traits;

pub use in_memory::InMemoryTableStore;
pub use manifest::{ManifestOutput, RunManifest};
pub use parquet::ParquetTableStore;
pub use traits::{StoredOutput, TableStore};
