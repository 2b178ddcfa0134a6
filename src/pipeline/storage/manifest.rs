use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

use super::traits::{StoredOutput, TableStore};
use crate::error::Result;

/// One file a stage wrote
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestOutput {
    /// Logical role such as `unified` or `monthly`
    pub role: String,
    pub path: String,
    pub rows: usize,
    pub sha256: String,
}

/// Record of one stage execution and everything it wrote
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub run_id: Uuid,
    pub stage: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub outputs: Vec<ManifestOutput>,
}

impl RunManifest {
    pub fn start(stage: &str) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            stage: stage.to_string(),
            started_at: Utc::now(),
            finished_at: None,
            outputs: Vec::new(),
        }
    }

    pub fn record(&mut self, role: &str, output: StoredOutput) {
        self.outputs.push(ManifestOutput {
            role: role.to_string(),
            path: output.path,
            rows: output.rows,
            sha256: output.sha256,
        });
    }

    pub fn output(&self, role: &str) -> Option<&ManifestOutput> {
        self.outputs.iter().find(|o| o.role == role)
    }

    pub fn path_for(dir: &Path, stage: &str) -> PathBuf {
        dir.join(format!("{}.json", stage))
    }

    /// Stamp the finish time and persist to `<dir>/<stage>.json`
    pub fn finish(mut self, store: &dyn TableStore, dir: &Path) -> Result<Self> {
        self.finished_at = Some(Utc::now());
        let path = Self::path_for(dir, &self.stage);
        let json = serde_json::to_vec_pretty(&self)?;
        store.write_document(&path, &json, self.outputs.len())?;
        debug!("Manifest for {} written to {}", self.stage, path.display());
        Ok(self)
    }

    pub fn load(store: &dyn TableStore, dir: &Path, stage: &str) -> Result<Self> {
        let bytes = store.read_document(&Self::path_for(dir, stage))?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::storage::InMemoryTableStore;

    #[test]
    fn test_finish_and_load() {
        let store = InMemoryTableStore::new();
        let mut manifest = RunManifest::start("aggregate");
        manifest.record(
            "monthly",
            StoredOutput {
                path: "m.parquet".to_string(),
                rows: 2,
                sha256: "ab".repeat(32),
            },
        );
        let written = manifest.finish(&store, Path::new("manifests")).unwrap();
        assert!(written.finished_at.is_some());

        let loaded = RunManifest::load(&store, Path::new("manifests"), "aggregate").unwrap();
        assert_eq!(loaded, written);
        assert_eq!(loaded.output("monthly").unwrap().rows, 2);
        assert!(loaded.output("modeling").is_none());
    }

    #[test]
    fn test_run_ids_are_unique() {
        assert_ne!(RunManifest::start("unify").run_id, RunManifest::start("unify").run_id);
    }
}
