//! Metadata Catalog: persistence of logical file records is an external
//! collaborator. This module defines the trait the rest of the crate
//! depends on, plus an in-memory reference implementation (DashMap-backed)
//! used by tests and as a default for small deployments, and a
//! JSON-file-backed implementation for single-node deployments that want
//! the catalog to survive a restart without standing up a database.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::segment::{FileStatus, LogicalFile};

#[derive(thiserror::Error, Debug)]
pub enum CatalogError {
    #[error("no record for {0}")]
    NotFound(String),

    #[error("catalog backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait MetadataCatalog: Send + Sync {
    async fn get(&self, source_ref: &str) -> Result<Option<LogicalFile>, CatalogError>;

    /// Write a record for `source_ref`: skip silently if an identical
    /// healthy record already exists; replace if a non-healthy record
    /// exists.
    async fn put(&self, source_ref: &str, file: LogicalFile) -> Result<(), CatalogError>;

    async fn mark_status(&self, source_ref: &str, status: FileStatus) -> Result<(), CatalogError>;

    async fn remove(&self, source_ref: &str) -> Result<(), CatalogError>;

    /// Peripheral: lists all source refs under `prefix`, for directory
    /// enumeration by the filesystem surface.
    async fn list_prefix(&self, prefix: &str) -> Result<Vec<String>, CatalogError>;
}

/// In-memory catalog. Not persisted; suitable for tests and as a
/// starting point wired up to a real store (sqlite, etc.) later.
#[derive(Default)]
pub struct InMemoryCatalog {
    records: DashMap<String, LogicalFile>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetadataCatalog for InMemoryCatalog {
    async fn get(&self, source_ref: &str) -> Result<Option<LogicalFile>, CatalogError> {
        Ok(self.records.get(source_ref).map(|r| r.clone()))
    }

    async fn put(&self, source_ref: &str, file: LogicalFile) -> Result<(), CatalogError> {
        if let Some(existing) = self.records.get(source_ref) {
            if existing.status == FileStatus::Healthy {
                return Ok(());
            }
        }
        self.records.insert(source_ref.to_string(), file);
        Ok(())
    }

    async fn mark_status(&self, source_ref: &str, status: FileStatus) -> Result<(), CatalogError> {
        match self.records.get_mut(source_ref) {
            Some(mut entry) => {
                entry.status = status;
                Ok(())
            }
            None => Err(CatalogError::NotFound(source_ref.to_string())),
        }
    }

    async fn remove(&self, source_ref: &str) -> Result<(), CatalogError> {
        self.records.remove(source_ref);
        Ok(())
    }

    async fn list_prefix(&self, prefix: &str) -> Result<Vec<String>, CatalogError> {
        Ok(self
            .records
            .iter()
            .map(|r| r.key().clone())
            .filter(|k| k.starts_with(prefix))
            .collect())
    }
}

/// JSON-file-backed catalog: the whole record set lives in memory behind
/// a DashMap (same access pattern as [`InMemoryCatalog`]) and is
/// flushed to a single JSON document on every mutation.
///
/// Concurrent mutations serialize on an internal write lock so two
/// overlapping `put`s can't interleave their flushes; reads go straight
/// to the DashMap.
pub struct JsonFileCatalog {
    path: PathBuf,
    records: DashMap<String, LogicalFile>,
    write_lock: Mutex<()>,
}

impl JsonFileCatalog {
    /// Loads an existing catalog file, or starts empty if `path` doesn't
    /// exist yet.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, CatalogError> {
        let path = path.into();
        let records = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<HashMap<String, LogicalFile>>(&bytes)
                .map_err(|e| CatalogError::Backend(format!("malformed catalog file {}: {e}", path.display())))?
                .into_iter()
                .collect(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => DashMap::new(),
            Err(e) => {
                return Err(CatalogError::Backend(format!(
                    "failed to read catalog file {}: {e}",
                    path.display()
                )))
            }
        };
        Ok(Self {
            path,
            records,
            write_lock: Mutex::new(()),
        })
    }

    /// Serializes the full record set and writes it atomically via a
    /// same-directory temp file followed by a rename, so a crash mid-write
    /// can never leave a truncated catalog behind.
    async fn flush(&self) -> Result<(), CatalogError> {
        let snapshot: HashMap<String, LogicalFile> =
            self.records.iter().map(|r| (r.key().clone(), r.value().clone())).collect();
        let bytes = serde_json::to_vec_pretty(&snapshot)
            .map_err(|e| CatalogError::Backend(format!("failed to serialize catalog: {e}")))?;

        let tmp_path = tmp_path_for(&self.path);
        tokio::fs::write(&tmp_path, &bytes)
            .await
            .map_err(|e| CatalogError::Backend(format!("failed to write {}: {e}", tmp_path.display())))?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| CatalogError::Backend(format!("failed to replace {}: {e}", self.path.display())))?;
        Ok(())
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

#[async_trait]
impl MetadataCatalog for JsonFileCatalog {
    async fn get(&self, source_ref: &str) -> Result<Option<LogicalFile>, CatalogError> {
        Ok(self.records.get(source_ref).map(|r| r.clone()))
    }

    async fn put(&self, source_ref: &str, file: LogicalFile) -> Result<(), CatalogError> {
        let _guard = self.write_lock.lock().await;
        if let Some(existing) = self.records.get(source_ref) {
            if existing.status == FileStatus::Healthy {
                return Ok(());
            }
        }
        self.records.insert(source_ref.to_string(), file);
        self.flush().await
    }

    async fn mark_status(&self, source_ref: &str, status: FileStatus) -> Result<(), CatalogError> {
        let _guard = self.write_lock.lock().await;
        match self.records.get_mut(source_ref) {
            Some(mut entry) => {
                entry.status = status;
            }
            None => return Err(CatalogError::NotFound(source_ref.to_string())),
        }
        self.flush().await
    }

    async fn remove(&self, source_ref: &str) -> Result<(), CatalogError> {
        let _guard = self.write_lock.lock().await;
        self.records.remove(source_ref);
        self.flush().await
    }

    async fn list_prefix(&self, prefix: &str) -> Result<Vec<String>, CatalogError> {
        Ok(self
            .records
            .iter()
            .map(|r| r.key().clone())
            .filter(|k| k.starts_with(prefix))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::{Credentials, EncryptionKind, SegmentDescriptor};

    fn sample_file() -> LogicalFile {
        LogicalFile {
            size: 10,
            status: FileStatus::Healthy,
            encryption: EncryptionKind::None,
            credentials: Credentials::default(),
            segments: vec![SegmentDescriptor::new("a", 0, 9, 10).unwrap()],
            source_ref: "nzb://example".into(),
            modified_at: 0,
            release_date: 0,
        }
    }

    #[tokio::test]
    async fn put_then_get_roundtrips() {
        let cat = InMemoryCatalog::new();
        cat.put("f1", sample_file()).await.unwrap();
        let got = cat.get("f1").await.unwrap().unwrap();
        assert_eq!(got.size, 10);
    }

    #[tokio::test]
    async fn put_skips_when_existing_is_healthy() {
        let cat = InMemoryCatalog::new();
        cat.put("f1", sample_file()).await.unwrap();
        let mut replacement = sample_file();
        replacement.size = 999;
        cat.put("f1", replacement).await.unwrap();
        assert_eq!(cat.get("f1").await.unwrap().unwrap().size, 10);
    }

    #[tokio::test]
    async fn put_replaces_when_existing_is_not_healthy() {
        let cat = InMemoryCatalog::new();
        let mut partial = sample_file();
        partial.status = FileStatus::Partial;
        cat.put("f1", partial).await.unwrap();

        let mut replacement = sample_file();
        replacement.size = 999;
        cat.put("f1", replacement).await.unwrap();
        assert_eq!(cat.get("f1").await.unwrap().unwrap().size, 999);
    }

    #[tokio::test]
    async fn mark_status_updates_in_place() {
        let cat = InMemoryCatalog::new();
        cat.put("f1", sample_file()).await.unwrap();
        cat.mark_status("f1", FileStatus::Corrupted).await.unwrap();
        assert_eq!(cat.get("f1").await.unwrap().unwrap().status, FileStatus::Corrupted);
    }

    #[tokio::test]
    async fn mark_status_missing_record_errors() {
        let cat = InMemoryCatalog::new();
        assert!(cat.mark_status("nope", FileStatus::Corrupted).await.is_err());
    }

    #[tokio::test]
    async fn json_catalog_loads_empty_when_file_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let cat = JsonFileCatalog::load(dir.path().join("catalog.json")).await.unwrap();
        assert!(cat.get("f1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn json_catalog_survives_a_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");

        let cat = JsonFileCatalog::load(&path).await.unwrap();
        let mut file = sample_file();
        file.release_date = 1_700_000_000;
        cat.put("f1", file).await.unwrap();

        let reloaded = JsonFileCatalog::load(&path).await.unwrap();
        let got = reloaded.get("f1").await.unwrap().unwrap();
        assert_eq!(got.size, 10);
        assert_eq!(got.release_date, 1_700_000_000);
    }

    #[tokio::test]
    async fn json_catalog_skip_and_replace_rules_match_in_memory_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let cat = JsonFileCatalog::load(dir.path().join("catalog.json")).await.unwrap();

        cat.put("f1", sample_file()).await.unwrap();
        let mut replacement = sample_file();
        replacement.size = 999;
        cat.put("f1", replacement.clone()).await.unwrap();
        assert_eq!(cat.get("f1").await.unwrap().unwrap().size, 10);

        cat.mark_status("f1", FileStatus::Corrupted).await.unwrap();
        cat.put("f1", replacement).await.unwrap();
        assert_eq!(cat.get("f1").await.unwrap().unwrap().size, 999);
    }

    #[tokio::test]
    async fn json_catalog_remove_and_list_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let cat = JsonFileCatalog::load(dir.path().join("catalog.json")).await.unwrap();

        cat.put("/dir/a", sample_file()).await.unwrap();
        cat.put("/dir/b", sample_file()).await.unwrap();
        cat.put("/other", sample_file()).await.unwrap();

        let mut listed = cat.list_prefix("/dir/").await.unwrap();
        listed.sort();
        assert_eq!(listed, vec!["/dir/a".to_string(), "/dir/b".to_string()]);

        cat.remove("/dir/a").await.unwrap();
        assert!(cat.get("/dir/a").await.unwrap().is_none());
    }
}
