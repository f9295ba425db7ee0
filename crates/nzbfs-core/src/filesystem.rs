//! Filesystem Surface: routes `open/stat/read/seek/close` to the Virtual
//! File Reader; rejects writes and mutation operations with a
//! not-supported error. Directory listing, remove, and rename are
//! implemented against the Metadata Catalog directly since there is no
//! file content involved.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::catalog::MetadataCatalog;
use crate::error::{ErrorContext, NzbFsError};
use crate::reader::decrypt::DecryptionWrapper;
use crate::reader::virtual_file::{ReaderTuning, VirtualFileReader, Whence};
use crate::segment::EncryptionKind;
use crate::transport::ArticleTransport;

/// Recognized open flags. Any flag implying write intent is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenFlags {
    ReadOnly,
}

#[derive(Debug, Clone)]
pub struct Stat {
    pub size: i64,
    pub modified_at: i64,
    pub is_directory: bool,
}

#[derive(Debug, Clone)]
pub struct DirEntry {
    pub name: String,
    pub is_directory: bool,
}

/// Strips a trailing slash from `path`, except for the root `"/"`.
pub fn normalize_path(path: &str) -> String {
    if path == "/" || path.is_empty() {
        return "/".to_string();
    }
    path.trim_end_matches('/').to_string()
}

#[async_trait]
pub trait FilesystemSurface: Send + Sync {
    async fn open(
        &self,
        path: &str,
        flags: OpenFlags,
        range: Option<(i64, Option<i64>)>,
    ) -> Result<u64, NzbFsError>;

    async fn stat(&self, path: &str) -> Result<Stat, NzbFsError>;

    async fn read(&self, handle: u64, buf: &mut [u8]) -> Result<usize, NzbFsError>;

    async fn seek(&self, handle: u64, offset: i64, whence: i32) -> Result<i64, NzbFsError>;

    async fn close(&self, handle: u64) -> Result<(), NzbFsError>;

    async fn list_dir(&self, path: &str) -> Result<Vec<DirEntry>, NzbFsError>;

    async fn remove(&self, path: &str) -> Result<(), NzbFsError>;

    async fn rename(&self, from: &str, to: &str) -> Result<(), NzbFsError>;

    /// Always rejected: this is a read-only filesystem.
    async fn write(&self, _handle: u64, _buf: &[u8]) -> Result<usize, NzbFsError> {
        Err(NzbFsError::WriteNotSupported("write"))
    }

    async fn truncate(&self, _path: &str, _size: i64) -> Result<(), NzbFsError> {
        Err(NzbFsError::TruncateNotSupported)
    }
}

/// Reference implementation wiring the catalog, transport, and Virtual
/// File Reader together behind an in-memory handle table.
pub struct NzbFilesystem {
    catalog: Arc<dyn MetadataCatalog>,
    transport: Arc<dyn ArticleTransport>,
    max_download_workers: usize,
    tuning: ReaderTuning,
    handles: DashMap<u64, Mutex<VirtualFileReader>>,
    next_handle: AtomicU64,
}

impl NzbFilesystem {
    pub fn new(
        catalog: Arc<dyn MetadataCatalog>,
        transport: Arc<dyn ArticleTransport>,
        max_download_workers: usize,
    ) -> Self {
        Self::with_tuning(catalog, transport, max_download_workers, ReaderTuning::default())
    }

    /// Like [`Self::new`], but with the window-sizing and seek knobs
    /// overridden instead of left at their defaults.
    pub fn with_tuning(
        catalog: Arc<dyn MetadataCatalog>,
        transport: Arc<dyn ArticleTransport>,
        max_download_workers: usize,
        tuning: ReaderTuning,
    ) -> Self {
        Self {
            catalog,
            transport,
            max_download_workers,
            tuning,
            handles: DashMap::new(),
            next_handle: AtomicU64::new(1),
        }
    }

    async fn lookup(&self, path: &str) -> Result<crate::segment::LogicalFile, NzbFsError> {
        let path = normalize_path(path);
        self.catalog
            .get(&path)
            .await
            .map_err(|_| NzbFsError::NoNzbData {
                context: ErrorContext::new().with_path(path.clone()).with_operation("lookup"),
            })?
            .ok_or_else(|| NzbFsError::NoNzbData {
                context: ErrorContext::new().with_path(path).with_operation("lookup"),
            })
    }
}

#[async_trait]
impl FilesystemSurface for NzbFilesystem {
    async fn open(
        &self,
        path: &str,
        flags: OpenFlags,
        range: Option<(i64, Option<i64>)>,
    ) -> Result<u64, NzbFsError> {
        let OpenFlags::ReadOnly = flags;
        let file = self.lookup(path).await?;
        let file = Arc::new(file);

        let decryptor = match file.encryption {
            EncryptionKind::None => None,
            enc => Some(Arc::new(DecryptionWrapper::new(
                enc,
                &file.credentials,
                file.size,
            )?)),
        };

        let reader = VirtualFileReader::new(
            file,
            self.transport.clone(),
            decryptor,
            Some(self.catalog.clone()),
            self.max_download_workers,
            range,
            self.tuning,
        );

        let handle = self.next_handle.fetch_add(1, Ordering::SeqCst);
        self.handles.insert(handle, Mutex::new(reader));
        Ok(handle)
    }

    async fn stat(&self, path: &str) -> Result<Stat, NzbFsError> {
        let file = self.lookup(path).await?;
        Ok(Stat {
            size: file.size,
            modified_at: file.modified_at,
            is_directory: false,
        })
    }

    async fn read(&self, handle: u64, buf: &mut [u8]) -> Result<usize, NzbFsError> {
        let entry = self
            .handles
            .get(&handle)
            .ok_or_else(|| NzbFsError::VirtualFileNotInitialized {
                context: ErrorContext::new().with_operation("read"),
            })?;
        let mut reader = entry.lock().await;
        Ok(reader.read(buf).await?)
    }

    async fn seek(&self, handle: u64, offset: i64, whence: i32) -> Result<i64, NzbFsError> {
        let entry = self
            .handles
            .get(&handle)
            .ok_or_else(|| NzbFsError::VirtualFileNotInitialized {
                context: ErrorContext::new().with_operation("seek"),
            })?;
        let whence = Whence::try_from(whence)?;
        let mut reader = entry.lock().await;
        Ok(reader.seek(offset, whence)?)
    }

    async fn close(&self, handle: u64) -> Result<(), NzbFsError> {
        if let Some((_, entry)) = self.handles.remove(&handle) {
            entry.lock().await.close();
        }
        Ok(())
    }

    async fn list_dir(&self, path: &str) -> Result<Vec<DirEntry>, NzbFsError> {
        let prefix = normalize_path(path);
        let entries = self
            .catalog
            .list_prefix(&prefix)
            .await
            .map_err(|_| NzbFsError::CannotReadDirectory {
                context: ErrorContext::new().with_path(prefix.clone()),
            })?;
        Ok(entries
            .into_iter()
            .map(|name| DirEntry {
                name,
                is_directory: false,
            })
            .collect())
    }

    async fn remove(&self, path: &str) -> Result<(), NzbFsError> {
        let path = normalize_path(path);
        self.catalog
            .remove(&path)
            .await
            .map_err(|_| NzbFsError::CannotReadDirectory {
                context: ErrorContext::new().with_path(path),
            })?;
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), NzbFsError> {
        let from = normalize_path(from);
        let to = normalize_path(to);
        let file = self.lookup(&from).await?;
        self.catalog
            .put(&to, file)
            .await
            .map_err(|_| NzbFsError::CannotReadDirectory {
                context: ErrorContext::new().with_path(to),
            })?;
        self.catalog.remove(&from).await.ok();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_trailing_slash_except_root() {
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path("/foo/"), "/foo");
        assert_eq!(normalize_path("/foo/bar/"), "/foo/bar");
        assert_eq!(normalize_path("/foo"), "/foo");
        assert_eq!(normalize_path(""), "/");
    }
}
