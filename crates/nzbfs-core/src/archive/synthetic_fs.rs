//! Synthetic read-only filesystem over NNTP: gives the archive listing
//! library byte-range access to the normalized part files, with bytes
//! sourced from the Usenet Range Reader and an optional bounded
//! decoded-body cache.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::watch;

use crate::range_planner;
use crate::reader::usenet::UsenetRangeReader;
use crate::segment::{LogicalFile, SegmentLoader};
use crate::transport::ArticleTransport;

#[derive(thiserror::Error, Debug)]
pub enum SyntheticFsError {
    #[error("unknown part file: {0}")]
    UnknownPart(String),

    #[error("read failed: {0}")]
    Read(#[from] crate::reader::usenet::UsenetReadError),
}

/// A read-only view over a set of normalized archive part files.
pub struct SyntheticArchiveFs {
    parts: HashMap<String, Arc<LogicalFile>>,
    transport: Arc<dyn ArticleTransport>,
    max_download_workers: usize,
    cache: Option<moka::sync::Cache<(String, i64, i64), Arc<Vec<u8>>>>,
}

impl SyntheticArchiveFs {
    /// `cache_capacity_mib`: `None` disables the decoded-body cache.
    pub fn new(
        parts: HashMap<String, Arc<LogicalFile>>,
        transport: Arc<dyn ArticleTransport>,
        max_download_workers: usize,
        cache_capacity_mib: Option<u64>,
    ) -> Self {
        let cache = cache_capacity_mib.map(|mib| {
            moka::sync::Cache::builder()
                .max_capacity(mib * 1024 * 1024)
                .weigher(|_key: &(String, i64, i64), value: &Arc<Vec<u8>>| value.len() as u32)
                .build()
        });

        Self {
            parts,
            transport,
            max_download_workers,
            cache,
        }
    }

    pub fn file_size(&self, part_name: &str) -> Option<i64> {
        self.parts.get(part_name).map(|f| f.size)
    }

    pub fn part_names(&self) -> impl Iterator<Item = &str> {
        self.parts.keys().map(String::as_str)
    }

    /// Reads `len` bytes of `part_name` starting at `offset`.
    pub async fn read_range(
        &self,
        part_name: &str,
        offset: i64,
        len: i64,
    ) -> Result<Vec<u8>, SyntheticFsError> {
        if len == 0 {
            return Ok(Vec::new());
        }

        let key = (part_name.to_string(), offset, len);
        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get(&key) {
                return Ok((*hit).clone());
            }
        }

        let file = self
            .parts
            .get(part_name)
            .ok_or_else(|| SyntheticFsError::UnknownPart(part_name.to_string()))?;

        let loader = SegmentLoader::new(&file.segments);
        let slices = range_planner::plan(offset, offset + len - 1, &loader);
        let (_tx, rx) = watch::channel(false);
        let mut reader =
            UsenetRangeReader::new(slices, self.transport.clone(), self.max_download_workers, rx);

        let mut buf = vec![0u8; len as usize];
        let mut filled = 0;
        while filled < buf.len() {
            let n = reader.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        buf.truncate(filled);

        if let Some(cache) = &self.cache {
            cache.insert(key, Arc::new(buf.clone()));
        }
        Ok(buf)
    }
}
