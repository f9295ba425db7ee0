//! Virtual File Reader: per-open-handle state machine tying together the
//! Usenet Range Reader, the Decryption Wrapper, and the catalog's
//! best-effort status updates.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{instrument, warn};

use crate::catalog::MetadataCatalog;
use crate::range_planner;
use crate::reader::decrypt::{DecryptError, DecryptionWrapper, UnderlyingOpener};
use crate::reader::usenet::{UsenetRangeReader, UsenetReadError};
use crate::segment::{FileStatus, LogicalFile, SegmentLoader};
use crate::transport::ArticleTransport;

pub const STREAMING_CHUNK_SIZE: i64 = 8 * 1024 * 1024;
pub const MAX_RANGE_SIZE: i64 = 32 * 1024 * 1024;
pub const SEEK_THRESHOLD: i64 = 1024 * 1024;

/// Knobs controlling window sizing and seek behavior, overridable per
/// deployment (e.g. from a config file) instead of the hardcoded
/// defaults above.
#[derive(Debug, Clone, Copy)]
pub struct ReaderTuning {
    pub streaming_chunk_size: i64,
    pub max_range_size: i64,
    pub seek_threshold: i64,
}

impl Default for ReaderTuning {
    fn default() -> Self {
        Self {
            streaming_chunk_size: STREAMING_CHUNK_SIZE,
            max_range_size: MAX_RANGE_SIZE,
            seek_threshold: SEEK_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Start,
    Current,
    End,
}

impl TryFrom<i32> for Whence {
    type Error = VirtualFileError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Whence::Start),
            1 => Ok(Whence::Current),
            2 => Ok(Whence::End),
            other => Err(VirtualFileError::InvalidWhence(other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReaderState {
    Idle,
    Armed,
    Exhausted,
    Failed,
}

#[derive(thiserror::Error, Debug)]
pub enum VirtualFileError {
    #[error("invalid whence value: {0}")]
    InvalidWhence(i32),

    #[error("seek resulted in a negative position")]
    SeekNegative,

    #[error("seek target exceeds file size")]
    SeekTooFar,

    #[error("negative offset")]
    NegativeOffset,

    #[error("read outside requested range")]
    ReadOutsideRequestedRange,

    #[error("virtual file not initialized")]
    VirtualFileNotInitialized,

    #[error("write not supported on virtual files")]
    WriteNotSupported,

    #[error("truncate not supported")]
    TruncateNotSupported,

    #[error("read_at not supported on virtual files")]
    ReadAtNotSupported,

    #[error("partial content: delivered {bytes_read} of {expected_total} bytes ({cause})")]
    PartialContent {
        bytes_read: u64,
        expected_total: i64,
        cause: String,
    },

    #[error("corrupted file: expected {expected_total} bytes ({cause})")]
    CorruptedFile { expected_total: i64, cause: String },

    #[error("operation cancelled after {bytes_read} bytes")]
    Cancelled { bytes_read: u64 },

    #[error("decryption error: {0}")]
    Decrypt(#[from] DecryptError),
}

enum ArmedReader {
    Plain(UsenetRangeReader),
    Decrypted { buffer: Vec<u8>, pos: usize },
}

/// Fetches a sub-range of a logical file's *encrypted* on-wire stream;
/// the seam the [`DecryptionWrapper`] composes over.
struct LogicalFileOpener {
    file: Arc<LogicalFile>,
    transport: Arc<dyn ArticleTransport>,
    max_download_workers: usize,
    cancel_rx: watch::Receiver<bool>,
}

#[async_trait]
impl UnderlyingOpener for LogicalFileOpener {
    async fn open(
        &self,
        underlying_start: i64,
        underlying_end: i64,
    ) -> Result<UsenetRangeReader, UsenetReadError> {
        let loader = SegmentLoader::new(&self.file.segments);
        let slices = range_planner::plan(underlying_start, underlying_end, &loader);
        Ok(UsenetRangeReader::new(
            slices,
            self.transport.clone(),
            self.max_download_workers,
            self.cancel_rx.clone(),
        ))
    }
}

pub struct VirtualFileReader {
    file: Arc<LogicalFile>,
    transport: Arc<dyn ArticleTransport>,
    decryptor: Option<Arc<DecryptionWrapper>>,
    catalog: Option<Arc<dyn MetadataCatalog>>,
    max_download_workers: usize,
    tuning: ReaderTuning,

    position: i64,
    original_range_end: Option<i64>,
    reader_window: Option<(i64, i64)>,
    reader: Option<ArmedReader>,
    state: ReaderState,
    cancel_tx: watch::Sender<bool>,
}

impl VirtualFileReader {
    /// `requested_range`: `None` for a plain open-ended read from byte 0;
    /// `Some((lo, Some(hi)))` for a bounded HTTP-style range; `Some((lo,
    /// None))` for `bytes=lo-` (open-ended from `lo`).
    pub fn new(
        file: Arc<LogicalFile>,
        transport: Arc<dyn ArticleTransport>,
        decryptor: Option<Arc<DecryptionWrapper>>,
        catalog: Option<Arc<dyn MetadataCatalog>>,
        max_download_workers: usize,
        requested_range: Option<(i64, Option<i64>)>,
        tuning: ReaderTuning,
    ) -> Self {
        let (lo, end) = requested_range.unwrap_or((0, None));
        let size = file.size;
        let lo = lo.clamp(0, (size - 1).max(0));
        let (tx, _rx) = watch::channel(false);

        Self {
            file,
            transport,
            decryptor,
            catalog,
            max_download_workers,
            tuning,
            position: lo,
            original_range_end: end,
            reader_window: None,
            reader: None,
            state: ReaderState::Idle,
            cancel_tx: tx,
        }
    }

    pub fn position(&self) -> i64 {
        self.position
    }

    fn target_end(&self) -> i64 {
        self.original_range_end
            .unwrap_or(self.file.size - 1)
            .min(self.file.size - 1)
    }

    fn compute_window(&self, lo: i64) -> (i64, i64) {
        let size = self.file.size;
        let lo = lo.clamp(0, (size - 1).max(0));
        let hi = match self.original_range_end {
            None => (lo + self.tuning.streaming_chunk_size - 1).min(size - 1),
            Some(re) => {
                let re = re.min(size - 1);
                if re - lo + 1 > self.tuning.max_range_size {
                    lo + self.tuning.max_range_size - 1
                } else {
                    re
                }
            }
        };
        (lo, hi)
    }

    #[instrument(skip(self), fields(path = %self.file.source_ref, lo, hi))]
    async fn arm_window(&mut self, lo: i64, hi: i64) -> Result<(), VirtualFileError> {
        self.reader_window = Some((lo, hi));
        let (tx, rx) = watch::channel(false);
        self.cancel_tx = tx;

        match &self.decryptor {
            None => {
                let loader = SegmentLoader::new(&self.file.segments);
                let slices = range_planner::plan(lo, hi, &loader);
                let reader =
                    UsenetRangeReader::new(slices, self.transport.clone(), self.max_download_workers, rx);
                self.reader = Some(ArmedReader::Plain(reader));
            }
            Some(decryptor) => {
                let opener = LogicalFileOpener {
                    file: self.file.clone(),
                    transport: self.transport.clone(),
                    max_download_workers: self.max_download_workers,
                    cancel_rx: rx,
                };
                match decryptor.open_range(&opener, lo, hi).await {
                    Ok(buffer) => {
                        self.reader = Some(ArmedReader::Decrypted { buffer, pos: 0 });
                    }
                    Err(DecryptError::Underlying(UsenetReadError::ArticleNotFound {
                        bytes_read,
                        ..
                    })) => {
                        return Err(self.escalate(bytes_read, "article-not-found during decrypt".into()));
                    }
                    Err(e) => {
                        self.state = ReaderState::Failed;
                        return Err(VirtualFileError::from(e));
                    }
                }
            }
        }

        self.state = ReaderState::Armed;
        Ok(())
    }

    fn escalate(&mut self, bytes_read: u64, cause: String) -> VirtualFileError {
        self.state = ReaderState::Failed;
        let expected_total = self.file.size;

        let status = if bytes_read > 0 {
            FileStatus::Partial
        } else {
            FileStatus::Corrupted
        };
        self.spawn_status_update(status);

        if bytes_read > 0 {
            VirtualFileError::PartialContent {
                bytes_read,
                expected_total,
                cause,
            }
        } else {
            VirtualFileError::CorruptedFile {
                expected_total,
                cause,
            }
        }
    }

    /// Fire-and-forget: never blocks the read path, failures are ignored.
    fn spawn_status_update(&self, status: FileStatus) {
        if let Some(catalog) = self.catalog.clone() {
            let source_ref = self.file.source_ref.clone();
            tokio::spawn(async move {
                if let Err(err) = catalog.mark_status(&source_ref, status).await {
                    warn!(%err, "best-effort status update failed");
                }
            });
        }
    }

    #[instrument(skip(self, buf), fields(position = self.position))]
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize, VirtualFileError> {
        if buf.is_empty() || self.state == ReaderState::Failed {
            return Ok(0);
        }
        if self.position >= self.file.size || self.position > self.target_end() {
            self.state = ReaderState::Exhausted;
            return Ok(0);
        }

        loop {
            if self.reader.is_none() {
                let (lo, hi) = self.compute_window(self.position);
                self.arm_window(lo, hi).await?;
            }

            match self.reader.as_mut().expect("armed above") {
                ArmedReader::Plain(r) => match r.read(buf).await {
                    Ok(0) => {
                        self.reader = None;
                        if !self.continue_progressively() {
                            return Ok(0);
                        }
                    }
                    Ok(n) => {
                        self.position += n as i64;
                        return Ok(n);
                    }
                    Err(UsenetReadError::ArticleNotFound { bytes_read, .. }) => {
                        self.position += bytes_read as i64;
                        return Err(self.escalate(bytes_read, "article-not-found".into()));
                    }
                    Err(UsenetReadError::Cancelled { bytes_read }) => {
                        self.position += bytes_read as i64;
                        return Err(VirtualFileError::Cancelled { bytes_read });
                    }
                },
                ArmedReader::Decrypted { buffer, pos } => {
                    if *pos >= buffer.len() {
                        self.reader = None;
                        if !self.continue_progressively() {
                            return Ok(0);
                        }
                        continue;
                    }
                    let n = buf.len().min(buffer.len() - *pos);
                    buf[..n].copy_from_slice(&buffer[*pos..*pos + n]);
                    *pos += n;
                    self.position += n as i64;
                    return Ok(n);
                }
            }
        }
    }

    /// Returns `true` if another window was armed to continue the
    /// stream (caller should retry the read), `false` if the handle has
    /// reached the end of its requested range.
    fn continue_progressively(&mut self) -> bool {
        if self.position <= self.target_end() && self.position < self.file.size {
            true
        } else {
            self.state = ReaderState::Exhausted;
            false
        }
    }

    pub fn seek(&mut self, offset: i64, whence: Whence) -> Result<i64, VirtualFileError> {
        let base = match whence {
            Whence::Start => 0,
            Whence::Current => self.position,
            Whence::End => self.file.size,
        };
        let new_pos = base
            .checked_add(offset)
            .ok_or(VirtualFileError::SeekTooFar)?;
        if new_pos < 0 {
            return Err(VirtualFileError::SeekNegative);
        }
        if new_pos > self.file.size {
            return Err(VirtualFileError::SeekTooFar);
        }

        if let Some((lo, hi)) = self.reader_window {
            let within_window = new_pos >= lo && new_pos <= hi + 1;
            let distance = (new_pos - self.position).abs();
            if !within_window || distance > self.tuning.seek_threshold {
                self.reader = None;
                self.reader_window = None;
            }
        }

        self.position = new_pos;
        if self.state != ReaderState::Failed {
            self.state = if self.reader.is_some() {
                ReaderState::Armed
            } else {
                ReaderState::Idle
            };
        }
        Ok(new_pos)
    }

    /// Idempotent: releases any armed reader.
    pub fn close(&mut self) {
        let _ = self.cancel_tx.send(true);
        self.reader = None;
        self.reader_window = None;
    }
}
