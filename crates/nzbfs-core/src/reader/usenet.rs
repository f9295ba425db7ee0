//! Usenet Range Reader: fetches a planned list of article slices with
//! bounded worker concurrency and yields them back in strict planned
//! order, regardless of which worker finishes first.

use futures::stream::{self, StreamExt};
use tokio::sync::watch;
use tracing::{instrument, trace, warn};

use crate::range_planner::PlannedSlice;
use crate::transport::ArticleTransport;

/// Context attached to a [`UsenetReadError`]: which planned slice was
/// being fetched when the failure occurred.
#[derive(Debug, Clone, Default)]
pub struct ReadContext {
    pub article_id: Option<String>,
    pub slice_index: Option<usize>,
}

#[derive(thiserror::Error, Debug)]
pub enum UsenetReadError {
    /// An article could not be obtained from any provider. Carries the
    /// number of bytes already delivered to the consumer on this read,
    /// so the caller can decide between `partial-content` and
    /// `corrupted-file`.
    #[error("article not found while reading {context:?} (delivered {bytes_read} bytes first)")]
    ArticleNotFound {
        context: ReadContext,
        bytes_read: u64,
    },

    #[error("read cancelled after delivering {bytes_read} bytes")]
    Cancelled { bytes_read: u64 },
}

/// A sequential byte stream over a planned list of article slices.
///
/// Internally runs up to `max_download_workers` fetches concurrently
/// (via `futures::stream::buffered`, which preserves input order while
/// polling up to `n` futures at once) and hands completed slice bodies
/// to the consumer strictly in planned order.
pub struct UsenetRangeReader {
    inner: std::pin::Pin<Box<dyn futures::Stream<Item = FetchOutcome> + Send>>,
    cursor: Vec<u8>,
    cursor_pos: usize,
    bytes_read: u64,
    cancel_rx: watch::Receiver<bool>,
    done: bool,
}

struct FetchOutcome {
    article_id: String,
    slice_index: usize,
    result: Result<Vec<u8>, ()>,
}

impl UsenetRangeReader {
    /// Build a reader over `slices`, fetching through `transport` with up
    /// to `max_download_workers` concurrent in-flight requests.
    pub fn new(
        slices: Vec<PlannedSlice>,
        transport: std::sync::Arc<dyn ArticleTransport>,
        max_download_workers: usize,
        cancel_rx: watch::Receiver<bool>,
    ) -> Self {
        let workers = max_download_workers.max(1);
        let futs = slices
            .into_iter()
            .enumerate()
            .map(move |(slice_index, slice)| {
                let transport = transport.clone();
                async move {
                    let result = transport
                        .fetch_range(&slice.article_id, slice.relative_start, slice.relative_end)
                        .await
                        .map_err(|_| ());
                    FetchOutcome {
                        article_id: slice.article_id,
                        slice_index,
                        result,
                    }
                }
            });

        let inner = Box::pin(stream::iter(futs).buffered(workers));

        Self {
            inner,
            cursor: Vec::new(),
            cursor_pos: 0,
            bytes_read: 0,
            cancel_rx,
            done: false,
        }
    }

    /// Number of bytes delivered to the caller so far.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Fill `buf` with up to `buf.len()` bytes, returning the number
    /// actually written. Returns `Ok(0)` at end-of-stream.
    #[instrument(skip(self, buf), fields(bytes_read = self.bytes_read))]
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize, UsenetReadError> {
        let mut written = 0;

        while written < buf.len() {
            if *self.cancel_rx.borrow() {
                return Err(UsenetReadError::Cancelled {
                    bytes_read: self.bytes_read,
                });
            }

            if self.cursor_pos < self.cursor.len() {
                let n = (buf.len() - written).min(self.cursor.len() - self.cursor_pos);
                buf[written..written + n]
                    .copy_from_slice(&self.cursor[self.cursor_pos..self.cursor_pos + n]);
                self.cursor_pos += n;
                written += n;
                self.bytes_read += n as u64;
                continue;
            }

            if self.done {
                break;
            }

            tokio::select! {
                biased;
                _ = self.cancel_rx.changed() => {
                    if *self.cancel_rx.borrow() {
                        return Err(UsenetReadError::Cancelled { bytes_read: self.bytes_read });
                    }
                }
                next = self.inner.next() => {
                    match next {
                        None => {
                            self.done = true;
                        }
                        Some(outcome) => match outcome.result {
                            Ok(bytes) => {
                                trace!(slice_index = outcome.slice_index, len = bytes.len(), "fetched slice");
                                self.cursor = bytes;
                                self.cursor_pos = 0;
                            }
                            Err(()) => {
                                warn!(article_id = %outcome.article_id, "article not found");
                                return Err(UsenetReadError::ArticleNotFound {
                                    context: ReadContext {
                                        article_id: Some(outcome.article_id),
                                        slice_index: Some(outcome.slice_index),
                                    },
                                    bytes_read: self.bytes_read,
                                });
                            }
                        },
                    }
                }
            }
        }

        Ok(written)
    }

    /// Idempotent close: drops the underlying stream, releasing any
    /// still-pending worker futures.
    pub fn close(&mut self) {
        self.done = true;
        self.cursor.clear();
        self.cursor_pos = 0;
    }
}
