//! The NNTP connection pool and wire protocol are external collaborators.
//! This module defines the narrow trait the rest of the crate needs from
//! them: fetch a byte range of one article's decoded (yEnc-decoded) body.
//!
//! A concrete implementation would wrap a pooled NNTP client (e.g. built
//! on a crate like `rek2_nntp` for the wire protocol and `yenc` for body
//! decoding) and handle retries/provider failover internally — by the
//! time an error crosses this trait boundary it is terminal.

use async_trait::async_trait;

/// Raised when an article could not be obtained from any configured
/// provider after the transport's own retry/failover policy is exhausted.
/// Transient per-article errors never reach this trait; they are retried
/// inside the transport implementation.
#[derive(thiserror::Error, Debug, Clone)]
#[error("article not found: {article_id}")]
pub struct ArticleNotFound {
    pub article_id: String,
}

/// Fetches byte ranges of NNTP article bodies.
///
/// Implementations are expected to be cheaply cloneable handles onto a
/// process-wide, pooled connection set, mutated only by its owner.
#[async_trait]
pub trait ArticleTransport: Send + Sync {
    /// Fetch decoded bytes `[relative_start, relative_end]` (inclusive)
    /// of the article identified by `article_id`.
    async fn fetch_range(
        &self,
        article_id: &str,
        relative_start: i64,
        relative_end: i64,
    ) -> Result<Vec<u8>, ArticleNotFound>;

    /// Probe whether an article exists at all, without downloading its
    /// full body. Used by import-time validation.
    async fn probe(&self, article_id: &str) -> bool;
}
