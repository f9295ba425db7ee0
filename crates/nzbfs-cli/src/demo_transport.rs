//! Stand-in `ArticleTransport` for demoing the core without a real NNTP
//! connection pool: the wire protocol and provider pool are external
//! collaborators this workspace never implements. Article bodies are
//! read from plain files on disk, one file per `article_id`, rooted at a
//! configured directory — enough to exercise range planning, decryption,
//! and archive slicing end to end against fixtures.

use std::path::PathBuf;

use async_trait::async_trait;
use nzbfs_core::transport::{ArticleNotFound, ArticleTransport};
use tracing::instrument;

pub struct FileSystemDemoTransport {
    root: PathBuf,
}

impl FileSystemDemoTransport {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn article_path(&self, article_id: &str) -> PathBuf {
        self.root.join(article_id)
    }
}

#[async_trait]
impl ArticleTransport for FileSystemDemoTransport {
    #[instrument(level = "debug", skip(self), fields(article_id))]
    async fn fetch_range(
        &self,
        article_id: &str,
        relative_start: i64,
        relative_end: i64,
    ) -> Result<Vec<u8>, ArticleNotFound> {
        let path = self.article_path(article_id);
        let bytes = tokio::fs::read(&path).await.map_err(|_| ArticleNotFound {
            article_id: article_id.to_string(),
        })?;

        let start = relative_start as usize;
        let end = relative_end as usize;
        if end >= bytes.len() {
            return Err(ArticleNotFound {
                article_id: article_id.to_string(),
            });
        }
        Ok(bytes[start..=end].to_vec())
    }

    async fn probe(&self, article_id: &str) -> bool {
        tokio::fs::metadata(self.article_path(article_id)).await.is_ok()
    }
}
