//! Validation & Patching: import-time invariant checks over a logical
//! file's segment list, plus availability probing of the underlying
//! articles. A file that fails validation is skipped rather than failing
//! the whole import batch.

use std::collections::BTreeSet;

use tracing::warn;

use crate::reader::decrypt::on_wire_size;
use crate::segment::LogicalFile;
use crate::transport::ArticleTransport;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("file has no segments")]
    EmptySegmentList,

    #[error("segment {index} has an empty article_id")]
    EmptyArticleId { index: usize },

    #[error("on-wire size mismatch: segments sum to {actual}, expected {expected}")]
    SizeMismatch { actual: i64, expected: i64 },
}

/// Checks the invariants required before a logical file is accepted into
/// the catalog: a non-empty segment list, every segment carrying a real
/// article id, and the segments' summed usable bytes matching the size
/// implied by the file's plaintext size and encryption.
pub fn check_invariants(file: &LogicalFile) -> Result<(), ValidationError> {
    if file.segments.is_empty() {
        return Err(ValidationError::EmptySegmentList);
    }
    for (index, seg) in file.segments.iter().enumerate() {
        if seg.article_id.is_empty() {
            return Err(ValidationError::EmptyArticleId { index });
        }
    }

    let actual = file.on_wire_size();
    let expected = on_wire_size(file.size, file.encryption);
    if actual != expected {
        return Err(ValidationError::SizeMismatch { actual, expected });
    }
    Ok(())
}

/// Picks which segment indices to probe for a file with `len` segments.
///
/// At 100%, every segment is probed. Below that, the first three and
/// last two segments are always probed (the ends are where a truncated
/// or partially-missing upload shows up first), topped up with an evenly
/// spaced deterministic middle sample until `sample_percentage` of `len`
/// indices have been selected.
pub fn sample_indices(len: usize, sample_percentage: u8) -> Vec<usize> {
    if len == 0 {
        return Vec::new();
    }
    if sample_percentage >= 100 {
        return (0..len).collect();
    }

    let mut chosen = BTreeSet::new();
    for i in 0..len.min(3) {
        chosen.insert(i);
    }
    for i in len.saturating_sub(2)..len {
        chosen.insert(i);
    }

    let target = ((len as f64) * (sample_percentage as f64 / 100.0)).round() as usize;
    if target > chosen.len() {
        let extra = target - chosen.len();
        let step = (len as f64 / (extra + 1) as f64).max(1.0);
        let mut cursor = step;
        while chosen.len() < target && (cursor as usize) < len {
            chosen.insert(cursor as usize);
            cursor += step;
        }
    }

    chosen.into_iter().collect()
}

/// Result of probing a file's sampled segments for availability.
#[derive(Debug, Clone, Default)]
pub struct ValidationOutcome {
    pub missing_articles: Vec<String>,
}

impl ValidationOutcome {
    pub fn is_healthy(&self) -> bool {
        self.missing_articles.is_empty()
    }
}

async fn probe_availability(
    file: &LogicalFile,
    transport: &dyn ArticleTransport,
    sample_percentage: u8,
) -> Vec<String> {
    let mut missing = Vec::new();
    for i in sample_indices(file.segments.len(), sample_percentage) {
        let seg = &file.segments[i];
        if !transport.probe(&seg.article_id).await {
            missing.push(seg.article_id.clone());
        }
    }
    missing
}

/// Runs invariant checks followed by availability probing for one file.
/// Invariant failures are hard errors (the file is malformed); a
/// non-empty `missing_articles` list in the returned outcome means the
/// file is structurally sound but some of its articles aren't reachable.
pub async fn validate_and_probe(
    file: &LogicalFile,
    transport: &dyn ArticleTransport,
    sample_percentage: u8,
) -> Result<ValidationOutcome, ValidationError> {
    check_invariants(file)?;
    let missing = probe_availability(file, transport, sample_percentage).await;
    if !missing.is_empty() {
        warn!(
            count = missing.len(),
            source_ref = %file.source_ref,
            "segments failed availability probe"
        );
    }
    Ok(ValidationOutcome {
        missing_articles: missing,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::{Credentials, EncryptionKind, FileStatus, SegmentDescriptor};
    use crate::transport::ArticleNotFound;
    use async_trait::async_trait;
    use std::collections::HashSet;

    fn file_with_segments(n: usize, seg_size: i64) -> LogicalFile {
        let segments: Vec<SegmentDescriptor> = (0..n)
            .map(|i| SegmentDescriptor::new(format!("art{i}"), 0, seg_size - 1, seg_size).unwrap())
            .collect();
        LogicalFile {
            size: n as i64 * seg_size,
            status: FileStatus::Healthy,
            encryption: EncryptionKind::None,
            credentials: Credentials::default(),
            segments,
            source_ref: "nzb://x".into(),
            modified_at: 0,
            release_date: 0,
        }
    }

    #[test]
    fn rejects_empty_segment_list() {
        let mut file = file_with_segments(1, 10);
        file.segments.clear();
        assert_eq!(check_invariants(&file), Err(ValidationError::EmptySegmentList));
    }

    #[test]
    fn rejects_size_mismatch() {
        let mut file = file_with_segments(2, 10);
        file.size = 15;
        assert!(matches!(
            check_invariants(&file),
            Err(ValidationError::SizeMismatch { .. })
        ));
    }

    #[test]
    fn accepts_well_formed_file() {
        let file = file_with_segments(5, 10);
        assert!(check_invariants(&file).is_ok());
    }

    #[test]
    fn sample_indices_at_full_percentage_covers_everything() {
        assert_eq!(sample_indices(10, 100), (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn sample_indices_always_includes_the_ends() {
        let indices: HashSet<usize> = sample_indices(100, 10).into_iter().collect();
        for i in [0, 1, 2, 98, 99] {
            assert!(indices.contains(&i), "expected {i} to be sampled");
        }
    }

    #[test]
    fn sample_indices_empty_file_is_empty() {
        assert!(sample_indices(0, 50).is_empty());
    }

    struct FakeTransport {
        missing: HashSet<String>,
    }

    #[async_trait]
    impl ArticleTransport for FakeTransport {
        async fn fetch_range(
            &self,
            article_id: &str,
            _relative_start: i64,
            _relative_end: i64,
        ) -> Result<Vec<u8>, ArticleNotFound> {
            if self.missing.contains(article_id) {
                Err(ArticleNotFound {
                    article_id: article_id.to_string(),
                })
            } else {
                Ok(vec![0u8; 1])
            }
        }

        async fn probe(&self, article_id: &str) -> bool {
            !self.missing.contains(article_id)
        }
    }

    #[tokio::test]
    async fn validate_and_probe_reports_missing_articles() {
        let file = file_with_segments(5, 10);
        let mut missing = HashSet::new();
        missing.insert("art2".to_string());
        let transport = FakeTransport { missing };

        let outcome = validate_and_probe(&file, &transport, 100).await.unwrap();
        assert_eq!(outcome.missing_articles, vec!["art2".to_string()]);
        assert!(!outcome.is_healthy());
    }

    #[tokio::test]
    async fn validate_and_probe_reports_healthy_when_all_present() {
        let file = file_with_segments(3, 10);
        let transport = FakeTransport {
            missing: HashSet::new(),
        };
        let outcome = validate_and_probe(&file, &transport, 100).await.unwrap();
        assert!(outcome.is_healthy());
    }
}
