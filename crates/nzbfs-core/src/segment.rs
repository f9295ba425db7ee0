//! Segment descriptors, the logical file record, and the Segment Loader.
//!
//! A [`SegmentDescriptor`] is a slice of an NNTP article's decoded body;
//! a [`LogicalFile`] is an ordered sequence of those slices plus the
//! metadata needed to decrypt and size them. The [`SegmentLoader`] is a
//! pure, allocation-free index over that sequence — no I/O happens here.

use std::fmt;

use secrecy::SecretString;

/// One slice of an NNTP article's decoded body used as a byte-index unit.
///
/// `usable_bytes = end_offset - start_offset + 1`. The usable window may
/// be a strict subset of the article's full decoded body: for
/// archive-derived files, `start_offset`/`end_offset` are trimmed to
/// exactly the bytes the inner file occupies within that article.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SegmentDescriptor {
    /// Opaque identifier for the NNTP article this segment slices.
    /// Retrieval of the article body is the transport's concern.
    pub article_id: String,
    pub start_offset: i64,
    pub end_offset: i64,
    /// Total decoded size of the underlying article body.
    pub segment_size: i64,
}

/// Error constructing a [`SegmentDescriptor`] that violates its invariants.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SegmentError {
    #[error("empty article_id")]
    EmptyArticleId,
    #[error(
        "invalid segment bounds: start_offset={start_offset} end_offset={end_offset} segment_size={segment_size}"
    )]
    InvalidBounds {
        start_offset: i64,
        end_offset: i64,
        segment_size: i64,
    },
}

impl SegmentDescriptor {
    /// Construct a segment descriptor, validating `0 <= start_offset <=
    /// end_offset < segment_size` and a non-empty `article_id`.
    pub fn new(
        article_id: impl Into<String>,
        start_offset: i64,
        end_offset: i64,
        segment_size: i64,
    ) -> Result<Self, SegmentError> {
        let article_id = article_id.into();
        if article_id.is_empty() {
            return Err(SegmentError::EmptyArticleId);
        }
        if !(0 <= start_offset && start_offset <= end_offset && end_offset < segment_size) {
            return Err(SegmentError::InvalidBounds {
                start_offset,
                end_offset,
                segment_size,
            });
        }
        Ok(Self {
            article_id,
            start_offset,
            end_offset,
            segment_size,
        })
    }

    /// `end_offset - start_offset + 1`.
    #[inline]
    pub fn usable_bytes(&self) -> i64 {
        self.end_offset - self.start_offset + 1
    }
}

/// Health of a logical file as tracked by the metadata catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Healthy,
    Partial,
    Corrupted,
}

/// Encryption applied to a logical file's on-wire bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncryptionKind {
    None,
    Rclone,
    Aes,
}

/// Decryption key material for a logical file.
///
/// `password`/`salt` are used for rclone-crypt; `aes_key`/`aes_iv` for
/// AES-CBC. `password` is wrapped in [`SecretString`] so it is redacted
/// from `Debug`/logs by construction.
#[derive(Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct Credentials {
    pub password: Option<SecretString>,
    pub salt: Option<String>,
    pub aes_key: Option<Vec<u8>>,
    pub aes_iv: Option<[u8; 16]>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("salt", &self.salt.as_ref().map(|_| "<redacted>"))
            .field("aes_key", &self.aes_key.as_ref().map(|k| k.len()))
            .field("aes_iv", &self.aes_iv.is_some())
            .finish()
    }
}

/// A file whose bytes live as a sequence of NNTP articles.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct LogicalFile {
    pub size: i64,
    pub status: FileStatus,
    pub encryption: EncryptionKind,
    pub credentials: Credentials,
    pub segments: Vec<SegmentDescriptor>,
    /// Opaque reference to the originating NZB (or archive part list).
    pub source_ref: String,
    pub modified_at: i64,
    /// Epoch seconds the NZB claims as the upload's release date; distinct
    /// from `modified_at`. `0` when unknown.
    pub release_date: i64,
}

impl LogicalFile {
    /// Sum of all segments' usable bytes — the on-wire byte count.
    pub fn on_wire_size(&self) -> i64 {
        self.segments.iter().map(SegmentDescriptor::usable_bytes).sum()
    }
}

/// Pure, allocation-free index over a logical file's segment list.
///
/// Contract: `get(i)` returns `None` when `i` is out of range. No I/O.
pub struct SegmentLoader<'a> {
    segments: &'a [SegmentDescriptor],
}

impl<'a> SegmentLoader<'a> {
    pub fn new(segments: &'a [SegmentDescriptor]) -> Self {
        Self { segments }
    }

    pub fn get(&self, i: usize) -> Option<&'a SegmentDescriptor> {
        self.segments.get(i)
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a SegmentDescriptor> {
        self.segments.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_article_id() {
        assert_eq!(
            SegmentDescriptor::new("", 0, 9, 10),
            Err(SegmentError::EmptyArticleId)
        );
    }

    #[test]
    fn rejects_out_of_order_bounds() {
        assert!(SegmentDescriptor::new("a", 5, 2, 10).is_err());
        assert!(SegmentDescriptor::new("a", 0, 10, 10).is_err()); // end >= segment_size
        assert!(SegmentDescriptor::new("a", -1, 5, 10).is_err());
    }

    #[test]
    fn usable_bytes_is_inclusive() {
        let seg = SegmentDescriptor::new("a", 0, 9, 10).unwrap();
        assert_eq!(seg.usable_bytes(), 10);
        let seg = SegmentDescriptor::new("a", 3, 3, 10).unwrap();
        assert_eq!(seg.usable_bytes(), 1);
    }

    #[test]
    fn loader_get_is_out_of_range_safe() {
        let segs = vec![SegmentDescriptor::new("a", 0, 9, 10).unwrap()];
        let loader = SegmentLoader::new(&segs);
        assert!(loader.get(0).is_some());
        assert!(loader.get(1).is_none());
    }
}
