//! Archive Analyzer: at import time, opens a multi-part RAR/7z via the
//! synthetic filesystem, enumerates inner files through a black-box
//! listing library, and maps each inner file's bytes directly onto the
//! underlying part articles' segments — no archive library sits in the
//! hot read path.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;
use tracing::{info, warn};

use crate::archive::naming::{self, ArchiveKind};
use crate::archive::synthetic_fs::SyntheticArchiveFs;
use crate::catalog::MetadataCatalog;
use crate::range_planner::{self, PlannedSlice};
use crate::reader::decrypt::{on_wire_size as wrapper_on_wire_size, rclone_on_wire};
use crate::segment::{Credentials, EncryptionKind, FileStatus, LogicalFile, SegmentDescriptor, SegmentLoader};
use crate::transport::ArticleTransport;

/// End-of-part tail gaps no larger than this are patched by duplicating
/// the last available slice; larger gaps are a hard failure.
pub const MAX_PATCHABLE_GAP: i64 = 800_000;

#[derive(thiserror::Error, Debug)]
pub enum ArchiveError {
    #[error("compressed inner files are not supported: {0}")]
    CompressionNotSupported(String),

    #[error("archive is password-protected and no password was supplied")]
    PasswordRequired,

    #[error("multi-volume archive is incomplete")]
    ArchiveIncomplete,

    #[error("part {part} is missing {missing_bytes} bytes with no available patch")]
    IncompleteNzb { part: String, missing_bytes: i64 },

    #[error("no inner files matched the allowed extension set")]
    NoAllowedFiles,

    #[error("no inner files were successfully processed")]
    NoFilesProcessed,

    #[error("catalog write failed: {0}")]
    Catalog(#[from] crate::catalog::CatalogError),

    #[error("listing library error: {0}")]
    Listing(String),
}

/// One part reference within an inner file's listing: where its bytes
/// live within a specific normalized part file.
#[derive(Debug, Clone)]
pub struct PartRef {
    pub part_filename: String,
    pub data_offset_within_part: i64,
    pub packed_size_within_part: i64,
}

#[derive(Debug, Clone)]
pub struct InnerFileAes {
    pub key: Vec<u8>,
    pub iv: [u8; 16],
}

#[derive(Debug, Clone)]
pub struct InnerFileListing {
    /// Backslashes already normalized to forward slashes by the caller.
    pub name: String,
    pub uncompressed_size: i64,
    pub packed_size: i64,
    pub compressed: bool,
    pub aes: Option<InnerFileAes>,
    pub parts: Vec<PartRef>,
}

#[derive(Debug, Clone, Default)]
pub struct ArchiveListing {
    pub password_required: bool,
    pub incomplete: bool,
    pub files: Vec<InnerFileListing>,
}

/// The archive library's listing API, treated as a black box: RAR/7z
/// container parsing itself is out of scope for this crate.
#[async_trait]
pub trait ArchiveListingSource: Send + Sync {
    async fn list(
        &self,
        fs: &SyntheticArchiveFs,
        first_part: &str,
        password: Option<&SecretString>,
    ) -> Result<ArchiveListing, ArchiveError>;
}

fn patch_gap(
    mut planned: Vec<PlannedSlice>,
    expected_len: i64,
    part_name: &str,
) -> Result<Vec<PlannedSlice>, ArchiveError> {
    let covered: i64 = planned.iter().map(PlannedSlice::len).sum();
    let delta = expected_len - covered;
    if delta == 0 {
        return Ok(planned);
    }
    if delta > 0 && delta <= MAX_PATCHABLE_GAP && !planned.is_empty() {
        let last = planned.last().unwrap().clone();
        warn!(part = part_name, delta, "patching end-of-part gap by duplicating the last slice");
        planned.push(PlannedSlice {
            article_id: last.article_id,
            relative_start: last.relative_start,
            relative_end: last.relative_start + delta - 1,
        });
        Ok(planned)
    } else {
        Err(ArchiveError::IncompleteNzb {
            part: part_name.to_string(),
            missing_bytes: delta.max(0),
        })
    }
}

fn slices_to_descriptors(
    part: &LogicalFile,
    slices: Vec<PlannedSlice>,
) -> Vec<SegmentDescriptor> {
    let segment_size_by_article: HashMap<&str, i64> = part
        .segments
        .iter()
        .map(|s| (s.article_id.as_str(), s.segment_size))
        .collect();

    slices
        .into_iter()
        .filter_map(|s| {
            let segment_size = segment_size_by_article
                .get(s.article_id.as_str())
                .copied()
                .unwrap_or(s.relative_end + 1);
            SegmentDescriptor::new(s.article_id, s.relative_start, s.relative_end, segment_size).ok()
        })
        .collect()
}

/// Slices one inner file's parts into a concatenated segment list.
fn slice_inner_file(
    parts_index: &HashMap<String, Arc<LogicalFile>>,
    listing: &InnerFileListing,
) -> Result<Vec<SegmentDescriptor>, ArchiveError> {
    let mut out = Vec::new();
    for part_ref in &listing.parts {
        let part = parts_index
            .get(&part_ref.part_filename)
            .ok_or(ArchiveError::ArchiveIncomplete)?;

        let loader = SegmentLoader::new(&part.segments);
        let planned = range_planner::plan(
            part_ref.data_offset_within_part,
            part_ref.data_offset_within_part + part_ref.packed_size_within_part - 1,
            &loader,
        );
        let patched = patch_gap(planned, part_ref.packed_size_within_part, &part_ref.part_filename)?;
        out.extend(slices_to_descriptors(part, patched));
    }
    Ok(out)
}

/// Allowed extension set for single-media rename. Kept narrow and
/// explicit rather than attempting to classify every container format.
const SINGLE_MEDIA_EXTENSIONS: &[&str] = &[
    "mkv", "mp4", "avi", "iso", "mov", "m4v", "ts",
];

fn extension_of(name: &str) -> Option<&str> {
    name.rsplit('/').next()?.rsplit('.').next()
}

fn is_allowed_media(name: &str) -> bool {
    extension_of(name)
        .map(|ext| SINGLE_MEDIA_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

pub struct ArchiveAnalyzer {
    listing_source: Arc<dyn ArchiveListingSource>,
    catalog: Arc<dyn MetadataCatalog>,
}

impl ArchiveAnalyzer {
    pub fn new(listing_source: Arc<dyn ArchiveListingSource>, catalog: Arc<dyn MetadataCatalog>) -> Self {
        Self {
            listing_source,
            catalog,
        }
    }

    /// `part_files`: the NZB's part files in original order, each an
    /// already-imported logical file representing one `.rNN`/`.7z.NNN`
    /// volume. `outer_rclone`: set when the whole job's uploads are
    /// themselves rclone-encrypted blobs stored inside the archive; this
    /// is a property of the job, not discoverable from the listing
    /// itself.
    #[allow(clippy::too_many_arguments)]
    pub async fn analyze(
        &self,
        kind: ArchiveKind,
        part_files: Vec<(String, Arc<LogicalFile>)>,
        nzb_source_ref: &str,
        nzb_base_name: &str,
        transport: Arc<dyn ArticleTransport>,
        max_download_workers: usize,
        cache_capacity_mib: Option<u64>,
        password: Option<SecretString>,
        outer_rclone: Option<Credentials>,
    ) -> Result<usize, ArchiveError> {
        let original_names: Vec<String> = part_files.iter().map(|(n, _)| n.clone()).collect();
        let normalized_names = naming::normalize_part_names(&original_names, kind);

        let mut parts_index: HashMap<String, Arc<LogicalFile>> = HashMap::new();
        for (normalized, (_, file)) in normalized_names.iter().zip(part_files.into_iter()) {
            parts_index.insert(normalized.clone(), file);
        }

        let first_part = naming::select_first_part(&normalized_names, kind)
            .ok_or(ArchiveError::ArchiveIncomplete)?
            .to_string();

        let fs = SyntheticArchiveFs::new(
            parts_index.clone(),
            transport,
            max_download_workers,
            cache_capacity_mib,
        );

        let listing = self
            .listing_source
            .list(&fs, &first_part, password.as_ref())
            .await?;

        if listing.incomplete {
            return Err(ArchiveError::ArchiveIncomplete);
        }
        if listing.password_required && password.is_none() {
            return Err(ArchiveError::PasswordRequired);
        }

        let normalized_slash: Vec<InnerFileListing> = listing
            .files
            .into_iter()
            .map(|mut f| {
                f.name = f.name.replace('\\', "/");
                f
            })
            .collect();

        let allowed_media_count = normalized_slash.iter().filter(|f| is_allowed_media(&f.name)).count();
        if allowed_media_count == 0 {
            return Err(ArchiveError::NoAllowedFiles);
        }

        let mut accepted = 0usize;
        let single_media = allowed_media_count == 1;

        for inner in &normalized_slash {
            if inner.compressed {
                warn!(file = %inner.name, "skipping compressed inner file");
                continue;
            }

            let segments = match slice_inner_file(&parts_index, inner) {
                Ok(s) => s,
                Err(ArchiveError::IncompleteNzb { part, missing_bytes }) => {
                    warn!(file = %inner.name, part, missing_bytes, "skipping file with unpatchable gap");
                    continue;
                }
                Err(e) => return Err(e),
            };

            let (encryption, credentials, expected) = if let Some(rclone_creds) = &outer_rclone {
                (
                    EncryptionKind::Rclone,
                    rclone_creds.clone(),
                    rclone_on_wire(inner.packed_size),
                )
            } else if let Some(aes) = &inner.aes {
                let creds = Credentials {
                    password: None,
                    salt: None,
                    aes_key: Some(aes.key.clone()),
                    aes_iv: Some(aes.iv),
                    ..Default::default()
                };
                (
                    EncryptionKind::Aes,
                    creds,
                    wrapper_on_wire_size(inner.packed_size, EncryptionKind::Aes),
                )
            } else {
                (EncryptionKind::None, Credentials::default(), inner.packed_size)
            };

            let on_wire: i64 = segments.iter().map(SegmentDescriptor::usable_bytes).sum();
            if on_wire != expected {
                warn!(
                    file = %inner.name,
                    on_wire,
                    expected,
                    "skipping file whose sliced size doesn't match expected on-wire size"
                );
                continue;
            }

            let mut name = inner.name.clone();
            if single_media && is_allowed_media(&name) {
                name = rename_for_single_media(nzb_base_name, &name);
            }

            let logical = LogicalFile {
                size: inner.uncompressed_size,
                status: FileStatus::Healthy,
                encryption,
                credentials,
                segments,
                source_ref: nzb_source_ref.to_string(),
                modified_at: 0,
                release_date: 0,
            };

            self.catalog.put(&name, logical).await?;
            accepted += 1;
            info!(file = %name, "imported archive inner file");
        }

        if accepted == 0 {
            return Err(ArchiveError::NoFilesProcessed);
        }
        Ok(accepted)
    }
}

/// Renames the sole inner file of a single-media archive to the NZB's
/// base name, preserving the original extension, avoiding a doubled
/// extension when the base name already ends with it.
fn rename_for_single_media(nzb_base_name: &str, inner_name: &str) -> String {
    let ext = extension_of(inner_name).unwrap_or("");
    if ext.is_empty() {
        return nzb_base_name.to_string();
    }
    let suffix = format!(".{ext}");
    if nzb_base_name.to_ascii_lowercase().ends_with(&suffix.to_ascii_lowercase()) {
        nzb_base_name.to_string()
    } else {
        format!("{nzb_base_name}{suffix}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_gap_appends_exact_delta_length_slice() {
        let planned = vec![PlannedSlice {
            article_id: "a1".to_string(),
            relative_start: 0,
            relative_end: 767_999,
        }];
        let patched = patch_gap(planned, 800_000, "part1").unwrap();
        assert_eq!(patched.len(), 2);
        assert_eq!(patched[1].len(), 32_000);
        let total: i64 = patched.iter().map(PlannedSlice::len).sum();
        assert_eq!(total, 800_000);
    }

    #[test]
    fn patch_gap_fails_beyond_threshold() {
        let planned = vec![PlannedSlice {
            article_id: "a1".to_string(),
            relative_start: 0,
            relative_end: 99,
        }];
        let err = patch_gap(planned, 100 + MAX_PATCHABLE_GAP + 1, "part1").unwrap_err();
        assert!(matches!(err, ArchiveError::IncompleteNzb { .. }));
    }

    #[test]
    fn patch_gap_fails_with_no_existing_slices() {
        let err = patch_gap(vec![], 100, "part1").unwrap_err();
        assert!(matches!(err, ArchiveError::IncompleteNzb { .. }));
    }

    #[test]
    fn rename_avoids_double_extension() {
        assert_eq!(rename_for_single_media("Movie.Name.2024", "inner/file.mkv"), "Movie.Name.2024.mkv");
        assert_eq!(rename_for_single_media("Movie.Name.2024.mkv", "inner/file.mkv"), "Movie.Name.2024.mkv");
    }

    #[test]
    fn rar_inner_slice_scenario_from_spec() {
        // part1: two 50-byte segments; part2: two 30-byte segments.
        let p1 = vec![
            SegmentDescriptor::new("p1s1", 0, 49, 50).unwrap(),
            SegmentDescriptor::new("p1s2", 0, 49, 50).unwrap(),
        ];
        let p2 = vec![
            SegmentDescriptor::new("p2s1", 0, 29, 30).unwrap(),
            SegmentDescriptor::new("p2s2", 0, 9, 10).unwrap(),
        ];
        let part1 = LogicalFile {
            size: 100,
            status: FileStatus::Healthy,
            encryption: EncryptionKind::None,
            credentials: Credentials::default(),
            segments: p1,
            source_ref: "part1".into(),
            modified_at: 0,
            release_date: 0,
        };
        let part2 = LogicalFile {
            size: 60,
            status: FileStatus::Healthy,
            encryption: EncryptionKind::None,
            credentials: Credentials::default(),
            segments: p2,
            source_ref: "part2".into(),
            modified_at: 0,
            release_date: 0,
        };

        let mut parts_index = HashMap::new();
        parts_index.insert("part1".to_string(), Arc::new(part1));
        parts_index.insert("part2".to_string(), Arc::new(part2));

        let listing = InnerFileListing {
            name: "inner.bin".into(),
            uncompressed_size: 120,
            packed_size: 120,
            compressed: false,
            aes: None,
            parts: vec![
                PartRef {
                    part_filename: "part1".into(),
                    data_offset_within_part: 20,
                    packed_size_within_part: 80,
                },
                PartRef {
                    part_filename: "part2".into(),
                    data_offset_within_part: 0,
                    packed_size_within_part: 40,
                },
            ],
        };

        let segments = slice_inner_file(&parts_index, &listing).unwrap();
        let total: i64 = segments.iter().map(SegmentDescriptor::usable_bytes).sum();
        assert_eq!(total, 120);
        assert_eq!(segments[0].article_id, "p1s1");
        assert_eq!((segments[0].start_offset, segments[0].end_offset), (20, 49));
        assert_eq!(segments[1].article_id, "p1s2");
        assert_eq!((segments[1].start_offset, segments[1].end_offset), (0, 49));
        assert_eq!(segments[2].article_id, "p2s1");
        assert_eq!((segments[2].start_offset, segments[2].end_offset), (0, 29));
        assert_eq!(segments[3].article_id, "p2s2");
        assert_eq!((segments[3].start_offset, segments[3].end_offset), (0, 9));
    }
}
