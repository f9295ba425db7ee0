//! Range Planner: turns a logical byte range into planned article slices.
//!
//! Pure function of a segment sequence — no I/O, no allocation beyond the
//! output vector.

use crate::segment::SegmentLoader;

/// One article slice produced by [`plan`]: read bytes
/// `[relative_start, relative_end]` (inclusive) of the article identified
/// by `article_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedSlice {
    pub article_id: String,
    pub relative_start: i64,
    pub relative_end: i64,
}

impl PlannedSlice {
    #[inline]
    pub fn len(&self) -> i64 {
        self.relative_end - self.relative_start + 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() <= 0
    }
}

/// Plan the minimal contiguous subsequence of segments covering logical
/// bytes `[s, e]`, trimming the first and last entries to exact byte
/// boundaries.
///
/// Returns an empty plan iff `s > e`. Segments are assumed to partition
/// the logical file's byte space contiguously and without gaps or
/// overlap (the invariant [`SegmentLoader`]'s producers must uphold); a
/// byte at a segment boundary therefore belongs to exactly one segment.
pub fn plan(s: i64, e: i64, loader: &SegmentLoader<'_>) -> Vec<PlannedSlice> {
    let mut out = Vec::new();
    if s > e {
        return out;
    }

    let mut cumulative = 0i64;
    for i in 0..loader.len() {
        let seg = loader.get(i).expect("index within loader.len()");
        let usable = seg.usable_bytes();
        if usable <= 0 {
            // Defensive: the constructor forbids this, but a future
            // producer of segments should not be able to corrupt the plan.
            continue;
        }

        let seg_lo = cumulative;
        let seg_hi = cumulative + usable - 1;
        cumulative += usable;

        if seg_hi < s {
            continue; // entirely before the requested range
        }
        if seg_lo > e {
            break; // entirely after; segments are in order, nothing more to find
        }

        let overlap_lo = seg_lo.max(s);
        let overlap_hi = seg_hi.min(e);
        let relative_start = seg.start_offset + (overlap_lo - seg_lo);
        let relative_end = seg.start_offset + (overlap_hi - seg_lo);

        out.push(PlannedSlice {
            article_id: seg.article_id.clone(),
            relative_start,
            relative_end,
        });
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::SegmentDescriptor;

    fn segs(sizes: &[i64]) -> Vec<SegmentDescriptor> {
        sizes
            .iter()
            .enumerate()
            .map(|(i, &sz)| SegmentDescriptor::new(format!("seg{i}"), 0, sz - 1, sz).unwrap())
            .collect()
    }

    #[test]
    fn single_byte_range_yields_one_entry() {
        let segments = segs(&[10, 10, 10]);
        let loader = SegmentLoader::new(&segments);
        let p = plan(15, 15, &loader);
        assert_eq!(p.len(), 1);
        assert_eq!(p[0].article_id, "seg1");
        assert_eq!((p[0].relative_start, p[0].relative_end), (5, 5));
    }

    #[test]
    fn empty_iff_s_greater_than_e() {
        let segments = segs(&[10]);
        let loader = SegmentLoader::new(&segments);
        assert!(plan(5, 4, &loader).is_empty());
        assert!(!plan(4, 5, &loader).is_empty());
    }

    #[test]
    fn full_range_covers_every_segment_untouched_in_the_middle() {
        let segments = segs(&[10, 20, 5]);
        let loader = SegmentLoader::new(&segments);
        let p = plan(0, 34, &loader);
        assert_eq!(p.len(), 3);
        assert_eq!((p[0].relative_start, p[0].relative_end), (0, 9));
        assert_eq!((p[1].relative_start, p[1].relative_end), (0, 19));
        assert_eq!((p[2].relative_start, p[2].relative_end), (0, 4));
    }

    #[test]
    fn boundary_byte_belongs_to_lower_segment_only() {
        let segments = segs(&[10, 10]);
        let loader = SegmentLoader::new(&segments);
        // byte 9 is the last byte of segment 0; must not also appear in segment 1's slice.
        let p = plan(9, 10, &loader);
        assert_eq!(p.len(), 2);
        assert_eq!((p[0].relative_start, p[0].relative_end), (9, 9));
        assert_eq!((p[1].relative_start, p[1].relative_end), (0, 0));
    }

    #[test]
    fn usable_bytes_sum_equals_range_length() {
        let segments = segs(&[7, 13, 4, 50]);
        let loader = SegmentLoader::new(&segments);
        for &(s, e) in &[(0i64, 73i64), (3, 3), (7, 20), (19, 73), (0, 0)] {
            let p = plan(s, e, &loader);
            let total: i64 = p.iter().map(PlannedSlice::len).sum();
            assert_eq!(total, e - s + 1, "failed for range [{s}, {e}]");
        }
    }

    #[test]
    fn does_not_assume_uniform_segment_size() {
        let segments = segs(&[1, 1000, 3]);
        let loader = SegmentLoader::new(&segments);
        let p = plan(0, 1003, &loader);
        assert_eq!(p.len(), 3);
        assert_eq!(p[1].len(), 1000);
    }

    proptest::proptest! {
        #[test]
        fn prop_plan_covers_exact_range(
            sizes in proptest::collection::vec(1i64..=50, 1..10),
        ) {
            let segments: Vec<SegmentDescriptor> = sizes
                .iter()
                .enumerate()
                .map(|(i, &sz)| SegmentDescriptor::new(format!("s{i}"), 0, sz - 1, sz).unwrap())
                .collect();
            let total: i64 = sizes.iter().sum();
            let loader = SegmentLoader::new(&segments);

            // sample a handful of ranges deterministically derived from sizes
            let s = 0i64;
            let e = total - 1;
            let p = plan(s, e, &loader);
            let sum: i64 = p.iter().map(PlannedSlice::len).sum();
            proptest::prop_assert_eq!(sum, total);
        }
    }
}
