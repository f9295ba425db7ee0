//! Progress Tracker: the progress-broadcast subsystem is an external
//! collaborator. This module defines the narrow trait and a sub-range
//! combinator so a nested tracker can report into a fixed slice of its
//! parent's percentage range.

use async_trait::async_trait;

#[async_trait]
pub trait ProgressTracker: Send + Sync {
    /// Maps `current/total` linearly into this tracker's `[min_pct,
    /// max_pct]` sub-range.
    async fn update(&self, current: u64, total: u64);

    /// Writes `pct` (0.0..=100.0) directly, ignoring any sub-range
    /// mapping this tracker might otherwise apply.
    async fn update_absolute(&self, pct: f64);
}

/// A tracker that maps into `[min_pct, max_pct]` of an inner tracker, so
/// nested trackers can add a fixed offset cumulative across files.
pub struct SubRangeTracker<T: ProgressTracker> {
    inner: T,
    min_pct: f64,
    max_pct: f64,
}

impl<T: ProgressTracker> SubRangeTracker<T> {
    pub fn new(inner: T, min_pct: f64, max_pct: f64) -> Self {
        assert!((0.0..=100.0).contains(&min_pct));
        assert!((0.0..=100.0).contains(&max_pct));
        assert!(min_pct <= max_pct);
        Self {
            inner,
            min_pct,
            max_pct,
        }
    }
}

#[async_trait]
impl<T: ProgressTracker> ProgressTracker for SubRangeTracker<T> {
    async fn update(&self, current: u64, total: u64) {
        let fraction = if total == 0 {
            1.0
        } else {
            (current as f64 / total as f64).clamp(0.0, 1.0)
        };
        let pct = self.min_pct + fraction * (self.max_pct - self.min_pct);
        self.inner.update_absolute(pct).await;
    }

    async fn update_absolute(&self, pct: f64) {
        let mapped = self.min_pct + (pct / 100.0).clamp(0.0, 1.0) * (self.max_pct - self.min_pct);
        self.inner.update_absolute(mapped).await;
    }
}

/// No-op tracker for call sites with nothing to report to.
pub struct NullProgressTracker;

#[async_trait]
impl ProgressTracker for NullProgressTracker {
    async fn update(&self, _current: u64, _total: u64) {}
    async fn update_absolute(&self, _pct: f64) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    struct RecordingTracker(Arc<AtomicU64>);

    #[async_trait]
    impl ProgressTracker for RecordingTracker {
        async fn update(&self, _current: u64, _total: u64) {}
        async fn update_absolute(&self, pct: f64) {
            self.0.store(pct as u64, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn sub_range_maps_linearly() {
        let last = Arc::new(AtomicU64::new(0));
        let tracker = SubRangeTracker::new(RecordingTracker(last.clone()), 50.0, 100.0);
        tracker.update(50, 100).await;
        assert_eq!(last.load(Ordering::SeqCst), 75);
    }

    #[tokio::test]
    async fn sub_range_absolute_is_offset_into_range() {
        let last = Arc::new(AtomicU64::new(0));
        let tracker = SubRangeTracker::new(RecordingTracker(last.clone()), 0.0, 50.0);
        tracker.update_absolute(100.0).await;
        assert_eq!(last.load(Ordering::SeqCst), 50);
    }

    #[tokio::test]
    async fn zero_total_reports_complete() {
        let last = Arc::new(AtomicU64::new(0));
        let tracker = SubRangeTracker::new(RecordingTracker(last.clone()), 0.0, 100.0);
        tracker.update(0, 0).await;
        assert_eq!(last.load(Ordering::SeqCst), 100);
    }
}
