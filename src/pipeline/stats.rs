//! Pipeline counters shared between the capture thread and the workers

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam::utils::CachePadded;

#[derive(Default)]
struct Counters {
    frames_captured: AtomicU64,
    frames_skipped: AtomicU64,
    frames_admitted: AtomicU64,
    frames_overflowed: AtomicU64,
    cycles_completed: AtomicU64,
    cycles_downgraded: AtomicU64,
    detection_failures: AtomicU64,
    regions_exported: AtomicU64,
    region_export_failures: AtomicU64,
    full_frames_exported: AtomicU64,
    full_frame_export_failures: AtomicU64,
}

/// Lock-free pipeline statistics
#[derive(Default)]
pub struct PipelineStats {
    counters: CachePadded<Counters>,
}

/// Point-in-time copy of [`PipelineStats`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub frames_captured: u64,
    pub frames_skipped: u64,
    pub frames_admitted: u64,
    pub frames_overflowed: u64,
    pub cycles_completed: u64,
    pub cycles_downgraded: u64,
    pub detection_failures: u64,
    pub regions_exported: u64,
    pub region_export_failures: u64,
    pub full_frames_exported: u64,
    pub full_frame_export_failures: u64,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn frame_captured(&self) {
        self.counters.frames_captured.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("artemis_frames_captured").increment(1);
    }

    pub(crate) fn frame_skipped(&self) {
        self.counters.frames_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn frame_admitted(&self) {
        self.counters.frames_admitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn frame_overflowed(&self) {
        self.counters.frames_overflowed.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("artemis_frames_overflowed").increment(1);
    }

    pub(crate) fn cycle_completed(&self) {
        self.counters.cycles_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn cycle_downgraded(&self) {
        self.counters.cycles_downgraded.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("artemis_cycles_downgraded").increment(1);
    }

    pub(crate) fn detection_failed(&self) {
        self.counters.detection_failures.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("artemis_detection_failures").increment(1);
    }

    pub(crate) fn region_exported(&self) {
        self.counters.regions_exported.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("artemis_regions_exported").increment(1);
    }

    pub(crate) fn region_export_failed(&self) {
        self.counters
            .region_export_failures
            .fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn full_frame_exported(&self) {
        self.counters
            .full_frames_exported
            .fetch_add(1, Ordering::Relaxed);
        metrics::counter!("artemis_full_frames_exported").increment(1);
    }

    pub(crate) fn full_frame_export_failed(&self) {
        self.counters
            .full_frame_export_failures
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let c = &self.counters;
        StatsSnapshot {
            frames_captured: c.frames_captured.load(Ordering::Relaxed),
            frames_skipped: c.frames_skipped.load(Ordering::Relaxed),
            frames_admitted: c.frames_admitted.load(Ordering::Relaxed),
            frames_overflowed: c.frames_overflowed.load(Ordering::Relaxed),
            cycles_completed: c.cycles_completed.load(Ordering::Relaxed),
            cycles_downgraded: c.cycles_downgraded.load(Ordering::Relaxed),
            detection_failures: c.detection_failures.load(Ordering::Relaxed),
            regions_exported: c.regions_exported.load(Ordering::Relaxed),
            region_export_failures: c.region_export_failures.load(Ordering::Relaxed),
            full_frames_exported: c.full_frames_exported.load(Ordering::Relaxed),
            full_frame_export_failures: c.full_frame_export_failures.load(Ordering::Relaxed),
        }
    }
}
