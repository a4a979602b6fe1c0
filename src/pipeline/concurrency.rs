use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tracing::debug;

/// Thread budget granted to marker detection.
///
/// A background full-frame export competes with detection for CPU, so while
/// one is scheduled detection gets one thread less. The budget is re-applied
/// at the start of every cycle so a missed restoration heals on the next frame.
#[derive(Debug)]
pub struct ConcurrencyController {
    maximum: usize,
    current: AtomicUsize,
    exporting: AtomicBool,
}

impl ConcurrencyController {
    pub fn new(maximum: usize) -> Self {
        let maximum = maximum.max(1);
        let controller = Self {
            maximum,
            current: AtomicUsize::new(maximum),
            exporting: AtomicBool::new(false),
        };
        controller.apply(maximum);
        controller
    }

    /// Threads the detector may use right now. Always at least 1.
    pub fn current_budget(&self) -> usize {
        self.current.load(Ordering::Acquire)
    }

    pub fn maximum(&self) -> usize {
        self.maximum
    }

    pub fn is_exporting(&self) -> bool {
        self.exporting.load(Ordering::Acquire)
    }

    /// Reserve one thread for a background export.
    pub fn enter_background_export(&self) {
        self.exporting.store(true, Ordering::Release);
        self.apply(self.reduced());
    }

    /// Give the reserved thread back to detection.
    pub fn exit_background_export(&self) {
        self.exporting.store(false, Ordering::Release);
        self.apply(self.maximum);
    }

    /// Called at the start of every admitted cycle.
    pub fn begin_cycle(&self, export_pending: bool) {
        if export_pending {
            self.exporting.store(true, Ordering::Release);
            self.apply(self.reduced());
        } else {
            self.exit_background_export();
        }
    }

    fn reduced(&self) -> usize {
        self.maximum.saturating_sub(1).max(1)
    }

    fn apply(&self, budget: usize) {
        let previous = self.current.swap(budget, Ordering::AcqRel);
        if previous != budget {
            debug!(previous, budget, "Detection thread budget changed");
        }
        metrics::gauge!("artemis_detection_threads").set(budget as f64);
    }
}
