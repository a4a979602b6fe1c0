//! Latest-frame slot for a monitoring UI

use std::sync::Arc;

use arc_swap::ArcSwapOption;

use super::PreviewSink;
use crate::pipeline::{MarkerReadout, ReadoutError, ResultMessage, SharedImage};

/// What the UI shows: the preview image with the markers found on it.
pub struct MonitorFrame {
    pub frame_id: u64,
    pub image: SharedImage,
    pub markers: Vec<MarkerReadout>,
    pub error: Option<ReadoutError>,
}

/// Keeps only the most recent preview; readers never block the pipeline.
#[derive(Default)]
pub struct PreviewMonitor {
    latest: ArcSwapOption<MonitorFrame>,
}

impl PreviewMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest(&self) -> Option<Arc<MonitorFrame>> {
        self.latest.load_full()
    }
}

impl PreviewSink for PreviewMonitor {
    fn present(&self, frame_id: u64, image: SharedImage, readout: Option<&ResultMessage>) {
        let (markers, error) = readout
            .map(|m| (m.markers.clone(), m.error))
            .unwrap_or_default();
        self.latest.store(Some(Arc::new(MonitorFrame {
            frame_id,
            image,
            markers,
            error,
        })));
    }

    /// The published slot, plus a snapshot a reader may still be holding.
    fn retained_buffers(&self) -> usize {
        2
    }
}
