//! Disk exports: new-subject regions and periodic full frames

pub mod full_frame;
pub mod region;

pub use full_frame::FullFrameExporter;
pub use region::PngRegionWriter;

use std::time::Duration;

use image::GrayImage;

use crate::capture::Frame;
use crate::error::ExportError;

/// Writes the picture of a newly seen marker.
///
/// Called concurrently from several threads, once per marker.
pub trait RegionExportSink: Send + Sync {
    fn export_region(
        &self,
        marker_id: u32,
        frame_id: u64,
        region: &GrayImage,
    ) -> Result<(), ExportError>;
}

/// How an accepted full-frame export ended.
#[derive(Debug)]
pub struct ExportOutcome {
    pub frame_id: u64,
    /// Device timestamp of the exported frame
    pub frame_time: Duration,
    pub result: Result<(), ExportError>,
}

/// Background full-resolution frame export.
pub trait FullFrameSink: Send + Sync {
    /// Start exporting `frame`. `Ok` means the export was accepted, not written.
    fn export(&self, frame: &Frame) -> Result<(), ExportError>;

    /// Whether an accepted export is still being written.
    fn is_pending(&self) -> bool;

    /// Outcome of a finished export, once. It is available no later than
    /// `is_pending` turning false.
    fn take_outcome(&self) -> Option<ExportOutcome>;
}
