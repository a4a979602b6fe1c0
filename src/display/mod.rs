pub mod monitor;
pub mod video_output;

pub use monitor::{MonitorFrame, PreviewMonitor};
pub use video_output::RawVideoOutput;

use crate::pipeline::{ResultMessage, SharedImage};

/// Consumer of downscaled preview frames.
///
/// The image is shared read-only; holding on to it keeps its pool slot busy.
/// `readout` is present when the frame went through detection.
pub trait PreviewSink: Send + Sync {
    fn present(&self, frame_id: u64, image: SharedImage, readout: Option<&ResultMessage>);

    /// Most previews this sink may still hold between two `present` calls.
    /// The preview pool is sized from it.
    fn retained_buffers(&self) -> usize {
        1
    }
}
