//! Marker detector plug-in boundary

use crate::capture::Frame;
use crate::error::DetectionError;
use crate::pipeline::ResultMessage;

/// Fiducial-marker detector.
///
/// `detect` appends the markers found in `frame` to `readout.markers`, using
/// at most `threads` threads. On error whatever was appended so far is still
/// published.
///
/// Report failures through `Err`. A panic is caught and treated as a failed
/// detection in unwinding builds, but release builds abort on panic, so a
/// panicking detector takes the whole process down there.
pub trait Detector: Send {
    /// Detector identifier for logs.
    fn name(&self) -> &'static str;

    fn detect(
        &mut self,
        frame: &Frame,
        threads: usize,
        readout: &mut ResultMessage,
    ) -> Result<(), DetectionError>;
}
