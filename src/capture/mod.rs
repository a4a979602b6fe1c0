pub mod decoder;
pub mod frame;
pub mod stub;
#[cfg(feature = "v4l2")]
pub mod v4l2;

pub use frame::Frame;
pub use frame::FrameMetadata;
pub use frame::PixelFormat;
pub use stub::StubFrameGrabber;
#[cfg(feature = "v4l2")]
pub use v4l2::V4l2Grabber;

use crate::error::SourceError;

/// Anything that produces frames at the native capture cadence.
pub trait FrameSource: Send {
    fn start(&mut self) -> Result<(), SourceError>;

    fn stop(&mut self) -> Result<(), SourceError>;

    /// (width, height) of the frames this source delivers.
    fn resolution(&self) -> (u32, u32);

    /// Blocks until the next frame is available.
    fn next_frame(&mut self) -> Result<Frame, SourceError>;
}
