//! Frame grabber replaying a still image at a fixed cadence

use std::path::Path;
use std::time::{Duration, Instant, SystemTime};

use bytes::Bytes;
use tracing::info;

use super::{Frame, FrameMetadata, FrameSource};
use crate::error::SourceError;

/// Replays the same luminance image forever (or up to `limit` frames),
/// pacing frames `interval` apart on both the wall clock and the device clock.
pub struct StubFrameGrabber {
    image: Bytes,
    width: u32,
    height: u32,
    interval: Duration,
    limit: Option<u64>,
    next_id: u64,
    device_time: Duration,
    deadline: Instant,
}

impl StubFrameGrabber {
    /// Load the replayed image from disk, converted to 8-bit luminance.
    pub fn from_path(path: &Path, interval: Duration) -> Result<Self, SourceError> {
        let image = image::open(path)?.into_luma8();
        info!(
            "Stub grabber replaying {} ({}x{})",
            path.display(),
            image.width(),
            image.height()
        );
        let (width, height) = image.dimensions();
        Ok(Self::from_luma(
            Bytes::from(image.into_raw()),
            width,
            height,
            interval,
        ))
    }

    /// Synthetic diagonal gradient, for running without an image on disk.
    pub fn synthetic(width: u32, height: u32, interval: Duration) -> Self {
        let pixels: Vec<u8> = (0..height)
            .flat_map(|y| (0..width).map(move |x| ((x + y) % 256) as u8))
            .collect();
        Self::from_luma(Bytes::from(pixels), width, height, interval)
    }

    pub fn from_luma(image: Bytes, width: u32, height: u32, interval: Duration) -> Self {
        Self {
            image,
            width,
            height,
            interval,
            limit: None,
            next_id: 0,
            device_time: Duration::ZERO,
            deadline: Instant::now(),
        }
    }

    /// Stop with `SourceError::Exhausted` after `limit` frames.
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }
}

impl FrameSource for StubFrameGrabber {
    fn start(&mut self) -> Result<(), SourceError> {
        self.next_id = 0;
        self.device_time = Duration::ZERO;
        self.deadline = Instant::now();
        Ok(())
    }

    fn stop(&mut self) -> Result<(), SourceError> {
        Ok(())
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn next_frame(&mut self) -> Result<Frame, SourceError> {
        if self.limit.is_some_and(|limit| self.next_id >= limit) {
            return Err(SourceError::Exhausted);
        }

        self.deadline += self.interval;
        let now = Instant::now();
        if self.deadline > now {
            std::thread::sleep(self.deadline - now);
        }

        let frame = Frame::new(
            self.image.clone(),
            FrameMetadata {
                id: self.next_id,
                device_timestamp: self.device_time,
                time: SystemTime::now(),
                width: self.width,
                height: self.height,
            },
        );
        self.device_time += self.interval;
        self.next_id += 1;
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_advance_id_and_device_clock() {
        let mut grabber =
            StubFrameGrabber::synthetic(8, 4, Duration::from_micros(250)).with_limit(3);
        grabber.start().unwrap();
        assert_eq!(grabber.resolution(), (8, 4));

        let first = grabber.next_frame().unwrap();
        let second = grabber.next_frame().unwrap();
        assert_eq!(first.id(), 0);
        assert_eq!(second.id(), 1);
        assert_eq!(second.timestamp() - first.timestamp(), Duration::from_micros(250));
        assert_eq!(second.data.len(), 32);
        assert_eq!(second.row(1)[0], 1);

        grabber.next_frame().unwrap();
        assert!(matches!(grabber.next_frame(), Err(SourceError::Exhausted)));
    }
}
