use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

/// Captured frame with zero-copy semantics
///
/// Pixels are 8-bit luminance, row-major, `width * height` bytes. Cloning a
/// frame only bumps reference counts, so every pipeline stage can hold the
/// same immutable image.
#[derive(Clone)]
pub struct Frame {
    /// Immutable frame data - can be shared across threads without copying
    pub data: Bytes,

    /// Frame metadata
    pub meta: Arc<FrameMetadata>,

    /// Capture instant for latency tracking
    pub captured_at: Instant,
}

/// Frame metadata
#[derive(Debug, Clone)]
pub struct FrameMetadata {
    /// Monotonic sequence number assigned by the source
    pub id: u64,
    /// Device clock at exposure
    pub device_timestamp: Duration,
    /// Wall-clock time of capture
    pub time: SystemTime,
    pub width: u32,
    pub height: u32,
}

impl Frame {
    pub fn new(data: Bytes, meta: FrameMetadata) -> Self {
        debug_assert_eq!(
            data.len(),
            meta.width as usize * meta.height as usize,
            "luminance frame size mismatch"
        );
        Self {
            data,
            meta: Arc::new(meta),
            captured_at: Instant::now(),
        }
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.meta.id
    }

    /// Device timestamp, the clock every scheduling decision uses.
    #[inline]
    pub fn timestamp(&self) -> Duration {
        self.meta.device_timestamp
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.meta.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.meta.height
    }

    /// One row of pixels.
    #[inline]
    pub fn row(&self, y: u32) -> &[u8] {
        let w = self.meta.width as usize;
        let start = y as usize * w;
        &self.data[start..start + w]
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("id", &self.meta.id)
            .field("width", &self.meta.width)
            .field("height", &self.meta.height)
            .finish()
    }
}

/// Pixel formats a grabber may deliver before conversion to luminance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    Grey,
    Yuyv4,
    Mjpeg,
}
