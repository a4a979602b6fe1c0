//! V4L2 frame grabber delivering luminance frames

use std::time::{Duration, SystemTime};

use tracing::{info, instrument};
use v4l::buffer::Type;
use v4l::capability::Flags as CapFlags;
use v4l::io::traits::CaptureStream;
use v4l::prelude::MmapStream;
use v4l::video::Capture;
use v4l::{Device, FourCC};

use super::decoder;
use super::{Frame, FrameMetadata, FrameSource, PixelFormat};
use crate::error::SourceError;
use crate::CaptureConfig;

/// Memory-mapped V4L2 capture
pub struct V4l2Grabber {
    device: Box<Device>,
    stream: Option<MmapStream<'static>>,
    config: CaptureConfig,
    width: u32,
    height: u32,
    sequence: u64,
}

impl V4l2Grabber {
    pub fn new(config: CaptureConfig) -> Result<Self, SourceError> {
        info!("Initializing V4L2 capture: {}", config.device);

        let device = Device::with_path(&config.device)?;

        let caps = device.query_caps()?;
        info!("Device: {} ({})", caps.card, caps.driver);

        if !caps.capabilities.contains(CapFlags::VIDEO_CAPTURE) {
            return Err(SourceError::device("device doesn't support video capture"));
        }

        let mut fmt = device.format()?;
        fmt.width = config.width;
        fmt.height = config.height;
        fmt.fourcc = match config.format {
            PixelFormat::Grey => FourCC::new(b"GREY"),
            PixelFormat::Yuyv4 => FourCC::new(b"YUYV"),
            PixelFormat::Mjpeg => FourCC::new(b"MJPG"),
        };
        // The driver may round the resolution; trust what it reports back
        let fmt = device.set_format(&fmt)?;
        info!("Negotiated {}x{} {}", fmt.width, fmt.height, fmt.fourcc);

        Ok(Self {
            device: Box::new(device),
            stream: None,
            width: fmt.width,
            height: fmt.height,
            config,
            sequence: 0,
        })
    }
}

impl FrameSource for V4l2Grabber {
    fn start(&mut self) -> Result<(), SourceError> {
        let stream =
            MmapStream::with_buffers(&self.device, Type::VideoCapture, self.config.buffer_count)?;
        self.stream = Some(stream);
        self.sequence = 0;
        info!(
            "Capture stream started with {} buffers",
            self.config.buffer_count
        );
        Ok(())
    }

    fn stop(&mut self) -> Result<(), SourceError> {
        // Dropping the stream unmaps the buffers and issues STREAMOFF
        self.stream = None;
        Ok(())
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[instrument(skip(self))]
    fn next_frame(&mut self) -> Result<Frame, SourceError> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| SourceError::device("stream not started"))?;

        let (buf, meta) = stream.next()?;
        let data = decoder::decode_luma(buf, self.config.format, self.width, self.height)?;
        let device_timestamp = Duration::from_secs(meta.timestamp.sec as u64)
            + Duration::from_micros(meta.timestamp.usec as u64);

        let id = self.sequence;
        self.sequence += 1;

        Ok(Frame::new(
            data,
            FrameMetadata {
                id,
                device_timestamp,
                time: SystemTime::now(),
                width: self.width,
                height: self.height,
            },
        ))
    }
}
