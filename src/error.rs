//! Error types shared by the capture, detection and export paths

use thiserror::Error;

/// Failures of a frame source. Anything but `Exhausted` is fatal to the capture loop.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("frame source exhausted")]
    Exhausted,

    #[error("capture device error: {0}")]
    Device(String),

    #[error("capture I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not decode frame: {0}")]
    Image(#[from] image::ImageError),
}

impl SourceError {
    pub fn device<S: Into<String>>(msg: S) -> Self {
        Self::Device(msg.into())
    }
}

/// Marker detection failure for a single frame.
#[derive(Error, Debug)]
#[error("detection failed: {0}")]
pub struct DetectionError(pub String);

impl DetectionError {
    pub fn new<S: Into<String>>(msg: S) -> Self {
        Self(msg.into())
    }
}

/// Failure to export a region of interest or a full frame.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("a previous export is still being written")]
    Busy,

    #[error("exporter is shut down")]
    Closed,

    #[error("region {size}px at ({x}, {y}) does not fit a {width}x{height} frame")]
    InvalidRegion {
        x: u32,
        y: u32,
        size: u32,
        width: u32,
        height: u32,
    },

    #[error("export I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not encode image: {0}")]
    Image(#[from] image::ImageError),
}

/// Configuration loading and validation errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn invalid<S: Into<String>>(msg: S) -> Self {
        Self::Invalid(msg.into())
    }
}
