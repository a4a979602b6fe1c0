pub mod capture;
pub mod detect;
pub mod display;
pub mod error;
pub mod export;
pub mod network;
pub mod pipeline;
pub mod utils;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use capture::frame::PixelFormat;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::pipeline::{ProcessSettings, StrideFilter};

/// Longest accepted frame stride
pub const MAX_FRAME_STRIDE: u64 = 100;

/// System configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub capture: CaptureConfig,
    pub process: ProcessConfig,
    pub network: NetworkConfig,
    pub video_output: VideoOutputConfig,
    pub display: DisplayConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Replays a still image (or a synthetic pattern) at a fixed interval
    Stub,
    /// V4L2 camera, needs the `v4l2` feature
    V4l2,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub source: SourceKind,
    /// Image replayed by the stub source, synthetic pattern when unset
    pub stub_image: Option<PathBuf>,
    pub interval_ms: u64,
    /// Stop after this many frames (stub source)
    pub frame_limit: Option<u64>,
    /// V4L2 device path, auto-detected when empty
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub buffer_count: u32,
    /// Pin the capture thread to this core
    pub pin_core: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessConfig {
    pub producer_uuid: String,
    /// Frame sequence length
    pub frame_stride: u64,
    /// Residues of the sequence that get detection, all when empty
    pub frame_ids: Vec<u64>,
    /// Worker threads, also the detection thread ceiling
    pub workers: usize,
    /// Cycles allowed in flight or queued, 1 is single-flight
    pub queue_depth: usize,
    /// Where new marker pictures and periodic full frames are written
    pub new_ant_output_dir: Option<PathBuf>,
    pub new_ant_roi_size: u32,
    pub catalog_renew_secs: u64,
    pub frame_export_renew_secs: u64,
    pub frame_export_delay_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Readout consumer host, publishing disabled when empty
    pub host: String,
    pub port: u16,
    /// Encoded readouts buffered while the link is slow or down
    pub queue_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoOutputConfig {
    /// Raw 8-bit preview frames on stdout
    pub to_stdout: bool,
    /// Preview height, width follows the capture aspect ratio
    pub height: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Keep the latest preview for a monitoring UI
    pub monitor: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            source: SourceKind::Stub,
            stub_image: None,
            interval_ms: 250,
            frame_limit: None,
            device: String::new(),
            width: 1920,
            height: 1080,
            format: PixelFormat::Grey,
            buffer_count: 4,
            pin_core: None,
        }
    }
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            producer_uuid: String::from("artemis"),
            frame_stride: 1,
            frame_ids: Vec::new(),
            workers: utils::hardware_threads(),
            queue_depth: 1,
            new_ant_output_dir: None,
            new_ant_roi_size: 600,
            catalog_renew_secs: 2 * 60 * 60,
            frame_export_renew_secs: 2 * 60 * 60,
            frame_export_delay_secs: 2 * 60,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 3002,
            queue_capacity: 64,
        }
    }
}

impl Default for VideoOutputConfig {
    fn default() -> Self {
        Self {
            to_stdout: false,
            height: 1080,
        }
    }
}

impl Config {
    /// Load `path` (TOML, optional) then `ARTEMIS_*` environment overrides,
    /// e.g. `ARTEMIS_PROCESS__FRAME_STRIDE=3`, and validate the result.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = config::Config::builder()
            .add_source(
                config::File::from(path)
                    .format(config::FileFormat::Toml)
                    .required(false),
            )
            .add_source(
                config::Environment::with_prefix("ARTEMIS")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("process.frame_ids"),
            )
            .build()?;

        let mut config: Config = raw.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Normalize tolerated values and reject the rest.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        let process = &mut self.process;
        if process.frame_stride == 0 {
            process.frame_stride = 1;
        }
        if process.frame_stride > MAX_FRAME_STRIDE {
            return Err(ConfigError::invalid(format!(
                "frame stride {} too big, max is {}",
                process.frame_stride, MAX_FRAME_STRIDE
            )));
        }
        if let Some(id) = process.frame_ids.iter().find(|&&id| id >= process.frame_stride) {
            return Err(ConfigError::invalid(format!(
                "frame id {} must be below the frame stride {}",
                id, process.frame_stride
            )));
        }
        process.workers = process.workers.max(1);
        process.queue_depth = process.queue_depth.max(1);

        if process.new_ant_roi_size == 0 {
            return Err(ConfigError::invalid("new ant ROI size must be positive"));
        }
        if process.catalog_renew_secs == 0 || process.frame_export_renew_secs == 0 {
            return Err(ConfigError::invalid("renewal periods must be positive"));
        }
        if self.video_output.height == 0 {
            return Err(ConfigError::invalid("video output height must be positive"));
        }
        if self.capture.interval_ms == 0 && self.capture.source == SourceKind::Stub {
            return Err(ConfigError::invalid("stub frame interval must be positive"));
        }
        Ok(())
    }

    /// Whether any preview consumer is configured.
    pub fn previews_enabled(&self) -> bool {
        self.video_output.to_stdout || self.display.monitor
    }

    /// Parameters for the frame processor, given the actual capture resolution.
    pub fn process_settings(&self, resolution: (u32, u32)) -> Result<ProcessSettings, ConfigError> {
        let (width, height) = resolution;
        let process = &self.process;
        if process.new_ant_output_dir.is_some() && process.new_ant_roi_size > width.min(height) {
            return Err(ConfigError::invalid(format!(
                "new ant ROI size {} does not fit a {}x{} frame",
                process.new_ant_roi_size, width, height
            )));
        }

        let preview_height = self.video_output.height;
        Ok(ProcessSettings {
            producer_uuid: process.producer_uuid.clone(),
            stride: self.stride_filter(),
            roi_size: process.new_ant_roi_size,
            catalog_period: Duration::from_secs(process.catalog_renew_secs),
            full_frame_period: Duration::from_secs(process.frame_export_renew_secs),
            full_frame_delay: Duration::from_secs(process.frame_export_delay_secs),
            max_threads: process.workers,
            depth: process.queue_depth,
            preview_size: (
                pipeline::preview::output_width(width, height, preview_height),
                preview_height,
            ),
        })
    }

    pub fn stride_filter(&self) -> StrideFilter {
        let residues: BTreeSet<u64> = self.process.frame_ids.iter().copied().collect();
        StrideFilter::new(self.process.frame_stride, &residues)
    }
}
