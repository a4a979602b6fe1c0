use tracing::{info, warn};

/// Number of hardware threads, the detection budget ceiling.
pub fn hardware_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Pin the calling thread to the `index`-th core reported by the OS.
pub fn pin_current_thread(index: usize) -> bool {
    let Some(core) = core_affinity::get_core_ids().and_then(|ids| ids.get(index).copied()) else {
        warn!("Cannot pin thread: core {} not available", index);
        return false;
    };
    let pinned = core_affinity::set_for_current(core);
    if pinned {
        info!("Pinned {:?} to core {}", std::thread::current().name(), index);
    } else {
        warn!("Failed to pin thread to core {}", index);
    }
    pinned
}

#[cfg(feature = "v4l2")]
pub use device::{auto_detect_device, FoundDevice};

#[cfg(feature = "v4l2")]
mod device {
    use crate::capture::PixelFormat;
    use color_eyre::{eyre::eyre, Result};
    use tracing::info;
    use v4l::{capability::Flags, video::Capture, Device, FourCC};

    /// Detected capture device info
    #[derive(Debug, Clone)]
    pub struct FoundDevice {
        pub path: String,
        pub format: PixelFormat,
    }

    /// Auto-detect the first capture device, preferring native greyscale
    pub fn auto_detect_device() -> Result<FoundDevice> {
        use std::path::Path;

        info!("Auto-detecting capture devices...");

        for i in 0..10 {
            let path = format!("/dev/video{}", i);
            if !Path::new(&path).exists() {
                continue;
            }

            let Ok(dev) = Device::with_path(&path) else {
                continue;
            };
            let Ok(caps) = dev.query_caps() else {
                continue;
            };
            if !caps.capabilities.contains(Flags::VIDEO_CAPTURE) {
                continue;
            }
            let Ok(formats) = dev.enum_formats() else {
                continue;
            };

            let mut best: Option<PixelFormat> = None;
            for fmt in formats {
                let candidate = if fmt.fourcc == FourCC::new(b"GREY") {
                    PixelFormat::Grey
                } else if fmt.fourcc == FourCC::new(b"YUYV") {
                    PixelFormat::Yuyv4
                } else if fmt.fourcc == FourCC::new(b"MJPG") {
                    PixelFormat::Mjpeg
                } else {
                    continue;
                };
                best = match best {
                    Some(PixelFormat::Grey) => best,
                    _ if candidate == PixelFormat::Grey => Some(candidate),
                    None => Some(candidate),
                    _ => best,
                };
            }

            if let Some(format) = best {
                info!("Found {:?} device: {} - {}", format, path, caps.card);
                return Ok(FoundDevice { path, format });
            }
        }

        Err(eyre!("No suitable capture device found"))
    }
}
