use std::sync::Mutex;

use artemis::capture::PixelFormat;
use artemis::error::ConfigError;
use artemis::{Config, SourceKind};

// Environment variables are process-wide
static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for (key, _) in std::env::vars() {
        if key.starts_with("ARTEMIS_") {
            std::env::remove_var(key);
        }
    }
}

#[test]
fn missing_file_yields_defaults() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    clear_env();
    let dir = tempfile::tempdir().unwrap();

    let config = Config::load(dir.path().join("absent.toml")).unwrap();
    assert_eq!(config.capture.source, SourceKind::Stub);
    assert_eq!(config.capture.interval_ms, 250);
    assert_eq!(config.network.port, 3002);
    assert_eq!(config.video_output.height, 1080);
    assert_eq!(config.process.frame_stride, 1);
    assert_eq!(config.process.queue_depth, 1);
    assert_eq!(config.process.catalog_renew_secs, 7200);
    assert!(config.process.workers >= 1);
    assert!(!config.previews_enabled());
}

#[test]
fn file_values_then_environment_overrides() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("artemis.toml");
    std::fs::write(
        &path,
        r#"
[capture]
source = "v4l2"
device = "/dev/video2"
format = "yuyv4"
width = 1280
height = 720

[process]
frame_stride = 4
frame_ids = [0, 2]
new_ant_roi_size = 200

[network]
host = "tracker.local"

[video_output]
to_stdout = true
height = 360
"#,
    )
    .unwrap();

    std::env::set_var("ARTEMIS_NETWORK__PORT", "4000");
    std::env::set_var("ARTEMIS_PROCESS__FRAME_IDS", "1,3");
    let loaded = Config::load(&path);
    clear_env();
    let config = loaded.unwrap();

    assert_eq!(config.capture.source, SourceKind::V4l2);
    assert_eq!(config.capture.device, "/dev/video2");
    assert_eq!(config.capture.format, PixelFormat::Yuyv4);
    assert_eq!(config.network.host, "tracker.local");
    assert_eq!(config.network.port, 4000);
    assert_eq!(config.process.frame_ids, vec![1, 3]);
    assert!(config.previews_enabled());

    let settings = config.process_settings((1280, 720)).unwrap();
    assert_eq!(settings.preview_size, (640, 360));
    assert!(settings.stride.admits(5));
    assert!(!settings.stride.admits(4));
}

#[test]
fn invalid_stride_is_rejected_on_load() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("artemis.toml");
    std::fs::write(&path, "[process]\nframe_stride = 3\nframe_ids = [3]\n").unwrap();

    assert!(matches!(Config::load(&path), Err(ConfigError::Invalid(_))));
}
