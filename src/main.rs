//! Artemis: real-time marker tracking front-end

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use artemis::capture::{FrameSource, StubFrameGrabber};
use artemis::display::{PreviewMonitor, PreviewSink, RawVideoOutput};
use artemis::export::{FullFrameExporter, FullFrameSink, PngRegionWriter, RegionExportSink};
use artemis::network::{Connection, ResultSink};
use artemis::pipeline::{
    admission_gate, CaptureLoop, FrameProcessor, MessagePool, PipelineStats, Sinks,
};
use artemis::{CaptureConfig, Config, SourceKind};
use color_eyre::{eyre::eyre, Result};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

const HEALTH_INTERVAL: Duration = Duration::from_secs(5);

fn main() -> Result<()> {
    // Initialize error handling and logging. Logs go to stderr, stdout may carry video.
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("artemis=info")),
        )
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .with_writer(std::io::stderr)
        .init();

    info!("Artemis launching...");

    let path = std::env::var("ARTEMIS_CONFIG").unwrap_or_else(|_| "artemis.toml".into());
    let config = Config::load(&path)?;
    info!("Configuration loaded from {} (missing file means defaults)", path);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.process.workers)
        .thread_name("artemis-worker")
        .enable_all()
        .build()?;
    runtime.block_on(run(config))
}

async fn run(config: Config) -> Result<()> {
    let source = open_source(&config.capture)?;
    let resolution = source.resolution();
    let settings = config.process_settings(resolution)?;
    info!(
        "Capturing {}x{}, preview {}x{}",
        resolution.0, resolution.1, settings.preview_size.0, settings.preview_size.1
    );

    let handle = tokio::runtime::Handle::current();
    let results = (!config.network.host.is_empty()).then(|| {
        let addr = format!("{}:{}", config.network.host, config.network.port);
        Connection::spawn(&handle, addr, config.network.queue_capacity)
    });
    if results.is_none() {
        warn!("No readout host configured, detections are not published");
    }

    let video_output = if config.video_output.to_stdout {
        Some(Arc::new(RawVideoOutput::stdout()?))
    } else {
        None
    };
    let monitor = config.display.monitor.then(|| Arc::new(PreviewMonitor::new()));

    let (regions, full_frame) = match &config.process.new_ant_output_dir {
        Some(dir) => {
            info!("Cataloguing new markers into {}", dir.display());
            (
                Some(Arc::new(PngRegionWriter::new(dir)?)),
                Some(Arc::new(FullFrameExporter::spawn(dir)?)),
            )
        }
        None => (None, None),
    };

    let stats = Arc::new(PipelineStats::new());
    let messages = MessagePool::reserve_messages(2 * settings.depth + 2);
    let (scheduler, queue) = admission_gate(settings.depth);

    let mut capture = CaptureLoop::new(source, scheduler, messages.clone(), Arc::clone(&stats))
        .with_pinning(config.capture.pin_core);
    if !config.previews_enabled() {
        capture = capture.with_stride(settings.stride.clone());
    }
    if let Some(connection) = &results {
        capture = capture.with_result_sink(
            Arc::clone(connection) as Arc<dyn ResultSink>,
            &settings.producer_uuid,
        );
    }
    let running = capture.running_flag();

    let sinks = Sinks {
        detector: None,
        results: results.clone().map(|c| c as Arc<dyn ResultSink>),
        video_output: video_output.map(|v| v as Arc<dyn PreviewSink>),
        user_interface: monitor.clone().map(|m| m as Arc<dyn PreviewSink>),
        regions: regions.map(|r| r as Arc<dyn RegionExportSink>),
        full_frame: full_frame.map(|f| f as Arc<dyn FullFrameSink>),
    };
    warn!("No marker detector linked, readouts carry no markers");

    let mut processor = FrameProcessor::new(settings, sinks, messages, Arc::clone(&stats));
    let pipeline = tokio::task::spawn_blocking(move || processor.run(&queue));

    let (done_tx, mut done_rx) = tokio::sync::oneshot::channel();
    thread::Builder::new()
        .name("capture".into())
        .spawn(move || {
            let _ = done_tx.send(capture.run());
        })?;

    let mut health = tokio::time::interval(HEALTH_INTERVAL);
    health.tick().await;
    let outcome = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Terminating (SIGINT)");
                running.store(false, Ordering::Release);
                break (&mut done_rx).await;
            }
            result = &mut done_rx => break result,
            _ = health.tick() => log_health(&stats, monitor.as_deref()),
        }
    };

    // The capture loop pushed the sentinel; wait for the pipeline to drain
    pipeline.await?;
    if let Some(connection) = &results {
        if connection.dropped() > 0 {
            warn!("{} readouts dropped on a full queue", connection.dropped());
        }
    }
    info!("Final statistics: {:?}", stats.snapshot());

    outcome.map_err(|_| eyre!("capture thread ended without reporting"))??;
    info!("Artemis shutting down");
    Ok(())
}

fn open_source(capture: &CaptureConfig) -> Result<Box<dyn FrameSource>> {
    match capture.source {
        SourceKind::Stub => {
            let interval = Duration::from_millis(capture.interval_ms);
            let grabber = match &capture.stub_image {
                Some(path) => StubFrameGrabber::from_path(path, interval)?,
                None => StubFrameGrabber::synthetic(capture.width, capture.height, interval),
            };
            Ok(Box::new(match capture.frame_limit {
                Some(limit) => grabber.with_limit(limit),
                None => grabber,
            }))
        }
        #[cfg(feature = "v4l2")]
        SourceKind::V4l2 => {
            let mut capture = capture.clone();
            if capture.device.is_empty() {
                let found = artemis::utils::auto_detect_device()?;
                capture.device = found.path;
                capture.format = found.format;
            }
            info!("Using capture device: {} ({:?})", capture.device, capture.format);
            Ok(Box::new(artemis::capture::V4l2Grabber::new(capture)?))
        }
        #[cfg(not(feature = "v4l2"))]
        SourceKind::V4l2 => Err(eyre!("built without V4L2 support, enable the `v4l2` feature")),
    }
}

fn log_health(stats: &PipelineStats, monitor: Option<&PreviewMonitor>) {
    let s = stats.snapshot();
    info!(
        captured = s.frames_captured,
        admitted = s.frames_admitted,
        skipped = s.frames_skipped,
        overflowed = s.frames_overflowed,
        downgraded = s.cycles_downgraded,
        completed = s.cycles_completed,
        catalogued = s.regions_exported,
        "Pipeline health"
    );
    if let Some(latest) = monitor.and_then(|m| m.latest()) {
        debug!(
            frame = latest.frame_id,
            markers = latest.markers.len(),
            "Latest monitor preview"
        );
    }
}
