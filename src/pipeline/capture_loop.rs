//! Capture thread: pulls frames and feeds the admission gate

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, error, info, instrument, warn};

use super::admission::{Admission, AdmissionScheduler};
use super::pool::MessagePool;
use super::process::publish_overflow;
use super::stats::PipelineStats;
use super::stride::StrideFilter;
use crate::capture::FrameSource;
use crate::error::SourceError;
use crate::network::ResultSink;
use crate::utils;

/// Drives a [`FrameSource`] at its native cadence. Never waits for the pipeline.
pub struct CaptureLoop {
    source: Box<dyn FrameSource>,
    scheduler: AdmissionScheduler,
    messages: MessagePool,
    stats: Arc<PipelineStats>,
    stride: Option<StrideFilter>,
    results: Option<Arc<dyn ResultSink>>,
    producer_uuid: String,
    running: Arc<AtomicBool>,
    pin_core: Option<usize>,
}

impl CaptureLoop {
    pub fn new(
        source: Box<dyn FrameSource>,
        scheduler: AdmissionScheduler,
        messages: MessagePool,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            source,
            scheduler,
            messages,
            stats,
            stride: None,
            results: None,
            producer_uuid: String::new(),
            running: Arc::new(AtomicBool::new(true)),
            pin_core: None,
        }
    }

    /// Drop stride-ineligible frames before admission. Only valid when no
    /// preview consumer needs every frame.
    pub fn with_stride(mut self, stride: StrideFilter) -> Self {
        self.stride = Some(stride);
        self
    }

    /// Publish an overflow readout for each frame the gate refuses.
    pub fn with_result_sink(mut self, sink: Arc<dyn ResultSink>, producer_uuid: &str) -> Self {
        self.results = Some(sink);
        self.producer_uuid = producer_uuid.to_owned();
        self
    }

    pub fn with_pinning(mut self, core: Option<usize>) -> Self {
        self.pin_core = core;
        self
    }

    /// Clear the returned flag to stop after the current frame.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Capture until stopped, exhausted or failed. The shutdown sentinel is
    /// always pushed and the source always stopped before returning.
    #[instrument(skip(self), name = "capture")]
    pub fn run(mut self) -> Result<(), SourceError> {
        if let Some(core) = self.pin_core {
            utils::pin_current_thread(core);
        }

        if let Err(e) = self.source.start() {
            error!("Cannot start frame source: {}", e);
            self.scheduler.close();
            return Err(e);
        }
        let (width, height) = self.source.resolution();
        info!(width, height, depth = self.scheduler.depth(), "Capture started");

        let result = self.pump();
        self.scheduler.close();
        if let Err(e) = self.source.stop() {
            warn!("Failed to stop frame source: {}", e);
        }

        match result {
            Err(SourceError::Exhausted) => {
                info!("Frame source exhausted");
                Ok(())
            }
            Err(e) => {
                error!("Frame source failed: {}", e);
                Err(e)
            }
            Ok(()) => {
                info!("Capture stopped");
                Ok(())
            }
        }
    }

    fn pump(&mut self) -> Result<(), SourceError> {
        while self.running.load(Ordering::Acquire) {
            let frame = self.source.next_frame()?;
            self.stats.frame_captured();

            if let Some(stride) = &self.stride {
                if !stride.admits(frame.id()) {
                    self.stats.frame_skipped();
                    continue;
                }
            }

            match self.scheduler.try_admit(frame) {
                Admission::Admitted => self.stats.frame_admitted(),
                Admission::Overflow(frame) => {
                    self.stats.frame_overflowed();
                    warn!(frame = frame.id(), "Processing overflow, frame dropped");
                    publish_overflow(
                        self.results.as_deref(),
                        &self.messages,
                        &frame,
                        &self.producer_uuid,
                    );
                }
                Admission::Closed(frame) => {
                    debug!(frame = frame.id(), "Pipeline gone, stopping capture");
                    return Ok(());
                }
            }
        }
        Ok(())
    }
}
