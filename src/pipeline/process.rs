//! Per-frame processing cycle
//!
//! Every admitted frame runs the same stages, strictly in order:
//!
//! 1. downscale into preview buffers (when a preview consumer exists)
//! 2. re-check admission and downgrade the cycle if a newer frame is waiting
//! 3. detect markers and publish the readout
//! 4. export pictures of markers not seen yet in the cataloguing window
//! 5. start a periodic full-frame export when one is due
//! 6. hand the previews to their consumers
//!
//! Stages 3 to 5 only run on stride-eligible frames. A stage whose
//! precondition is false is skipped. Failures stay inside their stage: the
//! cycle always runs to completion.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use super::admission::{AdmissionQueue, Cycle};
use super::catalog::{CatalogWindow, RegionOfInterest};
use super::concurrency::ConcurrencyController;
use super::message::{MarkerReadout, ReadoutError, ResultMessage};
use super::pool::{BufferPool, MessagePool, Pooled, SharedImage};
use super::preview;
use super::schedule::ExportSchedule;
use super::stats::PipelineStats;
use super::stride::StrideFilter;
use crate::capture::Frame;
use crate::detect::Detector;
use crate::display::PreviewSink;
use crate::error::ExportError;
use crate::export::{ExportOutcome, FullFrameSink, RegionExportSink};
use crate::network::ResultSink;

/// Validated processing parameters.
#[derive(Debug, Clone)]
pub struct ProcessSettings {
    pub producer_uuid: String,
    pub stride: StrideFilter,
    /// Side of the square region exported for a new marker
    pub roi_size: u32,
    pub catalog_period: Duration,
    pub full_frame_period: Duration,
    pub full_frame_delay: Duration,
    /// Detection thread ceiling
    pub max_threads: usize,
    /// Admission depth, used to size the preview pool
    pub depth: usize,
    /// Preview (width, height)
    pub preview_size: (u32, u32),
}

/// Optional collaborators of the pipeline. Absent ones disable their stage.
#[derive(Default)]
pub struct Sinks {
    pub detector: Option<Box<dyn Detector>>,
    pub results: Option<Arc<dyn ResultSink>>,
    pub video_output: Option<Arc<dyn PreviewSink>>,
    pub user_interface: Option<Arc<dyn PreviewSink>>,
    pub regions: Option<Arc<dyn RegionExportSink>>,
    pub full_frame: Option<Arc<dyn FullFrameSink>>,
}

impl Sinks {
    pub fn preview_consumers(&self) -> usize {
        self.preview_sinks().count()
    }

    /// Preview pool size that never makes a cycle wait on a consumer: what
    /// each sink may retain, plus `depth` buffers for the cycles in flight.
    pub fn preview_buffers(&self, depth: usize) -> usize {
        self.preview_sinks()
            .map(|sink| sink.retained_buffers() + depth.max(1))
            .sum()
    }

    fn preview_sinks(&self) -> impl Iterator<Item = &Arc<dyn PreviewSink>> {
        self.video_output.iter().chain(self.user_interface.iter())
    }
}

#[derive(Default)]
struct Previews {
    video_output: Option<SharedImage>,
    user_interface: Option<SharedImage>,
}

/// Runs admitted cycles one after the other.
pub struct FrameProcessor {
    settings: ProcessSettings,
    sinks: Sinks,
    controller: Arc<ConcurrencyController>,
    buffers: Option<BufferPool>,
    messages: MessagePool,
    window: CatalogWindow,
    schedule: ExportSchedule,
    stats: Arc<PipelineStats>,
}

impl FrameProcessor {
    pub fn new(
        settings: ProcessSettings,
        sinks: Sinks,
        messages: MessagePool,
        stats: Arc<PipelineStats>,
    ) -> Self {
        let consumers = sinks.preview_consumers();
        let buffers = (consumers > 0).then(|| {
            let (width, height) = settings.preview_size;
            BufferPool::reserve_images(sinks.preview_buffers(settings.depth), width, height)
        });

        info!(
            stride = settings.stride.stride(),
            threads = settings.max_threads,
            previews = consumers,
            detector = sinks.detector.as_ref().map(|d| d.name()).unwrap_or("none"),
            cataloguing = sinks.regions.is_some(),
            "Frame processor configured"
        );

        Self {
            controller: Arc::new(ConcurrencyController::new(settings.max_threads)),
            window: CatalogWindow::new(settings.catalog_period),
            schedule: ExportSchedule::new(settings.full_frame_period, settings.full_frame_delay),
            settings,
            sinks,
            buffers,
            messages,
            stats,
        }
    }

    pub fn controller(&self) -> &Arc<ConcurrencyController> {
        &self.controller
    }

    pub fn buffers(&self) -> Option<&BufferPool> {
        self.buffers.as_ref()
    }

    pub fn window(&self) -> &CatalogWindow {
        &self.window
    }

    pub fn schedule(&self) -> &ExportSchedule {
        &self.schedule
    }

    /// Process cycles until the shutdown sentinel.
    pub fn run(&mut self, queue: &AdmissionQueue) {
        info!("Frame processor started");
        while let Some(cycle) = queue.next() {
            self.process(cycle, queue);
        }
        info!("Frame processor drained");
    }

    /// Run one cycle. Completion is signalled when `cycle` is dropped on return.
    pub fn process(&mut self, cycle: Cycle, queue: &AdmissionQueue) {
        let started = Instant::now();
        let frame = &cycle.frame;

        self.collect_full_frame_outcome();
        let export_pending = self
            .sinks
            .full_frame
            .as_ref()
            .is_some_and(|sink| sink.is_pending());
        self.controller.begin_cycle(export_pending);

        let previews = self.render_previews(frame);

        if queue.has_newer() {
            debug!(frame = frame.id(), "Newer frame waiting, downgrading cycle");
            self.stats.cycle_downgraded();
            publish_overflow(
                self.sinks.results.as_deref(),
                &self.messages,
                frame,
                &self.settings.producer_uuid,
            );
            return;
        }

        if self.settings.stride.admits(frame.id()) {
            let readout = self.detect(frame);
            self.catalog(frame, &readout.markers);
            self.export_full_frame(frame);
            self.dispatch(frame.id(), previews, Some(&*readout));
        } else {
            self.dispatch(frame.id(), previews, None);
        }

        self.stats.cycle_completed();
        metrics::histogram!("artemis_cycle_seconds").record(started.elapsed().as_secs_f64());
    }

    fn render_previews(&self, frame: &Frame) -> Previews {
        let Some(buffers) = self.buffers.as_ref() else {
            return Previews::default();
        };
        let render = || {
            let mut image = buffers.get();
            preview::resize_nearest(frame, &mut image);
            image
        };

        match (&self.sinks.video_output, &self.sinks.user_interface) {
            (Some(_), Some(_)) => {
                let first = render();
                let mut second = buffers.get();
                second.copy_from_slice(&first);
                Previews {
                    video_output: Some(Arc::new(first)),
                    user_interface: Some(Arc::new(second)),
                }
            }
            (Some(_), None) => Previews {
                video_output: Some(Arc::new(render())),
                user_interface: None,
            },
            (None, Some(_)) => Previews {
                video_output: None,
                user_interface: Some(Arc::new(render())),
            },
            (None, None) => Previews::default(),
        }
    }

    fn detect(&mut self, frame: &Frame) -> Pooled<ResultMessage> {
        let mut readout = self.messages.get();
        readout.prepare(frame, &self.settings.producer_uuid);

        if let Some(detector) = self.sinks.detector.as_mut() {
            let threads = self.controller.current_budget();
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                detector.detect(frame, threads, &mut readout)
            }));
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    self.stats.detection_failed();
                    warn!(
                        frame = frame.id(),
                        detector = detector.name(),
                        markers = readout.markers.len(),
                        "{}",
                        e
                    );
                }
                Err(_) => {
                    self.stats.detection_failed();
                    error!(
                        frame = frame.id(),
                        detector = detector.name(),
                        markers = readout.markers.len(),
                        "Detector panicked"
                    );
                }
            }
        }

        if let Some(sink) = self.sinks.results.as_ref() {
            sink.publish(&readout);
        }
        readout
    }

    fn catalog(&mut self, frame: &Frame, markers: &[MarkerReadout]) {
        let Some(sink) = self.sinks.regions.clone() else {
            return;
        };
        if self.window.advance(frame.timestamp()) {
            debug!(frame = frame.id(), boundary = ?self.window.boundary(), "Cataloguing window renewed");
        }

        let budget = self.controller.current_budget();
        let candidates = self.window.select_unexported(markers, budget);
        if candidates.is_empty() {
            return;
        }

        let size = self.settings.roi_size;
        let results: Vec<(u32, Option<Result<(), ExportError>>)> = thread::scope(|s| {
            let handles: Vec<_> = candidates
                .iter()
                .map(|&candidate| {
                    let sink = &sink;
                    let handle = s.spawn(move || {
                        let roi = RegionOfInterest::centered(
                            candidate.x,
                            candidate.y,
                            size,
                            frame.width(),
                            frame.height(),
                        );
                        roi.crop(frame)
                            .and_then(|region| sink.export_region(candidate.id, frame.id(), &region))
                    });
                    (candidate.id, handle)
                })
                .collect();
            handles
                .into_iter()
                .map(|(id, handle)| (id, handle.join().ok()))
                .collect()
        });

        for (id, result) in results {
            match result {
                Some(Ok(())) => {
                    self.window.mark_exported(id);
                    self.stats.region_exported();
                    info!(marker = id, frame = frame.id(), "New marker catalogued");
                }
                Some(Err(e)) => {
                    self.stats.region_export_failed();
                    warn!(marker = id, frame = frame.id(), "Region export failed: {}", e);
                }
                None => {
                    self.stats.region_export_failed();
                    error!(marker = id, frame = frame.id(), "Region export thread panicked");
                }
            }
        }
    }

    fn export_full_frame(&mut self, frame: &Frame) {
        let Some(sink) = self.sinks.full_frame.clone() else {
            return;
        };
        if sink.is_pending() {
            debug!(frame = frame.id(), "Previous full frame still being written");
            return;
        }
        // The writer posts its outcome before clearing `pending`
        self.collect_full_frame_outcome();

        if !self.schedule.is_due(frame.timestamp()) {
            return;
        }
        match sink.export(frame) {
            Ok(()) => {
                self.controller.enter_background_export();
                debug!(frame = frame.id(), "Full frame export started");
            }
            Err(ExportError::Busy) => {
                debug!(frame = frame.id(), "Previous full frame still being written")
            }
            Err(e) => warn!(frame = frame.id(), "Full frame export refused: {}", e),
        }
    }

    /// The schedule only moves on a write that made it to disk; a failed one
    /// stays due and is retried by the next eligible frame.
    fn collect_full_frame_outcome(&mut self) {
        let Some(sink) = self.sinks.full_frame.as_ref() else {
            return;
        };
        while let Some(ExportOutcome {
            frame_id,
            frame_time,
            result,
        }) = sink.take_outcome()
        {
            match result {
                Ok(()) => {
                    self.schedule.advance(frame_time);
                    self.stats.full_frame_exported();
                    info!(frame = frame_id, next = ?self.schedule.next_eligible(), "Full frame exported");
                }
                Err(e) => {
                    self.stats.full_frame_export_failed();
                    warn!(frame = frame_id, "Full frame export failed, retrying: {}", e);
                }
            }
        }
    }

    fn dispatch(&self, frame_id: u64, previews: Previews, readout: Option<&ResultMessage>) {
        if let (Some(sink), Some(image)) = (&self.sinks.video_output, previews.video_output) {
            sink.present(frame_id, image, readout);
        }
        if let (Some(sink), Some(image)) = (&self.sinks.user_interface, previews.user_interface) {
            sink.present(frame_id, image, readout);
        }
    }
}

/// Tell the readout consumer that `frame` was dropped.
pub(crate) fn publish_overflow(
    sink: Option<&dyn ResultSink>,
    messages: &MessagePool,
    frame: &Frame,
    producer_uuid: &str,
) {
    let Some(sink) = sink else {
        return;
    };
    let mut message = messages.get();
    message.prepare(frame, producer_uuid);
    message.error = Some(ReadoutError::ProcessOverflow);
    sink.publish(&message);
}
