use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use artemis::capture::{Frame, FrameMetadata, FrameSource};
use artemis::detect::Detector;
use artemis::error::{DetectionError, SourceError};
use artemis::export::{FullFrameExporter, PngRegionWriter};
use artemis::network::ResultSink;
use artemis::pipeline::{
    admission_gate, AdmissionScheduler, CaptureLoop, FrameProcessor, MarkerReadout, MessagePool,
    PipelineStats, ProcessSettings, ResultMessage, Sinks, StrideFilter,
};
use bytes::Bytes;
use flume::{Receiver, Sender};

const WIDTH: u32 = 320;
const HEIGHT: u32 = 240;
const MARKER: u32 = 42;

fn frame(id: u64) -> Frame {
    let pixels: Vec<u8> = (0..WIDTH * HEIGHT).map(|i| (i % 256) as u8).collect();
    Frame::new(
        Bytes::from(pixels),
        FrameMetadata {
            id,
            device_timestamp: Duration::from_millis(250 * id),
            time: SystemTime::now(),
            width: WIDTH,
            height: HEIGHT,
        },
    )
}

fn wait_until_idle(scheduler: &AdmissionScheduler) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !scheduler.is_idle() {
        assert!(Instant::now() < deadline, "pipeline never became idle");
        thread::sleep(Duration::from_millis(1));
    }
}

/// Emits ten frames. Every frame waits for the previous cycle to finish,
/// except frame 4 which arrives while the detector is stuck on frame 3.
struct GatedSource {
    next: u64,
    scheduler: AdmissionScheduler,
    entered_slow_frame: Receiver<()>,
    release_slow_frame: Sender<()>,
}

impl FrameSource for GatedSource {
    fn start(&mut self) -> Result<(), SourceError> {
        Ok(())
    }

    fn stop(&mut self) -> Result<(), SourceError> {
        Ok(())
    }

    fn resolution(&self) -> (u32, u32) {
        (WIDTH, HEIGHT)
    }

    fn next_frame(&mut self) -> Result<Frame, SourceError> {
        let id = self.next;
        match id {
            id if id >= 10 => return Err(SourceError::Exhausted),
            4 => self
                .entered_slow_frame
                .recv_timeout(Duration::from_secs(10))
                .map_err(|_| SourceError::device("detector never reached frame 3"))?,
            5 => {
                let _ = self.release_slow_frame.send(());
                wait_until_idle(&self.scheduler);
            }
            _ => wait_until_idle(&self.scheduler),
        }
        self.next += 1;
        Ok(frame(id))
    }
}

/// Reports one fixed marker per frame; blocks on frame 3 until released.
struct SlowOnThree {
    entered: Sender<()>,
    release: Receiver<()>,
}

impl Detector for SlowOnThree {
    fn name(&self) -> &'static str {
        "slow-on-three"
    }

    fn detect(
        &mut self,
        frame: &Frame,
        _threads: usize,
        readout: &mut ResultMessage,
    ) -> Result<(), DetectionError> {
        if frame.id() == 3 {
            let _ = self.entered.send(());
            self.release
                .recv_timeout(Duration::from_secs(10))
                .map_err(|_| DetectionError::new("never released"))?;
        }
        readout.markers.push(MarkerReadout::at(MARKER, 160.0, 120.0));
        Ok(())
    }
}

#[derive(Default)]
struct Recorder(Mutex<Vec<(u64, bool, Vec<u32>)>>);

impl ResultSink for Recorder {
    fn publish(&self, message: &ResultMessage) {
        let ids = message.markers.iter().map(|m| m.id).collect();
        self.0
            .lock()
            .unwrap()
            .push((message.frame_id, message.is_overflow(), ids));
    }
}

fn settings() -> ProcessSettings {
    ProcessSettings {
        producer_uuid: "e2e".into(),
        stride: StrideFilter::all(),
        roi_size: 64,
        catalog_period: Duration::from_secs(3600),
        full_frame_period: Duration::from_secs(3600),
        full_frame_delay: Duration::from_secs(1),
        max_threads: 2,
        depth: 1,
        preview_size: (160, 120),
    }
}

#[test]
fn slow_frame_causes_exactly_one_overflow() {
    let (entered_tx, entered_rx) = flume::bounded(1);
    let (release_tx, release_rx) = flume::bounded(1);
    let results = Arc::new(Recorder::default());
    let stats = Arc::new(PipelineStats::new());
    let messages = MessagePool::reserve_messages(4);
    let (scheduler, queue) = admission_gate(1);

    let source = GatedSource {
        next: 0,
        scheduler: scheduler.clone(),
        entered_slow_frame: entered_rx,
        release_slow_frame: release_tx,
    };
    let sinks = Sinks {
        detector: Some(Box::new(SlowOnThree {
            entered: entered_tx,
            release: release_rx,
        })),
        results: Some(results.clone()),
        ..Sinks::default()
    };

    let mut processor = FrameProcessor::new(settings(), sinks, messages.clone(), stats.clone());
    let pipeline = thread::spawn(move || processor.run(&queue));

    CaptureLoop::new(Box::new(source), scheduler, messages, stats.clone())
        .with_stride(StrideFilter::all())
        .with_result_sink(results.clone(), "e2e")
        .run()
        .unwrap();
    pipeline.join().unwrap();

    let published = results.0.lock().unwrap().clone();
    let overflows: Vec<u64> = published
        .iter()
        .filter(|(_, overflow, _)| *overflow)
        .map(|(id, _, _)| *id)
        .collect();
    let normal: Vec<u64> = published
        .iter()
        .filter(|(_, overflow, _)| !*overflow)
        .map(|(id, _, _)| *id)
        .collect();

    assert_eq!(overflows, vec![4]);
    assert_eq!(normal, vec![0, 1, 2, 3, 5, 6, 7, 8, 9]);
    assert!(published
        .iter()
        .filter(|(_, overflow, _)| !*overflow)
        .all(|(_, _, markers)| markers == &vec![MARKER]));

    let snapshot = stats.snapshot();
    assert_eq!(snapshot.frames_captured, 10);
    assert_eq!(snapshot.frames_admitted, 9);
    assert_eq!(snapshot.frames_overflowed, 1);
    assert_eq!(snapshot.cycles_completed, 9);
}

/// Reports the same marker on every frame.
struct Fixed;

impl Detector for Fixed {
    fn name(&self) -> &'static str {
        "fixed"
    }

    fn detect(
        &mut self,
        _frame: &Frame,
        _threads: usize,
        readout: &mut ResultMessage,
    ) -> Result<(), DetectionError> {
        readout.markers.push(MarkerReadout::at(MARKER, 0.0, 0.0));
        Ok(())
    }
}

#[test]
fn new_marker_is_written_once_with_a_full_frame() {
    let dir = tempfile::tempdir().unwrap();
    let stats = Arc::new(PipelineStats::new());
    let messages = MessagePool::reserve_messages(2);
    let (scheduler, queue) = admission_gate(1);

    let sinks = Sinks {
        detector: Some(Box::new(Fixed)),
        regions: Some(Arc::new(PngRegionWriter::new(dir.path()).unwrap())),
        full_frame: Some(Arc::new(FullFrameExporter::spawn(dir.path()).unwrap())),
        ..Sinks::default()
    };
    let mut processor = FrameProcessor::new(settings(), sinks, messages.clone(), stats.clone());
    let pipeline = thread::spawn(move || processor.run(&queue));

    let source = artemis::capture::StubFrameGrabber::from_luma(
        frame(0).data,
        WIDTH,
        HEIGHT,
        Duration::from_millis(250),
    )
    .with_limit(8);
    CaptureLoop::new(Box::new(source), scheduler, messages, stats.clone())
        .run()
        .unwrap();
    // dropping the processor joins the full frame writer
    pipeline.join().unwrap();

    let mut files: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    files.sort();

    let regions: Vec<&String> = files.iter().filter(|f| f.starts_with("ant_")).collect();
    assert_eq!(regions.len(), 1, "{:?}", files);
    assert!(regions[0].starts_with("ant_42_"));

    // marker at the origin: the window is clamped to the top-left corner
    let region = image::open(dir.path().join(regions[0])).unwrap().into_luma8();
    assert_eq!(region.dimensions(), (64, 64));
    assert_eq!(region.get_pixel(5, 0).0[0], 5);

    let full: Vec<&String> = files.iter().filter(|f| f.starts_with("frame_")).collect();
    assert_eq!(full.len(), 1, "{:?}", files);
    assert_eq!(stats.snapshot().regions_exported, 1);
}
