//! Periodic full-resolution frame export on a background thread

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use flume::{Receiver, Sender, TrySendError};
use image::GrayImage;
use tracing::{error, info, warn};

use super::{ExportOutcome, FullFrameSink};
use crate::capture::Frame;
use crate::error::ExportError;

/// Writes `<dir>/frame_<id>.png`, one export at a time.
pub struct FullFrameExporter {
    dir: PathBuf,
    tx: Option<Sender<Frame>>,
    outcomes: Receiver<ExportOutcome>,
    pending: Arc<AtomicBool>,
    writer: Option<JoinHandle<()>>,
}

impl FullFrameExporter {
    pub fn spawn(dir: impl Into<PathBuf>) -> Result<Self, ExportError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;

        let (tx, rx) = flume::bounded::<Frame>(1);
        // One export in flight at a time, so one uncollected outcome at most
        let (outcome_tx, outcomes) = flume::bounded::<ExportOutcome>(1);
        let pending = Arc::new(AtomicBool::new(false));
        let writer = {
            let dir = dir.clone();
            let pending = Arc::clone(&pending);
            thread::Builder::new()
                .name("frame-export".into())
                .spawn(move || {
                    while let Ok(frame) = rx.recv() {
                        let result = match write_frame(&dir, &frame) {
                            Ok(path) => {
                                info!(frame = frame.id(), "Exported {}", path.display());
                                Ok(())
                            }
                            Err(e) => {
                                error!(frame = frame.id(), "Full frame export failed: {}", e);
                                Err(e)
                            }
                        };
                        let outcome = ExportOutcome {
                            frame_id: frame.id(),
                            frame_time: frame.timestamp(),
                            result,
                        };
                        if let Err(TrySendError::Full(stale)) = outcome_tx.try_send(outcome) {
                            warn!(frame = stale.frame_id, "Previous export outcome never collected");
                        }
                        pending.store(false, Ordering::Release);
                    }
                })?
        };

        Ok(Self {
            dir,
            tx: Some(tx),
            outcomes,
            pending,
            writer: Some(writer),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Wait for the current export and stop the writer thread.
    pub fn shutdown(mut self) {
        self.close();
    }

    fn close(&mut self) {
        self.tx.take();
        if let Some(writer) = self.writer.take() {
            let _ = writer.join();
        }
    }
}

fn write_frame(dir: &Path, frame: &Frame) -> Result<PathBuf, ExportError> {
    let image = GrayImage::from_raw(frame.width(), frame.height(), frame.data.to_vec()).ok_or(
        ExportError::InvalidRegion {
            x: 0,
            y: 0,
            size: frame.width().max(frame.height()),
            width: frame.width(),
            height: frame.height(),
        },
    )?;
    let path = dir.join(format!("frame_{}.png", frame.id()));
    image.save(&path)?;
    Ok(path)
}

impl FullFrameSink for FullFrameExporter {
    fn export(&self, frame: &Frame) -> Result<(), ExportError> {
        let tx = self.tx.as_ref().ok_or(ExportError::Closed)?;
        if self
            .pending
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ExportError::Busy);
        }
        match tx.try_send(frame.clone()) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.pending.store(false, Ordering::Release);
                Err(match e {
                    TrySendError::Full(_) => ExportError::Busy,
                    TrySendError::Disconnected(_) => ExportError::Closed,
                })
            }
        }
    }

    fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    fn take_outcome(&self) -> Option<ExportOutcome> {
        self.outcomes.try_recv().ok()
    }
}

impl Drop for FullFrameExporter {
    fn drop(&mut self) {
        self.close();
    }
}
