//! Backpressure gate between the capture loop and the processing pipeline
//!
//! At most `depth` cycles are outstanding (queued or running). Frames arriving
//! while the gate is full are handed back to the caller as an overflow instead
//! of queueing: a stale detection is worth nothing to a real-time tracker,
//! knowing that a frame was lost is.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use flume::{Receiver, Sender, TrySendError};
use tracing::debug;

use crate::capture::Frame;

/// Outcome of [`AdmissionScheduler::try_admit`].
#[derive(Debug)]
pub enum Admission {
    /// The frame now belongs to the pipeline.
    Admitted,
    /// Too many cycles outstanding; the frame comes back to the caller.
    Overflow(Frame),
    /// The pipeline is gone.
    Closed(Frame),
}

struct GateState {
    outstanding: AtomicUsize,
}

/// Producer side of the gate, owned by the capture loop.
#[derive(Clone)]
pub struct AdmissionScheduler {
    tx: Sender<Option<Frame>>,
    state: Arc<GateState>,
    depth: usize,
}

/// Consumer side of the gate, owned by the pipeline.
pub struct AdmissionQueue {
    rx: Receiver<Option<Frame>>,
    state: Arc<GateState>,
}

/// An admitted frame. Dropping it marks the cycle complete.
pub struct Cycle {
    pub frame: Frame,
    _guard: CycleGuard,
}

struct CycleGuard(Arc<GateState>);

impl Drop for CycleGuard {
    fn drop(&mut self) {
        self.0.outstanding.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Build a gate admitting at most `depth` outstanding cycles (1 = single-flight).
pub fn admission_gate(depth: usize) -> (AdmissionScheduler, AdmissionQueue) {
    let depth = depth.max(1);
    // One extra slot so the shutdown sentinel always fits
    let (tx, rx) = flume::bounded(depth + 1);
    let state = Arc::new(GateState {
        outstanding: AtomicUsize::new(0),
    });
    (
        AdmissionScheduler {
            tx,
            state: Arc::clone(&state),
            depth,
        },
        AdmissionQueue { rx, state },
    )
}

impl AdmissionScheduler {
    /// Admit `frame` if fewer than `depth` cycles are outstanding. Never blocks.
    pub fn try_admit(&self, frame: Frame) -> Admission {
        let depth = self.depth;
        let reserved = self
            .state
            .outstanding
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < depth).then_some(n + 1)
            })
            .is_ok();
        if !reserved {
            return Admission::Overflow(frame);
        }

        match self.tx.try_send(Some(frame)) {
            Ok(()) => Admission::Admitted,
            Err(TrySendError::Full(frame)) => {
                self.state.outstanding.fetch_sub(1, Ordering::AcqRel);
                match frame {
                    Some(frame) => Admission::Overflow(frame),
                    None => unreachable!("only frames are sent by try_admit"),
                }
            }
            Err(TrySendError::Disconnected(frame)) => {
                self.state.outstanding.fetch_sub(1, Ordering::AcqRel);
                match frame {
                    Some(frame) => Admission::Closed(frame),
                    None => unreachable!("only frames are sent by try_admit"),
                }
            }
        }
    }

    /// Cycles admitted and not yet completed.
    pub fn outstanding(&self) -> usize {
        self.state.outstanding.load(Ordering::Acquire)
    }

    pub fn is_idle(&self) -> bool {
        self.outstanding() == 0
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Push the shutdown sentinel. The pipeline finishes what is queued, then stops.
    pub fn close(&self) {
        debug!("Closing admission gate");
        let _ = self.tx.send(None);
    }
}

impl AdmissionQueue {
    /// Next admitted frame, or `None` once the sentinel is reached.
    pub fn next(&self) -> Option<Cycle> {
        match self.rx.recv() {
            Ok(Some(frame)) => Some(Cycle {
                frame,
                _guard: CycleGuard(Arc::clone(&self.state)),
            }),
            Ok(None) | Err(_) => None,
        }
    }

    /// Whether a newer frame was admitted behind the cycle currently running.
    pub fn has_newer(&self) -> bool {
        self.state.outstanding.load(Ordering::Acquire) > 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::FrameMetadata;
    use bytes::Bytes;
    use std::time::{Duration, SystemTime};

    fn frame(id: u64) -> Frame {
        Frame::new(
            Bytes::from_static(&[0]),
            FrameMetadata {
                id,
                device_timestamp: Duration::ZERO,
                time: SystemTime::now(),
                width: 1,
                height: 1,
            },
        )
    }

    #[test]
    fn single_flight_overflows_until_cycle_completes() {
        let (scheduler, queue) = admission_gate(1);

        assert!(matches!(scheduler.try_admit(frame(0)), Admission::Admitted));
        let cycle_a = queue.next().unwrap();
        assert_eq!(cycle_a.frame.id(), 0);

        match scheduler.try_admit(frame(1)) {
            Admission::Overflow(frame) => assert_eq!(frame.id(), 1),
            other => panic!("expected overflow, got {:?}", other),
        }

        drop(cycle_a);
        assert!(scheduler.is_idle());
        assert!(matches!(scheduler.try_admit(frame(2)), Admission::Admitted));
        assert_eq!(queue.next().unwrap().frame.id(), 2);
    }

    #[test]
    fn queued_frame_counts_as_outstanding() {
        let (scheduler, _queue) = admission_gate(1);
        assert!(matches!(scheduler.try_admit(frame(0)), Admission::Admitted));
        assert!(matches!(scheduler.try_admit(frame(1)), Admission::Overflow(_)));
        assert_eq!(scheduler.outstanding(), 1);
    }

    #[test]
    fn deeper_gate_reports_newer_frames() {
        let (scheduler, queue) = admission_gate(2);
        assert!(matches!(scheduler.try_admit(frame(0)), Admission::Admitted));
        let running = queue.next().unwrap();
        assert!(!queue.has_newer());

        assert!(matches!(scheduler.try_admit(frame(1)), Admission::Admitted));
        assert!(queue.has_newer());
        assert!(matches!(scheduler.try_admit(frame(2)), Admission::Overflow(_)));

        drop(running);
        let next = queue.next().unwrap();
        assert_eq!(next.frame.id(), 1);
        assert!(!queue.has_newer());
    }

    #[test]
    fn sentinel_ends_the_queue_after_pending_frames() {
        let (scheduler, queue) = admission_gate(1);
        assert!(matches!(scheduler.try_admit(frame(5)), Admission::Admitted));
        scheduler.close();

        assert_eq!(queue.next().unwrap().frame.id(), 5);
        assert!(queue.next().is_none());
    }

    #[test]
    fn dropped_queue_closes_the_gate() {
        let (scheduler, queue) = admission_gate(1);
        drop(queue);
        assert!(matches!(scheduler.try_admit(frame(0)), Admission::Closed(_)));
        assert!(scheduler.is_idle());
    }
}
