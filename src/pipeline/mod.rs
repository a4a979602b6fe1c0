//! Frame processing: admission, per-cycle stages and their shared state

pub mod admission;
pub mod capture_loop;
pub mod catalog;
pub mod concurrency;
pub mod message;
pub mod pool;
pub mod preview;
pub mod process;
pub mod schedule;
pub mod stats;
pub mod stride;

pub use admission::{admission_gate, Admission, AdmissionQueue, AdmissionScheduler, Cycle};
pub use capture_loop::CaptureLoop;
pub use catalog::{Candidate, CatalogWindow, RegionOfInterest};
pub use concurrency::ConcurrencyController;
pub use message::{MarkerReadout, ReadoutError, ResultMessage, WallTime};
pub use pool::{BufferPool, MessagePool, Pool, Pooled, SharedImage};
pub use process::{FrameProcessor, ProcessSettings, Sinks};
pub use schedule::ExportSchedule;
pub use stats::{PipelineStats, StatsSnapshot};
pub use stride::StrideFilter;

pub use crate::network::ResultSink;
