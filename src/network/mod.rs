//! Readout publication

pub mod connection;

pub use connection::Connection;

use crate::pipeline::ResultMessage;

/// Destination of per-frame readouts.
///
/// Fire-and-forget: implementations buffer or drop, they never block the
/// calling worker beyond a transient enqueue.
pub trait ResultSink: Send + Sync {
    fn publish(&self, message: &ResultMessage);
}
