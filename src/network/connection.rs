//! TCP publisher for detection readouts

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use flume::{Receiver, Sender, TrySendError};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, error, info, warn};

use super::ResultSink;
use crate::pipeline::ResultMessage;

const RECONNECT_MIN: Duration = Duration::from_millis(250);
const RECONNECT_MAX: Duration = Duration::from_secs(5);

/// Reconnecting TCP link to the readout consumer.
///
/// Readouts are encoded on the calling thread and handed to an async writer
/// task through a bounded queue; when the queue is full the readout is dropped.
pub struct Connection {
    tx: Sender<Bytes>,
    addr: String,
    dropped: AtomicU64,
}

impl Connection {
    /// Start the writer task on `handle`. The task ends once every clone of
    /// the returned handle is dropped and the queue is flushed.
    pub fn spawn(
        handle: &tokio::runtime::Handle,
        addr: impl Into<String>,
        queue_capacity: usize,
    ) -> Arc<Self> {
        let addr = addr.into();
        let (tx, rx) = flume::bounded(queue_capacity.max(1));
        handle.spawn(Self::run(addr.clone(), rx));
        Arc::new(Self {
            tx,
            addr,
            dropped: AtomicU64::new(0),
        })
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Readouts discarded because the outbound queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    async fn run(addr: String, rx: Receiver<Bytes>) {
        let mut backoff = RECONNECT_MIN;
        loop {
            let mut stream = match TcpStream::connect(&addr).await {
                Ok(stream) => {
                    info!("Connected to readout consumer {}", addr);
                    backoff = RECONNECT_MIN;
                    stream
                }
                Err(e) => {
                    if rx.is_disconnected() {
                        debug!("Publisher closed before connecting to {}", addr);
                        return;
                    }
                    warn!("Cannot connect to {}: {} (retry in {:?})", addr, e, backoff);
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(RECONNECT_MAX);
                    continue;
                }
            };
            if let Err(e) = stream.set_nodelay(true) {
                debug!("TCP_NODELAY not set on {}: {}", addr, e);
            }

            loop {
                let Ok(payload) = rx.recv_async().await else {
                    let _ = stream.shutdown().await;
                    info!("Readout connection to {} closed", addr);
                    return;
                };
                if let Err(e) = stream.write_all(&payload).await {
                    warn!("Lost connection to {}: {}", addr, e);
                    break;
                }
            }
        }
    }
}

impl ResultSink for Connection {
    fn publish(&self, message: &ResultMessage) {
        let payload = match message.to_wire() {
            Ok(payload) => payload,
            Err(e) => {
                error!(frame = message.frame_id, "Cannot encode readout: {}", e);
                return;
            }
        };
        match self.tx.try_send(payload) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if dropped == 1 || dropped % 100 == 0 {
                    warn!(
                        frame = message.frame_id,
                        dropped, "Readout queue to {} full, dropping", self.addr
                    );
                }
            }
            Err(TrySendError::Disconnected(_)) => {
                debug!(frame = message.frame_id, "Readout writer gone, dropping");
            }
        }
    }
}
