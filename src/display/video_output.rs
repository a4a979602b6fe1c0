//! Raw 8-bit video stream for an external encoder (e.g. `ffmpeg -f rawvideo`)

use std::io::Write;
use std::thread::{self, JoinHandle};

use flume::{Sender, TrySendError};
use tracing::{debug, error, info};

use super::PreviewSink;
use crate::pipeline::{ResultMessage, SharedImage};

/// Writes every presented preview to a byte stream on its own thread.
///
/// Frames presented while the previous one is still being written are dropped.
pub struct RawVideoOutput {
    tx: Option<Sender<SharedImage>>,
    writer: Option<JoinHandle<()>>,
}

impl RawVideoOutput {
    pub fn spawn<W: Write + Send + 'static>(mut out: W) -> std::io::Result<Self> {
        let (tx, rx) = flume::bounded::<SharedImage>(1);
        let writer = thread::Builder::new()
            .name("video-output".into())
            .spawn(move || {
                let mut written = 0u64;
                while let Ok(image) = rx.recv() {
                    let result = out.write_all(image.as_raw()).and_then(|_| out.flush());
                    if let Err(e) = result {
                        error!("Video output failed after {} frames: {}", written, e);
                        return;
                    }
                    written += 1;
                }
                info!("Video output closed after {} frames", written);
            })?;
        Ok(Self {
            tx: Some(tx),
            writer: Some(writer),
        })
    }

    /// Stdout, for piping into an encoder.
    pub fn stdout() -> std::io::Result<Self> {
        Self::spawn(std::io::stdout())
    }

    /// Flush pending frames and stop the writer thread.
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

impl PreviewSink for RawVideoOutput {
    fn present(&self, frame_id: u64, image: SharedImage, _readout: Option<&ResultMessage>) {
        let Some(tx) = self.tx.as_ref() else {
            return;
        };
        match tx.try_send(image) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => debug!(frame = frame_id, "Video output busy, frame dropped"),
            Err(TrySendError::Disconnected(_)) => debug!(frame = frame_id, "Video output closed"),
        }
    }

    /// One queued and one being written.
    fn retained_buffers(&self) -> usize {
        2
    }
}

impl Drop for RawVideoOutput {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::BufferPool;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Write for Capture {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn writes_raw_luminance_and_releases_the_buffer() {
        let sink = Capture::default();
        let output = RawVideoOutput::spawn(sink.clone()).unwrap();

        let pool = BufferPool::reserve_images(1, 2, 2);
        let mut image = pool.get();
        image.copy_from_slice(&[1, 2, 3, 4]);
        output.present(0, Arc::new(image), None);
        output.shutdown();

        assert_eq!(*sink.0.lock().unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(pool.available(), 1);
    }
}
