//! Preallocated object pools for preview buffers and readout messages
//!
//! Slots are handed out as [`Pooled`] handles that go back to the free list
//! when dropped. Wrap a handle in an `Arc` to share it read-only; the slot is
//! recycled once the last reference is gone, on every exit path.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use image::GrayImage;
use tracing::{info, warn};

use super::message::ResultMessage;

/// How often a starved `get()` reports that it is still waiting.
const STALL_REPORT_INTERVAL: Duration = Duration::from_secs(1);

/// Fixed-capacity pool. The pool never shrinks and never grows after `reserve`.
pub struct Pool<T> {
    shared: Arc<Shared<T>>,
}

struct Shared<T> {
    free_tx: Sender<T>,
    free_rx: Receiver<T>,
    capacity: usize,
    label: &'static str,
}

impl<T> Clone for Pool<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Pool<T> {
    /// Eagerly allocate `count` slots with `make`.
    pub fn reserve(count: usize, label: &'static str, mut make: impl FnMut() -> T) -> Self {
        let (free_tx, free_rx) = channel::bounded(count.max(1));
        for _ in 0..count {
            // Capacity equals count, so this never blocks
            let _ = free_tx.send(make());
        }
        info!(pool = label, count, "Reserved pool slots");
        Self {
            shared: Arc::new(Shared {
                free_tx,
                free_rx,
                capacity: count,
                label,
            }),
        }
    }

    /// Take a free slot, waiting for a release if none is available.
    ///
    /// Waiting means the pool was sized too small for the configured consumers.
    pub fn get(&self) -> Pooled<T> {
        if let Ok(item) = self.shared.free_rx.try_recv() {
            return self.wrap(item);
        }

        metrics::counter!("artemis_pool_stalls", "pool" => self.shared.label).increment(1);
        warn!(
            pool = self.shared.label,
            capacity = self.shared.capacity,
            "Pool exhausted, waiting for a slot to be released"
        );
        loop {
            match self.shared.free_rx.recv_timeout(STALL_REPORT_INTERVAL) {
                Ok(item) => return self.wrap(item),
                Err(RecvTimeoutError::Timeout) => warn!(
                    pool = self.shared.label,
                    capacity = self.shared.capacity,
                    "Still waiting for a pool slot; check pool sizing"
                ),
                // Shared holds a sender, so the channel cannot disconnect
                Err(RecvTimeoutError::Disconnected) => unreachable!("pool free list disconnected"),
            }
        }
    }

    /// Slots currently free.
    pub fn available(&self) -> usize {
        self.shared.free_rx.len()
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    fn wrap(&self, item: T) -> Pooled<T> {
        Pooled {
            item: Some(item),
            home: Arc::clone(&self.shared),
        }
    }
}

/// Checked-out pool slot; returns home on drop.
pub struct Pooled<T> {
    // Only `None` while being dropped
    item: Option<T>,
    home: Arc<Shared<T>>,
}

impl<T> Deref for Pooled<T> {
    type Target = T;

    fn deref(&self) -> &T {
        match &self.item {
            Some(item) => item,
            None => unreachable!("pooled slot used after release"),
        }
    }
}

impl<T> DerefMut for Pooled<T> {
    fn deref_mut(&mut self) -> &mut T {
        match &mut self.item {
            Some(item) => item,
            None => unreachable!("pooled slot used after release"),
        }
    }
}

impl<T> Drop for Pooled<T> {
    fn drop(&mut self) {
        if let Some(item) = self.item.take() {
            let _ = self.home.free_tx.send(item);
        }
    }
}

/// Pool of preview images of one fixed size.
pub type BufferPool = Pool<GrayImage>;

/// Preview image shared read-only between consumers.
pub type SharedImage = Arc<Pooled<GrayImage>>;

/// Pool of reusable readout messages.
pub type MessagePool = Pool<ResultMessage>;

impl Pool<GrayImage> {
    pub fn reserve_images(count: usize, width: u32, height: u32) -> Self {
        Self::reserve(count, "preview", || GrayImage::new(width, height))
    }
}

impl Pool<ResultMessage> {
    pub fn reserve_messages(count: usize) -> Self {
        Self::reserve(count, "readout", ResultMessage::default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn slots_return_when_last_reference_drops() {
        let pool = BufferPool::reserve_images(2, 4, 4);
        assert_eq!(pool.available(), 2);

        let shared: SharedImage = Arc::new(pool.get());
        let second_ref = Arc::clone(&shared);
        assert_eq!(pool.available(), 1);

        drop(shared);
        assert_eq!(pool.available(), 1);
        drop(second_ref);
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn recycled_slots_keep_their_contents_and_size() {
        let pool = BufferPool::reserve_images(1, 3, 2);
        {
            let mut image = pool.get();
            image.put_pixel(1, 1, image::Luma([42]));
        }
        let image = pool.get();
        assert_eq!(image.dimensions(), (3, 2));
        assert_eq!(image.get_pixel(1, 1).0[0], 42);
    }

    #[test]
    fn get_waits_for_a_release_from_another_thread() {
        let pool = MessagePool::reserve_messages(1);
        let held = pool.get();

        let waiter = {
            let pool = pool.clone();
            thread::spawn(move || {
                let mut message = pool.get();
                message.frame_id = 7;
            })
        };

        thread::sleep(Duration::from_millis(20));
        drop(held);
        waiter.join().unwrap();
        assert_eq!(pool.available(), 1);
        assert_eq!(pool.get().frame_id, 7);
    }

    #[test]
    fn slot_returns_when_its_holder_panics() {
        let pool = MessagePool::reserve_messages(1);

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let mut message = pool.get();
            message.frame_id = 3;
            panic!("consumer failed");
        }));

        assert!(outcome.is_err());
        assert_eq!(pool.available(), 1);
        assert_eq!(pool.get().frame_id, 3);
    }
}
