//! Fan-out of produced frames to registered intakes
//!
//! Delivery is fire-and-forget. There is no backpressure: an unbounded intake
//! whose consumer stalls grows without limit.

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Anything that can accept a published item
pub trait Intake<T>: Send + Sync {
    fn put(&self, item: T);
}

impl<T: Send> Intake<T> for Sender<T> {
    fn put(&self, item: T) {
        // A dropped receiver means the consumer is gone; nothing to report
        let _ = self.send(item);
    }
}

/// Collecting sink, mostly useful for tests and offline capture
impl<T: Send> Intake<T> for Arc<Mutex<Vec<T>>> {
    fn put(&self, item: T) {
        if let Ok(mut items) = self.lock() {
            items.push(item);
        }
    }
}

/// Broadcasts items to every registered intake
///
/// Cloning yields another handle to the same subscriber list, so intakes can
/// be registered after the publishing stage has moved onto its thread.
pub struct Broadcast<T> {
    subscribers: Arc<Mutex<Vec<Box<dyn Intake<T>>>>>,
}

impl<T> Clone for Broadcast<T> {
    fn clone(&self) -> Self {
        Self {
            subscribers: Arc::clone(&self.subscribers),
        }
    }
}

impl<T: Clone> Default for Broadcast<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Broadcast<T> {
    /// Create a broadcast with no subscribers
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Register a destination; delivery follows registration order
    pub fn subscribe<I: Intake<T> + 'static>(&self, intake: I) {
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.push(Box::new(intake));
        }
    }

    /// Deliver `item` to every current subscriber
    pub fn publish(&self, item: T) {
        if let Ok(subs) = self.subscribers.lock() {
            for intake in subs.iter() {
                intake.put(item.clone());
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().map(|subs| subs.len()).unwrap_or(0)
    }
}

/// Chaining: a broadcast can itself subscribe to another broadcast
impl<T: Clone + Send> Intake<T> for Broadcast<T> {
    fn put(&self, item: T) {
        self.publish(item);
    }
}

/// Unbounded intake owned by a consuming stage
///
/// Safe for any number of producers; drained only by the owning loop.
pub struct Inbox<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
}

impl<T> Default for Inbox<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Inbox<T> {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    /// Producer handle to register with an upstream [`Broadcast`]
    pub fn intake(&self) -> Sender<T> {
        self.tx.clone()
    }

    /// Wait up to `timeout` for the next item; `None` on an idle poll
    pub fn poll(&self, timeout: Duration) -> Option<T> {
        match self.rx.recv_timeout(timeout) {
            Ok(item) => Some(item),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Non-blocking poll
    pub fn try_poll(&self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Number of queued items
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
