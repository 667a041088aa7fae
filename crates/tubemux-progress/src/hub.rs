//! Progress fan-out.
//!
//! Each subscriber owns a bounded channel. Publishing never waits: a
//! subscriber whose channel is full or closed is dropped from the hub and the
//! broadcast carries on to everyone else.

use futures_util::Stream;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use tubemux_models::ProgressEvent;

/// Default per-subscriber buffer.
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 64;

/// Handle identifying one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

struct HubInner {
    subscribers: Mutex<HashMap<SubscriptionId, mpsc::Sender<ProgressEvent>>>,
    next_id: AtomicU64,
    buffer: usize,
}

impl HubInner {
    // A panic while holding the lock cannot leave the map half-updated
    fn subscribers(&self) -> MutexGuard<'_, HashMap<SubscriptionId, mpsc::Sender<ProgressEvent>>> {
        self.subscribers.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Broadcast hub for [`ProgressEvent`]s. Cheap to clone.
#[derive(Clone)]
pub struct ProgressHub {
    inner: Arc<HubInner>,
}

impl Default for ProgressHub {
    fn default() -> Self {
        Self::new(DEFAULT_SUBSCRIBER_BUFFER)
    }
}

impl fmt::Debug for ProgressHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressHub")
            .field("subscribers", &self.subscriber_count())
            .field("buffer", &self.inner.buffer)
            .finish()
    }
}

impl ProgressHub {
    /// Create a hub whose subscribers each buffer up to `buffer` events.
    pub fn new(buffer: usize) -> Self {
        Self {
            inner: Arc::new(HubInner {
                subscribers: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                buffer: buffer.max(1),
            }),
        }
    }

    /// Register a subscriber. It sees every event published from now on.
    pub fn subscribe(&self) -> Subscription {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(self.inner.buffer);

        let count = {
            let mut subscribers = self.inner.subscribers();
            subscribers.insert(id, tx);
            subscribers.len()
        };
        debug!(subscription = %id, subscribers = count, "Progress subscriber added");

        Subscription {
            id,
            rx,
            hub: Arc::downgrade(&self.inner),
        }
    }

    /// Remove a subscriber. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        if self.inner.subscribers().remove(&id).is_some() {
            debug!(subscription = %id, "Progress subscriber removed");
        }
    }

    /// Deliver `event` to every subscriber without waiting.
    ///
    /// Returns how many subscribers received it.
    pub fn publish(&self, event: ProgressEvent) -> usize {
        let mut subscribers = self.inner.subscribers();
        let mut delivered = 0;
        let mut dropped = Vec::new();

        for (id, tx) in subscribers.iter() {
            match tx.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(subscription = %id, "Progress subscriber lagging, dropping it");
                    dropped.push(*id);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => dropped.push(*id),
            }
        }

        for id in dropped {
            subscribers.remove(&id);
        }

        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers().len()
    }
}

/// Receiving side of a hub subscription. Unsubscribes on drop.
pub struct Subscription {
    id: SubscriptionId,
    rx: mpsc::Receiver<ProgressEvent>,
    hub: std::sync::Weak<HubInner>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Next event, or `None` once the hub dropped this subscriber.
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        self.rx.recv().await
    }

    /// Non-blocking receive.
    pub fn try_recv(&mut self) -> Option<ProgressEvent> {
        self.rx.try_recv().ok()
    }

    /// Adapt into a [`Stream`] that keeps the subscription alive.
    pub fn into_stream(self) -> impl Stream<Item = ProgressEvent> + Send + 'static {
        futures_util::stream::unfold(self, |mut sub| async move {
            sub.recv().await.map(|event| (event, sub))
        })
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.hub.upgrade() {
            inner.subscribers().remove(&self.id);
        }
    }
}
