//! Fan-out of viewer events to every connected viewer.
//!
//! Delivery is best-effort: an event reaches the viewers connected at the
//! moment [`BroadcastHub::publish`] runs. Nothing is replayed to viewers that
//! join later and nothing is retained for viewers that left.

use std::{num::NonZeroUsize, sync::Arc};

use dashmap::DashMap;
use metrics::{counter, gauge};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};
use uuid::Uuid;
use zplcast_events::ViewerEvent;

use crate::infra::telemetry::{METRIC_BROADCAST_DELIVERIES, METRIC_VIEWERS_CONNECTED};

pub type ViewerId = Uuid;

/// Sink for viewer events, injected into the pipeline.
pub trait EventPublisher: Send + Sync {
    /// Hand `event` to every connected viewer; returns how many accepted it.
    fn publish(&self, event: ViewerEvent) -> usize;
}

/// Registry of connected viewers.
pub struct BroadcastHub {
    viewers: DashMap<ViewerId, mpsc::Sender<Arc<ViewerEvent>>>,
    viewer_buffer: NonZeroUsize,
}

/// Receiving half handed to a newly connected viewer.
#[derive(Debug)]
pub struct Subscription {
    id: ViewerId,
    receiver: mpsc::Receiver<Arc<ViewerEvent>>,
}

impl Subscription {
    pub fn id(&self) -> ViewerId {
        self.id
    }

    /// Wait for the next event; `None` once the hub dropped this viewer.
    pub async fn recv(&mut self) -> Option<Arc<ViewerEvent>> {
        self.receiver.recv().await
    }

    /// Non-blocking variant of [`Subscription::recv`].
    pub fn try_recv(&mut self) -> Option<Arc<ViewerEvent>> {
        self.receiver.try_recv().ok()
    }
}

impl BroadcastHub {
    pub fn new(viewer_buffer: NonZeroUsize) -> Self {
        Self {
            viewers: DashMap::new(),
            viewer_buffer,
        }
    }

    /// Register a viewer. No backlog is delivered.
    pub fn connect(&self) -> Subscription {
        let id = Uuid::new_v4();
        let (sender, receiver) = mpsc::channel(self.viewer_buffer.get());
        self.viewers.insert(id, sender);
        let connected = self.viewers.len();
        gauge!(METRIC_VIEWERS_CONNECTED).set(connected as f64);
        info!(
            target = "zplcast::broadcast",
            viewer_id = %id,
            connected,
            "viewer connected"
        );
        Subscription { id, receiver }
    }

    /// Remove a viewer; returns false when it was already gone.
    pub fn disconnect(&self, id: ViewerId) -> bool {
        let removed = self.viewers.remove(&id).is_some();
        let connected = self.viewers.len();
        gauge!(METRIC_VIEWERS_CONNECTED).set(connected as f64);
        if removed {
            info!(
                target = "zplcast::broadcast",
                viewer_id = %id,
                connected,
                "viewer disconnected"
            );
        }
        removed
    }

    pub fn viewer_count(&self) -> usize {
        self.viewers.len()
    }
}

impl EventPublisher for BroadcastHub {
    fn publish(&self, event: ViewerEvent) -> usize {
        let kind = event.kind();
        let event = Arc::new(event);
        let mut delivered = 0usize;
        let mut gone = Vec::new();

        for entry in self.viewers.iter() {
            match entry.value().try_send(Arc::clone(&event)) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(
                        target = "zplcast::broadcast",
                        viewer_id = %entry.key(),
                        event = kind,
                        "viewer is not keeping up; event skipped"
                    );
                }
                Err(TrySendError::Closed(_)) => gone.push(*entry.key()),
            }
        }

        // Pruned after iteration: removing while a shard guard is held deadlocks.
        for id in gone {
            self.disconnect(id);
        }

        counter!(METRIC_BROADCAST_DELIVERIES).increment(delivered as u64);
        debug!(
            target = "zplcast::broadcast",
            event = kind,
            delivered,
            "event published"
        );
        delivered
    }
}
