use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::model::BookingEvent;

const CHANNEL_CAPACITY: usize = 256;

/// Receives lifecycle events after a transition has been persisted.
/// Formatting and delivery (mail, push) belong to the subscriber.
pub trait Notifier: Send + Sync {
    fn notify(&self, event: &BookingEvent);
}

/// Notifier that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _event: &BookingEvent) {}
}

/// Broadcast hub: one channel per hall plus a channel carrying every event.
pub struct NotifyHub {
    all: broadcast::Sender<BookingEvent>,
    channels: DashMap<String, broadcast::Sender<BookingEvent>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            all: broadcast::channel(CHANNEL_CAPACITY).0,
            channels: DashMap::new(),
        }
    }

    /// Subscribe to events for one hall. Creates the channel if needed.
    pub fn subscribe(&self, resource_id: &str) -> broadcast::Receiver<BookingEvent> {
        self.channels
            .entry(resource_id.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    pub fn subscribe_all(&self) -> broadcast::Receiver<BookingEvent> {
        self.all.subscribe()
    }

    /// Send an event. No-op if nobody is listening.
    pub fn send(&self, event: &BookingEvent) {
        let _ = self.all.send(event.clone());
        if let Some(sender) = self.channels.get(&event.resource_id) {
            let _ = sender.send(event.clone());
        }
    }

    /// Drop a hall's channel once nobody listens any more.
    pub fn prune(&self) {
        self.channels.retain(|_, sender| sender.receiver_count() > 0);
    }
}

impl Notifier for NotifyHub {
    fn notify(&self, event: &BookingEvent) {
        tracing::debug!(
            kind = ?event.kind,
            reservation = %event.reservation_id,
            "booking event"
        );
        self.send(event);
    }
}
