use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::bridge::protocol::Event;

/// Receiving end of one subscription. Ends when the bus closes or the
/// subscription is removed.
pub struct Subscription {
    pub id: u64,
    receiver: Receiver<Event>,
}

impl Subscription {
    pub fn recv(&self) -> Option<Event> {
        self.receiver.recv().ok()
    }

    /// Fails with `Timeout` if nothing arrived in time and `Disconnected`
    /// once the subscription has ended.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Event, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    pub fn try_recv(&self) -> Option<Event> {
        self.receiver.try_recv().ok()
    }

    pub fn iter(&self) -> impl Iterator<Item = Event> + '_ {
        self.receiver.iter()
    }
}

/// Fan-out of events to explicit subscribers.
#[derive(Default)]
pub struct EventBus {
    next_id: AtomicU64,
    subscribers: Mutex<HashMap<u64, Sender<Event>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (sender, receiver) = unbounded();
        self.subscribers.lock().insert(id, sender);
        Subscription { id, receiver }
    }

    /// Returns false if `id` was not subscribed.
    pub fn unsubscribe(&self, id: u64) -> bool {
        self.subscribers.lock().remove(&id).is_some()
    }

    pub fn publish(&self, event: &Event) {
        self.subscribers
            .lock()
            .retain(|_, sender| sender.send(event.clone()).is_ok());
    }

    /// End every subscription.
    pub fn close(&self) {
        self.subscribers.lock().clear();
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

/// Host-side outlet for events raised by handlers.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: Event);
}

impl EventSink for EventBus {
    fn emit(&self, event: Event) {
        self.publish(&event);
    }
}
