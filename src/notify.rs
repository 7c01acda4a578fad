use tokio::sync::broadcast;

use crate::model::Event;

const CHANNEL_CAPACITY: usize = 256;

/// Fan-out of committed changes. The mail dispatcher subscribes here and
/// reacts to `ReservationCommitted`; the engine never waits on listeners.
pub struct NotifyHub {
    sender: broadcast::Sender<Event>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            sender: broadcast::channel(CHANNEL_CAPACITY).0,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// No-op if nobody is listening. Slow listeners observe `Lagged`.
    pub fn send(&self, event: &Event) {
        let _ = self.sender.send(event.clone());
    }
}
