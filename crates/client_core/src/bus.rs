//! Typed publish/subscribe bus connecting the controller, the launcher and
//! any deferred analytics bootstrap.

use shared::protocol::ConsentEvent;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::debug;

const DEFAULT_BUS_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ConsentEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUS_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Broadcasts `event` and returns how many subscribers received it.
    /// Publishing with nobody listening is normal and returns zero.
    pub fn publish(&self, event: ConsentEvent) -> usize {
        match self.sender.send(event) {
            Ok(receivers) => {
                debug!(event = event.name(), receivers, "consent bus: event published");
                receivers
            }
            Err(_) => {
                debug!(event = event.name(), "consent bus: event published without subscribers");
                0
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConsentEvent> {
        self.sender.subscribe()
    }

    pub fn stream(&self) -> BroadcastStream<ConsentEvent> {
        BroadcastStream::new(self.subscribe())
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
