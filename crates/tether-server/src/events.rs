use tokio::sync::broadcast;
use tracing::trace;

use tether_types::ServerEvent;

/// Fan-out of [`ServerEvent`]s to every subscriber.
///
/// Emitting never blocks a connection task. A subscriber that falls more
/// than `capacity` events behind gets `RecvError::Lagged` and loses the
/// oldest ones.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ServerEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.tx.subscribe()
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn emit(&self, event: ServerEvent) {
        trace!("event [{}]: {:?}", event.conn_id().unwrap_or("server"), event);
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn every_subscriber_sees_every_event() {
        let bus = EventBus::new(8);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        bus.emit(ServerEvent::ClientConnected { conn_id: "x".into() });

        assert_eq!(a.recv().await.unwrap(), ServerEvent::ClientConnected { conn_id: "x".into() });
        assert_eq!(b.recv().await.unwrap(), ServerEvent::ClientConnected { conn_id: "x".into() });
    }

    #[test]
    fn emit_without_subscribers_is_fine() {
        let bus = EventBus::new(1);
        bus.emit(ServerEvent::ServerStopped { message: "bye".into() });
    }
}
