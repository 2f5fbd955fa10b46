//! Typed change/failure notifications for engine consumers.

use log::debug;
use tokio::sync::broadcast;

use crate::error::SyncError;
use crate::types::OperationKind;

/// Engine event delivered to every subscriber.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// A merge committed; `added` counts ids that were not held before
    CollectionChanged {
        operation: OperationKind,
        added: usize,
        total: usize,
    },
    /// A fetch failed; the collection is unchanged
    OperationFailed {
        operation: OperationKind,
        error: SyncError,
    },
    /// Cached records were restored without a network round trip
    Hydrated { total: usize },
    /// Collection and cache were cleared
    Reset,
}

/// Broadcast fan-out owned by the engine.
///
/// Subscribers that fall more than `capacity` events behind skip ahead
/// (`RecvError::Lagged`) instead of blocking the engine.
#[derive(Debug)]
pub(crate) struct EventBus {
    sender: broadcast::Sender<SyncEvent>,
}

impl EventBus {
    pub(crate) fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.sender.subscribe()
    }

    pub(crate) fn emit(&self, event: SyncEvent) {
        // No subscribers is not an error
        if self.sender.send(event).is_err() {
            debug!("[SyncEngine] Event dropped, no subscribers");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_every_subscriber_receives() {
        let bus = EventBus::new(4);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        bus.emit(SyncEvent::Reset);
        assert_eq!(a.recv().await.unwrap(), SyncEvent::Reset);
        assert_eq!(b.recv().await.unwrap(), SyncEvent::Reset);
    }

    #[test]
    fn test_emit_without_subscribers() {
        let bus = EventBus::new(1);
        bus.emit(SyncEvent::Reset);
    }
}
