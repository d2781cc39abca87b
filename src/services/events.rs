//! Event system for bind mutations
//!
//! Every successful add or remove is broadcast as a [`BinderEvent`].
//! Delivery is fire-and-forget: a send with no subscribers, or a subscriber
//! that lags, never affects the mutation that produced the event.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, trace};

use crate::model::{Bind, BindAction, RelationKind};

/// Notification emitted after a bind is created or removed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinderEvent {
    pub kind: RelationKind,
    pub action: BindAction,
    pub bind: Bind,
}

impl BinderEvent {
    pub fn added(bind: Bind) -> Self {
        Self {
            kind: bind.kind.clone(),
            action: BindAction::Add,
            bind,
        }
    }

    pub fn removed(bind: Bind) -> Self {
        Self {
            kind: bind.kind.clone(),
            action: BindAction::Remove,
            bind,
        }
    }
}

/// Trait for event listeners
pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &BinderEvent);
}

/// Event bus for broadcasting bind events
pub struct EventBus {
    sender: broadcast::Sender<BinderEvent>,
}

impl EventBus {
    /// Create a new event bus with default capacity
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Emit an event to all subscribers
    pub fn emit(&self, event: BinderEvent) {
        trace!(event = ?event, "Emitting bind event");
        // No subscribers is not an error
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BinderEvent> {
        self.sender.subscribe()
    }

    /// Subscribe to events of one relation kind only
    pub fn subscribe_kind(&self, kind: RelationKind) -> KindSubscription {
        KindSubscription {
            kind,
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiver filtered to a single relation kind
pub struct KindSubscription {
    kind: RelationKind,
    receiver: broadcast::Receiver<BinderEvent>,
}

impl KindSubscription {
    /// Next event for this kind; events of other kinds are skipped
    pub async fn recv(&mut self) -> Result<BinderEvent, broadcast::error::RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if event.kind == self.kind {
                return Ok(event);
            }
        }
    }
}

/// Logging event listener for audit trails
pub struct LoggingEventListener;

impl EventListener for LoggingEventListener {
    fn on_event(&self, event: &BinderEvent) {
        debug!(
            kind = %event.kind,
            action = %event.action,
            author = %event.bind.author,
            target = %event.bind.target,
            id = %event.bind.id,
            "Bind event"
        );
    }
}

/// Spawn a background task feeding every event to `listener`
pub fn spawn_listener<L>(event_bus: Arc<EventBus>, listener: L) -> tokio::task::JoinHandle<()>
where
    L: EventListener + 'static,
{
    let mut receiver = event_bus.subscribe();

    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => listener.on_event(&event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!(skipped = n, "Event listener lagged, skipped events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed, stopping listener");
                    break;
                }
            }
        }
    })
}

/// Spawn a background task that logs all events
pub fn spawn_logging_listener(event_bus: Arc<EventBus>) -> tokio::task::JoinHandle<()> {
    spawn_listener(event_bus, LoggingEventListener)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EntityKey, EntityRef};
    use std::sync::Mutex;
    use tokio::time::{timeout, Duration};

    fn bind(kind: RelationKind) -> Bind {
        Bind {
            id: "b-1".into(),
            author: EntityRef::new("user.User", EntityKey::from(1)),
            target: EntityRef::new("catalog.Item", EntityKey::from(9)),
            kind,
            created_at: "2024-01-01T00:00:00.000Z".into(),
        }
    }

    #[tokio::test]
    async fn test_event_bus_emit_receive() {
        let bus = EventBus::new();
        let mut receiver = bus.subscribe();

        bus.emit(BinderEvent::added(bind(RelationKind::WISHLIST)));

        let event = timeout(Duration::from_millis(100), receiver.recv())
            .await
            .expect("timeout")
            .expect("receive error");

        assert_eq!(event.kind, RelationKind::WISHLIST);
        assert_eq!(event.action, BindAction::Add);
        assert_eq!(event.bind.id, "b-1");
    }

    #[tokio::test]
    async fn test_subscribe_kind_filters_other_kinds() {
        let bus = EventBus::new();
        let mut blacklist = bus.subscribe_kind(RelationKind::BLACKLIST);

        bus.emit(BinderEvent::added(bind(RelationKind::WISHLIST)));
        bus.emit(BinderEvent::removed(bind(RelationKind::BLACKLIST)));

        let event = timeout(Duration::from_millis(100), blacklist.recv())
            .await
            .expect("timeout")
            .expect("receive error");

        assert_eq!(event.kind, RelationKind::BLACKLIST);
        assert_eq!(event.action, BindAction::Remove);
    }

    #[test]
    fn test_event_bus_no_subscribers() {
        let bus = EventBus::new();
        bus.emit(BinderEvent::removed(bind(RelationKind::WISHLIST)));
        assert_eq!(bus.subscriber_count(), 0);
    }

    struct Recording(Arc<Mutex<Vec<BinderEvent>>>);

    impl EventListener for Recording {
        fn on_event(&self, event: &BinderEvent) {
            self.0.lock().unwrap().push(event.clone());
        }
    }

    #[tokio::test]
    async fn test_spawned_listener_receives_events() {
        let bus = Arc::new(EventBus::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let handle = spawn_listener(bus.clone(), Recording(seen.clone()));

        bus.emit(BinderEvent::added(bind(RelationKind::WISHLIST)));

        timeout(Duration::from_secs(1), async {
            while seen.lock().unwrap().is_empty() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("listener never saw the event");

        handle.abort();
        assert_eq!(seen.lock().unwrap()[0].action, BindAction::Add);
    }
}
