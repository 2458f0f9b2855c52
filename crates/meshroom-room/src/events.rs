//! Events re-emitted to consumers of a room manager.

use meshroom_protocol::{PeerId, RoomId};
use meshroom_registry::RegistryEntry;
use tokio::sync::broadcast;

/// Something consumers of the room layer may want to react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomEvent {
    /// The set of known rooms changed (or was refreshed).
    RoomListUpdate(Vec<RegistryEntry>),
    /// A peer became a member of the current room.
    PlayerJoin(PeerId),
    /// A peer left the current room, gracefully or not.
    PlayerLeave(PeerId),
    /// A game-state snapshot from the host.
    GameStateUpdate(Vec<u8>),
    /// The current room has a new host.
    HostMigration(PeerId),
    /// A participant's action, delivered to the host only.
    PlayerAction { from: PeerId, action: Vec<u8> },
    /// The host dissolved the current room.
    RoomClosed(RoomId),
}

/// Discriminant of [`RoomEvent`], for [`RoomManager::on`](crate::RoomManager::on).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    RoomListUpdate,
    PlayerJoin,
    PlayerLeave,
    GameStateUpdate,
    HostMigration,
    PlayerAction,
    RoomClosed,
}

impl RoomEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            RoomEvent::RoomListUpdate(_) => EventKind::RoomListUpdate,
            RoomEvent::PlayerJoin(_) => EventKind::PlayerJoin,
            RoomEvent::PlayerLeave(_) => EventKind::PlayerLeave,
            RoomEvent::GameStateUpdate(_) => EventKind::GameStateUpdate,
            RoomEvent::HostMigration(_) => EventKind::HostMigration,
            RoomEvent::PlayerAction { .. } => EventKind::PlayerAction,
            RoomEvent::RoomClosed(_) => EventKind::RoomClosed,
        }
    }
}

/// Fan-out of [`RoomEvent`]s to any number of subscribers.
#[derive(Debug, Clone)]
pub(crate) struct EventBus {
    sender: broadcast::Sender<RoomEvent>,
}

impl EventBus {
    pub(crate) fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub(crate) fn emit(&self, event: RoomEvent) {
        tracing::trace!(kind = ?event.kind(), "room event");
        // No subscribers is fine.
        let _ = self.sender.send(event);
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<RoomEvent> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind() {
        assert_eq!(
            RoomEvent::PlayerJoin(PeerId::new("bob")).kind(),
            EventKind::PlayerJoin
        );
        assert_eq!(
            RoomEvent::PlayerAction {
                from: PeerId::new("bob"),
                action: vec![1],
            }
            .kind(),
            EventKind::PlayerAction
        );
    }

    #[test]
    fn test_emit_without_subscribers_is_harmless() {
        let bus = EventBus::new(4);
        bus.emit(RoomEvent::GameStateUpdate(vec![1]));
    }

    #[tokio::test]
    async fn test_every_subscriber_sees_every_event() {
        let bus = EventBus::new(4);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        bus.emit(RoomEvent::HostMigration(PeerId::new("bob")));
        assert_eq!(
            a.recv().await.unwrap(),
            RoomEvent::HostMigration(PeerId::new("bob"))
        );
        assert_eq!(
            b.recv().await.unwrap(),
            RoomEvent::HostMigration(PeerId::new("bob"))
        );
    }
}
