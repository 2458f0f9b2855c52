//! Two room managers talking through a real WebSocket relay.

#![cfg(feature = "websocket")]

use std::time::Duration;

use meshroom::prelude::*;
use tokio::sync::broadcast;
use tokio::time::timeout;

async fn start_relay() -> String {
    let server = RelayServer::bind("127.0.0.1:0")
        .await
        .expect("should bind");
    let addr = server.local_addr().expect("should have an address");
    tokio::spawn(server.run());
    format!("ws://{addr}")
}

async fn next_event(rx: &mut broadcast::Receiver<RoomEvent>, kind: EventKind) -> RoomEvent {
    timeout(Duration::from_secs(5), async {
        loop {
            let event = rx.recv().await.expect("manager should be running");
            if event.kind() == kind {
                return event;
            }
        }
    })
    .await
    .expect("event should arrive in time")
}

/// Polls the room list until `room_id` shows up.
async fn wait_listed(manager: &RoomManager, room_id: &RoomId) {
    timeout(Duration::from_secs(5), async {
        loop {
            let rooms = manager.room_list(RoomFilter::All).await.unwrap();
            if rooms.iter().any(|e| e.id() == room_id) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("room should be announced");
}

#[tokio::test]
async fn test_create_join_and_play_over_relay() {
    meshroom::init_tracing("warn");
    let url = start_relay().await;

    let alice = RoomManager::start(RelayMesh::new(url.clone(), PeerId::new("alice")))
        .await
        .unwrap();
    let bob = RoomManager::start(RelayMesh::new(url, PeerId::new("bob")))
        .await
        .unwrap();
    let mut alice_events = alice.subscribe();
    let mut bob_events = bob.subscribe();

    let room = alice.create_room("Arena", 2, b"ranked".to_vec()).await.unwrap();
    wait_listed(&bob, &room.id).await;

    let joined = bob.join_room(&room.id).await.unwrap();
    assert_eq!(joined.host_id, PeerId::new("alice"));
    assert_eq!(joined.game_settings, b"ranked".to_vec());
    assert_eq!(
        next_event(&mut alice_events, EventKind::PlayerJoin).await,
        RoomEvent::PlayerJoin(PeerId::new("bob"))
    );

    alice.send_game_state(b"turn=1".to_vec()).await.unwrap();
    assert_eq!(
        next_event(&mut bob_events, EventKind::GameStateUpdate).await,
        RoomEvent::GameStateUpdate(b"turn=1".to_vec())
    );

    bob.send_player_action(b"move=e4".to_vec()).await.unwrap();
    assert_eq!(
        next_event(&mut alice_events, EventKind::PlayerAction).await,
        RoomEvent::PlayerAction {
            from: PeerId::new("bob"),
            action: b"move=e4".to_vec(),
        }
    );

    alice.destroy().await.unwrap();
    assert_eq!(
        next_event(&mut bob_events, EventKind::RoomClosed).await,
        RoomEvent::RoomClosed(room.id)
    );
    assert_eq!(bob.state().await.unwrap(), RoomState::NotInRoom);
    bob.destroy().await.unwrap();
}
