//! Three peers on an in-process hub: one hosts, two join, the host
//! crashes and the room survives under a new host.
//!
//! ```text
//! RUST_LOG=meshroom_room=debug cargo run -p lobby-sim
//! ```

use std::time::Duration;

use meshroom::prelude::*;

async fn peer(hub: &LocalHub, id: &str) -> Result<RoomManager, MeshroomError> {
    let config = MeshConfig {
        announce_interval: Duration::from_secs(1),
        ..MeshConfig::default()
    };
    let manager = RoomManager::builder()
        .config(config)
        .start(hub.mesh(PeerId::new(id)))
        .await?;
    Ok(manager)
}

/// Prints every event a peer sees, tagged with the peer's id.
fn narrate(manager: &RoomManager) -> Vec<Listener> {
    let kinds = [
        EventKind::PlayerJoin,
        EventKind::PlayerLeave,
        EventKind::GameStateUpdate,
        EventKind::HostMigration,
        EventKind::PlayerAction,
        EventKind::RoomClosed,
    ];
    kinds
        .into_iter()
        .map(|kind| {
            let who = manager.self_id().clone();
            manager.on(kind, move |event| println!("[{who}] {event:?}"))
        })
        .collect()
}

#[tokio::main]
async fn main() -> Result<(), MeshroomError> {
    meshroom::init_tracing("info");

    let hub = LocalHub::new();
    let alice = peer(&hub, "alice").await?;
    let bob = peer(&hub, "bob").await?;
    let carol = peer(&hub, "carol").await?;
    let _listeners: Vec<Listener> = [&alice, &bob, &carol]
        .into_iter()
        .flat_map(narrate)
        .collect();

    let room = alice.create_room("Friday Night Arena", 4, b"mode=ffa".to_vec()).await?;
    tracing::info!(room_id = %room.id, "alice is hosting");

    for entry in carol.room_list(RoomFilter::HasFreeSlot).await? {
        println!(
            "carol sees {:?} hosted by {} ({}/{})",
            entry.room.name, entry.room.host_id, entry.room.player_count, entry.room.max_players
        );
    }

    bob.join_room(&room.id).await?;
    carol.join_room(&room.id).await?;
    alice.send_game_state(b"round=1".to_vec()).await?;
    carol.send_player_action(b"ready".to_vec()).await?;
    tokio::time::sleep(Duration::from_millis(50)).await;

    println!("-- alice crashes --");
    hub.crash(alice.self_id());
    tokio::time::sleep(Duration::from_millis(200)).await;

    if let Some(room) = carol.current_room().await? {
        println!("carol's room is now hosted by {} with {:?}", room.host_id, room.players);
    }
    bob.send_game_state(b"round=2".to_vec()).await?;
    tokio::time::sleep(Duration::from_millis(50)).await;

    println!("-- bob closes the room --");
    bob.leave_room().await?;
    tokio::time::sleep(Duration::from_millis(50)).await;

    for manager in [alice, bob, carol] {
        manager.destroy().await?;
    }
    Ok(())
}
