//! Convergence of independent registries.
//!
//! Several peers hear the same lobby traffic in different orders and with
//! different losses. As long as live hosts keep re-announcing, every
//! registry ends up listing exactly the live rooms once stale entries are
//! reaped.

use std::collections::BTreeSet;
use std::time::Duration;

use meshroom_protocol::{PeerId, RoomId, RoomSummary};
use meshroom_registry::{RoomFilter, RoomRegistry};
use rand::Rng;
use rand::seq::SliceRandom;
use tokio::time::Instant;

const TIMEOUT: Duration = Duration::from_secs(15);
const ANNOUNCE: Duration = Duration::from_secs(5);

#[derive(Clone)]
enum LobbyMsg {
    Announce(RoomSummary),
    Close(RoomId),
}

fn summary(id: &str, players: usize) -> RoomSummary {
    RoomSummary {
        id: RoomId::new(id),
        name: id.to_string(),
        host_id: PeerId::new(format!("host-{id}")),
        player_count: players,
        max_players: 8,
        game_settings: Vec::new(),
        created_at: 0,
    }
}

fn apply(reg: &mut RoomRegistry, msg: &LobbyMsg, now: Instant) {
    match msg {
        LobbyMsg::Announce(s) => {
            reg.observe(s.clone(), now);
        }
        LobbyMsg::Close(id) => {
            reg.remove(id);
        }
    }
}

fn listed(reg: &RoomRegistry, now: Instant) -> BTreeSet<RoomId> {
    reg.list(now, &RoomFilter::All)
        .into_iter()
        .map(|e| e.room.id)
        .collect()
}

#[test]
fn test_registries_converge_under_reordering_and_loss() {
    let live = ["a", "b", "c"];
    let closed = ["x", "y"];

    // Early history: every room announces a few times, closed rooms then
    // close.
    let mut history = Vec::new();
    for round in 0..3 {
        for id in live.iter().chain(closed.iter()) {
            history.push(LobbyMsg::Announce(summary(id, 1 + round)));
        }
    }
    for id in closed {
        history.push(LobbyMsg::Close(RoomId::new(id)));
    }

    let t0 = Instant::now();
    let mut rng = rand::rng();
    let mut registries: Vec<RoomRegistry> =
        (0..5).map(|_| RoomRegistry::new(TIMEOUT)).collect();

    for reg in &mut registries {
        let mut heard = history.clone();
        heard.shuffle(&mut rng);
        heard.retain(|_| rng.random_bool(0.7));
        for msg in &heard {
            apply(reg, msg, t0);
        }
    }

    // Live hosts keep announcing every period. Each announcement may be
    // lost, but not forever: the last round before `end` reaches everyone.
    let end = t0 + TIMEOUT * 2;
    let mut now = t0;
    while now < end {
        now += ANNOUNCE;
        for reg in &mut registries {
            for id in live {
                if now >= end || rng.random_bool(0.5) {
                    reg.observe(summary(id, 2), now);
                }
            }
            reg.reap(now);
        }
    }

    let expected: BTreeSet<RoomId> = live.iter().map(|id| RoomId::new(*id)).collect();
    for reg in &registries {
        assert_eq!(listed(reg, now), expected);
    }
}

#[test]
fn test_unannounced_room_is_absent_after_next_reap() {
    let t0 = Instant::now();
    let mut reg = RoomRegistry::new(TIMEOUT);
    reg.observe(summary("a", 1), t0);
    reg.observe(summary("b", 1), t0);

    // Only "b" keeps announcing.
    let mut now = t0;
    for _ in 0..4 {
        now += ANNOUNCE;
        reg.observe(summary("b", 1), now);
        reg.reap(now);
    }

    assert!(now - t0 > TIMEOUT);
    assert_eq!(listed(&reg, now), BTreeSet::from([RoomId::new("b")]));
    assert_eq!(reg.len(), 1);
}

#[test]
fn test_late_announce_after_close_expires_on_its_own() {
    let t0 = Instant::now();
    let mut reg = RoomRegistry::new(TIMEOUT);
    reg.observe(summary("a", 1), t0);
    reg.remove(&RoomId::new("a"));

    // A delayed announcement arrives after the close.
    reg.observe(summary("a", 1), t0 + Duration::from_secs(1));
    assert_eq!(reg.len(), 1);

    let reaped = reg.reap(t0 + Duration::from_secs(17));
    assert_eq!(reaped, vec![RoomId::new("a")]);
}
