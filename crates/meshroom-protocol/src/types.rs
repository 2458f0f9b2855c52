//! Core protocol types: room identity, the room record, and the payloads
//! of every room action.
//!
//! Everything here travels on the wire as camelCase JSON so that peers
//! written in other languages can share a lobby.

use std::fmt;
use std::fmt::Write as _;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{PeerId, ProtocolError};

/// Topic every peer subscribes to for room discovery.
pub const LOBBY_TOPIC: &str = "lobby";

/// Milliseconds since the UNIX epoch, or 0 if the clock is before it.
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// RoomId
// ---------------------------------------------------------------------------

/// Opaque, creator-generated room identifier.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// A fresh id: 16 random bytes, lowercase hex.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 16];
        rand::rng().fill(&mut bytes);
        let mut id = String::with_capacity(32);
        for b in bytes {
            let _ = write!(id, "{b:02x}");
        }
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The pub/sub topic carrying this room's traffic.
    pub fn topic(&self) -> String {
        format!("room:{}", self.0)
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

/// Named actions of the room protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Lobby, host → all. Payload: [`RoomSummary`].
    RoomAnnounce,
    /// Lobby and room, host → all. Payload: [`RoomClose`].
    RoomClose,
    /// Room, joiner → host. Payload: [`JoinRequest`].
    JoinRequest,
    /// Room, host → joiner. Payload: [`JoinResponse`].
    JoinResponse,
    /// Room, participant → host. Payload: [`LeaveNotify`].
    LeaveNotify,
    /// Room, host → all. Payload: opaque bytes.
    GameState,
    /// Room, participant → host. Payload: opaque bytes.
    PlayerAction,
    /// Room, new host → all. Payload: [`HostMigration`].
    HostMigration,
    /// Room, host → all. Payload: [`Room`].
    RoomSync,
}

impl Action {
    pub const ALL: [Action; 9] = [
        Action::RoomAnnounce,
        Action::RoomClose,
        Action::JoinRequest,
        Action::JoinResponse,
        Action::LeaveNotify,
        Action::GameState,
        Action::PlayerAction,
        Action::HostMigration,
        Action::RoomSync,
    ];

    /// The wire name of the action.
    pub fn as_str(self) -> &'static str {
        match self {
            Action::RoomAnnounce => "room_announce",
            Action::RoomClose => "room_close",
            Action::JoinRequest => "join_request",
            Action::JoinResponse => "join_response",
            Action::LeaveNotify => "leave_notify",
            Action::GameState => "game_state",
            Action::PlayerAction => "player_action",
            Action::HostMigration => "host_migration",
            Action::RoomSync => "room_sync",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| ProtocolError::UnknownAction(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Room
// ---------------------------------------------------------------------------

/// Outcome of [`Room::try_add_player`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Added,
    AlreadyMember,
    Full,
}

/// The full room record, as the host knows it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    pub host_id: PeerId,
    /// Unique, creator first.
    pub players: Vec<PeerId>,
    pub max_players: usize,
    #[serde(default)]
    pub game_settings: Vec<u8>,
    /// Milliseconds since the UNIX epoch.
    pub created_at: u64,
}

impl Room {
    /// A new room hosted by `host`, who is also its only player.
    pub fn new(
        id: RoomId,
        name: impl Into<String>,
        host: PeerId,
        max_players: usize,
        game_settings: Vec<u8>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            host_id: host.clone(),
            players: vec![host],
            max_players,
            game_settings,
            created_at: unix_millis(),
        }
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= self.max_players
    }

    pub fn has_player(&self, peer: &PeerId) -> bool {
        self.players.contains(peer)
    }

    /// Appends `peer` unless it is already a member or the room is full.
    pub fn try_add_player(&mut self, peer: PeerId) -> Admission {
        if self.has_player(&peer) {
            Admission::AlreadyMember
        } else if self.is_full() {
            Admission::Full
        } else {
            self.players.push(peer);
            Admission::Added
        }
    }

    /// Removes `peer`, returning whether it was a member.
    pub fn remove_player(&mut self, peer: &PeerId) -> bool {
        let before = self.players.len();
        self.players.retain(|p| p != peer);
        self.players.len() != before
    }

    /// The lobby projection of this room.
    pub fn summary(&self) -> RoomSummary {
        RoomSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            host_id: self.host_id.clone(),
            player_count: self.players.len(),
            max_players: self.max_players,
            game_settings: self.game_settings.clone(),
            created_at: self.created_at,
        }
    }
}

/// What a host announces on the lobby: the room without its member list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub id: RoomId,
    pub name: String,
    pub host_id: PeerId,
    pub player_count: usize,
    pub max_players: usize,
    #[serde(default)]
    pub game_settings: Vec<u8>,
    pub created_at: u64,
}

impl RoomSummary {
    pub fn has_free_slot(&self) -> bool {
        self.player_count < self.max_players
    }
}

// ---------------------------------------------------------------------------
// Action payloads
// ---------------------------------------------------------------------------

/// `room_close`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomClose {
    pub room_id: RoomId,
}

/// `join_request`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    pub player_id: PeerId,
}

/// `join_response`. On acceptance `room_info` is set and `game_state`
/// carries the host's latest snapshot if it has one; on rejection only
/// `reason` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinResponse {
    pub accepted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_info: Option<Room>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_state: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl JoinResponse {
    pub fn accept(room: Room, game_state: Option<Vec<u8>>) -> Self {
        Self {
            accepted: true,
            room_info: Some(room),
            game_state,
            reason: None,
        }
    }

    pub fn reject(reason: impl Into<String>) -> Self {
        Self {
            accepted: false,
            room_info: None,
            game_state: None,
            reason: Some(reason.into()),
        }
    }
}

/// `leave_notify`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveNotify {
    pub player_id: PeerId,
}

/// `host_migration`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostMigration {
    pub new_host_id: PeerId,
}
