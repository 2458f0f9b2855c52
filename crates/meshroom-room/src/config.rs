//! Peer configuration and the local room state machine.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// MeshConfig
// ---------------------------------------------------------------------------

/// Timing and buffering for a [`RoomManager`](crate::RoomManager).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeshConfig {
    /// How often a host re-announces its room on the lobby.
    pub announce_interval: Duration,

    /// Random delay (up to this much) before the first periodic
    /// announcement, so hosts created together don't announce in step.
    pub announce_jitter: Duration,

    /// How often the registry reaper runs.
    pub reap_interval: Duration,

    /// How long a room may go unannounced before it is considered dead.
    /// Must be at least three announce intervals.
    pub room_timeout: Duration,

    /// How long `join_room` waits for the host's `join_response`.
    pub join_timeout: Duration,

    /// Capacity of the command channel into the room actor.
    pub command_buffer: usize,

    /// Capacity of the event broadcast. Slow subscribers that fall further
    /// behind than this lose the oldest events.
    pub event_buffer: usize,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            announce_interval: Duration::from_secs(5),
            announce_jitter: Duration::ZERO,
            reap_interval: Duration::from_secs(10),
            room_timeout: Duration::from_secs(15),
            join_timeout: Duration::from_secs(3),
            command_buffer: 64,
            event_buffer: 256,
        }
    }
}

impl MeshConfig {
    /// Minimum ratio of `room_timeout` to `announce_interval`.
    pub const MIN_TIMEOUT_FACTOR: u32 = 3;

    /// Fixes up inconsistent settings instead of failing.
    ///
    /// - `room_timeout` is raised to `3 × announce_interval` if shorter,
    ///   so a single lost announcement never evicts a live room.
    /// - Buffers are at least 1.
    pub fn validated(mut self) -> Self {
        let min_timeout = self.announce_interval * Self::MIN_TIMEOUT_FACTOR;
        if self.room_timeout < min_timeout {
            tracing::warn!(
                room_timeout_ms = self.room_timeout.as_millis() as u64,
                min_ms = min_timeout.as_millis() as u64,
                "room_timeout shorter than 3 announce intervals, raising"
            );
            self.room_timeout = min_timeout;
        }
        self.command_buffer = self.command_buffer.max(1);
        self.event_buffer = self.event_buffer.max(1);
        self
    }
}

// ---------------------------------------------------------------------------
// RoomState
// ---------------------------------------------------------------------------

/// Where this peer stands with respect to a room.
///
/// ```text
///              create_room                      join_response{accepted}
/// NotInRoom ──────────────→ Hosting   NotInRoom ──→ Joining ──────────→ Joined
///     ▲                       │  ▲                    │                  │
///     └──── leave_room ───────┘  └──── migration ─────┼──────────────────┘
///     ▲                                               │ rejected/timeout
///     └───────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoomState {
    NotInRoom,
    /// This peer is the authoritative host of its room.
    Hosting,
    /// A `join_request` is out; waiting for the host.
    Joining,
    /// A participant in someone else's room.
    Joined,
}

impl RoomState {
    /// `true` for `Hosting` and `Joined`.
    pub fn in_room(self) -> bool {
        matches!(self, Self::Hosting | Self::Joined)
    }
}

impl std::fmt::Display for RoomState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotInRoom => write!(f, "NotInRoom"),
            Self::Hosting => write!(f, "Hosting"),
            Self::Joining => write!(f, "Joining"),
            Self::Joined => write!(f, "Joined"),
        }
    }
}
