//! The room registry: every room this peer has heard announced, with the
//! instant it was last heard.
//!
//! # Concurrency note
//!
//! `RoomRegistry` is a plain `HashMap` owned by the room actor. All access
//! goes through that one task, so there is no locking here.
//!
//! # Time
//!
//! Every method that depends on staleness takes `now` explicitly. The
//! actor passes `Instant::now()`, tests pass whatever instant they need.

use std::collections::HashMap;
use std::time::Duration;

use meshroom_protocol::{RoomId, RoomSummary};
use tokio::time::Instant;

/// A remote room as last announced on the lobby.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
    pub room: RoomSummary,
    /// When the most recent announcement for this room arrived.
    pub last_seen: Instant,
}

impl RegistryEntry {
    pub fn id(&self) -> &RoomId {
        &self.room.id
    }

    pub fn has_free_slot(&self) -> bool {
        self.room.has_free_slot()
    }

    /// Whether the entry has gone unannounced for longer than `timeout`.
    pub fn is_stale(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.last_seen) > timeout
    }
}

/// Selects which entries [`RoomRegistry::list`] returns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RoomFilter {
    #[default]
    All,
    /// Only rooms with `player_count < max_players`.
    HasFreeSlot,
    /// Case-insensitive substring match on the room name.
    NameContains(String),
}

impl RoomFilter {
    pub fn matches(&self, entry: &RegistryEntry) -> bool {
        match self {
            RoomFilter::All => true,
            RoomFilter::HasFreeSlot => entry.has_free_slot(),
            RoomFilter::NameContains(needle) => entry
                .room
                .name
                .to_lowercase()
                .contains(&needle.to_lowercase()),
        }
    }
}

/// Rooms discovered on the lobby, pruned by age.
///
/// ```text
/// room_announce ──→ observe() ──→ [fresh] ──(timeout passes)──→ [stale]
///                                    │                             │
/// room_close ──→ remove() ◄──────────┘              reap() ◄──────┘
/// ```
#[derive(Debug)]
pub struct RoomRegistry {
    entries: HashMap<RoomId, RegistryEntry>,
    timeout: Duration,
}

impl RoomRegistry {
    /// Creates an empty registry whose entries die after `timeout` without
    /// an announcement.
    pub fn new(timeout: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Inserts or replaces the entry for `summary.id` and refreshes its
    /// `last_seen`. Returns `true` if the room was not known before.
    pub fn observe(&mut self, summary: RoomSummary, now: Instant) -> bool {
        let id = summary.id.clone();
        let entry = RegistryEntry {
            room: summary,
            last_seen: now,
        };
        let is_new = self.entries.insert(id.clone(), entry).is_none();
        if is_new {
            tracing::debug!(room_id = %id, "room discovered");
        } else {
            tracing::trace!(room_id = %id, "room refreshed");
        }
        is_new
    }

    /// Forgets a room. Returns whether it was known.
    pub fn remove(&mut self, id: &RoomId) -> bool {
        let removed = self.entries.remove(id).is_some();
        if removed {
            tracing::debug!(room_id = %id, "room removed");
        }
        removed
    }

    /// Removes every stale entry and returns their ids.
    pub fn reap(&mut self, now: Instant) -> Vec<RoomId> {
        let timeout = self.timeout;
        let mut reaped = Vec::new();
        self.entries.retain(|id, entry| {
            if entry.is_stale(now, timeout) {
                reaped.push(id.clone());
                false
            } else {
                true
            }
        });
        if !reaped.is_empty() {
            reaped.sort();
            tracing::info!(count = reaped.len(), "reaped stale rooms");
        }
        reaped
    }

    /// A snapshot of fresh entries matching `filter`, oldest room first.
    ///
    /// Stale entries are never returned, even if [`reap`](Self::reap)
    /// hasn't run yet.
    pub fn list(&self, now: Instant, filter: &RoomFilter) -> Vec<RegistryEntry> {
        let mut rooms: Vec<RegistryEntry> = self
            .entries
            .values()
            .filter(|e| !e.is_stale(now, self.timeout) && filter.matches(e))
            .cloned()
            .collect();
        rooms.sort_by(|a, b| {
            a.room
                .created_at
                .cmp(&b.room.created_at)
                .then_with(|| a.room.id.cmp(&b.room.id))
        });
        rooms
    }

    /// Looks up a fresh entry.
    pub fn get(&self, id: &RoomId, now: Instant) -> Option<&RegistryEntry> {
        self.entries
            .get(id)
            .filter(|e| !e.is_stale(now, self.timeout))
    }

    /// Number of entries, stale ones included until reaped.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshroom_protocol::PeerId;

    const TIMEOUT: Duration = Duration::from_secs(15);

    fn summary(id: &str, players: usize, max: usize) -> RoomSummary {
        RoomSummary {
            id: RoomId::new(id),
            name: format!("Room {id}"),
            host_id: PeerId::new("alice"),
            player_count: players,
            max_players: max,
            game_settings: Vec::new(),
            created_at: 1_000,
        }
    }

    #[test]
    fn test_observe_reports_new_then_refresh() {
        let mut reg = RoomRegistry::new(TIMEOUT);
        let t0 = Instant::now();
        assert!(reg.observe(summary("r1", 1, 4), t0));
        assert!(!reg.observe(summary("r1", 2, 4), t0 + Duration::from_secs(5)));
        assert_eq!(reg.len(), 1);

        let entry = reg.get(&RoomId::new("r1"), t0 + Duration::from_secs(5)).unwrap();
        assert_eq!(entry.room.player_count, 2);
        assert_eq!(entry.last_seen, t0 + Duration::from_secs(5));
    }

    #[test]
    fn test_remove_unknown_is_false() {
        let mut reg = RoomRegistry::new(TIMEOUT);
        assert!(!reg.remove(&RoomId::new("nope")));
    }

    #[test]
    fn test_reap_removes_only_stale_entries() {
        let mut reg = RoomRegistry::new(TIMEOUT);
        let t0 = Instant::now();
        reg.observe(summary("old", 1, 4), t0);
        reg.observe(summary("new", 1, 4), t0 + Duration::from_secs(10));

        let reaped = reg.reap(t0 + Duration::from_secs(16));

        assert_eq!(reaped, vec![RoomId::new("old")]);
        assert!(reg.get(&RoomId::new("new"), t0 + Duration::from_secs(16)).is_some());
    }

    #[test]
    fn test_entry_exactly_at_timeout_is_still_fresh() {
        let mut reg = RoomRegistry::new(TIMEOUT);
        let t0 = Instant::now();
        reg.observe(summary("r1", 1, 4), t0);
        assert!(reg.reap(t0 + TIMEOUT).is_empty());
        assert_eq!(reg.reap(t0 + TIMEOUT + Duration::from_millis(1)).len(), 1);
    }

    #[test]
    fn test_list_hides_stale_entries_before_reap() {
        let mut reg = RoomRegistry::new(TIMEOUT);
        let t0 = Instant::now();
        reg.observe(summary("r1", 1, 4), t0);

        let later = t0 + Duration::from_secs(20);
        assert!(reg.list(later, &RoomFilter::All).is_empty());
        assert!(reg.get(&RoomId::new("r1"), later).is_none());
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_list_free_slot_filter() {
        let mut reg = RoomRegistry::new(TIMEOUT);
        let t0 = Instant::now();
        reg.observe(summary("full", 2, 2), t0);
        reg.observe(summary("open", 1, 2), t0);

        let rooms = reg.list(t0, &RoomFilter::HasFreeSlot);
        assert_eq!(rooms.len(), 1);
        assert_eq!(rooms[0].id(), &RoomId::new("open"));
    }

    #[test]
    fn test_list_name_filter_is_case_insensitive() {
        let mut reg = RoomRegistry::new(TIMEOUT);
        let t0 = Instant::now();
        let mut arena = summary("a", 1, 4);
        arena.name = "Battle Arena".into();
        reg.observe(arena, t0);
        reg.observe(summary("b", 1, 4), t0);

        let rooms = reg.list(t0, &RoomFilter::NameContains("arena".into()));
        assert_eq!(rooms.len(), 1);
        assert_eq!(rooms[0].room.name, "Battle Arena");
    }

    #[test]
    fn test_list_is_ordered_by_creation() {
        let mut reg = RoomRegistry::new(TIMEOUT);
        let t0 = Instant::now();
        let mut late = summary("late", 1, 4);
        late.created_at = 2_000;
        reg.observe(late, t0);
        reg.observe(summary("early", 1, 4), t0);

        let ids: Vec<_> = reg
            .list(t0, &RoomFilter::All)
            .into_iter()
            .map(|e| e.room.id)
            .collect();
        assert_eq!(ids, vec![RoomId::new("early"), RoomId::new("late")]);
    }

    #[test]
    fn test_list_returns_owned_snapshot() {
        let mut reg = RoomRegistry::new(TIMEOUT);
        let t0 = Instant::now();
        reg.observe(summary("r1", 1, 4), t0);
        let snapshot = reg.list(t0, &RoomFilter::All);
        reg.remove(&RoomId::new("r1"));
        assert_eq!(snapshot.len(), 1);
    }
}
