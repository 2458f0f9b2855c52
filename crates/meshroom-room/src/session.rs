//! What this peer knows about the room it is in.

use meshroom_protocol::{PeerId, Room, RoomId};

use crate::RoomState;

/// The local view of the current room.
///
/// The role is never stored separately: this peer is hosting exactly when
/// the current room's `host_id` is its own id, so the two cannot drift
/// apart.
#[derive(Debug)]
pub(crate) struct LocalSession {
    self_id: PeerId,
    room: Option<Room>,
    /// Room a `join_request` is out for.
    joining: Option<RoomId>,
}

impl LocalSession {
    pub(crate) fn new(self_id: PeerId) -> Self {
        Self {
            self_id,
            room: None,
            joining: None,
        }
    }

    pub(crate) fn self_id(&self) -> &PeerId {
        &self.self_id
    }

    pub(crate) fn state(&self) -> RoomState {
        match (&self.room, &self.joining) {
            (Some(room), _) if room.host_id == self.self_id => RoomState::Hosting,
            (Some(_), _) => RoomState::Joined,
            (None, Some(_)) => RoomState::Joining,
            (None, None) => RoomState::NotInRoom,
        }
    }

    pub(crate) fn is_host(&self) -> bool {
        self.state() == RoomState::Hosting
    }

    pub(crate) fn room(&self) -> Option<&Room> {
        self.room.as_ref()
    }

    pub(crate) fn room_mut(&mut self) -> Option<&mut Room> {
        self.room.as_mut()
    }

    /// The room this peer is in or trying to get into.
    pub(crate) fn room_id(&self) -> Option<&RoomId> {
        self.room.as_ref().map(|r| &r.id).or(self.joining.as_ref())
    }

    pub(crate) fn begin_join(&mut self, room_id: RoomId) {
        self.room = None;
        self.joining = Some(room_id);
    }

    /// Takes `room` as the current room. Whether this makes the peer host
    /// or participant follows from `room.host_id`.
    pub(crate) fn enter(&mut self, room: Room) {
        self.joining = None;
        self.room = Some(room);
    }

    /// Forgets the current or pending room.
    pub(crate) fn clear(&mut self) -> Option<Room> {
        self.joining = None;
        self.room.take()
    }
}
