//! Typed view over `(action, payload)` pairs.
//!
//! The transport only carries an action name and a byte payload.
//! [`RoomMessage`] ties the two together so the room layer matches on one
//! enum instead of on strings. `game_state` and `player_action` are opaque
//! to the room layer and pass through the codec untouched.

use crate::{
    Action, Codec, HostMigration, JoinRequest, JoinResponse, LeaveNotify,
    ProtocolError, Room, RoomClose, RoomSummary,
};

/// A decoded room protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomMessage {
    Announce(RoomSummary),
    Close(RoomClose),
    JoinRequest(JoinRequest),
    JoinResponse(JoinResponse),
    LeaveNotify(LeaveNotify),
    GameState(Vec<u8>),
    PlayerAction(Vec<u8>),
    HostMigration(HostMigration),
    Sync(Room),
}

impl RoomMessage {
    pub fn action(&self) -> Action {
        match self {
            RoomMessage::Announce(_) => Action::RoomAnnounce,
            RoomMessage::Close(_) => Action::RoomClose,
            RoomMessage::JoinRequest(_) => Action::JoinRequest,
            RoomMessage::JoinResponse(_) => Action::JoinResponse,
            RoomMessage::LeaveNotify(_) => Action::LeaveNotify,
            RoomMessage::GameState(_) => Action::GameState,
            RoomMessage::PlayerAction(_) => Action::PlayerAction,
            RoomMessage::HostMigration(_) => Action::HostMigration,
            RoomMessage::Sync(_) => Action::RoomSync,
        }
    }

    /// Encodes the payload. The action name travels separately.
    pub fn encode<C: Codec>(&self, codec: &C) -> Result<Vec<u8>, ProtocolError> {
        match self {
            RoomMessage::Announce(m) => codec.encode(m),
            RoomMessage::Close(m) => codec.encode(m),
            RoomMessage::JoinRequest(m) => codec.encode(m),
            RoomMessage::JoinResponse(m) => codec.encode(m),
            RoomMessage::LeaveNotify(m) => codec.encode(m),
            RoomMessage::GameState(bytes) | RoomMessage::PlayerAction(bytes) => {
                Ok(bytes.clone())
            }
            RoomMessage::HostMigration(m) => codec.encode(m),
            RoomMessage::Sync(m) => codec.encode(m),
        }
    }

    /// Decodes a payload received under `action`.
    ///
    /// # Errors
    /// `UnknownAction` for names outside the protocol, or the codec's
    /// decode error for malformed payloads.
    pub fn decode<C: Codec>(
        codec: &C,
        action: &str,
        payload: &[u8],
    ) -> Result<Self, ProtocolError> {
        let msg = match action.parse::<Action>()? {
            Action::RoomAnnounce => RoomMessage::Announce(codec.decode(payload)?),
            Action::RoomClose => RoomMessage::Close(codec.decode(payload)?),
            Action::JoinRequest => RoomMessage::JoinRequest(codec.decode(payload)?),
            Action::JoinResponse => {
                let resp: JoinResponse = codec.decode(payload)?;
                if resp.accepted && resp.room_info.is_none() {
                    return Err(ProtocolError::InvalidMessage(
                        "accepted join_response without roomInfo".into(),
                    ));
                }
                RoomMessage::JoinResponse(resp)
            }
            Action::LeaveNotify => RoomMessage::LeaveNotify(codec.decode(payload)?),
            Action::GameState => RoomMessage::GameState(payload.to_vec()),
            Action::PlayerAction => RoomMessage::PlayerAction(payload.to_vec()),
            Action::HostMigration => RoomMessage::HostMigration(codec.decode(payload)?),
            Action::RoomSync => RoomMessage::Sync(codec.decode(payload)?),
        };
        Ok(msg)
    }
}

#[cfg(all(test, feature = "json"))]
mod tests {
    use super::*;
    use crate::{JsonCodec, PeerId, RoomId};

    #[test]
    fn test_decode_dispatches_on_action_name() {
        let msg = RoomMessage::decode(
            &JsonCodec,
            "leave_notify",
            br#"{"playerId":"bob"}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            RoomMessage::LeaveNotify(LeaveNotify {
                player_id: PeerId::new("bob")
            })
        );
    }

    #[test]
    fn test_opaque_payloads_pass_through() {
        let state = vec![0xde, 0xad, 0xbe, 0xef];
        let msg = RoomMessage::GameState(state.clone());
        assert_eq!(msg.encode(&JsonCodec).unwrap(), state);
        assert_eq!(
            RoomMessage::decode(&JsonCodec, "player_action", &state).unwrap(),
            RoomMessage::PlayerAction(state)
        );
    }

    #[test]
    fn test_decode_unknown_action() {
        let err = RoomMessage::decode(&JsonCodec, "teleport", b"{}").unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownAction(_)));
    }

    #[test]
    fn test_decode_rejects_accept_without_room_info() {
        let err =
            RoomMessage::decode(&JsonCodec, "join_response", br#"{"accepted":true}"#)
                .unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidMessage(_)));
    }

    #[test]
    fn test_sync_survives_encode_decode() {
        let mut room = Room::new(RoomId::new("r1"), "Arena", PeerId::new("alice"), 4, vec![]);
        room.try_add_player(PeerId::new("bob"));
        let msg = RoomMessage::Sync(room);
        let bytes = msg.encode(&JsonCodec).unwrap();
        let back = RoomMessage::decode(&JsonCodec, msg.action().as_str(), &bytes).unwrap();
        assert_eq!(back, msg);
    }
}
