//! Error types for the room layer.

use meshroom_protocol::{ProtocolError, RoomId};
use meshroom_transport::TransportError;

/// Errors returned by room lifecycle operations.
///
/// Calling an operation in the wrong role (sending game state while not
/// hosting, leaving while not in a room) is not an error; those calls are
/// no-ops.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// The room is not in the local registry, or has gone stale.
    #[error("room {0} not found")]
    RoomNotFound(RoomId),

    /// The registry shows the room at capacity.
    #[error("room {0} is full")]
    RoomFull(RoomId),

    /// The host refused the join. The reason is the host's, verbatim.
    #[error("join rejected: {0}")]
    JoinRejected(String),

    /// No `join_response` arrived before the join timeout.
    #[error("join of room {0} timed out")]
    JoinTimeout(RoomId),

    /// The pending join was abandoned by a later leave, create, or join.
    #[error("join of room {0} was cancelled")]
    JoinCancelled(RoomId),

    /// A room must hold at least one player.
    #[error("invalid room capacity: {0}")]
    InvalidCapacity(usize),

    /// The room manager has been destroyed or its task has stopped.
    #[error("room manager is unavailable")]
    Unavailable,

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
