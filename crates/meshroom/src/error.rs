//! Unified error type for Meshroom.

use meshroom_protocol::ProtocolError;
use meshroom_room::RoomError;
use meshroom_transport::TransportError;

/// Top-level error wrapping every crate-specific error, so applications
/// using the `meshroom` crate can `?` through all of them.
#[derive(Debug, thiserror::Error)]
pub enum MeshroomError {
    /// Publishing, subscribing, or connecting failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A payload could not be encoded or decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A room operation failed.
    #[error(transparent)]
    Room(#[from] RoomError),
}
