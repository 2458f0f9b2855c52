//! Wire protocol for Meshroom rooms.
//!
//! - **Types** ([`Room`], [`RoomSummary`], [`JoinResponse`], ...): the
//!   payload of every room action, camelCase on the wire.
//! - **Actions** ([`Action`], [`RoomMessage`]): the action names and a
//!   typed enum tying each name to its payload.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how payloads become
//!   bytes.
//!
//! ```text
//! Transport (action, bytes) → Protocol (RoomMessage) → Room controller
//! ```

mod codec;
mod error;
mod message;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use message::RoomMessage;
pub use meshroom_transport::PeerId;
pub use types::{
    Action, Admission, HostMigration, JoinRequest, JoinResponse, LOBBY_TOPIC,
    LeaveNotify, Room, RoomClose, RoomId, RoomSummary, unix_millis,
};
