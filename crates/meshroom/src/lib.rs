//! # Meshroom
//!
//! Peer-to-peer room coordination for web games.
//!
//! There is no authoritative server. Every peer watches a shared lobby
//! topic where hosts announce their rooms, joins a room by talking to its
//! host on the room's own topic, and, when a host vanishes, takes part in
//! a deterministic election that hands the room to the smallest surviving
//! peer id.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use meshroom::prelude::*;
//!
//! # async fn demo() -> Result<(), MeshroomError> {
//! let hub = LocalHub::new();
//! let alice = RoomManager::start(hub.mesh(PeerId::new("alice"))).await?;
//! let bob = RoomManager::start(hub.mesh(PeerId::new("bob"))).await?;
//!
//! let room = alice.create_room("Arena", 4, Vec::new()).await?;
//! bob.join_room(&room.id).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Crates
//!
//! - [`transport`]: the pub/sub [`Mesh`](transport::Mesh) abstraction, an
//!   in-process hub and a WebSocket relay
//! - [`protocol`]: wire types and codecs
//! - [`registry`]: the soft-state list of announced rooms
//! - [`tick`]: restartable periodic timers
//! - [`room`]: the room actor and its [`RoomManager`](room::RoomManager)

mod error;
mod telemetry;

pub use error::MeshroomError;
pub use telemetry::init_tracing;

pub use meshroom_protocol as protocol;
pub use meshroom_registry as registry;
pub use meshroom_room as room;
pub use meshroom_tick as tick;
pub use meshroom_transport as transport;

pub mod prelude {
    pub use crate::MeshroomError;
    pub use meshroom_protocol::{PeerId, Room, RoomId, RoomSummary};
    pub use meshroom_room::{
        EventKind, Listener, MeshConfig, RegistryEntry, RoomError, RoomEvent, RoomFilter,
        RoomManager, RoomState,
    };
    pub use meshroom_transport::{LocalHub, LocalMesh, Mesh};
    #[cfg(feature = "websocket")]
    pub use meshroom_transport::{RelayMesh, RelayServer};
}
