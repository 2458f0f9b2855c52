//! Room lifecycle for Meshroom.
//!
//! Every peer runs one room actor (a Tokio task) that watches the lobby,
//! hosts or joins at most one room, and takes over as host when the
//! current host disappears.
//!
//! # Key types
//!
//! - [`RoomManager`]: the handle applications talk to
//! - [`RoomEvent`]: what the actor reports back
//! - [`RoomState`]: where this peer stands with respect to a room
//! - [`MeshConfig`]: announce, reap, and join timings
//! - [`elect_host`]: the deterministic host election every survivor runs

mod config;
mod controller;
mod election;
mod error;
mod events;
mod manager;
mod session;

pub use config::{MeshConfig, RoomState};
pub use election::{Migration, elect_host, plan_migration};
pub use error::RoomError;
pub use events::{EventKind, RoomEvent};
pub use manager::{Listener, RoomManager, RoomManagerBuilder};
pub use meshroom_registry::{RegistryEntry, RoomFilter};
