//! Room discovery cache for Meshroom.
//!
//! Hosts re-announce their rooms on the lobby every few seconds. Each peer
//! keeps what it hears in a [`RoomRegistry`] and forgets rooms that go
//! quiet for longer than the configured timeout. There is no other
//! liveness signal: a crashed host's room simply stops being refreshed.

mod registry;

pub use registry::{RegistryEntry, RoomFilter, RoomRegistry};
