//! Transport abstraction layer for Meshroom.
//!
//! Rooms ride on a publish/subscribe fabric: every peer that opens a named
//! topic receives the *actions* other peers publish on it, plus a
//! notification whenever a peer joins or leaves the topic. Delivery is
//! best-effort and unordered across topics. This crate provides the
//! [`Mesh`] and [`Channel`] traits that abstract over such fabrics.
//!
//! # Fabrics
//!
//! - [`LocalHub`] / [`LocalMesh`]: in-process fabric with fault injection,
//!   used by tests and demos
//! - `websocket` (default feature): [`RelayServer`] fan-out relay and the
//!   [`RelayMesh`] client, via `tokio-tungstenite`

mod error;
mod local;
#[cfg(feature = "websocket")]
mod relay;

pub use error::TransportError;
pub use local::{LocalChannel, LocalHub, LocalMesh};
#[cfg(feature = "websocket")]
pub use relay::{RelayChannel, RelayMesh, RelayServer};

use std::fmt;
use std::future::Future;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Stable identity of a peer in the mesh.
///
/// Identities are supplied from outside (a key fingerprint, a random id
/// stored in local storage, ...). They are totally ordered by their raw
/// string, byte-wise, which is what host election relies on.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    /// Creates a `PeerId` from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Something that happened on an open channel.
///
/// Every event carries the topic it arrived on, so a single consumer can
/// multiplex several channels through one sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// Another peer published an action on the topic.
    Message {
        topic: String,
        action: String,
        from: PeerId,
        payload: Vec<u8>,
    },
    /// A peer subscribed to the topic.
    PeerJoined { topic: String, peer: PeerId },
    /// A peer left the topic, gracefully or not.
    PeerLeft { topic: String, peer: PeerId },
}

impl ChannelEvent {
    /// The topic this event arrived on.
    pub fn topic(&self) -> &str {
        match self {
            Self::Message { topic, .. }
            | Self::PeerJoined { topic, .. }
            | Self::PeerLeft { topic, .. } => topic,
        }
    }
}

/// Where a channel delivers its events.
pub type EventSink = mpsc::UnboundedSender<ChannelEvent>;

/// A subscription to one topic of the fabric.
///
/// Dropping a channel leaves the topic; [`close`](Channel::close) does the
/// same but lets the fabric report errors.
pub trait Channel: Send + Sync + 'static {
    /// The topic this channel is subscribed to.
    fn topic(&self) -> &str;

    /// Publishes an action on the topic.
    ///
    /// With `target = None` every other subscriber receives it. With
    /// `Some(peer)` only that peer does. The publisher never receives its
    /// own messages.
    fn publish(
        &self,
        action: &str,
        payload: Vec<u8>,
        target: Option<&PeerId>,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Leaves the topic.
    fn close(self) -> impl Future<Output = Result<(), TransportError>> + Send
    where
        Self: Sized;
}

/// A fabric this peer is attached to.
pub trait Mesh: Send + Sync + 'static {
    /// The channel type produced by [`open`](Mesh::open).
    type Channel: Channel;

    /// This peer's identity on the fabric.
    fn self_id(&self) -> &PeerId;

    /// Subscribes to `topic`. Every event of the channel is pushed into
    /// `sink` until the channel is closed or dropped.
    fn open(
        &self,
        topic: &str,
        sink: EventSink,
    ) -> impl Future<Output = Result<Self::Channel, TransportError>> + Send;
}
