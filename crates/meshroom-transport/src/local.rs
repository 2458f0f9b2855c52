//! In-process mesh fabric.
//!
//! A [`LocalHub`] plays the role of the relay network: every
//! [`LocalMesh`] created from it is one peer. Delivery is synchronous into
//! each subscriber's sink, so ordering *within* a topic is preserved, but
//! the hub can be told to lose messages ([`LocalHub::set_drop_rate`]),
//! hide a topic from a peer ([`LocalHub::mute`]), or drop a peer without a
//! goodbye ([`LocalHub::crash`]).

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use rand::Rng;

use crate::{Channel, ChannelEvent, EventSink, Mesh, PeerId, TransportError};

#[derive(Default)]
struct HubState {
    /// Subscribers per topic.
    topics: HashMap<String, HashMap<PeerId, EventSink>>,
    /// `(peer, topic)` pairs whose deliveries are silently discarded.
    muted: HashSet<(PeerId, String)>,
    /// Probability (0.0–1.0) that any single delivery is lost.
    drop_rate: f64,
}

impl HubState {
    /// Sends a membership event for `peer` to everyone else on `topic`.
    fn notify_membership(&self, topic: &str, peer: &PeerId, joined: bool) {
        let Some(subs) = self.topics.get(topic) else {
            return;
        };
        for (other, sink) in subs {
            if other == peer {
                continue;
            }
            let event = if joined {
                ChannelEvent::PeerJoined {
                    topic: topic.to_string(),
                    peer: peer.clone(),
                }
            } else {
                ChannelEvent::PeerLeft {
                    topic: topic.to_string(),
                    peer: peer.clone(),
                }
            };
            let _ = sink.send(event);
        }
    }

    fn detach(&mut self, topic: &str, peer: &PeerId) -> bool {
        let Some(subs) = self.topics.get_mut(topic) else {
            return false;
        };
        if subs.remove(peer).is_none() {
            return false;
        }
        if subs.is_empty() {
            self.topics.remove(topic);
        }
        self.notify_membership(topic, peer, false);
        true
    }
}

/// Shared in-process fabric. Cheap to clone.
#[derive(Clone, Default)]
pub struct LocalHub {
    state: Arc<Mutex<HubState>>,
}

impl LocalHub {
    /// Creates an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a new peer to the hub.
    pub fn mesh(&self, peer: PeerId) -> LocalMesh {
        LocalMesh {
            hub: self.clone(),
            self_id: peer,
        }
    }

    /// Drops every subscription of `peer` at once, as if its process died.
    ///
    /// Remaining subscribers see `PeerLeft`; the crashed peer's channels
    /// start failing with [`TransportError::ChannelClosed`].
    pub fn crash(&self, peer: &PeerId) {
        let mut state = self.lock();
        let topics: Vec<String> = state
            .topics
            .iter()
            .filter(|(_, subs)| subs.contains_key(peer))
            .map(|(topic, _)| topic.clone())
            .collect();
        for topic in &topics {
            state.detach(topic, peer);
        }
        tracing::info!(%peer, topics = topics.len(), "peer crashed");
    }

    /// Stops delivering anything on `topic` to `peer`.
    pub fn mute(&self, peer: &PeerId, topic: &str) {
        self.lock().muted.insert((peer.clone(), topic.to_string()));
    }

    /// Undoes [`mute`](Self::mute).
    pub fn unmute(&self, peer: &PeerId, topic: &str) {
        self.lock().muted.remove(&(peer.clone(), topic.to_string()));
    }

    /// Sets the probability that a single delivery is lost.
    pub fn set_drop_rate(&self, rate: f64) {
        self.lock().drop_rate = rate.clamp(0.0, 1.0);
    }

    /// Peers currently subscribed to `topic`, sorted.
    pub fn subscribers(&self, topic: &str) -> Vec<PeerId> {
        let state = self.lock();
        let mut peers: Vec<PeerId> = state
            .topics
            .get(topic)
            .map(|subs| subs.keys().cloned().collect())
            .unwrap_or_default();
        peers.sort();
        peers
    }

    fn lock(&self) -> MutexGuard<'_, HubState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn attach(&self, topic: &str, peer: &PeerId, sink: EventSink) {
        let mut state = self.lock();
        let subs = state.topics.entry(topic.to_string()).or_default();
        let present: Vec<PeerId> =
            subs.keys().filter(|p| *p != peer).cloned().collect();
        let rejoined = subs.insert(peer.clone(), sink.clone()).is_some();
        if !rejoined {
            state.notify_membership(topic, peer, true);
        }
        // The newcomer learns who was already there.
        for other in present {
            let _ = sink.send(ChannelEvent::PeerJoined {
                topic: topic.to_string(),
                peer: other,
            });
        }
    }

    fn deliver(
        &self,
        topic: &str,
        from: &PeerId,
        action: &str,
        payload: Vec<u8>,
        target: Option<&PeerId>,
    ) -> Result<(), TransportError> {
        let state = self.lock();
        let subs = state
            .topics
            .get(topic)
            .filter(|subs| subs.contains_key(from))
            .ok_or_else(|| TransportError::ChannelClosed(topic.to_string()))?;

        let mut rng = rand::rng();
        for (peer, sink) in subs {
            if peer == from || target.is_some_and(|t| t != peer) {
                continue;
            }
            if state.muted.contains(&(peer.clone(), topic.to_string())) {
                continue;
            }
            if state.drop_rate > 0.0 && rng.random::<f64>() < state.drop_rate {
                tracing::trace!(%from, to = %peer, action, "delivery dropped");
                continue;
            }
            let _ = sink.send(ChannelEvent::Message {
                topic: topic.to_string(),
                action: action.to_string(),
                from: from.clone(),
                payload: payload.clone(),
            });
        }
        Ok(())
    }
}

/// One peer attached to a [`LocalHub`].
#[derive(Clone)]
pub struct LocalMesh {
    hub: LocalHub,
    self_id: PeerId,
}

impl LocalMesh {
    /// The hub this peer is attached to.
    pub fn hub(&self) -> &LocalHub {
        &self.hub
    }
}

impl Mesh for LocalMesh {
    type Channel = LocalChannel;

    fn self_id(&self) -> &PeerId {
        &self.self_id
    }

    async fn open(
        &self,
        topic: &str,
        sink: EventSink,
    ) -> Result<LocalChannel, TransportError> {
        self.hub.attach(topic, &self.self_id, sink);
        tracing::debug!(peer = %self.self_id, topic, "local channel opened");
        Ok(LocalChannel {
            hub: self.hub.clone(),
            topic: topic.to_string(),
            self_id: self.self_id.clone(),
            attached: AtomicBool::new(true),
        })
    }
}

/// A topic subscription on a [`LocalHub`]. Leaves the topic when dropped.
pub struct LocalChannel {
    hub: LocalHub,
    topic: String,
    self_id: PeerId,
    attached: AtomicBool,
}

impl LocalChannel {
    fn detach(&self) {
        if self.attached.swap(false, Ordering::AcqRel) {
            self.hub.lock().detach(&self.topic, &self.self_id);
            tracing::debug!(
                peer = %self.self_id,
                topic = %self.topic,
                "local channel closed"
            );
        }
    }
}

impl Channel for LocalChannel {
    fn topic(&self) -> &str {
        &self.topic
    }

    async fn publish(
        &self,
        action: &str,
        payload: Vec<u8>,
        target: Option<&PeerId>,
    ) -> Result<(), TransportError> {
        if !self.attached.load(Ordering::Acquire) {
            return Err(TransportError::ChannelClosed(self.topic.clone()));
        }
        self.hub
            .deliver(&self.topic, &self.self_id, action, payload, target)
    }

    async fn close(self) -> Result<(), TransportError> {
        self.detach();
        Ok(())
    }
}

impl Drop for LocalChannel {
    fn drop(&mut self) {
        self.detach();
    }
}
