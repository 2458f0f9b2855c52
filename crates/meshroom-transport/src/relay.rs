//! WebSocket relay fabric using `tokio-tungstenite`.
//!
//! The relay is a dumb fan-out server. Each peer channel is one WebSocket
//! connection that starts with a `hello` frame naming the topic and the
//! peer; every `publish` frame after that is forwarded as `deliver` to the
//! other subscribers of the same topic (or only to the target, for
//! unicast). Connecting and disconnecting are announced to the topic as
//! `peer_joined` / `peer_left`.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::{Channel, ChannelEvent, EventSink, Mesh, PeerId, TransportError};

/// Frames exchanged between peers and the relay.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RelayFrame {
    /// Peer → relay, first frame of every connection.
    Hello { topic: String, peer: PeerId },
    /// Peer → relay.
    Publish {
        action: String,
        payload: Vec<u8>,
        target: Option<PeerId>,
    },
    /// Relay → peer.
    Deliver {
        action: String,
        from: PeerId,
        payload: Vec<u8>,
    },
    /// Relay → peer.
    PeerJoined { peer: PeerId },
    /// Relay → peer.
    PeerLeft { peer: PeerId },
}

fn encode_frame(frame: &RelayFrame) -> Result<Message, TransportError> {
    let bytes = serde_json::to_vec(frame)
        .map_err(|e| TransportError::MalformedFrame(e.to_string()))?;
    Ok(Message::Binary(bytes.into()))
}

fn decode_frame(msg: &Message) -> Result<RelayFrame, TransportError> {
    let data: &[u8] = match msg {
        Message::Binary(data) => data.as_ref(),
        Message::Text(text) => text.as_bytes(),
        _ => {
            return Err(TransportError::MalformedFrame(
                "not a data frame".into(),
            ));
        }
    };
    serde_json::from_slice(data)
        .map_err(|e| TransportError::MalformedFrame(e.to_string()))
}

fn send_failed<E>(e: E) -> TransportError
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    TransportError::SendFailed(std::io::Error::new(
        std::io::ErrorKind::BrokenPipe,
        e,
    ))
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

type FrameSender = mpsc::UnboundedSender<RelayFrame>;

/// Subscribers per topic, shared by all connection tasks.
#[derive(Clone, Default)]
struct Routes {
    inner: Arc<Mutex<HashMap<String, HashMap<PeerId, FrameSender>>>>,
}

impl Routes {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, HashMap<PeerId, FrameSender>>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn register(&self, topic: &str, peer: &PeerId, tx: FrameSender) {
        let mut routes = self.lock();
        let subs = routes.entry(topic.to_string()).or_default();
        for (other, other_tx) in subs.iter() {
            if other == peer {
                continue;
            }
            let _ = other_tx.send(RelayFrame::PeerJoined { peer: peer.clone() });
            let _ = tx.send(RelayFrame::PeerJoined { peer: other.clone() });
        }
        subs.insert(peer.clone(), tx);
    }

    /// Removes the route if it still belongs to `tx` (a reconnect may have
    /// replaced it) and tells the rest of the topic.
    fn unregister(&self, topic: &str, peer: &PeerId, tx: &FrameSender) {
        let mut routes = self.lock();
        let Some(subs) = routes.get_mut(topic) else {
            return;
        };
        if !subs.get(peer).is_some_and(|current| current.same_channel(tx)) {
            return;
        }
        subs.remove(peer);
        for other_tx in subs.values() {
            let _ = other_tx.send(RelayFrame::PeerLeft { peer: peer.clone() });
        }
        if subs.is_empty() {
            routes.remove(topic);
        }
    }

    fn fan_out(
        &self,
        topic: &str,
        from: &PeerId,
        action: String,
        payload: Vec<u8>,
        target: Option<&PeerId>,
    ) {
        let routes = self.lock();
        let Some(subs) = routes.get(topic) else {
            return;
        };
        for (peer, tx) in subs {
            if peer == from || target.is_some_and(|t| t != peer) {
                continue;
            }
            let _ = tx.send(RelayFrame::Deliver {
                action: action.clone(),
                from: from.clone(),
                payload: payload.clone(),
            });
        }
    }
}

/// A WebSocket relay that fans published actions out to topic subscribers.
pub struct RelayServer {
    listener: TcpListener,
    routes: Routes,
}

impl RelayServer {
    /// Binds the relay to the given address.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::ConnectFailed)?;
        tracing::info!(addr, "relay listening");
        Ok(Self {
            listener,
            routes: Routes::default(),
        })
    }

    /// Returns the local address the relay is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs the accept loop until the process is terminated.
    pub async fn run(self) -> Result<(), TransportError> {
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let routes = self.routes.clone();
                    tokio::spawn(async move {
                        if let Err(e) = serve_peer(stream, routes).await {
                            tracing::debug!(%addr, error = %e, "relay connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "relay accept failed");
                }
            }
        }
    }
}

/// Handles one peer channel from `hello` to disconnect.
async fn serve_peer(
    stream: TcpStream,
    routes: Routes,
) -> Result<(), TransportError> {
    let ws = tokio_tungstenite::accept_async(stream).await.map_err(|e| {
        TransportError::ConnectFailed(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            e,
        ))
    })?;
    let (mut ws_tx, mut ws_rx) = ws.split();

    // --- Step 1: hello ---
    let hello = match ws_rx.next().await {
        Some(Ok(msg)) => decode_frame(&msg)?,
        _ => return Ok(()),
    };
    let RelayFrame::Hello { topic, peer } = hello else {
        return Err(TransportError::MalformedFrame(
            "first frame must be hello".into(),
        ));
    };

    let (tx, mut rx) = mpsc::unbounded_channel();
    routes.register(&topic, &peer, tx.clone());
    tracing::debug!(%peer, %topic, "relay peer subscribed");

    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let Ok(msg) = encode_frame(&frame) else {
                continue;
            };
            if ws_tx.send(msg).await.is_err() {
                break;
            }
        }
    });

    // --- Step 2: fan-out loop ---
    while let Some(msg) = ws_rx.next().await {
        let msg = match msg {
            Ok(msg) => msg,
            Err(e) => {
                tracing::debug!(%peer, error = %e, "relay recv error");
                break;
            }
        };
        if msg.is_close() {
            break;
        }
        if !(msg.is_binary() || msg.is_text()) {
            continue;
        }
        match decode_frame(&msg) {
            Ok(RelayFrame::Publish {
                action,
                payload,
                target,
            }) => routes.fan_out(&topic, &peer, action, payload, target.as_ref()),
            Ok(_) => {
                tracing::debug!(%peer, "ignoring unexpected relay frame");
            }
            Err(e) => {
                tracing::debug!(%peer, error = %e, "undecodable relay frame");
            }
        }
    }

    routes.unregister(&topic, &peer, &tx);
    writer.abort();
    tracing::debug!(%peer, %topic, "relay peer unsubscribed");
    Ok(())
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

type ClientStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A peer attached to a [`RelayServer`]. Each opened channel is its own
/// WebSocket connection.
#[derive(Debug, Clone)]
pub struct RelayMesh {
    url: String,
    self_id: PeerId,
}

impl RelayMesh {
    /// Creates a mesh handle for `self_id` that connects to `url`
    /// (e.g. `ws://127.0.0.1:9000`).
    pub fn new(url: impl Into<String>, self_id: PeerId) -> Self {
        Self {
            url: url.into(),
            self_id,
        }
    }
}

impl Mesh for RelayMesh {
    type Channel = RelayChannel;

    fn self_id(&self) -> &PeerId {
        &self.self_id
    }

    async fn open(
        &self,
        topic: &str,
        sink: EventSink,
    ) -> Result<RelayChannel, TransportError> {
        let (ws, _) = tokio_tungstenite::connect_async(self.url.as_str())
            .await
            .map_err(|e| {
                TransportError::ConnectFailed(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    e,
                ))
            })?;
        let (mut ws_tx, mut ws_rx) = ws.split();

        let hello = RelayFrame::Hello {
            topic: topic.to_string(),
            peer: self.self_id.clone(),
        };
        ws_tx.send(encode_frame(&hello)?).await.map_err(send_failed)?;

        let reader_topic = topic.to_string();
        let reader = tokio::spawn(async move {
            while let Some(Ok(msg)) = ws_rx.next().await {
                if msg.is_close() {
                    break;
                }
                if !(msg.is_binary() || msg.is_text()) {
                    continue;
                }
                let topic = reader_topic.clone();
                let event = match decode_frame(&msg) {
                    Ok(RelayFrame::Deliver {
                        action,
                        from,
                        payload,
                    }) => ChannelEvent::Message {
                        topic,
                        action,
                        from,
                        payload,
                    },
                    Ok(RelayFrame::PeerJoined { peer }) => {
                        ChannelEvent::PeerJoined { topic, peer }
                    }
                    Ok(RelayFrame::PeerLeft { peer }) => {
                        ChannelEvent::PeerLeft { topic, peer }
                    }
                    Ok(_) => continue,
                    Err(e) => {
                        tracing::warn!(%topic, error = %e, "dropping relay frame");
                        continue;
                    }
                };
                if sink.send(event).is_err() {
                    break;
                }
            }
        });

        tracing::debug!(peer = %self.self_id, topic, "relay channel opened");
        Ok(RelayChannel {
            topic: topic.to_string(),
            writer: tokio::sync::Mutex::new(ws_tx),
            reader,
        })
    }
}

/// One topic subscription over a relay connection.
pub struct RelayChannel {
    topic: String,
    writer: tokio::sync::Mutex<SplitSink<ClientStream, Message>>,
    reader: JoinHandle<()>,
}

impl Channel for RelayChannel {
    fn topic(&self) -> &str {
        &self.topic
    }

    async fn publish(
        &self,
        action: &str,
        payload: Vec<u8>,
        target: Option<&PeerId>,
    ) -> Result<(), TransportError> {
        let frame = RelayFrame::Publish {
            action: action.to_string(),
            payload,
            target: target.cloned(),
        };
        let msg = encode_frame(&frame)?;
        self.writer
            .lock()
            .await
            .send(msg)
            .await
            .map_err(send_failed)
    }

    async fn close(self) -> Result<(), TransportError> {
        let result = self.writer.lock().await.close().await.map_err(send_failed);
        self.reader.abort();
        result
    }
}

impl Drop for RelayChannel {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
