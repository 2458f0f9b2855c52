//! The public room API.
//!
//! A [`RoomManager`] is a handle to the room actor running for one peer.
//! Every method sends a command and waits for the actor's reply, so calls
//! from several tasks are applied one at a time, in arrival order.

use meshroom_protocol::{Codec, JsonCodec, PeerId, Room, RoomId};
use meshroom_registry::{RegistryEntry, RoomFilter};
use meshroom_transport::Mesh;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::controller::{Command, RoomController};
use crate::events::EventBus;
use crate::{EventKind, MeshConfig, RoomError, RoomEvent, RoomState};

/// Configures and starts a [`RoomManager`].
///
/// ```rust,ignore
/// let hub = LocalHub::new();
/// let manager = RoomManager::builder()
///     .config(MeshConfig::default())
///     .start(hub.mesh(PeerId::new("alice")))
///     .await?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct RoomManagerBuilder {
    config: MeshConfig,
}

impl RoomManagerBuilder {
    pub fn config(mut self, config: MeshConfig) -> Self {
        self.config = config;
        self
    }

    /// Starts the manager with JSON payloads.
    pub async fn start<M: Mesh>(self, mesh: M) -> Result<RoomManager, RoomError> {
        self.start_with_codec(mesh, JsonCodec).await
    }

    /// Opens the lobby and spawns the room actor.
    ///
    /// # Errors
    /// Fails if the lobby channel cannot be opened.
    pub async fn start_with_codec<M: Mesh, C: Codec>(
        self,
        mesh: M,
        codec: C,
    ) -> Result<RoomManager, RoomError> {
        let config = self.config.validated();
        let self_id = mesh.self_id().clone();
        let (commands, commands_rx) = mpsc::channel(config.command_buffer);
        let events = EventBus::new(config.event_buffer);

        let controller =
            RoomController::new(mesh, codec, config, events.clone(), commands_rx).await?;
        let task = tokio::spawn(controller.run());

        tracing::info!(peer = %self_id, "room manager started");
        Ok(RoomManager {
            self_id,
            commands,
            events,
            task,
        })
    }
}

/// Handle to this peer's room actor.
///
/// Dropping the manager stops the actor the same way
/// [`destroy`](Self::destroy) does, without waiting for it.
pub struct RoomManager {
    self_id: PeerId,
    commands: mpsc::Sender<Command>,
    events: EventBus,
    task: JoinHandle<()>,
}

impl RoomManager {
    pub fn builder() -> RoomManagerBuilder {
        RoomManagerBuilder::default()
    }

    /// Starts a manager with the default configuration.
    pub async fn start<M: Mesh>(mesh: M) -> Result<Self, RoomError> {
        Self::builder().start(mesh).await
    }

    pub fn self_id(&self) -> &PeerId {
        &self.self_id
    }

    /// Sends a command built around a fresh reply channel and waits for
    /// the answer.
    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(make(reply_tx))
            .await
            .map_err(|_| RoomError::Unavailable)?;
        reply_rx.await.map_err(|_| RoomError::Unavailable)
    }

    /// Creates a room hosted by this peer and announces it.
    ///
    /// Leaves the current room first, if any.
    ///
    /// # Errors
    /// `InvalidCapacity` if `max_players` is zero.
    pub async fn create_room(
        &self,
        name: impl Into<String>,
        max_players: usize,
        game_settings: Vec<u8>,
    ) -> Result<Room, RoomError> {
        let name = name.into();
        self.request(|reply| Command::CreateRoom {
            name,
            max_players,
            game_settings,
            reply,
        })
        .await?
    }

    /// Joins a room found in the registry and waits for the host's answer.
    ///
    /// # Errors
    /// - `RoomNotFound` if the room is not (or no longer) listed.
    /// - `RoomFull` if the listing shows it at capacity.
    /// - `JoinRejected` with the host's reason.
    /// - `JoinTimeout` if the host never answers.
    /// - `JoinCancelled` if another command abandoned this join.
    pub async fn join_room(&self, room_id: &RoomId) -> Result<Room, RoomError> {
        let room_id = room_id.clone();
        self.request(|reply| Command::JoinRoom { room_id, reply })
            .await?
    }

    /// Leaves the current room. A host dissolves it. Does nothing when not
    /// in a room.
    pub async fn leave_room(&self) -> Result<(), RoomError> {
        self.request(|reply| Command::LeaveRoom { reply }).await?
    }

    /// Fresh rooms from the registry matching `filter`.
    pub async fn room_list(&self, filter: RoomFilter) -> Result<Vec<RegistryEntry>, RoomError> {
        self.request(|reply| Command::RoomList { filter, reply })
            .await
    }

    pub async fn current_room(&self) -> Result<Option<Room>, RoomError> {
        self.request(|reply| Command::CurrentRoom { reply }).await
    }

    pub async fn state(&self) -> Result<RoomState, RoomError> {
        self.request(|reply| Command::State { reply }).await
    }

    /// Broadcasts a game-state snapshot to the room. Hosts only; a no-op
    /// otherwise.
    pub async fn send_game_state(&self, state: Vec<u8>) -> Result<(), RoomError> {
        self.request(|reply| Command::SendGameState { state, reply })
            .await?
    }

    /// Sends an action to the host. Participants only; a no-op otherwise.
    pub async fn send_player_action(&self, action: Vec<u8>) -> Result<(), RoomError> {
        self.request(|reply| Command::SendPlayerAction { action, reply })
            .await?
    }

    /// A receiver for every event emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<RoomEvent> {
        self.events.subscribe()
    }

    /// Calls `handler` for each event of `kind` until the returned
    /// [`Listener`] is cancelled or dropped, or the manager is destroyed.
    pub fn on<F>(&self, kind: EventKind, mut handler: F) -> Listener
    where
        F: FnMut(RoomEvent) + Send + 'static,
    {
        let mut events = self.events.subscribe();
        let task = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) if event.kind() == kind => handler(event),
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(?kind, skipped, "listener fell behind, events lost");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        Listener { task }
    }

    /// Leaves the current room, closes the lobby, and stops the actor.
    ///
    /// Subscribers see their receivers close once the last handle is gone.
    pub async fn destroy(self) -> Result<(), RoomError> {
        let result = self.request(|reply| Command::Destroy { reply }).await;
        let RoomManager { task, .. } = self;
        if let Err(e) = task.await {
            tracing::warn!(error = %e, "room actor ended abnormally");
        }
        result
    }
}

/// A running [`RoomManager::on`] handler. Dropping it stops the handler.
#[derive(Debug)]
pub struct Listener {
    task: JoinHandle<()>,
}

impl Listener {
    pub fn cancel(self) {
        self.task.abort();
    }

    /// Whether the handler has stopped, because it was cancelled or the
    /// manager went away.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.task.abort();
    }
}
