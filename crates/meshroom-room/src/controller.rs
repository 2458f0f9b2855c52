//! The room actor: one Tokio task that owns every piece of room state for
//! this peer.
//!
//! Commands from the [`RoomManager`](crate::RoomManager), events from the
//! lobby and room channels, and the announce/reap/join-deadline timers are
//! all handled one at a time inside [`RoomController::run`]. Nothing here
//! is shared, so nothing here is locked.

use meshroom_protocol::{
    Admission, Codec, HostMigration, JoinRequest, JoinResponse, LOBBY_TOPIC,
    LeaveNotify, PeerId, Room, RoomClose, RoomId, RoomMessage, RoomSummary,
};
use meshroom_registry::{RegistryEntry, RoomFilter, RoomRegistry};
use meshroom_tick::{TickConfig, Ticker};
use meshroom_transport::{Channel, ChannelEvent, EventSink, Mesh, TransportError};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Instant};
use tracing::{debug, info, trace, warn};

use crate::election::{Migration, plan_migration};
use crate::events::EventBus;
use crate::session::LocalSession;
use crate::{MeshConfig, RoomError, RoomEvent, RoomState};

pub(crate) type Reply<T> = oneshot::Sender<T>;

/// Commands sent to the room actor through its channel.
pub(crate) enum Command {
    CreateRoom {
        name: String,
        max_players: usize,
        game_settings: Vec<u8>,
        reply: Reply<Result<Room, RoomError>>,
    },
    JoinRoom {
        room_id: RoomId,
        reply: Reply<Result<Room, RoomError>>,
    },
    LeaveRoom {
        reply: Reply<Result<(), RoomError>>,
    },
    RoomList {
        filter: RoomFilter,
        reply: Reply<Vec<RegistryEntry>>,
    },
    CurrentRoom {
        reply: Reply<Option<Room>>,
    },
    State {
        reply: Reply<RoomState>,
    },
    SendGameState {
        state: Vec<u8>,
        reply: Reply<Result<(), RoomError>>,
    },
    SendPlayerAction {
        action: Vec<u8>,
        reply: Reply<Result<(), RoomError>>,
    },
    Destroy {
        reply: Reply<()>,
    },
}

/// A `join_request` waiting for its `join_response`.
struct PendingJoin {
    room_id: RoomId,
    /// Host according to the registry when the join started. Only this
    /// peer may reject the join.
    expected_host: PeerId,
    deadline: Instant,
    reply: Reply<Result<Room, RoomError>>,
}

/// Sleeps until `deadline`, or forever if there is none.
async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Encodes `msg` and publishes it on `channel`.
async fn send<Ch: Channel, C: Codec>(
    channel: &Ch,
    codec: &C,
    msg: &RoomMessage,
    target: Option<&PeerId>,
) -> Result<(), RoomError> {
    let payload = msg.encode(codec)?;
    channel
        .publish(msg.action().as_str(), payload, target)
        .await?;
    Ok(())
}

pub(crate) struct RoomController<M: Mesh, C: Codec> {
    mesh: M,
    codec: C,
    config: MeshConfig,
    session: LocalSession,
    registry: RoomRegistry,
    events: EventBus,
    lobby: Option<M::Channel>,
    room_channel: Option<M::Channel>,
    /// Latest snapshot sent (as host) or received (as participant).
    last_game_state: Option<Vec<u8>>,
    pending: Option<PendingJoin>,
    announcer: Ticker,
    reaper: Ticker,
    commands: mpsc::Receiver<Command>,
    inbound: mpsc::UnboundedReceiver<ChannelEvent>,
    /// Sink handed to every channel this actor opens.
    inbound_tx: EventSink,
}

impl<M: Mesh, C: Codec> RoomController<M, C> {
    /// Opens the lobby and builds the actor. The actor does nothing until
    /// [`run`](Self::run) is spawned.
    pub(crate) async fn new(
        mesh: M,
        codec: C,
        config: MeshConfig,
        events: EventBus,
        commands: mpsc::Receiver<Command>,
    ) -> Result<Self, RoomError> {
        let (inbound_tx, inbound) = mpsc::unbounded_channel();
        let lobby = mesh.open(LOBBY_TOPIC, inbound_tx.clone()).await?;
        let session = LocalSession::new(mesh.self_id().clone());
        Ok(Self {
            codec,
            session,
            registry: RoomRegistry::new(config.room_timeout),
            events,
            lobby: Some(lobby),
            room_channel: None,
            last_game_state: None,
            pending: None,
            announcer: Ticker::new(TickConfig {
                period: config.announce_interval,
                initial_jitter: config.announce_jitter,
            }),
            reaper: Ticker::new(TickConfig::every(config.reap_interval)),
            commands,
            inbound,
            inbound_tx,
            config,
            mesh,
        })
    }

    /// Runs the actor loop until destroyed or until every manager handle
    /// is dropped.
    ///
    /// Channel traffic is drained before commands so that a command always
    /// sees every message that had already arrived when it was issued.
    pub(crate) async fn run(mut self) {
        info!(peer = %self.session.self_id(), "room controller started");
        self.reaper.start();

        loop {
            tokio::select! {
                biased;

                Some(event) = self.inbound.recv() => {
                    self.handle_channel_event(event).await;
                }
                _ = wait_until(self.pending.as_ref().map(|p| p.deadline)) => {
                    self.expire_join().await;
                }
                _ = self.announcer.wait_for_tick() => {
                    self.announce().await;
                }
                _ = self.reaper.wait_for_tick() => {
                    self.reap();
                }
                cmd = self.commands.recv() => match cmd {
                    Some(Command::Destroy { reply }) => {
                        self.shutdown().await;
                        let _ = reply.send(());
                        break;
                    }
                    Some(cmd) => self.handle_command(cmd).await,
                    None => {
                        self.shutdown().await;
                        break;
                    }
                },
            }
        }

        info!(peer = %self.session.self_id(), "room controller stopped");
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::CreateRoom {
                name,
                max_players,
                game_settings,
                reply,
            } => {
                let result = self.create_room(name, max_players, game_settings).await;
                let _ = reply.send(result);
            }
            Command::JoinRoom { room_id, reply } => {
                self.join_room(room_id, reply).await;
            }
            Command::LeaveRoom { reply } => {
                let result = self.leave_room().await;
                let _ = reply.send(result);
            }
            Command::RoomList { filter, reply } => {
                let _ = reply.send(self.registry.list(Instant::now(), &filter));
            }
            Command::CurrentRoom { reply } => {
                let _ = reply.send(self.session.room().cloned());
            }
            Command::State { reply } => {
                let _ = reply.send(self.session.state());
            }
            Command::SendGameState { state, reply } => {
                let result = self.send_game_state(state).await;
                let _ = reply.send(result);
            }
            Command::SendPlayerAction { action, reply } => {
                let result = self.send_player_action(action).await;
                let _ = reply.send(result);
            }
            Command::Destroy { reply } => {
                // Handled in `run`.
                let _ = reply.send(());
            }
        }
    }

    async fn create_room(
        &mut self,
        name: String,
        max_players: usize,
        game_settings: Vec<u8>,
    ) -> Result<Room, RoomError> {
        if max_players == 0 {
            return Err(RoomError::InvalidCapacity(max_players));
        }
        if let Err(e) = self.leave_room().await {
            warn!(error = %e, "implicit leave before create failed");
        }

        let room = Room::new(
            RoomId::generate(),
            name,
            self.session.self_id().clone(),
            max_players,
            game_settings,
        );
        let channel = self
            .mesh
            .open(&room.id.topic(), self.inbound_tx.clone())
            .await?;
        self.room_channel = Some(channel);
        self.session.enter(room.clone());
        self.last_game_state = None;

        info!(
            room_id = %room.id,
            name = %room.name,
            max_players,
            "room created"
        );

        self.announcer.start();
        self.announce().await;
        Ok(room)
    }

    async fn join_room(&mut self, room_id: RoomId, reply: Reply<Result<Room, RoomError>>) {
        if let Some(room) = self.session.room().filter(|r| r.id == room_id) {
            debug!(%room_id, "already in room");
            let _ = reply.send(Ok(room.clone()));
            return;
        }

        let Some(entry) = self.registry.get(&room_id, Instant::now()) else {
            let _ = reply.send(Err(RoomError::RoomNotFound(room_id)));
            return;
        };
        if !entry.has_free_slot() {
            let _ = reply.send(Err(RoomError::RoomFull(room_id)));
            return;
        }
        let expected_host = entry.room.host_id.clone();

        if let Err(e) = self.leave_room().await {
            warn!(error = %e, "implicit leave before join failed");
        }

        let channel = match self
            .mesh
            .open(&room_id.topic(), self.inbound_tx.clone())
            .await
        {
            Ok(channel) => channel,
            Err(e) => {
                let _ = reply.send(Err(e.into()));
                return;
            }
        };
        self.room_channel = Some(channel);
        self.session.begin_join(room_id.clone());

        let request = RoomMessage::JoinRequest(JoinRequest {
            player_id: self.session.self_id().clone(),
        });
        if let Err(e) = self.publish_room(&request, None).await {
            if let Err(close_err) = self.teardown_room().await {
                debug!(error = %close_err, "closing room channel after failed request failed");
            }
            let _ = reply.send(Err(e));
            return;
        }

        info!(%room_id, host = %expected_host, "join requested");
        self.pending = Some(PendingJoin {
            room_id,
            expected_host,
            deadline: Instant::now() + self.config.join_timeout,
            reply,
        });
    }

    /// Leaves the current room, or abandons a pending join.
    ///
    /// Local state is always reset, even if telling the others fails; the
    /// first transport error is returned afterwards.
    async fn leave_room(&mut self) -> Result<(), RoomError> {
        if let Some(pending) = self.pending.take() {
            info!(room_id = %pending.room_id, "pending join cancelled");
            let result = self.teardown_room().await;
            let _ = pending
                .reply
                .send(Err(RoomError::JoinCancelled(pending.room_id)));
            return result;
        }

        let Some(room) = self.session.room().cloned() else {
            debug!("leave_room while not in a room, nothing to do");
            return Ok(());
        };

        let mut first_err = None;
        if self.session.is_host() {
            let close = RoomMessage::Close(RoomClose {
                room_id: room.id.clone(),
            });
            if let Err(e) = self.publish_room(&close, None).await {
                first_err.get_or_insert(e);
            }
            if let Err(e) = self.publish_lobby(&close).await {
                first_err.get_or_insert(e);
            }
            if self.registry.remove(&room.id) {
                self.emit_room_list();
            }
            info!(room_id = %room.id, "room dissolved");
        } else {
            let notify = RoomMessage::LeaveNotify(LeaveNotify {
                player_id: self.session.self_id().clone(),
            });
            if let Err(e) = self.publish_room(&notify, Some(&room.host_id)).await {
                first_err.get_or_insert(e);
            }
            info!(room_id = %room.id, "left room");
        }

        if let Err(e) = self.teardown_room().await {
            first_err.get_or_insert(e);
        }
        first_err.map_or(Ok(()), Err)
    }

    async fn send_game_state(&mut self, state: Vec<u8>) -> Result<(), RoomError> {
        if !self.session.is_host() {
            debug!("send_game_state while not hosting, ignoring");
            return Ok(());
        }
        self.last_game_state = Some(state.clone());
        self.publish_room(&RoomMessage::GameState(state), None).await
    }

    async fn send_player_action(&mut self, action: Vec<u8>) -> Result<(), RoomError> {
        let Some(host) = self
            .session
            .room()
            .filter(|_| self.session.state() == RoomState::Joined)
            .map(|r| r.host_id.clone())
        else {
            debug!("send_player_action while not a participant, ignoring");
            return Ok(());
        };
        self.publish_room(&RoomMessage::PlayerAction(action), Some(&host))
            .await
    }

    async fn shutdown(&mut self) {
        if let Err(e) = self.leave_room().await {
            warn!(error = %e, "leave during shutdown failed");
        }
        self.announcer.stop();
        self.reaper.stop();
        if let Some(lobby) = self.lobby.take() {
            if let Err(e) = lobby.close().await {
                warn!(error = %e, "closing lobby failed");
            }
        }
    }

    // -----------------------------------------------------------------------
    // Timers
    // -----------------------------------------------------------------------

    /// Announces the hosted room on the lobby and records it in the local
    /// registry, so the host sees its own room in the list.
    async fn announce(&mut self) {
        let Some(summary) = self
            .session
            .room()
            .filter(|_| self.session.is_host())
            .map(Room::summary)
        else {
            self.announcer.stop();
            return;
        };

        self.registry.observe(summary.clone(), Instant::now());
        self.emit_room_list();
        if let Err(e) = self.publish_lobby(&RoomMessage::Announce(summary)).await {
            warn!(error = %e, "room announce failed");
        }
    }

    fn reap(&mut self) {
        let reaped = self.registry.reap(Instant::now());
        if !reaped.is_empty() {
            self.emit_room_list();
        }
    }

    async fn expire_join(&mut self) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        warn!(
            room_id = %pending.room_id,
            timeout_ms = self.config.join_timeout.as_millis() as u64,
            "join timed out"
        );
        if let Err(e) = self.teardown_room().await {
            debug!(error = %e, "closing room channel after timeout failed");
        }
        let _ = pending
            .reply
            .send(Err(RoomError::JoinTimeout(pending.room_id)));
    }

    // -----------------------------------------------------------------------
    // Inbound
    // -----------------------------------------------------------------------

    fn is_room_topic(&self, topic: &str) -> bool {
        self.room_channel
            .as_ref()
            .is_some_and(|channel| channel.topic() == topic)
    }

    async fn handle_channel_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Message {
                topic,
                action,
                from,
                payload,
            } => {
                let msg = match RoomMessage::decode(&self.codec, &action, &payload) {
                    Ok(msg) => msg,
                    Err(e) => {
                        warn!(%from, %topic, %action, error = %e, "dropping undecodable message");
                        return;
                    }
                };
                if topic == LOBBY_TOPIC {
                    self.handle_lobby_message(from, msg).await;
                } else if self.is_room_topic(&topic) {
                    self.handle_room_message(from, msg).await;
                } else {
                    trace!(%from, %topic, %action, "message for a channel no longer open");
                }
            }
            ChannelEvent::PeerLeft { topic, peer } if self.is_room_topic(&topic) => {
                self.handle_peer_left(peer).await;
            }
            ChannelEvent::PeerJoined { topic, peer } => {
                trace!(%peer, %topic, "peer subscribed");
            }
            ChannelEvent::PeerLeft { topic, peer } => {
                trace!(%peer, %topic, "peer unsubscribed");
            }
        }
    }

    async fn handle_lobby_message(&mut self, from: PeerId, msg: RoomMessage) {
        match msg {
            RoomMessage::Announce(summary) => self.on_announce(from, summary),
            RoomMessage::Close(close) => self.on_lobby_close(from, close).await,
            other => {
                debug!(%from, action = %other.action(), "unexpected action on lobby");
            }
        }
    }

    async fn handle_room_message(&mut self, from: PeerId, msg: RoomMessage) {
        match msg {
            RoomMessage::JoinRequest(req) => self.on_join_request(from, req).await,
            RoomMessage::JoinResponse(resp) => self.on_join_response(from, resp).await,
            RoomMessage::LeaveNotify(notify) => self.on_leave_notify(from, notify).await,
            RoomMessage::GameState(state) => self.on_game_state(from, state),
            RoomMessage::PlayerAction(action) => self.on_player_action(from, action),
            RoomMessage::HostMigration(migration) => {
                self.on_host_migration(from, migration).await;
            }
            RoomMessage::Sync(room) => self.on_room_sync(from, room).await,
            RoomMessage::Close(close) => self.on_room_close(from, close).await,
            RoomMessage::Announce(_) => {
                debug!(%from, "room_announce on a room channel, ignoring");
            }
        }
    }

    // --- Lobby ---

    fn on_announce(&mut self, from: PeerId, summary: RoomSummary) {
        if summary.host_id != from {
            warn!(%from, claimed = %summary.host_id, room_id = %summary.id, "announce for a room the sender does not host");
            return;
        }
        self.registry.observe(summary, Instant::now());
        self.emit_room_list();
    }

    async fn on_lobby_close(&mut self, from: PeerId, close: RoomClose) {
        let known_host = self
            .registry
            .get(&close.room_id, Instant::now())
            .map(|e| e.room.host_id.clone());
        if known_host.as_ref().is_some_and(|host| *host != from) {
            warn!(%from, room_id = %close.room_id, "room_close from a peer that is not the host");
            return;
        }
        if self.registry.remove(&close.room_id) {
            self.emit_room_list();
        }
        // The room-channel copy may have been lost. Either copy dissolves
        // the room this peer is in or joining.
        if self.session.room_id() == Some(&close.room_id) {
            self.on_room_close(from, close).await;
        }
    }

    // --- Host side ---

    async fn on_join_request(&mut self, from: PeerId, req: JoinRequest) {
        if !self.session.is_host() {
            trace!(%from, "join_request while not hosting, ignoring");
            return;
        }
        if req.player_id != from {
            warn!(%from, claimed = %req.player_id, "join_request on behalf of another peer");
            return;
        }
        let Some(room) = self.session.room_mut() else {
            return;
        };

        let admission = room.try_add_player(from.clone());
        let response = match admission {
            Admission::Added => {
                info!(
                    room_id = %room.id,
                    player = %from,
                    players = room.players.len(),
                    "player joined"
                );
                JoinResponse::accept(room.clone(), self.last_game_state.clone())
            }
            Admission::AlreadyMember => {
                debug!(room_id = %room.id, player = %from, "duplicate join_request");
                JoinResponse::accept(room.clone(), self.last_game_state.clone())
            }
            Admission::Full => {
                info!(room_id = %room.id, player = %from, "join rejected, room is full");
                JoinResponse::reject("room is full")
            }
        };

        if let Err(e) = self
            .publish_room(&RoomMessage::JoinResponse(response), Some(&from))
            .await
        {
            warn!(player = %from, error = %e, "sending join_response failed");
        }

        if admission == Admission::Added {
            self.membership_changed().await;
            self.events.emit(RoomEvent::PlayerJoin(from));
        }
    }

    async fn on_leave_notify(&mut self, from: PeerId, notify: LeaveNotify) {
        if !self.session.is_host() {
            trace!(%from, "leave_notify while not hosting, ignoring");
            return;
        }
        if notify.player_id != from {
            warn!(%from, claimed = %notify.player_id, "leave_notify on behalf of another peer");
            return;
        }
        self.remove_member(&from).await;
    }

    fn on_player_action(&mut self, from: PeerId, action: Vec<u8>) {
        let is_member = self
            .session
            .room()
            .filter(|_| self.session.is_host())
            .is_some_and(|room| room.has_player(&from));
        if !is_member {
            debug!(%from, "player_action not addressed to a host of the sender's room");
            return;
        }
        self.events.emit(RoomEvent::PlayerAction { from, action });
    }

    /// Host only: drops `peer` and tells everyone.
    async fn remove_member(&mut self, peer: &PeerId) {
        let Some(room) = self.session.room_mut() else {
            return;
        };
        if !room.remove_player(peer) {
            return;
        }
        info!(
            room_id = %room.id,
            player = %peer,
            players = room.players.len(),
            "player left"
        );
        self.membership_changed().await;
        self.events.emit(RoomEvent::PlayerLeave(peer.clone()));
    }

    /// Host only: re-announces and pushes the new member list.
    async fn membership_changed(&mut self) {
        self.announce().await;
        self.broadcast_sync().await;
    }

    async fn broadcast_sync(&self) {
        let Some(room) = self.session.room() else {
            return;
        };
        let sync = RoomMessage::Sync(room.clone());
        if let Err(e) = self.publish_room(&sync, None).await {
            warn!(error = %e, "room_sync failed");
        }
    }

    // --- Participant side ---

    async fn on_join_response(&mut self, from: PeerId, resp: JoinResponse) {
        let Some(pending) = self.pending.as_ref() else {
            debug!(%from, "join_response without a pending join");
            return;
        };

        if !resp.accepted {
            if from != pending.expected_host {
                warn!(%from, "join rejection from a peer that is not the host");
                return;
            }
            let Some(pending) = self.pending.take() else {
                return;
            };
            let reason = resp.reason.unwrap_or_default();
            info!(room_id = %pending.room_id, %reason, "join rejected");
            if let Err(e) = self.teardown_room().await {
                debug!(error = %e, "closing room channel after rejection failed");
            }
            let _ = pending.reply.send(Err(RoomError::JoinRejected(reason)));
            return;
        }

        let Some(room) = resp.room_info else {
            return;
        };
        if room.id != pending.room_id || room.host_id != from {
            warn!(%from, room_id = %room.id, "join_response not from the room's host");
            return;
        }
        if !room.has_player(self.session.self_id()) {
            warn!(%from, room_id = %room.id, "accepted join_response without this peer");
            return;
        }
        let Some(pending) = self.pending.take() else {
            return;
        };

        info!(room_id = %room.id, host = %room.host_id, players = room.players.len(), "joined room");
        self.session.enter(room.clone());
        self.last_game_state = resp.game_state.clone();
        if let Some(state) = resp.game_state {
            self.events.emit(RoomEvent::GameStateUpdate(state));
        }
        let _ = pending.reply.send(Ok(room));
    }

    fn on_game_state(&mut self, from: PeerId, state: Vec<u8>) {
        let from_host = self.session.state() == RoomState::Joined
            && self.session.room().is_some_and(|r| r.host_id == from);
        if !from_host {
            debug!(%from, "game_state not from the known host, discarding");
            return;
        }
        self.last_game_state = Some(state.clone());
        self.events.emit(RoomEvent::GameStateUpdate(state));
    }

    async fn on_room_sync(&mut self, from: PeerId, synced: Room) {
        if self.session.state() != RoomState::Joined {
            return;
        }
        let self_id = self.session.self_id().clone();
        let Some(room) = self.session.room_mut() else {
            return;
        };
        if synced.id != room.id || synced.host_id != from || room.host_id != from {
            debug!(%from, "room_sync not from the known host, discarding");
            return;
        }

        if !synced.has_player(&self_id) {
            let room_id = room.id.clone();
            info!(%room_id, "host no longer lists this peer, leaving");
            if let Err(e) = self.teardown_room().await {
                debug!(error = %e, "closing room channel failed");
            }
            self.events.emit(RoomEvent::RoomClosed(room_id));
            return;
        }

        let joined: Vec<PeerId> = synced
            .players
            .iter()
            .filter(|p| !room.has_player(p))
            .cloned()
            .collect();
        let left: Vec<PeerId> = room
            .players
            .iter()
            .filter(|p| !synced.has_player(p))
            .cloned()
            .collect();
        *room = synced;

        for peer in left {
            self.events.emit(RoomEvent::PlayerLeave(peer));
        }
        for peer in joined {
            self.events.emit(RoomEvent::PlayerJoin(peer));
        }
    }

    async fn on_room_close(&mut self, from: PeerId, close: RoomClose) {
        if let Some(pending) = self.pending.as_ref() {
            if pending.room_id == close.room_id && pending.expected_host == from {
                if let Some(pending) = self.pending.take() {
                    info!(room_id = %pending.room_id, "room closed while joining");
                    if let Err(e) = self.teardown_room().await {
                        debug!(error = %e, "closing room channel failed");
                    }
                    let _ = pending
                        .reply
                        .send(Err(RoomError::RoomNotFound(pending.room_id)));
                }
            }
            return;
        }

        let Some(room) = self.session.room() else {
            return;
        };
        if room.id != close.room_id || room.host_id != from || self.session.is_host() {
            debug!(%from, room_id = %close.room_id, "room_close not from the known host, discarding");
            return;
        }

        let room_id = room.id.clone();
        info!(%room_id, "room closed by host");
        if self.registry.remove(&room_id) {
            self.emit_room_list();
        }
        if let Err(e) = self.teardown_room().await {
            debug!(error = %e, "closing room channel failed");
        }
        self.events.emit(RoomEvent::RoomClosed(room_id));
    }

    // --- Membership and migration ---

    async fn handle_peer_left(&mut self, peer: PeerId) {
        match self.session.state() {
            RoomState::Hosting => self.remove_member(&peer).await,
            RoomState::Joined => {
                let Some(room) = self.session.room_mut() else {
                    return;
                };
                let removed = room.remove_player(&peer);
                let host_gone = !room.has_player(&room.host_id);
                if removed {
                    self.events.emit(RoomEvent::PlayerLeave(peer));
                }
                if host_gone {
                    self.elect_new_host().await;
                }
            }
            RoomState::Joining | RoomState::NotInRoom => {}
        }
    }

    /// Runs the election after the host left the room channel.
    ///
    /// Every survivor computes the same winner, so a follower adopts it
    /// right away instead of waiting for its `host_migration`, which may
    /// already have arrived and been ignored while the old host was still
    /// listed.
    async fn elect_new_host(&mut self) {
        let self_id = self.session.self_id().clone();
        let Some(room) = self.session.room_mut() else {
            return;
        };
        match plan_migration(&room.players, &room.host_id, &self_id) {
            Migration::PromoteSelf => self.promote().await,
            Migration::Follow(elected) => {
                let departed = std::mem::replace(&mut room.host_id, elected.clone());
                info!(
                    room_id = %room.id,
                    %departed,
                    host = %elected,
                    "host left, following elected host"
                );
                self.events.emit(RoomEvent::HostMigration(elected));
            }
        }
    }

    async fn promote(&mut self) {
        let self_id = self.session.self_id().clone();
        let Some(room) = self.session.room_mut() else {
            return;
        };
        if !room.has_player(&self_id) {
            room.players.push(self_id.clone());
        }
        let previous = std::mem::replace(&mut room.host_id, self_id.clone());
        info!(room_id = %room.id, %previous, "promoted to host");

        self.announcer.start();
        self.announce().await;
        let migration = RoomMessage::HostMigration(HostMigration {
            new_host_id: self_id.clone(),
        });
        if let Err(e) = self.publish_room(&migration, None).await {
            warn!(error = %e, "host_migration broadcast failed");
        }
        self.broadcast_sync().await;
        self.events.emit(RoomEvent::HostMigration(self_id));
    }

    async fn on_host_migration(&mut self, from: PeerId, migration: HostMigration) {
        if migration.new_host_id != from {
            warn!(%from, claimed = %migration.new_host_id, "host_migration on behalf of another peer");
            return;
        }
        let state = self.session.state();
        let self_id = self.session.self_id().clone();
        let Some(room) = self.session.room_mut() else {
            return;
        };
        if room.host_id == from {
            trace!(%from, "host_migration for the current host");
            return;
        }
        if !room.has_player(&from) {
            debug!(%from, "host_migration from a non-member, ignoring");
            return;
        }

        match state {
            RoomState::Joined => {
                let host_gone = !room.has_player(&room.host_id);
                if !host_gone && from > room.host_id {
                    debug!(%from, host = %room.host_id, "ignoring higher host claim");
                    return;
                }
                room.host_id = from.clone();
                info!(room_id = %room.id, host = %from, "adopted new host");
                self.events.emit(RoomEvent::HostMigration(from));
            }
            RoomState::Hosting if from < self_id => {
                room.host_id = from.clone();
                info!(room_id = %room.id, host = %from, "lower peer claims host, stepping down");
                self.announcer.stop();
                self.events.emit(RoomEvent::HostMigration(from));
            }
            RoomState::Hosting => {
                debug!(%from, "higher peer claims host, reasserting");
                let reassert = RoomMessage::HostMigration(HostMigration {
                    new_host_id: self_id,
                });
                if let Err(e) = self.publish_room(&reassert, None).await {
                    warn!(error = %e, "host_migration reassert failed");
                }
            }
            RoomState::Joining | RoomState::NotInRoom => {}
        }
    }

    // -----------------------------------------------------------------------
    // Plumbing
    // -----------------------------------------------------------------------

    fn emit_room_list(&self) {
        let rooms = self.registry.list(Instant::now(), &RoomFilter::All);
        self.events.emit(RoomEvent::RoomListUpdate(rooms));
    }

    async fn publish_lobby(&self, msg: &RoomMessage) -> Result<(), RoomError> {
        let lobby = self
            .lobby
            .as_ref()
            .ok_or_else(|| TransportError::ChannelClosed(LOBBY_TOPIC.into()))?;
        send(lobby, &self.codec, msg, None).await
    }

    async fn publish_room(
        &self,
        msg: &RoomMessage,
        target: Option<&PeerId>,
    ) -> Result<(), RoomError> {
        let channel = self.room_channel.as_ref().ok_or_else(|| {
            let topic = self
                .session
                .room_id()
                .map(RoomId::topic)
                .unwrap_or_default();
            TransportError::ChannelClosed(topic)
        })?;
        send(channel, &self.codec, msg, target).await
    }

    /// Drops the room channel and every bit of per-room state.
    async fn teardown_room(&mut self) -> Result<(), RoomError> {
        self.announcer.stop();
        self.session.clear();
        self.last_game_state = None;
        if let Some(channel) = self.room_channel.take() {
            channel.close().await?;
        }
        Ok(())
    }
}
