//! The server hub: one task that owns every connection, the user and room
//! directories, and all rooms.
//!
//! The hub's `select!` loop multiplexes socket accepts, decoded client
//! messages, the 1 Hz draft tick, the directory-diff flush timer, and
//! SIGHUP notice reloads. Because the loop is the only owner of hub and
//! room state, every mutation is serialized and no handler blocks.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use draftden_core::cards::CardStore;
use draftden_core::config::RoomSpec;
use draftden_core::dispenser::build_dispensers;
use draftden_core::engine::DraftEngine;
use draftden_core::validate::{validate_room_spec, CreateRoomFailure};

use draftden_net::protocol::{
    ChatScope, ClientDownloadInfo, ClientToServer, JoinRoomFailure, LoginResult, RoomSummary,
    ServerToClient, SetCapability, PROTOCOL_VERSION_MAJOR, PROTOCOL_VERSION_MINOR,
};

use crate::connection::{
    spawn_connection, ConnCtx, ConnId, HubEvent, Outbox, IDLE_TIMEOUT_SECS,
};
use crate::notices::Notices;
use crate::room::{LeaveOutcome, Room};

const HUB_EVENT_CAPACITY: usize = 1024;

/// Where refused clients are pointed for a compatible build.
const CLIENT_DOWNLOAD_DESCRIPTION: &str =
    "Your client speaks an incompatible protocol version. Download a matching client:";
const CLIENT_DOWNLOAD_URL: &str = "https://draftden.net/download";

#[derive(Debug, Clone, Default)]
pub struct HubConfig {
    pub server_name: String,
    pub announcements_file: Option<PathBuf>,
    pub alerts_file: Option<PathBuf>,
}

/// Handle to a running server; dropping it does not stop the hub, call
/// `shutdown`.
pub struct ServerHandle {
    addr: std::net::SocketAddr,
    shutdown_tx: broadcast::Sender<()>,
}

impl ServerHandle {
    /// Bind the listener and spawn the hub loop. Bind failures surface to
    /// the caller (exit code 3 at the CLI).
    pub async fn start(
        port: u16,
        store: Arc<CardStore>,
        config: HubConfig,
    ) -> std::io::Result<ServerHandle> {
        let listener = TcpListener::bind(("0.0.0.0", port)).await?;
        let addr = listener.local_addr()?;
        info!(addr = %addr, "server listening");

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let hub = ServerHub::new(store, config);
        tokio::spawn(hub.run(listener, shutdown_rx));

        Ok(ServerHandle { addr, shutdown_tx })
    }

    pub fn addr(&self) -> std::net::SocketAddr {
        self.addr
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
        info!("server shutdown initiated");
    }
}

pub struct ServerHub {
    store: Arc<CardStore>,
    config: HubConfig,
    notices: Notices,

    conns: HashMap<ConnId, ConnCtx>,
    /// Logged-in users by name; names are unique server-wide.
    users: HashMap<String, ConnId>,
    rooms: HashMap<u32, Room>,
    next_room_id: u32,

    rooms_diff_added: Vec<u32>,
    rooms_diff_removed: Vec<u32>,
    rooms_diff_counts: BTreeMap<u32, usize>,
    users_diff_added: Vec<String>,
    users_diff_removed: Vec<String>,

    next_tick_at: Instant,
}

impl ServerHub {
    pub fn new(store: Arc<CardStore>, config: HubConfig) -> Self {
        let notices = Notices::load(
            config.announcements_file.clone(),
            config.alerts_file.clone(),
        );
        Self {
            store,
            config,
            notices,
            conns: HashMap::new(),
            users: HashMap::new(),
            rooms: HashMap::new(),
            next_room_id: 1,
            rooms_diff_added: Vec::new(),
            rooms_diff_removed: Vec::new(),
            rooms_diff_counts: BTreeMap::new(),
            users_diff_added: Vec::new(),
            users_diff_removed: Vec::new(),
            next_tick_at: Instant::now() + Duration::from_secs(1),
        }
    }

    pub async fn run(mut self, listener: TcpListener, mut shutdown_rx: broadcast::Receiver<()>) {
        let (hub_tx, mut hub_rx) = mpsc::channel::<HubEvent>(HUB_EVENT_CAPACITY);
        let mut tick = tokio::time::interval(Duration::from_secs(1));
        let mut flush = tokio::time::interval(Duration::from_secs(1));
        let mut hangup = hangup_stream();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            debug!(addr = %addr, "new connection");
                            self.accept(stream, hub_tx.clone());
                        }
                        Err(e) => warn!(error = %e, "accept failed"),
                    }
                }
                Some(event) = hub_rx.recv() => {
                    match event {
                        HubEvent::Inbound { conn, msg } => self.handle_inbound(conn, msg),
                        HubEvent::ConnectionClosed { conn } => self.disconnect(conn),
                    }
                }
                _ = tick.tick() => self.handle_tick(),
                _ = flush.tick() => self.flush_directories(),
                _ = hangup.recv() => self.reload_notices(),
                _ = shutdown_rx.recv() => {
                    info!("hub shutting down");
                    break;
                }
            }
            self.reap_dead_connections();
        }
    }

    fn millis_to_next_tick(&self) -> u32 {
        self.next_tick_at
            .saturating_duration_since(Instant::now())
            .as_millis()
            .min(1000) as u32
    }

    fn accept(&mut self, stream: TcpStream, hub_tx: mpsc::Sender<HubEvent>) {
        let (conn, tx, reader) = spawn_connection(stream, hub_tx);
        self.conns.insert(conn, ConnCtx::new(tx, Some(reader)));

        let millis = self.millis_to_next_tick();
        let mut out = Outbox::new(&mut self.conns, millis);
        out.send(
            conn,
            ServerToClient::GreetingInd {
                protocol_version_major: PROTOCOL_VERSION_MAJOR,
                protocol_version_minor: PROTOCOL_VERSION_MINOR,
                server_name: self.config.server_name.clone(),
                server_version: env!("CARGO_PKG_VERSION").to_string(),
            },
        );
    }

    fn handle_inbound(&mut self, conn: ConnId, msg: ClientToServer) {
        // Any traffic proves liveness.
        if let Some(ctx) = self.conns.get_mut(&conn) {
            ctx.last_seen = Instant::now();
        } else {
            return;
        }

        let logged_in = self
            .conns
            .get(&conn)
            .map(|c| c.user.is_some())
            .unwrap_or(false);

        match msg {
            ClientToServer::LoginReq {
                name,
                protocol_version_major,
                protocol_version_minor,
                client_version,
            } => self.handle_login(
                conn,
                name,
                protocol_version_major,
                protocol_version_minor,
                client_version,
            ),
            ClientToServer::KeepAliveInd {} => {}
            _ if !logged_in => {
                warn!(conn = %conn, "message before login, closing");
                self.mark_dead(conn);
            }
            ClientToServer::ChatMessageInd { scope, text } => {
                self.handle_chat(conn, scope, text)
            }
            ClientToServer::CreateRoomReq { room_config } => {
                self.handle_create_room(conn, room_config)
            }
            ClientToServer::JoinRoomReq { room_id, password } => {
                self.handle_join_room(conn, room_id, password)
            }
            ClientToServer::DepartRoomInd {} => self.handle_depart(conn),
            ClientToServer::PlayerReadyInd { ready } => {
                self.with_room_of(conn, |room, out| room.handle_ready(out, conn, ready))
            }
            ClientToServer::PlayerCardSelectionReq {
                pack_id,
                card,
                zone,
            } => self.with_room_of(conn, |room, out| {
                room.handle_pick(out, conn, pack_id, card, zone)
            }),
            ClientToServer::PlayerAutoCardSelectionReq { pack_id, card } => {
                self.with_room_of(conn, |room, _out| {
                    room.handle_auto_pick_hint(conn, pack_id, card)
                })
            }
            ClientToServer::PlayerInventoryUpdateInd { moves, basic_lands } => {
                self.with_room_of(conn, |room, out| {
                    room.handle_inventory_update(out, conn, moves, basic_lands)
                })
            }
        }
    }

    fn handle_login(
        &mut self,
        conn: ConnId,
        name: String,
        major: u32,
        minor: u32,
        client_version: String,
    ) {
        if self
            .conns
            .get(&conn)
            .map(|c| c.user.is_some())
            .unwrap_or(true)
        {
            warn!(conn = %conn, "duplicate login attempt");
            return;
        }

        let millis = self.millis_to_next_tick();
        let name = name.trim().to_string();
        debug!(conn = %conn, name, major, minor, client_version, "login request");

        let failure = if major != PROTOCOL_VERSION_MAJOR {
            Some((
                LoginResult::FailureIncompatibleProtoVer,
                Some(ClientDownloadInfo {
                    description: CLIENT_DOWNLOAD_DESCRIPTION.to_string(),
                    url: CLIENT_DOWNLOAD_URL.to_string(),
                }),
            ))
        } else if name.is_empty() {
            Some((LoginResult::FailureInvalidName, None))
        } else if self.users.contains_key(&name) {
            Some((LoginResult::FailureNameInUse, None))
        } else {
            None
        };

        if let Some((result, client_download_info)) = failure {
            info!(conn = %conn, name, result = ?result, "login refused");
            let mut out = Outbox::new(&mut self.conns, millis);
            out.send(
                conn,
                ServerToClient::LoginRsp {
                    result,
                    client_download_info,
                },
            );
            self.mark_dead(conn);
            return;
        }

        info!(conn = %conn, name, "user logged in");
        self.users.insert(name.clone(), conn);
        if let Some(ctx) = self.conns.get_mut(&conn) {
            ctx.user = Some(name.clone());
        }
        self.note_user_added(name);

        // Login burst: result, notices, capabilities, then baseline
        // directories. Diffs only from here on.
        let capabilities = self.capabilities();
        let rooms_baseline = ServerToClient::RoomsInfoInd {
            added_rooms: self.room_summaries(),
            removed_rooms: vec![],
            player_counts: vec![],
        };
        let users_baseline = ServerToClient::UsersInfoInd {
            added_users: self.users.keys().cloned().collect(),
            removed_users: vec![],
        };

        let announcements = self.notices.announcements().to_string();
        let alerts = self.notices.alerts().to_string();
        let mut out = Outbox::new(&mut self.conns, millis);
        out.send(
            conn,
            ServerToClient::LoginRsp {
                result: LoginResult::Success,
                client_download_info: None,
            },
        );
        out.send(conn, ServerToClient::AnnouncementsInd {
            text: announcements,
        });
        if !alerts.is_empty() {
            out.send(conn, ServerToClient::AlertsInd { text: alerts });
        }
        out.send(conn, capabilities);
        out.send(conn, rooms_baseline);
        out.send(conn, users_baseline);
    }

    fn handle_chat(&mut self, conn: ConnId, scope: ChatScope, text: String) {
        let Some(sender) = self.conns.get(&conn).and_then(|c| c.user.clone()) else {
            return;
        };
        match scope {
            ChatScope::All => {
                let msg = ServerToClient::ChatMessageDeliveryInd {
                    sender,
                    scope: ChatScope::All,
                    text,
                    timestamp: Utc::now(),
                };
                self.broadcast_logged_in(msg);
            }
            ChatScope::Room => {
                self.with_room_of(conn, |room, out| {
                    let sender = sender.clone();
                    room.handle_chat(out, &sender, text)
                });
            }
        }
    }

    fn handle_create_room(&mut self, conn: ConnId, spec: RoomSpec) {
        let millis = self.millis_to_next_tick();

        let failure = if self.rooms.values().any(|r| r.name() == spec.name) {
            Some(CreateRoomFailure::NameInUse)
        } else {
            validate_room_spec(&spec, &self.store).err()
        };
        if let Some(result) = failure {
            info!(conn = %conn, room = spec.name, result = ?result, "create room refused");
            let mut out = Outbox::new(&mut self.conns, millis);
            out.send(conn, ServerToClient::CreateRoomFailureRsp { result });
            return;
        }

        let dispensers = match build_dispensers(
            &spec.draft_config.dispensers,
            &spec.draft_config.custom_card_lists,
            &self.store,
        ) {
            Ok(dispensers) => dispensers,
            Err(e) => {
                // Validation should have caught anything that lands here.
                warn!(error = %e, "dispenser construction failed");
                let mut out = Outbox::new(&mut self.conns, millis);
                out.send(
                    conn,
                    ServerToClient::CreateRoomFailureRsp {
                        result: CreateRoomFailure::InvalidDispenserConfig,
                    },
                );
                return;
            }
        };

        let room_id = self.next_room_id;
        self.next_room_id += 1;
        let engine = DraftEngine::new(
            spec.draft_config.clone(),
            dispensers,
            StdRng::from_entropy(),
        );
        info!(room = room_id, name = spec.name, "room created");
        let room = Room::new(room_id, spec, engine, Instant::now());
        self.rooms.insert(room_id, room);
        self.rooms_diff_added.push(room_id);

        let mut out = Outbox::new(&mut self.conns, millis);
        out.send(conn, ServerToClient::CreateRoomSuccessRsp { room_id });
    }

    fn handle_join_room(&mut self, conn: ConnId, room_id: u32, password: Option<String>) {
        let millis = self.millis_to_next_tick();
        let Some(ctx) = self.conns.get(&conn) else {
            return;
        };
        if ctx.room.is_some() {
            warn!(conn = %conn, "join while already in a room, ignoring");
            return;
        }
        let Some(name) = ctx.user.clone() else {
            return;
        };

        let Some(room) = self.rooms.get_mut(&room_id) else {
            let mut out = Outbox::new(&mut self.conns, millis);
            out.send(
                conn,
                ServerToClient::JoinRoomFailureRsp {
                    result: JoinRoomFailure::NoSuchRoom,
                    room_id,
                },
            );
            return;
        };

        let result = {
            let mut out = Outbox::new(&mut self.conns, millis);
            room.join(&mut out, conn, &name, password.as_deref())
        };
        if result.is_ok() {
            if let Some(ctx) = self.conns.get_mut(&conn) {
                ctx.room = Some(room_id);
            }
            self.note_player_count(room_id);
        }
    }

    fn handle_depart(&mut self, conn: ConnId) {
        let millis = self.millis_to_next_tick();
        let Some(room_id) = self.conns.get(&conn).and_then(|c| c.room) else {
            return;
        };
        if let Some(ctx) = self.conns.get_mut(&conn) {
            ctx.room = None;
        }

        let Some(room) = self.rooms.get_mut(&room_id) else {
            return;
        };
        let outcome = {
            let mut out = Outbox::new(&mut self.conns, millis);
            room.leave(&mut out, conn, Instant::now())
        };
        match outcome {
            LeaveOutcome::RemovedAndExpired => {
                info!(room = room_id, "room emptied before start, tearing down");
                self.teardown_room(room_id);
            }
            LeaveOutcome::NotMember => {}
            _ => self.note_player_count(room_id),
        }
    }

    /// Route a message to the sender's current room, then flush coalesced
    /// broadcasts and reap a room that hit a fatal engine error.
    fn with_room_of<F>(&mut self, conn: ConnId, f: F)
    where
        F: FnOnce(&mut Room, &mut Outbox<'_>),
    {
        let millis = self.millis_to_next_tick();
        let Some(room_id) = self.conns.get(&conn).and_then(|c| c.room) else {
            debug!(conn = %conn, "room message from a connection not in a room");
            return;
        };
        let Some(room) = self.rooms.get_mut(&room_id) else {
            return;
        };

        let fatal = {
            let mut out = Outbox::new(&mut self.conns, millis);
            f(room, &mut out);
            room.flush_draft_state(&mut out);
            room.take_fatal_error()
        };
        if fatal {
            self.teardown_room(room_id);
        }
    }

    fn handle_tick(&mut self) {
        let now = Instant::now();
        self.next_tick_at = now + Duration::from_secs(1);
        let millis = 1000;

        let room_ids: Vec<u32> = self.rooms.keys().copied().collect();
        for room_id in &room_ids {
            let Some(room) = self.rooms.get_mut(room_id) else {
                continue;
            };
            let fatal = if room.draft_armed() {
                let mut out = Outbox::new(&mut self.conns, millis);
                room.tick(&mut out);
                room.take_fatal_error()
            } else {
                false
            };
            if fatal {
                self.teardown_room(*room_id);
            }
        }

        // Room expiration sweep.
        for room_id in room_ids {
            if self
                .rooms
                .get(&room_id)
                .map(|r| r.expired(now))
                .unwrap_or(false)
            {
                info!(room = room_id, "room expired");
                self.teardown_room(room_id);
            }
        }

        // Keep-alive: connections silent too long are presumed dead.
        let idle = Duration::from_secs(IDLE_TIMEOUT_SECS);
        let stale: Vec<ConnId> = self
            .conns
            .iter()
            .filter(|(_, ctx)| now.duration_since(ctx.last_seen) >= idle)
            .map(|(&conn, _)| conn)
            .collect();
        for conn in stale {
            info!(conn = %conn, "connection idle too long, closing");
            self.mark_dead(conn);
        }
    }

    /// Remove a room, clear its members' room pointers, and queue the
    /// directory diff.
    fn teardown_room(&mut self, room_id: u32) {
        let Some(room) = self.rooms.remove(&room_id) else {
            return;
        };
        for conn in room.conn_ids() {
            if let Some(ctx) = self.conns.get_mut(&conn) {
                ctx.room = None;
            }
        }

        // A room that was never announced just vanishes from the pending
        // diff; an announced one is announced as removed.
        if let Some(pos) = self.rooms_diff_added.iter().position(|&id| id == room_id) {
            self.rooms_diff_added.remove(pos);
        } else {
            self.rooms_diff_removed.push(room_id);
        }
        self.rooms_diff_counts.remove(&room_id);
    }

    fn reload_notices(&mut self) {
        info!("SIGHUP: reloading notice files");
        let (announcements_changed, alerts_changed) = self.notices.reload();
        if announcements_changed {
            let msg = ServerToClient::AnnouncementsInd {
                text: self.notices.announcements().to_string(),
            };
            self.broadcast_logged_in(msg);
        }
        // An emptied alert is still broadcast so clients clear it.
        if alerts_changed {
            let msg = ServerToClient::AlertsInd {
                text: self.notices.alerts().to_string(),
            };
            self.broadcast_logged_in(msg);
        }
    }

    /// Flush accumulated directory diffs to every logged-in client.
    fn flush_directories(&mut self) {
        if !self.users_diff_added.is_empty() || !self.users_diff_removed.is_empty() {
            let msg = ServerToClient::UsersInfoInd {
                added_users: std::mem::take(&mut self.users_diff_added),
                removed_users: std::mem::take(&mut self.users_diff_removed),
            };
            self.broadcast_logged_in(msg);
        }

        if !self.rooms_diff_added.is_empty()
            || !self.rooms_diff_removed.is_empty()
            || !self.rooms_diff_counts.is_empty()
        {
            let added_rooms: Vec<RoomSummary> = std::mem::take(&mut self.rooms_diff_added)
                .into_iter()
                .filter_map(|id| self.rooms.get(&id).map(Room::summary))
                .collect();
            let msg = ServerToClient::RoomsInfoInd {
                added_rooms,
                removed_rooms: std::mem::take(&mut self.rooms_diff_removed),
                player_counts: std::mem::take(&mut self.rooms_diff_counts)
                    .into_iter()
                    .map(|(room_id, player_count)| {
                        draftden_net::protocol::PlayerCountUpdate {
                            room_id,
                            player_count,
                        }
                    })
                    .collect(),
            };
            self.broadcast_logged_in(msg);
        }
    }

    fn disconnect(&mut self, conn: ConnId) {
        let Some(ctx) = self.conns.remove(&conn) else {
            return;
        };
        if let Some(reader) = ctx.reader {
            reader.abort();
        }
        debug!(conn = %conn, user = ?ctx.user, "disconnected");

        if let Some(room_id) = ctx.room {
            if let Some(room) = self.rooms.get_mut(&room_id) {
                let outcome = {
                    let mut out = Outbox::new(&mut self.conns, 1000);
                    room.leave(&mut out, conn, Instant::now())
                };
                match outcome {
                    LeaveOutcome::RemovedAndExpired => self.teardown_room(room_id),
                    LeaveOutcome::NotMember => {}
                    _ => self.note_player_count(room_id),
                }
            }
        }

        if let Some(user) = ctx.user {
            self.users.remove(&user);
            self.note_user_removed(user);
        }
    }

    /// Tear down connections whose write queues overflowed during this
    /// event. Teardown broadcasts can overflow further queues, so loop
    /// until quiescent.
    fn reap_dead_connections(&mut self) {
        loop {
            let dead: Vec<ConnId> = self
                .conns
                .iter()
                .filter(|(_, ctx)| ctx.dead)
                .map(|(&conn, _)| conn)
                .collect();
            if dead.is_empty() {
                break;
            }
            for conn in dead {
                self.disconnect(conn);
            }
        }
    }

    fn mark_dead(&mut self, conn: ConnId) {
        if let Some(ctx) = self.conns.get_mut(&conn) {
            ctx.dead = true;
        }
    }

    fn broadcast_logged_in(&mut self, msg: ServerToClient) {
        let targets: Vec<ConnId> = self
            .conns
            .iter()
            .filter(|(_, ctx)| ctx.user.is_some())
            .map(|(&conn, _)| conn)
            .collect();
        let millis = self.millis_to_next_tick();
        let mut out = Outbox::new(&mut self.conns, millis);
        out.broadcast(&targets, &msg);
    }

    fn capabilities(&self) -> ServerToClient {
        ServerToClient::RoomCapabilitiesInd {
            sets: self
                .store
                .set_codes()
                .iter()
                .map(|code| SetCapability {
                    code: code.clone(),
                    name: self.store.set_name(code).unwrap_or_default().to_string(),
                    booster_generation: self.store.has_boosters(code),
                })
                .collect(),
        }
    }

    fn room_summaries(&self) -> Vec<RoomSummary> {
        let mut summaries: Vec<RoomSummary> = self.rooms.values().map(Room::summary).collect();
        summaries.sort_by_key(|s| s.room_id);
        summaries
    }

    fn note_player_count(&mut self, room_id: u32) {
        // Rooms still pending announcement carry their count in the
        // baseline entry at flush time.
        if self.rooms_diff_added.contains(&room_id) {
            return;
        }
        if let Some(room) = self.rooms.get(&room_id) {
            self.rooms_diff_counts.insert(room_id, room.player_count());
        }
    }

    fn note_user_added(&mut self, name: String) {
        // A relogin within one flush window cancels out.
        if let Some(pos) = self.users_diff_removed.iter().position(|n| n == &name) {
            self.users_diff_removed.remove(pos);
        } else {
            self.users_diff_added.push(name);
        }
    }

    fn note_user_removed(&mut self, name: String) {
        if let Some(pos) = self.users_diff_added.iter().position(|n| n == &name) {
            self.users_diff_added.remove(pos);
        } else {
            self.users_diff_removed.push(name);
        }
    }
}

/// SIGHUP stream; a never-ready stand-in on platforms without it.
#[cfg(unix)]
fn hangup_stream() -> tokio::signal::unix::Signal {
    tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup())
        .expect("install SIGHUP handler")
}

#[cfg(not(unix))]
fn hangup_stream() -> PendingSignal {
    PendingSignal
}

#[cfg(not(unix))]
struct PendingSignal;

#[cfg(not(unix))]
impl PendingSignal {
    async fn recv(&mut self) -> Option<()> {
        std::future::pending().await
    }
}
