use crate::domain::validation::{
    sanitize_player_state, valid_character, valid_chat_text, valid_coord, valid_damage, valid_id,
    valid_username, valid_zone_id,
};
use crate::domain::{PlayerState, Vec2};
use crate::interface_adapters::protocol::{
    ClientMessage, EnemyStateDto, RoomSummaryDto, RosterEntryDto, ServerMessage, ZonePlayerDto,
};
use crate::interface_adapters::state::AppState;
use crate::interface_adapters::utils::rng::rand_id;
use crate::use_cases::{
    AttackerIdentity, Frame, LeaveOutcome, RoomError, RoomPlayer, Target, ZoneEvent, ZoneHandle,
    ZoneUpdate,
};

use futures_util::SinkExt;

use axum::{
    extract::{
        State,
        ws::{CloseFrame, Message, Utf8Bytes, WebSocket, WebSocketUpgrade, close_code},
    },
    response::IntoResponse,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;
use tracing::{debug, error, info, info_span, warn};

#[derive(Debug)]
enum NetError {
    // Categorizes connection lifecycle failures so callers can decide policy.
    #[allow(dead_code)]
    Ws(axum::Error),
    #[allow(dead_code)]
    Serialization(serde_json::Error),
    ZoneEventsClosed,
    ZoneFramesClosed,
    RoomFramesClosed,
}

impl From<axum::Error> for NetError {
    fn from(e: axum::Error) -> Self {
        NetError::Ws(e)
    }
}

const LOG_THROTTLE: Duration = Duration::from_secs(2);
const MAX_INVALID_JSON: u32 = 10;
// Lobby browsing is allowed, but a socket cannot squat unjoined forever.
const LOBBY_IDLE_TIMEOUT: Duration = Duration::from_secs(30);
// Inbound flood ceiling, set well above the legitimate state-report cadence.
const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(10);
const RATE_LIMIT_MAX_MESSAGES: u32 = 600;

/// Serializes each typed zone update once and fans the shared bytes out to
/// every connection bound to the zone.
pub async fn zone_update_serializer(
    zone_id: u32,
    mut updates_rx: broadcast::Receiver<ZoneUpdate>,
    frames_tx: broadcast::Sender<Frame>,
) {
    loop {
        match updates_rx.recv().await {
            Ok(update) => {
                let (target, msg) = match update {
                    ZoneUpdate::Snapshot(enemies) => (
                        Target::All,
                        ServerMessage::EnemySync {
                            enemies: enemies.iter().map(EnemyStateDto::from).collect(),
                        },
                    ),
                    ZoneUpdate::EnemyHp {
                        enemy_id,
                        hp,
                        max_hp,
                    } => (
                        Target::All,
                        ServerMessage::EnemyStateUpdate {
                            enemy_id,
                            hp,
                            max_hp,
                        },
                    ),
                    ZoneUpdate::EnemyKilled { enemy_id, zone_id } => (
                        Target::All,
                        ServerMessage::EnemyKilledSync {
                            enemy_id,
                            zone: zone_id,
                        },
                    ),
                    ZoneUpdate::EnemyRespawn { enemy_id, zone_id } => (
                        Target::All,
                        ServerMessage::EnemyRespawn {
                            enemy_id,
                            zone: zone_id,
                        },
                    ),
                    ZoneUpdate::EnemyAttack {
                        enemy_id,
                        target_player_id,
                        damage,
                    } => (
                        Target::All,
                        ServerMessage::EnemyAttack {
                            enemy_id,
                            damage,
                            target_player_id,
                        },
                    ),
                    ZoneUpdate::Balance { player_id, balance } => (
                        Target::One(player_id),
                        ServerMessage::BalanceUpdate { balance },
                    ),
                };
                let txt = match serde_json::to_string(&msg) {
                    Ok(txt) => txt,
                    Err(e) => {
                        error!(zone_id, error = ?e, "failed to serialize zone update");
                        continue;
                    }
                };
                // Send failures mean the zone has no bound connections.
                let _ = frames_tx.send(Frame {
                    target,
                    bytes: Utf8Bytes::from(txt),
                });
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(
                    zone_id,
                    missed = n,
                    "zone serializer lagged; skipping to latest"
                );
            }
            Err(broadcast::error::RecvError::Closed) => {
                // Routine teardown: the session and its handles are gone.
                debug!(zone_id, "zone updates channel closed; serializer exiting");
                break;
            }
        }
    }
}

/// Spawns the serializer task for a freshly created zone session.
pub fn spawn_zone_serializer(handle: &ZoneHandle) {
    tokio::spawn(zone_update_serializer(
        handle.zone_id,
        handle.update_tx.subscribe(),
        handle.frames_tx.clone(),
    ));
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>) {
    // Correlates logs for this connection before a player id exists.
    let conn_id = rand_id();
    let span = info_span!("conn", conn_id, player_id = tracing::field::Empty);
    let _enter = span.enter();

    let mut stats = ConnStats::new();

    // A connection alternates between the lobby phase and a joined room
    // until the socket goes away.
    loop {
        let mut ctx = match lobby_phase(&mut socket, &state, &mut stats).await {
            Ok(Some(ctx)) => ctx,
            Ok(None) => break,
            Err(e) => {
                error!(error = ?e, "failed during lobby phase");
                let _ =
                    send_close_with_reason(&mut socket, close_code::ERROR, "internal error").await;
                break;
            }
        };
        span.record("player_id", ctx.player_id.as_str());
        info!(
            player_id = %ctx.player_id,
            username = %ctx.username,
            room_id = %ctx.room_id,
            "client joined room"
        );

        match run_client_loop(&mut socket, &mut ctx, &state, &mut stats).await {
            Ok(LoopExit::LeftRoom) => {
                debug!(player_id = %ctx.player_id, "client returned to the lobby");
            }
            Ok(LoopExit::Disconnected) => break,
            Err(e) => {
                warn!(error = ?e, "client loop exited with error");
                break;
            }
        }
    }

    debug!(
        msgs_in = stats.msgs_in,
        msgs_out = stats.msgs_out,
        bytes_in = stats.bytes_in,
        bytes_out = stats.bytes_out,
        invalid_json = stats.invalid_json,
        lag_recovery_count = stats.lag_recovery_count,
        "connection stats"
    );
    info!("client disconnected");
}

fn encode(msg: &ServerMessage) -> Result<Utf8Bytes, NetError> {
    let txt = serde_json::to_string(msg).map_err(NetError::Serialization)?;
    Ok(Utf8Bytes::from(txt))
}

async fn send_bytes(
    socket: &mut WebSocket,
    bytes: Utf8Bytes,
    stats: &mut ConnStats,
) -> Result<(), NetError> {
    let len = bytes.len();
    socket.send(Message::Text(bytes)).await?;
    stats.count_out(len);
    Ok(())
}

async fn send_message(
    socket: &mut WebSocket,
    msg: &ServerMessage,
    stats: &mut ConnStats,
) -> Result<(), NetError> {
    send_bytes(socket, encode(msg)?, stats).await
}

async fn send_close_with_reason(
    socket: &mut WebSocket,
    code: u16,
    reason: &'static str,
) -> Result<(), NetError> {
    socket
        .send(Message::Close(Some(CloseFrame {
            code,
            reason: reason.into(),
        })))
        .await
        .map_err(NetError::Ws)?;
    socket.close().await.map_err(NetError::Ws)
}

fn should_log(last: &mut Instant) -> bool {
    if last.elapsed() >= LOG_THROTTLE {
        *last = Instant::now();
        true
    } else {
        false
    }
}

/// Traffic counters for one connection, kept across room changes.
struct ConnStats {
    msgs_in: u64,
    msgs_out: u64,
    bytes_in: u64,
    bytes_out: u64,
    invalid_json: u32,
    // Count lag recovery snapshots sent to this client.
    lag_recovery_count: u64,
    window_start: Instant,
    msgs_in_window: u32,
    last_invalid_log: Instant,
    last_drop_log: Instant,
    last_lag_log: Instant,
}

impl ConnStats {
    fn new() -> Self {
        let stale = Instant::now() - LOG_THROTTLE;
        Self {
            msgs_in: 0,
            msgs_out: 0,
            bytes_in: 0,
            bytes_out: 0,
            invalid_json: 0,
            lag_recovery_count: 0,
            window_start: Instant::now(),
            msgs_in_window: 0,
            last_invalid_log: stale,
            last_drop_log: stale,
            last_lag_log: stale,
        }
    }

    /// Counts one inbound text message; true when the client exceeded the
    /// rolling rate window.
    fn count_in(&mut self, bytes: usize) -> bool {
        self.msgs_in += 1;
        self.bytes_in += bytes as u64;
        if self.window_start.elapsed() >= RATE_LIMIT_WINDOW {
            self.window_start = Instant::now();
            self.msgs_in_window = 0;
        }
        self.msgs_in_window += 1;
        self.msgs_in_window > RATE_LIMIT_MAX_MESSAGES
    }

    fn count_out(&mut self, bytes: usize) {
        self.msgs_out += 1;
        self.bytes_out += bytes as u64;
    }
}

/// Per-connection state while the client is a member of a room.
struct JoinedCtx {
    player_id: String,
    username: String,
    room_id: String,
    // Roster and host traffic broadcast by the room.
    room_frames_rx: broadcast::Receiver<Frame>,
    // Present while the player stands in a zone.
    zone: Option<ZoneBinding>,
    close_frame: Option<CloseFrame>,
}

/// The connection's attachment to one zone session.
struct ZoneBinding {
    handle: ZoneHandle,
    frames_rx: broadcast::Receiver<Frame>,
}

enum LoopControl {
    Continue,
    LeaveRoom,
    Disconnect,
}

enum LoopExit {
    LeftRoom,
    Disconnected,
}

/// Reads lobby traffic until the client joins a room or goes away.
/// `Ok(None)` is a clean exit; the socket has already been closed or lost.
async fn lobby_phase(
    socket: &mut WebSocket,
    state: &Arc<AppState>,
    stats: &mut ConnStats,
) -> Result<Option<JoinedCtx>, NetError> {
    loop {
        let incoming = match timeout(LOBBY_IDLE_TIMEOUT, socket.recv()).await {
            Ok(incoming) => incoming,
            Err(_) => {
                info!("client idled in the lobby too long");
                let _ =
                    send_close_with_reason(socket, close_code::POLICY, "lobby idle timeout").await;
                return Ok(None);
            }
        };
        let Some(incoming) = incoming else {
            info!("client disconnected in the lobby");
            return Ok(None);
        };
        let message = match incoming {
            Ok(message) => message,
            Err(e) => {
                debug!(error = %e, "websocket recv error in the lobby");
                return Ok(None);
            }
        };

        match message {
            Message::Text(text) => {
                if stats.count_in(text.len()) {
                    warn!("rate limit exceeded in the lobby");
                    let _ =
                        send_close_with_reason(socket, close_code::POLICY, "rate limit exceeded")
                            .await;
                    return Ok(None);
                }
                match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(ClientMessage::JoinRoom {
                        room_id,
                        player_id,
                        username,
                        character,
                    }) => {
                        if let Some(ctx) = try_join_room(
                            socket, state, stats, room_id, player_id, username, character,
                        )
                        .await?
                        {
                            return Ok(Some(ctx));
                        }
                    }
                    Ok(ClientMessage::ListRooms) => {
                        send_room_list(socket, state, stats).await?;
                    }
                    Ok(_) => {
                        if should_log(&mut stats.last_invalid_log) {
                            debug!("message ignored in the lobby; join_room required first");
                        }
                    }
                    Err(parse_err) => {
                        stats.invalid_json += 1;
                        if should_log(&mut stats.last_invalid_log) {
                            warn!(
                                bytes = text.len(),
                                error = %parse_err,
                                "failed to parse client message"
                            );
                        }
                        if stats.invalid_json > MAX_INVALID_JSON {
                            let _ = send_close_with_reason(
                                socket,
                                close_code::POLICY,
                                "too many invalid messages",
                            )
                            .await;
                            return Ok(None);
                        }
                    }
                }
            }
            Message::Binary(_) => {
                let _ = send_close_with_reason(
                    socket,
                    close_code::UNSUPPORTED,
                    "binary messages not supported",
                )
                .await;
                return Ok(None);
            }
            Message::Ping(_) | Message::Pong(_) => {}
            Message::Close(_) => {
                info!("client closed in the lobby");
                return Ok(None);
            }
        }
    }
}

/// Validates a join request and binds the connection to the room. Returns
/// `None` when the request was rejected and the client stays in the lobby.
async fn try_join_room(
    socket: &mut WebSocket,
    state: &Arc<AppState>,
    stats: &mut ConnStats,
    room_id: String,
    player_id: String,
    username: String,
    character: String,
) -> Result<Option<JoinedCtx>, NetError> {
    if !valid_id(&room_id)
        || !valid_id(&player_id)
        || !valid_username(&username)
        || !valid_character(&character)
    {
        if should_log(&mut stats.last_invalid_log) {
            debug!("join_room rejected by field validation");
        }
        return Ok(None);
    }

    let registry = &state.room_registry;
    registry.create_room(&room_id).await;
    let outcome = match registry
        .add_player(
            &room_id,
            RoomPlayer::new(player_id.clone(), username.clone(), character),
        )
        .await
    {
        Ok(outcome) => outcome,
        Err(RoomError::RoomFull) => {
            info!(room_id = %room_id, "join rejected; room is full");
            send_message(socket, &ServerMessage::RoomFull, stats).await?;
            return Ok(None);
        }
        Err(err) => {
            debug!(room_id = %room_id, error = ?err, "join rejected");
            return Ok(None);
        }
    };

    // Reply to the joiner, then fan the new roster out to everyone else.
    let msg = ServerMessage::RoomUpdate {
        players: outcome.roster.iter().map(RosterEntryDto::from).collect(),
        host_id: Some(outcome.host_id.clone()),
    };
    let bytes = encode(&msg)?;
    if let Err(err) = send_bytes(socket, bytes.clone(), stats).await {
        // The socket died mid-join; undo the membership before giving up.
        let _ = registry.remove_player(&room_id, &player_id).await;
        return Err(err);
    }
    registry
        .broadcast_to_room(&room_id, Frame::except(player_id.clone(), bytes))
        .await;

    Ok(Some(JoinedCtx {
        player_id,
        username,
        room_id,
        room_frames_rx: outcome.frames_rx,
        zone: None,
        close_frame: None,
    }))
}

async fn send_room_list(
    socket: &mut WebSocket,
    state: &Arc<AppState>,
    stats: &mut ConnStats,
) -> Result<(), NetError> {
    let rooms: Vec<RoomSummaryDto> = state
        .room_registry
        .available_rooms()
        .await
        .into_iter()
        .map(RoomSummaryDto::from)
        .collect();
    send_message(socket, &ServerMessage::RoomList { rooms }, stats).await
}

async fn run_client_loop(
    socket: &mut WebSocket,
    ctx: &mut JoinedCtx,
    state: &Arc<AppState>,
    stats: &mut ConnStats,
) -> Result<LoopExit, NetError> {
    let mut fatal: Option<NetError> = None;
    let mut left_room = false;

    loop {
        // disconnect becomes true on error
        let disconnect: bool = tokio::select! {
            // Incoming message from the client.
            incoming = socket.recv() => {
                match handle_incoming(socket, incoming, ctx, state, stats).await {
                    Ok(LoopControl::Continue) => false,
                    Ok(LoopControl::LeaveRoom) => {
                        left_room = true;
                        true
                    }
                    Ok(LoopControl::Disconnect) => true,
                    Err(e) => {
                        fatal = Some(e);
                        true
                    }
                }
            }

            // Roster, host and start traffic from the room.
            frame = ctx.room_frames_rx.recv() => {
                match frame {
                    Ok(frame) => match forward_frame(socket, frame, &ctx.player_id, stats).await {
                        LoopControl::Continue => false,
                        LoopControl::LeaveRoom | LoopControl::Disconnect => true,
                    },
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        // Room traffic is low-rate; the next roster update
                        // self-heals whatever was missed.
                        if should_log(&mut stats.last_lag_log) {
                            warn!(missed = n, "room frames lagged");
                        }
                        false
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        fatal = Some(NetError::RoomFramesClosed);
                        true
                    }
                }
            }

            // Simulation frames from the bound zone session, if any.
            frame = async {
                match ctx.zone.as_mut() {
                    Some(binding) => binding.frames_rx.recv().await,
                    // No zone bound; park this branch until one is.
                    None => std::future::pending().await,
                }
            } => {
                match frame {
                    Ok(frame) => match forward_frame(socket, frame, &ctx.player_id, stats).await {
                        LoopControl::Continue => false,
                        LoopControl::LeaveRoom | LoopControl::Disconnect => true,
                    },
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        if should_log(&mut stats.last_lag_log) {
                            warn!(missed = n, "zone frames lagged; sending entity snapshot");
                        }
                        match resync_zone(socket, ctx, stats).await {
                            Ok(()) => false,
                            Err(e) => {
                                fatal = Some(e);
                                true
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        fatal = Some(NetError::ZoneFramesClosed);
                        true
                    }
                }
            }
        };

        if disconnect {
            if left_room {
                // The socket stays open; the caller drops back to the lobby.
                return Ok(LoopExit::LeftRoom);
            }
            if let Some(frame) = ctx.close_frame.take() {
                let _ = socket.send(Message::Close(Some(frame))).await;
            }
            if let Err(err) = socket.close().await.map_err(NetError::Ws) {
                debug!(error = ?err, "socket close error");
            }
            break;
        }
    }

    disconnect_cleanup(ctx, state).await;

    match fatal {
        Some(err) => Err(err),
        None => Ok(LoopExit::Disconnected),
    }
}

async fn handle_incoming(
    socket: &mut WebSocket,
    incoming: Option<Result<Message, axum::Error>>,
    ctx: &mut JoinedCtx,
    state: &Arc<AppState>,
    stats: &mut ConnStats,
) -> Result<LoopControl, NetError> {
    match incoming {
        Some(Ok(Message::Text(text))) => {
            if stats.count_in(text.len()) {
                warn!(player_id = %ctx.player_id, "rate limit exceeded");
                ctx.close_frame = Some(CloseFrame {
                    code: close_code::POLICY,
                    reason: "rate limit exceeded".into(),
                });
                return Ok(LoopControl::Disconnect);
            }
            match serde_json::from_str::<ClientMessage>(&text) {
                Ok(msg) => dispatch_message(socket, msg, ctx, state, stats).await,
                Err(parse_err) => {
                    stats.invalid_json += 1;
                    if should_log(&mut stats.last_invalid_log) {
                        warn!(
                            player_id = %ctx.player_id,
                            bytes = text.len(),
                            error = %parse_err,
                            "failed to parse client message"
                        );
                    }
                    if stats.invalid_json > MAX_INVALID_JSON {
                        ctx.close_frame = Some(CloseFrame {
                            code: close_code::POLICY,
                            reason: "too many invalid messages".into(),
                        });
                        return Ok(LoopControl::Disconnect);
                    }
                    Ok(LoopControl::Continue)
                }
            }
        }
        Some(Ok(Message::Binary(_))) => {
            ctx.close_frame = Some(CloseFrame {
                code: close_code::UNSUPPORTED,
                reason: "binary messages not supported".into(),
            });
            Ok(LoopControl::Disconnect)
        }
        Some(Ok(Message::Ping(_) | Message::Pong(_))) => Ok(LoopControl::Continue),
        Some(Ok(Message::Close(_))) => Ok(LoopControl::Disconnect),
        Some(Err(e)) => {
            warn!(player_id = %ctx.player_id, error = %e, "websocket recv error");
            Ok(LoopControl::Disconnect)
        }
        None => {
            info!(player_id = %ctx.player_id, "websocket closed");
            Ok(LoopControl::Disconnect)
        }
    }
}

async fn dispatch_message(
    socket: &mut WebSocket,
    msg: ClientMessage,
    ctx: &mut JoinedCtx,
    state: &Arc<AppState>,
    stats: &mut ConnStats,
) -> Result<LoopControl, NetError> {
    match msg {
        ClientMessage::JoinRoom { .. } => {
            // Already in a room; repeated joins are ignored to keep the
            // membership stable.
            if should_log(&mut stats.last_invalid_log) {
                warn!(player_id = %ctx.player_id, "duplicate join_room ignored");
            }
            Ok(LoopControl::Continue)
        }
        ClientMessage::LeaveRoom => handle_leave_room(ctx, state).await,
        ClientMessage::PlayerUpdate { state: reported } => {
            process_state_message(ctx, state, reported.into(), stats).await
        }
        ClientMessage::GameStart => handle_game_start(ctx, state).await,
        ClientMessage::ZoneEnter { zone_id } => {
            handle_zone_enter(socket, ctx, state, stats, zone_id).await
        }
        ClientMessage::EnemyDamage {
            enemy_id,
            damage,
            from_x,
            from_y,
        } => process_damage_message(ctx, stats, enemy_id, damage, from_x, from_y).await,
        ClientMessage::PlayerFire { x, y, angle } => relay_player_fire(ctx, stats, x, y, angle),
        ClientMessage::PlayerChat { text } => relay_player_chat(ctx, stats, text),
        ClientMessage::PlayerDeath { zone } => handle_player_death(ctx, state, zone),
        ClientMessage::ListRooms => {
            send_room_list(socket, state, stats).await?;
            Ok(LoopControl::Continue)
        }
    }
}

async fn process_state_message(
    ctx: &mut JoinedCtx,
    state: &Arc<AppState>,
    reported: PlayerState,
    stats: &mut ConnStats,
) -> Result<LoopControl, NetError> {
    let Some(clean) = sanitize_player_state(reported) else {
        if should_log(&mut stats.last_invalid_log) {
            warn!(player_id = %ctx.player_id, "invalid player state; dropping");
        }
        return Ok(LoopControl::Continue);
    };

    // The roster copy feeds future zone-enter peer lists.
    state
        .room_registry
        .record_player_state(&ctx.room_id, &ctx.player_id, clean)
        .await;

    let Some(binding) = ctx.zone.as_ref() else {
        return Ok(LoopControl::Continue);
    };

    // State reports are droppable under pressure; the next one supersedes.
    match binding.handle.event_tx.try_send(ZoneEvent::PlayerState {
        player_id: ctx.player_id.clone(),
        state: clean,
    }) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(_)) => {
            if should_log(&mut stats.last_drop_log) {
                warn!(player_id = %ctx.player_id, "zone events full; dropping state report");
            }
        }
        Err(mpsc::error::TrySendError::Closed(_)) => return Err(NetError::ZoneEventsClosed),
    }

    let relay = ServerMessage::PlayerUpdate {
        player_id: ctx.player_id.clone(),
        state: clean.into(),
    };
    let bytes = encode(&relay)?;
    let _ = binding
        .handle
        .frames_tx
        .send(Frame::except(ctx.player_id.clone(), bytes));
    Ok(LoopControl::Continue)
}

async fn process_damage_message(
    ctx: &mut JoinedCtx,
    stats: &mut ConnStats,
    enemy_id: String,
    damage: i32,
    from_x: f32,
    from_y: f32,
) -> Result<LoopControl, NetError> {
    if !valid_id(&enemy_id) || !valid_damage(damage) || !valid_coord(from_x) || !valid_coord(from_y)
    {
        if should_log(&mut stats.last_invalid_log) {
            warn!(player_id = %ctx.player_id, damage, "implausible damage claim; dropping");
        }
        return Ok(LoopControl::Continue);
    }
    let Some(binding) = ctx.zone.as_ref() else {
        if should_log(&mut stats.last_invalid_log) {
            debug!(player_id = %ctx.player_id, "damage claim outside a zone; dropping");
        }
        return Ok(LoopControl::Continue);
    };

    // Damage is lossless: await capacity rather than dropping a landed hit.
    binding
        .handle
        .event_tx
        .send(ZoneEvent::Damage {
            enemy_id,
            amount: damage,
            source: Some(Vec2::new(from_x, from_y)),
            attacker: AttackerIdentity {
                player_id: ctx.player_id.clone(),
                username: ctx.username.clone(),
            },
        })
        .await
        .map_err(|_| NetError::ZoneEventsClosed)?;
    Ok(LoopControl::Continue)
}

async fn handle_zone_enter(
    socket: &mut WebSocket,
    ctx: &mut JoinedCtx,
    state: &Arc<AppState>,
    stats: &mut ConnStats,
    zone_id: u32,
) -> Result<LoopControl, NetError> {
    if !valid_zone_id(zone_id) {
        if should_log(&mut stats.last_invalid_log) {
            debug!(player_id = %ctx.player_id, zone_id, "zone_enter out of range; dropping");
        }
        return Ok(LoopControl::Continue);
    }

    let entry = match state
        .room_registry
        .enter_zone(&ctx.room_id, &ctx.player_id, zone_id)
        .await
    {
        Ok(entry) => entry,
        Err(err) => {
            debug!(player_id = %ctx.player_id, zone_id, error = ?err, "zone_enter rejected");
            return Ok(LoopControl::Continue);
        }
    };

    if entry.created {
        spawn_zone_serializer(&entry.handle);
    }

    let reply = ServerMessage::ZoneEnter {
        zone_id,
        zone_players: entry.peers.iter().map(ZonePlayerDto::from).collect(),
        enemies: entry
            .handle
            .latest_enemies()
            .iter()
            .map(EnemyStateDto::from)
            .collect(),
    };
    ctx.zone = Some(ZoneBinding {
        handle: entry.handle,
        frames_rx: entry.frames_rx,
    });
    send_message(socket, &reply, stats).await?;

    // Tell the rest of the room where this player went.
    let bytes = encode(&ServerMessage::PlayerZone {
        player_id: ctx.player_id.clone(),
        zone_id,
    })?;
    state
        .room_registry
        .broadcast_to_room(&ctx.room_id, Frame::except(ctx.player_id.clone(), bytes))
        .await;

    Ok(LoopControl::Continue)
}

async fn handle_game_start(
    ctx: &mut JoinedCtx,
    state: &Arc<AppState>,
) -> Result<LoopControl, NetError> {
    match state
        .room_registry
        .start_room(&ctx.room_id, &ctx.player_id)
        .await
    {
        Ok(true) => {
            let bytes = encode(&ServerMessage::GameStart)?;
            state
                .room_registry
                .broadcast_to_room(&ctx.room_id, Frame::to_all(bytes))
                .await;
        }
        Ok(false) => {}
        Err(err) => {
            debug!(player_id = %ctx.player_id, error = ?err, "game_start rejected");
        }
    }
    Ok(LoopControl::Continue)
}

fn relay_player_fire(
    ctx: &mut JoinedCtx,
    stats: &mut ConnStats,
    x: f32,
    y: f32,
    angle: f32,
) -> Result<LoopControl, NetError> {
    if !valid_coord(x) || !valid_coord(y) || !angle.is_finite() {
        if should_log(&mut stats.last_invalid_log) {
            warn!(player_id = %ctx.player_id, "invalid fire report; dropping");
        }
        return Ok(LoopControl::Continue);
    }
    let Some(binding) = ctx.zone.as_ref() else {
        return Ok(LoopControl::Continue);
    };
    let bytes = encode(&ServerMessage::PlayerFire {
        player_id: ctx.player_id.clone(),
        x,
        y,
        angle,
    })?;
    let _ = binding
        .handle
        .frames_tx
        .send(Frame::except(ctx.player_id.clone(), bytes));
    Ok(LoopControl::Continue)
}

fn relay_player_chat(
    ctx: &mut JoinedCtx,
    stats: &mut ConnStats,
    text: String,
) -> Result<LoopControl, NetError> {
    if !valid_chat_text(&text) {
        if should_log(&mut stats.last_invalid_log) {
            warn!(player_id = %ctx.player_id, "invalid chat line; dropping");
        }
        return Ok(LoopControl::Continue);
    }
    let Some(binding) = ctx.zone.as_ref() else {
        return Ok(LoopControl::Continue);
    };
    let bytes = encode(&ServerMessage::ChatMessage {
        player_id: ctx.player_id.clone(),
        username: ctx.username.clone(),
        text,
    })?;
    let _ = binding
        .handle
        .frames_tx
        .send(Frame::except(ctx.player_id.clone(), bytes));
    Ok(LoopControl::Continue)
}

fn handle_player_death(
    ctx: &mut JoinedCtx,
    state: &Arc<AppState>,
    zone: u32,
) -> Result<LoopControl, NetError> {
    // A death report is only honored for the zone the connection is bound
    // to; any other claimed zone has no context here.
    if ctx.zone.as_ref().map(|binding| binding.handle.zone_id) != Some(zone) {
        debug!(player_id = %ctx.player_id, zone, "death report outside the bound zone; dropping");
        return Ok(LoopControl::Continue);
    }
    info!(player_id = %ctx.player_id, zone, "player died");

    // Charge the penalty off the socket loop; the balance syncs back over
    // the room channel whenever the ledger answers.
    let ledger = state.ledger.clone();
    let registry = state.room_registry.clone();
    let penalty = state.progression.death_penalty;
    let player_id = ctx.player_id.clone();
    let username = ctx.username.clone();
    let room_id = ctx.room_id.clone();
    tokio::spawn(async move {
        let balance = match ledger.deduct_balance(&username, penalty, "death").await {
            Some(balance) => Some(balance),
            None => {
                warn!(username = %username, "death penalty debit failed; reading last balance");
                ledger.get_balance(&username).await
            }
        };
        ledger.clear_inventory(&username).await;

        let Some(balance) = balance else {
            warn!(username = %username, "balance unavailable after death");
            return;
        };
        match serde_json::to_string(&ServerMessage::BalanceUpdate { balance }) {
            Ok(txt) => {
                registry
                    .broadcast_to_room(&room_id, Frame::one(player_id, Utf8Bytes::from(txt)))
                    .await;
            }
            Err(e) => error!(error = ?e, "failed to serialize balance update"),
        }
    });
    Ok(LoopControl::Continue)
}

async fn handle_leave_room(
    ctx: &mut JoinedCtx,
    state: &Arc<AppState>,
) -> Result<LoopControl, NetError> {
    match state
        .room_registry
        .remove_player(&ctx.room_id, &ctx.player_id)
        .await
    {
        Ok(outcome) => broadcast_departure(state, &ctx.room_id, &ctx.player_id, &outcome).await,
        Err(err) => {
            debug!(player_id = %ctx.player_id, error = ?err, "leave_room without membership");
        }
    }
    ctx.zone = None;
    Ok(LoopControl::LeaveRoom)
}

async fn forward_frame(
    socket: &mut WebSocket,
    frame: Frame,
    player_id: &str,
    stats: &mut ConnStats,
) -> LoopControl {
    if !frame.target.applies_to(player_id) {
        return LoopControl::Continue;
    }
    match send_bytes(socket, frame.bytes, stats).await {
        Ok(()) => LoopControl::Continue,
        Err(err) => {
            // Log unexpected send failures; disconnect follows immediately.
            warn!(error = ?err, "failed to forward frame");
            LoopControl::Disconnect
        }
    }
}

/// Lag recovery: skip whatever frames were missed and send a fresh full
/// entity snapshot instead.
async fn resync_zone(
    socket: &mut WebSocket,
    ctx: &JoinedCtx,
    stats: &mut ConnStats,
) -> Result<(), NetError> {
    let Some(binding) = ctx.zone.as_ref() else {
        return Ok(());
    };
    let enemies: Vec<EnemyStateDto> = binding
        .handle
        .latest_enemies()
        .iter()
        .map(EnemyStateDto::from)
        .collect();
    send_message(socket, &ServerMessage::EnemySync { enemies }, stats).await?;
    stats.lag_recovery_count += 1;
    Ok(())
}

/// Roster fan-out after a removal: who left, who (if anyone) became host,
/// and the resulting roster. A destroyed room has nobody left to tell.
async fn broadcast_departure(
    state: &Arc<AppState>,
    room_id: &str,
    player_id: &str,
    outcome: &LeaveOutcome,
) {
    if outcome.destroyed {
        return;
    }

    let mut messages = vec![ServerMessage::PlayerLeft {
        player_id: player_id.to_string(),
    }];
    if let Some(new_host) = &outcome.new_host {
        messages.push(ServerMessage::HostAssigned {
            host_id: new_host.clone(),
        });
    }
    messages.push(ServerMessage::RoomUpdate {
        players: outcome.roster.iter().map(RosterEntryDto::from).collect(),
        host_id: outcome.host_id.clone(),
    });

    for msg in &messages {
        match encode(msg) {
            Ok(bytes) => {
                state
                    .room_registry
                    .broadcast_to_room(room_id, Frame::to_all(bytes))
                    .await;
            }
            Err(err) => error!(error = ?err, "failed to serialize departure update"),
        }
    }
}

async fn disconnect_cleanup(ctx: &JoinedCtx, state: &Arc<AppState>) {
    match state
        .room_registry
        .remove_player(&ctx.room_id, &ctx.player_id)
        .await
    {
        Ok(outcome) => broadcast_departure(state, &ctx.room_id, &ctx.player_id, &outcome).await,
        Err(err) => {
            // The room can already be gone when shutdown races the socket.
            debug!(player_id = %ctx.player_id, error = ?err, "no membership during disconnect cleanup");
        }
    }
}
