// Room orchestration: rosters, host election and zone session lifecycle.
//
// The registry is the only owner of room state. Every method takes the
// table lock, computes the outcome, and releases the lock before touching
// any channel, so session tasks are never awaited under the lock.

use crate::domain::content::ZoneCatalog;
use crate::domain::{PlayerPresence, PlayerState};
use crate::use_cases::session_factory::SessionFactory;
use crate::use_cases::types::{Frame, ZoneEvent};
use crate::use_cases::zone::ZoneHandle;
use std::collections::HashMap;
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, info};

/// Shared configuration for rooms.
#[derive(Debug, Clone)]
pub struct RoomSettings {
    /// Fixed party-size ceiling per room.
    pub party_ceiling: usize,
    /// Capacity for serialized room frames.
    pub frame_broadcast_capacity: usize,
}

/// Errors returned by room registry operations.
#[derive(Debug, PartialEq, Eq)]
pub enum RoomError {
    /// Room does not exist.
    NotFound,
    /// Room is at the party-size ceiling.
    RoomFull,
    /// Player id is already present in the room.
    AlreadyJoined,
    /// Caller is not a member of the room.
    NotMember,
    /// Caller is not the room's host.
    NotHost,
    /// Zone id is not in the catalog.
    UnknownZone,
}

/// One connected client inside a room.
#[derive(Debug, Clone)]
pub struct RoomPlayer {
    pub player_id: String,
    pub username: String,
    pub character: String,
    /// Zone the player currently occupies; `None` until the first zone_enter.
    pub zone_id: Option<u32>,
    /// Last client-reported state, used for zone peer lists and AI targeting.
    pub state: PlayerState,
}

impl RoomPlayer {
    pub fn new(
        player_id: impl Into<String>,
        username: impl Into<String>,
        character: impl Into<String>,
    ) -> Self {
        Self {
            player_id: player_id.into(),
            username: username.into(),
            character: character.into(),
            zone_id: None,
            state: PlayerState::default(),
        }
    }

    /// AI-targeting view of this player.
    pub fn presence(&self) -> PlayerPresence {
        PlayerPresence {
            username: self.username.clone(),
            x: self.state.x,
            y: self.state.y,
            hp: self.state.hp,
            is_dead: self.state.is_dead,
        }
    }
}

struct RoomState {
    players: Vec<RoomPlayer>,
    host_id: Option<String>,
    started: bool,
    frames_tx: broadcast::Sender<Frame>,
    zones: HashMap<u32, ZoneHandle>,
}

impl RoomState {
    fn new(frame_broadcast_capacity: usize) -> Self {
        let (frames_tx, _frames_rx) = broadcast::channel(frame_broadcast_capacity);
        Self {
            players: Vec::new(),
            host_id: None,
            started: false,
            frames_tx,
            zones: HashMap::new(),
        }
    }

    fn member(&self, player_id: &str) -> Option<&RoomPlayer> {
        self.players.iter().find(|p| p.player_id == player_id)
    }

    fn member_mut(&mut self, player_id: &str) -> Option<&mut RoomPlayer> {
        self.players.iter_mut().find(|p| p.player_id == player_id)
    }

    fn zone_occupancy(&self, zone_id: u32) -> usize {
        self.players
            .iter()
            .filter(|p| p.zone_id == Some(zone_id))
            .count()
    }
}

/// Result of a successful add: the caller broadcasts the new roster and
/// forwards frames from the pre-subscribed receiver.
#[derive(Debug)]
pub struct JoinOutcome {
    pub roster: Vec<RoomPlayer>,
    pub host_id: String,
    pub frames_rx: broadcast::Receiver<Frame>,
}

/// Result of a removal; `new_host` is set only when the host changed,
/// `host_id` is the host after the removal (absent for a destroyed room).
pub struct LeaveOutcome {
    pub removed: RoomPlayer,
    pub roster: Vec<RoomPlayer>,
    pub host_id: Option<String>,
    pub new_host: Option<String>,
    pub destroyed: bool,
}

/// Result of a zone transition. `created` tells the caller to spawn the
/// serializer for a freshly-built session.
#[derive(Debug)]
pub struct ZoneEntry {
    pub handle: ZoneHandle,
    pub created: bool,
    pub peers: Vec<RoomPlayer>,
    pub frames_rx: broadcast::Receiver<Frame>,
}

/// Lobby-browsing view of one joinable room.
#[derive(Debug, Clone)]
pub struct RoomSummary {
    pub room_id: String,
    pub player_count: usize,
    pub capacity: usize,
    pub players: Vec<String>,
    pub started: bool,
}

/// Thread-safe registry for active rooms.
pub struct RoomRegistry {
    settings: RoomSettings,
    catalog: ZoneCatalog,
    factory: SessionFactory,
    rooms: RwLock<HashMap<String, RoomState>>,
}

impl RoomRegistry {
    pub fn new(settings: RoomSettings, catalog: ZoneCatalog, factory: SessionFactory) -> Self {
        Self {
            settings,
            catalog,
            factory,
            rooms: RwLock::new(HashMap::new()),
        }
    }

    /// Creates an empty room; a no-op when the id already exists.
    pub async fn create_room(&self, room_id: &str) {
        let mut rooms = self.rooms.write().await;
        rooms.entry(room_id.to_string()).or_insert_with(|| {
            info!(room_id, "room created");
            RoomState::new(self.settings.frame_broadcast_capacity)
        });
    }

    /// Adds a player to an existing room. The first player in becomes host.
    pub async fn add_player(
        &self,
        room_id: &str,
        player: RoomPlayer,
    ) -> Result<JoinOutcome, RoomError> {
        let mut rooms = self.rooms.write().await;
        let room = rooms.get_mut(room_id).ok_or(RoomError::NotFound)?;

        if room.players.len() >= self.settings.party_ceiling {
            return Err(RoomError::RoomFull);
        }
        if room.member(&player.player_id).is_some() {
            return Err(RoomError::AlreadyJoined);
        }

        let player_id = player.player_id.clone();
        room.players.push(player);
        let host_id = room
            .host_id
            .get_or_insert_with(|| player_id.clone())
            .clone();

        info!(
            room_id,
            player_id,
            occupancy = room.players.len(),
            "player joined room"
        );

        Ok(JoinOutcome {
            roster: room.players.clone(),
            host_id,
            // Subscribe under the lock so no roster broadcast is missed.
            frames_rx: room.frames_tx.subscribe(),
        })
    }

    /// Removes a player. An emptied room is destroyed, shutting down every
    /// zone session it still owns; otherwise a departing host is replaced
    /// by the first remaining player in roster order.
    pub async fn remove_player(
        &self,
        room_id: &str,
        player_id: &str,
    ) -> Result<LeaveOutcome, RoomError> {
        let mut rooms = self.rooms.write().await;
        let room = rooms.get_mut(room_id).ok_or(RoomError::NotFound)?;
        let index = room
            .players
            .iter()
            .position(|p| p.player_id == player_id)
            .ok_or(RoomError::NotMember)?;
        let removed = room.players.remove(index);

        // The removed player's session gets a leave event, or a shutdown if
        // they were its last occupant.
        let mut to_shutdown: Vec<ZoneHandle> = Vec::new();
        let leave_handle = match removed.zone_id {
            Some(zone_id) if room.zone_occupancy(zone_id) > 0 => {
                room.zones.get(&zone_id).cloned()
            }
            Some(zone_id) => {
                to_shutdown.extend(room.zones.remove(&zone_id));
                None
            }
            None => None,
        };

        let destroyed = room.players.is_empty();
        let mut new_host = None;
        if destroyed {
            room.host_id = None;
            to_shutdown.extend(room.zones.drain().map(|(_, handle)| handle));
        } else if room.host_id.as_deref() == Some(player_id) {
            let elected = room.players[0].player_id.clone();
            room.host_id = Some(elected.clone());
            new_host = Some(elected);
        }
        let host_id = room.host_id.clone();
        let roster = room.players.clone();

        if destroyed {
            rooms.remove(room_id);
            info!(room_id, "room destroyed");
        }
        drop(rooms);

        if let Some(handle) = leave_handle {
            let _ = handle
                .event_tx
                .send(ZoneEvent::Leave {
                    player_id: player_id.to_string(),
                })
                .await;
        }
        for handle in to_shutdown {
            handle.shutdown.notify_one();
        }

        info!(room_id, player_id, destroyed, "player left room");
        Ok(LeaveOutcome {
            removed,
            roster,
            host_id,
            new_host,
            destroyed,
        })
    }

    /// Host-only: marks the room as started. Returns `false` when the room
    /// was already running, so callers announce the start exactly once.
    pub async fn start_room(&self, room_id: &str, player_id: &str) -> Result<bool, RoomError> {
        let mut rooms = self.rooms.write().await;
        let room = rooms.get_mut(room_id).ok_or(RoomError::NotFound)?;
        if room.member(player_id).is_none() {
            return Err(RoomError::NotMember);
        }
        if room.host_id.as_deref() != Some(player_id) {
            return Err(RoomError::NotHost);
        }
        if room.started {
            return Ok(false);
        }
        room.started = true;
        info!(room_id, player_id, "room started");
        Ok(true)
    }

    /// Moves a player into a zone, creating the session on first occupancy
    /// and shutting down the previous session if the move emptied it.
    pub async fn enter_zone(
        &self,
        room_id: &str,
        player_id: &str,
        zone_id: u32,
    ) -> Result<ZoneEntry, RoomError> {
        let content = self.catalog.get(zone_id).ok_or(RoomError::UnknownZone)?;

        let mut rooms = self.rooms.write().await;
        let room = rooms.get_mut(room_id).ok_or(RoomError::NotFound)?;
        let member = room.member_mut(player_id).ok_or(RoomError::NotMember)?;
        let previous = member.zone_id;
        member.zone_id = Some(zone_id);
        let presence = member.presence();

        let mut leave_handle = None;
        let mut emptied = None;
        if let Some(prev) = previous.filter(|prev| *prev != zone_id) {
            if room.zone_occupancy(prev) > 0 {
                leave_handle = room.zones.get(&prev).cloned();
            } else {
                emptied = room.zones.remove(&prev);
            }
        }

        let (handle, created) = match room.zones.get(&zone_id) {
            Some(handle) => (handle.clone(), false),
            None => {
                let handle = self.factory.spawn_session(room_id, content);
                room.zones.insert(zone_id, handle.clone());
                (handle, true)
            }
        };

        let peers: Vec<RoomPlayer> = room
            .players
            .iter()
            .filter(|p| p.player_id != player_id && p.zone_id == Some(zone_id))
            .cloned()
            .collect();
        // Subscribe under the lock so the entering client misses no frame.
        let frames_rx = handle.subscribe_frames();
        drop(rooms);

        if let Some(prev_handle) = leave_handle {
            let _ = prev_handle
                .event_tx
                .send(ZoneEvent::Leave {
                    player_id: player_id.to_string(),
                })
                .await;
        }
        if let Some(prev_handle) = emptied {
            prev_handle.shutdown.notify_one();
        }
        let _ = handle
            .event_tx
            .send(ZoneEvent::Enter {
                player_id: player_id.to_string(),
                presence,
            })
            .await;

        debug!(room_id, player_id, zone_id, created, "player entered zone");
        Ok(ZoneEntry {
            handle,
            created,
            peers,
            frames_rx,
        })
    }

    /// Updates the roster's last-known state for one player. Returns false
    /// when the player has no room context.
    pub async fn record_player_state(
        &self,
        room_id: &str,
        player_id: &str,
        state: PlayerState,
    ) -> bool {
        let mut rooms = self.rooms.write().await;
        let Some(member) = rooms
            .get_mut(room_id)
            .and_then(|room| room.member_mut(player_id))
        else {
            return false;
        };
        member.state = state;
        true
    }

    /// Best-effort fan-out to every connection bound to the room.
    pub async fn broadcast_to_room(&self, room_id: &str, frame: Frame) -> bool {
        let rooms = self.rooms.read().await;
        match rooms.get(room_id) {
            Some(room) => {
                // Send failures mean no subscribers; individual connection
                // failures surface on each receiver, not here.
                let _ = room.frames_tx.send(frame);
                true
            }
            None => false,
        }
    }

    /// Snapshot of rooms with open slots, for lobby browsing.
    pub async fn available_rooms(&self) -> Vec<RoomSummary> {
        let rooms = self.rooms.read().await;
        rooms
            .iter()
            .filter(|(_, room)| room.players.len() < self.settings.party_ceiling)
            .map(|(room_id, room)| RoomSummary {
                room_id: room_id.clone(),
                player_count: room.players.len(),
                capacity: self.settings.party_ceiling,
                players: room.players.iter().map(|p| p.username.clone()).collect(),
                started: room.started,
            })
            .collect()
    }
}
