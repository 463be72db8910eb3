// Wire protocol DTOs and conversions for public zone server messages.
// Internal service-to-service DTOs should live outside this module.
//
// Messages are flat JSON objects discriminated by a snake_case "type" field;
// payload keys are camelCase.

use crate::domain::{EnemySnapshot, PlayerState};
use crate::use_cases::{RoomPlayer, RoomSummary};
use serde::{Deserialize, Serialize};

/// Messages the client sends to the server over the WebSocket.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    // Join or create a room; the first message every connection must send.
    JoinRoom {
        room_id: String,
        player_id: String,
        username: String,
        character: String,
    },
    // Leave the current room and return to the lobby phase.
    LeaveRoom,
    // Position/state report, relayed to zone peers and fed to AI targeting.
    PlayerUpdate { state: PlayerStateDto },
    // Host-only: mark the room as started.
    GameStart,
    // Request a zone transition.
    ZoneEnter { zone_id: u32 },
    // Damage claim against a hostile entity.
    EnemyDamage {
        enemy_id: String,
        damage: i32,
        from_x: f32,
        from_y: f32,
    },
    // Visual-only projectile report, relayed to zone peers.
    PlayerFire { x: f32, y: f32, angle: f32 },
    // Chat line, relayed to zone peers.
    PlayerChat { text: String },
    // Client-side death report; triggers the currency penalty.
    PlayerDeath { zone: u32 },
    // Lobby browsing.
    ListRooms,
}

/// Messages the server sends to connected clients over the WebSocket.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    // Roster or host changed.
    RoomUpdate {
        players: Vec<RosterEntryDto>,
        host_id: Option<String>,
    },
    // Host re-election result.
    HostAssigned { host_id: String },
    // Join rejected: the room is at capacity.
    RoomFull,
    // Lobby browsing response.
    RoomList { rooms: Vec<RoomSummaryDto> },
    // A peer left the room.
    PlayerLeft { player_id: String },
    // The host started the game.
    GameStart,
    // Entering player's initial view of a zone.
    ZoneEnter {
        zone_id: u32,
        zone_players: Vec<ZonePlayerDto>,
        enemies: Vec<EnemyStateDto>,
    },
    // A peer moved to another zone.
    PlayerZone { player_id: String, zone_id: u32 },
    // Relayed peer state report.
    PlayerUpdate {
        player_id: String,
        state: PlayerStateDto,
    },
    // Relayed peer projectile report.
    PlayerFire {
        player_id: String,
        x: f32,
        y: f32,
        angle: f32,
    },
    // Relayed chat line.
    ChatMessage {
        player_id: String,
        username: String,
        text: String,
    },
    // Periodic full-state entity broadcast.
    EnemySync { enemies: Vec<EnemyStateDto> },
    // Immediate post-damage feedback.
    EnemyStateUpdate {
        enemy_id: String,
        hp: i32,
        max_hp: i32,
    },
    // Entity lifecycle events.
    EnemyKilledSync { enemy_id: String, zone: u32 },
    EnemyRespawn { enemy_id: String, zone: u32 },
    // Server-initiated melee hit on a player.
    EnemyAttack {
        enemy_id: String,
        damage: i32,
        target_player_id: String,
    },
    // Post-reward/penalty currency sync.
    BalanceUpdate { balance: i64 },
}

/// Client-reported player state, relayed verbatim after sanitizing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStateDto {
    #[serde(default)]
    pub x: f32,
    #[serde(default)]
    pub y: f32,
    #[serde(default)]
    pub angle: f32,
    #[serde(default)]
    pub speed: f32,
    #[serde(default)]
    pub zone_level: u32,
    #[serde(default)]
    pub stunned: bool,
    #[serde(default)]
    pub hp: i32,
    #[serde(default)]
    pub is_dead: bool,
}

impl From<PlayerStateDto> for PlayerState {
    fn from(dto: PlayerStateDto) -> Self {
        Self {
            x: dto.x,
            y: dto.y,
            angle: dto.angle,
            speed: dto.speed,
            zone_level: dto.zone_level,
            stunned: dto.stunned,
            hp: dto.hp,
            is_dead: dto.is_dead,
        }
    }
}

impl From<PlayerState> for PlayerStateDto {
    fn from(state: PlayerState) -> Self {
        Self {
            x: state.x,
            y: state.y,
            angle: state.angle,
            speed: state.speed,
            zone_level: state.zone_level,
            stunned: state.stunned,
            hp: state.hp,
            is_dead: state.is_dead,
        }
    }
}

/// Roster entry for room_update broadcasts.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntryDto {
    pub player_id: String,
    pub username: String,
    pub character: String,
}

impl From<&RoomPlayer> for RosterEntryDto {
    fn from(player: &RoomPlayer) -> Self {
        Self {
            player_id: player.player_id.clone(),
            username: player.username.clone(),
            character: player.character.clone(),
        }
    }
}

/// A peer already present in a zone, sent with the zone_enter reply.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ZonePlayerDto {
    pub player_id: String,
    pub username: String,
    pub x: f32,
    pub y: f32,
    pub hp: i32,
    pub is_dead: bool,
}

impl From<&RoomPlayer> for ZonePlayerDto {
    fn from(player: &RoomPlayer) -> Self {
        Self {
            player_id: player.player_id.clone(),
            username: player.username.clone(),
            x: player.state.x,
            y: player.state.y,
            hp: player.state.hp,
            is_dead: player.state.is_dead,
        }
    }
}

/// Flattened entity state for zone snapshots and zone_enter replies.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnemyStateDto {
    pub id: String,
    pub kind: String,
    pub x: f32,
    pub y: f32,
    pub hp: i32,
    pub max_hp: i32,
    pub stunned: bool,
    pub knockback_x: f32,
    pub knockback_y: f32,
}

impl From<&EnemySnapshot> for EnemyStateDto {
    fn from(enemy: &EnemySnapshot) -> Self {
        Self {
            id: enemy.id.clone(),
            kind: enemy.kind.clone(),
            x: enemy.x,
            y: enemy.y,
            hp: enemy.hp,
            max_hp: enemy.max_hp,
            stunned: enemy.stunned,
            knockback_x: enemy.knockback_x,
            knockback_y: enemy.knockback_y,
        }
    }
}

/// Lobby-browsing view of one joinable room.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummaryDto {
    pub room_id: String,
    pub player_count: usize,
    pub capacity: usize,
    pub players: Vec<String>,
    pub started: bool,
}

impl From<RoomSummary> for RoomSummaryDto {
    fn from(summary: RoomSummary) -> Self {
        Self {
            room_id: summary.room_id,
            player_count: summary.player_count,
            capacity: summary.capacity,
            players: summary.players,
            started: summary.started,
        }
    }
}
