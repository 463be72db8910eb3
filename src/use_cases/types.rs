// Use-case level inputs/outputs for zone sessions and room fan-out.

use crate::domain::{EnemySnapshot, PlayerPresence, PlayerState, Vec2};
use axum::extract::ws::Utf8Bytes;

/// Identity attached to a validated damage claim, carried through to the
/// kill reward so the ledger is credited exactly once per death.
#[derive(Debug, Clone)]
pub struct AttackerIdentity {
    pub player_id: String,
    pub username: String,
}

/// Inbound mutations for one zone session, processed in arrival order.
#[derive(Debug)]
pub enum ZoneEvent {
    Enter {
        player_id: String,
        presence: PlayerPresence,
    },
    Leave {
        player_id: String,
    },
    PlayerState {
        player_id: String,
        state: PlayerState,
    },
    Damage {
        enemy_id: String,
        amount: i32,
        source: Option<Vec2>,
        attacker: AttackerIdentity,
    },
}

/// Typed simulation output; the zone serializer turns these into wire
/// frames exactly once per update.
#[derive(Debug, Clone)]
pub enum ZoneUpdate {
    /// Full-state tick broadcast of every alive entity.
    Snapshot(Vec<EnemySnapshot>),
    /// Immediate post-damage feedback, independent of the tick cadence.
    EnemyHp {
        enemy_id: String,
        hp: i32,
        max_hp: i32,
    },
    EnemyKilled {
        enemy_id: String,
        zone_id: u32,
    },
    EnemyRespawn {
        enemy_id: String,
        zone_id: u32,
    },
    /// Server-initiated melee hit on a tracked player.
    EnemyAttack {
        enemy_id: String,
        target_player_id: String,
        damage: i32,
    },
    /// Post-reward currency sync for one player.
    Balance {
        player_id: String,
        balance: i64,
    },
}

/// Receiver filter for a broadcast frame.
#[derive(Debug, Clone)]
pub enum Target {
    All,
    Except(String),
    One(String),
}

impl Target {
    pub fn applies_to(&self, player_id: &str) -> bool {
        match self {
            Target::All => true,
            Target::Except(excluded) => excluded != player_id,
            Target::One(only) => only == player_id,
        }
    }
}

/// A serialized wire message fanned out over a room or zone broadcast
/// channel. Serialization happens once; every connection forwards the
/// shared bytes after checking the target.
#[derive(Debug, Clone)]
pub struct Frame {
    pub target: Target,
    pub bytes: Utf8Bytes,
}

impl Frame {
    pub fn to_all(bytes: Utf8Bytes) -> Self {
        Self {
            target: Target::All,
            bytes,
        }
    }

    pub fn except(player_id: impl Into<String>, bytes: Utf8Bytes) -> Self {
        Self {
            target: Target::Except(player_id.into()),
            bytes,
        }
    }

    pub fn one(player_id: impl Into<String>, bytes: Utf8Bytes) -> Self {
        Self {
            target: Target::One(player_id.into()),
            bytes,
        }
    }
}
