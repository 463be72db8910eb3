// Domain-level simulation entities and snapshot types.

use crate::domain::geom::{Aabb, Vec2};

/// Server-side state for one hostile entity in a zone.
pub struct HostileEntity {
    pub id: String,
    pub kind: String,

    // Position is the top-left corner of the entity's AABB.
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,

    // Combat state.
    pub hp: i32,
    pub max_hp: i32,
    pub damage: i32,
    pub attack_range: f32,
    pub aggro_range: f32,
    pub attack_cooldown: f32, // seconds until the next allowed melee hit
    pub cooldown_seconds: f32,

    // Crowd-control state.
    pub stunned: bool,
    pub stun_timer: f32,
    pub knockback: Vec2,

    // Behavior flags from zone content.
    pub stationary: bool,
    pub passive: bool,

    // Movement and lifecycle.
    pub speed: f32,
    pub alive: bool,
    pub respawn_timer: f32,
    pub spawn: Vec2,

    // Currency awarded to the killer.
    pub bounty: i64,
}

impl HostileEntity {
    pub fn hitbox(&self) -> Aabb {
        Aabb::new(self.x, self.y, self.width, self.height)
    }

    pub fn center(&self) -> Vec2 {
        Vec2::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Resets the entity to its spawn-time state. Used on respawn and when a
    /// wave session re-seeds its roster.
    pub fn reset_to_spawn(&mut self) {
        self.x = self.spawn.x;
        self.y = self.spawn.y;
        self.hp = self.max_hp;
        self.alive = true;
        self.respawn_timer = 0.0;
        self.attack_cooldown = 0.0;
        self.stunned = false;
        self.stun_timer = 0.0;
        self.knockback = Vec2::ZERO;
    }
}

/// Wire-facing view of one alive entity, rebuilt every tick.
#[derive(Debug, Clone)]
pub struct EnemySnapshot {
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

impl From<&HostileEntity> for EnemySnapshot {
    fn from(e: &HostileEntity) -> Self {
        Self {
            id: e.id.clone(),
            kind: e.kind.clone(),
            x: e.x,
            y: e.y,
            hp: e.hp,
            max_hp: e.max_hp,
            stunned: e.stunned,
            knockback_x: e.knockback.x,
            knockback_y: e.knockback.y,
        }
    }
}

/// Client-reported player state, sanitized before it reaches a session.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlayerState {
    pub x: f32,
    pub y: f32,
    pub angle: f32,
    pub speed: f32,
    pub zone_level: u32,
    pub stunned: bool,
    pub hp: i32,
    pub is_dead: bool,
}

/// Last-known view of a player inside one zone session, used only for AI
/// targeting. Player hp stays client-reported except where the session
/// itself deals melee damage.
#[derive(Debug, Clone)]
pub struct PlayerPresence {
    pub username: String,
    pub x: f32,
    pub y: f32,
    pub hp: i32,
    pub is_dead: bool,
}

impl PlayerPresence {
    pub fn apply_state(&mut self, state: &PlayerState) {
        self.x = state.x;
        self.y = state.y;
        self.hp = state.hp;
        self.is_dead = state.is_dead;
    }
}
