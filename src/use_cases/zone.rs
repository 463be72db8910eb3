// The authoritative simulation for one room's presence in one zone.
//
// A zone session is a single task owning its entity set; every mutation
// arrives as a ZoneEvent and every observable change leaves as a ZoneUpdate.
// Respawn delays are countdowns inside the task state, so shutting the task
// down cancels every pending timer at once.

use crate::domain::content::{ZoneContent, spawn_entities};
use crate::domain::ports::Ledger;
use crate::domain::systems::enemy_ai::{self, AiConfig, MeleeHit};
use crate::domain::tuning::enemy::EnemyTuning;
use crate::domain::{EnemySnapshot, HostileEntity, PlayerPresence, PlayerState, Vec2};
use crate::use_cases::types::{AttackerIdentity, Frame, ZoneEvent, ZoneUpdate};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, broadcast, mpsc, watch};
use tracing::{debug, info, warn};

/// Per-session channels shared with the registry and connection handlers.
#[derive(Clone, Debug)]
pub struct ZoneHandle {
    pub zone_id: u32,
    /// Sender for session mutations (enter/leave/state/damage).
    pub event_tx: mpsc::Sender<ZoneEvent>,
    /// Typed simulation output consumed by the zone serializer.
    pub update_tx: broadcast::Sender<ZoneUpdate>,
    /// Serialized frames fanned out to every connection bound to the zone.
    pub frames_tx: broadcast::Sender<Frame>,
    /// Latest full enemy snapshot, for zone-enter replies and lag recovery.
    pub enemies_latest_tx: watch::Sender<Vec<EnemySnapshot>>,
    /// Stops the session task; fired by the registry on last-out.
    pub shutdown: Arc<Notify>,
}

impl ZoneHandle {
    pub fn latest_enemies(&self) -> Vec<EnemySnapshot> {
        self.enemies_latest_tx.borrow().clone()
    }

    pub fn subscribe_frames(&self) -> broadcast::Receiver<Frame> {
        self.frames_tx.subscribe()
    }
}

/// Everything a session task owns at spawn time.
pub struct ZoneTaskContext {
    pub room_id: String,
    pub zone_id: u32,
    pub content: Arc<ZoneContent>,
    pub tuning: EnemyTuning,
    pub tick_interval: Duration,
    pub event_rx: mpsc::Receiver<ZoneEvent>,
    pub update_tx: broadcast::Sender<ZoneUpdate>,
    pub enemies_latest_tx: watch::Sender<Vec<EnemySnapshot>>,
    pub shutdown: Arc<Notify>,
    pub ledger: Arc<dyn Ledger>,
}

/// A rewarded death, reported by the sim so the task can pay the bounty.
#[derive(Debug, Clone)]
pub struct Kill {
    pub enemy_id: String,
    pub kind: String,
    pub bounty: i64,
    pub attacker: AttackerIdentity,
}

/// Entity and player bookkeeping for one zone session. No I/O; the session
/// tasks drive it and forward the updates it returns.
pub struct ZoneSim {
    zone_id: u32,
    content: Arc<ZoneContent>,
    tuning: EnemyTuning,
    entities: Vec<HostileEntity>,
    players: HashMap<String, PlayerPresence>,
    // Kill idempotency: ids in here cannot be damaged or rewarded again
    // until their respawn clears the mark.
    rewarded_kills: HashSet<String>,
}

impl ZoneSim {
    pub fn new(zone_id: u32, content: Arc<ZoneContent>, tuning: EnemyTuning) -> Self {
        let entities = spawn_entities(&content);
        Self {
            zone_id,
            content,
            tuning,
            entities,
            players: HashMap::new(),
            rewarded_kills: HashSet::new(),
        }
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn tracked_players(&self) -> usize {
        self.players.len()
    }

    /// Full-state view of every alive entity.
    pub fn snapshot(&self) -> Vec<EnemySnapshot> {
        self.entities
            .iter()
            .filter(|e| e.alive)
            .map(EnemySnapshot::from)
            .collect()
    }

    pub fn player_enter(&mut self, player_id: String, presence: PlayerPresence) {
        self.players.insert(player_id, presence);
    }

    pub fn player_leave(&mut self, player_id: &str) {
        self.players.remove(player_id);
    }

    /// Updates the AI-targeting view of one tracked player. States for
    /// players that never entered are dropped.
    pub fn record_player_state(&mut self, player_id: &str, state: &PlayerState) {
        if let Some(presence) = self.players.get_mut(player_id) {
            presence.apply_state(state);
        }
    }

    /// Validated damage entry point. Unknown ids and ids already marked
    /// killed are no-ops; hp floors at zero; a death is reported exactly
    /// once.
    pub fn apply_damage(
        &mut self,
        enemy_id: &str,
        amount: i32,
        source: Option<Vec2>,
        attacker: AttackerIdentity,
    ) -> (Vec<ZoneUpdate>, Option<Kill>) {
        if self.rewarded_kills.contains(enemy_id) {
            debug!(enemy_id, "damage on already-killed entity ignored");
            return (Vec::new(), None);
        }
        let Some(entity) = self.entities.iter_mut().find(|e| e.id == enemy_id) else {
            debug!(enemy_id, "damage on unknown entity ignored");
            return (Vec::new(), None);
        };
        if !entity.alive || amount <= 0 {
            return (Vec::new(), None);
        }

        entity.hp = (entity.hp - amount).max(0);
        enemy_ai::apply_hit_reaction(entity, source, &self.tuning);

        let mut updates = vec![ZoneUpdate::EnemyHp {
            enemy_id: entity.id.clone(),
            hp: entity.hp,
            max_hp: entity.max_hp,
        }];

        let mut kill = None;
        if entity.hp == 0 {
            entity.alive = false;
            entity.respawn_timer = self.tuning.respawn_seconds;
            self.rewarded_kills.insert(entity.id.clone());
            updates.push(ZoneUpdate::EnemyKilled {
                enemy_id: entity.id.clone(),
                zone_id: self.zone_id,
            });
            kill = Some(Kill {
                enemy_id: entity.id.clone(),
                kind: entity.kind.clone(),
                bounty: entity.bounty,
                attacker,
            });
        }

        (updates, kill)
    }

    /// Advances every live entity by `dt` and applies the melee hits they
    /// land on tracked players.
    pub fn advance(&mut self, dt: f32) -> Vec<ZoneUpdate> {
        let cfg = AiConfig {
            walls: &self.content.walls,
            tuning: &self.tuning,
        };

        let mut hits: Vec<(String, MeleeHit)> = Vec::new();
        for entity in self.entities.iter_mut().filter(|e| e.alive) {
            if let Some(hit) = enemy_ai::tick_enemy(entity, &self.players, cfg, dt) {
                hits.push((entity.id.clone(), hit));
            }
        }

        let mut updates = Vec::new();
        for (enemy_id, hit) in hits {
            if let Some(presence) = self.players.get_mut(&hit.target) {
                presence.hp = (presence.hp - hit.damage).max(0);
                if presence.hp == 0 {
                    presence.is_dead = true;
                }
            }
            updates.push(ZoneUpdate::EnemyAttack {
                enemy_id,
                target_player_id: hit.target,
                damage: hit.damage,
            });
        }
        updates
    }

    /// Base-session respawn policy: each dead entity returns to its spawn
    /// state after the fixed delay and its killed mark is cleared.
    pub fn tick_respawns(&mut self, dt: f32) -> Vec<ZoneUpdate> {
        let mut updates = Vec::new();
        for entity in self.entities.iter_mut().filter(|e| !e.alive) {
            entity.respawn_timer -= dt;
            if entity.respawn_timer > 0.0 {
                continue;
            }
            entity.reset_to_spawn();
            self.rewarded_kills.remove(&entity.id);
            updates.push(ZoneUpdate::EnemyRespawn {
                enemy_id: entity.id.clone(),
                zone_id: self.zone_id,
            });
        }
        updates
    }

    /// True once every entity in the roster is dead. Used by the wave
    /// ruleset; meaningless for zones without spawns.
    pub fn all_defeated(&self) -> bool {
        !self.entities.is_empty() && self.entities.iter().all(|e| !e.alive)
    }

    /// Wave-session policy: re-seed the whole roster from content with
    /// stats scaled by `factor`, clearing every killed mark.
    pub fn respawn_wave(&mut self, factor: f32) -> Vec<ZoneUpdate> {
        self.entities = spawn_entities(&self.content);
        self.rewarded_kills.clear();

        let mut updates = Vec::new();
        for entity in &mut self.entities {
            entity.max_hp = scale_stat(entity.max_hp, factor);
            entity.hp = entity.max_hp;
            entity.damage = scale_stat(entity.damage, factor);
            entity.bounty = (entity.bounty as f32 * factor).round() as i64;
            updates.push(ZoneUpdate::EnemyRespawn {
                enemy_id: entity.id.clone(),
                zone_id: self.zone_id,
            });
        }
        updates
    }
}

fn scale_stat(value: i32, factor: f32) -> i32 {
    ((value as f32) * factor).round() as i32
}

/// Runs the base melee session until shutdown or until the registry drops
/// the event channel.
pub async fn zone_task(mut ctx: ZoneTaskContext) {
    let mut sim = ZoneSim::new(ctx.zone_id, ctx.content.clone(), ctx.tuning);
    info!(
        room_id = %ctx.room_id,
        zone_id = ctx.zone_id,
        entities = sim.entity_count(),
        "zone session started"
    );

    // Publish before the first tick so zone-enter replies never observe an
    // empty snapshot.
    publish_snapshot(&sim, &ctx);

    let dt = ctx.tick_interval.as_secs_f32();
    let mut interval = tokio::time::interval(ctx.tick_interval);

    loop {
        tokio::select! {
            _ = ctx.shutdown.notified() => break,
            event = ctx.event_rx.recv() => {
                match event {
                    // All handles dropped; the session is unreachable.
                    None => break,
                    Some(event) => handle_event(&mut sim, event, &ctx),
                }
            }
            _ = interval.tick() => {
                let updates = sim.advance(dt);
                send_updates(&ctx.update_tx, updates);
                let updates = sim.tick_respawns(dt);
                send_updates(&ctx.update_tx, updates);
                publish_snapshot(&sim, &ctx);
            }
        }
    }

    info!(room_id = %ctx.room_id, zone_id = ctx.zone_id, "zone session stopped");
}

/// Shared event application for the base and wave sessions.
pub(crate) fn handle_event(sim: &mut ZoneSim, event: ZoneEvent, ctx: &ZoneTaskContext) {
    match event {
        ZoneEvent::Enter {
            player_id,
            presence,
        } => {
            debug!(zone_id = ctx.zone_id, player_id, "player tracked");
            sim.player_enter(player_id, presence);
        }
        ZoneEvent::Leave { player_id } => {
            debug!(zone_id = ctx.zone_id, player_id, "player untracked");
            sim.player_leave(&player_id);
        }
        ZoneEvent::PlayerState { player_id, state } => {
            sim.record_player_state(&player_id, &state);
        }
        ZoneEvent::Damage {
            enemy_id,
            amount,
            source,
            attacker,
        } => {
            let (updates, kill) = sim.apply_damage(&enemy_id, amount, source, attacker);
            send_updates(&ctx.update_tx, updates);
            if let Some(kill) = kill {
                info!(
                    room_id = %ctx.room_id,
                    zone_id = ctx.zone_id,
                    enemy_id = %kill.enemy_id,
                    killer = %kill.attacker.player_id,
                    "enemy killed"
                );
                spawn_kill_reward(ctx.ledger.clone(), ctx.update_tx.clone(), kill);
            }
        }
    }
}

pub(crate) fn send_updates(update_tx: &broadcast::Sender<ZoneUpdate>, updates: Vec<ZoneUpdate>) {
    for update in updates {
        let _ = update_tx.send(update);
    }
}

pub(crate) fn publish_snapshot(sim: &ZoneSim, ctx: &ZoneTaskContext) {
    let snapshot = sim.snapshot();
    ctx.enemies_latest_tx.send_replace(snapshot.clone());
    let _ = ctx.update_tx.send(ZoneUpdate::Snapshot(snapshot));
}

/// Pays the bounty off the tick loop. Ledger failure falls back to the last
/// readable balance; with the store fully unreachable the sync is skipped
/// and only logged.
pub(crate) fn spawn_kill_reward(
    ledger: Arc<dyn Ledger>,
    update_tx: broadcast::Sender<ZoneUpdate>,
    kill: Kill,
) {
    tokio::spawn(async move {
        let reason = format!("kill:{}", kill.kind);
        let username = kill.attacker.username.as_str();
        let balance = match ledger.add_balance(username, kill.bounty, &reason).await {
            Some(balance) => Some(balance),
            None => {
                warn!(username, reason, "kill reward write failed; reading last known balance");
                ledger.get_balance(username).await
            }
        };
        match balance {
            Some(balance) => {
                let _ = update_tx.send(ZoneUpdate::Balance {
                    player_id: kill.attacker.player_id,
                    balance,
                });
            }
            None => warn!(username, "balance unavailable after kill reward"),
        }
    });
}
