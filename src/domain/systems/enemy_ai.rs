// Per-entity simulation step for hostile entities: knockback, stun,
// targeting, chase and melee. Pure with respect to I/O; the owning session
// applies the returned hits.

use crate::domain::entity::{HostileEntity, PlayerPresence};
use crate::domain::geom::{Aabb, Vec2, distance, hits_any};
use crate::domain::tuning::enemy::EnemyTuning;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy)]
pub struct AiConfig<'a> {
    pub walls: &'a [Aabb],
    pub tuning: &'a EnemyTuning,
}

/// A melee hit the session must apply to a tracked player.
#[derive(Debug, Clone, PartialEq)]
pub struct MeleeHit {
    pub target: String,
    pub damage: i32,
}

/// Advances one live entity by `dt` seconds.
///
/// Order matters and matches the simulation contract: knockback integrates
/// first, stun swallows the rest of the AI (cooldown still decays), then
/// targeting picks the nearest non-dead player in aggro range, and the
/// entity either closes distance or attacks.
pub fn tick_enemy(
    e: &mut HostileEntity,
    players: &HashMap<String, PlayerPresence>,
    cfg: AiConfig<'_>,
    dt: f32,
) -> Option<MeleeHit> {
    integrate_knockback(e, cfg, dt);

    // Cooldown decays on every tick, including while stunned.
    e.attack_cooldown = (e.attack_cooldown - dt).max(0.0);

    if e.stunned {
        e.stun_timer -= dt;
        if e.stun_timer <= 0.0 {
            e.stunned = false;
            e.stun_timer = 0.0;
        }
        return None;
    }

    let (target_id, tx, ty, dist) = nearest_target(e, players)?;

    if dist > e.attack_range {
        // Stationary entities never leave their post; everyone else closes in.
        if !e.stationary {
            step_towards(e, tx, ty, cfg.walls, dt);
        }
        return None;
    }

    if e.passive || e.attack_cooldown > 0.0 {
        return None;
    }

    e.attack_cooldown = e.cooldown_seconds;
    Some(MeleeHit {
        target: target_id,
        damage: e.damage,
    })
}

/// Applies a validated hit's crowd control: a fixed-magnitude impulse away
/// from the damage source plus a stun window.
pub fn apply_hit_reaction(e: &mut HostileEntity, source: Option<Vec2>, tuning: &EnemyTuning) {
    if let Some(source) = source {
        let center = e.center();
        let away = Vec2::new(center.x - source.x, center.y - source.y).normalized();
        if away != Vec2::ZERO {
            e.knockback = away.scaled(tuning.knockback_impulse);
        }
    }
    e.stunned = true;
    e.stun_timer = tuning.stun_seconds;
}

fn integrate_knockback(e: &mut HostileEntity, cfg: AiConfig<'_>, dt: f32) {
    let tuning = cfg.tuning;
    if e.knockback.length() <= tuning.knockback_epsilon {
        e.knockback = Vec2::ZERO;
        return;
    }

    let (old_x, old_y) = (e.x, e.y);
    e.x += e.knockback.x * dt;
    e.y += e.knockback.y * dt;
    if hits_any(&e.hitbox(), cfg.walls) {
        e.x = old_x;
        e.y = old_y;
    }

    // Exponent keeps the decay identical across tick rates.
    let decay = tuning
        .knockback_decay
        .powf(dt * tuning.reference_tick_rate);
    e.knockback = e.knockback.scaled(decay);
}

fn nearest_target(
    e: &HostileEntity,
    players: &HashMap<String, PlayerPresence>,
) -> Option<(String, f32, f32, f32)> {
    let center = e.center();
    let mut best: Option<(String, f32, f32, f32)> = None;
    // O(n) over tracked players; n is capped at the party ceiling.
    for (player_id, presence) in players {
        if presence.is_dead {
            continue;
        }
        let dist = distance(center.x, center.y, presence.x, presence.y);
        if dist > e.aggro_range {
            continue;
        }
        if best.as_ref().is_none_or(|(_, _, _, d)| dist < *d) {
            best = Some((player_id.clone(), presence.x, presence.y, dist));
        }
    }
    best
}

fn step_towards(e: &mut HostileEntity, tx: f32, ty: f32, walls: &[Aabb], dt: f32) {
    let center = e.center();
    let dir = Vec2::new(tx - center.x, ty - center.y).normalized();
    let step = e.speed * dt;

    // Axis-separated moves so a wall on one axis still allows sliding
    // along the other.
    let old_x = e.x;
    e.x += dir.x * step;
    if hits_any(&e.hitbox(), walls) {
        e.x = old_x;
    }

    let old_y = e.y;
    e.y += dir.y * step;
    if hits_any(&e.hitbox(), walls) {
        e.y = old_y;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f32 = 0.05;

    fn test_entity() -> HostileEntity {
        HostileEntity {
            id: "slime-0".to_string(),
            kind: "slime".to_string(),
            x: 0.0,
            y: 0.0,
            width: 20.0,
            height: 20.0,
            hp: 50,
            max_hp: 50,
            damage: 8,
            attack_range: 30.0,
            aggro_range: 200.0,
            attack_cooldown: 0.0,
            cooldown_seconds: 1.0,
            stunned: false,
            stun_timer: 0.0,
            knockback: Vec2::ZERO,
            stationary: false,
            passive: false,
            speed: 100.0,
            alive: true,
            respawn_timer: 0.0,
            spawn: Vec2::ZERO,
            bounty: 10,
        }
    }

    fn players_at(entries: &[(&str, f32, f32)]) -> HashMap<String, PlayerPresence> {
        entries
            .iter()
            .map(|(id, x, y)| {
                (
                    id.to_string(),
                    PlayerPresence {
                        username: id.to_string(),
                        x: *x,
                        y: *y,
                        hp: 100,
                        is_dead: false,
                    },
                )
            })
            .collect()
    }

    fn cfg<'a>(walls: &'a [Aabb], tuning: &'a EnemyTuning) -> AiConfig<'a> {
        AiConfig { walls, tuning }
    }

    #[test]
    fn when_no_player_is_in_aggro_range_then_entity_does_not_move() {
        let tuning = EnemyTuning::default();
        let mut e = test_entity();
        let players = players_at(&[("p1", 1_000.0, 0.0)]);

        let hit = tick_enemy(&mut e, &players, cfg(&[], &tuning), DT);

        assert!(hit.is_none());
        assert_eq!((e.x, e.y), (0.0, 0.0));
    }

    #[test]
    fn when_player_enters_aggro_range_then_entity_closes_distance() {
        let tuning = EnemyTuning::default();
        let mut e = test_entity();
        let players = players_at(&[("p1", 150.0, 10.0)]);

        tick_enemy(&mut e, &players, cfg(&[], &tuning), DT);

        let moved = distance(0.0, 0.0, e.x, e.y);
        assert!((moved - e.speed * DT).abs() < 1e-3);
        assert!(e.x > 0.0);
    }

    #[test]
    fn when_two_players_are_in_range_then_nearest_is_chased() {
        let tuning = EnemyTuning::default();
        let mut e = test_entity();
        let players = players_at(&[("far", 0.0, 180.0), ("near", 120.0, 10.0)]);

        tick_enemy(&mut e, &players, cfg(&[], &tuning), DT);

        assert!(e.x > 0.0, "should move toward the nearer player on +X");
    }

    #[test]
    fn when_target_is_in_attack_range_then_hit_lands_and_cooldown_resets() {
        let tuning = EnemyTuning::default();
        let mut e = test_entity();
        let players = players_at(&[("p1", 25.0, 10.0)]);

        let hit = tick_enemy(&mut e, &players, cfg(&[], &tuning), DT);

        assert_eq!(
            hit,
            Some(MeleeHit {
                target: "p1".to_string(),
                damage: 8,
            })
        );
        assert!(e.attack_cooldown > 0.0);

        // Cooldown gates the next swing.
        let second = tick_enemy(&mut e, &players, cfg(&[], &tuning), DT);
        assert!(second.is_none());
    }

    #[test]
    fn when_entity_is_passive_then_it_chases_but_never_attacks() {
        let tuning = EnemyTuning::default();
        let mut e = test_entity();
        e.passive = true;
        let players = players_at(&[("p1", 25.0, 10.0)]);

        let hit = tick_enemy(&mut e, &players, cfg(&[], &tuning), DT);

        assert!(hit.is_none());
        assert_eq!(e.attack_cooldown, 0.0);
    }

    #[test]
    fn when_entity_is_stationary_then_it_attacks_in_range_without_moving() {
        let tuning = EnemyTuning::default();
        let mut e = test_entity();
        e.stationary = true;

        // Out of attack range: no movement at all.
        let far = players_at(&[("p1", 100.0, 10.0)]);
        tick_enemy(&mut e, &far, cfg(&[], &tuning), DT);
        assert_eq!((e.x, e.y), (0.0, 0.0));

        // In attack range: still hits.
        let near = players_at(&[("p1", 25.0, 10.0)]);
        let hit = tick_enemy(&mut e, &near, cfg(&[], &tuning), DT);
        assert!(hit.is_some());
    }

    #[test]
    fn when_stunned_then_ai_is_skipped_but_cooldown_still_decays() {
        let tuning = EnemyTuning::default();
        let mut e = test_entity();
        e.stunned = true;
        e.stun_timer = 2.0 * DT;
        e.attack_cooldown = 1.0;
        let players = players_at(&[("p1", 25.0, 10.0)]);

        let hit = tick_enemy(&mut e, &players, cfg(&[], &tuning), DT);

        assert!(hit.is_none());
        assert_eq!((e.x, e.y), (0.0, 0.0));
        assert!((e.attack_cooldown - (1.0 - DT)).abs() < 1e-6);
        assert!(e.stunned);

        tick_enemy(&mut e, &players, cfg(&[], &tuning), DT);
        assert!(!e.stunned, "stun should clear once the timer elapses");
    }

    #[test]
    fn when_dead_players_are_tracked_then_they_are_not_targeted() {
        let tuning = EnemyTuning::default();
        let mut e = test_entity();
        let mut players = players_at(&[("p1", 25.0, 10.0)]);
        players.get_mut("p1").expect("tracked").is_dead = true;

        let hit = tick_enemy(&mut e, &players, cfg(&[], &tuning), DT);

        assert!(hit.is_none());
        assert_eq!((e.x, e.y), (0.0, 0.0));
    }

    #[test]
    fn when_knockback_is_applied_then_it_decays_toward_zero() {
        let tuning = EnemyTuning::default();
        let mut e = test_entity();
        e.knockback = Vec2::new(tuning.knockback_impulse, 0.0);
        let players = HashMap::new();

        tick_enemy(&mut e, &players, cfg(&[], &tuning), DT);

        assert!(e.x > 0.0, "impulse should move the entity");
        assert!(e.knockback.x < tuning.knockback_impulse);

        // Run the decay out; knockback must reach exactly zero.
        for _ in 0..200 {
            tick_enemy(&mut e, &players, cfg(&[], &tuning), DT);
        }
        assert_eq!(e.knockback, Vec2::ZERO);
    }

    #[test]
    fn when_knockback_pushes_into_a_wall_then_the_move_rolls_back() {
        let tuning = EnemyTuning::default();
        let mut e = test_entity();
        e.knockback = Vec2::new(tuning.knockback_impulse, 0.0);
        let walls = [Aabb::new(21.0, -50.0, 20.0, 100.0)];
        let players = HashMap::new();

        tick_enemy(&mut e, &players, cfg(&walls, &tuning), DT);

        assert_eq!(e.x, 0.0, "blocked knockback should not change position");
    }

    #[test]
    fn when_chase_is_blocked_on_one_axis_then_entity_slides_on_the_other() {
        let tuning = EnemyTuning::default();
        let mut e = test_entity();
        // Wall immediately to the right; target up and to the right.
        let walls = [Aabb::new(21.0, -200.0, 20.0, 400.0)];
        let players = players_at(&[("p1", 150.0, 150.0)]);

        tick_enemy(&mut e, &players, cfg(&walls, &tuning), DT);

        assert_eq!(e.x, 0.0, "x move should roll back into the wall");
        assert!(e.y > 0.0, "y move should still apply");
    }

    #[test]
    fn when_hit_reaction_applies_then_impulse_points_away_from_source() {
        let tuning = EnemyTuning::default();
        let mut e = test_entity();

        apply_hit_reaction(&mut e, Some(Vec2::new(-10.0, 10.0)), &tuning);

        assert!(e.stunned);
        assert_eq!(e.stun_timer, tuning.stun_seconds);
        assert!(e.knockback.x > 0.0, "entity center is right of the source");
        assert!(
            (e.knockback.length() - tuning.knockback_impulse).abs() < 1e-3,
            "impulse magnitude is fixed"
        );
    }
}
