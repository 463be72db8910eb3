// Static zone content: enemy archetypes, per-zone walls and placements.
//
// Content authoring is external to the engine; this builtin catalog stands in
// for the zone-content loader and is injected wherever sessions are created.

use crate::domain::entity::HostileEntity;
use crate::domain::geom::{Aabb, Vec2};
use std::collections::HashMap;
use std::sync::Arc;

/// Combat profile shared by every spawn of one enemy kind.
#[derive(Debug, Clone, Copy)]
pub struct EnemyArchetype {
    pub kind: &'static str,
    pub max_hp: i32,
    pub speed: f32,
    pub damage: i32,
    pub attack_range: f32,
    pub aggro_range: f32,
    pub cooldown_seconds: f32,
    pub width: f32,
    pub height: f32,
    pub stationary: bool,
    pub passive: bool,
    pub bounty: i64,
}

const ARCHETYPES: &[EnemyArchetype] = &[
    EnemyArchetype {
        kind: "slime",
        max_hp: 50,
        speed: 60.0,
        damage: 8,
        attack_range: 36.0,
        aggro_range: 220.0,
        cooldown_seconds: 1.2,
        width: 28.0,
        height: 28.0,
        stationary: false,
        passive: false,
        bounty: 10,
    },
    EnemyArchetype {
        kind: "wolf",
        max_hp: 80,
        speed: 140.0,
        damage: 14,
        attack_range: 40.0,
        aggro_range: 320.0,
        cooldown_seconds: 0.9,
        width: 36.0,
        height: 24.0,
        stationary: false,
        passive: false,
        bounty: 25,
    },
    // Stationary guardian: never moves, only swaps between idle and attacking.
    EnemyArchetype {
        kind: "sentry",
        max_hp: 160,
        speed: 0.0,
        damage: 22,
        attack_range: 90.0,
        aggro_range: 90.0,
        cooldown_seconds: 1.6,
        width: 40.0,
        height: 40.0,
        stationary: true,
        passive: false,
        bounty: 60,
    },
    // Passive swarm critter: chases players but never lands a hit.
    EnemyArchetype {
        kind: "bat",
        max_hp: 20,
        speed: 180.0,
        damage: 0,
        attack_range: 24.0,
        aggro_range: 400.0,
        cooldown_seconds: 1.0,
        width: 20.0,
        height: 16.0,
        stationary: false,
        passive: true,
        bounty: 5,
    },
];

pub fn archetype(kind: &str) -> Option<&'static EnemyArchetype> {
    ARCHETYPES.iter().find(|a| a.kind == kind)
}

/// One entity placement in a zone's content.
#[derive(Debug, Clone, Copy)]
pub struct EnemySpawn {
    pub kind: &'static str,
    pub x: f32,
    pub y: f32,
}

/// Static geometry and entity placement for one zone.
#[derive(Debug, Clone)]
pub struct ZoneContent {
    pub zone_id: u32,
    pub name: &'static str,
    /// Behavioral variant served by the session factory; `None` selects the
    /// base melee session.
    pub ruleset: Option<&'static str>,
    pub walls: Vec<Aabb>,
    pub spawns: Vec<EnemySpawn>,
}

/// Builds the session-owned entity set from a zone's placements.
///
/// Entity ids are `"{kind}-{index}"` in placement order, stable across
/// respawns within one session. Placements naming an unknown kind are
/// skipped.
pub fn spawn_entities(content: &ZoneContent) -> Vec<HostileEntity> {
    content
        .spawns
        .iter()
        .enumerate()
        .filter_map(|(index, spawn)| {
            let arch = archetype(spawn.kind)?;
            Some(HostileEntity {
                id: format!("{}-{index}", arch.kind),
                kind: arch.kind.to_string(),
                x: spawn.x,
                y: spawn.y,
                width: arch.width,
                height: arch.height,
                hp: arch.max_hp,
                max_hp: arch.max_hp,
                damage: arch.damage,
                attack_range: arch.attack_range,
                aggro_range: arch.aggro_range,
                attack_cooldown: 0.0,
                cooldown_seconds: arch.cooldown_seconds,
                stunned: false,
                stun_timer: 0.0,
                knockback: Vec2::ZERO,
                stationary: arch.stationary,
                passive: arch.passive,
                speed: arch.speed,
                alive: true,
                respawn_timer: 0.0,
                spawn: Vec2::new(spawn.x, spawn.y),
                bounty: arch.bounty,
            })
        })
        .collect()
}

/// Lookup table from zone id to its static content.
#[derive(Debug, Clone)]
pub struct ZoneCatalog {
    zones: HashMap<u32, Arc<ZoneContent>>,
}

impl ZoneCatalog {
    pub fn new(contents: impl IntoIterator<Item = ZoneContent>) -> Self {
        let zones = contents
            .into_iter()
            .map(|content| (content.zone_id, Arc::new(content)))
            .collect();
        Self { zones }
    }

    /// The game's shipped zones. Zone 3 runs the wave-based arena ruleset.
    pub fn builtin() -> Self {
        Self::new([
            ZoneContent {
                zone_id: 0,
                name: "hub",
                ruleset: None,
                walls: vec![
                    Aabb::new(-60.0, -700.0, 120.0, 300.0),
                    Aabb::new(-700.0, -60.0, 300.0, 120.0),
                ],
                spawns: vec![],
            },
            ZoneContent {
                zone_id: 1,
                name: "meadow",
                ruleset: None,
                walls: vec![
                    Aabb::new(200.0, -400.0, 40.0, 500.0),
                    Aabb::new(-500.0, 150.0, 400.0, 40.0),
                ],
                spawns: vec![
                    EnemySpawn {
                        kind: "slime",
                        x: 320.0,
                        y: 240.0,
                    },
                    EnemySpawn {
                        kind: "slime",
                        x: 480.0,
                        y: -120.0,
                    },
                    EnemySpawn {
                        kind: "bat",
                        x: -300.0,
                        y: -260.0,
                    },
                ],
            },
            ZoneContent {
                zone_id: 2,
                name: "cavern",
                ruleset: None,
                walls: vec![
                    Aabb::new(-640.0, -640.0, 1280.0, 60.0),
                    Aabb::new(-640.0, 580.0, 1280.0, 60.0),
                    Aabb::new(-120.0, -200.0, 240.0, 50.0),
                ],
                spawns: vec![
                    EnemySpawn {
                        kind: "wolf",
                        x: 380.0,
                        y: 300.0,
                    },
                    EnemySpawn {
                        kind: "wolf",
                        x: -420.0,
                        y: 260.0,
                    },
                    EnemySpawn {
                        kind: "sentry",
                        x: 0.0,
                        y: -60.0,
                    },
                ],
            },
            ZoneContent {
                zone_id: 3,
                name: "arena",
                ruleset: Some("arena"),
                walls: vec![
                    Aabb::new(-500.0, -500.0, 1000.0, 40.0),
                    Aabb::new(-500.0, 460.0, 1000.0, 40.0),
                    Aabb::new(-500.0, -500.0, 40.0, 1000.0),
                    Aabb::new(460.0, -500.0, 40.0, 1000.0),
                ],
                spawns: vec![
                    EnemySpawn {
                        kind: "slime",
                        x: -200.0,
                        y: -200.0,
                    },
                    EnemySpawn {
                        kind: "slime",
                        x: 200.0,
                        y: -200.0,
                    },
                    EnemySpawn {
                        kind: "wolf",
                        x: 0.0,
                        y: 240.0,
                    },
                ],
            },
        ])
    }

    pub fn get(&self, zone_id: u32) -> Option<Arc<ZoneContent>> {
        self.zones.get(&zone_id).cloned()
    }

    pub fn contains(&self, zone_id: u32) -> bool {
        self.zones.contains_key(&zone_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn when_spawning_builtin_meadow_then_entities_match_placements() {
        let catalog = ZoneCatalog::builtin();
        let content = catalog.get(1).expect("meadow should exist");
        let entities = spawn_entities(&content);

        assert_eq!(entities.len(), content.spawns.len());
        assert_eq!(entities[0].id, "slime-0");
        assert_eq!(entities[1].id, "slime-1");
        assert!(entities.iter().all(|e| e.alive && e.hp == e.max_hp));
    }

    #[test]
    fn when_placement_kind_is_unknown_then_it_is_skipped() {
        let content = ZoneContent {
            zone_id: 99,
            name: "broken",
            ruleset: None,
            walls: vec![],
            spawns: vec![EnemySpawn {
                kind: "dragon",
                x: 0.0,
                y: 0.0,
            }],
        };
        assert!(spawn_entities(&content).is_empty());
    }

    #[test]
    fn when_zone_is_missing_then_catalog_returns_none() {
        let catalog = ZoneCatalog::builtin();
        assert!(catalog.get(42).is_none());
        assert!(catalog.contains(3));
    }
}
