// Maps a zone's declared ruleset to the session task that runs it.
//
// Rulesets register a constructor in a lookup table; an unknown or absent
// ruleset falls back to the base melee session. New zone behaviors are
// additive and never touch the dispatcher or the registry.

use crate::domain::EnemySnapshot;
use crate::domain::content::{ZoneContent, spawn_entities};
use crate::domain::ports::Ledger;
use crate::domain::tuning::enemy::EnemyTuning;
use crate::use_cases::arena::arena_task;
use crate::use_cases::types::{Frame, ZoneEvent, ZoneUpdate};
use crate::use_cases::zone::{ZoneHandle, ZoneTaskContext, zone_task};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, broadcast, mpsc, watch};
use tracing::warn;

/// Constructor signature every ruleset registers.
pub type SessionSpawner = fn(ZoneTaskContext) -> Pin<Box<dyn Future<Output = ()> + Send>>;

/// Channel capacities and timing shared by every spawned session.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Capacity for inbound zone events.
    pub event_channel_capacity: usize,
    /// Capacity for typed simulation updates.
    pub update_broadcast_capacity: usize,
    /// Capacity for serialized frames fanned out to connections.
    pub frame_broadcast_capacity: usize,
    /// Fixed tick interval for the simulation loop.
    pub tick_interval: Duration,
}

pub struct SessionFactory {
    settings: SessionSettings,
    tuning: EnemyTuning,
    ledger: Arc<dyn Ledger>,
    rulesets: HashMap<&'static str, SessionSpawner>,
}

impl SessionFactory {
    pub fn new(settings: SessionSettings, tuning: EnemyTuning, ledger: Arc<dyn Ledger>) -> Self {
        Self {
            settings,
            tuning,
            ledger,
            rulesets: HashMap::new(),
        }
    }

    /// Factory with the shipped rulesets registered.
    pub fn with_builtin(
        settings: SessionSettings,
        tuning: EnemyTuning,
        ledger: Arc<dyn Ledger>,
    ) -> Self {
        let mut factory = Self::new(settings, tuning, ledger);
        factory.register("arena", |ctx| Box::pin(arena_task(ctx)));
        factory
    }

    /// Registers a ruleset constructor; later registrations win.
    pub fn register(&mut self, ruleset: &'static str, spawner: SessionSpawner) {
        self.rulesets.insert(ruleset, spawner);
    }

    fn spawner_for(&self, ruleset: Option<&str>) -> SessionSpawner {
        match ruleset {
            None => |ctx| Box::pin(zone_task(ctx)),
            Some(name) => match self.rulesets.get(name) {
                Some(spawner) => *spawner,
                None => {
                    warn!(ruleset = name, "unknown ruleset; using base session");
                    |ctx| Box::pin(zone_task(ctx))
                }
            },
        }
    }

    /// Wires the channel set for one (room, zone) session and spawns the
    /// task selected by the zone's ruleset.
    pub fn spawn_session(&self, room_id: &str, content: Arc<ZoneContent>) -> ZoneHandle {
        let (event_tx, event_rx) =
            mpsc::channel::<ZoneEvent>(self.settings.event_channel_capacity);
        let (update_tx, _update_rx) =
            broadcast::channel::<ZoneUpdate>(self.settings.update_broadcast_capacity);
        let (frames_tx, _frames_rx) =
            broadcast::channel::<Frame>(self.settings.frame_broadcast_capacity);
        // Seeded with the spawn-time roster so a zone_enter reply sent before
        // the first tick already carries the zone's entities.
        let initial: Vec<EnemySnapshot> = spawn_entities(&content)
            .iter()
            .map(EnemySnapshot::from)
            .collect();
        let (enemies_latest_tx, _enemies_latest_rx) = watch::channel(initial);
        let shutdown = Arc::new(Notify::new());

        let spawner = self.spawner_for(content.ruleset);
        tokio::spawn(spawner(ZoneTaskContext {
            room_id: room_id.to_string(),
            zone_id: content.zone_id,
            content: content.clone(),
            tuning: self.tuning,
            tick_interval: self.settings.tick_interval,
            event_rx,
            update_tx: update_tx.clone(),
            enemies_latest_tx: enemies_latest_tx.clone(),
            shutdown: shutdown.clone(),
            ledger: self.ledger.clone(),
        }));

        ZoneHandle {
            zone_id: content.zone_id,
            event_tx,
            update_tx,
            frames_tx,
            enemies_latest_tx,
            shutdown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::content::ZoneCatalog;
    use crate::use_cases::zone::tests::RecordingLedger;

    fn settings() -> SessionSettings {
        SessionSettings {
            event_channel_capacity: 64,
            update_broadcast_capacity: 256,
            frame_broadcast_capacity: 256,
            tick_interval: Duration::from_millis(50),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn when_ruleset_is_absent_then_base_session_respawns_individually() {
        let catalog = ZoneCatalog::builtin();
        let ledger = Arc::new(RecordingLedger::new(0));
        let factory = SessionFactory::with_builtin(settings(), EnemyTuning::default(), ledger);

        let handle = factory.spawn_session("r1", catalog.get(1).expect("meadow"));
        let mut updates = handle.update_tx.subscribe();

        handle
            .event_tx
            .send(ZoneEvent::Damage {
                enemy_id: "slime-0".to_string(),
                amount: 1_000,
                source: None,
                attacker: crate::use_cases::types::AttackerIdentity {
                    player_id: "p1".to_string(),
                    username: "Pilot_1".to_string(),
                },
            })
            .await
            .expect("session should accept events");

        // The base session brings the one dead entity back on its own.
        loop {
            if let ZoneUpdate::EnemyRespawn { enemy_id, .. } =
                updates.recv().await.expect("updates should flow")
            {
                assert_eq!(enemy_id, "slime-0");
                break;
            }
        }

        handle.shutdown.notify_one();
    }

    #[tokio::test(start_paused = true)]
    async fn when_ruleset_is_unknown_then_factory_falls_back_to_base_session() {
        use crate::domain::content::ZoneContent;

        let ledger = Arc::new(RecordingLedger::new(0));
        let factory = SessionFactory::with_builtin(settings(), EnemyTuning::default(), ledger);

        let content = Arc::new(ZoneContent {
            zone_id: 9,
            name: "experimental",
            ruleset: Some("raid"),
            walls: vec![],
            spawns: vec![],
        });

        let handle = factory.spawn_session("r1", content);
        let mut updates = handle.update_tx.subscribe();

        // Base session behavior: tick snapshots flow even for an empty roster.
        loop {
            if let ZoneUpdate::Snapshot(enemies) =
                updates.recv().await.expect("updates should flow")
            {
                assert!(enemies.is_empty());
                break;
            }
        }

        handle.shutdown.notify_one();
    }
}
