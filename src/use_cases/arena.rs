// Wave-based session variant for zones with the "arena" ruleset.
//
// Same event loop as the base session, but defeated entities stay down
// until the whole roster is cleared; the next wave then respawns everything
// with scaled stats after a short breather.

use crate::use_cases::zone::{ZoneSim, ZoneTaskContext, handle_event, publish_snapshot, send_updates};
use tracing::info;

const WAVE_DELAY_SECONDS: f32 = 4.0;
const WAVE_SCALE_STEP: f32 = 1.25;

pub async fn arena_task(mut ctx: ZoneTaskContext) {
    let mut sim = ZoneSim::new(ctx.zone_id, ctx.content.clone(), ctx.tuning);
    info!(
        room_id = %ctx.room_id,
        zone_id = ctx.zone_id,
        entities = sim.entity_count(),
        "arena session started"
    );

    publish_snapshot(&sim, &ctx);

    let dt = ctx.tick_interval.as_secs_f32();
    let mut interval = tokio::time::interval(ctx.tick_interval);
    let mut wave: u32 = 1;
    let mut factor: f32 = 1.0;
    // Countdown to the next wave; `None` while the current wave is live.
    let mut breather: Option<f32> = None;

    loop {
        tokio::select! {
            _ = ctx.shutdown.notified() => break,
            event = ctx.event_rx.recv() => {
                match event {
                    None => break,
                    Some(event) => handle_event(&mut sim, event, &ctx),
                }
            }
            _ = interval.tick() => {
                let updates = sim.advance(dt);
                send_updates(&ctx.update_tx, updates);

                match breather.as_mut() {
                    Some(left) => {
                        *left -= dt;
                        if *left <= 0.0 {
                            breather = None;
                            wave += 1;
                            factor *= WAVE_SCALE_STEP;
                            let updates = sim.respawn_wave(factor);
                            send_updates(&ctx.update_tx, updates);
                            info!(
                                room_id = %ctx.room_id,
                                zone_id = ctx.zone_id,
                                wave,
                                "arena wave started"
                            );
                        }
                    }
                    None if sim.all_defeated() => {
                        info!(
                            room_id = %ctx.room_id,
                            zone_id = ctx.zone_id,
                            wave,
                            "arena wave cleared"
                        );
                        breather = Some(WAVE_DELAY_SECONDS);
                    }
                    None => {}
                }

                publish_snapshot(&sim, &ctx);
            }
        }
    }

    info!(room_id = %ctx.room_id, zone_id = ctx.zone_id, "arena session stopped");
}
