/// Gameplay tuning for hostile entities.
///
/// Keep this separate from runtime/server configuration (tick rates, buffer sizes, etc.).

#[derive(Debug, Clone, Copy)]
pub struct EnemyTuning {
    /// Knockback impulse magnitude applied on a validated hit, in pixels per second.
    pub knockback_impulse: f32,

    /// Per-reference-tick knockback decay factor. The session raises this to
    /// `dt * reference_tick_rate` so decay is tick-rate independent.
    pub knockback_decay: f32,

    /// Knockback speeds below this are zeroed instead of decayed further.
    pub knockback_epsilon: f32,

    /// Tick rate the decay factor is calibrated against.
    pub reference_tick_rate: f32,

    /// Stun duration applied on a validated hit, in seconds.
    pub stun_seconds: f32,

    /// Delay between death and respawn, in seconds.
    pub respawn_seconds: f32,
}

impl Default for EnemyTuning {
    fn default() -> Self {
        Self {
            knockback_impulse: 260.0,
            knockback_decay: 0.82,
            knockback_epsilon: 1.0,
            reference_tick_rate: 20.0,
            stun_seconds: 0.4,
            respawn_seconds: 8.0,
        }
    }
}
