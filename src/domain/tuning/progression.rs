/// Gameplay tuning for currency rewards and penalties.
///
/// Per-kind kill bounties live on the zone content archetypes; this covers
/// the flat values that are not content-driven.

#[derive(Debug, Clone, Copy)]
pub struct ProgressionTuning {
    /// Currency deducted when a player dies.
    pub death_penalty: i64,
}

impl Default for ProgressionTuning {
    fn default() -> Self {
        Self { death_penalty: 25 }
    }
}
