use crate::domain::ports::Ledger;
use crate::domain::tuning::progression::ProgressionTuning;
use crate::use_cases::RoomRegistry;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    // Owns every active room and the zone sessions they spawn.
    pub room_registry: Arc<RoomRegistry>,
    // Balance mutations for kill rewards and death penalties.
    pub ledger: Arc<dyn Ledger>,
    pub progression: ProgressionTuning,
}
