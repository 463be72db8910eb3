use crate::interface_adapters::protocol::RoomSummaryDto;
use crate::interface_adapters::state::AppState;

use axum::{Json, extract::State};
use std::sync::Arc;

/// GET /rooms: the joinable-room view, the same shape the in-band
/// list_rooms message returns.
pub async fn list_rooms_handler(State(state): State<Arc<AppState>>) -> Json<Vec<RoomSummaryDto>> {
    let rooms: Vec<RoomSummaryDto> = state
        .room_registry
        .available_rooms()
        .await
        .into_iter()
        .map(RoomSummaryDto::from)
        .collect();
    Json(rooms)
}
