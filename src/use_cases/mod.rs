// Use cases layer: application workflows for the zone server.

pub mod arena;
pub mod room;
pub mod session_factory;
pub mod types;
pub mod zone;

pub use room::{
    JoinOutcome, LeaveOutcome, RoomError, RoomPlayer, RoomRegistry, RoomSettings, RoomSummary,
    ZoneEntry,
};
pub use session_factory::{SessionFactory, SessionSettings};
pub use types::{AttackerIdentity, Frame, Target, ZoneEvent, ZoneUpdate};
pub use zone::{ZoneHandle, ZoneTaskContext};
