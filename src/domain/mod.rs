// Domain layer: core simulation types and rules.

pub mod content;
pub mod entity;
pub mod geom;
pub mod ports;
pub mod systems;
pub mod tuning;
pub mod validation;

pub use entity::{EnemySnapshot, HostileEntity, PlayerPresence, PlayerState};
pub use geom::{Aabb, Vec2};
