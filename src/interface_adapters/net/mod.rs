// Network adapter modules split by external client sockets vs internal HTTP routes.

pub mod client;
pub mod internal;

pub use client::{spawn_zone_serializer, ws_handler};
pub use internal::list_rooms_handler;
