use std::{env, time::Duration};

// Runtime/server constants (not gameplay tuning).

pub fn http_port() -> u16 {
    env::var("ZONE_SERVER_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3001)
}

pub fn ledger_service_url() -> String {
    env::var("LEDGER_SERVICE_URL").unwrap_or_else(|_| "http://127.0.0.1:3004".to_string())
}

pub fn ledger_timeout() -> Duration {
    let millis = env::var("LEDGER_TIMEOUT_MS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(1500);
    Duration::from_millis(millis)
}

pub const EVENT_CHANNEL_CAPACITY: usize = 1024;
pub const UPDATE_BROADCAST_CAPACITY: usize = 256;
pub const FRAME_BROADCAST_CAPACITY: usize = 256;

pub const TICK_INTERVAL: Duration = Duration::from_millis(1000 / 20);
// Fixed party size; rooms never grow past this.
pub const PARTY_CEILING: usize = 4;
