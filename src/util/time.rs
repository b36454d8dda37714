//! Time utilities for game simulation

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Get current Unix timestamp in milliseconds
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

/// Server start time for uptime tracking
static SERVER_START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize server start time (call once at startup)
pub fn init_server_time() {
    SERVER_START.get_or_init(Instant::now);
}

/// Get server uptime in seconds
pub fn uptime_secs() -> u64 {
    SERVER_START
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0)
}

/// Tick rate configuration
pub const SIMULATION_TPS: u32 = 60; // 60 simulation steps per second
pub const TICK_DURATION: Duration = Duration::from_micros(1_000_000 / SIMULATION_TPS as u64);

/// Calculate delta time for physics (in seconds)
pub fn tick_delta() -> f32 {
    1.0 / SIMULATION_TPS as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_delta_matches_tps() {
        assert!((tick_delta() - 1.0 / 60.0).abs() < f32::EPSILON);
        assert_eq!(TICK_DURATION, Duration::from_micros(16_666));
    }
}
