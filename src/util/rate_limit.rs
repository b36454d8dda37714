//! Rate limiting utilities

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Rate limiter type alias
pub type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Create a rate limiter with the specified requests per second
pub fn create_limiter(requests_per_second: u32) -> Arc<Limiter> {
    let quota = Quota::per_second(NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN));
    Arc::new(RateLimiter::direct(quota))
}

/// Input rate limiter for WebSocket game messages (per connection)
pub const INPUT_RATE_LIMIT: u32 = 120; // key/mouse state updates, a few per tick at most

/// Lobby command rate limit (create/join/leave/list/start)
pub const LOBBY_RATE_LIMIT: u32 = 5;

/// Per-connection rate limiter state
#[derive(Clone)]
pub struct ConnectionRateLimiter {
    input_limiter: Arc<Limiter>,
    lobby_limiter: Arc<Limiter>,
}

impl ConnectionRateLimiter {
    pub fn new() -> Self {
        Self {
            input_limiter: create_limiter(INPUT_RATE_LIMIT),
            lobby_limiter: create_limiter(LOBBY_RATE_LIMIT),
        }
    }

    /// Check if a game input message is allowed (returns true if allowed)
    pub fn check_input(&self) -> bool {
        self.input_limiter.check().is_ok()
    }

    /// Check if a lobby command is allowed
    pub fn check_lobby(&self) -> bool {
        self.lobby_limiter.check().is_ok()
    }
}

impl Default for ConnectionRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limiter_allows_within_quota() {
        let limiter = ConnectionRateLimiter::new();
        assert!(limiter.check_input());
        assert!(limiter.check_lobby());
    }

    #[test]
    fn lobby_limiter_rejects_burst() {
        let limiter = ConnectionRateLimiter::new();
        let mut allowed = 0;
        for _ in 0..50 {
            if limiter.check_lobby() {
                allowed += 1;
            }
        }
        assert!(allowed <= LOBBY_RATE_LIMIT as usize + 1);
    }
}
