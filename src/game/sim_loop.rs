//! Fixed-timestep driver for one match
//!
//! One task per match. Wall time is measured each iteration and turned into
//! whole simulation ticks through an accumulator, so a stalled scheduler is
//! caught up with extra ticks instead of slowing the simulation down. The
//! loop never runs ahead of wall time.

use std::time::Instant;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::game::r#match::GameMatch;
use crate::util::time::{SIMULATION_TPS, TICK_DURATION};

/// Catch-up cap after a long stall; past this the backlog is dropped
const MAX_TICKS_PER_BATCH: u32 = SIMULATION_TPS;

/// Turns elapsed wall time into a whole number of due simulation ticks
#[derive(Debug)]
struct TickAccumulator {
    last: Instant,
    accumulated: f64,
}

impl TickAccumulator {
    fn new() -> Self {
        Self {
            last: Instant::now(),
            accumulated: 0.0,
        }
    }

    /// How many ticks are due since the previous call
    fn due_ticks(&mut self) -> u32 {
        let now = Instant::now();
        self.accumulated += now.duration_since(self.last).as_secs_f64() * SIMULATION_TPS as f64;
        self.last = now;
        self.drain()
    }

    fn drain(&mut self) -> u32 {
        let due = self.accumulated.floor() as u32;
        self.accumulated -= due as f64;
        if due > MAX_TICKS_PER_BATCH {
            // A stall longer than a second is not worth replaying
            return MAX_TICKS_PER_BATCH;
        }
        due
    }
}

/// Run one match to completion. Returns when the match finishes, every
/// player leaves, or the registry requests a stop.
pub async fn run(mut game_match: GameMatch, mut stop_rx: watch::Receiver<bool>) {
    let match_id = game_match.id();
    info!(match_id = %match_id, "simulation loop started");

    let mut accumulator = TickAccumulator::new();
    loop {
        if *stop_rx.borrow_and_update() {
            info!(match_id = %match_id, "simulation loop stopped by registry");
            break;
        }

        game_match.process_inputs();
        let due = accumulator.due_ticks();
        if due > 1 {
            warn!(match_id = %match_id, catch_up = due, "tick backlog after stall");
        }
        for _ in 0..due {
            game_match.tick();
        }

        if game_match.finished() {
            info!(match_id = %match_id, "match finished");
            break;
        }

        tokio::time::sleep(TICK_DURATION).await;
    }

    game_match.mark_finished();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn accumulator_owes_catch_up_ticks_after_a_stall() {
        let mut acc = TickAccumulator::new();
        // Pretend five tick periods passed
        acc.last = Instant::now() - Duration::from_micros(5 * 16_666 + 100);
        assert_eq!(acc.due_ticks(), 5);
    }

    #[test]
    fn accumulator_keeps_the_fractional_remainder() {
        let mut acc = TickAccumulator::new();
        acc.accumulated = 2.75;
        assert_eq!(acc.drain(), 2);
        assert!((acc.accumulated - 0.75).abs() < 1e-9);
    }

    #[test]
    fn accumulator_caps_the_backlog() {
        let mut acc = TickAccumulator::new();
        acc.accumulated = 10_000.0;
        assert_eq!(acc.drain(), MAX_TICKS_PER_BATCH);
    }

    #[test]
    fn no_ticks_due_immediately() {
        let mut acc = TickAccumulator::new();
        assert_eq!(acc.due_ticks(), 0);
    }
}
