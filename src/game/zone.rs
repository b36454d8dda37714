//! Shrinking safe-zone state machine

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::game::constants::{
    FIRST_ZONE_RADIUS, FIRST_ZONE_START_SECS, SECOND_ZONE_RADIUS, SECOND_ZONE_START_SECS,
    THIRD_ZONE_RADIUS, THIRD_ZONE_START_SECS, WORLD_MAX, WORLD_MIN,
};
use crate::ws::protocol::{ZoneCircle, ZoneStatus};

/// The three shrink stages after the full-map stage
const STAGE_COUNT: usize = 3;

/// Elapsed-seconds thresholds at which stages 1..=3 activate
const STAGE_START_SECS: [u32; STAGE_COUNT] = [
    FIRST_ZONE_START_SECS,
    SECOND_ZONE_START_SECS,
    THIRD_ZONE_START_SECS,
];

/// Shrinking-circle safe area.
///
/// Stage 0 covers the whole map; stages 1..=3 are fixed concentric-ish
/// circles whose geometry is decided once at construction from the match
/// seed. The stage index only ever advances, driven by elapsed match time.
#[derive(Debug, Clone)]
pub struct PlayZone {
    circles: [ZoneCircle; STAGE_COUNT],
    stage: u8,
    elapsed_secs: u32,
}

impl PlayZone {
    pub fn new(seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);

        // First circle anywhere it fully fits in the map; each later circle
        // is placed strictly inside the previous one.
        let first = ZoneCircle {
            center_x: rng.gen_range(WORLD_MIN + FIRST_ZONE_RADIUS..=WORLD_MAX - FIRST_ZONE_RADIUS),
            center_y: rng.gen_range(WORLD_MIN + FIRST_ZONE_RADIUS..=WORLD_MAX - FIRST_ZONE_RADIUS),
            radius: FIRST_ZONE_RADIUS,
        };
        let second = Self::circle_inside(&mut rng, first, SECOND_ZONE_RADIUS);
        let third = Self::circle_inside(&mut rng, second, THIRD_ZONE_RADIUS);

        Self {
            circles: [first, second, third],
            stage: 0,
            elapsed_secs: 0,
        }
    }

    fn circle_inside(rng: &mut ChaCha8Rng, outer: ZoneCircle, radius: f32) -> ZoneCircle {
        let angle = rng.gen_range(0.0..std::f32::consts::TAU);
        let distance = rng.gen_range(0.0..=outer.radius - radius);
        ZoneCircle {
            center_x: outer.center_x + angle.cos() * distance,
            center_y: outer.center_y + angle.sin() * distance,
            radius,
        }
    }

    /// Advance the stage from elapsed match time. Pure function of time:
    /// calling again with the same elapsed value is a no-op.
    pub fn update(&mut self, elapsed_secs: u32) {
        self.elapsed_secs = elapsed_secs;
        let mut computed = 0u8;
        for (i, start) in STAGE_START_SECS.iter().enumerate() {
            if elapsed_secs >= *start {
                computed = (i + 1) as u8;
            }
        }
        // Monotone guard: stage never goes backwards
        self.stage = self.stage.max(computed);
    }

    /// Whether a point is inside the active safe area
    pub fn contains_point(&self, x: f32, y: f32) -> bool {
        if self.stage == 0 {
            return (WORLD_MIN..=WORLD_MAX).contains(&x) && (WORLD_MIN..=WORLD_MAX).contains(&y);
        }
        let circle = self.circles[self.stage as usize - 1];
        let dx = x - circle.center_x;
        let dy = y - circle.center_y;
        dx * dx + dy * dy <= circle.radius * circle.radius
    }

    pub fn stage(&self) -> u8 {
        self.stage
    }

    /// Seconds until the next stage activates; 0 once the final stage is live
    pub fn timer(&self) -> u32 {
        if (self.stage as usize) >= STAGE_COUNT {
            return 0;
        }
        STAGE_START_SECS[self.stage as usize].saturating_sub(self.elapsed_secs)
    }

    /// Per-tick status for the snapshot stream
    pub fn status(&self) -> ZoneStatus {
        ZoneStatus {
            timer: self.timer(),
            stage: self.stage,
        }
    }

    /// Stage geometry for the one-time zone-coordinates event
    pub fn circles(&self) -> [ZoneCircle; STAGE_COUNT] {
        self.circles
    }
}
