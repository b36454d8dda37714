//! Hostile mobs: chase-nearest AI and contact damage state

use crate::game::constants::{
    MOB_HEALTH, MOB_MOVEMENT_SPEED, MOB_TRIGGER_RANGE, WORLD_MAX, WORLD_MIN,
};
use crate::util::time::tick_delta;
use crate::ws::protocol::EntityId;

/// A mob roaming the arena. Damages players on contact (the oracle reports
/// the contact; the match applies the damage).
#[derive(Debug, Clone)]
pub struct Mob {
    pub id: EntityId,
    pub x: f32,
    pub y: f32,
    pub health: i32,
}

impl Mob {
    pub fn new(id: EntityId, x: f32, y: f32) -> Self {
        Self {
            id,
            x,
            y,
            health: MOB_HEALTH,
        }
    }

    /// One AI step: walk straight toward the nearest living player if one is
    /// inside the trigger range, otherwise hold position.
    pub fn update_position<I>(&mut self, targets: I)
    where
        I: Iterator<Item = (f32, f32)>,
    {
        let mut nearest: Option<(f32, f32, f32)> = None;
        for (tx, ty) in targets {
            let dx = tx - self.x;
            let dy = ty - self.y;
            let dist_sq = dx * dx + dy * dy;
            if nearest.map_or(true, |(_, _, best)| dist_sq < best) {
                nearest = Some((tx, ty, dist_sq));
            }
        }

        let Some((tx, ty, dist_sq)) = nearest else {
            return;
        };
        if dist_sq > MOB_TRIGGER_RANGE * MOB_TRIGGER_RANGE {
            return;
        }

        let dist = dist_sq.sqrt();
        if dist < f32::EPSILON {
            return;
        }
        let dt = tick_delta();
        self.x += (tx - self.x) / dist * MOB_MOVEMENT_SPEED * dt;
        self.y += (ty - self.y) / dist * MOB_MOVEMENT_SPEED * dt;
        self.x = self.x.clamp(WORLD_MIN, WORLD_MAX);
        self.y = self.y.clamp(WORLD_MIN, WORLD_MAX);
    }

    pub fn is_dead(&self) -> bool {
        self.health <= 0
    }
}
