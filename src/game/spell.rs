//! Spells in flight and their per-kind profiles

use crate::game::constants::{WORLD_MAX, WORLD_MIN};
use crate::util::time::tick_delta;
use crate::ws::protocol::{ConnectionId, EntityId, SpellKind};

/// Per-kind spell tuning
#[derive(Debug, Clone, Copy)]
pub struct SpellProfile {
    /// Flight speed in world units per second
    pub speed: f32,
    /// Mana deducted on a successful cast
    pub mana_cost: f32,
    /// Damage dealt on hit
    pub damage: f32,
}

impl SpellProfile {
    pub fn for_kind(kind: SpellKind) -> Self {
        match kind {
            SpellKind::Fireball => Self {
                speed: 7.0,
                mana_cost: 25.0,
                damage: 20.0,
            },
            SpellKind::Plasma => Self {
                speed: 10.0,
                mana_cost: 15.0,
                damage: 10.0,
            },
            SpellKind::Meteor => Self {
                speed: 5.0,
                mana_cost: 33.0,
                damage: 30.0,
            },
            SpellKind::Kunai => Self {
                speed: 10.0,
                mana_cost: 50.0,
                damage: 35.0,
            },
        }
    }
}

/// A spell travelling in a straight line from its cast position toward the
/// aim point captured at cast time
#[derive(Debug, Clone)]
pub struct Spell {
    pub id: EntityId,
    pub caster_id: ConnectionId,
    pub kind: SpellKind,
    pub x: f32,
    pub y: f32,
    vel_x: f32,
    vel_y: f32,
}

impl Spell {
    /// Create a spell at `(x, y)` flying toward `(target_x, target_y)`.
    /// A degenerate aim (target on top of the caster) flies along +x.
    pub fn new(
        id: EntityId,
        caster_id: ConnectionId,
        kind: SpellKind,
        x: f32,
        y: f32,
        target_x: f32,
        target_y: f32,
    ) -> Self {
        let profile = SpellProfile::for_kind(kind);
        let dx = target_x - x;
        let dy = target_y - y;
        let len = (dx * dx + dy * dy).sqrt();
        let (nx, ny) = if len > f32::EPSILON {
            (dx / len, dy / len)
        } else {
            (1.0, 0.0)
        };
        Self {
            id,
            caster_id,
            kind,
            x,
            y,
            vel_x: nx * profile.speed,
            vel_y: ny * profile.speed,
        }
    }

    /// Integrate one tick of flight
    pub fn update_position(&mut self) {
        let dt = tick_delta();
        self.x += self.vel_x * dt;
        self.y += self.vel_y * dt;
    }

    /// Whether the spell has left the playable world
    pub fn out_of_bounds(&self) -> bool {
        self.x < WORLD_MIN || self.x > WORLD_MAX || self.y < WORLD_MIN || self.y > WORLD_MAX
    }
}
