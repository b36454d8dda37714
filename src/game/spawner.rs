//! One-time world seeding at match start

use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::game::constants::{SPAWNER_ITEM_COUNT, SPAWNER_MOB_COUNT};
use crate::ws::protocol::{ItemKind, ZoneCircle};

/// Weighted item table for world spawns. Coins are never world-spawned;
/// they only enter the world as drops.
const ITEM_WEIGHTS: [(ItemKind, f32); 5] = [
    (ItemKind::Fireball, 0.25),
    (ItemKind::Plasma, 0.25),
    (ItemKind::HealingPotion, 0.25),
    (ItemKind::Meteor, 0.125),
    (ItemKind::Kunai, 0.125),
];

/// Everything the seeding event places into the world
#[derive(Debug, Clone)]
pub struct WorldSeed {
    pub items: Vec<(ItemKind, f32, f32)>,
    pub mobs: Vec<(f32, f32)>,
}

/// Roll the start-of-match world contents. Positions all land inside the
/// first zone circle so nothing spawns in terrain the zone never covers.
pub fn seed_world(rng: &mut ChaCha8Rng, first_zone: ZoneCircle) -> WorldSeed {
    let items = (0..SPAWNER_ITEM_COUNT)
        .map(|_| {
            let kind = roll_item_kind(rng);
            let (x, y) = point_in_circle(rng, first_zone);
            (kind, x, y)
        })
        .collect();

    let mobs = (0..SPAWNER_MOB_COUNT)
        .map(|_| point_in_circle(rng, first_zone))
        .collect();

    WorldSeed { items, mobs }
}

fn roll_item_kind(rng: &mut ChaCha8Rng) -> ItemKind {
    let mut roll: f32 = rng.gen_range(0.0..1.0);
    for (kind, weight) in ITEM_WEIGHTS {
        if roll < weight {
            return kind;
        }
        roll -= weight;
    }
    // Weights sum to 1.0; float rounding can leave a sliver
    ITEM_WEIGHTS[ITEM_WEIGHTS.len() - 1].0
}

fn point_in_circle(rng: &mut ChaCha8Rng, circle: ZoneCircle) -> (f32, f32) {
    let angle = rng.gen_range(0.0..std::f32::consts::TAU);
    // sqrt for uniform area density
    let distance = circle.radius * rng.gen_range(0.0f32..1.0).sqrt();
    (
        circle.center_x + angle.cos() * distance,
        circle.center_y + angle.sin() * distance,
    )
}
