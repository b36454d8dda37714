//! Narrow-phase collision oracle boundary
//!
//! The match feeds kind-tagged circle colliders in and receives overlap
//! callbacks out. Callbacks may only enqueue deferred mutations; the oracle
//! owns no simulation timing and the match depends on nothing but this
//! interface.

use crate::ws::protocol::{ConnectionId, EntityId};

/// What a collider belongs to
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ColliderKind {
    Player(ConnectionId),
    Mob(EntityId),
    Spell { id: EntityId, caster: ConnectionId },
    Item(EntityId),
    Coin(EntityId),
}

/// A circle shape handed to the oracle for one step
#[derive(Debug, Clone, Copy)]
pub struct Collider {
    pub kind: ColliderKind,
    pub x: f32,
    pub y: f32,
    pub radius: f32,
}

impl Collider {
    pub fn new(kind: ColliderKind, x: f32, y: f32, radius: f32) -> Self {
        Self { kind, x, y, radius }
    }
}

/// Pluggable narrow-phase collision check. One call per simulation tick;
/// every overlapping pair is reported exactly once.
pub trait CollisionOracle: Send {
    fn step(&mut self, colliders: &[Collider], on_overlap: &mut dyn FnMut(ColliderKind, ColliderKind));
}

/// Default oracle: all-pairs circle-vs-circle test. Entity counts per match
/// are small enough that the quadratic pass is not worth a broad phase.
#[derive(Debug, Default)]
pub struct CircleOracle;

impl CircleOracle {
    fn overlaps(a: &Collider, b: &Collider) -> bool {
        let dx = b.x - a.x;
        let dy = b.y - a.y;
        let combined = a.radius + b.radius;
        dx * dx + dy * dy <= combined * combined
    }
}

impl CollisionOracle for CircleOracle {
    fn step(&mut self, colliders: &[Collider], on_overlap: &mut dyn FnMut(ColliderKind, ColliderKind)) {
        for i in 0..colliders.len() {
            for j in (i + 1)..colliders.len() {
                if Self::overlaps(&colliders[i], &colliders[j]) {
                    on_overlap(colliders[i].kind, colliders[j].kind);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn reports_each_overlapping_pair_once() {
        let player = Uuid::new_v4();
        let colliders = vec![
            Collider::new(ColliderKind::Player(player), 0.0, 0.0, 1.0),
            Collider::new(ColliderKind::Mob(1), 1.5, 0.0, 1.0),
            Collider::new(ColliderKind::Item(2), 50.0, 50.0, 0.5),
        ];
        let mut pairs = Vec::new();
        CircleOracle.step(&colliders, &mut |a, b| pairs.push((a, b)));
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].0, ColliderKind::Player(player));
        assert_eq!(pairs[0].1, ColliderKind::Mob(1));
    }

    #[test]
    fn touching_circles_overlap() {
        let colliders = vec![
            Collider::new(ColliderKind::Coin(1), 0.0, 0.0, 0.2),
            Collider::new(ColliderKind::Coin(2), 0.4, 0.0, 0.2),
        ];
        let mut count = 0;
        CircleOracle.step(&colliders, &mut |_, _| count += 1);
        assert_eq!(count, 1);
    }

    #[test]
    fn empty_input_reports_nothing() {
        let mut count = 0;
        CircleOracle.step(&[], &mut |_, _| count += 1);
        assert_eq!(count, 0);
    }
}
