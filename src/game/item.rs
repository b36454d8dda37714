//! Ground items: spell tomes, potions, coins

use crate::ws::protocol::{EntityId, ItemKind};

/// An item lying in the world, waiting to be picked up
#[derive(Debug, Clone)]
pub struct Item {
    pub id: EntityId,
    pub kind: ItemKind,
    pub x: f32,
    pub y: f32,
}

impl Item {
    pub fn new(id: EntityId, kind: ItemKind, x: f32, y: f32) -> Self {
        Self { id, kind, x, y }
    }

    /// Coins are collected on contact instead of via interact
    pub fn is_coin(&self) -> bool {
        self.kind == ItemKind::Coin
    }
}
