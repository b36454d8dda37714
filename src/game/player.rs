//! Player character state and per-tick rules

use crate::game::constants::{
    HEALING_DURATION_TICKS, HEALING_REGEN_PER_TICK, INVENTORY_CAPACITY, MANA_REGEN_PER_TICK,
    MAX_HEALTH, MAX_MANA, PLAYER_MOVEMENT_SPEED, WORLD_MAX, WORLD_MIN,
};
use crate::game::item::Item;
use crate::util::time::tick_delta;
use crate::ws::protocol::{ConnectionId, EntityId, ItemKind, MoveDirection};

/// Authoritative state of one player character.
///
/// Movement is intent-driven: the network layer records which keys are held
/// and the simulation integrates them each tick. Health and mana are always
/// clamped to `[0, 100]`.
#[derive(Debug, Clone)]
pub struct PlayerCharacter {
    pub connection_id: ConnectionId,

    pub x: f32,
    pub y: f32,
    pub health: f32,
    pub mana: f32,

    // Held movement keys
    up: bool,
    down: bool,
    left: bool,
    right: bool,

    // Mouse/cast intent, echoed back in snapshots for animation sync
    pub left_click: bool,
    pub aim_x: f32,
    pub aim_y: f32,
    pub selected_kind: Option<ItemKind>,

    pub coins: u32,
    inventory: Vec<Item>,

    pub ready: bool,
    healing_ticks: u32,
}

impl PlayerCharacter {
    pub fn new(connection_id: ConnectionId, x: f32, y: f32) -> Self {
        Self {
            connection_id,
            x,
            y,
            health: MAX_HEALTH,
            mana: MAX_MANA,
            up: false,
            down: false,
            left: false,
            right: false,
            left_click: false,
            aim_x: 0.0,
            aim_y: 0.0,
            selected_kind: None,
            coins: 0,
            inventory: Vec::with_capacity(INVENTORY_CAPACITY),
            ready: false,
            healing_ticks: 0,
        }
    }

    /// Record a movement key press or release
    pub fn set_movement(&mut self, direction: MoveDirection, pressed: bool) {
        match direction {
            MoveDirection::Up => self.up = pressed,
            MoveDirection::Down => self.down = pressed,
            MoveDirection::Left => self.left = pressed,
            MoveDirection::Right => self.right = pressed,
        }
    }

    /// Record the mouse aim/click state
    pub fn set_mouse(&mut self, left_click: bool, x: f32, y: f32, kind: Option<ItemKind>) {
        self.left_click = left_click;
        self.aim_x = x;
        self.aim_y = y;
        self.selected_kind = kind;
    }

    /// Integrate held movement keys for one tick, clamped to world bounds
    pub fn update_position(&mut self) {
        let mut dx = 0.0f32;
        let mut dy = 0.0f32;
        if self.up {
            dy += 1.0;
        }
        if self.down {
            dy -= 1.0;
        }
        if self.left {
            dx -= 1.0;
        }
        if self.right {
            dx += 1.0;
        }
        if dx == 0.0 && dy == 0.0 {
            return;
        }
        // Diagonal movement is not faster
        let len = (dx * dx + dy * dy).sqrt();
        let dt = tick_delta();
        self.x = (self.x + dx / len * PLAYER_MOVEMENT_SPEED * dt).clamp(WORLD_MIN, WORLD_MAX);
        self.y = (self.y + dy / len * PLAYER_MOVEMENT_SPEED * dt).clamp(WORLD_MIN, WORLD_MAX);
    }

    /// Regenerate mana toward max at the fixed rate
    pub fn regenerate_mana(&mut self) {
        self.mana = (self.mana + MANA_REGEN_PER_TICK).min(MAX_MANA);
    }

    /// Spend mana for a cast; returns false (and deducts nothing) if short
    pub fn spend_mana(&mut self, cost: f32) -> bool {
        if self.mana < cost {
            return false;
        }
        self.mana -= cost;
        true
    }

    /// Open the timed healing window (potion use)
    pub fn start_healing(&mut self) {
        self.healing_ticks = HEALING_DURATION_TICKS;
    }

    pub fn healing_active(&self) -> bool {
        self.healing_ticks > 0
    }

    /// One tick of potion regen; counts the healing window down
    pub fn regenerate_health(&mut self) {
        if self.healing_ticks == 0 {
            return;
        }
        self.healing_ticks -= 1;
        self.health = (self.health + HEALING_REGEN_PER_TICK).min(MAX_HEALTH);
    }

    pub fn add_coin(&mut self) {
        self.coins += 1;
    }

    /// Put an item into the inventory; rejected when all slots are full
    pub fn pick_up_item(&mut self, item: Item) -> bool {
        if self.inventory.len() >= INVENTORY_CAPACITY {
            return false;
        }
        self.inventory.push(item);
        true
    }

    /// Take an item out of the inventory by id
    pub fn remove_item(&mut self, item_id: EntityId) -> Option<Item> {
        let pos = self.inventory.iter().position(|i| i.id == item_id)?;
        Some(self.inventory.remove(pos))
    }

    pub fn has_item(&self, item_id: EntityId) -> bool {
        self.inventory.iter().any(|i| i.id == item_id)
    }

    /// Drain the whole inventory (death drop)
    pub fn take_inventory(&mut self) -> Vec<Item> {
        std::mem::take(&mut self.inventory)
    }

    pub fn inventory(&self) -> &[Item] {
        &self.inventory
    }

    pub fn set_ready(&mut self) {
        self.ready = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn player() -> PlayerCharacter {
        PlayerCharacter::new(Uuid::new_v4(), 150.0, 150.0)
    }

    #[test]
    fn held_key_moves_player() {
        let mut p = player();
        p.set_movement(MoveDirection::Right, true);
        p.update_position();
        assert!(p.x > 150.0);
        p.set_movement(MoveDirection::Right, false);
        let x = p.x;
        p.update_position();
        assert_eq!(p.x, x);
    }

    #[test]
    fn diagonal_speed_is_normalized() {
        let mut p = player();
        p.set_movement(MoveDirection::Right, true);
        p.set_movement(MoveDirection::Up, true);
        p.update_position();
        let dx = p.x - 150.0;
        let dy = p.y - 150.0;
        let speed = (dx * dx + dy * dy).sqrt() / tick_delta();
        assert!((speed - PLAYER_MOVEMENT_SPEED).abs() < 1e-3);
    }

    #[test]
    fn movement_clamps_to_world_bounds() {
        let mut p = PlayerCharacter::new(Uuid::new_v4(), WORLD_MAX, WORLD_MAX);
        p.set_movement(MoveDirection::Right, true);
        p.set_movement(MoveDirection::Up, true);
        p.update_position();
        assert_eq!(p.x, WORLD_MAX);
        assert_eq!(p.y, WORLD_MAX);
    }

    #[test]
    fn mana_regen_caps_at_max() {
        let mut p = player();
        p.mana = MAX_MANA - 0.1;
        p.regenerate_mana();
        assert_eq!(p.mana, MAX_MANA);
    }

    #[test]
    fn spend_mana_refuses_when_short() {
        let mut p = player();
        p.mana = 10.0;
        assert!(!p.spend_mana(25.0));
        assert_eq!(p.mana, 10.0);
        assert!(p.spend_mana(10.0));
        assert_eq!(p.mana, 0.0);
    }

    #[test]
    fn healing_window_regens_then_expires() {
        let mut p = player();
        p.health = 50.0;
        p.start_healing();
        for _ in 0..HEALING_DURATION_TICKS {
            p.regenerate_health();
        }
        assert!(!p.healing_active());
        let healed = p.health;
        assert!(healed > 50.0);
        p.regenerate_health();
        assert_eq!(p.health, healed);
    }

    #[test]
    fn inventory_is_bounded() {
        let mut p = player();
        for i in 0..INVENTORY_CAPACITY {
            assert!(p.pick_up_item(Item::new(i as u32, ItemKind::Fireball, 0.0, 0.0)));
        }
        assert!(!p.pick_up_item(Item::new(99, ItemKind::Plasma, 0.0, 0.0)));
        assert_eq!(p.inventory().len(), INVENTORY_CAPACITY);
    }

    #[test]
    fn remove_item_round_trips() {
        let mut p = player();
        p.pick_up_item(Item::new(7, ItemKind::HealingPotion, 0.0, 0.0));
        assert!(p.has_item(7));
        let item = p.remove_item(7).unwrap();
        assert_eq!(item.kind, ItemKind::HealingPotion);
        assert!(!p.has_item(7));
        assert!(p.remove_item(7).is_none());
    }
}
