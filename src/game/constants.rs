//! Simulation tuning constants
//!
//! All numbers that shape a match live here so balance changes stay in one
//! place. Distances are in world units, times in ticks unless noted.

/// World bounds: the map is a `[0, WORLD_MAX] x [0, WORLD_MAX]` square.
pub const WORLD_MIN: f32 = 0.0;
pub const WORLD_MAX: f32 = 300.0;

/// Movement speeds in world units per second
pub const PLAYER_MOVEMENT_SPEED: f32 = 5.0;
pub const MOB_MOVEMENT_SPEED: f32 = 4.0;

/// Collider radii
pub const PLAYER_HIT_BOX_RADIUS: f32 = 1.0;
pub const MOB_HIT_BOX_RADIUS: f32 = 1.0;
pub const SPELL_HIT_BOX_RADIUS: f32 = 0.35;
pub const ITEM_HIT_BOX_RADIUS: f32 = 0.5;
pub const COIN_HIT_BOX_RADIUS: f32 = 0.2;

/// Safe-zone stage radii (stage 0 is the full map)
pub const FIRST_ZONE_RADIUS: f32 = 140.0;
pub const SECOND_ZONE_RADIUS: f32 = 76.0;
pub const THIRD_ZONE_RADIUS: f32 = 29.0;

/// Elapsed match seconds at which each zone stage activates
pub const FIRST_ZONE_START_SECS: u32 = 60;
pub const SECOND_ZONE_START_SECS: u32 = 120;
pub const THIRD_ZONE_START_SECS: u32 = 180;

/// Ticks between `loaded` and the one-time world-seeding event
pub const TICKS_TO_START_GAME: u32 = 300;
/// Ticks between the last kill and the game-over broadcast
pub const TICKS_TO_END_GAME: u32 = 60;

/// Per-tick damage values
pub const MOB_DMG_PER_TICK: f32 = 0.15;
pub const ZONE_DMG_PER_TICK: f32 = 0.03;

/// Health and mana
pub const MAX_HEALTH: f32 = 100.0;
pub const MAX_MANA: f32 = 100.0;
pub const MANA_REGEN_PER_TICK: f32 = 0.2;

/// Healing potion: regen per tick for a fixed window
pub const HEALING_REGEN_PER_TICK: f32 = 0.5;
pub const HEALING_DURATION_TICKS: u32 = 120;

/// Mob parameters
pub const MOB_HEALTH: i32 = 50;
pub const MOB_TRIGGER_RANGE: f32 = 15.0;
pub const MOB_COIN_BOUNTY: u32 = 5;

/// Drop scatter ranges around the drop origin
pub const COIN_DROP_RANGE: f32 = 1.0;
pub const ITEM_DROP_RANGE: f32 = 0.5;

/// Inventory slots per player
pub const INVENTORY_CAPACITY: usize = 6;

/// World seeding: how many items and mobs the spawner places at start
pub const SPAWNER_ITEM_COUNT: usize = 24;
pub const SPAWNER_MOB_COUNT: usize = 4;
