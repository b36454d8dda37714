//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Connection identifier, assigned when the socket is accepted
pub type ConnectionId = Uuid;

/// Lobby identifier; a match started from a lobby reuses this id
pub type LobbyId = Uuid;

/// Dense per-match identifier for mobs, spells, items and coins
pub type EntityId = u32;

/// Item kinds that can exist on the ground or in an inventory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    /// Spell tomes: holding one lets the player cast the matching spell
    Fireball,
    Plasma,
    Meteor,
    Kunai,
    /// Consumed on use, starts a timed health regen window
    HealingPotion,
    /// Currency, picked up on contact
    Coin,
}

impl ItemKind {
    /// The spell this item casts, if it is a tome
    pub fn spell_kind(self) -> Option<SpellKind> {
        match self {
            ItemKind::Fireball => Some(SpellKind::Fireball),
            ItemKind::Plasma => Some(SpellKind::Plasma),
            ItemKind::Meteor => Some(SpellKind::Meteor),
            ItemKind::Kunai => Some(SpellKind::Kunai),
            ItemKind::HealingPotion | ItemKind::Coin => None,
        }
    }
}

/// Castable spell kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpellKind {
    Fireball,
    Plasma,
    Meteor,
    Kunai,
}

/// Movement keys a client can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveDirection {
    Up,
    Down,
    Left,
    Right,
}

/// Non-movement key actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerAction {
    /// Pick up the first item currently touching the player
    Interact,
    /// Drop an inventory item on the ground
    Drop,
}

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Create a new lobby and become its host
    CreateLobby { name: String },

    /// Join an existing lobby
    JoinLobby { lobby_id: LobbyId },

    /// Leave a lobby before its match starts
    LeaveLobby { lobby_id: LobbyId },

    /// Request the current lobby list
    ListLobbies,

    /// Start the match for a lobby
    StartLobby { lobby_id: LobbyId },

    /// Movement key pressed or released
    KeyPress {
        direction: MoveDirection,
        pressed: bool,
    },

    /// Interact/drop action, with the inventory item for drops
    Action {
        action: PlayerAction,
        item_id: Option<EntityId>,
    },

    /// Mouse aim state, with the selected item kind and click state.
    /// A left click with a tome selected is a cast attempt; selecting a
    /// healing potion uses it (`item_id` names the inventory slot).
    MouseAim {
        left_click: bool,
        x: f32,
        y: f32,
        kind: Option<ItemKind>,
        item_id: Option<EntityId>,
    },

    /// Leave the current match
    LeaveMatch,

    /// Client finished loading the match scene
    GameLoaded { loaded: bool },
}

/// One zone stage circle, sent once with the zone geometry event
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ZoneCircle {
    pub center_x: f32,
    pub center_y: f32,
    pub radius: f32,
}

/// Per-tick zone status for the snapshot stream
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ZoneStatus {
    /// Seconds until the next stage activates (0 once terminal)
    pub timer: u32,
    /// Active stage, 0 = full map
    pub stage: u8,
}

/// Player state in a snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub connection_id: ConnectionId,
    pub x: f32,
    pub y: f32,
    /// Health (0-100)
    pub health: f32,
    /// Mana (0-100)
    pub mana: f32,
    pub alive: bool,
    /// Last input-action echo for animation sync
    pub left_click: bool,
    pub aim_x: f32,
    pub aim_y: f32,
}

/// Spell state in a snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpellSnapshot {
    pub spell_id: EntityId,
    pub caster_id: ConnectionId,
    pub kind: SpellKind,
    pub x: f32,
    pub y: f32,
}

/// Mob state in a snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MobSnapshot {
    pub mob_id: EntityId,
    pub x: f32,
    pub y: f32,
    pub health: i32,
}

/// Lobby summary for the lobby list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LobbyInfo {
    pub lobby_id: LobbyId,
    pub name: String,
    pub host_id: ConnectionId,
    pub players: Vec<ConnectionId>,
    pub started: bool,
}

/// One-time structural events, sent exactly once on the reliable stream
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum GameEvent {
    /// Spell removed (left world bounds or hit something)
    SpellDispel { spell_id: EntityId },

    /// Player died this tick; inventory was scattered at their position
    PlayerKilled { connection_id: ConnectionId },

    /// Item appeared on the ground. `dropper` is None for world spawns.
    ItemDropped {
        dropper: Option<ConnectionId>,
        item_id: EntityId,
        kind: ItemKind,
        x: f32,
        y: f32,
    },

    /// Item left the ground. `picker` is None for despawns.
    ItemPickedUp {
        picker: Option<ConnectionId>,
        item_id: EntityId,
        kind: ItemKind,
    },

    /// Coin collected on contact
    CoinPickedUp {
        connection_id: ConnectionId,
        coin_id: EntityId,
    },

    /// Healing potion consumed
    HealingUsed {
        connection_id: ConnectionId,
        item_id: EntityId,
    },

    /// Match over; `winner` is the sole survivor if one exists
    GameOver { winner: Option<ConnectionId> },
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Welcome message after connection
    Welcome {
        connection_id: ConnectionId,
        server_time: u64,
    },

    /// Lobby lifecycle
    LobbyCreated {
        lobby_id: LobbyId,
        name: String,
        host_id: ConnectionId,
    },
    LobbyJoined {
        lobby_id: LobbyId,
        connection_id: ConnectionId,
    },
    LobbyLeft {
        lobby_id: LobbyId,
        connection_id: ConnectionId,
    },
    LobbyDismantled { lobby_id: LobbyId },
    LobbyList { lobbies: Vec<LobbyInfo> },

    /// All players ready; the match simulation is live
    GameLoaded { lobby_id: LobbyId, loaded: bool },

    /// Zone stage geometry, sent once at the world-seeding tick
    ZoneGeometry {
        first: ZoneCircle,
        second: ZoneCircle,
        third: ZoneCircle,
    },

    /// Per-tick world snapshot (lossy stream; the next tick supersedes it)
    Snapshot {
        tick: u64,
        zone: ZoneStatus,
        players: Vec<PlayerSnapshot>,
        spells: Vec<SpellSnapshot>,
        mobs: Vec<MobSnapshot>,
    },

    /// One-time structural event (reliable stream)
    Event { event: GameEvent },

    /// Error message
    Error { code: String, message: String },
}
