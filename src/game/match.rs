//! Match state and authoritative tick engine
//!
//! One `GameMatch` owns every entity in one arena. All mutation happens on
//! the match's own simulation task: the network layer only enqueues commands
//! through the mpsc intake, and structural changes discovered mid-tick are
//! deferred to queues that a single flush drains at a fixed point in the
//! tick. Broadcasts go out only after the flush, so no partial-tick state is
//! ever visible outside.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info};

use crate::game::constants::{
    COIN_DROP_RANGE, COIN_HIT_BOX_RADIUS, ITEM_DROP_RANGE, ITEM_HIT_BOX_RADIUS,
    MOB_COIN_BOUNTY, MOB_DMG_PER_TICK, MOB_HIT_BOX_RADIUS, PLAYER_HIT_BOX_RADIUS,
    SPELL_HIT_BOX_RADIUS, TICKS_TO_END_GAME, TICKS_TO_START_GAME, WORLD_MAX, WORLD_MIN,
    ZONE_DMG_PER_TICK,
};
use crate::game::collision::{CircleOracle, Collider, ColliderKind, CollisionOracle};
use crate::game::item::Item;
use crate::game::mob::Mob;
use crate::game::player::PlayerCharacter;
use crate::game::spawner;
use crate::game::spell::{Spell, SpellProfile};
use crate::game::zone::PlayZone;
use crate::util::time::{unix_millis, SIMULATION_TPS};
use crate::ws::protocol::{
    ClientMsg, ConnectionId, EntityId, GameEvent, ItemKind, LobbyId, MobSnapshot, PlayerAction,
    PlayerSnapshot, ServerMsg, SpellKind, SpellSnapshot,
};

use super::PlayerInput;

/// Inputs older than this when drained get flagged; they still apply
const STALE_INPUT_MS: u64 = 500;

/// Structural changes queued during a tick, drained once by the flush.
/// Nothing here touches live collections until the flush step runs.
#[derive(Debug, Default)]
struct PendingMutations {
    spell_removals: Vec<EntityId>,
    spell_additions: Vec<Spell>,
    dead_players: Vec<ConnectionId>,
    mob_removals: Vec<EntityId>,
    /// coin id paired with the player who touched it first
    coin_pickups: Vec<(EntityId, ConnectionId)>,
    item_pickups: Vec<(EntityId, ConnectionId)>,
    /// dropper is None for despawn-style drops (world scatter)
    item_drops: Vec<(Option<ConnectionId>, Item)>,
}

/// Handle to a running match, cheap to clone into connection tasks
#[derive(Clone)]
pub struct MatchHandle {
    pub id: LobbyId,
    pub input_tx: mpsc::Sender<PlayerInput>,
    /// Reliable one-time events
    pub event_tx: broadcast::Sender<ServerMsg>,
    /// Lossy per-tick snapshots; a lagged receiver just skips ahead
    pub snapshot_tx: broadcast::Sender<ServerMsg>,
    pub stop_tx: watch::Sender<bool>,
    player_count: Arc<AtomicUsize>,
    finished: Arc<AtomicBool>,
}

impl MatchHandle {
    pub fn player_count(&self) -> usize {
        self.player_count.load(Ordering::Relaxed)
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Relaxed)
    }
}

/// The authoritative simulation for one match
pub struct GameMatch {
    id: LobbyId,
    tick: u64,

    players: HashMap<ConnectionId, PlayerCharacter>,
    dead: HashSet<ConnectionId>,
    spells: HashMap<EntityId, Spell>,
    mobs: HashMap<EntityId, Mob>,
    items: HashMap<EntityId, Item>,
    coins: HashMap<EntityId, Item>,

    zone: PlayZone,
    rng: ChaCha8Rng,
    next_entity_id: EntityId,

    /// All clients acked scene load; the simulation is live
    loaded: bool,
    /// Ticks counted toward the world-seeding latch
    start_ticks: u32,
    world_seeded: bool,
    /// Ticks since the seeding event, drives zone elapsed time
    ticks_since_seed: u64,
    /// Ticks counted toward the game-over latch, armed once alive <= 1
    end_ticks: u32,
    game_over_sent: bool,

    /// Players in mob contact last oracle step; damaged next tick
    mob_contacts: HashSet<ConnectionId>,

    oracle: Box<dyn CollisionOracle>,
    pending: PendingMutations,

    input_rx: mpsc::Receiver<PlayerInput>,
    event_tx: broadcast::Sender<ServerMsg>,
    snapshot_tx: broadcast::Sender<ServerMsg>,
    player_count: Arc<AtomicUsize>,
    finished: Arc<AtomicBool>,
}

impl GameMatch {
    /// Create a match for a fixed member set. Spawn positions and all later
    /// randomness derive from the seed, so a match replays identically.
    pub fn new(id: LobbyId, seed: u64, members: &[ConnectionId]) -> (Self, MatchHandle) {
        let (input_tx, input_rx) = mpsc::channel(256);
        let (event_tx, _) = broadcast::channel(256);
        let (snapshot_tx, _) = broadcast::channel(16);
        let (stop_tx, _) = watch::channel(false);
        let player_count = Arc::new(AtomicUsize::new(members.len()));
        let finished = Arc::new(AtomicBool::new(false));

        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let zone = PlayZone::new(seed);

        let players = members
            .iter()
            .map(|&connection_id| {
                let x = rng.gen_range(WORLD_MIN + 10.0..WORLD_MAX - 10.0);
                let y = rng.gen_range(WORLD_MIN + 10.0..WORLD_MAX - 10.0);
                (connection_id, PlayerCharacter::new(connection_id, x, y))
            })
            .collect();

        let handle = MatchHandle {
            id,
            input_tx,
            event_tx: event_tx.clone(),
            snapshot_tx: snapshot_tx.clone(),
            stop_tx: stop_tx.clone(),
            player_count: player_count.clone(),
            finished: finished.clone(),
        };

        let game_match = Self {
            id,
            tick: 0,
            players,
            dead: HashSet::new(),
            spells: HashMap::new(),
            mobs: HashMap::new(),
            items: HashMap::new(),
            coins: HashMap::new(),
            zone,
            rng,
            next_entity_id: 0,
            loaded: false,
            start_ticks: 0,
            world_seeded: false,
            ticks_since_seed: 0,
            end_ticks: 0,
            game_over_sent: false,
            mob_contacts: HashSet::new(),
            oracle: Box::new(CircleOracle),
            pending: PendingMutations::default(),
            input_rx,
            event_tx,
            snapshot_tx,
            player_count,
            finished,
        };

        (game_match, handle)
    }

    pub fn id(&self) -> LobbyId {
        self.id
    }

    /// The game-over broadcast went out, or everyone left
    pub fn finished(&self) -> bool {
        self.game_over_sent || self.players.is_empty()
    }

    pub fn alive_count(&self) -> usize {
        self.players.len() - self.dead.len()
    }

    // ---- command intake -------------------------------------------------

    /// Drain every queued command. Runs on the simulation task between
    /// ticks, so this is the only place network intent touches match state.
    pub fn process_inputs(&mut self) {
        while let Ok(input) = self.input_rx.try_recv() {
            let age_ms = unix_millis().saturating_sub(input.received_at);
            if age_ms > STALE_INPUT_MS {
                debug!(
                    match_id = %self.id,
                    connection_id = %input.connection_id,
                    age_ms,
                    "applying stale input"
                );
            }
            self.apply_command(input.connection_id, input.msg);
        }
    }

    fn apply_command(&mut self, connection_id: ConnectionId, msg: ClientMsg) {
        match msg {
            ClientMsg::KeyPress { direction, pressed } => {
                if !self.dead.contains(&connection_id) {
                    if let Some(player) = self.players.get_mut(&connection_id) {
                        player.set_movement(direction, pressed);
                    }
                }
            }
            ClientMsg::Action { action, item_id } => {
                self.set_player_action(connection_id, action, item_id);
            }
            ClientMsg::MouseAim {
                left_click,
                x,
                y,
                kind,
                item_id,
            } => {
                self.handle_mouse(connection_id, left_click, x, y, kind, item_id);
            }
            ClientMsg::GameLoaded { loaded } => {
                if loaded {
                    self.add_ready_player(connection_id);
                }
            }
            ClientMsg::LeaveMatch => {
                self.handle_leave(connection_id);
            }
            // Lobby traffic never reaches a running match
            _ => {}
        }
    }

    /// Interact picks up the first ground item touching the player; drop
    /// moves an inventory item into the pending-drop queue.
    fn set_player_action(
        &mut self,
        connection_id: ConnectionId,
        action: PlayerAction,
        item_id: Option<EntityId>,
    ) {
        if self.dead.contains(&connection_id) {
            return;
        }
        match action {
            PlayerAction::Interact => {
                let Some(player) = self.players.get(&connection_id) else {
                    return;
                };
                let reach = PLAYER_HIT_BOX_RADIUS + ITEM_HIT_BOX_RADIUS;
                let target = self.items.values().find(|item| {
                    let dx = item.x - player.x;
                    let dy = item.y - player.y;
                    dx * dx + dy * dy <= reach * reach
                });
                if let Some(item) = target {
                    let id = item.id;
                    if !self.pending.item_pickups.iter().any(|(i, _)| *i == id) {
                        self.pending.item_pickups.push((id, connection_id));
                    }
                }
            }
            PlayerAction::Drop => {
                let Some(item_id) = item_id else { return };
                if let Some(player) = self.players.get_mut(&connection_id) {
                    if let Some(item) = player.remove_item(item_id) {
                        self.pending.item_drops.push((Some(connection_id), item));
                    }
                }
            }
        }
    }

    /// Record aim state; on a left click, cast the selected tome's spell or
    /// consume a healing potion.
    fn handle_mouse(
        &mut self,
        connection_id: ConnectionId,
        left_click: bool,
        x: f32,
        y: f32,
        kind: Option<ItemKind>,
        item_id: Option<EntityId>,
    ) {
        if self.dead.contains(&connection_id) {
            return;
        }
        let Some(player) = self.players.get_mut(&connection_id) else {
            return;
        };
        player.set_mouse(left_click, x, y, kind);
        if !left_click {
            return;
        }

        match kind {
            Some(ItemKind::HealingPotion) => {
                let Some(item_id) = item_id else { return };
                if player.remove_item(item_id).is_some() {
                    player.start_healing();
                    let _ = self.event_tx.send(ServerMsg::Event {
                        event: GameEvent::HealingUsed {
                            connection_id,
                            item_id,
                        },
                    });
                }
            }
            Some(tome) => {
                let Some(spell_kind) = tome.spell_kind() else {
                    return;
                };
                self.try_cast(connection_id, spell_kind, x, y);
            }
            None => {}
        }
    }

    /// Cast attempt: needs a matching tome in the inventory and enough
    /// mana. An unaffordable cast deducts nothing and spawns nothing.
    fn try_cast(&mut self, caster: ConnectionId, kind: SpellKind, target_x: f32, target_y: f32) {
        let Some(player) = self.players.get_mut(&caster) else {
            return;
        };
        let holds_tome = player
            .inventory()
            .iter()
            .any(|item| item.kind.spell_kind() == Some(kind));
        if !holds_tome {
            return;
        }
        let profile = SpellProfile::for_kind(kind);
        if !player.spend_mana(profile.mana_cost) {
            return;
        }
        let (x, y) = (player.x, player.y);
        self.add_spell(caster, kind, x, y, target_x, target_y);
    }

    /// Mark one player ready; when the whole lobby is ready the simulation
    /// goes live and the ack is broadcast once.
    pub fn add_ready_player(&mut self, connection_id: ConnectionId) {
        let Some(player) = self.players.get_mut(&connection_id) else {
            return;
        };
        player.set_ready();
        if !self.loaded && self.players.values().all(|p| p.ready) {
            self.loaded = true;
            info!(match_id = %self.id, players = self.players.len(), "all players loaded");
            let _ = self.event_tx.send(ServerMsg::GameLoaded {
                lobby_id: self.id,
                loaded: true,
            });
        }
    }

    fn handle_leave(&mut self, connection_id: ConnectionId) {
        if self.players.remove(&connection_id).is_some() {
            self.dead.remove(&connection_id);
            self.mob_contacts.remove(&connection_id);
            self.player_count.store(self.players.len(), Ordering::Relaxed);
            debug!(match_id = %self.id, connection_id = %connection_id, "player left match");
        }
    }

    // ---- bounded mutators ----------------------------------------------

    /// Damage a living player, clamped at 0. Reaching 0 queues the death
    /// transition once; an already-dead or unknown id is a no-op.
    pub fn damage_player(&mut self, connection_id: ConnectionId, amount: f32) {
        if self.dead.contains(&connection_id)
            || self.pending.dead_players.contains(&connection_id)
        {
            return;
        }
        let Some(player) = self.players.get_mut(&connection_id) else {
            return;
        };
        player.health = (player.health - amount).max(0.0);
        if player.health <= 0.0 {
            self.pending.dead_players.push(connection_id);
        }
    }

    pub fn heal_player(&mut self, connection_id: ConnectionId, amount: f32) {
        if self.dead.contains(&connection_id) {
            return;
        }
        if let Some(player) = self.players.get_mut(&connection_id) {
            player.health = (player.health + amount).min(crate::game::constants::MAX_HEALTH);
        }
    }

    /// Damage a mob; death queues its removal once
    pub fn damage_mob(&mut self, mob_id: EntityId, amount: i32) {
        let Some(mob) = self.mobs.get_mut(&mob_id) else {
            return;
        };
        mob.health = (mob.health - amount).max(0);
        if mob.is_dead() && !self.pending.mob_removals.contains(&mob_id) {
            self.pending.mob_removals.push(mob_id);
        }
    }

    /// Place an item (or coin) into the world immediately, with the drop
    /// event
    pub fn add_item(&mut self, dropper: Option<ConnectionId>, kind: ItemKind, x: f32, y: f32) {
        let id = self.alloc_id();
        let item = Item::new(id, kind, x, y);
        let _ = self.event_tx.send(ServerMsg::Event {
            event: GameEvent::ItemDropped {
                dropper,
                item_id: id,
                kind,
                x,
                y,
            },
        });
        if item.is_coin() {
            self.coins.insert(id, item);
        } else {
            self.items.insert(id, item);
        }
    }

    pub fn add_mob(&mut self, x: f32, y: f32) {
        let id = self.alloc_id();
        self.mobs.insert(id, Mob::new(id, x, y));
    }

    /// Queue a spell for the next flush
    pub fn add_spell(
        &mut self,
        caster: ConnectionId,
        kind: SpellKind,
        x: f32,
        y: f32,
        target_x: f32,
        target_y: f32,
    ) {
        let id = self.alloc_id();
        self.pending
            .spell_additions
            .push(Spell::new(id, caster, kind, x, y, target_x, target_y));
    }

    /// Queue a spell removal; duplicates collapse to one dispel
    pub fn remove_spell(&mut self, spell_id: EntityId) {
        if !self.pending.spell_removals.contains(&spell_id) {
            self.pending.spell_removals.push(spell_id);
        }
    }

    fn alloc_id(&mut self) -> EntityId {
        self.next_entity_id += 1;
        self.next_entity_id
    }

    // ---- tick -----------------------------------------------------------

    /// Advance one fixed simulation step. The step order is load-bearing:
    /// collision callbacks only enqueue, the flush drains every queue in a
    /// fixed order, and the broadcast sees post-flush state only.
    pub fn tick(&mut self) {
        if !self.loaded {
            return;
        }
        self.tick += 1;

        // Start latch: the world-seeding event fires exactly once, at the
        // tick where the counter reaches the threshold.
        if !self.world_seeded {
            self.start_ticks += 1;
            if self.start_ticks == TICKS_TO_START_GAME {
                self.seed_world();
            }
        } else {
            self.ticks_since_seed += 1;
            let elapsed_secs = (self.ticks_since_seed / SIMULATION_TPS as u64) as u32;
            self.zone.update(elapsed_secs);
        }

        self.step_players();
        self.step_spells();
        self.step_mobs();
        self.step_end_phase();
        self.step_oracle();
        self.flush();
        self.broadcast_snapshot();
    }

    /// One-time world seeding: starter items and mobs inside the first
    /// zone, plus the zone geometry broadcast.
    fn seed_world(&mut self) {
        self.world_seeded = true;
        let [first, second, third] = self.zone.circles();
        let seed = spawner::seed_world(&mut self.rng, first);
        for (kind, x, y) in seed.items {
            self.add_item(None, kind, x, y);
        }
        for (x, y) in seed.mobs {
            self.add_mob(x, y);
        }
        info!(match_id = %self.id, tick = self.tick, "world seeded");
        let _ = self.event_tx.send(ServerMsg::ZoneGeometry {
            first,
            second,
            third,
        });
    }

    /// Movement, mob-contact damage, regen, zone damage for living players
    fn step_players(&mut self) {
        let contacts: Vec<ConnectionId> = self
            .mob_contacts
            .iter()
            .copied()
            .filter(|id| !self.dead.contains(id))
            .collect();
        for id in contacts {
            self.damage_player(id, MOB_DMG_PER_TICK);
        }

        let mut zone_victims = Vec::new();
        for (id, player) in &mut self.players {
            if self.dead.contains(id) {
                continue;
            }
            player.update_position();
            player.regenerate_mana();
            player.regenerate_health();
            if self.world_seeded && !self.zone.contains_point(player.x, player.y) {
                zone_victims.push(*id);
            }
        }
        for id in zone_victims {
            self.damage_player(id, ZONE_DMG_PER_TICK);
        }
    }

    /// Integrate spell flight; leaving the world queues a dispel
    fn step_spells(&mut self) {
        let mut escaped = Vec::new();
        for spell in self.spells.values_mut() {
            spell.update_position();
            if spell.out_of_bounds() {
                escaped.push(spell.id);
            }
        }
        for id in escaped {
            self.remove_spell(id);
        }
    }

    /// Mob AI step; dead mobs queue their removal
    fn step_mobs(&mut self) {
        let targets: Vec<(f32, f32)> = self
            .players
            .iter()
            .filter(|(id, _)| !self.dead.contains(*id))
            .map(|(_, p)| (p.x, p.y))
            .collect();
        let mut fallen = Vec::new();
        for mob in self.mobs.values_mut() {
            mob.update_position(targets.iter().copied());
            if mob.is_dead() {
                fallen.push(mob.id);
            }
        }
        for id in fallen {
            if !self.pending.mob_removals.contains(&id) {
                self.pending.mob_removals.push(id);
            }
        }
    }

    /// End latch: once at most one player lives, count down and broadcast
    /// the winner exactly once.
    fn step_end_phase(&mut self) {
        if self.game_over_sent || self.alive_count() > 1 {
            return;
        }
        self.end_ticks += 1;
        if self.end_ticks == TICKS_TO_END_GAME {
            self.game_over_sent = true;
            let winner = self
                .players
                .keys()
                .find(|id| !self.dead.contains(*id))
                .copied();
            info!(match_id = %self.id, winner = ?winner, "game over");
            let _ = self.event_tx.send(ServerMsg::Event {
                event: GameEvent::GameOver { winner },
            });
        }
    }

    /// Feed the oracle one step. The callback only collects overlap pairs;
    /// once the oracle returns they become bounded-mutator calls and queued
    /// pickups, never direct map surgery.
    fn step_oracle(&mut self) {
        let colliders = self.build_colliders();
        let mut overlaps = Vec::new();
        self.oracle
            .step(&colliders, &mut |a, b| overlaps.push((a, b)));

        self.mob_contacts.clear();
        for (a, b) in overlaps {
            self.handle_overlap(a, b);
            self.handle_overlap(b, a);
        }
    }

    fn build_colliders(&self) -> Vec<Collider> {
        let mut colliders = Vec::with_capacity(
            self.players.len() + self.mobs.len() + self.spells.len() + self.items.len()
                + self.coins.len(),
        );
        for (id, p) in &self.players {
            if !self.dead.contains(id) {
                colliders.push(Collider::new(
                    ColliderKind::Player(*id),
                    p.x,
                    p.y,
                    PLAYER_HIT_BOX_RADIUS,
                ));
            }
        }
        for mob in self.mobs.values() {
            colliders.push(Collider::new(
                ColliderKind::Mob(mob.id),
                mob.x,
                mob.y,
                MOB_HIT_BOX_RADIUS,
            ));
        }
        for spell in self.spells.values() {
            colliders.push(Collider::new(
                ColliderKind::Spell {
                    id: spell.id,
                    caster: spell.caster_id,
                },
                spell.x,
                spell.y,
                SPELL_HIT_BOX_RADIUS,
            ));
        }
        for item in self.items.values() {
            colliders.push(Collider::new(
                ColliderKind::Item(item.id),
                item.x,
                item.y,
                ITEM_HIT_BOX_RADIUS,
            ));
        }
        for coin in self.coins.values() {
            colliders.push(Collider::new(
                ColliderKind::Coin(coin.id),
                coin.x,
                coin.y,
                COIN_HIT_BOX_RADIUS,
            ));
        }
        colliders
    }

    /// Directed overlap handling; called once per direction per pair
    fn handle_overlap(&mut self, subject: ColliderKind, other: ColliderKind) {
        match (subject, other) {
            (ColliderKind::Player(player), ColliderKind::Mob(_)) => {
                self.mob_contacts.insert(player);
            }
            (ColliderKind::Player(player), ColliderKind::Coin(coin)) => {
                if !self.pending.coin_pickups.iter().any(|(c, _)| *c == coin) {
                    self.pending.coin_pickups.push((coin, player));
                }
            }
            (ColliderKind::Spell { id, caster }, ColliderKind::Player(player)) => {
                if player != caster && !self.dead.contains(&player) {
                    if let Some(spell) = self.spells.get(&id) {
                        let damage = SpellProfile::for_kind(spell.kind).damage;
                        self.damage_player(player, damage);
                        self.remove_spell(id);
                    }
                }
            }
            (ColliderKind::Spell { id, .. }, ColliderKind::Mob(mob)) => {
                if let Some(spell) = self.spells.get(&id) {
                    let damage = SpellProfile::for_kind(spell.kind).damage as i32;
                    self.damage_mob(mob, damage);
                    self.remove_spell(id);
                }
            }
            _ => {}
        }
    }

    /// Drain every deferred queue in fixed order. Single pass: anything
    /// queued while flushing waits for the next tick.
    fn flush(&mut self) {
        let pending = std::mem::take(&mut self.pending);

        // 1. spell removals
        for id in pending.spell_removals {
            if self.spells.remove(&id).is_some() {
                let _ = self.event_tx.send(ServerMsg::Event {
                    event: GameEvent::SpellDispel { spell_id: id },
                });
            }
        }

        // 2. spell additions
        for spell in pending.spell_additions {
            self.spells.insert(spell.id, spell);
        }

        // 3. dead players: move to the dead set, scatter purse and
        //    inventory at the last position
        for id in pending.dead_players {
            if !self.dead.insert(id) {
                continue;
            }
            let Some(player) = self.players.get_mut(&id) else {
                continue;
            };
            let (x, y) = (player.x, player.y);
            let purse = player.coins;
            let inventory = player.take_inventory();
            self.mob_contacts.remove(&id);

            for _ in 0..purse {
                let (dx, dy) = self.scatter(COIN_DROP_RANGE);
                self.add_item(Some(id), ItemKind::Coin, x + dx, y + dy);
            }
            for item in inventory {
                let (dx, dy) = self.scatter(ITEM_DROP_RANGE);
                self.add_item(Some(id), item.kind, x + dx, y + dy);
            }
            let _ = self.event_tx.send(ServerMsg::Event {
                event: GameEvent::PlayerKilled { connection_id: id },
            });
        }

        // 4. mob removals: each drops its coin bounty
        for id in pending.mob_removals {
            if let Some(mob) = self.mobs.remove(&id) {
                for _ in 0..MOB_COIN_BOUNTY {
                    let (dx, dy) = self.scatter(COIN_DROP_RANGE);
                    self.add_item(None, ItemKind::Coin, mob.x + dx, mob.y + dy);
                }
            }
        }

        // 5. coin pickups
        for (coin_id, picker) in pending.coin_pickups {
            if self.dead.contains(&picker) {
                continue;
            }
            if self.coins.remove(&coin_id).is_some() {
                if let Some(player) = self.players.get_mut(&picker) {
                    player.add_coin();
                    let _ = self.event_tx.send(ServerMsg::Event {
                        event: GameEvent::CoinPickedUp {
                            connection_id: picker,
                            coin_id,
                        },
                    });
                }
            }
        }

        // 6. item pickups: rejected when the inventory is full, the item
        //    stays on the ground
        for (item_id, picker) in pending.item_pickups {
            if self.dead.contains(&picker) {
                continue;
            }
            let Some(player) = self.players.get_mut(&picker) else {
                continue;
            };
            if player.inventory().len() >= crate::game::constants::INVENTORY_CAPACITY {
                continue;
            }
            if let Some(item) = self.items.remove(&item_id) {
                let kind = item.kind;
                if player.pick_up_item(item) {
                    let _ = self.event_tx.send(ServerMsg::Event {
                        event: GameEvent::ItemPickedUp {
                            picker: Some(picker),
                            item_id,
                            kind,
                        },
                    });
                }
            }
        }

        // 7. item drops
        for (dropper, item) in pending.item_drops {
            let origin = dropper
                .and_then(|id| self.players.get(&id))
                .map(|p| (p.x, p.y))
                .unwrap_or((item.x, item.y));
            let (dx, dy) = self.scatter(ITEM_DROP_RANGE);
            self.add_item(dropper, item.kind, origin.0 + dx, origin.1 + dy);
        }
    }

    fn scatter(&mut self, range: f32) -> (f32, f32) {
        (
            self.rng.gen_range(-range..=range),
            self.rng.gen_range(-range..=range),
        )
    }

    /// Post-flush snapshot on the lossy stream
    fn broadcast_snapshot(&self) {
        let players = self
            .players
            .values()
            .map(|p| PlayerSnapshot {
                connection_id: p.connection_id,
                x: p.x,
                y: p.y,
                health: p.health,
                mana: p.mana,
                alive: !self.dead.contains(&p.connection_id),
                left_click: p.left_click,
                aim_x: p.aim_x,
                aim_y: p.aim_y,
            })
            .collect();
        let spells = self
            .spells
            .values()
            .map(|s| SpellSnapshot {
                spell_id: s.id,
                caster_id: s.caster_id,
                kind: s.kind,
                x: s.x,
                y: s.y,
            })
            .collect();
        let mobs = self
            .mobs
            .values()
            .map(|m| MobSnapshot {
                mob_id: m.id,
                x: m.x,
                y: m.y,
                health: m.health,
            })
            .collect();

        let _ = self.snapshot_tx.send(ServerMsg::Snapshot {
            tick: self.tick,
            zone: self.zone.status(),
            players,
            spells,
            mobs,
        });
    }

    /// Mark the match finished for the registry sweep
    pub fn mark_finished(&self) {
        self.finished.store(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
impl GameMatch {
    fn ready_all(&mut self) {
        let ids: Vec<ConnectionId> = self.players.keys().copied().collect();
        for id in ids {
            self.add_ready_player(id);
        }
    }

    fn player(&self, id: ConnectionId) -> &PlayerCharacter {
        &self.players[&id]
    }

    fn player_mut(&mut self, id: ConnectionId) -> &mut PlayerCharacter {
        self.players.get_mut(&id).unwrap()
    }

    fn is_dead(&self, id: ConnectionId) -> bool {
        self.dead.contains(&id)
    }

    fn spells_len(&self) -> usize {
        self.spells.len()
    }

    fn items_len(&self) -> usize {
        self.items.len()
    }

    fn world_item_ids(&self) -> Vec<EntityId> {
        self.items.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn two_player_match() -> (GameMatch, MatchHandle, ConnectionId, ConnectionId) {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let (mut m, handle) = GameMatch::new(Uuid::new_v4(), 7, &[a, b]);
        m.ready_all();
        (m, handle, a, b)
    }

    fn drain_events(rx: &mut broadcast::Receiver<ServerMsg>) -> Vec<ServerMsg> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    fn count_game_overs(events: &[ServerMsg]) -> usize {
        events
            .iter()
            .filter(|e| matches!(e, ServerMsg::Event { event: GameEvent::GameOver { .. } }))
            .count()
    }

    #[test]
    fn does_nothing_until_all_players_ready() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let (mut m, _handle) = GameMatch::new(Uuid::new_v4(), 1, &[a, b]);
        m.add_ready_player(a);
        let x = m.player(a).x;
        m.apply_command(
            a,
            ClientMsg::KeyPress {
                direction: crate::ws::protocol::MoveDirection::Right,
                pressed: true,
            },
        );
        m.tick();
        assert_eq!(m.player(a).x, x);
        m.add_ready_player(b);
        m.tick();
        assert!(m.player(a).x > x);
    }

    #[test]
    fn alive_plus_dead_always_equals_members() {
        let (mut m, _handle, a, _b) = two_player_match();
        m.damage_player(a, 500.0);
        for _ in 0..10 {
            m.tick();
            assert_eq!(m.alive_count() + m.dead.len(), m.players.len());
        }
        assert!(m.is_dead(a));
    }

    #[test]
    fn dead_player_is_never_damaged_or_dropped_again() {
        let (mut m, handle, a, _b) = two_player_match();
        let mut events = handle.event_tx.subscribe();
        m.player_mut(a).add_coin();
        m.player_mut(a)
            .pick_up_item(Item::new(900, ItemKind::Kunai, 0.0, 0.0));

        m.damage_player(a, 500.0);
        m.tick();
        assert!(m.is_dead(a));
        assert_eq!(m.player(a).health, 0.0);

        let first = drain_events(&mut events);
        let kills = first
            .iter()
            .filter(|e| matches!(e, ServerMsg::Event { event: GameEvent::PlayerKilled { .. } }))
            .count();
        let drops = first
            .iter()
            .filter(|e| matches!(e, ServerMsg::Event { event: GameEvent::ItemDropped { .. } }))
            .count();
        assert_eq!(kills, 1);
        // one coin, one inventory item
        assert_eq!(drops, 2);

        m.damage_player(a, 50.0);
        m.tick();
        assert_eq!(m.player(a).health, 0.0);
        let again = drain_events(&mut events);
        assert!(again.iter().all(|e| !matches!(
            e,
            ServerMsg::Event { event: GameEvent::PlayerKilled { .. } }
        )));
    }

    #[test]
    fn world_seeding_fires_exactly_once_at_the_threshold_tick() {
        let (mut m, handle, _a, _b) = two_player_match();
        let mut events = handle.event_tx.subscribe();

        for _ in 0..TICKS_TO_START_GAME - 1 {
            m.tick();
        }
        let before: Vec<_> = drain_events(&mut events);
        assert!(before
            .iter()
            .all(|e| !matches!(e, ServerMsg::ZoneGeometry { .. })));
        assert_eq!(m.items_len(), 0);

        m.tick();
        let at = drain_events(&mut events);
        assert_eq!(
            at.iter()
                .filter(|e| matches!(e, ServerMsg::ZoneGeometry { .. }))
                .count(),
            1
        );
        assert!(m.items_len() > 0);
        let item_count = m.items_len();

        for _ in 0..30 {
            m.tick();
        }
        let after = drain_events(&mut events);
        assert!(after
            .iter()
            .all(|e| !matches!(e, ServerMsg::ZoneGeometry { .. })));
        // No second seeding pass
        assert!(m.items_len() <= item_count);
    }

    #[test]
    fn game_over_fires_once_at_the_end_threshold_naming_the_survivor() {
        let (mut m, handle, a, b) = two_player_match();
        let mut events = handle.event_tx.subscribe();

        m.damage_player(a, 500.0);
        m.tick(); // flush moves a into the dead set
        assert!(m.is_dead(a));

        for _ in 0..TICKS_TO_END_GAME - 1 {
            m.tick();
        }
        assert_eq!(count_game_overs(&drain_events(&mut events)), 0);
        assert!(!m.finished());

        m.tick();
        let at = drain_events(&mut events);
        let winners: Vec<_> = at
            .iter()
            .filter_map(|e| match e {
                ServerMsg::Event {
                    event: GameEvent::GameOver { winner },
                } => Some(*winner),
                _ => None,
            })
            .collect();
        assert_eq!(winners, vec![Some(b)]);
        assert!(m.finished());

        for _ in 0..10 {
            m.tick();
        }
        assert_eq!(count_game_overs(&drain_events(&mut events)), 0);
    }

    #[test]
    fn death_scatters_purse_and_inventory_near_last_position() {
        let (mut m, handle, a, _b) = two_player_match();
        let mut events = handle.event_tx.subscribe();
        for _ in 0..3 {
            m.player_mut(a).add_coin();
        }
        m.player_mut(a)
            .pick_up_item(Item::new(901, ItemKind::Meteor, 0.0, 0.0));

        // whittle health down one hit per tick, as zone damage would
        while !m.is_dead(a) {
            m.damage_player(a, 5.0);
            m.tick();
        }
        let (last_x, last_y) = (m.player(a).x, m.player(a).y);

        let drops: Vec<(ItemKind, f32, f32)> = drain_events(&mut events)
            .iter()
            .filter_map(|e| match e {
                ServerMsg::Event {
                    event:
                        GameEvent::ItemDropped {
                            dropper: Some(d),
                            kind,
                            x,
                            y,
                            ..
                        },
                } if *d == a => Some((*kind, *x, *y)),
                _ => None,
            })
            .collect();
        assert_eq!(drops.len(), 4);
        assert_eq!(
            drops.iter().filter(|(k, _, _)| *k == ItemKind::Coin).count(),
            3
        );
        for (_, x, y) in drops {
            assert!((x - last_x).abs() <= COIN_DROP_RANGE);
            assert!((y - last_y).abs() <= COIN_DROP_RANGE);
        }
    }

    #[test]
    fn cast_without_mana_spawns_nothing_and_deducts_nothing() {
        let (mut m, _handle, a, _b) = two_player_match();
        m.player_mut(a)
            .pick_up_item(Item::new(902, ItemKind::Fireball, 0.0, 0.0));
        m.player_mut(a).mana = 10.0;

        m.apply_command(
            a,
            ClientMsg::MouseAim {
                left_click: true,
                x: 50.0,
                y: 50.0,
                kind: Some(ItemKind::Fireball),
                item_id: None,
            },
        );
        assert_eq!(m.player(a).mana, 10.0);
        m.tick();
        assert_eq!(m.spells_len(), 0);
    }

    #[test]
    fn cast_with_mana_spawns_spell_at_next_flush() {
        let (mut m, _handle, a, _b) = two_player_match();
        m.player_mut(a)
            .pick_up_item(Item::new(903, ItemKind::Plasma, 0.0, 0.0));

        m.apply_command(
            a,
            ClientMsg::MouseAim {
                left_click: true,
                x: 50.0,
                y: 50.0,
                kind: Some(ItemKind::Plasma),
                item_id: None,
            },
        );
        assert_eq!(m.spells_len(), 0);
        assert_eq!(m.player(a).mana, 100.0 - 15.0);
        m.tick();
        assert_eq!(m.spells_len(), 1);
    }

    #[test]
    fn cast_without_matching_tome_is_refused() {
        let (mut m, _handle, a, _b) = two_player_match();
        m.apply_command(
            a,
            ClientMsg::MouseAim {
                left_click: true,
                x: 50.0,
                y: 50.0,
                kind: Some(ItemKind::Kunai),
                item_id: None,
            },
        );
        m.tick();
        assert_eq!(m.spells_len(), 0);
        assert_eq!(m.player(a).mana, 100.0);
    }

    #[test]
    fn spell_leaving_the_world_is_dispelled_exactly_once() {
        let (mut m, handle, a, _b) = two_player_match();
        let mut events = handle.event_tx.subscribe();

        m.add_spell(a, SpellKind::Kunai, WORLD_MAX - 1.0, 150.0, WORLD_MAX + 100.0, 150.0);
        let mut dispels = 0;
        for _ in 0..60 {
            m.tick();
            dispels += drain_events(&mut events)
                .iter()
                .filter(|e| matches!(e, ServerMsg::Event { event: GameEvent::SpellDispel { .. } }))
                .count();
        }
        assert_eq!(dispels, 1);
        assert_eq!(m.spells_len(), 0);
    }

    #[test]
    fn drop_then_interact_round_trips_the_item() {
        let (mut m, handle, a, _b) = two_player_match();
        let mut events = handle.event_tx.subscribe();
        m.player_mut(a)
            .pick_up_item(Item::new(904, ItemKind::Kunai, 0.0, 0.0));

        m.apply_command(
            a,
            ClientMsg::Action {
                action: PlayerAction::Drop,
                item_id: Some(904),
            },
        );
        m.tick();
        assert_eq!(m.player(a).inventory().len(), 0);
        assert_eq!(m.items_len(), 1);
        let dropped = drain_events(&mut events);
        assert!(dropped
            .iter()
            .any(|e| matches!(e, ServerMsg::Event { event: GameEvent::ItemDropped { .. } })));

        m.apply_command(
            a,
            ClientMsg::Action {
                action: PlayerAction::Interact,
                item_id: None,
            },
        );
        let ground_id = m.world_item_ids()[0];
        m.tick();
        assert_eq!(m.items_len(), 0);
        assert!(m.player(a).has_item(ground_id));
        assert_eq!(m.player(a).inventory()[0].kind, ItemKind::Kunai);
        let picked = drain_events(&mut events);
        assert!(picked.iter().any(|e| matches!(
            e,
            ServerMsg::Event { event: GameEvent::ItemPickedUp { picker: Some(p), .. } } if *p == a
        )));
    }

    #[test]
    fn leaving_player_is_removed_and_count_updates() {
        let (mut m, handle, a, _b) = two_player_match();
        assert_eq!(handle.player_count(), 2);
        m.apply_command(a, ClientMsg::LeaveMatch);
        assert_eq!(handle.player_count(), 1);
        assert_eq!(m.alive_count(), 1);
    }

    #[test]
    fn unknown_ids_are_no_ops() {
        let (mut m, _handle, _a, _b) = two_player_match();
        let ghost = Uuid::new_v4();
        m.damage_player(ghost, 50.0);
        m.heal_player(ghost, 50.0);
        m.damage_mob(999, 10);
        m.remove_spell(999);
        m.tick();
        assert_eq!(m.alive_count(), 2);
    }

    #[test]
    fn stale_inputs_are_flagged_but_still_apply() {
        let (mut m, handle, a, _b) = two_player_match();
        let x = m.player(a).x;
        // received_at far in the past: well over the staleness threshold
        handle
            .input_tx
            .try_send(PlayerInput {
                connection_id: a,
                msg: ClientMsg::KeyPress {
                    direction: crate::ws::protocol::MoveDirection::Right,
                    pressed: true,
                },
                received_at: 0,
            })
            .unwrap();
        m.process_inputs();
        m.tick();
        assert!(m.player(a).x > x);
    }
}
