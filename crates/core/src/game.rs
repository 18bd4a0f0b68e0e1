//! The simulation context that owns the tile grid, the object registry, the
//! player AIs and the turn clock.
//! Every subsystem receives a reference to a `GameMap`; there is no global map.

use std::collections::BTreeMap;
use std::mem;
use std::sync::Arc;

use tracing::{debug, info};

use crate::ai::{AiManager, PlayerAi};
use crate::behavior;
use crate::config::EngineConfig;
use crate::entities::*;
use crate::grid::{Tile, TileGrid};
use crate::registry::EntityRegistry;
use crate::types::*;

mod flood_fill;
mod pathfinding;
mod players;
mod scheduler;
mod snapshot;
mod turn_lock;
mod upkeep;
mod visibility;

#[cfg(test)]
pub(crate) mod test_support;

use flood_fill::FloodFill;
use pathfinding::PathStats;

pub use pathfinding::PathCounters;
pub use scheduler::{TurnClock, TurnPhase, TurnReport};
pub use snapshot::{CreatureSnapshot, RoomSnapshot, SeatSnapshot, TileSnapshot, TurnSnapshot};
pub use turn_lock::{TurnLockGuard, TurnLocks};

pub struct GameMap {
    config: EngineConfig,
    seed: u64,
    grid: TileGrid,
    flood: FloodFill,
    registry: EntityRegistry,
    ai_manager: AiManager,
    clock: Arc<TurnClock>,
    turn_locks: Arc<TurnLocks>,
    /// Creatures removed during a turn, kept alive until no render lock
    /// holds that turn any more.
    graveyard: BTreeMap<u64, Vec<Arc<Creature>>>,
    /// Deletions requested outside the worker phase.
    pending_deletions: Vec<CreatureId>,
    stats: PathStats,
    next_level: String,
    spawn_serial: u64,
}

impl Default for GameMap {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl GameMap {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            seed: 0,
            grid: TileGrid::new(),
            flood: FloodFill::new(),
            registry: EntityRegistry::default(),
            ai_manager: AiManager::default(),
            clock: Arc::new(TurnClock::new()),
            turn_locks: Arc::new(TurnLocks::default()),
            graveyard: BTreeMap::new(),
            pending_deletions: Vec::new(),
            stats: PathStats::default(),
            next_level: String::new(),
            spawn_serial: 0,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn set_seed(&mut self, seed: u64) {
        self.seed = seed;
    }

    pub fn max_ai_threads(&self) -> usize {
        self.config.max_ai_threads
    }

    pub fn set_max_ai_threads(&mut self, threads: usize) {
        self.config.max_ai_threads = threads.max(1);
    }

    pub fn grid(&self) -> &TileGrid {
        &self.grid
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    pub fn ai_manager(&self) -> &AiManager {
        &self.ai_manager
    }

    pub fn ai_manager_mut(&mut self) -> &mut AiManager {
        &mut self.ai_manager
    }

    pub fn turn_clock(&self) -> Arc<TurnClock> {
        Arc::clone(&self.clock)
    }

    pub fn turn_locks(&self) -> Arc<TurnLocks> {
        Arc::clone(&self.turn_locks)
    }

    pub fn current_turn(&self) -> u64 {
        self.clock.current_turn()
    }

    pub fn next_level(&self) -> &str {
        &self.next_level
    }

    pub fn set_next_level(&mut self, name: impl Into<String>) {
        self.next_level = name.into();
    }

    pub fn clear_all(&mut self) {
        self.clear_creatures();
        self.clear_classes();
        self.clear_players();
        self.clear_rooms();
        self.clear_traps();
        self.clear_map_lights();
        self.clear_missile_objects();
        self.clear_empty_seats();
        self.clear_filled_seats();
        self.clear_goals_for_all_seats();
        self.clear_tiles();
        self.next_level.clear();
    }

    // Tiles

    /// Replaces the grid with `width` x `height` full dirt tiles.
    pub fn create_new_map(&mut self, width: i32, height: i32) -> Result<(), GameError> {
        self.clear_tiles();
        let was_enabled = self.flood.is_enabled();
        self.flood.disable();
        for y in 0..height {
            for x in 0..width {
                self.grid.add(Tile::new(x, y, TileKind::Dirt, MAX_FULLNESS))?;
            }
        }
        if was_enabled {
            self.flood.enable(&mut self.grid);
        }
        info!(width, height, "created new map");
        Ok(())
    }

    pub fn add_tile(&mut self, tile: Tile) -> Result<(), GameError> {
        let pos = tile.pos();
        self.grid.add(tile)?;
        self.flood.refresh_added(&mut self.grid, pos);
        Ok(())
    }

    pub fn clear_tiles(&mut self) {
        self.grid.clear();
    }

    pub fn get_tile(&self, x: i32, y: i32) -> Option<&Tile> {
        self.grid.get(x, y)
    }

    pub fn num_tiles(&self) -> usize {
        self.grid.len()
    }

    /// Removes `amount` fullness from a tile. Gold that is dug out leaves a
    /// dirt floor behind. Returns the new fullness.
    pub fn dig(&mut self, pos: Pos, amount: f64) -> Option<f64> {
        self.update_tile(pos, |tile| {
            tile.set_fullness(tile.fullness() - amount.max(0.0));
            if tile.fullness() == 0.0 && tile.kind() == TileKind::Gold {
                tile.set_kind(TileKind::Dirt);
            }
            tile.fullness()
        })
    }

    /// Claims a floor tile for a seat colour. Walls and tiles already owned
    /// by that colour are left alone.
    pub fn claim_tile(&mut self, pos: Pos, color: SeatColor) -> bool {
        let claimable = self.grid.get_pos(pos).is_some_and(|tile| {
            tile.fullness() == 0.0
                && matches!(tile.kind(), TileKind::Dirt | TileKind::Claimed)
                && tile.color() != Some(color)
        });
        if !claimable {
            return false;
        }
        self.update_tile(pos, |tile| {
            tile.set_kind(TileKind::Claimed);
            tile.set_color(Some(color));
        })
        .is_some()
    }

    pub fn set_tile_kind(
        &mut self,
        pos: Pos,
        kind: TileKind,
        fullness: f64,
    ) -> Result<(), GameError> {
        self.update_tile(pos, |tile| {
            tile.set_kind(kind);
            tile.set_fullness(fullness);
            if kind != TileKind::Claimed {
                tile.set_color(None);
            }
        })
        .ok_or(GameError::TileMissing { x: pos.x, y: pos.y })
    }

    /// Applies a tile mutation and refreshes flood colours for every class
    /// whose membership changed.
    fn update_tile<R>(&mut self, pos: Pos, mutate: impl FnOnce(&mut Tile) -> R) -> Option<R> {
        let tile = self.grid.get_mut(pos)?;
        let before = tile.passability();
        let result = mutate(tile);
        let after = tile.passability();
        if before != after {
            self.flood.refresh_changed(&mut self.grid, pos, before);
        }
        Some(result)
    }

    // Creatures

    pub fn add_creature(&mut self, spawn: CreatureSpawn) -> Result<CreatureId, GameError> {
        if self.registry.creature(&spawn.name).is_some() {
            return Err(GameError::DuplicateName { name: spawn.name });
        }
        let class = self
            .registry
            .class_description(&spawn.class_name)
            .ok_or_else(|| GameError::UnknownCreatureClass { name: spawn.class_name.clone() })?
            .clone();
        let hp = spawn.hp.unwrap_or(class.max_hp);
        let state = CreatureState {
            pos: spawn.pos,
            hp,
            max_hp: class.max_hp,
            walk_queue: Default::default(),
            in_hand: false,
            turns_taken: 0,
        };
        let behavior = spawn.behavior.unwrap_or_else(|| behavior::for_class(&class));
        let name = spawn.name;
        let color = spawn.color;
        let id = self
            .registry
            .creatures
            .insert_with_key(|id| {
                Arc::new(Creature::new(id, name, &class, color, state, behavior))
            });
        Ok(id)
    }

    /// Removes a creature immediately. Only valid outside the worker phase.
    pub fn remove_creature(&mut self, id: CreatureId) -> Option<Arc<Creature>> {
        let creature = self.registry.creatures.remove(id)?;
        for player in self.registry.players.values_mut() {
            player.hand.retain(|held| *held != id);
        }
        Some(creature)
    }

    /// Serial counterpart of `TurnContext::queue_for_deletion`.
    pub fn queue_creature_for_deletion(&mut self, id: CreatureId) -> bool {
        let Some(creature) = self.registry.creature_by_id(id) else {
            return false;
        };
        if !creature.mark_for_deletion() {
            return false;
        }
        self.pending_deletions.push(id);
        true
    }

    pub fn clear_creatures(&mut self) {
        self.registry.creatures.clear();
        self.pending_deletions.clear();
        for player in self.registry.players.values_mut() {
            player.hand.clear();
        }
    }

    /// Picks a creature name of the form `<class>_<n>` that is not in use.
    pub(crate) fn unique_creature_name(&mut self, class_name: &str) -> String {
        loop {
            self.spawn_serial += 1;
            let name = format!("{class_name}_{}", self.spawn_serial);
            if self.registry.creature(&name).is_none() {
                return name;
            }
        }
    }

    // Classes

    pub fn add_class_description(&mut self, class: CreatureClass) -> Result<(), GameError> {
        if self.registry.class_description(&class.name).is_some() {
            return Err(GameError::DuplicateName { name: class.name });
        }
        self.registry.classes.push(class);
        Ok(())
    }

    pub fn clear_classes(&mut self) {
        self.registry.classes.clear();
    }

    // Players and AI

    /// Seats a new player in the first empty seat.
    pub fn add_player(&mut self, mut player: Player) -> Result<PlayerId, GameError> {
        if self.registry.player_by_nick(&player.nick).is_some() {
            return Err(GameError::DuplicateName { name: player.nick });
        }
        let seat = self.pop_empty_seat().ok_or(GameError::NoEmptySeat)?;
        self.registry.filled_seats.push(seat);
        player.seat = Some(seat);
        info!(nick = %player.nick, "player joined");
        Ok(self.registry.players.insert(player))
    }

    pub fn assign_ai(
        &mut self,
        player: PlayerId,
        ai_type: &str,
        params: &str,
    ) -> Result<(), GameError> {
        if self.registry.player(player).is_none() {
            return Err(GameError::UnknownPlayer);
        }
        let ai: Box<dyn PlayerAi> =
            self.ai_manager.factory().create(self, player, ai_type, params)?;
        self.ai_manager.assign(player, ai_type, ai);
        if let Some(entry) = self.registry.players.get_mut(player) {
            entry.has_ai = true;
        }
        Ok(())
    }

    pub fn player_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.registry.players.get_mut(id)
    }

    pub fn clear_players(&mut self) {
        self.registry.players.clear();
        self.ai_manager.clear();
    }

    // Seats and goals

    pub fn add_empty_seat(&mut self, seat: Seat) -> SeatId {
        let id = self.registry.seats.insert(seat);
        self.registry.empty_seats.push(id);
        id
    }

    /// Registers an occupied seat, giving it the goals shared by all seats.
    pub fn add_filled_seat(&mut self, mut seat: Seat) -> SeatId {
        seat.goals.extend(self.registry.goals_for_all_seats.iter().cloned());
        let id = self.registry.seats.insert(seat);
        self.registry.filled_seats.push(id);
        id
    }

    /// Takes the first empty seat out of the empty list and hands it the
    /// goals shared by all seats.
    pub fn pop_empty_seat(&mut self) -> Option<SeatId> {
        if self.registry.empty_seats.is_empty() {
            return None;
        }
        let id = self.registry.empty_seats.remove(0);
        let shared = self.registry.goals_for_all_seats.clone();
        if let Some(seat) = self.registry.seats.get_mut(id) {
            seat.goals.extend(shared);
        }
        Some(id)
    }

    pub fn seat_mut(&mut self, id: SeatId) -> Option<&mut Seat> {
        self.registry.seats.get_mut(id)
    }

    pub fn add_winning_seat(&mut self, id: SeatId) {
        if !self.registry.winning_seats.contains(&id) {
            self.registry.winning_seats.push(id);
        }
    }

    pub fn clear_empty_seats(&mut self) {
        let empty = mem::take(&mut self.registry.empty_seats);
        for id in empty {
            self.registry.seats.remove(id);
        }
    }

    pub fn clear_filled_seats(&mut self) {
        let filled = mem::take(&mut self.registry.filled_seats);
        for id in filled {
            self.registry.seats.remove(id);
        }
        self.registry.winning_seats.clear();
    }

    /// Adds a goal for every seat, including those already filled.
    pub fn add_goal_for_all_seats(&mut self, goal: Goal) {
        for id in self.registry.filled_seats.clone() {
            if let Some(seat) = self.registry.seats.get_mut(id) {
                seat.goals.push(goal.clone());
            }
        }
        self.registry.goals_for_all_seats.push(goal);
    }

    pub fn clear_goals_for_all_seats(&mut self) {
        self.registry.goals_for_all_seats.clear();
    }

    // Rooms and traps

    /// Registers a room over existing, uncovered tiles. Nothing changes
    /// when any tile is missing or already covered.
    pub fn add_room(&mut self, mut room: Room) -> Result<RoomId, GameError> {
        self.check_coverable(&room.tiles)?;
        if room.kind == RoomKind::DungeonTemple && room.spawn_countdown == 0 {
            room.spawn_countdown = self.config.temple_spawn_turns;
        }
        let tiles = room.tiles.clone();
        let id = self.registry.rooms.insert(room);
        for pos in tiles {
            if let Some(tile) = self.grid.get_mut(pos) {
                tile.set_room(Some(id));
            }
        }
        self.registry.active_objects.push(ActiveRef::Room(id));
        Ok(id)
    }

    pub fn remove_room(&mut self, id: RoomId) -> Option<Room> {
        let room = self.registry.rooms.remove(id)?;
        for pos in &room.tiles {
            if let Some(tile) = self.grid.get_mut(*pos) {
                tile.set_room(None);
            }
        }
        self.registry.remove_active_object(ActiveRef::Room(id));
        Some(room)
    }

    pub fn room_mut(&mut self, id: RoomId) -> Option<&mut Room> {
        self.registry.rooms.get_mut(id)
    }

    pub fn clear_rooms(&mut self) {
        for id in self.registry.rooms.keys().to_vec() {
            self.remove_room(id);
        }
    }

    pub fn add_trap(&mut self, trap: Trap) -> Result<TrapId, GameError> {
        self.check_coverable(&trap.tiles)?;
        let tiles = trap.tiles.clone();
        let id = self.registry.traps.insert(trap);
        for pos in tiles {
            if let Some(tile) = self.grid.get_mut(pos) {
                tile.set_trap(Some(id));
            }
        }
        self.registry.active_objects.push(ActiveRef::Trap(id));
        Ok(id)
    }

    pub fn remove_trap(&mut self, id: TrapId) -> Option<Trap> {
        let trap = self.registry.traps.remove(id)?;
        for pos in &trap.tiles {
            if let Some(tile) = self.grid.get_mut(*pos) {
                tile.set_trap(None);
            }
        }
        self.registry.remove_active_object(ActiveRef::Trap(id));
        Some(trap)
    }

    pub fn clear_traps(&mut self) {
        for id in self.registry.traps.keys().to_vec() {
            self.remove_trap(id);
        }
    }

    fn check_coverable(&self, tiles: &[Pos]) -> Result<(), GameError> {
        for (index, pos) in tiles.iter().enumerate() {
            let tile =
                self.grid.get_pos(*pos).ok_or(GameError::TileMissing { x: pos.x, y: pos.y })?;
            if tile.is_covered() || tiles[..index].contains(pos) {
                return Err(GameError::TileCovered { x: pos.x, y: pos.y });
            }
        }
        Ok(())
    }

    // Lights and missiles

    pub fn add_map_light(&mut self, light: MapLight) -> Result<LightId, GameError> {
        if self.registry.map_light(&light.name).is_some() {
            return Err(GameError::DuplicateName { name: light.name });
        }
        Ok(self.registry.lights.insert(light))
    }

    pub fn remove_map_light(&mut self, name: &str) -> Option<MapLight> {
        let (id, _) = self.registry.map_light(name)?;
        self.registry.lights.remove(id)
    }

    pub fn clear_map_lights(&mut self) {
        self.registry.lights.clear();
    }

    /// New missiles start ticking once the current upkeep has finished.
    pub fn add_missile_object(&mut self, missile: MissileObject) -> MissileId {
        let id = self.registry.missiles.insert(missile);
        self.registry.new_active_objects.push_back(ActiveRef::Missile(id));
        id
    }

    pub fn remove_missile_object(&mut self, id: MissileId) -> Option<MissileObject> {
        let missile = self.registry.missiles.remove(id)?;
        self.registry.remove_active_object(ActiveRef::Missile(id));
        Some(missile)
    }

    pub fn clear_missile_objects(&mut self) {
        for id in self.registry.missiles.keys().to_vec() {
            self.remove_missile_object(id);
        }
    }

    // Treasury

    pub fn withdraw_from_treasuries(&mut self, amount: i64, color: SeatColor) -> i64 {
        let taken = self.registry.withdraw_from_treasuries(amount, color);
        debug!(amount, taken, color, "treasury withdrawal");
        taken
    }

    pub fn deposit_gold(&mut self, amount: i64, color: SeatColor) -> i64 {
        self.registry.deposit_gold(amount, color)
    }
}
