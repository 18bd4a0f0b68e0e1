//! Game objects owned by the map registry: creatures, players, seats, rooms,
//! traps, lights and missiles.

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockWriteGuard};

use serde::{Deserialize, Serialize};

use crate::behavior::CreatureBehavior;
use crate::types::*;

/// Template shared by every creature of one class.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CreatureClass {
    pub name: String,
    pub max_hp: i32,
    pub sight_radius: f64,
    pub dig_rate: f64,
    pub move_class: PassClass,
    /// Workers dig and claim; the dungeon temple spawns them.
    pub is_worker: bool,
}

impl CreatureClass {
    pub fn new(name: impl Into<String>, move_class: PassClass) -> Self {
        Self {
            name: name.into(),
            max_hp: 10,
            sight_radius: 8.0,
            dig_rate: 0.0,
            move_class,
            is_worker: false,
        }
    }

    pub fn worker(name: impl Into<String>) -> Self {
        Self { dig_rate: 25.0, is_worker: true, ..Self::new(name, PassClass::Walkable) }
    }
}

/// Per-creature state written by the creature's own turn.
#[derive(Clone, Debug, PartialEq)]
pub struct CreatureState {
    pub pos: Pos,
    pub hp: i32,
    pub max_hp: i32,
    pub walk_queue: VecDeque<Pos>,
    pub in_hand: bool,
    pub turns_taken: u64,
}

pub struct Creature {
    id: CreatureId,
    name: String,
    class_name: String,
    color: SeatColor,
    move_class: PassClass,
    sight_radius: f64,
    dig_rate: f64,
    state: RwLock<CreatureState>,
    behavior: Mutex<Box<dyn CreatureBehavior>>,
    queued_for_deletion: AtomicBool,
}

impl Creature {
    pub(crate) fn new(
        id: CreatureId,
        name: String,
        class: &CreatureClass,
        color: SeatColor,
        state: CreatureState,
        behavior: Box<dyn CreatureBehavior>,
    ) -> Self {
        Self {
            id,
            name,
            class_name: class.name.clone(),
            color,
            move_class: class.move_class,
            sight_radius: class.sight_radius,
            dig_rate: class.dig_rate,
            state: RwLock::new(state),
            behavior: Mutex::new(behavior),
            queued_for_deletion: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> CreatureId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn color(&self) -> SeatColor {
        self.color
    }

    pub fn move_class(&self) -> PassClass {
        self.move_class
    }

    pub fn sight_radius(&self) -> f64 {
        self.sight_radius
    }

    pub fn dig_rate(&self) -> f64 {
        self.dig_rate
    }

    /// Copy of the current state. A poisoned lock still yields the last
    /// written state.
    pub fn state(&self) -> CreatureState {
        self.state.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn pos(&self) -> Pos {
        self.state.read().unwrap_or_else(PoisonError::into_inner).pos
    }

    pub fn hp(&self) -> i32 {
        self.state.read().unwrap_or_else(PoisonError::into_inner).hp
    }

    pub fn is_alive(&self) -> bool {
        self.hp() > 0
    }

    pub fn is_in_hand(&self) -> bool {
        self.state.read().unwrap_or_else(PoisonError::into_inner).in_hand
    }

    pub fn is_queued_for_deletion(&self) -> bool {
        self.queued_for_deletion.load(Ordering::Acquire)
    }

    /// Write access to the creature state. Must not be held while querying
    /// other creatures through the map.
    pub fn state_mut(&self) -> RwLockWriteGuard<'_, CreatureState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn behavior(&self) -> MutexGuard<'_, Box<dyn CreatureBehavior>> {
        self.behavior.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns `true` only for the call that actually marked the creature.
    pub(crate) fn mark_for_deletion(&self) -> bool {
        !self.queued_for_deletion.swap(true, Ordering::AcqRel)
    }
}

impl fmt::Debug for Creature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Creature")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("class_name", &self.class_name)
            .field("color", &self.color)
            .field("state", &self.state())
            .field("queued_for_deletion", &self.is_queued_for_deletion())
            .finish_non_exhaustive()
    }
}

/// Request to add a creature to the map.
pub struct CreatureSpawn {
    pub name: String,
    pub class_name: String,
    pub color: SeatColor,
    pub pos: Pos,
    /// Defaults to the class maximum.
    pub hp: Option<i32>,
    /// Defaults to the behaviour matching the class.
    pub behavior: Option<Box<dyn CreatureBehavior>>,
}

impl CreatureSpawn {
    pub fn new(
        name: impl Into<String>,
        class_name: impl Into<String>,
        color: SeatColor,
        pos: Pos,
    ) -> Self {
        Self {
            name: name.into(),
            class_name: class_name.into(),
            color,
            pos,
            hp: None,
            behavior: None,
        }
    }

    pub fn with_hp(mut self, hp: i32) -> Self {
        self.hp = Some(hp);
        self
    }

    pub fn with_behavior(mut self, behavior: impl CreatureBehavior + 'static) -> Self {
        self.behavior = Some(Box::new(behavior));
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Goal {
    ClaimTiles(usize),
    MineGold(i64),
    ProtectDungeonTemple,
    KillAllEnemies,
}

impl Goal {
    pub fn name(&self) -> &'static str {
        match self {
            Goal::ClaimTiles(_) => "ClaimTiles",
            Goal::MineGold(_) => "MineGold",
            Goal::ProtectDungeonTemple => "ProtectDungeonTemple",
            Goal::KillAllEnemies => "KillAllEnemies",
        }
    }
}

impl fmt::Display for Goal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Goal::ClaimTiles(count) => write!(f, "{} {count}", self.name()),
            Goal::MineGold(amount) => write!(f, "{} {amount}", self.name()),
            Goal::ProtectDungeonTemple | Goal::KillAllEnemies => f.write_str(self.name()),
        }
    }
}

impl FromStr for Goal {
    type Err = ();

    /// Parses the `Display` form, e.g. `ClaimTiles 20`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split_whitespace();
        let goal = match parts.next().ok_or(())? {
            "ClaimTiles" => Goal::ClaimTiles(parts.next().ok_or(())?.parse().map_err(|_| ())?),
            "MineGold" => Goal::MineGold(parts.next().ok_or(())?.parse().map_err(|_| ())?),
            "ProtectDungeonTemple" => Goal::ProtectDungeonTemple,
            "KillAllEnemies" => Goal::KillAllEnemies,
            _ => return Err(()),
        };
        match parts.next() {
            Some(_) => Err(()),
            None => Ok(goal),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Seat {
    pub color: SeatColor,
    pub faction: String,
    pub starting: Pos,
    pub gold: i64,
    pub claimed_tiles: usize,
    pub goals: Vec<Goal>,
    pub completed_goals: Vec<Goal>,
    pub failed_goals: Vec<Goal>,
}

impl Seat {
    pub fn new(color: SeatColor, faction: impl Into<String>, starting: Pos) -> Self {
        Self {
            color,
            faction: faction.into(),
            starting,
            gold: 0,
            claimed_tiles: 0,
            goals: Vec::new(),
            completed_goals: Vec::new(),
            failed_goals: Vec::new(),
        }
    }

    pub fn has_won(&self) -> bool {
        self.goals.is_empty() && self.failed_goals.is_empty() && !self.completed_goals.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Player {
    pub nick: String,
    pub seat: Option<SeatId>,
    pub has_ai: bool,
    pub hand: Vec<CreatureId>,
    pub new_room_type: Option<RoomKind>,
    pub new_trap_type: Option<TrapKind>,
    /// Seconds left in which the player counts as fighting.
    pub fighting_time: f64,
}

impl Player {
    pub fn new(nick: impl Into<String>) -> Self {
        Self {
            nick: nick.into(),
            seat: None,
            has_ai: false,
            hand: Vec::new(),
            new_room_type: None,
            new_trap_type: None,
            fighting_time: 0.0,
        }
    }
}

/// Gold a treasury can hold per covered tile.
pub const TREASURY_CAPACITY_PER_TILE: i64 = 1000;

#[derive(Clone, Debug, PartialEq)]
pub struct Room {
    pub kind: RoomKind,
    pub color: SeatColor,
    pub tiles: Vec<Pos>,
    pub gold: i64,
    /// Turns until a dungeon temple produces its next worker.
    pub spawn_countdown: u32,
}

impl Room {
    pub fn new(kind: RoomKind, color: SeatColor, tiles: Vec<Pos>) -> Self {
        Self { kind, color, tiles, gold: 0, spawn_countdown: 0 }
    }

    pub fn capacity(&self) -> i64 {
        match self.kind {
            RoomKind::Treasury => TREASURY_CAPACITY_PER_TILE * self.tiles.len() as i64,
            _ => 0,
        }
    }

    /// Covered tile closest to the centroid; earliest tile wins ties.
    pub fn central_tile(&self) -> Option<Pos> {
        if self.tiles.is_empty() {
            return None;
        }
        let count = self.tiles.len() as f64;
        let cx = self.tiles.iter().map(|p| f64::from(p.x)).sum::<f64>() / count;
        let cy = self.tiles.iter().map(|p| f64::from(p.y)).sum::<f64>() / count;
        let mut best: Option<(f64, Pos)> = None;
        for &pos in &self.tiles {
            let dist = (f64::from(pos.x) - cx).hypot(f64::from(pos.y) - cy);
            if best.is_none_or(|(best_dist, _)| dist < best_dist) {
                best = Some((dist, pos));
            }
        }
        best.map(|(_, pos)| pos)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Trap {
    pub kind: TrapKind,
    pub color: SeatColor,
    pub tiles: Vec<Pos>,
    pub range: f64,
    pub damage: i32,
    pub reload_turns: u32,
    pub cooldown: u32,
}

impl Trap {
    pub fn new(kind: TrapKind, color: SeatColor, tiles: Vec<Pos>) -> Self {
        let (range, damage, reload_turns) = match kind {
            TrapKind::Cannon => (6.0, 4, 3),
            TrapKind::Spike => (0.0, 3, 2),
            TrapKind::Boulder => (8.0, 10, 12),
        };
        Self { kind, color, tiles, range, damage, reload_turns, cooldown: 0 }
    }

    /// Speed in tiles per turn of the missiles this trap fires.
    pub fn missile_speed(&self) -> f64 {
        match self.kind {
            TrapKind::Boulder => 0.5,
            TrapKind::Cannon | TrapKind::Spike => 1.5,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MapLight {
    pub name: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub diffuse: [f64; 3],
    pub attenuation: f64,
}

impl MapLight {
    pub fn new(name: impl Into<String>, x: f64, y: f64, z: f64) -> Self {
        Self { name: name.into(), x, y, z, diffuse: [1.0, 1.0, 1.0], attenuation: 1.0 }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MissileObject {
    pub color: SeatColor,
    pub x: f64,
    pub y: f64,
    pub destination: Pos,
    pub speed: f64,
    pub damage: i32,
}

impl MissileObject {
    pub fn new(color: SeatColor, from: Pos, destination: Pos, speed: f64, damage: i32) -> Self {
        Self { color, x: f64::from(from.x), y: f64::from(from.y), destination, speed, damage }
    }

    pub fn tile(&self) -> Pos {
        Pos { y: self.y.round() as i32, x: self.x.round() as i32 }
    }

    pub fn remaining_distance(&self) -> f64 {
        let dest = self.destination;
        (f64::from(dest.x) - self.x).hypot(f64::from(dest.y) - self.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn goal_text_parses_back() {
        for goal in [
            Goal::ClaimTiles(12),
            Goal::MineGold(300),
            Goal::ProtectDungeonTemple,
            Goal::KillAllEnemies,
        ] {
            assert_eq!(goal.to_string().parse::<Goal>(), Ok(goal));
        }
        assert!("ClaimTiles".parse::<Goal>().is_err());
        assert!("MineGold ten".parse::<Goal>().is_err());
        assert!("KillAllEnemies now".parse::<Goal>().is_err());
    }

    #[test]
    fn central_tile_prefers_the_middle() {
        let tiles = (0..3).flat_map(|y| (0..3).map(move |x| Pos::new(x, y))).collect();
        let room = Room::new(RoomKind::DungeonTemple, 1, tiles);
        assert_eq!(room.central_tile(), Some(Pos::new(1, 1)));
        assert_eq!(Room::new(RoomKind::Quarters, 1, Vec::new()).central_tile(), None);
    }

    #[test]
    fn treasury_capacity_scales_with_tiles() {
        let room = Room::new(RoomKind::Treasury, 2, vec![Pos::new(0, 0), Pos::new(1, 0)]);
        assert_eq!(room.capacity(), 2 * TREASURY_CAPACITY_PER_TILE);
        assert_eq!(Room::new(RoomKind::Quarters, 2, vec![Pos::new(0, 0)]).capacity(), 0);
    }

    #[test]
    fn seat_wins_only_with_all_goals_completed() {
        let mut seat = Seat::new(1, "Keeper", Pos::new(0, 0));
        assert!(!seat.has_won());
        seat.completed_goals.push(Goal::MineGold(10));
        assert!(seat.has_won());
        seat.failed_goals.push(Goal::ProtectDungeonTemple);
        assert!(!seat.has_won());
    }
}
