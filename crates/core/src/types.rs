use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use slotmap::new_key_type;
use thiserror::Error;

new_key_type! {
    pub struct CreatureId;
    pub struct PlayerId;
    pub struct SeatId;
    pub struct RoomId;
    pub struct TrapId;
    pub struct LightId;
    pub struct MissileId;
}

/// Team colour of a seat, creature, room or trap.
pub type SeatColor = i32;

/// Connected-component label written by the flood fill.
pub type FloodColor = u32;

/// Colour carried by creatures that belong to no seat.
pub const NEUTRAL_COLOR: SeatColor = 0;

/// Flood colour of a tile the flood fill has not reached.
pub const NO_FLOOD_COLOR: FloodColor = 0;

/// Fullness above which a tile blocks sight.
pub const OPAQUE_FULLNESS: f64 = 25.0;

pub const MAX_FULLNESS: f64 = 100.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Pos {
    pub y: i32,
    pub x: i32,
}

impl Pos {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { y, x }
    }
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TileKind {
    Dirt,
    Gold,
    Rock,
    Water,
    Lava,
    Claimed,
}

impl TileKind {
    pub const ALL: [TileKind; 6] = [
        TileKind::Dirt,
        TileKind::Gold,
        TileKind::Rock,
        TileKind::Water,
        TileKind::Lava,
        TileKind::Claimed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TileKind::Dirt => "Dirt",
            TileKind::Gold => "Gold",
            TileKind::Rock => "Rock",
            TileKind::Water => "Water",
            TileKind::Lava => "Lava",
            TileKind::Claimed => "Claimed",
        }
    }
}

impl FromStr for TileKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TileKind::ALL.into_iter().find(|kind| kind.as_str() == s).ok_or(())
    }
}

/// What kind of movement a tile currently allows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Passability {
    Walkable,
    Flyable,
    Diggable,
    Impassable,
}

impl Passability {
    pub fn permits(self, class: PassClass) -> bool {
        match class {
            PassClass::Walkable => self == Passability::Walkable,
            PassClass::Flyable => matches!(self, Passability::Walkable | Passability::Flyable),
            PassClass::Diggable => matches!(self, Passability::Walkable | Passability::Diggable),
        }
    }
}

/// Movement class of a creature, used to ask whether a tile may be traversed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PassClass {
    Walkable,
    Flyable,
    Diggable,
}

impl PassClass {
    pub const COUNT: usize = 3;
    pub const ALL: [PassClass; PassClass::COUNT] =
        [PassClass::Walkable, PassClass::Flyable, PassClass::Diggable];

    pub fn index(self) -> usize {
        match self {
            PassClass::Walkable => 0,
            PassClass::Flyable => 1,
            PassClass::Diggable => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PassClass::Walkable => "Walk",
            PassClass::Flyable => "Fly",
            PassClass::Diggable => "Dig",
        }
    }
}

impl FromStr for PassClass {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PassClass::ALL.into_iter().find(|class| class.as_str() == s).ok_or(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RoomKind {
    DungeonTemple,
    Quarters,
    Treasury,
    Portal,
}

impl RoomKind {
    pub const ALL: [RoomKind; 4] =
        [RoomKind::DungeonTemple, RoomKind::Quarters, RoomKind::Treasury, RoomKind::Portal];

    pub fn as_str(self) -> &'static str {
        match self {
            RoomKind::DungeonTemple => "DungeonTemple",
            RoomKind::Quarters => "Quarters",
            RoomKind::Treasury => "Treasury",
            RoomKind::Portal => "Portal",
        }
    }
}

impl FromStr for RoomKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RoomKind::ALL.into_iter().find(|kind| kind.as_str() == s).ok_or(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TrapKind {
    Cannon,
    Spike,
    Boulder,
}

impl TrapKind {
    pub const ALL: [TrapKind; 3] = [TrapKind::Cannon, TrapKind::Spike, TrapKind::Boulder];

    pub fn as_str(self) -> &'static str {
        match self {
            TrapKind::Cannon => "Cannon",
            TrapKind::Spike => "Spike",
            TrapKind::Boulder => "Boulder",
        }
    }
}

impl FromStr for TrapKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TrapKind::ALL.into_iter().find(|kind| kind.as_str() == s).ok_or(())
    }
}

/// Objects that receive a tick during upkeep.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ActiveRef {
    Room(RoomId),
    Trap(TrapId),
    Missile(MissileId),
}

/// Structural map change requested by a creature or an AI during a turn and
/// applied serially during upkeep.
#[derive(Clone, Debug, PartialEq)]
pub enum MapCommand {
    Dig { pos: Pos, amount: f64, color: SeatColor },
    Claim { pos: Pos, color: SeatColor },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GameError {
    #[error("a tile already exists at ({x}, {y})")]
    TileExists { x: i32, y: i32 },
    #[error("no tile exists at ({x}, {y})")]
    TileMissing { x: i32, y: i32 },
    #[error("tile ({x}, {y}) is already covered by a room or trap")]
    TileCovered { x: i32, y: i32 },
    #[error("the name `{name}` is already in use")]
    DuplicateName { name: String },
    #[error("unknown creature class `{name}`")]
    UnknownCreatureClass { name: String },
    #[error("unknown creature")]
    UnknownCreature,
    #[error("unknown AI type `{name}`")]
    UnknownAiType { name: String },
    #[error("unknown player")]
    UnknownPlayer,
    #[error("no empty seat is available")]
    NoEmptySeat,
    #[error("no creature at hand index {index}")]
    HandIndexOutOfRange { index: usize },
    #[error("creature is already held in a hand")]
    AlreadyInHand,
    #[error("cannot drop a creature at ({x}, {y})")]
    InvalidDrop { x: i32, y: i32 },
}

/// Failure reported by a single creature turn. It never aborts the turn of
/// any other creature.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TurnError {
    #[error("behaviour failed: {reason}")]
    Behavior { reason: String },
    #[error("creature is stuck at ({x}, {y})")]
    Stuck { x: i32, y: i32 },
}
