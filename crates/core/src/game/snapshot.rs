//! Read-only copies of the map for renderers, tools and determinism checks.

use std::hash::Hasher;

use serde::Serialize;
use xxhash_rust::xxh3::Xxh3;

use super::*;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TileSnapshot {
    pub x: i32,
    pub y: i32,
    pub kind: TileKind,
    pub fullness: f64,
    pub color: Option<SeatColor>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CreatureSnapshot {
    pub name: String,
    pub class_name: String,
    pub color: SeatColor,
    pub x: i32,
    pub y: i32,
    pub hp: i32,
    pub in_hand: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RoomSnapshot {
    pub kind: RoomKind,
    pub color: SeatColor,
    pub tiles: Vec<Pos>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SeatSnapshot {
    pub color: SeatColor,
    pub gold: i64,
    pub claimed_tiles: usize,
    pub winner: bool,
}

/// The map as it stood at the start of `turn`. A locked snapshot keeps the
/// turn's deleted creatures from being reclaimed until it is dropped.
#[derive(Clone, Debug, Serialize)]
pub struct TurnSnapshot {
    pub turn: u64,
    pub tiles: Vec<TileSnapshot>,
    pub creatures: Vec<CreatureSnapshot>,
    pub rooms: Vec<RoomSnapshot>,
    pub seats: Vec<SeatSnapshot>,
    #[serde(skip)]
    lock: Option<TurnLockGuard>,
}

impl TurnSnapshot {
    pub fn is_locked(&self) -> bool {
        self.lock.is_some()
    }

    pub fn creature(&self, name: &str) -> Option<&CreatureSnapshot> {
        self.creatures.iter().find(|creature| creature.name == name)
    }
}

impl GameMap {
    pub fn snapshot(&self) -> TurnSnapshot {
        let tiles = self
            .grid
            .iter()
            .map(|tile| TileSnapshot {
                x: tile.x(),
                y: tile.y(),
                kind: tile.kind(),
                fullness: tile.fullness(),
                color: tile.color(),
            })
            .collect();
        let creatures = self
            .registry
            .creatures()
            .map(|creature| {
                let state = creature.state();
                CreatureSnapshot {
                    name: creature.name().to_owned(),
                    class_name: creature.class_name().to_owned(),
                    color: creature.color(),
                    x: state.pos.x,
                    y: state.pos.y,
                    hp: state.hp,
                    in_hand: state.in_hand,
                }
            })
            .collect();
        let rooms = self
            .registry
            .rooms()
            .map(|(_, room)| RoomSnapshot {
                kind: room.kind,
                color: room.color,
                tiles: room.tiles.clone(),
            })
            .collect();
        let seats = self
            .registry
            .seats()
            .map(|(id, seat)| SeatSnapshot {
                color: seat.color,
                gold: seat.gold,
                claimed_tiles: seat.claimed_tiles,
                winner: self.registry.seat_is_a_winner(id),
            })
            .collect();
        TurnSnapshot { turn: self.current_turn(), tiles, creatures, rooms, seats, lock: None }
    }

    /// Snapshot holding a render lock on the current turn.
    pub fn snapshot_locked(&self) -> TurnSnapshot {
        let lock = self.turn_locks.lock(self.current_turn());
        TurnSnapshot { lock: Some(lock), ..self.snapshot() }
    }

    /// Stable hash of everything the simulation decides: tiles, creatures,
    /// rooms and seat standings.
    pub fn snapshot_hash(&self) -> u64 {
        let mut hasher = Xxh3::new();
        hasher.write_u64(self.current_turn());
        for tile in self.grid.iter() {
            hasher.write_i32(tile.x());
            hasher.write_i32(tile.y());
            hasher.write(tile.kind().as_str().as_bytes());
            hasher.write_u64(tile.fullness().to_bits());
            hasher.write_i32(tile.color().unwrap_or(NEUTRAL_COLOR));
        }
        for creature in self.registry.creatures() {
            let state = creature.state();
            hasher.write(creature.name().as_bytes());
            hasher.write_i32(creature.color());
            hasher.write_i32(state.pos.x);
            hasher.write_i32(state.pos.y);
            hasher.write_i32(state.hp);
            hasher.write_u8(u8::from(state.in_hand));
        }
        for (_, room) in self.registry.rooms() {
            hasher.write(room.kind.as_str().as_bytes());
            hasher.write_i32(room.color);
            hasher.write_usize(room.tiles.len());
        }
        for (id, seat) in self.registry.seats() {
            hasher.write_i32(seat.color);
            hasher.write_i64(seat.gold);
            hasher.write_usize(seat.claimed_tiles);
            hasher.write_u8(u8::from(self.registry.seat_is_a_winner(id)));
        }
        hasher.finish()
    }
}
