//! Tile storage keyed by map coordinates plus spatial queries over it.
//! Queries are pure reads so creature turns can share the grid across threads.

use std::collections::{BTreeMap, BTreeSet};

use crate::types::*;

/// Offsets in N, E, S, W order. North is `y - 1`.
const CARDINALS: [(i32, i32); 4] = [(0, -1), (1, 0), (0, 1), (-1, 0)];

pub(crate) fn neighbors(p: Pos) -> [Pos; 4] {
    CARDINALS.map(|(dx, dy)| Pos { y: p.y + dy, x: p.x + dx })
}

#[derive(Clone, Debug, PartialEq)]
pub struct Tile {
    pos: Pos,
    kind: TileKind,
    fullness: f64,
    color: Option<SeatColor>,
    room: Option<RoomId>,
    trap: Option<TrapId>,
    flood_colors: [FloodColor; PassClass::COUNT],
}

impl Tile {
    pub fn new(x: i32, y: i32, kind: TileKind, fullness: f64) -> Self {
        Self {
            pos: Pos { y, x },
            kind,
            fullness: fullness.clamp(0.0, MAX_FULLNESS),
            color: None,
            room: None,
            trap: None,
            flood_colors: [NO_FLOOD_COLOR; PassClass::COUNT],
        }
    }

    pub fn pos(&self) -> Pos {
        self.pos
    }

    pub fn x(&self) -> i32 {
        self.pos.x
    }

    pub fn y(&self) -> i32 {
        self.pos.y
    }

    pub fn kind(&self) -> TileKind {
        self.kind
    }

    pub fn fullness(&self) -> f64 {
        self.fullness
    }

    /// Seat colour that claimed this tile, if any.
    pub fn color(&self) -> Option<SeatColor> {
        self.color
    }

    pub fn room(&self) -> Option<RoomId> {
        self.room
    }

    pub fn trap(&self) -> Option<TrapId> {
        self.trap
    }

    pub fn is_covered(&self) -> bool {
        self.room.is_some() || self.trap.is_some()
    }

    pub fn passability(&self) -> Passability {
        if self.fullness > 0.0 {
            return match self.kind {
                TileKind::Dirt | TileKind::Gold | TileKind::Claimed => Passability::Diggable,
                TileKind::Rock | TileKind::Water | TileKind::Lava => Passability::Impassable,
            };
        }
        match self.kind {
            TileKind::Rock => Passability::Impassable,
            TileKind::Water | TileKind::Lava => Passability::Flyable,
            TileKind::Dirt | TileKind::Gold | TileKind::Claimed => Passability::Walkable,
        }
    }

    pub fn permits(&self, class: PassClass) -> bool {
        self.passability().permits(class)
    }

    pub fn is_opaque(&self) -> bool {
        self.kind == TileKind::Rock || self.fullness > OPAQUE_FULLNESS
    }

    pub fn flood_color(&self, class: PassClass) -> FloodColor {
        self.flood_colors[class.index()]
    }

    pub(crate) fn set_kind(&mut self, kind: TileKind) {
        self.kind = kind;
    }

    pub(crate) fn set_fullness(&mut self, fullness: f64) {
        self.fullness = fullness.clamp(0.0, MAX_FULLNESS);
    }

    pub(crate) fn set_color(&mut self, color: Option<SeatColor>) {
        self.color = color;
    }

    pub(crate) fn set_room(&mut self, room: Option<RoomId>) {
        self.room = room;
    }

    pub(crate) fn set_trap(&mut self, trap: Option<TrapId>) {
        self.trap = trap;
    }

    pub(crate) fn set_flood_color(&mut self, class: PassClass, color: FloodColor) {
        self.flood_colors[class.index()] = color;
    }
}

/// Sparse map of tiles. Iteration is row-major, which keeps every query that
/// walks the grid deterministic.
#[derive(Clone, Debug, Default)]
pub struct TileGrid {
    tiles: BTreeMap<Pos, Tile>,
    min_x: i32,
    min_y: i32,
    max_x: i32,
    max_y: i32,
}

impl TileGrid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, tile: Tile) -> Result<(), GameError> {
        let pos = tile.pos();
        if self.tiles.contains_key(&pos) {
            return Err(GameError::TileExists { x: pos.x, y: pos.y });
        }
        if self.tiles.is_empty() {
            (self.min_x, self.min_y) = (pos.x, pos.y);
            (self.max_x, self.max_y) = (pos.x, pos.y);
        } else {
            self.min_x = self.min_x.min(pos.x);
            self.min_y = self.min_y.min(pos.y);
            self.max_x = self.max_x.max(pos.x);
            self.max_y = self.max_y.max(pos.y);
        }
        self.tiles.insert(pos, tile);
        Ok(())
    }

    pub fn clear(&mut self) {
        self.tiles.clear();
        self.min_x = 0;
        self.min_y = 0;
        self.max_x = 0;
        self.max_y = 0;
    }

    pub fn get(&self, x: i32, y: i32) -> Option<&Tile> {
        self.tiles.get(&Pos { y, x })
    }

    pub fn get_pos(&self, pos: Pos) -> Option<&Tile> {
        self.tiles.get(&pos)
    }

    pub(crate) fn get_mut(&mut self, pos: Pos) -> Option<&mut Tile> {
        self.tiles.get_mut(&pos)
    }

    pub fn contains(&self, pos: Pos) -> bool {
        self.tiles.contains_key(&pos)
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// Smallest x coordinate ever added since the last clear.
    pub fn min_x(&self) -> i32 {
        self.min_x
    }

    pub fn min_y(&self) -> i32 {
        self.min_y
    }

    /// Largest x coordinate ever added since the last clear.
    pub fn max_x(&self) -> i32 {
        self.max_x
    }

    pub fn max_y(&self) -> i32 {
        self.max_y
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tile> {
        self.tiles.values()
    }

    pub fn positions(&self) -> Vec<Pos> {
        self.tiles.keys().copied().collect()
    }

    /// Tiles with coordinates inside the inclusive rectangle spanned by the
    /// two corners, in any corner order.
    pub fn rectangular_region(&self, x1: i32, y1: i32, x2: i32, y2: i32) -> Vec<&Tile> {
        if self.tiles.is_empty() {
            return Vec::new();
        }
        let (min_x, max_x) = (x1.min(x2).max(self.min_x), x1.max(x2).min(self.max_x));
        let (min_y, max_y) = (y1.min(y2).max(self.min_y), y1.max(y2).min(self.max_y));
        let mut region = Vec::new();
        for y in min_y..=max_y {
            for x in min_x..=max_x {
                if let Some(tile) = self.get(x, y) {
                    region.push(tile);
                }
            }
        }
        region
    }

    /// Tiles whose centre lies within `radius` of `(cx, cy)`. The scan never
    /// leaves the grid's bounding box, whatever the radius.
    pub fn circular_region(&self, cx: i32, cy: i32, radius: f64) -> Vec<&Tile> {
        if self.tiles.is_empty() || radius.is_nan() || radius < 0.0 {
            return Vec::new();
        }
        // Float to int casts saturate, so an infinite radius clamps too. Both
        // window edges end up between the centre and the grid bounds.
        let reach = radius.floor() as i64;
        let window = |center: i32, low: i32, high: i32| {
            let center = i64::from(center);
            let from = center.saturating_sub(reach).max(i64::from(low));
            let to = center.saturating_add(reach).min(i64::from(high));
            (from as i32, to as i32)
        };
        let (min_x, max_x) = window(cx, self.min_x, self.max_x);
        let (min_y, max_y) = window(cy, self.min_y, self.max_y);
        let radius_sq = radius * radius;
        let mut region = Vec::new();
        for y in min_y..=max_y {
            for x in min_x..=max_x {
                let dx = f64::from(x) - f64::from(cx);
                let dy = f64::from(y) - f64::from(cy);
                if dx * dx + dy * dy > radius_sq {
                    continue;
                }
                if let Some(tile) = self.get(x, y) {
                    region.push(tile);
                }
            }
        }
        region
    }

    /// Tiles adjacent to the region but not part of it, each listed once.
    pub fn tiles_bordered_by(&self, region: &[&Tile]) -> Vec<&Tile> {
        let inside: BTreeSet<Pos> = region.iter().map(|tile| tile.pos()).collect();
        let border: BTreeSet<Pos> = inside
            .iter()
            .flat_map(|pos| neighbors(*pos))
            .filter(|pos| !inside.contains(pos))
            .collect();
        border.into_iter().filter_map(|pos| self.get_pos(pos)).collect()
    }

    /// Existing tiles among the four cardinal neighbours, in N, E, S, W order.
    pub fn neighbor_tiles(&self, x: i32, y: i32) -> Vec<&Tile> {
        neighbors(Pos { y, x }).into_iter().filter_map(|pos| self.get_pos(pos)).collect()
    }
}

pub fn crow_distance(a: Pos, b: Pos) -> f64 {
    let dx = f64::from(a.x - b.x);
    let dy = f64::from(a.y - b.y);
    (dx * dx + dy * dy).sqrt()
}

pub(crate) fn manhattan(a: Pos, b: Pos) -> u32 {
    a.x.abs_diff(b.x) + a.y.abs_diff(b.y)
}
