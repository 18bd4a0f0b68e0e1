//! Seeded generation of playable levels: a rock-walled dirt block with gold
//! veins and pools, one claimed keep per seat joined by corridors, and a
//! starting population.

use rand_chacha::ChaCha8Rng;
use rand_chacha::rand_core::{Rng, SeedableRng};
use tracing::info;

use crate::entities::*;
use crate::game::GameMap;
use crate::grid::neighbors;
use crate::types::*;

const MIN_SIDE: i32 = 16;
const MAX_SEATS: usize = 4;
/// Keep centres as quarter fractions of the map size.
const KEEP_ANCHORS: [(i32, i32); MAX_SEATS] = [(1, 1), (3, 3), (3, 1), (1, 3)];
const FACTIONS: [&str; MAX_SEATS] = ["Keepers", "Marauders", "Warlocks", "Hermits"];
const KEEP_RADIUS: i32 = 2;
/// Starting creatures are drawn from these classes in turn.
const WORKFORCE: [&str; 3] = ["Kobold", "Goblin", "Imp"];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MapGenParams {
    pub width: i32,
    pub height: i32,
    pub seed: u64,
    pub seats: usize,
    pub creatures_per_seat: usize,
    pub gold_veins: usize,
    pub pools: usize,
    pub claim_goal: usize,
}

impl Default for MapGenParams {
    fn default() -> Self {
        Self {
            width: 32,
            height: 24,
            seed: 0,
            seats: 2,
            creatures_per_seat: 4,
            gold_veins: 6,
            pools: 3,
            claim_goal: 40,
        }
    }
}

pub struct MapGenerator {
    params: MapGenParams,
    rng: ChaCha8Rng,
}

impl MapGenerator {
    pub fn new(params: MapGenParams) -> Self {
        let params = MapGenParams {
            width: params.width.max(MIN_SIDE),
            height: params.height.max(MIN_SIDE),
            seats: params.seats.clamp(1, MAX_SEATS),
            ..params
        };
        let rng = ChaCha8Rng::seed_from_u64(params.seed);
        Self { params, rng }
    }

    /// Replaces the map's contents and returns the seats in colour order.
    pub fn generate(mut self, map: &mut GameMap) -> Result<Vec<SeatId>, GameError> {
        let MapGenParams { width, height, seed, seats, .. } = self.params;
        map.clear_all();
        map.set_seed(seed);
        map.disable_flood_fill();
        map.create_new_map(width, height)?;

        for x in 0..width {
            map.set_tile_kind(Pos::new(x, 0), TileKind::Rock, MAX_FULLNESS)?;
            map.set_tile_kind(Pos::new(x, height - 1), TileKind::Rock, MAX_FULLNESS)?;
        }
        for y in 1..height - 1 {
            map.set_tile_kind(Pos::new(0, y), TileKind::Rock, MAX_FULLNESS)?;
            map.set_tile_kind(Pos::new(width - 1, y), TileKind::Rock, MAX_FULLNESS)?;
        }
        self.place_gold_veins(map)?;
        self.place_pools(map)?;

        let keeps: Vec<Pos> = KEEP_ANCHORS[..seats]
            .iter()
            .map(|&(ax, ay)| Pos::new(width * ax / 4, height * ay / 4))
            .collect();
        let middle = Pos::new(width / 2, height / 2);
        for (index, &keep) in keeps.iter().enumerate() {
            carve_corridor(map, keep, middle)?;
            carve_keep(map, keep, seat_color(index))?;
        }
        map.enable_flood_fill();

        add_default_classes(map)?;
        map.add_goal_for_all_seats(Goal::ClaimTiles(self.params.claim_goal));
        map.add_goal_for_all_seats(Goal::ProtectDungeonTemple);

        let mut seat_ids = Vec::with_capacity(seats);
        for (index, &keep) in keeps.iter().enumerate() {
            seat_ids.push(self.furnish_keep(map, index, keep)?);
        }

        let creatures = map.registry().num_creatures();
        info!(width, height, seats, seed, creatures, "generated map");
        Ok(seat_ids)
    }

    /// Inclusive range.
    fn roll(&mut self, min: i32, max: i32) -> i32 {
        let span = (max - min + 1).max(1) as u64;
        min + (self.rng.next_u64() % span) as i32
    }

    fn interior_point(&mut self) -> Pos {
        let x = self.roll(1, self.params.width - 2);
        let y = self.roll(1, self.params.height - 2);
        Pos::new(x, y)
    }

    fn is_interior(&self, pos: Pos) -> bool {
        pos.x > 0 && pos.y > 0 && pos.x < self.params.width - 1 && pos.y < self.params.height - 1
    }

    fn place_gold_veins(&mut self, map: &mut GameMap) -> Result<(), GameError> {
        for _ in 0..self.params.gold_veins {
            let mut pos = self.interior_point();
            let length = self.roll(3, 7);
            for _ in 0..length {
                map.set_tile_kind(pos, TileKind::Gold, MAX_FULLNESS)?;
                let step = neighbors(pos)[self.roll(0, 3) as usize];
                if self.is_interior(step) {
                    pos = step;
                }
            }
        }
        Ok(())
    }

    fn place_pools(&mut self, map: &mut GameMap) -> Result<(), GameError> {
        for _ in 0..self.params.pools {
            let center = self.interior_point();
            let radius = f64::from(self.roll(1, 2));
            let kind = if self.roll(0, 2) == 0 { TileKind::Lava } else { TileKind::Water };
            let region: Vec<Pos> = map.grid()
                .circular_region(center.x, center.y, radius)
                .iter()
                .map(|tile| tile.pos())
                .collect();
            for pos in region.into_iter().filter(|pos| self.is_interior(*pos)) {
                map.set_tile_kind(pos, kind, 0.0)?;
            }
        }
        Ok(())
    }

    fn furnish_keep(
        &mut self,
        map: &mut GameMap,
        index: usize,
        keep: Pos,
    ) -> Result<SeatId, GameError> {
        let color = seat_color(index);
        let seat = map.add_empty_seat(Seat::new(color, FACTIONS[index], keep));

        let temple = (-1..=1)
            .flat_map(|dy| (-1..=1).map(move |dx| Pos::new(keep.x + dx, keep.y + dy)))
            .collect();
        map.add_room(Room::new(RoomKind::DungeonTemple, color, temple))?;
        let vault = (-1..=1).map(|dx| Pos::new(keep.x + dx, keep.y + KEEP_RADIUS)).collect();
        map.add_room(Room::new(RoomKind::Treasury, color, vault))?;
        map.add_trap(Trap::new(
            TrapKind::Cannon,
            color,
            vec![Pos::new(keep.x + KEEP_RADIUS, keep.y - KEEP_RADIUS)],
        ))?;
        map.add_map_light(MapLight::new(
            format!("keep_light_{color}"),
            f64::from(keep.x),
            f64::from(keep.y),
            4.0,
        ))?;

        let spots: Vec<Pos> = (-KEEP_RADIUS..=KEEP_RADIUS)
            .map(|dx| Pos::new(keep.x + dx, keep.y - KEEP_RADIUS))
            .chain((-1..=1).map(|dy| Pos::new(keep.x - KEEP_RADIUS, keep.y + dy)))
            .collect();
        for n in 0..self.params.creatures_per_seat {
            let class = WORKFORCE[n % WORKFORCE.len()];
            let name = map.unique_creature_name(class);
            map.add_creature(CreatureSpawn::new(name, class, color, spots[n % spots.len()]))?;
        }
        Ok(seat)
    }
}

pub fn generate(map: &mut GameMap, params: &MapGenParams) -> Result<Vec<SeatId>, GameError> {
    MapGenerator::new(params.clone()).generate(map)
}

fn seat_color(index: usize) -> SeatColor {
    index as SeatColor + 1
}

fn carve_keep(map: &mut GameMap, keep: Pos, color: SeatColor) -> Result<(), GameError> {
    for dy in -KEEP_RADIUS..=KEEP_RADIUS {
        for dx in -KEEP_RADIUS..=KEEP_RADIUS {
            let pos = Pos::new(keep.x + dx, keep.y + dy);
            map.set_tile_kind(pos, TileKind::Dirt, 0.0)?;
            map.claim_tile(pos, color);
        }
    }
    Ok(())
}

/// Opens a dirt floor from `from` along x, then along y, to `to`.
fn carve_corridor(map: &mut GameMap, from: Pos, to: Pos) -> Result<(), GameError> {
    let (x0, x1) = (from.x.min(to.x), from.x.max(to.x));
    let (y0, y1) = (from.y.min(to.y), from.y.max(to.y));
    let path = (x0..=x1).map(|x| Pos::new(x, from.y)).chain((y0..=y1).map(|y| Pos::new(to.x, y)));
    for pos in path {
        if map.get_tile(pos.x, pos.y).is_some_and(|tile| tile.kind() != TileKind::Claimed) {
            map.set_tile_kind(pos, TileKind::Dirt, 0.0)?;
        }
    }
    Ok(())
}

fn add_default_classes(map: &mut GameMap) -> Result<(), GameError> {
    map.add_class_description(CreatureClass { max_hp: 12, ..CreatureClass::worker("Kobold") })?;
    map.add_class_description(CreatureClass {
        max_hp: 18,
        sight_radius: 6.0,
        ..CreatureClass::new("Goblin", PassClass::Walkable)
    })?;
    map.add_class_description(CreatureClass {
        max_hp: 8,
        sight_radius: 10.0,
        ..CreatureClass::new("Imp", PassClass::Flyable)
    })
}
