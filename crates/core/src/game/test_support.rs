//! Small maps drawn as text for the `game` test suites.
//!
//! Legend: `.` dirt floor, `#` rock, `D` solid dirt, `G` solid gold, `~` water,
//! `L` lava, `C` floor claimed by colour 1. Row 0 is `y == 0`.

use super::*;

pub(crate) fn map_from_rows(rows: &[&str]) -> GameMap {
    let mut map = GameMap::default();
    map.disable_flood_fill();
    for (y, row) in rows.iter().enumerate() {
        for (x, glyph) in row.chars().enumerate() {
            let (x, y) = (x as i32, y as i32);
            let mut tile = match glyph {
                '.' => Tile::new(x, y, TileKind::Dirt, 0.0),
                '#' => Tile::new(x, y, TileKind::Rock, MAX_FULLNESS),
                'D' => Tile::new(x, y, TileKind::Dirt, MAX_FULLNESS),
                'G' => Tile::new(x, y, TileKind::Gold, MAX_FULLNESS),
                '~' => Tile::new(x, y, TileKind::Water, 0.0),
                'L' => Tile::new(x, y, TileKind::Lava, 0.0),
                'C' => Tile::new(x, y, TileKind::Claimed, 0.0),
                other => panic!("unknown map glyph {other:?}"),
            };
            if glyph == 'C' {
                tile.set_color(Some(1));
            }
            map.add_tile(tile).expect("rows do not repeat positions");
        }
    }
    map.enable_flood_fill();
    map
}

pub(crate) fn add_test_class(map: &mut GameMap, name: &str, worker: bool) {
    let class = if worker {
        CreatureClass::worker(name)
    } else {
        CreatureClass::new(name, PassClass::Walkable)
    };
    map.add_class_description(class).expect("class names are unique per test");
}
