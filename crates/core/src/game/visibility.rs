//! Line-of-sight walks and the visible-tile set used by traps and AI.

use std::iter;

use super::*;

/// Symmetric grid walk from `origin` towards `target`. Steps are diagonal
/// only where the ideal line passes exactly through a corner.
fn line_walk(origin: Pos, target: Pos) -> impl Iterator<Item = Pos> {
    let dx = target.x - origin.x;
    let dy = target.y - origin.y;
    let (sx, sy) = (dx.signum(), dy.signum());
    let (total_x, total_y) = (dx.abs(), dy.abs());
    let (mut step_x, mut step_y) = (0, 0);
    let mut current = origin;
    let mut started = false;

    iter::from_fn(move || {
        if !started {
            started = true;
            return Some(current);
        }
        if step_x >= total_x && step_y >= total_y {
            return None;
        }
        let lhs = (1 + 2 * step_x) * total_y;
        let rhs = (1 + 2 * step_y) * total_x;
        if lhs == rhs {
            current.x += sx;
            current.y += sy;
            step_x += 1;
            step_y += 1;
        } else if lhs < rhs {
            current.x += sx;
            step_x += 1;
        } else {
            current.y += sy;
            step_y += 1;
        }
        Some(current)
    })
}

impl GameMap {
    /// Tiles on the line from `(x1, y1)` to `(x2, y2)`, both ends included.
    /// The walk stops early at the first coordinate with no tile; it does not
    /// look at passability.
    pub fn line_of_sight(&self, x1: i32, y1: i32, x2: i32, y2: i32) -> Vec<Pos> {
        line_walk(Pos { y: y1, x: x1 }, Pos { y: y2, x: x2 })
            .take_while(|pos| self.grid.contains(*pos))
            .collect()
    }

    /// Tiles within `radius` of `origin` with an unobstructed line to them.
    /// Opaque tiles in between block the line; an opaque target is still
    /// seen. An opaque origin sees nothing.
    pub fn visible_tiles(&self, origin: Pos, radius: f64) -> Vec<Pos> {
        if !self.grid.get_pos(origin).is_some_and(|tile| !tile.is_opaque()) {
            return Vec::new();
        }
        self.grid
            .circular_region(origin.x, origin.y, radius)
            .into_iter()
            .map(Tile::pos)
            .filter(|target| self.has_clear_sight(origin, *target))
            .collect()
    }

    fn has_clear_sight(&self, origin: Pos, target: Pos) -> bool {
        for pos in line_walk(origin, target) {
            if pos == target {
                return true;
            }
            if pos == origin {
                continue;
            }
            match self.grid.get_pos(pos) {
                Some(tile) if !tile.is_opaque() => {}
                _ => return false,
            }
        }
        false
    }

    /// Live creatures standing on `tiles` whose colour matches `color`, or
    /// differs from it when `invert` is set.
    pub fn get_visible_force(
        &self,
        tiles: &[Pos],
        color: SeatColor,
        invert: bool,
    ) -> Vec<Arc<Creature>> {
        self.registry
            .creatures()
            .filter(|creature| (creature.color() == color) != invert)
            .filter(|creature| !creature.is_in_hand() && tiles.contains(&creature.pos()))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::test_support::{add_test_class, map_from_rows};

    #[test]
    fn line_includes_both_endpoints() {
        let map = map_from_rows(&["....", "....", "...."]);
        let line = map.line_of_sight(0, 0, 3, 2);
        assert_eq!(line.first(), Some(&Pos::new(0, 0)));
        assert_eq!(line.last(), Some(&Pos::new(3, 2)));
        let reversed = map.line_of_sight(3, 2, 0, 0);
        assert_eq!(reversed.len(), line.len());
    }

    #[test]
    fn line_stops_at_the_map_edge() {
        let map = map_from_rows(&["...."]);
        assert_eq!(map.line_of_sight(0, 0, 6, 0).len(), 4);
        assert!(map.line_of_sight(9, 9, 0, 0).is_empty());
    }

    #[test]
    fn rock_blocks_sight_but_is_itself_visible() {
        let map = map_from_rows(&["..#.."]);
        let seen = map.visible_tiles(Pos::new(0, 0), 10.0);
        assert!(seen.contains(&Pos::new(0, 0)));
        assert!(seen.contains(&Pos::new(2, 0)));
        assert!(!seen.contains(&Pos::new(3, 0)));
        assert!(!seen.contains(&Pos::new(4, 0)));
    }

    #[test]
    fn full_dirt_is_opaque_and_water_is_not() {
        let map = map_from_rows(&[".D.", ".~."]);
        let seen = map.visible_tiles(Pos::new(0, 1), 3.0);
        assert!(seen.contains(&Pos::new(2, 1)));
        let walled = map.visible_tiles(Pos::new(0, 0), 3.0);
        assert!(!walled.contains(&Pos::new(2, 0)));
        assert!(map.visible_tiles(Pos::new(1, 0), 3.0).is_empty());
    }

    #[test]
    fn visible_force_filters_by_colour() {
        let mut map = map_from_rows(&["....."]);
        add_test_class(&mut map, "Imp", false);
        map.add_creature(CreatureSpawn::new("ally", "Imp", 1, Pos::new(1, 0))).unwrap();
        map.add_creature(CreatureSpawn::new("enemy", "Imp", 2, Pos::new(3, 0))).unwrap();
        let tiles = map.visible_tiles(Pos::new(0, 0), 5.0);

        let allies = map.get_visible_force(&tiles, 1, false);
        let enemies = map.get_visible_force(&tiles, 1, true);
        assert_eq!(allies.len(), 1);
        assert_eq!(enemies.len(), 1);
        assert_eq!(enemies[0].name(), "enemy");
    }
}
