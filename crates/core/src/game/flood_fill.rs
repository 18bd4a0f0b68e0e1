//! Connected-component colouring per movement class.
//! Two tiles share a colour for a class exactly when a path for that class
//! joins them, which turns reachability checks into a comparison.

use std::collections::{BTreeSet, VecDeque};

use super::*;
use crate::grid::neighbors;

pub(super) struct FloodFill {
    next_color: FloodColor,
    enabled: bool,
}

impl FloodFill {
    pub(super) fn new() -> Self {
        Self { next_color: NO_FLOOD_COLOR + 1, enabled: true }
    }

    pub(super) fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub(super) fn disable(&mut self) {
        self.enabled = false;
    }

    /// Turns colouring back on and recolours the whole grid.
    pub(super) fn enable(&mut self, grid: &mut TileGrid) {
        self.enabled = true;
        self.recompute_all(grid);
    }

    /// Never returns the same colour twice and never returns the blank colour.
    pub(super) fn unique_color(&mut self) -> FloodColor {
        let color = self.next_color;
        self.next_color = self.next_color.wrapping_add(1).max(NO_FLOOD_COLOR + 1);
        color
    }

    /// Paints the component of `start` for `class`. Does nothing while
    /// disabled or when `start` does not admit the class. Returns the number
    /// of tiles painted.
    pub(super) fn fill(
        &mut self,
        grid: &mut TileGrid,
        start: Pos,
        class: PassClass,
        color: Option<FloodColor>,
    ) -> usize {
        if !self.enabled || !grid.get_pos(start).is_some_and(|tile| tile.permits(class)) {
            return 0;
        }
        let color = match color {
            Some(color) if color != NO_FLOOD_COLOR => {
                if color >= self.next_color {
                    self.next_color = color.wrapping_add(1).max(NO_FLOOD_COLOR + 1);
                }
                color
            }
            _ => self.unique_color(),
        };

        let mut painted = 0;
        let mut queue = VecDeque::new();
        if let Some(tile) = grid.get_mut(start) {
            tile.set_flood_color(class, color);
            painted += 1;
        }
        queue.push_back(start);
        while let Some(current) = queue.pop_front() {
            for next in neighbors(current) {
                let Some(tile) = grid.get_mut(next) else { continue };
                if !tile.permits(class) || tile.flood_color(class) == color {
                    continue;
                }
                tile.set_flood_color(class, color);
                painted += 1;
                queue.push_back(next);
            }
        }
        painted
    }

    pub(super) fn recompute_all(&mut self, grid: &mut TileGrid) {
        let positions = grid.positions();
        for pos in &positions {
            if let Some(tile) = grid.get_mut(*pos) {
                for class in PassClass::ALL {
                    tile.set_flood_color(class, NO_FLOOD_COLOR);
                }
            }
        }
        if !self.enabled {
            return;
        }
        for pos in positions {
            for class in PassClass::ALL {
                let blank = grid
                    .get_pos(pos)
                    .is_some_and(|tile| {
                        tile.permits(class) && tile.flood_color(class) == NO_FLOOD_COLOR
                    });
                if blank {
                    self.fill(grid, pos, class, None);
                }
            }
        }
    }

    /// Colours a freshly added tile, merging it with its neighbours.
    pub(super) fn refresh_added(&mut self, grid: &mut TileGrid, pos: Pos) {
        if !self.enabled {
            return;
        }
        for class in PassClass::ALL {
            self.fill(grid, pos, class, None);
        }
    }

    /// Repairs colours around a tile whose passability changed from `before`.
    /// Opening a tile merges the components it touches; closing one may split
    /// its old component, so every neighbouring piece gets its own colour.
    pub(super) fn refresh_changed(&mut self, grid: &mut TileGrid, pos: Pos, before: Passability) {
        if !self.enabled {
            return;
        }
        let Some(after) = grid.get_pos(pos).map(Tile::passability) else {
            return;
        };
        for class in PassClass::ALL {
            let was_member = before.permits(class);
            let is_member = after.permits(class);
            if was_member == is_member {
                continue;
            }
            if is_member {
                self.fill(grid, pos, class, None);
                continue;
            }
            if let Some(tile) = grid.get_mut(pos) {
                tile.set_flood_color(class, NO_FLOOD_COLOR);
            }
            let mut fresh = BTreeSet::new();
            for next in neighbors(pos) {
                let Some(tile) = grid.get_pos(next) else { continue };
                if !tile.permits(class) || fresh.contains(&tile.flood_color(class)) {
                    continue;
                }
                let color = self.unique_color();
                fresh.insert(color);
                self.fill(grid, next, class, Some(color));
            }
        }
    }
}

impl GameMap {
    /// Colours the component of `(x, y)` for `class`, using `color` or a new
    /// unique colour. Returns the number of tiles painted.
    pub fn do_flood_fill(
        &mut self,
        x: i32,
        y: i32,
        class: PassClass,
        color: Option<FloodColor>,
    ) -> usize {
        self.flood.fill(&mut self.grid, Pos { y, x }, class, color)
    }

    pub fn next_unique_flood_fill_color(&mut self) -> FloodColor {
        self.flood.unique_color()
    }

    pub fn is_flood_fill_enabled(&self) -> bool {
        self.flood.is_enabled()
    }

    pub fn disable_flood_fill(&mut self) {
        self.flood.disable();
    }

    /// Re-enables colouring and recomputes every component.
    pub fn enable_flood_fill(&mut self) {
        self.flood.enable(&mut self.grid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::test_support::map_from_rows;

    fn color_at(map: &GameMap, x: i32, y: i32, class: PassClass) -> FloodColor {
        map.get_tile(x, y).map_or(NO_FLOOD_COLOR, |tile| tile.flood_color(class))
    }

    #[test]
    fn walls_separate_components() {
        let map = map_from_rows(&["..#..", "..#..", "..#.."]);
        let left = color_at(&map, 0, 0, PassClass::Walkable);
        assert_ne!(left, NO_FLOOD_COLOR);
        assert_eq!(left, color_at(&map, 1, 2, PassClass::Walkable));
        assert_ne!(left, color_at(&map, 4, 0, PassClass::Walkable));
        assert_eq!(color_at(&map, 2, 1, PassClass::Walkable), NO_FLOOD_COLOR);
    }

    #[test]
    fn water_joins_flyers_but_not_walkers() {
        let map = map_from_rows(&["..~.."]);
        assert_eq!(
            color_at(&map, 0, 0, PassClass::Flyable),
            color_at(&map, 4, 0, PassClass::Flyable)
        );
        assert_ne!(
            color_at(&map, 0, 0, PassClass::Walkable),
            color_at(&map, 4, 0, PassClass::Walkable)
        );
    }

    #[test]
    fn digging_a_wall_merges_components() {
        let mut map = map_from_rows(&["..D.."]);
        assert_ne!(
            color_at(&map, 0, 0, PassClass::Walkable),
            color_at(&map, 4, 0, PassClass::Walkable)
        );
        assert_eq!(
            color_at(&map, 0, 0, PassClass::Diggable),
            color_at(&map, 4, 0, PassClass::Diggable)
        );

        map.dig(Pos::new(2, 0), MAX_FULLNESS);
        assert_eq!(
            color_at(&map, 0, 0, PassClass::Walkable),
            color_at(&map, 4, 0, PassClass::Walkable)
        );
        assert!(map.path_exists(0, 0, 4, 0, PassClass::Walkable));
    }

    #[test]
    fn closing_a_chokepoint_splits_components() {
        let mut map = map_from_rows(&["....."]);
        map.set_tile_kind(Pos::new(2, 0), TileKind::Rock, MAX_FULLNESS).unwrap();
        let left = color_at(&map, 0, 0, PassClass::Walkable);
        let right = color_at(&map, 4, 0, PassClass::Walkable);
        assert_ne!(left, right);
        assert_ne!(left, NO_FLOOD_COLOR);
        assert_ne!(right, NO_FLOOD_COLOR);
        assert!(!map.path_exists(0, 0, 4, 0, PassClass::Walkable));
    }

    #[test]
    fn disabled_fill_is_a_no_op_and_reenabling_recolours() {
        let mut map = map_from_rows(&["...", "...", "..."]);
        map.disable_flood_fill();
        assert_eq!(map.do_flood_fill(0, 0, PassClass::Walkable, Some(999)), 0);
        map.set_tile_kind(Pos::new(1, 0), TileKind::Rock, MAX_FULLNESS).unwrap();
        map.set_tile_kind(Pos::new(1, 1), TileKind::Rock, MAX_FULLNESS).unwrap();
        map.set_tile_kind(Pos::new(1, 2), TileKind::Rock, MAX_FULLNESS).unwrap();
        // Colours are stale until colouring is enabled again.
        assert_eq!(
            color_at(&map, 0, 0, PassClass::Walkable),
            color_at(&map, 2, 0, PassClass::Walkable)
        );

        map.enable_flood_fill();
        assert_ne!(
            color_at(&map, 0, 0, PassClass::Walkable),
            color_at(&map, 2, 0, PassClass::Walkable)
        );
        assert_eq!(color_at(&map, 1, 1, PassClass::Walkable), NO_FLOOD_COLOR);
    }

    #[test]
    fn refilling_a_region_with_a_new_colour_leaves_no_trace_of_the_old_one() {
        let mut map = map_from_rows(&["..#..", ".##..", "..#.."]);
        let class = PassClass::Walkable;
        let right_before: Vec<FloodColor> = map.grid()
            .iter()
            .filter(|tile| tile.x() > 2)
            .map(|tile| tile.flood_color(class))
            .collect();
        let first = map.next_unique_flood_fill_color();
        let second = map.next_unique_flood_fill_color();

        assert_eq!(map.do_flood_fill(0, 0, class, Some(first)), 5);
        assert_eq!(map.do_flood_fill(0, 0, class, Some(second)), 5);

        let left: Vec<&Tile> =
            map.grid().iter().filter(|tile| tile.x() < 2 && tile.permits(class)).collect();
        assert_eq!(left.len(), 5);
        assert!(left.iter().all(|tile| tile.flood_color(class) == second));
        assert!(map.grid().iter().all(|tile| tile.flood_color(class) != first));
        let right_after: Vec<FloodColor> = map.grid()
            .iter()
            .filter(|tile| tile.x() > 2)
            .map(|tile| tile.flood_color(class))
            .collect();
        assert_eq!(right_after, right_before);
        assert!(!right_after.contains(&second));
    }

    #[test]
    fn unique_colours_are_monotonic_and_skip_explicit_ones() {
        let mut map = map_from_rows(&["..."]);
        let first = map.next_unique_flood_fill_color();
        assert_eq!(map.do_flood_fill(0, 0, PassClass::Walkable, Some(first + 50)), 3);
        assert_eq!(color_at(&map, 2, 0, PassClass::Walkable), first + 50);
        assert!(map.next_unique_flood_fill_color() > first + 50);
    }
}
