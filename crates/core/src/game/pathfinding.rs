//! Shortest paths over the tile grid for a movement class.
//! A* runs on an index arena; the flood-fill colours reject unreachable goals
//! before any node is expanded.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use super::*;
use crate::grid::{manhattan, neighbors};

const STEP_COST: u32 = 1;

/// Open-set entry. Ordering picks the lowest `f`, then the lowest `h`, then
/// the most recently inserted node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct OpenNode {
    f: u32,
    h: u32,
    order: Reverse<u64>,
    node: usize,
}

#[derive(Clone, Copy, Debug)]
struct SearchNode {
    pos: Pos,
    parent: Option<usize>,
    g: u32,
}

#[derive(Debug, Default)]
pub(super) struct PathStats {
    path_calls: AtomicU64,
    astar_runs: AtomicU64,
    nodes_expanded: AtomicU64,
    flood_fill_rejections: AtomicU64,
}

impl PathStats {
    fn snapshot(&self) -> PathCounters {
        PathCounters {
            path_calls: self.path_calls.load(Ordering::Relaxed),
            astar_runs: self.astar_runs.load(Ordering::Relaxed),
            nodes_expanded: self.nodes_expanded.load(Ordering::Relaxed),
            flood_fill_rejections: self.flood_fill_rejections.load(Ordering::Relaxed),
        }
    }

    fn reject(&self) {
        self.flood_fill_rejections.fetch_add(1, Ordering::Relaxed);
    }
}

/// Cumulative pathfinding counters since the map was created.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PathCounters {
    pub path_calls: u64,
    pub astar_runs: u64,
    pub nodes_expanded: u64,
    pub flood_fill_rejections: u64,
}

fn astar(
    grid: &TileGrid,
    start: Pos,
    goal: Pos,
    class: PassClass,
    stats: &PathStats,
) -> Option<Vec<Pos>> {
    stats.astar_runs.fetch_add(1, Ordering::Relaxed);
    let mut nodes = vec![SearchNode { pos: start, parent: None, g: 0 }];
    let mut open_set = BTreeSet::new();
    let mut best_g = BTreeMap::new();
    let mut closed = BTreeSet::new();
    let mut inserted = 0u64;

    let h = manhattan(start, goal);
    open_set.insert(OpenNode { f: h, h, order: Reverse(inserted), node: 0 });
    best_g.insert(start, 0);

    let mut expanded = 0u64;
    let found = loop {
        let Some(open) = open_set.pop_first() else {
            break None;
        };
        let current = nodes[open.node];
        if !closed.insert(current.pos) {
            continue;
        }
        expanded += 1;
        if current.pos == goal {
            break Some(open.node);
        }
        for next in neighbors(current.pos) {
            let passable = grid.get_pos(next).is_some_and(|tile| tile.permits(class));
            if closed.contains(&next) || !passable {
                continue;
            }
            let g = current.g + STEP_COST;
            if best_g.get(&next).is_some_and(|best| g >= *best) {
                continue;
            }
            best_g.insert(next, g);
            nodes.push(SearchNode { pos: next, parent: Some(open.node), g });
            inserted += 1;
            let h = manhattan(next, goal);
            open_set.insert(OpenNode {
                f: g + h,
                h,
                order: Reverse(inserted),
                node: nodes.len() - 1,
            });
        }
    };
    stats.nodes_expanded.fetch_add(expanded, Ordering::Relaxed);

    let mut path = Vec::new();
    let mut cursor = Some(found?);
    while let Some(index) = cursor {
        path.push(nodes[index].pos);
        cursor = nodes[index].parent;
    }
    path.reverse();
    Some(path)
}

impl GameMap {
    /// Shortest 4-connected path from `(x1, y1)` to `(x2, y2)` whose every
    /// tile admits `class`, endpoints included. Empty when no path exists.
    /// A path from a tile to itself is that single tile.
    pub fn path(&self, x1: i32, y1: i32, x2: i32, y2: i32, class: PassClass) -> Vec<Pos> {
        self.stats.path_calls.fetch_add(1, Ordering::Relaxed);
        let (Some(start), Some(goal)) = (self.grid.get(x1, y1), self.grid.get(x2, y2)) else {
            return Vec::new();
        };
        if start.pos() == goal.pos() {
            return vec![start.pos()];
        }
        if !start.permits(class) || !goal.permits(class) {
            return Vec::new();
        }
        if self.flood.is_enabled() && start.flood_color(class) != goal.flood_color(class) {
            self.stats.reject();
            return Vec::new();
        }
        astar(&self.grid, start.pos(), goal.pos(), class, &self.stats).unwrap_or_default()
    }

    /// Constant time while flood fill is enabled; falls back to a search
    /// otherwise.
    pub fn path_exists(&self, x1: i32, y1: i32, x2: i32, y2: i32, class: PassClass) -> bool {
        let (Some(start), Some(goal)) = (self.grid.get(x1, y1), self.grid.get(x2, y2)) else {
            return false;
        };
        if !start.permits(class) || !goal.permits(class) {
            return false;
        }
        if !self.flood.is_enabled() {
            return !self.path(x1, y1, x2, y2, class).is_empty();
        }
        let color = start.flood_color(class);
        let connected = color != NO_FLOOD_COLOR && color == goal.flood_color(class);
        if !connected {
            self.stats.reject();
        }
        connected
    }

    /// Path from one creature to another using the first creature's class.
    pub fn path_between_creatures(&self, from: &Creature, to: &Creature) -> Vec<Pos> {
        let (a, b) = (from.pos(), to.pos());
        self.path(a.x, a.y, b.x, b.y, from.move_class())
    }

    /// True when every tile exists and admits `class`, and no diagonal step
    /// squeezes between two blocked corner tiles.
    pub fn path_is_clear(&self, path: &[Pos], class: PassClass) -> bool {
        let permits = |pos: Pos| self.grid.get_pos(pos).is_some_and(|tile| tile.permits(class));
        if !path.iter().all(|pos| permits(*pos)) {
            return false;
        }
        path.windows(2).all(|step| {
            let (a, b) = (step[0], step[1]);
            if a.x == b.x || a.y == b.y {
                return true;
            }
            permits(Pos { y: a.y, x: b.x }) && permits(Pos { y: b.y, x: a.x })
        })
    }

    /// Shortens a path in place by skipping waypoints that a clear straight
    /// line can bypass. The first and last tile are always kept.
    pub fn cut_corners(&self, path: &mut Vec<Pos>, class: PassClass) {
        if path.len() < 3 {
            return;
        }
        let mut kept = vec![path[0]];
        let mut anchor = 0;
        while anchor < path.len() - 1 {
            let mut furthest = anchor + 1;
            for probe in anchor + 2..path.len() {
                let (a, b) = (path[anchor], path[probe]);
                let line = self.line_of_sight(a.x, a.y, b.x, b.y);
                if line.last() != Some(&b) || !self.path_is_clear(&line, class) {
                    break;
                }
                furthest = probe;
            }
            kept.push(path[furthest]);
            anchor = furthest;
        }
        *path = kept;
    }

    /// Rooms with at least one tile reachable from `from` for `class`.
    pub fn get_reachable_rooms(
        &self,
        rooms: &[RoomId],
        from: Pos,
        class: PassClass,
    ) -> Vec<RoomId> {
        rooms
            .iter()
            .copied()
            .filter(|id| {
                self.registry.room(*id).is_some_and(|room| {
                    room.tiles
                        .iter()
                        .any(|tile| self.path_exists(from.x, from.y, tile.x, tile.y, class))
                })
            })
            .collect()
    }

    pub fn path_stats(&self) -> PathCounters {
        self.stats.snapshot()
    }
}
