use std::collections::{BTreeMap, VecDeque};

use dungeon::{GameMap, MAX_FULLNESS, NO_FLOOD_COLOR, PassClass, Pos, Tile, TileKind};
use proptest::{
    arbitrary::any,
    test_runner::{Config as ProptestConfig, TestCaseError, TestRunner},
};
use rand_chacha::{
    ChaCha8Rng,
    rand_core::{Rng, SeedableRng},
};

fn roll(rng: &mut ChaCha8Rng, below: u64) -> i32 {
    (rng.next_u64() % below) as i32
}

fn random_tile(rng: &mut ChaCha8Rng, x: i32, y: i32) -> Tile {
    match roll(rng, 10) {
        0..=5 => Tile::new(x, y, TileKind::Dirt, 0.0),
        6 => Tile::new(x, y, TileKind::Rock, MAX_FULLNESS),
        7 => Tile::new(x, y, TileKind::Dirt, MAX_FULLNESS),
        8 => Tile::new(x, y, TileKind::Water, 0.0),
        _ => Tile::new(x, y, TileKind::Gold, MAX_FULLNESS),
    }
}

fn random_map(rng: &mut ChaCha8Rng) -> GameMap {
    let width = 3 + roll(rng, 8);
    let height = 3 + roll(rng, 8);
    let mut map = GameMap::default();
    map.disable_flood_fill();
    for y in 0..height {
        for x in 0..width {
            map.add_tile(random_tile(rng, x, y)).expect("fresh position");
        }
    }
    map.enable_flood_fill();
    map
}

fn random_pos(rng: &mut ChaCha8Rng, map: &GameMap) -> Pos {
    let grid = map.grid();
    Pos::new(roll(rng, grid.max_x() as u64 + 1), roll(rng, grid.max_y() as u64 + 1))
}

/// Breadth-first step counts from `start` over tiles admitting `class`.
fn distances(map: &GameMap, start: Pos, class: PassClass) -> BTreeMap<Pos, usize> {
    let mut seen = BTreeMap::new();
    if !map.grid().get_pos(start).is_some_and(|tile| tile.permits(class)) {
        return seen;
    }
    let mut queue = VecDeque::from([start]);
    seen.insert(start, 0);
    while let Some(pos) = queue.pop_front() {
        let steps = seen[&pos];
        for next in [
            Pos::new(pos.x, pos.y - 1),
            Pos::new(pos.x + 1, pos.y),
            Pos::new(pos.x, pos.y + 1),
            Pos::new(pos.x - 1, pos.y),
        ] {
            let open = map.grid().get_pos(next).is_some_and(|tile| tile.permits(class));
            if open && !seen.contains_key(&next) {
                seen.insert(next, steps + 1);
                queue.push_back(next);
            }
        }
    }
    seen
}

fn check(condition: bool, message: impl FnOnce() -> String) -> Result<(), TestCaseError> {
    if condition { Ok(()) } else { Err(TestCaseError::fail(message())) }
}

fn check_paths(seed: u64) -> Result<(), TestCaseError> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let map = random_map(&mut rng);
    for _ in 0..12 {
        let (a, b) = (random_pos(&mut rng, &map), random_pos(&mut rng, &map));
        for class in PassClass::ALL {
            let path = map.path(a.x, a.y, b.x, b.y, class);
            let reach = distances(&map, a, class);
            check(map.path_exists(a.x, a.y, b.x, b.y, class) == reach.contains_key(&b), || {
                format!("path_exists disagrees with search for {a} -> {b} ({class:?}), seed {seed}")
            })?;
            if a == b {
                check(path == vec![a], || format!("path to self at {a} was {path:?}"))?;
                continue;
            }
            let Some(&steps) = reach.get(&b) else {
                check(path.is_empty(), || {
                    format!("found a path {a} -> {b} where none exists, seed {seed}")
                })?;
                continue;
            };
            check(path.len() == steps + 1, || {
                format!(
                    "path {a} -> {b} has {} tiles, shortest is {}, seed {seed}",
                    path.len(),
                    steps + 1
                )
            })?;
            check(path.first() == Some(&a) && path.last() == Some(&b), || {
                format!("endpoints wrong: {path:?}")
            })?;
            check(map.path_is_clear(&path, class), || {
                format!("path crosses a blocked tile: {path:?}")
            })?;
            for step in path.windows(2) {
                let distance = (step[0].x - step[1].x).abs() + (step[0].y - step[1].y).abs();
                check(distance == 1, || format!("non-orthogonal step in {path:?}"))?;
            }
        }
    }
    Ok(())
}

fn check_flood_colors(map: &GameMap, seed: u64) -> Result<(), TestCaseError> {
    for class in PassClass::ALL {
        for tile in map.grid().iter() {
            let color = tile.flood_color(class);
            if !tile.permits(class) {
                check(color == NO_FLOOD_COLOR, || {
                    format!("blocked tile {} coloured, seed {seed}", tile.pos())
                })?;
                continue;
            }
            let reach = distances(map, tile.pos(), class);
            for other in map.grid().iter() {
                let same = color != NO_FLOOD_COLOR && other.flood_color(class) == color;
                check(same == reach.contains_key(&other.pos()), || {
                    format!(
                        "colours of {} and {} disagree with reachability ({class:?}), seed {seed}",
                        tile.pos(),
                        other.pos()
                    )
                })?;
            }
        }
    }
    Ok(())
}

fn check_mutations(seed: u64) -> Result<(), TestCaseError> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut map = random_map(&mut rng);
    check_flood_colors(&map, seed)?;
    for _ in 0..6 {
        let pos = random_pos(&mut rng, &map);
        match roll(&mut rng, 4) {
            0 => {
                map.dig(pos, MAX_FULLNESS);
            }
            1 => {
                map.claim_tile(pos, 1);
            }
            _ => {
                let replacement = random_tile(&mut rng, pos.x, pos.y);
                map.set_tile_kind(pos, replacement.kind(), replacement.fullness())
                    .expect("tile exists");
            }
        }
        check_flood_colors(&map, seed)?;
    }
    Ok(())
}

fn check_cut_corners(seed: u64) -> Result<(), TestCaseError> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let map = random_map(&mut rng);
    for _ in 0..8 {
        let (a, b) = (random_pos(&mut rng, &map), random_pos(&mut rng, &map));
        let mut path = map.path(a.x, a.y, b.x, b.y, PassClass::Walkable);
        let original = path.clone();
        map.cut_corners(&mut path, PassClass::Walkable);
        check(path.len() <= original.len(), || format!("cutting lengthened {original:?}"))?;
        check(path.first() == original.first() && path.last() == original.last(), || {
            format!("cutting moved the endpoints of {original:?}")
        })?;
        for leg in path.windows(2) {
            let (from, to) = (leg[0], leg[1]);
            let line = map.line_of_sight(from.x, from.y, to.x, to.y);
            let adjacent = (from.x - to.x).abs() + (from.y - to.y).abs() == 1;
            let clear = line.last() == Some(&to) && map.path_is_clear(&line, PassClass::Walkable);
            check(adjacent || clear, || format!("leg {from} -> {to} is not clear, seed {seed}"))?;
        }
    }
    Ok(())
}

#[test]
fn paths_are_shortest_and_agree_with_path_exists() {
    let mut runner = TestRunner::new(ProptestConfig::with_cases(64));
    runner.run(&any::<u64>(), check_paths).expect("paths should match a breadth-first search");
}

#[test]
fn flood_colors_track_reachability_through_mutations() {
    let mut runner = TestRunner::new(ProptestConfig::with_cases(48));
    runner.run(&any::<u64>(), check_mutations).expect("flood colours should mirror connectivity");
}

#[test]
fn cut_corners_keeps_endpoints_and_clear_legs() {
    let mut runner = TestRunner::new(ProptestConfig::with_cases(48));
    runner
        .run(&any::<u64>(), check_cut_corners)
        .expect("corner cutting should stay on open ground");
}
