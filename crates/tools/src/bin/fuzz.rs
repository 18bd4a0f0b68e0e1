use anyhow::{Result, ensure};
use clap::Parser;
use dungeon::{GameMap, MapGenParams, PassClass, Player, PlayerId, Pos, mapgen};
use rand_chacha::{
    ChaCha8Rng,
    rand_core::{Rng, SeedableRng},
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value_t = 42)]
    seed: u64,
    #[arg(short, long, default_value_t = 200)]
    turns: u64,
    /// Number of generated levels to play through
    #[arg(short, long, default_value_t = 4)]
    levels: u64,
}

fn roll(rng: &mut ChaCha8Rng, below: u64) -> u64 {
    rng.next_u64() % below.max(1)
}

fn choose<T: Copy>(rng: &mut ChaCha8Rng, slice: &[T]) -> T {
    slice[roll(rng, slice.len() as u64) as usize]
}

fn random_pos(rng: &mut ChaCha8Rng, map: &GameMap) -> Pos {
    let grid = map.grid();
    Pos::new(roll(rng, grid.max_x() as u64 + 1) as i32, roll(rng, grid.max_y() as u64 + 1) as i32)
}

fn random_level(rng: &mut ChaCha8Rng) -> Result<(GameMap, Vec<PlayerId>)> {
    let params = MapGenParams {
        width: 16 + roll(rng, 24) as i32,
        height: 16 + roll(rng, 16) as i32,
        seed: rng.next_u64(),
        seats: 1 + roll(rng, 4) as usize,
        creatures_per_seat: 1 + roll(rng, 8) as usize,
        ..MapGenParams::default()
    };
    let mut map = GameMap::default();
    mapgen::generate(&mut map, &params)?;
    map.set_max_ai_threads(choose(rng, &[1, 2, 3, 8]));
    let mut players = Vec::new();
    while map.registry().num_empty_seats() > 0 {
        let player = map.add_player(Player::new(format!("fuzzer{}", players.len())))?;
        map.assign_ai(player, "NullAI", "")?;
        players.push(player);
    }
    Ok((map, players))
}

/// Moves one creature between the field and a hand, the way a player would.
fn meddle(rng: &mut ChaCha8Rng, map: &mut GameMap, players: &[PlayerId]) {
    let player = choose(rng, players);
    if map.num_creatures_in_hand(player, None) > 0 {
        let target = random_pos(rng, map);
        if map.is_drop_creature_possible(player, target, 0, false) {
            let _ = map.drop_creature(player, target, 0);
        }
        return;
    }
    let Some(seat) = map.registry().player(player).and_then(|player| player.seat) else { return };
    let Some(color) = map.registry().seat(seat).map(|seat| seat.color) else { return };
    let owned: Vec<_> =
        map.registry().creatures_by_color(color).iter().map(|creature| creature.id()).collect();
    if !owned.is_empty() {
        let _ = map.pick_up_creature(player, choose(rng, &owned));
    }
}

fn check_invariants(rng: &mut ChaCha8Rng, map: &GameMap, expected_turn: u64) -> Result<()> {
    ensure!(
        map.current_turn() == expected_turn,
        "turn {} should be {expected_turn}",
        map.current_turn()
    );
    for creature in map.registry().creatures() {
        let state = creature.state();
        ensure!(
            state.hp <= state.max_hp,
            "{} has {} of {} hp",
            creature.name(),
            state.hp,
            state.max_hp
        );
        if state.in_hand {
            continue;
        }
        let standing =
            map.grid().get_pos(state.pos).is_some_and(|tile| tile.permits(creature.move_class()));
        ensure!(standing, "{} stands on a blocked tile at {}", creature.name(), state.pos);
    }
    for _ in 0..16 {
        let (a, b) = (random_pos(rng, map), random_pos(rng, map));
        if a == b {
            continue;
        }
        for class in PassClass::ALL {
            let exists = map.path_exists(a.x, a.y, b.x, b.y, class);
            let found = !map.path(a.x, a.y, b.x, b.y, class).is_empty();
            ensure!(
                exists == found,
                "path_exists({a} -> {b}, {class:?}) = {exists} but search found {found}"
            );
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    println!(
        "Starting fuzz harness on seed {} for {} levels of {} turns...",
        args.seed, args.levels, args.turns
    );
    let mut rng = ChaCha8Rng::seed_from_u64(args.seed);

    for level in 0..args.levels {
        let (mut map, players) = random_level(&mut rng)?;
        for turn in 0..args.turns {
            if roll(&mut rng, 4) == 0 {
                meddle(&mut rng, &mut map, &players);
            }
            let report = map.do_turn(0.5);
            ensure!(report.turn == turn, "report for turn {} arrived as turn {turn}", report.turn);
            ensure!(report.failures == 0, "{} behaviours failed on turn {turn}", report.failures);
            check_invariants(&mut rng, &map, turn + 1)?;
        }
        println!(
            "Level {level}: {} creatures, {} winners, hash {}",
            map.registry().num_creatures(),
            map.registry().num_winning_seats(),
            map.snapshot_hash()
        );
    }

    println!("Fuzzing completed successfully.");
    Ok(())
}
