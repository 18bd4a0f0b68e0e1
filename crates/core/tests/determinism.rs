use dungeon::mapgen::generate;
use dungeon::{GameMap, MapGenParams, TurnReport};

fn run(seed: u64, threads: usize, turns: u64) -> (u64, Vec<TurnReport>) {
    let mut map = GameMap::default();
    let params = MapGenParams { seed, seats: 3, creatures_per_seat: 6, ..MapGenParams::default() };
    generate(&mut map, &params).expect("generated map is consistent");
    map.set_max_ai_threads(threads);
    let reports = map.run_turns(turns, 0.7);
    (map.snapshot_hash(), reports)
}

#[test]
fn thread_count_does_not_change_the_outcome() {
    let (baseline, baseline_reports) = run(2024, 1, 12);
    for threads in [2, 4, 7] {
        let (hash, reports) = run(2024, threads, 12);
        assert_eq!(hash, baseline, "hash diverged with {threads} worker threads");
        for (single, sharded) in baseline_reports.iter().zip(&reports) {
            assert_eq!(single.creature_turns, sharded.creature_turns);
            assert_eq!(single.commands_applied, sharded.commands_applied);
            assert_eq!(single.deletions, sharded.deletions);
        }
    }
}

#[test]
fn identical_seeds_produce_identical_runs() {
    let (first, _) = run(99, 3, 8);
    let (second, _) = run(99, 3, 8);
    assert_eq!(first, second, "identical runs must produce identical hashes");
}

#[test]
fn different_seeds_produce_different_runs() {
    let (first, _) = run(123, 2, 4);
    let (second, _) = run(456, 2, 4);
    assert_ne!(first, second, "different seeds should produce different levels");
}

#[test]
fn turns_advance_the_clock_once_each() {
    let (_, reports) = run(7, 4, 5);
    let turns: Vec<u64> = reports.iter().map(|report| report.turn).collect();
    assert_eq!(turns, vec![0, 1, 2, 3, 4]);
    assert!(reports.iter().all(|report| report.failures == 0));
}
