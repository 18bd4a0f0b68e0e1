use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, mpsc};
use std::thread;
use std::time::Duration;

use dungeon::{
    Creature, CreatureBehavior, CreatureClass, CreatureSpawn, GameMap, MAX_FULLNESS, PassClass, Pos,
    Tile, TileKind, TurnContext, TurnError,
};

fn open_floor(width: i32, height: i32) -> GameMap {
    let mut map = GameMap::default();
    map.disable_flood_fill();
    for y in 0..height {
        for x in 0..width {
            map.add_tile(Tile::new(x, y, TileKind::Dirt, 0.0)).unwrap();
        }
    }
    map.enable_flood_fill();
    map.add_class_description(CreatureClass::new("Knight", PassClass::Walkable)).unwrap();
    map
}

/// Queues its rival for deletion while the rival is doing the same, then
/// checks the rival can still be looked up for the rest of the turn.
struct Duelist {
    rival: &'static str,
    barrier: Arc<Barrier>,
    rival_visible_after_queueing: Arc<AtomicBool>,
}

impl CreatureBehavior for Duelist {
    fn do_turn(
        &mut self,
        _creature: &Creature,
        ctx: &mut TurnContext<'_>,
        _frame_time: f64,
    ) -> Result<(), TurnError> {
        self.barrier.wait();
        let rival = ctx.map()
            .registry()
            .creature(self.rival)
            .ok_or_else(|| TurnError::Behavior { reason: "rival missing".into() })?;
        ctx.queue_for_deletion(rival.id());
        self.barrier.wait();
        let still_there = ctx.map().registry().creature(self.rival).is_some();
        self.rival_visible_after_queueing.store(still_there, Ordering::SeqCst);
        Ok(())
    }
}

#[test]
fn deletions_queued_by_concurrent_workers_apply_after_the_turn() {
    let mut map = open_floor(4, 1);
    map.set_max_ai_threads(2);
    let barrier = Arc::new(Barrier::new(2));
    let seen = [Arc::new(AtomicBool::new(false)), Arc::new(AtomicBool::new(false))];
    for (index, (name, rival)) in [("red", "blue"), ("blue", "red")].into_iter().enumerate() {
        let duelist = Duelist {
            rival,
            barrier: Arc::clone(&barrier),
            rival_visible_after_queueing: Arc::clone(&seen[index]),
        };
        let spawn = CreatureSpawn::new(name, "Knight", 1, Pos::new(index as i32 * 3, 0))
            .with_behavior(duelist);
        map.add_creature(spawn).unwrap();
    }

    let report = map.do_turn(0.5);
    assert_eq!(report.shards, 2);
    assert_eq!(report.creature_turns, 2);
    assert_eq!(report.failures, 0);
    assert_eq!(report.deletions, 2);
    assert!(seen.iter().all(|flag| flag.load(Ordering::SeqCst)));
    assert_eq!(map.registry().num_creatures(), 0);
    assert!(map.registry().creature("red").is_none());

    // Reclaimed once the turn they died in is behind the clock.
    assert_eq!(map.pending_reclamation(), 2);
    map.do_turn(0.5);
    assert_eq!(map.pending_reclamation(), 0);
}

struct Counter(Arc<AtomicUsize>);

impl CreatureBehavior for Counter {
    fn do_turn(
        &mut self,
        _creature: &Creature,
        _ctx: &mut TurnContext<'_>,
        _frame_time: f64,
    ) -> Result<(), TurnError> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[test]
fn renderer_locks_keep_deleted_creatures_until_released() {
    let mut map = open_floor(3, 3);
    let runs = Arc::new(AtomicUsize::new(0));
    let spawn = CreatureSpawn::new("doomed", "Knight", 1, Pos::new(1, 1))
        .with_behavior(Counter(Arc::clone(&runs)));
    let doomed = map.add_creature(spawn).unwrap();

    let (frames, inbox) = mpsc::channel();
    let (release, released) = mpsc::channel::<()>();
    let renderer = thread::spawn(move || {
        let frame: dungeon::TurnSnapshot = inbox.recv().unwrap();
        assert!(frame.is_locked());
        let drawn = frame.creature("doomed").map(|creature| (creature.x, creature.y));
        released.recv().unwrap();
        drop(frame);
        drawn
    });

    frames.send(map.snapshot_locked()).unwrap();
    assert!(map.turn_locks().is_locked(0));
    assert!(map.queue_creature_for_deletion(doomed));
    map.do_turn(0.5);
    map.do_turn(0.5);
    assert_eq!(runs.load(Ordering::SeqCst), 0);
    assert_eq!(map.pending_reclamation(), 1, "turn 0 is still being drawn");

    release.send(()).unwrap();
    assert_eq!(renderer.join().unwrap(), Some((1, 1)));
    assert!(map.turn_locks().wait_until_released(0, Duration::from_secs(5)));
    assert_eq!(map.reclaim_deleted(), 1);
}

#[test]
fn waiters_wake_as_turns_complete() {
    let mut map = open_floor(2, 2);
    let clock = map.turn_clock();
    let waiter = thread::spawn(move || clock.wait_for_turn(3));
    let reports = map.run_turns(3, 0.5);
    assert_eq!(reports.len(), 3);
    assert_eq!(waiter.join().unwrap(), 3);
}

#[test]
fn shutdown_requests_stop_the_run_at_a_turn_boundary() {
    let mut map = open_floor(2, 2);
    map.turn_clock().request_shutdown();
    assert!(map.run_turns(5, 0.5).is_empty());
    assert_eq!(map.current_turn(), 0);
    assert_eq!(map.run_turns(2, 0.5).len(), 2);
}

#[test]
fn digging_merges_walkable_regions_between_turns() {
    let mut map = open_floor(5, 1);
    map.set_tile_kind(Pos::new(2, 0), TileKind::Dirt, MAX_FULLNESS).unwrap();
    assert!(!map.path_exists(0, 0, 4, 0, PassClass::Walkable));
    assert!(map.path_exists(0, 0, 4, 0, PassClass::Diggable));

    map.add_class_description(CreatureClass::worker("Kobold")).unwrap();
    map.add_creature(CreatureSpawn::new("digger", "Kobold", 1, Pos::new(1, 0))).unwrap();
    map.run_turns(4, 0.5);

    assert_eq!(map.get_tile(2, 0).unwrap().fullness(), 0.0);
    assert!(map.path_exists(0, 0, 4, 0, PassClass::Walkable));
    assert_eq!(map.path(0, 0, 4, 0, PassClass::Walkable).len(), 5);
}
