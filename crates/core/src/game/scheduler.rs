//! Turn driver: splits creatures into shards, runs one worker per shard,
//! then performs serial upkeep and the deletion flush.

use std::any::Any;
use std::ops::Range;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, error, warn};

use super::*;
use crate::behavior::{TurnContext, TurnOutput};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum TurnPhase {
    Idle,
    Dispatching,
    WorkerRunning,
    Joining,
    Upkeep,
    DeletionFlush,
}

#[derive(Debug)]
struct ClockState {
    turn: u64,
    phase: TurnPhase,
    shutdown: bool,
}

/// Shared turn counter and phase. Other threads may wait on it for a turn
/// to complete.
#[derive(Debug)]
pub struct TurnClock {
    state: Mutex<ClockState>,
    changed: Condvar,
}

impl Default for TurnClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TurnClock {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ClockState { turn: 0, phase: TurnPhase::Idle, shutdown: false }),
            changed: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ClockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn current_turn(&self) -> u64 {
        self.lock().turn
    }

    pub fn phase(&self) -> TurnPhase {
        self.lock().phase
    }

    pub(crate) fn set_phase(&self, phase: TurnPhase) {
        self.lock().phase = phase;
        self.changed.notify_all();
    }

    /// Ends the running turn: back to idle and the counter moves by one.
    pub(crate) fn finish_turn(&self) -> u64 {
        let mut state = self.lock();
        state.phase = TurnPhase::Idle;
        state.turn += 1;
        let turn = state.turn;
        drop(state);
        self.changed.notify_all();
        turn
    }

    /// Blocks until the counter reaches `turn` or shutdown is requested.
    pub fn wait_for_turn(&self, turn: u64) -> u64 {
        let state = self.lock();
        let state = self
            .changed
            .wait_while(state, |state| state.turn < turn && !state.shutdown)
            .unwrap_or_else(PoisonError::into_inner);
        state.turn
    }

    /// Like `wait_for_turn` but gives up after `timeout`.
    pub fn wait_for_turn_timeout(&self, turn: u64, timeout: Duration) -> Option<u64> {
        let state = self.lock();
        let (state, _) = self
            .changed
            .wait_timeout_while(state, timeout, |state| state.turn < turn && !state.shutdown)
            .unwrap_or_else(PoisonError::into_inner);
        (state.turn >= turn).then_some(state.turn)
    }

    pub fn request_shutdown(&self) {
        self.lock().shutdown = true;
        self.changed.notify_all();
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.lock().shutdown
    }

    pub(crate) fn clear_shutdown(&self) {
        self.lock().shutdown = false;
    }
}

/// Summary of one completed turn.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TurnReport {
    pub turn: u64,
    pub shards: usize,
    pub creature_turns: usize,
    pub failures: usize,
    pub commands_applied: usize,
    pub deletions: usize,
    pub reclaimed: usize,
    pub creature_turns_micros: u64,
    pub upkeep_micros: u64,
}

#[derive(Debug, Default)]
struct WorkerOutput {
    first_order: usize,
    creature_turns: usize,
    failures: usize,
    turn: TurnOutput,
}

/// Splits `len` items over at most `threads` shards. Each shard gets
/// `len / threads` items, the last one also takes the remainder and empty
/// shards are dropped.
pub(crate) fn shard_bounds(len: usize, threads: usize) -> Vec<Range<usize>> {
    let threads = threads.max(1);
    let per_shard = len / threads;
    (0..threads)
        .map(|index| {
            let start = index * per_shard;
            let end = if index == threads - 1 { len } else { start + per_shard };
            start..end
        })
        .filter(|range| !range.is_empty())
        .collect()
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

/// Runs every creature of one shard. A failing or panicking creature is
/// logged and skipped; the rest of the shard still runs.
fn run_shard(
    map: &GameMap,
    shard: &[Arc<Creature>],
    first_order: usize,
    turn: u64,
    frame_time: f64,
) -> WorkerOutput {
    let mut ctx = TurnContext::new(map, turn);
    let mut creature_turns = 0;
    let mut failures = 0;
    for (offset, creature) in shard.iter().enumerate() {
        if creature.is_queued_for_deletion() {
            continue;
        }
        ctx.set_order(first_order + offset);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let mut behavior = creature.behavior();
            behavior.do_turn(creature, &mut ctx, frame_time)
        }));
        creature_turns += 1;
        creature.state_mut().turns_taken += 1;
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                failures += 1;
                warn!(creature = creature.name(), turn, %err, "creature turn failed");
            }
            Err(payload) => {
                failures += 1;
                let panic = panic_message(payload.as_ref());
                error!(creature = creature.name(), turn, panic, "creature turn panicked");
            }
        }
    }
    WorkerOutput { first_order, creature_turns, failures, turn: ctx.into_output() }
}

impl GameMap {
    /// Runs one full turn: creature turns on up to `max_ai_threads` workers,
    /// then upkeep, then the deletion flush. The turn counter advances by
    /// exactly one.
    pub fn do_turn(&mut self, frame_time: f64) -> TurnReport {
        let turn = self.clock.current_turn();
        let started = Instant::now();

        self.clock.set_phase(TurnPhase::Dispatching);
        let live: Vec<Arc<Creature>> =
            self.registry.creatures().filter(|creature| !creature.is_in_hand()).cloned().collect();
        let shards = shard_bounds(live.len(), self.config.max_ai_threads);
        debug!(turn, creatures = live.len(), shards = shards.len(), "dispatching creature turns");

        let outputs = self.run_creature_turns(&live, &shards, turn, frame_time);
        let creature_turns_micros = elapsed_micros(started);

        let mut report = TurnReport {
            turn,
            shards: shards.len(),
            creature_turns_micros,
            ..TurnReport::default()
        };
        let mut deletions = Vec::new();
        let mut commands = Vec::new();
        for output in outputs {
            report.creature_turns += output.creature_turns;
            report.failures += output.failures;
            deletions.extend(output.turn.deletions);
            commands.extend(output.turn.commands);
        }
        commands.sort_by_key(|(order, _)| *order);

        self.clock.set_phase(TurnPhase::Upkeep);
        let upkeep_started = Instant::now();
        report.commands_applied =
            self.do_misc_upkeep(commands.into_iter().map(|(_, command)| command), frame_time);
        report.upkeep_micros = elapsed_micros(upkeep_started);

        self.clock.set_phase(TurnPhase::DeletionFlush);
        deletions.append(&mut self.pending_deletions);
        report.deletions = self.process_deletion_queue(turn, deletions);
        if self.config.reclaim_on_flush {
            report.reclaimed = self.reclaim_deleted();
        }

        self.clock.finish_turn();
        debug!(
            turn,
            creature_turns = report.creature_turns,
            failures = report.failures,
            deletions = report.deletions,
            "turn finished"
        );
        report
    }

    /// Runs `turns` turns back to back, stopping early once shutdown is
    /// requested on the turn clock. The request is cleared on return.
    pub fn run_turns(&mut self, turns: u64, frame_time: f64) -> Vec<TurnReport> {
        let mut reports = Vec::new();
        for _ in 0..turns {
            if self.clock.is_shutdown_requested() {
                break;
            }
            reports.push(self.do_turn(frame_time));
        }
        self.clock.clear_shutdown();
        reports
    }

    fn run_creature_turns(
        &self,
        live: &[Arc<Creature>],
        shards: &[Range<usize>],
        turn: u64,
        frame_time: f64,
    ) -> Vec<WorkerOutput> {
        self.clock.set_phase(TurnPhase::WorkerRunning);
        thread::scope(|scope| {
            let mut handles = Vec::with_capacity(shards.len());
            let mut outputs = Vec::new();
            for (index, range) in shards.iter().enumerate() {
                let shard = &live[range.clone()];
                let first_order = range.start;
                let spawned = thread::Builder::new()
                    .name(format!("creature-worker-{index}"))
                    .spawn_scoped(scope, move || {
                        run_shard(self, shard, first_order, turn, frame_time)
                    });
                match spawned {
                    Ok(handle) => handles.push(handle),
                    Err(err) => {
                        warn!(shard = index, %err, "could not spawn worker, running shard inline");
                        outputs.push(run_shard(self, shard, first_order, turn, frame_time));
                    }
                }
            }
            self.clock.set_phase(TurnPhase::Joining);
            for handle in handles {
                match handle.join() {
                    Ok(output) => outputs.push(output),
                    Err(payload) => {
                        error!(panic = panic_message(payload.as_ref()), "creature worker panicked");
                    }
                }
            }
            outputs.sort_by_key(|output| output.first_order);
            outputs
        })
    }
}

fn elapsed_micros(since: Instant) -> u64 {
    u64::try_from(since.elapsed().as_micros()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::behavior::CreatureBehavior;
    use crate::game::test_support::{add_test_class, map_from_rows};

    struct Counting(Arc<AtomicUsize>);

    impl CreatureBehavior for Counting {
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

    struct Failing;

    impl CreatureBehavior for Failing {
        fn do_turn(
            &mut self,
            _creature: &Creature,
            _ctx: &mut TurnContext<'_>,
            _frame_time: f64,
        ) -> Result<(), TurnError> {
            Err(TurnError::Behavior { reason: "always fails".to_owned() })
        }
    }

    struct Panicking;

    impl CreatureBehavior for Panicking {
        fn do_turn(
            &mut self,
            _creature: &Creature,
            _ctx: &mut TurnContext<'_>,
            _frame_time: f64,
        ) -> Result<(), TurnError> {
            panic!("behaviour bug");
        }
    }

    fn populated(creatures: usize, counter: &Arc<AtomicUsize>) -> GameMap {
        let mut map = map_from_rows(&["........", "........", "........"]);
        add_test_class(&mut map, "Imp", false);
        for index in 0..creatures {
            let pos = Pos::new((index % 8) as i32, 0);
            let spawn = CreatureSpawn::new(format!("imp{index}"), "Imp", 1, pos)
                .with_behavior(Counting(Arc::clone(counter)));
            map.add_creature(spawn).unwrap();
        }
        map
    }

    #[test]
    fn shards_cover_every_index_once() {
        assert_eq!(shard_bounds(10, 3), vec![0..3, 3..6, 6..10]);
        assert_eq!(shard_bounds(2, 4), vec![0..2]);
        assert_eq!(shard_bounds(0, 4), Vec::<Range<usize>>::new());
        assert_eq!(shard_bounds(5, 0), vec![0..5]);
        for len in 0..40 {
            for threads in 1..9 {
                let total: usize = shard_bounds(len, threads).iter().map(|r| r.len()).sum();
                assert_eq!(total, len);
                assert!(shard_bounds(len, threads).len() <= threads);
            }
        }
    }

    #[test]
    fn every_creature_runs_once_per_turn_for_any_thread_count() {
        for threads in 1..=8 {
            let counter = Arc::new(AtomicUsize::new(0));
            let mut map = populated(13, &counter);
            map.set_max_ai_threads(threads);
            let report = map.do_turn(0.5);
            assert_eq!(counter.load(Ordering::SeqCst), 13, "threads = {threads}");
            assert_eq!(report.creature_turns, 13);
            assert!(report.shards <= threads);
        }
    }

    #[test]
    fn turn_counter_advances_by_exactly_one() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut map = populated(3, &counter);
        for expected in 1..=5 {
            let report = map.do_turn(0.5);
            assert_eq!(report.turn, expected - 1);
            assert_eq!(map.current_turn(), expected);
            assert_eq!(map.turn_clock().phase(), TurnPhase::Idle);
        }
        assert_eq!(map.registry().creature("imp0").map(|c| c.state().turns_taken), Some(5));
    }

    #[test]
    fn failures_and_panics_do_not_stop_other_creatures() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut map = populated(4, &counter);
        let broken = CreatureSpawn::new("broken", "Imp", 1, Pos::new(0, 1)).with_behavior(Failing);
        map.add_creature(broken).unwrap();
        let buggy = CreatureSpawn::new("buggy", "Imp", 1, Pos::new(1, 1)).with_behavior(Panicking);
        map.add_creature(buggy).unwrap();
        map.set_max_ai_threads(1);

        let report = map.do_turn(0.5);
        assert_eq!(counter.load(Ordering::SeqCst), 4);
        assert_eq!(report.failures, 2);
        assert_eq!(report.creature_turns, 6);

        // A behaviour that panicked once keeps being scheduled.
        let report = map.do_turn(0.5);
        assert_eq!(report.failures, 2);
        assert_eq!(counter.load(Ordering::SeqCst), 8);
    }

    #[test]
    fn creatures_in_hand_are_not_scheduled() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut map = populated(2, &counter);
        let id = map.registry().creature("imp1").map(|c| c.id()).unwrap();
        map.registry().creature_by_id(id).unwrap().state_mut().in_hand = true;
        map.do_turn(0.5);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn waiting_threads_wake_when_the_turn_completes() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut map = populated(1, &counter);
        let clock = map.turn_clock();
        let waiter = thread::spawn(move || clock.wait_for_turn(2));
        map.do_turn(0.5);
        map.do_turn(0.5);
        assert_eq!(waiter.join().unwrap(), 2);
        assert_eq!(map.turn_clock().wait_for_turn_timeout(5, Duration::from_millis(10)), None);
    }

    #[test]
    fn shutdown_stops_run_turns() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut map = populated(1, &counter);
        assert_eq!(map.run_turns(3, 0.5).len(), 3);
        map.turn_clock().request_shutdown();
        assert!(map.run_turns(3, 0.5).is_empty());
        assert!(!map.turn_clock().is_shutdown_requested());
        assert_eq!(map.current_turn(), 3);
    }
}
