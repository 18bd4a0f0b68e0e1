//! Per-turn reader locks that keep deleted creatures alive while another
//! thread (usually a renderer) still looks at that turn.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, info};

use super::*;

#[derive(Debug, Default)]
pub struct TurnLocks {
    counts: Mutex<BTreeMap<u64, u32>>,
    released: Condvar,
}

impl TurnLocks {
    fn counts(&self) -> MutexGuard<'_, BTreeMap<u64, u32>> {
        self.counts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn thread_lock_for_turn(&self, turn: u64) {
        *self.counts().entry(turn).or_insert(0) += 1;
    }

    /// Returns `false` when the turn was not locked.
    pub fn thread_unlock_for_turn(&self, turn: u64) -> bool {
        let mut counts = self.counts();
        let Some(count) = counts.get_mut(&turn) else {
            return false;
        };
        *count -= 1;
        if *count == 0 {
            counts.remove(&turn);
            drop(counts);
            self.released.notify_all();
        }
        true
    }

    pub fn lock_count(&self, turn: u64) -> u32 {
        self.counts().get(&turn).copied().unwrap_or(0)
    }

    pub fn is_locked(&self, turn: u64) -> bool {
        self.lock_count(turn) > 0
    }

    /// Takes a lock released when the guard is dropped.
    pub fn lock(self: &Arc<Self>, turn: u64) -> TurnLockGuard {
        self.thread_lock_for_turn(turn);
        TurnLockGuard { locks: Arc::clone(self), turn }
    }

    /// Blocks until nobody holds `turn`, or the timeout passes. Returns
    /// whether the turn is free.
    pub fn wait_until_released(&self, turn: u64, timeout: Duration) -> bool {
        let counts = self.counts();
        let (counts, _) = self
            .released
            .wait_timeout_while(counts, timeout, |counts| counts.contains_key(&turn))
            .unwrap_or_else(PoisonError::into_inner);
        !counts.contains_key(&turn)
    }
}

#[derive(Debug)]
pub struct TurnLockGuard {
    locks: Arc<TurnLocks>,
    turn: u64,
}

impl TurnLockGuard {
    pub fn turn(&self) -> u64 {
        self.turn
    }
}

impl Clone for TurnLockGuard {
    fn clone(&self) -> Self {
        self.locks.lock(self.turn)
    }
}

impl Drop for TurnLockGuard {
    fn drop(&mut self) {
        self.locks.thread_unlock_for_turn(self.turn);
    }
}

impl GameMap {
    pub fn thread_lock_for_turn(&self, turn: u64) {
        self.turn_locks.thread_lock_for_turn(turn);
    }

    pub fn thread_unlock_for_turn(&self, turn: u64) -> bool {
        self.turn_locks.thread_unlock_for_turn(turn)
    }

    /// Removes the queued creatures from the registry and parks them under
    /// `turn` until they can be reclaimed. Returns how many were removed.
    pub(super) fn process_deletion_queue(&mut self, turn: u64, queued: Vec<CreatureId>) -> usize {
        let mut removed = 0;
        for id in queued {
            let Some(creature) = self.remove_creature(id) else { continue };
            debug!(creature = creature.name(), turn, "creature deleted");
            self.graveyard.entry(turn).or_default().push(creature);
            removed += 1;
        }
        removed
    }

    /// Drops deleted creatures from turns before the current one that no
    /// thread holds a lock on any more.
    pub fn reclaim_deleted(&mut self) -> usize {
        let current = self.clock.current_turn();
        let locks = Arc::clone(&self.turn_locks);
        let ready: Vec<u64> = self
            .graveyard
            .keys()
            .copied()
            .filter(|turn| *turn < current && !locks.is_locked(*turn))
            .collect();
        let mut reclaimed = 0;
        for turn in ready {
            if let Some(creatures) = self.graveyard.remove(&turn) {
                reclaimed += creatures.len();
            }
        }
        if reclaimed > 0 {
            info!(reclaimed, "reclaimed deleted creatures");
        }
        reclaimed
    }

    /// Deleted creatures still waiting for reclamation.
    pub fn pending_reclamation(&self) -> usize {
        self.graveyard.values().map(Vec::len).sum()
    }
}
