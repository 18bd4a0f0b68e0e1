//! Per-creature turn logic run by the worker threads.
//! A behaviour may read the whole map and write its own creature's state.
//! Anything that changes the map structure is returned as a `MapCommand`.

use std::collections::VecDeque;
use std::hash::Hasher;

use rand_chacha::ChaCha8Rng;
use rand_chacha::rand_core::{Rng, SeedableRng};
use xxhash_rust::xxh3::Xxh3;

use crate::entities::{Creature, CreatureClass};
use crate::game::GameMap;
use crate::grid::crow_distance;
use crate::types::*;

pub trait CreatureBehavior: Send {
    fn do_turn(
        &mut self,
        creature: &Creature,
        ctx: &mut TurnContext<'_>,
        frame_time: f64,
    ) -> Result<(), TurnError>;
}

/// What one worker collected while running its shard.
#[derive(Debug, Default)]
pub(crate) struct TurnOutput {
    pub(crate) deletions: Vec<CreatureId>,
    /// Tagged with the issuing creature's dispatch index.
    pub(crate) commands: Vec<(usize, MapCommand)>,
}

pub struct TurnContext<'a> {
    map: &'a GameMap,
    turn: u64,
    order: usize,
    output: TurnOutput,
}

impl<'a> TurnContext<'a> {
    pub(crate) fn new(map: &'a GameMap, turn: u64) -> Self {
        Self { map, turn, order: 0, output: TurnOutput::default() }
    }

    pub(crate) fn set_order(&mut self, order: usize) {
        self.order = order;
    }

    pub(crate) fn into_output(self) -> TurnOutput {
        self.output
    }

    pub fn map(&self) -> &'a GameMap {
        self.map
    }

    pub fn turn(&self) -> u64 {
        self.turn
    }

    /// Random stream that depends only on the map seed, the turn and the
    /// creature, so results do not change with the worker count.
    pub fn rng(&self, creature: &Creature) -> ChaCha8Rng {
        let mut hasher = Xxh3::new();
        hasher.write_u64(self.map.seed());
        hasher.write_u64(self.turn);
        hasher.write(creature.name().as_bytes());
        ChaCha8Rng::seed_from_u64(hasher.finish())
    }

    /// Marks a creature for removal at the end of the turn. It stays readable
    /// until then. Returns `false` when it was already queued or is unknown.
    pub fn queue_for_deletion(&mut self, id: CreatureId) -> bool {
        let Some(creature) = self.map.registry().creature_by_id(id) else {
            return false;
        };
        if !creature.mark_for_deletion() {
            return false;
        }
        self.output.deletions.push(id);
        true
    }

    pub fn push_command(&mut self, command: MapCommand) {
        self.output.commands.push((self.order, command));
    }
}

/// Does nothing. Used for creatures that only exist to be looked at.
#[derive(Clone, Copy, Debug, Default)]
pub struct Idle;

impl CreatureBehavior for Idle {
    fn do_turn(
        &mut self,
        _creature: &Creature,
        _ctx: &mut TurnContext<'_>,
        _frame_time: f64,
    ) -> Result<(), TurnError> {
        Ok(())
    }
}

const WANDER_RADIUS: f64 = 6.0;
const MAX_DIG_SITE_CANDIDATES: usize = 8;

/// Walks to random reachable tiles nearby.
#[derive(Clone, Copy, Debug, Default)]
pub struct Wander;

impl CreatureBehavior for Wander {
    fn do_turn(
        &mut self,
        creature: &Creature,
        ctx: &mut TurnContext<'_>,
        _frame_time: f64,
    ) -> Result<(), TurnError> {
        ensure_standing(creature, ctx)?;
        if step_along_queue(creature, ctx) {
            return Ok(());
        }
        plan_wander(creature, ctx);
        step_along_queue(creature, ctx);
        Ok(())
    }
}

/// Worker behaviour: digs adjacent walls, claims the floor it stands on and
/// walks towards the nearest wall it can dig.
#[derive(Clone, Copy, Debug, Default)]
pub struct Digger;

impl CreatureBehavior for Digger {
    fn do_turn(
        &mut self,
        creature: &Creature,
        ctx: &mut TurnContext<'_>,
        _frame_time: f64,
    ) -> Result<(), TurnError> {
        ensure_standing(creature, ctx)?;
        if step_along_queue(creature, ctx) {
            return Ok(());
        }
        let map = ctx.map();
        let pos = creature.pos();

        let wall = map.grid()
            .neighbor_tiles(pos.x, pos.y)
            .into_iter()
            .find(|tile| tile.passability() == Passability::Diggable)
            .map(|tile| tile.pos());
        if let Some(wall) = wall
            && creature.dig_rate() > 0.0
        {
            ctx.push_command(MapCommand::Dig {
                pos: wall,
                amount: creature.dig_rate(),
                color: creature.color(),
            });
            return Ok(());
        }

        let claimable = map.get_tile(pos.x, pos.y).is_some_and(|tile| {
            tile.fullness() == 0.0
                && (tile.kind() == TileKind::Dirt
                    || (tile.kind() == TileKind::Claimed && tile.color() != Some(creature.color())))
        });
        if claimable && creature.color() != NEUTRAL_COLOR {
            ctx.push_command(MapCommand::Claim { pos, color: creature.color() });
            return Ok(());
        }

        match nearest_dig_site(creature, map) {
            Some(path) => set_walk_queue(creature, path),
            None => plan_wander(creature, ctx),
        }
        step_along_queue(creature, ctx);
        Ok(())
    }
}

pub fn for_class(class: &CreatureClass) -> Box<dyn CreatureBehavior> {
    if class.is_worker { Box::new(Digger) } else { Box::new(Wander) }
}

fn ensure_standing(creature: &Creature, ctx: &TurnContext<'_>) -> Result<(), TurnError> {
    let pos = creature.pos();
    match ctx.map().get_tile(pos.x, pos.y) {
        Some(_) => Ok(()),
        None => Err(TurnError::Stuck { x: pos.x, y: pos.y }),
    }
}

/// Moves one tile along the walk queue. A blocked step drops the queue.
fn step_along_queue(creature: &Creature, ctx: &TurnContext<'_>) -> bool {
    let mut state = creature.state_mut();
    let Some(next) = state.walk_queue.pop_front() else {
        return false;
    };
    let open =
        ctx.map().get_tile(next.x, next.y).is_some_and(|tile| tile.permits(creature.move_class()));
    if open {
        state.pos = next;
        true
    } else {
        state.walk_queue.clear();
        false
    }
}

fn set_walk_queue(creature: &Creature, path: Vec<Pos>) {
    let mut queue: VecDeque<Pos> = path.into();
    queue.pop_front();
    creature.state_mut().walk_queue = queue;
}

fn plan_wander(creature: &Creature, ctx: &TurnContext<'_>) {
    let map = ctx.map();
    let pos = creature.pos();
    let class = creature.move_class();
    let candidates: Vec<Pos> = map.grid()
        .circular_region(pos.x, pos.y, WANDER_RADIUS)
        .into_iter()
        .map(|tile| tile.pos())
        .filter(|target| *target != pos && map.path_exists(pos.x, pos.y, target.x, target.y, class))
        .collect();
    if candidates.is_empty() {
        return;
    }
    let mut rng = ctx.rng(creature);
    let target = candidates[(rng.next_u64() % candidates.len() as u64) as usize];
    let path = map.path(pos.x, pos.y, target.x, target.y, class);
    set_walk_queue(creature, path);
}

fn nearest_dig_site(creature: &Creature, map: &GameMap) -> Option<Vec<Pos>> {
    let pos = creature.pos();
    let class = creature.move_class();
    let mut walls: Vec<Pos> = map.grid()
        .circular_region(pos.x, pos.y, creature.sight_radius())
        .into_iter()
        .filter(|tile| tile.passability() == Passability::Diggable)
        .map(|tile| tile.pos())
        .collect();
    walls.sort_by(|a, b| crow_distance(pos, *a).total_cmp(&crow_distance(pos, *b)).then(a.cmp(b)));

    for wall in walls.into_iter().take(MAX_DIG_SITE_CANDIDATES) {
        for stand in map.grid().neighbor_tiles(wall.x, wall.y) {
            let stand = stand.pos();
            if !map.path_exists(pos.x, pos.y, stand.x, stand.y, class) {
                continue;
            }
            let path = map.path(pos.x, pos.y, stand.x, stand.y, class);
            if !path.is_empty() {
                return Some(path);
            }
        }
    }
    None
}
