//! Serial end-of-turn work: player AI, map commands, seat goals and active
//! objects. Runs with exclusive access to the map.

use tracing::{debug, info, trace};

use super::*;
use crate::grid::crow_distance;

/// Gold credited to the digger's seat per point of gold fullness removed.
const GOLD_PER_FULLNESS: f64 = 5.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum GoalStatus {
    Met,
    Unmet,
    Failed,
}

impl GameMap {
    /// Applies the creature commands in order, then AI commands, then ticks
    /// seats and active objects. Returns how many commands changed the map.
    pub(super) fn do_misc_upkeep(
        &mut self,
        commands: impl IntoIterator<Item = MapCommand>,
        frame_time: f64,
    ) -> usize {
        let mut ai_manager = mem::take(&mut self.ai_manager);
        let ai_commands = ai_manager.do_turn(self, frame_time);
        self.ai_manager = ai_manager;

        let mut applied = 0;
        for command in commands.into_iter().chain(ai_commands) {
            if self.apply_command(&command) {
                applied += 1;
            }
        }

        for player in self.registry.players.values_mut() {
            player.fighting_time = (player.fighting_time - frame_time).max(0.0);
        }
        self.seat_upkeep();
        self.tick_active_objects();
        applied
    }

    /// Returns `false` when the command no longer applies, e.g. a wall that
    /// another creature finished digging earlier in the same upkeep.
    pub fn apply_command(&mut self, command: &MapCommand) -> bool {
        match *command {
            MapCommand::Dig { pos, amount, color } => {
                let Some(tile) = self.grid.get_pos(pos) else { return false };
                if tile.passability() != Passability::Diggable {
                    return false;
                }
                let was_gold = tile.kind() == TileKind::Gold;
                let before = tile.fullness();
                let Some(after) = self.dig(pos, amount) else { return false };
                if was_gold {
                    let mined = ((before - after) * GOLD_PER_FULLNESS).round() as i64;
                    let stored = self.registry.deposit_gold(mined, color);
                    trace!(color, mined, stored, "gold mined");
                }
                true
            }
            MapCommand::Claim { pos, color } => self.claim_tile(pos, color),
        }
    }

    fn seat_upkeep(&mut self) {
        let claimed = self.claimed_tiles_by_color();
        for id in self.registry.filled_seats.clone() {
            let Some(seat) = self.registry.seats.get(id) else { continue };
            let color = seat.color;
            let pending: Vec<GoalStatus> =
                seat.goals.iter().map(|goal| self.goal_status(goal, color)).collect();
            let completed: Vec<GoalStatus> =
                seat.completed_goals.iter().map(|goal| self.goal_status(goal, color)).collect();
            let gold = self.registry.total_gold_for_color(color);

            let Some(seat) = self.registry.seats.get_mut(id) else { continue };
            seat.gold = gold;
            seat.claimed_tiles = claimed.get(&color).copied().unwrap_or(0);

            // Re-check earlier completions before adding this turn's ones.
            let mut still_completed = Vec::new();
            for (goal, status) in mem::take(&mut seat.completed_goals).into_iter().zip(completed) {
                match status {
                    GoalStatus::Failed => seat.failed_goals.push(goal),
                    GoalStatus::Met | GoalStatus::Unmet => still_completed.push(goal),
                }
            }
            seat.completed_goals = still_completed;

            let mut still_pending = Vec::new();
            for (goal, status) in mem::take(&mut seat.goals).into_iter().zip(pending) {
                match status {
                    GoalStatus::Met => seat.completed_goals.push(goal),
                    GoalStatus::Failed => seat.failed_goals.push(goal),
                    GoalStatus::Unmet => still_pending.push(goal),
                }
            }
            seat.goals = still_pending;

            let won = seat.has_won();
            if won && !self.registry.winning_seats.contains(&id) {
                info!(color, "seat completed all of its goals");
                self.registry.winning_seats.push(id);
            }
        }
    }

    fn claimed_tiles_by_color(&self) -> BTreeMap<SeatColor, usize> {
        let mut claimed = BTreeMap::new();
        for tile in self.grid.iter() {
            if tile.kind() == TileKind::Claimed
                && let Some(color) = tile.color()
            {
                *claimed.entry(color).or_insert(0) += 1;
            }
        }
        claimed
    }

    fn goal_status(&self, goal: &Goal, color: SeatColor) -> GoalStatus {
        let met = |condition: bool| if condition { GoalStatus::Met } else { GoalStatus::Unmet };
        match goal {
            Goal::ClaimTiles(count) => {
                let claimed = self
                    .grid
                    .iter()
                    .filter(|tile| tile.kind() == TileKind::Claimed && tile.color() == Some(color))
                    .count();
                met(claimed >= *count)
            }
            Goal::MineGold(amount) => met(self.registry.total_gold_for_color(color) >= *amount),
            Goal::ProtectDungeonTemple => {
                if self.registry.num_rooms_by_type_and_color(RoomKind::DungeonTemple, color) > 0 {
                    GoalStatus::Met
                } else {
                    GoalStatus::Failed
                }
            }
            Goal::KillAllEnemies => met(self
                .registry
                .creatures()
                .all(|creature| creature.color() == color || creature.color() == NEUTRAL_COLOR)),
        }
    }

    fn tick_active_objects(&mut self) {
        for object in self.registry.active_objects.clone() {
            let keep = match object {
                ActiveRef::Room(id) => self.room_upkeep(id),
                ActiveRef::Trap(id) => self.trap_upkeep(id),
                ActiveRef::Missile(id) => self.missile_upkeep(id),
            };
            if !keep {
                self.registry.remove_active_object(object);
                if let ActiveRef::Missile(id) = object {
                    self.registry.missiles.remove(id);
                }
            }
        }
        let added = self.registry.drain_new_active_objects();
        if added > 0 {
            trace!(added, "activated new objects");
        }
    }

    fn room_upkeep(&mut self, id: RoomId) -> bool {
        let spawn_turns = self.config.temple_spawn_turns;
        let Some(room) = self.registry.rooms.get_mut(id) else {
            return false;
        };
        if room.kind != RoomKind::DungeonTemple {
            return true;
        }
        room.spawn_countdown = room.spawn_countdown.saturating_sub(1);
        if room.spawn_countdown > 0 {
            return true;
        }
        room.spawn_countdown = spawn_turns;
        let color = room.color;
        let Some(at) = room.central_tile() else {
            return true;
        };
        self.produce_worker(color, at);
        true
    }

    fn produce_worker(&mut self, color: SeatColor, at: Pos) {
        let Some(class) = self
            .registry
            .classes
            .iter()
            .find(|class| class.is_worker)
            .map(|class| class.name.clone())
        else {
            debug!(color, "dungeon temple has no worker class to produce");
            return;
        };
        let name = self.unique_creature_name(&class);
        match self.add_creature(CreatureSpawn::new(name.clone(), class, color, at)) {
            Ok(_) => info!(creature = %name, color, "dungeon temple produced a worker"),
            Err(err) => debug!(%err, "dungeon temple could not produce a worker"),
        }
    }

    fn trap_upkeep(&mut self, id: TrapId) -> bool {
        let Some(trap) = self.registry.traps.get_mut(id) else {
            return false;
        };
        if trap.cooldown > 0 {
            trap.cooldown -= 1;
            return true;
        }
        let trap = trap.clone();
        let fired = match trap.kind {
            TrapKind::Spike => {
                let victims = self.get_visible_force(&trap.tiles, trap.color, true);
                for victim in &victims {
                    self.damage_creature(victim, trap.damage);
                }
                !victims.is_empty()
            }
            TrapKind::Cannon | TrapKind::Boulder => self.fire_missile(&trap),
        };
        if fired && let Some(trap) = self.registry.traps.get_mut(id) {
            trap.cooldown = trap.reload_turns;
        }
        true
    }

    fn fire_missile(&mut self, trap: &Trap) -> bool {
        let Some(&origin) = trap.tiles.first() else {
            return false;
        };
        let visible = self.visible_tiles(origin, trap.range);
        let target = self
            .get_visible_force(&visible, trap.color, true)
            .iter()
            .map(|creature| creature.pos())
            .min_by(|a, b| {
                crow_distance(origin, *a).total_cmp(&crow_distance(origin, *b)).then(a.cmp(b))
            });
        let Some(target) = target else {
            return false;
        };
        self.add_missile_object(MissileObject::new(
            trap.color,
            origin,
            target,
            trap.missile_speed(),
            trap.damage,
        ));
        debug!(kind = trap.kind.as_str(), %origin, %target, "trap fired");
        true
    }

    fn missile_upkeep(&mut self, id: MissileId) -> bool {
        let Some(missile) = self.registry.missiles.get_mut(id) else {
            return false;
        };
        let remaining = missile.remaining_distance();
        if remaining <= missile.speed {
            let missile = missile.clone();
            let victims: Vec<Arc<Creature>> = self
                .registry
                .creatures()
                .filter(|creature| {
                    creature.color() != missile.color
                        && !creature.is_in_hand()
                        && creature.pos() == missile.destination
                })
                .cloned()
                .collect();
            for victim in &victims {
                self.damage_creature(victim, missile.damage);
            }
            return false;
        }
        let dest = missile.destination;
        missile.x += (f64::from(dest.x) - missile.x) / remaining * missile.speed;
        missile.y += (f64::from(dest.y) - missile.y) / remaining * missile.speed;
        let tile = missile.tile();
        self.grid.get_pos(tile).is_some_and(|tile| tile.permits(PassClass::Flyable))
    }

    /// Lowers hit points and queues the creature for deletion once it drops
    /// to zero.
    pub fn damage_creature(&mut self, creature: &Creature, damage: i32) {
        let hp = {
            let mut state = creature.state_mut();
            state.hp -= damage;
            state.hp
        };
        if hp <= 0 {
            debug!(creature = creature.name(), "creature died");
            self.queue_creature_for_deletion(creature.id());
        }
    }
}
