//! Creatures held in a player's hand.

use super::*;

impl GameMap {
    /// Lifts a creature off the map into the player's hand. Held creatures do
    /// not take turns.
    pub fn pick_up_creature(
        &mut self,
        player: PlayerId,
        creature: CreatureId,
    ) -> Result<(), GameError> {
        let held = self.registry.creature_by_id(creature).ok_or(GameError::UnknownCreature)?;
        if held.is_queued_for_deletion() {
            return Err(GameError::UnknownCreature);
        }
        if held.is_in_hand() {
            return Err(GameError::AlreadyInHand);
        }
        let held = Arc::clone(held);
        let hand = &mut self.registry.players.get_mut(player).ok_or(GameError::UnknownPlayer)?.hand;
        {
            let mut state = held.state_mut();
            state.in_hand = true;
            state.walk_queue.clear();
        }
        hand.push(creature);
        Ok(())
    }

    /// Whether the creature at `index` in the hand may be dropped on `pos`.
    /// Outside editor mode the tile must be claimed by the player's seat.
    pub fn is_drop_creature_possible(
        &self,
        player: PlayerId,
        pos: Pos,
        index: usize,
        editor_mode: bool,
    ) -> bool {
        let Some(owner) = self.registry.player(player) else {
            return false;
        };
        let Some(creature) = owner.hand.get(index).and_then(|id| self.registry.creature_by_id(*id))
        else {
            return false;
        };
        let Some(tile) = self.grid.get_pos(pos) else {
            return false;
        };
        if !tile.permits(creature.move_class()) {
            return false;
        }
        if editor_mode {
            return true;
        }
        let seat_color =
            owner.seat.and_then(|seat| self.registry.seat(seat)).map(|seat| seat.color);
        tile.kind() == TileKind::Claimed && tile.color().is_some() && tile.color() == seat_color
    }

    pub fn drop_creature(
        &mut self,
        player: PlayerId,
        pos: Pos,
        index: usize,
    ) -> Result<CreatureId, GameError> {
        self.drop_creature_with_mode(player, pos, index, false)
    }

    pub fn drop_creature_with_mode(
        &mut self,
        player: PlayerId,
        pos: Pos,
        index: usize,
        editor_mode: bool,
    ) -> Result<CreatureId, GameError> {
        let owner = self.registry.player(player).ok_or(GameError::UnknownPlayer)?;
        if index >= owner.hand.len() {
            return Err(GameError::HandIndexOutOfRange { index });
        }
        if !self.is_drop_creature_possible(player, pos, index, editor_mode) {
            return Err(GameError::InvalidDrop { x: pos.x, y: pos.y });
        }
        let hand = &mut self.registry.players.get_mut(player).ok_or(GameError::UnknownPlayer)?.hand;
        let id = hand.remove(index);
        if let Some(creature) = self.registry.creature_by_id(id) {
            let mut state = creature.state_mut();
            state.in_hand = false;
            state.pos = pos;
        }
        Ok(id)
    }

    /// Rotates the hand left by `steps`; negative values rotate right.
    pub fn rotate_creatures_in_hand(
        &mut self,
        player: PlayerId,
        steps: i32,
    ) -> Result<(), GameError> {
        let hand = &mut self.registry.players.get_mut(player).ok_or(GameError::UnknownPlayer)?.hand;
        if hand.is_empty() {
            return Ok(());
        }
        let len = hand.len() as i64;
        let shift = i64::from(steps).rem_euclid(len) as usize;
        hand.rotate_left(shift);
        Ok(())
    }

    /// Empties the hand. Held creatures leave the game at the next deletion
    /// flush.
    pub fn clear_creatures_in_hand(&mut self, player: PlayerId) -> Result<usize, GameError> {
        let owner = self.registry.players.get_mut(player).ok_or(GameError::UnknownPlayer)?;
        let hand = mem::take(&mut owner.hand);
        let cleared = hand.len();
        for id in hand {
            self.queue_creature_for_deletion(id);
        }
        Ok(cleared)
    }

    /// Held creatures, optionally only those of one seat's colour.
    pub fn num_creatures_in_hand(&self, player: PlayerId, seat: Option<SeatId>) -> usize {
        let Some(owner) = self.registry.player(player) else {
            return 0;
        };
        let color = seat.and_then(|seat| self.registry.seat(seat)).map(|seat| seat.color);
        owner
            .hand
            .iter()
            .filter_map(|id| self.registry.creature_by_id(*id))
            .filter(|creature| color.is_none_or(|color| creature.color() == color))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::test_support::{add_test_class, map_from_rows};

    fn keeper_map() -> (GameMap, PlayerId, SeatId) {
        let mut map = map_from_rows(&["....", "...."]);
        add_test_class(&mut map, "Imp", false);
        let seat = map.add_empty_seat(Seat::new(3, "Keeper", Pos::new(0, 0)));
        let player = map.add_player(Player::new("keeper")).unwrap();
        for x in 0..2 {
            map.claim_tile(Pos::new(x, 0), 3);
        }
        for (index, x) in [0, 1, 2].into_iter().enumerate() {
            map.add_creature(CreatureSpawn::new(format!("imp{index}"), "Imp", 3, Pos::new(x, 1)))
                .unwrap();
        }
        (map, player, seat)
    }

    fn id_of(map: &GameMap, name: &str) -> CreatureId {
        map.registry().creature(name).map(|c| c.id()).unwrap()
    }

    #[test]
    fn picked_up_creatures_leave_the_schedule() {
        let (mut map, player, seat) = keeper_map();
        let imp = id_of(&map, "imp0");
        map.pick_up_creature(player, imp).unwrap();
        assert_eq!(map.pick_up_creature(player, imp), Err(GameError::AlreadyInHand));
        assert_eq!(map.num_creatures_in_hand(player, None), 1);
        assert_eq!(map.num_creatures_in_hand(player, Some(seat)), 1);

        let report = map.do_turn(0.5);
        assert_eq!(report.creature_turns, 2);
    }

    #[test]
    fn drops_need_an_own_claimed_tile_outside_the_editor() {
        let (mut map, player, _) = keeper_map();
        map.pick_up_creature(player, id_of(&map, "imp1")).unwrap();

        assert!(!map.is_drop_creature_possible(player, Pos::new(3, 0), 0, false));
        assert!(map.is_drop_creature_possible(player, Pos::new(3, 0), 0, true));
        assert_eq!(
            map.drop_creature(player, Pos::new(3, 0), 0),
            Err(GameError::InvalidDrop { x: 3, y: 0 })
        );
        assert_eq!(
            map.drop_creature(player, Pos::new(1, 0), 4),
            Err(GameError::HandIndexOutOfRange { index: 4 })
        );

        let dropped = map.drop_creature(player, Pos::new(1, 0), 0).unwrap();
        let creature = map.registry().creature_by_id(dropped).unwrap();
        assert_eq!(creature.pos(), Pos::new(1, 0));
        assert!(!creature.is_in_hand());
        assert_eq!(map.num_creatures_in_hand(player, None), 0);
    }

    #[test]
    fn rotation_wraps_in_both_directions() {
        let (mut map, player, _) = keeper_map();
        let ids: Vec<CreatureId> =
            ["imp0", "imp1", "imp2"].iter().map(|name| id_of(&map, name)).collect();
        for id in &ids {
            map.pick_up_creature(player, *id).unwrap();
        }
        map.rotate_creatures_in_hand(player, 1).unwrap();
        assert_eq!(map.registry().player(player).unwrap().hand, vec![ids[1], ids[2], ids[0]]);
        map.rotate_creatures_in_hand(player, -4).unwrap();
        assert_eq!(map.registry().player(player).unwrap().hand, ids);
    }

    #[test]
    fn clearing_the_hand_deletes_held_creatures() {
        let (mut map, player, _) = keeper_map();
        map.pick_up_creature(player, id_of(&map, "imp2")).unwrap();
        assert_eq!(map.clear_creatures_in_hand(player), Ok(1));
        map.do_turn(0.5);
        assert!(map.registry().creature("imp2").is_none());
        assert_eq!(map.registry().num_creatures(), 2);
    }
}
