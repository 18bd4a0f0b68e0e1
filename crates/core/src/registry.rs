//! Collections of every game object the map owns.
//! Reads are public; structural writes go through `GameMap`, which keeps the
//! tile grid consistent with what is registered here.

use std::collections::VecDeque;
use std::sync::Arc;

use slotmap::{Key, SlotMap};

use crate::entities::*;
use crate::types::*;

/// Slot map that also remembers insertion order, so positional lookups and
/// iteration are stable across runs.
#[derive(Debug)]
pub struct Collection<K: Key, V> {
    items: SlotMap<K, V>,
    order: Vec<K>,
}

impl<K: Key, V> Default for Collection<K, V> {
    fn default() -> Self {
        Self { items: SlotMap::with_key(), order: Vec::new() }
    }
}

impl<K: Key, V> Collection<K, V> {
    pub(crate) fn insert(&mut self, value: V) -> K {
        let key = self.items.insert(value);
        self.order.push(key);
        key
    }

    pub(crate) fn insert_with_key(&mut self, f: impl FnOnce(K) -> V) -> K {
        let key = self.items.insert_with_key(f);
        self.order.push(key);
        key
    }

    pub(crate) fn remove(&mut self, key: K) -> Option<V> {
        let value = self.items.remove(key)?;
        self.order.retain(|k| *k != key);
        Some(value)
    }

    pub(crate) fn get_mut(&mut self, key: K) -> Option<&mut V> {
        self.items.get_mut(key)
    }

    pub(crate) fn values_mut(&mut self) -> impl Iterator<Item = &mut V> + '_ {
        self.items.values_mut()
    }

    pub(crate) fn clear(&mut self) {
        self.items.clear();
        self.order.clear();
    }

    pub fn get(&self, key: K) -> Option<&V> {
        self.items.get(key)
    }

    pub fn at(&self, index: usize) -> Option<&V> {
        self.order.get(index).and_then(|key| self.items.get(*key))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn keys(&self) -> &[K] {
        &self.order
    }

    pub fn iter(&self) -> impl Iterator<Item = (K, &V)> + '_ {
        self.order.iter().filter_map(move |key| self.items.get(*key).map(|value| (*key, value)))
    }

    pub fn values(&self) -> impl Iterator<Item = &V> + '_ {
        self.iter().map(|(_, value)| value)
    }
}

#[derive(Debug, Default)]
pub struct EntityRegistry {
    pub(crate) creatures: Collection<CreatureId, Arc<Creature>>,
    pub(crate) classes: Vec<CreatureClass>,
    pub(crate) players: Collection<PlayerId, Player>,
    pub(crate) seats: Collection<SeatId, Seat>,
    pub(crate) empty_seats: Vec<SeatId>,
    pub(crate) filled_seats: Vec<SeatId>,
    pub(crate) winning_seats: Vec<SeatId>,
    pub(crate) goals_for_all_seats: Vec<Goal>,
    pub(crate) rooms: Collection<RoomId, Room>,
    pub(crate) traps: Collection<TrapId, Trap>,
    pub(crate) lights: Collection<LightId, MapLight>,
    pub(crate) missiles: Collection<MissileId, MissileObject>,
    pub(crate) active_objects: Vec<ActiveRef>,
    pub(crate) new_active_objects: VecDeque<ActiveRef>,
}

impl EntityRegistry {
    // Creatures. Queued creatures stay reachable by name and id until the
    // deletion flush but are hidden from iteration.

    pub fn creatures(&self) -> impl Iterator<Item = &Arc<Creature>> + '_ {
        self.creatures.values().filter(|creature| !creature.is_queued_for_deletion())
    }

    pub fn creature(&self, name: &str) -> Option<&Arc<Creature>> {
        self.creatures.values().find(|creature| creature.name() == name)
    }

    pub fn creature_by_id(&self, id: CreatureId) -> Option<&Arc<Creature>> {
        self.creatures.get(id)
    }

    pub fn creature_at(&self, index: usize) -> Option<&Arc<Creature>> {
        self.creatures().nth(index)
    }

    pub fn num_creatures(&self) -> usize {
        self.creatures().count()
    }

    pub fn creatures_by_color(&self, color: SeatColor) -> Vec<&Arc<Creature>> {
        self.creatures().filter(|creature| creature.color() == color).collect()
    }

    // Classes

    pub fn class_description(&self, name: &str) -> Option<&CreatureClass> {
        self.classes.iter().find(|class| class.name == name)
    }

    pub fn class_at(&self, index: usize) -> Option<&CreatureClass> {
        self.classes.get(index)
    }

    pub fn num_class_descriptions(&self) -> usize {
        self.classes.len()
    }

    pub fn classes(&self) -> &[CreatureClass] {
        &self.classes
    }

    // Players

    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(id)
    }

    pub fn player_by_nick(&self, nick: &str) -> Option<(PlayerId, &Player)> {
        self.players.iter().find(|(_, player)| player.nick == nick)
    }

    pub fn player_at(&self, index: usize) -> Option<&Player> {
        self.players.at(index)
    }

    pub fn num_players(&self) -> usize {
        self.players.len()
    }

    pub fn players(&self) -> impl Iterator<Item = (PlayerId, &Player)> + '_ {
        self.players.iter()
    }

    // Seats

    pub fn seat(&self, id: SeatId) -> Option<&Seat> {
        self.seats.get(id)
    }

    pub fn seat_by_color(&self, color: SeatColor) -> Option<(SeatId, &Seat)> {
        self.seats.iter().find(|(_, seat)| seat.color == color)
    }

    pub fn empty_seat(&self, index: usize) -> Option<&Seat> {
        self.empty_seats.get(index).and_then(|id| self.seats.get(*id))
    }

    pub fn num_empty_seats(&self) -> usize {
        self.empty_seats.len()
    }

    pub fn filled_seat(&self, index: usize) -> Option<&Seat> {
        self.filled_seats.get(index).and_then(|id| self.seats.get(*id))
    }

    pub fn filled_seat_ids(&self) -> &[SeatId] {
        &self.filled_seats
    }

    pub fn num_filled_seats(&self) -> usize {
        self.filled_seats.len()
    }

    pub fn winning_seat(&self, index: usize) -> Option<&Seat> {
        self.winning_seats.get(index).and_then(|id| self.seats.get(*id))
    }

    pub fn num_winning_seats(&self) -> usize {
        self.winning_seats.len()
    }

    pub fn seat_is_a_winner(&self, id: SeatId) -> bool {
        self.winning_seats.contains(&id)
    }

    pub fn seats(&self) -> impl Iterator<Item = (SeatId, &Seat)> + '_ {
        self.seats.iter()
    }

    pub fn goal_for_all_seats(&self, index: usize) -> Option<&Goal> {
        self.goals_for_all_seats.get(index)
    }

    pub fn num_goals_for_all_seats(&self) -> usize {
        self.goals_for_all_seats.len()
    }

    // Rooms and traps

    pub fn room(&self, id: RoomId) -> Option<&Room> {
        self.rooms.get(id)
    }

    pub fn room_at(&self, index: usize) -> Option<&Room> {
        self.rooms.at(index)
    }

    pub fn num_rooms(&self) -> usize {
        self.rooms.len()
    }

    pub fn rooms(&self) -> impl Iterator<Item = (RoomId, &Room)> + '_ {
        self.rooms.iter()
    }

    pub fn rooms_by_type(&self, kind: RoomKind) -> Vec<RoomId> {
        self.rooms.iter().filter(|(_, room)| room.kind == kind).map(|(id, _)| id).collect()
    }

    pub fn rooms_by_type_and_color(&self, kind: RoomKind, color: SeatColor) -> Vec<RoomId> {
        self.rooms
            .iter()
            .filter(|(_, room)| room.kind == kind && room.color == color)
            .map(|(id, _)| id)
            .collect()
    }

    pub fn num_rooms_by_type_and_color(&self, kind: RoomKind, color: SeatColor) -> usize {
        self.rooms.values().filter(|room| room.kind == kind && room.color == color).count()
    }

    pub fn trap(&self, id: TrapId) -> Option<&Trap> {
        self.traps.get(id)
    }

    pub fn trap_at(&self, index: usize) -> Option<&Trap> {
        self.traps.at(index)
    }

    pub fn num_traps(&self) -> usize {
        self.traps.len()
    }

    pub fn traps(&self) -> impl Iterator<Item = (TrapId, &Trap)> + '_ {
        self.traps.iter()
    }

    // Lights and missiles

    pub fn map_light(&self, name: &str) -> Option<(LightId, &MapLight)> {
        self.lights.iter().find(|(_, light)| light.name == name)
    }

    pub fn map_light_at(&self, index: usize) -> Option<&MapLight> {
        self.lights.at(index)
    }

    pub fn num_map_lights(&self) -> usize {
        self.lights.len()
    }

    pub fn missile_object(&self, id: MissileId) -> Option<&MissileObject> {
        self.missiles.get(id)
    }

    pub fn num_missile_objects(&self) -> usize {
        self.missiles.len()
    }

    pub fn missile_objects(&self) -> impl Iterator<Item = (MissileId, &MissileObject)> + '_ {
        self.missiles.iter()
    }

    pub fn num_active_objects(&self) -> usize {
        self.active_objects.len()
    }

    pub fn active_objects(&self) -> &[ActiveRef] {
        &self.active_objects
    }

    // Treasury

    pub fn total_gold_for_color(&self, color: SeatColor) -> i64 {
        self.rooms
            .values()
            .filter(|room| room.kind == RoomKind::Treasury && room.color == color)
            .map(|room| room.gold)
            .sum()
    }

    pub(crate) fn remove_active_object(&mut self, object: ActiveRef) {
        self.active_objects.retain(|active| *active != object);
        self.new_active_objects.retain(|active| *active != object);
    }

    pub(crate) fn drain_new_active_objects(&mut self) -> usize {
        let drained = self.new_active_objects.len();
        self.active_objects.extend(self.new_active_objects.drain(..));
        drained
    }

    /// Takes `amount` gold out of this colour's treasuries, all or nothing.
    pub(crate) fn withdraw_from_treasuries(&mut self, amount: i64, color: SeatColor) -> i64 {
        if amount <= 0 || self.total_gold_for_color(color) < amount {
            return 0;
        }
        let mut remaining = amount;
        for id in self.rooms_by_type_and_color(RoomKind::Treasury, color) {
            let Some(room) = self.rooms.get_mut(id) else { continue };
            let taken = room.gold.min(remaining);
            room.gold -= taken;
            remaining -= taken;
            if remaining == 0 {
                break;
            }
        }
        amount
    }

    /// Stores gold in this colour's treasuries up to their capacity and
    /// returns how much fitted.
    pub(crate) fn deposit_gold(&mut self, amount: i64, color: SeatColor) -> i64 {
        let mut remaining = amount.max(0);
        for id in self.rooms_by_type_and_color(RoomKind::Treasury, color) {
            let Some(room) = self.rooms.get_mut(id) else { continue };
            let stored = (room.capacity() - room.gold).clamp(0, remaining);
            room.gold += stored;
            remaining -= stored;
            if remaining == 0 {
                break;
            }
        }
        amount.max(0) - remaining
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn treasury(registry: &mut EntityRegistry, color: SeatColor, tiles: i32, gold: i64) -> RoomId {
        let mut room =
            Room::new(RoomKind::Treasury, color, (0..tiles).map(|x| Pos::new(x, 0)).collect());
        room.gold = gold;
        registry.rooms.insert(room)
    }

    #[test]
    fn collection_keeps_insertion_order_after_removal() {
        let mut lights: Collection<LightId, MapLight> = Collection::default();
        let a = lights.insert(MapLight::new("a", 0.0, 0.0, 1.0));
        lights.insert(MapLight::new("b", 0.0, 0.0, 1.0));
        lights.insert(MapLight::new("c", 0.0, 0.0, 1.0));
        lights.remove(a);
        lights.insert(MapLight::new("d", 0.0, 0.0, 1.0));
        let names: Vec<&str> = lights.values().map(|light| light.name.as_str()).collect();
        assert_eq!(names, vec!["b", "c", "d"]);
        assert_eq!(lights.at(2).map(|light| light.name.as_str()), Some("d"));
    }

    #[test]
    fn withdrawal_is_all_or_nothing() {
        let mut registry = EntityRegistry::default();
        treasury(&mut registry, 1, 1, 300);
        treasury(&mut registry, 1, 1, 200);
        treasury(&mut registry, 2, 1, 900);

        assert_eq!(registry.total_gold_for_color(1), 500);
        assert_eq!(registry.withdraw_from_treasuries(600, 1), 0);
        assert_eq!(registry.total_gold_for_color(1), 500);
        assert_eq!(registry.withdraw_from_treasuries(400, 1), 400);
        assert_eq!(registry.total_gold_for_color(1), 100);
        assert_eq!(registry.total_gold_for_color(2), 900);
    }

    #[test]
    fn deposits_stop_at_capacity() {
        let mut registry = EntityRegistry::default();
        treasury(&mut registry, 1, 1, TREASURY_CAPACITY_PER_TILE - 50);
        assert_eq!(registry.deposit_gold(80, 1), 50);
        assert_eq!(registry.deposit_gold(80, 3), 0);
        assert_eq!(registry.total_gold_for_color(1), TREASURY_CAPACITY_PER_TILE);
    }

    #[test]
    fn rooms_filter_by_type_and_color() {
        let mut registry = EntityRegistry::default();
        treasury(&mut registry, 1, 2, 0);
        registry.rooms.insert(Room::new(RoomKind::DungeonTemple, 1, vec![Pos::new(5, 5)]));
        registry.rooms.insert(Room::new(RoomKind::DungeonTemple, 2, vec![Pos::new(9, 9)]));
        assert_eq!(registry.rooms_by_type(RoomKind::DungeonTemple).len(), 2);
        assert_eq!(registry.num_rooms_by_type_and_color(RoomKind::DungeonTemple, 2), 1);
        assert_eq!(registry.num_rooms_by_type_and_color(RoomKind::Portal, 1), 0);
    }
}
