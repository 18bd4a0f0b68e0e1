//! Player-level AI: a name-keyed factory and the manager that runs every
//! assigned AI once per turn during upkeep.

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::game::GameMap;
use crate::types::*;

pub trait PlayerAi: Send + Sync {
    /// Returns `false` to be removed from the schedule.
    fn do_turn(&mut self, ctx: &mut AiContext<'_>, frame_time: f64) -> bool;
}

pub struct AiContext<'a> {
    map: &'a GameMap,
    player: PlayerId,
    commands: Vec<MapCommand>,
}

impl<'a> AiContext<'a> {
    pub fn map(&self) -> &'a GameMap {
        self.map
    }

    pub fn player(&self) -> PlayerId {
        self.player
    }

    pub fn push_command(&mut self, command: MapCommand) {
        self.commands.push(command);
    }
}

/// AI that never acts.
#[derive(Clone, Debug, Default)]
pub struct NullAi {
    params: String,
}

impl NullAi {
    pub const TYPE_NAME: &'static str = "NullAI";

    fn create(_map: &GameMap, _player: PlayerId, params: &str) -> Box<dyn PlayerAi> {
        Box::new(NullAi { params: params.to_owned() })
    }

    pub fn params(&self) -> &str {
        &self.params
    }
}

impl PlayerAi for NullAi {
    fn do_turn(&mut self, _ctx: &mut AiContext<'_>, _frame_time: f64) -> bool {
        true
    }
}

pub type AiConstructor = fn(&GameMap, PlayerId, &str) -> Box<dyn PlayerAi>;

pub struct AiFactory {
    constructors: BTreeMap<String, AiConstructor>,
}

impl Default for AiFactory {
    fn default() -> Self {
        let mut factory = Self { constructors: BTreeMap::new() };
        factory.register(NullAi::TYPE_NAME, NullAi::create);
        factory
    }
}

impl AiFactory {
    pub fn register(&mut self, name: &str, constructor: AiConstructor) {
        self.constructors.insert(name.to_owned(), constructor);
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    pub fn create(
        &self,
        map: &GameMap,
        player: PlayerId,
        ai_type: &str,
        params: &str,
    ) -> Result<Box<dyn PlayerAi>, GameError> {
        let constructor = self
            .constructors
            .get(ai_type)
            .ok_or_else(|| GameError::UnknownAiType { name: ai_type.to_owned() })?;
        Ok(constructor(map, player, params))
    }
}

struct AssignedAi {
    player: PlayerId,
    ai_type: String,
    ai: Box<dyn PlayerAi>,
}

#[derive(Default)]
pub struct AiManager {
    factory: AiFactory,
    assigned: Vec<AssignedAi>,
}

impl AiManager {
    pub fn factory(&self) -> &AiFactory {
        &self.factory
    }

    pub fn factory_mut(&mut self) -> &mut AiFactory {
        &mut self.factory
    }

    pub(crate) fn assign(&mut self, player: PlayerId, ai_type: &str, ai: Box<dyn PlayerAi>) {
        info!(ai_type, "assigned player AI");
        self.assigned.retain(|entry| entry.player != player);
        self.assigned.push(AssignedAi { player, ai_type: ai_type.to_owned(), ai });
    }

    pub fn num_assigned(&self) -> usize {
        self.assigned.len()
    }

    pub fn ai_type(&self, player: PlayerId) -> Option<&str> {
        self.assigned
            .iter()
            .find(|entry| entry.player == player)
            .map(|entry| entry.ai_type.as_str())
    }

    pub(crate) fn clear(&mut self) {
        self.assigned.clear();
    }

    /// Runs every AI in assignment order and returns their commands in the
    /// same order.
    pub(crate) fn do_turn(&mut self, map: &GameMap, frame_time: f64) -> Vec<MapCommand> {
        let mut commands = Vec::new();
        self.assigned.retain_mut(|entry| {
            let mut ctx = AiContext { map, player: entry.player, commands: Vec::new() };
            let keep = entry.ai.do_turn(&mut ctx, frame_time);
            commands.append(&mut ctx.commands);
            if !keep {
                debug!(ai_type = %entry.ai_type, "player AI finished");
            }
            keep
        });
        commands
    }
}
