pub mod ai;
pub mod behavior;
pub mod config;
pub mod entities;
pub mod game;
pub mod grid;
pub mod level;
pub mod mapgen;
pub mod registry;
pub mod types;

pub use ai::{AiContext, AiFactory, AiManager, NullAi, PlayerAi};
pub use behavior::{CreatureBehavior, TurnContext};
pub use config::{ConfigError, EngineConfig};
pub use entities::*;
pub use game::{
    GameMap, PathCounters, TurnClock, TurnLockGuard, TurnLocks, TurnPhase, TurnReport, TurnSnapshot,
};
pub use grid::{Tile, TileGrid, crow_distance};
pub use level::{LevelError, load_level, load_level_file, save_level, save_level_file};
pub use mapgen::{MapGenParams, MapGenerator};
pub use registry::{Collection, EntityRegistry};
pub use types::*;
