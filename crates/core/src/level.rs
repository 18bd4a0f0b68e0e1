//! Plain-text level files.
//!
//! A level is a stream of whitespace-separated tokens; `#` starts a comment
//! that runs to the end of the line. Sections follow in a fixed order, each
//! list prefixed by its length:
//!
//! - version string, then the next level name (`-` for none)
//! - seats: `color faction x y gold`
//! - goals shared by all seats: `ClaimTiles n`, `MineGold n`,
//!   `ProtectDungeonTemple`, `KillAllEnemies`
//! - tiles: `x y kind fullness color` (`-` for unowned)
//! - rooms: `kind color gold count x y ...`
//! - traps: `kind color count x y ...`
//! - lights: `name x y z r g b attenuation`
//! - creature classes: `name hp sight dig Walk|Fly|Dig worker`
//! - creatures: `class name x y color hp`
//!
//! Names must not contain whitespace.

use std::fmt::{self, Write};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;
use tracing::{debug, info};

use crate::entities::*;
use crate::game::GameMap;
use crate::grid::Tile;
use crate::types::*;

pub const LEVEL_VERSION: &str = "dungeon-level-1";

#[derive(Debug, Error)]
pub enum LevelError {
    #[error("failed to access level file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("level was written by {found}, this build reads {expected}")]
    VersionMismatch { found: String, expected: &'static str },
    #[error("level ended inside the {section} section")]
    UnexpectedEnd { section: &'static str },
    #[error("invalid token {token:?} in the {section} section")]
    InvalidToken { section: &'static str, token: String },
    #[error(transparent)]
    Game(#[from] GameError),
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

struct Tokens<'a> {
    tokens: Vec<&'a str>,
    next: usize,
}

impl<'a> Tokens<'a> {
    fn new(text: &'a str) -> Self {
        let tokens = text
            .lines()
            .map(|line| line.split_once('#').map_or(line, |(code, _)| code))
            .flat_map(str::split_whitespace)
            .collect();
        Self { tokens, next: 0 }
    }

    fn next(&mut self, section: &'static str) -> Result<&'a str, LevelError> {
        let token =
            self.tokens.get(self.next).copied().ok_or(LevelError::UnexpectedEnd { section })?;
        self.next += 1;
        Ok(token)
    }

    fn parse<T: FromStr>(&mut self, section: &'static str) -> Result<T, LevelError> {
        let token = self.next(section)?;
        token.parse().map_err(|_| LevelError::InvalidToken { section, token: token.to_owned() })
    }

    fn color(&mut self, section: &'static str) -> Result<Option<SeatColor>, LevelError> {
        match self.next(section)? {
            "-" => Ok(None),
            token => token
                .parse::<SeatColor>()
                .map(Some)
                .map_err(|_| LevelError::InvalidToken { section, token: token.to_owned() }),
        }
    }

    fn positions(&mut self, section: &'static str) -> Result<Vec<Pos>, LevelError> {
        let count: usize = self.parse(section)?;
        let mut positions = Vec::new();
        for _ in 0..count {
            positions.push(Pos::new(self.parse(section)?, self.parse(section)?));
        }
        Ok(positions)
    }

    fn goal(&mut self, section: &'static str) -> Result<Goal, LevelError> {
        let name = self.next(section)?;
        match name {
            "ClaimTiles" => Ok(Goal::ClaimTiles(self.parse(section)?)),
            "MineGold" => Ok(Goal::MineGold(self.parse(section)?)),
            other => other
                .parse()
                .map_err(|()| LevelError::InvalidToken { section, token: other.to_owned() }),
        }
    }
}

/// Replaces the map's contents with the level in `text`.
pub fn load_level(map: &mut GameMap, text: &str) -> Result<(), LevelError> {
    let mut tokens = Tokens::new(text);
    let version = tokens.next("version")?;
    if version != LEVEL_VERSION {
        return Err(LevelError::VersionMismatch {
            found: version.to_owned(),
            expected: LEVEL_VERSION,
        });
    }

    map.clear_all();
    match tokens.next("next level")? {
        "-" => {}
        name => map.set_next_level(name),
    }

    let seats: usize = tokens.parse("seats")?;
    for _ in 0..seats {
        let color = tokens.parse("seats")?;
        let faction = tokens.next("seats")?;
        let starting = Pos::new(tokens.parse("seats")?, tokens.parse("seats")?);
        let mut seat = Seat::new(color, faction, starting);
        seat.gold = tokens.parse("seats")?;
        map.add_empty_seat(seat);
    }

    let goals: usize = tokens.parse("goals")?;
    for _ in 0..goals {
        let goal = tokens.goal("goals")?;
        map.add_goal_for_all_seats(goal);
    }

    map.disable_flood_fill();
    let tiles = load_tiles(map, &mut tokens);
    map.enable_flood_fill();
    let tiles = tiles?;

    let rooms: usize = tokens.parse("rooms")?;
    for _ in 0..rooms {
        let kind = tokens.parse("rooms")?;
        let color = tokens.parse("rooms")?;
        let gold = tokens.parse("rooms")?;
        let mut room = Room::new(kind, color, tokens.positions("rooms")?);
        room.gold = gold;
        map.add_room(room)?;
    }

    let traps: usize = tokens.parse("traps")?;
    for _ in 0..traps {
        let kind = tokens.parse("traps")?;
        let color = tokens.parse("traps")?;
        map.add_trap(Trap::new(kind, color, tokens.positions("traps")?))?;
    }

    let lights: usize = tokens.parse("lights")?;
    for _ in 0..lights {
        let name = tokens.next("lights")?;
        let mut light = MapLight::new(
            name,
            tokens.parse("lights")?,
            tokens.parse("lights")?,
            tokens.parse("lights")?,
        );
        light.diffuse = [tokens.parse("lights")?, tokens.parse("lights")?, tokens.parse("lights")?];
        light.attenuation = tokens.parse("lights")?;
        map.add_map_light(light)?;
    }

    let classes: usize = tokens.parse("classes")?;
    for _ in 0..classes {
        let name = tokens.next("classes")?;
        let max_hp = tokens.parse("classes")?;
        let sight_radius = tokens.parse("classes")?;
        let dig_rate = tokens.parse("classes")?;
        let move_class = tokens.parse("classes")?;
        let is_worker = match tokens.next("classes")? {
            "0" => false,
            "1" => true,
            token => {
                return Err(LevelError::InvalidToken {
                    section: "classes",
                    token: token.to_owned(),
                });
            }
        };
        let class = CreatureClass {
            max_hp,
            sight_radius,
            dig_rate,
            is_worker,
            ..CreatureClass::new(name, move_class)
        };
        map.add_class_description(class)?;
    }

    let creatures: usize = tokens.parse("creatures")?;
    for _ in 0..creatures {
        let class_name = tokens.next("creatures")?;
        let name = tokens.next("creatures")?;
        let pos = Pos::new(tokens.parse("creatures")?, tokens.parse("creatures")?);
        let color = tokens.parse("creatures")?;
        let hp = tokens.parse("creatures")?;
        map.add_creature(CreatureSpawn::new(name, class_name, color, pos).with_hp(hp))?;
    }

    info!(tiles, seats, rooms, creatures, "level loaded");
    Ok(())
}

fn load_tiles(map: &mut GameMap, tokens: &mut Tokens<'_>) -> Result<usize, LevelError> {
    let count: usize = tokens.parse("tiles")?;
    for _ in 0..count {
        let x = tokens.parse("tiles")?;
        let y = tokens.parse("tiles")?;
        let kind = tokens.parse("tiles")?;
        let fullness = tokens.parse("tiles")?;
        let mut tile = Tile::new(x, y, kind, fullness);
        tile.set_color(tokens.color("tiles")?);
        map.add_tile(tile)?;
    }
    debug!(count, "tiles loaded");
    Ok(count)
}

pub fn load_level_file(map: &mut GameMap, path: &Path) -> Result<(), LevelError> {
    let text = fs::read_to_string(path)
        .map_err(|source| LevelError::Io { path: path.to_path_buf(), source })?;
    load_level(map, &text)
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

struct LevelText<'a>(&'a GameMap);

impl fmt::Display for LevelText<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let map = self.0;
        let registry = map.registry();
        writeln!(f, "{LEVEL_VERSION}  # level format")?;
        let next_level = if map.next_level().is_empty() { "-" } else { map.next_level() };
        writeln!(f, "{next_level}  # next level")?;

        writeln!(f, "\n# Seats: color faction x y gold")?;
        let seats: Vec<&Seat> = registry.seats().map(|(_, seat)| seat).collect();
        writeln!(f, "{}", seats.len())?;
        for seat in seats {
            writeln!(
                f,
                "{}\t{}\t{}\t{}\t{}",
                seat.color, seat.faction, seat.starting.x, seat.starting.y, seat.gold
            )?;
        }

        writeln!(f, "\n# Goals")?;
        writeln!(f, "{}", registry.num_goals_for_all_seats())?;
        let goals = (0..registry.num_goals_for_all_seats())
            .filter_map(|index| registry.goal_for_all_seats(index));
        for goal in goals {
            writeln!(f, "{goal}")?;
        }

        writeln!(f, "\n# Tiles: x y kind fullness color")?;
        writeln!(f, "{}", map.num_tiles())?;
        for tile in map.grid().iter() {
            let color = tile.color().map_or_else(|| "-".to_owned(), |color| color.to_string());
            writeln!(
                f,
                "{}\t{}\t{}\t{}\t{color}",
                tile.x(),
                tile.y(),
                tile.kind().as_str(),
                tile.fullness()
            )?;
        }

        writeln!(f, "\n# Rooms: kind color gold count x y ...")?;
        writeln!(f, "{}", registry.num_rooms())?;
        for (_, room) in registry.rooms() {
            write!(f, "{}\t{}\t{}", room.kind.as_str(), room.color, room.gold)?;
            write_positions(f, &room.tiles)?;
        }

        writeln!(f, "\n# Traps: kind color count x y ...")?;
        writeln!(f, "{}", registry.num_traps())?;
        for (_, trap) in registry.traps() {
            write!(f, "{}\t{}", trap.kind.as_str(), trap.color)?;
            write_positions(f, &trap.tiles)?;
        }

        writeln!(f, "\n# Lights: name x y z r g b attenuation")?;
        writeln!(f, "{}", registry.num_map_lights())?;
        let lights =
            (0..registry.num_map_lights()).filter_map(|index| registry.map_light_at(index));
        for light in lights {
            let [r, g, b] = light.diffuse;
            writeln!(
                f,
                "{}\t{}\t{}\t{}\t{r}\t{g}\t{b}\t{}",
                light.name, light.x, light.y, light.z, light.attenuation
            )?;
        }

        writeln!(f, "\n# Creature classes: name hp sight dig move worker")?;
        writeln!(f, "{}", registry.num_class_descriptions())?;
        for class in registry.classes() {
            writeln!(
                f,
                "{}\t{}\t{}\t{}\t{}\t{}",
                class.name,
                class.max_hp,
                class.sight_radius,
                class.dig_rate,
                class.move_class.as_str(),
                u8::from(class.is_worker)
            )?;
        }

        writeln!(f, "\n# Creatures: class name x y color hp")?;
        let creatures: Vec<_> = registry.creatures().collect();
        writeln!(f, "{}", creatures.len())?;
        for creature in creatures {
            let state = creature.state();
            writeln!(
                f,
                "{}\t{}\t{}\t{}\t{}\t{}",
                creature.class_name(),
                creature.name(),
                state.pos.x,
                state.pos.y,
                creature.color(),
                state.hp
            )?;
        }
        Ok(())
    }
}

fn write_positions(f: &mut fmt::Formatter<'_>, tiles: &[Pos]) -> fmt::Result {
    write!(f, "\t{}", tiles.len())?;
    for pos in tiles {
        f.write_char('\t')?;
        write!(f, "{} {}", pos.x, pos.y)?;
    }
    f.write_char('\n')
}

pub fn save_level(map: &GameMap) -> String {
    LevelText(map).to_string()
}

pub fn save_level_file(map: &GameMap, path: &Path) -> Result<(), LevelError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|source| LevelError::Io { path: parent.to_path_buf(), source })?;
    }
    fs::write(path, save_level(map))
        .map_err(|source| LevelError::Io { path: path.to_path_buf(), source })?;
    info!(path = %path.display(), "level saved");
    Ok(())
}
