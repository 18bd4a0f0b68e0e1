use std::fs;
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;

use anyhow::{Context, Result, bail};
use clap::Parser;
use dungeon::{
    EngineConfig, GameMap, MapGenParams, Player, TurnSnapshot, load_level_file, mapgen,
    save_level_file,
};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Level file to load instead of generating one
    #[arg(short, long)]
    level: Option<PathBuf>,

    /// Engine configuration (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of turns to simulate
    #[arg(short, long, default_value_t = 20)]
    turns: u64,

    /// Override `max_ai_threads` from the configuration
    #[arg(long)]
    threads: Option<usize>,

    #[arg(long, default_value_t = 42)]
    seed: u64,

    #[arg(long, default_value_t = 32)]
    width: i32,

    #[arg(long, default_value_t = 24)]
    height: i32,

    #[arg(long, default_value_t = 2)]
    seats: usize,

    /// AI type given to every seated keeper
    #[arg(long, default_value = "NullAI")]
    ai: String,

    /// Write the final snapshot as JSON
    #[arg(long)]
    snapshot_json: Option<PathBuf>,

    /// Save the final level
    #[arg(long)]
    save: Option<PathBuf>,
}

fn init_tracing(filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

fn load_config(path: Option<&PathBuf>) -> Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("Failed to load configuration: {}", path.display())),
        None => Ok(EngineConfig::default()),
    }
}

fn prepare_map(args: &Args, map: &mut GameMap) -> Result<()> {
    if let Some(path) = &args.level {
        load_level_file(map, path)
            .with_context(|| format!("Failed to load level: {}", path.display()))?;
    } else {
        let params = MapGenParams {
            width: args.width,
            height: args.height,
            seed: args.seed,
            seats: args.seats,
            ..MapGenParams::default()
        };
        mapgen::generate(map, &params).context("Failed to generate a level")?;
    }

    let mut keeper = 0;
    while map.registry().num_empty_seats() > 0 {
        keeper += 1;
        let player = map.add_player(Player::new(format!("keeper{keeper}")))?;
        map.assign_ai(player, &args.ai, "")
            .with_context(|| format!("Failed to assign AI '{}' to keeper{keeper}", args.ai))?;
    }
    if keeper == 0 {
        bail!("level has no empty seats to play");
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    let mut config = load_config(args.config.as_ref())?;
    if let Some(threads) = args.threads {
        config.max_ai_threads = threads;
    }
    config.validate().context("Invalid configuration")?;
    init_tracing(&config.log_filter);

    let frame_time = config.frame_time();
    let mut map = GameMap::new(config);
    prepare_map(&args, &mut map)?;
    info!(tiles = map.num_tiles(), creatures = map.registry().num_creatures(), "level ready");

    // Frames are drawn on their own thread while the next turn runs; each
    // frame pins its turn until dropped.
    let (frames, inbox) = mpsc::channel::<TurnSnapshot>();
    let renderer = thread::Builder::new()
        .name("render".into())
        .spawn(move || {
            let mut drawn = 0usize;
            for frame in inbox {
                let in_hand = frame.creatures.iter().filter(|creature| creature.in_hand).count();
                let creatures = frame.creatures.len();
                debug!(turn = frame.turn, creatures, in_hand, "frame drawn");
                drawn += 1;
            }
            drawn
        })
        .context("Failed to start the render thread")?;

    let mut reports = Vec::new();
    for _ in 0..args.turns {
        if map.turn_clock().is_shutdown_requested() {
            break;
        }
        frames.send(map.snapshot_locked()).context("Render thread hung up")?;
        reports.push(map.do_turn(frame_time));
    }
    drop(frames);
    let drawn = renderer.join().map_err(|_| anyhow::anyhow!("Render thread panicked"))?;
    map.reclaim_deleted();

    let failures: usize = reports.iter().map(|report| report.failures).sum();
    let commands: usize = reports.iter().map(|report| report.commands_applied).sum();
    let stats = map.path_stats();
    println!("Simulation complete.");
    println!("Turns: {} (frames drawn: {drawn})", reports.len());
    println!("Commands applied: {commands}, behaviour failures: {failures}");
    println!(
        "Paths: {} requests, {} searches, {} nodes expanded, {} rejected by flood fill",
        stats.path_calls, stats.astar_runs, stats.nodes_expanded, stats.flood_fill_rejections
    );
    for (_, seat) in map.registry().seats() {
        println!(
            "Seat {}: gold {}, claimed {}, won {}",
            seat.color,
            seat.gold,
            seat.claimed_tiles,
            seat.has_won()
        );
    }
    println!("Snapshot Hash: {}", map.snapshot_hash());

    if let Some(path) = &args.snapshot_json {
        let json =
            serde_json::to_string_pretty(&map.snapshot()).context("Failed to serialize snapshot")?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write snapshot: {}", path.display()))?;
    }
    if let Some(path) = &args.save {
        save_level_file(&map, path)
            .with_context(|| format!("Failed to save level: {}", path.display()))?;
    }
    Ok(())
}
