use dungeon::mapgen::generate;
use dungeon::{
    GameMap, LevelError, MapGenParams, load_level, load_level_file, save_level, save_level_file,
};
use tempfile::tempdir;

fn played_map(seed: u64, turns: u64) -> GameMap {
    let mut map = GameMap::default();
    generate(&mut map, &MapGenParams { seed, ..MapGenParams::default() })
        .expect("generated map is consistent");
    map.run_turns(turns, 0.7);
    map
}

#[test]
fn generated_levels_survive_a_save_and_load() {
    let map = played_map(31, 0);
    let mut loaded = GameMap::default();
    load_level(&mut loaded, &save_level(&map)).unwrap();
    assert_eq!(loaded.snapshot_hash(), map.snapshot_hash());
    assert_eq!(loaded.registry().num_class_descriptions(), 3);
    assert_eq!(loaded.registry().num_empty_seats(), 2);
}

#[test]
fn played_levels_keep_their_tiles_and_creatures() {
    let map = played_map(8, 6);
    let dir = tempdir().unwrap();
    let path = dir.path().join("autosave.level");
    save_level_file(&map, &path).unwrap();

    let mut loaded = GameMap::default();
    load_level_file(&mut loaded, &path).unwrap();
    let (before, after) = (map.snapshot(), loaded.snapshot());
    assert_eq!(after.tiles, before.tiles);
    assert_eq!(after.creatures, before.creatures);
    assert_eq!(after.rooms, before.rooms);
    assert!(loaded.is_flood_fill_enabled());
}

#[test]
fn a_truncated_file_reports_where_it_stopped() {
    let map = played_map(3, 0);
    let text = save_level(&map);
    let cut = text.find("# Lights").expect("lights section present");
    let mut loaded = GameMap::default();
    let err = load_level(&mut loaded, &text[..cut]).unwrap_err();
    assert!(
        matches!(err, LevelError::UnexpectedEnd { section: "lights" }),
        "unexpected error: {err}"
    );
}
