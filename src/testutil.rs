use std::{fs, path::Path};

use filetime::{set_file_mtime, FileTime};

use crate::profile::{GameId, GameProfile, Method};

/// A profile rooted in a temp directory, with the plugins directory created
/// and the metadata files laid out the way the game expects them.
pub(crate) fn profile_dirs(game_id: GameId, root: &Path) -> GameProfile {
    let plugins_dir = match game_id {
        GameId::Morrowind => root.join("Data Files"),
        _ => root.join("Data"),
    };
    fs::create_dir_all(&plugins_dir).unwrap();

    let load_order_file = match game_id.method() {
        Method::Textfile => Some(root.join("loadorder.txt")),
        _ => None,
    };
    let active_plugins_file = match game_id {
        GameId::Morrowind => root.join("Morrowind.ini"),
        _ => root.join("plugins.txt"),
    };

    GameProfile::with_paths(game_id, plugins_dir, load_order_file, active_plugins_file)
}

/// Writes a minimal well-formed plugin file. For Morrowind profiles the
/// header is a TES3 record and master-ness comes from the extension; for the
/// rest it is a TES4 record with the master flag bit.
pub(crate) fn write_plugin(profile: &GameProfile, name: &str, is_master: bool) {
    let bytes = match profile.game_id() {
        GameId::Morrowind => tes3_header(),
        _ => tes4_header(is_master),
    };
    fs::write(profile.plugins_dir().join(name), bytes).unwrap();
}

pub(crate) fn write_tes3_plugin(profile: &GameProfile, name: &str) {
    fs::write(profile.plugins_dir().join(name), tes3_header()).unwrap();
}

/// The standard fixture: the game's master plus one extra master and two
/// regular plugins, with staggered mtimes so timestamp ordering is
/// deterministic.
pub(crate) fn populate(profile: &GameProfile) {
    let files = [
        (profile.game_master().to_string(), true, 1000),
        ("Blank.esm".to_string(), true, 1010),
        ("Blank.esp".to_string(), false, 1020),
        ("Blank - Different.esp".to_string(), false, 1030),
    ];

    for (name, is_master, mtime) in files {
        write_plugin(profile, &name, is_master);
        set_file_mtime(
            profile.plugins_dir().join(&name),
            FileTime::from_unix_time(mtime, 0),
        )
        .unwrap();
    }
}

fn tes4_header(is_master: bool) -> Vec<u8> {
    let flags: u32 = if is_master { 0x1 } else { 0x0 };
    let mut bytes = Vec::with_capacity(16);
    bytes.extend_from_slice(b"TES4");
    bytes.extend_from_slice(&0u32.to_le_bytes());
    bytes.extend_from_slice(&flags.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());
    bytes
}

fn tes3_header() -> Vec<u8> {
    let mut bytes = Vec::with_capacity(16);
    bytes.extend_from_slice(b"TES3");
    bytes.extend_from_slice(&[0u8; 12]);
    bytes
}
