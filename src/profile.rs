use std::{
    fs, io,
    path::{Path, PathBuf},
};

use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameId {
    Morrowind,
    Oblivion,
    Fallout3,
    FalloutNv,
    Skyrim,
    Fallout4,
}

impl GameId {
    pub fn display_name(self) -> &'static str {
        match self {
            GameId::Morrowind => "Morrowind",
            GameId::Oblivion => "Oblivion",
            GameId::Fallout3 => "Fallout 3",
            GameId::FalloutNv => "Fallout: New Vegas",
            GameId::Skyrim => "Skyrim",
            GameId::Fallout4 => "Fallout 4",
        }
    }

    pub fn master_file(self) -> &'static str {
        match self {
            GameId::Morrowind => "Morrowind.esm",
            GameId::Oblivion => "Oblivion.esm",
            GameId::Fallout3 => "Fallout3.esm",
            GameId::FalloutNv => "FalloutNV.esm",
            GameId::Skyrim => "Skyrim.esm",
            GameId::Fallout4 => "Fallout4.esm",
        }
    }

    pub fn method(self) -> Method {
        match self {
            GameId::Morrowind => Method::Morrowind,
            GameId::Oblivion | GameId::Fallout3 | GameId::FalloutNv => Method::Timestamp,
            GameId::Skyrim => Method::Textfile,
            GameId::Fallout4 => Method::Asterisk,
        }
    }

    fn local_data_dir_name(self) -> &'static str {
        match self {
            GameId::Morrowind => "Morrowind",
            GameId::Oblivion => "Oblivion",
            GameId::Fallout3 => "Fallout3",
            GameId::FalloutNv => "FalloutNV",
            GameId::Skyrim => "Skyrim",
            GameId::Fallout4 => "Fallout4",
        }
    }

    fn implicitly_active(self) -> Vec<String> {
        match self {
            GameId::Skyrim => vec!["Update.esm".to_string()],
            _ => Vec::new(),
        }
    }
}

/// How a game persists its load order and active set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    /// Order from plugin file mtimes, active set from a plain text file.
    Timestamp,
    /// Order from a dedicated load-order file, active set from a second file.
    Textfile,
    /// One file holds both: a leading `*` marks a line active.
    Asterisk,
    /// Timestamp ordering with the active set in an INI `[Game Files]` section.
    Morrowind,
}

impl Method {
    /// Whether the game's own master file is pinned to the front of the load
    /// order and kept active.
    pub fn loads_game_master_first(self) -> bool {
        matches!(self, Method::Textfile | Method::Asterisk)
    }
}

/// Immutable per-game parameters: which persistence method applies, which
/// file is the game's own master, and where everything lives on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameProfile {
    game_id: GameId,
    method: Method,
    game_master: String,
    plugins_dir: PathBuf,
    load_order_file: Option<PathBuf>,
    active_plugins_file: PathBuf,
    implicitly_active: Vec<String>,
}

impl GameProfile {
    /// Builds the canonical profile for a game installed at `game_root`,
    /// deriving the metadata file locations from the local app data folder.
    pub fn new(game_id: GameId, game_root: &Path) -> Result<Self> {
        let (plugins_dir, load_order_file, active_plugins_file) = match game_id {
            GameId::Morrowind => (
                game_root.join("Data Files"),
                None,
                game_root.join("Morrowind.ini"),
            ),
            _ => {
                let local = local_data_dir()?.join(game_id.local_data_dir_name());
                let load_order_file = match game_id.method() {
                    Method::Textfile => Some(local.join("loadorder.txt")),
                    _ => None,
                };
                (
                    game_root.join("Data"),
                    load_order_file,
                    local.join("plugins.txt"),
                )
            }
        };

        Ok(Self {
            game_id,
            method: game_id.method(),
            game_master: game_id.master_file().to_string(),
            plugins_dir,
            load_order_file,
            active_plugins_file,
            implicitly_active: game_id.implicitly_active(),
        })
    }

    /// Builds a profile with every location supplied by the caller.
    pub fn with_paths(
        game_id: GameId,
        plugins_dir: PathBuf,
        load_order_file: Option<PathBuf>,
        active_plugins_file: PathBuf,
    ) -> Self {
        Self {
            game_id,
            method: game_id.method(),
            game_master: game_id.master_file().to_string(),
            plugins_dir,
            load_order_file,
            active_plugins_file,
            implicitly_active: game_id.implicitly_active(),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        serde_json::from_str(&raw)
            .map_err(|e| Error::io(path, io::Error::new(io::ErrorKind::InvalidData, e)))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let raw = serde_json::to_string_pretty(self)
            .map_err(|e| Error::io(path, io::Error::new(io::ErrorKind::InvalidData, e)))?;
        fs::write(path, raw).map_err(|e| Error::io(path, e))
    }

    pub fn game_id(&self) -> GameId {
        self.game_id
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn game_master(&self) -> &str {
        &self.game_master
    }

    pub fn plugins_dir(&self) -> &Path {
        &self.plugins_dir
    }

    pub fn load_order_file(&self) -> Option<&Path> {
        self.load_order_file.as_deref()
    }

    pub fn active_plugins_file(&self) -> &Path {
        &self.active_plugins_file
    }

    pub fn implicitly_active(&self) -> &[String] {
        &self.implicitly_active
    }

    pub fn is_game_master(&self, name: &str) -> bool {
        self.game_master.eq_ignore_ascii_case(name)
    }

    pub fn is_implicitly_active(&self, name: &str) -> bool {
        self.implicitly_active
            .iter()
            .any(|p| p.eq_ignore_ascii_case(name))
    }
}

fn local_data_dir() -> Result<PathBuf> {
    let base = BaseDirs::new().ok_or_else(|| {
        Error::io(
            PathBuf::new(),
            io::Error::new(io::ErrorKind::NotFound, "local app data dir not found"),
        )
    })?;
    Ok(base.data_local_dir().to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn game_id_maps_to_the_expected_method_and_master_file() {
        assert_eq!(Method::Morrowind, GameId::Morrowind.method());
        assert_eq!(Method::Timestamp, GameId::Oblivion.method());
        assert_eq!(Method::Timestamp, GameId::Fallout3.method());
        assert_eq!(Method::Timestamp, GameId::FalloutNv.method());
        assert_eq!(Method::Textfile, GameId::Skyrim.method());
        assert_eq!(Method::Asterisk, GameId::Fallout4.method());

        assert_eq!("Skyrim.esm", GameId::Skyrim.master_file());
        assert_eq!("Fallout4.esm", GameId::Fallout4.master_file());
    }

    #[test]
    fn new_uses_the_morrowind_ini_next_to_the_game() {
        let tmp_dir = tempdir().unwrap();
        let profile = GameProfile::new(GameId::Morrowind, tmp_dir.path()).unwrap();

        assert_eq!(tmp_dir.path().join("Data Files"), profile.plugins_dir());
        assert_eq!(
            tmp_dir.path().join("Morrowind.ini"),
            profile.active_plugins_file()
        );
        assert!(profile.load_order_file().is_none());
    }

    #[test]
    fn new_gives_skyrim_a_load_order_file_and_others_none() {
        let tmp_dir = tempdir().unwrap();

        let skyrim = GameProfile::new(GameId::Skyrim, tmp_dir.path()).unwrap();
        assert!(skyrim
            .load_order_file()
            .unwrap()
            .ends_with("Skyrim/loadorder.txt"));
        assert!(skyrim.active_plugins_file().ends_with("Skyrim/plugins.txt"));

        let fallout4 = GameProfile::new(GameId::Fallout4, tmp_dir.path()).unwrap();
        assert!(fallout4.load_order_file().is_none());
    }

    #[test]
    fn only_skyrim_marks_update_esm_implicitly_active() {
        let tmp_dir = tempdir().unwrap();

        let skyrim = GameProfile::new(GameId::Skyrim, tmp_dir.path()).unwrap();
        assert!(skyrim.is_implicitly_active("update.esm"));

        let fallout4 = GameProfile::new(GameId::Fallout4, tmp_dir.path()).unwrap();
        assert!(!fallout4.is_implicitly_active("Update.esm"));
    }

    #[test]
    fn is_game_master_folds_ascii_case() {
        let tmp_dir = tempdir().unwrap();
        let profile = GameProfile::new(GameId::Skyrim, tmp_dir.path()).unwrap();

        assert!(profile.is_game_master("SKYRIM.ESM"));
        assert!(!profile.is_game_master("Blank.esm"));
    }

    #[test]
    fn profiles_round_trip_through_json() {
        let tmp_dir = tempdir().unwrap();
        let profile = GameProfile::new(GameId::Fallout4, tmp_dir.path()).unwrap();

        let path = tmp_dir.path().join("profile.json");
        profile.save(&path).unwrap();
        let loaded = GameProfile::from_file(&path).unwrap();

        assert_eq!(profile.game_id(), loaded.game_id());
        assert_eq!(profile.method(), loaded.method());
        assert_eq!(profile.game_master(), loaded.game_master());
        assert_eq!(profile.plugins_dir(), loaded.plugins_dir());
        assert_eq!(profile.active_plugins_file(), loaded.active_plugins_file());
    }
}
