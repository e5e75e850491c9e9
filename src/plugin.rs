use std::{
    fmt,
    fs::File,
    hash::{Hash, Hasher},
    io::Read,
    path::Path,
};

use filetime::FileTime;

use crate::profile::{GameId, GameProfile};

/// A plugin filename. The case the caller supplied is preserved for display
/// and storage, but equality and hashing fold ASCII case; non-ASCII bytes
/// compare exactly.
#[derive(Clone, Debug)]
pub struct PluginName {
    raw: String,
    folded: String,
}

impl PluginName {
    pub fn new(name: &str) -> Self {
        Self {
            raw: name.to_string(),
            folded: name.to_ascii_lowercase(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn matches(&self, other: &str) -> bool {
        self.raw.eq_ignore_ascii_case(other)
    }
}

impl PartialEq for PluginName {
    fn eq(&self, other: &Self) -> bool {
        self.folded == other.folded
    }
}

impl Eq for PluginName {}

impl Hash for PluginName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.folded.hash(state);
    }
}

impl fmt::Display for PluginName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// One entry in the load order.
#[derive(Clone, Debug)]
pub struct Plugin {
    pub name: PluginName,
    pub active: bool,
    pub is_master: bool,
    pub mtime: FileTime,
}

impl Plugin {
    pub fn new(name: &str, facts: PluginFacts) -> Self {
        Self {
            name: PluginName::new(name),
            active: false,
            is_master: facts.is_master,
            mtime: facts.mtime,
        }
    }
}

/// What the header probe learned about a plugin file on disk.
#[derive(Clone, Copy, Debug)]
pub struct PluginFacts {
    pub is_master: bool,
    pub mtime: FileTime,
}

/// Answers whether a file in the profile's plugins directory is a well-formed
/// plugin, whether it is a master, and when it was last modified.
///
/// Implementations are stateless; the load order calls `probe` on demand and
/// caches the answer for the lifetime of the in-memory entry.
pub trait PluginReader {
    /// `None` means the file is missing or its header does not parse.
    fn probe(&self, profile: &GameProfile, name: &str) -> Option<PluginFacts>;
}

/// The default provider: reads the leading record header of the file itself.
#[derive(Clone, Copy, Debug, Default)]
pub struct HeaderReader;

const HEADER_LEN: usize = 16;
const MASTER_FLAG: u32 = 0x1;

impl PluginReader for HeaderReader {
    fn probe(&self, profile: &GameProfile, name: &str) -> Option<PluginFacts> {
        if name.is_empty() || !has_plugin_extension(name) {
            return None;
        }

        let path = profile.plugins_dir().join(name);
        let mut file = File::open(&path).ok()?;
        let mut header = [0u8; HEADER_LEN];
        file.read_exact(&mut header).ok()?;

        let is_master = match profile.game_id() {
            GameId::Morrowind => {
                if &header[..4] != b"TES3" {
                    return None;
                }
                has_extension(name, "esm")
            }
            _ => {
                if &header[..4] != b"TES4" {
                    return None;
                }
                let flags = u32::from_le_bytes(header[8..12].try_into().ok()?);
                flags & MASTER_FLAG != 0
            }
        };

        let metadata = file.metadata().ok()?;
        let mtime = FileTime::from_last_modification_time(&metadata);

        Some(PluginFacts { is_master, mtime })
    }
}

pub fn has_plugin_extension(name: &str) -> bool {
    has_extension(name, "esp") || has_extension(name, "esm") || has_extension(name, "esl")
}

fn has_extension(name: &str, extension: &str) -> bool {
    Path::new(name)
        .extension()
        .map(|e| e.eq_ignore_ascii_case(extension))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{profile_dirs, write_plugin, write_tes3_plugin};
    use std::collections::HashSet;
    use tempfile::tempdir;

    #[test]
    fn plugin_name_equality_folds_ascii_case_only() {
        assert_eq!(PluginName::new("Blank.esp"), PluginName::new("blank.ESP"));
        assert_ne!(PluginName::new("Blàñk.esp"), PluginName::new("BlÀÑk.esp"));
    }

    #[test]
    fn plugin_name_hash_matches_folded_equality() {
        let mut set = HashSet::new();
        set.insert(PluginName::new("Blank.esp"));
        assert!(set.contains(&PluginName::new("BLANK.esp")));
        assert!(!set.contains(&PluginName::new("Other.esp")));
    }

    #[test]
    fn probe_reads_the_master_flag_from_the_header() {
        let tmp_dir = tempdir().unwrap();
        let profile = profile_dirs(GameId::Skyrim, tmp_dir.path());
        write_plugin(&profile, "Blank.esm", true);
        write_plugin(&profile, "Blank.esp", false);

        let master = HeaderReader.probe(&profile, "Blank.esm").unwrap();
        let other = HeaderReader.probe(&profile, "Blank.esp").unwrap();

        assert!(master.is_master);
        assert!(!other.is_master);
    }

    #[test]
    fn probe_returns_none_for_missing_files() {
        let tmp_dir = tempdir().unwrap();
        let profile = profile_dirs(GameId::Skyrim, tmp_dir.path());

        assert!(HeaderReader.probe(&profile, "missing.esp").is_none());
    }

    #[test]
    fn probe_returns_none_for_files_with_a_bad_or_truncated_header() {
        let tmp_dir = tempdir().unwrap();
        let profile = profile_dirs(GameId::Skyrim, tmp_dir.path());
        std::fs::write(profile.plugins_dir().join("bad.esp"), b"JUNKJUNKJUNKJUNK").unwrap();
        std::fs::write(profile.plugins_dir().join("short.esp"), b"TES4").unwrap();

        assert!(HeaderReader.probe(&profile, "bad.esp").is_none());
        assert!(HeaderReader.probe(&profile, "short.esp").is_none());
    }

    #[test]
    fn probe_classifies_morrowind_masters_by_extension() {
        let tmp_dir = tempdir().unwrap();
        let profile = profile_dirs(GameId::Morrowind, tmp_dir.path());
        write_tes3_plugin(&profile, "Morrowind.esm");
        write_tes3_plugin(&profile, "Blank.esp");

        assert!(HeaderReader.probe(&profile, "Morrowind.esm").unwrap().is_master);
        assert!(!HeaderReader.probe(&profile, "Blank.esp").unwrap().is_master);
    }

    #[test]
    fn probe_rejects_non_plugin_extensions() {
        let tmp_dir = tempdir().unwrap();
        let profile = profile_dirs(GameId::Skyrim, tmp_dir.path());
        write_plugin(&profile, "Blank.esp", false);
        std::fs::copy(
            profile.plugins_dir().join("Blank.esp"),
            profile.plugins_dir().join("Blank.txt"),
        )
        .unwrap();

        assert!(HeaderReader.probe(&profile, "Blank.txt").is_none());
    }

    #[test]
    fn has_plugin_extension_is_case_insensitive() {
        assert!(has_plugin_extension("a.esp"));
        assert!(has_plugin_extension("a.ESM"));
        assert!(has_plugin_extension("a.EsL"));
        assert!(!has_plugin_extension("a.txt"));
        assert!(!has_plugin_extension("esp"));
    }
}
