use std::{
    collections::HashSet,
    fs, io,
    path::{Path, PathBuf},
};

use encoding_rs::WINDOWS_1252;
use filetime::{set_file_mtime, FileTime};
use log::{debug, warn};
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::order::{insert_position, MAX_ACTIVE};
use crate::plugin::{has_plugin_extension, Plugin, PluginReader};
use crate::profile::{GameProfile, Method};

const GAME_FILES_SECTION: &str = "[Game Files]";

/// Seconds between the mtimes assigned by a timestamp-method save. Two keeps
/// the ordering observable on filesystems with 2-second mtime granularity.
const MTIME_STEP_SECS: i64 = 2;

/// Rebuilds the load order and active set from disk for the profile's
/// persistence method.
///
/// Loading repairs rather than rejects: names in the metadata files that are
/// unknown, duplicated, missing from disk or malformed are dropped, the
/// active set is truncated to the cap in file order, and plugins present on
/// disk but absent from the files are admitted.
pub(crate) fn load(profile: &GameProfile, reader: &dyn PluginReader) -> Result<Vec<Plugin>> {
    let mut plugins = match profile.method() {
        Method::Timestamp | Method::Morrowind => {
            let mut plugins = scan_plugins_dir(profile, reader);
            // The engine loads masters before non-masters whatever their
            // timestamps say, so the in-memory order reflects that.
            plugins.sort_by_key(|p| !p.is_master);
            plugins
        }
        Method::Textfile => load_textfile_order(profile, reader)?,
        Method::Asterisk => load_asterisk_order(profile, reader)?,
    };

    let active_names = match profile.method() {
        Method::Morrowind => read_game_files_section(profile.active_plugins_file())?,
        Method::Timestamp | Method::Textfile => {
            read_windows_1252_names(profile.active_plugins_file())?
        }
        // The asterisk file already carried the active markers.
        Method::Asterisk => Vec::new(),
    };

    if profile.method().loads_game_master_first() {
        if let Some(plugin) = plugins
            .iter_mut()
            .find(|p| p.name.matches(profile.game_master()))
        {
            plugin.active = true;
        }
    }
    for required in profile.implicitly_active() {
        if let Some(plugin) = plugins.iter_mut().find(|p| p.name.matches(required)) {
            plugin.active = true;
        }
    }

    activate_in_order(&mut plugins, &active_names);

    debug!(
        "loaded {} plugins for {} ({} active)",
        plugins.len(),
        profile.game_id().display_name(),
        plugins.iter().filter(|p| p.active).count()
    );

    Ok(plugins)
}

/// Flushes the load order and active set through the profile's persistence
/// method. Timestamp-ordered games get freshly assigned plugin mtimes, which
/// are written back into the in-memory entries.
pub(crate) fn save(profile: &GameProfile, plugins: &mut [Plugin]) -> Result<()> {
    match profile.method() {
        Method::Timestamp => {
            assign_mtimes(profile, plugins)?;
            save_active_lines(profile, plugins)
        }
        Method::Morrowind => {
            assign_mtimes(profile, plugins)?;
            save_game_files_section(profile, plugins)
        }
        Method::Textfile => {
            save_load_order_file(profile, plugins)?;
            save_active_lines(profile, plugins)
        }
        Method::Asterisk => save_asterisk_file(profile, plugins),
    }
}

/// Whether the persisted files agree with each other. Only the textfile
/// method keeps the ordering in two places; everywhere else there is a single
/// source of truth, so the answer is trivially yes.
///
/// The check is file-level: the names in the active-plugins file must appear
/// in the load-order file in the same relative order.
pub fn is_synchronised(profile: &GameProfile) -> Result<bool> {
    if profile.method() != Method::Textfile {
        return Ok(true);
    }

    let load_order_file = match profile.load_order_file() {
        Some(path) if path.exists() => path,
        _ => return Ok(true),
    };
    if !profile.active_plugins_file().exists() {
        return Ok(true);
    }

    let order_names = read_utf8_or_1252_names(load_order_file)?;
    let active_names = read_windows_1252_names(profile.active_plugins_file())?;

    let agrees = order_names
        .iter()
        .filter(|o| active_names.iter().any(|a| a.eq_ignore_ascii_case(o)))
        .zip(active_names.iter())
        .all(|(o, a)| o.eq_ignore_ascii_case(a));

    Ok(agrees)
}

fn load_textfile_order(profile: &GameProfile, reader: &dyn PluginReader) -> Result<Vec<Plugin>> {
    let seed_names = match profile.load_order_file() {
        Some(path) if path.exists() => read_utf8_or_1252_names(path)?,
        _ => read_windows_1252_names(profile.active_plugins_file())?,
    };

    let mut plugins = Vec::new();
    let mut seen = HashSet::new();
    for name in &seed_names {
        admit(&mut plugins, &mut seen, profile, reader, name);
    }
    admit_scanned(&mut plugins, &mut seen, profile, reader);

    Ok(plugins)
}

fn load_asterisk_order(profile: &GameProfile, reader: &dyn PluginReader) -> Result<Vec<Plugin>> {
    let mut plugins = Vec::new();
    let mut seen = HashSet::new();
    let mut active_names = Vec::new();

    // The game's own master is implicit: first, active, never listed.
    if reader.probe(profile, profile.game_master()).is_some() {
        admit(&mut plugins, &mut seen, profile, reader, profile.game_master());
        active_names.push(profile.game_master().to_string());
    }

    for line in read_windows_1252_names(profile.active_plugins_file())? {
        let (name, active) = match line.strip_prefix('*') {
            Some(rest) => (rest, true),
            None => (line.as_str(), false),
        };
        if profile.is_game_master(name) {
            continue;
        }
        admit(&mut plugins, &mut seen, profile, reader, name);
        if active {
            active_names.push(name.to_string());
        }
    }
    admit_scanned(&mut plugins, &mut seen, profile, reader);

    activate_in_order(&mut plugins, &active_names);

    Ok(plugins)
}

fn admit(
    plugins: &mut Vec<Plugin>,
    seen: &mut HashSet<String>,
    profile: &GameProfile,
    reader: &dyn PluginReader,
    name: &str,
) {
    if !seen.insert(name.to_ascii_lowercase()) {
        warn!("dropping duplicate entry \"{name}\"");
        return;
    }
    match reader.probe(profile, name) {
        Some(facts) => {
            let plugin = Plugin::new(name, facts);
            let index = insert_position(plugins, profile, &plugin);
            plugins.insert(index, plugin);
        }
        None => warn!("dropping missing or invalid plugin \"{name}\""),
    }
}

fn admit_scanned(
    plugins: &mut Vec<Plugin>,
    seen: &mut HashSet<String>,
    profile: &GameProfile,
    reader: &dyn PluginReader,
) {
    for plugin in scan_plugins_dir(profile, reader) {
        if seen.insert(plugin.name.as_str().to_ascii_lowercase()) {
            let index = insert_position(plugins, profile, &plugin);
            plugins.insert(index, plugin);
        }
    }
}

/// Every well-formed plugin in the plugins directory, ordered by ascending
/// mtime with case-insensitive filename ties.
fn scan_plugins_dir(profile: &GameProfile, reader: &dyn PluginReader) -> Vec<Plugin> {
    let mut plugins: Vec<Plugin> = WalkDir::new(profile.plugins_dir())
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.file_name().to_str().map(str::to_string))
        .filter(|name| has_plugin_extension(name))
        .filter_map(|name| {
            reader
                .probe(profile, &name)
                .map(|facts| Plugin::new(&name, facts))
        })
        .collect();

    plugins.sort_by(|a, b| {
        a.mtime.cmp(&b.mtime).then_with(|| {
            a.name
                .as_str()
                .to_ascii_lowercase()
                .cmp(&b.name.as_str().to_ascii_lowercase())
        })
    });

    plugins
}

/// Marks `names` active in their given order, keeping whatever is already
/// active and truncating at the cap.
fn activate_in_order(plugins: &mut [Plugin], names: &[String]) {
    let mut count = plugins.iter().filter(|p| p.active).count();

    for name in names {
        let Some(plugin) = plugins.iter_mut().find(|p| p.name.matches(name)) else {
            continue;
        };
        if plugin.active {
            continue;
        }
        if count >= MAX_ACTIVE {
            warn!("active plugin cap reached, dropping \"{name}\" and later entries");
            break;
        }
        plugin.active = true;
        count += 1;
    }
}

fn assign_mtimes(profile: &GameProfile, plugins: &mut [Plugin]) -> Result<()> {
    let Some(anchor) = plugins.iter().map(|p| p.mtime).min() else {
        return Ok(());
    };

    for (index, plugin) in plugins.iter_mut().enumerate() {
        let assigned = FileTime::from_unix_time(
            anchor.unix_seconds() + MTIME_STEP_SECS * index as i64,
            0,
        );
        let path = profile.plugins_dir().join(plugin.name.as_str());
        set_file_mtime(&path, assigned).map_err(|e| Error::io(&path, e))?;
        plugin.mtime = assigned;
    }

    Ok(())
}

fn save_load_order_file(profile: &GameProfile, plugins: &[Plugin]) -> Result<()> {
    let Some(path) = profile.load_order_file() else {
        return Ok(());
    };

    let mut content = String::new();
    for plugin in plugins {
        content.push_str(plugin.name.as_str());
        content.push('\n');
    }
    write_atomic(path, content.as_bytes())
}

fn save_active_lines(profile: &GameProfile, plugins: &[Plugin]) -> Result<()> {
    let mut content = Vec::new();
    for plugin in plugins.iter().filter(|p| p.active) {
        content.extend_from_slice(&encode_windows_1252(plugin.name.as_str())?);
        content.push(b'\n');
    }
    write_atomic(profile.active_plugins_file(), &content)
}

fn save_asterisk_file(profile: &GameProfile, plugins: &[Plugin]) -> Result<()> {
    let mut content = Vec::new();
    for plugin in plugins {
        if profile.is_game_master(plugin.name.as_str()) {
            continue;
        }
        if plugin.active {
            content.push(b'*');
        }
        content.extend_from_slice(&encode_windows_1252(plugin.name.as_str())?);
        content.push(b'\n');
    }
    write_atomic(profile.active_plugins_file(), &content)
}

/// Rewrites the `[Game Files]` section of the Morrowind INI, leaving every
/// other line of the file as it was.
fn save_game_files_section(profile: &GameProfile, plugins: &[Plugin]) -> Result<()> {
    let path = profile.active_plugins_file();

    let mut section = vec![GAME_FILES_SECTION.to_string()];
    for (index, plugin) in plugins.iter().filter(|p| p.active).enumerate() {
        section.push(format!("GameFile{index}={}", plugin.name.as_str()));
    }

    let mut output = Vec::new();
    let mut replaced = false;
    let mut in_section = false;
    for line in read_raw_lines(path)? {
        if line.trim().starts_with('[') {
            in_section = line.trim().eq_ignore_ascii_case(GAME_FILES_SECTION);
            if in_section {
                replaced = true;
                output.extend(section.iter().cloned());
                continue;
            }
        }
        if !in_section {
            output.push(line);
        }
    }
    if !replaced {
        output.extend(section);
    }

    let mut content = Vec::new();
    for line in &output {
        content.extend_from_slice(&encode_windows_1252(line)?);
        content.push(b'\n');
    }
    write_atomic(path, &content)
}

/// The active-file names for Morrowind: `GameFile<N>=<name>` entries from the
/// `[Game Files]` section, in file order.
fn read_game_files_section(path: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    let mut in_section = false;

    for line in read_raw_lines(path)? {
        let trimmed = line.trim();
        if trimmed.starts_with('[') {
            in_section = trimmed.eq_ignore_ascii_case(GAME_FILES_SECTION);
            continue;
        }
        if !in_section {
            continue;
        }
        if let Some((key, value)) = trimmed.split_once('=') {
            if key.trim().starts_with("GameFile") && !value.trim().is_empty() {
                names.push(value.trim().to_string());
            }
        }
    }

    Ok(names)
}

fn read_utf8_or_1252_names(path: &Path) -> Result<Vec<String>> {
    let Some(bytes) = read_file(path)? else {
        return Ok(Vec::new());
    };

    let decoded = match std::str::from_utf8(&bytes) {
        Ok(text) => text.to_string(),
        Err(_) => decode_windows_1252(&bytes),
    };

    Ok(filter_lines(&decoded))
}

/// Windows-1252 decoded, comment and blank lines removed.
fn read_windows_1252_names(path: &Path) -> Result<Vec<String>> {
    let Some(bytes) = read_file(path)? else {
        return Ok(Vec::new());
    };
    Ok(filter_lines(&decode_windows_1252(&bytes)))
}

/// Windows-1252 decoded with nothing filtered; absent files read as empty.
fn read_raw_lines(path: &Path) -> Result<Vec<String>> {
    let Some(bytes) = read_file(path)? else {
        return Ok(Vec::new());
    };
    Ok(decode_windows_1252(&bytes)
        .lines()
        .map(str::to_string)
        .collect())
}

fn filter_lines(text: &str) -> Vec<String> {
    text.lines()
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

fn read_file(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::io(path, e)),
    }
}

fn decode_windows_1252(bytes: &[u8]) -> String {
    // Windows-1252 maps every byte, so this decode cannot fail.
    WINDOWS_1252.decode_without_bom_handling(bytes).0.into_owned()
}

fn encode_windows_1252(text: &str) -> Result<Vec<u8>> {
    let (encoded, _, had_errors) = WINDOWS_1252.encode(text);
    if had_errors {
        return Err(Error::Encoding(text.to_string()));
    }
    Ok(encoded.into_owned())
}

/// Writes through a sibling temporary file and renames into place, so the
/// game never observes a torn metadata file.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, bytes).map_err(|e| Error::io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| Error::io(path, e))
}
