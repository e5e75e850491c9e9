use std::collections::HashSet;

use log::debug;

use crate::error::{Error, Result};
use crate::freshness::FreshnessSnapshot;
use crate::persist;
use crate::plugin::{Plugin, PluginFacts, PluginName, PluginReader};
use crate::profile::GameProfile;

/// The game engines cap the number of simultaneously active plugins.
pub const MAX_ACTIVE: usize = 255;

/// The in-memory load order for one game: an ordered sequence of plugins,
/// each carrying an active flag, bound to the profile that selects which
/// rules apply.
///
/// Every mutation is all-or-nothing: on error the sequence and active flags
/// are untouched. Changes only reach disk through [`LoadOrder::save`].
pub struct LoadOrder<'a> {
    profile: &'a GameProfile,
    reader: &'a dyn PluginReader,
    plugins: Vec<Plugin>,
    snapshot: FreshnessSnapshot,
}

impl<'a> LoadOrder<'a> {
    pub fn new(profile: &'a GameProfile, reader: &'a dyn PluginReader) -> Self {
        Self {
            profile,
            reader,
            plugins: Vec::new(),
            snapshot: FreshnessSnapshot::default(),
        }
    }

    pub fn profile(&self) -> &GameProfile {
        self.profile
    }

    pub fn plugins(&self) -> &[Plugin] {
        &self.plugins
    }

    /// Rebuilds the in-memory state from disk if anything changed since the
    /// last load or save. A fresh filesystem makes this a no-op.
    pub fn load(&mut self) -> Result<()> {
        if !self.snapshot.is_stale(self.profile) {
            debug!("filesystem unchanged, keeping current load order");
            return Ok(());
        }

        self.plugins = persist::load(self.profile, self.reader)?;
        self.snapshot.refresh(self.profile);
        Ok(())
    }

    /// Writes the load order and active set through the profile's
    /// persistence method and re-snapshots the resulting mtimes.
    pub fn save(&mut self) -> Result<()> {
        persist::save(self.profile, &mut self.plugins)?;
        self.snapshot.refresh(self.profile);
        Ok(())
    }

    /// True when the on-disk metadata files agree with each other. Only the
    /// textfile method can disagree; every other method has a single source
    /// of truth.
    pub fn is_synchronised(&self) -> Result<bool> {
        persist::is_synchronised(self.profile)
    }

    pub fn plugin_names(&self) -> Vec<String> {
        self.plugins
            .iter()
            .map(|p| p.name.as_str().to_string())
            .collect()
    }

    /// The index of `name`, or the current length as a "not found" sentinel.
    pub fn position(&self, name: &str) -> usize {
        self.index_of(name).unwrap_or(self.plugins.len())
    }

    pub fn plugin_at(&self, index: usize) -> Result<&str> {
        self.plugins
            .get(index)
            .map(|p| p.name.as_str())
            .ok_or(Error::IndexOutOfBounds {
                index,
                len: self.plugins.len(),
            })
    }

    pub fn active_plugin_names(&self) -> Vec<String> {
        self.plugins
            .iter()
            .filter(|p| p.active)
            .map(|p| p.name.as_str().to_string())
            .collect()
    }

    pub fn is_active(&self, name: &str) -> bool {
        self.index_of(name)
            .map(|i| self.plugins[i].active)
            .unwrap_or(false)
    }

    /// Replaces the entire ordering. Plugins retained from the previous order
    /// keep their active flag; newly admitted plugins start inactive.
    pub fn set_load_order(&mut self, names: &[&str]) -> Result<()> {
        check_unique(names)?;

        if self.profile.method().loads_game_master_first() {
            match names.first() {
                Some(first) if self.profile.is_game_master(first) => {}
                _ => {
                    return Err(Error::OrderingViolation(format!(
                        "the game's master file \"{}\" must load first",
                        self.profile.game_master()
                    )))
                }
            }
        }

        let mut plugins = Vec::with_capacity(names.len());
        for name in names {
            plugins.push(self.existing_or_probed(name)?);
        }

        check_master_partition(&plugins)?;

        if self.profile.method().loads_game_master_first() {
            force_game_master_active(&mut plugins, self.profile);
        }
        check_active_count(&plugins)?;

        self.plugins = plugins;
        Ok(())
    }

    /// Moves `name` to `position`, clamped to the end of the order, inserting
    /// it first if it is not yet present. A moved plugin keeps its active
    /// flag; an inserted one starts inactive.
    pub fn set_position(&mut self, name: &str, position: usize) -> Result<usize> {
        if self.profile.method().loads_game_master_first() {
            let is_game_master = self.profile.is_game_master(name);
            if is_game_master && position != 0 && !self.plugins.is_empty() {
                return Err(Error::OrderingViolation(format!(
                    "the game's master file \"{}\" must stay at the front",
                    self.profile.game_master()
                )));
            }
            if !is_game_master && position == 0 {
                return Err(Error::OrderingViolation(format!(
                    "only the game's master file \"{}\" may load first",
                    self.profile.game_master()
                )));
            }
        }

        let mut plugins = self.plugins.clone();
        let plugin = match self.index_of(name) {
            Some(index) => plugins.remove(index),
            None => self.probed(name)?,
        };

        let index = position.min(plugins.len());
        plugins.insert(index, plugin);
        check_master_partition(&plugins)?;

        self.plugins = plugins;
        Ok(index)
    }

    /// Replaces the active set. Names not yet in the load order are admitted
    /// at their natural positions.
    pub fn set_active_plugins(&mut self, names: &[&str]) -> Result<()> {
        check_unique(names)?;

        if names.len() > MAX_ACTIVE {
            return Err(Error::TooManyActive { limit: MAX_ACTIVE });
        }

        let contains = |name: &str| names.iter().any(|n| n.eq_ignore_ascii_case(name));

        if self.profile.method().loads_game_master_first()
            && !names.is_empty()
            && !contains(self.profile.game_master())
        {
            let game_master = self.profile.game_master();
            if self.index_of(game_master).is_some()
                || self.reader.probe(self.profile, game_master).is_some()
            {
                return Err(Error::RequiredActive(game_master.to_string()));
            }
        }

        for required in self.profile.implicitly_active() {
            if !contains(required) && self.reader.probe(self.profile, required).is_some() {
                return Err(Error::RequiredActive(required.clone()));
            }
        }

        let mut plugins = self.plugins.clone();
        for plugin in &mut plugins {
            plugin.active = false;
        }

        for name in names {
            match plugins.iter_mut().find(|p| p.name.matches(name)) {
                Some(plugin) => plugin.active = true,
                None => {
                    let mut plugin = self.probed(name)?;
                    plugin.active = true;
                    let index = insert_position(&plugins, self.profile, &plugin);
                    plugins.insert(index, plugin);
                }
            }
        }

        self.plugins = plugins;
        Ok(())
    }

    /// Marks `name` active, admitting it into the load order first if needed.
    pub fn activate(&mut self, name: &str) -> Result<()> {
        let game_master_needed = self.profile.method().loads_game_master_first()
            && !self.profile.is_game_master(name)
            && self
                .index_of(self.profile.game_master())
                .map(|i| !self.plugins[i].active)
                .unwrap_or(false);

        match self.index_of(name) {
            Some(index) => {
                if !self.plugins[index].active {
                    let needed = 1 + usize::from(game_master_needed);
                    if self.active_count() + needed > MAX_ACTIVE {
                        return Err(Error::TooManyActive { limit: MAX_ACTIVE });
                    }
                    self.plugins[index].active = true;
                }
            }
            None => {
                let mut plugin = self.probed(name)?;
                let needed = 1 + usize::from(game_master_needed);
                if self.active_count() + needed > MAX_ACTIVE {
                    return Err(Error::TooManyActive { limit: MAX_ACTIVE });
                }
                plugin.active = true;
                let index = insert_position(&self.plugins, self.profile, &plugin);
                self.plugins.insert(index, plugin);
            }
        }

        if self.profile.method().loads_game_master_first() {
            force_game_master_active(&mut self.plugins, self.profile);
        }

        Ok(())
    }

    /// Clears the active flag. Deactivating an absent plugin succeeds as a
    /// no-op; a plugin the game requires cannot be deactivated.
    pub fn deactivate(&mut self, name: &str) -> Result<()> {
        if self.profile.method().loads_game_master_first() && self.profile.is_game_master(name) {
            return Err(Error::RequiredActive(self.profile.game_master().to_string()));
        }

        if self.profile.is_implicitly_active(name)
            && self.reader.probe(self.profile, name).is_some()
        {
            return Err(Error::RequiredActive(name.to_string()));
        }

        if let Some(index) = self.index_of(name) {
            self.plugins[index].active = false;
        }
        Ok(())
    }

    /// Admits a valid plugin at its natural position without activating it.
    pub fn insert(&mut self, name: &str) -> Result<usize> {
        if self.index_of(name).is_some() {
            return Err(Error::InvalidArgs(format!(
                "\"{name}\" is already in the load order"
            )));
        }

        let plugin = self.probed(name)?;
        let index = insert_position(&self.plugins, self.profile, &plugin);
        self.plugins.insert(index, plugin);
        Ok(index)
    }

    /// Drops a plugin from the load order entirely.
    pub fn remove(&mut self, name: &str) -> Result<()> {
        match self.index_of(name) {
            Some(index) => {
                self.plugins.remove(index);
                Ok(())
            }
            None => Err(Error::InvalidPlugin(name.to_string())),
        }
    }

    /// Empties the load order and forgets the freshness snapshot, so the next
    /// `load` rebuilds from disk unconditionally.
    pub fn clear(&mut self) {
        self.plugins.clear();
        self.snapshot.reset();
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.plugins.iter().position(|p| p.name.matches(name))
    }

    fn active_count(&self) -> usize {
        self.plugins.iter().filter(|p| p.active).count()
    }

    fn probed(&self, name: &str) -> Result<Plugin> {
        let facts = self.probe(name)?;
        Ok(Plugin::new(name, facts))
    }

    fn probe(&self, name: &str) -> Result<PluginFacts> {
        self.reader
            .probe(self.profile, name)
            .ok_or_else(|| Error::InvalidPlugin(name.to_string()))
    }

    fn existing_or_probed(&self, name: &str) -> Result<Plugin> {
        match self.index_of(name) {
            Some(index) => Ok(self.plugins[index].clone()),
            None => self.probed(name),
        }
    }
}

/// Where a plugin belongs when admitted without an explicit position: the
/// game master leads when the method pins it, other masters go one past the
/// last master, and non-masters go to the end.
pub(crate) fn insert_position(
    plugins: &[Plugin],
    profile: &GameProfile,
    plugin: &Plugin,
) -> usize {
    if profile.method().loads_game_master_first() && profile.is_game_master(plugin.name.as_str()) {
        0
    } else if plugin.is_master {
        master_partition_point(plugins)
    } else {
        plugins.len()
    }
}

fn master_partition_point(plugins: &[Plugin]) -> usize {
    plugins
        .iter()
        .position(|p| !p.is_master)
        .unwrap_or(plugins.len())
}

fn force_game_master_active(plugins: &mut [Plugin], profile: &GameProfile) {
    if let Some(plugin) = plugins
        .iter_mut()
        .find(|p| p.name.matches(profile.game_master()))
    {
        plugin.active = true;
    }
}

fn check_master_partition(plugins: &[Plugin]) -> Result<()> {
    let mut last_non_master: Option<&PluginName> = None;
    for plugin in plugins {
        if !plugin.is_master {
            last_non_master = Some(&plugin.name);
        } else if let Some(non_master) = last_non_master {
            return Err(Error::OrderingViolation(format!(
                "master \"{}\" would load after non-master \"{}\"",
                plugin.name, non_master
            )));
        }
    }
    Ok(())
}

fn check_unique(names: &[&str]) -> Result<()> {
    let mut seen = HashSet::with_capacity(names.len());
    for name in names {
        if !seen.insert(name.to_ascii_lowercase()) {
            return Err(Error::InvalidArgs(format!(
                "\"{name}\" appears more than once"
            )));
        }
    }
    Ok(())
}

fn check_active_count(plugins: &[Plugin]) -> Result<()> {
    if plugins.iter().filter(|p| p.active).count() > MAX_ACTIVE {
        return Err(Error::TooManyActive { limit: MAX_ACTIVE });
    }
    Ok(())
}
