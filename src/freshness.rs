use std::{fs, path::Path};

use filetime::FileTime;

use crate::profile::GameProfile;

/// High-water mark over the modification times of everything a load order is
/// built from: the plugins directory, the load-order file (when the method
/// has one) and the active-plugins file.
///
/// Staleness is any inequality, in either direction; an external edit that
/// rewinds an mtime still triggers a reload.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FreshnessSnapshot {
    high_water: Option<FileTime>,
}

impl FreshnessSnapshot {
    /// True when the filesystem no longer matches the snapshot. A snapshot
    /// that was never taken (or was reset) is always stale.
    pub fn is_stale(&self, profile: &GameProfile) -> bool {
        match self.high_water {
            None => true,
            Some(mark) => high_water_mark(profile) != mark,
        }
    }

    pub fn refresh(&mut self, profile: &GameProfile) {
        self.high_water = Some(high_water_mark(profile));
    }

    pub fn reset(&mut self) {
        self.high_water = None;
    }
}

fn high_water_mark(profile: &GameProfile) -> FileTime {
    let mut mark = FileTime::zero();

    let mut observe = |path: &Path| {
        if let Ok(metadata) = fs::metadata(path) {
            mark = mark.max(FileTime::from_last_modification_time(&metadata));
        }
    };

    observe(profile.plugins_dir());
    if let Some(path) = profile.load_order_file() {
        observe(path);
    }
    observe(profile.active_plugins_file());

    mark
}
