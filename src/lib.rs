//! Loadsmith reads, validates, mutates and persists the plugin load order
//! for the Bethesda-style single-player RPGs.
//!
//! A [`GameProfile`] describes one game installation: which persistence
//! method it uses, which file is the game's own master, and where the plugins
//! and metadata files live. A [`LoadOrder`] bound to that profile holds the
//! in-memory ordering and active set, keeps the per-game ordering rules
//! intact through every mutation, and moves state to and from disk through
//! the profile's method: plugin-file mtimes, a dedicated load-order text
//! file, a single asterisk-marked file, or the Morrowind INI.
//!
//! ```no_run
//! use loadsmith::{GameId, GameProfile, HeaderReader, LoadOrder};
//!
//! # fn main() -> loadsmith::Result<()> {
//! let profile = GameProfile::new(GameId::Skyrim, "C:/Games/Skyrim".as_ref())?;
//! let reader = HeaderReader;
//! let mut order = LoadOrder::new(&profile, &reader);
//! order.load()?;
//! order.activate("Blank.esp")?;
//! order.save()?;
//! # Ok(())
//! # }
//! ```

mod error;
mod freshness;
mod order;
mod persist;
mod plugin;
mod profile;
#[cfg(test)]
mod testutil;

pub use error::{Error, Result};
pub use freshness::FreshnessSnapshot;
pub use order::{LoadOrder, MAX_ACTIVE};
pub use persist::is_synchronised;
pub use plugin::{
    has_plugin_extension, HeaderReader, Plugin, PluginFacts, PluginName, PluginReader,
};
pub use profile::{GameId, GameProfile, Method};
