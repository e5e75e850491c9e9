use std::{io, path::PathBuf};

use thiserror::Error;

/// Convenience wrapper around `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// Error returned by load order operations.
///
/// Every mutating operation that returns an error leaves the in-memory load
/// order exactly as it was before the call.
#[derive(Error, Debug)]
pub enum Error {
    /// A malformed input set or sequence: case-insensitive duplicates, empty
    /// names, or a plugin that is already present where it must not be.
    #[error("invalid argument: {0}")]
    InvalidArgs(String),

    /// The named file does not exist in the plugins directory, or its header
    /// does not parse as a plugin.
    #[error("the plugin file \"{0}\" is missing or invalid")]
    InvalidPlugin(String),

    /// Activating another plugin would exceed the active-plugin limit.
    #[error("cannot exceed {limit} active plugins")]
    TooManyActive { limit: usize },

    /// The requested order breaks the master partition, or moves the game's
    /// own master file away from the front of the load order.
    #[error("ordering violation: {0}")]
    OrderingViolation(String),

    /// The plugin must stay active for this game and cannot be deactivated.
    #[error("the plugin \"{0}\" is required to be active")]
    RequiredActive(String),

    /// An index past the end of the load order.
    #[error("index {index} is out of bounds for a load order of {len} plugins")]
    IndexOutOfBounds { index: usize, len: usize },

    /// An I/O failure involving one of the persisted files.
    #[error("I/O error involving {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A filename that cannot be represented in the Windows-1252 encoding the
    /// active-plugins file uses.
    #[error("the filename \"{0}\" cannot be encoded as Windows-1252")]
    Encoding(String),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}
