/// Structured error types for the amity-core library.
///
/// Uses `thiserror` so the server and CLI can match on variants.
/// The binary (amity-cli) wraps these in `anyhow` for reporting.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for amity-core operations
#[derive(Error, Debug)]
pub enum AmityError {
    /// I/O operation failed
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },

    /// Config file could not be parsed
    #[error("Invalid config file {path:?}: {source}")]
    ConfigParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// Config could not be serialized
    #[error("Failed to serialize config: {source}")]
    ConfigSerialize {
        #[from]
        source: toml::ser::Error,
    },

    /// Config file missing where one was required
    #[error("Config not found at {path:?}")]
    ConfigNotFound { path: PathBuf },

    /// Configuration value is unusable
    #[error("Configuration error: {reason}")]
    Config { reason: String },

    /// A string did not name a known enum variant
    #[error("Unknown {kind} '{value}'")]
    UnknownVariant { kind: &'static str, value: String },

    /// A user tried to relate to themselves
    #[error("A user cannot {action} themselves")]
    SelfReference { action: &'static str },
}

/// Result type alias for amity-core operations
pub type Result<T> = std::result::Result<T, AmityError>;

impl AmityError {
    /// Create a config parse error
    pub fn config_parse(path: impl Into<PathBuf>, source: toml::de::Error) -> Self {
        Self::ConfigParse {
            path: path.into(),
            source,
        }
    }

    /// Create a config error
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    /// Create an unknown variant error
    pub fn unknown_variant(kind: &'static str, value: impl Into<String>) -> Self {
        Self::UnknownVariant {
            kind,
            value: value.into(),
        }
    }
}
