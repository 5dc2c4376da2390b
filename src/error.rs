use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong while harvesting.
///
/// Only `Io` and `Config` are fatal for a run, the rest are contained to the
/// candidate they happened on.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read config {path:?}: {source}")]
    ConfigRead { path: PathBuf, source: io::Error },

    #[error("invalid config: {0}")]
    Config(String),

    #[error("api request failed: {0}")]
    Api(String),

    #[error("rate limited, resets at {reset:?}")]
    RateLimited { reset: Option<i64> },

    #[error("failed to clone '{url}': {reason}")]
    Fetch { url: String, reason: String },

    #[error("no owner/name in locator '{0}'")]
    Locator(String),

    #[error("filesystem error at {path:?}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("failed to install signal handler: {0}")]
    Signal(io::Error),

    #[error("failed to initialize logging: {0}")]
    Logging(String),
}

impl Error {
    /// Wrap an io error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Io { path: path.into(), source }
    }

    /// True when the error threatens the corpus and the run must stop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Io { .. } | Error::Config(_) | Error::ConfigRead { .. })
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Api(e.to_string())
    }
}
