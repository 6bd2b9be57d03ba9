use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failures of a request against the League client's or the game's local
/// HTTP API.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// No client process with usable credentials was found.
    #[error("remote client is not running")]
    NoSession,
    #[error("{path} answered HTTP {status}")]
    Status { path: String, status: u16 },
    #[error("local API request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("unexpected response from {path}: {detail}")]
    Unexpected { path: String, detail: String },
}

/// Typed failures surfaced by [`crate::controller::GameClientController`].
#[derive(Debug, Error)]
pub enum GameClientError {
    /// Every installation-resolution strategy was inapplicable or failed.
    #[error("Cannot get game installation path")]
    CannotGetGameInstallationPath,
    /// The operation needs a live remote client session.
    #[error("remote client is not connected")]
    NotConnected,
    /// The OS refused or failed to start the game process.
    #[error("failed to spawn game client: {0}")]
    SpawnFailure(#[source] io::Error),
    #[error("filesystem error on {}: {source}", .path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// A connected remote client failed to answer a settings-path query.
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

impl GameClientError {
    pub(crate) fn filesystem(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Filesystem {
            path: path.into(),
            source,
        }
    }
}
