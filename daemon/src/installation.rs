/// Locating the game executable on disk.
///
/// Resolution is a fixed chain over two snapshots taken at call time (the
/// remote client's connection state and the known installation hints):
///
/// 1. connected: ask the remote client, and trust only its answer;
/// 2. disconnected with a Tencent installation: `<path>/Game`, unchecked;
/// 3. disconnected with a detected client executable: its sibling `Game`
///    directory, checked for existence;
/// 4. otherwise there is nothing left to try.
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::InstallationConfig;
use crate::error::GameClientError;
use crate::process_registry::SystemProcessRegistry;
use crate::remote::{ConnectionSnapshot, RemoteClientSession};

/// Executable name of the game client.
pub const GAME_CLIENT_PROCESS_NAME: &str = "League of Legends.exe";
pub const GAME_DIR_NAME: &str = "Game";
pub const INSTALL_LOCATION_PATH: &str =
    "/lol-patch/v1/products/league_of_legends/install-location";

const CLIENT_PROCESS_NAMES: &[&str] = &["LeagueClient.exe", "LeagueClientUx.exe"];

/// Known installations, as tracked outside of any client session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstallationHints {
    pub tencent_installation_path: Option<PathBuf>,
    /// Client executables seen on this machine, most trusted first.
    pub league_client_executable_paths: Vec<PathBuf>,
}

/// Source of [`InstallationHints`]. Gathering them may scan the process
/// table, so the call is async and must not block the runtime.
#[async_trait]
pub trait InstallationTracker: Send + Sync {
    async fn hints(&self) -> InstallationHints;
}

/// Where the game lives. Both paths are always non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameLocation {
    pub game_install_root: PathBuf,
    pub game_executable_path: PathBuf,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstallLocationResponse {
    game_install_root: String,
    game_executable_path: String,
}

/// Filesystem existence check, separated so resolution can be exercised
/// against a fake disk.
#[async_trait]
pub trait PathProbe: Send + Sync {
    async fn access(&self, path: &Path) -> io::Result<()>;
}

pub struct FsProbe;

#[async_trait]
impl PathProbe for FsProbe {
    async fn access(&self, path: &Path) -> io::Result<()> {
        tokio::fs::metadata(path).await.map(|_| ())
    }
}

pub async fn resolve(
    connection: &ConnectionSnapshot,
    hints: &InstallationHints,
    remote: &dyn RemoteClientSession,
    probe: &dyn PathProbe,
) -> Result<GameLocation, GameClientError> {
    if connection.is_connected() {
        return query_remote(remote).await;
    }

    if let Some(tencent) = &hints.tencent_installation_path {
        debug!("using Tencent installation at {}", tencent.display());
        return Ok(tencent_location(tencent));
    }

    if let Some(client_exe) = hints.league_client_executable_paths.first() {
        let Some(location) = sibling_game_location(client_exe) else {
            return Err(GameClientError::CannotGetGameInstallationPath);
        };
        return match probe.access(&location.game_executable_path).await {
            Ok(()) => Ok(location),
            Err(e) => {
                warn!(
                    "game executable not found at {}: {e}",
                    location.game_executable_path.display()
                );
                Err(GameClientError::CannotGetGameInstallationPath)
            }
        };
    }

    Err(GameClientError::CannotGetGameInstallationPath)
}

/// A connected client is authoritative: if it cannot answer, no offline
/// heuristic is tried.
async fn query_remote(remote: &dyn RemoteClientSession) -> Result<GameLocation, GameClientError> {
    let body = remote.get(INSTALL_LOCATION_PATH).await.map_err(|e| {
        warn!("remote client did not report an install location: {e}");
        GameClientError::CannotGetGameInstallationPath
    })?;

    let location: InstallLocationResponse = serde_json::from_value(body).map_err(|e| {
        warn!("malformed install location: {e}");
        GameClientError::CannotGetGameInstallationPath
    })?;

    if location.game_install_root.is_empty() || location.game_executable_path.is_empty() {
        return Err(GameClientError::CannotGetGameInstallationPath);
    }

    Ok(GameLocation {
        game_install_root: PathBuf::from(location.game_install_root),
        game_executable_path: PathBuf::from(location.game_executable_path),
    })
}

/// `<tencent>/Game` and `<tencent>/Game/League of Legends.exe`.
pub fn tencent_location(tencent_installation_path: &Path) -> GameLocation {
    let game_install_root = tencent_installation_path.join(GAME_DIR_NAME);
    let game_executable_path = game_install_root.join(GAME_CLIENT_PROCESS_NAME);
    GameLocation {
        game_install_root,
        game_executable_path,
    }
}

/// `Game/League of Legends.exe` next to a client executable.
pub fn sibling_game_location(client_executable: &Path) -> Option<GameLocation> {
    let client_dir = client_executable
        .parent()
        .filter(|p| !p.as_os_str().is_empty())?;
    let game_install_root = client_dir.join(GAME_DIR_NAME);
    let game_executable_path = game_install_root.join(GAME_CLIENT_PROCESS_NAME);
    Some(GameLocation {
        game_install_root,
        game_executable_path,
    })
}

/// Installation hints from the `[installation]` config section plus the
/// executables of any client processes currently running.
pub struct ClientInstallations {
    configured: RwLock<InstallationConfig>,
    registry: Arc<SystemProcessRegistry>,
}

impl ClientInstallations {
    pub fn new(configured: InstallationConfig, registry: Arc<SystemProcessRegistry>) -> Self {
        Self {
            configured: RwLock::new(configured),
            registry,
        }
    }

    /// Replaces the configured part of the hints, e.g. after a config reload.
    pub fn update(&self, configured: InstallationConfig) {
        *self.configured.write().unwrap_or_else(|e| e.into_inner()) = configured;
    }

    /// Executables of running clients. The scan runs on the blocking pool.
    async fn detected_client_paths(&self) -> Vec<PathBuf> {
        let registry = Arc::clone(&self.registry);
        let scan = tokio::task::spawn_blocking(move || {
            CLIENT_PROCESS_NAMES
                .iter()
                .flat_map(|name| registry.find_by_name(name))
                .filter_map(|p| p.exe)
                .collect::<Vec<_>>()
        });
        match scan.await {
            Ok(paths) => paths,
            Err(e) => {
                warn!("client process scan failed: {e}");
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl InstallationTracker for ClientInstallations {
    async fn hints(&self) -> InstallationHints {
        let detected = self.detected_client_paths().await;
        let configured = self
            .configured
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        merge_hints(configured, detected)
    }
}

/// Configured paths come first; detected ones are appended without
/// duplicates.
fn merge_hints(configured: InstallationConfig, detected: Vec<PathBuf>) -> InstallationHints {
    let mut paths = configured.league_client_executable_paths;
    for path in detected {
        if !paths.contains(&path) {
            paths.push(path);
        }
    }
    InstallationHints {
        tencent_installation_path: configured.tencent_installation_path,
        league_client_executable_paths: paths,
    }
}
