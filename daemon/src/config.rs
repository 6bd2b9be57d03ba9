use anyhow::{Context, Result};
use notify::{Config as NotifyConfig, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, warn};

use crate::event::DaemonEvent;
use crate::remote::DEFAULT_REQUEST_TIMEOUT_MS;
use crate::spectator::DEFAULT_LOCALE;

/// Lower bound for remote API timeouts; anything shorter cannot complete a
/// TLS handshake with the local client.
pub const MIN_REQUEST_TIMEOUT_MS: u64 = 100;

/// Root configuration structure. Deserialized from `config.toml` in the app
/// data directory.
#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub game_client: GameClientConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub installation: InstallationConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GameClientConfig {
    /// Whether the terminate shortcut actually kills the game.
    #[serde(default)]
    pub terminate_with_shortcut: bool,
    /// Key name of the terminate shortcut (e.g. "F4"). Unset = no shortcut.
    #[serde(default)]
    pub terminate_shortcut: Option<String>,
    /// Locale passed to spectator launches that do not name one.
    #[serde(default = "default_locale")]
    pub default_locale: String,
}

impl Default for GameClientConfig {
    fn default() -> Self {
        Self {
            terminate_with_shortcut: false,
            terminate_shortcut: None,
            default_locale: default_locale(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RemoteConfig {
    /// Timeout applied to every request against the client API.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
        }
    }
}

impl RemoteConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms.max(MIN_REQUEST_TIMEOUT_MS))
    }
}

/// Installations known without asking a running client.
#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
pub struct InstallationConfig {
    /// Root of a Tencent (WeGame) installation, if any.
    #[serde(default)]
    pub tencent_installation_path: Option<PathBuf>,
    /// `LeagueClient.exe` paths to try, most preferred first.
    #[serde(default)]
    pub league_client_executable_paths: Vec<PathBuf>,
}

/// Loads the config file at `path`, returning `Config::default()` if the file does not exist.
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_or_default(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Spawns a file watcher on the parent directory of `path`.  Whenever the config
/// file is created or modified, reloads it and sends a `ConfigReloaded` event.
pub async fn watch_config(path: PathBuf, tx: mpsc::Sender<DaemonEvent>) {
    let (watch_tx, mut watch_rx) = mpsc::channel::<notify::Event>(16);

    let mut watcher = match RecommendedWatcher::new(
        move |res: notify::Result<notify::Event>| {
            if let Ok(event) = res {
                let _ = watch_tx.blocking_send(event);
            }
        },
        NotifyConfig::default(),
    ) {
        Ok(w) => w,
        Err(e) => {
            error!("failed to create config watcher: {e}");
            return;
        }
    };

    // Watch the directory so editor-style atomic saves (write + rename) are seen.
    let watch_dir = match path.parent() {
        Some(d) => d.to_path_buf(),
        None => {
            error!("config path {} has no parent directory", path.display());
            return;
        }
    };

    if let Err(e) = watcher.watch(&watch_dir, RecursiveMode::NonRecursive) {
        error!("failed to watch {}: {e}", watch_dir.display());
        return;
    }

    while let Some(event) = watch_rx.recv().await {
        let affects_config = event.paths.iter().any(|p| p == path.as_path());
        let is_write = matches!(
            event.kind,
            notify::EventKind::Create(_) | notify::EventKind::Modify(_)
        );

        if affects_config && is_write {
            match load_or_default(&path) {
                Ok(config) => {
                    if tx.send(DaemonEvent::ConfigReloaded(config)).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!("keeping previous config: {e:#}"),
            }
        }
    }
}

fn default_locale() -> String {
    DEFAULT_LOCALE.to_string()
}

fn default_request_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}
