use std::sync::{Arc, Mutex};

use tracing::info;

use crate::error::{GameClientError, RemoteError};
use crate::game_api::GameClientApi;
use crate::installation::{self, InstallationTracker, PathProbe, GAME_CLIENT_PROCESS_NAME};
use crate::pid_cache::PidCache;
use crate::process_registry::{Pid, ProcessRegistry};
use crate::remote::RemoteClientSession;
use crate::settings_file::{self, AccessMode};
use crate::spectator::{self, ProcessSpawner, SpectatorCredential, SpectatorRequest};

/// Everything the game-client operations act on.
pub struct GameClientController {
    registry: Arc<dyn ProcessRegistry>,
    remote: Arc<dyn RemoteClientSession>,
    installations: Arc<dyn InstallationTracker>,
    probe: Arc<dyn PathProbe>,
    spawner: Arc<dyn ProcessSpawner>,
    game_api: GameClientApi,
    pid_cache: Mutex<PidCache>,
    default_locale: Mutex<String>,
}

impl GameClientController {
    pub fn new(
        registry: Arc<dyn ProcessRegistry>,
        remote: Arc<dyn RemoteClientSession>,
        installations: Arc<dyn InstallationTracker>,
        probe: Arc<dyn PathProbe>,
        spawner: Arc<dyn ProcessSpawner>,
        game_api: GameClientApi,
        default_locale: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            remote,
            installations,
            probe,
            spawner,
            game_api,
            pid_cache: Mutex::new(PidCache::new()),
            default_locale: Mutex::new(default_locale.into()),
        }
    }

    pub fn set_default_locale(&self, locale: impl Into<String>) {
        *self.default_locale.lock().unwrap_or_else(|e| e.into_inner()) = locale.into();
    }

    /// Kills the game client if, and only if, it is in the foreground.
    pub fn terminate_foreground_game_client(&self) -> Vec<Pid> {
        info!("attempting to terminate the game client");
        self.registry
            .terminate_foreground_instances(GAME_CLIENT_PROCESS_NAME)
    }

    /// Resolves the installation and starts a detached spectator client.
    /// Returns the PID of the started process when the OS reports one.
    pub async fn launch_spectator(
        &self,
        request: SpectatorRequest,
    ) -> Result<Option<Pid>, GameClientError> {
        let connection = self.remote.snapshot().await;
        let hints = self.installations.hints().await;
        let location = installation::resolve(
            &connection,
            &hints,
            self.remote.as_ref(),
            self.probe.as_ref(),
        )
        .await?;

        let default_locale = self
            .default_locale
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        let credential = SpectatorCredential::new(request, location, &default_locale);
        spectator::launch(credential, self.spawner.as_ref()).await
    }

    pub async fn set_settings_file_access_mode(
        &self,
        mode: AccessMode,
    ) -> Result<(), GameClientError> {
        settings_file::set_access_mode(self.remote.as_ref(), mode).await
    }

    pub async fn get_settings_file_access_mode(&self) -> Result<AccessMode, GameClientError> {
        settings_file::get_access_mode(self.remote.as_ref()).await
    }

    /// The in-game API, reachable while a game or spectator session runs.
    pub fn game_api(&self) -> &GameClientApi {
        &self.game_api
    }

    pub async fn query_game_api(&self, path: &str) -> Result<serde_json::Value, RemoteError> {
        self.game_api.get(path).await
    }

    /// Full process-table scan on every call.
    pub fn is_game_client_foreground(&self) -> bool {
        self.registry
            .list_pids_by_name(GAME_CLIENT_PROCESS_NAME)
            .into_iter()
            .any(|pid| self.registry.is_foreground(pid))
    }

    /// Like [`Self::is_game_client_foreground`], reusing the last known PIDs.
    pub fn is_game_client_foreground_cached(&self) -> bool {
        self.pid_cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_foreground_cached(self.registry.as_ref(), GAME_CLIENT_PROCESS_NAME)
    }
}
