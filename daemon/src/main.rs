use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use spectate_daemon::config::{self, Config};
use spectate_daemon::event::DaemonEvent;
use spectate_daemon::installation::{ClientInstallations, FsProbe};
use spectate_daemon::process_registry::SystemProcessRegistry;
use spectate_daemon::remote::LeagueClientSession;
use spectate_daemon::settings_file::AccessMode;
use spectate_daemon::spectator::{DetachedSpawner, SpectatorRequest};
use spectate_daemon::{hotkey, paths, GameClientApi, GameClientController};

const USAGE: &str = "\
usage: spectate-daemon [daemon]
       spectate-daemon terminate
       spectate-daemon foreground
       spectate-daemon launch-spectator <request.json | ->
       spectate-daemon settings-file <readonly | writable | status>
       spectate-daemon game-api <path>";

/// Concrete collaborators, kept so config reloads can reach them.
struct Runtime {
    controller: GameClientController,
    session: Arc<LeagueClientSession>,
    installations: Arc<ClientInstallations>,
}

impl Runtime {
    fn new(config: &Config) -> Result<Self> {
        let registry = Arc::new(SystemProcessRegistry::new());
        let session = Arc::new(LeagueClientSession::new(
            Arc::clone(&registry),
            config.remote.request_timeout(),
        ));
        let installations = Arc::new(ClientInstallations::new(
            config.installation.clone(),
            Arc::clone(&registry),
        ));
        let controller = GameClientController::new(
            registry,
            session.clone(),
            installations.clone(),
            Arc::new(FsProbe),
            Arc::new(DetachedSpawner),
            GameClientApi::new(config.remote.request_timeout())
                .context("failed to build game API client")?,
            config.game_client.default_locale.clone(),
        );
        Ok(Self {
            controller,
            session,
            installations,
        })
    }

    fn apply(&self, config: &Config) {
        self.session.set_timeout(config.remote.request_timeout());
        if let Err(e) = self
            .controller
            .game_api()
            .set_timeout(config.remote.request_timeout())
        {
            warn!("keeping previous game API timeout: {e}");
        }
        self.installations.update(config.installation.clone());
        self.controller
            .set_default_locale(config.game_client.default_locale.clone());
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().init();

    if let Err(e) = run().await {
        error!("{e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let config_path = paths::config_file_path()?;
    let config = config::load_or_default(&config_path).unwrap_or_else(|e| {
        warn!("using default config: {e:#}");
        Config::default()
    });
    let runtime = Runtime::new(&config)?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    let args: Vec<&str> = args.iter().map(String::as_str).collect();

    match args.as_slice() {
        [] | ["daemon"] => run_daemon(runtime, config, &config_path).await,
        ["terminate"] => {
            let pids = runtime.controller.terminate_foreground_game_client();
            println!("terminated: {pids:?}");
            Ok(())
        }
        ["foreground"] => {
            println!("{}", runtime.controller.is_game_client_foreground());
            Ok(())
        }
        ["launch-spectator", source] => {
            let request = read_request(source).await?;
            let pid = runtime.controller.launch_spectator(request).await?;
            match pid {
                Some(pid) => println!("spectator client started (pid {pid})"),
                None => println!("spectator client started"),
            }
            Ok(())
        }
        ["settings-file", "status"] => {
            println!("{}", runtime.controller.get_settings_file_access_mode().await?);
            Ok(())
        }
        ["settings-file", mode] => {
            let mode: AccessMode = mode.parse().map_err(anyhow::Error::msg)?;
            runtime.controller.set_settings_file_access_mode(mode).await?;
            println!("{mode}");
            Ok(())
        }
        ["game-api", path] => {
            let body = runtime.controller.query_game_api(path).await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
            Ok(())
        }
        _ => bail!("unrecognised arguments {args:?}\n{USAGE}"),
    }
}

/// Reads a JSON spectator request from a file, or stdin for `-`.
async fn read_request(source: &str) -> Result<SpectatorRequest> {
    let content = if source == "-" {
        tokio::task::spawn_blocking(|| std::io::read_to_string(std::io::stdin()))
            .await
            .context("stdin reader panicked")?
            .context("failed to read spectator request from stdin")?
    } else {
        tokio::fs::read_to_string(source)
            .await
            .with_context(|| format!("failed to read spectator request {source}"))?
    };
    serde_json::from_str(&content).context("invalid spectator request")
}

async fn run_daemon(runtime: Runtime, mut config: Config, config_path: &Path) -> Result<()> {
    if let Some(dir) = config_path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }

    let (event_tx, mut event_rx) = mpsc::channel::<DaemonEvent>(32);

    tokio::spawn(config::watch_config(config_path.to_path_buf(), event_tx.clone()));

    // A missing shortcut is not worth refusing to start over.
    let hotkey_handle = match hotkey::start(None, event_tx.clone()) {
        Ok(handle) => {
            hotkey::apply_shortcut(&handle, &mut config.game_client);
            Some(handle)
        }
        Err(e) => {
            warn!("terminate shortcut unavailable: {e:#}");
            None
        }
    };

    {
        let tx = event_tx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = tx.send(DaemonEvent::Shutdown).await;
            }
        });
    }

    info!("spectate-daemon v{} started", env!("CARGO_PKG_VERSION"));

    while let Some(evt) = event_rx.recv().await {
        match evt {
            DaemonEvent::TerminateRequested => {
                if config.game_client.terminate_with_shortcut {
                    runtime.controller.terminate_foreground_game_client();
                }
            }

            DaemonEvent::ConfigReloaded(mut new_config) => {
                info!("config reloaded");
                if new_config.game_client.terminate_shortcut
                    != config.game_client.terminate_shortcut
                {
                    if let Some(handle) = &hotkey_handle {
                        hotkey::apply_shortcut(handle, &mut new_config.game_client);
                    }
                }
                runtime.apply(&new_config);
                config = new_config;
            }

            DaemonEvent::Shutdown => {
                info!("shutting down");
                break;
            }
        }
    }

    if let Some(handle) = hotkey_handle {
        handle.stop();
    }
    Ok(())
}
