/// Launching the game client in spectator mode.
///
/// The child is started detached and never awaited: the launch reports
/// success once no spawn failure has arrived within one scheduler tick, and
/// then lets go of the child so it can outlive the daemon.
use std::io;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};

use serde::Deserialize;
use tokio::sync::oneshot;
use tracing::{debug, info};

use crate::error::GameClientError;
use crate::installation::GameLocation;
use crate::process_registry::Pid;

pub const DEFAULT_LOCALE: &str = "zh_CN";
const TFT_GAME_MODE: &str = "TFT";

/// What the caller knows about the game to spectate.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpectatorRequest {
    /// `<region>` or `<region>_<platform id>`, e.g. `"KR"` or `"HN1_1"`.
    pub sgp_server_id: String,
    pub observer_encryption_key: String,
    pub observer_server_port: u16,
    pub observer_server_ip: String,
    pub game_id: u64,
    pub game_mode: String,
    #[serde(default)]
    pub locale: Option<String>,
}

/// A request bound to a resolved installation. Only built from a
/// [`GameLocation`], so its paths are never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpectatorCredential {
    pub sgp_server_id: String,
    pub observer_encryption_key: String,
    pub observer_server_port: u16,
    pub observer_server_ip: String,
    pub game_id: u64,
    pub game_mode: String,
    pub locale: String,
    pub game_install_root: PathBuf,
    pub game_executable_path: PathBuf,
}

impl SpectatorCredential {
    pub fn new(request: SpectatorRequest, location: GameLocation, default_locale: &str) -> Self {
        let SpectatorRequest {
            sgp_server_id,
            observer_encryption_key,
            observer_server_port,
            observer_server_ip,
            game_id,
            game_mode,
            locale,
        } = request;

        Self {
            sgp_server_id,
            observer_encryption_key,
            observer_server_port,
            observer_server_ip,
            game_id,
            game_mode,
            locale: locale
                .filter(|l| !l.is_empty())
                .unwrap_or_else(|| default_locale.to_string()),
            game_install_root: location.game_install_root,
            game_executable_path: location.game_executable_path,
        }
    }
}

/// Splits `"KR_1"` into `("KR", Some("1"))` and `"KR"` into `("KR", None)`.
pub fn split_server_id(sgp_server_id: &str) -> (&str, Option<&str>) {
    match sgp_server_id.split_once('_') {
        Some((region, platform)) => {
            // Anything after a second `_` is not part of the platform id.
            let platform = platform.split('_').next().filter(|p| !p.is_empty());
            (region, platform)
        }
        None => (sgp_server_id, None),
    }
}

/// Command line for a spectator session, positional connect string first.
pub fn build_launch_args(credential: &SpectatorCredential) -> Vec<String> {
    let (region, platform_id) = split_server_id(&credential.sgp_server_id);

    let mut args = vec![
        format!(
            "spectator {}:{} {} {} {}",
            credential.observer_server_ip,
            credential.observer_server_port,
            credential.observer_encryption_key,
            credential.game_id,
            region
        ),
        format!("-GameBaseDir={}", credential.game_install_root.display()),
        format!("-Locale={}", credential.locale),
        format!("-GameID={}", credential.game_id),
        format!("-Region={region}"),
        "-UseNewX3D=1".to_string(),
        "-PlayerNameMode=ALIAS".to_string(),
        "-UseNewX3DFramebuffers=1".to_string(),
    ];

    if credential.game_mode == TFT_GAME_MODE {
        args.push("-Product=TFT".to_string());
    } else {
        args.push("-Product=LoL".to_string());
    }

    if let Some(platform_id) = platform_id {
        args.push(format!("-PlatformId={platform_id}"));
    }

    args
}

/// Everything needed to start the game process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    pub executable: PathBuf,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
}

impl LaunchPlan {
    pub fn for_credential(credential: &SpectatorCredential) -> Self {
        Self {
            executable: credential.game_executable_path.clone(),
            args: build_launch_args(credential),
            working_dir: credential.game_install_root.clone(),
        }
    }
}

/// A started (or failed-to-start) process.
///
/// Spawn errors are delivered through `failure` rather than returned, so
/// callers handle synchronous and late failures the same way.
pub struct SpawnHandle {
    pub failure: oneshot::Receiver<io::Error>,
    pub child: Option<Child>,
}

impl SpawnHandle {
    pub fn pid(&self) -> Option<Pid> {
        self.child.as_ref().map(Child::id)
    }

    /// Drops the child without waiting on or killing it.
    pub fn release(mut self) -> Option<Pid> {
        let pid = self.pid();
        drop(self.child.take());
        pid
    }
}

pub trait ProcessSpawner: Send + Sync {
    fn spawn(&self, plan: &LaunchPlan) -> SpawnHandle;
}

/// Spawns real OS processes detached from the daemon.
pub struct DetachedSpawner;

impl ProcessSpawner for DetachedSpawner {
    fn spawn(&self, plan: &LaunchPlan) -> SpawnHandle {
        let (failure_tx, failure) = oneshot::channel();

        let mut command = Command::new(&plan.executable);
        command
            .args(&plan.args)
            .current_dir(&plan.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        detach(&mut command);

        let child = match command.spawn() {
            Ok(child) => Some(child),
            Err(e) => {
                let _ = failure_tx.send(e);
                None
            }
        };
        SpawnHandle { failure, child }
    }
}

#[cfg(windows)]
fn detach(command: &mut Command) {
    use std::os::windows::process::CommandExt;
    use windows::Win32::System::Threading::{CREATE_NEW_PROCESS_GROUP, DETACHED_PROCESS};

    command.creation_flags(DETACHED_PROCESS.0 | CREATE_NEW_PROCESS_GROUP.0);
}

#[cfg(unix)]
fn detach(command: &mut Command) {
    use std::os::unix::process::CommandExt;

    // Own process group: terminal signals aimed at the daemon skip the game.
    command.process_group(0);
}

#[cfg(not(any(windows, unix)))]
fn detach(_command: &mut Command) {}

/// Starts `credential`'s executable and waits one scheduler tick for a
/// spawn failure. Returns the child PID on success.
pub async fn launch(
    credential: SpectatorCredential,
    spawner: &dyn ProcessSpawner,
) -> Result<Option<Pid>, GameClientError> {
    let plan = LaunchPlan::for_credential(&credential);
    info!(
        "launching spectator for game {} from {}",
        credential.game_id,
        plan.executable.display()
    );
    debug!(args = ?plan.args, "spectator command line");

    let mut handle = spawner.spawn(&plan);

    tokio::select! {
        biased;
        Ok(e) = &mut handle.failure => return Err(GameClientError::SpawnFailure(e)),
        _ = tokio::task::yield_now() => {}
    }

    let pid = handle.release();
    info!(pid = ?pid, "spectator client started");
    Ok(pid)
}


#[cfg(test)]
mod tests {
    use super::fake::FakeSpawner;
    use super::*;

    fn request(sgp_server_id: &str, game_mode: &str, locale: Option<&str>) -> SpectatorRequest {
        SpectatorRequest {
            sgp_server_id: sgp_server_id.to_string(),
            observer_encryption_key: "KEY123".to_string(),
            observer_server_port: 8080,
            observer_server_ip: "1.2.3.4".to_string(),
            game_id: 987654321,
            game_mode: game_mode.to_string(),
            locale: locale.map(str::to_string),
        }
    }

    fn location() -> GameLocation {
        GameLocation {
            game_install_root: PathBuf::from("C:/Games/LoL/Game"),
            game_executable_path: PathBuf::from("C:/Games/LoL/Game/League of Legends.exe"),
        }
    }

    fn credential(sgp_server_id: &str, game_mode: &str) -> SpectatorCredential {
        SpectatorCredential::new(request(sgp_server_id, game_mode, None), location(), DEFAULT_LOCALE)
    }

    // ── split_server_id ──────────────────────────────────────────────────────

    #[test]
    fn split_with_platform() {
        assert_eq!(split_server_id("KR_1"), ("KR", Some("1")));
        assert_eq!(split_server_id("TENCENT_HN1"), ("TENCENT", Some("HN1")));
    }

    #[test]
    fn split_without_platform() {
        assert_eq!(split_server_id("KR"), ("KR", None));
        assert_eq!(split_server_id("KR_"), ("KR", None));
    }

    // ── build_launch_args ────────────────────────────────────────────────────

    #[test]
    fn args_are_in_launch_order() {
        let args = build_launch_args(&credential("KR_1", "CLASSIC"));
        assert_eq!(
            args,
            vec![
                "spectator 1.2.3.4:8080 KEY123 987654321 KR".to_string(),
                format!("-GameBaseDir={}", PathBuf::from("C:/Games/LoL/Game").display()),
                "-Locale=zh_CN".to_string(),
                "-GameID=987654321".to_string(),
                "-Region=KR".to_string(),
                "-UseNewX3D=1".to_string(),
                "-PlayerNameMode=ALIAS".to_string(),
                "-UseNewX3DFramebuffers=1".to_string(),
                "-Product=LoL".to_string(),
                "-PlatformId=1".to_string(),
            ]
        );
    }

    #[test]
    fn tft_selects_tft_product() {
        let args = build_launch_args(&credential("KR", "TFT"));
        assert!(args.contains(&"-Product=TFT".to_string()));
        assert!(!args.contains(&"-Product=LoL".to_string()));
    }

    #[test]
    fn other_modes_select_lol_product() {
        for mode in ["CLASSIC", "ARAM", "tft", ""] {
            let args = build_launch_args(&credential("KR", mode));
            assert!(args.contains(&"-Product=LoL".to_string()), "mode {mode}");
            assert!(!args.contains(&"-Product=TFT".to_string()), "mode {mode}");
        }
    }

    #[test]
    fn no_underscore_means_no_platform_flag() {
        let args = build_launch_args(&credential("KR", "CLASSIC"));
        assert!(args.contains(&"-Region=KR".to_string()));
        assert!(!args.iter().any(|a| a.starts_with("-PlatformId=")));
    }

    #[test]
    fn explicit_locale_wins_over_default() {
        let cred = SpectatorCredential::new(
            request("NA1", "CLASSIC", Some("en_US")),
            location(),
            DEFAULT_LOCALE,
        );
        assert!(build_launch_args(&cred).contains(&"-Locale=en_US".to_string()));
    }

    #[test]
    fn empty_locale_falls_back_to_default() {
        let cred =
            SpectatorCredential::new(request("NA1", "CLASSIC", Some("")), location(), "ko_KR");
        assert_eq!(cred.locale, "ko_KR");
    }

    #[test]
    fn request_deserializes_from_camel_case_json() {
        let req: SpectatorRequest = serde_json::from_str(
            r#"{
                "sgpServerId": "KR_1",
                "observerEncryptionKey": "k",
                "observerServerPort": 80,
                "observerServerIp": "10.0.0.1",
                "gameId": 42,
                "gameMode": "TFT"
            }"#,
        )
        .unwrap();
        assert_eq!(req.sgp_server_id, "KR_1");
        assert_eq!(req.game_id, 42);
        assert!(req.locale.is_none());
    }

    // ── launch ───────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn launch_spawns_in_install_root() {
        let spawner = FakeSpawner::default();
        let pid = launch(credential("KR_1", "TFT"), &spawner).await.unwrap();
        assert!(pid.is_none(), "fake spawner has no real child");

        let plans = spawner.plans.lock().unwrap();
        assert_eq!(plans.len(), 1);
        assert_eq!(
            plans[0].executable,
            PathBuf::from("C:/Games/LoL/Game/League of Legends.exe")
        );
        assert_eq!(plans[0].working_dir, PathBuf::from("C:/Games/LoL/Game"));
        assert!(plans[0].args.contains(&"-Product=TFT".to_string()));
    }

    #[tokio::test]
    async fn early_spawn_failure_is_surfaced() {
        let spawner = FakeSpawner {
            fail_with: Some(io::ErrorKind::PermissionDenied),
            ..Default::default()
        };
        let err = launch(credential("KR", "CLASSIC"), &spawner).await.unwrap_err();
        match err {
            GameClientError::SpawnFailure(e) => {
                assert_eq!(e.kind(), io::ErrorKind::PermissionDenied)
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_executable_fails_to_spawn() {
        let dir = tempfile::tempdir().unwrap();
        let cred = SpectatorCredential::new(
            request("KR", "CLASSIC", None),
            GameLocation {
                game_install_root: dir.path().to_path_buf(),
                game_executable_path: dir.path().join("League of Legends.exe"),
            },
            DEFAULT_LOCALE,
        );
        let err = launch(cred, &DetachedSpawner).await.unwrap_err();
        assert!(matches!(err, GameClientError::SpawnFailure(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn detached_spawner_starts_a_real_process() {
        let plan = LaunchPlan {
            executable: PathBuf::from("/bin/sh"),
            args: vec!["-c".to_string(), "exit 0".to_string()],
            working_dir: std::env::temp_dir(),
        };
        let mut handle = DetachedSpawner.spawn(&plan);
        assert!(handle.failure.try_recv().is_err());
        assert!(handle.pid().is_some());
        assert!(handle.release().is_some());
    }
}
