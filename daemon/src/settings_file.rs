use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::error::{GameClientError, RemoteError};
use crate::remote::RemoteClientSession;

pub const SETTINGS_FILE_NAME: &str = "PersistedSettings.json";
pub const INSTALL_DIR_PATH: &str = "/data-store/v1/install-dir";
const TENCENT_REGION: &str = "TENCENT";

#[cfg(unix)]
const READONLY_MODE: u32 = 0o444;
#[cfg(unix)]
const WRITABLE_MODE: u32 = 0o644;
#[cfg(unix)]
const ANY_WRITE_BITS: u32 = 0o222;

/// Whether the game may overwrite its persisted settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessMode {
    ReadOnly,
    Writable,
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessMode::ReadOnly => write!(f, "readonly"),
            AccessMode::Writable => write!(f, "writable"),
        }
    }
}

impl FromStr for AccessMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "readonly" => Ok(AccessMode::ReadOnly),
            "writable" => Ok(AccessMode::Writable),
            other => Err(format!("unknown access mode '{other}'")),
        }
    }
}

/// Tencent installs keep the game beside the client directory.
pub fn tencent_config_dir(install_dir: &Path) -> PathBuf {
    install_dir.join("..").join("Game").join("Config")
}

pub fn standard_config_dir(install_dir: &Path) -> PathBuf {
    install_dir.join("Config")
}

pub fn config_dir(install_dir: &Path, region: Option<&str>) -> PathBuf {
    if region == Some(TENCENT_REGION) {
        tencent_config_dir(install_dir)
    } else {
        standard_config_dir(install_dir)
    }
}

/// Path of the game's settings file for the connected client.
pub async fn settings_file_path(
    remote: &dyn RemoteClientSession,
) -> Result<PathBuf, GameClientError> {
    let snapshot = remote.snapshot().await;
    if !snapshot.is_connected() {
        return Err(GameClientError::NotConnected);
    }

    let body = remote.get(INSTALL_DIR_PATH).await.map_err(|e| match e {
        RemoteError::NoSession => GameClientError::NotConnected,
        e => e.into(),
    })?;
    let install_dir = match body {
        Value::String(dir) if !dir.is_empty() => dir,
        other => {
            return Err(RemoteError::Unexpected {
                path: INSTALL_DIR_PATH.to_string(),
                detail: format!("expected a directory string, got {other}"),
            }
            .into())
        }
    };

    Ok(config_dir(Path::new(&install_dir), snapshot.region.as_deref()).join(SETTINGS_FILE_NAME))
}

pub async fn set_access_mode(
    remote: &dyn RemoteClientSession,
    mode: AccessMode,
) -> Result<(), GameClientError> {
    let path = settings_file_path(remote).await?;
    info!("setting {} to {mode}", path.display());
    apply_access_mode(&path, mode).await
}

pub async fn get_access_mode(
    remote: &dyn RemoteClientSession,
) -> Result<AccessMode, GameClientError> {
    let path = settings_file_path(remote).await?;
    read_access_mode(&path).await
}

pub async fn apply_access_mode(path: &Path, mode: AccessMode) -> Result<(), GameClientError> {
    let permissions = permissions_for(path, mode).await?;
    tokio::fs::set_permissions(path, permissions)
        .await
        .map_err(|e| GameClientError::filesystem(path, e))
}

pub async fn read_access_mode(path: &Path) -> Result<AccessMode, GameClientError> {
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|e| GameClientError::filesystem(path, e))?;
    Ok(mode_of(&metadata.permissions()))
}

#[cfg(unix)]
async fn permissions_for(
    _path: &Path,
    mode: AccessMode,
) -> Result<std::fs::Permissions, GameClientError> {
    use std::os::unix::fs::PermissionsExt;

    Ok(std::fs::Permissions::from_mode(match mode {
        AccessMode::ReadOnly => READONLY_MODE,
        AccessMode::Writable => WRITABLE_MODE,
    }))
}

/// Windows has no permission bits; the read-only attribute stands in for
/// them, so the current attributes are read and only that flag is changed.
#[cfg(not(unix))]
async fn permissions_for(
    path: &Path,
    mode: AccessMode,
) -> Result<std::fs::Permissions, GameClientError> {
    let mut permissions = tokio::fs::metadata(path)
        .await
        .map_err(|e| GameClientError::filesystem(path, e))?
        .permissions();
    permissions.set_readonly(mode == AccessMode::ReadOnly);
    Ok(permissions)
}

#[cfg(unix)]
fn mode_of(permissions: &std::fs::Permissions) -> AccessMode {
    use std::os::unix::fs::PermissionsExt;

    if permissions.mode() & ANY_WRITE_BITS != 0 {
        AccessMode::Writable
    } else {
        AccessMode::ReadOnly
    }
}

#[cfg(not(unix))]
fn mode_of(permissions: &std::fs::Permissions) -> AccessMode {
    if permissions.readonly() {
        AccessMode::ReadOnly
    } else {
        AccessMode::Writable
    }
}
