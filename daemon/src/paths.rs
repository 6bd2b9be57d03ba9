/// Canonical file paths for daemon data files.
///
/// Everything lives under `%APPDATA%\SpectateDaemon\` on Windows. Elsewhere
/// `$XDG_CONFIG_HOME/SpectateDaemon` or `$HOME/.config/SpectateDaemon` is
/// used, so the daemon can also be exercised off Windows.
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};

const APP_DIR_NAME: &str = "SpectateDaemon";
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Returns the application data directory.
pub fn app_data_dir() -> Result<PathBuf> {
    base_dir(|key| std::env::var_os(key).map(PathBuf::from))
        .map(|base| base.join(APP_DIR_NAME))
        .ok_or_else(|| anyhow!("none of APPDATA, XDG_CONFIG_HOME or HOME is set"))
}

/// Returns the full path to the config file.
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_file_in(&app_data_dir()?))
}

pub fn config_file_in(app_dir: &Path) -> PathBuf {
    app_dir.join(CONFIG_FILE_NAME)
}

fn base_dir(env: impl Fn(&str) -> Option<PathBuf>) -> Option<PathBuf> {
    env("APPDATA")
        .or_else(|| env("XDG_CONFIG_HOME"))
        .or_else(|| env("HOME").map(|home| home.join(".config")))
        .filter(|p| !p.as_os_str().is_empty())
}
