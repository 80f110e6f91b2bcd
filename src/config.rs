use std::path::{Path, PathBuf};

use crate::platform::Platform;

/// Returns the path to the data directory for earthlyls-client.
/// Uses $XDG_DATA_HOME/earthlyls-client if XDG_DATA_HOME is set,
/// otherwise falls back to ~/.local/share/earthlyls-client,
/// or ./earthlyls-client if neither is available.
pub fn data_dir() -> PathBuf {
    data_dir_with_env(std::env::var("XDG_DATA_HOME").ok(), dirs::home_dir())
}

/// Default directory holding the `server/` subdirectory with the earthlyls
/// binaries.
pub fn default_install_dir() -> PathBuf {
    data_dir()
}

/// Returns the path to the log file.
pub fn log_path() -> PathBuf {
    data_dir().join("earthlyls-client.log")
}

/// Absolute path of the server executable for `platform` under `install_dir`.
///
/// Binaries are shipped one per supported platform in a fixed `server/`
/// subdirectory of the installation.
pub fn server_command_path(install_dir: &Path, platform: Platform) -> PathBuf {
    install_dir.join("server").join(platform.server_executable())
}

fn data_dir_with_env(xdg_data_home: Option<String>, home_dir: Option<PathBuf>) -> PathBuf {
    let data_dir = xdg_data_home
        .map(PathBuf::from)
        .or_else(|| home_dir.map(|home| home.join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."));

    data_dir.join("earthlyls-client")
}
