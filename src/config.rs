use std::{path::PathBuf, time::Duration};

use crate::error::ConfigError;

pub const YTDLP_VAR: &str = "TUBE_GRAB_YTDLP";
pub const DOWNLOAD_DIR_VAR: &str = "TUBE_GRAB_DOWNLOAD_DIR";
pub const RETRIES_VAR: &str = "TUBE_GRAB_RETRIES";
pub const AUTO_INSTALL_VAR: &str = "TUBE_GRAB_AUTO_INSTALL";
pub const BIN_DIR_VAR: &str = "TUBE_GRAB_BIN_DIR";

/// Runtime settings, read once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Explicit yt-dlp location; `None` means embedded asset, `PATH` or the managed copy
    pub ytdlp_path: Option<PathBuf>,
    /// Initial value of the save location field
    pub default_dir: PathBuf,
    /// How often the window redraws while a download is running
    pub repaint_interval: Duration,
    /// Extra rounds given to failed items
    pub retries: u32,
    /// Fetch the pinned yt-dlp release when none is found
    pub auto_install: bool,
    /// Where extracted and downloaded yt-dlp binaries live
    pub bin_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            ytdlp_path: None,
            default_dir: default_download_dir(),
            repaint_interval: Duration::from_millis(100),
            retries: 1,
            auto_install: true,
            bin_dir: default_bin_dir(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary variable source. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Self::default();

        if let Some(raw) = get(YTDLP_VAR) {
            let path = PathBuf::from(&raw);
            // A bare program name is resolved through PATH later on.
            let is_explicit = path.parent().is_some_and(|p| !p.as_os_str().is_empty());
            if is_explicit && !path.exists() {
                return Err(ConfigError::MissingBinary { var: YTDLP_VAR, path: raw });
            }
            config.ytdlp_path = Some(path);
        }

        if let Some(dir) = get(DOWNLOAD_DIR_VAR) {
            config.default_dir = PathBuf::from(dir);
        }

        if let Some(raw) = get(RETRIES_VAR) {
            config.retries = raw
                .parse()
                .map_err(|_| ConfigError::InvalidNumber { var: RETRIES_VAR, value: raw })?;
        }

        if let Some(raw) = get(AUTO_INSTALL_VAR) {
            let raw = raw.to_ascii_lowercase();
            config.auto_install = !matches!(raw.as_str(), "0" | "false" | "no" | "off");
        }

        if let Some(dir) = get(BIN_DIR_VAR) {
            config.bin_dir = PathBuf::from(dir);
        }

        Ok(config)
    }
}

/// The system Downloads folder, or something close to it.
pub fn default_download_dir() -> PathBuf {
    dirs::download_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join("Downloads")))
        .unwrap_or_else(|| PathBuf::from("./downloads"))
}

pub fn default_bin_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("tube-grab")
        .join("bin")
}
