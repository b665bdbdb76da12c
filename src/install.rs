//! Getting a runnable yt-dlp onto disk: `PATH` lookup, the managed copy, and the pinned
//! release download used when neither exists.

use std::{
    ffi::OsStr,
    io,
    path::{Path, PathBuf},
    time::Duration,
};

use tracing::info;

use crate::error::FetchError;

/// yt-dlp release fetched when no binary can be found.
pub const PINNED_VERSION: &str = "2025.06.30";
const RELEASE_BASE: &str = "https://github.com/yt-dlp/yt-dlp/releases/download";
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// Standalone release asset for an OS/arch pair, as named on the yt-dlp releases page.
pub fn release_asset(os: &str, arch: &str) -> Option<&'static str> {
    match (os, arch) {
        ("windows", _) => Some("yt-dlp.exe"),
        ("macos", _) => Some("yt-dlp_macos"),
        ("linux", "x86_64") => Some("yt-dlp_linux"),
        ("linux", "aarch64") => Some("yt-dlp_linux_aarch64"),
        ("linux", "arm") => Some("yt-dlp_linux_armv7l"),
        _ => None,
    }
}

pub fn host_asset() -> Option<&'static str> {
    release_asset(std::env::consts::OS, std::env::consts::ARCH)
}

pub fn release_url(asset: &str) -> String {
    format!("{RELEASE_BASE}/{PINNED_VERSION}/{asset}")
}

/// First `name` found in the directories of a `PATH`-style value.
pub fn find_on_path(name: &str, path_var: Option<&OsStr>) -> Option<PathBuf> {
    std::env::split_paths(path_var?)
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

/// Previously installed copy in `bin_dir`, if any.
pub fn cached_copy(bin_dir: &Path, asset: &str) -> Option<PathBuf> {
    let path = bin_dir.join(asset);
    path.is_file().then_some(path)
}

/// Downloads the pinned release into `bin_dir`. Blocking; call before the runtime starts.
pub fn install_pinned(bin_dir: &Path, asset: &str) -> Result<PathBuf, FetchError> {
    let url = release_url(asset);
    info!(%url, dir = %bin_dir.display(), "downloading yt-dlp");

    let client = reqwest::blocking::Client::builder().timeout(DOWNLOAD_TIMEOUT).build()?;
    let bytes = client.get(&url).send()?.error_for_status()?.bytes()?;

    std::fs::create_dir_all(bin_dir).map_err(FetchError::Binary)?;
    let target = bin_dir.join(asset);
    // Never leave a truncated binary where the next start would pick it up.
    let partial = bin_dir.join(format!("{asset}.part"));
    write_executable(&partial, &bytes).map_err(FetchError::Binary)?;
    std::fs::rename(&partial, &target).map_err(FetchError::Binary)?;
    info!(path = %target.display(), version = PINNED_VERSION, "installed yt-dlp");
    Ok(target)
}

/// Writes `data` to `path` unless an identical-size copy is already there.
pub fn write_executable(path: &Path, data: &[u8]) -> io::Result<PathBuf> {
    let stale = std::fs::metadata(path).map(|m| m.len() != data.len() as u64).unwrap_or(true);
    if stale {
        std::fs::write(path, data)?;
        info!(path = %path.display(), "wrote yt-dlp binary");
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))?;
    }
    Ok(path.to_path_buf())
}
