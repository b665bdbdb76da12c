use std::{
    ffi::{OsStr, OsString},
    path::{Path, PathBuf},
    process::Stdio,
};

use rust_embed::RustEmbed;
use serde::Deserialize;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    process::Command,
};
use tracing::{debug, info, warn};

use crate::{
    adapter::{EventHook, MediaBackend},
    config::AppConfig,
    error::FetchError,
    install,
    model::{DownloadRequest, ItemInfo, Target},
    progress::{
        ITEM_DONE_TEMPLATE, PROGRESS_TEMPLATE, RawEvent, parse_stderr_line, parse_stdout_line,
    },
};

/// Optional yt-dlp bundled at build time. Drop the binary into `assets/` to ship it.
#[derive(RustEmbed)]
#[folder = "assets/"]
#[allow_missing = true]
pub struct Asset;

pub const BINARY_NAME: &str = if cfg!(target_os = "windows") { "yt-dlp.exe" } else { "yt-dlp" };

/// Backend driving the `yt-dlp` executable.
#[derive(Debug, Clone)]
pub struct YtDlp {
    program: PathBuf,
}

impl YtDlp {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self { program: program.into() }
    }

    /// Configured path, embedded copy, `PATH`, managed copy, then a fresh install of the
    /// pinned release. Falls back to the bare program name when all of them come up empty.
    pub fn locate(config: &AppConfig) -> Result<Self, FetchError> {
        Self::locate_with(config, std::env::var_os("PATH").as_deref())
    }

    fn locate_with(config: &AppConfig, path_var: Option<&OsStr>) -> Result<Self, FetchError> {
        if let Some(path) = &config.ytdlp_path {
            return Ok(Self::new(path));
        }
        if let Some(data) = Asset::get(BINARY_NAME) {
            std::fs::create_dir_all(&config.bin_dir).map_err(FetchError::Binary)?;
            let path = install::write_executable(&config.bin_dir.join(BINARY_NAME), &data.data)
                .map_err(FetchError::Binary)?;
            return Ok(Self::new(path));
        }
        if let Some(path) = install::find_on_path(BINARY_NAME, path_var) {
            debug!(path = %path.display(), "found yt-dlp on PATH");
            return Ok(Self::new(path));
        }
        let Some(asset) = install::host_asset() else {
            warn!("no yt-dlp release for this platform");
            return Ok(Self::new(BINARY_NAME));
        };
        if let Some(path) = install::cached_copy(&config.bin_dir, asset) {
            return Ok(Self::new(path));
        }
        if config.auto_install {
            match install::install_pinned(&config.bin_dir, asset) {
                Ok(path) => return Ok(Self::new(path)),
                Err(err) => warn!(error = %err, "yt-dlp install failed"),
            }
        }
        Ok(Self::new(BINARY_NAME))
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.env("PYTHONIOENCODING", "UTF-8")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

/// Metadata only; playlists are listed without resolving every entry.
pub fn inspect_args(url: &str) -> Vec<String> {
    ["--flat-playlist", "--dump-single-json", "--no-warnings", "--", url]
        .into_iter()
        .map(String::from)
        .collect()
}

/// The output template stays an `OsString` so non-UTF-8 folders survive.
pub fn transfer_args(request: &DownloadRequest) -> Vec<OsString> {
    let mut args: Vec<OsString> = [
        "--yes-playlist",
        "--ignore-errors",
        "--no-warnings",
        "--newline",
        "--progress",
        "--progress-template",
        PROGRESS_TEMPLATE,
        "--print",
        ITEM_DONE_TEMPLATE,
    ]
    .into_iter()
    .map(OsString::from)
    .collect();

    args.push("-o".into());
    args.push(request.output_template().into_os_string());
    args.push("--".into());
    args.push(request.url.as_str().into());
    args
}

impl MediaBackend for YtDlp {
    async fn inspect(&self, url: &str) -> Result<Target, FetchError> {
        let output = self
            .command()
            .args(inspect_args(url))
            .output()
            .await
            .map_err(FetchError::Spawn)?;

        if !output.status.success() {
            return Err(FetchError::Inspect(last_error_line(&output.stderr)));
        }
        parse_info(&output.stdout)
    }

    async fn transfer(
        &self,
        request: &DownloadRequest,
        hook: &mut EventHook<'_>,
    ) -> Result<(), FetchError> {
        let mut child = self
            .command()
            .args(transfer_args(request))
            .spawn()
            .map_err(FetchError::Spawn)?;

        let stdout = child.stdout.take().ok_or(FetchError::Aborted)?;
        let stderr = child.stderr.take().ok_or(FetchError::Aborted)?;
        // Raw segments: a title in a legacy code page must not end the read loop.
        let mut out_lines = BufReader::new(stdout).split(b'\n');
        let mut err_lines = BufReader::new(stderr).split(b'\n');
        let (mut out_open, mut err_open) = (true, true);
        let mut finished = 0usize;
        let mut last_error = None;

        while out_open || err_open {
            // stderr first: an item's error must land before the next item's progress.
            let event = tokio::select! {
                biased;
                line = err_lines.next_segment(), if err_open => match line? {
                    Some(raw) => {
                        let line = String::from_utf8_lossy(&raw);
                        debug!(target: "yt-dlp", stderr = true, "{line}");
                        parse_stderr_line(&line)
                    }
                    None => {
                        err_open = false;
                        None
                    }
                },
                line = out_lines.next_segment(), if out_open => match line? {
                    Some(raw) => {
                        let line = String::from_utf8_lossy(&raw);
                        debug!(target: "yt-dlp", "{line}");
                        parse_stdout_line(&line)
                    }
                    None => {
                        out_open = false;
                        None
                    }
                },
            };

            let Some(event) = event else { continue };
            match &event {
                RawEvent::ItemFinished { .. } => finished += 1,
                RawEvent::ItemError { message } => last_error = Some(message.clone()),
                RawEvent::Downloading { .. } => {}
            }
            if hook(event).is_break() {
                info!("stopping yt-dlp");
                child.start_kill()?;
                let _ = child.wait().await;
                return Ok(());
            }
        }

        let status = child.wait().await?;
        if !status.success() {
            warn!(code = ?status.code(), finished, "yt-dlp exited with errors");
            // Per-item failures were already reported. A run that produced nothing is an error.
            if finished == 0 {
                return Err(FetchError::Transfer(
                    last_error.unwrap_or_else(|| format!("yt-dlp exited with {status}")),
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct InfoPayload {
    id: Option<String>,
    title: Option<String>,
    thumbnail: Option<String>,
    #[serde(default)]
    thumbnails: Vec<ThumbnailPayload>,
    entries: Option<Vec<Option<InfoPayload>>>,
}

#[derive(Debug, Deserialize)]
struct ThumbnailPayload {
    url: Option<String>,
}

impl InfoPayload {
    fn into_item(self) -> ItemInfo {
        // yt-dlp lists flat-playlist thumbnails smallest first.
        let thumbnail = self
            .thumbnail
            .or_else(|| self.thumbnails.into_iter().rev().find_map(|t| t.url));
        ItemInfo { id: self.id, title: self.title, thumbnail }
    }
}

/// Anything with an `entries` array is a playlist. Skipped entries come through as `null`
/// and still count towards the total.
pub fn parse_info(json: &[u8]) -> Result<Target, FetchError> {
    let mut payload: InfoPayload = serde_json::from_slice(json)?;
    Ok(match payload.entries.take() {
        Some(entries) => Target::Playlist {
            title: payload.title,
            items: entries
                .into_iter()
                .map(|entry| entry.map(InfoPayload::into_item).unwrap_or_default())
                .collect(),
        },
        None => Target::Single(payload.into_item()),
    })
}

/// Last meaningful stderr line, without yt-dlp's `ERROR:` prefix.
pub fn last_error_line(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    text.lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(|l| l.strip_prefix("ERROR:").map(str::trim).unwrap_or(l).to_string())
        .unwrap_or_else(|| "yt-dlp failed".to_string())
}
