use thiserror::Error;

/// Failures raised while talking to the external downloader.
///
/// None of these escape the adapter: they are rendered into a status line.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to start yt-dlp: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("could not prepare yt-dlp binary: {0}")]
    Binary(#[source] std::io::Error),

    #[error("{0}")]
    Inspect(String),

    #[error("{0}")]
    Transfer(String),

    #[error("could not download yt-dlp: {0}")]
    Install(#[from] reqwest::Error),

    #[error("unexpected metadata from yt-dlp: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("lost yt-dlp output: {0}")]
    Io(#[from] std::io::Error),

    #[error("download task stopped unexpectedly")]
    Aborted,
}

/// Reasons the shell refuses to start a download.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StartError {
    #[error("no URL given")]
    EmptyUrl,

    #[error("a download is already running")]
    AlreadyRunning,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} points to a missing file: {path}")]
    MissingBinary { var: &'static str, path: String },

    #[error("{var} must be a whole number, got {value:?}")]
    InvalidNumber { var: &'static str, value: String },
}
