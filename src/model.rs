use std::path::PathBuf;

/// What the user asked for. Fixed once the download starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    /// YouTube video or playlist link, already trimmed
    pub url: String,
    /// Folder the files are written into
    pub dest_dir: PathBuf,
    /// Extra rounds for items that failed, 0 disables retrying
    pub retries: u32,
}

impl DownloadRequest {
    /// Returns `None` for a blank URL; no other validation happens here.
    pub fn new(url: &str, dest_dir: impl Into<PathBuf>) -> Option<Self> {
        let url = url.trim();
        if url.is_empty() {
            return None;
        }
        Some(Self {
            url: url.to_string(),
            dest_dir: dest_dir.into(),
            retries: 0,
        })
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Output template handed to yt-dlp. A blank folder stays relative to the working directory.
    pub fn output_template(&self) -> PathBuf {
        self.dest_dir.join("%(title)s.%(ext)s")
    }

    /// Same destination, narrowed to one video of the requested target.
    pub fn for_item(&self, id: &str) -> Self {
        Self {
            url: format!("https://www.youtube.com/watch?v={id}"),
            dest_dir: self.dest_dir.clone(),
            retries: 0,
        }
    }

    pub fn error_log_path(&self) -> PathBuf {
        self.dest_dir.join(ERROR_LOG_NAME)
    }
}

/// Written into the destination folder when items are still failing at the end.
pub const ERROR_LOG_NAME: &str = "error_log.txt";

/// An item yt-dlp gave up on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedItem {
    pub id: Option<String>,
    pub title: Option<String>,
    pub error: String,
}

/// Items completed plus the fraction of the one in flight, against the inspected item count.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProgressState {
    pub current: f64,
    pub total: usize,
}

impl ProgressState {
    /// Share of the whole job, clamped to `[0, 1]`. Zero when nothing was inspected yet.
    pub fn fraction(&self) -> f32 {
        if self.total == 0 || !self.current.is_finite() {
            return 0.0;
        }
        (self.current / self.total as f64).clamp(0.0, 1.0) as f32
    }

    /// Whole items completed, e.g. `2/24`.
    pub fn count_label(&self) -> String {
        let done = self.current.max(0.0).floor() as usize;
        format!("{}/{}", done, self.total)
    }
}

/// One downloadable unit: a video, or an entry of a playlist.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemInfo {
    pub id: Option<String>,
    pub title: Option<String>,
    pub thumbnail: Option<String>,
}

impl ItemInfo {
    /// Reported thumbnail, or YouTube's standard one derived from the video id.
    pub fn thumbnail_url(&self) -> Option<String> {
        self.thumbnail.clone().or_else(|| {
            self.id
                .as_ref()
                .map(|id| format!("https://img.youtube.com/vi/{id}/hqdefault.jpg"))
        })
    }
}

/// Result of the metadata-only inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Single(ItemInfo),
    Playlist { title: Option<String>, items: Vec<ItemInfo> },
}

impl Target {
    pub fn item_count(&self) -> usize {
        match self {
            Target::Single(_) => 1,
            Target::Playlist { items, .. } => items.len(),
        }
    }

    pub fn title(&self) -> Option<&str> {
        match self {
            Target::Single(item) => item.title.as_deref(),
            Target::Playlist { title, .. } => title.as_deref(),
        }
    }

    /// Entries of a playlist, or the video itself.
    pub fn items(&self) -> &[ItemInfo] {
        match self {
            Target::Single(item) => std::slice::from_ref(item),
            Target::Playlist { items, .. } => items,
        }
    }

    /// Thumbnail to show for the whole target: the video's, or the first entry that has one.
    pub fn thumbnail(&self) -> Option<String> {
        match self {
            Target::Single(item) => item.thumbnail_url(),
            Target::Playlist { items, .. } => items.iter().find_map(ItemInfo::thumbnail_url),
        }
    }
}

/// Lifecycle of a single invocation once it leaves the idle shell. The last three are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Inspecting,
    Transferring,
    Completed,
    Errored,
    Cancelled,
}

/// How an invocation ended, reported after `on_done` has fired.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Completed { completed: usize, failed: Vec<FailedItem>, total: usize },
    Cancelled { completed: usize, total: usize },
    Errored(String),
}

impl Outcome {
    pub fn phase(&self) -> Phase {
        match self {
            Outcome::Completed { .. } => Phase::Completed,
            Outcome::Cancelled { .. } => Phase::Cancelled,
            Outcome::Errored(_) => Phase::Errored,
        }
    }
}
