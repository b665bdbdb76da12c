//! Maps the backend's raw event stream onto the three coarse callbacks the shell listens to.

use std::{
    future::Future,
    ops::ControlFlow,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use tokio::{runtime::Handle, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::{
    error::FetchError,
    model::{DownloadRequest, FailedItem, ItemInfo, Outcome, Phase, Target},
    progress::{RawEvent, fraction, item_id_from_error},
    report,
};

/// Receives every raw event during a transfer. `Break` asks the backend to stop.
pub type EventHook<'a> = dyn FnMut(RawEvent) -> ControlFlow<()> + Send + 'a;

/// The external media fetcher.
pub trait MediaBackend: Send + Sync {
    /// Metadata-only look at the URL.
    fn inspect(&self, url: &str) -> impl Future<Output = Result<Target, FetchError>> + Send;

    /// Downloads everything behind the request, feeding events to `hook` as they happen.
    fn transfer(
        &self,
        request: &DownloadRequest,
        hook: &mut EventHook<'_>,
    ) -> impl Future<Output = Result<(), FetchError>> + Send;
}

/// Callbacks fired from the download task. Every method is optional.
pub trait ProgressSink: Send {
    fn on_progress(&mut self, _current: f64, _total: usize) {}
    fn on_status(&mut self, _message: &str) {}
    fn on_inspected(&mut self, _target: &Target) {}
    fn on_done(&mut self) {}
}

impl ProgressSink for () {}

/// Cooperative stop flag, checked between items.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Counters for one transfer.
#[derive(Debug, Default)]
struct Tally {
    completed: usize,
    failures: Vec<FailedItem>,
    total: usize,
    /// Best fraction seen for the item in flight. Merged formats restart at zero for each stream.
    in_flight: f64,
    /// Inspected entries, used to put a title on failures.
    items: Vec<ItemInfo>,
}

impl Tally {
    fn new(target: &Target) -> Self {
        Self {
            total: target.item_count(),
            items: target.items().to_vec(),
            ..Self::default()
        }
    }

    fn failure(&self, message: String) -> FailedItem {
        let id = item_id_from_error(&message).map(str::to_string);
        let title = id.as_deref().and_then(|id| {
            self.items
                .iter()
                .find(|item| item.id.as_deref() == Some(id))
                .and_then(|item| item.title.clone())
        });
        FailedItem { id, title, error: message }
    }

    fn current(&self, with_fraction: bool) -> f64 {
        let whole = self.completed as f64;
        if !with_fraction {
            return whole;
        }
        let current = whole + self.in_flight;
        if self.total > 0 { current.min(self.total as f64) } else { current }
    }

    /// Applies one event. Returns true on an item boundary.
    fn apply<S: ProgressSink + ?Sized>(&mut self, event: RawEvent, sink: &mut S) -> bool {
        match event {
            RawEvent::Downloading { downloaded_bytes, total_bytes: Some(total_bytes) } => {
                self.in_flight = self.in_flight.max(fraction(downloaded_bytes, total_bytes));
                sink.on_progress(self.current(true), self.total);
                false
            }
            RawEvent::Downloading { .. } => {
                sink.on_progress(self.current(false), self.total);
                false
            }
            RawEvent::ItemFinished { path } => {
                // An empty or unlisted playlist reports no total; count what arrives.
                if self.total == 0 || self.completed < self.total {
                    self.completed += 1;
                }
                self.in_flight = 0.0;
                debug!(path = %path.display(), completed = self.completed, "item finished");
                sink.on_progress(self.current(false), self.total);
                sink.on_status(&format!("Finished {} of {}.", self.completed, self.total));
                true
            }
            RawEvent::ItemError { message } => {
                self.in_flight = 0.0;
                let item = (self.completed + self.failures.len() + 1).min(self.total.max(1));
                warn!(item, %message, "item skipped");
                sink.on_status(&format!("Error on item {item} of {}: {message}", self.total));
                let failure = self.failure(message);
                self.failures.push(failure);
                true
            }
        }
    }
}

/// Runs one download end to end. Never fails: errors become a status line, and
/// `on_done` fires exactly once on every path.
pub async fn run_download<B, S>(
    backend: &B,
    request: &DownloadRequest,
    sink: &mut S,
    cancel: &CancelToken,
) -> Outcome
where
    B: MediaBackend,
    S: ProgressSink + ?Sized,
{
    info!(url = %request.url, dest = %request.dest_dir.display(), "download requested");

    let outcome = match drive(backend, request, &mut *sink, cancel).await {
        Ok(outcome) => outcome,
        Err(err) => {
            warn!(error = %err, "download failed");
            sink.on_status(&format!("Error: {err}"));
            Outcome::Errored(err.to_string())
        }
    };

    match &outcome {
        Outcome::Completed { completed, failed, total } => {
            sink.on_status("Download completed.");
            let failed = failed.len();
            info!(phase = ?outcome.phase(), completed, failed, total, "download finished");
        }
        Outcome::Cancelled { completed, total } => {
            sink.on_status("Download cancelled.");
            info!(phase = ?outcome.phase(), completed, total, "download finished");
        }
        Outcome::Errored(error) => info!(phase = ?outcome.phase(), %error, "download finished"),
    }
    sink.on_done();
    outcome
}

async fn drive<B, S>(
    backend: &B,
    request: &DownloadRequest,
    sink: &mut S,
    cancel: &CancelToken,
) -> Result<Outcome, FetchError>
where
    B: MediaBackend,
    S: ProgressSink + ?Sized,
{
    debug!(phase = ?Phase::Inspecting);
    sink.on_status("Fetching info...");
    let target = backend.inspect(&request.url).await?;
    let total = target.item_count();
    match &target {
        Target::Playlist { .. } => sink.on_status(&format!("Playlist detected: {total} videos.")),
        Target::Single(_) => sink.on_status("Single video detected."),
    }
    sink.on_inspected(&target);

    if cancel.is_cancelled() {
        return Ok(Outcome::Cancelled { completed: 0, total });
    }

    debug!(phase = ?Phase::Transferring, total);
    let mut tally = Tally::new(&target);
    if transfer_once(backend, request, &mut tally, &mut *sink, cancel).await? {
        return Ok(Outcome::Cancelled { completed: tally.completed, total });
    }

    if retry_failed(backend, request, &mut tally, &mut *sink, cancel).await {
        return Ok(Outcome::Cancelled { completed: tally.completed, total });
    }

    if !tally.failures.is_empty() {
        report::write_error_log(&request.error_log_path(), &tally.failures).await;
    }
    Ok(Outcome::Completed { completed: tally.completed, failed: tally.failures, total })
}

/// One backend transfer. Returns true when it was stopped by a cancel.
async fn transfer_once<B, S>(
    backend: &B,
    request: &DownloadRequest,
    tally: &mut Tally,
    sink: &mut S,
    cancel: &CancelToken,
) -> Result<bool, FetchError>
where
    B: MediaBackend,
    S: ProgressSink + ?Sized,
{
    let mut stopped = false;
    let mut hook = |event: RawEvent| {
        if tally.apply(event, &mut *sink) && cancel.is_cancelled() {
            stopped = true;
            return ControlFlow::Break(());
        }
        ControlFlow::Continue(())
    };
    backend.transfer(request, &mut hook).await?;
    Ok(stopped)
}

/// Gives each failed item up to `request.retries` more attempts, one video at a time.
/// Returns true when a cancel cut the rounds short.
async fn retry_failed<B, S>(
    backend: &B,
    request: &DownloadRequest,
    tally: &mut Tally,
    sink: &mut S,
    cancel: &CancelToken,
) -> bool
where
    B: MediaBackend,
    S: ProgressSink + ?Sized,
{
    let rounds = request.retries;
    if rounds == 0 || tally.failures.is_empty() {
        return false;
    }
    sink.on_status(&format!("Retrying {} failed video(s)...", tally.failures.len()));

    for round in 1..=rounds {
        let pending = std::mem::take(&mut tally.failures);
        for (index, item) in pending.iter().enumerate() {
            if cancel.is_cancelled() {
                tally.failures.extend(pending[index..].iter().cloned());
                return true;
            }
            let Some(id) = item.id.as_deref() else {
                tally.failures.push(item.clone());
                continue;
            };
            let name = item.title.as_deref().unwrap_or(id);
            sink.on_status(&format!("Retry {round}/{rounds}: {name}"));

            let (failed_before, completed_before) = (tally.failures.len(), tally.completed);
            let single = request.for_item(id);
            let error = match transfer_once(backend, &single, tally, &mut *sink, cancel).await {
                Ok(true) => {
                    tally.failures.extend(pending[index + 1..].iter().cloned());
                    return true;
                }
                Ok(false) => None,
                Err(err) => {
                    debug!(id, error = %err, "retry failed");
                    Some(err.to_string())
                }
            };
            if tally.failures.len() > failed_before {
                // The fresh failure is still the same video.
                for failure in &mut tally.failures[failed_before..] {
                    failure.id.get_or_insert_with(|| id.to_string());
                    if failure.title.is_none() {
                        failure.title = item.title.clone();
                    }
                }
            } else if tally.completed == completed_before {
                let error = error.unwrap_or_else(|| item.error.clone());
                tally.failures.push(FailedItem { error, ..item.clone() });
            } else {
                info!(id, round, "retry succeeded");
            }
        }
        if tally.failures.is_empty() {
            break;
        }
    }
    false
}

/// Starts [`run_download`] as its own task on `runtime`.
pub fn spawn_download<B, S>(
    runtime: &Handle,
    backend: Arc<B>,
    request: DownloadRequest,
    mut sink: S,
    cancel: CancelToken,
) -> JoinHandle<Outcome>
where
    B: MediaBackend + 'static,
    S: ProgressSink + 'static,
{
    runtime.spawn(async move { run_download(backend.as_ref(), &request, &mut sink, &cancel).await })
}
