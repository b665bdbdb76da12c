//! UI-side view of the current download.
//!
//! The download task only ever talks to the session through [`ChannelSink`]; the
//! session drains those events on the UI thread, so it is the single writer of the
//! progress state the window renders.

use std::sync::Arc;

use tokio::{
    runtime::Handle,
    sync::mpsc::{UnboundedReceiver, UnboundedSender, error::TryRecvError, unbounded_channel},
    task::JoinHandle,
};
use tracing::{info, warn};

use crate::{
    adapter::{CancelToken, MediaBackend, ProgressSink, spawn_download},
    error::{FetchError, StartError},
    model::{DownloadRequest, Outcome, ProgressState, Target},
};

/// Wakes the UI thread after an event was queued.
pub type Repaint = Arc<dyn Fn() + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    Progress { current: f64, total: usize },
    Status(String),
    Inspected(Target),
    Done,
}

/// Forwards adapter callbacks over a channel.
pub struct ChannelSink {
    tx: UnboundedSender<UiEvent>,
    repaint: Repaint,
}

impl ChannelSink {
    pub fn new(tx: UnboundedSender<UiEvent>, repaint: Repaint) -> Self {
        Self { tx, repaint }
    }

    fn send(&self, event: UiEvent) {
        // The window may already be gone; nothing to report to then.
        if self.tx.send(event).is_ok() {
            (self.repaint)();
        }
    }
}

impl ProgressSink for ChannelSink {
    fn on_progress(&mut self, current: f64, total: usize) {
        self.send(UiEvent::Progress { current, total });
    }

    fn on_status(&mut self, message: &str) {
        self.send(UiEvent::Status(message.to_string()));
    }

    fn on_inspected(&mut self, target: &Target) {
        self.send(UiEvent::Inspected(target.clone()));
    }

    fn on_done(&mut self) {
        self.send(UiEvent::Done);
    }
}

struct ActiveDownload {
    rx: UnboundedReceiver<UiEvent>,
    cancel: CancelToken,
    _handle: JoinHandle<Outcome>,
}

pub struct DownloadSession<B> {
    backend: Arc<B>,
    runtime: Handle,
    repaint: Repaint,
    progress: ProgressState,
    status: String,
    target: Option<Target>,
    active: Option<ActiveDownload>,
    started: bool,
    retries: u32,
}

impl<B: MediaBackend + 'static> DownloadSession<B> {
    pub fn new(backend: Arc<B>, runtime: Handle, repaint: Repaint) -> Self {
        Self {
            backend,
            runtime,
            repaint,
            progress: ProgressState::default(),
            status: String::new(),
            target: None,
            active: None,
            started: false,
            retries: 0,
        }
    }

    /// Retry rounds for failed items, applied to downloads started afterwards.
    pub fn set_retries(&mut self, retries: u32) {
        self.retries = retries;
    }

    /// Starts a download unless the URL is blank or one is already running.
    pub fn start(&mut self, url: &str, dest_dir: &str) -> Result<(), StartError> {
        let request = DownloadRequest::new(url, dest_dir.trim())
            .ok_or(StartError::EmptyUrl)?
            .with_retries(self.retries);
        if self.active.is_some() {
            warn!(url = %request.url, "download already running, request rejected");
            return Err(StartError::AlreadyRunning);
        }

        info!(url = %request.url, "starting download");
        self.progress = ProgressState::default();
        self.status.clear();
        self.target = None;
        self.started = true;

        let (tx, rx) = unbounded_channel();
        let cancel = CancelToken::new();
        let handle = spawn_download(
            &self.runtime,
            Arc::clone(&self.backend),
            request,
            ChannelSink::new(tx, Arc::clone(&self.repaint)),
            cancel.clone(),
        );
        self.active = Some(ActiveDownload { rx, cancel, _handle: handle });
        Ok(())
    }

    /// Applies queued events. Returns the inspected target if it arrived during this call.
    pub fn poll(&mut self) -> Option<Target> {
        let active = self.active.as_mut()?;
        let mut inspected = None;
        let mut done = false;

        loop {
            match active.rx.try_recv() {
                Ok(UiEvent::Progress { current, total }) => {
                    self.progress = ProgressState { current, total };
                }
                Ok(UiEvent::Status(message)) => self.status = message,
                Ok(UiEvent::Inspected(target)) => {
                    self.target = Some(target.clone());
                    inspected = Some(target);
                }
                Ok(UiEvent::Done) => {
                    done = true;
                    break;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    // Sink dropped without `on_done`: the task panicked.
                    warn!("download task ended without finishing");
                    self.status = format!("Error: {}", FetchError::Aborted);
                    done = true;
                    break;
                }
            }
        }

        if done {
            self.active = None;
        }
        inspected
    }

    /// Asks the running download to stop after the current item.
    pub fn cancel(&self) {
        if let Some(active) = &self.active {
            info!("cancel requested");
            active.cancel.cancel();
        }
    }

    pub fn is_running(&self) -> bool {
        self.active.is_some()
    }

    /// True once any download has been started in this window.
    pub fn has_started(&self) -> bool {
        self.started
    }

    pub fn progress(&self) -> ProgressState {
        self.progress
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn target(&self) -> Option<&Target> {
        self.target.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::tests::{Scripted, bytes, finished, playlist, single};
    use crate::progress::RawEvent;
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    type Parts = (DownloadSession<Scripted>, Arc<Scripted>, Arc<AtomicUsize>);

    fn session(backend: Scripted) -> Parts {
        let backend = Arc::new(backend);
        let repaints = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&repaints);
        let repaint: Repaint = Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let session = DownloadSession::new(Arc::clone(&backend), Handle::current(), repaint);
        (session, backend, repaints)
    }

    async fn run_to_end(session: &mut DownloadSession<Scripted>) -> Vec<Target> {
        let mut inspected = Vec::new();
        // The error log goes through the blocking pool, so plain yields are not enough.
        for _ in 0..2000 {
            inspected.extend(session.poll());
            if !session.is_running() {
                return inspected;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("download never finished");
    }

    #[tokio::test]
    async fn blank_url_starts_nothing() {
        let (mut session, backend, repaints) = session(Scripted::new(single(), vec![]));

        assert_eq!(session.start("   ", "/out"), Err(StartError::EmptyUrl));
        tokio::task::yield_now().await;

        assert!(!session.is_running());
        assert!(!session.has_started());
        assert_eq!(session.poll(), None);
        assert_eq!(session.status(), "");
        assert_eq!(backend.inspections.load(Ordering::SeqCst), 0);
        assert_eq!(repaints.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn second_start_is_rejected_while_running() {
        let (mut session, backend, _) = session(Scripted::new(single(), vec![finished("Clip")]));

        session.start("https://youtu.be/abc", "/out").unwrap();
        assert_eq!(session.start("https://youtu.be/def", "/out"), Err(StartError::AlreadyRunning));
        run_to_end(&mut session).await;

        assert_eq!(backend.inspections.load(Ordering::SeqCst), 1);
        session.start("https://youtu.be/def", "/out").unwrap();
        run_to_end(&mut session).await;
        assert_eq!(backend.inspections.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn playlist_progress_reaches_the_window() {
        let (mut session, _, repaints) = session(Scripted::new(
            playlist(3),
            vec![
                bytes(1, 2),
                finished("one"),
                RawEvent::ItemError { message: "Video unavailable".into() },
                finished("three"),
            ],
        ));

        session.start("https://www.youtube.com/playlist?list=PL1", "/out").unwrap();
        let inspected = run_to_end(&mut session).await;

        assert_eq!(inspected, [playlist(3)]);
        assert_eq!(session.target(), Some(&playlist(3)));
        assert_eq!(session.progress(), ProgressState { current: 2.0, total: 3 });
        assert_eq!(session.progress().count_label(), "2/3");
        assert!((session.progress().fraction() - 2.0 / 3.0).abs() < 1e-6);
        assert_eq!(session.status(), "Download completed.");
        assert!(repaints.load(Ordering::SeqCst) > 0);
    }

    #[tokio::test]
    async fn retries_apply_to_new_downloads() {
        let (mut session, backend, _) = session(
            Scripted::new(
                playlist(2),
                vec![
                    finished("one"),
                    RawEvent::ItemError { message: "[youtube] vid2: timed out".into() },
                ],
            )
            .on_url("https://www.youtube.com/watch?v=vid2", vec![finished("two")]),
        );
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().to_str().unwrap();

        session.start("https://www.youtube.com/playlist?list=PL1", dest).unwrap();
        run_to_end(&mut session).await;
        assert_eq!(session.progress(), ProgressState { current: 1.0, total: 2 });
        assert_eq!(backend.requested.lock().unwrap().len(), 1);

        session.set_retries(1);
        session.start("https://www.youtube.com/playlist?list=PL1", dest).unwrap();
        run_to_end(&mut session).await;
        assert_eq!(session.progress(), ProgressState { current: 2.0, total: 2 });
        assert_eq!(session.status(), "Download completed.");
        assert_eq!(backend.requested.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn failure_only_shows_in_status() {
        let (mut session, _, _) = session(Scripted::failing_inspection("Video unavailable"));

        session.start("https://youtu.be/gone", "/out").unwrap();
        run_to_end(&mut session).await;

        assert_eq!(session.status(), "Error: Video unavailable");
        assert_eq!(session.progress(), ProgressState::default());
        assert!(session.target().is_none());
    }

    #[tokio::test]
    async fn cancel_before_transfer() {
        let (mut session, backend, _) =
            session(Scripted::new(playlist(2), vec![finished("a"), finished("b")]));

        session.start("https://www.youtube.com/playlist?list=PL1", "/out").unwrap();
        session.cancel();
        run_to_end(&mut session).await;

        assert_eq!(session.status(), "Download cancelled.");
        assert_eq!(backend.delivered.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn restart_clears_previous_state() {
        let (mut session, _, _) = session(Scripted::new(single(), vec![finished("Clip")]));

        session.start("https://youtu.be/abc", "/out").unwrap();
        run_to_end(&mut session).await;
        assert_eq!(session.progress().current, 1.0);

        session.start("https://youtu.be/abc", "/out").unwrap();
        assert_eq!(session.progress(), ProgressState::default());
        assert_eq!(session.status(), "");
        assert!(session.target().is_none());
        run_to_end(&mut session).await;
    }
}
