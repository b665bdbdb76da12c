//! Main application for the YouTube Downloader GUI

// Callback adapter between the download task and the window
mod adapter;
// Environment-driven settings
mod config;
// yt-dlp process management
mod downloader;
// Error types
mod error;
// Locating and installing yt-dlp
mod install;
// Tracing subscriber setup
mod logging;
// Data models for requests, progress and inspection results
mod model;
// yt-dlp output parsing
mod progress;
// Error log for items that never downloaded
mod report;
// UI-side state of the current download
mod session;
// Thumbnail fetching module
mod thumbnail;

use config::AppConfig;
use downloader::YtDlp;
use model::Target;
use session::{DownloadSession, Repaint};

// eframe/egui for GUI application framework
use eframe::{App, Frame, egui};
// OnceCell for single-time runtime initialization
use once_cell::sync::OnceCell;
// FileDialog for folder selection dialogs
use rfd::FileDialog;
use std::{
    path::PathBuf,
    sync::{Arc, Mutex},
    time::Duration,
};
use egui::{ColorImage, TextureOptions, Visuals};
use tokio::{
    runtime::{Handle, Runtime},
    sync::mpsc::{UnboundedReceiver, error::TryRecvError, unbounded_channel},
};
use tracing::{debug, info};

// Global Tokio runtime stored in a OnceCell for lazy init
static RUNTIME: OnceCell<Arc<Runtime>> = OnceCell::new();

const URL_HINT: &str =
    "https://www.youtube.com/watch?v=example or https://www.youtube.com/playlist?list=exa";

/// Program entry point: initializes logging, config and runtime, then launches the GUI
fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_tracing();

    let config = AppConfig::from_env()?;
    let backend = Arc::new(YtDlp::locate(&config)?);
    info!(program = %backend.program().display(), "using yt-dlp");

    // Create the Tokio runtime and keep it alive for the whole process
    let rt = RUNTIME.get_or_try_init(|| Runtime::new().map(Arc::new))?;
    let handle = rt.handle().clone();

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([800.0, 600.0])
            .with_min_inner_size([520.0, 420.0]),
        ..Default::default()
    };
    eframe::run_native(
        "YouTube Downloader",
        options,
        Box::new(move |cc| {
            cc.egui_ctx.set_visuals(Visuals::dark());
            Box::new(MyApp::new(cc.egui_ctx.clone(), config, backend, handle))
        }),
    )?;
    Ok(())
}

/// Application state for the GUI
struct MyApp {
    /// Input field for the video or playlist URL
    url_input: String,
    /// Destination folder for downloads
    download_folder: String,
    /// Progress, status and inspection result of the current download
    session: DownloadSession<YtDlp>,
    runtime: Handle,
    repaint_interval: Duration,
    /// Texture for the current target's thumbnail
    thumbnail: Option<egui::TextureHandle>,
    /// Incoming thumbnail fetch results (thumbnail url, image)
    thumbnail_results: Arc<Mutex<Vec<(String, ColorImage)>>>,
    /// Pending answer from an open folder dialog
    folder_rx: Option<UnboundedReceiver<Option<PathBuf>>>,
}

impl MyApp {
    fn new(ctx: egui::Context, config: AppConfig, backend: Arc<YtDlp>, runtime: Handle) -> Self {
        let repaint: Repaint = Arc::new(move || ctx.request_repaint());
        let mut session = DownloadSession::new(backend, runtime.clone(), repaint);
        session.set_retries(config.retries);
        Self {
            url_input: String::new(),
            download_folder: config.default_dir.display().to_string(),
            session,
            runtime,
            repaint_interval: config.repaint_interval,
            thumbnail: None,
            thumbnail_results: Arc::new(Mutex::new(Vec::new())),
            folder_rx: None,
        }
    }

    fn start_download(&mut self) {
        match self.session.start(&self.url_input, &self.download_folder) {
            Ok(()) => self.thumbnail = None,
            Err(err) => debug!(error = %err, "download not started"),
        }
    }

    /// Fetch the thumbnail in a blocking task so the UI stays responsive
    fn request_thumbnail(&self, target: &Target, ctx: &egui::Context) {
        let Some(url) = target.thumbnail() else {
            return;
        };
        let results = Arc::clone(&self.thumbnail_results);
        let ctx = ctx.clone();
        self.runtime.spawn_blocking(move || {
            if let Some(img) = thumbnail::fetch_thumbnail(&url) {
                if let Ok(mut pending) = results.lock() {
                    pending.push((url, img));
                }
                ctx.request_repaint();
            }
        });
    }

    /// Upload finished thumbnails, ignoring any that belong to an earlier download
    fn collect_thumbnails(&mut self, ctx: &egui::Context) {
        let Ok(mut pending) = self.thumbnail_results.lock() else {
            return;
        };
        let wanted = self.session.target().and_then(Target::thumbnail);
        for (url, img) in pending.drain(..) {
            if wanted.as_deref() == Some(url.as_str()) {
                let texture = ctx.load_texture("thumbnail", img, TextureOptions::default());
                self.thumbnail = Some(texture);
            }
        }
    }

    /// The native picker blocks, so it runs on its own short-lived thread
    fn open_folder_dialog(&mut self, ctx: &egui::Context) {
        if self.folder_rx.is_some() {
            return;
        }
        let (tx, rx) = unbounded_channel();
        self.folder_rx = Some(rx);
        let start = self.download_folder.clone();
        let ctx = ctx.clone();
        std::thread::spawn(move || {
            let picked = FileDialog::new()
                .set_title("Select Download Location")
                .set_directory(&start)
                .pick_folder();
            let _ = tx.send(picked);
            ctx.request_repaint();
        });
    }

    fn poll_folder_dialog(&mut self) {
        let Some(rx) = self.folder_rx.as_mut() else {
            return;
        };
        match rx.try_recv() {
            Ok(picked) => {
                if let Some(folder) = picked {
                    self.download_folder = folder.display().to_string();
                }
                self.folder_rx = None;
            }
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => self.folder_rx = None,
        }
    }

    fn progress_section(&mut self, ui: &mut egui::Ui) {
        let progress = self.session.progress();
        ui.group(|ui| {
            ui.horizontal(|ui| {
                if let Some(tex) = &self.thumbnail {
                    ui.add(egui::Image::new(tex).max_size(egui::vec2(160.0, 90.0)));
                }
                ui.vertical(|ui| {
                    if let Some(title) = self.session.target().and_then(Target::title) {
                        ui.strong(title);
                    }
                    ui.label(egui::RichText::new(progress.count_label()).size(18.0));
                    ui.label(self.session.status());
                });
            });
            ui.add(egui::ProgressBar::new(progress.fraction()).show_percentage());

            ui.horizontal(|ui| {
                if self.session.is_running() {
                    if ui.button("Cancel").clicked() {
                        self.session.cancel();
                    }
                } else if ui.button("Open Folder").clicked() {
                    open_in_file_manager(self.download_folder.clone());
                }
            });
        });
    }
}

/// GUI update loop: called each frame to redraw and handle interactions
impl App for MyApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut Frame) {
        // Apply queued download events and kick off the thumbnail once the target is known
        if let Some(target) = self.session.poll() {
            self.request_thumbnail(&target, ctx);
        }
        self.collect_thumbnails(ctx);
        self.poll_folder_dialog();

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading("YouTube Downloader");
            ui.add_space(6.0);
            let note = egui::Color32::from_rgb(200, 150, 40);
            ui.colored_label(note, "📝 Put the links/URL in the input address below.");
            ui.colored_label(note, "📝 Only YouTube is available as of now.");
            ui.add_space(10.0);

            // URL input field
            ui.label("Enter YouTube Video or Playlist Link");
            ui.add(
                egui::TextEdit::singleline(&mut self.url_input)
                    .hint_text(URL_HINT)
                    .desired_width(f32::INFINITY),
            );
            ui.small("Supports single video or playlist links.");
            ui.add_space(10.0);

            // Folder selection
            ui.label("Save Location");
            ui.horizontal(|ui| {
                let width = ui.available_width() - 90.0;
                ui.add(egui::TextEdit::singleline(&mut self.download_folder).desired_width(width));
                let browse =
                    ui.add_enabled(self.folder_rx.is_none(), egui::Button::new("📁 Browse…"));
                if browse.clicked() {
                    self.open_folder_dialog(ctx);
                }
            });
            ui.small("Default save location is your system's Downloads folder.");
            ui.add_space(10.0);

            if self.session.has_started() {
                self.progress_section(ui);
                ui.add_space(10.0);
            }

            // Download button logic
            let is_playlist = self.url_input.to_lowercase().contains("playlist");
            let label = if is_playlist { "Download All" } else { "Download" };
            let button = egui::Button::new(egui::RichText::new(label).size(18.0))
                .min_size(egui::vec2(ui.available_width(), 40.0));
            if ui.add_enabled(!self.session.is_running(), button).clicked() {
                self.start_download();
            }
        });

        // Request periodic repaint for progress updates
        if self.session.is_running() {
            ctx.request_repaint_after(self.repaint_interval);
        }
    }
}

fn open_in_file_manager(folder: String) {
    std::thread::spawn(move || {
        #[cfg(target_os = "windows")]
        {
            let _ = std::process::Command::new("explorer").arg(folder).spawn();
        }
        #[cfg(target_os = "macos")]
        {
            let _ = std::process::Command::new("open").arg(folder).spawn();
        }
        #[cfg(all(unix, not(target_os = "macos")))]
        {
            let _ = std::process::Command::new("xdg-open").arg(folder).spawn();
        }
    });
}
