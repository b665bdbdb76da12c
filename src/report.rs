//! `error_log.txt`, left in the destination folder for items that never downloaded.

use std::path::Path;

use chrono::{DateTime, Local};
use tracing::{info, warn};

use crate::model::FailedItem;

const HEADER_RULE: usize = 50;
const ENTRY_RULE: usize = 30;

pub fn render_error_log(failures: &[FailedItem], generated: DateTime<Local>) -> String {
    let mut out = String::from("YouTube Downloader Error Log\n");
    out.push_str(&format!("Generated: {}\n", generated.format("%Y-%m-%d %H:%M:%S")));
    out.push_str(&format!("Total Errors: {}\n", failures.len()));
    out.push_str(&"=".repeat(HEADER_RULE));
    out.push_str("\n\n");

    for failure in failures {
        out.push_str(&format!("Video ID: {}\n", failure.id.as_deref().unwrap_or("unknown")));
        out.push_str(&format!("Title: {}\n", failure.title.as_deref().unwrap_or("unknown")));
        out.push_str(&format!("Error: {}\n", failure.error));
        out.push_str(&"=".repeat(ENTRY_RULE));
        out.push_str("\n\n");
    }

    out.push_str("\nInstructions:\n");
    out.push_str("1. Copy the error messages above\n");
    out.push_str("2. Report these errors to the development team\n");
    out.push_str("3. Include the Video ID and error message for each failed download\n");
    out
}

/// Writes the log. A failure here never fails the download; it only gets logged.
pub async fn write_error_log(path: &Path, failures: &[FailedItem]) -> bool {
    let content = render_error_log(failures, Local::now());
    match tokio::fs::write(path, content).await {
        Ok(()) => {
            info!(path = %path.display(), errors = failures.len(), "error log written");
            true
        }
        Err(err) => {
            warn!(path = %path.display(), error = %err, "could not write error log");
            false
        }
    }
}
