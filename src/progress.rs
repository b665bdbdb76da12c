//! Parsing of yt-dlp's line-oriented output into raw progress events.

use std::path::PathBuf;

const PROGRESS_PREFIX: &str = "tg-progress:";
const ITEM_PREFIX: &str = "tg-item:";

/// `--progress-template` value: byte counters, `NA` when yt-dlp does not know them.
pub const PROGRESS_TEMPLATE: &str =
    "download:tg-progress:%(progress.downloaded_bytes)s|%(progress.total_bytes)s";

/// `--print` value emitted once per item after its file is moved into place.
pub const ITEM_DONE_TEMPLATE: &str = "after_move:tg-item:%(filepath)s";

/// Low-level event reported by the backend while transferring.
#[derive(Debug, Clone, PartialEq)]
pub enum RawEvent {
    Downloading { downloaded_bytes: u64, total_bytes: Option<u64> },
    ItemFinished { path: PathBuf },
    ItemError { message: String },
}

/// Parses one stdout line.
pub fn parse_stdout_line(line: &str) -> Option<RawEvent> {
    let line = line.trim();
    if let Some(rest) = line.strip_prefix(PROGRESS_PREFIX) {
        let (downloaded, total) = rest.split_once('|')?;
        return Some(RawEvent::Downloading {
            downloaded_bytes: parse_bytes(downloaded)?,
            total_bytes: parse_bytes(total).filter(|&t| t > 0),
        });
    }
    if let Some(path) = line.strip_prefix(ITEM_PREFIX) {
        let path = path.trim();
        return Some(RawEvent::ItemFinished { path: PathBuf::from(path) });
    }
    None
}

/// Parses one stderr line. Only `ERROR:` lines matter; warnings are muted anyway.
pub fn parse_stderr_line(line: &str) -> Option<RawEvent> {
    let message = line.trim().strip_prefix("ERROR:")?.trim();
    Some(RawEvent::ItemError {
        message: if message.is_empty() { "unknown error".to_string() } else { message.to_string() },
    })
}

/// Video id from an error like `[youtube] dQw4w9WgXcQ: Video unavailable`.
pub fn item_id_from_error(message: &str) -> Option<&str> {
    let (_, rest) = message.strip_prefix('[')?.split_once("] ")?;
    let (id, _) = rest.split_once(':')?;
    let id = id.trim();
    (!id.is_empty() && !id.contains(char::is_whitespace)).then_some(id)
}

/// Byte counters may come through as `NA`, `None` or a float like `1024.0`.
fn parse_bytes(raw: &str) -> Option<u64> {
    let value: f64 = raw.trim().parse().ok()?;
    (value.is_finite() && value >= 0.0).then_some(value as u64)
}

/// Progress within the current item in `[0, 1]`.
pub fn fraction(downloaded_bytes: u64, total_bytes: u64) -> f64 {
    if total_bytes == 0 {
        return 0.0;
    }
    (downloaded_bytes as f64 / total_bytes as f64).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_with_known_total() {
        assert_eq!(
            parse_stdout_line("tg-progress:512|2048\n"),
            Some(RawEvent::Downloading { downloaded_bytes: 512, total_bytes: Some(2048) })
        );
    }

    #[test]
    fn progress_with_unknown_total() {
        for total in ["NA", "None", "", "0"] {
            let line = format!("tg-progress:512|{total}");
            assert_eq!(
                parse_stdout_line(&line),
                Some(RawEvent::Downloading { downloaded_bytes: 512, total_bytes: None }),
                "{line}"
            );
        }
    }

    #[test]
    fn float_counters_are_accepted() {
        assert_eq!(
            parse_stdout_line("tg-progress:10.0|40.0"),
            Some(RawEvent::Downloading { downloaded_bytes: 10, total_bytes: Some(40) })
        );
    }

    #[test]
    fn malformed_progress_is_dropped() {
        assert_eq!(parse_stdout_line("tg-progress:NA|100"), None);
        assert_eq!(parse_stdout_line("tg-progress:garbage"), None);
        assert_eq!(parse_stdout_line("[youtube] abc: Downloading webpage"), None);
    }

    #[test]
    fn item_marker_carries_path() {
        assert_eq!(
            parse_stdout_line("tg-item:/downloads/My Video.mp4"),
            Some(RawEvent::ItemFinished { path: PathBuf::from("/downloads/My Video.mp4") })
        );
    }

    #[test]
    fn stderr_errors_only() {
        assert_eq!(
            parse_stderr_line("ERROR: [youtube] xyz: Video unavailable"),
            Some(RawEvent::ItemError { message: "[youtube] xyz: Video unavailable".into() })
        );
        assert_eq!(parse_stderr_line("WARNING: something"), None);
    }

    #[test]
    fn video_id_from_error_message() {
        let message = "[youtube] dQw4w9WgXcQ: Video unavailable";
        assert_eq!(item_id_from_error(message), Some("dQw4w9WgXcQ"));
        assert_eq!(item_id_from_error("[youtube:tab] PL1: playlist gone"), Some("PL1"));
        assert_eq!(item_id_from_error("Unable to download webpage: timed out"), None);
        assert_eq!(item_id_from_error("[youtube] some words: nope"), None);
    }

    #[test]
    fn fraction_stays_in_unit_range() {
        assert_eq!(fraction(0, 0), 0.0);
        assert_eq!(fraction(50, 200), 0.25);
        assert_eq!(fraction(300, 200), 1.0);
    }
}
