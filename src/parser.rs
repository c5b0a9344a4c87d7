use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use crate::utils::file_basename;

lazy_static! {
    static ref SIZE_RE: Regex = Regex::new(r"of\s+~?\s*(\d[\d.]*\s*[KMGTP]?i?B)").unwrap();
    static ref SPEED_RE: Regex = Regex::new(r"at\s+(\d[\d.]*\s*[KMGTP]?i?B/s)").unwrap();
    static ref ETA_RE: Regex = Regex::new(r"ETA\s+(\S+)").unwrap();
    static ref ITEM_RE: Regex = Regex::new(r"Downloading (?:item|video) (\d+) of (\d+)").unwrap();
}

const DOWNLOAD_MARKER: &str = "[download]";
const WARNING_KEYWORDS: &[&str] = &["error", "warning", "failed"];
const RAW_LINE_MIN_LEN: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct LineProgress {
    pub percent: f64,
    pub message: String,
    pub size: Option<String>,
    pub speed: Option<String>,
    pub eta: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LineEvent {
    Progress(LineProgress),
    Saving(String),
    AlreadyDownloaded,
    Playlist(String),
    PlaylistItem { index: usize, total: usize },
    Warning(String),
    Info(String),
    Extracting(String),
    /// A progress line that could not be read, passed through as-is.
    Raw(String),
}

/// Classifies one line of tool output. Matchers run in priority order and are
/// not exclusive: a warning keyword adds an event on top of the `[download]`
/// matchers.
pub fn classify_line(line: &str) -> Vec<LineEvent> {
    let line = line.trim();
    let mut events = Vec::new();
    if line.is_empty() {
        return events;
    }

    let mut anomaly = false;
    if line.contains(DOWNLOAD_MARKER) {
        if line.contains('%') && line.contains("of") {
            match parse_progress(line) {
                Some(progress) => events.push(LineEvent::Progress(progress)),
                None => anomaly = true,
            }
        } else if let Some((_, path)) = line.split_once("Destination:") {
            events.push(LineEvent::Saving(file_basename(path)));
        } else if line.contains("has already been downloaded") {
            events.push(LineEvent::AlreadyDownloaded);
        } else if line.contains("Downloading") && line.contains("playlist") {
            events.push(LineEvent::Playlist(line.to_string()));
        } else if let Some((index, total)) = parse_playlist_item(line) {
            events.push(LineEvent::PlaylistItem { index, total });
        }
    }

    let lower = line.to_lowercase();
    if WARNING_KEYWORDS.iter().any(|k| lower.contains(k)) {
        events.push(LineEvent::Warning(line.to_string()));
    } else if line.contains("[info]") && !line.contains("Available formats") {
        events.push(LineEvent::Info(line.to_string()));
    } else if line.contains("Extracting URL") || line.contains("Downloading webpage") {
        events.push(LineEvent::Extracting(line.to_string()));
    }

    if anomaly && events.is_empty() && line.len() > RAW_LINE_MIN_LEN {
        events.push(LineEvent::Raw(line.to_string()));
    }
    events
}

/// First well-formed percentage token on the line, plus whatever follows it.
pub fn parse_progress(line: &str) -> Option<LineProgress> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    for (i, token) in tokens.iter().enumerate() {
        let Some(number) = token.strip_suffix('%') else { continue };
        let percent = match number.parse::<f64>() {
            Ok(p) if p.is_finite() => p.clamp(0.0, 100.0),
            _ => continue,
        };

        let rest = tokens[i + 1..].join(" ");
        let message = if rest.is_empty() {
            format!("Downloading... {:.1}%", percent)
        } else {
            format!("Downloading... {:.1}% {}", percent, rest)
        };
        let capture = |re: &Regex| re.captures(&rest).and_then(|c| c.get(1)).map(|m| m.as_str().to_string());

        return Some(LineProgress {
            percent,
            message,
            size: capture(&SIZE_RE),
            speed: capture(&SPEED_RE),
            eta: capture(&ETA_RE),
        });
    }
    None
}

pub fn parse_playlist_item(line: &str) -> Option<(usize, usize)> {
    let caps = ITEM_RE.captures(line)?;
    let index = caps.get(1)?.as_str().parse().ok()?;
    let total = caps.get(2)?.as_str().parse().ok()?;
    if index == 0 || total == 0 || index > total {
        return None;
    }
    Some((index, total))
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PlaylistTracker {
    current: Option<(usize, usize)>,
}

impl PlaylistTracker {
    pub fn advance(&mut self, index: usize, total: usize) {
        self.current = Some((index, total));
    }

    pub fn overall(&self, percent: f64) -> Option<f64> {
        let (index, total) = self.current?;
        let done = (index - 1) as f64 + percent.clamp(0.0, 100.0) / 100.0;
        Some((done / total as f64 * 100.0).clamp(0.0, 100.0))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MediaEntry {
    pub id: Option<String>,
    pub title: Option<String>,
    pub duration: Option<f64>,
}

/// Entries from `--dump-json` output, one JSON object per line. Anything that
/// is not an object (warnings on the merged stream) is skipped.
pub fn parse_media_listing<S: AsRef<str>>(lines: &[S]) -> Vec<MediaEntry> {
    lines
        .iter()
        .map(|l| l.as_ref().trim())
        .filter(|l| l.starts_with('{'))
        .filter_map(|l| serde_json::from_str(l).ok())
        .collect()
}
