use chrono::{DateTime, Local};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Errors reported synchronously by [`crate::Supervisor::start`], before any
/// download process exists. Failures of the tool itself are not errors; they
/// end the session with [`SessionStatus::Failed`].
#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("{tool} is not available: {reason}")]
    ToolUnavailable { tool: String, reason: String },
    #[error("A download is already running")]
    AlreadyRunning,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub url: String,
    pub destination: PathBuf,
    pub playlist: bool,
    pub audio_only: bool,
    pub quality: String,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub tool_path: String,
    pub download_dir: PathBuf,
    pub default_quality: String,
    pub speed_limit: Option<String>,
    /// Seconds without output before the session is abandoned. Zero disables it.
    pub idle_timeout: u64,
    pub kill_by_name: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tool_path: "yt-dlp".to_string(),
            download_dir: default_download_dir(),
            default_quality: "720p (HD)".to_string(),
            speed_limit: None,
            idle_timeout: 0,
            kill_by_name: true,
        }
    }
}

pub fn default_download_dir() -> PathBuf {
    dirs_next::download_dir()
        .or_else(|| dirs_next::home_dir().map(|h| h.join("Downloads")))
        .unwrap_or_else(|| PathBuf::from("."))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Succeeded,
    Failed,
    Cancelled,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Succeeded => write!(f, "Succeeded"),
            SessionStatus::Failed => write!(f, "Failed"),
            SessionStatus::Cancelled => write!(f, "Cancelled"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
    Finished(SessionStatus),
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Finished(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    pub percent: f64,
    pub message: String,
    pub size: Option<String>,
    pub speed: Option<String>,
    pub eta: Option<String>,
    /// Progress across the whole playlist, when the tool reports item counts.
    pub overall: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warning,
}

#[derive(Debug, Clone)]
pub struct LogEvent {
    pub timestamp: DateTime<Local>,
    pub level: LogLevel,
    pub text: String,
}

impl LogEvent {
    pub fn info(text: impl Into<String>) -> Self {
        Self { timestamp: Local::now(), level: LogLevel::Info, text: text.into() }
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self { timestamp: Local::now(), level: LogLevel::Warning, text: text.into() }
    }
}

impl fmt::Display for LogEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.timestamp.format("%H:%M:%S"), self.text)
    }
}

#[derive(Debug, Clone)]
pub enum SessionEvent {
    Progress(ProgressEvent),
    Log(LogEvent),
    Finished(SessionStatus),
}

#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub status: SessionStatus,
    pub exit_code: Option<i32>,
    /// Most recent warning lines, kept as context for failed sessions.
    pub warnings: Vec<String>,
}
