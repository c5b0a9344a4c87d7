use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use crate::invocation::{build_invocation, listing_args};
use crate::parser::{classify_line, parse_media_listing, LineEvent, PlaylistTracker};
use crate::process::{kill_by_name, Launcher, SystemLauncher, ToolProcess};
use crate::types::{
    DownloadRequest, LogEvent, ProgressEvent, SessionEvent, SessionOutcome, SessionState, SessionStatus, Settings,
    SupervisorError,
};
use crate::utils::{tool_name, validate_destination, validate_url};

const WARNING_TAIL: usize = 20;
const EXIT_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct Canceller {
    token: CancellationToken,
    gate: Arc<Mutex<()>>,
    tool_name: String,
    kill_by_name: bool,
}

impl Canceller {
    /// Requests cancellation. Returns `true` only for the call that made the
    /// request; later calls are no-ops. Never blocks on the kill command.
    pub fn cancel(&self) -> bool {
        {
            let _gate = self.gate.lock();
            if self.token.is_cancelled() {
                return false;
            }
            self.token.cancel();
        }
        info!("cancellation requested");
        if self.kill_by_name {
            if let Err(e) = kill_by_name(&self.tool_name) {
                warn!("could not kill {} by name: {}", self.tool_name, e);
            }
        }
        true
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

pub struct SessionHandle {
    canceller: Canceller,
    state: Arc<Mutex<SessionState>>,
    task: JoinHandle<SessionOutcome>,
}

impl SessionHandle {
    pub fn cancel(&self) -> bool {
        self.canceller.cancel()
    }

    pub fn canceller(&self) -> Canceller {
        self.canceller.clone()
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    pub async fn wait(self) -> SessionOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("download worker ended abnormally: {}", e);
                *self.state.lock() = SessionState::Finished(SessionStatus::Failed);
                SessionOutcome { status: SessionStatus::Failed, exit_code: None, warnings: vec![e.to_string()] }
            }
        }
    }
}

/// Clears the busy flag when the worker is done, however it ends.
struct BusyGuard(Arc<AtomicBool>);

impl BusyGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self(flag.clone()))
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct Supervisor {
    settings: Settings,
    launcher: Arc<dyn Launcher>,
    busy: Arc<AtomicBool>,
}

impl Supervisor {
    pub fn new(settings: Settings) -> Self {
        Self::with_launcher(settings, Arc::new(SystemLauncher))
    }

    pub fn with_launcher(settings: Settings, launcher: Arc<dyn Launcher>) -> Self {
        Self { settings, launcher, busy: Arc::new(AtomicBool::new(false)) }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Runs `<tool> --version` and returns the first line it prints.
    pub async fn check_tool(&self) -> Result<String, SupervisorError> {
        let tool = &self.settings.tool_path;
        let unavailable = |reason: String| SupervisorError::ToolUnavailable { tool: tool.clone(), reason };

        let mut process = self
            .launcher
            .launch(tool, &["--version".to_string()])
            .map_err(|e| match e {
                SupervisorError::ToolUnavailable { .. } => e,
                other => unavailable(other.to_string()),
            })?;
        let mut output = Vec::new();
        while let Some(line) = process.next_line().await {
            output.push(line);
        }
        match process.wait().await {
            Ok(Some(0)) => Ok(output.iter().map(|l| l.trim()).find(|l| !l.is_empty()).unwrap_or_default().to_string()),
            Ok(Some(code)) => Err(unavailable(format!("--version exited with code {}", code))),
            Ok(None) => Err(unavailable("--version was terminated".to_string())),
            Err(e) => Err(unavailable(e.to_string())),
        }
    }

    /// Validates the request and launches the download on a background task.
    /// Events, ending with [`SessionEvent::Finished`], are sent to `events`.
    pub async fn start(
        &self,
        request: DownloadRequest,
        events: UnboundedSender<SessionEvent>,
    ) -> Result<SessionHandle, SupervisorError> {
        validate_url(&request.url)?;
        validate_destination(&request.destination)?;
        let guard = BusyGuard::acquire(&self.busy).ok_or(SupervisorError::AlreadyRunning)?;
        let version = self.check_tool().await?;
        info!(%version, url = %request.url, "starting download");

        let token = CancellationToken::new();
        let state = Arc::new(Mutex::new(SessionState::Idle));
        let worker = Worker {
            request,
            settings: self.settings.clone(),
            launcher: self.launcher.clone(),
            cancel: token.clone(),
            events: events.clone(),
            warnings: VecDeque::new(),
        };

        let task = tokio::spawn({
            let state = state.clone();
            async move {
                *state.lock() = SessionState::Running;
                let outcome = worker.run().await;
                *state.lock() = SessionState::Finished(outcome.status);
                drop(guard);
                let _ = events.send(SessionEvent::Finished(outcome.status));
                outcome
            }
        });

        Ok(SessionHandle {
            canceller: Canceller {
                token,
                gate: Arc::default(),
                tool_name: tool_name(&self.settings.tool_path),
                kill_by_name: self.settings.kill_by_name,
            },
            state,
            task,
        })
    }
}

struct Worker {
    request: DownloadRequest,
    settings: Settings,
    launcher: Arc<dyn Launcher>,
    cancel: CancellationToken,
    events: UnboundedSender<SessionEvent>,
    warnings: VecDeque<String>,
}

enum ReadEnd {
    Closed,
    Cancelled,
    Idle,
}

impl Worker {
    async fn run(mut self) -> SessionOutcome {
        self.log(LogEvent::info("Starting download..."));
        self.log(LogEvent::info(format!("Destination: {}", self.request.destination.display())));

        let expected_items = if self.request.playlist {
            match self.count_items().await {
                Ok(n) => n,
                Err(status) => return self.finish(status, None),
            }
        } else {
            1
        };

        if self.request.audio_only {
            self.log(LogEvent::info("Audio-only mode selected"));
        } else {
            self.log(LogEvent::info(format!("Video quality: {}", self.request.quality)));
        }

        if self.cancel.is_cancelled() {
            return self.finish(SessionStatus::Cancelled, None);
        }
        let args = build_invocation(&self.request, expected_items, &self.settings);
        debug!(?args, "download invocation");
        let mut process = match self.launcher.launch(&self.settings.tool_path, &args) {
            Ok(p) => p,
            Err(e) => {
                self.warn(format!("Could not start {}: {}", self.settings.tool_path, e));
                return self.finish(SessionStatus::Failed, None);
            }
        };

        let mut tracker = PlaylistTracker::default();
        let end = loop {
            match self.read_line(process.as_mut()).await {
                Ok(Some(line)) => self.handle_line(&line, &mut tracker),
                Ok(None) => break ReadEnd::Closed,
                Err(end) => break end,
            }
            if self.cancel.is_cancelled() {
                break ReadEnd::Cancelled;
            }
        };

        if !matches!(end, ReadEnd::Closed) {
            process.terminate();
        }
        if let ReadEnd::Idle = end {
            self.warn(format!(
                "No output from {} for {}s, giving up",
                self.settings.tool_path, self.settings.idle_timeout
            ));
        }
        let exit_code = self.wait_exit(process.as_mut()).await;

        let status = if self.cancel.is_cancelled() {
            SessionStatus::Cancelled
        } else if matches!(end, ReadEnd::Closed) && exit_code == Some(0) {
            SessionStatus::Succeeded
        } else {
            SessionStatus::Failed
        };
        self.finish(status, exit_code)
    }

    /// One line of output, honouring cancellation and the idle timeout.
    async fn read_line(&self, process: &mut dyn ToolProcess) -> Result<Option<String>, ReadEnd> {
        let idle = (self.settings.idle_timeout > 0).then(|| Duration::from_secs(self.settings.idle_timeout));
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ReadEnd::Cancelled),
            line = async {
                match idle {
                    Some(limit) => tokio::time::timeout(limit, process.next_line()).await.map_err(|_| ReadEnd::Idle),
                    None => Ok(process.next_line().await),
                }
            } => line,
        }
    }

    async fn wait_exit(&self, process: &mut dyn ToolProcess) -> Option<i32> {
        match tokio::time::timeout(EXIT_GRACE, process.wait()).await {
            Ok(Ok(code)) => code,
            Ok(Err(e)) => {
                warn!("could not collect exit status: {}", e);
                None
            }
            Err(_) => {
                warn!("tool did not exit within {:?}", EXIT_GRACE);
                None
            }
        }
    }

    /// Number of entries behind the URL, from a listing run of the tool.
    async fn count_items(&mut self) -> Result<usize, SessionStatus> {
        let args = listing_args(&self.request.url);
        let mut process = match self.launcher.launch(&self.settings.tool_path, &args) {
            Ok(p) => p,
            Err(e) => {
                self.warn(format!("Error getting video info: {}", e));
                return Err(SessionStatus::Failed);
            }
        };

        let mut lines = Vec::new();
        let end = loop {
            match self.read_line(process.as_mut()).await {
                Ok(Some(line)) => lines.push(line),
                Ok(None) => break ReadEnd::Closed,
                Err(end) => break end,
            }
        };
        if !matches!(end, ReadEnd::Closed) {
            process.terminate();
        }
        let exit_code = self.wait_exit(process.as_mut()).await;

        if self.cancel.is_cancelled() {
            return Err(SessionStatus::Cancelled);
        }
        let entries = parse_media_listing(&lines);
        if exit_code != Some(0) || entries.is_empty() {
            for line in lines.iter().filter(|l| !l.trim_start().starts_with('{')) {
                self.warn(line.clone());
            }
            self.warn("Error getting video info");
            return Err(SessionStatus::Failed);
        }
        self.log(LogEvent::info(format!("Found {} item(s) to download", entries.len())));
        Ok(entries.len())
    }

    fn handle_line(&mut self, line: &str, tracker: &mut PlaylistTracker) {
        debug!(line, "tool output");
        for event in classify_line(line) {
            match event {
                LineEvent::Progress(p) => {
                    let overall = tracker.overall(p.percent);
                    self.emit(SessionEvent::Progress(ProgressEvent {
                        percent: p.percent,
                        message: p.message,
                        size: p.size,
                        speed: p.speed,
                        eta: p.eta,
                        overall,
                    }));
                }
                LineEvent::Saving(name) => self.log(LogEvent::info(format!("Saving: {}", name))),
                LineEvent::AlreadyDownloaded => self.log(LogEvent::info("File already exists, skipping...")),
                LineEvent::PlaylistItem { index, total } => {
                    tracker.advance(index, total);
                    self.log(LogEvent::info(format!("Item {} of {}", index, total)));
                }
                LineEvent::Warning(text) => self.warn(text),
                LineEvent::Playlist(text) | LineEvent::Info(text) | LineEvent::Extracting(text) | LineEvent::Raw(text) => {
                    self.log(LogEvent::info(text))
                }
            }
        }
    }

    fn finish(mut self, status: SessionStatus, exit_code: Option<i32>) -> SessionOutcome {
        match status {
            SessionStatus::Succeeded => {
                self.emit(SessionEvent::Progress(ProgressEvent {
                    percent: 100.0,
                    message: "Download completed successfully!".to_string(),
                    size: None,
                    speed: None,
                    eta: None,
                    overall: self.request.playlist.then_some(100.0),
                }));
                self.log(LogEvent::info("Download completed successfully!"));
            }
            SessionStatus::Cancelled => self.log(LogEvent::info("Download stopped by user")),
            SessionStatus::Failed => {
                let detail = exit_code.map(|c| format!(" (exit code {})", c)).unwrap_or_default();
                self.warn(format!("Download failed or was interrupted{}", detail));
            }
        }
        info!(%status, ?exit_code, "download finished");
        SessionOutcome { status, exit_code, warnings: self.warnings.into_iter().collect() }
    }

    fn warn(&mut self, text: impl Into<String>) {
        let text = text.into();
        if self.warnings.len() == WARNING_TAIL {
            self.warnings.pop_front();
        }
        self.warnings.push_back(text.clone());
        self.log(LogEvent::warning(text));
    }

    fn log(&self, event: LogEvent) {
        self.emit(SessionEvent::Log(event));
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }
}
