use anyhow::Result;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use crate::types::SupervisorError;

/// A running external tool as seen by the supervisor: one ordered stream of
/// output lines (stdout and stderr merged), an exit code, and a way to stop it.
#[async_trait]
pub trait ToolProcess: Send {
    /// Next output line, or `None` once both streams are closed.
    async fn next_line(&mut self) -> Option<String>;
    /// Exit code; `None` when the process was ended by a signal.
    async fn wait(&mut self) -> std::io::Result<Option<i32>>;
    fn terminate(&mut self);
}

pub trait Launcher: Send + Sync {
    fn launch(&self, program: &str, args: &[String]) -> Result<Box<dyn ToolProcess>, SupervisorError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLauncher;

impl Launcher for SystemLauncher {
    fn launch(&self, program: &str, args: &[String]) -> Result<Box<dyn ToolProcess>, SupervisorError> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| match e.kind() {
            ErrorKind::NotFound | ErrorKind::PermissionDenied => SupervisorError::ToolUnavailable {
                tool: program.to_string(),
                reason: e.to_string(),
            },
            _ => SupervisorError::Io(e),
        })?;
        debug!(program, pid = ?child.id(), "spawned");

        let (tx, rx) = mpsc::unbounded_channel();
        if let Some(stdout) = child.stdout.take() {
            forward_lines(stdout, tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            forward_lines(stderr, tx);
        }

        Ok(Box::new(SystemProcess { child, lines: rx }))
    }
}

/// Pushes every line of `reader` into `tx`. Both pipes of a child share one
/// sender, so the receiver sees them in arrival order.
fn forward_lines<R>(reader: R, tx: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    if tx.send(line.trim_end_matches(['\r', '\n']).to_string()).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    debug!("output stream closed: {}", e);
                    break;
                }
            }
        }
    });
}

struct SystemProcess {
    child: Child,
    lines: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl ToolProcess for SystemProcess {
    async fn next_line(&mut self) -> Option<String> {
        self.lines.recv().await
    }

    async fn wait(&mut self) -> std::io::Result<Option<i32>> {
        Ok(self.child.wait().await?.code())
    }

    fn terminate(&mut self) {
        let graceful = match self.child.id() {
            Some(pid) => kill_process(pid),
            None => return,
        };
        if let Err(e) = graceful {
            warn!("could not terminate tool gracefully: {}", e);
            let _ = self.child.start_kill();
        }
    }
}

/// Asks the process `pid` to stop: SIGTERM on unix, a tree kill on Windows.
pub fn kill_process(pid: u32) -> Result<()> {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let pid = i32::try_from(pid)?;
        kill(Pid::from_raw(pid), Signal::SIGTERM)?;
    }
    #[cfg(windows)]
    run_detached("taskkill", &["/PID".to_string(), pid.to_string(), "/T".to_string(), "/F".to_string()])?;
    Ok(())
}

/// Kills every process whose name matches `name`. This reaches unrelated
/// instances of the same tool too. Returns once the kill command is started.
pub fn kill_by_name(name: &str) -> Result<()> {
    #[cfg(unix)]
    run_detached("pkill", &["-f".to_string(), name.to_string()])?;
    #[cfg(windows)]
    run_detached("taskkill", &["/f".to_string(), "/im".to_string(), format!("{}.exe", name)])?;
    Ok(())
}

/// Starts `program` and reaps it on a background thread.
fn run_detached(program: &str, args: &[String]) -> Result<()> {
    let mut child = std::process::Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;
    let program = program.to_string();
    std::thread::spawn(move || match child.wait() {
        Ok(status) => debug!(%program, %status, "kill command finished"),
        Err(e) => debug!(%program, "kill command lost: {}", e),
    });
    Ok(())
}
