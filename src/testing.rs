//! Scripted stand-in for the external tool, used by the supervisor tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use crate::process::{Launcher, ToolProcess};
use crate::types::SupervisorError;

#[derive(Debug, Clone)]
pub struct Script {
    lines: Vec<String>,
    exit: Option<i32>,
    hang: bool,
}

impl Script {
    pub fn exits(code: i32, lines: &[&str]) -> Self {
        Self { lines: lines.iter().map(|l| l.to_string()).collect(), exit: Some(code), hang: false }
    }

    /// Prints `lines`, then stays silent until terminated.
    pub fn hangs(code: i32, lines: &[&str]) -> Self {
        Self { hang: true, ..Self::exits(code, lines) }
    }
}

pub struct ScriptedLauncher {
    tool_present: bool,
    version: Script,
    listing: Script,
    download: Script,
    launches: Mutex<Vec<Vec<String>>>,
    terminations: Arc<AtomicUsize>,
}

impl ScriptedLauncher {
    pub fn new(download: Script) -> Self {
        Self {
            tool_present: true,
            version: Script::exits(0, &["2025.01.15"]),
            listing: Script::exits(0, &[r#"{"id": "abc123", "title": "Video"}"#]),
            download,
            launches: Mutex::new(Vec::new()),
            terminations: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn without_tool(mut self) -> Self {
        self.tool_present = false;
        self
    }

    pub fn with_listing(mut self, lines: &[&str]) -> Self {
        self.listing = Script::exits(0, lines);
        self
    }

    pub fn launches(&self) -> Vec<Vec<String>> {
        self.launches.lock().clone()
    }

    pub fn download_launches(&self) -> Vec<Vec<String>> {
        self.launches()
            .into_iter()
            .filter(|args| !args.iter().any(|a| a == "--version" || a == "--dump-json"))
            .collect()
    }

    pub fn terminations(&self) -> usize {
        self.terminations.load(Ordering::SeqCst)
    }
}

impl Launcher for ScriptedLauncher {
    fn launch(&self, program: &str, args: &[String]) -> Result<Box<dyn ToolProcess>, SupervisorError> {
        if !self.tool_present {
            return Err(SupervisorError::ToolUnavailable {
                tool: program.to_string(),
                reason: "No such file or directory".to_string(),
            });
        }
        self.launches.lock().push(args.to_vec());

        let script = if args.iter().any(|a| a == "--version") {
            &self.version
        } else if args.iter().any(|a| a == "--dump-json") {
            &self.listing
        } else {
            &self.download
        };
        Ok(Box::new(ScriptedProcess {
            lines: script.lines.iter().cloned().collect(),
            exit: script.exit,
            hang: script.hang,
            terminations: self.terminations.clone(),
        }))
    }
}

struct ScriptedProcess {
    lines: VecDeque<String>,
    exit: Option<i32>,
    hang: bool,
    terminations: Arc<AtomicUsize>,
}

#[async_trait]
impl ToolProcess for ScriptedProcess {
    async fn next_line(&mut self) -> Option<String> {
        if let Some(line) = self.lines.pop_front() {
            return Some(line);
        }
        if self.hang {
            std::future::pending::<()>().await;
        }
        None
    }

    async fn wait(&mut self) -> std::io::Result<Option<i32>> {
        Ok(self.exit)
    }

    fn terminate(&mut self) {
        self.terminations.fetch_add(1, Ordering::SeqCst);
    }
}
