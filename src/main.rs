use anyhow::{Context, Result};
use console::{style, Term};
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};
use ini::Ini;
use lazy_static::lazy_static;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use tubegrab::config::{load_settings, save_settings, settings_file};
use tubegrab::ui::{self, prompt_theme};
use tubegrab::{Canceller, LogLevel, SessionEvent, SessionStatus, Supervisor, SupervisorError};

const VERSION: &str = env!("CARGO_PKG_VERSION");

lazy_static! {
    static ref ACTIVE_SESSION: Mutex<Option<Canceller>> = Mutex::new(None);
}

fn setup_signal_handler() -> Result<()> {
    ctrlc::set_handler(|| {
        match ACTIVE_SESSION.lock().as_ref() {
            Some(canceller) => {
                if canceller.cancel() {
                    eprintln!("\n{}", style("Stopping download...").bold().yellow());
                }
            }
            None => std::process::exit(130),
        }
    })
    .context("Failed to install Ctrl+C handler")
}

async fn run_app(term: &Term) -> Result<()> {
    term.write_line(&format!("{} {}", style("YouTube Downloader").bold().blue(), style(format!("(v{})", VERSION)).dim()))?;

    let config_file = settings_file()?;
    let conf = Ini::load_from_file(&config_file).unwrap_or_default();
    let mut settings = load_settings(&conf);

    if Confirm::with_theme(&prompt_theme()).with_prompt("Customize settings?").default(false).interact_on(term)? {
        ui::customize(term, &mut settings)?;
        save_settings(&config_file, &settings)?;
    }

    let supervisor = Supervisor::new(settings.clone());
    let request = ui::prompt_request(term, &settings)?;
    term.write_line(&format!("\n{}\n", style("Press Ctrl+C to stop the download...").bold()))?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = match supervisor.start(request, tx).await {
        Ok(handle) => handle,
        Err(SupervisorError::ToolUnavailable { tool, reason }) => {
            term.write_line(&format!(
                "{} ({})\n\nPlease install it using:\n  pip install yt-dlp",
                style(format!("{} is not installed.", tool)).red(),
                style(reason).dim()
            ))?;
            return Ok(());
        }
        Err(e) => return Err(e).context("Could not start download"),
    };
    *ACTIVE_SESSION.lock() = Some(handle.canceller());

    let pb = ProgressBar::new(100);
    pb.set_style(ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>3}% {msg}")?
        .progress_chars("█▓▒░-"));
    pb.set_message("Initializing download...");

    while let Some(event) = rx.recv().await {
        match event {
            SessionEvent::Progress(progress) => {
                pb.set_position(progress.overall.unwrap_or(progress.percent).round() as u64);
                pb.set_message(progress.message);
            }
            SessionEvent::Log(log) => match log.level {
                LogLevel::Warning => pb.println(style(log.to_string()).yellow().to_string()),
                LogLevel::Info => pb.println(log.to_string()),
            },
            SessionEvent::Finished(_) => break,
        }
    }

    *ACTIVE_SESSION.lock() = None;
    let outcome = handle.wait().await;
    match outcome.status {
        SessionStatus::Succeeded => {
            pb.finish_with_message("Download completed successfully!");
        }
        SessionStatus::Cancelled => {
            pb.abandon_with_message("Download stopped");
        }
        SessionStatus::Failed => {
            pb.abandon_with_message("Download failed");
            term.write_line(&format!("\n{}", style("Download failed. Recent messages:").bold().red()))?;
            for line in &outcome.warnings {
                term.write_line(&format!("  {}", style(line).red()))?;
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tubegrab=warn")))
        .with_writer(std::io::stderr)
        .init();
    setup_signal_handler()?;

    let term = Term::stdout();
    loop {
        let _ = term.clear_screen();
        if let Err(e) = run_app(&term).await {
            let _ = term.write_line(&format!("\n{}\n", style(format!("An unexpected error occurred: {}", e)).red()));
        }
        if !Confirm::with_theme(&prompt_theme()).with_prompt("\n\nDownload another?").default(false).interact_on(&term).unwrap_or(false) {
            break;
        }
    }
    Ok(())
}
