use anyhow::Result;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use console::{style, Style, Term};
use dialoguer::{theme::ColorfulTheme, Confirm, Input, Select};
use std::path::PathBuf;
use crate::invocation::QUALITY_PRESETS;
use crate::types::{DownloadRequest, Settings};
use crate::utils::{validate_destination, validate_url};

/// Prompt styling shared by every question the downloader asks.
pub fn prompt_theme() -> ColorfulTheme {
    ColorfulTheme {
        prompt_prefix: style("?".to_string()).cyan().bold(),
        success_prefix: style("✔".to_string()).green(),
        error_style: Style::new().red().bold(),
        defaults_style: Style::new().dim(),
        values_style: Style::new().cyan(),
        active_item_style: Style::new().cyan().bold(),
        hint_style: Style::new().black().bright(),
        ..ColorfulTheme::default()
    }
}

pub fn customize(term: &Term, settings: &mut Settings) -> Result<()> {
    let theme = prompt_theme();
    loop {
        term.clear_screen()?;
        let mut table = Table::new();
        table.load_preset(UTF8_FULL).set_header(vec!["No.", "Setting", "Value"]).set_content_arrangement(ContentArrangement::Dynamic);
        table.add_row(vec!["1", "yt-dlp path", settings.tool_path.as_str()]);
        table.add_row(vec!["2", "Download folder", &settings.download_dir.to_string_lossy()]);
        table.add_row(vec!["3", "Default quality", settings.default_quality.as_str()]);
        table.add_row(vec!["4", "Speed Limit (e.g., 500K, 2M)", settings.speed_limit.as_deref().unwrap_or("None")]);
        table.add_row(vec!["5", "Idle timeout (seconds, 0 = off)", &settings.idle_timeout.to_string()]);
        table.add_row(vec!["6", "Kill all yt-dlp processes on stop", if settings.kill_by_name { "yes" } else { "no" }]);
        term.write_line(&format!("{}", table))?;

        let choices: String = Input::new().with_prompt("Enter numbers to change (e.g., 1,3)").allow_empty(true).interact_text_on(term)?;
        if choices.is_empty() { break; }

        for choice in choices.split(',') {
            match choice.trim() {
                "1" => settings.tool_path = Input::with_theme(&theme).with_prompt("yt-dlp path ('yt-dlp' for system PATH)").default(settings.tool_path.clone()).interact_text_on(term)?,
                "2" => {
                    let dir: String = Input::with_theme(&theme).with_prompt("Download folder").default(settings.download_dir.to_string_lossy().to_string()).interact_text_on(term)?;
                    settings.download_dir = expand_path(&dir);
                }
                "3" => {
                    let current = QUALITY_PRESETS.iter().position(|q| *q == settings.default_quality).unwrap_or(3);
                    let idx = Select::with_theme(&theme).with_prompt("Default quality").items(QUALITY_PRESETS).default(current).interact_on(term)?;
                    settings.default_quality = QUALITY_PRESETS[idx].to_string();
                }
                "4" => {
                    let limit: String = Input::with_theme(&theme).with_prompt("Speed limit (e.g., 500K, 2M)").default(settings.speed_limit.clone().unwrap_or_default()).allow_empty(true).interact_text_on(term)?;
                    settings.speed_limit = if limit.trim().is_empty() { None } else { Some(limit.trim().to_string()) };
                }
                "5" => settings.idle_timeout = Input::with_theme(&theme).with_prompt("Idle timeout (seconds)").default(settings.idle_timeout).interact_text_on(term)?,
                "6" => settings.kill_by_name = Confirm::with_theme(&theme).with_prompt("Kill every yt-dlp process when stopping?").default(settings.kill_by_name).interact_on(term)?,
                _ => {}
            }
        }

        if !Confirm::new().with_prompt("Change more settings?").default(false).interact_on(term)? { break; }
    }
    Ok(())
}

/// Asks for everything a download needs. URL and folder are re-asked until valid.
pub fn prompt_request(term: &Term, settings: &Settings) -> Result<DownloadRequest> {
    let theme = prompt_theme();

    let url: String = Input::with_theme(&theme)
        .with_prompt("YouTube video or playlist URL")
        .validate_with(|input: &String| validate_url(input).map(|_| ()).map_err(|e| e.to_string()))
        .interact_text_on(term)?;

    let folder: String = Input::with_theme(&theme)
        .with_prompt("Folder to save downloads in")
        .default(settings.download_dir.to_string_lossy().to_string())
        .validate_with(|input: &String| validate_destination(&expand_path(input)).map_err(|e| e.to_string()))
        .interact_text_on(term)?;

    let playlist = Confirm::with_theme(&theme).with_prompt("Playlist mode?").default(false).interact_on(term)?;
    let audio_only = Confirm::with_theme(&theme).with_prompt("Audio only (MP3)?").default(false).interact_on(term)?;

    let quality = if audio_only {
        "best".to_string()
    } else {
        let current = QUALITY_PRESETS.iter().position(|q| *q == settings.default_quality).unwrap_or(3);
        let idx = Select::with_theme(&theme).with_prompt("Video quality").items(QUALITY_PRESETS).default(current).interact_on(term)?;
        QUALITY_PRESETS[idx].to_string()
    };

    term.write_line(&format!(
        "{} {}",
        style("Mode:").dim(),
        if audio_only { style("audio only".to_string()).cyan() } else { style(quality.clone()).cyan() }
    ))?;

    Ok(DownloadRequest {
        url: url.trim().to_string(),
        destination: expand_path(&folder),
        playlist,
        audio_only,
        quality,
    })
}

pub fn expand_path(input: &str) -> PathBuf {
    let input = input.trim().trim_matches('"').trim_matches('\'');
    match input.strip_prefix('~') {
        Some(rest) => dirs_next::home_dir()
            .map(|h| h.join(rest.trim_start_matches(['/', '\\'])))
            .unwrap_or_else(|| input.into()),
        None => input.into(),
    }
}
