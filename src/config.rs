use anyhow::{anyhow, Context, Result};
use ini::Ini;
use std::fs;
use std::path::{Path, PathBuf};
use crate::types::Settings;

const APP_DIR: &str = "tubegrab";
const SETTINGS_FILE: &str = "settings.ini";

/// Location of `settings.ini`, creating its folder on first use.
pub fn settings_file() -> Result<PathBuf> {
    let base = dirs_next::config_dir().ok_or_else(|| anyhow!("no per-user config directory on this system"))?;
    let dir = base.join(APP_DIR);
    fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
    Ok(dir.join(SETTINGS_FILE))
}

pub fn load_settings(conf: &Ini) -> Settings {
    let defaults = Settings::default();
    let section = conf.section(Some("Settings"));
    let get = |key: &str| section.and_then(|s| s.get(key)).map(str::trim);

    let tool_path = get("tool_path")
        .filter(|v| !v.is_empty())
        .map(|v| v.to_string())
        .unwrap_or(defaults.tool_path);
    let download_dir = get("download_dir")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or(defaults.download_dir);
    let default_quality = get("default_quality")
        .filter(|v| !v.is_empty())
        .map(|v| v.to_string())
        .unwrap_or(defaults.default_quality);
    let speed_limit = get("speed_limit")
        .and_then(|v| if v.is_empty() { None } else { Some(v.to_string()) });
    let idle_timeout = get("idle_timeout")
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(defaults.idle_timeout);
    let kill_by_name = get("kill_by_name")
        .and_then(|v| v.parse::<bool>().ok())
        .unwrap_or(defaults.kill_by_name);

    Settings {
        tool_path,
        download_dir,
        default_quality,
        speed_limit,
        idle_timeout,
        kill_by_name,
    }
}

pub fn save_settings(config_file: &Path, settings: &Settings) -> Result<()> {
    let mut conf = Ini::new();
    conf.with_section(Some("Settings"))
        .set("tool_path", &settings.tool_path)
        .set("download_dir", settings.download_dir.to_string_lossy())
        .set("default_quality", &settings.default_quality)
        .set("speed_limit", settings.speed_limit.as_deref().unwrap_or(""))
        .set("idle_timeout", settings.idle_timeout.to_string())
        .set("kill_by_name", settings.kill_by_name.to_string());
    conf.write_to_file(config_file)?;
    Ok(())
}
