use std::path::Path;
use crate::types::{DownloadRequest, Settings};

/// Quality choices offered to the user, best first.
pub const QUALITY_PRESETS: &[&str] = &[
    "2160p (4K)",
    "1440p (2K)",
    "1080p (Full HD)",
    "720p (HD)",
    "480p",
    "360p",
    "240p",
    "best",
    "worst",
];

/// Leading integer of a label such as "720p (HD)".
pub fn parse_height(quality: &str) -> Option<u32> {
    let trimmed = quality.trim();
    let end = trimmed.find(|c: char| !c.is_ascii_digit()).unwrap_or(trimmed.len());
    trimmed[..end].parse().ok()
}

pub fn format_selector(quality: &str) -> String {
    match quality.trim() {
        "best" => "best".to_string(),
        "worst" => "worst".to_string(),
        other => match parse_height(other) {
            Some(height) => format!("best[height<={}]", height),
            None => "best".to_string(),
        },
    }
}

pub fn output_template(destination: &Path, nested_playlist: bool) -> String {
    let name = if nested_playlist {
        Path::new("%(playlist)s").join("%(playlist_index)s - %(title)s.%(ext)s")
    } else {
        Path::new("%(title)s.%(ext)s").to_path_buf()
    };
    destination.join(name).to_string_lossy().to_string()
}

/// Arguments for one download run. `expected_items` comes from the listing
/// probe; anything above one selects the per-playlist folder layout.
pub fn build_invocation(request: &DownloadRequest, expected_items: usize, settings: &Settings) -> Vec<String> {
    let mut args = Vec::new();

    args.push("-o".to_string());
    args.push(output_template(&request.destination, request.playlist && expected_items > 1));

    if request.audio_only {
        args.extend(["--extract-audio", "--audio-format", "mp3", "--audio-quality", "0"].map(String::from));
    } else {
        args.push("-f".to_string());
        args.push(format_selector(&request.quality));
    }

    args.push("--newline".to_string());

    if let Some(limit) = settings.speed_limit.as_deref().filter(|l| !l.trim().is_empty()) {
        args.push("--limit-rate".to_string());
        args.push(limit.trim().to_string());
    }

    args.push(request.url.trim().to_string());
    args
}

pub fn listing_args(url: &str) -> Vec<String> {
    ["--flat-playlist", "--dump-json", "--no-download", url.trim()].map(String::from).to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn request(quality: &str, audio_only: bool, playlist: bool) -> DownloadRequest {
        DownloadRequest {
            url: "https://www.youtube.com/watch?v=abc".to_string(),
            destination: PathBuf::from("/downloads"),
            playlist,
            audio_only,
            quality: quality.to_string(),
        }
    }

    fn format_arg(args: &[String]) -> Option<&str> {
        args.iter().position(|a| a == "-f").map(|i| args[i + 1].as_str())
    }

    #[test]
    fn height_bound_comes_from_leading_integer() {
        for height in [144u32, 240, 360, 480, 720, 1080, 1440, 2160, 4320] {
            for suffix in ["", " (HD)", " (4K)", "60", " (Full HD) HDR"] {
                let label = format!("{}p{}", height, suffix);
                assert_eq!(parse_height(&label), Some(height), "{label}");
                assert_eq!(format_selector(&label), format!("best[height<={}]", height));
            }
        }
    }

    #[test]
    fn sentinels_pass_through_and_garbage_falls_back() {
        assert_eq!(format_selector("best"), "best");
        assert_eq!(format_selector("worst"), "worst");
        assert_eq!(format_selector("HD please"), "best");
        assert_eq!(format_selector("p720"), "best");
        assert_eq!(format_selector(""), "best");
        assert_eq!(format_selector("99999999999999999999p"), "best");
    }

    #[test]
    fn audio_only_always_extracts_audio() {
        for quality in QUALITY_PRESETS.iter().copied().chain(["garbage", ""]) {
            let args = build_invocation(&request(quality, true, false), 1, &Settings::default());
            for flag in ["--extract-audio", "--audio-format", "mp3", "--audio-quality"] {
                assert!(args.iter().any(|a| a == flag), "{flag} missing for {quality:?}");
            }
            assert_eq!(format_arg(&args), None);
        }
    }

    #[test]
    fn video_invocation_layout() {
        let args = build_invocation(&request("720p (HD)", false, false), 1, &Settings::default());
        let template = output_template(Path::new("/downloads"), false);
        assert_eq!(
            args,
            vec![
                "-o".to_string(),
                template,
                "-f".to_string(),
                "best[height<=720]".to_string(),
                "--newline".to_string(),
                "https://www.youtube.com/watch?v=abc".to_string(),
            ]
        );
    }

    #[test]
    fn playlist_template_needs_more_than_one_item() {
        let nested = output_template(Path::new("/downloads"), true);
        let flat = output_template(Path::new("/downloads"), false);
        assert!(nested.contains("%(playlist)s") && nested.contains("%(playlist_index)s - %(title)s.%(ext)s"));
        assert!(flat.ends_with("%(title)s.%(ext)s") && !flat.contains("%(playlist)s"));

        let settings = Settings::default();
        assert_eq!(build_invocation(&request("best", false, true), 5, &settings)[1], nested);
        assert_eq!(build_invocation(&request("best", false, true), 1, &settings)[1], flat);
        assert_eq!(build_invocation(&request("best", false, false), 5, &settings)[1], flat);
    }

    #[test]
    fn rate_limit_is_forwarded_and_url_stays_last() {
        let settings = Settings { speed_limit: Some("2M".to_string()), ..Settings::default() };
        let req = request("best", false, false);
        let args = build_invocation(&req, 1, &settings);
        let pos = args.iter().position(|a| a == "--limit-rate").unwrap();
        assert_eq!(args[pos + 1], "2M");
        assert_eq!(args.last().unwrap(), &req.url);
        assert_eq!(args, build_invocation(&req, 1, &settings));
    }
}
