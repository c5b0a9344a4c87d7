use std::path::Path;
use url::Url;
use crate::types::SupervisorError;

/// Hosts accepted for downloads. Matched exactly against the URL host.
pub const ALLOWED_HOSTS: &[&str] = &[
    "youtube.com",
    "www.youtube.com",
    "m.youtube.com",
    "music.youtube.com",
    "youtu.be",
    "www.youtu.be",
    "youtube-nocookie.com",
    "www.youtube-nocookie.com",
];

pub fn validate_url(url: &str) -> Result<Url, SupervisorError> {
    let url = url.trim();
    if url.is_empty() {
        return Err(SupervisorError::InvalidInput("URL is empty".to_string()));
    }
    let parsed = Url::parse(url)
        .map_err(|e| SupervisorError::InvalidInput(format!("'{}' is not a valid URL: {}", url, e)))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(SupervisorError::InvalidInput(format!("Unsupported scheme '{}'", parsed.scheme())));
    }
    let host = parsed.host_str().unwrap_or_default().to_lowercase();
    if !ALLOWED_HOSTS.contains(&host.as_str()) {
        return Err(SupervisorError::InvalidInput(format!("'{}' is not a YouTube address", host)));
    }
    Ok(parsed)
}

pub fn validate_destination(dir: &Path) -> Result<(), SupervisorError> {
    if dir.as_os_str().is_empty() {
        return Err(SupervisorError::InvalidInput("No download folder selected".to_string()));
    }
    if !dir.is_dir() {
        return Err(SupervisorError::InvalidInput(format!("Download folder {} does not exist", dir.display())));
    }
    Ok(())
}

/// Bare executable name of the configured tool, used for name-based kills.
pub fn tool_name(tool_path: &str) -> String {
    Path::new(tool_path)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "yt-dlp".to_string())
}

pub fn file_basename(path: &str) -> String {
    let trimmed = path.trim().trim_matches('"');
    // The tool prints native separators; accept either on every platform.
    trimmed
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or(trimmed)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_known_hosts() {
        for url in [
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "https://youtu.be/dQw4w9WgXcQ",
            "http://m.youtube.com/watch?v=abc",
            "https://music.youtube.com/playlist?list=PL123",
            "https://WWW.YOUTUBE.COM/watch?v=abc",
        ] {
            assert!(validate_url(url).is_ok(), "{url} should be accepted");
        }
    }

    #[test]
    fn rejects_unknown_hosts_and_garbage() {
        for url in [
            "",
            "   ",
            "not a url",
            "https://vimeo.com/12345",
            "https://youtube.com.evil.example/watch?v=abc",
            "ftp://youtube.com/video",
        ] {
            assert!(matches!(validate_url(url), Err(SupervisorError::InvalidInput(_))), "{url:?} should be rejected");
        }
    }

    #[test]
    fn destination_must_be_existing_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(validate_destination(dir.path()).is_ok());
        assert!(validate_destination(&dir.path().join("missing")).is_err());

        let file = dir.path().join("file.txt");
        std::fs::write(&file, b"x").unwrap();
        assert!(validate_destination(&file).is_err());
        assert!(validate_destination(Path::new("")).is_err());
    }

    #[test]
    fn tool_name_strips_directories_and_extension() {
        assert_eq!(tool_name("yt-dlp"), "yt-dlp");
        assert_eq!(tool_name("/usr/local/bin/yt-dlp"), "yt-dlp");
        assert_eq!(tool_name("yt-dlp.exe"), "yt-dlp");
        assert_eq!(tool_name(""), "yt-dlp");
    }

    #[test]
    fn basename_handles_both_separators() {
        assert_eq!(file_basename("/tmp/out/My Video.mp4"), "My Video.mp4");
        assert_eq!(file_basename(r"C:\Users\me\Downloads\clip.webm"), "clip.webm");
        assert_eq!(file_basename("plain.mp3"), "plain.mp3");
    }
}
