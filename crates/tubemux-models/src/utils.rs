//! Source URL validation and storage-safe naming.

use url::Url;

/// Maximum length of a sanitized title used in artifact names.
const MAX_STORAGE_TITLE_LEN: usize = 80;

/// Hosts accepted as media sources.
const SUPPORTED_HOSTS: &[&str] = &["youtube.com", "youtu.be"];

/// Errors raised while validating a source URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceUrlError {
    /// Not an absolute http(s) URL
    Malformed,
    /// Host is not a supported platform
    UnsupportedHost,
    /// URL has no path beyond the host
    MissingPath,
}

impl std::fmt::Display for SourceUrlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceUrlError::Malformed => write!(f, "URL is malformed"),
            SourceUrlError::UnsupportedHost => write!(f, "URL is not a YouTube URL"),
            SourceUrlError::MissingPath => write!(f, "URL does not point at a video"),
        }
    }
}

impl std::error::Error for SourceUrlError {}

/// Validate a YouTube URL.
///
/// The scheme may be omitted (`youtu.be/xyz`), `www.` and `m.` prefixes are
/// accepted, and a path is required.
pub fn validate_source_url(raw: &str) -> Result<Url, SourceUrlError> {
    let raw = raw.trim();
    let candidate = if raw.starts_with("http://") || raw.starts_with("https://") {
        raw.to_string()
    } else {
        format!("https://{}", raw)
    };

    let url = Url::parse(&candidate).map_err(|_| SourceUrlError::Malformed)?;
    let host = url.host_str().ok_or(SourceUrlError::Malformed)?.to_ascii_lowercase();
    let host = host
        .strip_prefix("www.")
        .or_else(|| host.strip_prefix("m."))
        .unwrap_or(&host);

    if !SUPPORTED_HOSTS.contains(&host) {
        return Err(SourceUrlError::UnsupportedHost);
    }

    if url.path().trim_matches('/').is_empty() {
        return Err(SourceUrlError::MissingPath);
    }

    Ok(url)
}

/// Whether `raw` is an accepted YouTube URL.
pub fn is_valid_youtube_url(raw: &str) -> bool {
    validate_source_url(raw).is_ok()
}

/// Turn a media title into a lowercase, filesystem-safe name.
///
/// Non-alphanumeric characters and whitespace runs become `_`. Empty results
/// fall back to `untitled`.
pub fn sanitize_title_for_storage(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    let mut last_was_space = false;

    for c in title.chars() {
        if c.is_whitespace() {
            if !last_was_space {
                out.push('_');
            }
            last_was_space = true;
            continue;
        }
        last_was_space = false;
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else {
            out.push('_');
        }
    }

    let trimmed: String = out.chars().take(MAX_STORAGE_TITLE_LEN).collect();
    if trimmed.trim_matches('_').is_empty() {
        "untitled".to_string()
    } else {
        trimmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_youtube_urls() {
        assert!(is_valid_youtube_url("https://www.youtube.com/watch?v=dQw4w9WgXcQ"));
        assert!(is_valid_youtube_url("http://youtube.com/shorts/abc"));
        assert!(is_valid_youtube_url("youtu.be/dQw4w9WgXcQ"));
        assert!(is_valid_youtube_url("https://m.youtube.com/watch?v=x"));
    }

    #[test]
    fn test_invalid_youtube_urls() {
        assert_eq!(
            validate_source_url("https://vimeo.com/123").unwrap_err(),
            SourceUrlError::UnsupportedHost
        );
        assert_eq!(
            validate_source_url("https://youtube.com/").unwrap_err(),
            SourceUrlError::MissingPath
        );
        assert_eq!(validate_source_url("http://").unwrap_err(), SourceUrlError::Malformed);
        assert!(!is_valid_youtube_url("https://notyoutube.com/watch?v=x"));
    }

    #[test]
    fn test_sanitize_title() {
        assert_eq!(sanitize_title_for_storage("My Video: Part 1!"), "my_video__part_1_");
        assert_eq!(sanitize_title_for_storage("a   b"), "a_b");
        assert_eq!(sanitize_title_for_storage("日本語"), "untitled");
        assert_eq!(sanitize_title_for_storage("Été 2024"), "_t__2024");
        assert_eq!(sanitize_title_for_storage("   "), "untitled");
        assert_eq!(sanitize_title_for_storage(&"x".repeat(200)).len(), 80);
    }
}
