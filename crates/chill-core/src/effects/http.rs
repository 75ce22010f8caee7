//! HTTP media sources and share-link normalisation.
//!
//! Fetching is feature-gated behind `http` to keep the default build minimal;
//! the URL helpers are always available.

#[cfg(feature = "http")]
use std::io::Read;
#[cfg(feature = "http")]
use std::time::Duration;

#[cfg(feature = "http")]
use crate::error::{ChillError, ChillResult};
#[cfg(feature = "http")]
use super::source::SourceBytes;

/// Upper bound on a fetched payload. Larger sources should be imported.
#[cfg(feature = "http")]
const MAX_FETCH_BYTES: u64 = 256 * 1024 * 1024;

/// Whole-request deadline, connect through last body byte.
#[cfg(feature = "http")]
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Fetch an HTTP/HTTPS URL fully into memory.
#[cfg(feature = "http")]
pub fn fetch(url: &str) -> ChillResult<SourceBytes> {
    let url = drive_direct_url(url).unwrap_or_else(|| url.to_string());
    let agent: ureq::Agent = ureq::Agent::config_builder()
        .timeout_global(Some(FETCH_TIMEOUT))
        .build()
        .into();
    let response = agent
        .get(&url)
        .call()
        .map_err(|e| ChillError::LoadFailure(format!("GET {}: {}", url, e)))?;
    let mime = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or(v).trim().to_string());

    let mut bytes = Vec::new();
    response
        .into_body()
        .into_reader()
        .take(MAX_FETCH_BYTES)
        .read_to_end(&mut bytes)?;
    Ok(SourceBytes { mime, bytes })
}

/// Check if a path looks like an HTTP URL.
pub fn is_http_url(path: &str) -> bool {
    path.starts_with("http://") || path.starts_with("https://")
}

pub fn is_drive_url(url: &str) -> bool {
    url.contains("drive.google.com")
}

/// Rewrite a Google Drive share link to its direct-download form.
///
/// `https://drive.google.com/file/d/ID/view?usp=sharing` →
/// `https://drive.google.com/uc?export=download&id=ID`. Links already in
/// `uc?` form are returned unchanged; non-Drive or unrecognised links give `None`.
pub fn drive_direct_url(url: &str) -> Option<String> {
    if !is_drive_url(url) {
        return None;
    }
    if url.contains("drive.google.com/uc?") {
        return Some(url.to_string());
    }
    let id = if let Some((_, rest)) = url.split_once("/file/d/") {
        rest.split(['/', '?', '#']).next()
    } else if let Some((_, rest)) = url.split_once("open?id=") {
        rest.split(['&', '#']).next()
    } else {
        None
    }?;
    if id.is_empty() {
        return None;
    }
    Some(format!("https://drive.google.com/uc?export=download&id={}", id))
}

/// Extract file extension from a URL, stripping query parameters.
pub fn extension_from_url(url: &str) -> Option<String> {
    let path = url.split('?').next().unwrap_or(url);
    let path = path.split('#').next().unwrap_or(path);
    let segment = path.rsplit('/').next()?;
    let ext = segment.rsplit('.').next()?;
    if ext == segment {
        return None;
    }
    Some(ext.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drive_share_link_becomes_direct() {
        assert_eq!(
            drive_direct_url("https://drive.google.com/file/d/abc123/view?usp=sharing"),
            Some("https://drive.google.com/uc?export=download&id=abc123".into())
        );
        assert_eq!(
            drive_direct_url("https://drive.google.com/open?id=xyz&authuser=0"),
            Some("https://drive.google.com/uc?export=download&id=xyz".into())
        );
    }

    #[test]
    fn drive_direct_link_is_kept() {
        let url = "https://drive.google.com/uc?export=download&id=abc";
        assert_eq!(drive_direct_url(url), Some(url.into()));
    }

    #[test]
    fn non_drive_links_are_ignored() {
        assert_eq!(drive_direct_url("https://example.com/rain.mp3"), None);
        assert_eq!(drive_direct_url("https://drive.google.com/drive/folders"), None);
    }

    #[test]
    fn extension_from_url_strips_query() {
        assert_eq!(
            extension_from_url("https://example.com/rain.mp3?token=abc"),
            Some("mp3".into())
        );
        assert_eq!(extension_from_url("https://example.com/stream"), None);
    }

    #[test]
    fn is_http_url_checks_scheme() {
        assert!(is_http_url("https://example.com/rain.mp3"));
        assert!(is_http_url("http://example.com/rain.mp3"));
        assert!(!is_http_url("data:audio/wav;base64,AA=="));
        assert!(!is_http_url("/home/user/rain.mp3"));
    }
}
