//! Media source resolution: data URIs, local paths, and (feature `http`) URLs.

use std::path::Path;

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::error::{ChillError, ChillResult};

/// Raw bytes of a source plus the mime type, when one is known.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceBytes {
    pub mime: Option<String>,
    pub bytes: Vec<u8>,
}

pub fn is_data_uri(url: &str) -> bool {
    url.starts_with("data:")
}

/// Decode a `data:[<mime>][;base64],<payload>` URI.
pub fn parse_data_uri(url: &str) -> ChillResult<SourceBytes> {
    let rest = url
        .strip_prefix("data:")
        .ok_or_else(|| ChillError::UnsupportedSource("not a data uri".into()))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| ChillError::LoadFailure("data uri has no payload separator".into()))?;

    let mut parts = header.split(';');
    let mime = parts.next().filter(|m| !m.is_empty()).map(String::from);
    let base64 = header.split(';').any(|p| p.eq_ignore_ascii_case("base64"));

    let bytes = if base64 {
        STANDARD
            .decode(payload.trim())
            .map_err(|e| ChillError::LoadFailure(format!("bad base64 payload: {}", e)))?
    } else {
        payload.as_bytes().to_vec()
    };
    Ok(SourceBytes { mime, bytes })
}

/// Embed bytes as a base64 data URI.
pub fn to_data_uri(mime: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime, STANDARD.encode(bytes))
}

/// Estimated decoded payload size in bytes. External references count as
/// their string length.
pub fn payload_size(url: &str) -> usize {
    match url.split_once(";base64,") {
        Some((_, payload)) if is_data_uri(url) => payload.len() * 3 / 4,
        _ => url.len(),
    }
}

/// Fetch the bytes behind any supported source reference.
pub fn resolve(url: &str) -> ChillResult<SourceBytes> {
    if is_data_uri(url) {
        return parse_data_uri(url);
    }
    if super::http::is_http_url(url) {
        #[cfg(feature = "http")]
        {
            return super::http::fetch(url);
        }
        #[cfg(not(feature = "http"))]
        {
            return Err(ChillError::UnsupportedSource(format!(
                "http sources need the `http` feature: {}",
                url
            )));
        }
    }
    let path = Path::new(url);
    let bytes = std::fs::read(path)?;
    let mime = path
        .extension()
        .and_then(|e| e.to_str())
        .and_then(|e| mime_for_extension(&e.to_lowercase()))
        .map(String::from);
    Ok(SourceBytes { mime, bytes })
}

pub fn mime_for_extension(ext: &str) -> Option<&'static str> {
    Some(match ext {
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "ogg" | "oga" => "audio/ogg",
        "flac" => "audio/flac",
        "m4a" | "aac" => "audio/aac",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        _ => return None,
    })
}

/// Decoder hint extension for a mime type.
pub fn extension_for_mime(mime: &str) -> Option<&'static str> {
    Some(match mime {
        "audio/mpeg" | "audio/mp3" => "mp3",
        "audio/wav" | "audio/x-wav" | "audio/wave" => "wav",
        "audio/ogg" => "ogg",
        "audio/flac" | "audio/x-flac" => "flac",
        "audio/aac" | "audio/mp4" | "audio/x-m4a" => "m4a",
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_base64_data_uri() {
        let src = parse_data_uri("data:audio/wav;base64,aGVsbG8=").unwrap();
        assert_eq!(src.mime.as_deref(), Some("audio/wav"));
        assert_eq!(src.bytes, b"hello");
    }

    #[test]
    fn parses_plain_data_uri() {
        let src = parse_data_uri("data:,abc").unwrap();
        assert_eq!(src.mime, None);
        assert_eq!(src.bytes, b"abc");
    }

    #[test]
    fn rejects_corrupt_payload() {
        assert!(matches!(
            parse_data_uri("data:audio/wav;base64,@@@"),
            Err(ChillError::LoadFailure(_))
        ));
        assert!(parse_data_uri("data:audio/wav;base64").is_err());
    }

    #[test]
    fn data_uri_roundtrip() {
        let uri = to_data_uri("image/png", &[1, 2, 3, 4]);
        assert!(uri.starts_with("data:image/png;base64,"));
        assert_eq!(parse_data_uri(&uri).unwrap().bytes, vec![1, 2, 3, 4]);
    }

    #[test]
    fn payload_size_estimates_decoded_bytes() {
        assert_eq!(payload_size("data:audio/wav;base64,aGVsbG8h"), 6);
        assert_eq!(payload_size("https://x.io/a.mp3"), 18);
    }

    #[test]
    fn missing_file_is_a_load_failure() {
        assert!(matches!(
            resolve("/nonexistent/chill/rain.mp3"),
            Err(ChillError::LoadFailure(_))
        ));
    }
}
