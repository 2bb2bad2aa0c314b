//! Resolving file payloads for the engine's virtual filesystem.

use std::path::PathBuf;

use base64::Engine as _;
use bytes::Bytes;

/// Where a payload comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum FileSource {
    /// Bytes already in memory.
    Bytes(Bytes),
    /// A `data:` URL or an `http(s)` URL.
    Url(String),
    /// A local file.
    Path(PathBuf),
}

impl FileSource {
    /// Classify a user-supplied string: URLs stay URLs, everything else is
    /// treated as a path.
    pub fn parse(s: &str) -> Self {
        if s.starts_with("data:") || s.starts_with("http://") || s.starts_with("https://") {
            FileSource::Url(s.to_string())
        } else {
            FileSource::Path(PathBuf::from(s.strip_prefix("file://").unwrap_or(s)))
        }
    }
}

impl From<Bytes> for FileSource {
    fn from(b: Bytes) -> Self {
        FileSource::Bytes(b)
    }
}

impl From<Vec<u8>> for FileSource {
    fn from(v: Vec<u8>) -> Self {
        FileSource::Bytes(Bytes::from(v))
    }
}

impl From<PathBuf> for FileSource {
    fn from(p: PathBuf) -> Self {
        FileSource::Path(p)
    }
}

/// Produce the bytes for `source`. `None` yields an empty payload.
///
/// # Errors
///
/// - [`sf_core::Error::Validation`] for a malformed `data:` URL.
/// - [`sf_core::Error::Api`] for HTTP failures.
/// - [`sf_core::Error::Io`] when a local file cannot be read.
pub async fn fetch_file(
    source: Option<FileSource>,
    client: &reqwest::Client,
) -> sf_core::Result<Bytes> {
    let Some(source) = source else {
        return Ok(Bytes::new());
    };

    match source {
        FileSource::Bytes(b) => Ok(b),
        FileSource::Path(path) => {
            tracing::debug!(path = %path.display(), "reading payload from disk");
            Ok(Bytes::from(tokio::fs::read(&path).await?))
        }
        FileSource::Url(url) if url.starts_with("data:") => decode_data_url(&url),
        FileSource::Url(url) => {
            tracing::debug!(%url, "downloading payload");
            let resp = client
                .get(&url)
                .send()
                .await
                .map_err(|e| sf_core::Error::api(&url, e.to_string()))?;
            let status = resp.status();
            if !status.is_success() {
                return Err(sf_core::Error::api(&url, format!("status {status}")));
            }
            resp.bytes()
                .await
                .map_err(|e| sf_core::Error::api(&url, e.to_string()))
        }
    }
}

fn decode_data_url(url: &str) -> sf_core::Result<Bytes> {
    let (header, payload) = url
        .split_once(',')
        .ok_or_else(|| sf_core::Error::Validation("data URL has no payload".into()))?;
    if !header.ends_with(";base64") {
        return Err(sf_core::Error::Validation(format!(
            "only base64 data URLs are supported, got `{header}`"
        )));
    }
    base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map(Bytes::from)
        .map_err(|e| sf_core::Error::Validation(format!("invalid base64 payload: {e}")))
}
