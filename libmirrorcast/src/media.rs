//! Media relay
//!
//! Downloads an attachment from the source platform into a temporary file
//! named with the right extension, hands the file to the destination
//! platform's upload, and removes the file again whatever the outcome.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use tracing::{debug, warn};

use crate::error::{PlatformError, Result};
use crate::platforms::Platform;
use crate::types::{Attachment, MediaType};

const FALLBACK_EXTENSION: &str = "bin";

/// An attachment after it reached the destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relayed {
    /// Handle to attach the media with on the destination
    pub handle: String,
    /// Content type reported by the source
    pub mime_type: Option<String>,
}

impl Relayed {
    /// Record the outcome on the attachment it came from
    pub fn apply_to(&self, attachment: &mut Attachment) {
        attachment.handle = Some(self.handle.clone());
        attachment.mime_type = self.mime_type.clone();
    }
}

/// Moves attachments from one platform to the other through local files
#[derive(Debug, Clone)]
pub struct MediaRelay {
    http: reqwest::Client,
    temp_dir: Option<PathBuf>,
}

impl MediaRelay {
    /// Create a relay staging files in `temp_dir`, or the system temp dir
    pub fn new(temp_dir: Option<PathBuf>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| PlatformError::Network(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { http, temp_dir })
    }

    /// Download one attachment and upload it to `dest`
    pub async fn relay(&self, attachment: &Attachment, dest: &dyn Platform) -> Result<Relayed> {
        debug!(url = %attachment.url, dest = dest.name(), "relaying media");

        let response = self
            .http
            .get(&attachment.url)
            .send()
            .await
            .map_err(|e| download_error(&attachment.url, e))?;

        let status = response.status();
        if !status.is_success() {
            let message = format!("Downloading {} returned {}", attachment.url, status);
            return Err(match status.as_u16() {
                429 => PlatformError::RateLimit(message),
                500..=599 => PlatformError::Network(message),
                _ => PlatformError::Media(message),
            }
            .into());
        }

        let mime_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let bytes = response
            .bytes()
            .await
            .map_err(|e| download_error(&attachment.url, e))?;

        let extension = choose_extension(mime_type.as_deref(), &attachment.url);
        let mut file = self.stage(&extension)?;
        file.write_all(&bytes)
            .and_then(|_| file.flush())
            .map_err(|e| PlatformError::Media(format!("Failed to write media file: {}", e)))?;

        let uploaded = dest.upload_media(file.path()).await;

        let path = file.path().to_path_buf();
        if let Err(e) = file.close() {
            warn!(path = %path.display(), error = %e, "failed to remove staged media file");
        }

        Ok(Relayed {
            handle: uploaded?,
            mime_type,
        })
    }

    fn stage(&self, extension: &str) -> Result<tempfile::NamedTempFile> {
        let suffix = format!(".{}", extension);
        let mut builder = tempfile::Builder::new();
        builder.prefix("mirrorcast-").suffix(&suffix);

        let staged = match &self.temp_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        };
        staged.map_err(|e| PlatformError::Media(format!("Failed to create media file: {}", e)).into())
    }
}

fn download_error(url: &str, error: reqwest::Error) -> PlatformError {
    let message = format!("Downloading {} failed: {}", url, error);
    if error.is_timeout() || error.is_connect() || error.is_request() || error.is_body() {
        PlatformError::Network(message)
    } else {
        PlatformError::Media(message)
    }
}

/// Pick a file extension for downloaded media
///
/// The response's content type wins, then the URL's own extension.
pub fn choose_extension(content_type: Option<&str>, url: &str) -> String {
    if let Some(content_type) = content_type {
        if let Some(media_type) = MediaType::from_mime_str(content_type) {
            return media_type.extension().to_string();
        }

        let essence = content_type.split(';').next().unwrap_or_default().trim();
        if let Some(ext) = mime_guess::get_mime_extensions_str(essence).and_then(|exts| exts.first())
        {
            return ext.to_string();
        }
    }

    url_extension(url).unwrap_or_else(|| FALLBACK_EXTENSION.to_string())
}

fn url_extension(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let ext = Path::new(parsed.path()).extension()?.to_str()?;
    let is_plain = !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric());
    is_plain.then(|| ext.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_from_known_content_type() {
        assert_eq!(choose_extension(Some("image/jpeg"), "https://x/a"), "jpg");
        assert_eq!(choose_extension(Some("image/png"), "https://x/a.jpg"), "png");
        assert_eq!(
            choose_extension(Some("video/mp4; codecs=avc1"), "https://x/a"),
            "mp4"
        );
        assert_eq!(choose_extension(Some("video/quicktime"), "https://x/a"), "mov");
    }

    #[test]
    fn test_extension_from_guessed_content_type() {
        let ext = choose_extension(Some("image/bmp"), "https://x/a");
        assert_eq!(ext, "bmp");
    }

    #[test]
    fn test_extension_from_url() {
        assert_eq!(
            choose_extension(None, "https://files.example/media/abc.PNG?size=large"),
            "png"
        );
        assert_eq!(
            choose_extension(Some("application/x-unknown-thing"), "https://x/a.webp"),
            "webp"
        );
    }

    #[test]
    fn test_extension_fallback() {
        assert_eq!(choose_extension(None, "https://x/media/abc"), "bin");
        assert_eq!(choose_extension(None, "not a url"), "bin");
    }
}
