//! Mastodon platform implementation
//!
//! Talks to Mastodon and other Fediverse servers implementing the Mastodon
//! API through the megalodon library.

use std::path::Path;

use async_trait::async_trait;
use megalodon::entities::{self, StatusVisibility, UploadMedia};
use megalodon::megalodon::{
    GetAccountStatusesInputOptions, PostStatusInputOptions, PostStatusOutput,
};
use megalodon::{Megalodon, SNS};
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use crate::config::MastodonConfig;
use crate::error::{PlatformError, Result};
use crate::platforms::Platform;
use crate::types::{Attachment, PlatformLimits, Post, Submission, Visibility};

/// Room kept free below the instance's character limit
const SOFT_LIMIT_MARGIN: usize = 5;

/// Mastodon platform client
pub struct MastodonClient {
    client: Box<dyn Megalodon + Send + Sync>,

    /// The instance URL (e.g., "https://mastodon.social")
    instance_url: String,

    /// Mastodon does not report its link width, so it comes from config
    short_url_length: usize,
}

impl MastodonClient {
    /// Create a new Mastodon client
    ///
    /// * `instance_url` - The base URL of the instance (e.g., "https://mastodon.social")
    /// * `access_token` - OAuth access token for authentication
    pub fn new(instance_url: String, access_token: String) -> Result<Self> {
        let client = megalodon::generator(
            SNS::Mastodon,
            instance_url.clone(),
            Some(access_token),
            Some(format!("mirrorcast/{}", env!("CARGO_PKG_VERSION"))),
        )
        .map_err(|e| {
            PlatformError::Authentication(format!("Failed to create Mastodon client: {:?}", e))
        })?;

        Ok(Self {
            client,
            instance_url,
            short_url_length: 23,
        })
    }

    /// Create a Mastodon client from configuration
    ///
    /// Reads the access token from the configured token file.
    ///
    /// # Errors
    ///
    /// Returns `PlatformError::Authentication` if the token file cannot be
    /// read or is empty.
    pub fn from_config(config: &MastodonConfig) -> Result<Self> {
        let token = read_token_file(&config.token_file, "Mastodon")?;
        let mut client = Self::new(config.instance_url(), token.expose_secret().to_string())?;
        client.short_url_length = config.short_url_length;
        Ok(client)
    }

    pub fn instance_url(&self) -> &str {
        &self.instance_url
    }
}

/// Read and trim a bearer token from disk
pub(crate) fn read_token_file(path: &str, platform: &str) -> Result<SecretString> {
    let token_path = shellexpand::full(path).map_err(|e| {
        PlatformError::Authentication(format!("Failed to expand token file path: {}", e))
    })?;

    let token = std::fs::read_to_string(token_path.as_ref())
        .map_err(|e| {
            PlatformError::Authentication(format!(
                "Failed to read {} token file {}: {}",
                platform, token_path, e
            ))
        })?
        .trim()
        .to_string();

    if token.is_empty() {
        return Err(
            PlatformError::Authentication(format!("{} token file is empty", platform)).into(),
        );
    }

    Ok(SecretString::from(token))
}

#[async_trait]
impl Platform for MastodonClient {
    fn name(&self) -> &str {
        "mastodon"
    }

    async fn fetch_account_id(&self) -> Result<String> {
        let response = self
            .client
            .verify_account_credentials()
            .await
            .map_err(|e| map_megalodon_error(e, "verify credentials"))?;

        Ok(response.json.id)
    }

    async fn fetch_timeline(&self, account_id: &str, since_id: Option<&str>) -> Result<Vec<Post>> {
        let options = GetAccountStatusesInputOptions {
            since_id: since_id.map(str::to_string),
            ..Default::default()
        };

        let response = self
            .client
            .get_account_statuses(account_id.to_string(), Some(&options))
            .await
            .map_err(|e| map_megalodon_error(e, "fetch timeline"))?;

        debug!(count = response.json.len(), "fetched toots");
        Ok(response.json.into_iter().map(status_to_post).collect())
    }

    async fn submit(&self, submission: &Submission) -> Result<String> {
        let options = PostStatusInputOptions {
            media_ids: (!submission.media_handles.is_empty())
                .then(|| submission.media_handles.clone()),
            in_reply_to_id: submission.reply_to.clone(),
            sensitive: submission.sensitive.then_some(true),
            spoiler_text: submission.content_warning.clone(),
            visibility: submission.visibility.map(to_status_visibility),
            ..Default::default()
        };

        let response = self
            .client
            .post_status(submission.text.clone(), Some(&options))
            .await
            .map_err(|e| {
                let mapped = map_megalodon_error(e, "post status");
                classify_reply_failure(mapped, submission.reply_to.is_some())
            })?;

        let post_id = match response.json {
            PostStatusOutput::Status(status) => status.id,
            PostStatusOutput::ScheduledStatus(scheduled) => scheduled.id,
        };

        Ok(post_id)
    }

    async fn upload_media(&self, path: &Path) -> Result<String> {
        let response = self
            .client
            .upload_media(path.to_string_lossy().into_owned(), None)
            .await
            .map_err(|e| classify_upload_failure(map_megalodon_error(e, "upload media")))?;

        let media_id = match response.json {
            UploadMedia::Attachment(attachment) => attachment.id,
            UploadMedia::AsyncAttachment(attachment) => attachment.id,
        };

        Ok(media_id)
    }

    async fn fetch_limits(&self) -> Result<PlatformLimits> {
        let response = self
            .client
            .get_instance()
            .await
            .map_err(|e| map_megalodon_error(e, "fetch instance info"))?;

        let hard_limit = response.json.configuration.statuses.max_characters as usize;
        Ok(PlatformLimits::fetched(
            hard_limit,
            hard_limit.saturating_sub(SOFT_LIMIT_MARGIN),
            self.short_url_length,
        ))
    }
}

fn status_to_post(status: entities::Status) -> Post {
    let content_warning = Some(status.spoiler_text.trim().to_string()).filter(|s| !s.is_empty());
    Post {
        id: status.id,
        in_reply_to_id: status.in_reply_to_id,
        in_reply_to_account_id: status.in_reply_to_account_id,
        body: status.content,
        content_warning,
        attachments: status
            .media_attachments
            .into_iter()
            .map(|media| Attachment::new(media.url))
            .collect(),
        visibility: Some(from_status_visibility(&status.visibility)),
        sensitive: status.sensitive,
        permalink: status.url.or(Some(status.uri)),
        links: Vec::new(),
        is_reblog: status.reblog.is_some(),
    }
}

fn to_status_visibility(visibility: Visibility) -> StatusVisibility {
    match visibility {
        Visibility::Public => StatusVisibility::Public,
        Visibility::Unlisted => StatusVisibility::Unlisted,
        Visibility::Private => StatusVisibility::Private,
        Visibility::Direct => StatusVisibility::Direct,
    }
}

fn from_status_visibility(visibility: &StatusVisibility) -> Visibility {
    match visibility {
        StatusVisibility::Public => Visibility::Public,
        StatusVisibility::Unlisted => Visibility::Unlisted,
        StatusVisibility::Direct => Visibility::Direct,
        _ => Visibility::Private,
    }
}

/// A reply to a deleted status comes back as 404 (or 422 on some servers)
fn classify_reply_failure(error: PlatformError, had_reply_target: bool) -> PlatformError {
    if !had_reply_target {
        return error;
    }
    match error {
        PlatformError::Validation(msg) => PlatformError::ReplyTargetGone(msg),
        PlatformError::Posting(msg) if msg.contains("404") => PlatformError::ReplyTargetGone(msg),
        other => other,
    }
}

/// Keep transient and auth failures of a media upload, everything else is `Media`
fn classify_upload_failure(error: PlatformError) -> PlatformError {
    match error {
        PlatformError::Network(_)
        | PlatformError::RateLimit(_)
        | PlatformError::Authentication(_) => error,
        other => PlatformError::Media(format!("Mastodon media upload failed: {}", other)),
    }
}

/// Map megalodon errors to PlatformError
///
/// - HTTP 401/403 → `Authentication`
/// - HTTP 404 → `Posting` (message keeps the code)
/// - HTTP 422 → `Validation`
/// - HTTP 429 → `RateLimit`
/// - HTTP 5xx and connection failures → `Network`
/// - Parse errors → `Posting`
fn map_megalodon_error(error: megalodon::error::Error, context: &str) -> PlatformError {
    let error_str = error.to_string();
    map_error_message(&error_str, context)
}

fn map_error_message(error_str: &str, context: &str) -> PlatformError {
    let error_lower = error_str.to_lowercase();

    match extract_http_status(error_str) {
        Some(401) | Some(403) => PlatformError::Authentication(format!(
            "Mastodon authentication failed ({}): {}. \
                    Check the access token in the configured token file.",
            context, error_str
        )),
        Some(404) => PlatformError::Posting(format!(
            "Mastodon returned 404 ({}): {}",
            context, error_str
        )),
        Some(422) => PlatformError::Validation(format!(
            "Mastodon validation failed ({}): {}",
            context, error_str
        )),
        Some(429) => PlatformError::RateLimit(format!(
            "Mastodon rate limit exceeded ({}): {}",
            context, error_str
        )),
        Some(500..=599) => PlatformError::Network(format!(
            "Mastodon server error ({}): {}",
            context, error_str
        )),
        Some(_) => PlatformError::Posting(format!("Mastodon HTTP error ({}): {}", context, error_str)),
        None => {
            if error_lower.contains("unauthorized")
                || error_lower.contains("forbidden")
                || error_lower.contains("token")
            {
                PlatformError::Authentication(format!(
                    "Mastodon authentication failed ({}): {}",
                    context, error_str
                ))
            } else if error_lower.contains("parse")
                || error_lower.contains("json")
                || error_lower.contains("deserialize")
            {
                PlatformError::Posting(format!(
                    "Mastodon response parse error ({}): {}",
                    context, error_str
                ))
            } else if error_lower.contains("rate limit") || error_lower.contains("too many requests")
            {
                PlatformError::RateLimit(format!(
                    "Mastodon rate limit exceeded ({}): {}",
                    context, error_str
                ))
            } else {
                PlatformError::Network(format!("Mastodon error ({}): {}", context, error_str))
            }
        }
    }
}

/// Extract HTTP status code from error message
///
/// Looks for patterns like "HTTP 401", "status 403", "401:", etc.
fn extract_http_status(error_str: &str) -> Option<u16> {
    let prefixes = ["HTTP ", "status ", "code: ", "status_code: "];

    for prefix in &prefixes {
        if let Some(pos) = error_str.find(prefix) {
            let after_prefix = &error_str[pos + prefix.len()..];
            if let Some(code_str) = after_prefix.get(0..3) {
                if let Ok(code) = code_str.parse::<u16>() {
                    if (100..=599).contains(&code) {
                        return Some(code);
                    }
                }
            }
        }
    }

    // Standalone 3-digit codes followed by colon or space
    let bytes = error_str.as_bytes();
    for (i, window) in bytes.windows(4).enumerate() {
        if window[..3].iter().all(u8::is_ascii_digit) && (window[3] == b':' || window[3] == b' ')
        {
            let code = (window[0] - b'0') as u16 * 100
                + (window[1] - b'0') as u16 * 10
                + (window[2] - b'0') as u16;
            if (100..=599).contains(&code) && (i == 0 || !bytes[i - 1].is_ascii_digit()) {
                return Some(code);
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MirrorcastError;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn config_with_token(contents: &[u8]) -> (NamedTempFile, MastodonConfig) {
        let mut temp_file = NamedTempFile::new().expect("Failed to create temp file");
        temp_file.write_all(contents).expect("Failed to write token");
        temp_file.flush().expect("Failed to flush");

        let config = MastodonConfig {
            instance: "social.example".to_string(),
            token_file: temp_file.path().to_str().unwrap().to_string(),
            visibility: Visibility::Private,
            retries: 3,
            retry_delay: 20,
            short_url_length: 23,
        };
        (temp_file, config)
    }

    #[test]
    fn test_mastodon_client_creation() {
        let client = MastodonClient::new(
            "https://social.example".to_string(),
            "test-token".to_string(),
        )
        .expect("Failed to create client");

        assert_eq!(client.name(), "mastodon");
        assert_eq!(client.instance_url(), "https://social.example");
    }

    #[test]
    fn test_from_config_valid_token() {
        let (_file, config) = config_with_token(b"  test-token-123  \n");
        let client = MastodonClient::from_config(&config).expect("client from config");
        assert_eq!(client.instance_url(), "https://social.example");
    }

    #[test]
    fn test_from_config_empty_token_file() {
        let (_file, config) = config_with_token(b"   \n");
        match MastodonClient::from_config(&config) {
            Err(MirrorcastError::Platform(PlatformError::Authentication(msg))) => {
                assert!(msg.contains("empty"));
            }
            _ => panic!("Expected authentication error for empty token file"),
        }
    }

    #[test]
    fn test_from_config_missing_token_file() {
        let (_file, mut config) = config_with_token(b"token");
        config.token_file = "/nonexistent/mastodon.token".to_string();
        let err = MastodonClient::from_config(&config).err().unwrap();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_visibility_mapping() {
        for visibility in [
            Visibility::Public,
            Visibility::Unlisted,
            Visibility::Private,
            Visibility::Direct,
        ] {
            assert_eq!(
                from_status_visibility(&to_status_visibility(visibility)),
                visibility
            );
        }
    }

    #[test]
    fn test_extract_http_status() {
        assert_eq!(extract_http_status("HTTP 401 Unauthorized"), Some(401));
        assert_eq!(extract_http_status("status 404 not found"), Some(404));
        assert_eq!(extract_http_status("Error: 422: Validation failed"), Some(422));
        assert_eq!(extract_http_status("status_code: 429"), Some(429));
        assert_eq!(extract_http_status("Network error"), None);
        assert_eq!(extract_http_status("HTTP 999"), None);
        assert_eq!(extract_http_status("1234"), None);
    }

    #[test]
    fn test_error_classification() {
        assert!(matches!(
            map_error_message("HTTP 401 Unauthorized", "post"),
            PlatformError::Authentication(_)
        ));
        assert!(matches!(
            map_error_message("HTTP 503 Service Unavailable", "post"),
            PlatformError::Network(_)
        ));
        assert!(matches!(
            map_error_message("HTTP 429 Too Many Requests", "post"),
            PlatformError::RateLimit(_)
        ));
        assert!(matches!(
            map_error_message("connection reset by peer", "post"),
            PlatformError::Network(_)
        ));
        assert!(matches!(
            map_error_message("failed to parse json", "post"),
            PlatformError::Posting(_)
        ));
    }

    #[test]
    fn test_upload_failure_classification() {
        let upload = |message: &str| {
            classify_upload_failure(map_error_message(message, "upload media"))
        };

        let outage = upload("HTTP 503 Service Unavailable");
        assert!(matches!(outage, PlatformError::Network(_)));
        assert!(outage.is_transient());

        assert!(matches!(
            upload("HTTP 429 Too Many Requests"),
            PlatformError::RateLimit(_)
        ));
        assert!(matches!(
            upload("connection reset by peer"),
            PlatformError::Network(_)
        ));
        assert!(matches!(
            upload("HTTP 401 Unauthorized"),
            PlatformError::Authentication(_)
        ));

        let rejected = upload("HTTP 422 Unprocessable Entity");
        assert!(matches!(rejected, PlatformError::Media(_)));
        assert!(!rejected.is_transient());
    }

    #[tokio::test]
    async fn test_upload_to_unreachable_instance_is_transient() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = MastodonClient::new(format!("http://{}", addr), "test-token".to_string())
            .expect("Failed to create client");
        let mut image = NamedTempFile::new().unwrap();
        image.write_all(b"\x89PNG\r\n\x1a\n").unwrap();

        let err = client.upload_media(image.path()).await.unwrap_err();
        assert!(err.is_transient(), "unexpected error: {}", err);
    }

    #[test]
    fn test_missing_reply_target_detection() {
        let not_found = map_error_message("status 404 Record not found", "post status");
        assert!(matches!(
            classify_reply_failure(not_found.clone(), true),
            PlatformError::ReplyTargetGone(_)
        ));
        assert!(matches!(
            classify_reply_failure(not_found, false),
            PlatformError::Posting(_)
        ));

        let unprocessable = map_error_message("HTTP 422 Unprocessable Entity", "post status");
        assert!(matches!(
            classify_reply_failure(unprocessable, true),
            PlatformError::ReplyTargetGone(_)
        ));

        let outage = map_error_message("HTTP 502 Bad Gateway", "post status");
        assert!(matches!(
            classify_reply_failure(outage, true),
            PlatformError::Network(_)
        ));
    }
}
