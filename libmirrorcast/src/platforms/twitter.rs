//! Twitter platform implementation
//!
//! Uses the v2 REST API with an OAuth 2.0 user access token sent as a bearer
//! token. Link width comes from the v1.1 help/configuration endpoint.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::TwitterConfig;
use crate::error::{PlatformError, Result};
use crate::platforms::mastodon::read_token_file;
use crate::platforms::Platform;
use crate::types::{Attachment, LinkEntity, MediaType, PlatformLimits, Post, Submission};

const TWEET_FIELDS: &str =
    "in_reply_to_user_id,referenced_tweets,entities,attachments,possibly_sensitive";

/// Twitter platform client
pub struct TwitterClient {
    client: reqwest::Client,
    api_base: String,
    token: SecretString,
    hard_limit: usize,
    soft_limit: usize,
}

impl TwitterClient {
    /// Create a new Twitter client
    ///
    /// * `api_base` - API root, normally "https://api.x.com"
    /// * `token` - OAuth 2.0 user access token
    pub fn new(api_base: String, token: SecretString) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(format!("mirrorcast/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PlatformError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            token,
            hard_limit: 140,
            soft_limit: 135,
        })
    }

    /// Create a Twitter client from configuration, reading the token file
    pub fn from_config(config: &TwitterConfig) -> Result<Self> {
        let token = read_token_file(&config.token_file, "Twitter")?;
        let mut client = Self::new(config.api_base.clone(), token)?;
        client.hard_limit = config.hard_limit;
        client.soft_limit = config.soft_limit;
        Ok(client)
    }

    /// Public URL of a tweet
    pub fn permalink(id: &str) -> String {
        format!("https://twitter.com/i/web/status/{}", id)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        context: &str,
        replying: bool,
    ) -> Result<T> {
        let response = request
            .bearer_auth(self.token.expose_secret())
            .send()
            .await
            .map_err(|e| map_transport_error(e, context))?;

        parse_response(response, context, replying).await
    }
}

async fn parse_response<T: DeserializeOwned>(
    response: Response,
    context: &str,
    replying: bool,
) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(classify_response(status, &body, context, replying).into());
    }

    response.json::<T>().await.map_err(|e| {
        PlatformError::Posting(format!("Twitter response parse error ({}): {}", context, e)).into()
    })
}

fn map_transport_error(error: reqwest::Error, context: &str) -> PlatformError {
    PlatformError::Network(format!("Twitter request failed ({}): {}", context, error))
}

/// Map an unsuccessful API response to a PlatformError
fn classify_response(status: StatusCode, body: &str, context: &str, replying: bool) -> PlatformError {
    let message = format!("Twitter API error {} ({}): {}", status, context, body);
    let body_lower = body.to_lowercase();

    match status.as_u16() {
        401 => PlatformError::Authentication(message),
        403 if replying
            && (body_lower.contains("deleted") || body_lower.contains("not visible")) =>
        {
            PlatformError::ReplyTargetGone(message)
        }
        403 if body_lower.contains("duplicate") => PlatformError::Validation(message),
        403 => PlatformError::Authentication(message),
        400 | 422 => PlatformError::Validation(message),
        429 => PlatformError::RateLimit(message),
        500..=599 => PlatformError::Network(message),
        _ => PlatformError::Posting(message),
    }
}

#[derive(Debug, Deserialize)]
struct DataEnvelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct UserData {
    id: String,
}

#[derive(Debug, Deserialize)]
struct CreatedTweet {
    id: String,
}

#[derive(Debug, Default, Deserialize)]
struct TimelineResponse {
    #[serde(default)]
    data: Vec<TweetData>,
    #[serde(default)]
    includes: Includes,
}

#[derive(Debug, Default, Deserialize)]
struct Includes {
    #[serde(default)]
    media: Vec<MediaData>,
}

#[derive(Debug, Deserialize)]
struct MediaData {
    media_key: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    preview_image_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TweetData {
    id: String,
    text: String,
    #[serde(default)]
    in_reply_to_user_id: Option<String>,
    #[serde(default)]
    referenced_tweets: Vec<ReferencedTweet>,
    #[serde(default)]
    entities: Option<Entities>,
    #[serde(default)]
    attachments: Option<TweetAttachments>,
    #[serde(default)]
    possibly_sensitive: bool,
}

#[derive(Debug, Deserialize)]
struct ReferencedTweet {
    #[serde(rename = "type")]
    kind: String,
    id: String,
}

#[derive(Debug, Default, Deserialize)]
struct Entities {
    #[serde(default)]
    urls: Vec<UrlEntity>,
}

#[derive(Debug, Deserialize)]
struct UrlEntity {
    url: String,
    #[serde(default)]
    expanded_url: Option<String>,
    #[serde(default)]
    media_key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TweetAttachments {
    #[serde(default)]
    media_keys: Vec<String>,
}

#[derive(Debug, Serialize)]
struct TweetRequest<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply: Option<ReplySettings<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    media: Option<MediaSettings<'a>>,
}

#[derive(Debug, Serialize)]
struct ReplySettings<'a> {
    in_reply_to_tweet_id: &'a str,
}

#[derive(Debug, Serialize)]
struct MediaSettings<'a> {
    media_ids: &'a [String],
}

/// Both the v2 (`data.id`) and v1.1 (`media_id_string`) upload shapes
#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(default)]
    data: Option<UploadedMedia>,
    #[serde(default)]
    media_id_string: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UploadedMedia {
    id: String,
}

#[derive(Debug, Deserialize)]
struct HelpConfiguration {
    short_url_length: usize,
    short_url_length_https: usize,
}

fn timeline_to_posts(response: TimelineResponse) -> Vec<Post> {
    let media = response.includes.media;

    response
        .data
        .into_iter()
        .map(|tweet| {
            let entities = tweet.entities.unwrap_or_default();
            let media_keys = tweet.attachments.unwrap_or_default().media_keys;

            let attachments = media_keys
                .iter()
                .filter_map(|key| media.iter().find(|m| &m.media_key == key))
                .filter_map(|m| {
                    let url = m.url.clone().or_else(|| m.preview_image_url.clone())?;
                    let short_link = entities
                        .urls
                        .iter()
                        .find(|e| e.media_key.as_deref() == Some(m.media_key.as_str()))
                        .map(|e| e.url.clone());
                    Some(Attachment {
                        short_link,
                        ..Attachment::new(url)
                    })
                })
                .collect();

            let links = entities
                .urls
                .iter()
                .filter(|e| e.media_key.is_none())
                .filter_map(|e| {
                    e.expanded_url.as_ref().map(|expanded| LinkEntity {
                        short: e.url.clone(),
                        expanded: expanded.clone(),
                    })
                })
                .collect();

            let in_reply_to_id = tweet
                .referenced_tweets
                .iter()
                .find(|r| r.kind == "replied_to")
                .map(|r| r.id.clone());
            let is_reblog = tweet.referenced_tweets.iter().any(|r| r.kind == "retweeted");

            Post {
                permalink: Some(TwitterClient::permalink(&tweet.id)),
                id: tweet.id,
                in_reply_to_id,
                in_reply_to_account_id: tweet.in_reply_to_user_id,
                body: tweet.text,
                content_warning: None,
                attachments,
                visibility: None,
                sensitive: tweet.possibly_sensitive,
                links,
                is_reblog,
            }
        })
        .collect()
}

#[async_trait]
impl Platform for TwitterClient {
    fn name(&self) -> &str {
        "twitter"
    }

    async fn fetch_account_id(&self) -> Result<String> {
        let request = self.client.get(self.url("/2/users/me"));
        let user: DataEnvelope<UserData> = self.send(request, "verify credentials", false).await?;
        Ok(user.data.id)
    }

    async fn fetch_timeline(&self, account_id: &str, since_id: Option<&str>) -> Result<Vec<Post>> {
        let mut query = vec![
            ("exclude", "retweets"),
            ("tweet.fields", TWEET_FIELDS),
            ("expansions", "attachments.media_keys"),
            ("media.fields", "url,preview_image_url,type"),
        ];
        if let Some(since) = since_id {
            query.push(("since_id", since));
        }

        let request = self
            .client
            .get(self.url(&format!("/2/users/{}/tweets", account_id)))
            .query(&query);
        let response: TimelineResponse = self.send(request, "fetch timeline", false).await?;

        debug!(count = response.data.len(), "fetched tweets");
        Ok(timeline_to_posts(response))
    }

    async fn submit(&self, submission: &Submission) -> Result<String> {
        let body = TweetRequest {
            text: &submission.text,
            reply: submission
                .reply_to
                .as_deref()
                .map(|id| ReplySettings {
                    in_reply_to_tweet_id: id,
                }),
            media: (!submission.media_handles.is_empty()).then(|| MediaSettings {
                media_ids: &submission.media_handles,
            }),
        };

        let request = self.client.post(self.url("/2/tweets")).json(&body);
        let created: DataEnvelope<CreatedTweet> = self
            .send(request, "post tweet", submission.reply_to.is_some())
            .await?;
        Ok(created.data.id)
    }

    async fn upload_media(&self, path: &Path) -> Result<String> {
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            PlatformError::Media(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "media".to_string());
        let mime = mime_guess::from_path(path).first_or_octet_stream();
        let category = match MediaType::from_mime_str(mime.essence_str()) {
            Some(MediaType::Gif) => "tweet_gif",
            Some(MediaType::Mp4) | Some(MediaType::QuickTime) => "tweet_video",
            _ => "tweet_image",
        };

        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(mime.essence_str())
            .map_err(|e| PlatformError::Media(format!("Invalid media type {}: {}", mime, e)))?;
        let form = reqwest::multipart::Form::new()
            .text("media_category", category)
            .part("media", part);

        let request = self.client.post(self.url("/2/media/upload")).multipart(form);
        let uploaded: UploadResponse = self.send(request, "upload media", false).await?;

        uploaded
            .data
            .map(|d| d.id)
            .or(uploaded.media_id_string)
            .ok_or_else(|| {
                PlatformError::Media("Twitter upload response carried no media id".to_string())
                    .into()
            })
    }

    async fn fetch_limits(&self) -> Result<PlatformLimits> {
        let request = self.client.get(self.url("/1.1/help/configuration.json"));
        let help: HelpConfiguration = self.send(request, "fetch configuration", false).await?;

        // Twitter's own counting is one off from the advertised width
        let short_url_length = help.short_url_length.max(help.short_url_length_https) + 1;
        Ok(PlatformLimits::fetched(
            self.hard_limit,
            self.soft_limit,
            short_url_length,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MirrorcastError;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const TIMELINE: &str = r#"{
        "data": [
            {
                "id": "1002",
                "text": "[CW: cats] look &amp; see https://t.co/abc https://t.co/pic",
                "possibly_sensitive": true,
                "entities": {
                    "urls": [
                        {"url": "https://t.co/abc", "expanded_url": "https://example.com/cats"},
                        {"url": "https://t.co/pic", "expanded_url": "https://x.com/me/status/1002/photo/1", "media_key": "3_99"}
                    ]
                },
                "attachments": {"media_keys": ["3_99"]}
            },
            {
                "id": "1001",
                "text": "@friend indeed",
                "in_reply_to_user_id": "55",
                "referenced_tweets": [{"type": "replied_to", "id": "900"}]
            }
        ],
        "includes": {
            "media": [{"media_key": "3_99", "type": "photo", "url": "https://pbs.example/media/pic.jpg"}]
        },
        "meta": {"result_count": 2}
    }"#;

    #[test]
    fn test_timeline_parsing() {
        let response: TimelineResponse = serde_json::from_str(TIMELINE).unwrap();
        let posts = timeline_to_posts(response);
        assert_eq!(posts.len(), 2);

        let first = &posts[0];
        assert_eq!(first.id, "1002");
        assert!(first.sensitive);
        assert!(!first.is_reply());
        assert_eq!(
            first.links,
            vec![LinkEntity {
                short: "https://t.co/abc".to_string(),
                expanded: "https://example.com/cats".to_string(),
            }]
        );
        assert_eq!(first.attachments.len(), 1);
        assert_eq!(first.attachments[0].url, "https://pbs.example/media/pic.jpg");
        assert_eq!(
            first.attachments[0].short_link.as_deref(),
            Some("https://t.co/pic")
        );
        assert_eq!(
            first.permalink.as_deref(),
            Some("https://twitter.com/i/web/status/1002")
        );

        let reply = &posts[1];
        assert_eq!(reply.in_reply_to_id.as_deref(), Some("900"));
        assert_eq!(reply.in_reply_to_account_id.as_deref(), Some("55"));
        assert!(reply.attachments.is_empty());
    }

    #[test]
    fn test_empty_timeline() {
        let response: TimelineResponse =
            serde_json::from_str(r#"{"meta": {"result_count": 0}}"#).unwrap();
        assert!(timeline_to_posts(response).is_empty());
    }

    #[test]
    fn test_retweets_are_marked() {
        let json = r#"{"data": [{"id": "5", "text": "RT @a: hi",
            "referenced_tweets": [{"type": "retweeted", "id": "4"}]}]}"#;
        let response: TimelineResponse = serde_json::from_str(json).unwrap();
        assert!(timeline_to_posts(response)[0].is_reblog);
    }

    #[test]
    fn test_tweet_request_shape() {
        let media = vec!["m1".to_string()];
        let body = TweetRequest {
            text: "hello",
            reply: Some(ReplySettings {
                in_reply_to_tweet_id: "42",
            }),
            media: Some(MediaSettings { media_ids: &media }),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["reply"]["in_reply_to_tweet_id"], "42");
        assert_eq!(json["media"]["media_ids"][0], "m1");

        let plain = TweetRequest {
            text: "hello",
            reply: None,
            media: None,
        };
        let json = serde_json::to_value(&plain).unwrap();
        assert!(json.get("reply").is_none());
        assert!(json.get("media").is_none());
    }

    #[test]
    fn test_upload_response_shapes() {
        let v2: UploadResponse = serde_json::from_str(r#"{"data": {"id": "77"}}"#).unwrap();
        assert_eq!(v2.data.map(|d| d.id).as_deref(), Some("77"));

        let v1: UploadResponse =
            serde_json::from_str(r#"{"media_id": 78, "media_id_string": "78"}"#).unwrap();
        assert_eq!(v1.media_id_string.as_deref(), Some("78"));
    }

    #[test]
    fn test_response_classification() {
        let gone = r#"{"detail": "You attempted to reply to a Tweet that is deleted or not visible to you."}"#;
        assert!(matches!(
            classify_response(StatusCode::FORBIDDEN, gone, "post tweet", true),
            PlatformError::ReplyTargetGone(_)
        ));
        assert!(matches!(
            classify_response(StatusCode::FORBIDDEN, "forbidden", "post tweet", true),
            PlatformError::Authentication(_)
        ));
        assert!(matches!(
            classify_response(
                StatusCode::FORBIDDEN,
                "You are not allowed to create a Tweet with duplicate content.",
                "post tweet",
                false
            ),
            PlatformError::Validation(_)
        ));
        assert!(matches!(
            classify_response(StatusCode::UNAUTHORIZED, "", "post tweet", false),
            PlatformError::Authentication(_)
        ));
        assert!(matches!(
            classify_response(StatusCode::TOO_MANY_REQUESTS, "", "post tweet", false),
            PlatformError::RateLimit(_)
        ));
        assert!(matches!(
            classify_response(StatusCode::SERVICE_UNAVAILABLE, "", "post tweet", false),
            PlatformError::Network(_)
        ));
        assert!(matches!(
            classify_response(StatusCode::NOT_FOUND, "", "post tweet", false),
            PlatformError::Posting(_)
        ));
    }

    #[test]
    fn test_from_config_reads_token() {
        let mut token = NamedTempFile::new().unwrap();
        token.write_all(b"bearer-token\n").unwrap();
        token.flush().unwrap();

        let config = TwitterConfig {
            api_base: "http://localhost:9/".to_string(),
            token_file: token.path().to_str().unwrap().to_string(),
            ..Default::default()
        };
        let client = TwitterClient::from_config(&config).unwrap();
        assert_eq!(client.name(), "twitter");
        assert_eq!(client.url("/2/tweets"), "http://localhost:9/2/tweets");
    }

    #[test]
    fn test_from_config_missing_token() {
        let config = TwitterConfig {
            token_file: "/nonexistent/twitter.token".to_string(),
            ..Default::default()
        };
        match TwitterClient::from_config(&config) {
            Err(MirrorcastError::Platform(PlatformError::Authentication(msg))) => {
                assert!(msg.contains("Twitter"));
            }
            _ => panic!("Expected authentication error"),
        }
    }

    #[tokio::test]
    async fn test_unreachable_api_is_network_error() {
        let token = SecretString::from("t".to_string());
        let client = TwitterClient::new("http://127.0.0.1:9".to_string(), token).unwrap();
        let err = client.fetch_account_id().await.unwrap_err();
        assert!(err.is_transient());
    }
}
