//! Core types for Mirrorcast

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A post fetched from either platform, in platform-agnostic form
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Post {
    /// Platform-specific post id
    pub id: String,
    /// Id of the post this one replies to
    pub in_reply_to_id: Option<String>,
    /// Account id of the author of the post this one replies to
    pub in_reply_to_account_id: Option<String>,
    /// Raw body as returned by the platform (HTML on Mastodon, escaped text on Twitter)
    pub body: String,
    /// Content warning / spoiler text; empty strings are normalized to `None`
    pub content_warning: Option<String>,
    pub attachments: Vec<Attachment>,
    pub visibility: Option<Visibility>,
    pub sensitive: bool,
    /// Public URL of the post, used when truncating instead of splitting
    pub permalink: Option<String>,
    /// Shortened links in the body and what they expand to
    pub links: Vec<LinkEntity>,
    /// Boosts and retweets are never mirrored
    pub is_reblog: bool,
}

impl Post {
    pub fn new(id: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            body: body.into(),
            ..Default::default()
        }
    }

    pub fn is_reply(&self) -> bool {
        self.in_reply_to_id.is_some() || self.in_reply_to_account_id.is_some()
    }

    /// True when the post replies to an account other than `own_account_id`
    pub fn is_reply_to_other(&self, own_account_id: &str) -> bool {
        match &self.in_reply_to_account_id {
            Some(account) => account != own_account_id,
            None => false,
        }
    }
}

/// A shortened link and its expansion (e.g. a t.co URL)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkEntity {
    pub short: String,
    pub expanded: String,
}

/// A media attachment on a source post
///
/// Attachments only live for the duration of relaying a single post.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attachment {
    /// Where the media can be downloaded from
    pub url: String,
    /// Link the source platform inserted into the body for this media
    pub short_link: Option<String>,
    /// Resolved from the download response
    pub mime_type: Option<String>,
    /// Destination platform handle once uploaded
    pub handle: Option<String>,
}

impl Attachment {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_short_link(mut self, link: impl Into<String>) -> Self {
        self.short_link = Some(link.into());
        self
    }
}

/// Visibility of a mirrored post
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Unlisted,
    #[default]
    Private,
    Direct,
}

impl std::fmt::Display for Visibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Public => write!(f, "public"),
            Self::Unlisted => write!(f, "unlisted"),
            Self::Private => write!(f, "private"),
            Self::Direct => write!(f, "direct"),
        }
    }
}

/// Everything a platform needs to publish one post
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Submission {
    pub text: String,
    pub reply_to: Option<String>,
    pub media_handles: Vec<String>,
    pub visibility: Option<Visibility>,
    pub content_warning: Option<String>,
    pub sensitive: bool,
}

impl Submission {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

/// Media types we know a preferred file extension for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    Jpeg,
    Png,
    Gif,
    WebP,
    Mp4,
    QuickTime,
}

impl MediaType {
    /// Parse a MIME string such as `image/jpeg; charset=binary`
    pub fn from_mime_str(s: &str) -> Option<Self> {
        let essence = s.split(';').next().unwrap_or_default().trim();
        match essence.to_lowercase().as_str() {
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            "image/png" => Some(Self::Png),
            "image/gif" => Some(Self::Gif),
            "image/webp" => Some(Self::WebP),
            "video/mp4" => Some(Self::Mp4),
            "video/quicktime" => Some(Self::QuickTime),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Gif => "image/gif",
            Self::WebP => "image/webp",
            Self::Mp4 => "video/mp4",
            Self::QuickTime => "video/quicktime",
        }
    }

    /// Get the typical file extension for this MIME type
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Gif => "gif",
            Self::WebP => "webp",
            Self::Mp4 => "mp4",
            Self::QuickTime => "mov",
        }
    }
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Length constraints of a destination platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformLimits {
    /// Maximum effective length of a single post
    pub hard_limit: usize,
    /// Budget used while splitting, leaving room for continuation markers
    pub soft_limit: usize,
    /// Width every URL counts for, regardless of its real length
    pub short_url_length: usize,
    /// `None` until the platform has been asked at least once
    pub fetched_at: Option<DateTime<Utc>>,
}

impl PlatformLimits {
    /// How long fetched limits are trusted before asking the platform again
    pub const TTL_HOURS: i64 = 24;

    /// Configured limits that have not been confirmed by the platform yet
    pub fn new(hard_limit: usize, soft_limit: usize, short_url_length: usize) -> Self {
        Self {
            hard_limit,
            soft_limit,
            short_url_length,
            fetched_at: None,
        }
    }

    /// Limits as reported by the platform just now
    pub fn fetched(hard_limit: usize, soft_limit: usize, short_url_length: usize) -> Self {
        Self {
            fetched_at: Some(Utc::now()),
            ..Self::new(hard_limit, soft_limit, short_url_length)
        }
    }

    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        match self.fetched_at {
            Some(at) => now - at > Duration::hours(Self::TTL_HOURS),
            None => true,
        }
    }
}

/// Compare two snowflake-style ids
///
/// Both platforms hand out ids that sort by creation time when compared as
/// numbers. Comparing by length first keeps that ordering without parsing, so
/// alphanumeric flake ids from other Fediverse servers still work.
pub fn id_is_newer(candidate: &str, current: &str) -> bool {
    (candidate.len(), candidate) > (current.len(), current)
}
