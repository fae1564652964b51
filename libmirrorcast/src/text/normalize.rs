//! Body conversion between the two post models
//!
//! Mastodon → Twitter turns sanitized HTML into plain text and folds the
//! content warning into the text. Twitter → Mastodon goes the other way: the
//! text is unescaped, handles are marked as foreign, short links expanded and
//! inline CW markers lifted into the explicit spoiler field.

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use tracing::debug;

use crate::config::ContentConfig;
use crate::correlation::CorrelationTable;
use crate::error::{ConfigError, Result};
use crate::text::html;
use crate::types::Post;

lazy_static! {
    static ref MENTION_REGEX: Regex =
        Regex::new(r"(^|[^\w@/])@(\w+)").expect("mention pattern is valid");
}

/// Text ready to be split and submitted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    pub text: String,
    pub content_warning: Option<String>,
}

/// Why a post is deliberately not mirrored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Toot opens with a mention: part of a conversation, not a broadcast
    ConversationalReply,
    /// Reply to someone else's post that we never mirrored
    UnthreadedReply,
    /// Boost or retweet
    Reblog,
    /// Nothing left to post once links and markers are removed
    Empty,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConversationalReply => write!(f, "is a reply"),
            Self::UnthreadedReply => write!(f, "is a reply outside a mirrored thread"),
            Self::Reblog => write!(f, "is a reblog"),
            Self::Empty => write!(f, "has no content"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Mirror(Normalized),
    Skip(SkipReason),
}

/// Whether a Twitter reply may be mirrored, and what it should reply to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyDecision {
    Mirror { reply_to: Option<String> },
    Skip,
}

/// Conversion settings compiled once from configuration
#[derive(Debug, Clone)]
pub struct Normalizer {
    media_links: Option<Regex>,
    cw_prefix: Option<String>,
    cw_pattern: Option<Regex>,
    allow_multi_cw: bool,
    cw_separator: String,
    mention_suffix: String,
}

impl Normalizer {
    /// Build a normalizer
    ///
    /// `mastodon_base_url` is the instance URL whose `/media/...` links are
    /// stripped from toots, since the attachments travel separately.
    pub fn new(content: &ContentConfig, mastodon_base_url: &str) -> Result<Self> {
        let base = mastodon_base_url.trim_end_matches('/');
        let media_links = if base.is_empty() {
            None
        } else {
            Some(
                Regex::new(&format!(r"{}/media/\w+(?:\s+|$)", regex::escape(base))).map_err(
                    |e| ConfigError::InvalidValue {
                        field: "mastodon.instance".to_string(),
                        reason: e.to_string(),
                    },
                )?,
            )
        };

        let cw_pattern = if content.cw_detection {
            Some(
                Regex::new(&content.cw_pattern).map_err(|e| ConfigError::InvalidValue {
                    field: "content.cw_pattern".to_string(),
                    reason: e.to_string(),
                })?,
            )
        } else {
            None
        };

        Ok(Self {
            media_links,
            cw_prefix: content
                .cw_passthrough
                .then(|| content.cw_prefix.clone()),
            cw_pattern,
            allow_multi_cw: content.allow_multi_cw,
            cw_separator: content.cw_separator.clone(),
            mention_suffix: content.mention_suffix.clone(),
        })
    }

    /// Convert a toot into tweet text
    pub fn to_plain(&self, post: &Post) -> Outcome {
        if post.is_reblog {
            return Outcome::Skip(SkipReason::Reblog);
        }

        let mut text = html_to_plain(&post.body);
        if let Some(media_links) = &self.media_links {
            text = media_links.replace_all(&text, "").trim().to_string();
        }

        if text.starts_with('@') {
            return Outcome::Skip(SkipReason::ConversationalReply);
        }
        if text.is_empty() && post.attachments.is_empty() {
            return Outcome::Skip(SkipReason::Empty);
        }

        if let (Some(template), Some(warning)) = (&self.cw_prefix, &post.content_warning) {
            if !warning.is_empty() {
                text = apply_cw_prefix(template, warning, &text);
            }
        }

        Outcome::Mirror(Normalized {
            text,
            content_warning: None,
        })
    }

    /// Convert a tweet into toot text plus spoiler
    pub fn to_markup(&self, post: &Post) -> Outcome {
        if post.is_reblog {
            return Outcome::Skip(SkipReason::Reblog);
        }

        let mut text = html::decode_entities(&post.body);
        for link in &post.links {
            text = text.replace(&link.short, &link.expanded);
        }

        // Warnings keep the handles exactly as written
        let mut content_warning = None;
        if let Some(pattern) = &self.cw_pattern {
            let (body, warning) =
                extract_content_warnings(&text, pattern, self.allow_multi_cw, &self.cw_separator);
            text = body;
            content_warning = warning;
        }
        text = tag_mentions(&text, &self.mention_suffix);

        for attachment in &post.attachments {
            if let Some(link) = &attachment.short_link {
                text = text.replace(link.as_str(), "");
            }
        }

        let text = text.trim().to_string();
        if text.is_empty() && post.attachments.is_empty() {
            return Outcome::Skip(SkipReason::Empty);
        }

        debug!(post_id = %post.id, "normalized tweet body");
        Outcome::Mirror(Normalized {
            text,
            content_warning,
        })
    }
}

/// HTML status body to plain text
///
/// Links collapse to their URL, line and paragraph breaks become newlines,
/// remaining markup is stripped and entities decoded.
pub fn html_to_plain(body: &str) -> String {
    let text = html::rewrite_anchors(body);
    let text = html::convert_breaks(&text);
    let text = html::strip_tags(&text);
    html::decode_entities(&text).trim().to_string()
}

/// Prepend the CW template, with `{}` replaced by the warning text
pub fn apply_cw_prefix(template: &str, warning: &str, body: &str) -> String {
    format!("{}{}", template.replacen("{}", warning, 1), body)
}

/// Append `suffix` to every `@handle` so readers can tell it is foreign
///
/// E-mail addresses and handles that already carry a domain are left alone.
pub fn tag_mentions(text: &str, suffix: &str) -> String {
    MENTION_REGEX
        .replace_all(text, |caps: &Captures| {
            let handle_end = caps.get(0).map(|m| m.end()).unwrap_or_default();
            let already_qualified = text[handle_end..].starts_with('@');
            if already_qualified {
                caps[0].to_string()
            } else {
                format!("{}@{}{}", &caps[1], &caps[2], suffix)
            }
        })
        .into_owned()
}

/// Lift inline CW markers such as `[CW: spoilers]` out of the text
///
/// The warning text is the first capture group of `pattern`. With
/// `allow_multi` every marker is removed and their texts joined with
/// `separator`; otherwise only the first marker counts.
pub fn extract_content_warnings(
    text: &str,
    pattern: &Regex,
    allow_multi: bool,
    separator: &str,
) -> (String, Option<String>) {
    let warnings: Vec<String> = pattern
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .collect();

    if warnings.is_empty() {
        return (text.to_string(), None);
    }

    if allow_multi {
        let body = pattern.replace_all(text, "").trim().to_string();
        (body, Some(warnings.join(separator)))
    } else {
        let body = pattern.replace(text, "").trim().to_string();
        (body, warnings.into_iter().next())
    }
}

/// Reply policy for tweets
///
/// A reply is only mirrored when it continues our own thread or answers a
/// tweet we already mirrored; anything else is someone else's conversation.
pub fn twitter_reply_decision(
    post: &Post,
    own_account_id: &str,
    table: &CorrelationTable,
) -> ReplyDecision {
    let reply_to = post
        .in_reply_to_id
        .as_deref()
        .and_then(|id| table.lookup_reverse(id))
        .map(str::to_string);

    if post.in_reply_to_account_id.is_none() {
        return ReplyDecision::Mirror { reply_to };
    }

    if !post.is_reply_to_other(own_account_id) || reply_to.is_some() {
        ReplyDecision::Mirror { reply_to }
    } else {
        ReplyDecision::Skip
    }
}
