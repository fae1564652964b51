//! Configuration management for Mirrorcast

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;

use crate::error::{ConfigError, Result};
use crate::types::Visibility;

/// Matches inline markers such as `[CW: food]`, `[TW - politics]` or
/// `[spoiler: ending]`; the first group is the warning text.
pub const DEFAULT_CW_PATTERN: &str =
    r"(?i)\[(?:(?:(?:C|T)W)|SPOIL(?:ER)?)(?:[\s\-\.⋅,:–—]+)([^\]]+)\]";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub mastodon: MastodonConfig,
    #[serde(default)]
    pub twitter: TwitterConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub content: ContentConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MastodonConfig {
    /// Instance base URL, with or without scheme
    pub instance: String,
    #[serde(default = "default_mastodon_token_file")]
    pub token_file: String,
    /// Visibility of toots created from tweets
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default = "default_retries")]
    pub retries: u32,
    /// Seconds between attempts
    #[serde(default = "default_retry_delay")]
    pub retry_delay: u64,
    /// Mastodon counts every link as this many characters
    #[serde(default = "default_short_url_length")]
    pub short_url_length: usize,
}

impl MastodonConfig {
    /// Instance URL with an `https://` scheme unless one was given
    pub fn instance_url(&self) -> String {
        let instance = self.instance.trim_end_matches('/');
        if instance.starts_with("http://") || instance.starts_with("https://") {
            instance.to_string()
        } else {
            format!("https://{}", instance)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwitterConfig {
    #[serde(default = "default_twitter_api_base")]
    pub api_base: String,
    #[serde(default = "default_twitter_token_file")]
    pub token_file: String,
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay: u64,
    #[serde(default = "default_hard_limit")]
    pub hard_limit: usize,
    #[serde(default = "default_soft_limit")]
    pub soft_limit: usize,
    /// Used until the platform reports its own value
    #[serde(default = "default_short_url_length")]
    pub short_url_length: usize,
}

impl Default for TwitterConfig {
    fn default() -> Self {
        Self {
            api_base: default_twitter_api_base(),
            token_file: default_twitter_token_file(),
            retries: default_retries(),
            retry_delay: default_retry_delay(),
            hard_limit: default_hard_limit(),
            soft_limit: default_soft_limit(),
            short_url_length: default_short_url_length(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_true")]
    pub post_to_twitter: bool,
    #[serde(default = "default_true")]
    pub post_to_mastodon: bool,
    /// Split long toots into a thread instead of truncating with a link
    #[serde(default = "default_true")]
    pub split_on_twitter: bool,
    /// Seconds between polling cycles
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
    #[serde(default = "default_state_file")]
    pub state_file: String,
    /// Appended to every chunk of a split post except the last
    #[serde(default = "default_continuation_suffix")]
    pub continuation_suffix: String,
    /// Where downloaded media is staged; system temp dir when unset
    #[serde(default)]
    pub media_dir: Option<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            post_to_twitter: true,
            post_to_mastodon: true,
            split_on_twitter: true,
            poll_interval: default_poll_interval(),
            state_file: default_state_file(),
            continuation_suffix: default_continuation_suffix(),
            media_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentConfig {
    /// Prefix tweets with the toot's content warning
    #[serde(default = "default_true")]
    pub cw_passthrough: bool,
    /// `{}` is replaced by the warning text
    #[serde(default = "default_cw_prefix")]
    pub cw_prefix: String,
    /// Turn inline markers in tweets into a Mastodon content warning
    #[serde(default = "default_true")]
    pub cw_detection: bool,
    #[serde(default = "default_cw_pattern")]
    pub cw_pattern: String,
    #[serde(default = "default_true")]
    pub allow_multi_cw: bool,
    #[serde(default = "default_cw_separator")]
    pub cw_separator: String,
    /// Appended to Twitter handles in toots
    #[serde(default = "default_mention_suffix")]
    pub mention_suffix: String,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            cw_passthrough: true,
            cw_prefix: default_cw_prefix(),
            cw_detection: true,
            cw_pattern: default_cw_pattern(),
            allow_multi_cw: true,
            cw_separator: default_cw_separator(),
            mention_suffix: default_mention_suffix(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_retries() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    20
}

fn default_short_url_length() -> usize {
    23
}

fn default_hard_limit() -> usize {
    140
}

fn default_soft_limit() -> usize {
    135
}

fn default_poll_interval() -> u64 {
    30
}

fn default_mastodon_token_file() -> String {
    "~/.config/mirrorcast/mastodon.token".to_string()
}

fn default_twitter_token_file() -> String {
    "~/.config/mirrorcast/twitter.token".to_string()
}

fn default_twitter_api_base() -> String {
    "https://api.x.com".to_string()
}

fn default_state_file() -> String {
    "~/.local/share/mirrorcast/status_associations.json".to_string()
}

fn default_continuation_suffix() -> String {
    " --".to_string()
}

fn default_cw_prefix() -> String {
    "[TW ⋅ {}]\n\n".to_string()
}

fn default_cw_pattern() -> String {
    DEFAULT_CW_PATTERN.to_string()
}

fn default_cw_separator() -> String {
    ", ".to_string()
}

fn default_mention_suffix() -> String {
    "@twitter.com".to_string()
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that parse fine but cannot work together
    pub fn validate(&self) -> Result<()> {
        if self.mastodon.instance.trim().is_empty() {
            return Err(ConfigError::MissingField("mastodon.instance".to_string()).into());
        }

        if !self.sync.post_to_twitter && !self.sync.post_to_mastodon {
            return Err(invalid("sync", "both mirroring directions are disabled"));
        }

        if self.sync.poll_interval == 0 {
            return Err(invalid("sync.poll_interval", "must be at least 1 second"));
        }

        let twitter = &self.twitter;
        let suffix_len = self.sync.continuation_suffix.chars().count();
        if twitter.soft_limit == 0 || twitter.soft_limit + suffix_len > twitter.hard_limit {
            return Err(invalid(
                "twitter.soft_limit",
                &format!(
                    "soft limit plus continuation suffix must fit within hard_limit ({})",
                    twitter.hard_limit
                ),
            ));
        }

        if self.content.cw_passthrough && !self.content.cw_prefix.contains("{}") {
            return Err(invalid(
                "content.cw_prefix",
                "must contain a {} placeholder for the warning text",
            ));
        }

        if self.content.cw_detection {
            let pattern = Regex::new(&self.content.cw_pattern)
                .map_err(|e| invalid("content.cw_pattern", &e.to_string()))?;
            if pattern.captures_len() < 2 {
                return Err(invalid(
                    "content.cw_pattern",
                    "must capture the warning text in a group",
                ));
            }
        }

        Ok(())
    }

    /// Path of the correlation table, with `~` and variables expanded
    pub fn state_path(&self) -> Result<PathBuf> {
        expand_path("sync.state_file", &self.sync.state_file)
    }

    /// Directory for staging media downloads, if configured
    pub fn media_dir(&self) -> Result<Option<PathBuf>> {
        self.sync
            .media_dir
            .as_deref()
            .map(|dir| expand_path("sync.media_dir", dir))
            .transpose()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.sync.poll_interval)
    }
}

fn invalid(field: &str, reason: &str) -> crate::error::MirrorcastError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
    .into()
}

fn expand_path(field: &str, path: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(path).map_err(|e| invalid(field, &e.to_string()))?;
    Ok(PathBuf::from(expanded.as_ref()))
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("MIRRORCAST_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("mirrorcast").join("config.toml"))
}
