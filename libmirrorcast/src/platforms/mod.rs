//! Platform abstraction and implementations
//!
//! The sync engine only ever talks to a platform through [`Platform`]: fetch
//! the account's own timeline since an id, submit a post, upload a media file.
//! Mastodon goes through megalodon, Twitter through plain HTTP.
//!
//! # Examples
//!
//! ```no_run
//! use libmirrorcast::platforms::{Platform, mastodon::MastodonClient};
//! use libmirrorcast::types::Submission;
//!
//! # async fn example() -> libmirrorcast::error::Result<()> {
//! let client = MastodonClient::new(
//!     "https://social.example".to_string(),
//!     "token".to_string(),
//! )?;
//!
//! let me = client.fetch_account_id().await?;
//! let recent = client.fetch_timeline(&me, None).await?;
//! println!("{} recent posts", recent.len());
//!
//! let id = client.submit(&Submission::new("Hello from the mirror")).await?;
//! println!("Posted: {}", id);
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use async_trait::async_trait;

use crate::error::{PlatformError, Result};
use crate::types::{PlatformLimits, Post, Submission};

pub mod mastodon;
pub mod twitter;

// Available outside tests so integration tests can drive the sync engine
pub mod mock;

/// One side of the mirror
#[async_trait]
pub trait Platform: Send + Sync {
    /// Lowercase identifier used in logs ("mastodon", "twitter")
    fn name(&self) -> &str;

    /// Id of the authenticated account
    ///
    /// # Errors
    ///
    /// Returns `PlatformError::Authentication` when the credentials are rejected.
    async fn fetch_account_id(&self) -> Result<String>;

    /// Posts authored by `account_id`, newest first
    ///
    /// With `since_id` only posts newer than that id are returned; without it
    /// the platform's default page of recent posts.
    async fn fetch_timeline(&self, account_id: &str, since_id: Option<&str>) -> Result<Vec<Post>>;

    /// Publish a post and return its id
    ///
    /// # Errors
    ///
    /// - `PlatformError::ReplyTargetGone` if `reply_to` no longer exists
    /// - `PlatformError::Network` / `PlatformError::RateLimit` for transient failures
    /// - `PlatformError::Posting` / `PlatformError::Validation` for rejected content
    async fn submit(&self, submission: &Submission) -> Result<String>;

    /// Upload a local media file and return the handle to attach it with
    async fn upload_media(&self, path: &Path) -> Result<String>;

    /// Current length limits as reported by the platform
    ///
    /// Platforms that cannot report limits keep their configured values.
    async fn fetch_limits(&self) -> Result<PlatformLimits> {
        Err(PlatformError::NotImplemented(format!(
            "{} does not report length limits",
            self.name()
        ))
        .into())
    }
}
