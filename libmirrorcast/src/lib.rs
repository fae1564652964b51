//! Mirrorcast - keep a Mastodon account and a Twitter account in step
//!
//! This library provides the pieces of a two-way post mirror: platform
//! clients, text conversion and splitting, media relay, the correlation
//! table used for threading, and the sync loop tying them together.

pub mod config;
pub mod correlation;
pub mod error;
pub mod logging;
pub mod media;
pub mod platforms;
pub mod sync;
pub mod text;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use correlation::CorrelationTable;
pub use error::{MirrorcastError, PlatformError, Result};
pub use platforms::Platform;
pub use sync::{CycleReport, Direction, Shutdown, SyncEngine};
pub use types::{Attachment, Post, Submission, Visibility};
