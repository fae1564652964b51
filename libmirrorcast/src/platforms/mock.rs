//! Mock platform implementation for testing
//!
//! A configurable in-memory platform that can simulate timelines, failures,
//! and delays. It's designed for integration tests that drive the sync engine
//! end to end without credentials or network access.
//!
//! Clones share state, so a test can keep one handle for assertions while the
//! engine owns another.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

use crate::error::{PlatformError, Result};
use crate::platforms::Platform;
use crate::types::{id_is_newer, PlatformLimits, Post, Submission};

/// Configuration for mock platform behavior
#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Platform name (e.g., "mock-mastodon", "mock-twitter")
    pub name: String,

    /// Id returned by `fetch_account_id`
    pub account_id: String,

    /// Ids handed out by `submit` count up from here
    pub first_post_id: u64,

    /// Error to return from `fetch_account_id`
    pub auth_error: Option<String>,

    /// Delay before completing operations (simulates network latency)
    pub delay: Duration,

    /// Limits reported by `fetch_limits`; `None` keeps configured values
    pub limits: Option<PlatformLimits>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            name: "mock".to_string(),
            account_id: "mock-account".to_string(),
            first_post_id: 1000,
            auth_error: None,
            delay: Duration::from_millis(0),
            limits: None,
        }
    }
}

/// A media upload as seen by the platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRecord {
    pub path: PathBuf,
    /// Whether the file was present when the upload ran
    pub existed: bool,
    pub extension: Option<String>,
    pub size: u64,
}

#[derive(Debug, Default)]
struct MockState {
    /// Newest first
    timeline: Vec<Post>,
    next_id: u64,
    submissions: Vec<Submission>,
    submit_calls: usize,
    submit_failures: VecDeque<PlatformError>,
    /// Keyed by 1-based call number
    scheduled_failures: HashMap<usize, PlatformError>,
    uploads: Vec<UploadRecord>,
    upload_error: Option<PlatformError>,
}

/// Mock platform for testing
#[derive(Debug, Clone)]
pub struct MockPlatform {
    config: MockConfig,
    state: Arc<Mutex<MockState>>,
}

impl MockPlatform {
    /// Create a new mock platform with the given configuration
    pub fn new(config: MockConfig) -> Self {
        let state = MockState {
            next_id: config.first_post_id,
            ..Default::default()
        };
        Self {
            config,
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Create a mock platform that always succeeds
    pub fn success(name: &str) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            ..Default::default()
        })
    }

    /// Create a mock platform whose credentials are rejected
    pub fn auth_failure(name: &str, error: &str) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            auth_error: Some(error.to_string()),
            ..Default::default()
        })
    }

    /// Create a mock platform with a delay
    pub fn with_delay(name: &str, delay: Duration) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            delay,
            ..Default::default()
        })
    }

    /// Add a post to the timeline as the newest entry
    pub fn push_post(&self, post: Post) {
        self.state.lock().unwrap().timeline.insert(0, post);
    }

    /// Make the next `submit` call fail with `error`
    ///
    /// Queued failures are consumed in order, one per call.
    pub fn fail_next_submit(&self, error: PlatformError) {
        self.state.lock().unwrap().submit_failures.push_back(error);
    }

    /// Make the `call`-th `submit` call (counting from 1) fail with `error`
    pub fn fail_submit_call(&self, call: usize, error: PlatformError) {
        self.state
            .lock()
            .unwrap()
            .scheduled_failures
            .insert(call, error);
    }

    /// Make every `upload_media` call fail with `error`
    pub fn fail_uploads(&self, error: PlatformError) {
        self.state.lock().unwrap().upload_error = Some(error);
    }

    /// Successful submissions, oldest first
    pub fn submissions(&self) -> Vec<Submission> {
        self.state.lock().unwrap().submissions.clone()
    }

    /// Number of times submit was called, including failures
    pub fn submit_call_count(&self) -> usize {
        self.state.lock().unwrap().submit_calls
    }

    pub fn uploads(&self) -> Vec<UploadRecord> {
        self.state.lock().unwrap().uploads.clone()
    }

    /// Current timeline, newest first
    pub fn timeline(&self) -> Vec<Post> {
        self.state.lock().unwrap().timeline.clone()
    }

    async fn simulate_latency(&self) {
        if !self.config.delay.is_zero() {
            sleep(self.config.delay).await;
        }
    }
}

#[async_trait]
impl Platform for MockPlatform {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn fetch_account_id(&self) -> Result<String> {
        self.simulate_latency().await;

        match &self.config.auth_error {
            Some(error) => Err(PlatformError::Authentication(error.clone()).into()),
            None => Ok(self.config.account_id.clone()),
        }
    }

    async fn fetch_timeline(&self, _account_id: &str, since_id: Option<&str>) -> Result<Vec<Post>> {
        self.simulate_latency().await;

        let state = self.state.lock().unwrap();
        let posts = state
            .timeline
            .iter()
            .filter(|post| since_id.map_or(true, |since| id_is_newer(&post.id, since)))
            .cloned()
            .collect();
        Ok(posts)
    }

    async fn submit(&self, submission: &Submission) -> Result<String> {
        self.simulate_latency().await;

        let mut state = self.state.lock().unwrap();
        state.submit_calls += 1;

        let call = state.submit_calls;
        if let Some(error) = state.scheduled_failures.remove(&call) {
            return Err(error.into());
        }
        if let Some(error) = state.submit_failures.pop_front() {
            return Err(error.into());
        }

        let id = state.next_id.to_string();
        state.next_id += 1;
        state.submissions.push(submission.clone());

        // Our own posts show up on our own timeline, like on a real account
        let mut post = Post::new(id.clone(), submission.text.clone());
        post.in_reply_to_id = submission.reply_to.clone();
        post.in_reply_to_account_id = submission
            .reply_to
            .as_ref()
            .map(|_| self.config.account_id.clone());
        post.content_warning = submission.content_warning.clone();
        post.visibility = submission.visibility;
        post.sensitive = submission.sensitive;
        state.timeline.insert(0, post);

        Ok(id)
    }

    async fn upload_media(&self, path: &Path) -> Result<String> {
        self.simulate_latency().await;

        let record = UploadRecord {
            path: path.to_path_buf(),
            existed: path.exists(),
            extension: path
                .extension()
                .map(|ext| ext.to_string_lossy().into_owned()),
            size: std::fs::metadata(path).map(|m| m.len()).unwrap_or(0),
        };

        let mut state = self.state.lock().unwrap();
        state.uploads.push(record);

        if let Some(error) = &state.upload_error {
            return Err(error.clone().into());
        }

        Ok(format!("{}-media-{}", self.config.name, state.uploads.len()))
    }

    async fn fetch_limits(&self) -> Result<PlatformLimits> {
        match &self.config.limits {
            Some(limits) => Ok(limits.clone()),
            None => Err(PlatformError::NotImplemented(format!(
                "{} does not report length limits",
                self.config.name
            ))
            .into()),
        }
    }
}
