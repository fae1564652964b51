//! Mirror loop
//!
//! [`SyncEngine`] polls both accounts, turns every new post into one or more
//! submissions on the other platform, and keeps the correlation table that
//! lets replies be threaded on both sides.
//!
//! Everything runs in sequence on one task. A post that fails is logged and
//! left behind; the batch goes on with the next one.

pub mod retry;
pub mod shutdown;

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::correlation::CorrelationTable;
use crate::error::{MirrorcastError, PlatformError, Result};
use crate::media::MediaRelay;
use crate::platforms::mastodon::MastodonClient;
use crate::platforms::twitter::TwitterClient;
use crate::platforms::Platform;
use crate::text::{
    split, twitter_reply_decision, Chunk, Normalizer, Outcome, ReplyDecision, SkipReason,
    SplitMode, SplitOptions,
};
use crate::types::{id_is_newer, Attachment, PlatformLimits, Post, Submission};

pub use retry::{retry, RetryPolicy};
pub use shutdown::Shutdown;

/// Mastodon's documented default until the instance reports its own
const MASTODON_DEFAULT_LIMIT: usize = 500;

/// Room kept below the hard limit for the continuation suffix
const SOFT_LIMIT_MARGIN: usize = 5;

/// Which way a post travels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    MastodonToTwitter,
    TwitterToMastodon,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MastodonToTwitter => write!(f, "mastodon → twitter"),
            Self::TwitterToMastodon => write!(f, "twitter → mastodon"),
        }
    }
}

/// Newest id seen on each account
///
/// Cursors only move forward. They live in memory; a restart starts from the
/// newest post again.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cursors {
    pub mastodon: Option<String>,
    pub twitter: Option<String>,
}

fn advance(cursor: &mut Option<String>, id: &str) {
    let newer = cursor.as_deref().map_or(true, |current| id_is_newer(id, current));
    if newer {
        *cursor = Some(id.to_string());
    }
}

/// Tally of one sync cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub mirrored: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl CycleReport {
    pub fn is_empty(&self) -> bool {
        self.mirrored == 0 && self.skipped == 0 && self.failed == 0
    }

    fn absorb(&mut self, other: CycleReport) {
        self.mirrored += other.mirrored;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

/// What became of one source post
#[derive(Debug)]
enum Delivery {
    Mirrored { posted: Vec<String> },
    Skipped(SkipReason),
    Failed { posted: Vec<String> },
}

/// A normalized post ready to be submitted
struct Plan {
    chunks: Vec<Chunk>,
    reply_to: Option<String>,
    /// Fields shared by every chunk
    template: Submission,
    /// Whether the chunk carrying media is flagged sensitive
    sensitive_media: bool,
}

/// Mirrors posts between one Mastodon and one Twitter account
pub struct SyncEngine {
    config: Config,
    mastodon: Box<dyn Platform>,
    twitter: Box<dyn Platform>,
    normalizer: Normalizer,
    relay: MediaRelay,
    table: CorrelationTable,
    state_path: PathBuf,
    cursors: Cursors,
    mastodon_account: Option<String>,
    twitter_account: Option<String>,
    mastodon_limits: PlatformLimits,
    twitter_limits: PlatformLimits,
    shutdown: Shutdown,
}

impl SyncEngine {
    /// Build an engine around two platform clients
    ///
    /// Loads the correlation table from the configured state file.
    pub fn new(
        config: Config,
        mastodon: Box<dyn Platform>,
        twitter: Box<dyn Platform>,
        shutdown: Shutdown,
    ) -> Result<Self> {
        let state_path = config.state_path()?;
        let table = CorrelationTable::load(&state_path)?;
        let normalizer = Normalizer::new(&config.content, &config.mastodon.instance_url())?;
        let relay = MediaRelay::new(config.media_dir()?)?;

        let mastodon_limits = PlatformLimits::new(
            MASTODON_DEFAULT_LIMIT,
            MASTODON_DEFAULT_LIMIT - SOFT_LIMIT_MARGIN,
            config.mastodon.short_url_length,
        );
        let twitter_limits = PlatformLimits::new(
            config.twitter.hard_limit,
            config.twitter.soft_limit,
            config.twitter.short_url_length,
        );

        info!(
            state_file = %state_path.display(),
            entries = table.len(),
            "sync engine ready"
        );

        Ok(Self {
            config,
            mastodon,
            twitter,
            normalizer,
            relay,
            table,
            state_path,
            cursors: Cursors::default(),
            mastodon_account: None,
            twitter_account: None,
            mastodon_limits,
            twitter_limits,
            shutdown,
        })
    }

    /// Build an engine talking to the real Mastodon and Twitter APIs
    pub fn from_config(config: Config, shutdown: Shutdown) -> Result<Self> {
        info!("Creating Mastodon platform client");
        let mastodon = MastodonClient::from_config(&config.mastodon)?;
        info!("Creating Twitter platform client");
        let twitter = TwitterClient::from_config(&config.twitter)?;

        Self::new(config, Box::new(mastodon), Box::new(twitter), shutdown)
    }

    pub fn cursors(&self) -> &Cursors {
        &self.cursors
    }

    pub fn table(&self) -> &CorrelationTable {
        &self.table
    }

    pub fn limits(&self, direction: Direction) -> &PlatformLimits {
        match direction {
            Direction::MastodonToTwitter => &self.twitter_limits,
            Direction::TwitterToMastodon => &self.mastodon_limits,
        }
    }

    fn mastodon_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.config.mastodon.retries,
            Duration::from_secs(self.config.mastodon.retry_delay),
        )
    }

    fn twitter_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.config.twitter.retries,
            Duration::from_secs(self.config.twitter.retry_delay),
        )
    }

    /// Resolve both accounts and start the cursors at their newest posts
    ///
    /// Nothing posted before this call is mirrored.
    pub async fn initialize(&mut self) -> Result<()> {
        let mastodon_policy = self.mastodon_policy();
        let twitter_policy = self.twitter_policy();
        let mastodon = self.mastodon.as_ref();
        let twitter = self.twitter.as_ref();

        let mastodon_account = retry(mastodon_policy, &self.shutdown, "verify Mastodon credentials", || {
            mastodon.fetch_account_id()
        })
        .await?;
        let twitter_account = retry(twitter_policy, &self.shutdown, "verify Twitter credentials", || {
            twitter.fetch_account_id()
        })
        .await?;

        let latest_toots = retry(mastodon_policy, &self.shutdown, "fetch Mastodon timeline", || {
            mastodon.fetch_timeline(&mastodon_account, None)
        })
        .await?;
        let latest_tweets = retry(twitter_policy, &self.shutdown, "fetch Twitter timeline", || {
            twitter.fetch_timeline(&twitter_account, None)
        })
        .await?;

        if let Some(newest) = latest_toots.first() {
            advance(&mut self.cursors.mastodon, &newest.id);
        }
        if let Some(newest) = latest_tweets.first() {
            advance(&mut self.cursors.twitter, &newest.id);
        }

        info!(
            mastodon_account = %mastodon_account,
            twitter_account = %twitter_account,
            mastodon_cursor = ?self.cursors.mastodon,
            twitter_cursor = ?self.cursors.twitter,
            "authenticated on both platforms"
        );

        self.mastodon_account = Some(mastodon_account);
        self.twitter_account = Some(twitter_account);
        Ok(())
    }

    /// Refresh destination limits that are older than a day
    pub async fn refresh_limits(&mut self) {
        let now = Utc::now();

        if self.config.sync.post_to_twitter && self.twitter_limits.is_stale(now) {
            self.twitter_limits = refreshed(self.twitter.as_ref(), &self.twitter_limits).await;
        }
        if self.config.sync.post_to_mastodon && self.mastodon_limits.is_stale(now) {
            self.mastodon_limits = refreshed(self.mastodon.as_ref(), &self.mastodon_limits).await;
        }
    }

    /// Run one pass over both enabled directions
    ///
    /// Per-post failures are counted, not returned. An error means a whole
    /// direction could not be polled; the other direction still runs and
    /// the table is still saved.
    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        if self.mastodon_account.is_none() || self.twitter_account.is_none() {
            self.initialize().await?;
        }

        self.refresh_limits().await;

        let mut report = CycleReport::default();
        let mut first_error = None;

        let directions = [
            (Direction::MastodonToTwitter, self.config.sync.post_to_twitter),
            (Direction::TwitterToMastodon, self.config.sync.post_to_mastodon),
        ];
        for (direction, enabled) in directions {
            if !enabled || self.shutdown.is_triggered() {
                continue;
            }
            match self.mirror_direction(direction).await {
                Ok(partial) => report.absorb(partial),
                Err(e) => {
                    warn!(direction = %direction, error = %e, "polling failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        if let Err(e) = self.table.save(&self.state_path) {
            warn!(error = %e, "failed to save correlation table, will retry next cycle");
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    /// Cycle until shutdown is requested
    ///
    /// Only fatal errors (bad credentials, bad configuration) end the loop
    /// early; everything else waits for the next cycle.
    pub async fn run(&mut self) -> Result<()> {
        let interval = self.config.poll_interval();
        info!(interval = ?interval, "starting sync loop");

        loop {
            if self.shutdown.is_triggered() {
                break;
            }

            match self.run_cycle().await {
                Ok(report) if report.is_empty() => debug!("nothing new"),
                Ok(report) => info!(
                    mirrored = report.mirrored,
                    skipped = report.skipped,
                    failed = report.failed,
                    "sync cycle complete"
                ),
                Err(e) if e.is_fatal() => {
                    error!(error = %e, "stopping sync loop");
                    return Err(e);
                }
                Err(e) => error!(error = %e, "sync cycle failed"),
            }

            if !self.shutdown.sleep(interval).await {
                break;
            }
        }

        info!("Shutdown requested, sync loop stopped");
        Ok(())
    }

    async fn mirror_direction(&mut self, direction: Direction) -> Result<CycleReport> {
        let (source, account, since, policy) = match direction {
            Direction::MastodonToTwitter => (
                self.mastodon.as_ref(),
                self.mastodon_account.clone(),
                self.cursors.mastodon.clone(),
                self.mastodon_policy(),
            ),
            Direction::TwitterToMastodon => (
                self.twitter.as_ref(),
                self.twitter_account.clone(),
                self.cursors.twitter.clone(),
                self.twitter_policy(),
            ),
        };
        let account = account.ok_or_else(|| {
            MirrorcastError::InvalidInput(format!("{} account is not initialized", source.name()))
        })?;

        let operation = format!("fetch {} timeline", source.name());
        let posts = retry(policy, &self.shutdown, &operation, || {
            source.fetch_timeline(&account, since.as_deref())
        })
        .await?;

        let mut report = CycleReport::default();
        let Some(newest) = posts.first().map(|post| post.id.clone()) else {
            return Ok(report);
        };
        match direction {
            Direction::MastodonToTwitter => advance(&mut self.cursors.mastodon, &newest),
            Direction::TwitterToMastodon => advance(&mut self.cursors.twitter, &newest),
        }

        debug!(direction = %direction, count = posts.len(), "new posts");

        for post in posts.into_iter().rev() {
            if self.shutdown.is_triggered() {
                info!(direction = %direction, "Shutdown requested, leaving the rest of the batch");
                break;
            }
            // Servers are not required to honor since_id
            if let Some(since) = &since {
                if !id_is_newer(&post.id, since) {
                    continue;
                }
            }

            let source_id = post.id.clone();
            let delivery = self.mirror_post(direction, post).await;
            self.settle(direction, &source_id, delivery, &mut report);
        }

        Ok(report)
    }

    /// Book-keeping after a post was handled
    fn settle(
        &mut self,
        direction: Direction,
        source_id: &str,
        delivery: Delivery,
        report: &mut CycleReport,
    ) {
        let dest_cursor = match direction {
            Direction::MastodonToTwitter => &mut self.cursors.twitter,
            Direction::TwitterToMastodon => &mut self.cursors.mastodon,
        };

        match delivery {
            Delivery::Mirrored { posted } => {
                // Our own posts must not come back as new source posts
                for id in &posted {
                    advance(dest_cursor, id);
                }
                if let Some(last) = posted.last() {
                    match direction {
                        Direction::MastodonToTwitter => self.table.record(source_id, last.as_str()),
                        Direction::TwitterToMastodon => self.table.record(last.as_str(), source_id),
                    }
                    info!(direction = %direction, source = source_id, mirror = %last, chunks = posted.len(), "mirrored post");
                }
                report.mirrored += 1;
            }
            Delivery::Skipped(reason) => {
                info!(direction = %direction, source = source_id, "skipping post that {}", reason);
                report.skipped += 1;
            }
            Delivery::Failed { posted } => {
                for id in &posted {
                    advance(dest_cursor, id);
                }
                report.failed += 1;
            }
        }
    }

    async fn mirror_post(&self, direction: Direction, mut post: Post) -> Delivery {
        let plan = match direction {
            Direction::MastodonToTwitter => self.plan_toot(&post),
            Direction::TwitterToMastodon => self.plan_tweet(&post),
        };
        match plan {
            Ok(plan) => self.deliver(direction, &post.id, plan, &mut post.attachments).await,
            Err(reason) => Delivery::Skipped(reason),
        }
    }

    fn plan_toot(&self, post: &Post) -> std::result::Result<Plan, SkipReason> {
        let normalized = match self.normalizer.to_plain(post) {
            Outcome::Mirror(normalized) => normalized,
            Outcome::Skip(reason) => return Err(reason),
        };

        let mode = match (&post.permalink, self.config.sync.split_on_twitter) {
            (Some(permalink), false) => SplitMode::Truncate {
                permalink: permalink.clone(),
            },
            (None, false) => {
                debug!(post_id = %post.id, "no permalink to truncate with, splitting instead");
                SplitMode::Split
            }
            (_, true) => SplitMode::Split,
        };
        let chunks = split(&normalized.text, &split_options(&self.twitter_limits, mode));

        let reply_to = post
            .in_reply_to_id
            .as_deref()
            .and_then(|id| self.table.lookup_forward(id))
            .map(str::to_string);

        Ok(Plan {
            chunks,
            reply_to,
            template: Submission::default(),
            sensitive_media: post.sensitive,
        })
    }

    fn plan_tweet(&self, post: &Post) -> std::result::Result<Plan, SkipReason> {
        let normalized = match self.normalizer.to_markup(post) {
            Outcome::Mirror(normalized) => normalized,
            Outcome::Skip(reason) => return Err(reason),
        };

        let own_account = self.twitter_account.as_deref().unwrap_or_default();
        let reply_to = match twitter_reply_decision(post, own_account, &self.table) {
            ReplyDecision::Mirror { reply_to } => reply_to,
            ReplyDecision::Skip => return Err(SkipReason::UnthreadedReply),
        };

        let chunks = split(
            &normalized.text,
            &split_options(&self.mastodon_limits, SplitMode::Split),
        );

        Ok(Plan {
            chunks,
            reply_to,
            template: Submission {
                visibility: Some(self.config.mastodon.visibility),
                content_warning: normalized.content_warning,
                ..Default::default()
            },
            sensitive_media: post.sensitive,
        })
    }

    /// Relay media, then submit every chunk as a reply to the one before
    async fn deliver(
        &self,
        direction: Direction,
        source_id: &str,
        plan: Plan,
        attachments: &mut [Attachment],
    ) -> Delivery {
        let (dest, policy) = match direction {
            Direction::MastodonToTwitter => (self.twitter.as_ref(), self.twitter_policy()),
            Direction::TwitterToMastodon => (self.mastodon.as_ref(), self.mastodon_policy()),
        };

        let mut media_handles = Vec::with_capacity(attachments.len());
        for attachment in attachments.iter_mut() {
            let source: &Attachment = attachment;
            let relayed = retry(policy, &self.shutdown, "relay media", || {
                self.relay.relay(source, dest)
            })
            .await;
            match relayed {
                Ok(relayed) => {
                    relayed.apply_to(attachment);
                    media_handles.push(relayed.handle);
                }
                Err(e) => {
                    warn!(direction = %direction, source = source_id, error = %e, "giving up on post, media could not be relayed");
                    return Delivery::Failed { posted: Vec::new() };
                }
            }
        }

        let last_index = plan.chunks.len().saturating_sub(1);
        let suffix = &self.config.sync.continuation_suffix;
        let mut reply_to = plan.reply_to;
        let mut posted = Vec::with_capacity(plan.chunks.len());

        for chunk in &plan.chunks {
            let mut submission = plan.template.clone();
            submission.text = chunk.render(suffix);
            submission.reply_to = reply_to.clone();
            if chunk.index == last_index {
                submission.media_handles = std::mem::take(&mut media_handles);
                submission.sensitive = plan.sensitive_media && !submission.media_handles.is_empty();
            }

            debug!(
                direction = %direction,
                chunk = chunk.index + 1,
                of = plan.chunks.len(),
                reply_to = ?submission.reply_to,
                "submitting chunk"
            );

            match self.submit(dest, policy, submission).await {
                Ok(id) => {
                    reply_to = Some(id.clone());
                    posted.push(id);
                }
                Err(e) => {
                    warn!(
                        direction = %direction,
                        source = source_id,
                        chunk = chunk.index + 1,
                        error = %e,
                        "giving up on the rest of the post"
                    );
                    return Delivery::Failed { posted };
                }
            }
        }

        Delivery::Mirrored { posted }
    }

    /// Submit with retries; a vanished reply target drops the reply link
    async fn submit(
        &self,
        dest: &dyn Platform,
        policy: RetryPolicy,
        mut submission: Submission,
    ) -> Result<String> {
        let operation = format!("post to {}", dest.name());
        let result = retry(policy, &self.shutdown, &operation, || dest.submit(&submission)).await;

        match result {
            Err(MirrorcastError::Platform(PlatformError::ReplyTargetGone(reason)))
                if submission.reply_to.is_some() =>
            {
                warn!(
                    reply_to = ?submission.reply_to,
                    "Reply target is gone ({}), posting without it", reason
                );
                submission.reply_to = None;
                retry(policy, &self.shutdown, &operation, || dest.submit(&submission)).await
            }
            other => other,
        }
    }
}

fn split_options(limits: &PlatformLimits, mode: SplitMode) -> SplitOptions {
    SplitOptions {
        soft_limit: limits.soft_limit,
        hard_limit: limits.hard_limit,
        short_url_length: limits.short_url_length,
        mode,
    }
}

/// Ask `platform` for fresh limits, keeping `current` when it cannot say
async fn refreshed(platform: &dyn Platform, current: &PlatformLimits) -> PlatformLimits {
    match platform.fetch_limits().await {
        Ok(limits) => {
            info!(
                platform = platform.name(),
                hard_limit = limits.hard_limit,
                short_url_length = limits.short_url_length,
                "refreshed length limits"
            );
            limits
        }
        Err(MirrorcastError::Platform(PlatformError::NotImplemented(_))) => {
            debug!(platform = platform.name(), "platform does not report limits, keeping configured values");
            PlatformLimits {
                fetched_at: Some(Utc::now()),
                ..current.clone()
            }
        }
        Err(e) => {
            warn!(platform = platform.name(), error = %e, "could not refresh length limits, keeping previous values");
            current.clone()
        }
    }
}
