//! mirror-sync - Mirror posts between Mastodon and Twitter
//!
//! Polls both accounts and reposts new posts on the other platform,
//! keeping threads intact on both sides.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use libmirrorcast::logging::{LogFormat, LoggingConfig};
use libmirrorcast::{Config, Result, Shutdown, SyncEngine};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "mirror-sync")]
#[command(version)]
#[command(about = "Mirror posts between a Mastodon and a Twitter account")]
#[command(long_about = "\
mirror-sync - Mirror posts between a Mastodon and a Twitter account

DESCRIPTION:
    mirror-sync is a long-running daemon that watches one Mastodon account
    and one Twitter account and reposts everything new on the other side.

    Long posts are split into threads, content warnings are carried over,
    media is re-uploaded, and replies stay threaded as long as the post
    they answer was mirrored too. Boosts, retweets and replies to other
    people's conversations are left alone.

    Only posts made after startup are mirrored.

USAGE:
    # Run in foreground (logs to stderr)
    mirror-sync

    # Use a specific configuration file and poll every minute
    mirror-sync --config ./mirrorcast.toml --poll-interval 1m

    # Check configuration and credentials with a single cycle
    mirror-sync --once --verbose

SIGNALS:
    SIGTERM, SIGINT - Graceful shutdown (finishes the current post)

CONFIGURATION:
    Configuration file: ~/.config/mirrorcast/config.toml
    State file: ~/.local/share/mirrorcast/status_associations.json

    [mastodon]
    instance = \"mastodon.social\"
    token_file = \"~/.config/mirrorcast/mastodon.token\"

    [twitter]
    token_file = \"~/.config/mirrorcast/twitter.token\"

    [sync]
    poll_interval = 30  # seconds between polls

EXIT CODES:
    0 - Clean shutdown
    1 - Runtime error
    2 - Configuration or authentication error
    3 - Invalid input (e.g. signal handlers could not be installed)
")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, value_name = "PATH", env = "MIRRORCAST_CONFIG")]
    config: Option<PathBuf>,

    /// Time between polls (overrides config)
    #[arg(long, value_name = "DURATION", value_parser = humantime::parse_duration)]
    #[arg(help = "How often to poll both accounts, e.g. 30s or 2m (default: 30s)")]
    poll_interval: Option<Duration>,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    verbose: bool,

    /// Log output format: text, json or pretty
    #[arg(long, value_name = "FORMAT")]
    log_format: Option<LogFormat>,

    /// Run a single cycle and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    LoggingConfig::from_env(cli.log_format, cli.verbose).init();

    if let Err(e) = run(cli).await {
        error!("{}", e);
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };

    if let Some(interval) = cli.poll_interval {
        config.sync.poll_interval = interval.as_secs().max(1);
    }
    info!("Poll interval: {}s", config.sync.poll_interval);

    let shutdown = Shutdown::new();
    setup_signal_handlers(&shutdown)?;

    info!("mirror-sync starting");
    let mut engine = SyncEngine::from_config(config, shutdown)?;

    if cli.once {
        let report = engine.run_cycle().await?;
        info!(
            mirrored = report.mirrored,
            skipped = report.skipped,
            failed = report.failed,
            "mirror-sync: ran one cycle, exiting"
        );
    } else {
        engine.run().await?;
    }

    info!("mirror-sync stopped");
    Ok(())
}

/// Set up signal handlers for graceful shutdown
#[cfg(unix)]
fn setup_signal_handlers(shutdown: &Shutdown) -> Result<()> {
    use libmirrorcast::MirrorcastError;
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM])
        .map_err(|e| MirrorcastError::InvalidInput(format!("Signal setup failed: {}", e)))?;

    let shutdown = shutdown.clone();
    std::thread::spawn(move || {
        if signals.forever().next().is_some() {
            info!("Received shutdown signal, stopping gracefully...");
            shutdown.trigger();
        }
    });

    Ok(())
}

#[cfg(not(unix))]
fn setup_signal_handlers(shutdown: &Shutdown) -> Result<()> {
    let shutdown = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl-C, stopping gracefully...");
            shutdown.trigger();
        }
    });
    Ok(())
}
