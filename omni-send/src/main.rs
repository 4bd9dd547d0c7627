//! omni-send - Background daemon for dispatching scheduled posts
//!
//! Monitors the scheduled post queue and publishes due content to each
//! post's selected accounts at the scheduled time.

use clap::Parser;
use libomnicast::providers::ProviderRegistry;
use libomnicast::service::dispatch::DispatchService;
use libomnicast::service::events::EventBus;
use libomnicast::{Config, Database, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "omni-send")]
#[command(version)]
#[command(about = "Background daemon for dispatching scheduled posts")]
#[command(long_about = "\
omni-send - Background daemon for dispatching scheduled posts

DESCRIPTION:
    omni-send is a long-running daemon that polls the Omnicast database at
    regular intervals, finds posts whose scheduled time has arrived, and
    dispatches each one to its selected accounts. Every platform attempt is
    independent; a post ends up `published` only when all of them succeed,
    otherwise `error` with a per-platform breakdown for manual re-triggering.

USAGE:
    # Run in foreground (logs to stderr)
    omni-send

    # Run with custom poll interval
    omni-send --poll-interval 30

    # Process due posts once and exit
    omni-send --once

SIGNALS:
    SIGTERM, SIGINT - Graceful shutdown (finishes the current cycle)

CONFIGURATION:
    Configuration file: ~/.config/omnicast/config.toml
    Database location:  ~/.local/share/omnicast/omnicast.db

EXIT CODES:
    0 - Clean shutdown
    1 - Runtime error
    2 - Configuration error
")]
struct Cli {
    /// Poll interval in seconds (overrides config)
    #[arg(long, value_name = "SECONDS")]
    #[arg(help = "How often to check for due posts (default: from config)")]
    poll_interval: Option<u64>,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    verbose: bool,

    /// Run once and exit (for testing)
    #[arg(long)]
    #[arg(help = "Process due posts once and exit")]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let config = Config::load()?;
    let db = Arc::new(Database::new(&config.database.path).await?);
    let registry = Arc::new(ProviderRegistry::from_config(&config)?);
    let dispatcher = DispatchService::new(db, registry, EventBus::new(100));

    info!("omni-send daemon starting");

    let shutdown = Arc::new(AtomicBool::new(false));
    setup_signal_handlers(shutdown.clone())?;

    let poll_interval = cli.poll_interval.unwrap_or(config.scheduling.poll_interval);
    info!("Poll interval: {}s", poll_interval);

    if cli.once {
        let dispatched = dispatcher.dispatch_due().await?;
        info!("omni-send: dispatched {} post(s), exiting", dispatched);
    } else {
        run_daemon_loop(&dispatcher, poll_interval, shutdown).await;
    }

    info!("omni-send daemon stopped");
    Ok(())
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Set up signal handlers for graceful shutdown
fn setup_signal_handlers(shutdown: Arc<AtomicBool>) -> Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM]).map_err(|e| {
        libomnicast::OmnicastError::InvalidInput(format!("Signal setup failed: {}", e))
    })?;

    let shutdown_clone = shutdown.clone();
    std::thread::spawn(move || {
        for sig in signals.forever() {
            match sig {
                SIGTERM | SIGINT => {
                    info!("Received shutdown signal, stopping gracefully...");
                    shutdown_clone.store(true, Ordering::Relaxed);
                    break;
                }
                _ => {}
            }
        }
    });

    Ok(())
}

/// Main daemon loop
async fn run_daemon_loop(
    dispatcher: &DispatchService,
    poll_interval: u64,
    shutdown: Arc<AtomicBool>,
) {
    loop {
        if shutdown.load(Ordering::Relaxed) {
            info!("Shutdown requested, stopping daemon loop");
            break;
        }

        match dispatcher.dispatch_due().await {
            Ok(0) => {}
            Ok(n) => info!("Dispatched {} post(s)", n),
            Err(e) => error!("Error dispatching posts: {}", e),
        }

        // Sleep until the next poll, checking for shutdown every second.
        for _ in 0..poll_interval {
            if shutdown.load(Ordering::Relaxed) {
                break;
            }
            sleep(Duration::from_secs(1)).await;
        }
    }
}
