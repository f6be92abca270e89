//! WatchSync - Terminal client
//!
//! Joins a watch session and drives a simulated player from stdin, standing
//! in for a browser page with a video element.
//!
//! Usage:
//!   watchsync --server http://127.0.0.1:8080 --username alice --file movie.mp4
//!   then type `play`, `pause`, `seek 42.5`, `status` or `quit`

mod console;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use watchsync_core::onboarding::{validate_media_file, validate_server_url, validate_username};
use watchsync_core::player::notification_channel;
use watchsync_core::{SessionClient, SimulatedPlayer, SyncConfig, SyncSession};

/// How often the simulated player checks for end of stream
const END_CHECK_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Parser, Debug)]
#[command(name = "watchsync", about = "Watch a video in sync with other people")]
struct Cli {
    /// Session server base URL
    #[arg(long, env = "WATCHSYNC_SERVER")]
    server: String,

    #[arg(long, env = "WATCHSYNC_USERNAME")]
    username: String,

    /// Video file to watch (.mp4, .ogg or .webm)
    #[arg(long)]
    file: PathBuf,

    /// Length of the simulated video in seconds
    #[arg(long, default_value_t = 100.0)]
    duration: f64,

    #[arg(long, default_value_t = 3000)]
    poll_interval_ms: u64,
}

const DEFAULT_LOG_FILTER: &str = "watchsync_core=debug,reqwest=off,hyper=off,hyper_util=off";

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let cli = Cli::parse();

    // Same order as the page: server, username, file
    let server = validate_server_url(&cli.server)?;
    let username = validate_username(&cli.username)?;
    validate_media_file(&cli.file)?;

    let config = SyncConfig::new(server)
        .with_poll_interval(Duration::from_millis(cli.poll_interval_ms));
    let client = SessionClient::from_config(&config)?;

    let (notifier, events) = notification_channel();
    let mut player = SimulatedPlayer::new(cli.duration, notifier);
    info!("Loaded {} ({:.0}s)", cli.file.display(), player.duration());

    let (session, handle) = SyncSession::new(
        &config,
        client,
        player.clone(),
        events,
        Arc::new(console::ConsoleObserver),
    );
    let session_task = tokio::spawn(session.run());

    if let Err(e) = handle.join(username).await {
        let message = console::join_failure(&config.server_url, &e);
        handle.leave().await;
        session_task.await?;
        return Err(message.into());
    }
    println!("{}", console::HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut end_check = tokio::time::interval(END_CHECK_INTERVAL);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            _ = end_check.tick() => player.refresh(),
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                match console::parse_command(&line) {
                    Ok(Some(command)) => {
                        if !console::apply(command, &mut player) {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => eprintln!("{}", e),
                }
            }
        }
    }

    // The page's unload hook: tell the server we are gone
    handle.leave().await;
    session_task.await?;
    Ok(())
}
