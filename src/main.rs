use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::PathBuf;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use logsync::{
    Config, ConfigLoader, FetchOutcome, HttpLogSource, LogScope, LogSession, LogSource,
    MemoryLogSource, Severity, StdoutViewer,
};

/// Follows a master or trial log: recent tail first, then new lines as they
/// arrive, with optional paging into older history.
#[derive(Parser)]
#[command(name = "logsync")]
#[command(about = "Follow a master or trial log from both ends", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Subcommand)]
enum Command {
    /// Follow the master log
    Master {
        /// Master base URL, overrides the config file
        #[arg(long)]
        url: Option<String>,
    },
    /// Follow the log of one trial
    Trial {
        id: u64,

        /// Master base URL, overrides the config file
        #[arg(long)]
        url: Option<String>,
    },
    /// Follow a synthetic in-process log
    Demo {
        /// Records already in the log before following starts
        #[arg(long, default_value_t = 2500)]
        backlog: usize,

        /// Milliseconds between producer bursts
        #[arg(long, default_value_t = 300)]
        produce_ms: u64,
    },
}

#[derive(Args)]
struct CommonArgs {
    /// Config file (default: <config dir>/logsync/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Tail size: records per page
    #[arg(long, global = true)]
    tail: Option<usize>,

    /// Poll interval in milliseconds
    #[arg(long, global = true)]
    poll_ms: Option<u64>,

    /// Older pages to load after the tail
    #[arg(long, global = true, default_value_t = 0)]
    history: usize,

    /// Stop after this many seconds instead of waiting for Ctrl+C
    #[arg(long, global = true)]
    duration_secs: Option<u64>,

    /// Log level
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // stdout carries the log lines being followed
    tracing_subscriber::fmt()
        .with_env_filter(cli.common.log_level.as_str())
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(&cli.common)?;
    debug!(?config, "configuration loaded");

    match cli.command {
        Command::Master { url } => {
            let source = http_source(&config, url)?;
            follow(source, LogScope::Master, &config, &cli.common).await
        }
        Command::Trial { id, url } => {
            let source = http_source(&config, url)?;
            follow(source, LogScope::Trial(id), &config, &cli.common).await
        }
        Command::Demo { backlog, produce_ms } => {
            let source = MemoryLogSource::new();
            source.append_many(LogScope::Master, backlog);
            let producer = spawn_producer(source.clone(), Duration::from_millis(produce_ms.max(1)));
            let result = follow(source, LogScope::Master, &config, &cli.common).await;
            producer.abort();
            result
        }
    }
}

fn load_config(args: &CommonArgs) -> Result<Config> {
    let loader = match &args.config {
        Some(path) => ConfigLoader::with_path(path),
        None => ConfigLoader::new(),
    };
    let mut config = loader.load_or_default()?;
    if let Some(tail) = args.tail {
        config.sync.page_size = tail;
    }
    if let Some(poll_ms) = args.poll_ms {
        config.sync.poll_interval_ms = poll_ms;
    }
    config.validate()?;
    Ok(config)
}

fn http_source(config: &Config, url: Option<String>) -> Result<HttpLogSource> {
    let mut source_config = config.source.clone();
    if let Some(url) = url {
        source_config.base_url = url;
    }
    source_config.validate()?;
    let source = HttpLogSource::new(&source_config)?;
    info!("Following {}", source.base_url());
    Ok(source)
}

async fn follow<S: LogSource>(
    source: S,
    scope: LogScope,
    config: &Config,
    args: &CommonArgs,
) -> Result<()> {
    let session = LogSession::new(source, StdoutViewer::new(), scope, config.sync.clone())?;

    if let Err(e) = session.load_initial().await {
        warn!("Initial load failed: {}", e);
    }
    load_history(&session, args.history).await;
    session.start();

    let deadline = async {
        match args.duration_secs {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending().await,
        }
    };
    tokio::select! {
        _ = deadline => info!("Duration elapsed, stopping"),
        _ = tokio::signal::ctrl_c() => info!("Received Ctrl+C, stopping"),
        _ = stdout_closed(session.viewer()) => warn!("Stdout closed, stopping"),
    }

    session.stop().await;
    let stats = session.stats();
    info!(window = %session.window(), "Session summary: {}", serde_json::to_string(&stats)?);
    Ok(())
}

async fn stdout_closed(viewer: &StdoutViewer) {
    let mut check = tokio::time::interval(Duration::from_millis(250));
    while !viewer.is_closed() {
        check.tick().await;
    }
}

/// The terminal's scroll-to-top: pages backwards until `pages` were loaded
/// or the start of the log is reached.
async fn load_history<S: LogSource>(session: &LogSession<S, StdoutViewer>, pages: usize) {
    for _ in 0..pages {
        let window = session.window();
        if !window.is_initialized() || window.min == 0 {
            break;
        }
        match session.load_older(window.min).await {
            Ok(outcome) if outcome.is_accepted() => {}
            Ok(FetchOutcome::Skipped(reason)) => {
                debug!(?reason, "history paging stopped");
                break;
            }
            Ok(outcome) => {
                debug!(?outcome, "no older records");
                break;
            }
            Err(e) => {
                warn!("History fetch failed: {}", e);
                break;
            }
        }
    }
}

fn spawn_producer(source: MemoryLogSource, every: Duration) -> JoinHandle<()> {
    const LEVELS: [Severity; 4] = [Severity::Debug, Severity::Info, Severity::Warn, Severity::Error];

    tokio::spawn(async move {
        let mut rng = StdRng::from_os_rng();
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            for _ in 0..rng.random_range(0..4) {
                let level = LEVELS[rng.random_range(0..LEVELS.len())];
                let step = rng.random_range(1..10_000u32);
                source.append(LogScope::Master, level, format!("demo step {} done", step));
            }
        }
    })
}
