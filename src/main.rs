use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use ratewarden::capture::KeyExtractor;
use ratewarden::config::{LoggingConfig, WardenConfig};
use ratewarden::metrics::StatsdClient;
use ratewarden::ratelimit::RateLimiter;

/// Rate limit keys read line by line from stdin.
#[derive(Parser, Debug)]
#[command(name = "ratewarden", version, about)]
struct Cli {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Maximum events per key inside the window
    #[arg(long)]
    limit: Option<u64>,

    /// Window length in milliseconds
    #[arg(long)]
    window_ms: Option<u64>,

    /// Interval between background sweeps in milliseconds
    #[arg(long)]
    sweep_ms: Option<u64>,

    /// Regex used to pull the key out of each line
    #[arg(long)]
    pattern: Option<String>,

    /// Capture group of --pattern holding the key
    #[arg(long, default_value_t = 1)]
    group: usize,

    /// Print verdicts as JSON lines
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Serialize)]
struct Verdict<'a> {
    key: &'a str,
    allowed: bool,
}

#[derive(Debug, Default, Serialize)]
struct Summary {
    lines: u64,
    skipped: u64,
    allowed: u64,
    denied: u64,
    live_keys: usize,
}

impl Summary {
    fn record_skip(&mut self) {
        self.lines += 1;
        self.skipped += 1;
    }

    fn record_verdict(&mut self, denied: bool) {
        self.lines += 1;
        if denied {
            self.denied += 1;
        } else {
            self.allowed += 1;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = WardenConfig::load(cli.config.as_deref())?;
    if let Some(limit) = cli.limit {
        config.limiter.limit = limit;
    }
    if let Some(window_ms) = cli.window_ms {
        config.limiter.window_ms = window_ms;
    }
    if let Some(sweep_ms) = cli.sweep_ms {
        config.limiter.sweep_interval_ms = sweep_ms;
    }
    config.validate()?;

    init_tracing(&config.logging);

    info!("Starting Ratewarden");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let extractor = KeyExtractor::new(cli.pattern.as_deref(), cli.group)?;

    let limiter = RateLimiter::new(config.limiter.limit, config.limiter.window());
    limiter.start(config.limiter.sweep_interval());
    info!(
        limit = config.limiter.limit,
        window_ms = config.limiter.window_ms,
        sweep_interval_ms = config.limiter.sweep_interval_ms,
        "Rate limiter initialized"
    );

    let metrics = match config.metrics.clone() {
        Some(statsd) => match StatsdClient::connect(statsd).await {
            Ok(client) => Some(client),
            Err(e) => {
                warn!(error = %e, "StatsD unavailable, metrics disabled");
                None
            }
        },
        None => None,
    };

    // Counters live out here so a shutdown signal does not discard them
    // along with the cancelled reader.
    let mut summary = Summary::default();
    let started = tokio::time::Instant::now();
    tokio::select! {
        result = process_stdin(&limiter, &extractor, metrics.as_ref(), cli.json, &mut summary) => result?,
        _ = shutdown_signal() => {
            info!("Received shutdown signal");
        }
    }
    summary.live_keys = limiter.size();

    limiter.stop().await;
    if let Some(client) = metrics {
        client.time("run.duration", elapsed_ms(started.elapsed()));
        client.gauge("limiter.keys", summary.live_keys as i64);
        client.close().await;
    }

    info!(
        lines = summary.lines,
        skipped = summary.skipped,
        allowed = summary.allowed,
        denied = summary.denied,
        live_keys = summary.live_keys,
        "Ratewarden stopped"
    );
    if cli.json {
        println!("{}", serde_json::to_string(&summary)?);
    }
    Ok(())
}

async fn process_stdin(
    limiter: &RateLimiter,
    extractor: &KeyExtractor,
    metrics: Option<&StatsdClient>,
    json: bool,
    summary: &mut Summary,
) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let Some(key) = extractor.extract(&line) else {
            debug!(line = %line, "No key in line, skipping");
            summary.record_skip();
            continue;
        };

        let denied = limiter.check(&key);
        summary.record_verdict(denied);

        if let Some(client) = metrics {
            let name = if denied { "requests.denied" } else { "requests.allowed" };
            client.count(name, 1);
        }

        if json {
            let verdict = Verdict { key: &key, allowed: !denied };
            println!("{}", serde_json::to_string(&verdict)?);
        } else {
            println!("{} {}", if denied { "DENY" } else { "ALLOW" }, key);
        }
    }

    Ok(())
}

fn elapsed_ms(elapsed: Duration) -> i64 {
    i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX)
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    if logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(true)
            .with_writer(std::io::stderr)
            .init();
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
