//! upwatchd — the upwatch daemon.
//!
//! Single binary that assembles the monitoring engine:
//! - Config (`upwatch.toml`) seeded into the state store (redb)
//! - HTTP prober
//! - Notifier (log or SMS gateway)
//! - Scheduler, driven once (`run-once`) or on an interval (`watch`)
//!
//! # Usage
//!
//! ```text
//! upwatchd init --url https://api.example.com/health
//! upwatchd --config upwatch.toml run-once
//! upwatchd --config upwatch.toml watch --interval 60
//! upwatchd stats --endpoint orders --period 7d
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use upwatch_core::{Clock, EngineConfig, SystemClock, UpwatchConfig};
use upwatch_health::{HttpProber, Probe, ProbeTarget};
use upwatch_scheduler::Scheduler;
use upwatch_state::{MonitorStore, StateStore};

mod report;

#[derive(Parser)]
#[command(name = "upwatchd", about = "upwatch endpoint monitor", version)]
struct Cli {
    /// Path to upwatch.toml.
    #[arg(short, long, global = true, default_value = "upwatch.toml")]
    config: PathBuf,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value = "text")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Write a starter upwatch.toml watching a single URL.
    Init {
        /// URL to watch.
        #[arg(long)]
        url: String,

        /// Endpoint id and display name.
        #[arg(long, default_value = "api")]
        name: String,

        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },

    /// Check every due endpoint once and exit.
    RunOnce,

    /// Check due endpoints on an interval until Ctrl-C.
    Watch {
        /// Seconds between passes. Defaults to `engine.watch_interval_secs`.
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Probe a single URL and print the outcome. Nothing is stored.
    Probe {
        url: String,

        /// Timeout in seconds.
        #[arg(long, default_value = "10")]
        timeout: u64,

        /// Substring the body must contain.
        #[arg(long)]
        expect: Option<String>,
    },

    /// Print availability stats and incidents from stored checks.
    Stats {
        /// Restrict to one endpoint.
        #[arg(long)]
        endpoint: Option<String>,

        /// Trailing window: 1h, 6h, 24h, 7d, 30d, 90d or 1y.
        #[arg(long, default_value = "24h")]
        period: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format)?;

    match cli.command {
        Command::Init { url, name, force } => init_config(&cli.config, &name, &url, force),
        Command::RunOnce => run_once(&cli.config).await,
        Command::Watch { interval } => run_watch(&cli.config, interval).await,
        Command::Probe {
            url,
            timeout,
            expect,
        } => probe_url(&cli.config, url, timeout, expect).await,
        Command::Stats { endpoint, period } => {
            let (_, store) = open_engine_state(&cli.config)?;
            let now = SystemClock.now();
            report::print_stats(&store, endpoint.as_deref(), &period, now)
        }
    }
}

fn init_tracing(format: LogFormat) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info,upwatch=debug,upwatchd=debug"))?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
    Ok(())
}

fn init_config(path: &Path, name: &str, url: &str, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }
    let config = UpwatchConfig::scaffold(name, url);
    std::fs::write(path, config.to_toml_string()?)?;
    println!("wrote {}", path.display());
    Ok(())
}

/// Load the config, open the store under `data_dir` and seed it.
fn open_engine_state(config_path: &Path) -> anyhow::Result<(UpwatchConfig, StateStore)> {
    let config = UpwatchConfig::from_file(config_path)?;

    std::fs::create_dir_all(&config.engine.data_dir)?;
    let db_path = config.engine.data_dir.join("upwatch.redb");
    let store = StateStore::open(&db_path)?;
    info!(path = ?db_path, "state store opened");

    let seeded = upwatch_state::apply_config(&store, &config)?;
    info!(
        endpoints = seeded.endpoints,
        rules = seeded.rules,
        default_rules = seeded.default_rules,
        recipients = seeded.recipients,
        "configuration applied"
    );
    Ok((config, store))
}

fn build_scheduler(config: &UpwatchConfig, store: StateStore) -> anyhow::Result<Scheduler> {
    let prober = HttpProber::from_config(&config.engine)?;
    let notifier = upwatch_alert::from_config(&config.notifier)?;
    info!(
        notifier = notifier.name(),
        dry_run = config.engine.dry_run,
        max_concurrency = config.engine.max_concurrency,
        "engine initialized"
    );
    let store: Arc<dyn MonitorStore> = Arc::new(store);
    Ok(Scheduler::new(
        store,
        Arc::new(prober),
        notifier,
        Arc::new(SystemClock),
        config.engine.clone(),
    ))
}

async fn run_once(config_path: &Path) -> anyhow::Result<()> {
    let (config, store) = open_engine_state(config_path)?;
    let scheduler = build_scheduler(&config, store)?;
    let summary = scheduler.run_pass().await?;
    println!(
        "checked {} (up {}, down {}), skipped {}, alerts {}, errors {}",
        summary.checked,
        summary.up,
        summary.down,
        summary.skipped,
        summary.alerts_sent,
        summary.errors
    );
    Ok(())
}

async fn run_watch(config_path: &Path, interval: Option<u64>) -> anyhow::Result<()> {
    let (config, store) = open_engine_state(config_path)?;
    let interval = interval
        .map(Duration::from_secs)
        .unwrap_or_else(|| config.engine.watch_interval());
    let scheduler = build_scheduler(&config, store)?;

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(async move {
        scheduler.run(interval, shutdown_rx).await;
    });

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);
    let _ = handle.await;

    info!("upwatch daemon stopped");
    Ok(())
}

async fn probe_url(
    config_path: &Path,
    url: String,
    timeout: u64,
    expected_content: Option<String>,
) -> anyhow::Result<()> {
    // Engine settings (retries, user agent) come from the config when there is one.
    let engine = if config_path.exists() {
        UpwatchConfig::from_file(config_path)?.engine
    } else {
        EngineConfig::default()
    };
    let prober = HttpProber::from_config(&engine)?;
    let target = ProbeTarget {
        url,
        timeout: Duration::from_secs(timeout.max(1)),
        expected_content,
    };
    let outcome = prober.probe(&target).await;

    println!("url:           {}", target.url);
    println!("success:       {}", outcome.success);
    if let Some(code) = outcome.status_code {
        println!("status code:   {code}");
    }
    if let Some(ms) = outcome.response_time_ms {
        println!("response time: {ms} ms");
    }
    if let Some(kind) = outcome.error_kind {
        println!("error:         {} ({kind})", kind.describe());
    }
    if let Some(detail) = &outcome.error_detail {
        println!("detail:        {detail}");
    }
    if let Some(matched) = outcome.content_matched {
        println!("content match: {matched}");
    }
    if let Some(expires) = outcome.ssl_expires_at {
        println!("tls expires:   {}", expires.to_rfc3339());
    }
    Ok(())
}
