use anyhow::{Context, Result};
use clap::Parser;
use spinledger_service::api::Api;
use spinledger_service::config::{ServiceConfig, StorageConfig};
use spinledger_service::Service;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, Level};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Host interface to bind (default: localhost).
    #[arg(long, default_value = "127.0.0.1")]
    host: IpAddr,

    #[arg(short, long, default_value_t = 8080)]
    port: u16,

    /// SQLite database file (default: spinledger.db).
    #[arg(long, conflicts_with_all = ["database_url", "in_memory"])]
    database_path: Option<PathBuf>,

    /// Postgres connection URL. Public hosts need SPINLEDGER_DB_ALLOW_PUBLIC=1.
    #[arg(long, conflicts_with = "in_memory")]
    database_url: Option<String>,

    /// Keep everything in memory; state is lost on exit.
    #[arg(long)]
    in_memory: bool,

    /// Credits charged per spin.
    #[arg(long)]
    bet: Option<u64>,

    #[arg(long)]
    min_rtp: Option<f64>,

    #[arg(long)]
    max_rtp: Option<f64>,

    /// RTP reported for players with nothing wagered yet.
    #[arg(long)]
    initial_rtp: Option<f64>,

    /// Bonus credited on first registration.
    #[arg(long)]
    starting_balance: Option<u64>,

    /// Concurrent blocking workers.
    #[arg(long)]
    workers: Option<usize>,

    /// Requests allowed to wait for a worker before answering 503.
    #[arg(long)]
    backlog: Option<usize>,

    #[arg(long)]
    weight_cache_ttl_secs: Option<u64>,

    #[arg(long)]
    weight_cache_capacity: Option<usize>,

    /// Default number of transactions and games listed (max 100).
    #[arg(long)]
    history_limit: Option<usize>,

    /// Spin deadline in milliseconds (0 disables).
    #[arg(long)]
    spin_timeout_ms: Option<u64>,

    /// Seed the grid RNG for reproducible runs.
    #[arg(long)]
    deterministic_seed: Option<u64>,

    #[arg(long, default_value_t = Level::INFO)]
    log_level: Level,

    /// Emit logs as JSON lines.
    #[arg(long)]
    log_json: bool,
}

fn init_tracing(level: Level, json: bool) {
    let builder = tracing_subscriber::fmt().with_max_level(level);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Maps an optional arg value treating 0 as disabled: Some(0) => None, Some(v) => Some(v), None => default
fn map_optional_limit<T: Copy + PartialEq + From<u8>>(
    arg: Option<T>,
    default: Option<T>,
) -> Option<T> {
    match arg {
        Some(v) if v == T::from(0) => None,
        Some(v) => Some(v),
        None => default,
    }
}

fn build_config(args: &Args) -> Result<ServiceConfig> {
    let defaults = ServiceConfig::default();
    let storage = if args.in_memory {
        StorageConfig::Memory
    } else if let Some(url) = &args.database_url {
        StorageConfig::Postgres { url: url.clone() }
    } else if let Some(path) = &args.database_path {
        StorageConfig::Sqlite { path: path.clone() }
    } else {
        defaults.storage.clone()
    };

    let config = ServiceConfig {
        bet: args.bet.unwrap_or(defaults.bet),
        min_rtp: args.min_rtp.unwrap_or(defaults.min_rtp),
        max_rtp: args.max_rtp.unwrap_or(defaults.max_rtp),
        initial_rtp: args.initial_rtp.unwrap_or(defaults.initial_rtp),
        starting_balance: args.starting_balance.unwrap_or(defaults.starting_balance),
        workers: args.workers.unwrap_or(defaults.workers),
        backlog: args.backlog.unwrap_or(defaults.backlog),
        weight_cache_ttl_secs: args
            .weight_cache_ttl_secs
            .unwrap_or(defaults.weight_cache_ttl_secs),
        weight_cache_capacity: args
            .weight_cache_capacity
            .unwrap_or(defaults.weight_cache_capacity),
        history_limit: args.history_limit.unwrap_or(defaults.history_limit),
        spin_timeout_ms: map_optional_limit(args.spin_timeout_ms, defaults.spin_timeout_ms),
        deterministic_seed: args.deterministic_seed.or(defaults.deterministic_seed),
        storage,
    };
    config.validate().context("invalid configuration")?;
    Ok(config)
}

/// Periodically drops expired weight vectors so idle players do not hold cache slots.
fn spawn_weight_cache_purge(service: Arc<Service>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(period.max(Duration::from_secs(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let purged = service.slots().rtp().purge_expired();
            if purged > 0 {
                debug!(purged, "purged expired weight vectors");
            }
        }
    })
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(?err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_level, args.log_json);

    let config = build_config(&args)?;
    info!(
        bet = config.bet,
        min_rtp = config.min_rtp,
        max_rtp = config.max_rtp,
        workers = config.workers,
        backlog = config.backlog,
        "starting spinledger"
    );

    // Storage clients block, so open (and later close) them off the async threads.
    let service = tokio::task::spawn_blocking(move || Service::open(config))
        .await
        .context("storage open task failed")?
        .context("failed to open service")?;
    let service = Arc::new(service);
    let purge = spawn_weight_cache_purge(
        Arc::clone(&service),
        service.config().weight_cache_ttl(),
    );
    let app = Api::new(Arc::clone(&service)).router();

    let addr = SocketAddr::new(args.host, args.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Listening on {}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("axum server error")?;

    purge.abort();
    let _ = purge.await;

    tokio::task::spawn_blocking(move || drop(service))
        .await
        .context("storage close task failed")?;
    Ok(())
}
