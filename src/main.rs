use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use shipdock::analysis::cache::SessionCache;
use shipdock::analysis::ViewName;
use shipdock::collector::{Collector, Devices};
use shipdock::config::Config;
use shipdock::dashboard::Dashboard;
use shipdock::device::simulator::{SimLed, SimMicrophone, SimRadio, SimThermometer};
use shipdock::device::AccessPoint;
use shipdock::export::health::HealthMetrics;
use shipdock::store::rest::RestStore;

/// Ship-dock environmental collector and warehouse defect-rate dashboard.
#[derive(Parser)]
#[command(name = "shipdock", about)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Logging verbosity level (trace, debug, info, warn, error).
    /// Overrides `log_level` from the config file.
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sample noise and temperature and insert a reading every interval.
    Collect {
        /// Use the host device simulators. Their readings are synthetic.
        #[arg(long)]
        simulate: bool,
    },
    /// Serve the defect analysis dashboard.
    Dashboard,
    /// Load the data package once and print views as JSON.
    Report {
        /// View to print (merged, grouped_temp, grouped_noise,
        /// grouped_all_defects, pivot_pre, pivot_post). Default: all.
        #[arg(long)]
        view: Option<String>,
    },
    /// Print version information and exit.
    Version,
}

/// Build-time version info, injected via RUSTFLAGS.
mod version {
    /// Release version string (set at build time).
    pub const RELEASE: &str = env!("CARGO_PKG_VERSION");

    /// Git commit hash (set at build time via env, or "unknown").
    pub fn git_commit() -> &'static str {
        option_env!("GIT_COMMIT").unwrap_or("unknown")
    }

    /// Full version string with platform info.
    pub fn full() -> String {
        format!(
            "{} (commit: {}, {}/{})",
            RELEASE,
            git_commit(),
            std::env::consts::OS,
            std::env::consts::ARCH,
        )
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Command::Version = cli.command {
        println!("shipdock {}", version::full());
        return Ok(());
    }

    let mut cfg = Config::load(cli.config.as_deref()).with_context(|| match &cli.config {
        Some(path) => format!("loading config from {}", path.display()),
        None => "loading config from environment".to_string(),
    })?;

    let log_level = cli.log_level.as_deref().unwrap_or(&cfg.log_level);
    let filter = EnvFilter::try_new(log_level)
        .with_context(|| format!("invalid log level: {log_level}"))?;

    fmt().with_env_filter(filter).with_target(true).init();

    tracing::info!(
        version = version::RELEASE,
        commit = version::git_commit(),
        "starting shipdock",
    );

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;

    rt.block_on(async move {
        match cli.command {
            Command::Collect { simulate } => {
                cfg.collector.simulate |= simulate;
                collect(cfg).await
            }
            Command::Dashboard => dashboard(cfg).await,
            Command::Report { view } => report(cfg, view.as_deref()).await,
            Command::Version => Ok(()),
        }
    })
}

/// Waits for SIGINT or SIGTERM.
async fn shutdown_signal() -> Result<()> {
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .context("registering SIGTERM handler")?;

    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            res.context("waiting for SIGINT")?;
            tracing::info!("received SIGINT, shutting down");
        }
        _ = sigterm.recv() => {
            tracing::info!("received SIGTERM, shutting down");
        }
    }

    Ok(())
}

fn rest_store(cfg: &Config, health: &Arc<HealthMetrics>) -> Result<RestStore> {
    let health = Arc::clone(health);
    Ok(RestStore::new(&cfg.database)?.with_metrics(Box::new(move |table, status, duration| {
        health.observe_store_request(table, status, duration);
    })))
}

async fn collect(cfg: Config) -> Result<()> {
    cfg.require_simulation()?;
    cfg.validate_collector()?;

    tracing::warn!(
        table = %cfg.database.environmental_table,
        url = %cfg.database.url,
        "collecting from simulated devices, synthetic readings will be inserted",
    );

    let health = Arc::new(HealthMetrics::new(&cfg.health.addr)?);
    health.start().await?;

    let store = Arc::new(rest_store(&cfg, &health)?);

    let devices = Devices {
        radio: Box::new(SimRadio::new().with_visible(vec![AccessPoint {
            ssid: cfg.wifi.ssid.clone(),
            rssi: -52,
        }])),
        microphone: Box::new(SimMicrophone::new(
            1200.0,
            440.0,
            cfg.collector.sample_rate_hz,
        )),
        thermometer: Box::new(SimThermometer::new([24.2, 25.1, 26.4, 27.8, 26.9, 25.5])),
        led: Box::new(SimLed::default()),
    };

    let collector = Collector::new(
        cfg.collector.clone(),
        cfg.wifi.clone(),
        store,
        devices,
        Arc::clone(&health),
    );
    let cancel = collector.cancel_token();
    let handle = tokio::spawn(collector.run());

    let signal = shutdown_signal().await;

    cancel.cancel();
    handle.await.context("joining collector task")?;
    health.stop().await?;

    tracing::info!("shipdock collector stopped");

    signal
}

async fn dashboard(cfg: Config) -> Result<()> {
    cfg.validate_dashboard()?;

    let health = Arc::new(HealthMetrics::new(&cfg.health.addr)?);
    health.start().await?;

    let store = Arc::new(rest_store(&cfg, &health)?);
    let load_health = Arc::clone(&health);
    let cache = SessionCache::new(store).with_metrics(Box::new(move |status, duration| {
        load_health.observe_package_load(status, duration);
    }));

    let dashboard = Dashboard::new(&cfg.dashboard.addr, cache, Arc::clone(&health));
    let addr = dashboard.start().await?;
    tracing::info!(addr = %addr, "dashboard ready");

    let signal = shutdown_signal().await;

    dashboard.stop().await?;
    health.stop().await?;

    tracing::info!("shipdock dashboard stopped");

    signal
}

async fn report(cfg: Config, view: Option<&str>) -> Result<()> {
    cfg.validate_dashboard()?;

    let views = match view {
        Some(name) => vec![name.parse::<ViewName>()?],
        None => ViewName::ALL.to_vec(),
    };

    let store = Arc::new(RestStore::new(&cfg.database)?);
    let package = SessionCache::new(store)
        .get()
        .await
        .context("loading data package")?;

    let output = if let [single] = views.as_slice() {
        package.view_json(*single)?
    } else {
        let mut all = serde_json::Map::new();
        for view in views {
            all.insert(view.as_str().to_string(), package.view_json(view)?);
        }
        serde_json::Value::Object(all)
    };

    println!(
        "{}",
        serde_json::to_string_pretty(&output).context("encoding report")?
    );

    Ok(())
}
