//! pingwatchd: the pingwatch daemon.
//!
//! Authenticates against the cloud, then loops over every region forever:
//! lists the machines, scores each one's ping availability over the
//! sample window, and reboots eligible machines that fall below the
//! threshold.
//!
//! # Usage
//!
//! ```text
//! OS_USERNAME=ops OS_PASSWORD=… pingwatchd --interval 600 --threads 10
//! pingwatchd --config /etc/pingwatch.toml --dry-run
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::Parser;
use tokio::sync::watch;
use tracing::{info, warn};

use pingwatch_core::{Catalog, ComputeProvider, Monitoring, WatchConfig};
use pingwatch_rackspace::{Credentials, DEFAULT_AUTH_URL, RackspaceClient};
use pingwatch_scheduler::Scheduler;

#[derive(Parser, Debug)]
#[command(name = "pingwatchd", about = "Reboot machines whose ping availability drops")]
struct Cli {
    /// TOML config file; flags override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Interval (in seconds) to check all servers.
    #[arg(long)]
    interval: Option<u64>,

    /// Number of concurrent checks.
    #[arg(long)]
    threads: Option<usize>,

    /// Availability percentage below which a server is rebooted.
    #[arg(long)]
    threshold: Option<f64>,

    /// Sample window in seconds.
    #[arg(long)]
    window: Option<u64>,

    /// Log reboots instead of issuing them.
    #[arg(long)]
    dry_run: bool,

    /// Emit logs as JSON.
    #[arg(long)]
    log_json: bool,
}

impl Cli {
    fn load_config(&self) -> anyhow::Result<WatchConfig> {
        let mut config = match &self.config {
            Some(path) => WatchConfig::from_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => WatchConfig::default(),
        };

        if let Some(interval) = self.interval {
            config.interval_secs = interval;
        }
        if let Some(threads) = self.threads {
            config.workers = threads;
        }
        if let Some(threshold) = self.threshold {
            config.reboot_threshold = threshold;
        }
        if let Some(window) = self.window {
            config.availability_window_secs = window;
        }
        config.dry_run |= self.dry_run;

        config.validate()?;
        Ok(config)
    }
}

fn credentials_from_env() -> anyhow::Result<Credentials> {
    let username = std::env::var("OS_USERNAME").context("OS_USERNAME is not set")?;
    if let Ok(password) = std::env::var("OS_PASSWORD") {
        return Ok(Credentials::Password { username, password });
    }
    if let Ok(api_key) = std::env::var("OS_API_KEY") {
        return Ok(Credentials::ApiKey { username, api_key });
    }
    bail!("neither OS_PASSWORD nor OS_API_KEY is set")
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,pingwatch=debug"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = cli.load_config()?;
    let credentials = credentials_from_env()?;
    let auth_url = std::env::var("OS_AUTH_URL").unwrap_or_else(|_| DEFAULT_AUTH_URL.to_string());

    info!(
        interval_secs = config.interval_secs,
        workers = config.workers,
        threshold = config.reboot_threshold,
        window_secs = config.availability_window_secs,
        eligible = %config.eligible_substring,
        dry_run = config.dry_run,
        "pingwatch starting"
    );

    let client = Arc::new(
        RackspaceClient::connect(&auth_url, credentials, config.call_timeout())
            .await
            .context("authenticating")?,
    );
    info!(%auth_url, "authenticated");

    let catalog: Arc<dyn Catalog> = client.clone();
    let computes: Arc<dyn ComputeProvider> = client.clone();
    let monitoring: Arc<dyn Monitoring> = client;
    let scheduler = Scheduler::new(catalog, computes, monitoring, &config);

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("shutdown signal received");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => {
                // A dropped sender reads as shutdown, so keep it alive.
                warn!(error = %e, "cannot listen for ctrl-c");
                std::future::pending::<()>().await;
                drop(shutdown_tx);
            }
        }
    });

    scheduler.run_until(shutdown_rx).await?;

    info!("pingwatch stopped");
    Ok(())
}
