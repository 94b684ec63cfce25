#![forbid(unsafe_code)]

//! `bindkeeper` — device mount supervisor binary.
//!
//! Loads configuration and credentials, then runs the reconnect/reconcile
//! loop until Ctrl-C or SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use bindkeeper::config::GlobalConfig;
use bindkeeper::orchestrator::Supervisor;
use bindkeeper::remote::ssh::SshConnector;
use bindkeeper::runtime;
use bindkeeper::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "bindkeeper", about = "Keeps device assets bind-mounted over SSH", version, long_about = None)]
struct Cli {
    /// Optional TOML configuration file; built-in defaults apply otherwise.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("bindkeeper bootstrap");

    runtime::block_on_with_grace(run(args), runtime::SHUTDOWN_GRACE)?
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = match args.config {
        Some(path) => GlobalConfig::load_from_path(path)?,
        None => GlobalConfig::default(),
    };
    config.apply_process_env();
    config.load_credentials().await?;

    let connector = SshConnector::from_config(&config)?;
    info!(
        endpoint = %connector.endpoint(),
        assets = config.assets.len(),
        accept_any_host_key = config.accept_any_host_key,
        "configuration loaded"
    );

    // ── Run supervisor until shutdown ───────────────────
    let supervisor = Supervisor::new(Arc::new(connector), &config);
    let ct = CancellationToken::new();
    let supervisor_ct = ct.clone();
    let supervisor_handle = tokio::spawn(async move {
        supervisor.run(&supervisor_ct).await;
    });

    let signal = shutdown_signal().await;
    info!(signal, "stopping supervisor");
    ct.cancel();

    supervisor_handle
        .await
        .map_err(|err| AppError::Io(format!("supervisor task failed: {err}")))?;
    info!("bindkeeper shut down");

    Ok(())
}

/// Wait for SIGTERM or Ctrl-C and return the name of the one received.
async fn shutdown_signal() -> &'static str {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => tokio::select! {
                _ = tokio::signal::ctrl_c() => "SIGINT",
                _ = sigterm.recv() => "SIGTERM",
            },
            Err(err) => {
                warn!(%err, "SIGTERM unavailable, stopping on Ctrl-C only");
                wait_for_ctrl_c().await
            }
        }
    }

    #[cfg(not(unix))]
    {
        wait_for_ctrl_c().await
    }
}

async fn wait_for_ctrl_c() -> &'static str {
    if let Err(err) = tokio::signal::ctrl_c().await {
        // Without a handler the daemon can only be killed; keep supervising.
        warn!(%err, "Ctrl-C handler failed");
        std::future::pending::<()>().await;
    }
    "SIGINT"
}

/// `RUST_LOG` wins; otherwise bindkeeper logs at `info` and its SSH
/// dependencies only at `warn`.
fn init_tracing(log_format: LogFormat) -> Result<()> {
    const DEFAULT_FILTER: &str = "warn,bindkeeper=info";

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(DEFAULT_FILTER))
        .map_err(|err| AppError::Config(format!("invalid log filter: {err}")))?;
    let builder = fmt().with_env_filter(filter);

    let installed = match log_format {
        LogFormat::Text => builder.with_target(false).try_init(),
        LogFormat::Json => builder.json().with_current_span(true).try_init(),
    };
    installed.map_err(|err| AppError::Config(format!("cannot install log subscriber: {err}")))
}
