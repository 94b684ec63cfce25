#![forbid(unsafe_code)]

//! `bindkeeper-ctl` — one-shot operator CLI for `bindkeeper`.
//!
//! Dials the device once with the same configuration and credentials as the
//! daemon and runs a single primitive. Intended for manual recovery, e.g.
//! unmounting an asset the daemon keeps re-mounting.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use bindkeeper::config::GlobalConfig;
use bindkeeper::models::ManagedAsset;
use bindkeeper::remote::commands;
use bindkeeper::remote::ssh::SshConnector;
use bindkeeper::remote::{Connector, RemoteShell};
use bindkeeper::{AppError, Result};

#[derive(Debug, Parser)]
#[command(
    name = "bindkeeper-ctl",
    about = "Manual mount control for bindkeeper-managed assets",
    version,
    long_about = None
)]
struct Cli {
    /// Optional TOML configuration file (same format as the daemon's).
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List configured assets without connecting.
    Assets,

    /// Show whether each asset's target is currently mounted.
    Status,

    /// Download an asset to its staging path.
    Fetch {
        /// Asset name.
        asset: String,
    },

    /// Bind-mount an asset's staging path onto its target.
    Mount {
        /// Asset name.
        asset: String,
    },

    /// Unmount an asset's target.
    Unmount {
        /// Asset name.
        asset: String,
    },
}

fn main() {
    let args = Cli::parse();

    let result = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))
        .and_then(|runtime| runtime.block_on(run(args)));

    if let Err(err) = result {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

async fn run(args: Cli) -> Result<()> {
    let mut config = match args.config {
        Some(path) => GlobalConfig::load_from_path(path)?,
        None => GlobalConfig::default(),
    };
    config.apply_process_env();

    if let Command::Assets = args.command {
        for asset in config.managed_assets() {
            print_asset(&asset);
        }
        return Ok(());
    }

    config.load_credentials().await?;
    let connector = SshConnector::from_config(&config)?;
    let shell = connector.connect().await?;

    match args.command {
        Command::Assets => Ok(()),
        Command::Status => status(shell.as_ref(), &config.managed_assets()).await,
        Command::Fetch { asset } => {
            let asset = find_asset(&config, &asset)?;
            let source = asset
                .source()
                .ok_or_else(|| AppError::Config(format!("asset {} has no source url", asset.name)))?;
            commands::fetch(shell.as_ref(), source, &asset.staging_path).await?;
            println!("fetched {} -> {}", asset.name, asset.staging_path);
            Ok(())
        }
        Command::Mount { asset } => {
            let asset = find_asset(&config, &asset)?;
            commands::bind_mount(shell.as_ref(), &asset.staging_path, &asset.mount_target_path)
                .await?;
            println!("mounted {} on {}", asset.name, asset.mount_target_path);
            Ok(())
        }
        Command::Unmount { asset } => {
            let asset = find_asset(&config, &asset)?;
            commands::unmount(shell.as_ref(), &asset.mount_target_path).await?;
            println!("unmounted {}", asset.mount_target_path);
            Ok(())
        }
    }
}

async fn status(shell: &dyn RemoteShell, assets: &[ManagedAsset]) -> Result<()> {
    for asset in assets {
        let mounted = commands::check_mounted(shell, &asset.mount_target_path).await?;
        let state = if mounted { "mounted" } else { "NOT mounted" };
        println!("{:<12} {state:<12} {}", asset.name, asset.mount_target_path);
    }
    Ok(())
}

fn find_asset(config: &GlobalConfig, name: &str) -> Result<ManagedAsset> {
    config
        .asset(name)
        .ok_or_else(|| AppError::Config(format!("unknown asset: {name}")))
}

fn print_asset(asset: &ManagedAsset) {
    println!(
        "{:<12} {} -> {} (source: {})",
        asset.name,
        asset.staging_path,
        asset.mount_target_path,
        asset.source().unwrap_or("<none>")
    );
}
