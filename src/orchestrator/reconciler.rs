//! Mount-state reconciler for a single live session.
//!
//! Provisions every asset once, then inspects the live mount table at a fixed
//! interval and repairs any target that is no longer bind-mounted. Nothing is
//! cached between iterations; each tick re-queries the device.

use std::convert::Infallible;
use std::time::Duration;

use tracing::{info, warn};

use crate::models::ManagedAsset;
use crate::remote::commands;
use crate::remote::RemoteShell;
use crate::Result;

/// What a single poll observed and did for one asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountOutcome {
    /// Target was already in the mount table; no command was issued.
    AlreadyMounted,
    /// Target was missing and the bind mount succeeded.
    Repaired,
    /// Target was missing and the bind mount failed; retried next tick.
    RepairFailed,
}

/// Per-asset result of one poll iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetCheck {
    /// Asset name.
    pub asset: String,
    /// Observed state and action taken.
    pub outcome: MountOutcome,
}

/// Summary of the provisioning pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProvisionReport {
    /// Assets downloaded successfully.
    pub fetched: usize,
    /// Assets whose download failed.
    pub failed: usize,
    /// Assets without a source URL.
    pub skipped: usize,
}

/// Reconciles the mount state of a fixed asset list over one session.
pub struct Reconciler<'a> {
    shell: &'a dyn RemoteShell,
    assets: &'a [ManagedAsset],
    poll_interval: Duration,
}

impl<'a> Reconciler<'a> {
    /// Construct a reconciler borrowing a live shell.
    #[must_use]
    pub fn new(shell: &'a dyn RemoteShell, assets: &'a [ManagedAsset], poll_interval: Duration) -> Self {
        Self {
            shell,
            assets,
            poll_interval,
        }
    }

    /// Provision once, then poll forever.
    ///
    /// Only returns when the mount table cannot be queried, which is taken as
    /// a sign the session is dead.
    ///
    /// # Errors
    ///
    /// Returns the error from the failed mount-table query.
    pub async fn run(&self) -> Result<Infallible> {
        self.provision().await;

        loop {
            self.poll_once().await?;
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Download every asset that has a source. Failures are logged and do not
    /// stop the remaining assets.
    pub async fn provision(&self) -> ProvisionReport {
        let mut report = ProvisionReport::default();

        for asset in self.assets {
            let Some(source) = asset.source() else {
                info!(asset = %asset.name, "no source configured, skipping download");
                report.skipped += 1;
                continue;
            };

            match commands::fetch(self.shell, source, &asset.staging_path).await {
                Ok(()) => report.fetched += 1,
                Err(err) => {
                    warn!(asset = %asset.name, %err, "initial download failed");
                    report.failed += 1;
                }
            }
        }

        info!(
            fetched = report.fetched,
            failed = report.failed,
            skipped = report.skipped,
            "provisioning complete"
        );
        report
    }

    /// Inspect every asset once, in configuration order, repairing missing
    /// mounts.
    ///
    /// # Errors
    ///
    /// Returns the first mount-table query error; assets after it are not
    /// inspected this tick.
    pub async fn poll_once(&self) -> Result<Vec<AssetCheck>> {
        let mut checks = Vec::with_capacity(self.assets.len());

        for asset in self.assets {
            let mounted = commands::check_mounted(self.shell, &asset.mount_target_path).await?;

            let outcome = if mounted {
                info!(asset = %asset.name, target = %asset.mount_target_path, "asset is mounted");
                MountOutcome::AlreadyMounted
            } else {
                info!(asset = %asset.name, target = %asset.mount_target_path, "asset is not mounted, repairing");
                self.repair(asset).await
            };

            checks.push(AssetCheck {
                asset: asset.name.clone(),
                outcome,
            });
        }

        Ok(checks)
    }

    async fn repair(&self, asset: &ManagedAsset) -> MountOutcome {
        if let Some(source) = asset.source() {
            if let Err(err) = commands::fetch(self.shell, source, &asset.staging_path).await {
                warn!(asset = %asset.name, %err, "download failed, mounting existing content");
            }
        }

        match commands::bind_mount(self.shell, &asset.staging_path, &asset.mount_target_path).await {
            Ok(()) => MountOutcome::Repaired,
            Err(err) => {
                warn!(asset = %asset.name, %err, "bind mount failed, retrying next interval");
                MountOutcome::RepairFailed
            }
        }
    }
}
