//! Connection supervisor — dials the device and restarts the reconciler.
//!
//! Every outcome of an attempt (dial failure, dead session) is logged and
//! followed by a fixed reconnect delay. The loop only stops when the
//! cancellation token fires.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

use super::reconciler::Reconciler;
use crate::config::GlobalConfig;
use crate::models::ManagedAsset;
use crate::remote::Connector;
use crate::{AppError, Result};

/// Owns the reconnect loop for one device.
pub struct Supervisor {
    connector: Arc<dyn Connector>,
    assets: Vec<ManagedAsset>,
    poll_interval: Duration,
    reconnect_delay: Duration,
}

impl Supervisor {
    /// Build a supervisor from loaded configuration.
    #[must_use]
    pub fn new(connector: Arc<dyn Connector>, config: &GlobalConfig) -> Self {
        Self::with_timing(
            connector,
            config.managed_assets(),
            config.poll_interval(),
            config.reconnect_delay(),
        )
    }

    /// Build a supervisor with explicit assets and timings.
    #[must_use]
    pub fn with_timing(
        connector: Arc<dyn Connector>,
        assets: Vec<ManagedAsset>,
        poll_interval: Duration,
        reconnect_delay: Duration,
    ) -> Self {
        Self {
            connector,
            assets,
            poll_interval,
            reconnect_delay,
        }
    }

    /// Dial, reconcile, back off, repeat until `cancel` fires.
    pub async fn run(&self, cancel: &CancellationToken) {
        let mut attempt: u64 = 0;

        loop {
            attempt += 1;

            tokio::select! {
                () = cancel.cancelled() => {
                    info!(attempt, "supervisor cancelled");
                    return;
                }
                outcome = self.run_once().instrument(info_span!("session", attempt)) => {
                    match outcome {
                        Ok(never) => match never {},
                        Err(err @ AppError::Dial(_)) => {
                            warn!(attempt, %err, "failed to connect to device");
                        }
                        Err(err) => {
                            warn!(attempt, %err, "session ended, reconnecting");
                        }
                    }
                }
            }

            info!(delay_secs = self.reconnect_delay.as_secs(), "waiting before reconnect");
            tokio::select! {
                () = cancel.cancelled() => {
                    info!(attempt, "supervisor cancelled");
                    return;
                }
                () = tokio::time::sleep(self.reconnect_delay) => {}
            }
        }
    }

    /// One dial plus reconcile run. The session is dropped, and therefore
    /// closed, before this returns or when the future is cancelled.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Dial` if connecting fails, otherwise the error that
    /// stopped the reconciler.
    pub async fn run_once(&self) -> Result<Infallible> {
        let shell = self.connector.connect().await?;
        info!(assets = self.assets.len(), "connected, starting reconciler");

        let reconciler = Reconciler::new(shell.as_ref(), &self.assets, self.poll_interval);
        reconciler.run().await
    }
}
