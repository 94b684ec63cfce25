//! Runtime bootstrap for the daemon.
//!
//! SSH I/O runs on tokio's blocking pool, and a libssh2 call with no command
//! timeout can block indefinitely. Dropping a runtime waits for those
//! threads, so the daemon tears its runtime down with a bounded grace period
//! instead.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::{AppError, Result};

/// How long shutdown waits for in-flight blocking SSH calls.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Run `future` to completion on a fresh multi-thread runtime, then shut the
/// runtime down, abandoning blocking tasks still running after `grace`.
///
/// # Errors
///
/// Returns `AppError::Config` if the runtime cannot be built.
pub fn block_on_with_grace<F: Future>(future: F, grace: Duration) -> Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?;

    let output = runtime.block_on(future);
    debug!(?grace, "shutting down runtime");
    runtime.shutdown_timeout(grace);
    Ok(output)
}
