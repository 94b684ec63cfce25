//! Remote shell abstraction over the device's SSH server.
//!
//! The [`RemoteShell`] trait decouples the reconciler from the transport:
//! production code talks to the device through [`ssh::SshShell`], tests
//! through an in-memory fake. [`Connector`] produces a fresh shell for each
//! supervisor attempt.

pub mod commands;
pub mod ssh;

use std::future::Future;
use std::pin::Pin;

use crate::Result;

/// Boxed future returned by the transport traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Result of one remote command run to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Interleaved stdout and stderr.
    pub output: String,
    /// Exit status reported by the remote side.
    pub exit_status: i32,
}

impl CommandOutput {
    /// Successful output with exit status 0.
    #[must_use]
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            exit_status: 0,
        }
    }

    /// Output with a non-zero exit status.
    #[must_use]
    pub fn failed(output: impl Into<String>, exit_status: i32) -> Self {
        Self {
            output: output.into(),
            exit_status,
        }
    }

    /// Whether the command exited with status 0.
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_status == 0
    }
}

/// A live session able to run sequential commands on the device.
///
/// Every call opens its own command channel and releases it before
/// returning, whether the command succeeded, failed, or never launched.
/// Dropping the shell closes the underlying session.
pub trait RemoteShell: Send + Sync {
    /// Run `command` to completion and capture its combined output.
    ///
    /// A non-zero exit status is reported in [`CommandOutput::exit_status`],
    /// not as an error.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Session`](crate::AppError::Session) if no channel
    /// could be opened and [`AppError::Exec`](crate::AppError::Exec) if the
    /// command could not be launched or its output could not be read.
    fn exec<'a>(&'a self, command: &'a str) -> BoxFuture<'a, Result<CommandOutput>>;
}

/// Dials the device and hands back a live shell.
pub trait Connector: Send + Sync {
    /// Make a single connection attempt. No retries.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Dial`](crate::AppError::Dial) on connect, handshake,
    /// host key, or authentication failure.
    fn connect(&self) -> BoxFuture<'_, Result<Box<dyn RemoteShell>>>;
}
