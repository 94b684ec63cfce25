//! `ssh2`-backed implementation of the remote shell traits.
//!
//! libssh2 is blocking, so every network operation runs on tokio's blocking
//! pool. One session serves one command at a time; the session mutex makes
//! that explicit.

use std::io::Read;
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::{Arc, Mutex, TryLockError};
use std::time::Duration;

use ssh2::{Channel, ExtendedData, HashType, Session};
use tracing::{debug, info, warn};

use super::{BoxFuture, CommandOutput, Connector, RemoteShell};
use crate::config::{fingerprint_from_digest, GlobalConfig, HostEndpoint, Password};
use crate::{AppError, Result};

/// Dials the device with password authentication.
#[derive(Debug, Clone)]
pub struct SshConnector {
    endpoint: HostEndpoint,
    username: String,
    password: Password,
    accept_any_host_key: bool,
    host_key_sha256: Option<String>,
    connect_timeout: Duration,
    command_timeout: Option<Duration>,
}

impl SshConnector {
    /// Build a connector from a fully loaded configuration.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if credentials or the endpoint are missing.
    pub fn from_config(config: &GlobalConfig) -> Result<Self> {
        config.ensure_connectable()?;
        Ok(Self {
            endpoint: config.endpoint()?,
            username: config.username.clone(),
            password: config.password.clone(),
            accept_any_host_key: config.accept_any_host_key,
            host_key_sha256: config.host_key_fingerprint(),
            connect_timeout: config.connect_timeout(),
            command_timeout: config.command_timeout(),
        })
    }

    /// Endpoint this connector dials.
    #[must_use]
    pub fn endpoint(&self) -> &HostEndpoint {
        &self.endpoint
    }

    fn dial_blocking(&self) -> Result<SshShell> {
        let tcp = self.open_tcp()?;

        let mut session = Session::new()
            .map_err(|err| AppError::Dial(format!("failed to create ssh session: {err}")))?;
        session.set_tcp_stream(tcp);
        session.set_timeout(millis(self.connect_timeout));
        session
            .handshake()
            .map_err(|err| AppError::Dial(format!("handshake with {} failed: {err}", self.endpoint)))?;

        self.verify_host_key(&session)?;

        session
            .userauth_password(&self.username, self.password.expose())
            .map_err(|err| AppError::Dial(format!("authentication failed: {err}")))?;
        if !session.authenticated() {
            return Err(AppError::Dial("authentication failed".into()));
        }

        // 0 disables the libssh2 timeout.
        session.set_timeout(self.command_timeout.map_or(0, millis));

        info!(endpoint = %self.endpoint, user = %self.username, "ssh session established");
        Ok(SshShell {
            session: Arc::new(Mutex::new(session)),
            endpoint: self.endpoint.to_string(),
        })
    }

    fn open_tcp(&self) -> Result<TcpStream> {
        let addrs = (self.endpoint.host.as_str(), self.endpoint.port)
            .to_socket_addrs()
            .map_err(|err| AppError::Dial(format!("cannot resolve {}: {err}", self.endpoint)))?;

        let mut last_err = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.connect_timeout) {
                Ok(tcp) => return Ok(tcp),
                Err(err) => last_err = Some(err),
            }
        }

        Err(AppError::Dial(match last_err {
            Some(err) => format!("failed to connect to {}: {err}", self.endpoint),
            None => format!("{} resolved to no addresses", self.endpoint),
        }))
    }

    fn verify_host_key(&self, session: &Session) -> Result<()> {
        let observed = session
            .host_key_hash(HashType::Sha256)
            .map(fingerprint_from_digest);

        match (&self.host_key_sha256, observed) {
            (Some(expected), Some(observed)) if *expected == observed => Ok(()),
            (Some(expected), observed) => Err(AppError::Dial(format!(
                "host key mismatch (expected {expected}, got {})",
                observed.as_deref().unwrap_or("unknown")
            ))),
            (None, observed) if self.accept_any_host_key => {
                debug!(
                    fingerprint = observed.as_deref().unwrap_or("unknown"),
                    "accepting unverified host key"
                );
                Ok(())
            }
            (None, _) => Err(AppError::Dial(
                "host key verification required but no fingerprint configured".into(),
            )),
        }
    }
}

impl Connector for SshConnector {
    fn connect(&self) -> BoxFuture<'_, Result<Box<dyn RemoteShell>>> {
        let connector = self.clone();
        Box::pin(async move {
            let shell = tokio::task::spawn_blocking(move || connector.dial_blocking())
                .await
                .map_err(|err| AppError::Dial(format!("dial task panicked: {err}")))??;
            Ok(Box::new(shell) as Box<dyn RemoteShell>)
        })
    }
}

/// A live SSH session. Dropping it disconnects from the device.
pub struct SshShell {
    session: Arc<Mutex<Session>>,
    endpoint: String,
}

impl RemoteShell for SshShell {
    fn exec<'a>(&'a self, command: &'a str) -> BoxFuture<'a, Result<CommandOutput>> {
        let session = Arc::clone(&self.session);
        let command = command.to_owned();
        Box::pin(async move {
            tokio::task::spawn_blocking(move || run_command(&session, &command))
                .await
                .map_err(|err| AppError::Exec(format!("command task panicked: {err}")))?
        })
    }
}

impl Drop for SshShell {
    fn drop(&mut self) {
        // A command still running on the blocking pool keeps its own handle;
        // libssh2 frees the session once that finishes.
        let guard = match self.session.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                debug!(endpoint = %self.endpoint, "session busy, deferring disconnect");
                return;
            }
        };
        match guard.disconnect(None, "bindkeeper session closed", None) {
            Ok(()) => debug!(endpoint = %self.endpoint, "ssh session closed"),
            Err(err) => warn!(endpoint = %self.endpoint, %err, "ssh disconnect failed"),
        }
    }
}

/// Open a channel, run one command, and release the channel on every path.
fn run_command(session: &Mutex<Session>, command: &str) -> Result<CommandOutput> {
    let session = session
        .lock()
        .map_err(|_| AppError::Session("session lock poisoned".into()))?;
    let mut channel = session
        .channel_session()
        .map_err(|err| AppError::Session(format!("failed to open channel: {err}")))?;

    let result = exec_on_channel(&mut channel, command);

    if let Err(err) = channel.close() {
        debug!(%err, "failed to close channel");
    }
    result
}

fn exec_on_channel(channel: &mut Channel, command: &str) -> Result<CommandOutput> {
    channel
        .handle_extended_data(ExtendedData::Merge)
        .map_err(|err| AppError::Exec(format!("failed to merge stderr: {err}")))?;
    channel
        .exec(command)
        .map_err(|err| AppError::Exec(format!("failed to launch `{command}`: {err}")))?;

    let mut buf = Vec::new();
    channel
        .read_to_end(&mut buf)
        .map_err(|err| AppError::Exec(format!("reading output of `{command}` failed: {err}")))?;
    channel
        .wait_close()
        .map_err(|err| AppError::Exec(format!("`{command}` did not close cleanly: {err}")))?;
    let exit_status = channel
        .exit_status()
        .map_err(|err| AppError::Exec(format!("no exit status for `{command}`: {err}")))?;

    Ok(CommandOutput {
        output: String::from_utf8_lossy(&buf).into_owned(),
        exit_status,
    })
}

fn millis(duration: Duration) -> u32 {
    u32::try_from(duration.as_millis()).unwrap_or(u32::MAX)
}
