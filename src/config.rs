//! Global configuration parsing, validation, and credential loading.

use std::collections::HashSet;
use std::env;
use std::fmt::{Debug, Display, Formatter};
use std::fs;
use std::path::Path;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;
use serde::Deserialize;
use tracing::warn;

use crate::models::ManagedAsset;
use crate::{AppError, Result};

/// Environment variable holding `host` or `host:port` of the device.
pub const ENV_HOST: &str = "SSH_HOST";
/// Environment variable holding the SSH login name.
pub const ENV_USERNAME: &str = "SSH_USERNAME";
/// Environment variable holding the SSH password (keychain fallback).
pub const ENV_PASSWORD: &str = "SSH_PASSWORD";
/// Environment variable holding the source URL of the default asset.
pub const ENV_DEFAULT_SOURCE: &str = "GIF_URL";

/// Keychain service name used for credential lookup.
const KEYRING_SERVICE: &str = "bindkeeper";

/// One `[[assets]]` entry of the configuration file.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct AssetConfig {
    /// Operator-facing identifier.
    pub name: String,
    /// Literal source URL. Overridden by `source_env` when that variable is set.
    #[serde(default)]
    pub source_url: Option<String>,
    /// Environment variable to read the source URL from.
    #[serde(default)]
    pub source_env: Option<String>,
    /// Remote path the content is downloaded to.
    pub staging_path: String,
    /// Remote path the UI reads, bind-mounted from `staging_path`.
    pub mount_target_path: String,
}

/// SSH password, redacted from `Debug` output.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Password(String);

impl Password {
    /// Wrap a plaintext password.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Plaintext value, for handing to the SSH library only.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Whether no password has been loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Debug for Password {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.0.is_empty() {
            f.write_str("Password(<unset>)")
        } else {
            f.write_str("Password(<redacted>)")
        }
    }
}

/// Resolved `host:port` pair of the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostEndpoint {
    /// Host name or IP literal, without brackets.
    pub host: String,
    /// TCP port of the SSH server.
    pub port: u16,
}

impl HostEndpoint {
    /// Parse `host`, `host:port`, `[v6]` or `[v6]:port`.
    ///
    /// A bare IPv6 literal (more than one colon, no brackets) keeps
    /// `default_port`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the host is empty or the port is invalid.
    pub fn parse(raw: &str, default_port: u16) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(AppError::Config("host must not be empty".into()));
        }

        if let Some(rest) = raw.strip_prefix('[') {
            let (host, tail) = rest
                .split_once(']')
                .ok_or_else(|| AppError::Config(format!("unterminated IPv6 literal: {raw}")))?;
            let port = match tail.strip_prefix(':') {
                Some(port) => parse_port(port)?,
                None if tail.is_empty() => default_port,
                None => return Err(AppError::Config(format!("invalid host: {raw}"))),
            };
            return Ok(Self {
                host: host.to_owned(),
                port,
            });
        }

        match raw.split_once(':') {
            Some((host, port)) if !port.contains(':') => Ok(Self {
                host: host.to_owned(),
                port: parse_port(port)?,
            }),
            _ => Ok(Self {
                host: raw.to_owned(),
                port: default_port,
            }),
        }
    }
}

impl Display for HostEndpoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

fn parse_port(raw: &str) -> Result<u16> {
    match raw.parse::<u16>() {
        Ok(0) | Err(_) => Err(AppError::Config(format!("invalid port: {raw}"))),
        Ok(port) => Ok(port),
    }
}

fn default_port() -> u16 {
    22
}

fn default_true() -> bool {
    true
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_reconnect_delay() -> u64 {
    5
}

fn default_poll_interval() -> u64 {
    30
}

fn default_assets() -> Vec<AssetConfig> {
    vec![AssetConfig {
        name: "welcome".into(),
        source_url: None,
        source_env: Some(ENV_DEFAULT_SOURCE.into()),
        staging_path: "/mnt/log/custom.png".into(),
        mount_target_path: "/usr/etc/gui/screen_240x240/Welcome_Anim_60.png".into(),
    }]
}

/// Global configuration parsed from `config.toml` and the process environment.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Device host, optionally with `:port`. `SSH_HOST` overrides.
    #[serde(default)]
    pub host: String,
    /// SSH port used when `host` carries none.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Login name. `SSH_USERNAME` overrides.
    #[serde(default)]
    pub username: String,
    /// Login password (populated at runtime from keychain or env).
    #[serde(skip)]
    pub password: Password,
    /// Accept whatever host key the device presents.
    #[serde(default = "default_true")]
    pub accept_any_host_key: bool,
    /// Expected host key fingerprint in `ssh-keygen -l` form
    /// (`SHA256:<base64>`); checked whenever set.
    #[serde(default)]
    pub host_key_sha256: Option<String>,
    /// TCP connect timeout for each dial.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,
    /// Per-command timeout; 0 means no timeout.
    #[serde(default)]
    pub command_timeout_seconds: u64,
    /// Delay between a finished session and the next dial.
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_seconds: u64,
    /// Interval between mount-state inspections.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,
    /// Managed assets, checked in this order.
    #[serde(default = "default_assets")]
    pub assets: Vec<AssetConfig>,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_port(),
            username: String::new(),
            password: Password::default(),
            accept_any_host_key: true,
            host_key_sha256: None,
            connect_timeout_seconds: default_connect_timeout(),
            command_timeout_seconds: 0,
            reconnect_delay_seconds: default_reconnect_delay(),
            poll_interval_seconds: default_poll_interval(),
            assets: default_assets(),
        }
    }
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and validate it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay host, username, and asset sources from an environment lookup.
    ///
    /// Empty values are ignored so an exported-but-blank variable does not
    /// clear a value from the config file.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(host) = non_empty(ENV_HOST) {
            self.host = host;
        }
        if let Some(username) = non_empty(ENV_USERNAME) {
            self.username = username;
        }
        for asset in &mut self.assets {
            if let Some(url) = asset.source_env.as_deref().and_then(&non_empty) {
                asset.source_url = Some(url);
            }
        }
    }

    /// [`apply_env_overrides`](Self::apply_env_overrides) against the process environment.
    pub fn apply_process_env(&mut self) {
        self.apply_env_overrides(|key| env::var(key).ok());
    }

    /// Load the SSH password from OS keychain with env-var fallback.
    ///
    /// Tries the `bindkeeper` keyring service first, then falls back to the
    /// `SSH_PASSWORD` environment variable.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if neither source provides a password.
    pub async fn load_credentials(&mut self) -> Result<()> {
        let password = load_credential("ssh_password", ENV_PASSWORD).await?;
        self.password = Password::new(password);
        Ok(())
    }

    /// Check that everything needed to dial is present.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` naming the first missing value.
    pub fn ensure_connectable(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(AppError::Config(format!("host is not set (export {ENV_HOST})")));
        }
        if self.username.trim().is_empty() {
            return Err(AppError::Config(format!(
                "username is not set (export {ENV_USERNAME})"
            )));
        }
        if self.password.is_empty() {
            return Err(AppError::Config(format!(
                "password is not set (export {ENV_PASSWORD})"
            )));
        }
        self.endpoint().map(|_| ())
    }

    /// Resolved endpoint of the device.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `host` cannot be parsed.
    pub fn endpoint(&self) -> Result<HostEndpoint> {
        HostEndpoint::parse(&self.host, self.port)
    }

    /// The fixed asset set, in check order.
    #[must_use]
    pub fn managed_assets(&self) -> Vec<ManagedAsset> {
        self.assets
            .iter()
            .map(|asset| {
                ManagedAsset::new(
                    asset.name.clone(),
                    asset.source_url.clone(),
                    asset.staging_path.clone(),
                    asset.mount_target_path.clone(),
                )
            })
            .collect()
    }

    /// Look up a single managed asset by name.
    #[must_use]
    pub fn asset(&self, name: &str) -> Option<ManagedAsset> {
        self.managed_assets()
            .into_iter()
            .find(|asset| asset.name == name)
    }

    /// Expected host key fingerprint as `SHA256:<base64, no padding>`.
    ///
    /// `None` when unset or malformed; [`from_toml_str`](Self::from_toml_str)
    /// rejects malformed values up front.
    #[must_use]
    pub fn host_key_fingerprint(&self) -> Option<String> {
        self.host_key_sha256
            .as_deref()
            .and_then(|raw| parse_fingerprint(raw).ok())
    }

    /// Delay before redialing after a session ends.
    #[must_use]
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_seconds)
    }

    /// Interval between poll iterations.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    /// TCP connect timeout.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    /// Per-command timeout, `None` when unlimited.
    #[must_use]
    pub fn command_timeout(&self) -> Option<Duration> {
        (self.command_timeout_seconds > 0).then(|| Duration::from_secs(self.command_timeout_seconds))
    }

    fn validate(&self) -> Result<()> {
        if self.assets.is_empty() {
            return Err(AppError::Config("assets must not be empty".into()));
        }

        if self.poll_interval_seconds == 0 {
            return Err(AppError::Config(
                "poll_interval_seconds must be greater than zero".into(),
            ));
        }

        if self.connect_timeout_seconds == 0 {
            return Err(AppError::Config(
                "connect_timeout_seconds must be greater than zero".into(),
            ));
        }

        let mut names = HashSet::new();
        let mut targets = HashSet::new();
        for asset in &self.assets {
            if asset.name.trim().is_empty() {
                return Err(AppError::Config("asset name must not be empty".into()));
            }
            if asset.staging_path.trim().is_empty() || asset.mount_target_path.trim().is_empty() {
                return Err(AppError::Config(format!(
                    "asset {} must set staging_path and mount_target_path",
                    asset.name
                )));
            }
            if !names.insert(asset.name.as_str()) {
                return Err(AppError::Config(format!("duplicate asset name: {}", asset.name)));
            }
            if !targets.insert(asset.mount_target_path.as_str()) {
                return Err(AppError::Config(format!(
                    "duplicate mount_target_path: {}",
                    asset.mount_target_path
                )));
            }
        }

        match self.host_key_sha256.as_deref() {
            Some(raw) => parse_fingerprint(raw).map(|_| ()),
            None if !self.accept_any_host_key => Err(AppError::Config(
                "host_key_sha256 is required when accept_any_host_key = false".into(),
            )),
            None => Ok(()),
        }
    }
}

/// Format a raw SHA-256 host key digest the way `ssh-keygen -l` prints it.
#[must_use]
pub fn fingerprint_from_digest(digest: &[u8]) -> String {
    format!("SHA256:{}", STANDARD_NO_PAD.encode(digest))
}

/// Parse a `SHA256:<base64>` fingerprint into canonical unpadded form.
///
/// The `SHA256:` prefix is optional and matched case-insensitively;
/// trailing `=` padding is ignored.
///
/// # Errors
///
/// Returns `AppError::Config` unless the value decodes to a 32-byte digest.
pub fn parse_fingerprint(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    let encoded = match trimmed.get(..7) {
        Some(prefix) if prefix.eq_ignore_ascii_case("sha256:") => &trimmed[7..],
        _ => trimmed,
    };
    let digest = STANDARD_NO_PAD
        .decode(encoded.trim().trim_end_matches('='))
        .map_err(|err| AppError::Config(format!("host_key_sha256 is not valid base64: {err}")))?;

    if digest.len() == 32 {
        Ok(fingerprint_from_digest(&digest))
    } else {
        Err(AppError::Config(format!(
            "host_key_sha256 must be a SHA-256 digest (got {} bytes)",
            digest.len()
        )))
    }
}

/// Load a single credential from OS keychain with env-var fallback.
async fn load_credential(keyring_key: &str, env_key: &str) -> Result<String> {
    let key = keyring_key.to_owned();

    // keyring is synchronous I/O.
    let keychain_result = tokio::task::spawn_blocking(move || {
        keyring::Entry::new(KEYRING_SERVICE, &key).and_then(|entry| entry.get_password())
    })
    .await
    .map_err(|err| AppError::Config(format!("keychain task panicked: {err}")))?;

    match keychain_result {
        Ok(value) if !value.is_empty() => return Ok(value),
        Ok(_) => {
            warn!(key = keyring_key, "keychain entry is empty, trying env var");
        }
        Err(err) => {
            tracing::debug!(
                key = keyring_key,
                ?err,
                "keychain lookup failed, trying env var"
            );
        }
    }

    match env::var(env_key) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(AppError::Config(format!(
            "credential {keyring_key} not found in keychain or {env_key} env var"
        ))),
    }
}
