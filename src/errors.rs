//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure. Fatal at startup.
    Config(String),
    /// TCP connect, SSH handshake, host key, or authentication failure.
    Dial(String),
    /// A command channel could not be opened on an established session.
    Session(String),
    /// A remote command could not be launched, timed out, or exited non-zero.
    Exec(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Dial(msg) => write!(f, "dial: {msg}"),
            Self::Session(msg) => write!(f, "session: {msg}"),
            Self::Exec(msg) => write!(f, "exec: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
