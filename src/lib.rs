#![forbid(unsafe_code)]

//! `bindkeeper` — keeps image assets bind-mounted on an embedded device.
//!
//! A [`Supervisor`](orchestrator::Supervisor) dials the device over SSH and
//! runs a [`Reconciler`](orchestrator::Reconciler) that downloads each asset
//! once, then re-checks the live mount table at a fixed interval and repairs
//! missing bind mounts.

pub mod config;
pub mod errors;
pub mod models;
pub mod orchestrator;
pub mod remote;
pub mod runtime;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
