//! Connection supervision and mount reconciliation.
//!
//! The [`supervisor`] owns process lifetime and reconnects; the
//! [`reconciler`] keeps the mount state of each asset converged over one
//! live session.

pub mod reconciler;
pub mod supervisor;

pub use reconciler::{AssetCheck, MountOutcome, ProvisionReport, Reconciler};
pub use supervisor::Supervisor;
