//! Managed asset model: a (source, staging path, mount target) triple.

use serde::{Deserialize, Serialize};

/// An image asset kept bind-mounted on the device.
///
/// The set of managed assets is fixed for the lifetime of the process; only
/// the mount linkage on the remote host is toggled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedAsset {
    /// Operator-facing identifier used in logs and by `bindkeeper-ctl`.
    pub name: String,
    /// Origin URL the device downloads the content from, if any.
    pub source_url: Option<String>,
    /// Remote path the fetched content is written to.
    pub staging_path: String,
    /// Remote path the device UI reads; `staging_path` is bind-mounted here.
    pub mount_target_path: String,
}

impl ManagedAsset {
    /// Construct an asset. An empty `source_url` is normalized to `None`.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        source_url: Option<String>,
        staging_path: impl Into<String>,
        mount_target_path: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            source_url: source_url.filter(|url| !url.trim().is_empty()),
            staging_path: staging_path.into(),
            mount_target_path: mount_target_path.into(),
        }
    }

    /// The source URL when one is configured and non-empty.
    #[must_use]
    pub fn source(&self) -> Option<&str> {
        self.source_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }
}
