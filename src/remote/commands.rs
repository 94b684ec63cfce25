//! Remote command primitives: mount check, bind mount, unmount, fetch.
//!
//! Each primitive runs exactly one command through [`RemoteShell::exec`],
//! which owns the channel lifecycle. Arguments are single-quoted for the
//! remote POSIX shell.

use tracing::{debug, info};

use super::{CommandOutput, RemoteShell};
use crate::{AppError, Result};

/// Command listing the live mount table.
pub const MOUNT_LIST_COMMAND: &str = "mount";

/// Quote `value` as a single POSIX shell word.
#[must_use]
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// `mount -o bind <staging> <target>`.
#[must_use]
pub fn bind_mount_command(staging_path: &str, target_path: &str) -> String {
    format!(
        "mount -o bind {} {}",
        shell_quote(staging_path),
        shell_quote(target_path)
    )
}

/// `umount <target>`.
#[must_use]
pub fn unmount_command(target_path: &str) -> String {
    format!("umount {}", shell_quote(target_path))
}

/// `curl --fail -o <destination> <source> --insecure`.
///
/// The device's CA store is not trusted to be current, so certificate
/// verification is off.
#[must_use]
pub fn fetch_command(source_url: &str, destination_path: &str) -> String {
    format!(
        "curl --fail -o {} {} --insecure",
        shell_quote(destination_path),
        shell_quote(source_url)
    )
}

/// Whether `target_path` appears verbatim anywhere in a mount listing.
#[must_use]
pub fn mount_table_contains(mount_table: &str, target_path: &str) -> bool {
    mount_table.contains(target_path)
}

/// Query whether `target_path` is currently in the live mount table.
///
/// # Errors
///
/// Returns `AppError::Session` / `AppError::Exec` if the listing cannot be
/// obtained.
pub async fn check_mounted(shell: &dyn RemoteShell, target_path: &str) -> Result<bool> {
    let listing = run_checked(shell, MOUNT_LIST_COMMAND).await?;
    Ok(mount_table_contains(&listing.output, target_path))
}

/// Bind-mount `staging_path` onto `target_path`.
///
/// # Errors
///
/// Returns `AppError::Exec` if the mount command fails.
pub async fn bind_mount(shell: &dyn RemoteShell, staging_path: &str, target_path: &str) -> Result<()> {
    run_checked(shell, &bind_mount_command(staging_path, target_path)).await?;
    info!(staging = staging_path, target = target_path, "bind mount applied");
    Ok(())
}

/// Remove the mount at `target_path`.
///
/// Not part of the automatic reconcile loop; used for manual recovery.
///
/// # Errors
///
/// Returns `AppError::Exec` if the unmount command fails.
pub async fn unmount(shell: &dyn RemoteShell, target_path: &str) -> Result<()> {
    run_checked(shell, &unmount_command(target_path)).await?;
    info!(target = target_path, "unmounted");
    Ok(())
}

/// Download `source_url` to `destination_path` on the device.
///
/// # Errors
///
/// Returns `AppError::Exec` carrying the command output if the download fails.
pub async fn fetch(shell: &dyn RemoteShell, source_url: &str, destination_path: &str) -> Result<()> {
    run_checked(shell, &fetch_command(source_url, destination_path)).await?;
    info!(source = source_url, destination = destination_path, "downloaded asset");
    Ok(())
}

/// Run `command`, promoting a non-zero exit status to `AppError::Exec`.
async fn run_checked(shell: &dyn RemoteShell, command: &str) -> Result<CommandOutput> {
    debug!(command, "running remote command");
    let output = shell.exec(command).await?;
    if output.success() {
        Ok(output)
    } else {
        Err(AppError::Exec(format!(
            "`{command}` exited with status {}\noutput: {}",
            output.exit_status,
            output.output.trim_end()
        )))
    }
}
