//! Unit tests for the remote command primitives.
//!
//! Validates command shapes, mount-table matching, and that non-zero exits
//! surface as `AppError::Exec` carrying the remote output.

use std::collections::VecDeque;
use std::sync::Mutex;

use bindkeeper::remote::commands::{
    bind_mount, bind_mount_command, check_mounted, fetch, unmount, unmount_command,
};
use bindkeeper::remote::{BoxFuture, CommandOutput, RemoteShell};
use bindkeeper::{AppError, Result};

/// Replays canned responses and records every command it was given.
struct ScriptedShell {
    responses: Mutex<VecDeque<Result<CommandOutput>>>,
    seen: Mutex<Vec<String>>,
}

impl ScriptedShell {
    fn new(responses: Vec<Result<CommandOutput>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            seen: Mutex::new(Vec::new()),
        }
    }

    fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

impl RemoteShell for ScriptedShell {
    fn exec<'a>(&'a self, command: &'a str) -> BoxFuture<'a, Result<CommandOutput>> {
        self.seen.lock().unwrap().push(command.to_owned());
        let response = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(CommandOutput::ok("")));
        Box::pin(async move { response })
    }
}

const TARGET: &str = "/usr/etc/gui/screen_240x240/Welcome_Anim_60.png";

const MOUNT_TABLE: &str = "\
rootfs on / type rootfs (rw)
/dev/mmcblk0p7 on /mnt/log type ext4 (rw,relatime)
/dev/mmcblk0p7 on /usr/etc/gui/screen_240x240/Welcome_Anim_60.png type ext4 (rw,relatime)
";

#[tokio::test]
async fn check_mounted_finds_target_in_listing() {
    let shell = ScriptedShell::new(vec![Ok(CommandOutput::ok(MOUNT_TABLE))]);

    assert!(check_mounted(&shell, TARGET).await.unwrap());
    assert_eq!(shell.seen(), vec!["mount"]);
}

#[tokio::test]
async fn check_mounted_reports_absent_target() {
    let shell = ScriptedShell::new(vec![Ok(CommandOutput::ok(
        "rootfs on / type rootfs (rw)\n",
    ))]);

    assert!(!check_mounted(&shell, TARGET).await.unwrap());
}

#[tokio::test]
async fn check_mounted_propagates_channel_failure() {
    let shell = ScriptedShell::new(vec![Err(AppError::Session("channel refused".into()))]);

    let err = check_mounted(&shell, TARGET).await.unwrap_err();
    assert!(matches!(err, AppError::Session(_)));
}

#[tokio::test]
async fn check_mounted_fails_on_nonzero_exit() {
    let shell = ScriptedShell::new(vec![Ok(CommandOutput::failed("mount: not found", 127))]);

    let err = check_mounted(&shell, TARGET).await.unwrap_err();
    assert!(matches!(err, AppError::Exec(_)));
}

#[tokio::test]
async fn bind_mount_issues_single_bind_command() {
    let shell = ScriptedShell::new(vec![]);

    bind_mount(&shell, "/mnt/log/custom.png", TARGET).await.unwrap();

    assert_eq!(
        shell.seen(),
        vec![format!("mount -o bind '/mnt/log/custom.png' '{TARGET}'")]
    );
    assert_eq!(shell.seen()[0], bind_mount_command("/mnt/log/custom.png", TARGET));
}

#[tokio::test]
async fn unmount_issues_umount_command() {
    let shell = ScriptedShell::new(vec![]);

    unmount(&shell, TARGET).await.unwrap();

    assert_eq!(shell.seen(), vec![unmount_command(TARGET)]);
    assert_eq!(shell.seen()[0], format!("umount '{TARGET}'"));
}

#[tokio::test]
async fn unmount_failure_is_exec_error() {
    let shell = ScriptedShell::new(vec![Ok(CommandOutput::failed(
        format!("umount: {TARGET}: not mounted"),
        1,
    ))]);

    let err = unmount(&shell, TARGET).await.unwrap_err();
    assert!(err.to_string().contains("not mounted"));
}

#[tokio::test]
async fn fetch_failure_carries_command_output() {
    let shell = ScriptedShell::new(vec![Ok(CommandOutput::failed(
        "curl: (22) The requested URL returned error: 404",
        22,
    ))]);

    let err = fetch(&shell, "https://cdn.example.com/missing.png", "/mnt/log/custom.png")
        .await
        .unwrap_err();

    let message = err.to_string();
    assert!(message.starts_with("exec:"));
    assert!(message.contains("status 22"));
    assert!(message.contains("returned error: 404"));
}

#[tokio::test]
async fn fetch_uses_insecure_curl_into_destination() {
    let shell = ScriptedShell::new(vec![]);

    fetch(&shell, "https://cdn.example.com/w.png", "/mnt/log/custom.png")
        .await
        .unwrap();

    let seen = shell.seen();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].starts_with("curl "));
    assert!(seen[0].contains("-o '/mnt/log/custom.png'"));
    assert!(seen[0].contains("'https://cdn.example.com/w.png'"));
    assert!(seen[0].ends_with("--insecure"));
}
