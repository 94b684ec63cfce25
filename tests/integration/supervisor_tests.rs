//! Integration tests for the reconnect supervisor.
//!
//! Runs the supervisor on a paused clock against the fake device and
//! validates dial pacing, session release, and end-to-end repair flows.

use std::sync::Arc;
use std::time::Duration;

use bindkeeper::orchestrator::Supervisor;
use bindkeeper::remote::Connector;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::test_helpers::{
    boot_asset, welcome_asset, FakeConnector, FakeDevice, BOOT_TARGET, WELCOME_TARGET,
};

const POLL: Duration = Duration::from_secs(30);
const RECONNECT: Duration = Duration::from_secs(5);

fn spawn_supervisor(
    connector: &Arc<FakeConnector>,
    assets: Vec<bindkeeper::models::ManagedAsset>,
) -> (CancellationToken, JoinHandle<()>) {
    let connector: Arc<dyn Connector> = Arc::clone(connector) as Arc<dyn Connector>;
    let supervisor = Supervisor::with_timing(connector, assets, POLL, RECONNECT);
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let handle = tokio::spawn(async move { supervisor.run(&token).await });
    (cancel, handle)
}

async fn advance(secs: u64) {
    tokio::time::sleep(Duration::from_secs(secs)).await;
}

#[tokio::test(start_paused = true)]
async fn dial_failure_redials_once_per_delay() {
    let device = FakeDevice::new();
    let connector = FakeConnector::failing(&device, usize::MAX);
    let (cancel, handle) = spawn_supervisor(&connector, vec![welcome_asset()]);

    advance(1).await;
    assert_eq!(connector.dials(), 1);

    advance(3).await; // t=4, still backing off
    assert_eq!(connector.dials(), 1);

    advance(2).await; // t=6
    assert_eq!(connector.dials(), 2);

    advance(5).await; // t=11
    assert_eq!(connector.dials(), 3);

    assert!(device.commands().is_empty(), "no commands without a session");

    cancel.cancel();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn unmounted_asset_is_repaired_then_observed_mounted() {
    let device = FakeDevice::new();
    let connector = FakeConnector::new(&device);
    let (cancel, handle) = spawn_supervisor(&connector, vec![welcome_asset()]);

    advance(1).await;
    assert!(device.is_mounted(WELCOME_TARGET));
    assert_eq!(device.fetches(), 2, "provisioning plus repair");
    assert_eq!(device.bind_mounts(), 1);

    advance(30).await; // second poll at t=30
    assert_eq!(device.listings(), 2);
    assert_eq!(device.fetches(), 2, "no action once mounted");
    assert_eq!(device.bind_mounts(), 1);
    assert_eq!(connector.dials(), 1, "healthy session is kept");

    cancel.cancel();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn listing_failure_reconnects_and_reprovisions() {
    let device = FakeDevice::new();
    device.fail_next_listings(1);
    let connector = FakeConnector::new(&device);
    let (cancel, handle) = spawn_supervisor(&connector, vec![welcome_asset()]);

    advance(1).await;
    assert_eq!(connector.dials(), 1);
    assert_eq!(device.fetches(), 1, "provisioning ran before the failed poll");
    assert_eq!(device.closed_sessions(), 1, "dead session is released");

    advance(5).await; // t=6, redial at t=5
    assert_eq!(connector.dials(), 2);
    assert_eq!(device.fetches(), 3, "provisioning repeats, then repair");
    assert!(device.is_mounted(WELCOME_TARGET));
    assert_eq!(device.closed_sessions(), 1);

    cancel.cancel();
    handle.await.unwrap();
    assert_eq!(device.closed_sessions(), 2, "cancellation releases the live session");
}

#[tokio::test(start_paused = true)]
async fn nonzero_listing_exit_reconnects() {
    let device = FakeDevice::new();
    device.mount(WELCOME_TARGET);
    device.fail_next_listings_with_exit(1);
    let connector = FakeConnector::new(&device);
    let (cancel, handle) = spawn_supervisor(&connector, vec![welcome_asset()]);

    advance(1).await;
    assert_eq!(connector.dials(), 1);
    assert_eq!(device.closed_sessions(), 1, "session dropped after failed listing");
    assert_eq!(device.bind_mounts(), 0);

    advance(5).await; // t=6, redial at t=5
    assert_eq!(connector.dials(), 2);
    assert_eq!(device.listings(), 2);
    assert_eq!(device.bind_mounts(), 0, "mount was intact all along");

    cancel.cancel();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn transient_dial_failure_recovers() {
    let device = FakeDevice::new();
    device.mount(WELCOME_TARGET);
    device.mount(BOOT_TARGET);
    let connector = FakeConnector::failing(&device, 2);
    let (cancel, handle) = spawn_supervisor(&connector, vec![welcome_asset(), boot_asset()]);

    advance(11).await; // dials at t=0, 5, 10
    assert_eq!(connector.dials(), 3);
    assert_eq!(device.fetches(), 2, "one provisioning pass");
    assert_eq!(device.listings(), 2, "one poll across both assets");
    assert_eq!(device.bind_mounts(), 0);

    cancel.cancel();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn cancellation_during_backoff_stops_supervisor() {
    let device = FakeDevice::new();
    let connector = FakeConnector::failing(&device, usize::MAX);
    let (cancel, handle) = spawn_supervisor(&connector, vec![welcome_asset()]);

    advance(1).await;
    cancel.cancel();
    handle.await.unwrap();

    advance(60).await;
    assert_eq!(connector.dials(), 1, "no dials after cancellation");
}
