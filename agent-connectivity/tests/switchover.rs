mod support;

use std::time::Duration;

use agent_connectivity::{CheckOutcome, ConnectivityEvent, SwitchoverPhase};
use support::{Harness, endpoints, locator, wait_until};

fn on_secondary() -> Harness {
    let harness = Harness::with_settings(|settings| settings.server = locator("s2"));
    harness.server.set_failover_list(Some(endpoints(&["s1", "s2", "s3"])));
    harness
}

#[tokio::test(start_paused = true)]
async fn returns_to_reachable_primary() {
    let harness = on_secondary();
    harness.identifier.set_reachable("s1");

    assert_eq!(harness.runtime.switchover().check_primary().await, CheckOutcome::Switched);
    assert_eq!(harness.server_address(), "s1");
    assert_eq!(harness.server.endpoint(), "socket://s1:7080/");
    assert_eq!(harness.runtime.context().failover_list.current().index(), 0);
    assert!(harness.runtime.store().path().exists());
}

#[tokio::test(start_paused = true)]
async fn stays_put_while_primary_is_down() {
    let harness = on_secondary();

    assert_eq!(
        harness.runtime.switchover().check_primary().await,
        CheckOutcome::PrimaryUnreachable
    );
    assert_eq!(harness.server_address(), "s2");
    assert_eq!(harness.server.connects(), 0);
}

#[tokio::test(start_paused = true)]
async fn already_on_primary_only_refreshes_the_list() {
    let harness = Harness::new();
    harness.server.set_failover_list(Some(endpoints(&["s1", "s2"])));
    let mut events = harness.runtime.context().events.subscribe();

    assert_eq!(
        harness.runtime.switchover().check_primary().await,
        CheckOutcome::AlreadyOnPrimary
    );
    assert_eq!(harness.runtime.context().failover_list.current().index(), 1);
    assert_eq!(
        events.recv().await.unwrap(),
        ConnectivityEvent::FailoverListUpdated { size: 2 }
    );
}

#[tokio::test(start_paused = true)]
async fn unchanged_list_keeps_its_cursor() {
    let harness = on_secondary();
    harness.install_list(&["s1", "s2", "s3"]);
    let installed = harness.runtime.context().failover_list.current();
    let _ = installed.next();
    let _ = installed.next();
    let mut events = harness.runtime.context().events.subscribe();

    assert_eq!(
        harness.runtime.switchover().check_primary().await,
        CheckOutcome::PrimaryUnreachable
    );
    let current = harness.runtime.context().failover_list.current();
    assert!(std::sync::Arc::ptr_eq(&installed, &current));
    assert_eq!(current.index(), 2);
    assert!(!harness.runtime.store().path().exists());
    assert!(events.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn changed_list_is_stored_and_installed() {
    let harness = on_secondary();
    harness.install_list(&["s2", "s3"]);

    assert_eq!(
        harness.runtime.switchover().check_primary().await,
        CheckOutcome::PrimaryUnreachable
    );
    let current = harness.runtime.context().failover_list.current();
    assert_eq!(current.size(), 3);
    assert_eq!(current.index(), 0);
    let persisted = std::fs::read_to_string(harness.runtime.store().path()).unwrap();
    assert_eq!(persisted, "s1:7080/7443\ns2:7080/7443\ns3:7080/7443\n");
}

#[tokio::test(start_paused = true)]
async fn repeated_checks_on_primary_do_not_walk_the_cursor() {
    let harness = Harness::new();
    harness.server.set_failover_list(Some(endpoints(&["s1", "s2", "s3"])));

    for _ in 0..3 {
        assert_eq!(
            harness.runtime.switchover().check_primary().await,
            CheckOutcome::AlreadyOnPrimary
        );
    }
    assert_eq!(harness.runtime.context().failover_list.current().index(), 1);
}

#[tokio::test(start_paused = true)]
async fn missing_list_clears_persisted_copy() {
    let harness = on_secondary();
    harness.identifier.set_reachable("s1");
    assert_eq!(harness.runtime.switchover().check_primary().await, CheckOutcome::Switched);

    harness.server.set_failover_list(None);
    assert_eq!(harness.runtime.switchover().check_primary().await, CheckOutcome::NoList);
    assert!(!harness.runtime.store().path().exists());
    assert!(harness.runtime.context().failover_list.current().is_empty());
}

#[tokio::test(start_paused = true)]
async fn no_check_while_not_sending() {
    let harness = on_secondary();
    harness.sender.set_sending(false);

    assert_eq!(harness.runtime.switchover().check_primary().await, CheckOutcome::NotSending);
    assert!(harness.runtime.context().failover_list.current().is_empty());
}

#[tokio::test(start_paused = true)]
async fn check_now_wakes_the_worker() {
    let harness = Harness::with_settings(|settings| {
        settings.server = locator("s2");
        settings.register_with_server_at_startup = false;
        settings.security_token = Some("tok".into());
    });
    harness.server.set_failover_list(Some(endpoints(&["s1", "s2"])));
    harness.identifier.set_reachable("s1");

    harness.runtime.start().unwrap();
    assert!(wait_until(|| harness.runtime.switchover().phase() == SwitchoverPhase::Sleeping).await);
    harness.runtime.perform_primary_server_switchover_check();

    assert!(wait_until(|| harness.server_address() == "s1").await);
    harness.runtime.shutdown().await;
    assert_eq!(harness.runtime.switchover().phase(), SwitchoverPhase::Stopped);
}

#[tokio::test(start_paused = true)]
async fn periodic_check_runs_on_its_interval() {
    let harness = Harness::with_settings(|settings| {
        settings.server = locator("s2");
        settings.primary_server_switchover_check_interval_msecs = 5_000;
        settings.register_with_server_at_startup = false;
        settings.security_token = Some("tok".into());
    });
    harness.server.set_failover_list(Some(endpoints(&["s1", "s2"])));
    harness.identifier.set_reachable("s1");

    harness.runtime.start().unwrap();
    tokio::time::sleep(Duration::from_secs(4)).await;
    assert_eq!(harness.server_address(), "s2");

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(wait_until(|| harness.server_address() == "s1").await);
    harness.runtime.shutdown().await;
}

#[tokio::test]
async fn disabled_interval_never_starts_worker() {
    let harness = Harness::with_settings(|settings| {
        settings.primary_server_switchover_check_interval_msecs = 0;
        settings.register_with_server_at_startup = false;
        settings.security_token = Some("tok".into());
    });

    harness.runtime.start().unwrap();
    assert_eq!(harness.runtime.switchover().phase(), SwitchoverPhase::Idle);
    harness.runtime.shutdown().await;
}
