mod support;

use std::time::Duration;

use agent_connectivity::{CommError, RegistrationOutcome};
use support::{Harness, RegisterReply, endpoints, locator, wait_until};

#[tokio::test(start_paused = true)]
async fn registration_stores_token_and_commits_list() {
    let harness = Harness::with_settings(|settings| settings.security_token = Some("old".into()));
    harness.server.set_failover_list(Some(endpoints(&["s1", "s2", "s3"])));
    harness.server.queue(RegisterReply::Token("tok-A".into()));

    let outcome = harness.runtime.register_with_server(Duration::from_secs(5), false).await;
    assert_eq!(outcome, Some(RegistrationOutcome::Registered));

    assert_eq!(harness.config.security_token().as_deref(), Some("tok-A"));
    assert_eq!(harness.server.token().as_deref(), Some("tok-A"));
    assert_eq!(harness.server.tokens_at_register(), [None]);
    let request = &harness.server.requests()[0];
    assert_eq!(request.agent_name, "web-01");
    assert_eq!(request.original_token.as_deref(), Some("old"));
    assert!(!request.regenerate_token);

    let persisted = std::fs::read_to_string(harness.runtime.store().path()).unwrap();
    assert_eq!(persisted, "s1:7080/7443\ns2:7080/7443\ns3:7080/7443\n");

    let list = harness.runtime.context().failover_list.current();
    assert_eq!(list.size(), 3);
    assert_eq!(list.index(), 1);
    assert_eq!(harness.server.endpoint(), "socket://s1:7080/");
    assert!(harness.runtime.registration().is_registered());
    assert_eq!(
        harness.runtime.registration().last_results().map(|results| results.agent_token),
        Some("tok-A".into())
    );
}

#[tokio::test(start_paused = true)]
async fn registration_moves_agent_to_primary() {
    let harness = Harness::with_settings(|settings| settings.server = locator("s3"));
    harness.server.set_failover_list(Some(endpoints(&["s1", "s2", "s3"])));

    let outcome = harness.runtime.register_with_server(Duration::from_secs(5), false).await;
    assert_eq!(outcome, Some(RegistrationOutcome::Registered));
    assert_eq!(harness.server_address(), "s1");
    assert_eq!(harness.server.endpoint(), "socket://s1:7080/");
    assert_eq!(harness.runtime.context().failover_list.current().index(), 0);
}

#[tokio::test(start_paused = true)]
async fn newer_registration_cancels_the_one_in_flight() {
    let harness = Harness::with_settings(|settings| settings.security_token = Some("old".into()));
    harness.server.queue(RegisterReply::Hang);
    harness.server.queue(RegisterReply::Token("tok-2".into()));

    assert_eq!(harness.runtime.register_with_server(Duration::ZERO, false).await, None);
    assert!(wait_until(|| harness.server.registers() == 1).await);

    let outcome = harness.runtime.register_with_server(Duration::from_secs(5), true).await;
    assert_eq!(outcome, Some(RegistrationOutcome::Registered));
    assert_eq!(harness.server.registers(), 2);
    assert_eq!(harness.config.security_token().as_deref(), Some("tok-2"));
    assert_eq!(harness.server.token().as_deref(), Some("tok-2"));

    let second = &harness.server.requests()[1];
    assert_eq!(second.original_token.as_deref(), Some("old"));
    assert!(second.regenerate_token);
}

#[tokio::test(start_paused = true)]
async fn unreachable_failover_list_is_retried_without_committing() {
    let harness = Harness::with_settings(|settings| settings.test_failover_list_at_startup = true);
    harness.server.set_failover_list(Some(endpoints(&["s1", "s2"])));
    harness.probe.set_unreachable("s1");
    harness.probe.set_unreachable("s2");

    let outcome = harness.runtime.register_with_server(Duration::from_secs(45), false).await;
    assert_eq!(outcome, None);
    assert_eq!(harness.server.registers(), 2);
    assert!(harness.config.security_token().is_none());
    assert!(harness.server.token().is_none());
    assert!(!harness.runtime.store().path().exists());
    assert!(harness.runtime.context().failover_list.current().is_empty());
    assert_eq!(harness.console.messages().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn partially_unreachable_list_is_accepted() {
    let harness = Harness::with_settings(|settings| settings.test_failover_list_at_startup = true);
    harness.server.set_failover_list(Some(endpoints(&["s1", "s2", "s3"])));
    harness.probe.set_unreachable("s2");

    let outcome = harness.runtime.register_with_server(Duration::from_secs(5), false).await;
    assert_eq!(outcome, Some(RegistrationOutcome::Registered));
    assert_eq!(harness.config.security_token().as_deref(), Some("token-1"));
    assert!(harness.runtime.store().path().exists());
    assert_eq!(harness.runtime.context().failover_list.current().size(), 3);
}

#[tokio::test(start_paused = true)]
async fn absent_list_deletes_persisted_copy() {
    let harness = Harness::new();
    harness.server.set_failover_list(Some(endpoints(&["s1", "s2"])));
    harness.runtime.register_with_server(Duration::from_secs(5), false).await;
    assert!(harness.runtime.store().path().exists());

    harness.server.set_failover_list(None);
    let outcome = harness.runtime.register_with_server(Duration::from_secs(5), false).await;
    assert_eq!(outcome, Some(RegistrationOutcome::Registered));
    assert!(!harness.runtime.store().path().exists());
    assert!(harness.runtime.context().failover_list.current().is_empty());
}

#[tokio::test(start_paused = true)]
async fn unsupported_version_requests_update() {
    let harness = Harness::new();
    harness
        .server
        .queue(RegisterReply::Fail(CommError::NotSupported("agent 0.3.0".into())));

    let outcome = harness.runtime.register_with_server(Duration::from_secs(5), false).await;
    assert_eq!(outcome, Some(RegistrationOutcome::VersionMismatch));
    assert_eq!(harness.updater.calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert!(harness.config.security_token().is_none());
    assert!(
        harness
            .console
            .messages()
            .iter()
            .any(|message| message.contains("does not support"))
    );
}

#[tokio::test(start_paused = true)]
async fn repeated_rejection_gives_up() {
    let harness = Harness::new();
    for _ in 0..5 {
        harness
            .server
            .queue(RegisterReply::Fail(CommError::Rejected("unknown agent".into())));
    }

    let outcome = harness.runtime.register_with_server(Duration::from_secs(600), false).await;
    assert_eq!(outcome, Some(RegistrationOutcome::Rejected));
    assert_eq!(harness.server.registers(), 5);
    assert_eq!(harness.console.messages().len(), 5);
    assert!(harness.config.security_token().is_none());
}

#[tokio::test(start_paused = true)]
async fn generic_failures_back_off_exponentially() {
    let harness = Harness::new();
    for _ in 0..3 {
        harness
            .server
            .queue(RegisterReply::Fail(CommError::remote("database unavailable")));
    }

    let started = tokio::time::Instant::now();
    let outcome = harness.runtime.register_with_server(Duration::from_secs(60), false).await;
    assert_eq!(outcome, Some(RegistrationOutcome::Registered));

    let times = harness.server.register_times();
    assert_eq!(times.len(), 4);
    assert_eq!(times[0], started);
    let gaps: Vec<u64> = times
        .windows(2)
        .map(|pair| (pair[1] - pair[0]).as_secs())
        .collect();
    assert_eq!(gaps, [1, 2, 4]);
}

#[tokio::test(start_paused = true)]
async fn registration_waits_for_the_sender() {
    let harness = Harness::new();
    harness.sender.set_sending(false);

    assert_eq!(harness.runtime.register_with_server(Duration::ZERO, false).await, None);
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(harness.server.registers(), 0);

    harness.sender.set_sending(true);
    assert!(wait_until(|| harness.config.security_token().is_some()).await);
    assert_eq!(harness.server.registers(), 1);
}

#[tokio::test(start_paused = true)]
async fn shutdown_cancels_registration_and_restores_token() {
    let harness = Harness::with_settings(|settings| settings.security_token = Some("old".into()));
    harness.server.queue(RegisterReply::Hang);

    assert_eq!(harness.runtime.register_with_server(Duration::ZERO, false).await, None);
    assert!(wait_until(|| harness.server.registers() == 1).await);
    assert!(harness.config.security_token().is_none());

    harness.runtime.shutdown().await;
    assert!(wait_until(|| harness.config.security_token().as_deref() == Some("old")).await);
    assert_eq!(harness.server.token().as_deref(), Some("old"));
}

#[tokio::test(start_paused = true)]
async fn loopback_agent_endpoint_warns_once() {
    let harness = Harness::with_settings(|settings| {
        settings.bind_address = "127.0.0.1".into();
        settings.bind_port = 16163;
        settings.server = locator("s1");
    });

    harness.runtime.register_with_server(Duration::from_secs(5), false).await;
    harness.runtime.register_with_server(Duration::from_secs(5), false).await;

    let messages = harness.console.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("loopback"));
    assert!(messages[0].contains("127.0.0.1:16163"));
    let requests = harness.server.requests();
    assert_eq!(requests.len(), 2);
    assert!(
        requests
            .iter()
            .all(|request| request.remote_endpoint == "socket://127.0.0.1:16163/")
    );
}

#[tokio::test(start_paused = true)]
async fn loopback_server_address_does_not_warn() {
    let harness = Harness::with_settings(|settings| {
        settings.bind_address = "10.0.0.9".into();
        settings.server = locator("127.0.0.1");
    });

    harness.runtime.register_with_server(Duration::from_secs(5), false).await;

    assert!(harness.console.messages().is_empty());
    let request = &harness.server.requests()[0];
    assert_eq!(request.remote_endpoint, "socket://10.0.0.9:16163/");
}
