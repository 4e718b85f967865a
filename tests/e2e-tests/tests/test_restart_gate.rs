//! The restart gate shared by operators and the reboot scheduler.

use chrono::{Duration as ChronoDuration, Utc};
use e2e_tests::assertions::assert_launches;
use e2e_tests::Stack;
use mcops_common::ErrorCode;
use mcops_operations::{Actor, OperationParams, OperationStatus, SERVER_RESTART};
use mcops_scheduler::RebootState;

fn restart(source: &str) -> OperationParams {
    OperationParams::new().with("source", source)
}

#[tokio::test]
async fn test_operator_restart_then_cooldown() {
    let stack = Stack::new().await;
    stack.boot().await;
    let operator = stack.operator();

    let first = stack
        .registry
        .execute(SERVER_RESTART, &operator, restart("deploy"), None)
        .await
        .unwrap();
    assert_eq!(first.status, OperationStatus::Succeeded, "{:?}", first.error);
    assert_launches(&stack.host, 2).unwrap();
    assert!(stack.host.console_commands().iter().any(|c| c == "stop"));

    let second = stack
        .registry
        .execute(SERVER_RESTART, &operator, restart("deploy"), None)
        .await
        .unwrap();
    assert_eq!(second.status, OperationStatus::Rejected);
    assert_eq!(second.error_code, Some(ErrorCode::RestartCooldown));
    let retry_after = second.retry_after_seconds.unwrap();
    assert!(retry_after > 0 && retry_after <= 120);
    assert_launches(&stack.host, 2).unwrap();

    let gate = stack.supervisor.status().await.restart_gate;
    assert_eq!(gate.last_source.as_deref(), Some("deploy"));
    assert_eq!(gate.last_success, Some(true));
    assert!(!gate.in_progress);
}

#[tokio::test]
async fn test_concurrent_restarts_admit_one() {
    let stack = Stack::new().await;
    stack.boot().await;
    let alice = Actor::admin("alice@example.com");
    let bob = Actor::admin("bob@example.com");

    let (a, b) = tokio::join!(
        stack.registry.execute(SERVER_RESTART, &alice, restart("alice"), None),
        stack.registry.execute(SERVER_RESTART, &bob, restart("bob"), None),
    );
    let outcomes = [a.unwrap(), b.unwrap()];

    let succeeded = outcomes.iter().filter(|o| o.success).count();
    assert_eq!(succeeded, 1);
    let rejected = outcomes.iter().find(|o| !o.success).unwrap();
    assert_eq!(rejected.status, OperationStatus::Rejected);
    assert!(matches!(
        rejected.error_code,
        Some(ErrorCode::RestartInProgress) | Some(ErrorCode::RestartCooldown)
    ));
    assert_launches(&stack.host, 2).unwrap();
}

#[tokio::test]
async fn test_scheduler_skips_during_operator_cooldown() {
    let stack = Stack::new().await;
    stack.boot().await;
    let scheduler = stack.reboot_scheduler().await;
    scheduler.enable().await.unwrap();

    let outcome = stack
        .registry
        .execute(SERVER_RESTART, &stack.operator(), restart("operator"), None)
        .await
        .unwrap();
    assert!(outcome.success);

    let t0 = Utc::now();
    scheduler.tick_at(t0).await;
    scheduler.trigger_now("maintenance").unwrap();
    scheduler.tick_at(t0 + ChronoDuration::seconds(1)).await;

    let status = scheduler.status();
    assert_eq!(status.state, RebootState::Monitoring);
    assert!(status.error_message.is_none());
    let skipped = scheduler
        .recent_log(10)
        .into_iter()
        .find(|e| e.action == "restart_skipped")
        .unwrap();
    assert!(skipped.details.contains("restart_cooldown"));
    assert_launches(&stack.host, 2).unwrap();
}
