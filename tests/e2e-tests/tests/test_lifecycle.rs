//! Lifecycle operations through the registry against the simulated host.

use e2e_tests::assertions::{assert_console_received, assert_launches};
use e2e_tests::Stack;
use mcops_common::{ErrorCode, StateReason};
use mcops_operations::{
    OperationParams, OperationStatus, TraceStatus, SERVER_COMMAND, SERVER_RECOVER, SERVER_START, SERVER_STOP,
};
use mcops_process::StopSignal;

#[tokio::test]
async fn test_start_command_stop() {
    let stack = Stack::new().await;
    let operator = stack.operator();

    println!("Step 1: start through the registry");
    let started = stack
        .registry
        .execute(SERVER_START, &operator, OperationParams::new(), None)
        .await
        .unwrap();
    assert_eq!(started.status, OperationStatus::Succeeded, "{:?}", started.error);
    assert_launches(&stack.host, 1).unwrap();
    assert_console_received(&stack.host, "list").unwrap();

    let health = stack.supervisor.health().await;
    assert!(health.healthy);
    assert_eq!(health.state_reason, StateReason::Ok);

    println!("Step 2: player count over the remote console");
    stack.host.set_players(4);
    let status = stack.supervisor.status().await;
    assert_eq!(status.players_online, Some(4));
    assert_eq!(status.max_players, Some(20));
    assert!(status.rcon_port_listening);

    println!("Step 3: console command");
    let sent = stack
        .registry
        .execute(
            SERVER_COMMAND,
            &operator,
            OperationParams::new().with("command", "say maintenance at noon"),
            None,
        )
        .await
        .unwrap();
    assert!(sent.success);
    assert_console_received(&stack.host, "say maintenance at noon").unwrap();

    let refused = stack
        .registry
        .execute(SERVER_COMMAND, &operator, OperationParams::new().with("command", "/op Steve"), None)
        .await
        .unwrap();
    assert_eq!(refused.status, OperationStatus::Failed);
    assert_eq!(refused.error_code, Some(ErrorCode::DangerousCommand));
    assert!(!stack.host.console_commands().iter().any(|c| c.contains("op Steve")));

    println!("Step 4: graceful stop over the remote console");
    let stopped = stack
        .registry
        .execute(SERVER_STOP, &operator, OperationParams::new(), None)
        .await
        .unwrap();
    assert!(stopped.success, "{:?}", stopped.error);
    assert_eq!(stopped.data["method"], "rcon");
    assert!(!stack.host.is_alive());
    assert!(stack.host.signals().is_empty());
    assert!(!stack.supervisor.health().await.process_running);

    let again = stack
        .registry
        .execute(SERVER_STOP, &operator, OperationParams::new(), None)
        .await
        .unwrap();
    assert_eq!(again.error_code, Some(ErrorCode::NotRunning));

    println!("Step 5: trace and audit");
    let trace = stack.registry.recent_trace(50).await.unwrap();
    let finished: Vec<_> = trace.iter().filter(|r| r.status != TraceStatus::Started).collect();
    assert_eq!(finished.len(), 5);
    assert!(finished.iter().all(|r| r.actor == "ops@example.com"));

    let audit = std::fs::read_to_string(stack.audit_path()).unwrap();
    let lines: Vec<serde_json::Value> = audit.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
    assert_eq!(lines.len(), 5);
    assert_eq!(lines[0]["action"], SERVER_START);
    assert_eq!(lines[0]["result"], "succeeded");
}

#[tokio::test]
async fn test_hung_server_falls_back_to_sigterm() {
    let stack = Stack::new().await;
    stack.boot().await;
    stack.host.set_ignore_stop(true);

    // SIGTERM still works on the simulated process
    let outcome = stack.supervisor.stop(false).await;
    assert!(outcome.success);
    assert_eq!(stack.host.signals(), vec![StopSignal::Terminate]);
    assert_console_received(&stack.host, "stop").unwrap();
}

#[tokio::test]
async fn test_recover_cleans_stale_pid_and_starts() {
    let stack = Stack::new().await;
    let pid_file = stack.server_dir().join("server.pid");
    std::fs::write(&pid_file, "999999\n").unwrap();

    let health = stack.supervisor.health().await;
    assert_eq!(health.state_reason, StateReason::StalePid);

    let outcome = stack
        .registry
        .execute(SERVER_RECOVER, &stack.operator(), OperationParams::new(), None)
        .await
        .unwrap();
    assert!(outcome.success, "{:?}", outcome.error);
    assert_launches(&stack.host, 1).unwrap();
    assert!(stack.supervisor.health().await.healthy);

    let written = std::fs::read_to_string(&pid_file).unwrap();
    assert_ne!(written.trim(), "999999");
}
