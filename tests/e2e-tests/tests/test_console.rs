//! Console tail following the server log across a restart.

use e2e_tests::assertions::wait_until;
use e2e_tests::Stack;
use mcops_console::{ConsoleEntry, ConsoleTail, Marker, TailConfig};
use mcops_operations::{OperationParams, SERVER_RESTART};
use std::time::Duration;

fn count(entries: &[ConsoleEntry], needle: &str) -> usize {
    entries.iter().filter(|e| e.message.contains(needle)).count()
}

#[tokio::test]
async fn test_tail_follows_restart_and_keeps_history() {
    let stack = Stack::new().await;
    stack.boot().await;

    let config = TailConfig {
        poll_interval: Duration::from_millis(20),
        ..TailConfig::for_server_dir(&stack.server_dir())
    };
    let tail = ConsoleTail::new(config.clone());

    println!("Step 1: attach to the running server");
    tail.attach().await.unwrap();
    let backfill = tail.recent(100, 0, true);
    assert_eq!(count(&backfill, "Done ("), 1);
    assert_eq!(backfill.last().unwrap().marker, Some(Marker::Reattached));
    assert!(backfill.iter().all(|e| !e.is_noise()));
    assert!(tail.recent(100, 0, false).iter().any(|e| e.is_noise()));

    println!("Step 2: restart through the registry");
    let mut rx = tail.subscribe();
    let outcome = stack
        .registry
        .execute(
            SERVER_RESTART,
            &stack.operator(),
            OperationParams::new().with("source", "console-e2e"),
            None,
        )
        .await
        .unwrap();
    assert!(outcome.success, "{:?}", outcome.error);

    wait_until(Duration::from_secs(5), || {
        let entries = tail.recent(500, 0, true);
        async move { count(&entries, "Starting minecraft server") >= 2 }
    })
    .await
    .unwrap();

    let entries = tail.recent(500, 0, true);
    assert_eq!(count(&entries, "Stopping server"), 1);

    let mut received = Vec::new();
    while let Ok(entry) = rx.try_recv() {
        received.push(entry);
    }
    assert!(count(&received, "Stopping server") >= 1);
    assert!(received.iter().all(|e| !e.is_noise()));

    println!("Step 3: stop saves history for the next daemon");
    tail.stop().await.unwrap();
    assert!(!tail.is_running());
    assert_eq!(tail.recent(1, 0, true)[0].marker, Some(Marker::ServerStopped));

    let next = ConsoleTail::new(config);
    let restored = next.restore_history().await.unwrap();
    assert!(restored > 0);
    assert_eq!(count(&next.recent(500, 0, true), "Starting minecraft server"), 2);
}
