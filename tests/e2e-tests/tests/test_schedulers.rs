//! Reboot and backup schedulers driving the real supervisor.

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use e2e_tests::assertions::{assert_console_received, assert_launches};
use e2e_tests::stack::REMOTE_FOLDER;
use e2e_tests::Stack;
use mcops_scheduler::{BackupState, RebootState, RebootTrigger, SchedulerKind};

fn backup_due() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 2, 8, 5, 0, 0).unwrap()
}

fn actions(entries: Vec<mcops_scheduler::ActionLogEntry>) -> Vec<String> {
    entries.into_iter().rev().map(|e| e.action).collect()
}

#[tokio::test]
async fn test_empty_server_reboot() {
    let stack = Stack::new().await;
    stack.boot().await;
    let reboot = stack.reboot_scheduler().await;
    reboot.enable().await.unwrap();

    let t0 = Utc::now();
    reboot.tick_at(t0).await;
    assert_eq!(reboot.status().empty_since, Some(t0));
    assert_launches(&stack.host, 1).unwrap();

    reboot.tick_at(t0 + ChronoDuration::hours(6)).await;
    assert_launches(&stack.host, 2).unwrap();
    assert_console_received(&stack.host, "stop").unwrap();
    assert!(stack.supervisor.health().await.healthy);

    let status = reboot.status();
    assert_eq!(status.state, RebootState::Monitoring);
    assert!(status.current_token.is_none());
    assert!(actions(reboot.recent_log(100)).ends_with(&[
        "restart_triggered".to_string(),
        "restart_started".to_string(),
        "restart_completed".to_string(),
    ]));

    let gate = stack.supervisor.gate().snapshot();
    assert_eq!(gate.last_source.as_deref(), Some("auto_scheduler"));
}

#[tokio::test]
async fn test_uptime_reboot_warns_players_over_console() {
    let stack = Stack::new().await;
    stack.boot().await;
    stack.host.set_players(3);
    let t0 = Utc::now();
    stack.host.set_started_at(t0 - ChronoDuration::hours(13));

    let reboot = stack.reboot_scheduler().await;
    reboot.enable().await.unwrap();

    reboot.tick_at(t0).await;
    let status = reboot.status();
    assert_eq!(status.state, RebootState::CountdownUptime);
    assert_eq!(status.trigger_reason, Some(RebootTrigger::Uptime));
    assert_eq!(status.players_online, 3);
    assert_console_received(&stack.host, "in 5 minutes").unwrap();
    assert!(!stack.board.current(SchedulerKind::Reboot).quiet);

    reboot.tick_at(t0 + ChronoDuration::seconds(280)).await;
    assert_console_received(&stack.host, "in 30 seconds").unwrap();
    assert_launches(&stack.host, 1).unwrap();

    reboot.tick_at(t0 + ChronoDuration::seconds(300)).await;
    assert_launches(&stack.host, 2).unwrap();
    assert_eq!(reboot.status().state, RebootState::Monitoring);
    assert!(stack.board.current(SchedulerKind::Reboot).quiet);
}

#[tokio::test]
async fn test_backup_cycle_stops_uploads_and_restarts() {
    let stack = Stack::new().await;
    stack.boot().await;
    let backup = stack.backup_scheduler().await;

    backup.tick_at(backup_due()).await;

    assert_console_received(&stack.host, "stop").unwrap();
    assert_launches(&stack.host, 2).unwrap();
    assert!(stack.supervisor.health().await.healthy);

    let uploaded = stack
        .remote_dir()
        .join(REMOTE_FOLDER)
        .join("minecraft_server (2026-2-8).zip");
    assert!(std::fs::metadata(&uploaded).unwrap().len() > 0);
    assert!(!stack.dir.path().join("backups").join("minecraft_server (2026-2-8).zip").exists());

    let status = backup.status();
    assert_eq!(status.state, BackupState::Monitoring);
    assert!(status.error_message.is_none());
    assert_eq!(backup.config().last_backup_time, Some(backup_due()));

    let actions = actions(backup.recent_log(100));
    for expected in ["server_stopped", "compressed", "uploaded", "server_restarted", "backup_completed"] {
        assert!(actions.iter().any(|a| a == expected), "missing {} in {:?}", expected, actions);
    }

    let operators: Vec<String> = stack
        .registry
        .recent_trace(20)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.actor)
        .collect();
    assert!(operators.iter().all(|a| a == "scheduler:backup"));
}

#[tokio::test]
async fn test_reboot_countdown_holds_off_backup() {
    let stack = Stack::new().await;
    stack.boot().await;
    stack.host.set_players(2);
    let t0 = Utc::now();
    stack.host.set_started_at(t0 - ChronoDuration::hours(13));

    let reboot = stack.reboot_scheduler().await;
    reboot.enable().await.unwrap();
    let backup = stack.backup_scheduler().await;

    reboot.tick_at(t0).await;
    assert_eq!(reboot.status().state, RebootState::CountdownUptime);

    backup.tick_at(backup_due()).await;
    assert_eq!(backup.status().state, BackupState::Monitoring);
    let skipped = backup.recent_log(1).remove(0);
    assert_eq!(skipped.action, "backup_skipped");
    assert!(skipped.details.contains("countdown_uptime"));
    assert!(!stack.remote_dir().join(REMOTE_FOLDER).exists());

    reboot.tick_at(t0 + ChronoDuration::seconds(300)).await;
    assert_launches(&stack.host, 2).unwrap();
    assert!(stack.board.current(SchedulerKind::Reboot).quiet);

    // The board is free again; players are still online so the backup
    // starts with a countdown.
    backup.tick_at(backup_due() + ChronoDuration::minutes(1)).await;
    assert_eq!(backup.status().state, BackupState::Countdown);
    assert_console_received(&stack.host, "backup").unwrap();
}
