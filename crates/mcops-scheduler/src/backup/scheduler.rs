use super::config::BackupConfig;
use super::state::{BackupState, BackupStatus};
use crate::action_log::{ActionLog, ActionLogEntry, EntryStatus};
use crate::activity::{ActivityBoard, SchedulerKind};
use crate::archive::{archive_name, create_zip};
use crate::config::{SchedulerPaths, SchedulerTiming};
use crate::driver::Scheduler;
use crate::request::{ManualRequest, RequestSlot};
use crate::storage::{prune, RemoteStorage};
use crate::store::{load_json, save_json};
use crate::warnings::{describe_remaining, format_duration, Announcement, CountdownPlan};
use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};
use mcops_common::{ErrorCode, SchedulerError, SchedulerResult};
use mcops_operations::{Actor, OperationParams, OperationRegistry, SERVER_START, SERVER_STOP};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Progress bands of the pipeline, in percent.
const PROGRESS_STOPPING: u8 = 5;
const PROGRESS_STOPPED: u8 = 15;
const PROGRESS_COMPRESS_START: u8 = 20;
const PROGRESS_COMPRESS_END: u8 = 55;
const PROGRESS_UPLOAD_START: u8 = 60;
const PROGRESS_UPLOADED: u8 = 95;
const PROGRESS_RESTARTING: u8 = 97;

struct Observation {
    running: bool,
    players: u32,
}

/// Schedule as seen in the server's local time, evaluated once per tick.
struct ScheduleView {
    now: DateTime<Utc>,
    due: bool,
    next_at: Option<DateTime<Utc>>,
    date: NaiveDate,
}

pub struct BackupScheduler {
    registry: Arc<OperationRegistry>,
    board: ActivityBoard,
    timing: SchedulerTiming,
    paths: SchedulerPaths,
    storage: Option<Arc<dyn RemoteStorage>>,
    config: Mutex<BackupConfig>,
    status: Mutex<BackupStatus>,
    progress: Arc<AtomicU8>,
    cycle_cancel: Mutex<CancellationToken>,
    requests: RequestSlot,
    log: ActionLog,
    tick_lock: tokio::sync::Mutex<()>,
    actor: Actor,
}

impl BackupScheduler {
    /// `storage` is `None` when no upload target is configured; the
    /// scheduler then stays in monitoring and never starts a cycle.
    pub async fn open(
        registry: Arc<OperationRegistry>,
        board: ActivityBoard,
        timing: SchedulerTiming,
        paths: SchedulerPaths,
        storage: Option<Arc<dyn RemoteStorage>>,
    ) -> SchedulerResult<Self> {
        let config: BackupConfig = load_json(&paths.backup_config()).await?.unwrap_or_default();
        config.validate()?;

        let mut status = match load_json::<BackupStatus>(&paths.backup_state()).await {
            Ok(status) => status.unwrap_or_default(),
            Err(e) => {
                warn!("[backup] Ignoring unreadable state: {}", e);
                BackupStatus::default()
            }
        };
        // An interrupted pipeline is finished by the first tick even when
        // the scheduler has been disabled meanwhile
        if !config.enabled && !status.state.is_pipeline() {
            status.state = BackupState::Disabled;
            status.clear_cycle();
        }

        let log = ActionLog::open("backup", paths.backup_log()).await;
        board.publish(SchedulerKind::Backup, status.state.as_str(), status.state.is_quiet());
        match &storage {
            Some(storage) => info!("💾 Backup scheduler loaded ({}), target {}", status.state, storage.describe()),
            None => info!("💾 Backup scheduler loaded ({}), no remote storage", status.state),
        }

        Ok(Self {
            registry,
            board,
            timing,
            paths,
            storage,
            progress: Arc::new(AtomicU8::new(status.progress_percent)),
            config: Mutex::new(config),
            status: Mutex::new(status),
            cycle_cancel: Mutex::new(CancellationToken::new()),
            requests: RequestSlot::new(),
            log,
            tick_lock: tokio::sync::Mutex::new(()),
            actor: Actor::scheduler("backup"),
        })
    }

    pub fn config(&self) -> BackupConfig {
        self.config.lock().clone()
    }

    pub fn status(&self) -> BackupStatus {
        let mut status = self.status.lock().clone();
        status.progress_percent = self.progress.load(Ordering::Relaxed);
        status
    }

    pub fn recent_log(&self, limit: usize) -> Vec<ActionLogEntry> {
        self.log.recent(limit)
    }

    /// Storage, folder and data directory are all set.
    pub fn is_configured(&self) -> bool {
        let config = self.config.lock();
        self.storage.is_some() && !config.remote_folder.is_empty() && config.data_dir.is_some()
    }

    /// Replace the settings. `enabled` and `last_backup_time` are owned by
    /// the scheduler and kept.
    pub async fn update_config(&self, mut config: BackupConfig) -> SchedulerResult<BackupConfig> {
        config.validate()?;
        {
            let mut current = self.config.lock();
            config.enabled = current.enabled;
            config.last_backup_time = current.last_backup_time;
            *current = config.clone();
        }
        save_json(&self.paths.backup_config(), &config).await?;
        self.log
            .record(ActionLogEntry::new("config_updated", EntryStatus::Info, "Configuration updated"))
            .await;
        Ok(config)
    }

    pub async fn enable(&self) -> SchedulerResult<()> {
        let config = {
            let mut config = self.config.lock();
            if config.enabled {
                return Ok(());
            }
            config.enabled = true;
            config.clone()
        };
        save_json(&self.paths.backup_config(), &config).await?;
        self.log
            .record(ActionLogEntry::new("scheduler_enabled", EntryStatus::Info, "Backup scheduler enabled"))
            .await;
        self.requests.wake();
        Ok(())
    }

    /// A countdown stops at once. A running pipeline is cancelled at its
    /// next step and still starts the server again before settling.
    pub async fn disable(&self) -> SchedulerResult<()> {
        let config = {
            let mut config = self.config.lock();
            config.enabled = false;
            config.clone()
        };
        self.cycle_cancel.lock().cancel();
        let in_pipeline = {
            let mut status = self.status.lock();
            status.current_token = None;
            if status.state.is_pipeline() {
                true
            } else {
                status.state = BackupState::Disabled;
                status.current_operation.clear();
                status.clear_cycle();
                false
            }
        };
        if !in_pipeline {
            self.board.publish(SchedulerKind::Backup, BackupState::Disabled.as_str(), true);
        }
        save_json(&self.paths.backup_config(), &config).await?;
        self.persist_status().await;

        let details = if in_pipeline {
            "Backup scheduler disabled, running backup cancelled"
        } else {
            "Backup scheduler disabled"
        };
        self.log
            .record(ActionLogEntry::new("scheduler_disabled", EntryStatus::Info, details))
            .await;
        Ok(())
    }

    pub fn trigger_now(&self, reason: impl Into<String>) -> SchedulerResult<()> {
        if !self.config.lock().enabled {
            return Err(SchedulerError::Rejected("backup scheduler is disabled".to_string()));
        }
        if !self.is_configured() {
            return Err(SchedulerError::Rejected("backup target is not configured".to_string()));
        }
        let state = self.status.lock().state;
        if state != BackupState::Monitoring {
            return Err(SchedulerError::Rejected(format!("cannot start a backup in {} state", state)));
        }
        self.requests.submit(ManualRequest::TriggerNow {
            reason: reason.into(),
        });
        Ok(())
    }

    pub fn cancel_countdown(&self) -> SchedulerResult<()> {
        if self.status.lock().state != BackupState::Countdown {
            return Err(SchedulerError::Rejected("no countdown active".to_string()));
        }
        self.requests.submit(ManualRequest::CancelCountdown);
        Ok(())
    }

    pub fn clear_error(&self) -> SchedulerResult<()> {
        if self.status.lock().state != BackupState::Error {
            return Err(SchedulerError::Rejected("scheduler is not in error state".to_string()));
        }
        self.requests.submit(ManualRequest::ClearError);
        Ok(())
    }

    /// One tick at `now`. The schedule is read in `now`'s timezone; the
    /// driver passes local time.
    pub async fn tick_at<Tz: TimeZone>(&self, now: DateTime<Tz>) -> Duration {
        let Ok(_guard) = self.tick_lock.try_lock() else {
            debug!("[backup] Previous tick still running, skipping");
            return self.timing.countdown_tick;
        };

        let view = {
            let config = self.config.lock();
            ScheduleView {
                now: now.with_timezone(&Utc),
                due: config.is_due(&now),
                next_at: config.next_backup_at(&now),
                date: now.date_naive(),
            }
        };

        self.run_tick(&view).await;

        let state = {
            let enabled = self.config.lock().enabled;
            let mut status = self.status.lock();
            if !enabled && !status.state.is_pipeline() && status.state != BackupState::Disabled {
                status.state = BackupState::Disabled;
                status.clear_cycle();
            }
            status.state
        };
        self.board.publish(SchedulerKind::Backup, state.as_str(), state.is_quiet());
        self.persist_status().await;

        if state == BackupState::Countdown {
            self.timing.countdown_tick
        } else {
            self.timing.backup_interval
        }
    }

    async fn run_tick(&self, view: &ScheduleView) {
        let request = self.requests.take();
        let config = self.config();
        let configured = self.is_configured();
        {
            let mut status = self.status.lock();
            status.last_check = Some(view.now);
            status.next_backup_at = view.next_at.filter(|_| config.enabled && configured);
        }

        let state = self.status.lock().state;
        if state.is_pipeline() {
            self.finish_interrupted(state).await;
            return;
        }

        if !config.enabled {
            if let Some(request) = request {
                debug!("[backup] Dropping {:?}: scheduler disabled", request);
            }
            let mut status = self.status.lock();
            status.state = BackupState::Disabled;
            status.current_operation.clear();
            status.clear_cycle();
            return;
        }

        match state {
            BackupState::Error => {
                if request != Some(ManualRequest::ClearError) {
                    return;
                }
                {
                    let mut status = self.status.lock();
                    status.state = BackupState::Monitoring;
                    status.error_message = None;
                    status.clear_cycle();
                }
                self.log
                    .record(ActionLogEntry::new("error_cleared", EntryStatus::Info, "Error cleared by operator"))
                    .await;
            }
            BackupState::Disabled => self.status.lock().state = BackupState::Monitoring,
            _ => {}
        }

        let observed = self.observe().await;

        match request {
            Some(ManualRequest::TriggerNow { reason }) => {
                if self.status.lock().state != BackupState::Monitoring || !configured {
                    debug!("[backup] Manual backup ignored in current state");
                    return;
                }
                self.log
                    .record(
                        ActionLogEntry::new("manual_backup", EntryStatus::Info, "Manual backup requested")
                            .trigger(&reason)
                            .players(observed.players),
                    )
                    .await;
                self.start_cycle(&config, &observed, view).await;
                return;
            }
            Some(ManualRequest::CancelCountdown) => {
                self.cancel_running_countdown(&observed).await;
                return;
            }
            Some(ManualRequest::ClearError) | None => {}
        }

        if self.status.lock().state == BackupState::Countdown {
            self.handle_countdown(&config, &observed, view).await;
            return;
        }

        if !configured {
            self.status.lock().current_operation = "Backup target not configured".to_string();
            return;
        }
        self.status.lock().current_operation = "Monitoring schedule".to_string();
        if view.due {
            self.start_cycle(&config, &observed, view).await;
        }
    }

    async fn observe(&self) -> Observation {
        let server = self.registry.server().status().await;
        let observed = Observation {
            running: server.health.process_running,
            players: server.players_online.unwrap_or(0),
        };
        self.status.lock().players_online = if observed.running { observed.players } else { 0 };
        observed
    }

    async fn begin_cycle(&self, state: BackupState) -> Option<Uuid> {
        if let Err(peer) = self.board.try_claim(SchedulerKind::Backup, state.as_str()) {
            self.log
                .record(ActionLogEntry::new(
                    "backup_skipped",
                    EntryStatus::Info,
                    format!("Reboot scheduler is {}", peer.state),
                ))
                .await;
            return None;
        }

        let token = Uuid::new_v4();
        *self.cycle_cancel.lock() = CancellationToken::new();
        let mut status = self.status.lock();
        status.clear_cycle();
        status.current_token = Some(token);
        status.state = state;
        status.error_message = None;
        Some(token)
    }

    fn is_current(&self, token: Uuid) -> bool {
        self.config.lock().enabled && self.status.lock().current_token == Some(token)
    }

    fn ensure_current(&self, token: Uuid) -> SchedulerResult<()> {
        if self.is_current(token) {
            Ok(())
        } else {
            Err(SchedulerError::Cancelled("backup scheduler disabled".to_string()))
        }
    }

    /// Countdown when players are online, otherwise straight into the
    /// pipeline.
    async fn start_cycle(&self, config: &BackupConfig, observed: &Observation, view: &ScheduleView) {
        if observed.running && observed.players > 0 {
            let Some(token) = self.begin_cycle(BackupState::Countdown).await else {
                return;
            };
            let total = config.countdown().as_secs();
            let plan = CountdownPlan::new(&config.warning_intervals);
            {
                let mut status = self.status.lock();
                status.countdown_ends_at = Some(view.now + chrono::Duration::seconds(total as i64));
                status.countdown_remaining_seconds = total;
                status.current_operation = format!("Backup countdown: {}", format_duration(total as i64));
                plan.due(total as i64, &mut status.warnings_sent);
            }
            self.log
                .record(
                    ActionLogEntry::new(
                        "countdown_started",
                        EntryStatus::Info,
                        format!(
                            "Backup countdown started ({}min), {} players online",
                            config.countdown_minutes, observed.players
                        ),
                    )
                    .players(observed.players),
                )
                .await;
            self.send_warning(token, total).await;
            return;
        }

        let first = if observed.running {
            BackupState::StoppingServer
        } else {
            BackupState::Compressing
        };
        let Some(token) = self.begin_cycle(first).await else {
            return;
        };
        let details = if observed.running {
            "No players online, starting backup immediately"
        } else {
            "Server not running, starting backup directly"
        };
        self.log
            .record(ActionLogEntry::new("backup_triggered", EntryStatus::Info, details))
            .await;
        self.run_pipeline(token, config, observed.running, view).await;
    }

    async fn handle_countdown(&self, config: &BackupConfig, observed: &Observation, view: &ScheduleView) {
        let (token, ends_at) = {
            let status = self.status.lock();
            (status.current_token, status.countdown_ends_at)
        };
        let (Some(token), Some(ends_at)) = (token, ends_at) else {
            let mut status = self.status.lock();
            status.clear_cycle();
            status.state = BackupState::Monitoring;
            return;
        };

        let remaining = (ends_at - view.now).num_seconds().max(0);
        if remaining == 0 {
            self.run_pipeline(token, config, observed.running, view).await;
            return;
        }

        let plan = CountdownPlan::new(&config.warning_intervals);
        let due = {
            let mut status = self.status.lock();
            status.countdown_remaining_seconds = remaining as u64;
            status.current_operation = format!("Backup countdown: {}", format_duration(remaining));
            plan.due(remaining, &mut status.warnings_sent)
        };
        if let Some(mark) = due {
            self.send_warning(token, mark).await;
        }
    }

    async fn send_warning(&self, token: Uuid, remaining_secs: u64) {
        let remaining = describe_remaining(remaining_secs);
        let server = self.registry.server();
        for command in Announcement::Backup.warning_commands(&remaining) {
            if !self.is_current(token) {
                debug!("[backup] Stale cycle {}, warning dropped", token);
                return;
            }
            let outcome = server.send_command(&command).await;
            if !outcome.success {
                let error = outcome.error.unwrap_or_else(|| "unknown error".to_string());
                self.log
                    .record(ActionLogEntry::new(
                        "warning_sent",
                        EntryStatus::Failed,
                        format!("Failed to send warning: {}", error),
                    ))
                    .await;
                return;
            }
        }
        let players = self.status.lock().players_online;
        self.log
            .record(
                ActionLogEntry::new("warning_sent", EntryStatus::Success, format!("Backup warning sent: {}", remaining))
                    .players(players),
            )
            .await;
    }

    async fn cancel_running_countdown(&self, observed: &Observation) {
        let cancelled = {
            let mut status = self.status.lock();
            if status.state != BackupState::Countdown {
                false
            } else {
                status.clear_cycle();
                status.state = BackupState::Monitoring;
                status.current_operation.clear();
                true
            }
        };
        if !cancelled {
            return;
        }
        if observed.running {
            let outcome = self
                .registry
                .server()
                .send_command(Announcement::Backup.cancelled_command())
                .await;
            if !outcome.success {
                debug!("[backup] Cancel notice not delivered: {:?}", outcome.error);
            }
        }
        self.log
            .record(
                ActionLogEntry::new("countdown_cancelled", EntryStatus::Info, "Backup countdown cancelled by operator")
                    .players(observed.players),
            )
            .await;
    }

    /// Stop, compress, upload, prune; then start the server again whatever
    /// happened, if this cycle stopped it.
    async fn run_pipeline(&self, token: Uuid, config: &BackupConfig, server_was_running: bool, view: &ScheduleView) {
        let clock = Instant::now();
        let cancel = self.cycle_cancel.lock().clone();
        {
            let mut status = self.status.lock();
            status.server_was_running = server_was_running;
            status.countdown_ends_at = None;
            status.countdown_remaining_seconds = 0;
            status.kept_archive = None;
        }

        let mut archive: Option<PathBuf> = None;
        let result = self
            .pipeline_steps(token, config, server_was_running, view, &cancel, &mut archive)
            .await;

        let mut failure = None;
        let cancelled = matches!(result, Err(SchedulerError::Cancelled(_)));
        if let Err(e) = result {
            match &e {
                // Disabled mid-pipeline: not a failure, the server still comes back
                SchedulerError::Cancelled(reason) => {
                    self.log
                        .record(ActionLogEntry::new(
                            "backup_cancelled",
                            EntryStatus::Info,
                            format!("Backup cancelled: {}", reason),
                        ))
                        .await;
                }
                _ => {
                    self.log
                        .record(ActionLogEntry::new("backup_failed", EntryStatus::Failed, format!("Backup failed: {}", e)))
                        .await;
                    failure = Some(e.to_string());
                }
            }
            if let Some(path) = archive.filter(|p| p.exists()) {
                self.log
                    .record(ActionLogEntry::new(
                        "archive_kept",
                        EntryStatus::Info,
                        format!("Local archive kept for manual upload: {}", path.display()),
                    ))
                    .await;
                self.status.lock().kept_archive = Some(path);
            }
        }

        if server_was_running {
            if let Err(e) = self.start_server(token).await {
                failure.get_or_insert(e);
            }
        }

        let duration = clock.elapsed().as_secs();
        self.progress.store(100, Ordering::Relaxed);
        let enabled = self.config.lock().enabled;
        let completed = {
            let mut status = self.status.lock();
            status.last_duration_seconds = Some(duration);
            status.current_operation.clear();
            status.clear_cycle();
            match (&failure, enabled) {
                (Some(message), _) => {
                    error!("[backup] Entering error state: {}", message);
                    status.state = BackupState::Error;
                    status.error_message = Some(message.clone());
                    false
                }
                (None, false) => {
                    status.state = BackupState::Disabled;
                    false
                }
                (None, true) => {
                    status.state = BackupState::Monitoring;
                    !cancelled
                }
            }
        };
        if completed {
            self.log
                .record(ActionLogEntry::new(
                    "backup_completed",
                    EntryStatus::Success,
                    format!("Backup completed in {}", format_duration(duration as i64)),
                ))
                .await;
        }
    }

    async fn pipeline_steps(
        &self,
        token: Uuid,
        config: &BackupConfig,
        server_was_running: bool,
        view: &ScheduleView,
        cancel: &CancellationToken,
        archive: &mut Option<PathBuf>,
    ) -> SchedulerResult<()> {
        if server_was_running {
            self.enter_step(BackupState::StoppingServer, "Stopping server...", PROGRESS_STOPPING)
                .await;
            self.stop_server(token).await?;
            self.log
                .record(ActionLogEntry::new("server_stopped", EntryStatus::Success, "Server stopped for backup"))
                .await;
            self.progress.store(PROGRESS_STOPPED, Ordering::Relaxed);
        }

        self.ensure_current(token)?;
        self.enter_step(BackupState::Compressing, "Compressing server directory...", PROGRESS_COMPRESS_START)
            .await;
        let data_dir = config
            .data_dir
            .clone()
            .ok_or_else(|| SchedulerError::InvalidConfig("data_dir is not set".to_string()))?;
        let name = archive_name(&config.archive_label, config.server_version.as_deref(), view.date);
        let archive_path = config.archive_dir.join(&name);
        *archive = Some(archive_path.clone());

        let progress = self.progress.clone();
        let band = u64::from(PROGRESS_COMPRESS_END - PROGRESS_COMPRESS_START);
        let stats = create_zip(
            &data_dir,
            &archive_path,
            move |done, total| {
                let step = band * done as u64 / total.max(1) as u64;
                progress.store(PROGRESS_COMPRESS_START + step as u8, Ordering::Relaxed);
            },
            cancel.clone(),
        )
        .await?;
        let size_mb = stats.size_mb();
        self.status.lock().last_backup_size_mb = Some(size_mb);
        self.log
            .record(ActionLogEntry::new(
                "compressed",
                EntryStatus::Success,
                format!("Archive created: {} ({:.1} MB, {} files)", name, size_mb, stats.files),
            ))
            .await;

        self.ensure_current(token)?;
        let storage = self
            .storage
            .clone()
            .ok_or_else(|| SchedulerError::Storage("no remote storage configured".to_string()))?;
        self.enter_step(
            BackupState::Uploading,
            &format!("Uploading {:.0} MB to {}...", size_mb, config.remote_folder),
            PROGRESS_UPLOAD_START,
        )
        .await;
        let object = tokio::select! {
            result = storage.upload(&config.remote_folder, &archive_path, &name) => result?,
            _ = cancel.cancelled() => {
                return Err(SchedulerError::Cancelled("upload cancelled".to_string()));
            }
        };
        self.progress.store(PROGRESS_UPLOADED, Ordering::Relaxed);
        self.status.lock().last_remote_name = Some(object.name.clone());
        self.log
            .record(ActionLogEntry::new(
                "uploaded",
                EntryStatus::Success,
                format!("Uploaded {} ({:.1} MB)", object.name, object.size_bytes as f64 / (1024.0 * 1024.0)),
            ))
            .await;

        let saved = {
            let mut current = self.config.lock();
            current.last_backup_time = Some(view.now);
            current.clone()
        };
        if let Err(e) = save_json(&self.paths.backup_config(), &saved).await {
            warn!("[backup] Failed to persist last backup time: {}", e);
        }

        match tokio::fs::remove_file(&archive_path).await {
            Ok(()) => *archive = None,
            Err(e) => warn!("[backup] Failed to delete local archive {}: {}", archive_path.display(), e),
        }

        if config.keep_remote_backups > 0 {
            self.status.lock().current_operation = "Pruning old backups...".to_string();
            match prune(storage.as_ref(), &config.remote_folder, config.keep_remote_backups).await {
                Ok(0) => {}
                Ok(deleted) => {
                    self.log
                        .record(ActionLogEntry::new(
                            "pruned",
                            EntryStatus::Success,
                            format!("Deleted {} old backups", deleted),
                        ))
                        .await;
                }
                Err(e) => {
                    self.log
                        .record(ActionLogEntry::new(
                            "prune_failed",
                            EntryStatus::Failed,
                            format!("Failed to prune old backups: {}", e),
                        ))
                        .await;
                }
            }
        }
        Ok(())
    }

    async fn enter_step(&self, state: BackupState, operation: &str, progress: u8) {
        {
            let mut status = self.status.lock();
            status.state = state;
            status.current_operation = operation.to_string();
        }
        self.progress.store(progress, Ordering::Relaxed);
        self.board.publish(SchedulerKind::Backup, state.as_str(), false);
        self.persist_status().await;
    }

    async fn stop_server(&self, token: Uuid) -> SchedulerResult<()> {
        let players = self.status.lock().players_online;
        if players > 0 && self.is_current(token) {
            let outcome = self
                .registry
                .server()
                .send_command(Announcement::Backup.final_command())
                .await;
            if !outcome.success {
                debug!("[backup] Final notice not delivered: {:?}", outcome.error);
            }
            tokio::time::sleep(self.timing.final_message_pause).await;
        }
        self.ensure_current(token)?;

        let key = format!("backup-{}-stop", token);
        let outcome = self
            .registry
            .execute(SERVER_STOP, &self.actor, OperationParams::new(), Some(&key))
            .await
            .map_err(|e| SchedulerError::operation(SERVER_STOP, e.to_string()))?;
        if !outcome.success && outcome.error_code != Some(ErrorCode::NotRunning) {
            return Err(SchedulerError::operation(
                SERVER_STOP,
                outcome.error.unwrap_or_else(|| outcome.status.to_string()),
            ));
        }

        let deadline = Instant::now() + self.timing.stop_wait;
        loop {
            if !self.registry.server().health().await.process_running {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(SchedulerError::StopTimeout {
                    seconds: self.timing.stop_wait.as_secs(),
                });
            }
            tokio::time::sleep(self.timing.stop_poll).await;
        }
    }

    /// Start after a cycle that stopped the server. Returns the error text
    /// when the server did not come back.
    async fn start_server(&self, token: Uuid) -> Result<(), String> {
        self.enter_step(BackupState::Restarting, "Restarting server...", PROGRESS_RESTARTING)
            .await;
        let key = format!("backup-{}-start", token);
        let result = self
            .registry
            .execute(SERVER_START, &self.actor, OperationParams::new(), Some(&key))
            .await;

        let error = match result {
            Ok(outcome) if outcome.success || outcome.error_code == Some(ErrorCode::AlreadyRunning) => {
                self.log
                    .record(ActionLogEntry::new(
                        "server_restarted",
                        EntryStatus::Success,
                        "Server restarted after backup",
                    ))
                    .await;
                return Ok(());
            }
            Ok(outcome) => outcome.error.unwrap_or_else(|| "start failed".to_string()),
            Err(e) => e.to_string(),
        };
        self.log
            .record(ActionLogEntry::new(
                "restart_failed",
                EntryStatus::Failed,
                format!("Server restart failed: {}", error),
            ))
            .await;
        Err(format!("Server restart after backup failed: {}", error))
    }

    /// The daemon stopped mid-pipeline. Bring the server back if the cycle
    /// had stopped it and leave the error for the operator.
    async fn finish_interrupted(&self, state: BackupState) {
        let (was_running, token) = {
            let status = self.status.lock();
            (status.server_was_running, status.current_token.unwrap_or_else(Uuid::new_v4))
        };
        self.log
            .record(ActionLogEntry::new(
                "backup_interrupted",
                EntryStatus::Failed,
                format!("Backup was interrupted while {}", state),
            ))
            .await;

        let mut message = format!("Backup interrupted while {}", state);
        if was_running {
            if let Err(e) = self.start_server(token).await {
                message = format!("{}; {}", message, e);
            }
        }

        let mut status = self.status.lock();
        status.clear_cycle();
        status.current_operation.clear();
        status.state = BackupState::Error;
        status.error_message = Some(message);
    }

    async fn persist_status(&self) {
        let status = self.status();
        if let Err(e) = save_json(&self.paths.backup_state(), &status).await {
            warn!("[backup] Failed to save state: {}", e);
        }
    }
}

#[async_trait]
impl Scheduler for BackupScheduler {
    fn name(&self) -> &'static str {
        "backup"
    }

    async fn tick(&self) -> Duration {
        self.tick_at(Local::now()).await
    }

    fn wake_handle(&self) -> Arc<Notify> {
        self.requests.wake_handle()
    }
}
