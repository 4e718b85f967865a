//! `mcops run`: supervisor, registry, schedulers, console tail and the
//! control socket wired together until a shutdown signal.

use crate::config::McopsConfig;
use crate::control::{self, ControlContext};
use crate::lock::InstanceLock;
use anyhow::{bail, Context, Result};
use mcops_console::{ConsoleTail, TailConfig};
use mcops_operations::OperationRegistry;
use mcops_scheduler::{
    ActivityBoard, BackupScheduler, DirectoryStorage, RebootScheduler, RemoteStorage, SchedulerDriver,
};
use mcops_supervisor::{RestartGate, ServerOps, Supervisor};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const CONSOLE_WATCH_INTERVAL: Duration = Duration::from_secs(2);

/// Supervisor over the real host and the registry in front of it.
pub fn build_registry(config: &McopsConfig) -> (Arc<Supervisor>, Arc<OperationRegistry>) {
    let gate = RestartGate::new(config.gate.clone());
    let supervisor = Arc::new(Supervisor::with_os_runtime(config.server.clone(), gate));
    let registry = Arc::new(OperationRegistry::from_config(
        supervisor.clone() as Arc<dyn ServerOps>,
        &config.operations,
    ));
    (supervisor, registry)
}

async fn open_storage(config: &McopsConfig) -> Option<Arc<dyn RemoteStorage>> {
    let settings = config.scheduler.storage.as_ref()?;
    match DirectoryStorage::open(&settings.remote_dir, &settings.credentials_path).await {
        Ok(storage) => Some(Arc::new(storage)),
        Err(e) => {
            error!("Backup storage unavailable, backups will not run: {}", e);
            None
        }
    }
}

/// Both schedulers over `registry`, with the server directory as the
/// default backup source.
async fn open_schedulers(
    config: &McopsConfig,
    registry: &Arc<OperationRegistry>,
    storage: Option<Arc<dyn RemoteStorage>>,
) -> Result<(Arc<RebootScheduler>, Arc<BackupScheduler>)> {
    let board = ActivityBoard::new();
    let paths = config.scheduler.paths();
    let timing = config.scheduler.timing.clone();
    tokio::fs::create_dir_all(paths.dir())
        .await
        .with_context(|| format!("Failed to create state directory {}", paths.dir().display()))?;

    let reboot = Arc::new(
        RebootScheduler::open(registry.clone(), board.clone(), timing.clone(), paths.clone())
            .await
            .context("Failed to open reboot scheduler")?,
    );
    let backup = Arc::new(
        BackupScheduler::open(registry.clone(), board, timing, paths, storage)
            .await
            .context("Failed to open backup scheduler")?,
    );

    let mut backup_config = backup.config();
    if backup_config.data_dir.is_none() {
        backup_config.data_dir = Some(config.server.server_dir.clone());
        backup
            .update_config(backup_config)
            .await
            .context("Failed to set backup data directory")?;
    }
    Ok((reboot, backup))
}

/// Context for a one-shot command when no daemon answers. The caller holds
/// the instance lock. Schedulers are loaded only when asked for, and
/// nothing ticks them.
pub async fn local_context(config: &McopsConfig, with_schedulers: bool) -> Result<ControlContext> {
    let (_, registry) = build_registry(config);
    let context = ControlContext::new(registry.clone());
    if !with_schedulers {
        return Ok(context);
    }
    let (reboot, backup) = open_schedulers(config, &registry, None).await?;
    Ok(context.with_schedulers(reboot, backup, false))
}

pub async fn run(config: McopsConfig, shutdown: impl Future<Output = ()>) -> Result<()> {
    let state_dir = config.scheduler.paths().dir().to_path_buf();
    let Some(lock) = InstanceLock::try_acquire(&state_dir)? else {
        bail!(
            "another mcops daemon is running (lock {} held)",
            state_dir.join(crate::lock::LOCK_FILE).display()
        );
    };
    debug!("Instance lock {}", lock.path().display());

    let (supervisor, registry) = build_registry(&config);
    let storage = open_storage(&config).await;
    let (reboot, backup) = open_schedulers(&config, &registry, storage).await?;

    let socket = config.control_socket();
    let listener = control::bind(&socket).await?;
    let context = ControlContext::new(registry.clone()).with_schedulers(reboot.clone(), backup.clone(), true);
    let control_cancel = CancellationToken::new();
    let control_task = tokio::spawn(control::serve(listener, Arc::new(context), control_cancel.clone()));

    let mut driver = SchedulerDriver::new();
    driver.spawn(reboot.clone());
    driver.spawn(backup.clone());

    let console_cancel = CancellationToken::new();
    let console = if config.console.enabled {
        let tail = Arc::new(ConsoleTail::new(TailConfig::for_server_dir(&config.server.server_dir)));
        if let Err(e) = tail.restore_history().await {
            warn!("Console history not restored: {}", e);
        }
        let task = tokio::spawn(watch_console(supervisor.clone(), tail.clone(), console_cancel.clone()));
        Some((tail, task))
    } else {
        None
    };

    info!(
        "🚀 mcops running for {} (reboot: {}, backup: {}, control: {})",
        config.server.server_dir.display(),
        reboot.status().state,
        backup.status().state,
        socket.display()
    );

    shutdown.await;

    info!("Shutting down...");
    control_cancel.cancel();
    if let Err(e) = control_task.await {
        warn!("Control socket ended abnormally: {}", e);
    }
    if let Err(e) = tokio::fs::remove_file(&socket).await {
        debug!("Control socket not removed: {}", e);
    }
    driver.shutdown().await;
    if let Some((tail, task)) = console {
        console_cancel.cancel();
        if let Err(e) = task.await {
            warn!("Console watcher ended abnormally: {}", e);
        }
        if tail.is_running() {
            if let Err(e) = tail.stop().await {
                warn!("Console tail did not stop cleanly: {}", e);
            }
        }
    }
    info!("mcops stopped");
    drop(lock);
    Ok(())
}

/// Follow the console while the server process is up. The first sighting
/// of an already running server reattaches; later ones are fresh starts.
async fn watch_console(supervisor: Arc<Supervisor>, tail: Arc<ConsoleTail>, cancel: CancellationToken) {
    let mut first_check = true;
    loop {
        let running = supervisor.health().await.process_running;
        let result = match (running, tail.is_running()) {
            (true, false) if first_check => tail.attach().await,
            (true, false) => tail.start().await,
            (false, true) => tail.stop().await,
            _ => Ok(()),
        };
        if let Err(e) = result {
            warn!("Console tail: {}", e);
        }
        first_check = false;

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(CONSOLE_WATCH_INTERVAL) => {}
        }
    }
    debug!("Console watcher stopped");
}
