//! The full control plane over a [`SimulatedHost`].

use crate::host::SimulatedHost;
use mcops_operations::{Actor, OperationRegistry, OperationsConfig};
use mcops_scheduler::{
    ActivityBoard, BackupConfig, BackupScheduler, DirectoryStorage, RebootScheduler, RemoteStorage,
    SchedulerPaths, SchedulerTiming,
};
use mcops_supervisor::{GateConfig, ServerOps, ServerRuntime, Supervisor, SupervisorConfig, SupervisorTiming};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub const REMOTE_FOLDER: &str = "weekly";

pub struct Stack {
    pub dir: TempDir,
    pub host: Arc<SimulatedHost>,
    pub supervisor: Arc<Supervisor>,
    pub registry: Arc<OperationRegistry>,
    pub board: ActivityBoard,
}

/// Supervisor waits short enough for tests, long enough for a TCP round trip.
fn fast_timing() -> SupervisorTiming {
    SupervisorTiming {
        ready_timeout: Duration::from_secs(5),
        ready_poll: Duration::from_millis(20),
        boot_grace: Duration::ZERO,
        rcon_stop_wait: Duration::from_secs(1),
        sigterm_wait: Duration::from_millis(200),
        kill_wait: Duration::ZERO,
        exit_poll: Duration::from_millis(10),
        restart_settle: Duration::ZERO,
        recover_settle: Duration::ZERO,
        start_retries: 0,
        retry_delay: Duration::ZERO,
        player_cache_ttl: Duration::ZERO,
    }
}

impl Stack {
    pub async fn new() -> Self {
        Self::with_gate(GateConfig::default()).await
    }

    pub async fn with_gate(gate: GateConfig) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let server_dir = dir.path().join("server");
        std::fs::create_dir_all(server_dir.join("world")).expect("world dir");
        std::fs::write(server_dir.join("server.properties"), "enable-rcon=true\n").expect("properties");
        std::fs::write(server_dir.join("world").join("level.dat"), vec![7u8; 8192]).expect("level.dat");

        let host = Arc::new(SimulatedHost::start(&server_dir).await.expect("simulated host"));

        let mut config = SupervisorConfig::new(&server_dir);
        config.timing = fast_timing();
        let supervisor = Arc::new(Supervisor::new(
            config,
            host.clone() as Arc<dyn ServerRuntime>,
            mcops_supervisor::RestartGate::new(gate),
        ));

        let operations = OperationsConfig {
            trace_path: Some(dir.path().join("operation_state.jsonl")),
            audit_path: Some(dir.path().join("audit.log")),
            ..OperationsConfig::default()
        };
        let registry = Arc::new(OperationRegistry::from_config(
            supervisor.clone() as Arc<dyn ServerOps>,
            &operations,
        ));

        Self {
            dir,
            host,
            supervisor,
            registry,
            board: ActivityBoard::new(),
        }
    }

    pub fn server_dir(&self) -> PathBuf {
        self.dir.path().join("server")
    }

    pub fn remote_dir(&self) -> PathBuf {
        self.dir.path().join("remote")
    }

    pub fn audit_path(&self) -> PathBuf {
        self.dir.path().join("audit.log")
    }

    pub fn paths(&self) -> SchedulerPaths {
        SchedulerPaths::new(self.dir.path().join("state"))
    }

    pub fn operator(&self) -> Actor {
        Actor::admin("ops@example.com")
    }

    /// Bring the simulated server up through the supervisor.
    pub async fn boot(&self) {
        let outcome = self.supervisor.start().await;
        assert!(outcome.success, "boot failed: {:?}", outcome.error);
    }

    pub async fn reboot_scheduler(&self) -> RebootScheduler {
        RebootScheduler::open(
            self.registry.clone(),
            self.board.clone(),
            SchedulerTiming::immediate(),
            self.paths(),
        )
        .await
        .expect("reboot scheduler")
    }

    /// Backup scheduler uploading into a directory storage, enabled and
    /// pointed at the server directory.
    pub async fn backup_scheduler(&self) -> BackupScheduler {
        let credentials = self.dir.path().join("service_account.json");
        std::fs::write(
            &credentials,
            r#"{"type": "service_account", "client_email": "backups@mcops-e2e.iam.example.com"}"#,
        )
        .expect("credentials");
        let storage = DirectoryStorage::open(self.remote_dir(), &credentials)
            .await
            .expect("storage");

        let scheduler = BackupScheduler::open(
            self.registry.clone(),
            self.board.clone(),
            SchedulerTiming::immediate(),
            self.paths(),
            Some(Arc::new(storage) as Arc<dyn RemoteStorage>),
        )
        .await
        .expect("backup scheduler");

        let config = BackupConfig {
            remote_folder: REMOTE_FOLDER.to_string(),
            data_dir: Some(self.server_dir()),
            archive_dir: self.dir.path().join("backups"),
            ..BackupConfig::default()
        };
        scheduler.update_config(config).await.expect("backup config");
        scheduler.enable().await.expect("enable backups");
        scheduler
    }
}
