//! Tailer for the server's `logs/latest.log`.

use crate::history::{load_history, save_history};
use crate::types::{ConsoleEntry, Marker, TailStatus};
use chrono::{DateTime, Utc};
use mcops_common::{Error, Result};
use mcops_rcon::strip_color_codes;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct TailConfig {
    pub log_path: PathBuf,
    /// Where the buffer is saved on stop. Nothing is saved when unset.
    pub history_path: Option<PathBuf>,
    pub poll_interval: Duration,
    /// An identical line arriving again within this window is dropped.
    pub dedup_window: Duration,
    pub buffer_size: usize,
    /// Lines of the existing log loaded by [`ConsoleTail::attach`].
    pub backfill_lines: usize,
}

impl TailConfig {
    pub fn new(log_path: impl Into<PathBuf>) -> Self {
        Self {
            log_path: log_path.into(),
            history_path: None,
            poll_interval: Duration::from_millis(300),
            dedup_window: Duration::from_millis(100),
            buffer_size: 500,
            backfill_lines: 100,
        }
    }

    /// `<server_dir>/logs/latest.log`, history next to it.
    pub fn for_server_dir(server_dir: &Path) -> Self {
        let logs = server_dir.join("logs");
        Self {
            history_path: Some(logs.join("mcops_console_history.jsonl")),
            ..Self::new(logs.join("latest.log"))
        }
    }
}

/// Buffer and counters shared with the reader task.
struct Shared {
    buffer: Mutex<VecDeque<ConsoleEntry>>,
    capacity: usize,
    sender: broadcast::Sender<ConsoleEntry>,
    lines_read: AtomicU64,
    bytes_read: AtomicU64,
    rotations: AtomicU64,
    last_activity: Mutex<Option<DateTime<Utc>>>,
}

impl Shared {
    /// Buffer the entry; subscribers only get entries that are not noise.
    fn push(&self, entry: ConsoleEntry) {
        {
            let mut buffer = self.buffer.lock();
            buffer.push_back(entry.clone());
            while buffer.len() > self.capacity {
                buffer.pop_front();
            }
        }
        *self.last_activity.lock() = Some(Utc::now());
        if !entry.is_noise() {
            // No subscribers is fine
            let _ = self.sender.send(entry);
        }
    }
}

/// Read position in the log file, owned by the reader task.
#[derive(Debug, Default)]
struct Cursor {
    position: u64,
    file_id: Option<u64>,
    last_line: Option<(String, Instant)>,
}

pub struct ConsoleTail {
    config: TailConfig,
    shared: Arc<Shared>,
    running: AtomicBool,
    cancel: Mutex<CancellationToken>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for ConsoleTail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleTail")
            .field("log_path", &self.config.log_path)
            .field("running", &self.running.load(Ordering::SeqCst))
            .field("buffered", &self.shared.buffer.lock().len())
            .finish()
    }
}

impl ConsoleTail {
    pub fn new(config: TailConfig) -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        let shared = Arc::new(Shared {
            buffer: Mutex::new(VecDeque::with_capacity(config.buffer_size)),
            capacity: config.buffer_size.max(1),
            sender,
            lines_read: AtomicU64::new(0),
            bytes_read: AtomicU64::new(0),
            rotations: AtomicU64::new(0),
            last_activity: Mutex::new(None),
        });
        Self {
            config,
            shared,
            running: AtomicBool::new(false),
            cancel: Mutex::new(CancellationToken::new()),
            task: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Follow a server that was just started. Only lines written from now
    /// on are read.
    pub async fn start(&self) -> Result<()> {
        self.claim()?;
        let cursor = self.cursor_at_end().await;
        self.shared.push(ConsoleEntry::marker(Marker::ServerStarted));
        self.spawn(cursor);
        info!("📜 Console tail started on {}", self.config.log_path.display());
        Ok(())
    }

    /// Follow a server that was already running when the daemon came up.
    /// The buffer is replaced by the last lines of the current log.
    pub async fn attach(&self) -> Result<()> {
        self.claim()?;
        let backfill = self.read_backfill().await;
        let loaded = backfill.len();
        self.shared.buffer.lock().clear();
        for entry in backfill {
            self.shared.push(entry);
        }
        let cursor = self.cursor_at_end().await;
        self.shared.push(ConsoleEntry::marker(Marker::Reattached));
        self.spawn(cursor);
        info!("📜 Console tail reattached ({} recent lines)", loaded);
        Ok(())
    }

    /// Stop following and save the buffer when a history path is set.
    pub async fn stop(&self) -> Result<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Err(Error::validation("console tail is not running"));
        }
        self.cancel.lock().cancel();
        let task = self.task.lock().take();
        if let Some(task) = task {
            if tokio::time::timeout(Duration::from_secs(5), task).await.is_err() {
                warn!("Console reader did not stop in time");
            }
        }
        self.shared.push(ConsoleEntry::marker(Marker::ServerStopped));

        if let Some(path) = &self.config.history_path {
            let entries: Vec<ConsoleEntry> = self.shared.buffer.lock().iter().cloned().collect();
            save_history(path, &entries).await?;
        }
        info!("Console tail stopped");
        Ok(())
    }

    /// Load the saved history into an empty buffer. Returns how many
    /// entries were loaded.
    pub async fn restore_history(&self) -> Result<usize> {
        let Some(path) = &self.config.history_path else {
            return Ok(0);
        };
        let entries = load_history(path).await?;
        let mut buffer = self.shared.buffer.lock();
        if !buffer.is_empty() {
            return Ok(0);
        }
        let skip = entries.len().saturating_sub(self.shared.capacity);
        buffer.extend(entries.into_iter().skip(skip));
        debug!("Restored {} console entries", buffer.len());
        Ok(buffer.len())
    }

    /// Record a marker, e.g. around a restart.
    pub fn mark(&self, marker: Marker) {
        self.shared.push(ConsoleEntry::marker(marker));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConsoleEntry> {
        self.shared.sender.subscribe()
    }

    /// Up to `lines` entries ending `offset` entries before the newest,
    /// oldest first. `filtered` leaves out noise lines.
    pub fn recent(&self, lines: usize, offset: usize, filtered: bool) -> Vec<ConsoleEntry> {
        let buffer = self.shared.buffer.lock();
        let entries: Vec<&ConsoleEntry> = buffer.iter().filter(|e| !filtered || !e.is_noise()).collect();
        let end = entries.len().saturating_sub(offset);
        let start = end.saturating_sub(lines);
        entries[start..end].iter().map(|e| (*e).clone()).collect()
    }

    pub fn status(&self) -> TailStatus {
        TailStatus {
            active: self.is_running(),
            lines_read: self.shared.lines_read.load(Ordering::SeqCst),
            bytes_read: self.shared.bytes_read.load(Ordering::SeqCst),
            rotations: self.shared.rotations.load(Ordering::SeqCst),
            buffered: self.shared.buffer.lock().len(),
            last_activity: *self.shared.last_activity.lock(),
        }
    }

    fn claim(&self) -> Result<()> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(Error::validation("console tail already running"));
        }
        Ok(())
    }

    async fn cursor_at_end(&self) -> Cursor {
        match tokio::fs::metadata(&self.config.log_path).await {
            Ok(metadata) => Cursor {
                position: metadata.len(),
                file_id: Some(file_id(&metadata)),
                last_line: None,
            },
            Err(_) => Cursor::default(),
        }
    }

    async fn read_backfill(&self) -> Vec<ConsoleEntry> {
        let content = match tokio::fs::read(&self.config.log_path).await {
            Ok(content) => content,
            Err(e) => {
                debug!("No console log to backfill from: {}", e);
                return Vec::new();
            }
        };
        let text = String::from_utf8_lossy(&content);
        let lines: Vec<&str> = text.lines().map(str::trim_end).filter(|l| !l.is_empty()).collect();
        let skip = lines.len().saturating_sub(self.config.backfill_lines);
        lines[skip..]
            .iter()
            .map(|line| ConsoleEntry::line(strip_color_codes(line)))
            .collect()
    }

    fn spawn(&self, cursor: Cursor) {
        let cancel = CancellationToken::new();
        *self.cancel.lock() = cancel.clone();
        let reader = Reader {
            shared: self.shared.clone(),
            path: self.config.log_path.clone(),
            poll_interval: self.config.poll_interval,
            dedup_window: self.config.dedup_window,
            cursor,
        };
        let task = tokio::spawn(reader.run(cancel));
        *self.task.lock() = Some(task);
    }
}

struct Reader {
    shared: Arc<Shared>,
    path: PathBuf,
    poll_interval: Duration,
    dedup_window: Duration,
    cursor: Cursor,
}

impl Reader {
    async fn run(mut self, cancel: CancellationToken) {
        debug!("Console reader started for {}", self.path.display());
        loop {
            if let Err(e) = self.poll().await {
                warn!(path = %self.path.display(), error = %e, "Error reading console log");
            }
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
        debug!(
            lines = self.shared.lines_read.load(Ordering::SeqCst),
            "Console reader finished"
        );
    }

    async fn poll(&mut self) -> std::io::Result<()> {
        let metadata = match tokio::fs::metadata(&self.path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        };
        let id = file_id(&metadata);
        let size = metadata.len();

        if let Some(previous) = self.cursor.file_id {
            if previous != id || size < self.cursor.position {
                warn!(
                    "Console log rotated (file {} -> {}, size {} -> {})",
                    previous, id, self.cursor.position, size
                );
                self.cursor.position = 0;
                self.shared.rotations.fetch_add(1, Ordering::SeqCst);
                self.shared.push(ConsoleEntry::marker(Marker::LogRotated));
            }
        }
        self.cursor.file_id = Some(id);
        if size <= self.cursor.position {
            return Ok(());
        }

        let mut file = tokio::fs::File::open(&self.path).await?;
        file.seek(SeekFrom::Start(self.cursor.position)).await?;
        let mut chunk = Vec::new();
        file.read_to_end(&mut chunk).await?;

        // A line still being written is read on a later poll
        let Some(end) = chunk.iter().rposition(|b| *b == b'\n') else {
            return Ok(());
        };
        let complete = &chunk[..=end];
        self.cursor.position += complete.len() as u64;
        self.shared.bytes_read.fetch_add(complete.len() as u64, Ordering::SeqCst);

        let text = String::from_utf8_lossy(complete);
        for raw in text.lines().map(str::trim_end) {
            if raw.is_empty() || self.is_repeat(raw) {
                continue;
            }
            self.shared.lines_read.fetch_add(1, Ordering::SeqCst);
            self.shared.push(ConsoleEntry::line(strip_color_codes(raw)));
        }
        Ok(())
    }

    fn is_repeat(&mut self, raw: &str) -> bool {
        let now = Instant::now();
        if let Some((last, at)) = &self.cursor.last_line {
            if last == raw && now.duration_since(*at) < self.dedup_window {
                return true;
            }
        }
        self.cursor.last_line = Some((raw.to_string(), now));
        false
    }
}

#[cfg(unix)]
fn file_id(metadata: &std::fs::Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    metadata.ino()
}

#[cfg(not(unix))]
fn file_id(_metadata: &std::fs::Metadata) -> u64 {
    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn config(dir: &Path) -> TailConfig {
        TailConfig {
            history_path: Some(dir.join("history.jsonl")),
            poll_interval: Duration::from_millis(20),
            ..TailConfig::new(dir.join("latest.log"))
        }
    }

    fn append(path: &Path, text: &str) {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .unwrap();
        file.write_all(text.as_bytes()).unwrap();
    }

    async fn wait_for(tail: &ConsoleTail, message: &str) {
        let deadline = Instant::now() + Duration::from_secs(3);
        while Instant::now() < deadline {
            if tail.recent(500, 0, false).iter().any(|e| e.message == message) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("'{}' never showed up in {:?}", message, tail.recent(500, 0, false));
    }

    #[tokio::test]
    async fn test_reads_new_lines_only() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        append(&config.log_path, "[09:59:59] [Server thread/INFO]: old line\n");

        let tail = ConsoleTail::new(config.clone());
        tail.start().await.unwrap();
        append(&config.log_path, "[10:00:01] [Server thread/INFO]: §aHello\n");
        wait_for(&tail, "[10:00:01] [Server thread/INFO]: Hello").await;

        let entries = tail.recent(10, 0, false);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].marker, Some(Marker::ServerStarted));
        assert_eq!(entries[1].time, "10:00:01");
        assert!(tail.start().await.is_err());

        tail.stop().await.unwrap();
        assert!(!tail.is_running());
    }

    #[tokio::test]
    async fn test_partial_line_waits_for_newline() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        append(&config.log_path, "");
        let tail = ConsoleTail::new(config.clone());
        tail.start().await.unwrap();

        append(&config.log_path, "[10:00:02] par");
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(tail.status().lines_read, 0);

        append(&config.log_path, "tial\n");
        wait_for(&tail, "[10:00:02] partial").await;
        tail.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_rotation_restarts_from_top() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        append(&config.log_path, "[08:00:00] previous session\n");
        let tail = ConsoleTail::new(config.clone());
        tail.start().await.unwrap();
        append(&config.log_path, "[08:00:01] before rotation\n");
        wait_for(&tail, "[08:00:01] before rotation").await;

        let fresh = dir.path().join("latest.log.new");
        std::fs::write(&fresh, "[11:00:00] fresh session\n").unwrap();
        std::fs::rename(&fresh, &config.log_path).unwrap();
        wait_for(&tail, "[11:00:00] fresh session").await;

        assert_eq!(tail.status().rotations, 1);
        assert!(tail
            .recent(10, 0, false)
            .iter()
            .any(|e| e.marker == Some(Marker::LogRotated)));
        tail.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_duplicate_within_window_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        append(&config.log_path, "");
        let tail = ConsoleTail::new(config.clone());
        tail.start().await.unwrap();

        append(
            &config.log_path,
            "[10:00:03] spam\n[10:00:03] spam\n[10:00:04] other\n",
        );
        wait_for(&tail, "[10:00:04] other").await;

        let spam = tail
            .recent(10, 0, false)
            .into_iter()
            .filter(|e| e.message == "[10:00:03] spam")
            .count();
        assert_eq!(spam, 1);
        tail.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_subscribers_skip_noise() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        append(&config.log_path, "");
        let tail = ConsoleTail::new(config.clone());
        tail.start().await.unwrap();
        let mut rx = tail.subscribe();

        append(
            &config.log_path,
            "[10:00:05] [Thread RCON Client /127.0.0.1 #2/INFO]: Thread RCON Client shutting down\n\
             [10:00:06] [Server thread/INFO]: Alex joined the game\n",
        );
        let entry = tokio::time::timeout(Duration::from_secs(3), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.message, "[10:00:06] [Server thread/INFO]: Alex joined the game");

        assert_eq!(tail.recent(10, 0, true).len(), 2);
        assert_eq!(tail.recent(10, 0, false).len(), 3);
        tail.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_recent_window_and_capacity() {
        let dir = tempfile::tempdir().unwrap();
        let config = TailConfig {
            buffer_size: 8,
            ..config(dir.path())
        };
        let saved: Vec<_> = (0..10)
            .map(|i| ConsoleEntry::line(format!("[10:00:{:02}] line {}", i, i)))
            .collect();
        save_history(config.history_path.as_deref().unwrap(), &saved)
            .await
            .unwrap();

        let tail = ConsoleTail::new(config);
        assert_eq!(tail.restore_history().await.unwrap(), 8);

        let messages = |entries: Vec<ConsoleEntry>| -> Vec<String> {
            entries.into_iter().map(|e| e.message).collect()
        };
        assert_eq!(
            messages(tail.recent(3, 0, true)),
            vec!["[10:00:07] line 7", "[10:00:08] line 8", "[10:00:09] line 9"]
        );
        assert_eq!(
            messages(tail.recent(2, 3, true)),
            vec!["[10:00:05] line 5", "[10:00:06] line 6"]
        );
        assert!(tail.recent(3, 8, true).is_empty());
        assert_eq!(tail.recent(100, 0, true).len(), 8);
    }

    #[tokio::test]
    async fn test_stop_saves_history_and_attach_backfills() {
        let dir = tempfile::tempdir().unwrap();
        let config = TailConfig {
            backfill_lines: 2,
            ..config(dir.path())
        };
        append(
            &config.log_path,
            "[07:00:00] one\n[07:00:01] two\n\n[07:00:02] three\n",
        );

        let tail = ConsoleTail::new(config.clone());
        tail.attach().await.unwrap();
        let entries = tail.recent(10, 0, false);
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].message, "[07:00:01] two");
        assert_eq!(entries[1].message, "[07:00:02] three");
        assert_eq!(entries[2].marker, Some(Marker::Reattached));

        tail.stop().await.unwrap();
        assert!(tail.stop().await.is_err());

        let history = load_history(config.history_path.as_deref().unwrap()).await.unwrap();
        assert_eq!(history.len(), 4);
        assert_eq!(history[3].marker, Some(Marker::ServerStopped));
    }
}
