//! Zip archive of the server directory.

use chrono::{Datelike, NaiveDate};
use mcops_common::{SchedulerError, SchedulerResult};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveStats {
    pub files: usize,
    pub bytes: u64,
}

impl ArchiveStats {
    pub fn size_mb(&self) -> f64 {
        self.bytes as f64 / (1024.0 * 1024.0)
    }
}

/// `"<label> (<Y>-<M>-<D>).zip"`, or `"<label> <version> (<date>).zip"`.
/// Month and day carry no leading zeros.
pub fn archive_name(label: &str, version: Option<&str>, date: NaiveDate) -> String {
    let date = format!("{}-{}-{}", date.year(), date.month(), date.day());
    match version.filter(|v| !v.trim().is_empty()) {
        Some(version) => format!("{} {} ({}).zip", label, version.trim(), date),
        None => format!("{} ({}).zip", label, date),
    }
}

/// Zip every regular file under `source_dir` into `archive_path`.
///
/// Entry names are relative to the parent of `source_dir`, so the archive
/// unpacks into a directory of the same name. `archive_path` itself is
/// skipped when it lies inside the source. `progress(done, total)` is
/// called after each file. Runs on the blocking pool.
pub async fn create_zip<F>(
    source_dir: &Path,
    archive_path: &Path,
    progress: F,
    cancel: CancellationToken,
) -> SchedulerResult<ArchiveStats>
where
    F: Fn(usize, usize) + Send + 'static,
{
    let source_dir = source_dir.to_path_buf();
    let archive_path = archive_path.to_path_buf();
    tokio::task::spawn_blocking(move || zip_directory(&source_dir, &archive_path, progress, &cancel))
        .await
        .map_err(|e| SchedulerError::Archive(format!("archive task failed: {}", e)))?
}

fn zip_directory<F>(
    source_dir: &Path,
    archive_path: &Path,
    progress: F,
    cancel: &CancellationToken,
) -> SchedulerResult<ArchiveStats>
where
    F: Fn(usize, usize),
{
    if !source_dir.is_dir() {
        return Err(SchedulerError::Archive(format!(
            "{} is not a directory",
            source_dir.display()
        )));
    }

    let mut files = Vec::new();
    collect_files(source_dir, archive_path, &mut files)?;
    let total = files.len();
    let base = source_dir.parent().unwrap_or(source_dir);

    if let Some(parent) = archive_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut zip = ZipWriter::new(File::create(archive_path)?);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut written = 0;
    for (index, path) in files.iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(SchedulerError::Cancelled("compression cancelled".to_string()));
        }

        let name = path
            .strip_prefix(base)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");
        match File::open(path) {
            Ok(mut file) => {
                zip.start_file(name, options).map_err(archive_error)?;
                io::copy(&mut file, &mut zip)?;
                written += 1;
            }
            // Files can vanish or be locked while the server directory is live
            Err(e) => warn!("Skipping {} in backup: {}", path.display(), e),
        }
        progress(index + 1, total);
    }

    zip.finish().map_err(archive_error)?;
    let bytes = std::fs::metadata(archive_path)?.len();
    debug!("Archived {} files into {} ({} bytes)", written, archive_path.display(), bytes);

    Ok(ArchiveStats {
        files: written,
        bytes,
    })
}

fn collect_files(dir: &Path, skip: &Path, out: &mut Vec<PathBuf>) -> io::Result<()> {
    let mut entries: Vec<_> = std::fs::read_dir(dir)?.collect::<io::Result<_>>()?;
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let path = entry.path();
        let file_type = entry.file_type()?;
        if path == skip {
            continue;
        }
        if file_type.is_dir() {
            collect_files(&path, skip, out)?;
        } else if file_type.is_file() {
            out.push(path);
        }
    }
    Ok(())
}

fn archive_error(e: zip::result::ZipError) -> SchedulerError {
    SchedulerError::Archive(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn server_tree(root: &Path) -> PathBuf {
        let server = root.join("server");
        std::fs::create_dir_all(server.join("world").join("region")).unwrap();
        std::fs::write(server.join("server.properties"), "rcon.port=25575\n").unwrap();
        std::fs::write(server.join("world").join("level.dat"), vec![7u8; 2048]).unwrap();
        std::fs::write(server.join("world").join("region").join("r.0.0.mca"), b"chunk").unwrap();
        server
    }

    #[test]
    fn test_archive_name() {
        let date = NaiveDate::from_ymd_opt(2026, 2, 8).unwrap();
        assert_eq!(archive_name("minecraft_server", None, date), "minecraft_server (2026-2-8).zip");
        assert_eq!(
            archive_name("minecraft_server", Some("1.21.4"), date),
            "minecraft_server 1.21.4 (2026-2-8).zip"
        );
    }

    #[tokio::test]
    async fn test_zip_contains_tree_relative_to_parent() {
        let dir = tempfile::tempdir().unwrap();
        let server = server_tree(dir.path());
        let archive = dir.path().join("backups").join("test.zip");
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let stats = create_zip(
            &server,
            &archive,
            move |done, total| {
                assert!(done <= total);
                counter.fetch_add(1, Ordering::SeqCst);
            },
            CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(stats.files, 3);
        assert!(stats.bytes > 0);
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let mut zip = zip::ZipArchive::new(File::open(&archive).unwrap()).unwrap();
        let mut level = zip.by_name("server/world/level.dat").unwrap();
        let mut content = Vec::new();
        level.read_to_end(&mut content).unwrap();
        assert_eq!(content.len(), 2048);
    }

    #[tokio::test]
    async fn test_archive_inside_source_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let server = server_tree(dir.path());
        let archive = server.join("backup.zip");

        let stats = create_zip(&server, &archive, |_, _| {}, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(stats.files, 3);
    }

    #[tokio::test]
    async fn test_cancelled_before_first_file() {
        let dir = tempfile::tempdir().unwrap();
        let server = server_tree(dir.path());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = create_zip(&server, &dir.path().join("x.zip"), |_, _| {}, cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::Cancelled(_)));
    }

    #[tokio::test]
    async fn test_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        let err = create_zip(
            &dir.path().join("nope"),
            &dir.path().join("x.zip"),
            |_, _| {},
            CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, SchedulerError::Archive(_)));
    }
}
