//! In-process ZIP fallback.
//!
//! Used when the external compressor is unavailable or explicitly not
//! wanted. Walks the source tree, streams each file into a standard ZIP
//! container, and reports progress as bytes-processed over total bytes.
//! Cancellation is checked before each file; this backend has no pause
//! support.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

use log::{info, warn};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::EngineError;
use crate::model::{
    ArchiveBackend, ArchiveOperationResult, ArchiveRunStats, CompressionMode,
};
use crate::progress::{OperationControl, Progress, ProgressSink};

/// Writes archives without an external process.
pub struct BufferedArchiver {
    control: OperationControl,
}

struct PlannedEntry {
    source: PathBuf,
    name: String,
    size: u64,
}

impl BufferedArchiver {
    pub fn new(control: OperationControl) -> Self {
        BufferedArchiver { control }
    }

    /// Create `output` from the tree at `source_root`.
    ///
    /// Entry names are computed against the source's parent so the archive
    /// contains the selected folder's own name; a single-file source uses
    /// the bare filename. A source with no files is a defined failure, not
    /// a zero-byte archive.
    pub fn create_archive(
        &self,
        source_root: &Path,
        output: &Path,
        mode: CompressionMode,
        sink: &dyn ProgressSink,
    ) -> Result<ArchiveOperationResult, EngineError> {
        let entries = plan_entries(source_root)?;
        if entries.is_empty() {
            return Err(EngineError::NoFilesToCompress {
                path: source_root.to_path_buf(),
            });
        }
        let total_bytes: u64 = entries.iter().map(|e| e.size).sum();

        let method = match mode {
            CompressionMode::Store => CompressionMethod::Stored,
            _ => CompressionMethod::Deflated,
        };
        let options = SimpleFileOptions::default()
            .compression_method(method)
            .large_file(true);

        let file = fs::File::create(output).map_err(|e| EngineError::WriteError {
            path: output.to_path_buf(),
            source: e,
        })?;
        let mut writer = ZipWriter::new(file);

        let started = Instant::now();
        let mut processed_bytes: u64 = 0;
        let mut files_processed: u64 = 0;

        for entry in &entries {
            if self.control.is_cancelled() {
                // Abandon the half-written container; partial output stays
                // on disk like a cancelled copy does
                return Err(EngineError::Cancelled);
            }

            // Progress is reported before the write, so completion gets its
            // own explicit 100% below
            let percent = if total_bytes > 0 {
                processed_bytes * 100 / total_bytes
            } else {
                0
            };
            sink.on_progress(
                Progress::percent(percent),
                &format!("Adding: {}", entry.name),
            );

            writer
                .start_file(entry.name.clone(), options)
                .map_err(|e| EngineError::ArchiveWriteFailed {
                    path: output.to_path_buf(),
                    detail: e.to_string(),
                })?;
            let mut source_file =
                fs::File::open(&entry.source).map_err(|e| EngineError::ReadError {
                    path: entry.source.clone(),
                    source: e,
                })?;
            io::copy(&mut source_file, &mut writer).map_err(|e| EngineError::WriteError {
                path: output.to_path_buf(),
                source: e,
            })?;

            processed_bytes += entry.size;
            files_processed += 1;
        }

        writer.finish().map_err(|e| EngineError::ArchiveWriteFailed {
            path: output.to_path_buf(),
            detail: e.to_string(),
        })?;

        let mut stats = ArchiveRunStats::new(ArchiveBackend::Buffered);
        stats.execution_time = started.elapsed();
        stats.files_processed = files_processed;
        stats.bytes_processed = processed_bytes;
        stats.archive_size = fs::metadata(output).map(|m| m.len()).unwrap_or(0);
        stats.finalize_speed();

        info!(
            "Buffered archive complete: {} ({} files, {:.1} MB/s)",
            output.display(),
            files_processed,
            stats.average_speed_mbps
        );
        sink.on_progress(
            Progress::percent(100),
            &format!(
                "Archive created: {}",
                output.file_name().unwrap_or_default().to_string_lossy()
            ),
        );

        Ok(ArchiveOperationResult {
            created_archives: vec![output.to_path_buf()],
            compression: mode,
            stats,
            warnings: Vec::new(),
        })
    }
}

/// Walk the source and compute entry names plus the up-front byte total.
fn plan_entries(source_root: &Path) -> Result<Vec<PlannedEntry>, EngineError> {
    let metadata = fs::metadata(source_root).map_err(|e| EngineError::EnumerationFailed {
        path: source_root.to_path_buf(),
        source: e,
    })?;

    if metadata.is_file() {
        let name = source_root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());
        return Ok(vec![PlannedEntry {
            source: source_root.to_path_buf(),
            name,
            size: metadata.len(),
        }]);
    }

    let base = source_root.parent().unwrap_or_else(|| Path::new(""));
    let mut entries = Vec::new();
    for entry in WalkDir::new(source_root).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry under {}: {}", source_root.display(), e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry
            .path()
            .strip_prefix(base)
            .unwrap_or(entry.path())
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        entries.push(PlannedEntry {
            source: entry.path().to_path_buf(),
            name,
            size: entry.metadata().map(|m| m.len()).unwrap_or(0),
        });
    }
    Ok(entries)
}
