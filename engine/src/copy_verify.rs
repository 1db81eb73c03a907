//! Copy-and-verify orchestration.
//!
//! The engine expands the selected sources into a flat file list, copies each
//! file through the HashingCopier, accumulates per-file results and aggregate
//! metrics, and classifies partial failures and hash mismatches. A single
//! file's failure never aborts the remaining work; the run only ends in
//! `Failed` when nothing succeeded at all.

use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};
use walkdir::WalkDir;

use crate::copier::{ensure_parent_dir_exists, HashingCopier};
use crate::error::EngineError;
use crate::model::{
    CopyOutcome, CopySettings, FileTransferResult, MetricsRecorder, OperationState, SourceItem,
};
use crate::progress::{OperationControl, Progress, ProgressSink};
use crate::report;

/// One file scheduled for copying. `relative` is populated only when
/// structure preservation was requested and the file came from a selected
/// directory; it is rooted at that directory's parent so the destination
/// mirrors the original top-level folder name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferItem {
    pub source: PathBuf,
    pub relative: Option<PathBuf>,
    pub size: u64,
}

/// Pause is checked every few files; cancellation before every file.
const PAUSE_CHECK_FILES: usize = 4;

/// Expand source items into a flat, deterministically ordered file list.
///
/// A selected file has no parent-folder context and yields `relative = None`.
/// A selected directory contributes all files beneath it, with relative paths
/// that include the directory's own name. Unreadable subtrees are skipped and
/// recorded as warnings.
pub fn expand_source_items(
    items: &[SourceItem],
    preserve_structure: bool,
    warnings: &mut Vec<String>,
) -> Result<Vec<TransferItem>, EngineError> {
    let mut files = Vec::new();

    for item in items {
        let metadata = fs::metadata(&item.path).map_err(|_| EngineError::SourceNotFound {
            path: item.path.clone(),
        })?;

        if metadata.is_file() {
            files.push(TransferItem {
                source: item.path.clone(),
                relative: None,
                size: metadata.len(),
            });
            continue;
        }

        let base = item.path.parent().unwrap_or_else(|| Path::new(""));
        for entry in WalkDir::new(&item.path).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let detail = format!("Skipped unreadable entry under {}: {}", item.path.display(), e);
                    warn!("{}", detail);
                    warnings.push(detail);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            let relative = if preserve_structure {
                entry
                    .path()
                    .strip_prefix(base)
                    .map(|p| p.to_path_buf())
                    .ok()
            } else {
                None
            };
            files.push(TransferItem {
                source: entry.path().to_path_buf(),
                relative,
                size,
            });
        }
    }

    Ok(files)
}

/// Orchestrates one copy-and-verify operation.
///
/// State machine: Created -> Running -> {Paused <-> Running} ->
/// {Completed | Cancelled | Failed}.
pub struct CopyVerifyEngine {
    sources: Vec<SourceItem>,
    destination: PathBuf,
    settings: CopySettings,
    control: OperationControl,
    state: OperationState,
}

impl CopyVerifyEngine {
    pub fn new(
        sources: Vec<SourceItem>,
        destination: impl Into<PathBuf>,
        settings: CopySettings,
        control: OperationControl,
    ) -> Self {
        CopyVerifyEngine {
            sources,
            destination: destination.into(),
            settings,
            control,
            state: OperationState::Created,
        }
    }

    pub fn state(&self) -> OperationState {
        self.state
    }

    pub fn control(&self) -> OperationControl {
        self.control.clone()
    }

    /// Run the operation to a terminal state.
    ///
    /// Returns `Err` only for unrecoverable validation problems (nothing
    /// selected, unusable destination, no files at all). Everything else,
    /// including cancellation and all-files-failed, terminates with an
    /// outcome so completed-so-far results stay retrievable.
    pub fn run(&mut self, sink: &dyn ProgressSink) -> Result<CopyOutcome, EngineError> {
        self.validate()?;

        let mut warnings = Vec::new();
        let files = expand_source_items(
            &self.sources,
            self.settings.preserve_structure,
            &mut warnings,
        )?;
        if files.is_empty() {
            return Err(EngineError::NoFilesFound);
        }

        self.state = OperationState::Running;
        let total_files = files.len();
        let total_bytes: u64 = files.iter().map(|f| f.size).sum();
        info!(
            "Copy-verify starting: {} files, {} bytes, hashing={}",
            total_files, total_bytes, self.settings.calculate_hash
        );
        sink.on_progress(
            Progress::percent(0),
            &format!("Found {} files to copy", total_files),
        );

        let copier = HashingCopier::new(self.settings.algorithm, self.control.clone());
        let mut recorder = MetricsRecorder::start(total_files as u64, total_bytes);
        let mut results: Vec<FileTransferResult> = Vec::with_capacity(total_files);
        let mut failed = Vec::new();
        let mut mismatched = Vec::new();

        for (idx, file) in files.iter().enumerate() {
            if self.control.is_cancelled() {
                self.state = OperationState::Cancelled;
                break;
            }
            if idx % PAUSE_CHECK_FILES == 0 && self.control.is_paused() {
                self.state = OperationState::Paused;
                sink.on_progress(Progress::Indeterminate, "Paused");
                self.control.wait_while_paused();
                if self.control.is_cancelled() {
                    self.state = OperationState::Cancelled;
                    break;
                }
                self.state = OperationState::Running;
            }

            let destination = self.destination_for(file);
            let result = match ensure_parent_dir_exists(&destination) {
                Ok(()) => copier.copy(
                    &file.source,
                    &destination,
                    self.settings.calculate_hash,
                    &mut recorder,
                    sink,
                ),
                Err(e) => directory_failure(file, &destination, &e),
            };

            if result.success {
                recorder.add_success(result.size);
                if result.is_mismatch() {
                    mismatched.push(result.key.clone());
                }
            } else {
                failed.push(result.key.clone());
            }

            let overall = if total_bytes > 0 {
                recorder.bytes_processed() * 100 / total_bytes
            } else {
                (idx as u64 + 1) * 100 / total_files as u64
            };
            sink.on_progress(
                Progress::percent(overall),
                &format!(
                    "Copied {} ({}/{})",
                    file.source
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default(),
                    idx + 1,
                    total_files
                ),
            );
            results.push(result);
        }

        let metrics = recorder.finish();

        if let Some(csv_path) = self.settings.csv_report.clone() {
            match report::write_csv_report(
                &csv_path,
                &results,
                self.settings.algorithm,
                self.settings.calculate_hash,
            ) {
                Ok(()) => {
                    sink.on_progress(
                        Progress::percent(100),
                        &format!("Report saved to {}", csv_path.display()),
                    );
                }
                Err(e) => {
                    // Report export is best-effort; the copy itself stands
                    warn!("CSV export failed: {}", e);
                    warnings.push(format!("CSV export failed: {}", e));
                }
            }
        }

        let successes = results.iter().filter(|r| r.success).count();
        if self.state != OperationState::Cancelled {
            self.state = if successes == 0 {
                OperationState::Failed
            } else {
                OperationState::Completed
            };
        }

        info!(
            "Copy-verify finished ({:?}): {}/{} files, {} failed, {} mismatched",
            self.state,
            successes,
            total_files,
            failed.len(),
            mismatched.len()
        );
        sink.on_progress(
            Progress::percent(100),
            &format!(
                "Completed: {}/{} files @ {:.1} MB/s avg",
                successes, total_files, metrics.average_speed_mbps
            ),
        );

        Ok(CopyOutcome {
            state: self.state,
            results,
            metrics,
            failed,
            mismatched,
            warnings,
        })
    }

    fn destination_for(&self, file: &TransferItem) -> PathBuf {
        match (&file.relative, self.settings.preserve_structure) {
            (Some(relative), true) => self.destination.join(relative),
            _ => self.destination.join(
                file.source
                    .file_name()
                    .unwrap_or_else(|| file.source.as_os_str()),
            ),
        }
    }

    fn validate(&self) -> Result<(), EngineError> {
        if self.sources.is_empty() {
            return Err(EngineError::NoSourceItems);
        }

        // Nesting is checked before anything is created so a bad destination
        // never writes into a source tree
        for item in &self.sources {
            if let Ok(metadata) = fs::metadata(&item.path) {
                if metadata.is_dir() {
                    let source_canonical = item
                        .path
                        .canonicalize()
                        .unwrap_or_else(|_| item.path.clone());
                    let dest_abs = self
                        .destination
                        .canonicalize()
                        .unwrap_or_else(|_| self.destination.clone());
                    if dest_abs.starts_with(&source_canonical)
                        || self.destination.starts_with(&item.path)
                    {
                        return Err(EngineError::DestinationInsideSource {
                            destination: self.destination.clone(),
                            source_item: item.path.clone(),
                        });
                    }
                }
            }
        }

        fs::create_dir_all(&self.destination).map_err(|e| EngineError::DestinationUnwritable {
            path: self.destination.clone(),
            source: e,
        })?;

        // Write probe: creating a marker file proves more than metadata checks
        let probe = self
            .destination
            .join(format!(".write_probe_{}", std::process::id()));
        fs::write(&probe, b"probe").map_err(|e| EngineError::DestinationUnwritable {
            path: self.destination.clone(),
            source: e,
        })?;
        let _ = fs::remove_file(&probe);

        Ok(())
    }
}

fn directory_failure(
    file: &TransferItem,
    destination: &Path,
    error: &EngineError,
) -> FileTransferResult {
    FileTransferResult {
        key: crate::hashing::path_key(&file.source),
        source_path: file.source.clone(),
        destination_path: destination.to_path_buf(),
        size: file.size,
        duration: std::time::Duration::ZERO,
        source_hash: None,
        destination_hash: None,
        verified: false,
        success: false,
        error: Some(error.to_string()),
        error_code: error.raw_os_error(),
    }
}
