//! Core data model for transfer and archive operations.
//!
//! This module defines the main data structures:
//! - CopySettings / ArchiveSettings: operation configuration
//! - FileTransferResult: one entry per copied file
//! - OperationMetrics / MetricsRecorder: aggregate timing and throughput
//! - ArchiveOperationResult: archives produced by either backend

use std::path::PathBuf;
use std::time::{Duration, Instant, SystemTime};

use crate::hashing::{HashAlgorithm, HashDigest};

/// A file or directory selected for copying.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceItem {
    pub path: PathBuf,
}

impl SourceItem {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        SourceItem { path: path.into() }
    }
}

/// Settings for a copy-and-verify operation.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CopySettings {
    /// Hash algorithm used for verification
    pub algorithm: HashAlgorithm,
    /// Mirror the selected folder structure at the destination
    pub preserve_structure: bool,
    /// Compute and compare source/destination digests
    pub calculate_hash: bool,
    /// Write a CSV report here after the copy
    pub csv_report: Option<PathBuf>,
}

impl Default for CopySettings {
    fn default() -> Self {
        CopySettings {
            algorithm: HashAlgorithm::Sha256,
            preserve_structure: true,
            calculate_hash: true,
            csv_report: None,
        }
    }
}

/// The state of a long-running operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationState {
    /// Created, not yet started
    Created,
    /// Currently executing
    Running,
    /// Suspended; will resume or cancel
    Paused,
    /// All files processed (some may have failed or mismatched)
    Completed,
    /// Stopped early on caller request
    Cancelled,
    /// Nothing succeeded
    Failed,
}

impl OperationState {
    /// Returns true if this state is terminal (no further changes expected).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OperationState::Completed | OperationState::Cancelled | OperationState::Failed
        )
    }
}

/// Result of copying a single file.
///
/// `key` is a short hash of the source path plus the filename, unique across
/// same-named files in different folders and still readable in reports.
#[derive(Debug, Clone)]
pub struct FileTransferResult {
    pub key: String,
    pub source_path: PathBuf,
    pub destination_path: PathBuf,
    /// Size of the source file in bytes
    pub size: u64,
    pub duration: Duration,
    /// Present only when hashing was requested
    pub source_hash: Option<HashDigest>,
    /// Present only when hashing was requested and the copy succeeded
    pub destination_hash: Option<HashDigest>,
    /// Digest match; always true when hashing was not requested
    pub verified: bool,
    pub success: bool,
    pub error: Option<String>,
    pub error_code: Option<i32>,
}

impl FileTransferResult {
    /// True when the copy succeeded but the destination digest differed.
    pub fn is_mismatch(&self) -> bool {
        self.success && !self.verified
    }
}

/// Aggregate timing and throughput for one operation.
#[derive(Debug, Clone)]
pub struct OperationMetrics {
    pub started_at: SystemTime,
    pub finished_at: SystemTime,
    pub duration: Duration,
    /// Bytes known up front (sum of source sizes)
    pub total_bytes: u64,
    /// Bytes belonging to successfully processed files
    pub bytes_processed: u64,
    pub total_files: u64,
    pub files_processed: u64,
    pub average_speed_mbps: f64,
    /// Highest sampled throughput, from periodic measurements
    pub peak_speed_mbps: f64,
}

/// Builds OperationMetrics while an operation runs.
///
/// Throughput samples are taken at most every 100 ms so the peak reflects
/// sustained transfer speed rather than a single small burst.
#[derive(Debug)]
pub struct MetricsRecorder {
    started_at: SystemTime,
    start: Instant,
    total_bytes: u64,
    total_files: u64,
    bytes_processed: u64,
    files_processed: u64,
    sample_window_start: Instant,
    sample_window_bytes: u64,
    peak_speed_mbps: f64,
}

const SAMPLE_INTERVAL: Duration = Duration::from_millis(100);

impl MetricsRecorder {
    pub fn start(total_files: u64, total_bytes: u64) -> Self {
        let now = Instant::now();
        MetricsRecorder {
            started_at: SystemTime::now(),
            start: now,
            total_bytes,
            total_files,
            bytes_processed: 0,
            files_processed: 0,
            sample_window_start: now,
            sample_window_bytes: 0,
            peak_speed_mbps: 0.0,
        }
    }

    /// Feed raw block throughput (called per copied block, including blocks
    /// of files that later fail verification).
    pub fn note_throughput(&mut self, bytes: u64) {
        self.sample_window_bytes += bytes;
        let elapsed = self.sample_window_start.elapsed();
        if elapsed >= SAMPLE_INTERVAL {
            let speed =
                (self.sample_window_bytes as f64 / (1024.0 * 1024.0)) / elapsed.as_secs_f64();
            if speed > self.peak_speed_mbps {
                self.peak_speed_mbps = speed;
            }
            self.sample_window_start = Instant::now();
            self.sample_window_bytes = 0;
        }
    }

    /// Record one successfully processed file.
    pub fn add_success(&mut self, bytes: u64) {
        self.bytes_processed += bytes;
        self.files_processed += 1;
    }

    pub fn bytes_processed(&self) -> u64 {
        self.bytes_processed
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn finish(self) -> OperationMetrics {
        let duration = self.start.elapsed();
        let secs = duration.as_secs_f64();
        let average_speed_mbps = if secs > 0.0 {
            (self.bytes_processed as f64 / (1024.0 * 1024.0)) / secs
        } else {
            0.0
        };
        OperationMetrics {
            started_at: self.started_at,
            finished_at: SystemTime::now(),
            duration,
            total_bytes: self.total_bytes,
            bytes_processed: self.bytes_processed,
            total_files: self.total_files,
            files_processed: self.files_processed,
            average_speed_mbps,
            peak_speed_mbps: self.peak_speed_mbps.max(average_speed_mbps),
        }
    }
}

/// Compression applied inside archives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum CompressionMode {
    /// No entropy coding; fastest, chosen for evidentiary workflows
    Store,
    /// Fastest deflate level
    Fast,
    /// Normal deflate
    Normal,
    /// Maximum deflate
    Max,
}

impl Default for CompressionMode {
    fn default() -> Self {
        CompressionMode::Store
    }
}

impl CompressionMode {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "store" => Some(Self::Store),
            "fast" => Some(Self::Fast),
            "normal" => Some(Self::Normal),
            "max" => Some(Self::Max),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Store => "store",
            Self::Fast => "fast",
            Self::Normal => "normal",
            Self::Max => "max",
        }
    }
}

impl std::fmt::Display for CompressionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which archive backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ArchiveMethod {
    /// External compressor subprocess; error if unavailable
    Native,
    /// In-process ZIP writer
    Buffered,
    /// External when available and validated, otherwise buffered
    Auto,
}

impl Default for ArchiveMethod {
    fn default() -> Self {
        ArchiveMethod::Auto
    }
}

impl ArchiveMethod {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "native" => Some(Self::Native),
            "buffered" => Some(Self::Buffered),
            "auto" => Some(Self::Auto),
            _ => None,
        }
    }
}

/// Whether archiving runs at all; `Prompt` is resolved by the presentation
/// layer before the engine is invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ZipEnabled {
    Enabled,
    Disabled,
    Prompt,
}

/// Settings for archive creation.
///
/// The three level flags are independent; any subset may be set.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ArchiveSettings {
    pub method: ArchiveMethod,
    pub compression: CompressionMode,
    /// Where archives are written; defaults to each folder's parent
    pub output_dir: Option<PathBuf>,
    /// Archive the whole tree
    pub create_at_root: bool,
    /// Archive each first-level subfolder
    pub create_at_location: bool,
    /// Archive each second-level subfolder
    pub create_at_datetime: bool,
}

impl Default for ArchiveSettings {
    fn default() -> Self {
        ArchiveSettings {
            method: ArchiveMethod::Auto,
            compression: CompressionMode::Store,
            output_dir: None,
            create_at_root: true,
            create_at_location: false,
            create_at_datetime: false,
        }
    }
}

/// Identifies which backend actually produced an archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveBackend {
    Native,
    Buffered,
}

impl ArchiveBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Native => "native",
            Self::Buffered => "buffered",
        }
    }
}

impl std::fmt::Display for ArchiveBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Execution statistics shared by both archive backends.
#[derive(Debug, Clone)]
pub struct ArchiveRunStats {
    pub backend: ArchiveBackend,
    pub execution_time: Duration,
    pub average_speed_mbps: f64,
    pub files_processed: u64,
    /// Bytes submitted for compression (not the compressed size)
    pub bytes_processed: u64,
    /// On-disk size of the produced archives
    pub archive_size: u64,
    /// Exit code of the external compressor, when that backend ran
    pub exit_code: Option<i32>,
}

impl ArchiveRunStats {
    pub fn new(backend: ArchiveBackend) -> Self {
        ArchiveRunStats {
            backend,
            execution_time: Duration::ZERO,
            average_speed_mbps: 0.0,
            files_processed: 0,
            bytes_processed: 0,
            archive_size: 0,
            exit_code: None,
        }
    }

    /// Derive the average speed from bytes submitted and wall-clock time.
    pub fn finalize_speed(&mut self) {
        let secs = self.execution_time.as_secs_f64();
        self.average_speed_mbps = if secs > 0.0 {
            (self.bytes_processed as f64 / (1024.0 * 1024.0)) / secs
        } else {
            0.0
        };
    }
}

/// Result of an archive operation, identical in shape whichever backend ran.
#[derive(Debug, Clone)]
pub struct ArchiveOperationResult {
    /// Archives that were actually produced
    pub created_archives: Vec<PathBuf>,
    pub compression: CompressionMode,
    pub stats: ArchiveRunStats,
    /// Non-fatal issues (e.g. one folder level failing)
    pub warnings: Vec<String>,
}

/// Outcome of a copy-and-verify run. Per-file results stay in processing
/// order; `failed` and `mismatched` hold the keys of the affected entries.
#[derive(Debug)]
pub struct CopyOutcome {
    pub state: OperationState,
    pub results: Vec<FileTransferResult>,
    pub metrics: OperationMetrics,
    pub failed: Vec<String>,
    pub mismatched: Vec<String>,
    pub warnings: Vec<String>,
}

impl CopyOutcome {
    /// Look up a per-file result by its key.
    pub fn result_for(&self, key: &str) -> Option<&FileTransferResult> {
        self.results.iter().find(|r| r.key == key)
    }

    pub fn successes(&self) -> impl Iterator<Item = &FileTransferResult> {
        self.results.iter().filter(|r| r.success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_terminality() {
        assert!(!OperationState::Created.is_terminal());
        assert!(!OperationState::Running.is_terminal());
        assert!(!OperationState::Paused.is_terminal());
        assert!(OperationState::Completed.is_terminal());
        assert!(OperationState::Cancelled.is_terminal());
        assert!(OperationState::Failed.is_terminal());
    }

    #[test]
    fn test_metrics_zero_duration_guard() {
        let recorder = MetricsRecorder::start(0, 0);
        let metrics = recorder.finish();
        assert!(metrics.average_speed_mbps >= 0.0);
        assert!(metrics.duration >= Duration::ZERO);
    }

    #[test]
    fn test_metrics_accumulation() {
        let mut recorder = MetricsRecorder::start(2, 3000);
        recorder.add_success(1000);
        recorder.add_success(2000);
        let metrics = recorder.finish();
        assert_eq!(metrics.bytes_processed, 3000);
        assert_eq!(metrics.files_processed, 2);
        assert_eq!(metrics.total_files, 2);
        assert_eq!(metrics.total_bytes, 3000);
    }

    #[test]
    fn test_metrics_peak_at_least_average() {
        let mut recorder = MetricsRecorder::start(1, 1024);
        recorder.note_throughput(1024);
        recorder.add_success(1024);
        std::thread::sleep(Duration::from_millis(5));
        let metrics = recorder.finish();
        assert!(metrics.peak_speed_mbps >= metrics.average_speed_mbps);
    }

    #[test]
    fn test_compression_mode_parsing() {
        assert_eq!(CompressionMode::from_str("store"), Some(CompressionMode::Store));
        assert_eq!(CompressionMode::from_str("MAX"), Some(CompressionMode::Max));
        assert_eq!(CompressionMode::from_str("ultra"), None);
        assert_eq!(CompressionMode::default(), CompressionMode::Store);
    }

    #[test]
    fn test_archive_method_parsing() {
        assert_eq!(ArchiveMethod::from_str("native"), Some(ArchiveMethod::Native));
        assert_eq!(ArchiveMethod::from_str("buffered"), Some(ArchiveMethod::Buffered));
        assert_eq!(ArchiveMethod::from_str("auto"), Some(ArchiveMethod::Auto));
        assert_eq!(ArchiveMethod::from_str("zip"), None);
    }

    #[test]
    fn test_mismatch_classification() {
        let result = FileTransferResult {
            key: "k".into(),
            source_path: PathBuf::from("a"),
            destination_path: PathBuf::from("b"),
            size: 1,
            duration: Duration::ZERO,
            source_hash: None,
            destination_hash: None,
            verified: false,
            success: true,
            error: None,
            error_code: None,
        };
        assert!(result.is_mismatch());
    }
}
