//! # Custodian Engine - Evidence Transfer Library
//!
//! A headless engine for copying forensic file sets with cryptographic
//! verification and packing the result into ZIP archives. Designed as the
//! foundation for multiple UIs (CLI, GUI, automation).
//!
//! ## Overview
//!
//! The engine provides:
//! - Buffered copy with dual streaming digests (source and destination)
//! - Per-file result tracking with partial-failure and mismatch isolation
//! - Hybrid archiving: external 7-Zip subprocess or in-process ZIP writer
//! - Multi-level archive creation (root / location / datetime folders)
//! - Progress reporting and cooperative cancel/pause via callbacks
//! - Worker tracking with cleanup guarantees
//!
//! ## Basic Usage
//!
//! ```no_run
//! use engine::{
//!     CopySettings, CopyVerifyEngine, NullSink, OperationControl, SourceItem,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut engine = CopyVerifyEngine::new(
//!     vec![SourceItem::new("/media/evidence")],
//!     "/cases/1234/copy",
//!     CopySettings::default(),
//!     OperationControl::new(),
//! );
//!
//! let outcome = engine.run(&NullSink)?;
//! println!(
//!     "{} files, {} failed, {} mismatched",
//!     outcome.results.len(),
//!     outcome.failed.len(),
//!     outcome.mismatched.len()
//! );
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - **model**: Core data structures (settings, results, metrics)
//! - **error**: Error types and handling
//! - **hashing**: Streaming digests and algorithms
//! - **copier**: Single-file copy with verification
//! - **copy_verify**: Copy operation orchestration
//! - **report**: CSV report generation
//! - **tuning**: Host capability detection and compressor commands
//! - **sevenzip**: External compressor supervision
//! - **buffered**: In-process ZIP fallback
//! - **archive**: Backend selection and multi-level creation
//! - **worker**: Worker tracking and cancellation
//! - **progress**: Progress sink and operation control

pub mod archive;
pub mod buffered;
pub mod copier;
pub mod copy_verify;
pub mod error;
pub mod hashing;
pub mod model;
pub mod progress;
pub mod report;
pub mod sevenzip;
pub mod tuning;
pub mod worker;

// Re-export main types and functions
pub use archive::{list_entries, ArchiveEngine};
pub use buffered::BufferedArchiver;
pub use copier::HashingCopier;
pub use copy_verify::{expand_source_items, CopyVerifyEngine, TransferItem};
pub use error::{EngineError, ErrorKind};
pub use hashing::{hash_file, HashAlgorithm, HashDigest};
pub use model::{
    ArchiveBackend, ArchiveMethod, ArchiveOperationResult, ArchiveRunStats, ArchiveSettings,
    CompressionMode, CopyOutcome, CopySettings, FileTransferResult, OperationMetrics,
    OperationState, SourceItem, ZipEnabled,
};
pub use progress::{NullSink, OperationControl, Progress, ProgressSink};
pub use report::write_csv_report;
pub use sevenzip::{SevenZipBinary, SevenZipProcess};
pub use tuning::{CommandBuilder, HostProfile};
pub use worker::{SpawnOptions, WorkerCoordinator, WorkerHandle};
