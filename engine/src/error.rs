//! Error types for the evidence transfer engine.
//!
//! The primary error type is `EngineError`, which represents operation-level
//! errors that prevent an operation from running or finishing. Per-file copy
//! failures are recorded in FileTransferResult, not as EngineError.

use std::error::Error;
use std::fmt::{self, Display};
use std::io;
use std::path::PathBuf;

/// Broad classification of an engine error.
///
/// Validation errors mean the inputs were unusable before any work started.
/// FileOperation errors cover copy/report I/O. Archive errors cover the
/// compressor backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    FileOperation,
    Archive,
}

/// Errors that abort an operation (as opposed to per-file failures, which are
/// recorded in the aggregate result and do not stop remaining work).
#[derive(Debug)]
pub enum EngineError {
    /// No source files or folders were supplied
    NoSourceItems,

    /// A selected source path does not exist
    SourceNotFound { path: PathBuf },

    /// Source expansion produced no files at all
    NoFilesFound,

    /// Destination directory cannot be created or written to
    DestinationUnwritable { path: PathBuf, source: io::Error },

    /// Destination lies inside one of the selected sources
    DestinationInsideSource {
        destination: PathBuf,
        source_item: PathBuf,
    },

    /// Failed to read from a source file
    ReadError { path: PathBuf, source: io::Error },

    /// Failed to write to a destination file
    WriteError { path: PathBuf, source: io::Error },

    /// Failed to create a directory
    DirectoryCreationFailed { path: PathBuf, source: io::Error },

    /// Failed to enumerate a source directory
    EnumerationFailed { path: PathBuf, source: io::Error },

    /// CSV report could not be written
    ReportWriteFailed { path: PathBuf, source: io::Error },

    /// Operation was cancelled by the caller
    Cancelled,

    /// External compressor binary is missing or failed validation
    CompressorUnavailable { reason: String },

    /// External compressor could not be spawned
    SpawnFailed { source: io::Error },

    /// External compressor ran and exited with a failure code
    CompressorFailed { exit_code: i32, detail: String },

    /// External compressor exceeded the overall execution timeout
    ProcessTimeout { seconds: u64 },

    /// Archive integrity test reported a damaged archive
    IntegrityCheckFailed { path: PathBuf, detail: String },

    /// Archive source contained no files
    NoFilesToCompress { path: PathBuf },

    /// Archive container error from the in-process writer
    ArchiveWriteFailed { path: PathBuf, detail: String },
}

impl Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSourceItems => {
                write!(f, "No source files or folders specified")
            }
            Self::SourceNotFound { path } => {
                write!(f, "Source path not found: {}", path.display())
            }
            Self::NoFilesFound => {
                write!(f, "No files found in the selected sources")
            }
            Self::DestinationUnwritable { path, source } => {
                write!(f, "Destination not writable: {} ({})", path.display(), source)
            }
            Self::DestinationInsideSource {
                destination,
                source_item,
            } => {
                write!(
                    f,
                    "Destination {} is nested inside source {}",
                    destination.display(),
                    source_item.display()
                )
            }
            Self::ReadError { path, .. } => {
                write!(f, "Failed to read file: {}", path.display())
            }
            Self::WriteError { path, .. } => {
                write!(f, "Failed to write file: {}", path.display())
            }
            Self::DirectoryCreationFailed { path, .. } => {
                write!(f, "Failed to create directory: {}", path.display())
            }
            Self::EnumerationFailed { path, .. } => {
                write!(f, "Failed to enumerate directory: {}", path.display())
            }
            Self::ReportWriteFailed { path, source } => {
                write!(f, "Failed to write report {} ({})", path.display(), source)
            }
            Self::Cancelled => {
                write!(f, "Operation cancelled by user")
            }
            Self::CompressorUnavailable { reason } => {
                write!(f, "External compressor unavailable: {}", reason)
            }
            Self::SpawnFailed { source } => {
                write!(f, "Failed to launch external compressor: {}", source)
            }
            Self::CompressorFailed { exit_code, detail } => {
                write!(f, "Compressor failed with exit code {}: {}", exit_code, detail)
            }
            Self::ProcessTimeout { seconds } => {
                write!(f, "Compressor did not finish within {} seconds", seconds)
            }
            Self::IntegrityCheckFailed { path, detail } => {
                write!(
                    f,
                    "Archive integrity test failed for {}: {}",
                    path.display(),
                    detail
                )
            }
            Self::NoFilesToCompress { path } => {
                write!(f, "No files to compress in {}", path.display())
            }
            Self::ArchiveWriteFailed { path, detail } => {
                write!(f, "Failed to write archive {}: {}", path.display(), detail)
            }
        }
    }
}

impl Error for EngineError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::DestinationUnwritable { source, .. }
            | Self::ReadError { source, .. }
            | Self::WriteError { source, .. }
            | Self::DirectoryCreationFailed { source, .. }
            | Self::EnumerationFailed { source, .. }
            | Self::ReportWriteFailed { source, .. }
            | Self::SpawnFailed { source } => Some(source),
            _ => None,
        }
    }
}

impl EngineError {
    /// Which part of the taxonomy this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoSourceItems
            | Self::SourceNotFound { .. }
            | Self::NoFilesFound
            | Self::DestinationUnwritable { .. }
            | Self::DestinationInsideSource { .. } => ErrorKind::Validation,

            Self::ReadError { .. }
            | Self::WriteError { .. }
            | Self::DirectoryCreationFailed { .. }
            | Self::EnumerationFailed { .. }
            | Self::ReportWriteFailed { .. }
            | Self::Cancelled => ErrorKind::FileOperation,

            Self::CompressorUnavailable { .. }
            | Self::SpawnFailed { .. }
            | Self::CompressorFailed { .. }
            | Self::ProcessTimeout { .. }
            | Self::IntegrityCheckFailed { .. }
            | Self::NoFilesToCompress { .. }
            | Self::ArchiveWriteFailed { .. } => ErrorKind::Archive,
        }
    }

    /// Short user-facing message, as opposed to the technical `Display` text.
    pub fn user_message(&self) -> String {
        match self {
            Self::NoSourceItems => "Please select files or folders to copy.".into(),
            Self::SourceNotFound { .. } => "A selected source could not be found.".into(),
            Self::NoFilesFound => "No files were found in the selected items.".into(),
            Self::DestinationUnwritable { .. } => {
                "Cannot write to the destination folder. Check permissions and disk space.".into()
            }
            Self::DestinationInsideSource { .. } => {
                "The destination cannot be inside a selected source folder.".into()
            }
            Self::ReadError { path, .. } => {
                format!("Could not read {}.", file_label(path))
            }
            Self::WriteError { path, .. } => {
                format!("Could not write {}.", file_label(path))
            }
            Self::DirectoryCreationFailed { .. } => {
                "Could not create a destination folder.".into()
            }
            Self::EnumerationFailed { .. } => "Could not list a source folder.".into(),
            Self::ReportWriteFailed { .. } => "The CSV report could not be saved.".into(),
            Self::Cancelled => "The operation was cancelled.".into(),
            Self::CompressorUnavailable { .. } => {
                "High-performance archiving is unavailable. Check the 7-Zip installation.".into()
            }
            Self::SpawnFailed { .. } => "The archiving tool could not be started.".into(),
            Self::CompressorFailed { .. } => "Archive creation failed.".into(),
            Self::ProcessTimeout { .. } => "Archive creation timed out.".into(),
            Self::IntegrityCheckFailed { .. } => "The archive failed its integrity test.".into(),
            Self::NoFilesToCompress { .. } => "There were no files to compress.".into(),
            Self::ArchiveWriteFailed { .. } => "The archive could not be written.".into(),
        }
    }

    /// Extract the OS error code from this error, if available.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::DestinationUnwritable { source, .. }
            | Self::ReadError { source, .. }
            | Self::WriteError { source, .. }
            | Self::DirectoryCreationFailed { source, .. }
            | Self::EnumerationFailed { source, .. }
            | Self::ReportWriteFailed { source, .. }
            | Self::SpawnFailed { source } => source.raw_os_error(),
            _ => None,
        }
    }

    /// True for the cancellation-flavored error.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

fn file_label(path: &std::path::Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
