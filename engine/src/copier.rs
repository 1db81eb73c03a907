//! Single-file copy with streaming hash verification.
//!
//! The copier reads the source in fixed-size blocks, writes each block to the
//! destination, and hashes the source stream as it is read. When hashing is
//! requested the destination is re-read from disk afterwards and hashed
//! independently, so silent write corruption is caught, not just read
//! corruption.

use std::fs;
use std::io::{Read, Write};
use std::path::Path;
use std::time::Instant;

use log::{debug, warn};

use crate::error::EngineError;
use crate::hashing::{self, HashAlgorithm, HashDigest};
use crate::model::{FileTransferResult, MetricsRecorder};
use crate::progress::{OperationControl, Progress, ProgressSink};

/// Block size tuned for sequential throughput on typical evidence media.
pub const COPY_BUFFER_SIZE: usize = 4 * 1024 * 1024;

/// Pause is only checked every few blocks; cancellation every block.
const PAUSE_CHECK_BLOCKS: u64 = 16;

/// Copies one file at a time, optionally verifying content digests.
pub struct HashingCopier {
    algorithm: HashAlgorithm,
    control: OperationControl,
    buffer_size: usize,
}

impl HashingCopier {
    pub fn new(algorithm: HashAlgorithm, control: OperationControl) -> Self {
        HashingCopier {
            algorithm,
            control,
            buffer_size: COPY_BUFFER_SIZE,
        }
    }

    /// Override the block size (clamped to 8 KiB..=10 MiB).
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size.clamp(8 * 1024, 10 * 1024 * 1024);
        self
    }

    /// Copy `source` to `destination`, reporting progress after each block.
    ///
    /// Never panics and never returns early with an error: all failure modes
    /// (unreadable source, full disk, permission denial, cancellation) are
    /// carried in the returned FileTransferResult. A cancelled copy leaves
    /// partially written destination data in place.
    pub fn copy(
        &self,
        source: &Path,
        destination: &Path,
        compute_hash: bool,
        recorder: &mut MetricsRecorder,
        sink: &dyn ProgressSink,
    ) -> FileTransferResult {
        let started = Instant::now();
        let key = hashing::path_key(source);

        let mut result = FileTransferResult {
            key,
            source_path: source.to_path_buf(),
            destination_path: destination.to_path_buf(),
            size: 0,
            duration: std::time::Duration::ZERO,
            source_hash: None,
            destination_hash: None,
            verified: !compute_hash,
            success: false,
            error: None,
            error_code: None,
        };

        match self.copy_inner(source, destination, compute_hash, recorder, sink, &mut result) {
            Ok(()) => {
                result.success = true;
            }
            Err(err) => {
                warn!("Copy failed for {}: {}", source.display(), err);
                result.error_code = err.raw_os_error();
                result.error = Some(err.to_string());
                if compute_hash {
                    result.verified = false;
                }
            }
        }

        result.duration = started.elapsed();
        result
    }

    fn copy_inner(
        &self,
        source: &Path,
        destination: &Path,
        compute_hash: bool,
        recorder: &mut MetricsRecorder,
        sink: &dyn ProgressSink,
        result: &mut FileTransferResult,
    ) -> Result<(), EngineError> {
        let mut src_file = fs::File::open(source).map_err(|e| EngineError::ReadError {
            path: source.to_path_buf(),
            source: e,
        })?;

        let src_metadata = src_file.metadata().map_err(|e| EngineError::ReadError {
            path: source.to_path_buf(),
            source: e,
        })?;
        let file_size = src_metadata.len();
        result.size = file_size;
        let src_mtime = src_metadata.modified().ok();

        let mut dst_file = fs::File::create(destination).map_err(|e| EngineError::WriteError {
            path: destination.to_path_buf(),
            source: e,
        })?;

        let file_name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut source_hasher = compute_hash.then(|| hashing::create_hasher(self.algorithm));
        let mut buffer = vec![0u8; self.buffer_size];
        let mut bytes_copied: u64 = 0;
        let mut blocks: u64 = 0;
        let block_started = Instant::now();

        loop {
            if self.control.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            if blocks % PAUSE_CHECK_BLOCKS == 0 {
                self.control.wait_while_paused();
            }

            let n = src_file.read(&mut buffer).map_err(|e| EngineError::ReadError {
                path: source.to_path_buf(),
                source: e,
            })?;
            if n == 0 {
                break;
            }

            if let Some(hasher) = source_hasher.as_mut() {
                hasher.update(&buffer[..n]);
            }

            dst_file
                .write_all(&buffer[..n])
                .map_err(|e| EngineError::WriteError {
                    path: destination.to_path_buf(),
                    source: e,
                })?;

            bytes_copied += n as u64;
            blocks += 1;
            recorder.note_throughput(n as u64);

            let percent = if file_size > 0 {
                bytes_copied * 100 / file_size
            } else {
                100
            };
            let elapsed = block_started.elapsed().as_secs_f64();
            let speed = if elapsed > 0.0 {
                (bytes_copied as f64 / (1024.0 * 1024.0)) / elapsed
            } else {
                0.0
            };
            sink.on_progress(
                Progress::percent(percent),
                &format!("Streaming {} @ {:.1} MB/s", file_name, speed),
            );
        }

        dst_file.flush().map_err(|e| EngineError::WriteError {
            path: destination.to_path_buf(),
            source: e,
        })?;
        drop(dst_file);

        // Preserve the source modification time; losing it is not fatal
        if let Some(mtime) = src_mtime {
            let _ = filetime::set_file_mtime(
                destination,
                filetime::FileTime::from_system_time(mtime),
            );
        }

        if let Some(hasher) = source_hasher {
            let source_digest = hasher.finalize();
            let dest_digest = self.hash_destination(destination)?;
            result.verified = source_digest.hex() == dest_digest.hex();
            if !result.verified {
                debug!(
                    "Digest mismatch for {}: {} != {}",
                    destination.display(),
                    source_digest.hex(),
                    dest_digest.hex()
                );
            }
            result.source_hash = Some(source_digest);
            result.destination_hash = Some(dest_digest);
        }

        Ok(())
    }

    /// Re-read the destination from disk and hash what actually landed.
    fn hash_destination(&self, destination: &Path) -> Result<HashDigest, EngineError> {
        let mut file = fs::File::open(destination).map_err(|e| EngineError::ReadError {
            path: destination.to_path_buf(),
            source: e,
        })?;

        let mut hasher = hashing::create_hasher(self.algorithm);
        let mut buffer = vec![0u8; self.buffer_size];

        loop {
            if self.control.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            let n = file.read(&mut buffer).map_err(|e| EngineError::ReadError {
                path: destination.to_path_buf(),
                source: e,
            })?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
        }

        Ok(hasher.finalize())
    }
}

/// Ensure the parent directory of a path exists, creating it if necessary.
pub fn ensure_parent_dir_exists(path: &Path) -> Result<(), EngineError> {
    if let Some(parent) = path.parent() {
        if parent.as_os_str().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(parent).map_err(|e| EngineError::DirectoryCreationFailed {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }
    Ok(())
}
