//! Archive orchestration: backend selection and multi-level creation.
//!
//! Resolves the configured archive method to a concrete backend (external
//! compressor or in-process writer) and exposes one contract regardless of
//! which ran. Multi-level creation archives the tree root and/or its first-
//! and second-level subfolders, treating every folder attempt independently.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

use log::{info, warn};

use crate::buffered::BufferedArchiver;
use crate::error::EngineError;
use crate::model::{
    ArchiveBackend, ArchiveOperationResult, ArchiveRunStats, ArchiveSettings,
    ArchiveMethod,
};
use crate::progress::{OperationControl, ProgressSink};
use crate::sevenzip::{SevenZipBinary, SevenZipProcess};

/// Folder depth an archive batch operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArchiveLevel {
    Root,
    Location,
    Datetime,
}

impl ArchiveLevel {
    fn suffix(&self) -> &'static str {
        match self {
            Self::Root => "complete",
            Self::Location => "location",
            Self::Datetime => "datetime",
        }
    }
}

enum Backend {
    Native(SevenZipProcess),
    Buffered(BufferedArchiver),
}

/// Chooses and drives an archive backend.
pub struct ArchiveEngine {
    settings: ArchiveSettings,
    control: OperationControl,
    backend: Backend,
}

impl ArchiveEngine {
    /// Resolve the configured method, probing for the external compressor
    /// when it is wanted.
    pub fn new(settings: ArchiveSettings, control: OperationControl) -> Result<Self, EngineError> {
        let binary = match settings.method {
            ArchiveMethod::Native => Some(SevenZipBinary::discover()?),
            ArchiveMethod::Auto => match SevenZipBinary::discover() {
                Ok(binary) => Some(binary),
                Err(e) => {
                    info!("Falling back to buffered archiver: {}", e);
                    None
                }
            },
            ArchiveMethod::Buffered => None,
        };
        Self::with_binary(settings, control, binary)
    }

    /// Construct with an already-probed binary (or none). `Native` with no
    /// binary is refused outright; `Auto` falls back to buffered.
    pub fn with_binary(
        settings: ArchiveSettings,
        control: OperationControl,
        binary: Option<SevenZipBinary>,
    ) -> Result<Self, EngineError> {
        let backend = match (settings.method, binary) {
            (ArchiveMethod::Buffered, _) | (ArchiveMethod::Auto, None) => {
                Backend::Buffered(BufferedArchiver::new(control.clone()))
            }
            (ArchiveMethod::Native, None) => {
                return Err(EngineError::CompressorUnavailable {
                    reason: "native method requested but no validated binary supplied".to_string(),
                })
            }
            (ArchiveMethod::Native, Some(binary)) | (ArchiveMethod::Auto, Some(binary)) => {
                Backend::Native(SevenZipProcess::new(binary, control.clone()))
            }
        };
        Ok(ArchiveEngine {
            settings,
            control,
            backend,
        })
    }

    /// Which backend actually handles archive creation.
    pub fn backend(&self) -> ArchiveBackend {
        match self.backend {
            Backend::Native(_) => ArchiveBackend::Native,
            Backend::Buffered(_) => ArchiveBackend::Buffered,
        }
    }

    /// Create a single archive from `source`.
    pub fn create_archive(
        &self,
        source: &Path,
        output: &Path,
        sink: &dyn ProgressSink,
    ) -> Result<ArchiveOperationResult, EngineError> {
        match &self.backend {
            Backend::Native(process) => {
                process.create_archive(source, output, self.settings.compression, sink)
            }
            Backend::Buffered(archiver) => {
                archiver.create_archive(source, output, self.settings.compression, sink)
            }
        }
    }

    /// Create archives at every enabled level under `root`.
    ///
    /// Each folder is attempted independently: one failure becomes a warning
    /// and the remaining folders still run. The result lists only archives
    /// that actually succeeded; if nothing succeeded the whole operation is
    /// an error.
    pub fn create_archives(
        &self,
        root: &Path,
        sink: &dyn ProgressSink,
    ) -> Result<ArchiveOperationResult, EngineError> {
        let targets = self.collect_targets(root)?;
        if targets.is_empty() {
            return Err(EngineError::NoFilesToCompress {
                path: root.to_path_buf(),
            });
        }

        let started = Instant::now();
        let mut created = Vec::new();
        let mut warnings = Vec::new();
        let mut stats = ArchiveRunStats::new(self.backend());
        let mut last_error: Option<EngineError> = None;

        for (folder, level) in targets {
            if self.control.is_cancelled() {
                if created.is_empty() {
                    return Err(EngineError::Cancelled);
                }
                warnings.push("Cancelled before remaining folders".to_string());
                break;
            }

            let output_dir = self
                .settings
                .output_dir
                .clone()
                .or_else(|| folder.parent().map(|p| p.to_path_buf()))
                .unwrap_or_else(|| PathBuf::from("."));
            let output = output_dir.join(archive_name(&folder, level));

            match self.create_archive(&folder, &output, sink) {
                Ok(result) => {
                    created.extend(result.created_archives);
                    stats.files_processed += result.stats.files_processed;
                    stats.bytes_processed += result.stats.bytes_processed;
                    stats.archive_size += result.stats.archive_size;
                    stats.exit_code = result.stats.exit_code;
                    warnings.extend(result.warnings);
                }
                Err(e) if e.is_cancelled() => {
                    if created.is_empty() {
                        return Err(e);
                    }
                    warnings.push("Cancelled before remaining folders".to_string());
                    break;
                }
                Err(e) => {
                    warn!("Archive attempt failed for {}: {}", folder.display(), e);
                    warnings.push(format!("{}: {}", folder.display(), e));
                    last_error = Some(e);
                }
            }
        }

        if created.is_empty() {
            return Err(last_error.unwrap_or_else(|| EngineError::NoFilesToCompress {
                path: root.to_path_buf(),
            }));
        }

        stats.execution_time = started.elapsed();
        stats.finalize_speed();

        Ok(ArchiveOperationResult {
            created_archives: created,
            compression: self.settings.compression,
            stats,
            warnings,
        })
    }

    /// Verify an archive produced by either backend.
    ///
    /// The native backend runs the tool's own integrity test; the buffered
    /// backend re-reads every entry so stored CRCs are checked.
    pub fn verify_archive(&self, archive: &Path) -> Result<(), EngineError> {
        match &self.backend {
            Backend::Native(process) => process.test_archive(archive),
            Backend::Buffered(_) => verify_zip(archive),
        }
    }

    fn collect_targets(&self, root: &Path) -> Result<Vec<(PathBuf, ArchiveLevel)>, EngineError> {
        if !root.is_dir() {
            return Err(EngineError::SourceNotFound {
                path: root.to_path_buf(),
            });
        }

        let mut targets = Vec::new();
        if self.settings.create_at_root {
            targets.push((root.to_path_buf(), ArchiveLevel::Root));
        }
        if self.settings.create_at_location {
            for dir in subdirectories(root)? {
                targets.push((dir, ArchiveLevel::Location));
            }
        }
        if self.settings.create_at_datetime {
            for location in subdirectories(root)? {
                for dir in subdirectories(&location)? {
                    targets.push((dir, ArchiveLevel::Datetime));
                }
            }
        }
        Ok(targets)
    }
}

/// Archive filename for a folder at a given level: spaces replaced, a
/// level-specific suffix appended.
fn archive_name(folder: &Path, level: ArchiveLevel) -> String {
    let base = folder
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "archive".to_string());
    format!("{}_{}.zip", base.replace(' ', "_"), level.suffix())
}

/// Immediate subdirectories, sorted by name for deterministic ordering.
fn subdirectories(path: &Path) -> Result<Vec<PathBuf>, EngineError> {
    let mut dirs = Vec::new();
    let entries = fs::read_dir(path).map_err(|e| EngineError::EnumerationFailed {
        path: path.to_path_buf(),
        source: e,
    })?;
    for entry in entries {
        let entry = entry.map_err(|e| EngineError::EnumerationFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
        if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}

/// List file entries of a ZIP archive, whichever backend wrote it.
pub fn list_entries(archive: &Path) -> Result<Vec<String>, EngineError> {
    let file = fs::File::open(archive).map_err(|e| EngineError::ReadError {
        path: archive.to_path_buf(),
        source: e,
    })?;
    let zip = zip::ZipArchive::new(file).map_err(|e| EngineError::IntegrityCheckFailed {
        path: archive.to_path_buf(),
        detail: e.to_string(),
    })?;
    Ok(zip
        .file_names()
        .filter(|name| !name.ends_with('/'))
        .map(|name| name.to_string())
        .collect())
}

/// Re-read every entry so the container's checksums are exercised.
fn verify_zip(archive: &Path) -> Result<(), EngineError> {
    let file = fs::File::open(archive).map_err(|e| EngineError::ReadError {
        path: archive.to_path_buf(),
        source: e,
    })?;
    let mut zip = zip::ZipArchive::new(file).map_err(|e| EngineError::IntegrityCheckFailed {
        path: archive.to_path_buf(),
        detail: e.to_string(),
    })?;
    for index in 0..zip.len() {
        let mut entry = zip
            .by_index(index)
            .map_err(|e| EngineError::IntegrityCheckFailed {
                path: archive.to_path_buf(),
                detail: e.to_string(),
            })?;
        io::copy(&mut entry, &mut io::sink()).map_err(|e| {
            EngineError::IntegrityCheckFailed {
                path: archive.to_path_buf(),
                detail: format!("{}: {}", entry.name(), e),
            }
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NullSink;
    use walkdir::WalkDir;

    fn buffered_engine(settings: ArchiveSettings) -> ArchiveEngine {
        ArchiveEngine::with_binary(settings, OperationControl::new(), None)
            .expect("engine construction failed")
    }

    fn make_leveled_tree(root: &Path) -> PathBuf {
        // root/Location A/2024-01-01/..., root/Location B (empty)
        let tree = root.join("Job 1234");
        let datetime = tree.join("Location A").join("2024-01-01 Export");
        fs::create_dir_all(&datetime).expect("create tree");
        fs::create_dir_all(tree.join("Location B")).expect("create empty location");
        fs::write(datetime.join("clip.bin"), vec![1u8; 2048]).expect("write clip");
        fs::write(tree.join("Location A").join("notes.txt"), b"notes").expect("write notes");
        tree
    }

    #[test]
    fn test_auto_without_binary_resolves_to_buffered() {
        let engine = buffered_engine(ArchiveSettings {
            method: ArchiveMethod::Auto,
            ..ArchiveSettings::default()
        });
        assert_eq!(engine.backend(), ArchiveBackend::Buffered);
        assert_eq!(engine.backend().as_str(), "buffered");
    }

    #[test]
    fn test_native_without_binary_is_refused() {
        let result = ArchiveEngine::with_binary(
            ArchiveSettings {
                method: ArchiveMethod::Native,
                ..ArchiveSettings::default()
            },
            OperationControl::new(),
            None,
        );
        assert!(matches!(
            result,
            Err(EngineError::CompressorUnavailable { .. })
        ));
    }

    #[test]
    fn test_round_trip_lists_every_original_file() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let tree = make_leveled_tree(temp_dir.path());
        let output = temp_dir.path().join("out.zip");

        let engine = buffered_engine(ArchiveSettings::default());
        engine
            .create_archive(&tree, &output, &NullSink)
            .expect("archive failed");

        let mut entries = list_entries(&output).expect("list failed");
        entries.sort();

        let mut walked: Vec<String> = WalkDir::new(&tree)
            .into_iter()
            .flatten()
            .filter(|e| e.file_type().is_file())
            .map(|e| {
                e.path()
                    .strip_prefix(tree.parent().unwrap())
                    .unwrap()
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/")
            })
            .collect();
        walked.sort();

        assert_eq!(entries, walked);
        engine.verify_archive(&output).expect("verify failed");
    }

    #[test]
    fn test_root_level_archive_naming() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let tree = make_leveled_tree(temp_dir.path());

        let engine = buffered_engine(ArchiveSettings::default());
        let result = engine.create_archives(&tree, &NullSink).expect("run failed");

        assert_eq!(result.created_archives.len(), 1);
        assert_eq!(
            result.created_archives[0]
                .file_name()
                .unwrap()
                .to_string_lossy(),
            "Job_1234_complete.zip"
        );
    }

    #[test]
    fn test_location_level_skips_empty_folder() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let tree = make_leveled_tree(temp_dir.path());

        let engine = buffered_engine(ArchiveSettings {
            create_at_root: false,
            create_at_location: true,
            ..ArchiveSettings::default()
        });
        let result = engine.create_archives(&tree, &NullSink).expect("run failed");

        // Only the non-empty location produced an archive
        assert_eq!(result.created_archives.len(), 1);
        assert_eq!(
            result.created_archives[0]
                .file_name()
                .unwrap()
                .to_string_lossy(),
            "Location_A_location.zip"
        );
        assert!(result
            .warnings
            .iter()
            .any(|w| w.contains("Location B")));
    }

    #[test]
    fn test_datetime_level_archives_second_level_folders() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let tree = make_leveled_tree(temp_dir.path());

        let engine = buffered_engine(ArchiveSettings {
            create_at_root: false,
            create_at_datetime: true,
            ..ArchiveSettings::default()
        });
        let result = engine.create_archives(&tree, &NullSink).expect("run failed");

        assert_eq!(result.created_archives.len(), 1);
        assert_eq!(
            result.created_archives[0]
                .file_name()
                .unwrap()
                .to_string_lossy(),
            "2024-01-01_Export_datetime.zip"
        );
    }

    #[test]
    fn test_multiple_levels_combine() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let tree = make_leveled_tree(temp_dir.path());

        let engine = buffered_engine(ArchiveSettings {
            create_at_root: true,
            create_at_location: true,
            create_at_datetime: true,
            ..ArchiveSettings::default()
        });
        let result = engine.create_archives(&tree, &NullSink).expect("run failed");

        // Root + Location A + the datetime folder; Location B stays a warning
        assert_eq!(result.created_archives.len(), 3);
        assert!(result.stats.bytes_processed > 0);
    }

    #[test]
    fn test_all_attempts_failing_is_an_error() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let tree = temp_dir.path().join("empty root");
        fs::create_dir(&tree).expect("create root");

        let engine = buffered_engine(ArchiveSettings::default());
        let result = engine.create_archives(&tree, &NullSink);
        assert!(result.is_err());
    }

    #[test]
    fn test_output_dir_override() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let tree = make_leveled_tree(temp_dir.path());
        let out_dir = temp_dir.path().join("archives");
        fs::create_dir(&out_dir).expect("create out dir");

        let engine = buffered_engine(ArchiveSettings {
            output_dir: Some(out_dir.clone()),
            ..ArchiveSettings::default()
        });
        let result = engine.create_archives(&tree, &NullSink).expect("run failed");
        assert!(result.created_archives[0].starts_with(&out_dir));
    }
}
