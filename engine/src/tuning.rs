//! Host-derived tuning and external compressor command construction.
//!
//! Thread count and memory budget are pure functions of detected host
//! capability. Over-threading a store-mode archiver yields diminishing or
//! negative returns once it is I/O bound, so the thread curve flattens on
//! high core counts.

use std::path::{Path, PathBuf};

use log::debug;

use crate::model::CompressionMode;

/// Detected host capability used to derive compressor tuning.
#[derive(Debug, Clone, Copy)]
pub struct HostProfile {
    pub cpu_count: usize,
    pub total_memory_gb: f64,
}

impl HostProfile {
    /// Detect CPU core count and total system memory.
    pub fn detect() -> Self {
        let cpu_count = num_cpus::get().max(1);
        let mut sys = sysinfo::System::new();
        sys.refresh_memory();
        let total_memory_gb = sys.total_memory() as f64 / (1024.0 * 1024.0 * 1024.0);

        let profile = HostProfile {
            cpu_count,
            total_memory_gb,
        };
        debug!(
            "Host profile: {} cores, {:.1} GB memory, {} threads, {}% memory budget",
            profile.cpu_count,
            profile.total_memory_gb,
            profile.optimal_threads(),
            profile.memory_usage_percent()
        );
        profile
    }

    /// Thread count for the external compressor.
    ///
    /// Low-core hosts use every core, mid-range hosts get 2x cores, and very
    /// high core counts flatten to a fixed ceiling.
    pub fn optimal_threads(&self) -> usize {
        if self.cpu_count <= 2 {
            self.cpu_count
        } else if self.cpu_count <= 8 {
            (self.cpu_count * 2).min(16)
        } else if self.cpu_count <= 16 {
            self.cpu_count.min(24)
        } else {
            self.cpu_count.min(32)
        }
    }

    /// Memory budget percentage, in discrete bands by total system memory.
    pub fn memory_usage_percent(&self) -> u8 {
        if self.total_memory_gb >= 16.0 {
            70
        } else if self.total_memory_gb >= 8.0 {
            60
        } else {
            40
        }
    }
}

/// Builds argument vectors for the external 7-Zip-compatible compressor.
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    profile: HostProfile,
}

impl CommandBuilder {
    pub fn new() -> Self {
        CommandBuilder {
            profile: HostProfile::detect(),
        }
    }

    pub fn with_profile(profile: HostProfile) -> Self {
        CommandBuilder { profile }
    }

    pub fn threads(&self) -> usize {
        self.profile.optimal_threads()
    }

    pub fn profile(&self) -> HostProfile {
        self.profile
    }

    /// Arguments for an add-to-archive run.
    ///
    /// Forces a ZIP container regardless of the tool's native format, runs
    /// non-interactively, and requests the machine-parseable basic progress
    /// output mode. Directory sources are expanded with a recursive glob.
    pub fn archive_args(
        &self,
        source: &Path,
        output: &Path,
        mode: CompressionMode,
    ) -> Vec<String> {
        let level = match mode {
            CompressionMode::Store => "-mx0",
            CompressionMode::Fast => "-mx1",
            CompressionMode::Normal => "-mx5",
            CompressionMode::Max => "-mx9",
        };

        let source_spec: PathBuf = if source.is_dir() {
            source.join("*")
        } else {
            source.to_path_buf()
        };

        let args = vec![
            "a".to_string(),
            "-tzip".to_string(),
            level.to_string(),
            format!("-mmt{}", self.profile.optimal_threads()),
            "-y".to_string(),
            "-bb1".to_string(),
            output.display().to_string(),
            source_spec.display().to_string(),
        ];
        debug!("Built archive command: {}", args.join(" "));
        args
    }

    /// Arguments for an archive integrity test.
    pub fn test_args(&self, archive: &Path) -> Vec<String> {
        vec![
            "t".to_string(),
            "-bb1".to_string(),
            archive.display().to_string(),
        ]
    }

    /// Arguments for a technical entry listing.
    pub fn list_args(&self, archive: &Path) -> Vec<String> {
        vec![
            "l".to_string(),
            "-slt".to_string(),
            archive.display().to_string(),
        ]
    }
}

impl Default for CommandBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(cpu_count: usize, total_memory_gb: f64) -> HostProfile {
        HostProfile {
            cpu_count,
            total_memory_gb,
        }
    }

    #[test]
    fn test_thread_bands() {
        assert_eq!(profile(1, 8.0).optimal_threads(), 1);
        assert_eq!(profile(2, 8.0).optimal_threads(), 2);
        assert_eq!(profile(4, 8.0).optimal_threads(), 8);
        assert_eq!(profile(8, 8.0).optimal_threads(), 16);
        assert_eq!(profile(12, 8.0).optimal_threads(), 12);
        assert_eq!(profile(16, 8.0).optimal_threads(), 16);
        assert_eq!(profile(24, 8.0).optimal_threads(), 24);
        assert_eq!(profile(64, 8.0).optimal_threads(), 32);
    }

    #[test]
    fn test_memory_bands() {
        assert_eq!(profile(4, 32.0).memory_usage_percent(), 70);
        assert_eq!(profile(4, 16.0).memory_usage_percent(), 70);
        assert_eq!(profile(4, 8.0).memory_usage_percent(), 60);
        assert_eq!(profile(4, 4.0).memory_usage_percent(), 40);
    }

    #[test]
    fn test_archive_args_for_directory() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let source = temp_dir.path().join("footage");
        std::fs::create_dir(&source).expect("create source");
        let output = temp_dir.path().join("out.zip");

        let builder = CommandBuilder::with_profile(profile(4, 16.0));
        let args = builder.archive_args(&source, &output, CompressionMode::Store);

        assert_eq!(args[0], "a");
        assert_eq!(args[1], "-tzip");
        assert_eq!(args[2], "-mx0");
        assert_eq!(args[3], "-mmt8");
        assert!(args.contains(&"-y".to_string()));
        assert!(args.contains(&"-bb1".to_string()));
        assert_eq!(args[args.len() - 2], output.display().to_string());
        assert!(args.last().expect("source spec").ends_with("*"));
    }

    #[test]
    fn test_archive_args_for_single_file() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let source = temp_dir.path().join("clip.mp4");
        std::fs::write(&source, b"x").expect("create source");
        let output = temp_dir.path().join("out.zip");

        let builder = CommandBuilder::with_profile(profile(4, 16.0));
        let args = builder.archive_args(&source, &output, CompressionMode::Max);

        assert_eq!(args[2], "-mx9");
        assert_eq!(*args.last().expect("source spec"), source.display().to_string());
    }

    #[test]
    fn test_test_and_list_args() {
        let builder = CommandBuilder::with_profile(profile(4, 16.0));
        let archive = Path::new("/tmp/evidence.zip");

        let test = builder.test_args(archive);
        assert_eq!(test[0], "t");
        assert_eq!(test[1], "-bb1");

        let list = builder.list_args(archive);
        assert_eq!(list[0], "l");
        assert_eq!(list[1], "-slt");
    }
}
