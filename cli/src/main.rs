//! Custodian - Command-line interface for the evidence transfer engine.
//!
//! Provides argument parsing and progress reporting to stderr for the
//! copy-verify and archive engines.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use engine::{
    list_entries, ArchiveEngine, ArchiveMethod, ArchiveSettings, CompressionMode, CopyOutcome,
    CopySettings, CopyVerifyEngine, HashAlgorithm, OperationControl, OperationState, Progress,
    ProgressSink, SourceItem, SpawnOptions, WorkerCoordinator,
};

/// Custodian - copy, verify, and archive evidence file sets
#[derive(Parser, Debug)]
#[command(name = "custodian")]
#[command(version = "0.1.0")]
#[command(about = "Copy file sets with hash verification and pack them into ZIP archives")]
struct Cli {
    /// Enable verbose output
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Copy files and folders with hash verification
    Copy {
        /// Source files or folders
        #[arg(required = true, value_name = "PATH")]
        sources: Vec<PathBuf>,

        /// Destination directory
        #[arg(long, value_name = "PATH")]
        dest: PathBuf,

        /// Hash algorithm: md5, sha256, or blake3
        #[arg(long, value_name = "ALGORITHM", default_value = "sha256")]
        hash: String,

        /// Skip hash computation and verification
        #[arg(long)]
        no_hash: bool,

        /// Copy all files into the destination root, ignoring structure
        #[arg(long)]
        flatten: bool,

        /// Write a CSV report to this path
        #[arg(long, value_name = "PATH")]
        csv: Option<PathBuf>,
    },

    /// Create ZIP archives from a folder tree
    Archive {
        /// Tree to archive
        #[arg(value_name = "PATH")]
        source: PathBuf,

        /// Directory for the produced archives (default: each folder's parent)
        #[arg(long, value_name = "PATH")]
        output: Option<PathBuf>,

        /// Archive method: native, buffered, or auto
        #[arg(long, value_name = "METHOD", default_value = "auto")]
        method: String,

        /// Compression: store, fast, normal, or max
        #[arg(long, value_name = "MODE", default_value = "store")]
        compression: String,

        /// Folder level(s) to archive: root, location, datetime
        #[arg(long, value_name = "LEVEL", default_values_t = vec!["root".to_string()])]
        level: Vec<String>,
    },

    /// Check an archive and list its entries
    Verify {
        /// Archive to inspect
        #[arg(value_name = "PATH")]
        archive: PathBuf,

        /// Print every entry name
        #[arg(long)]
        list: bool,
    },
}

/// Stderr progress reporter shared by both engines.
struct CliProgress {
    verbose: bool,
    start_time: Instant,
    last_update_ms: AtomicU64,
}

impl CliProgress {
    fn new(verbose: bool) -> Self {
        CliProgress {
            verbose,
            start_time: Instant::now(),
            last_update_ms: AtomicU64::new(0),
        }
    }

    fn format_bytes(bytes: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = bytes as f64;
        let mut unit_idx = 0;

        while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
            size /= 1024.0;
            unit_idx += 1;
        }

        format!("{:.2} {}", size, UNITS[unit_idx])
    }

    fn format_duration(elapsed: std::time::Duration) -> String {
        let secs = elapsed.as_secs();
        let hours = secs / 3600;
        let mins = (secs % 3600) / 60;
        let secs = secs % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, mins, secs)
        } else if mins > 0 {
            format!("{}m {}s", mins, secs)
        } else {
            format!("{}s", secs)
        }
    }

    fn print_progress_bar(percent: u8) -> String {
        let filled = (percent / 5) as usize;
        let empty = 20 - filled;
        format!("[{}{}] {}%", "=".repeat(filled), " ".repeat(empty), percent)
    }
}

impl ProgressSink for CliProgress {
    fn on_progress(&self, progress: Progress, message: &str) {
        // Throttle updates to avoid spam (max once per 200ms), but always
        // let completion through
        let elapsed_ms = self.start_time.elapsed().as_millis() as u64;
        let last = self.last_update_ms.load(Ordering::Relaxed);
        let is_final = matches!(progress, Progress::Percent(100));
        if !is_final && !self.verbose && elapsed_ms.saturating_sub(last) < 200 {
            return;
        }
        self.last_update_ms.store(elapsed_ms, Ordering::Relaxed);

        match progress {
            Progress::Percent(percent) => {
                eprint!(
                    "\rProgress: {} | {}",
                    Self::print_progress_bar(percent),
                    message
                );
                if is_final {
                    eprintln!();
                }
            }
            Progress::Indeterminate => {
                if self.verbose {
                    eprintln!("{}", message);
                }
            }
        }
        let _ = std::io::Write::flush(&mut std::io::stderr());
    }
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let exit_code = match run_cli(cli) {
        Ok(clean) => {
            if clean {
                0
            } else {
                1
            }
        }
        Err(msg) => {
            eprintln!("Error: {}", msg);
            2
        }
    };

    std::process::exit(exit_code);
}

/// Main CLI logic - separated for testability. Returns whether the run was
/// free of failures and mismatches.
fn run_cli(cli: Cli) -> Result<bool, String> {
    match cli.command {
        Commands::Copy {
            sources,
            dest,
            hash,
            no_hash,
            flatten,
            csv,
        } => {
            let algorithm = HashAlgorithm::from_str(&hash).ok_or_else(|| {
                format!(
                    "Invalid hash algorithm '{}'. Must be 'md5', 'sha256', or 'blake3'",
                    hash
                )
            })?;

            let settings = CopySettings {
                algorithm,
                preserve_structure: !flatten,
                calculate_hash: !no_hash,
                csv_report: csv,
            };
            run_copy(sources, dest, settings, cli.verbose)
        }

        Commands::Archive {
            source,
            output,
            method,
            compression,
            level,
        } => {
            let method = ArchiveMethod::from_str(&method).ok_or_else(|| {
                format!(
                    "Invalid method '{}'. Must be 'native', 'buffered', or 'auto'",
                    method
                )
            })?;
            let compression = CompressionMode::from_str(&compression).ok_or_else(|| {
                format!(
                    "Invalid compression '{}'. Must be 'store', 'fast', 'normal', or 'max'",
                    compression
                )
            })?;

            let mut settings = ArchiveSettings {
                method,
                compression,
                output_dir: output,
                create_at_root: false,
                create_at_location: false,
                create_at_datetime: false,
            };
            for name in &level {
                match name.to_lowercase().as_str() {
                    "root" => settings.create_at_root = true,
                    "location" => settings.create_at_location = true,
                    "datetime" => settings.create_at_datetime = true,
                    other => {
                        return Err(format!(
                            "Invalid level '{}'. Must be 'root', 'location', or 'datetime'",
                            other
                        ))
                    }
                }
            }
            run_archive(source, settings, cli.verbose)
        }

        Commands::Verify { archive, list } => run_verify(archive, list),
    }
}

fn run_copy(
    sources: Vec<PathBuf>,
    dest: PathBuf,
    settings: CopySettings,
    verbose: bool,
) -> Result<bool, String> {
    eprintln!("Preparing copy...");
    for source in &sources {
        eprintln!("  Source: {}", source.display());
    }
    eprintln!("  Destination: {}", dest.display());
    eprintln!(
        "  Hashing: {}",
        if settings.calculate_hash {
            settings.algorithm.to_string()
        } else {
            "disabled".to_string()
        }
    );
    eprintln!();

    let items = sources.into_iter().map(SourceItem::new).collect();
    let control = OperationControl::new();
    let mut engine = CopyVerifyEngine::new(items, dest, settings.clone(), control.clone());
    let sink = Arc::new(CliProgress::new(verbose));

    let coordinator = WorkerCoordinator::new();
    let worker_sink = sink.clone();
    let (_id, rx) = coordinator.spawn("copy_verify", control, SpawnOptions::default(), move || {
        engine.run(&*worker_sink)
    });

    let outcome = rx
        .recv()
        .map_err(|_| "Copy worker terminated unexpectedly".to_string())?
        .map_err(|e| format!("{} ({})", e.user_message(), e))?;

    print_copy_summary(&outcome, &settings);
    Ok(outcome.state == OperationState::Completed
        && outcome.failed.is_empty()
        && outcome.mismatched.is_empty())
}

fn print_copy_summary(outcome: &CopyOutcome, settings: &CopySettings) {
    eprintln!();
    eprintln!("Copy complete!");

    let done = outcome.successes().count();
    eprintln!(
        "Summary: {} done, {} failed ({:?})",
        done,
        outcome.failed.len(),
        outcome.state
    );
    if settings.calculate_hash {
        eprintln!(
            "Verification: {} OK, {} mismatch",
            done - outcome.mismatched.len(),
            outcome.mismatched.len()
        );
    }
    eprintln!(
        "Bytes copied: {}",
        CliProgress::format_bytes(outcome.metrics.bytes_processed)
    );
    eprintln!(
        "Elapsed: {} ({:.1} MB/s avg, {:.1} MB/s peak)",
        CliProgress::format_duration(outcome.metrics.duration),
        outcome.metrics.average_speed_mbps,
        outcome.metrics.peak_speed_mbps
    );

    if !outcome.failed.is_empty() {
        eprintln!();
        eprintln!("Failed files:");
        for key in &outcome.failed {
            if let Some(result) = outcome.result_for(key) {
                eprintln!(
                    "  {}: {}",
                    result.source_path.display(),
                    result.error.as_deref().unwrap_or("(unknown error)")
                );
            }
        }
    }

    if !outcome.mismatched.is_empty() {
        eprintln!();
        eprintln!("Verification mismatches:");
        for key in &outcome.mismatched {
            if let Some(result) = outcome.result_for(key) {
                eprintln!(
                    "  {}: source and destination digests differ",
                    result.source_path.display()
                );
            }
        }
    }

    for warning in &outcome.warnings {
        eprintln!("Warning: {}", warning);
    }
}

fn run_archive(
    source: PathBuf,
    settings: ArchiveSettings,
    verbose: bool,
) -> Result<bool, String> {
    let control = OperationControl::new();
    let engine = ArchiveEngine::new(settings, control.clone())
        .map_err(|e| format!("{} ({})", e.user_message(), e))?;
    eprintln!("Archiving with the {} backend...", engine.backend());

    let sink = Arc::new(CliProgress::new(verbose));
    let coordinator = WorkerCoordinator::new();
    let worker_sink = sink.clone();
    let (_id, rx) = coordinator.spawn("archive", control, SpawnOptions::default(), move || {
        let result = engine.create_archives(&source, &*worker_sink);
        (engine, result)
    });

    let (engine, result) = rx
        .recv()
        .map_err(|_| "Archive worker terminated unexpectedly".to_string())?;
    let result = result.map_err(|e| format!("{} ({})", e.user_message(), e))?;

    eprintln!();
    eprintln!("Archives created:");
    for path in &result.created_archives {
        eprintln!("  {}", path.display());
    }
    eprintln!(
        "Backend: {} | Compression: {} | {} files, {} in, {} on disk",
        result.stats.backend,
        result.compression,
        result.stats.files_processed,
        CliProgress::format_bytes(result.stats.bytes_processed),
        CliProgress::format_bytes(result.stats.archive_size)
    );
    eprintln!(
        "Elapsed: {} ({:.1} MB/s)",
        CliProgress::format_duration(result.stats.execution_time),
        result.stats.average_speed_mbps
    );
    for warning in &result.warnings {
        eprintln!("Warning: {}", warning);
    }

    // Spot-check what was just written
    for path in &result.created_archives {
        engine
            .verify_archive(path)
            .map_err(|e| format!("{} ({})", e.user_message(), e))?;
    }

    Ok(result.warnings.is_empty())
}

fn run_verify(archive: PathBuf, list: bool) -> Result<bool, String> {
    let entries = list_entries(&archive).map_err(|e| format!("{} ({})", e.user_message(), e))?;
    eprintln!("{}: {} entries", archive.display(), entries.len());
    if list {
        for entry in &entries {
            println!("{}", entry);
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(CliProgress::format_bytes(0), "0.00 B");
        assert_eq!(CliProgress::format_bytes(1536), "1.50 KB");
        assert_eq!(CliProgress::format_bytes(10 * 1024 * 1024), "10.00 MB");
    }

    #[test]
    fn test_format_duration() {
        use std::time::Duration;
        assert_eq!(CliProgress::format_duration(Duration::from_secs(5)), "5s");
        assert_eq!(CliProgress::format_duration(Duration::from_secs(65)), "1m 5s");
        assert_eq!(
            CliProgress::format_duration(Duration::from_secs(3700)),
            "1h 1m 40s"
        );
    }

    #[test]
    fn test_progress_bar_shape() {
        assert_eq!(CliProgress::print_progress_bar(0), format!("[{}] 0%", " ".repeat(20)));
        assert_eq!(
            CliProgress::print_progress_bar(100),
            format!("[{}] 100%", "=".repeat(20))
        );
    }

    #[test]
    fn test_copy_roundtrip_through_cli() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("case");
        std::fs::create_dir(&src).expect("create src");
        std::fs::write(src.join("a.bin"), b"payload").expect("write file");
        let dest = temp_dir.path().join("dest");

        let clean = run_copy(
            vec![src],
            dest.clone(),
            CopySettings::default(),
            false,
        )
        .expect("copy failed");
        assert!(clean);
        assert!(dest.join("case").join("a.bin").exists());
    }

    #[test]
    fn test_archive_roundtrip_through_cli() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("case");
        std::fs::create_dir(&src).expect("create src");
        std::fs::write(src.join("a.bin"), b"payload").expect("write file");
        let out_dir = temp_dir.path().join("archives");
        std::fs::create_dir(&out_dir).expect("create out dir");

        let settings = ArchiveSettings {
            method: ArchiveMethod::Buffered,
            output_dir: Some(out_dir.clone()),
            ..ArchiveSettings::default()
        };
        let clean = run_archive(src, settings, false).expect("archive failed");
        assert!(clean);
        assert!(out_dir.join("case_complete.zip").exists());
    }
}
