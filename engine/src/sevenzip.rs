//! External compressor supervision.
//!
//! Launches a 7-Zip-compatible binary as a child process, scrapes its textual
//! progress output into normalized progress updates, enforces cancellation
//! and timeouts, and classifies exit codes. Binary availability (existence,
//! executability, version banner) is a precondition checked separately from
//! any compression run.

use std::fs;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::EngineError;
use crate::model::{
    ArchiveBackend, ArchiveOperationResult, ArchiveRunStats, CompressionMode,
};
use crate::progress::{OperationControl, Progress, ProgressSink};
use crate::tuning::CommandBuilder;

/// Poll cadence for the child process and its output stream.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How long a cancelled child gets to exit before it is force-killed.
const TERMINATION_GRACE: Duration = Duration::from_secs(2);

/// Timeout for the version probe, independent of the execution timeout.
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default bound on one compression run.
const DEFAULT_RUN_TIMEOUT: Duration = Duration::from_secs(3600);

/// Status lines forwarded to the sink are clipped to this length.
const STATUS_LINE_LIMIT: usize = 80;

#[cfg(windows)]
const BINARY_CANDIDATES: &[&str] = &["7za.exe", "7z.exe", "7zz.exe"];
#[cfg(not(windows))]
const BINARY_CANDIDATES: &[&str] = &["7za", "7z", "7zz"];

/// Environment variable overriding binary discovery.
pub const BINARY_ENV_VAR: &str = "CUSTODIAN_7Z";

/// Map known compressor exit codes to a human-readable cause.
pub fn describe_exit_code(code: i32) -> &'static str {
    match code {
        0 => "Success",
        1 => "Warning (non-fatal errors)",
        2 => "Fatal error",
        7 => "Command line error",
        8 => "Not enough memory for operation",
        255 => "User stopped the process",
        _ => "Unknown error",
    }
}

/// Classification of one line of compressor output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineClass {
    /// A numeric percentage token was present
    Percent(u8),
    /// A recognized in-progress keyword without a position
    Working,
    /// Anything else worth forwarding, already truncated
    Status(String),
    /// The startup banner or noise, suppressed
    Ignored,
}

/// Classify a compressor output line for progress reporting.
pub fn classify_line(line: &str) -> LineClass {
    let line = line.trim();
    if line.len() <= 5 || line.starts_with("7-Zip") {
        return LineClass::Ignored;
    }

    if let Some(percent) = find_percent_token(line) {
        return LineClass::Percent(percent);
    }

    let lower = line.to_lowercase();
    if ["compressing", "adding", "processing"]
        .iter()
        .any(|kw| lower.contains(kw))
    {
        return LineClass::Working;
    }

    LineClass::Status(line.chars().take(STATUS_LINE_LIMIT).collect())
}

fn find_percent_token(line: &str) -> Option<u8> {
    let idx = line.find('%')?;
    let digits: Vec<char> = line[..idx]
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    if digits.is_empty() {
        return None;
    }
    let value: u32 = digits.iter().rev().collect::<String>().parse().ok()?;
    Some(value.min(100) as u8)
}

/// A located and validated compressor binary.
#[derive(Debug, Clone)]
pub struct SevenZipBinary {
    path: PathBuf,
    version: String,
}

impl SevenZipBinary {
    /// Search for a candidate binary: the override variable first, then the
    /// PATH, then the bundled `bin/` directory.
    pub fn locate() -> Option<PathBuf> {
        if let Some(value) = std::env::var_os(BINARY_ENV_VAR) {
            let path = PathBuf::from(value);
            if path.is_file() {
                return Some(path);
            }
        }

        if let Some(paths) = std::env::var_os("PATH") {
            for dir in std::env::split_paths(&paths) {
                for name in BINARY_CANDIDATES {
                    let candidate = dir.join(name);
                    if candidate.is_file() {
                        return Some(candidate);
                    }
                }
            }
        }

        for name in BINARY_CANDIDATES {
            let bundled = Path::new("bin").join(name);
            if bundled.is_file() {
                return Some(bundled);
            }
        }
        None
    }

    /// Validate a candidate: it must exist, be executable, and print the
    /// expected banner when queried for its version.
    pub fn probe(path: &Path) -> Result<Self, EngineError> {
        if !path.is_file() {
            return Err(EngineError::CompressorUnavailable {
                reason: format!("binary not found at {}", path.display()),
            });
        }
        if !is_executable(path) {
            return Err(EngineError::CompressorUnavailable {
                reason: format!("{} is not executable", path.display()),
            });
        }

        // Running with no arguments prints the version banner
        let mut command = Command::new(path);
        let captured = run_captured(&mut command, PROBE_TIMEOUT).map_err(|e| {
            EngineError::CompressorUnavailable {
                reason: format!("version probe failed: {}", e),
            }
        })?;

        let banner_line = captured
            .stdout
            .lines()
            .find(|l| l.contains("7-Zip"))
            .map(|l| l.trim().to_string());
        match banner_line {
            Some(version) => {
                info!("Validated compressor at {}: {}", path.display(), version);
                Ok(SevenZipBinary {
                    path: path.to_path_buf(),
                    version,
                })
            }
            None => Err(EngineError::CompressorUnavailable {
                reason: format!("{} did not identify itself as 7-Zip", path.display()),
            }),
        }
    }

    /// Locate and validate in one step.
    pub fn discover() -> Result<Self, EngineError> {
        let path = Self::locate().ok_or_else(|| EngineError::CompressorUnavailable {
            reason: "no 7-Zip binary found on this system".to_string(),
        })?;
        Self::probe(&path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn version(&self) -> &str {
        &self.version
    }
}

/// Supervises one external compression run at a time.
pub struct SevenZipProcess {
    binary: SevenZipBinary,
    builder: CommandBuilder,
    control: OperationControl,
    timeout: Duration,
}

impl SevenZipProcess {
    pub fn new(binary: SevenZipBinary, control: OperationControl) -> Self {
        SevenZipProcess {
            binary,
            builder: CommandBuilder::new(),
            control,
            timeout: DEFAULT_RUN_TIMEOUT,
        }
    }

    pub fn with_builder(mut self, builder: CommandBuilder) -> Self {
        self.builder = builder;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Create `output` from `source` and report normalized progress.
    ///
    /// The archive size is read from the filesystem afterwards (the tool does
    /// not reliably report it) and throughput is computed from the bytes
    /// submitted for compression, not the compressed size.
    pub fn create_archive(
        &self,
        source: &Path,
        output: &Path,
        mode: CompressionMode,
        sink: &dyn ProgressSink,
    ) -> Result<ArchiveOperationResult, EngineError> {
        let (file_count, total_bytes) = source_metrics(source);
        if file_count == 0 {
            return Err(EngineError::NoFilesToCompress {
                path: source.to_path_buf(),
            });
        }

        let args = self.builder.archive_args(source, output, mode);
        let cwd = source.parent().unwrap_or_else(|| Path::new("."));

        sink.on_progress(
            Progress::percent(0),
            &format!(
                "Starting archive: {}",
                output.file_name().unwrap_or_default().to_string_lossy()
            ),
        );

        let started = Instant::now();
        let exit = self.run_supervised(&args, cwd, sink)?;
        let execution_time = started.elapsed();

        if exit.code != 0 {
            let detail = exit_detail(exit.code, &exit.stderr);
            warn!("Compressor run failed: {}", detail);
            return Err(EngineError::CompressorFailed {
                exit_code: exit.code,
                detail,
            });
        }

        let archive_size = fs::metadata(output).map(|m| m.len()).unwrap_or(0);
        let mut stats = ArchiveRunStats::new(ArchiveBackend::Native);
        stats.execution_time = execution_time;
        stats.files_processed = file_count;
        stats.bytes_processed = total_bytes;
        stats.archive_size = archive_size;
        stats.exit_code = Some(exit.code);
        stats.finalize_speed();

        info!(
            "Native archive complete: {} ({} files, {:.1} MB/s)",
            output.display(),
            file_count,
            stats.average_speed_mbps
        );
        sink.on_progress(
            Progress::percent(100),
            &format!(
                "Archive complete: {} ({:.1} MB/s)",
                output.file_name().unwrap_or_default().to_string_lossy(),
                stats.average_speed_mbps
            ),
        );

        Ok(ArchiveOperationResult {
            created_archives: vec![output.to_path_buf()],
            compression: mode,
            stats,
            warnings: Vec::new(),
        })
    }

    /// Verify archive integrity with the tool's `t` command.
    pub fn test_archive(&self, archive: &Path) -> Result<(), EngineError> {
        let args = self.builder.test_args(archive);
        let mut command = Command::new(self.binary.path());
        command.args(&args);
        let captured =
            run_captured(&mut command, self.timeout).map_err(|e| EngineError::SpawnFailed {
                source: std::io::Error::new(std::io::ErrorKind::Other, e),
            })?;

        if captured.code == 0 {
            Ok(())
        } else {
            Err(EngineError::IntegrityCheckFailed {
                path: archive.to_path_buf(),
                detail: exit_detail(captured.code, &captured.stderr),
            })
        }
    }

    /// Enumerate archive entries with the tool's technical listing.
    pub fn list_archive(&self, archive: &Path) -> Result<Vec<String>, EngineError> {
        let args = self.builder.list_args(archive);
        let mut command = Command::new(self.binary.path());
        command.args(&args);
        let captured =
            run_captured(&mut command, self.timeout).map_err(|e| EngineError::SpawnFailed {
                source: std::io::Error::new(std::io::ErrorKind::Other, e),
            })?;

        if captured.code != 0 {
            return Err(EngineError::CompressorFailed {
                exit_code: captured.code,
                detail: exit_detail(captured.code, &captured.stderr),
            });
        }
        Ok(parse_slt_listing(&captured.stdout))
    }

    fn run_supervised(
        &self,
        args: &[String],
        cwd: &Path,
        sink: &dyn ProgressSink,
    ) -> Result<SupervisedExit, EngineError> {
        let mut child = Command::new(self.binary.path())
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| EngineError::SpawnFailed { source: e })?;

        self.control.attach_child(child.id());

        // Drain stdout on its own thread: progress lines arrive while the
        // supervisor below only polls liveness and flags.
        let stdout = child.stdout.take();
        let (line_tx, line_rx) = mpsc::channel::<String>();
        let monitor = stdout.map(|out| {
            thread::spawn(move || {
                for line in BufReader::new(out).lines().map_while(Result::ok) {
                    if line_tx.send(line).is_err() {
                        break;
                    }
                }
            })
        });

        let stderr = child.stderr.take();
        let stderr_thread = stderr.map(|mut err| {
            thread::spawn(move || {
                let mut buf = String::new();
                let _ = err.read_to_string(&mut buf);
                buf
            })
        });

        let deadline = Instant::now() + self.timeout;
        let outcome = loop {
            // Forward whatever the monitor has read so far
            while let Ok(line) = line_rx.try_recv() {
                forward_line(sink, &line);
            }

            match child.try_wait() {
                Ok(Some(status)) => break Ok(status.code().unwrap_or(-1)),
                Ok(None) => {
                    if self.control.is_cancelled() {
                        terminate_child(&mut child);
                        break Err(EngineError::Cancelled);
                    }
                    if Instant::now() >= deadline {
                        let _ = child.kill();
                        let _ = child.wait();
                        break Err(EngineError::ProcessTimeout {
                            seconds: self.timeout.as_secs(),
                        });
                    }
                    thread::sleep(POLL_INTERVAL);
                }
                Err(e) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    break Err(EngineError::SpawnFailed { source: e });
                }
            }
        };

        self.control.detach_child();
        if let Some(handle) = monitor {
            let _ = handle.join();
        }
        // Forward lines that arrived between the last poll and process exit
        while let Ok(line) = line_rx.try_recv() {
            forward_line(sink, &line);
        }
        let stderr_text = stderr_thread
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();

        // Cancellation may have terminated the child before the poll loop
        // observed the flag; a cancelled run is never reported as a failure
        if self.control.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let code = outcome?;
        debug!("Compressor exited with code {}", code);
        Ok(SupervisedExit {
            code,
            stderr: stderr_text,
        })
    }
}

struct SupervisedExit {
    code: i32,
    stderr: String,
}

fn forward_line(sink: &dyn ProgressSink, line: &str) {
    match classify_line(line) {
        LineClass::Percent(p) => {
            sink.on_progress(Progress::Percent(p), &format!("7z: {}", line.trim()))
        }
        LineClass::Working => {
            sink.on_progress(Progress::Indeterminate, &format!("7z: {}", line.trim()))
        }
        LineClass::Status(status) => sink.on_progress(Progress::Indeterminate, &status),
        LineClass::Ignored => {}
    }
}

/// Append non-empty, non-banner stderr text to the exit-code cause.
fn exit_detail(code: i32, stderr: &str) -> String {
    let base = describe_exit_code(code);
    let clean = stderr.trim();
    if clean.is_empty() || clean.starts_with("7-Zip") {
        base.to_string()
    } else {
        format!("{}: {}", base, clean)
    }
}

/// Count files and bytes below a source path.
fn source_metrics(source: &Path) -> (u64, u64) {
    if source.is_file() {
        let size = fs::metadata(source).map(|m| m.len()).unwrap_or(0);
        return (1, size);
    }
    let mut files = 0u64;
    let mut bytes = 0u64;
    for entry in WalkDir::new(source).into_iter().flatten() {
        if entry.file_type().is_file() {
            files += 1;
            bytes += entry.metadata().map(|m| m.len()).unwrap_or(0);
        }
    }
    (files, bytes)
}

/// Pull `Path = ` entries out of a `-slt` technical listing. Lines before the
/// entry separator describe the archive itself and are skipped.
fn parse_slt_listing(stdout: &str) -> Vec<String> {
    let mut entries = Vec::new();
    let mut in_entries = false;
    for line in stdout.lines() {
        let line = line.trim();
        if line.starts_with("----------") {
            in_entries = true;
            continue;
        }
        if in_entries {
            if let Some(path) = line.strip_prefix("Path = ") {
                entries.push(path.to_string());
            }
        }
    }
    entries
}

fn terminate_child(child: &mut Child) {
    request_graceful_exit(child);
    let grace_deadline = Instant::now() + TERMINATION_GRACE;
    while Instant::now() < grace_deadline {
        if let Ok(Some(_)) = child.try_wait() {
            return;
        }
        thread::sleep(Duration::from_millis(50));
    }
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(unix)]
fn request_graceful_exit(child: &Child) {
    unsafe {
        libc::kill(child.id() as libc::pid_t, libc::SIGTERM);
    }
}

#[cfg(not(unix))]
fn request_graceful_exit(_child: &Child) {
    // No graceful signal; the caller force-kills after the grace period.
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path)
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

struct CapturedRun {
    code: i32,
    stdout: String,
    stderr: String,
}

/// Run a short-lived command to completion with output capture and a hard
/// timeout. Used for the version probe and listing commands.
fn run_captured(command: &mut Command, timeout: Duration) -> Result<CapturedRun, String> {
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| e.to_string())?;

    let stdout_thread = child.stdout.take().map(|mut out| {
        thread::spawn(move || {
            let mut buf = String::new();
            let _ = out.read_to_string(&mut buf);
            buf
        })
    });
    let stderr_thread = child.stderr.take().map(|mut err| {
        thread::spawn(move || {
            let mut buf = String::new();
            let _ = err.read_to_string(&mut buf);
            buf
        })
    });

    let deadline = Instant::now() + timeout;
    let code = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status.code().unwrap_or(-1),
            Ok(None) => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(format!("timed out after {:?}", timeout));
                }
                thread::sleep(Duration::from_millis(25));
            }
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(e.to_string());
            }
        }
    };

    let stdout = stdout_thread
        .and_then(|h| h.join().ok())
        .unwrap_or_default();
    let stderr = stderr_thread
        .and_then(|h| h.join().ok())
        .unwrap_or_default();
    Ok(CapturedRun {
        code,
        stdout,
        stderr,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NullSink;

    #[test]
    fn test_exit_code_table() {
        assert_eq!(describe_exit_code(0), "Success");
        assert_eq!(describe_exit_code(1), "Warning (non-fatal errors)");
        assert_eq!(describe_exit_code(2), "Fatal error");
        assert_eq!(describe_exit_code(7), "Command line error");
        assert_eq!(describe_exit_code(8), "Not enough memory for operation");
        assert_eq!(describe_exit_code(255), "User stopped the process");
        assert_eq!(describe_exit_code(42), "Unknown error");
    }

    #[test]
    fn test_classify_percent_lines() {
        assert_eq!(classify_line(" 35% 12 + file.bin"), LineClass::Percent(35));
        assert_eq!(classify_line("100% done here"), LineClass::Percent(100));
        assert_eq!(classify_line("at 250% overdrive"), LineClass::Percent(100));
    }

    #[test]
    fn test_classify_keyword_lines() {
        assert_eq!(
            classify_line("Compressing  camera1/clip.mp4"),
            LineClass::Working
        );
        assert_eq!(classify_line("adding entry foo.bin"), LineClass::Working);
    }

    #[test]
    fn test_classify_banner_and_noise_suppressed() {
        assert_eq!(
            classify_line("7-Zip (a) 21.07 (x64) : Copyright (c) 1999-2021"),
            LineClass::Ignored
        );
        assert_eq!(classify_line("ok"), LineClass::Ignored);
        assert_eq!(classify_line(""), LineClass::Ignored);
    }

    #[test]
    fn test_classify_status_truncated() {
        let long_line = "x".repeat(200);
        match classify_line(&long_line) {
            LineClass::Status(status) => assert_eq!(status.len(), STATUS_LINE_LIMIT),
            other => panic!("expected status, got {:?}", other),
        }
    }

    #[test]
    fn test_exit_detail_appends_stderr() {
        assert_eq!(exit_detail(2, ""), "Fatal error");
        assert_eq!(
            exit_detail(2, "cannot open file"),
            "Fatal error: cannot open file"
        );
        assert_eq!(exit_detail(2, "7-Zip banner noise"), "Fatal error");
    }

    #[test]
    fn test_parse_slt_listing() {
        let listing = "\n7-Zip (a) 21.07\n\nPath = /tmp/out.zip\nType = zip\n\n----------\nPath = folder/a.bin\nSize = 10\n\nPath = folder/b.bin\nSize = 20\n";
        assert_eq!(
            parse_slt_listing(listing),
            vec!["folder/a.bin".to_string(), "folder/b.bin".to_string()]
        );
    }

    #[test]
    fn test_probe_missing_binary() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let result = SevenZipBinary::probe(&temp_dir.path().join("missing"));
        assert!(matches!(
            result,
            Err(EngineError::CompressorUnavailable { .. })
        ));
    }

    #[cfg(unix)]
    fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join(name);
        fs::write(&path, body).expect("write script");
        let mut perms = fs::metadata(&path).expect("script metadata").permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms).expect("chmod script");
        path
    }

    #[cfg(unix)]
    #[test]
    fn test_probe_accepts_banner_binary() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let script = write_script(
            temp_dir.path(),
            "fake7z",
            "#!/bin/sh\necho '7-Zip (a) 21.07 (x64)'\n",
        );
        let binary = SevenZipBinary::probe(&script).expect("probe failed");
        assert!(binary.version().contains("7-Zip"));
    }

    #[cfg(unix)]
    #[test]
    fn test_probe_rejects_wrong_banner() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let script = write_script(temp_dir.path(), "notzip", "#!/bin/sh\necho 'gzip 1.10'\n");
        assert!(matches!(
            SevenZipBinary::probe(&script),
            Err(EngineError::CompressorUnavailable { .. })
        ));
    }

    #[cfg(unix)]
    struct PercentFlagSink {
        saw_percent: std::sync::atomic::AtomicBool,
    }

    #[cfg(unix)]
    impl ProgressSink for PercentFlagSink {
        fn on_progress(&self, progress: Progress, _message: &str) {
            if matches!(progress, Progress::Percent(50)) {
                self.saw_percent
                    .store(true, std::sync::atomic::Ordering::SeqCst);
            }
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_create_archive_with_fake_compressor() {
        use std::sync::atomic::Ordering;

        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        // args: a -tzip -mx0 -mmtN -y -bb1 <output> <source-spec>
        let script = write_script(
            temp_dir.path(),
            "fake7z",
            "#!/bin/sh\necho '7-Zip (a) 21.07'\n[ $# -eq 0 ] && exit 0\necho ' 50% 1 + payload.bin'\necho 'Everything is Ok'\ntouch \"$7\"\nexit 0\n",
        );

        let source = temp_dir.path().join("payload");
        fs::create_dir(&source).expect("create source");
        fs::write(source.join("payload.bin"), vec![9u8; 2048]).expect("write payload");
        let output = temp_dir.path().join("out.zip");

        let binary = SevenZipBinary::probe(&script).expect("probe failed");
        let process = SevenZipProcess::new(binary, OperationControl::new());

        let sink = PercentFlagSink {
            saw_percent: std::sync::atomic::AtomicBool::new(false),
        };

        let result = process
            .create_archive(&source, &output, CompressionMode::Store, &sink)
            .expect("archive failed");

        assert_eq!(result.created_archives, vec![output.clone()]);
        assert_eq!(result.stats.backend, ArchiveBackend::Native);
        assert_eq!(result.stats.exit_code, Some(0));
        assert_eq!(result.stats.files_processed, 1);
        assert_eq!(result.stats.bytes_processed, 2048);
        assert!(sink.saw_percent.load(Ordering::SeqCst));
    }

    #[cfg(unix)]
    #[test]
    fn test_create_archive_nonzero_exit_is_classified() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let script = write_script(
            temp_dir.path(),
            "fake7z",
            "#!/bin/sh\necho '7-Zip (a) 21.07'\n[ $# -eq 0 ] && exit 0\necho 'disk full' >&2\nexit 2\n",
        );

        let source = temp_dir.path().join("payload");
        fs::create_dir(&source).expect("create source");
        fs::write(source.join("x.bin"), b"x").expect("write payload");

        let binary = SevenZipBinary::probe(&script).expect("probe failed");
        let process = SevenZipProcess::new(binary, OperationControl::new());
        let err = process
            .create_archive(
                &source,
                &temp_dir.path().join("out.zip"),
                CompressionMode::Store,
                &NullSink,
            )
            .expect_err("should fail");

        match err {
            EngineError::CompressorFailed { exit_code, detail } => {
                assert_eq!(exit_code, 2);
                assert!(detail.contains("Fatal error"));
                assert!(detail.contains("disk full"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_cancellation_terminates_child() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let script = write_script(
            temp_dir.path(),
            "fake7z",
            "#!/bin/sh\necho '7-Zip (a) 21.07'\n[ $# -eq 0 ] && exit 0\nsleep 30\nexit 0\n",
        );

        let source = temp_dir.path().join("payload");
        fs::create_dir(&source).expect("create source");
        fs::write(source.join("x.bin"), b"x").expect("write payload");

        let control = OperationControl::new();
        let binary = SevenZipBinary::probe(&script).expect("probe failed");
        let process = SevenZipProcess::new(binary, control.clone());

        let canceller = control.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(300));
            canceller.cancel();
        });

        let started = Instant::now();
        let err = process
            .create_archive(
                &source,
                &temp_dir.path().join("out.zip"),
                CompressionMode::Store,
                &NullSink,
            )
            .expect_err("should be cancelled");
        handle.join().expect("canceller panicked");

        assert!(err.is_cancelled());
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_kills_child() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let script = write_script(
            temp_dir.path(),
            "fake7z",
            "#!/bin/sh\necho '7-Zip (a) 21.07'\n[ $# -eq 0 ] && exit 0\nsleep 30\nexit 0\n",
        );

        let source = temp_dir.path().join("payload");
        fs::create_dir(&source).expect("create source");
        fs::write(source.join("x.bin"), b"x").expect("write payload");

        let binary = SevenZipBinary::probe(&script).expect("probe failed");
        let process = SevenZipProcess::new(binary, OperationControl::new())
            .with_timeout(Duration::from_millis(400));

        let err = process
            .create_archive(
                &source,
                &temp_dir.path().join("out.zip"),
                CompressionMode::Store,
                &NullSink,
            )
            .expect_err("should time out");
        assert!(matches!(err, EngineError::ProcessTimeout { .. }));
    }

    #[test]
    fn test_empty_source_refused_before_spawn() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let source = temp_dir.path().join("empty");
        fs::create_dir(&source).expect("create source");

        let binary = SevenZipBinary {
            path: temp_dir.path().join("unused"),
            version: "7-Zip test".into(),
        };
        let process = SevenZipProcess::new(binary, OperationControl::new());
        let err = process
            .create_archive(
                &source,
                &temp_dir.path().join("out.zip"),
                CompressionMode::Store,
                &NullSink,
            )
            .expect_err("should refuse empty source");
        assert!(matches!(err, EngineError::NoFilesToCompress { .. }));
    }
}
