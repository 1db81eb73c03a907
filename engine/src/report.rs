//! CSV report generation for copy-and-verify runs.
//!
//! The report carries comment header lines (title, timestamp, algorithm,
//! file count), one row per file, and a trailing summary comment with
//! success/failure/verified/mismatch counts.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::Local;

use crate::error::EngineError;
use crate::hashing::HashAlgorithm;
use crate::model::FileTransferResult;

const COLUMNS: &str = "Source Path,Destination Path,Size (bytes),Source Hash,Destination Hash,Match,Status,Error";

/// Write the per-file results to `path` in the report format.
pub fn write_csv_report(
    path: &Path,
    results: &[FileTransferResult],
    algorithm: HashAlgorithm,
    hashing_enabled: bool,
) -> Result<(), EngineError> {
    let file = File::create(path).map_err(|e| EngineError::ReportWriteFailed {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mut out = BufWriter::new(file);

    let write_err = |e: std::io::Error| EngineError::ReportWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    writeln!(out, "# Copy & Verify Report").map_err(write_err)?;
    writeln!(
        out,
        "# Generated: {}",
        Local::now().format("%Y-%m-%d %H:%M:%S")
    )
    .map_err(write_err)?;
    writeln!(out, "# Algorithm: {}", algorithm.to_string().to_uppercase()).map_err(write_err)?;
    writeln!(out, "# Total Files: {}", results.len()).map_err(write_err)?;
    writeln!(out).map_err(write_err)?;

    writeln!(out, "{}", COLUMNS).map_err(write_err)?;

    for result in results {
        let row = if result.success {
            let status = if result.verified { "Success" } else { "Hash Mismatch" };
            [
                csv_field(&result.source_path.display().to_string()),
                csv_field(&result.destination_path.display().to_string()),
                result.size.to_string(),
                csv_field(
                    result
                        .source_hash
                        .as_ref()
                        .map(|h| h.hex())
                        .unwrap_or("N/A"),
                ),
                csv_field(
                    result
                        .destination_hash
                        .as_ref()
                        .map(|h| h.hex())
                        .unwrap_or("N/A"),
                ),
                if result.verified { "Yes" } else { "No" }.to_string(),
                status.to_string(),
                String::new(),
            ]
        } else {
            [
                csv_field(&result.source_path.display().to_string()),
                csv_field(&result.destination_path.display().to_string()),
                "0".to_string(),
                String::new(),
                String::new(),
                String::new(),
                "Failed".to_string(),
                csv_field(result.error.as_deref().unwrap_or("Unknown error")),
            ]
        };
        writeln!(out, "{}", row.join(",")).map_err(write_err)?;
    }

    let successful = results.iter().filter(|r| r.success).count();
    let failed = results.len() - successful;

    writeln!(out).map_err(write_err)?;
    writeln!(out, "# Summary").map_err(write_err)?;
    if hashing_enabled {
        let verified = results.iter().filter(|r| r.success && r.verified).count();
        let mismatched = successful - verified;
        writeln!(
            out,
            "# Successful: {}, Failed: {}, Verified: {}, Mismatched: {}",
            successful, failed, verified, mismatched
        )
        .map_err(write_err)?;
    } else {
        writeln!(out, "# Successful: {}, Failed: {}", successful, failed).map_err(write_err)?;
    }

    out.flush().map_err(write_err)?;
    Ok(())
}

/// Quote a field per RFC 4180 when it contains a comma, quote, or newline.
fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::HashDigest;
    use std::path::PathBuf;
    use std::time::Duration;

    fn success_result(name: &str, size: u64, verified: bool) -> FileTransferResult {
        FileTransferResult {
            key: format!("deadbeef_{}", name),
            source_path: PathBuf::from("/src").join(name),
            destination_path: PathBuf::from("/dst").join(name),
            size,
            duration: Duration::from_millis(10),
            source_hash: Some(HashDigest::new(HashAlgorithm::Sha256, "aa".into())),
            destination_hash: Some(HashDigest::new(
                HashAlgorithm::Sha256,
                if verified { "aa" } else { "bb" }.into(),
            )),
            verified,
            success: true,
            error: None,
            error_code: None,
        }
    }

    fn failed_result(name: &str) -> FileTransferResult {
        FileTransferResult {
            key: format!("deadbeef_{}", name),
            source_path: PathBuf::from("/src").join(name),
            destination_path: PathBuf::from("/dst").join(name),
            size: 0,
            duration: Duration::ZERO,
            source_hash: None,
            destination_hash: None,
            verified: false,
            success: false,
            error: Some("Permission denied".into()),
            error_code: Some(13),
        }
    }

    #[test]
    fn test_report_structure() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("report.csv");
        let results = vec![
            success_result("a.bin", 100, true),
            success_result("b.bin", 200, false),
            failed_result("c.bin"),
        ];

        write_csv_report(&path, &results, HashAlgorithm::Sha256, true)
            .expect("report write failed");

        let content = std::fs::read_to_string(&path).expect("read report");
        assert!(content.starts_with("# Copy & Verify Report"));
        assert!(content.contains("# Algorithm: SHA256"));
        assert!(content.contains("# Total Files: 3"));
        assert!(content.contains(COLUMNS));
        assert!(content.contains("Hash Mismatch"));
        assert!(content.contains("Permission denied"));
        assert!(content.contains("# Successful: 2, Failed: 1, Verified: 1, Mismatched: 1"));
    }

    #[test]
    fn test_report_without_hashing_summary() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("report.csv");
        let results = vec![success_result("a.bin", 100, true)];

        write_csv_report(&path, &results, HashAlgorithm::Sha256, false)
            .expect("report write failed");

        let content = std::fs::read_to_string(&path).expect("read report");
        assert!(content.contains("# Successful: 1, Failed: 0\n"));
        assert!(!content.contains("Mismatched"));
    }

    #[test]
    fn test_report_fails_into_typed_error() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("no_such_dir").join("report.csv");
        let err = write_csv_report(&path, &[], HashAlgorithm::Sha256, true)
            .expect_err("should fail");
        assert!(matches!(err, EngineError::ReportWriteFailed { .. }));
    }

    #[test]
    fn test_csv_field_quoting() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }
}
