//! Content hashing for copy verification.
//!
//! This module provides:
//! - Multiple hash algorithms (MD5, SHA-256, BLAKE3)
//! - Streaming hashers fed block-by-block during copies
//! - Whole-file digest computation

use crate::error::EngineError;
use std::fmt;
use std::path::Path;

/// Supported hash algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum HashAlgorithm {
    /// MD5 (legacy, kept for compatibility with older evidence logs)
    Md5,
    /// SHA-256 (default for evidentiary reports)
    Sha256,
    /// BLAKE3 (modern, fast, 256-bit)
    Blake3,
}

impl Default for HashAlgorithm {
    fn default() -> Self {
        HashAlgorithm::Sha256
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Md5 => write!(f, "md5"),
            Self::Sha256 => write!(f, "sha256"),
            Self::Blake3 => write!(f, "blake3"),
        }
    }
}

impl HashAlgorithm {
    /// Parse algorithm from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "md5" => Some(Self::Md5),
            "sha256" => Some(Self::Sha256),
            "blake3" => Some(Self::Blake3),
            _ => None,
        }
    }
}

/// A computed digest value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashDigest {
    algorithm: HashAlgorithm,
    hex: String,
}

impl HashDigest {
    pub fn new(algorithm: HashAlgorithm, hex: String) -> Self {
        HashDigest { algorithm, hex }
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Hex string representation
    pub fn hex(&self) -> &str {
        &self.hex
    }
}

impl fmt::Display for HashDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.hex)
    }
}

/// Trait for streaming hash computation
pub trait StreamingHasher: Send {
    /// Update the hasher with new data
    fn update(&mut self, data: &[u8]);

    /// Finalize and return the digest
    fn finalize(self: Box<Self>) -> HashDigest;
}

/// MD5 hasher (backed by md5 crate)
struct Md5Hasher {
    context: md5::Context,
}

impl StreamingHasher for Md5Hasher {
    fn update(&mut self, data: &[u8]) {
        self.context.consume(data);
    }

    fn finalize(self: Box<Self>) -> HashDigest {
        let digest = self.context.compute();
        HashDigest::new(HashAlgorithm::Md5, format!("{:x}", digest))
    }
}

/// SHA-256 hasher (backed by sha2 crate)
struct Sha256Hasher {
    hasher: sha2::Sha256,
}

impl StreamingHasher for Sha256Hasher {
    fn update(&mut self, data: &[u8]) {
        use sha2::Digest;
        self.hasher.update(data);
    }

    fn finalize(self: Box<Self>) -> HashDigest {
        use sha2::Digest;
        let digest = self.hasher.finalize();
        HashDigest::new(HashAlgorithm::Sha256, format!("{:x}", digest))
    }
}

/// BLAKE3 hasher (backed by blake3 crate)
struct Blake3Hasher {
    hasher: blake3::Hasher,
}

impl StreamingHasher for Blake3Hasher {
    fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    fn finalize(self: Box<Self>) -> HashDigest {
        let digest = self.hasher.finalize();
        HashDigest::new(HashAlgorithm::Blake3, digest.to_hex().to_string())
    }
}

/// Create a new streaming hasher for the given algorithm
pub fn create_hasher(algorithm: HashAlgorithm) -> Box<dyn StreamingHasher> {
    match algorithm {
        HashAlgorithm::Md5 => Box::new(Md5Hasher {
            context: md5::Context::new(),
        }),
        HashAlgorithm::Sha256 => Box::new(Sha256Hasher {
            hasher: sha2::Sha256::default(),
        }),
        HashAlgorithm::Blake3 => Box::new(Blake3Hasher {
            hasher: blake3::Hasher::new(),
        }),
    }
}

/// Compute the digest of a whole file with buffered reads.
pub fn hash_file(path: &Path, algorithm: HashAlgorithm) -> Result<HashDigest, EngineError> {
    use std::fs::File;
    use std::io::Read;

    let mut file = File::open(path).map_err(|e| EngineError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut hasher = create_hasher(algorithm);
    let mut buffer = vec![0u8; 1024 * 1024];

    loop {
        match file.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => hasher.update(&buffer[..n]),
            Err(e) => {
                return Err(EngineError::ReadError {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        }
    }

    Ok(hasher.finalize())
}

/// Short content-independent hash of a path string, used to build unique,
/// human-readable keys for per-file results (same-named files in different
/// folders must not collide).
pub fn path_key(path: &Path) -> String {
    let digest = md5::compute(path.to_string_lossy().as_bytes());
    let hex = format!("{:x}", digest);
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unnamed".to_string());
    format!("{}_{}", &hex[..8], name)
}
