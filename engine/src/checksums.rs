//! Checksum computation.
//!
//! This module provides:
//! - The supported checksum algorithms (xxHash64, MD5)
//! - [`ChecksumStream`], an incremental hasher fed with chunks
//! - File-level checksum computation with pause/cancel checkpoints

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::control::JobControl;
use crate::error::{EngineError, Result};

/// Read size used while copying (hash and fan-out writes share each chunk).
pub const COPY_CHUNK_SIZE: usize = 4 * 1024 * 1024;

/// Read size used by verify-only passes, which have no competing writes.
pub const VERIFY_CHUNK_SIZE: usize = 8 * 1024 * 1024;

/// Supported checksum algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumAlgorithm {
    /// xxHash64, seed 0 (fast, non-cryptographic)
    #[serde(alias = "xxhash", alias = "xxh64")]
    XxHash64,
    /// MD5 (slow, kept for manifest compatibility)
    Md5,
}

impl Default for ChecksumAlgorithm {
    fn default() -> Self {
        Self::XxHash64
    }
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::XxHash64 => write!(f, "xxhash64"),
            Self::Md5 => write!(f, "md5"),
        }
    }
}

impl FromStr for ChecksumAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "xxhash64" | "xxhash" | "xxh64" => Ok(Self::XxHash64),
            "md5" => Ok(Self::Md5),
            other => Err(format!(
                "unknown checksum algorithm '{}' (expected xxhash64 or md5)",
                other
            )),
        }
    }
}

/// A computed checksum value
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
pub struct ChecksumValue {
    algorithm: ChecksumAlgorithm,
    hex: String,
}

impl ChecksumValue {
    pub fn new(algorithm: ChecksumAlgorithm, hex: impl Into<String>) -> Self {
        ChecksumValue {
            algorithm,
            hex: hex.into(),
        }
    }

    pub fn algorithm(&self) -> ChecksumAlgorithm {
        self.algorithm
    }

    pub fn hex(&self) -> &str {
        &self.hex
    }

    /// Compare against a hex string from elsewhere (manifests may use
    /// upper case).
    pub fn matches_hex(&self, hex: &str) -> bool {
        self.hex.eq_ignore_ascii_case(hex.trim())
    }

    /// Format as "algo:hex"
    pub fn to_string_with_algo(&self) -> String {
        format!("{}:{}", self.algorithm, self.hex)
    }
}

impl PartialEq for ChecksumValue {
    fn eq(&self, other: &Self) -> bool {
        self.algorithm == other.algorithm && self.matches_hex(&other.hex)
    }
}

impl fmt::Display for ChecksumValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.hex)
    }
}

/// Incremental digest state for one algorithm.
pub trait ChecksumHasher: Send {
    fn update(&mut self, data: &[u8]);

    fn finalize(self: Box<Self>) -> ChecksumValue;
}

struct XxHash64Hasher {
    state: xxhash_rust::xxh64::Xxh64,
}

impl XxHash64Hasher {
    fn new() -> Self {
        XxHash64Hasher {
            state: xxhash_rust::xxh64::Xxh64::new(0),
        }
    }
}

impl ChecksumHasher for XxHash64Hasher {
    fn update(&mut self, data: &[u8]) {
        self.state.update(data);
    }

    fn finalize(self: Box<Self>) -> ChecksumValue {
        ChecksumValue::new(
            ChecksumAlgorithm::XxHash64,
            format!("{:016x}", self.state.digest()),
        )
    }
}

/// MD5 hasher (backed by md5 crate)
struct Md5Hasher {
    context: md5::Context,
}

impl Md5Hasher {
    fn new() -> Self {
        Md5Hasher {
            context: md5::Context::new(),
        }
    }
}

impl ChecksumHasher for Md5Hasher {
    fn update(&mut self, data: &[u8]) {
        self.context.consume(data);
    }

    fn finalize(self: Box<Self>) -> ChecksumValue {
        let digest = self.context.compute();
        ChecksumValue::new(ChecksumAlgorithm::Md5, format!("{:x}", digest))
    }
}

/// Create a new hasher for the given algorithm
pub fn create_hasher(algorithm: ChecksumAlgorithm) -> Box<dyn ChecksumHasher> {
    match algorithm {
        ChecksumAlgorithm::XxHash64 => Box::new(XxHash64Hasher::new()),
        ChecksumAlgorithm::Md5 => Box::new(Md5Hasher::new()),
    }
}

/// Streaming checksum fed chunk by chunk; the digest does not depend on
/// where chunk boundaries fall.
pub struct ChecksumStream {
    hasher: Box<dyn ChecksumHasher>,
    bytes: u64,
}

impl ChecksumStream {
    pub fn new(algorithm: ChecksumAlgorithm) -> Self {
        ChecksumStream {
            hasher: create_hasher(algorithm),
            bytes: 0,
        }
    }

    pub fn update(&mut self, chunk: &[u8]) {
        self.hasher.update(chunk);
        self.bytes += chunk.len() as u64;
    }

    /// Bytes consumed so far.
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn finish(self) -> ChecksumValue {
        self.hasher.finalize()
    }
}

/// Hash a whole in-memory buffer.
pub fn checksum_bytes(algorithm: ChecksumAlgorithm, data: &[u8]) -> ChecksumValue {
    let mut stream = ChecksumStream::new(algorithm);
    stream.update(data);
    stream.finish()
}

/// Compute the checksum of a file, reading `chunk_size` bytes at a time.
///
/// When a `control` is given, pause/cancel are honoured between chunks.
pub fn compute_file_checksum(
    path: &Path,
    algorithm: ChecksumAlgorithm,
    chunk_size: usize,
    control: Option<&JobControl>,
) -> Result<ChecksumValue> {
    let mut file = File::open(path).map_err(|e| EngineError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut buffer = vec![0u8; chunk_size.max(1)];
    let mut stream = ChecksumStream::new(algorithm);

    loop {
        if let Some(control) = control {
            control.checkpoint()?;
        }
        let n = file.read(&mut buffer).map_err(|e| EngineError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;
        if n == 0 {
            break;
        }
        stream.update(&buffer[..n]);
    }

    Ok(stream.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_data() -> Vec<u8> {
        (0..100_003u32).map(|i| (i.wrapping_mul(31) % 251) as u8).collect()
    }

    #[test]
    fn test_algorithm_display() {
        assert_eq!(ChecksumAlgorithm::XxHash64.to_string(), "xxhash64");
        assert_eq!(ChecksumAlgorithm::Md5.to_string(), "md5");
    }

    #[test]
    fn test_algorithm_from_str() {
        assert_eq!("xxhash64".parse(), Ok(ChecksumAlgorithm::XxHash64));
        assert_eq!("XXH64".parse(), Ok(ChecksumAlgorithm::XxHash64));
        assert_eq!("md5".parse(), Ok(ChecksumAlgorithm::Md5));
        assert!("sha256".parse::<ChecksumAlgorithm>().is_err());
    }

    #[test]
    fn test_md5_known_value() {
        let checksum = checksum_bytes(ChecksumAlgorithm::Md5, b"hello");
        assert_eq!(checksum.algorithm(), ChecksumAlgorithm::Md5);
        assert_eq!(checksum.hex(), "5d41402abc4b2a76b9719d911017c592");
    }

    #[test]
    fn test_xxhash64_known_value() {
        let checksum = checksum_bytes(ChecksumAlgorithm::XxHash64, b"");
        assert_eq!(checksum.hex(), "ef46db3751d8e999");
        assert_eq!(checksum.hex().len(), 16);
    }

    #[test]
    fn test_chunk_boundaries_do_not_change_digest() {
        let data = sample_data();
        for algorithm in [ChecksumAlgorithm::XxHash64, ChecksumAlgorithm::Md5] {
            let whole = checksum_bytes(algorithm, &data);
            for chunk_size in [1usize, 7, 31, 32, 64, 4096, 65_537, data.len()] {
                let mut stream = ChecksumStream::new(algorithm);
                for chunk in data.chunks(chunk_size) {
                    stream.update(chunk);
                }
                assert_eq!(stream.bytes(), data.len() as u64);
                assert_eq!(
                    stream.finish(),
                    whole,
                    "{} differs with chunk size {}",
                    algorithm,
                    chunk_size
                );
            }
        }
    }

    #[test]
    fn test_uneven_split_points() {
        let data = sample_data();
        let whole = checksum_bytes(ChecksumAlgorithm::XxHash64, &data);
        let mut stream = ChecksumStream::new(ChecksumAlgorithm::XxHash64);
        let mut rest = &data[..];
        for cut in [3usize, 29, 1, 1000, 17] {
            let (head, tail) = rest.split_at(cut);
            stream.update(head);
            rest = tail;
        }
        stream.update(rest);
        assert_eq!(stream.finish(), whole);
    }

    #[test]
    fn test_checksum_value_comparison_ignores_case() {
        let cs = ChecksumValue::new(ChecksumAlgorithm::Md5, "abcdef");
        assert!(cs.matches_hex("ABCDEF"));
        assert_eq!(cs, ChecksumValue::new(ChecksumAlgorithm::Md5, "ABCDEF"));
        assert_ne!(cs, ChecksumValue::new(ChecksumAlgorithm::XxHash64, "abcdef"));
        assert_eq!(cs.to_string_with_algo(), "md5:abcdef");
    }

    #[test]
    fn test_compute_file_checksum_matches_in_memory() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("clip.mov");
        let data = sample_data();
        let mut file = File::create(&path).expect("Failed to create file");
        file.write_all(&data).expect("Failed to write file");
        drop(file);

        for algorithm in [ChecksumAlgorithm::XxHash64, ChecksumAlgorithm::Md5] {
            let from_file = compute_file_checksum(&path, algorithm, 4096, None)
                .expect("Checksum should succeed");
            assert_eq!(from_file, checksum_bytes(algorithm, &data));
        }
    }

    #[test]
    fn test_compute_file_checksum_missing_file() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let result = compute_file_checksum(
            &temp_dir.path().join("absent"),
            ChecksumAlgorithm::Md5,
            VERIFY_CHUNK_SIZE,
            None,
        );
        assert!(matches!(result, Err(EngineError::ReadError { .. })));
    }

    #[test]
    fn test_compute_file_checksum_honours_cancel() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("clip.mov");
        std::fs::write(&path, sample_data()).expect("Failed to write file");

        let control = JobControl::new();
        control.cancel();
        let result =
            compute_file_checksum(&path, ChecksumAlgorithm::XxHash64, 1024, Some(&control));
        assert!(matches!(result, Err(EngineError::Cancelled)));
    }
}
