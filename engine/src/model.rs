//! Core data model for offload jobs.
//!
//! This module defines the data structures handed to and produced by the
//! engines:
//! - TransferJob / VerifyJob: the units of work, fully resolved by the caller
//! - TransferReport / VerifyReport: terminal records, one entry per file
//! - TransferOptions, VerificationMode, JobStatus: behaviour and lifecycle

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::checksums::{ChecksumAlgorithm, ChecksumValue};

/// Opaque job identity.
pub type JobId = Uuid;

/// Free-form key/value data attached to files (camera id, reel, thumbnail).
pub type Annotations = BTreeMap<String, String>;

/// How destinations are checked after the copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationMode {
    /// Re-hash every destination and compare with the source digest
    #[default]
    Full,
    /// Only compare sizes
    #[serde(rename = "size", alias = "sizeonly")]
    SizeOnly,
    /// No verification; files end up "Copied (Unverified)"
    None,
}

impl fmt::Display for VerificationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerificationMode::Full => write!(f, "full"),
            VerificationMode::SizeOnly => write!(f, "size"),
            VerificationMode::None => write!(f, "none"),
        }
    }
}

impl std::str::FromStr for VerificationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "full" => Ok(VerificationMode::Full),
            "size" | "sizeonly" | "size-only" => Ok(VerificationMode::SizeOnly),
            "none" => Ok(VerificationMode::None),
            other => Err(format!(
                "unknown verification mode '{}' (expected full, size or none)",
                other
            )),
        }
    }
}

/// Per-job behaviour switches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferOptions {
    pub checksum: ChecksumAlgorithm,
    pub verification: VerificationMode,
    /// Leave destinations that already have the source's size untouched
    pub skip_existing: bool,
    /// Append to destinations that hold a shorter prefix of the source
    pub resume_partial: bool,
    /// Report fully verified source roots as safe to eject
    pub eject_on_success: bool,
}

impl Default for TransferOptions {
    fn default() -> Self {
        TransferOptions {
            checksum: ChecksumAlgorithm::XxHash64,
            verification: VerificationMode::Full,
            skip_existing: true,
            resume_partial: true,
            eject_on_success: false,
        }
    }
}

/// The state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Queued,
    Running,
    Paused,
    Cancelled,
    Completed,
    CompletedWithErrors,
}

impl JobStatus {
    /// Returns true if no further transitions can happen.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Cancelled | JobStatus::Completed | JobStatus::CompletedWithErrors
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Queued => write!(f, "Queued"),
            JobStatus::Running => write!(f, "Running"),
            JobStatus::Paused => write!(f, "Paused"),
            JobStatus::Cancelled => write!(f, "Cancelled"),
            JobStatus::Completed => write!(f, "Completed"),
            JobStatus::CompletedWithErrors => write!(f, "Completed with errors"),
        }
    }
}

/// One source file and the destination files it fans out to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileItem {
    pub source_path: PathBuf,
    pub destination_paths: Vec<PathBuf>,
    /// Size observed by the scan
    pub file_size: u64,
}

impl FileItem {
    pub fn new(source_path: impl Into<PathBuf>, file_size: u64, destination_paths: Vec<PathBuf>) -> Self {
        FileItem {
            source_path: source_path.into(),
            destination_paths,
            file_size,
        }
    }
}

/// A fully resolved copy job.
///
/// Built by the scan step; `total_bytes` is fixed at construction and is the
/// denominator for every progress figure of this job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferJob {
    pub id: JobId,
    /// Source roots (card mount points or folders)
    pub sources: Vec<PathBuf>,
    /// Destination roots
    pub destinations: Vec<PathBuf>,
    /// Files in processing order
    pub files: Vec<FileItem>,
    pub options: TransferOptions,
    /// Per-source-root metadata copied into each file record
    pub source_metadata: BTreeMap<PathBuf, Annotations>,
    total_bytes: u64,
    pub(crate) status: JobStatus,
    pub(crate) report: Option<TransferReport>,
}

impl TransferJob {
    pub fn new(
        sources: Vec<PathBuf>,
        destinations: Vec<PathBuf>,
        files: Vec<FileItem>,
        options: TransferOptions,
    ) -> Self {
        let total_bytes = files.iter().map(|f| f.file_size).sum();
        TransferJob {
            id: Uuid::new_v4(),
            sources,
            destinations,
            files,
            options,
            source_metadata: BTreeMap::new(),
            total_bytes,
            status: JobStatus::Queued,
            report: None,
        }
    }

    pub fn with_source_metadata(mut self, root: impl Into<PathBuf>, metadata: Annotations) -> Self {
        self.source_metadata.insert(root.into(), metadata);
        self
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn report(&self) -> Option<&TransferReport> {
        self.report.as_ref()
    }

    /// The source root a file belongs to (longest matching root).
    pub fn source_root_of(&self, file: &Path) -> Option<&Path> {
        self.sources
            .iter()
            .filter(|root| file.starts_with(root))
            .max_by_key(|root| root.components().count())
            .map(PathBuf::as_path)
    }

    /// Every path that must exist before this job may start.
    pub fn referenced_paths(&self) -> impl Iterator<Item = &Path> {
        self.sources
            .iter()
            .chain(self.destinations.iter())
            .map(PathBuf::as_path)
            .chain(self.files.iter().map(|f| f.source_path.as_path()))
    }
}

/// What happened to a destination during the write phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteAction {
    /// Written from byte zero
    Written,
    /// Appended to an existing partial copy
    Resumed { from: u64 },
    /// Left untouched because it already had the source's size
    Skipped,
    /// The write failed; the destination was closed early
    Failed,
}

/// Verification outcome of one destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DestinationStatus {
    Verified,
    VerifiedSizeOnly,
    Unverified,
    Missing,
    SizeMismatch,
    VerificationFailed,
    WriteFailed(String),
    VerifyError(String),
}

impl fmt::Display for DestinationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DestinationStatus::Verified => write!(f, "Verified"),
            DestinationStatus::VerifiedSizeOnly => write!(f, "Verified (Size Only)"),
            DestinationStatus::Unverified => write!(f, "Unverified"),
            DestinationStatus::Missing => write!(f, "Missing"),
            DestinationStatus::SizeMismatch => write!(f, "Size Mismatch"),
            DestinationStatus::VerificationFailed => write!(f, "Verification FAILED"),
            DestinationStatus::WriteFailed(msg) => write!(f, "Write failed: {}", msg),
            DestinationStatus::VerifyError(msg) => write!(f, "Verify error: {}", msg),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationOutcome {
    pub path: PathBuf,
    pub action: WriteAction,
    /// Bytes written to this destination during this run
    pub bytes_written: u64,
    pub verified: bool,
    pub status: DestinationStatus,
}

/// Terminal status of one source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileStatus {
    Verified,
    CopiedUnverified,
    Failed,
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileStatus::Verified => write!(f, "Verified"),
            FileStatus::CopiedUnverified => write!(f, "Copied (Unverified)"),
            FileStatus::Failed => write!(f, "Failed"),
        }
    }
}

/// Outcome of one source file in a copy job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileTransferRecord {
    pub source_path: PathBuf,
    pub size: u64,
    /// Source digest, only in Full verification mode
    pub checksum: Option<ChecksumValue>,
    pub destinations: Vec<DestinationOutcome>,
    pub status: FileStatus,
    pub error: Option<String>,
    pub custom_metadata: Annotations,
    /// Filled in later by post-processing
    pub annotations: Annotations,
}

impl FileTransferRecord {
    /// First destination that passed verification, if any.
    pub fn verified_destination(&self) -> Option<&Path> {
        self.destinations
            .iter()
            .find(|d| d.verified)
            .map(|d| d.path.as_path())
    }
}

/// Annotations produced by post-processing for one file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilePatch {
    pub source_path: PathBuf,
    pub annotations: Annotations,
}

/// Terminal record of a copy job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferReport {
    pub job_id: JobId,
    pub status: JobStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub checksum_algorithm: ChecksumAlgorithm,
    pub verification_mode: VerificationMode,
    pub total_bytes: u64,
    pub files: Vec<FileTransferRecord>,
    pub errors: Vec<String>,
    /// Source roots whose every file was verified (only with eject_on_success)
    pub ejectable_sources: Vec<PathBuf>,
}

impl TransferReport {
    pub fn count(&self, status: FileStatus) -> usize {
        self.files.iter().filter(|f| f.status == status).count()
    }

    /// Merge post-processing annotations into the record for `patch.source_path`.
    ///
    /// Returns false when no such file is in the report.
    pub fn patch_file(&mut self, patch: FilePatch) -> bool {
        match self
            .files
            .iter_mut()
            .find(|f| f.source_path == patch.source_path)
        {
            Some(record) => {
                record.annotations.extend(patch.annotations);
                true
            }
            None => false,
        }
    }
}

/// One parsed manifest entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub relative_path: PathBuf,
    pub expected_hash: String,
    pub algorithm: ChecksumAlgorithm,
    pub size: u64,
}

/// A verify-only job: re-hash files under `target_dir` against a manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyJob {
    pub id: JobId,
    pub manifest_path: PathBuf,
    pub target_dir: PathBuf,
    pub entries: Vec<ManifestEntry>,
    pub(crate) status: JobStatus,
    pub(crate) report: Option<VerifyReport>,
}

impl VerifyJob {
    pub fn new(
        manifest_path: impl Into<PathBuf>,
        target_dir: impl Into<PathBuf>,
        entries: Vec<ManifestEntry>,
    ) -> Self {
        VerifyJob {
            id: Uuid::new_v4(),
            manifest_path: manifest_path.into(),
            target_dir: target_dir.into(),
            entries,
            status: JobStatus::Queued,
            report: None,
        }
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn report(&self) -> Option<&VerifyReport> {
        self.report.as_ref()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerifyStatus {
    Verified,
    Failed,
    Missing,
}

impl fmt::Display for VerifyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerifyStatus::Verified => write!(f, "Verified"),
            VerifyStatus::Failed => write!(f, "FAILED"),
            VerifyStatus::Missing => write!(f, "Missing"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileVerifyRecord {
    pub relative_path: PathBuf,
    pub path: PathBuf,
    pub expected_hash: String,
    pub algorithm: ChecksumAlgorithm,
    pub status: VerifyStatus,
    pub actual_hash: Option<String>,
}

/// Terminal record of a verify job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyReport {
    pub job_id: JobId,
    pub status: JobStatus,
    pub manifest_path: PathBuf,
    pub target_dir: PathBuf,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub files: Vec<FileVerifyRecord>,
    pub errors: Vec<String>,
    pub verified_count: usize,
    pub failed_count: usize,
    pub missing_count: usize,
}

impl VerifyReport {
    pub fn has_issues(&self) -> bool {
        self.failed_count + self.missing_count > 0
    }
}
