//! Copy engine.
//!
//! Runs one [`TransferJob`]: for every file, a single read of the source
//! feeds all destinations (and the source digest in Full mode), then each
//! destination is verified on its own. Per-file failures are recorded and
//! the job moves on to the next file.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::checksums::{compute_file_checksum, ChecksumStream, ChecksumValue, COPY_CHUNK_SIZE};
use crate::control::JobControl;
use crate::error::{EngineError, Result};
use crate::fs_ops::{self, DestinationWriter, WriterOutcome};
use crate::model::{
    Annotations, DestinationOutcome, DestinationStatus, FileItem, FileStatus, FileTransferRecord, JobId,
    JobStatus, TransferJob, TransferReport, VerificationMode, WriteAction,
};
use crate::progress::{percent_of, FileProgress, JobProgress, ProgressCallback};

pub struct TransferEngine {
    job: TransferJob,
    control: JobControl,
    chunk_size: usize,
}

impl TransferEngine {
    pub fn new(job: TransferJob, control: JobControl) -> Self {
        TransferEngine {
            job,
            control,
            chunk_size: COPY_CHUNK_SIZE,
        }
    }

    /// Override the read size (tests use small chunks to get several
    /// checkpoints out of small files).
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn job_id(&self) -> JobId {
        self.job.id
    }

    pub fn control(&self) -> &JobControl {
        &self.control
    }

    /// Process every file and return the job in a terminal state with its
    /// report filled in.
    pub fn run(mut self, progress: &dyn ProgressCallback) -> TransferJob {
        let job_id = self.job.id;
        let total = self.job.total_bytes();
        info!(%job_id, files = self.job.files.len(), total_bytes = total, "Transfer job started");

        self.job.status = JobStatus::Running;
        progress.on_job_started(job_id, total);

        let started_at = Utc::now();
        let timer = self.control.start_timer();
        let mut records = Vec::with_capacity(self.job.files.len());
        let mut errors = Vec::new();
        let mut processed: u64 = 0;
        let mut cancelled = false;

        for item in &self.job.files {
            if self.control.checkpoint().is_err() {
                cancelled = true;
                break;
            }

            let record = match self.transfer_file(item, progress) {
                Ok(record) => record,
                Err(EngineError::Cancelled) => {
                    cancelled = true;
                    break;
                }
                Err(e) => self.failed_record(item, e.to_string()),
            };

            if record.status == FileStatus::Failed {
                let message = format!(
                    "Error processing {}: {}",
                    display_name(&record.source_path),
                    record.error.as_deref().unwrap_or("unknown error")
                );
                warn!(%job_id, "{}", message);
                progress.on_error(job_id, &message);
                errors.push(message);
            } else {
                processed += record.size;
            }
            records.push(record);

            let elapsed = timer.elapsed();
            let secs = elapsed.as_secs_f64();
            let speed = if secs > 0.0 { processed as f64 / secs } else { 0.0 };
            let eta_secs = (speed > 0.0).then(|| total.saturating_sub(processed) as f64 / speed);
            progress.on_job_progress(JobProgress {
                job_id,
                processed,
                total,
                elapsed,
                speed,
                eta_secs,
            });
        }

        let status = if cancelled {
            JobStatus::Cancelled
        } else if errors.is_empty() {
            JobStatus::Completed
        } else {
            JobStatus::CompletedWithErrors
        };

        let ejectable_sources = if self.job.options.eject_on_success && !cancelled {
            self.ejectable_sources(&records)
        } else {
            Vec::new()
        };

        info!(
            %job_id,
            %status,
            files = records.len(),
            errors = errors.len(),
            "Transfer job finished"
        );

        self.job.status = status;
        self.job.report = Some(TransferReport {
            job_id,
            status,
            started_at,
            finished_at: Utc::now(),
            checksum_algorithm: self.job.options.checksum,
            verification_mode: self.job.options.verification,
            total_bytes: total,
            files: records,
            errors,
            ejectable_sources,
        });
        self.job
    }

    /// Copy one source to all of its destinations, then verify each.
    ///
    /// Errors returned from here are source-side failures (or
    /// cancellation); destination failures are folded into the record.
    fn transfer_file(&self, item: &FileItem, progress: &dyn ProgressCallback) -> Result<FileTransferRecord> {
        let job_id = self.job.id;
        let options = &self.job.options;
        let source = item.source_path.as_path();

        let metadata = fs::metadata(source).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => EngineError::SourceNotFound {
                path: source.to_path_buf(),
            },
            _ => EngineError::ReadError {
                path: source.to_path_buf(),
                source: e,
            },
        })?;
        let size = metadata.len();
        let modified = metadata.modified().ok();

        let mut writers: Vec<DestinationWriter> = item
            .destination_paths
            .iter()
            .map(|dest| DestinationWriter::open(dest, size, options))
            .collect();

        let full = options.verification == VerificationMode::Full;
        let mut digest = full.then(|| ChecksumStream::new(options.checksum));
        let status_text = if full { "Copying & Hashing..." } else { "Copying..." };

        progress.on_file_progress(FileProgress {
            job_id,
            percent: 0,
            status_text: status_text.to_string(),
            current_path: source.to_path_buf(),
            speed: 0.0,
        });

        let file_timer = self.control.start_timer();
        let read = fs_ops::fan_out_copy(
            source,
            &mut writers,
            digest.as_mut(),
            self.chunk_size,
            &self.control,
            |position| {
                let secs = file_timer.elapsed().as_secs_f64();
                progress.on_file_progress(FileProgress {
                    job_id,
                    percent: percent_of(position, size),
                    status_text: status_text.to_string(),
                    current_path: source.to_path_buf(),
                    speed: if secs > 0.0 { position as f64 / secs } else { 0.0 },
                });
            },
        )?;
        debug!(%job_id, source = %source.display(), bytes_read = read, "Source read complete");

        let checksum = digest.map(ChecksumStream::finish);

        let mut destinations = Vec::with_capacity(writers.len());
        for writer in writers {
            let outcome = writer.finish();
            if outcome.bytes_written > 0 {
                fs_ops::preserve_mtime(&outcome.path, modified);
            }
            destinations.push(self.verify_destination(outcome, size, checksum.as_ref(), progress)?);
        }

        let mode = options.verification;
        let passed = |d: &DestinationOutcome| {
            d.verified || (mode == VerificationMode::None && d.status == DestinationStatus::Unverified)
        };

        let (status, error) = if destinations.is_empty() {
            (FileStatus::Failed, Some("No destination paths".to_string()))
        } else if destinations.iter().all(passed) {
            match mode {
                VerificationMode::None => (FileStatus::CopiedUnverified, None),
                _ => (FileStatus::Verified, None),
            }
        } else {
            let problems: Vec<String> = destinations
                .iter()
                .filter(|d| !passed(d))
                .map(|d| format!("{}: {}", d.path.display(), d.status))
                .collect();
            (FileStatus::Failed, Some(problems.join("; ")))
        };

        Ok(FileTransferRecord {
            source_path: source.to_path_buf(),
            size,
            checksum,
            destinations,
            status,
            error,
            custom_metadata: self.custom_metadata_for(source),
            annotations: Default::default(),
        })
    }

    /// Check one destination after the write phase.
    fn verify_destination(
        &self,
        outcome: WriterOutcome,
        source_size: u64,
        source_checksum: Option<&ChecksumValue>,
        progress: &dyn ProgressCallback,
    ) -> Result<DestinationOutcome> {
        let WriterOutcome {
            path,
            action,
            bytes_written,
            error,
        } = outcome;

        let status = if let Some(e) = error {
            DestinationStatus::WriteFailed(e.to_string())
        } else {
            match fs::metadata(&path) {
                Err(e) if e.kind() == io::ErrorKind::NotFound => DestinationStatus::Missing,
                Err(e) => DestinationStatus::VerifyError(e.to_string()),
                Ok(metadata) if metadata.len() != source_size => DestinationStatus::SizeMismatch,
                Ok(_) => match (self.job.options.verification, source_checksum) {
                    (VerificationMode::None, _) => DestinationStatus::Unverified,
                    (VerificationMode::SizeOnly, _) => DestinationStatus::VerifiedSizeOnly,
                    (VerificationMode::Full, Some(expected)) => {
                        self.hash_destination(&path, expected, progress)?
                    }
                    (VerificationMode::Full, None) => {
                        DestinationStatus::VerifyError("no source checksum".to_string())
                    }
                },
            }
        };

        let verified = matches!(
            status,
            DestinationStatus::Verified | DestinationStatus::VerifiedSizeOnly
        );
        Ok(DestinationOutcome {
            path,
            action,
            bytes_written,
            verified,
            status,
        })
    }

    fn hash_destination(
        &self,
        path: &Path,
        expected: &ChecksumValue,
        progress: &dyn ProgressCallback,
    ) -> Result<DestinationStatus> {
        progress.on_file_progress(FileProgress {
            job_id: self.job.id,
            percent: 50,
            status_text: "Verifying...".to_string(),
            current_path: path.to_path_buf(),
            speed: 0.0,
        });

        match compute_file_checksum(path, expected.algorithm(), self.chunk_size, Some(&self.control)) {
            Ok(actual) if actual == *expected => Ok(DestinationStatus::Verified),
            Ok(actual) => {
                warn!(
                    path = %path.display(),
                    expected = expected.hex(),
                    actual = actual.hex(),
                    "Checksum mismatch"
                );
                Ok(DestinationStatus::VerificationFailed)
            }
            Err(EngineError::Cancelled) => Err(EngineError::Cancelled),
            Err(e) => Ok(DestinationStatus::VerifyError(e.to_string())),
        }
    }

    fn failed_record(&self, item: &FileItem, error: String) -> FileTransferRecord {
        FileTransferRecord {
            source_path: item.source_path.clone(),
            size: item.file_size,
            checksum: None,
            destinations: Vec::new(),
            status: FileStatus::Failed,
            error: Some(error),
            custom_metadata: self.custom_metadata_for(&item.source_path),
            annotations: Default::default(),
        }
    }

    fn custom_metadata_for(&self, source: &Path) -> Annotations {
        self.job
            .source_root_of(source)
            .and_then(|root| self.job.source_metadata.get(root))
            .cloned()
            .unwrap_or_default()
    }

    /// Source roots with at least one file where every file was verified.
    fn ejectable_sources(&self, records: &[FileTransferRecord]) -> Vec<PathBuf> {
        self.job
            .sources
            .iter()
            .filter(|root| {
                let mut under_root = records
                    .iter()
                    .filter(|r| self.job.source_root_of(&r.source_path) == Some(root.as_path()))
                    .peekable();
                under_root.peek().is_some() && under_root.all(|r| r.status == FileStatus::Verified)
            })
            .cloned()
            .collect()
    }
}

/// Bytes written across all destinations of a report. Zero for a run that
/// found everything already in place.
pub fn bytes_written(report: &TransferReport) -> u64 {
    report
        .files
        .iter()
        .flat_map(|f| f.destinations.iter())
        .filter(|d| d.action != WriteAction::Skipped)
        .map(|d| d.bytes_written)
        .sum()
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
