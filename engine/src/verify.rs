//! Verify-only engine: re-hash files under a target directory and compare
//! them with manifest entries.

use chrono::Utc;
use tracing::{info, warn};

use crate::checksums::{compute_file_checksum, VERIFY_CHUNK_SIZE};
use crate::control::JobControl;
use crate::error::EngineError;
use crate::model::{FileVerifyRecord, JobId, JobStatus, ManifestEntry, VerifyJob, VerifyReport, VerifyStatus};
use crate::progress::{percent_of, FileProgress, JobProgress, ProgressCallback};

pub struct VerificationEngine {
    job: VerifyJob,
    control: JobControl,
    chunk_size: usize,
}

impl VerificationEngine {
    pub fn new(job: VerifyJob, control: JobControl) -> Self {
        VerificationEngine {
            job,
            control,
            chunk_size: VERIFY_CHUNK_SIZE,
        }
    }

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

    /// Check every entry in manifest order. Progress is counted in entries.
    pub fn run(mut self, progress: &dyn ProgressCallback) -> VerifyJob {
        let job_id = self.job.id;
        let total = self.job.entries.len() as u64;
        info!(
            %job_id,
            manifest = %self.job.manifest_path.display(),
            target = %self.job.target_dir.display(),
            entries = total,
            "Verify job started"
        );

        self.job.status = JobStatus::Running;
        progress.on_job_started(job_id, total);

        let started_at = Utc::now();
        let timer = self.control.start_timer();
        let mut files = Vec::with_capacity(self.job.entries.len());
        let mut errors = Vec::new();
        let mut cancelled = false;

        for (index, entry) in self.job.entries.iter().enumerate() {
            if self.control.checkpoint().is_err() {
                cancelled = true;
                break;
            }

            let path = self.job.target_dir.join(&entry.relative_path);
            progress.on_file_progress(FileProgress {
                job_id,
                percent: percent_of(index as u64, total),
                status_text: format!("Verifying file {} of {}", index + 1, total),
                current_path: path.clone(),
                speed: 0.0,
            });

            let record = match self.check_entry(entry) {
                Ok(record) => record,
                Err(EngineError::Cancelled) => {
                    cancelled = true;
                    break;
                }
                Err(e) => {
                    let message = format!("Error verifying {}: {}", entry.relative_path.display(), e);
                    warn!(%job_id, "{}", message);
                    progress.on_error(job_id, &message);
                    errors.push(message);
                    FileVerifyRecord {
                        relative_path: entry.relative_path.clone(),
                        path,
                        expected_hash: entry.expected_hash.clone(),
                        algorithm: entry.algorithm,
                        status: VerifyStatus::Failed,
                        actual_hash: None,
                    }
                }
            };
            files.push(record);

            let done = (index + 1) as u64;
            let elapsed = timer.elapsed();
            let secs = elapsed.as_secs_f64();
            let speed = if secs > 0.0 { done as f64 / secs } else { 0.0 };
            progress.on_file_progress(FileProgress {
                job_id,
                percent: percent_of(done, total),
                status_text: format!("Verified file {} of {}", done, total),
                current_path: self.job.target_dir.join(&entry.relative_path),
                speed: 0.0,
            });
            progress.on_job_progress(JobProgress {
                job_id,
                processed: done,
                total,
                elapsed,
                speed,
                eta_secs: (speed > 0.0).then(|| total.saturating_sub(done) as f64 / speed),
            });
        }

        let count = |status: VerifyStatus| files.iter().filter(|f| f.status == status).count();
        let verified_count = count(VerifyStatus::Verified);
        let failed_count = count(VerifyStatus::Failed);
        let missing_count = count(VerifyStatus::Missing);

        let status = if cancelled {
            JobStatus::Cancelled
        } else if failed_count + missing_count > 0 {
            JobStatus::CompletedWithErrors
        } else {
            JobStatus::Completed
        };

        info!(
            %job_id,
            verified = verified_count,
            failed = failed_count,
            missing = missing_count,
            "Verify job finished"
        );

        self.job.status = status;
        self.job.report = Some(VerifyReport {
            job_id,
            status,
            manifest_path: self.job.manifest_path.clone(),
            target_dir: self.job.target_dir.clone(),
            started_at,
            finished_at: Utc::now(),
            files,
            errors,
            verified_count,
            failed_count,
            missing_count,
        });
        self.job
    }

    /// Missing and mismatching files are normal outcomes; only read errors
    /// and cancellation come back as `Err`.
    fn check_entry(&self, entry: &ManifestEntry) -> Result<FileVerifyRecord, EngineError> {
        let path = self.job.target_dir.join(&entry.relative_path);
        let mut record = FileVerifyRecord {
            relative_path: entry.relative_path.clone(),
            path: path.clone(),
            expected_hash: entry.expected_hash.clone(),
            algorithm: entry.algorithm,
            status: VerifyStatus::Missing,
            actual_hash: None,
        };

        if !path.is_file() {
            return Ok(record);
        }

        let actual = compute_file_checksum(&path, entry.algorithm, self.chunk_size, Some(&self.control))?;
        record.status = if actual.matches_hex(&entry.expected_hash) {
            VerifyStatus::Verified
        } else {
            warn!(
                path = %path.display(),
                expected = %entry.expected_hash,
                actual = actual.hex(),
                "Manifest checksum mismatch"
            );
            VerifyStatus::Failed
        };
        record.actual_hash = Some(actual.hex().to_string());
        Ok(record)
    }
}

/// Status label for a finished verify job.
pub fn verify_status_label(status: JobStatus) -> String {
    match status {
        JobStatus::CompletedWithErrors => "Completed with issues".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksums::{checksum_bytes, ChecksumAlgorithm};
    use crate::progress::NoProgress;
    use std::fs;
    use std::path::PathBuf;

    fn entry(path: &str, data: &[u8], algorithm: ChecksumAlgorithm) -> ManifestEntry {
        ManifestEntry {
            relative_path: PathBuf::from(path),
            expected_hash: checksum_bytes(algorithm, data).hex().to_string(),
            algorithm,
            size: data.len() as u64,
        }
    }

    #[test]
    fn test_all_verified() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        fs::create_dir_all(temp_dir.path().join("CLIPS")).unwrap();
        fs::write(temp_dir.path().join("CLIPS/a.mov"), b"alpha").unwrap();
        fs::write(temp_dir.path().join("b.wav"), b"bravo").unwrap();

        let job = VerifyJob::new(
            temp_dir.path().join("manifest.txt"),
            temp_dir.path(),
            vec![
                entry("CLIPS/a.mov", b"alpha", ChecksumAlgorithm::XxHash64),
                entry("b.wav", b"bravo", ChecksumAlgorithm::Md5),
            ],
        );
        let job = VerificationEngine::new(job, JobControl::new()).run(&NoProgress);

        assert_eq!(job.status(), JobStatus::Completed);
        let report = job.report().unwrap();
        assert_eq!(report.verified_count, 2);
        assert!(!report.has_issues());
    }

    #[test]
    fn test_missing_and_mismatch_are_counted() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        fs::write(temp_dir.path().join("a.mov"), b"alpha").unwrap();
        fs::write(temp_dir.path().join("c.mov"), b"tampered").unwrap();

        let job = VerifyJob::new(
            temp_dir.path().join("manifest.txt"),
            temp_dir.path(),
            vec![
                entry("a.mov", b"alpha", ChecksumAlgorithm::XxHash64),
                entry("b.mov", b"bravo", ChecksumAlgorithm::XxHash64),
                entry("c.mov", b"charlie", ChecksumAlgorithm::XxHash64),
            ],
        );
        let job = VerificationEngine::new(job, JobControl::new()).run(&NoProgress);

        assert_eq!(job.status(), JobStatus::CompletedWithErrors);
        assert_eq!(verify_status_label(job.status()), "Completed with issues");
        let report = job.report().unwrap();
        let statuses: Vec<_> = report.files.iter().map(|f| f.status).collect();
        assert_eq!(
            statuses,
            vec![VerifyStatus::Verified, VerifyStatus::Missing, VerifyStatus::Failed]
        );
        assert_eq!((report.verified_count, report.missing_count, report.failed_count), (1, 1, 1));
        assert!(report.files[1].actual_hash.is_none());
        assert!(report.files[2].actual_hash.is_some());
    }

    #[test]
    fn test_uppercase_manifest_hash_matches() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        fs::write(temp_dir.path().join("a.mov"), b"alpha").unwrap();
        let mut e = entry("a.mov", b"alpha", ChecksumAlgorithm::Md5);
        e.expected_hash = e.expected_hash.to_uppercase();

        let job = VerifyJob::new("m.txt", temp_dir.path(), vec![e]);
        let job = VerificationEngine::new(job, JobControl::new()).run(&NoProgress);
        assert_eq!(job.report().unwrap().verified_count, 1);
    }

    #[test]
    fn test_directory_in_place_of_file_is_missing() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        fs::create_dir(temp_dir.path().join("a.mov")).unwrap();

        let job = VerifyJob::new("m.txt", temp_dir.path(), vec![entry("a.mov", b"alpha", ChecksumAlgorithm::Md5)]);
        let job = VerificationEngine::new(job, JobControl::new()).run(&NoProgress);
        assert_eq!(job.report().unwrap().files[0].status, VerifyStatus::Missing);
    }

    #[test]
    fn test_empty_manifest_completes() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let job = VerifyJob::new("m.txt", temp_dir.path(), Vec::new());
        let job = VerificationEngine::new(job, JobControl::new()).run(&NoProgress);
        assert_eq!(job.status(), JobStatus::Completed);
        assert!(job.report().unwrap().files.is_empty());
    }

    #[test]
    fn test_cancel_stops_verification() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        fs::write(temp_dir.path().join("a.mov"), b"alpha").unwrap();
        let control = JobControl::new();
        control.cancel();

        let job = VerifyJob::new("m.txt", temp_dir.path(), vec![entry("a.mov", b"alpha", ChecksumAlgorithm::Md5)]);
        let job = VerificationEngine::new(job, control).run(&NoProgress);
        assert_eq!(job.status(), JobStatus::Cancelled);
        assert!(job.report().unwrap().files.is_empty());
    }
}
