//! Job orchestration module.
//!
//! This module provides:
//! - [`Job`], the unit the scheduler queues: a copy job or a verify job
//! - [`Engine`], the capability both engines share
//! - [`run_job`], which runs a job to a terminal state on the calling thread
//!   and turns a panic inside the engine into a failed record

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::control::JobControl;
use crate::model::{JobId, JobStatus, TransferJob, TransferReport, VerifyJob, VerifyReport};
use crate::progress::ProgressCallback;
use crate::transfer::TransferEngine;
use crate::verify::{verify_status_label, VerificationEngine};

/// An engine bound to one job.
///
/// `run` consumes the engine and returns the job in a terminal state.
/// Pause/resume/cancel act on the job's [`JobControl`], so a clone of the
/// control taken before `run` steers the engine from another thread.
pub trait Engine: Send {
    fn job_id(&self) -> JobId;

    fn control(&self) -> &JobControl;

    fn run(self: Box<Self>, progress: &dyn ProgressCallback) -> Job;

    fn pause(&self) {
        self.control().pause();
    }

    fn resume(&self) {
        self.control().resume();
    }

    fn cancel(&self) {
        self.control().cancel();
    }
}

impl Engine for TransferEngine {
    fn job_id(&self) -> JobId {
        TransferEngine::job_id(self)
    }

    fn control(&self) -> &JobControl {
        TransferEngine::control(self)
    }

    fn run(self: Box<Self>, progress: &dyn ProgressCallback) -> Job {
        Job::Copy(TransferEngine::run(*self, progress))
    }
}

impl Engine for VerificationEngine {
    fn job_id(&self) -> JobId {
        VerificationEngine::job_id(self)
    }

    fn control(&self) -> &JobControl {
        VerificationEngine::control(self)
    }

    fn run(self: Box<Self>, progress: &dyn ProgressCallback) -> Job {
        Job::Verify(VerificationEngine::run(*self, progress))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobKind {
    Copy,
    Verify,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobKind::Copy => write!(f, "copy"),
            JobKind::Verify => write!(f, "verify"),
        }
    }
}

/// A queued, running or finished job of either kind.
#[derive(Debug, Clone)]
pub enum Job {
    Copy(TransferJob),
    Verify(VerifyJob),
}

impl From<TransferJob> for Job {
    fn from(job: TransferJob) -> Self {
        Job::Copy(job)
    }
}

impl From<VerifyJob> for Job {
    fn from(job: VerifyJob) -> Self {
        Job::Verify(job)
    }
}

impl Job {
    pub fn id(&self) -> JobId {
        match self {
            Job::Copy(job) => job.id,
            Job::Verify(job) => job.id,
        }
    }

    pub fn kind(&self) -> JobKind {
        match self {
            Job::Copy(_) => JobKind::Copy,
            Job::Verify(_) => JobKind::Verify,
        }
    }

    pub fn status(&self) -> JobStatus {
        match self {
            Job::Copy(job) => job.status,
            Job::Verify(job) => job.status,
        }
    }

    pub(crate) fn set_status(&mut self, status: JobStatus) {
        match self {
            Job::Copy(job) => job.status = status,
            Job::Verify(job) => job.status = status,
        }
    }

    /// Status as shown to users. Verify jobs with failures read
    /// "Completed with issues".
    pub fn status_label(&self) -> String {
        match self {
            Job::Copy(job) => job.status.to_string(),
            Job::Verify(job) => verify_status_label(job.status),
        }
    }

    /// Bytes this job contributes to queue-level progress. Verify jobs
    /// report progress in entries and contribute nothing.
    pub fn queue_bytes(&self) -> u64 {
        match self {
            Job::Copy(job) => job.total_bytes(),
            Job::Verify(_) => 0,
        }
    }

    /// Paths that must exist before the job may start.
    pub fn referenced_paths(&self) -> Vec<PathBuf> {
        match self {
            Job::Copy(job) => job.referenced_paths().map(PathBuf::from).collect(),
            Job::Verify(_) => Vec::new(),
        }
    }

    pub fn as_copy(&self) -> Option<&TransferJob> {
        match self {
            Job::Copy(job) => Some(job),
            Job::Verify(_) => None,
        }
    }

    pub fn as_copy_mut(&mut self) -> Option<&mut TransferJob> {
        match self {
            Job::Copy(job) => Some(job),
            Job::Verify(_) => None,
        }
    }

    pub fn as_verify(&self) -> Option<&VerifyJob> {
        match self {
            Job::Verify(job) => Some(job),
            Job::Copy(_) => None,
        }
    }

    /// Per-file error messages of a finished job.
    pub fn errors(&self) -> &[String] {
        match self {
            Job::Copy(job) => job.report().map(|r| r.errors.as_slice()).unwrap_or(&[]),
            Job::Verify(job) => job.report().map(|r| r.errors.as_slice()).unwrap_or(&[]),
        }
    }

    /// Build the engine for this job.
    pub fn into_engine(self, control: JobControl) -> Box<dyn Engine> {
        match self {
            Job::Copy(job) => Box::new(TransferEngine::new(job, control)),
            Job::Verify(job) => Box::new(VerificationEngine::new(job, control)),
        }
    }

    /// Force a finished job to Cancelled, report included. A copy job
    /// loses its ejectable sources.
    pub(crate) fn mark_cancelled(&mut self) {
        self.set_status(JobStatus::Cancelled);
        match self {
            Job::Copy(job) => {
                if let Some(report) = job.report.as_mut() {
                    report.status = JobStatus::Cancelled;
                    report.ejectable_sources.clear();
                }
            }
            Job::Verify(job) => {
                if let Some(report) = job.report.as_mut() {
                    report.status = JobStatus::Cancelled;
                }
            }
        }
    }

    /// Terminal record for a job whose engine died, carrying `message` as
    /// its only error.
    pub(crate) fn into_critical_failure(mut self, message: String) -> Job {
        let now = Utc::now();
        let status = JobStatus::CompletedWithErrors;
        self.set_status(status);
        match &mut self {
            Job::Copy(job) => {
                job.report = Some(TransferReport {
                    job_id: job.id,
                    status,
                    started_at: now,
                    finished_at: now,
                    checksum_algorithm: job.options.checksum,
                    verification_mode: job.options.verification,
                    total_bytes: job.total_bytes(),
                    files: Vec::new(),
                    errors: vec![message],
                    ejectable_sources: Vec::new(),
                });
            }
            Job::Verify(job) => {
                job.report = Some(VerifyReport {
                    job_id: job.id,
                    status,
                    manifest_path: job.manifest_path.clone(),
                    target_dir: job.target_dir.clone(),
                    started_at: now,
                    finished_at: now,
                    files: Vec::new(),
                    errors: vec![message],
                    verified_count: 0,
                    failed_count: 0,
                    missing_count: 0,
                });
            }
        }
        self
    }
}

/// Run `job` to a terminal state on the current thread.
///
/// A panic inside the engine is caught here; the job comes back as
/// CompletedWithErrors with a "critical error" entry in its report.
pub fn run_job(job: Job, control: JobControl, progress: &dyn ProgressCallback) -> Job {
    let fallback = job.clone();
    let engine = job.into_engine(control);

    match panic::catch_unwind(AssertUnwindSafe(|| engine.run(progress))) {
        Ok(finished) => finished,
        Err(payload) => {
            let message = format!("critical error: {}", panic_message(payload.as_ref()));
            error!(job_id = %fallback.id(), "{}", message);
            progress.on_error(fallback.id(), &message);
            fallback.into_critical_failure(message)
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "engine panicked".to_string()
    }
}
