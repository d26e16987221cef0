//! Progress reporting.
//!
//! Engines report through the [`ProgressCallback`] trait, which keeps them
//! independent of whoever is listening (the scheduler, a CLI, a test).
//! [`ChannelProgress`] turns every callback into an [`EngineEvent`] message
//! so the scheduler can consume them on its own thread.

use std::path::PathBuf;
use std::time::Duration;

use crossbeam_channel::Sender;

use crate::job::Job;
use crate::model::JobId;

/// Job-level progress: cumulative processed units (bytes for copy jobs,
/// manifest entries for verify jobs).
#[derive(Debug, Clone, PartialEq)]
pub struct JobProgress {
    pub job_id: JobId,
    pub processed: u64,
    pub total: u64,
    /// Active (unpaused) time since the job started
    pub elapsed: Duration,
    /// Engine-local throughput, units per second
    pub speed: f64,
    /// Seconds remaining, `None` when unknown
    pub eta_secs: Option<f64>,
}

impl JobProgress {
    pub fn percent(&self) -> u8 {
        percent_of(self.processed, self.total)
    }
}

/// Progress within the file currently being handled.
#[derive(Debug, Clone, PartialEq)]
pub struct FileProgress {
    pub job_id: JobId,
    pub percent: u8,
    pub status_text: String,
    pub current_path: PathBuf,
    /// Bytes per second for the current file
    pub speed: f64,
}

/// Integer percentage, 100 for an empty total.
pub fn percent_of(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    ((done.min(total) as u128 * 100) / total as u128) as u8
}

/// Trait for receiving progress updates from an engine.
///
/// Methods are called synchronously from the engine's worker thread.
pub trait ProgressCallback: Send + Sync {
    /// Called once before the first file.
    fn on_job_started(&self, job_id: JobId, total: u64);

    /// Called as the current file advances.
    fn on_file_progress(&self, update: FileProgress);

    /// Called after every file.
    fn on_job_progress(&self, update: JobProgress);

    /// Called for every per-file failure.
    fn on_error(&self, job_id: JobId, message: &str);
}

/// Callback that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_job_started(&self, _job_id: JobId, _total: u64) {}
    fn on_file_progress(&self, _update: FileProgress) {}
    fn on_job_progress(&self, _update: JobProgress) {}
    fn on_error(&self, _job_id: JobId, _message: &str) {}
}

/// Messages from engine worker threads to the scheduler.
#[derive(Debug)]
pub enum EngineEvent {
    Started { job_id: JobId, total: u64 },
    File(FileProgress),
    Job(JobProgress),
    Error { job_id: JobId, message: String },
    Finished(Box<Job>),
}

/// A ProgressCallback implementation that forwards updates over a channel.
#[derive(Debug, Clone)]
pub struct ChannelProgress {
    sender: Sender<EngineEvent>,
}

impl ChannelProgress {
    pub fn new(sender: Sender<EngineEvent>) -> Self {
        ChannelProgress { sender }
    }
}

impl ProgressCallback for ChannelProgress {
    fn on_job_started(&self, job_id: JobId, total: u64) {
        let _ = self.sender.send(EngineEvent::Started { job_id, total });
    }

    fn on_file_progress(&self, update: FileProgress) {
        let _ = self.sender.send(EngineEvent::File(update));
    }

    fn on_job_progress(&self, update: JobProgress) {
        let _ = self.sender.send(EngineEvent::Job(update));
    }

    fn on_error(&self, job_id: JobId, message: &str) {
        let _ = self.sender.send(EngineEvent::Error {
            job_id,
            message: message.to_string(),
        });
    }
}
