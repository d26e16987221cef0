//! Job queue.
//!
//! The scheduler is an actor: one thread owns the queue, the active engines
//! and all aggregate progress state. Callers talk to it through a cloneable
//! [`SchedulerHandle`] that sends commands over a channel; engines running
//! on their own threads report back through [`EngineEvent`] messages; the
//! outside world listens on a [`QueueEvent`] channel.
//!
//! Queue states: `Idle -> Running -> (Paused <-> Running) -> Idle`, plus
//! `Cancelled`, which lasts until in-flight engines have wound down.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::{bounded, never, select, unbounded, Receiver, Sender};
use tracing::{debug, info, warn};

use crate::aggregator::ProgressAggregator;
use crate::config::Settings;
use crate::control::JobControl;
use crate::error::{EngineError, Result};
use crate::job::{run_job, Job, JobKind};
use crate::model::{FilePatch, JobId, JobStatus, TransferJob};
use crate::progress::{percent_of, ChannelProgress, EngineEvent, FileProgress, JobProgress};

/// Turns a finished copy job into per-file annotations (thumbnails, clip
/// metadata and the like). Runs on the scheduler's post-processing thread,
/// one job at a time.
pub trait PostProcessor: Send {
    fn process(&mut self, job: &TransferJob) -> Vec<FilePatch>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    Idle,
    Running,
    Paused,
    Cancelled,
}

impl fmt::Display for QueueState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueState::Idle => write!(f, "Idle"),
            QueueState::Running => write!(f, "Running"),
            QueueState::Paused => write!(f, "Paused"),
            QueueState::Cancelled => write!(f, "Cancelled"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostProcessState {
    Queued,
    Running,
    Processed,
}

impl fmt::Display for PostProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PostProcessState::Queued => write!(f, "Queued for post-processing"),
            PostProcessState::Running => write!(f, "Post-processing"),
            PostProcessState::Processed => write!(f, "Processed"),
        }
    }
}

/// Queue-level progress across every copy job of the current run.
#[derive(Debug, Clone, PartialEq)]
pub struct OverallProgress {
    pub percent: u8,
    pub text: String,
    /// Bytes per second over the rolling window
    pub speed: f64,
    pub eta_secs: Option<f64>,
}

/// Everything the scheduler tells its listener.
#[derive(Debug)]
pub enum QueueEvent {
    Started { total_bytes: u64, jobs: usize },
    Paused,
    Resumed,
    Cancelled,
    Completed { with_errors: bool },
    JobQueued { job_id: JobId },
    JobStarted { job_id: JobId, kind: JobKind },
    JobProgress(JobProgress),
    FileProgress(FileProgress),
    Overall(OverallProgress),
    JobError { job_id: JobId, message: String },
    JobFinished(Box<Job>),
    EjectionRequested(Vec<PathBuf>),
    PostProcessStatus {
        job_id: JobId,
        state: PostProcessState,
        message: String,
    },
}

/// One row of a [`JobsSnapshot`].
#[derive(Debug, Clone, PartialEq)]
pub struct JobSummary {
    pub id: JobId,
    pub kind: JobKind,
    pub status: JobStatus,
    /// Display form of the status
    pub label: String,
    pub queue_bytes: u64,
    pub post_process: Option<PostProcessState>,
}

impl JobSummary {
    fn of(job: &Job) -> Self {
        JobSummary {
            id: job.id(),
            kind: job.kind(),
            status: job.status(),
            label: job.status_label(),
            queue_bytes: job.queue_bytes(),
            post_process: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobsSnapshot {
    pub pending: Vec<JobSummary>,
    pub active: Vec<JobSummary>,
    pub completed: Vec<JobSummary>,
}

impl JobsSnapshot {
    /// All jobs in display order: pending, then active, then completed.
    pub fn all(&self) -> impl Iterator<Item = &JobSummary> {
        self.pending.iter().chain(&self.active).chain(&self.completed)
    }
}

enum Command {
    Enqueue(Box<Job>),
    Start(Sender<Result<()>>),
    Pause,
    Resume,
    Cancel,
    SetMaxConcurrent(usize),
    RemoveQueued(JobId, Sender<Result<()>>),
    ClearCompleted,
    Jobs(Sender<JobsSnapshot>),
    State(Sender<QueueState>),
    CompletedJob(JobId, Sender<Option<Job>>),
    PatchFileRecord(JobId, FilePatch, Sender<Result<()>>),
    RunPostProcess(JobId, Sender<Result<()>>),
    Shutdown,
}

enum PostProcessMessage {
    Started(JobId),
    Finished { job_id: JobId, patches: Vec<FilePatch> },
}

/// Cloneable handle for talking to the scheduler thread.
#[derive(Clone)]
pub struct SchedulerHandle {
    commands: Sender<Command>,
}

impl SchedulerHandle {
    fn send(&self, command: Command) -> Result<()> {
        self.commands.send(command).map_err(|_| EngineError::SchedulerClosed)
    }

    fn request<T>(&self, make: impl FnOnce(Sender<T>) -> Command) -> Result<T> {
        let (reply, response) = bounded(1);
        self.send(make(reply))?;
        response.recv().map_err(|_| EngineError::SchedulerClosed)
    }

    /// Append a job. While the queue runs it starts as soon as a slot is free.
    pub fn enqueue(&self, job: impl Into<Job>) -> Result<()> {
        self.send(Command::Enqueue(Box::new(job.into())))
    }

    /// Pre-flight check every queued copy job, then start pulling jobs.
    ///
    /// # Errors
    /// `PreflightFailed` with every missing path; `InvalidState` when the
    /// queue is already running or empty.
    pub fn start(&self) -> Result<()> {
        self.request(Command::Start)?
    }

    pub fn pause(&self) -> Result<()> {
        self.send(Command::Pause)
    }

    pub fn resume(&self) -> Result<()> {
        self.send(Command::Resume)
    }

    /// Cancel every active job and drop everything still queued.
    pub fn cancel(&self) -> Result<()> {
        self.send(Command::Cancel)
    }

    pub fn set_max_concurrent_jobs(&self, count: usize) -> Result<()> {
        self.send(Command::SetMaxConcurrent(count))
    }

    /// Remove a pending job. Refused while the queue is running.
    pub fn remove_queued(&self, job_id: JobId) -> Result<()> {
        self.request(|reply| Command::RemoveQueued(job_id, reply))?
    }

    pub fn clear_completed(&self) -> Result<()> {
        self.send(Command::ClearCompleted)
    }

    pub fn jobs(&self) -> Result<JobsSnapshot> {
        self.request(Command::Jobs)
    }

    pub fn state(&self) -> Result<QueueState> {
        self.request(Command::State)
    }

    /// A copy of a finished job, report included.
    pub fn completed_job(&self, job_id: JobId) -> Result<Option<Job>> {
        self.request(|reply| Command::CompletedJob(job_id, reply))
    }

    /// Merge annotations into the record for `patch.source_path` of a
    /// completed copy job.
    pub fn patch_file_record(&self, job_id: JobId, patch: FilePatch) -> Result<()> {
        self.request(|reply| Command::PatchFileRecord(job_id, patch, reply))?
    }

    /// Queue a completed copy job for post-processing.
    pub fn run_post_process(&self, job_id: JobId) -> Result<()> {
        self.request(|reply| Command::RunPostProcess(job_id, reply))?
    }
}

/// Owner of the scheduler thread and the event stream.
pub struct JobScheduler {
    handle: SchedulerHandle,
    events: Receiver<QueueEvent>,
    thread: Option<JoinHandle<()>>,
}

impl JobScheduler {
    pub fn spawn(settings: Settings) -> Result<Self> {
        Self::spawn_inner(settings, None)
    }

    pub fn spawn_with_post_processor(settings: Settings, processor: Box<dyn PostProcessor>) -> Result<Self> {
        Self::spawn_inner(settings, Some(processor))
    }

    fn spawn_inner(settings: Settings, processor: Option<Box<dyn PostProcessor>>) -> Result<Self> {
        settings.validate()?;

        let (command_tx, command_rx) = unbounded();
        let (event_tx, event_rx) = unbounded();
        let (engine_tx, engine_rx) = unbounded();

        let (post_process, post_process_rx) = match processor {
            Some(processor) => {
                let (jobs_tx, jobs_rx) = unbounded();
                let (done_tx, done_rx) = unbounded();
                let thread = spawn_post_processor(processor, jobs_rx, done_tx)?;
                (Some(PostProcessWorker { jobs: jobs_tx, thread }), done_rx)
            }
            None => (None, never()),
        };

        let actor = Scheduler {
            max_concurrent: settings.max_concurrent_jobs,
            settings,
            state: QueueState::Idle,
            pending: VecDeque::new(),
            active: Vec::new(),
            completed: Vec::new(),
            events: event_tx,
            engine_tx,
            post_process,
            queue: QueueProgress::default(),
            paused_at: None,
            cancelled_in_flight: HashSet::new(),
        };

        let thread = thread::Builder::new()
            .name("offload-scheduler".to_string())
            .spawn(move || actor.run(command_rx, engine_rx, post_process_rx))
            .map_err(EngineError::ThreadSpawn)?;

        Ok(JobScheduler {
            handle: SchedulerHandle { commands: command_tx },
            events: event_rx,
            thread: Some(thread),
        })
    }

    pub fn handle(&self) -> SchedulerHandle {
        self.handle.clone()
    }

    pub fn events(&self) -> &Receiver<QueueEvent> {
        &self.events
    }

    /// Cancel whatever is running, wait for every worker thread and stop.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = self.handle.send(Command::Shutdown);
            let _ = thread.join();
        }
    }
}

impl Drop for JobScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn spawn_post_processor(
    mut processor: Box<dyn PostProcessor>,
    jobs: Receiver<TransferJob>,
    done: Sender<PostProcessMessage>,
) -> Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("offload-postprocess".to_string())
        .spawn(move || {
            for job in jobs.iter() {
                let _ = done.send(PostProcessMessage::Started(job.id));
                let patches = match panic::catch_unwind(AssertUnwindSafe(|| processor.process(&job))) {
                    Ok(patches) => patches,
                    Err(_) => {
                        warn!(job_id = %job.id, "Post-processor panicked; no annotations applied");
                        Vec::new()
                    }
                };
                let _ = done.send(PostProcessMessage::Finished {
                    job_id: job.id,
                    patches,
                });
            }
        })
        .map_err(EngineError::ThreadSpawn)
}

struct PostProcessWorker {
    jobs: Sender<TransferJob>,
    thread: JoinHandle<()>,
}

struct ActiveJob {
    summary: JobSummary,
    control: JobControl,
    /// Rolling window over this job's processed units
    aggregator: ProgressAggregator,
    thread: Option<JoinHandle<()>>,
}

struct CompletedJob {
    job: Job,
    post_process: Option<PostProcessState>,
}

/// Byte accounting for the current run.
#[derive(Default)]
struct QueueProgress {
    total_bytes: u64,
    processed_bytes: u64,
    /// Last processed count reported by each active copy job
    per_job: HashMap<JobId, u64>,
    aggregator: ProgressAggregator,
    had_errors: bool,
}

struct Scheduler {
    settings: Settings,
    max_concurrent: usize,
    state: QueueState,
    pending: VecDeque<Job>,
    active: Vec<ActiveJob>,
    completed: Vec<CompletedJob>,
    events: Sender<QueueEvent>,
    engine_tx: Sender<EngineEvent>,
    post_process: Option<PostProcessWorker>,
    queue: QueueProgress,
    paused_at: Option<Instant>,
    /// Jobs that were in flight when the queue was cancelled
    cancelled_in_flight: HashSet<JobId>,
}

impl Scheduler {
    fn run(
        mut self,
        commands: Receiver<Command>,
        engine_events: Receiver<EngineEvent>,
        post_process_events: Receiver<PostProcessMessage>,
    ) {
        debug!("Scheduler started");
        let mut running = true;
        while running {
            select! {
                recv(commands) -> msg => match msg {
                    Ok(Command::Shutdown) | Err(_) => running = false,
                    Ok(command) => self.handle_command(command),
                },
                recv(engine_events) -> msg => {
                    if let Ok(event) = msg {
                        self.handle_engine_event(event);
                    }
                }
                recv(post_process_events) -> msg => {
                    if let Ok(message) = msg {
                        self.handle_post_process(message);
                    }
                }
            }
        }
        self.shutdown();
    }

    fn emit(&self, event: QueueEvent) {
        let _ = self.events.send(event);
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Enqueue(job) => self.enqueue(*job),
            Command::Start(reply) => {
                let _ = reply.send(self.start());
            }
            Command::Pause => self.pause(),
            Command::Resume => self.resume(),
            Command::Cancel => self.cancel(),
            Command::SetMaxConcurrent(count) => {
                self.max_concurrent = count.max(1);
                info!(max_concurrent = self.max_concurrent, "Concurrency limit changed");
                self.fill_slots();
            }
            Command::RemoveQueued(job_id, reply) => {
                let _ = reply.send(self.remove_queued(job_id));
            }
            Command::ClearCompleted => self.completed.clear(),
            Command::Jobs(reply) => {
                let _ = reply.send(self.snapshot());
            }
            Command::State(reply) => {
                let _ = reply.send(self.state);
            }
            Command::CompletedJob(job_id, reply) => {
                let job = self.completed.iter().find(|c| c.job.id() == job_id).map(|c| c.job.clone());
                let _ = reply.send(job);
            }
            Command::PatchFileRecord(job_id, patch, reply) => {
                let _ = reply.send(self.patch_file_record(job_id, patch));
            }
            Command::RunPostProcess(job_id, reply) => {
                let _ = reply.send(self.queue_post_process(job_id));
            }
            Command::Shutdown => {}
        }
    }

    fn is_running(&self) -> bool {
        matches!(self.state, QueueState::Running | QueueState::Paused)
    }

    fn enqueue(&mut self, mut job: Job) {
        let job_id = job.id();
        job.set_status(JobStatus::Queued);
        if self.is_running() {
            self.queue.total_bytes += job.queue_bytes();
        }
        debug!(%job_id, kind = %job.kind(), "Job queued");
        self.pending.push_back(job);
        self.emit(QueueEvent::JobQueued { job_id });
        self.fill_slots();
    }

    fn start(&mut self) -> Result<()> {
        if self.state != QueueState::Idle {
            return Err(EngineError::InvalidState(format!("queue is {}", self.state)));
        }
        if self.pending.is_empty() {
            return Err(EngineError::InvalidState("queue is empty".to_string()));
        }

        let mut seen = HashSet::new();
        let missing: Vec<PathBuf> = self
            .pending
            .iter()
            .flat_map(Job::referenced_paths)
            .filter(|path| !path.exists())
            .filter(|path| seen.insert(path.clone()))
            .collect();
        if !missing.is_empty() {
            warn!(missing = missing.len(), "Pre-flight check failed");
            for path in &missing {
                debug!(path = %path.display(), "Missing path");
            }
            return Err(EngineError::PreflightFailed { missing });
        }

        self.queue = QueueProgress {
            total_bytes: self.pending.iter().map(Job::queue_bytes).sum(),
            ..QueueProgress::default()
        };
        self.cancelled_in_flight.clear();
        self.queue.aggregator.record(0);
        self.state = QueueState::Running;
        info!(
            jobs = self.pending.len(),
            total_bytes = self.queue.total_bytes,
            "Queue started"
        );
        self.emit(QueueEvent::Started {
            total_bytes: self.queue.total_bytes,
            jobs: self.pending.len(),
        });
        self.fill_slots();
        Ok(())
    }

    fn pause(&mut self) {
        if self.state != QueueState::Running {
            debug!(state = %self.state, "Pause ignored");
            return;
        }
        for active in &mut self.active {
            active.control.pause();
            active.summary.status = JobStatus::Paused;
        }
        self.state = QueueState::Paused;
        self.paused_at = Some(Instant::now());
        info!("Queue paused");
        self.emit(QueueEvent::Paused);
    }

    fn resume(&mut self) {
        if self.state != QueueState::Paused {
            debug!(state = %self.state, "Resume ignored");
            return;
        }
        let paused_for = self.paused_at.take().map(|at| at.elapsed()).unwrap_or_default();
        self.queue.aggregator.shift(paused_for);
        for active in &mut self.active {
            active.aggregator.shift(paused_for);
            active.summary.status = JobStatus::Running;
            active.control.resume();
        }
        self.state = QueueState::Running;
        info!(paused_secs = paused_for.as_secs_f64(), "Queue resumed");
        self.emit(QueueEvent::Resumed);
        self.fill_slots();
    }

    fn cancel(&mut self) {
        if !self.is_running() {
            debug!(state = %self.state, "Cancel ignored");
            return;
        }
        for active in &self.active {
            active.control.cancel();
            self.cancelled_in_flight.insert(active.summary.id);
        }
        let dropped = self.pending.len();
        while let Some(mut job) = self.pending.pop_front() {
            job.set_status(JobStatus::Cancelled);
            self.completed.push(CompletedJob {
                job,
                post_process: None,
            });
        }
        self.paused_at = None;
        self.state = QueueState::Cancelled;
        info!(active = self.active.len(), dropped, "Queue cancelled");
        self.emit(QueueEvent::Cancelled);
        self.check_drained();
    }

    fn remove_queued(&mut self, job_id: JobId) -> Result<()> {
        if self.state != QueueState::Idle {
            return Err(EngineError::InvalidState(format!(
                "cannot remove jobs while the queue is {}",
                self.state
            )));
        }
        let index = self
            .pending
            .iter()
            .position(|job| job.id() == job_id)
            .ok_or_else(|| EngineError::InvalidState(format!("job {} is not queued", job_id)))?;
        self.pending.remove(index);
        Ok(())
    }

    fn snapshot(&self) -> JobsSnapshot {
        JobsSnapshot {
            pending: self.pending.iter().map(JobSummary::of).collect(),
            active: self.active.iter().map(|a| a.summary.clone()).collect(),
            completed: self
                .completed
                .iter()
                .map(|c| JobSummary {
                    post_process: c.post_process,
                    ..JobSummary::of(&c.job)
                })
                .collect(),
        }
    }

    /// Pull jobs FIFO while there is a free slot.
    fn fill_slots(&mut self) {
        while self.state == QueueState::Running && self.active.len() < self.max_concurrent {
            let Some(job) = self.pending.pop_front() else {
                break;
            };
            self.launch(job);
        }
    }

    fn launch(&mut self, mut job: Job) {
        let job_id = job.id();
        let kind = job.kind();
        job.set_status(JobStatus::Running);

        let control = self.settings.new_control();
        let summary = JobSummary::of(&job);
        let fallback = job.clone();

        let engine_control = control.clone();
        let tx = self.engine_tx.clone();
        let spawned = thread::Builder::new()
            .name(format!("offload-job-{}", job_id))
            .spawn(move || {
                let progress = ChannelProgress::new(tx.clone());
                let finished = run_job(job, engine_control, &progress);
                let _ = tx.send(EngineEvent::Finished(Box::new(finished)));
            });

        match spawned {
            Ok(thread) => {
                info!(%job_id, %kind, "Job started");
                if kind == JobKind::Copy {
                    self.queue.per_job.insert(job_id, 0);
                }
                self.active.push(ActiveJob {
                    summary,
                    control,
                    aggregator: ProgressAggregator::default(),
                    thread: Some(thread),
                });
                self.emit(QueueEvent::JobStarted { job_id, kind });
            }
            Err(e) => {
                let message = format!("critical error: {}", EngineError::ThreadSpawn(e));
                warn!(%job_id, "{}", message);
                let failed = fallback.into_critical_failure(message);
                self.finish_job(failed);
                self.check_drained();
            }
        }
    }

    fn handle_engine_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Started { job_id, total } => {
                debug!(%job_id, total, "Engine reported start");
            }
            EngineEvent::File(update) => self.emit(QueueEvent::FileProgress(update)),
            EngineEvent::Job(update) => self.job_progress(update),
            EngineEvent::Error { job_id, message } => {
                self.emit(QueueEvent::JobError { job_id, message });
            }
            EngineEvent::Finished(job) => {
                let job_id = job.id();
                if let Some(index) = self.active.iter().position(|a| a.summary.id == job_id) {
                    let mut active = self.active.remove(index);
                    if let Some(thread) = active.thread.take() {
                        let _ = thread.join();
                    }
                }
                self.finish_job(*job);
                self.fill_slots();
                self.check_drained();
            }
        }
    }

    fn job_progress(&mut self, mut update: JobProgress) {
        let job_id = update.job_id;
        let Some(active) = self.active.iter_mut().find(|a| a.summary.id == job_id) else {
            return;
        };

        active.aggregator.record(update.processed);
        let speed = active.aggregator.speed();
        if speed > 0.0 {
            update.speed = speed;
            update.eta_secs = active.aggregator.eta_secs(update.total, update.processed);
        }
        let kind = active.summary.kind;
        let active_count = self.active.len();
        let copying = self.active.iter().any(|a| a.summary.kind == JobKind::Copy);
        self.emit(QueueEvent::JobProgress(update.clone()));

        let overall = match kind {
            JobKind::Copy => {
                let last = self.queue.per_job.entry(job_id).or_insert(0);
                let delta = update.processed.saturating_sub(*last);
                *last = update.processed.max(*last);
                self.queue.processed_bytes += delta;
                self.queue.aggregator.record(self.queue.processed_bytes);

                OverallProgress {
                    percent: percent_of(self.queue.processed_bytes, self.queue.total_bytes),
                    text: format!("Processing queue... ({} active jobs)", active_count),
                    speed: self.queue.aggregator.speed(),
                    eta_secs: self
                        .queue
                        .aggregator
                        .eta_secs(self.queue.total_bytes, self.queue.processed_bytes),
                }
            }
            // Byte-based copy progress owns the overall bar while it runs
            JobKind::Verify if copying => return,
            JobKind::Verify => OverallProgress {
                percent: update.percent(),
                text: format!("Verifying manifest: {} of {} files", update.processed, update.total),
                speed: 0.0,
                eta_secs: update.eta_secs,
            },
        };
        self.emit(QueueEvent::Overall(overall));
    }

    /// Record a terminal job: reconcile byte totals, file it under
    /// completed, and hand it on for ejection and post-processing.
    fn finish_job(&mut self, mut job: Job) {
        let job_id = job.id();
        if self.cancelled_in_flight.remove(&job_id) && job.status() != JobStatus::Cancelled {
            // Finished past its last checkpoint after the cancel went out
            debug!(%job_id, status = %job.status_label(), "Late finish of a cancelled job");
            job.mark_cancelled();
        }
        let status = job.status();
        info!(%job_id, status = %job.status_label(), "Job finished");

        let reported = self.queue.per_job.remove(&job_id).unwrap_or(0);
        if job.kind() == JobKind::Copy && status != JobStatus::Cancelled {
            self.queue.processed_bytes += job.queue_bytes().saturating_sub(reported);
        }
        if status == JobStatus::CompletedWithErrors {
            self.queue.had_errors = true;
        }

        let ejectable = job
            .as_copy()
            .and_then(TransferJob::report)
            .filter(|_| status != JobStatus::Cancelled)
            .map(|r| r.ejectable_sources.clone())
            .unwrap_or_default();

        let auto_post_process = job.kind() == JobKind::Copy
            && status == JobStatus::Completed
            && !self.settings.defer_post_process
            && self.post_process.is_some();

        self.completed.push(CompletedJob {
            job: job.clone(),
            post_process: None,
        });
        self.emit(QueueEvent::JobFinished(Box::new(job)));

        if !ejectable.is_empty() {
            info!(%job_id, sources = ejectable.len(), "Sources ready to eject");
            self.emit(QueueEvent::EjectionRequested(ejectable));
        }
        if auto_post_process {
            if let Err(e) = self.queue_post_process(job_id) {
                warn!(%job_id, error = %e, "Could not queue post-processing");
            }
        }
    }

    /// Leave Running/Paused or Cancelled once nothing is left to do.
    fn check_drained(&mut self) {
        if !self.active.is_empty() {
            return;
        }
        match self.state {
            QueueState::Running | QueueState::Paused if self.pending.is_empty() => {
                let with_errors = self.queue.had_errors;
                self.state = QueueState::Idle;
                self.paused_at = None;
                info!(with_errors, "Queue completed");
                let text = if with_errors {
                    "Queue completed with errors"
                } else {
                    "Queue completed"
                };
                self.emit(QueueEvent::Overall(OverallProgress {
                    percent: 100,
                    text: text.to_string(),
                    speed: 0.0,
                    eta_secs: Some(0.0),
                }));
                self.emit(QueueEvent::Completed { with_errors });
            }
            QueueState::Cancelled => {
                self.state = QueueState::Idle;
                debug!("Cancelled queue wound down");
            }
            _ => {}
        }
    }

    fn patch_file_record(&mut self, job_id: JobId, patch: FilePatch) -> Result<()> {
        let report = self
            .completed
            .iter_mut()
            .find(|c| c.job.id() == job_id)
            .and_then(|c| c.job.as_copy_mut())
            .and_then(|job| job.report.as_mut())
            .ok_or_else(|| EngineError::InvalidState(format!("no completed copy job {}", job_id)))?;

        let source = patch.source_path.clone();
        if report.patch_file(patch) {
            Ok(())
        } else {
            Err(EngineError::InvalidState(format!(
                "job {} has no record for {}",
                job_id,
                source.display()
            )))
        }
    }

    fn queue_post_process(&mut self, job_id: JobId) -> Result<()> {
        let Some(worker) = &self.post_process else {
            return Err(EngineError::InvalidState("no post-processor configured".to_string()));
        };
        let entry = self
            .completed
            .iter_mut()
            .find(|c| c.job.id() == job_id)
            .ok_or_else(|| EngineError::InvalidState(format!("no completed job {}", job_id)))?;
        if matches!(
            entry.post_process,
            Some(PostProcessState::Queued | PostProcessState::Running)
        ) {
            return Err(EngineError::InvalidState(format!(
                "job {} is already being post-processed",
                job_id
            )));
        }
        let Some(job) = entry.job.as_copy() else {
            return Err(EngineError::InvalidState(format!("job {} is not a copy job", job_id)));
        };
        if job.report().is_none() {
            return Err(EngineError::InvalidState(format!("job {} has no report", job_id)));
        }

        worker
            .jobs
            .send(job.clone())
            .map_err(|_| EngineError::InvalidState("post-processing thread has stopped".to_string()))?;
        entry.post_process = Some(PostProcessState::Queued);
        self.emit(QueueEvent::PostProcessStatus {
            job_id,
            state: PostProcessState::Queued,
            message: "Queued for post-processing".to_string(),
        });
        Ok(())
    }

    fn handle_post_process(&mut self, message: PostProcessMessage) {
        match message {
            PostProcessMessage::Started(job_id) => {
                self.set_post_process_state(job_id, PostProcessState::Running);
                self.emit(QueueEvent::PostProcessStatus {
                    job_id,
                    state: PostProcessState::Running,
                    message: format!("Post-processing job {}", job_id),
                });
            }
            PostProcessMessage::Finished { job_id, patches } => {
                let count = patches.len();
                for patch in patches {
                    if let Err(e) = self.patch_file_record(job_id, patch) {
                        warn!(%job_id, error = %e, "Post-processing patch not applied");
                    }
                }
                self.set_post_process_state(job_id, PostProcessState::Processed);
                info!(%job_id, patches = count, "Post-processing finished");
                self.emit(QueueEvent::PostProcessStatus {
                    job_id,
                    state: PostProcessState::Processed,
                    message: String::new(),
                });
            }
        }
    }

    fn set_post_process_state(&mut self, job_id: JobId, state: PostProcessState) {
        if let Some(entry) = self.completed.iter_mut().find(|c| c.job.id() == job_id) {
            entry.post_process = Some(state);
        }
    }

    fn shutdown(mut self) {
        for active in &self.active {
            active.control.cancel();
        }
        for active in &mut self.active {
            if let Some(thread) = active.thread.take() {
                let _ = thread.join();
            }
        }
        if let Some(worker) = self.post_process.take() {
            drop(worker.jobs);
            let _ = worker.thread.join();
        }
        debug!("Scheduler stopped");
    }
}
