//! # Offload Engine - Verified Media Offload Library
//!
//! A headless engine for offloading camera and audio media: every source
//! file is read once and fanned out to several destinations, hashed in the
//! same pass and verified on each destination. Designed as the foundation
//! for multiple front ends (CLI, GUI, automation).
//!
//! ## Overview
//!
//! - Single-pass copy to N destinations with xxHash64 or MD5
//! - Full, size-only or no verification per job
//! - Skip complete destinations, resume partial ones
//! - Verify-only jobs against an MHL or plain-text checksum manifest
//! - A job queue with bounded concurrency, pause/resume/cancel, pre-flight
//!   checks, rolling-window speed/ETA and post-processing hand-off
//! - Progress reporting via callbacks (decoupled from UI technology)
//!
//! ## Basic Usage
//!
//! ```no_run
//! use offload_engine::{
//!     FileItem, JobScheduler, QueueEvent, Settings, TransferJob, TransferOptions,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let job = TransferJob::new(
//!     vec!["/Volumes/A001".into()],
//!     vec!["/Volumes/RAID".into(), "/Volumes/SHUTTLE".into()],
//!     vec![FileItem::new(
//!         "/Volumes/A001/A001C001.mov",
//!         1024,
//!         vec![
//!             "/Volumes/RAID/A001C001.mov".into(),
//!             "/Volumes/SHUTTLE/A001C001.mov".into(),
//!         ],
//!     )],
//!     TransferOptions::default(),
//! );
//!
//! let scheduler = JobScheduler::spawn(Settings::default())?;
//! let handle = scheduler.handle();
//! handle.enqueue(job)?;
//! handle.start()?;
//!
//! for event in scheduler.events().iter() {
//!     if let QueueEvent::Completed { with_errors } = event {
//!         println!("Done, errors: {}", with_errors);
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - **model**: Jobs, options, statuses and reports
//! - **error**: Error types and handling
//! - **checksums**: xxHash64/MD5 streams and file checksums
//! - **control**: Pause/cancel flags and checkpoints
//! - **fs_ops**: Destination planning and the fan-out copy
//! - **transfer**: Copy engine
//! - **verify**: Verify-only engine
//! - **job**: Job variants and the engine trait
//! - **progress**: Progress callback trait and engine events
//! - **aggregator**: Rolling-window speed and ETA
//! - **scheduler**: Job queue
//! - **manifest**: Checksum manifests (ASC MHL v1 and plain text)
//! - **config**: Settings file

pub mod aggregator;
pub mod checksums;
pub mod config;
pub mod control;
pub mod error;
pub mod fs_ops;
pub mod job;
pub mod manifest;
pub mod model;
pub mod progress;
pub mod scheduler;
pub mod transfer;
pub mod verify;

// Re-export main types and functions
pub use aggregator::ProgressAggregator;
pub use checksums::{compute_file_checksum, ChecksumAlgorithm, ChecksumStream, ChecksumValue};
pub use config::Settings;
pub use control::{ActiveTimer, JobControl};
pub use error::{EngineError, Result};
pub use job::{run_job, Engine, Job, JobKind};
pub use model::{
    Annotations, DestinationOutcome, DestinationStatus, FileItem, FilePatch, FileStatus,
    FileTransferRecord, FileVerifyRecord, JobId, JobStatus, ManifestEntry, TransferJob,
    TransferOptions, TransferReport, VerificationMode, VerifyJob, VerifyReport, VerifyStatus,
    WriteAction,
};
pub use progress::{FileProgress, JobProgress, NoProgress, ProgressCallback};
pub use scheduler::{
    JobScheduler, JobSummary, JobsSnapshot, OverallProgress, PostProcessState, PostProcessor,
    QueueEvent, QueueState, SchedulerHandle,
};
pub use transfer::TransferEngine;
pub use verify::VerificationEngine;
