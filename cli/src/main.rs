//! Offload - command-line front end for the offload engine.
//!
//! Builds copy jobs from explicit source and destination folders, or a
//! verify job from a checksum manifest, runs them through the job scheduler
//! and renders progress to stderr.

mod logging;

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use offload_engine::manifest::{entries_from_job, load_verify_job, write_manifest};
use offload_engine::transfer::bytes_written;
use offload_engine::{
    ChecksumAlgorithm, EngineError, FileItem, FileStatus, Job, JobId, JobScheduler, JobStatus,
    OverallProgress, QueueEvent, Settings, TransferJob, TransferOptions, VerificationMode,
    VerifyStatus,
};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Offload - copy camera and audio media to several destinations and verify every copy
#[derive(Parser, Debug)]
#[command(name = "offload")]
#[command(version)]
#[command(about = "Copy media to several destinations in one pass and verify every copy")]
struct Cli {
    /// Settings file (TOML)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable verbose output and debug logging
    #[arg(long, global = true)]
    verbose: bool,

    /// Write JSON logs to this file instead of stderr
    #[arg(long, global = true, value_name = "FILE")]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Offload source folders to one or more destinations
    Copy(CopyArgs),
    /// Check the files under a folder against a checksum manifest
    Verify(VerifyArgs),
}

#[derive(Args, Debug)]
struct CopyArgs {
    /// Source folder or card; one copy job is built per source
    #[arg(long, value_name = "DIR", required = true, num_args = 1..)]
    src: Vec<PathBuf>,

    /// Destination root; every source file is written under each one
    #[arg(long, value_name = "DIR", required = true, num_args = 1..)]
    dst: Vec<PathBuf>,

    /// Checksum algorithm: xxhash64 or md5
    #[arg(long, value_name = "ALGORITHM")]
    checksum: Option<ChecksumAlgorithm>,

    /// Verification mode: full, size or none
    #[arg(long, value_name = "MODE")]
    verify: Option<VerificationMode>,

    /// Rewrite destinations that already have the source's size
    #[arg(long)]
    no_skip_existing: bool,

    /// Restart partial destinations from zero instead of appending
    #[arg(long)]
    no_resume: bool,

    /// Report sources that are safe to eject once fully verified
    #[arg(long)]
    eject: bool,

    /// Write a checksum manifest of the verified files
    #[arg(long, value_name = "FILE")]
    manifest_out: Option<PathBuf>,

    /// Number of jobs to run at the same time
    #[arg(long, value_name = "N")]
    jobs: Option<usize>,
}

#[derive(Args, Debug)]
struct VerifyArgs {
    /// ASC MHL file (.mhl) or plain-text manifest of relative paths, hashes and sizes
    #[arg(long, value_name = "FILE")]
    manifest: PathBuf,

    /// Folder the manifest paths are relative to
    #[arg(long, value_name = "DIR")]
    target: PathBuf,
}

/// How a run ended, when it ran at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Clean,
    Issues,
}

impl Outcome {
    fn exit_code(self) -> ExitCode {
        match self {
            Outcome::Clean => ExitCode::SUCCESS,
            Outcome::Issues => ExitCode::from(1),
        }
    }
}

/// Renders scheduler events to stderr
struct CliProgress {
    verbose: bool,
    start_time: Instant,
    last_progress_update: Option<Instant>,
    last_file_status: Option<(PathBuf, String)>,
    line_open: bool,
}

impl CliProgress {
    fn new(verbose: bool) -> Self {
        CliProgress {
            verbose,
            start_time: Instant::now(),
            last_progress_update: None,
            last_file_status: None,
            line_open: false,
        }
    }

    fn format_bytes(bytes: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = bytes as f64;
        let mut unit_idx = 0;

        while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
            size /= 1024.0;
            unit_idx += 1;
        }

        format!("{:.2} {}", size, UNITS[unit_idx])
    }

    fn format_duration(elapsed: Duration) -> String {
        let secs = elapsed.as_secs();
        let hours = secs / 3600;
        let mins = (secs % 3600) / 60;
        let secs = secs % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, mins, secs)
        } else if mins > 0 {
            format!("{}m {}s", mins, secs)
        } else {
            format!("{}s", secs)
        }
    }

    fn print_progress_bar(percent: u8) -> String {
        let filled = (percent.min(100) / 5) as usize;
        let empty = 20 - filled;
        format!("[{}{}] {}%", "=".repeat(filled), " ".repeat(empty), percent)
    }

    fn short_id(job_id: JobId) -> String {
        job_id.simple().to_string().chars().take(8).collect()
    }

    fn file_name(path: &Path) -> &str {
        path.file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("(unknown)")
    }

    /// Ends an open `\r` progress line so the next message starts clean.
    fn end_line(&mut self) {
        if self.line_open {
            eprintln!();
            self.line_open = false;
        }
    }

    fn on_event(&mut self, event: &QueueEvent) {
        match event {
            QueueEvent::Started { total_bytes, jobs } => {
                eprintln!(
                    "Starting {} job(s), {} to offload",
                    jobs,
                    Self::format_bytes(*total_bytes)
                );
                eprintln!();
            }
            QueueEvent::JobStarted { job_id, kind } => {
                if self.verbose {
                    self.end_line();
                    eprintln!("[{}] Started {} job", Self::short_id(*job_id), kind);
                }
            }
            QueueEvent::FileProgress(update) => {
                if self.verbose {
                    let current = (update.current_path.clone(), update.status_text.clone());
                    if self.last_file_status.as_ref() != Some(&current) {
                        self.end_line();
                        eprintln!(
                            "[{}] {} {}",
                            Self::short_id(update.job_id),
                            update.status_text,
                            Self::file_name(&update.current_path)
                        );
                        self.last_file_status = Some(current);
                    }
                }
            }
            QueueEvent::Overall(progress) => self.on_overall(progress),
            QueueEvent::JobError { job_id, message } => {
                self.end_line();
                eprintln!("[{}] Error: {}", Self::short_id(*job_id), message);
            }
            QueueEvent::EjectionRequested(roots) => {
                self.end_line();
                for root in roots {
                    eprintln!("Safe to eject: {}", root.display());
                }
            }
            QueueEvent::PostProcessStatus { job_id, state, .. } => {
                if self.verbose {
                    self.end_line();
                    eprintln!("[{}] {}", Self::short_id(*job_id), state);
                }
            }
            QueueEvent::Paused => {
                self.end_line();
                eprintln!("Paused");
            }
            QueueEvent::Resumed => {
                self.end_line();
                eprintln!("Resumed");
            }
            QueueEvent::Cancelled => {
                self.end_line();
                eprintln!("Cancelled");
            }
            QueueEvent::Completed { .. }
            | QueueEvent::JobQueued { .. }
            | QueueEvent::JobProgress(_)
            | QueueEvent::JobFinished(_) => {}
        }
    }

    fn on_overall(&mut self, progress: &OverallProgress) {
        // Throttle progress updates to avoid spam (max once per 200ms)
        let due = self
            .last_progress_update
            .map_or(true, |last| last.elapsed() >= Duration::from_millis(200));
        if !due && progress.percent < 100 {
            return;
        }
        self.last_progress_update = Some(Instant::now());

        let eta = match progress.eta_secs {
            Some(secs) if secs.is_finite() => Self::format_duration(Duration::from_secs_f64(secs.max(0.0))),
            _ => "--".to_string(),
        };
        let speed = if progress.speed > 0.0 {
            format!("{}/s", Self::format_bytes(progress.speed as u64))
        } else {
            "--".to_string()
        };

        eprint!(
            "\rProgress: {} | {} | {} | ETA {}    ",
            Self::print_progress_bar(progress.percent),
            progress.text,
            speed,
            eta
        );
        let _ = std::io::stderr().flush();
        self.line_open = true;
    }

    fn on_job_finished(&mut self, job: &Job) {
        self.end_line();
        eprintln!();
        eprintln!("[{}] {} job: {}", Self::short_id(job.id()), job.kind(), job.status_label());

        match job {
            Job::Copy(copy) => Self::print_copy_summary(copy),
            Job::Verify(verify) => {
                let Some(report) = verify.report() else {
                    Self::print_errors(job.errors());
                    return;
                };
                eprintln!(
                    "Verification: {} verified, {} failed, {} missing",
                    report.verified_count, report.failed_count, report.missing_count
                );
                if report.has_issues() {
                    eprintln!();
                    eprintln!("Issues:");
                    for file in report.files.iter().filter(|f| f.status != VerifyStatus::Verified) {
                        eprintln!("  {}: {}", file.relative_path.display(), file.status);
                    }
                }
                Self::print_errors(&report.errors);
            }
        }
    }

    fn print_copy_summary(job: &TransferJob) {
        let Some(report) = job.report() else {
            return;
        };

        eprintln!(
            "Summary: {} verified, {} copied (unverified), {} failed",
            report.count(FileStatus::Verified),
            report.count(FileStatus::CopiedUnverified),
            report.count(FileStatus::Failed)
        );
        eprintln!(
            "Checksum: {}, verification: {}",
            report.checksum_algorithm, report.verification_mode
        );
        eprintln!("Bytes written: {}", Self::format_bytes(bytes_written(report)));

        let failed: Vec<_> = report
            .files
            .iter()
            .filter(|f| f.status == FileStatus::Failed)
            .collect();
        if !failed.is_empty() {
            eprintln!();
            eprintln!("Failed files:");
            for file in failed {
                match &file.error {
                    Some(msg) => eprintln!("  {}: {}", Self::file_name(&file.source_path), msg),
                    None => eprintln!("  {}: (unknown error)", Self::file_name(&file.source_path)),
                }
            }
        }

        // Per-file failures are already listed; only show job-level errors
        if report.files.is_empty() {
            Self::print_errors(&report.errors);
        }
    }

    fn print_errors(errors: &[String]) {
        if errors.is_empty() {
            return;
        }
        eprintln!();
        eprintln!("Errors:");
        for error in errors {
            eprintln!("  {}", error);
        }
    }

    fn on_queue_completed(&mut self, with_errors: bool) {
        self.end_line();
        eprintln!();
        if with_errors {
            eprintln!("Queue completed with errors");
        } else {
            eprintln!("Queue completed");
        }
        eprintln!("Elapsed: {}", Self::format_duration(self.start_time.elapsed()));
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = logging::init_logging(cli.verbose, cli.log_file.as_deref()) {
        eprintln!("Error: {:#}", e);
        return ExitCode::from(2);
    }

    match run_cli(&cli) {
        Ok(outcome) => outcome.exit_code(),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(2)
        }
    }
}

/// Main CLI logic - separated for testability
fn run_cli(cli: &Cli) -> Result<Outcome> {
    let settings = load_settings(cli.config.as_deref())?;
    match &cli.command {
        Command::Copy(args) => run_copy(args, settings, cli.verbose),
        Command::Verify(args) => run_verify(args, settings, cli.verbose),
    }
}

fn load_settings(path: Option<&Path>) -> Result<Settings> {
    match path {
        Some(path) => Settings::from_file(path)
            .with_context(|| format!("Failed to load settings from {}", path.display())),
        None => Ok(Settings::default()),
    }
}

/// Job options from the settings file defaults with command-line flags on top.
fn transfer_options(defaults: &TransferOptions, args: &CopyArgs) -> TransferOptions {
    let mut options = defaults.clone();
    if let Some(checksum) = args.checksum {
        options.checksum = checksum;
    }
    if let Some(verification) = args.verify {
        options.verification = verification;
    }
    if args.no_skip_existing {
        options.skip_existing = false;
    }
    if args.no_resume {
        options.resume_partial = false;
    }
    if args.eject {
        options.eject_on_success = true;
    }
    options
}

/// Build one copy job for a source root. Relative paths under the root are
/// kept under every destination root; a single-file source lands at the top
/// of each destination.
fn scan_source(root: &Path, destinations: &[PathBuf], options: TransferOptions) -> Result<TransferJob> {
    if !root.exists() {
        bail!("Source does not exist: {}", root.display());
    }

    let mut files = Vec::new();
    if root.is_file() {
        let size = fs::metadata(root)
            .with_context(|| format!("Failed to read {}", root.display()))?
            .len();
        let name = root
            .file_name()
            .with_context(|| format!("Source has no file name: {}", root.display()))?;
        files.push(FileItem::new(
            root,
            size,
            destinations.iter().map(|d| d.join(name)).collect(),
        ));
    } else {
        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = entry.with_context(|| format!("Failed to scan {}", root.display()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(root)
                .with_context(|| format!("{} is outside {}", entry.path().display(), root.display()))?;
            let size = entry
                .metadata()
                .with_context(|| format!("Failed to read {}", entry.path().display()))?
                .len();
            files.push(FileItem::new(
                entry.path(),
                size,
                destinations.iter().map(|d| d.join(relative)).collect(),
            ));
        }
    }

    let job = TransferJob::new(vec![root.to_path_buf()], destinations.to_vec(), files, options);
    debug!(
        source = %root.display(),
        files = job.files.len(),
        bytes = job.total_bytes(),
        "Scanned source"
    );
    Ok(job)
}

/// Consume scheduler events until the queue drains. Returns the finished
/// jobs and whether any of them had errors.
fn drain_queue(scheduler: &JobScheduler, progress: &mut CliProgress) -> Result<(Vec<Job>, bool)> {
    let mut finished = Vec::new();
    for event in scheduler.events().iter() {
        match event {
            QueueEvent::JobFinished(job) => {
                progress.on_job_finished(&job);
                finished.push(*job);
            }
            QueueEvent::Completed { with_errors } => {
                progress.on_queue_completed(with_errors);
                return Ok((finished, with_errors));
            }
            other => progress.on_event(&other),
        }
    }
    bail!("Scheduler stopped before the queue completed")
}

/// Enqueue `jobs`, start the queue and wait for it to drain.
fn run_queue(settings: Settings, jobs: Vec<Job>, verbose: bool) -> Result<(Vec<Job>, bool)> {
    let scheduler = JobScheduler::spawn(settings).context("Failed to start the job scheduler")?;
    let handle = scheduler.handle();
    for job in jobs {
        handle.enqueue(job).context("Failed to queue job")?;
    }

    if let Err(e) = handle.start() {
        if let EngineError::PreflightFailed { missing } = &e {
            for path in missing {
                eprintln!("  missing: {}", path.display());
            }
        }
        return Err(e).context("Cannot start the queue");
    }

    let mut progress = CliProgress::new(verbose);
    let result = drain_queue(&scheduler, &mut progress);
    scheduler.shutdown();
    result
}

fn run_copy(args: &CopyArgs, mut settings: Settings, verbose: bool) -> Result<Outcome> {
    if let Some(jobs) = args.jobs {
        settings.max_concurrent_jobs = jobs;
    }
    settings.validate().context("Invalid settings")?;

    let options = transfer_options(&settings.defaults, args);
    let jobs = args
        .src
        .iter()
        .map(|src| scan_source(src, &args.dst, options.clone()).map(Job::from))
        .collect::<Result<Vec<_>>>()?;

    info!(
        sources = args.src.len(),
        destinations = args.dst.len(),
        checksum = %options.checksum,
        verification = %options.verification,
        "Starting offload"
    );
    let (finished, with_errors) = run_queue(settings, jobs, verbose)?;

    if let Some(path) = &args.manifest_out {
        let entries: Vec<_> = finished
            .iter()
            .filter_map(Job::as_copy)
            .flat_map(entries_from_job)
            .collect();
        if entries.is_empty() {
            warn!(path = %path.display(), "No verified files with checksums, manifest is empty");
        }
        write_manifest(path, &entries, options.checksum)
            .with_context(|| format!("Failed to write manifest {}", path.display()))?;
        eprintln!("Manifest written: {} ({} entries)", path.display(), entries.len());
    }

    let clean = !with_errors && finished.iter().all(|j| j.status() == JobStatus::Completed);
    Ok(if clean { Outcome::Clean } else { Outcome::Issues })
}

fn run_verify(args: &VerifyArgs, settings: Settings, verbose: bool) -> Result<Outcome> {
    if !args.target.is_dir() {
        bail!("Target is not a directory: {}", args.target.display());
    }
    let job = load_verify_job(&args.manifest, &args.target)
        .with_context(|| format!("Failed to load manifest {}", args.manifest.display()))?;

    info!(
        manifest = %args.manifest.display(),
        target = %args.target.display(),
        entries = job.entries.len(),
        "Starting verification"
    );
    let (finished, with_errors) = run_queue(settings, vec![Job::from(job)], verbose)?;

    let clean = !with_errors && finished.iter().all(|j| j.status() == JobStatus::Completed);
    Ok(if clean { Outcome::Clean } else { Outcome::Issues })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).expect("Arguments should parse")
    }

    fn copy_args(cli: &Cli) -> &CopyArgs {
        match &cli.command {
            Command::Copy(args) => args,
            Command::Verify(_) => panic!("expected copy arguments"),
        }
    }

    fn path_str(path: &Path) -> &str {
        path.to_str().expect("Temp path should be UTF-8")
    }

    /// A card with a nested clip and a sound file.
    fn make_card(root: &Path) -> PathBuf {
        let card = root.join("A001");
        fs::create_dir_all(card.join("CLIPS")).expect("Failed to create card");
        fs::write(card.join("CLIPS").join("A001C001.mov"), vec![7u8; 5000]).expect("Failed to write file");
        fs::write(card.join("sound.wav"), b"riff data").expect("Failed to write file");
        card
    }

    #[test]
    fn test_parse_copy_arguments() {
        let cli = parse(&[
            "offload", "copy", "--src", "/a", "/b", "--dst", "/raid", "--checksum", "md5", "--verify",
            "size", "--no-resume", "--eject", "--verbose",
        ]);
        assert!(cli.verbose);
        let args = copy_args(&cli);
        assert_eq!(args.src, vec![PathBuf::from("/a"), PathBuf::from("/b")]);
        assert_eq!(args.dst, vec![PathBuf::from("/raid")]);
        assert_eq!(args.checksum, Some(ChecksumAlgorithm::Md5));
        assert_eq!(args.verify, Some(VerificationMode::SizeOnly));
        assert!(args.no_resume);
        assert!(!args.no_skip_existing);
        assert!(args.eject);
    }

    #[test]
    fn test_parse_rejects_bad_arguments() {
        assert!(Cli::try_parse_from(["offload", "copy", "--src", "/a"]).is_err());
        assert!(Cli::try_parse_from(["offload", "copy", "--src", "/a", "--dst", "/b", "--checksum", "sha1"]).is_err());
        assert!(Cli::try_parse_from(["offload", "copy", "--src", "/a", "--dst", "/b", "--verify", "sometimes"]).is_err());
        assert!(Cli::try_parse_from(["offload", "verify", "--manifest", "m.txt"]).is_err());
    }

    #[test]
    fn test_flags_override_settings_defaults() {
        let mut defaults = TransferOptions::default();
        defaults.checksum = ChecksumAlgorithm::Md5;

        let cli = parse(&["offload", "copy", "--src", "/a", "--dst", "/b"]);
        assert_eq!(transfer_options(&defaults, copy_args(&cli)), defaults);

        let cli = parse(&[
            "offload", "copy", "--src", "/a", "--dst", "/b", "--checksum", "xxhash64", "--verify", "none",
            "--no-skip-existing",
        ]);
        let options = transfer_options(&defaults, copy_args(&cli));
        assert_eq!(options.checksum, ChecksumAlgorithm::XxHash64);
        assert_eq!(options.verification, VerificationMode::None);
        assert!(!options.skip_existing);
        assert!(options.resume_partial);
    }

    #[test]
    fn test_scan_keeps_relative_paths() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let card = make_card(temp_dir.path());
        let raid = temp_dir.path().join("raid");
        let shuttle = temp_dir.path().join("shuttle");

        let job = scan_source(&card, &[raid.clone(), shuttle.clone()], TransferOptions::default())
            .expect("Scan should succeed");

        assert_eq!(job.sources, vec![card.clone()]);
        assert_eq!(job.files.len(), 2);
        assert_eq!(job.total_bytes(), 5000 + 9);
        assert_eq!(job.files[0].source_path, card.join("CLIPS").join("A001C001.mov"));
        assert_eq!(
            job.files[0].destination_paths,
            vec![raid.join("CLIPS").join("A001C001.mov"), shuttle.join("CLIPS").join("A001C001.mov")]
        );
        assert_eq!(job.files[1].destination_paths[0], raid.join("sound.wav"));
    }

    #[test]
    fn test_scan_single_file_and_missing_source() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let card = make_card(temp_dir.path());
        let raid = temp_dir.path().join("raid");

        let job = scan_source(&card.join("sound.wav"), &[raid.clone()], TransferOptions::default())
            .expect("Scan should succeed");
        assert_eq!(job.files.len(), 1);
        assert_eq!(job.files[0].destination_paths, vec![raid.join("sound.wav")]);

        assert!(scan_source(&temp_dir.path().join("nope"), &[raid], TransferOptions::default()).is_err());
    }

    #[test]
    fn test_copy_then_verify_round_trip() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let card = make_card(temp_dir.path());
        let raid = temp_dir.path().join("raid");
        fs::create_dir_all(&raid).expect("Failed to create destination");
        let manifest = temp_dir.path().join("reports").join("A001.txt");

        let cli = parse(&[
            "offload",
            "copy",
            "--src",
            path_str(&card),
            "--dst",
            path_str(&raid),
            "--manifest-out",
            path_str(&manifest),
        ]);
        assert_eq!(run_cli(&cli).expect("Copy should run"), Outcome::Clean);
        assert_eq!(fs::read(raid.join("sound.wav")).expect("Copied file"), b"riff data");
        assert!(manifest.exists());

        let verify = parse(&[
            "offload",
            "verify",
            "--manifest",
            path_str(&manifest),
            "--target",
            path_str(&raid),
        ]);
        assert_eq!(run_cli(&verify).expect("Verify should run"), Outcome::Clean);

        fs::remove_file(raid.join("CLIPS").join("A001C001.mov")).expect("Failed to remove file");
        assert_eq!(run_cli(&verify).expect("Verify should run"), Outcome::Issues);
    }

    #[test]
    fn test_missing_destination_fails_preflight() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let card = make_card(temp_dir.path());
        let unmounted = temp_dir.path().join("unmounted");

        let cli = parse(&["offload", "copy", "--src", path_str(&card), "--dst", path_str(&unmounted)]);
        let result = run_cli(&cli);
        assert!(result.is_err(), "Copy should refuse a missing destination");
        assert!(!unmounted.exists());
    }

    #[test]
    fn test_zero_jobs_flag_is_rejected() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let card = make_card(temp_dir.path());

        let cli = parse(&["offload", "copy", "--src", path_str(&card), "--dst", path_str(temp_dir.path()), "--jobs", "0"]);
        assert!(run_cli(&cli).is_err());
    }

    #[test]
    fn test_format_helpers() {
        assert_eq!(CliProgress::format_bytes(512), "512.00 B");
        assert_eq!(CliProgress::format_bytes(10 * 1024 * 1024), "10.00 MB");
        assert_eq!(CliProgress::format_duration(Duration::from_secs(3725)), "1h 2m 5s");
        assert_eq!(CliProgress::print_progress_bar(50), "[==========          ] 50%");
    }
}
