//! Filesystem operations module.
//!
//! This module provides low-level operations for:
//! - Deciding how an existing destination is treated (skip, resume, overwrite)
//! - Opening destinations and creating their parent directories
//! - The single-pass fan-out copy: one source read feeding every destination
//!   and, optionally, a running digest
//! - Carrying the source modification time over to written destinations

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::{debug, warn};

use crate::checksums::ChecksumStream;
use crate::control::JobControl;
use crate::error::{EngineError, Result};
use crate::model::{TransferOptions, WriteAction};

/// How a destination will be written for the current file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestinationPlan {
    /// Already complete; leave it alone
    Skip,
    /// Holds a prefix of the source; append from this offset
    Resume(u64),
    /// Write from byte zero, truncating whatever is there
    Overwrite,
}

/// Decide what to do with `destination` given the source size and options.
///
/// Anything that is not clearly complete or clearly a shorter prefix is
/// rewritten from zero.
pub fn plan_destination(destination: &Path, source_size: u64, options: &TransferOptions) -> DestinationPlan {
    let existing = match fs::metadata(destination) {
        Ok(metadata) if metadata.is_file() => metadata.len(),
        _ => return DestinationPlan::Overwrite,
    };

    if options.skip_existing && existing == source_size {
        DestinationPlan::Skip
    } else if options.resume_partial && existing > 0 && existing < source_size {
        DestinationPlan::Resume(existing)
    } else {
        DestinationPlan::Overwrite
    }
}

/// Ensure the parent directory of a path exists, creating it if necessary.
///
/// # Errors
/// Returns EngineError if directory creation fails
pub fn ensure_parent_dir_exists(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        // Skip if parent is empty path (relative root)
        if parent.as_os_str().is_empty() {
            return Ok(());
        }

        match fs::metadata(parent) {
            Ok(metadata) => {
                if metadata.is_dir() {
                    Ok(())
                } else {
                    Err(EngineError::DirectoryCreationFailed {
                        path: parent.to_path_buf(),
                        source: io::Error::new(
                            io::ErrorKind::InvalidInput,
                            "Parent path exists but is not a directory",
                        ),
                    })
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                fs::create_dir_all(parent).map_err(|e| EngineError::DirectoryCreationFailed {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
                Ok(())
            }
            Err(e) => Err(EngineError::DirectoryCreationFailed {
                path: parent.to_path_buf(),
                source: e,
            }),
        }
    } else {
        Ok(())
    }
}

/// Open `path` for writing according to `plan`. `Skip` opens nothing.
pub fn open_destination(path: &Path, plan: DestinationPlan) -> Result<Option<File>> {
    let open = |plan: DestinationPlan| -> io::Result<Option<File>> {
        match plan {
            DestinationPlan::Skip => Ok(None),
            DestinationPlan::Resume(_) => OpenOptions::new().append(true).open(path).map(Some),
            DestinationPlan::Overwrite => File::create(path).map(Some),
        }
    };

    if plan != DestinationPlan::Skip {
        ensure_parent_dir_exists(path)?;
    }
    open(plan).map_err(|e| EngineError::WriteError {
        path: path.to_path_buf(),
        source: e,
    })
}

/// One destination handle inside a fan-out copy.
///
/// A write failure closes only this handle; the other destinations keep
/// receiving data.
#[derive(Debug)]
pub struct DestinationWriter {
    path: PathBuf,
    plan: DestinationPlan,
    file: Option<File>,
    written: u64,
    error: Option<EngineError>,
}

impl DestinationWriter {
    /// Plan and open one destination. Open failures are kept on the writer
    /// rather than returned.
    pub fn open(path: &Path, source_size: u64, options: &TransferOptions) -> Self {
        let plan = plan_destination(path, source_size, options);
        match plan {
            DestinationPlan::Skip => debug!(path = %path.display(), "Destination complete, skipping"),
            DestinationPlan::Resume(offset) => {
                debug!(path = %path.display(), offset, "Resuming partial destination")
            }
            DestinationPlan::Overwrite => {}
        }

        let (file, error) = match open_destination(path, plan) {
            Ok(file) => (file, None),
            Err(e) => (None, Some(e)),
        };

        DestinationWriter {
            path: path.to_path_buf(),
            plan,
            file,
            written: 0,
            error,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn plan(&self) -> DestinationPlan {
        self.plan
    }

    /// Still has an open handle.
    pub fn is_active(&self) -> bool {
        self.file.is_some()
    }

    /// Source offset this destination needs data from.
    fn start_offset(&self) -> u64 {
        match self.plan {
            DestinationPlan::Resume(offset) => offset,
            _ => 0,
        }
    }

    /// Write the part of `chunk` (which starts at source offset `position`)
    /// that lies beyond this destination's start offset.
    fn write_chunk(&mut self, position: u64, chunk: &[u8]) {
        let skip = self.start_offset().saturating_sub(position);
        if skip >= chunk.len() as u64 {
            return;
        }
        let slice = &chunk[skip as usize..];

        let Some(file) = self.file.as_mut() else {
            return;
        };
        match file.write_all(slice) {
            Ok(()) => self.written += slice.len() as u64,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Destination write failed");
                self.file = None;
                self.error = Some(EngineError::WriteError {
                    path: self.path.clone(),
                    source: e,
                });
            }
        }
    }

    /// Flush and close the handle, returning the write-phase outcome.
    pub fn finish(mut self) -> WriterOutcome {
        if let Some(mut file) = self.file.take() {
            if let Err(e) = file.flush() {
                self.error = Some(EngineError::WriteError {
                    path: self.path.clone(),
                    source: e,
                });
            }
        }

        let action = match (&self.error, self.plan) {
            (Some(_), _) => WriteAction::Failed,
            (None, DestinationPlan::Skip) => WriteAction::Skipped,
            (None, DestinationPlan::Resume(from)) => WriteAction::Resumed { from },
            (None, DestinationPlan::Overwrite) => WriteAction::Written,
        };

        WriterOutcome {
            path: self.path,
            action,
            bytes_written: self.written,
            error: self.error,
        }
    }
}

/// Result of the write phase for one destination.
#[derive(Debug)]
pub struct WriterOutcome {
    pub path: PathBuf,
    pub action: WriteAction,
    pub bytes_written: u64,
    pub error: Option<EngineError>,
}

/// Read `source` once, feeding each chunk to the digest (when given) and to
/// every open destination.
///
/// With a digest the source is read from byte zero so the digest covers the
/// whole file; without one the read starts at the smallest offset any open
/// destination needs. `on_chunk` receives the source position after each
/// chunk. Pause/cancel are honoured before every read.
///
/// Returns the number of source bytes read.
pub fn fan_out_copy(
    source: &Path,
    writers: &mut [DestinationWriter],
    mut digest: Option<&mut ChecksumStream>,
    chunk_size: usize,
    control: &JobControl,
    mut on_chunk: impl FnMut(u64),
) -> Result<u64> {
    let any_active = writers.iter().any(DestinationWriter::is_active);
    if !any_active && digest.is_none() {
        return Ok(0);
    }

    let read_error = |e: io::Error| EngineError::ReadError {
        path: source.to_path_buf(),
        source: e,
    };

    let mut src = File::open(source).map_err(read_error)?;
    let mut position = if digest.is_some() {
        0
    } else {
        writers
            .iter()
            .filter(|w| w.is_active())
            .map(DestinationWriter::start_offset)
            .min()
            .unwrap_or(0)
    };
    if position > 0 {
        src.seek(SeekFrom::Start(position)).map_err(read_error)?;
    }

    let start = position;
    let mut buffer = vec![0u8; chunk_size.max(1)];
    loop {
        control.checkpoint()?;

        let n = src.read(&mut buffer).map_err(read_error)?;
        if n == 0 {
            break;
        }
        let chunk = &buffer[..n];

        if let Some(stream) = digest.as_deref_mut() {
            stream.update(chunk);
        }
        for writer in writers.iter_mut() {
            writer.write_chunk(position, chunk);
        }
        position += n as u64;
        on_chunk(position);

        if digest.is_none() && !writers.iter().any(DestinationWriter::is_active) {
            break;
        }
    }

    Ok(position - start)
}

/// Copy the source modification time onto a destination. Best effort.
pub fn preserve_mtime(destination: &Path, modified: Option<SystemTime>) {
    if let Some(mtime) = modified {
        if let Err(e) = filetime::set_file_mtime(destination, filetime::FileTime::from_system_time(mtime)) {
            debug!(path = %destination.display(), error = %e, "Could not set modification time");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksums::{checksum_bytes, ChecksumAlgorithm};

    fn options(skip_existing: bool, resume_partial: bool) -> TransferOptions {
        TransferOptions {
            skip_existing,
            resume_partial,
            ..TransferOptions::default()
        }
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 253) as u8).collect()
    }

    #[test]
    fn test_plan_destination_cases() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let dst = temp_dir.path().join("clip.mov");

        assert_eq!(plan_destination(&dst, 10, &options(true, true)), DestinationPlan::Overwrite);

        fs::write(&dst, b"0123456789").unwrap();
        assert_eq!(plan_destination(&dst, 10, &options(true, true)), DestinationPlan::Skip);
        assert_eq!(plan_destination(&dst, 10, &options(false, true)), DestinationPlan::Overwrite);

        fs::write(&dst, b"01234").unwrap();
        assert_eq!(plan_destination(&dst, 10, &options(true, true)), DestinationPlan::Resume(5));
        assert_eq!(plan_destination(&dst, 10, &options(true, false)), DestinationPlan::Overwrite);

        // Larger than the source: never guess, start over
        fs::write(&dst, b"0123456789abc").unwrap();
        assert_eq!(plan_destination(&dst, 10, &options(true, true)), DestinationPlan::Overwrite);

        // Empty file is not a resumable prefix
        fs::write(&dst, b"").unwrap();
        assert_eq!(plan_destination(&dst, 10, &options(false, true)), DestinationPlan::Overwrite);
    }

    #[test]
    fn test_ensure_parent_dir_exists() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("subdir").join("file.txt");

        ensure_parent_dir_exists(&path).expect("Failed to create parent");
        assert!(path.parent().unwrap().exists());
    }

    #[test]
    fn test_ensure_parent_dir_rejects_file_parent() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let blocker = temp_dir.path().join("blocker");
        fs::write(&blocker, b"x").unwrap();

        let result = ensure_parent_dir_exists(&blocker.join("file.txt"));
        assert!(matches!(result, Err(EngineError::DirectoryCreationFailed { .. })));
    }

    #[test]
    fn test_fan_out_writes_every_destination_and_hashes() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src.mov");
        let data = pattern(10_000);
        fs::write(&src, &data).unwrap();

        let opts = options(true, true);
        let dsts = [temp_dir.path().join("a/src.mov"), temp_dir.path().join("b/src.mov")];
        let mut writers: Vec<_> = dsts
            .iter()
            .map(|d| DestinationWriter::open(d, data.len() as u64, &opts))
            .collect();

        let mut stream = ChecksumStream::new(ChecksumAlgorithm::XxHash64);
        let mut positions = Vec::new();
        let read = fan_out_copy(
            &src,
            &mut writers,
            Some(&mut stream),
            4096,
            &JobControl::new(),
            |p| positions.push(p),
        )
        .expect("Copy should succeed");

        assert_eq!(read, 10_000);
        assert_eq!(positions, vec![4096, 8192, 10_000]);
        assert_eq!(stream.finish(), checksum_bytes(ChecksumAlgorithm::XxHash64, &data));
        for (writer, dst) in writers.into_iter().zip(&dsts) {
            let outcome = writer.finish();
            assert_eq!(outcome.action, WriteAction::Written);
            assert_eq!(outcome.bytes_written, 10_000);
            assert_eq!(fs::read(dst).unwrap(), data);
        }
    }

    #[test]
    fn test_fan_out_resume_appends_only_missing_tail() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src.mov");
        let data = pattern(9_000);
        fs::write(&src, &data).unwrap();

        let dst = temp_dir.path().join("dst.mov");
        fs::write(&dst, &data[..4_500]).unwrap();

        let mut writers = vec![DestinationWriter::open(&dst, 9_000, &options(true, true))];
        assert_eq!(writers[0].plan(), DestinationPlan::Resume(4_500));

        let read = fan_out_copy(&src, &mut writers, None, 1000, &JobControl::new(), |_| {})
            .expect("Copy should succeed");
        assert_eq!(read, 4_500, "source reader should seek to the resume offset");

        let outcome = writers.pop().unwrap().finish();
        assert_eq!(outcome.action, WriteAction::Resumed { from: 4_500 });
        assert_eq!(outcome.bytes_written, 4_500);
        assert_eq!(fs::read(&dst).unwrap(), data);
    }

    #[test]
    fn test_fan_out_with_digest_reads_whole_source_when_resuming() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src.mov");
        let data = pattern(9_000);
        fs::write(&src, &data).unwrap();

        let dst = temp_dir.path().join("dst.mov");
        fs::write(&dst, &data[..3_333]).unwrap();

        let mut writers = vec![DestinationWriter::open(&dst, 9_000, &options(true, true))];
        let mut stream = ChecksumStream::new(ChecksumAlgorithm::Md5);
        let read = fan_out_copy(&src, &mut writers, Some(&mut stream), 1000, &JobControl::new(), |_| {})
            .expect("Copy should succeed");

        assert_eq!(read, 9_000);
        assert_eq!(stream.finish(), checksum_bytes(ChecksumAlgorithm::Md5, &data));
        let outcome = writers.pop().unwrap().finish();
        assert_eq!(outcome.bytes_written, 9_000 - 3_333);
        assert_eq!(fs::read(&dst).unwrap(), data);
    }

    #[test]
    fn test_fan_out_stops_on_cancel() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src.mov");
        fs::write(&src, pattern(1000)).unwrap();

        let control = JobControl::new();
        control.cancel();
        let mut writers = vec![DestinationWriter::open(
            &temp_dir.path().join("dst.mov"),
            1000,
            &options(true, true),
        )];
        let result = fan_out_copy(&src, &mut writers, None, 100, &control, |_| {});
        assert!(matches!(result, Err(EngineError::Cancelled)));
    }

    #[test]
    fn test_skipped_destination_opens_nothing() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src.mov");
        fs::write(&src, pattern(100)).unwrap();
        let dst = temp_dir.path().join("dst.mov");
        fs::write(&dst, pattern(100)).unwrap();

        let mut writers = vec![DestinationWriter::open(&dst, 100, &options(true, true))];
        assert!(!writers[0].is_active());

        let read = fan_out_copy(&src, &mut writers, None, 10, &JobControl::new(), |_| {})
            .expect("Nothing to do");
        assert_eq!(read, 0);
        let outcome = writers.pop().unwrap().finish();
        assert_eq!(outcome.action, WriteAction::Skipped);
        assert_eq!(outcome.bytes_written, 0);
    }

    #[test]
    fn test_open_failure_is_kept_on_writer() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let blocker = temp_dir.path().join("blocker");
        fs::write(&blocker, b"x").unwrap();

        let writer = DestinationWriter::open(&blocker.join("clip.mov"), 10, &options(true, true));
        assert!(!writer.is_active());
        let outcome = writer.finish();
        assert_eq!(outcome.action, WriteAction::Failed);
        assert!(outcome.error.is_some());
    }
}
