//! Checksum manifests.
//!
//! Two formats are read: ASC MHL v1 hash lists (XML) and the plain-text
//! format below, which is also what [`write_manifest`] produces.
//!
//! Plain text, one file per line:
//!
//! ```text
//! ; Offload manifest
//! ; Algorithm: xxhash64
//! <hex> <size> <relative/path>
//! ```
//!
//! Lines starting with `;` are comments. The `; Algorithm:` header sets the
//! algorithm for the lines after it; a single line can override it by
//! prefixing the hex with `md5:` or `xxhash64:`. Everything after the size is
//! the path, so paths may contain spaces.

use std::fs;
use std::path::{Component, Path, PathBuf};

use roxmltree::{Document, Node};

use crate::checksums::ChecksumAlgorithm;
use crate::error::{EngineError, Result};
use crate::model::{FileStatus, ManifestEntry, TransferJob, VerifyJob};

const HEADER: &str = "; Offload manifest";
const ALGORITHM_KEY: &str = "algorithm:";
const MHL_NAMESPACE: &str = "http://www.movielabs.com/ACF/MHL/v1.0";

/// Parse manifest text into entries, in file order.
///
/// Lines without an algorithm header or prefix default to xxHash64.
pub fn parse_manifest(content: &str) -> Result<Vec<ManifestEntry>> {
    let mut algorithm = ChecksumAlgorithm::default();
    let mut entries = Vec::new();

    for (index, raw) in content.lines().enumerate() {
        let line_no = index + 1;
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(comment) = line.strip_prefix(';') {
            let comment = comment.trim();
            let is_header = comment
                .get(..ALGORITHM_KEY.len())
                .is_some_and(|key| key.eq_ignore_ascii_case(ALGORITHM_KEY));
            if is_header {
                algorithm = comment[ALGORITHM_KEY.len()..]
                    .parse()
                    .map_err(|reason| EngineError::ManifestParse { line: line_no, reason })?;
            }
            continue;
        }

        entries.push(parse_entry(line, line_no, algorithm)?);
    }

    Ok(entries)
}

fn parse_entry(line: &str, line_no: usize, default_algorithm: ChecksumAlgorithm) -> Result<ManifestEntry> {
    let invalid = |reason: String| EngineError::ManifestParse { line: line_no, reason };

    let mut parts = line.splitn(3, ' ');
    let (Some(hash), Some(size), Some(path)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(invalid("expected '<hex> <size> <path>'".to_string()));
    };

    let (algorithm, hex) = match hash.split_once(':') {
        Some((algo, hex)) => (algo.parse::<ChecksumAlgorithm>().map_err(invalid)?, hex),
        None => (default_algorithm, hash),
    };
    checked_entry(path, hex, algorithm, size, line_no)
}

fn checked_entry(
    path: &str,
    hex: &str,
    algorithm: ChecksumAlgorithm,
    size: &str,
    line_no: usize,
) -> Result<ManifestEntry> {
    let invalid = |reason: String| EngineError::ManifestParse { line: line_no, reason };

    if hex.is_empty() || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid(format!("'{}' is not a hex digest", hex)));
    }

    let size = size
        .parse::<u64>()
        .map_err(|e| invalid(format!("bad size '{}': {}", size, e)))?;

    let relative_path = PathBuf::from(path.trim());
    if !is_plain_relative(&relative_path) {
        return Err(invalid(format!("path '{}' must be relative", relative_path.display())));
    }

    Ok(ManifestEntry {
        relative_path,
        expected_hash: hex.to_lowercase(),
        algorithm,
        size,
    })
}

/// Parse an ASC MHL v1 hash list.
///
/// Elements are matched by local name, with or without the MHL namespace.
/// Every `<hash>` below the root becomes one entry; its xxHash64 digest wins
/// over MD5. A `<hash>` with no `<file>` or no digest is skipped. Errors
/// carry the line of the offending element.
pub fn parse_mhl(content: &str) -> Result<Vec<ManifestEntry>> {
    let doc = Document::parse(content).map_err(|e| EngineError::ManifestParse {
        line: e.pos().row as usize,
        reason: format!("invalid MHL: {}", e),
    })?;

    let root = doc.root_element();
    if !is_mhl_element(root, "hashlist") {
        return Err(EngineError::ManifestParse {
            line: line_of(root),
            reason: format!("expected <hashlist>, found <{}>", root.tag_name().name()),
        });
    }

    let mut entries = Vec::new();
    for hash in root.descendants().filter(|n| is_mhl_element(*n, "hash")) {
        if let Some(entry) = mhl_entry(hash)? {
            entries.push(entry);
        }
    }
    Ok(entries)
}

fn mhl_entry(hash: Node<'_, '_>) -> Result<Option<ManifestEntry>> {
    let digest = mhl_text(hash, "xxhash64")
        .or_else(|| mhl_text(hash, "xxhash64be"))
        .map(|hex| (ChecksumAlgorithm::XxHash64, hex))
        .or_else(|| mhl_text(hash, "md5").map(|hex| (ChecksumAlgorithm::Md5, hex)));
    let (Some(path), Some((algorithm, hex))) = (mhl_text(hash, "file"), digest) else {
        return Ok(None);
    };

    let line_no = line_of(hash);
    let Some(size) = mhl_text(hash, "size") else {
        return Err(EngineError::ManifestParse {
            line: line_no,
            reason: format!("no <size> for '{}'", path),
        });
    };
    checked_entry(path, hex, algorithm, size, line_no).map(Some)
}

fn is_mhl_element(node: Node<'_, '_>, name: &str) -> bool {
    node.is_element()
        && node.tag_name().name() == name
        && matches!(node.tag_name().namespace(), None | Some(MHL_NAMESPACE))
}

/// Trimmed, non-empty text of the first child element called `name`.
fn mhl_text<'a>(parent: Node<'a, '_>, name: &str) -> Option<&'a str> {
    parent
        .children()
        .find(|n| is_mhl_element(*n, name))
        .and_then(|n| n.text())
        .map(str::trim)
        .filter(|text| !text.is_empty())
}

fn line_of(node: Node<'_, '_>) -> usize {
    node.document().text_pos_at(node.range().start).row as usize
}

/// MHL by `.mhl` extension, or by content that opens like XML.
fn is_mhl(path: &Path, content: &str) -> bool {
    let by_extension = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("mhl"));
    by_extension || content.trim_start_matches('\u{feff}').trim_start().starts_with('<')
}

/// Relative and free of `..`, so entries cannot point outside the target.
fn is_plain_relative(path: &Path) -> bool {
    !path.as_os_str().is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Read and parse a manifest file in either format.
pub fn read_manifest(path: &Path) -> Result<Vec<ManifestEntry>> {
    let content = fs::read_to_string(path).map_err(|e| EngineError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;
    if is_mhl(path, &content) {
        parse_mhl(&content)
    } else {
        parse_manifest(&content)
    }
}

/// Build a verify job for `target_dir` from a manifest file.
pub fn load_verify_job(manifest_path: &Path, target_dir: &Path) -> Result<VerifyJob> {
    let entries = read_manifest(manifest_path)?;
    Ok(VerifyJob::new(manifest_path, target_dir, entries))
}

/// Render entries as manifest text. Entries whose algorithm differs from
/// `algorithm` get an explicit prefix.
pub fn generate_manifest(entries: &[ManifestEntry], algorithm: ChecksumAlgorithm) -> String {
    let mut result = String::new();
    result.push_str(HEADER);
    result.push('\n');
    result.push_str(&format!("; Algorithm: {}\n", algorithm));

    for entry in entries {
        let hash = if entry.algorithm == algorithm {
            entry.expected_hash.clone()
        } else {
            format!("{}:{}", entry.algorithm, entry.expected_hash)
        };
        result.push_str(&format!(
            "{} {} {}\n",
            hash,
            entry.size,
            manifest_path_string(&entry.relative_path)
        ));
    }

    result
}

fn manifest_path_string(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Manifest entries for the verified files of a finished copy job, with
/// paths relative to each file's source root.
///
/// Files without a source digest (size-only or unverified runs) are left
/// out. Returns an empty list when the job has no report yet.
pub fn entries_from_job(job: &TransferJob) -> Vec<ManifestEntry> {
    let Some(report) = job.report() else {
        return Vec::new();
    };

    report
        .files
        .iter()
        .filter(|f| f.status == FileStatus::Verified)
        .filter_map(|f| {
            let checksum = f.checksum.as_ref()?;
            let root = job.source_root_of(&f.source_path)?;
            let relative = f.source_path.strip_prefix(root).ok()?;
            if relative.as_os_str().is_empty() {
                // Source root was the file itself
                let name = f.source_path.file_name()?;
                return Some((PathBuf::from(name), checksum, f.size));
            }
            Some((relative.to_path_buf(), checksum, f.size))
        })
        .map(|(relative_path, checksum, size)| ManifestEntry {
            relative_path,
            expected_hash: checksum.hex().to_lowercase(),
            algorithm: checksum.algorithm(),
            size,
        })
        .collect()
}

/// Write a manifest file, creating its parent directory if needed.
pub fn write_manifest(path: &Path, entries: &[ManifestEntry], algorithm: ChecksumAlgorithm) -> Result<()> {
    crate::fs_ops::ensure_parent_dir_exists(path)?;
    fs::write(path, generate_manifest(entries, algorithm)).map_err(|e| EngineError::WriteError {
        path: path.to_path_buf(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_header_and_override() {
        let content = "\
; Offload manifest
; Algorithm: md5

5d41402abc4b2a76b9719d911017c592 5 CLIPS/hello.txt
xxhash64:EF46DB3751D8E999 0 empty file.bin
";
        let entries = parse_manifest(content).expect("Manifest should parse");
        assert_eq!(entries.len(), 2);

        assert_eq!(entries[0].algorithm, ChecksumAlgorithm::Md5);
        assert_eq!(entries[0].relative_path, PathBuf::from("CLIPS/hello.txt"));
        assert_eq!(entries[0].size, 5);

        assert_eq!(entries[1].algorithm, ChecksumAlgorithm::XxHash64);
        assert_eq!(entries[1].expected_hash, "ef46db3751d8e999");
        assert_eq!(entries[1].relative_path, PathBuf::from("empty file.bin"));
    }

    #[test]
    fn test_parse_defaults_to_xxhash64() {
        let entries = parse_manifest("ef46db3751d8e999 0 a.bin\n").unwrap();
        assert_eq!(entries[0].algorithm, ChecksumAlgorithm::XxHash64);
    }

    #[test]
    fn test_parse_errors_carry_line_numbers() {
        let err = parse_manifest("; c\nabc 12\n").unwrap_err();
        assert!(matches!(err, EngineError::ManifestParse { line: 2, .. }));

        let err = parse_manifest("zz 1 a.bin\n").unwrap_err();
        assert!(matches!(err, EngineError::ManifestParse { line: 1, .. }));

        let err = parse_manifest("abc ten a.bin\n").unwrap_err();
        assert!(matches!(err, EngineError::ManifestParse { line: 1, .. }));

        let err = parse_manifest("; Algorithm: sha1\n").unwrap_err();
        assert!(matches!(err, EngineError::ManifestParse { line: 1, .. }));

        let err = parse_manifest("crc32:abc 1 a.bin\n").unwrap_err();
        assert!(matches!(err, EngineError::ManifestParse { line: 1, .. }));
    }

    #[test]
    fn test_parse_rejects_escaping_paths() {
        assert!(parse_manifest("abc 1 ../outside.bin\n").is_err());
        assert!(parse_manifest("abc 1 /etc/passwd\n").is_err());
    }

    #[test]
    fn test_generate_then_parse() {
        let entries = vec![
            ManifestEntry {
                relative_path: PathBuf::from("A/clip 1.mov"),
                expected_hash: "0123456789abcdef".to_string(),
                algorithm: ChecksumAlgorithm::XxHash64,
                size: 42,
            },
            ManifestEntry {
                relative_path: PathBuf::from("B/audio.wav"),
                expected_hash: "5d41402abc4b2a76b9719d911017c592".to_string(),
                algorithm: ChecksumAlgorithm::Md5,
                size: 5,
            },
        ];

        let content = generate_manifest(&entries, ChecksumAlgorithm::XxHash64);
        assert!(content.starts_with("; Offload manifest\n; Algorithm: xxhash64\n"));
        assert!(content.contains("0123456789abcdef 42 A/clip 1.mov"));
        assert!(content.contains("md5:5d41402abc4b2a76b9719d911017c592 5 B/audio.wav"));

        assert_eq!(parse_manifest(&content).unwrap(), entries);
    }

    #[test]
    fn test_read_and_write_manifest_file() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("reports").join("day1.txt");
        let entries = vec![ManifestEntry {
            relative_path: PathBuf::from("a.mov"),
            expected_hash: "ef46db3751d8e999".to_string(),
            algorithm: ChecksumAlgorithm::XxHash64,
            size: 0,
        }];

        write_manifest(&path, &entries, ChecksumAlgorithm::XxHash64).expect("Write should succeed");
        assert_eq!(read_manifest(&path).unwrap(), entries);

        let job = load_verify_job(&path, temp_dir.path()).unwrap();
        assert_eq!(job.entries, entries);
        assert_eq!(job.target_dir, temp_dir.path());

        let missing = read_manifest(&temp_dir.path().join("nope.txt"));
        assert!(matches!(missing, Err(EngineError::ReadError { .. })));
    }

    const NAMESPACED_MHL: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<hashlist version="1.1" xmlns="http://www.movielabs.com/ACF/MHL/v1.0">
  <creatorinfo>
    <name>DIT Cart</name>
    <startdate>2024-03-01T09:00:00Z</startdate>
  </creatorinfo>
  <hash>
    <file>A001/CLIPS/A001C001.mov</file>
    <size>0</size>
    <lastmodificationdate>2024-03-01T08:00:00Z</lastmodificationdate>
    <md5>5D41402ABC4B2A76B9719D911017C592</md5>
    <xxhash64>ef46db3751d8e999</xxhash64>
  </hash>
  <hash>
    <file>A001/audio.wav</file>
    <size>5</size>
    <md5>5d41402abc4b2a76b9719d911017c592</md5>
  </hash>
  <hash>
    <file>A001/no-digest.bin</file>
    <size>3</size>
  </hash>
</hashlist>
"#;

    const PLAIN_MHL: &str = r#"<?xml version="1.0"?>
<hashlist version="1.0">
  <hash>
    <file>clip one.mov</file>
    <size>0</size>
    <xxhash64be>EF46DB3751D8E999</xxhash64be>
  </hash>
  <hash>
    <size>1</size>
    <md5>0cc175b9c0f1b6a831c399e269772661</md5>
  </hash>
</hashlist>
"#;

    #[test]
    fn test_parse_namespaced_mhl() {
        let entries = parse_mhl(NAMESPACED_MHL).expect("MHL should parse");
        assert_eq!(
            entries,
            vec![
                ManifestEntry {
                    relative_path: PathBuf::from("A001/CLIPS/A001C001.mov"),
                    expected_hash: "ef46db3751d8e999".to_string(),
                    algorithm: ChecksumAlgorithm::XxHash64,
                    size: 0,
                },
                ManifestEntry {
                    relative_path: PathBuf::from("A001/audio.wav"),
                    expected_hash: "5d41402abc4b2a76b9719d911017c592".to_string(),
                    algorithm: ChecksumAlgorithm::Md5,
                    size: 5,
                },
            ]
        );
    }

    #[test]
    fn test_parse_plain_mhl() {
        let entries = parse_mhl(PLAIN_MHL).expect("MHL should parse");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].relative_path, PathBuf::from("clip one.mov"));
        assert_eq!(entries[0].algorithm, ChecksumAlgorithm::XxHash64);
        assert_eq!(entries[0].expected_hash, "ef46db3751d8e999");
        assert_eq!(entries[0].size, 0);
    }

    #[test]
    fn test_parse_mhl_errors() {
        let err = parse_mhl("<hashlist><hash>").unwrap_err();
        assert!(matches!(err, EngineError::ManifestParse { .. }));

        let err = parse_mhl("<?xml version=\"1.0\"?>\n<manifest/>").unwrap_err();
        assert!(matches!(err, EngineError::ManifestParse { line: 2, .. }));

        let no_size = "<hashlist>\n<hash><file>a.mov</file><md5>abc</md5></hash>\n</hashlist>";
        let err = parse_mhl(no_size).unwrap_err();
        assert!(matches!(err, EngineError::ManifestParse { line: 2, .. }));

        let escaping = "<hashlist><hash><file>../a.mov</file><size>1</size><md5>abc</md5></hash></hashlist>";
        assert!(parse_mhl(escaping).is_err());

        let not_hex = "<hashlist><hash><file>a.mov</file><size>1</size><md5>xyz</md5></hash></hashlist>";
        assert!(parse_mhl(not_hex).is_err());
    }

    #[test]
    fn test_read_manifest_detects_mhl() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");

        let by_extension = temp_dir.path().join("A001.mhl");
        fs::write(&by_extension, NAMESPACED_MHL).unwrap();
        assert_eq!(read_manifest(&by_extension).unwrap().len(), 2);

        // No extension hint, the XML prolog gives it away
        let by_content = temp_dir.path().join("A001.txt");
        fs::write(&by_content, PLAIN_MHL).unwrap();
        assert_eq!(read_manifest(&by_content).unwrap(), parse_mhl(PLAIN_MHL).unwrap());
    }

    #[test]
    fn test_verify_job_from_mhl() {
        use crate::control::JobControl;
        use crate::model::JobStatus;
        use crate::progress::NoProgress;
        use crate::verify::VerificationEngine;

        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let target = temp_dir.path().join("RAID");
        fs::create_dir_all(target.join("A001/CLIPS")).unwrap();
        fs::write(target.join("A001/CLIPS/A001C001.mov"), b"").unwrap();
        fs::write(target.join("A001/audio.wav"), b"hello").unwrap();
        let mhl = temp_dir.path().join("A001.mhl");
        fs::write(&mhl, NAMESPACED_MHL).unwrap();

        let job = load_verify_job(&mhl, &target).unwrap();
        assert_eq!(job.entries.len(), 2);

        let job = VerificationEngine::new(job, JobControl::new()).run(&NoProgress);
        assert_eq!(job.status(), JobStatus::Completed);
        let report = job.report().unwrap();
        assert_eq!(report.verified_count, 2);
        assert_eq!(report.failed_count, 0);
    }
}
