use crate::system::path_guard;
use crate::system::sniffer;
use crate::utils::error::{Result, VtreeError};
use flate2::read::GzDecoder;
use sevenz_rust2::Password as SevenZPassword;
use std::ffi::OsStr;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use tar::Archive as TarArchive;
use tracing::warn;
use zip::ZipArchive;
use zstd::stream::read::Decoder as ZstdDecoder;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    Jar,
    War,
    Apk,
    Tar,
    TarGz,
    TarZst,
    SevenZ,
}

impl ArchiveFormat {
    pub fn display_name(&self) -> &'static str {
        match self {
            ArchiveFormat::Zip => "zip",
            ArchiveFormat::Jar => "jar",
            ArchiveFormat::War => "war",
            ArchiveFormat::Apk => "apk",
            ArchiveFormat::Tar => "tar",
            ArchiveFormat::TarGz => "tar.gz",
            ArchiveFormat::TarZst => "tar.zst",
            ArchiveFormat::SevenZ => "7z",
        }
    }
}

/// 확장자 기반 포맷 판정. 내용 검사는 [`sniffer::classify`] 쪽.
pub fn detect_archive_format(path: &Path) -> Option<ArchiveFormat> {
    let name = path.file_name()?.to_string_lossy().to_lowercase();
    if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        return Some(ArchiveFormat::TarGz);
    }
    if name.ends_with(".tar.zst") || name.ends_with(".tzst") {
        return Some(ArchiveFormat::TarZst);
    }
    match path
        .extension()
        .and_then(OsStr::to_str)?
        .to_lowercase()
        .as_str()
    {
        "zip" => Some(ArchiveFormat::Zip),
        "jar" => Some(ArchiveFormat::Jar),
        "war" => Some(ArchiveFormat::War),
        "apk" => Some(ArchiveFormat::Apk),
        "tar" => Some(ArchiveFormat::Tar),
        "7z" => Some(ArchiveFormat::SevenZ),
        _ => None,
    }
}

/// 아카이브 목록 항목 (추출 없이 미리보기용)
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    pub path: String,
    pub size: u64,
    pub is_dir: bool,
}

/// One event per completed (or skipped) entry.
///
/// `total_bytes` is the container file length, which is an approximation:
/// `processed_bytes` may exceed it or never reach it. For synthetic
/// collections the same shape carries item counts instead of bytes.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub total_bytes: u64,
    pub processed_bytes: u64,
    pub entry: String,
}

#[derive(Debug, Clone)]
pub struct ExtractionSummary {
    pub entries_processed: usize,
    pub entries_skipped: usize,
    pub bytes_processed: u64,
    pub errors: Vec<String>,
    pub cancelled: bool,
}

/// 한 번의 추출 작업에 대한 상태. 대상 루트는 작업 수명 동안 고정되고
/// 처리량 카운터는 단조 증가한다.
struct ExtractionJob {
    source: PathBuf,
    dest_root: PathBuf,
    total_bytes: u64,
    processed_bytes: u64,
    progress_tx: Sender<ProgressEvent>,
    cancel: Arc<AtomicBool>,
    summary: ExtractionSummary,
}

impl ExtractionJob {
    fn new(
        source: &Path,
        dest_root: &Path,
        progress_tx: Sender<ProgressEvent>,
        cancel: Arc<AtomicBool>,
    ) -> Result<Self> {
        let total_bytes = fs::metadata(source)
            .map_err(|_| VtreeError::PathNotFound {
                path: source.to_path_buf(),
            })?
            .len();
        Ok(Self {
            source: source.to_path_buf(),
            dest_root: dest_root.to_path_buf(),
            total_bytes,
            processed_bytes: 0,
            progress_tx,
            cancel,
            summary: ExtractionSummary {
                entries_processed: 0,
                entries_skipped: 0,
                bytes_processed: 0,
                errors: Vec::new(),
                cancelled: false,
            },
        })
    }

    /// Checked between entries only, never mid-entry.
    fn cancelled(&mut self) -> bool {
        if self.cancel.load(Ordering::Relaxed) {
            self.summary.cancelled = true;
            return true;
        }
        false
    }

    /// Every entry, directories included, goes through the guard before any
    /// filesystem mutation. A rejection is fatal for the whole job.
    fn resolve_entry(&self, name: &str) -> Result<PathBuf> {
        path_guard::resolve(&self.dest_root, name)
    }

    fn entry_done(&mut self, name: &str, bytes: u64) {
        self.processed_bytes = self.processed_bytes.saturating_add(bytes);
        self.summary.entries_processed += 1;
        self.summary.bytes_processed = self.processed_bytes;
        self.send_progress(name);
    }

    /// Corrupt or unreadable entries are diagnostics, not job failures.
    /// Progress keeps advancing so observers do not stall.
    fn entry_failed(&mut self, name: &str, reason: &str) {
        warn!(
            archive = %self.source.display(),
            entry = name,
            reason,
            "skipping unreadable archive entry"
        );
        self.summary.entries_skipped += 1;
        self.summary.errors.push(format!("{}: {}", name, reason));
        self.send_progress(name);
    }

    fn send_progress(&self, name: &str) {
        let _ = self.progress_tx.send(ProgressEvent {
            total_bytes: self.total_bytes,
            processed_bytes: self.processed_bytes,
            entry: name.to_string(),
        });
    }

    fn extract_failed(&self, reason: impl ToString) -> VtreeError {
        VtreeError::ExtractFailed {
            path: self.source.clone(),
            reason: reason.to_string(),
        }
    }
}

/// Streams every entry of `source` into `dest_root`.
///
/// Entries are processed one at a time in bounded memory; file entries
/// truncate/overwrite whatever already sits at the resolved path, and entry
/// content is copied until the entry stream ends (declared sizes are not
/// trusted). A path-guard rejection aborts the whole job; any other
/// per-entry failure is recorded in the summary and skipped.
pub fn extract(
    source: &Path,
    dest_root: &Path,
    progress_tx: Sender<ProgressEvent>,
    cancel: Arc<AtomicBool>,
) -> Result<ExtractionSummary> {
    let format = sniffer::probe_archive(source)
        .or_else(|| detect_archive_format(source))
        .ok_or_else(|| VtreeError::UnsupportedFormat {
            path: source.to_path_buf(),
        })?;

    fs::create_dir_all(dest_root)?;
    let mut job = ExtractionJob::new(source, dest_root, progress_tx, cancel)?;

    match format {
        ArchiveFormat::Zip | ArchiveFormat::Jar | ArchiveFormat::War | ArchiveFormat::Apk => {
            extract_zip(&mut job)?
        }
        ArchiveFormat::Tar => {
            let file = File::open(source)?;
            extract_tar_like(TarArchive::new(file), &mut job)?
        }
        ArchiveFormat::TarGz => {
            let file = File::open(source)?;
            extract_tar_like(TarArchive::new(GzDecoder::new(file)), &mut job)?
        }
        ArchiveFormat::TarZst => {
            let file = File::open(source)?;
            let decoder = ZstdDecoder::new(file)?;
            extract_tar_like(TarArchive::new(decoder), &mut job)?
        }
        ArchiveFormat::SevenZ => extract_7z(&mut job)?,
    }

    Ok(job.summary)
}

fn extract_zip(job: &mut ExtractionJob) -> Result<()> {
    let file = File::open(&job.source)?;
    let mut archive = ZipArchive::new(file).map_err(|e| job.extract_failed(e))?;

    for idx in 0..archive.len() {
        if job.cancelled() {
            return Ok(());
        }

        let mut entry = match archive.by_index(idx) {
            Ok(v) => v,
            Err(e) => {
                job.entry_failed(&format!("#{}", idx), &e.to_string());
                continue;
            }
        };
        let name = entry.name().to_string();
        let dest = job.resolve_entry(&name)?;

        if entry.is_dir() {
            match fs::create_dir_all(&dest) {
                Ok(()) => job.entry_done(&name, 0),
                Err(e) => job.entry_failed(&name, &e.to_string()),
            }
            continue;
        }

        match write_entry(&dest, &mut entry) {
            Ok(copied) => job.entry_done(&name, copied),
            Err(e) => job.entry_failed(&name, &e.to_string()),
        }
    }
    Ok(())
}

fn extract_tar_like<R: Read>(mut archive: TarArchive<R>, job: &mut ExtractionJob) -> Result<()> {
    let entries = archive.entries().map_err(|e| job.extract_failed(e))?;

    for entry_result in entries {
        if job.cancelled() {
            return Ok(());
        }

        let mut entry = match entry_result {
            Ok(v) => v,
            Err(e) => {
                job.entry_failed("<unreadable>", &e.to_string());
                continue;
            }
        };
        let name = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
        let dest = job.resolve_entry(&name)?;

        if entry.header().entry_type().is_dir() {
            match fs::create_dir_all(&dest) {
                Ok(()) => job.entry_done(&name, 0),
                Err(e) => job.entry_failed(&name, &e.to_string()),
            }
            continue;
        }

        match write_entry(&dest, &mut entry) {
            Ok(copied) => job.entry_done(&name, copied),
            Err(e) => job.entry_failed(&name, &e.to_string()),
        }
    }
    Ok(())
}

fn extract_7z(job: &mut ExtractionJob) -> Result<()> {
    let file = File::open(&job.source)?;
    let dest_root = job.dest_root.clone();

    // The callback can only signal stop/continue, so a guard rejection is
    // carried out and re-raised as the job error.
    let mut guard_violation: Option<VtreeError> = None;

    let result = {
        let violation = &mut guard_violation;
        let mut extract_fn = |entry: &sevenz_rust2::SevenZArchiveEntry,
                              reader: &mut dyn Read,
                              _output_path: &PathBuf|
         -> std::result::Result<bool, sevenz_rust2::Error> {
            if job.cancelled() {
                return Ok(false);
            }

            let name = entry.name.clone();
            let dest = match job.resolve_entry(&name) {
                Ok(v) => v,
                Err(e) => {
                    *violation = Some(e);
                    return Ok(false);
                }
            };

            if entry.is_directory {
                match fs::create_dir_all(&dest) {
                    Ok(()) => job.entry_done(&name, 0),
                    Err(e) => job.entry_failed(&name, &e.to_string()),
                }
                return Ok(true);
            }

            match write_entry(&dest, reader) {
                Ok(copied) => job.entry_done(&name, copied),
                Err(e) => job.entry_failed(&name, &e.to_string()),
            }
            Ok(true)
        };
        sevenz_rust2::decompress_with_extract_fn(file, &dest_root, &mut extract_fn)
    };

    if let Some(err) = guard_violation {
        return Err(err);
    }
    result.map_err(|e| job.extract_failed(e))?;
    Ok(())
}

/// Creates parent directories, truncates any pre-existing file, and copies
/// the entry stream to its end. Returns the bytes actually copied.
fn write_entry<R: Read + ?Sized>(dest: &Path, reader: &mut R) -> io::Result<u64> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut out = File::create(dest)?;
    io::copy(reader, &mut out)
}

/// 추출 없이 아카이브 목차만 읽는다.
pub fn list_entries(path: &Path) -> Result<Vec<ArchiveEntry>> {
    let format = sniffer::probe_archive(path)
        .or_else(|| detect_archive_format(path))
        .ok_or_else(|| VtreeError::UnsupportedFormat {
            path: path.to_path_buf(),
        })?;

    match format {
        ArchiveFormat::Zip | ArchiveFormat::Jar | ArchiveFormat::War | ArchiveFormat::Apk => {
            list_zip_entries(path)
        }
        ArchiveFormat::Tar => {
            let file = File::open(path)?;
            list_tar_like_entries(TarArchive::new(file), path)
        }
        ArchiveFormat::TarGz => {
            let file = File::open(path)?;
            list_tar_like_entries(TarArchive::new(GzDecoder::new(file)), path)
        }
        ArchiveFormat::TarZst => {
            let file = File::open(path)?;
            let decoder = ZstdDecoder::new(file)?;
            list_tar_like_entries(TarArchive::new(decoder), path)
        }
        ArchiveFormat::SevenZ => list_7z_entries(path),
    }
}

fn list_zip_entries(path: &Path) -> Result<Vec<ArchiveEntry>> {
    let file = File::open(path)?;
    let mut archive = ZipArchive::new(file).map_err(|e| VtreeError::ListFailed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let mut entries = Vec::new();
    for i in 0..archive.len() {
        let entry = archive.by_index(i).map_err(|e| VtreeError::EntryRead {
            path: path.to_path_buf(),
            entry: format!("#{}", i),
            reason: e.to_string(),
        })?;
        entries.push(ArchiveEntry {
            path: entry.name().to_string(),
            size: entry.size(),
            is_dir: entry.is_dir(),
        });
    }
    Ok(entries)
}

fn list_tar_like_entries<R: Read>(
    mut archive: TarArchive<R>,
    src: &Path,
) -> Result<Vec<ArchiveEntry>> {
    let mut entries = Vec::new();
    for entry_result in archive.entries().map_err(|e| VtreeError::ListFailed {
        path: src.to_path_buf(),
        reason: e.to_string(),
    })? {
        let entry = entry_result.map_err(|e| VtreeError::EntryRead {
            path: src.to_path_buf(),
            entry: "<unreadable>".to_string(),
            reason: e.to_string(),
        })?;
        let path_str = display_path(&entry.path().map_err(|e| VtreeError::EntryRead {
            path: src.to_path_buf(),
            entry: "<non-unicode>".to_string(),
            reason: e.to_string(),
        })?);
        entries.push(ArchiveEntry {
            path: path_str,
            size: entry.size(),
            is_dir: entry.header().entry_type().is_dir(),
        });
    }
    Ok(entries)
}

fn list_7z_entries(path: &Path) -> Result<Vec<ArchiveEntry>> {
    let file = File::open(path)?;
    let reader = sevenz_rust2::SevenZReader::new(file, SevenZPassword::empty()).map_err(|e| {
        VtreeError::ListFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }
    })?;

    Ok(reader
        .archive()
        .files
        .iter()
        .map(|e| ArchiveEntry {
            path: e.name.clone(),
            size: e.size,
            is_dir: e.is_directory,
        })
        .collect())
}

fn display_path(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(v) => Some(v.to_string_lossy().to_string()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::mpsc::{self, Receiver};
    use tempfile::tempdir;
    use zip::write::SimpleFileOptions;
    use zip::{CompressionMethod, ZipWriter};

    fn progress_channel() -> (Sender<ProgressEvent>, Receiver<ProgressEvent>) {
        mpsc::channel()
    }

    fn no_cancel() -> Arc<AtomicBool> {
        Arc::new(AtomicBool::new(false))
    }

    fn write_sample_zip(path: &Path) {
        let file = File::create(path).expect("create zip file");
        let mut writer = ZipWriter::new(file);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        writer.start_file("x.txt", options).expect("start x.txt");
        writer.write_all(b"hi").expect("write x.txt");
        writer
            .start_file("sub/y.txt", options)
            .expect("start sub/y.txt");
        writer.write_all(b"yo").expect("write sub/y.txt");
        writer.finish().expect("finish zip");
    }

    #[test]
    fn test_extract_zip_end_to_end() {
        let temp = tempdir().expect("create tempdir");
        let archive_path = temp.path().join("a.zip");
        write_sample_zip(&archive_path);

        let dest = temp.path().join("cache").join("a");
        let (tx, rx) = progress_channel();
        let summary = extract(&archive_path, &dest, tx, no_cancel()).expect("extract zip");

        assert_eq!(summary.entries_processed, 2);
        assert_eq!(summary.entries_skipped, 0);
        assert!(!summary.cancelled);
        assert_eq!(
            fs::read(dest.join("x.txt")).expect("read x.txt"),
            b"hi"
        );
        assert_eq!(
            fs::read(dest.join("sub").join("y.txt")).expect("read sub/y.txt"),
            b"yo"
        );

        let events: Vec<ProgressEvent> = rx.try_iter().collect();
        assert_eq!(events.len(), 2);
        assert!(events
            .windows(2)
            .all(|w| w[0].processed_bytes <= w[1].processed_bytes));
        let last = events.last().expect("final progress event");
        assert!(last.processed_bytes >= 4);
    }

    #[test]
    fn test_extract_rejects_traversal_and_writes_nothing() {
        let temp = tempdir().expect("create tempdir");
        let archive_path = temp.path().join("unsafe.zip");
        let file = File::create(&archive_path).expect("create zip file");
        let mut writer = ZipWriter::new(file);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        writer
            .start_file("../../etc/passwd", options)
            .expect("start unsafe entry");
        writer.write_all(b"evil").expect("write unsafe entry");
        writer.finish().expect("finish unsafe zip");

        let dest = temp.path().join("cache").join("b");
        let (tx, _rx) = progress_channel();
        let result = extract(&archive_path, &dest, tx, no_cancel());

        assert!(matches!(result, Err(VtreeError::Traversal { .. })));
        let children: Vec<_> = fs::read_dir(&dest)
            .expect("destination exists")
            .collect();
        assert!(children.is_empty());
        assert!(!temp.path().join("etc").exists());
    }

    #[test]
    fn test_extract_aborts_even_when_safe_entries_come_first() {
        let temp = tempdir().expect("create tempdir");
        let archive_path = temp.path().join("mixed.zip");
        let file = File::create(&archive_path).expect("create zip file");
        let mut writer = ZipWriter::new(file);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        writer.start_file("safe.txt", options).expect("start safe");
        writer.write_all(b"safe").expect("write safe");
        writer
            .start_file("../evil.txt", options)
            .expect("start evil");
        writer.write_all(b"evil").expect("write evil");
        writer.finish().expect("finish zip");

        let dest = temp.path().join("dest");
        let (tx, _rx) = progress_channel();
        let result = extract(&archive_path, &dest, tx, no_cancel());

        // Fail-closed: prior safe entries may remain, but the job errors and
        // nothing lands outside the destination root.
        assert!(matches!(result, Err(VtreeError::Traversal { .. })));
        assert!(!temp.path().join("evil.txt").exists());
    }

    #[test]
    fn test_extract_overwrites_existing_destination_files() {
        let temp = tempdir().expect("create tempdir");
        let archive_path = temp.path().join("a.zip");
        write_sample_zip(&archive_path);

        let dest = temp.path().join("dest");
        fs::create_dir_all(&dest).expect("create dest");
        fs::write(dest.join("x.txt"), b"stale-old-content").expect("seed stale file");

        let (tx, _rx) = progress_channel();
        let summary = extract(&archive_path, &dest, tx, no_cancel()).expect("re-extract");
        assert_eq!(summary.entries_skipped, 0);
        assert_eq!(fs::read(dest.join("x.txt")).expect("read x.txt"), b"hi");
    }

    #[test]
    fn test_extract_unsupported_format_errors() {
        let temp = tempdir().expect("create tempdir");
        let path = temp.path().join("notes.txt");
        fs::write(&path, b"not an archive").expect("write file");

        let (tx, _rx) = progress_channel();
        let result = extract(&path, &temp.path().join("dest"), tx, no_cancel());
        assert!(matches!(result, Err(VtreeError::UnsupportedFormat { .. })));
    }

    #[test]
    fn test_extract_cancelled_before_first_entry() {
        let temp = tempdir().expect("create tempdir");
        let archive_path = temp.path().join("a.zip");
        write_sample_zip(&archive_path);

        let cancel = Arc::new(AtomicBool::new(true));
        let (tx, _rx) = progress_channel();
        let summary = extract(&archive_path, &temp.path().join("dest"), tx, cancel)
            .expect("cancelled extract still returns a summary");
        assert!(summary.cancelled);
        assert_eq!(summary.entries_processed, 0);
    }

    #[test]
    fn test_extract_tar_gz_round_trip() {
        let temp = tempdir().expect("create tempdir");
        let src_dir = temp.path().join("src");
        fs::create_dir_all(src_dir.join("nested")).expect("create src tree");
        fs::write(src_dir.join("alpha.txt"), b"alpha").expect("write alpha");
        fs::write(src_dir.join("nested").join("beta.txt"), b"beta").expect("write beta");

        let archive_path = temp.path().join("sample.tar.gz");
        let file = File::create(&archive_path).expect("create tar.gz");
        let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        let mut builder = tar::Builder::new(encoder);
        builder
            .append_dir_all("src", &src_dir)
            .expect("append sources");
        builder
            .into_inner()
            .expect("finish tar")
            .finish()
            .expect("finish gz");

        let dest = temp.path().join("dest");
        let (tx, rx) = progress_channel();
        let summary = extract(&archive_path, &dest, tx, no_cancel()).expect("extract tar.gz");
        assert_eq!(summary.entries_skipped, 0);
        assert_eq!(
            fs::read(dest.join("src").join("alpha.txt")).expect("read alpha"),
            b"alpha"
        );
        assert_eq!(
            fs::read(dest.join("src").join("nested").join("beta.txt")).expect("read beta"),
            b"beta"
        );

        let events: Vec<ProgressEvent> = rx.try_iter().collect();
        assert!(events
            .windows(2)
            .all(|w| w[0].processed_bytes <= w[1].processed_bytes));
    }

    #[test]
    fn test_list_entries_zip() {
        let temp = tempdir().expect("create tempdir");
        let archive_path = temp.path().join("a.zip");
        write_sample_zip(&archive_path);

        let entries = list_entries(&archive_path).expect("list zip entries");
        assert!(entries.iter().any(|e| e.path == "x.txt" && !e.is_dir));
        assert!(entries.iter().any(|e| e.path == "sub/y.txt"));
    }

    #[test]
    fn test_detect_archive_format() {
        assert_eq!(
            detect_archive_format(Path::new("/tmp/a.zip")),
            Some(ArchiveFormat::Zip)
        );
        assert_eq!(
            detect_archive_format(Path::new("/tmp/a.apk")),
            Some(ArchiveFormat::Apk)
        );
        assert_eq!(
            detect_archive_format(Path::new("/tmp/a.tar.gz")),
            Some(ArchiveFormat::TarGz)
        );
        assert_eq!(
            detect_archive_format(Path::new("/tmp/a.tzst")),
            Some(ArchiveFormat::TarZst)
        );
        assert_eq!(
            detect_archive_format(Path::new("/tmp/a.7z")),
            Some(ArchiveFormat::SevenZ)
        );
        assert_eq!(detect_archive_format(Path::new("/tmp/a.txt")), None);
    }
}
