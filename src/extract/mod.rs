//! # Extraction Module
//!
//! Sequential decoding of a `.tar.lz4` container back into a directory tree.
//!
//! The reader chain is: container file, raw byte meter, buffered reader,
//! [`ConcatenatedFrames`] (one LZ4 frame per slice), `tar::Archive`. Progress
//! is estimated from raw container bytes consumed, since the uncompressed total
//! is unknown up front.

mod frames;

pub use frames::ConcatenatedFrames;

use std::collections::HashSet;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::common::{strip_container_extension, EntryKind, CONTAINER_EXTENSION};
use crate::error::{ArchiverError, IoContext, Result};
use crate::fsx as fs;
use crate::logging::VerboseLog;
use crate::options::DecompressOptions;
use crate::progress::{MeteredReader, ProgressCallback, ProgressMonitor, ProgressTracker, ThreadMetrics};

/// One entry reported by [`Decompressor::list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedEntry {
    pub path: PathBuf,
    pub kind: EntryKind,
    pub size: u64,
}

/// Totals of one extraction run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractSummary {
    pub files: u64,
    pub directories: u64,
    pub bytes: u64,
    pub skipped: u64,
}

type ContainerReader = ConcatenatedFrames<BufReader<MeteredReader<fs::File>>>;

/// Extracts containers with a fixed set of options.
#[derive(Clone, Default)]
pub struct Decompressor {
    options: DecompressOptions,
    progress_callback: Option<Arc<ProgressCallback>>,
}

impl std::fmt::Debug for Decompressor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Decompressor")
            .field("options", &self.options)
            .field("progress_callback", &self.progress_callback.is_some())
            .finish()
    }
}

impl Decompressor {
    pub fn new(options: DecompressOptions) -> Self {
        Self { options, progress_callback: None }
    }

    /// Delivers every progress milestone to `callback` as well as the log.
    /// Setting a callback turns progress monitoring on.
    pub fn with_progress_callback(mut self, callback: Arc<ProgressCallback>) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    pub fn options(&self) -> &DecompressOptions {
        &self.options
    }

    /// Extracts `source_file` under `destination_dir/<base name>` and returns
    /// that output root. A failure is logged at ERROR before it is returned.
    pub fn decompress(&self, source_file: &Path, destination_dir: &Path) -> Result<PathBuf> {
        let log = VerboseLog::new(self.options.verbosity);
        self.try_decompress(source_file, destination_dir, log).inspect_err(|e| {
            log.error(format_args!(
                "could not extract {} into {}: {e}",
                source_file.display(),
                destination_dir.display()
            ))
        })
    }

    fn try_decompress(&self, source_file: &Path, destination_dir: &Path, log: VerboseLog) -> Result<PathBuf> {
        let base = validate_container(source_file)?;
        let out_root = destination_dir.join(base);
        fs::create_dir_all(&out_root).at(&out_root)?;

        let container_len = fs::metadata(source_file).at(source_file)?.len();
        let tracker = ProgressTracker::new("decompression", 1, 0, container_len, self.options.progress_interval);
        let tracker = Arc::new(match &self.progress_callback {
            Some(callback) => tracker.with_callback(Arc::clone(callback)),
            None => tracker,
        });
        let metrics = tracker
            .get_thread_metrics(0)
            .unwrap_or_else(|| Arc::new(ThreadMetrics::new()));
        let monitor = if self.options.progress || self.progress_callback.is_some() {
            Some(ProgressMonitor::spawn(Arc::clone(&tracker), Duration::from_millis(100))?)
        } else {
            None
        };

        log.debug(format_args!(
            "extracting {} ({container_len} bytes) into {}",
            source_file.display(),
            out_root.display()
        ));
        let mut reader = open_container(source_file, self.options.effective_buffer_size(), metrics)?;
        let summary = unpack_all(&mut reader, source_file, &out_root, self.options.effective_buffer_size(), log)?;
        // tar stops at its terminator; the rest of the last frame is still unread
        io::copy(&mut reader, &mut io::sink()).at(source_file)?;

        if let Some(monitor) = monitor {
            monitor.finish();
        }
        log.info(format_args!(
            "extracted {} file(s), {} dir(s), {} byte(s) into {}",
            summary.files,
            summary.directories,
            summary.bytes,
            out_root.display()
        ));
        if summary.skipped > 0 {
            log.warn(format_args!("skipped {} unsupported entr(ies)", summary.skipped));
        }
        Ok(out_root)
    }

    /// Enumerates the container without writing anything. Directories that
    /// appear in several slices are reported once.
    pub fn list(&self, source_file: &Path) -> Result<Vec<ListedEntry>> {
        validate_container(source_file)?;
        let reader = open_container(
            source_file,
            self.options.effective_buffer_size(),
            Arc::new(ThreadMetrics::new()),
        )?;
        let mut archive = tar::Archive::new(reader);
        let mut seen_dirs = HashSet::new();
        let mut listed = Vec::new();
        for entry in archive.entries().at(source_file)? {
            let entry = entry.at(source_file)?;
            let path = entry.path().at(source_file)?.into_owned();
            let entry_type = entry.header().entry_type();
            let kind = if entry_type.is_dir() {
                if !seen_dirs.insert(path.clone()) {
                    continue;
                }
                EntryKind::Directory
            } else if entry_type.is_file() {
                EntryKind::File
            } else {
                continue;
            };
            listed.push(ListedEntry { path, kind, size: entry.size() });
        }
        Ok(listed)
    }
}

/// Checks that `source_file` is an existing regular file named `*.tar.lz4`
/// and returns its base name.
fn validate_container(source_file: &Path) -> Result<String> {
    let meta = fs::metadata(source_file)
        .map_err(|_| ArchiverError::invalid_input(source_file, "source file does not exist"))?;
    if !meta.is_file() {
        return Err(ArchiverError::invalid_input(source_file, "source is not a regular file"));
    }
    let name = source_file
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ArchiverError::invalid_input(source_file, "source file name is not valid UTF-8"))?;
    strip_container_extension(name)
        .map(str::to_string)
        .ok_or_else(|| {
            ArchiverError::invalid_input(source_file, format!("source file must end with {CONTAINER_EXTENSION}"))
        })
}

fn open_container(path: &Path, buffer_size: usize, metrics: Arc<ThreadMetrics>) -> Result<ContainerReader> {
    let file = fs::File::open(path).at(path)?;
    let buffered = BufReader::with_capacity(buffer_size, MeteredReader::new(file, metrics));
    Ok(ConcatenatedFrames::new(buffered))
}

fn unpack_all<R: Read>(
    reader: R,
    container: &Path,
    out_root: &Path,
    buffer_size: usize,
    log: VerboseLog,
) -> Result<ExtractSummary> {
    let mut archive = tar::Archive::new(reader);
    let mut summary = ExtractSummary::default();
    let mut seen_dirs = HashSet::new();
    let mut buf = vec![0u8; buffer_size];

    for entry in archive.entries().at(container)? {
        let mut entry = entry.at(container)?;
        let name = entry.path().at(container)?.into_owned();
        unpack_entry(&mut entry, &name, out_root, &mut seen_dirs, &mut summary, &mut buf, log).inspect_err(|e| {
            log.error(format_args!("error extracting entry {}: {e}", name.display()))
        })?;
    }
    Ok(summary)
}

fn unpack_entry<R: Read>(
    entry: &mut tar::Entry<'_, R>,
    name: &Path,
    out_root: &Path,
    seen_dirs: &mut HashSet<PathBuf>,
    summary: &mut ExtractSummary,
    buf: &mut [u8],
    log: VerboseLog,
) -> Result<()> {
    let target = out_root.join(sanitize_entry_path(name)?);
    let entry_type = entry.header().entry_type();

    if entry_type.is_dir() {
        fs::create_dir_all(&target).at(&target)?;
        // every slice repeats the directories it passes through
        if seen_dirs.insert(target) {
            summary.directories += 1;
        }
    } else if entry_type.is_file() {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).at(parent)?;
        }
        let size = entry.size();
        let mode = entry.header().mode().ok();
        copy_entry(entry, name, &target, size, buf)?;
        if let Some(mode) = mode {
            fs::set_unix_permissions(&target, mode & 0o7777).at(&target)?;
        }
        summary.files += 1;
        summary.bytes += size;
    } else {
        log.warn(format_args!(
            "skipping unsupported entry {} ({:?})",
            name.display(),
            entry_type
        ));
        summary.skipped += 1;
    }
    Ok(())
}

/// Copies exactly `size` bytes of the entry body into a fresh file at `target`.
fn copy_entry<R: Read>(entry: &mut R, name: &Path, target: &Path, size: u64, buf: &mut [u8]) -> Result<()> {
    let entry_err = |source: io::Error| ArchiverError::Entry { entry: name.to_path_buf(), source };

    let mut out = BufWriter::with_capacity(buf.len(), fs::File::create(target).at(target)?);
    let mut remaining = size;
    while remaining > 0 {
        let want = buf.len().min(remaining.min(usize::MAX as u64) as usize);
        let n = fs::read_full(entry, &mut buf[..want]).map_err(entry_err)?;
        if n == 0 {
            return Err(entry_err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("stream ended with {remaining} of {size} byte(s) missing"),
            )));
        }
        out.write_all(&buf[..n]).at(target)?;
        remaining -= n as u64;
    }
    out.flush().at(target)?;
    Ok(())
}

/// Rejects absolute paths and any `..` component.
fn sanitize_entry_path(name: &Path) -> Result<PathBuf> {
    let mut clean = PathBuf::new();
    for component in name.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(ArchiverError::UnsafePath { entry: name.to_path_buf() });
            }
        }
    }
    if clean.as_os_str().is_empty() {
        return Err(ArchiverError::UnsafePath { entry: name.to_path_buf() });
    }
    Ok(clean)
}
