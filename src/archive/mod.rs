//! # Slice Archiver
//!
//! Writes one slice of the tree as a partial tar stream inside its own LZ4
//! frame. Every slice re-runs the canonical walk, emits every directory entry
//! it meets and only the files whose index falls inside its range.
//!
//! Only the last slice keeps the tar terminator (two 512-byte zero blocks).
//! The other slices route the builder through a [`TrailerGate`] that swallows
//! the terminator, so that concatenating all slices yields one valid archive.

use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::ops::Range;
use std::path::Path;
use std::sync::Arc;

use lz4_flex::frame::FrameEncoder;

use crate::common::{FileIndex, TreeEntry};
use crate::error::{ArchiverError, Result};
use crate::logging::VerboseLog;
use crate::progress::{MeteredReader, ThreadMetrics};
use crate::walk::CanonicalWalk;

/// Size of the tar end-of-archive marker.
pub const TAR_TRAILER_LEN: u64 = 1024;

/// Everything one slice task needs.
#[derive(Debug, Clone)]
pub struct SliceJob<'a> {
    pub walk: &'a CanonicalWalk,
    pub range: Range<FileIndex>,
    pub slice: usize,
    pub is_last: bool,
    pub buffer_size: usize,
}

/// What a finished slice wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SliceSummary {
    pub slice: usize,
    pub files: u64,
    pub directories: u64,
    /// Uncompressed file bytes written.
    pub bytes: u64,
}

/// Writer that forwards bytes until sealed, then swallows and checks them.
///
/// After [`seal`](Self::seal) every byte must be zero and exactly
/// [`TAR_TRAILER_LEN`] bytes must arrive before [`into_inner`](Self::into_inner).
pub struct TrailerGate<W> {
    inner: W,
    sealed: bool,
    swallowed: u64,
    all_zero: bool,
}

impl<W: Write> TrailerGate<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, sealed: false, swallowed: 0, all_zero: true }
    }

    /// Stop forwarding; everything written from now on is the trailer.
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    pub fn into_inner(self) -> Result<W> {
        if self.sealed && (self.swallowed != TAR_TRAILER_LEN || !self.all_zero) {
            return Err(ArchiverError::Format(format!(
                "expected a {TAR_TRAILER_LEN}-byte zero tar trailer, got {} byte(s){}",
                self.swallowed,
                if self.all_zero { "" } else { " with non-zero content" }
            )));
        }
        Ok(self.inner)
    }
}

impl<W: Write> Write for TrailerGate<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.sealed {
            self.swallowed += buf.len() as u64;
            self.all_zero &= buf.iter().all(|b| *b == 0);
            return Ok(buf.len());
        }
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Yields exactly `expected` bytes from `inner`, failing if the source is
/// shorter or longer than that.
struct ExactLen<R> {
    inner: R,
    remaining: u64,
    expected: u64,
}

impl<R: Read> ExactLen<R> {
    fn new(inner: R, expected: u64) -> Self {
        Self { inner, remaining: expected, expected }
    }
}

impl<R: Read> Read for ExactLen<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 {
            let mut extra = [0u8; 1];
            return match self.inner.read(&mut extra)? {
                0 => Ok(0),
                _ => Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("file grew past its recorded size of {} bytes", self.expected),
                )),
            };
        }
        if buf.is_empty() {
            return Ok(0);
        }
        let want = buf.len().min(self.remaining.min(usize::MAX as u64) as usize);
        let n = self.inner.read(&mut buf[..want])?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "file shrank: {} of {} recorded bytes read",
                    self.expected - self.remaining,
                    self.expected
                ),
            ));
        }
        self.remaining -= n as u64;
        Ok(n)
    }
}

/// Archives one slice into `sink`.
///
/// The sink receives one complete LZ4 frame. Any I/O failure, including a walk
/// error or a file whose length changed while being read, fails the slice.
pub fn archive_slice<W: Write>(
    job: &SliceJob<'_>,
    sink: W,
    metrics: &Arc<ThreadMetrics>,
    log: VerboseLog,
) -> Result<SliceSummary> {
    log.debug(format_args!(
        "slice {} started: files [{}, {}){}",
        job.slice,
        job.range.start,
        job.range.end,
        if job.is_last { ", keeps trailer" } else { "" }
    ));

    let mut builder = tar::Builder::new(TrailerGate::new(FrameEncoder::new(sink)));
    builder.follow_symlinks(false);

    let mut summary = SliceSummary { slice: job.slice, ..SliceSummary::default() };
    for item in job.walk.iter() {
        let item = item?;
        match item.index {
            None => {
                builder
                    .append_dir(&item.entry.archive_path, &item.entry.absolute_path)
                    .map_err(|e| entry_error(&item.entry, e))?;
                summary.directories += 1;
            }
            Some(index) if job.range.contains(&index) => {
                let bytes = append_file(&mut builder, &item.entry, job.buffer_size, metrics)?;
                metrics.record_file_processed();
                summary.files += 1;
                summary.bytes += bytes;
            }
            Some(_) => {}
        }
    }

    if !job.is_last {
        builder.get_mut().seal();
    }
    let gate = builder.into_inner()?;
    let encoder = gate.into_inner()?;
    let mut sink = encoder.finish().map_err(io::Error::other)?;
    sink.flush()?;

    log.debug(format_args!(
        "slice {} finished: {} file(s), {} dir(s), {} byte(s)",
        job.slice, summary.files, summary.directories, summary.bytes
    ));
    Ok(summary)
}

fn append_file<W: Write>(
    builder: &mut tar::Builder<W>,
    entry: &TreeEntry,
    buffer_size: usize,
    metrics: &Arc<ThreadMetrics>,
) -> Result<u64> {
    let file = File::open(&entry.absolute_path).map_err(|e| entry_error(entry, e))?;
    let meta = file.metadata().map_err(|e| entry_error(entry, e))?;

    let mut header = tar::Header::new_gnu();
    header.set_metadata(&meta);
    let size = meta.len();

    let reader = BufReader::with_capacity(buffer_size.max(1), MeteredReader::new(file, Arc::clone(metrics)));
    builder
        .append_data(&mut header, &entry.archive_path, ExactLen::new(reader, size))
        .map_err(|e| entry_error(entry, e))?;
    Ok(size)
}

fn entry_error(entry: &TreeEntry, source: io::Error) -> ArchiverError {
    ArchiverError::Entry { entry: entry.archive_path.clone(), source }
}

/// Archives `job` into a fresh file at `path`.
pub fn archive_slice_to_path(
    job: &SliceJob<'_>,
    path: &Path,
    metrics: &Arc<ThreadMetrics>,
    log: VerboseLog,
) -> Result<SliceSummary> {
    let file = File::create(path).map_err(|e| ArchiverError::io(e, path))?;
    let sink = io::BufWriter::with_capacity(job.buffer_size.max(1), file);
    archive_slice(job, sink, metrics, log)
}
