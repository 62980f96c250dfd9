use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, ArchiverError>;

/// The primary error type for all operations in the `tarlz4` crate.
#[derive(Debug, thiserror::Error)]
pub enum ArchiverError {
    /// An I/O error occurred, typically while reading or writing a file.
    /// Includes the path where the error happened.
    #[error("I/O error on path '{}': {source}", .path.display())]
    Io { source: io::Error, path: PathBuf },

    /// The caller handed us something we refuse to work on (missing source,
    /// wrong file type, wrong extension). Raised before any work starts.
    #[error("invalid input '{}': {reason}", .path.display())]
    InvalidInput { path: PathBuf, reason: String },

    /// An error occurred when trying to strip a prefix from a file path.
    #[error("could not strip prefix '{}' from path '{}'", .prefix.display(), .path.display())]
    StripPrefix { prefix: PathBuf, path: PathBuf },

    /// The directory walk itself failed (unreadable directory, loop, ...).
    #[error("directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),

    /// An archive entry could not be written or read in full.
    #[error("entry '{}': {source}", .entry.display())]
    Entry { entry: PathBuf, source: io::Error },

    /// An archive entry would land outside the extraction root.
    #[error("refusing to extract unsafe entry path '{}'", .entry.display())]
    UnsafePath { entry: PathBuf },

    /// One of the container prerequisites (fixed tar trailer, frame
    /// concatenation) did not hold.
    #[error("container format violation: {0}")]
    Format(String),

    /// One or more pool tasks failed. Every task was still joined before this
    /// error was produced.
    #[error("{}", summarize_tasks(.phase, .total, .failures))]
    Tasks {
        phase: TaskPhase,
        total: usize,
        failures: Vec<SliceFailure>,
    },

    /// A pool task panicked or never reported back.
    #[error("worker task panicked: {0}")]
    Panicked(String),

    /// Options file could not be parsed.
    #[error("configuration error: {0}")]
    Config(#[from] serde_json::Error),

    /// The default worker pool could not be started.
    #[error("could not build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

/// Which fan-out stage a task belonged to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskPhase {
    Archive,
    Merge,
}

impl fmt::Display for TaskPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskPhase::Archive => f.write_str("archive"),
            TaskPhase::Merge => f.write_str("merge"),
        }
    }
}

/// A single failed task inside [`ArchiverError::Tasks`].
#[derive(Debug)]
pub struct SliceFailure {
    pub slice: usize,
    pub error: ArchiverError,
}

fn summarize_tasks(phase: &TaskPhase, total: &usize, failures: &[SliceFailure]) -> String {
    match failures.first() {
        Some(first) => format!(
            "{} of {} {} task(s) failed; first failure in slice {}: {}",
            failures.len(),
            total,
            phase,
            first.slice,
            first.error
        ),
        None => format!("{phase} tasks reported failure without details"),
    }
}

impl ArchiverError {
    /// Wraps an `io::Error` with the path it happened on.
    pub fn io(source: io::Error, path: impl AsRef<Path>) -> Self {
        ArchiverError::Io { source, path: path.as_ref().to_path_buf() }
    }

    pub(crate) fn invalid_input(path: impl AsRef<Path>, reason: impl Into<String>) -> Self {
        ArchiverError::InvalidInput { path: path.as_ref().to_path_buf(), reason: reason.into() }
    }

    /// Collapses per-slice results into one error, or `Ok(values)` in slice order.
    pub(crate) fn collect_tasks<T>(
        phase: TaskPhase,
        results: Vec<Result<T>>,
    ) -> Result<Vec<T>> {
        let total = results.len();
        let mut values = Vec::with_capacity(total);
        let mut failures = Vec::new();
        for (slice, res) in results.into_iter().enumerate() {
            match res {
                Ok(v) => values.push(v),
                Err(error) => failures.push(SliceFailure { slice, error }),
            }
        }
        if failures.is_empty() {
            Ok(values)
        } else {
            Err(ArchiverError::Tasks { phase, total, failures })
        }
    }
}

/// Attaches a path to bare `io::Result`s.
pub(crate) trait IoContext<T> {
    fn at(self, path: impl AsRef<Path>) -> Result<T>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn at(self, path: impl AsRef<Path>) -> Result<T> {
        self.map_err(|e| ArchiverError::io(e, path))
    }
}

// Generic IO error conversion that doesn't require a path
impl From<io::Error> for ArchiverError {
    fn from(err: io::Error) -> Self {
        ArchiverError::Io { source: err, path: PathBuf::new() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collect_tasks_keeps_slice_order() {
        let res: Vec<Result<u32>> = vec![Ok(1), Ok(2), Ok(3)];
        let values = ArchiverError::collect_tasks(TaskPhase::Archive, res).unwrap();
        assert_eq!(values, vec![1, 2, 3]);
    }

    #[test]
    fn collect_tasks_reports_every_failure() {
        let res: Vec<Result<u32>> = vec![
            Ok(1),
            Err(ArchiverError::Format("bad trailer".into())),
            Err(ArchiverError::io(io::Error::other("disk"), "/tmp/x")),
        ];
        let err = ArchiverError::collect_tasks(TaskPhase::Merge, res).unwrap_err();
        match &err {
            ArchiverError::Tasks { phase, total, failures } => {
                assert_eq!(*phase, TaskPhase::Merge);
                assert_eq!(*total, 3);
                assert_eq!(failures.len(), 2);
                assert_eq!(failures[0].slice, 1);
                assert_eq!(failures[1].slice, 2);
            }
            other => panic!("unexpected error {other:?}"),
        }
        let msg = err.to_string();
        assert!(msg.contains("2 of 3 merge task(s) failed"), "{msg}");
        assert!(msg.contains("bad trailer"), "{msg}");
    }
}
