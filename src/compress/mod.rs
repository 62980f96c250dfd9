//! # Compression Pipeline
//!
//! Orchestrates one compress call:
//!
//! 1. validate inputs and plan byte-balanced slices over the canonical walk;
//! 2. archive every slice into its own artifact on the task pool;
//! 3. after the barrier, merge the artifacts into the destination.
//!
//! With fewer than two threads, or when the tree only yields one slice, the
//! archiver writes straight into the destination and no merge happens.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::archive::{archive_slice_to_path, SliceJob, SliceSummary};
use crate::common::{container_path, slice_artifact_path};
use crate::error::{ArchiverError, IoContext, Result, TaskPhase};
use crate::fsx as fs;
use crate::inventory::{compute_partition, Inventory};
use crate::logging::VerboseLog;
use crate::merge::{merge, remove_artifacts};
use crate::options::CompressOptions;
use crate::progress::{ProgressCallback, ProgressMonitor, ProgressTracker};
use crate::walk::{root_name_of, CanonicalWalk};
use crate::workers::{default_pool, run_tasks, TaskPool};

const MONITOR_PERIOD: Duration = Duration::from_millis(100);

/// Compresses directory trees with a fixed set of options.
#[derive(Clone)]
pub struct Compressor {
    options: CompressOptions,
    pool: Option<Arc<dyn TaskPool>>,
    progress_callback: Option<Arc<ProgressCallback>>,
}

impl std::fmt::Debug for Compressor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Compressor")
            .field("options", &self.options)
            .field("injected_pool", &self.pool.is_some())
            .field("progress_callback", &self.progress_callback.is_some())
            .finish()
    }
}

impl Compressor {
    /// Uses a private rayon pool sized from `options.threads`, built per call.
    pub fn new(options: CompressOptions) -> Self {
        Self { options, pool: None, progress_callback: None }
    }

    /// Runs both fan-out phases on `pool` instead.
    pub fn with_pool(options: CompressOptions, pool: Arc<dyn TaskPool>) -> Self {
        Self { options, pool: Some(pool), progress_callback: None }
    }

    /// Delivers every progress milestone to `callback` as well as the log.
    /// Setting a callback turns progress monitoring on.
    pub fn with_progress_callback(mut self, callback: Arc<ProgressCallback>) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    pub fn options(&self) -> &CompressOptions {
        &self.options
    }

    /// Archives `source_dir` into `<destination_dir>/<base_name>.tar.lz4`.
    ///
    /// A failure is logged at ERROR with source and destination before it is
    /// returned.
    pub fn compress(&self, source_dir: &Path, destination_dir: &Path, base_name: &str) -> Result<PathBuf> {
        let log = VerboseLog::new(self.options.verbosity);
        self.try_compress(source_dir, destination_dir, base_name, log)
            .inspect_err(|e| {
                log.error(format_args!(
                    "could not compress {} to {}: {e}",
                    source_dir.display(),
                    container_path(destination_dir, base_name).display()
                ))
            })
    }

    fn try_compress(
        &self,
        source_dir: &Path,
        destination_dir: &Path,
        base_name: &str,
        log: VerboseLog,
    ) -> Result<PathBuf> {
        let source = validate_inputs(source_dir, destination_dir, base_name)?;
        let destination = container_path(destination_dir, base_name);

        let walk = CanonicalWalk::new(&source, root_name_of(&source), self.options.excludes.clone());
        let inventory = compute_partition(&walk, self.options.threads.max(1))?;
        log.debug(format_args!(
            "{}: {} file(s), {} byte(s), {} slice(s)",
            source.display(),
            inventory.file_count,
            inventory.total_bytes,
            inventory.plan.slice_count()
        ));

        // Any early return below leaves no partial container behind.
        let cleanup = scopeguard::guard(destination.clone(), |dest| {
            if let Err(e) = fs::remove_file_if_exists(&dest) {
                log.warn(format_args!("could not remove partial container {}: {e}", dest.display()));
            }
        });

        if self.options.threads < 2 || inventory.plan.slice_count() < 2 {
            self.compress_direct(&walk, &inventory, &destination, log)?;
        } else {
            self.compress_sliced(&walk, &inventory, &destination, log)?;
        }

        let destination = scopeguard::ScopeGuard::into_inner(cleanup);
        log.info(format_args!(
            "created {} from {} file(s), {} byte(s)",
            destination.display(),
            inventory.file_count,
            inventory.total_bytes
        ));
        Ok(destination)
    }

    /// Same as [`compress`](Self::compress), named after the source directory.
    pub fn compress_default_name(&self, source_dir: &Path, destination_dir: &Path) -> Result<PathBuf> {
        let canonical = fs::canonicalize(source_dir)
            .map_err(|_| ArchiverError::invalid_input(source_dir, "source directory does not exist"))?;
        let base = root_name_of(&canonical);
        let base = base
            .to_str()
            .ok_or_else(|| ArchiverError::invalid_input(source_dir, "source directory name is not valid UTF-8"))?;
        self.compress(source_dir, destination_dir, base)
    }

    fn compress_direct(
        &self,
        walk: &CanonicalWalk,
        inventory: &Inventory,
        destination: &Path,
        log: VerboseLog,
    ) -> Result<SliceSummary> {
        let tracker = Arc::new(self.tracker(inventory, 1));
        let monitor = self.start_monitor(&tracker)?;
        let metrics = tracker.get_thread_metrics(0).unwrap_or_default();

        let job = SliceJob {
            walk,
            range: 0..inventory.file_count,
            slice: 0,
            is_last: true,
            buffer_size: self.options.effective_buffer_size(),
        };
        let summary = archive_slice_to_path(&job, destination, &metrics, log)?;
        tracker.record_slice_completed();
        if let Some(monitor) = monitor {
            monitor.finish();
        }
        Ok(summary)
    }

    fn compress_sliced(
        &self,
        walk: &CanonicalWalk,
        inventory: &Inventory,
        destination: &Path,
        log: VerboseLog,
    ) -> Result<()> {
        let slices = inventory.plan.slice_count();
        let pool = match &self.pool {
            Some(pool) => Arc::clone(pool),
            None => default_pool(self.options.threads.min(slices))?,
        };
        log.debug(format_args!("archiving {slices} slice(s) on {} worker(s)", pool.parallelism()));

        let artifacts: Vec<PathBuf> = (0..slices).map(|i| slice_artifact_path(destination, i)).collect();
        let artifact_guard = scopeguard::guard(&artifacts, |artifacts| remove_artifacts(artifacts, log));

        let tracker = Arc::new(self.tracker(inventory, slices));
        let monitor = self.start_monitor(&tracker)?;
        let buffer_size = self.options.effective_buffer_size();

        let tasks: Vec<_> = inventory
            .plan
            .ranges()
            .iter()
            .zip(artifacts.iter())
            .enumerate()
            .map(|(slice, (range, artifact))| {
                let tracker = &tracker;
                move || {
                    let job = SliceJob {
                        walk,
                        range: range.clone(),
                        slice,
                        is_last: slice + 1 == slices,
                        buffer_size,
                    };
                    let metrics = tracker.get_thread_metrics(slice).unwrap_or_default();
                    let summary = archive_slice_to_path(&job, artifact, &metrics, log)?;
                    tracker.record_slice_completed();
                    Ok(summary)
                }
            })
            .collect();
        let results = run_tasks(pool.as_ref(), tasks);
        if let Some(monitor) = monitor {
            monitor.finish();
        }
        let summaries = ArchiverError::collect_tasks(TaskPhase::Archive, results)?;
        for s in &summaries {
            log.debug(format_args!(
                "slice {}: {} file(s), {} byte(s), artifact {}",
                s.slice,
                s.files,
                s.bytes,
                artifacts[s.slice].display()
            ));
        }

        // merge removes the artifacts itself, success or not
        let artifacts = scopeguard::ScopeGuard::into_inner(artifact_guard);
        let plan = merge(artifacts, destination, buffer_size, pool.as_ref(), log)?;
        log.debug(format_args!("merged {} slice(s) into {} byte(s)", plan.slice_count(), plan.total_len));
        Ok(())
    }

    fn tracker(&self, inventory: &Inventory, slices: usize) -> ProgressTracker {
        let tracker = ProgressTracker::new(
            "compression",
            slices,
            inventory.file_count,
            inventory.total_bytes,
            self.options.progress_interval,
        );
        match &self.progress_callback {
            Some(callback) => tracker.with_callback(Arc::clone(callback)),
            None => tracker,
        }
    }

    fn start_monitor(&self, tracker: &Arc<ProgressTracker>) -> Result<Option<ProgressMonitor>> {
        if !self.options.progress && self.progress_callback.is_none() {
            return Ok(None);
        }
        let monitor = ProgressMonitor::spawn(Arc::clone(tracker), MONITOR_PERIOD)?;
        Ok(Some(monitor))
    }
}

/// Fails fast on anything that would make the run pointless. Returns the
/// canonical source path.
fn validate_inputs(source_dir: &Path, destination_dir: &Path, base_name: &str) -> Result<PathBuf> {
    let meta = fs::metadata(source_dir)
        .map_err(|_| ArchiverError::invalid_input(source_dir, "source directory does not exist"))?;
    if !meta.is_dir() {
        return Err(ArchiverError::invalid_input(source_dir, "source is not a directory"));
    }
    if !destination_dir.is_dir() {
        return Err(ArchiverError::invalid_input(destination_dir, "destination directory does not exist"));
    }
    if base_name.is_empty() || Path::new(base_name).components().count() != 1 || base_name == "." || base_name == ".." {
        return Err(ArchiverError::invalid_input(
            destination_dir.join(base_name),
            "base name must be a single non-empty path component",
        ));
    }

    let source = fs::canonicalize(source_dir).at(source_dir)?;
    let destination = fs::canonicalize(destination_dir).at(destination_dir)?;
    if destination.starts_with(&source) {
        return Err(ArchiverError::invalid_input(
            destination_dir,
            "destination directory lies inside the source tree",
        ));
    }
    Ok(source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn small_tree(root: &Path) {
        fs::create_dir_all(root.join("a")).unwrap();
        fs::create_dir_all(root.join("b")).unwrap();
        fs::write(root.join("a/1.txt"), b"abc").unwrap();
        fs::write(root.join("a/2.txt"), vec![b'q'; 9000]).unwrap();
        fs::write(root.join("b/3.txt"), b"!").unwrap();
    }

    #[test]
    fn rejects_invalid_inputs_before_any_work() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        small_tree(&src);
        let out = dir.path().join("out");
        fs::create_dir(&out).unwrap();
        let c = Compressor::new(CompressOptions::default());

        let missing = c.compress(&dir.path().join("none"), &out, "x");
        assert!(matches!(missing, Err(ArchiverError::InvalidInput { .. })));

        let file_src = c.compress(&src.join("a/1.txt"), &out, "x");
        assert!(matches!(file_src, Err(ArchiverError::InvalidInput { .. })));

        let no_dest = c.compress(&src, &dir.path().join("nowhere"), "x");
        assert!(matches!(no_dest, Err(ArchiverError::InvalidInput { .. })));

        let nested = c.compress(&src, &src.join("a"), "x");
        assert!(matches!(nested, Err(ArchiverError::InvalidInput { .. })));

        let bad_name = c.compress(&src, &out, "a/b");
        assert!(matches!(bad_name, Err(ArchiverError::InvalidInput { .. })));

        assert_eq!(fs::read_dir(&out).unwrap().count(), 0);
    }

    #[test]
    fn sliced_run_leaves_only_the_container() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        small_tree(&src);
        let out = dir.path().join("out");
        fs::create_dir(&out).unwrap();

        let c = Compressor::new(CompressOptions::new().threads(3));
        let path = c.compress(&src, &out, "pack").unwrap();
        assert_eq!(path, out.join("pack.tar.lz4"));

        let names: Vec<String> = fs::read_dir(&out)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["pack.tar.lz4".to_string()]);
    }

    #[test]
    fn injected_pool_is_used() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        small_tree(&src);
        let out = dir.path().join("out");
        fs::create_dir(&out).unwrap();

        let pool = crate::workers::default_pool(2).unwrap();
        let c = Compressor::with_pool(CompressOptions::new().threads(3), pool);
        let path = c.compress_default_name(&src, &out).unwrap();
        assert_eq!(path, out.join("src.tar.lz4"));
    }

    #[test]
    fn failures_are_logged_with_source_and_destination() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        small_tree(&src);

        let c = Compressor::new(CompressOptions::default().verbosity(crate::logging::Verbosity::None));
        let (result, logs) = crate::logging::capture_logs(|| c.compress(&src, &src.join("a"), "inner"));
        assert!(matches!(result, Err(ArchiverError::InvalidInput { .. })));
        assert!(logs.contains("ERROR"), "{logs}");
        assert!(logs.contains("could not compress"), "{logs}");
        assert!(logs.contains("inner.tar.lz4"), "{logs}");
    }
}
