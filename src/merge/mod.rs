//! # Merge Engine
//!
//! Concatenates finished slice artifacts into the destination container. The
//! offsets come from a sequential prefix sum over artifact sizes; the copy runs
//! one task per slice, each writing only its own byte range of the shared
//! destination handle with positional writes.

use std::fs::{File, OpenOptions};
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::error::{ArchiverError, IoContext, Result, TaskPhase};
use crate::fsx;
use crate::logging::VerboseLog;
use crate::workers::{run_tasks, TaskPool};

/// Where each artifact lands in the destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergePlan {
    pub offsets: Vec<u64>,
    pub sizes: Vec<u64>,
    pub total_len: u64,
}

impl MergePlan {
    /// Exclusive prefix sum of `sizes`.
    pub fn from_sizes(sizes: Vec<u64>) -> Self {
        let mut offsets = Vec::with_capacity(sizes.len());
        let mut total_len = 0u64;
        for size in &sizes {
            offsets.push(total_len);
            total_len += size;
        }
        Self { offsets, sizes, total_len }
    }

    /// Stats every artifact in order.
    pub fn from_artifacts(artifacts: &[PathBuf]) -> Result<Self> {
        let sizes = artifacts
            .iter()
            .map(|p| std::fs::metadata(p).map(|m| m.len()).at(p))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::from_sizes(sizes))
    }

    pub fn slice_count(&self) -> usize {
        self.offsets.len()
    }

    /// Destination byte range written by `slice`.
    pub fn range(&self, slice: usize) -> std::ops::Range<u64> {
        self.offsets[slice]..self.offsets[slice] + self.sizes[slice]
    }
}

/// Copies `artifacts` into `destination` in slice order and deletes them.
///
/// All copy tasks are joined before any failure is reported. On failure the
/// artifacts are still removed, best effort.
pub fn merge(
    artifacts: &[PathBuf],
    destination: &Path,
    buffer_size: usize,
    pool: &dyn TaskPool,
    log: VerboseLog,
) -> Result<MergePlan> {
    let result = merge_inner(artifacts, destination, buffer_size, pool, log);
    remove_artifacts(artifacts, log);
    result
}

fn merge_inner(
    artifacts: &[PathBuf],
    destination: &Path,
    buffer_size: usize,
    pool: &dyn TaskPool,
    log: VerboseLog,
) -> Result<MergePlan> {
    let plan = MergePlan::from_artifacts(artifacts)?;
    log.debug(format_args!(
        "merging {} artifact(s) into {} ({} bytes)",
        plan.slice_count(),
        destination.display(),
        plan.total_len
    ));

    let out = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(destination)
        .at(destination)?;
    out.set_len(plan.total_len).at(destination)?;

    let out = &out;
    let plan_ref = &plan;
    let tasks: Vec<_> = artifacts
        .iter()
        .enumerate()
        .map(|(slice, artifact)| {
            move || copy_at(artifact, out, destination, plan_ref.offsets[slice], plan_ref.sizes[slice], buffer_size)
        })
        .collect();
    let results = run_tasks(pool, tasks);
    let written = ArchiverError::collect_tasks(TaskPhase::Merge, results)?;

    for (slice, bytes) in written.iter().enumerate() {
        log.debug(format_args!("merge slice {slice}: {bytes} byte(s) at offset {}", plan.offsets[slice]));
    }
    out.sync_all().at(destination)?;
    Ok(plan)
}

/// Streams `artifact` into `out` starting at `offset`. Fails if the artifact
/// no longer has the length it was planned with.
fn copy_at(
    artifact: &Path,
    out: &File,
    destination: &Path,
    offset: u64,
    expected: u64,
    buffer_size: usize,
) -> Result<u64> {
    let mut src = File::open(artifact).at(artifact)?;
    let mut buf = vec![0u8; buffer_size.max(1)];
    let mut running = 0u64;
    loop {
        let n = src.read(&mut buf).at(artifact)?;
        if n == 0 {
            break;
        }
        if running + n as u64 > expected {
            break;
        }
        fsx::write_all_at(out, &buf[..n], offset + running).at(destination)?;
        running += n as u64;
    }
    if running != expected {
        return Err(ArchiverError::Format(format!(
            "artifact {} changed size during merge: planned {expected} bytes, found {running}",
            artifact.display()
        )));
    }
    Ok(running)
}

/// Deletes every artifact, logging the ones that could not be removed.
pub fn remove_artifacts(artifacts: &[PathBuf], log: VerboseLog) {
    for artifact in artifacts {
        if let Err(e) = fsx::remove_file_if_exists(artifact) {
            log.warn(format_args!("could not remove slice artifact {}: {e}", artifact.display()));
        }
    }
}
