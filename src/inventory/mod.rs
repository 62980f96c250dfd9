//! # Directory Inventory
//!
//! One canonical walk that sizes the tree and cuts the file index sequence into
//! byte-balanced slices.
//!
//! Boundary `i` goes to the first file whose preceding running total reaches
//! `i * (total_bytes / n)`; that file opens slice `i`. Boundaries are then
//! clamped so every slice keeps at least one file, which means a tree with
//! fewer files than requested slices realizes fewer slices.

use std::ops::Range;

use crate::common::FileIndex;
use crate::error::Result;
use crate::walk::CanonicalWalk;

/// Ordered, contiguous, non-overlapping half-open ranges over file indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionPlan {
    ranges: Vec<Range<FileIndex>>,
}

impl PartitionPlan {
    /// Builds a plan from per-file sizes in canonical order.
    pub fn from_sizes(sizes: &[u64], requested: usize) -> Self {
        let file_count = sizes.len() as u64;
        let slices = requested.max(1).min(sizes.len().max(1));
        if slices == 1 {
            return Self { ranges: std::iter::once(0..file_count).collect() };
        }

        let total: u64 = sizes.iter().sum();
        let width = total / slices as u64;

        let mut bounds: Vec<FileIndex> = Vec::with_capacity(slices + 1);
        bounds.push(0);
        let mut cumulative = 0u64;
        let mut file = 0usize;
        for i in 1..slices {
            let target = width * i as u64;
            while file < sizes.len() && cumulative < target {
                cumulative += sizes[file];
                file += 1;
            }
            let prev = bounds[i - 1];
            let upper = file_count - (slices - i) as u64;
            bounds.push((file as u64).clamp(prev + 1, upper));
        }
        bounds.push(file_count);

        let ranges = bounds.windows(2).map(|w| w[0]..w[1]).collect();
        Self { ranges }
    }

    pub fn ranges(&self) -> &[Range<FileIndex>] {
        &self.ranges
    }

    /// Realized slice count. Use this, not the requested count, for fan-out.
    pub fn slice_count(&self) -> usize {
        self.ranges.len()
    }

    pub fn range(&self, slice: usize) -> Range<FileIndex> {
        self.ranges[slice].clone()
    }
}

/// Result of sizing a tree.
#[derive(Debug, Clone)]
pub struct Inventory {
    pub file_count: u64,
    pub total_bytes: u64,
    pub plan: PartitionPlan,
    /// Per-slice byte totals, in slice order.
    pub slice_bytes: Vec<u64>,
}

/// Walks `walk` once and plans `requested` slices.
///
/// Unreadable entries never abort planning: a file whose size cannot be read
/// keeps its index and counts as 0 bytes, a directory that cannot be listed is
/// logged and skipped.
pub fn compute_partition(walk: &CanonicalWalk, requested: usize) -> Result<Inventory> {
    let mut sizes: Vec<u64> = Vec::new();
    for item in walk.iter_reporting() {
        let item = match item {
            Ok(item) => item,
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable entry while planning");
                continue;
            }
        };
        if item.entry.is_file() {
            if item.entry.size.is_none() {
                tracing::warn!(path = %item.entry.absolute_path.display(), "could not read size, counting as 0 bytes");
            }
            sizes.push(item.entry.size.unwrap_or(0));
        }
    }

    let plan = PartitionPlan::from_sizes(&sizes, requested);
    let slice_bytes = plan
        .ranges()
        .iter()
        .map(|r| sizes[r.start as usize..r.end as usize].iter().sum())
        .collect();
    let inventory = Inventory {
        file_count: sizes.len() as u64,
        total_bytes: sizes.iter().sum(),
        plan,
        slice_bytes,
    };
    tracing::debug!(
        files = inventory.file_count,
        bytes = inventory.total_bytes,
        requested,
        slices = inventory.plan.slice_count(),
        "partition planned"
    );
    Ok(inventory)
}
