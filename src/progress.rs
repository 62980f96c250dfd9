//! Progress tracking for archive operations
//!
//! Every slice task owns one [`ThreadMetrics`] and bumps it with relaxed
//! atomics. A [`ProgressMonitor`] thread polls the aggregate and logs each time
//! the overall percentage crosses the next interval. Reads are racy on purpose;
//! the numbers are advisory only.

use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Per-thread metrics to avoid contention between worker threads
#[derive(Debug, Default)]
pub struct ThreadMetrics {
    /// Number of files processed by this thread
    pub files_processed: AtomicU64,
    /// Total bytes processed by this thread
    pub bytes_processed: AtomicU64,
}

impl ThreadMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_bytes(&self, bytes: u64) {
        self.bytes_processed.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_file_processed(&self) {
        self.files_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_files_processed(&self) -> u64 {
        self.files_processed.load(Ordering::Relaxed)
    }

    pub fn get_bytes_processed(&self) -> u64 {
        self.bytes_processed.load(Ordering::Relaxed)
    }
}

/// Snapshot of progress aggregated from all slices
#[derive(Debug, Clone)]
pub struct ProgressState {
    pub total_files: u64,
    pub processed_files: u64,
    pub total_bytes: u64,
    pub processed_bytes: u64,
    pub completed_slices: u32,
    pub total_slices: u32,
    pub elapsed_time: Duration,
    pub speed_mbps: f32,
    pub progress_percent: u32,
}

/// Progress callback function type
pub type ProgressCallback = dyn Fn(&ProgressState) + Send + Sync;

/// Percentage milestone gate: reports a percentage only when it enters a new
/// `interval`-sized bucket.
#[derive(Debug)]
pub struct PercentMilestones {
    interval: u32,
    last_bucket: AtomicU32,
}

impl PercentMilestones {
    pub fn new(interval: u32) -> Self {
        Self {
            interval: interval.clamp(1, 100),
            last_bucket: AtomicU32::new(0),
        }
    }

    /// Returns `Some(percent)` the first time `percent` reaches a new bucket.
    pub fn advance(&self, percent: u32) -> Option<u32> {
        let percent = percent.min(100);
        let bucket = percent / self.interval;
        let prev = self.last_bucket.fetch_max(bucket, Ordering::Relaxed);
        (bucket > prev).then_some(percent)
    }
}

/// Percentage of `done` over `total`, capped at 100. An empty total is 100 %.
pub fn percent_of(done: u64, total: u64) -> u32 {
    if total == 0 {
        return 100;
    }
    ((done as u128 * 100 / total as u128).min(100)) as u32
}

/// Main progress tracker for archive operations
pub struct ProgressTracker {
    label: &'static str,
    thread_metrics: Vec<Arc<ThreadMetrics>>,
    total_files: u64,
    total_bytes: u64,
    completed_slices: AtomicUsize,
    start_time: Instant,
    milestones: PercentMilestones,
    callback: Option<Arc<ProgressCallback>>,
}

impl ProgressTracker {
    /// Creates a tracker with one metrics slot per slice.
    pub fn new(label: &'static str, slices: usize, total_files: u64, total_bytes: u64, interval: u32) -> Self {
        Self {
            label,
            thread_metrics: (0..slices).map(|_| Arc::new(ThreadMetrics::new())).collect(),
            total_files,
            total_bytes,
            completed_slices: AtomicUsize::new(0),
            start_time: Instant::now(),
            milestones: PercentMilestones::new(interval),
            callback: None,
        }
    }

    /// Also deliver every emitted milestone to `callback`.
    pub fn with_callback(mut self, callback: Arc<ProgressCallback>) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Metrics handle for `slice`.
    pub fn get_thread_metrics(&self, slice: usize) -> Option<Arc<ThreadMetrics>> {
        self.thread_metrics.get(slice).cloned()
    }

    pub fn record_slice_completed(&self) {
        self.completed_slices.fetch_add(1, Ordering::Relaxed);
    }

    /// Aggregates all slices into a snapshot.
    pub fn get_progress_state(&self) -> ProgressState {
        let (processed_files, processed_bytes) = self
            .thread_metrics
            .iter()
            .map(|m| (m.get_files_processed(), m.get_bytes_processed()))
            .fold((0u64, 0u64), |(files, bytes), (f, b)| (files + f, bytes + b));

        let elapsed_time = self.start_time.elapsed();
        let speed_mbps = if elapsed_time.as_secs_f32() > 0.0 {
            (processed_bytes as f32 / (1024.0 * 1024.0)) / elapsed_time.as_secs_f32()
        } else {
            0.0
        };

        ProgressState {
            total_files: self.total_files,
            processed_files,
            total_bytes: self.total_bytes,
            processed_bytes,
            completed_slices: self.completed_slices.load(Ordering::Relaxed) as u32,
            total_slices: self.thread_metrics.len() as u32,
            elapsed_time,
            speed_mbps,
            progress_percent: percent_of(processed_bytes, self.total_bytes),
        }
    }

    /// Logs (and forwards) the current percentage if it crossed a milestone.
    pub fn poll(&self) {
        let state = self.get_progress_state();
        if let Some(percent) = self.milestones.advance(state.progress_percent) {
            tracing::info!("{} progress: {}%", self.label, percent);
            if let Some(cb) = &self.callback {
                cb(&state);
            }
        }
    }
}

/// Background thread that polls a [`ProgressTracker`] until stopped.
pub struct ProgressMonitor {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    tracker: Arc<ProgressTracker>,
}

impl ProgressMonitor {
    pub fn spawn(tracker: Arc<ProgressTracker>, period: Duration) -> io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let handle = {
            let stop = Arc::clone(&stop);
            let tracker = Arc::clone(&tracker);
            thread::Builder::new()
                .name("tarlz4-progress".to_string())
                .spawn(move || {
                    while !stop.load(Ordering::Relaxed) {
                        tracker.poll();
                        thread::park_timeout(period);
                    }
                })?
        };
        Ok(Self { stop, handle: Some(handle), tracker })
    }

    /// Stops the thread and emits one last poll.
    pub fn finish(mut self) {
        self.shutdown();
        self.tracker.poll();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            handle.thread().unpark();
            let _ = handle.join();
        }
    }
}

impl Drop for ProgressMonitor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Reader adapter that adds every byte it yields to a [`ThreadMetrics`].
pub struct MeteredReader<R> {
    inner: R,
    metrics: Arc<ThreadMetrics>,
}

impl<R> MeteredReader<R> {
    pub fn new(inner: R, metrics: Arc<ThreadMetrics>) -> Self {
        Self { inner, metrics }
    }
}

impl<R: Read> Read for MeteredReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.metrics.add_bytes(n as u64);
        Ok(n)
    }
}
