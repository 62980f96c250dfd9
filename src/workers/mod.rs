//! Task pool used by both fan-out phases (slice archiving and merge writing).
//!
//! The pool is injectable: anything implementing [`TaskPool`] can run the jobs,
//! the default being a named `rayon` pool. [`run_tasks`] layers per-slice result
//! collection on top. Every task reports `(slice, result)` over a channel and
//! the results come back in slice order once all tasks have been joined.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crossbeam_channel::bounded;

use crate::error::{ArchiverError, Result};

/// A unit of work borrowed for the duration of one [`TaskPool::execute`] call.
pub type ScopedJob<'s> = Box<dyn FnOnce() + Send + 's>;

/// Submit-and-await-all capability.
pub trait TaskPool: Send + Sync {
    /// Runs every job and returns only after all of them have finished.
    fn execute<'s>(&self, jobs: Vec<ScopedJob<'s>>);

    /// Number of jobs that may run at once, for logging.
    fn parallelism(&self) -> usize;
}

impl TaskPool for rayon::ThreadPool {
    fn execute<'s>(&self, jobs: Vec<ScopedJob<'s>>) {
        self.scope(move |s| {
            for job in jobs {
                s.spawn(move |_| job());
            }
        });
    }

    fn parallelism(&self) -> usize {
        self.current_num_threads()
    }
}

/// Runs jobs one after another on the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlinePool;

impl TaskPool for InlinePool {
    fn execute<'s>(&self, jobs: Vec<ScopedJob<'s>>) {
        for job in jobs {
            job();
        }
    }

    fn parallelism(&self) -> usize {
        1
    }
}

/// Builds the default pool with `threads` named workers (at least one).
pub fn default_pool(threads: usize) -> Result<Arc<dyn TaskPool>> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads.max(1))
        .thread_name(|i| format!("tarlz4-worker-{i}"))
        .build()?;
    Ok(Arc::new(pool))
}

/// Runs one task per slice on `pool` and returns their results in slice order.
///
/// A panicking task is reported as [`ArchiverError::Panicked`] for its slice;
/// its siblings still run to completion.
pub fn run_tasks<'s, T, F>(pool: &dyn TaskPool, tasks: Vec<F>) -> Vec<Result<T>>
where
    T: Send + 's,
    F: FnOnce() -> Result<T> + Send + 's,
{
    let count = tasks.len();
    let (tx, rx) = bounded::<(usize, Result<T>)>(count.max(1));

    let jobs: Vec<ScopedJob<'s>> = tasks
        .into_iter()
        .enumerate()
        .map(|(slice, task)| {
            let tx = tx.clone();
            Box::new(move || {
                let res = panic::catch_unwind(AssertUnwindSafe(task))
                    .unwrap_or_else(|payload| Err(ArchiverError::Panicked(panic_message(payload.as_ref()))));
                // capacity == task count, never blocks
                let _ = tx.send((slice, res));
            }) as ScopedJob<'s>
        })
        .collect();
    drop(tx);

    pool.execute(jobs);

    let mut slots: Vec<Option<Result<T>>> = (0..count).map(|_| None).collect();
    for (slice, res) in rx.try_iter() {
        slots[slice] = Some(res);
    }
    slots
        .into_iter()
        .enumerate()
        .map(|(slice, slot)| {
            slot.unwrap_or_else(|| Err(ArchiverError::Panicked(format!("slice {slice} never reported a result"))))
        })
        .collect()
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
