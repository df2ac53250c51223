//! Bounded pool of scoped worker threads.
//!
//! Each worker claims the next unprocessed item through a shared atomic
//! cursor, so at most `workers` items are in flight at any moment. Results
//! travel back over a channel tagged with their item index and are restored
//! to input order once every worker has joined.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError, mpsc};
use std::thread;

/// Shared flag raised when a first-error-wins run fails.
///
/// Workers check it before taking the next item; tasks may check it again
/// before starting expensive work.
#[derive(Debug, Default)]
pub struct Cancellation {
    raised: AtomicBool,
}

impl Cancellation {
    /// Raises the flag.
    pub fn cancel(&self) {
        self.raised.store(true, Ordering::SeqCst);
    }

    /// Reports whether the flag is raised.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }
}

/// A fixed number of worker threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerPool {
    workers: NonZeroUsize,
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(thread::available_parallelism().unwrap_or(NonZeroUsize::MIN))
    }
}

impl WorkerPool {
    /// A pool with exactly `workers` threads.
    #[must_use]
    pub const fn new(workers: NonZeroUsize) -> Self {
        Self { workers }
    }

    /// A pool sized by `jobs`, falling back to the available parallelism
    /// when `jobs` is absent or zero.
    #[must_use]
    pub fn with_jobs(jobs: Option<usize>) -> Self {
        jobs.and_then(NonZeroUsize::new)
            .map_or_else(Self::default, Self::new)
    }

    /// Number of worker threads.
    #[must_use]
    pub const fn workers(&self) -> usize {
        self.workers.get()
    }

    /// Runs `task` over `items`, stopping at the first failure.
    ///
    /// When a task fails the cancellation flag is raised so that idle workers
    /// stop taking items; tasks already running finish naturally. The first
    /// recorded error is returned and every successful result is discarded.
    ///
    /// # Errors
    ///
    /// Returns the first error any task produced.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::num::NonZeroUsize;
    /// use pinfetch::coordinator::WorkerPool;
    ///
    /// let pool = WorkerPool::new(NonZeroUsize::new(2).unwrap_or(NonZeroUsize::MIN));
    /// let doubled = pool.try_run(&[1, 2, 3], |n, _| Ok::<_, String>(n * 2));
    /// assert_eq!(doubled, Ok(vec![2, 4, 6]));
    /// ```
    pub fn try_run<T, R, E, F>(&self, items: &[T], task: F) -> Result<Vec<R>, E>
    where
        T: Sync,
        R: Send,
        E: Send,
        F: Fn(&T, &Cancellation) -> Result<R, E> + Sync,
    {
        let cancellation = Cancellation::default();
        let first_error: Mutex<Option<E>> = Mutex::new(None);
        let guarded = |item: &T| -> Option<R> {
            if cancellation.is_cancelled() {
                return None;
            }
            match task(item, &cancellation) {
                Ok(value) => Some(value),
                Err(err) => {
                    let mut slot = first_error.lock().unwrap_or_else(PoisonError::into_inner);
                    if slot.is_none() {
                        *slot = Some(err);
                    }
                    drop(slot);
                    cancellation.cancel();
                    None
                }
            }
        };
        let results = self.scatter(items, guarded, || cancellation.is_cancelled());

        if let Some(err) = first_error
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
        {
            return Err(err);
        }
        Ok(results.into_iter().flatten().collect())
    }

    /// Runs `task` over every item regardless of failures and returns the
    /// results in input order.
    pub fn run_all<T, R, F>(&self, items: &[T], task: F) -> Vec<R>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> R + Sync,
    {
        self.scatter(items, task, || false)
    }

    fn scatter<T, R, F, S>(&self, items: &[T], task: F, stop: S) -> Vec<R>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> R + Sync,
        S: Fn() -> bool + Sync,
    {
        let cursor = AtomicUsize::new(0);
        let (sender, receiver) = mpsc::channel::<(usize, R)>();
        let worker_count = self.workers().min(items.len());

        thread::scope(|scope| {
            for _ in 0..worker_count {
                let results = sender.clone();
                let (next, run, halted) = (&cursor, &task, &stop);
                scope.spawn(move || {
                    while !halted() {
                        let index = next.fetch_add(1, Ordering::SeqCst);
                        let Some(item) = items.get(index) else {
                            break;
                        };
                        if results.send((index, run(item))).is_err() {
                            break;
                        }
                    }
                });
            }
        });
        drop(sender);

        let mut indexed: Vec<(usize, R)> = receiver.into_iter().collect();
        indexed.sort_by_key(|(index, _)| *index);
        indexed.into_iter().map(|(_, result)| result).collect()
    }
}
