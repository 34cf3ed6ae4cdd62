//! Admission control for execution contexts.
//!
//! The [`Governor`] keeps a count of the execution contexts that are
//! currently active and decides, per sub-task, whether the sub-task gets a
//! context of its own on the worker pool or runs inline on the caller's
//! context. There is no queueing and no backpressure: a refused sub-task
//! simply runs on the caller's stack.
//!
//! Every admitted context is represented by an [`ActiveToken`]. The count is
//! decremented when the token is dropped, so a context is released on every
//! exit path.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use crossbeam_utils::CachePadded;
use tracing::{trace, warn};

use crate::{config::AdmissionPolicy, error::Rejected, thread_pool::ThreadPool};

/// Admission control over a worker pool.
pub struct Governor {
    /// The pool on which admitted contexts run.
    pool: Arc<ThreadPool>,
    /// The maximum number of active contexts the governor aims for.
    ceiling: usize,
    policy: AdmissionPolicy,
    /// The number of active contexts. This is the one location every fork
    /// and join in a run contends on, so it gets its own cache line.
    active: Arc<CachePadded<AtomicUsize>>,
    /// The highest value `active` has reached since the last `take_stats`.
    peak_active: AtomicUsize,
    /// Number of contexts handed to the pool since the last `take_stats`.
    spawned: AtomicUsize,
    /// Number of contexts the pool refused since the last `take_stats`.
    rejected: AtomicUsize,
}

/// Counters describing what the governor did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GovernorStats {
    /// Execution contexts started on the pool.
    pub spawned: usize,
    /// Execution contexts the pool refused, which ran inline instead.
    pub rejected: usize,
    /// The largest number of simultaneously active contexts observed.
    pub peak_active: usize,
}

/// A slot in the governor's active count. Dropping the token frees the slot.
#[must_use = "dropping the token releases the execution context immediately"]
pub struct ActiveToken {
    active: Arc<CachePadded<AtomicUsize>>,
}

impl Drop for ActiveToken {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::AcqRel);
    }
}

impl Governor {
    pub fn new(pool: Arc<ThreadPool>, ceiling: usize, policy: AdmissionPolicy) -> Governor {
        Governor {
            pool,
            ceiling,
            policy,
            active: Arc::new(CachePadded::new(AtomicUsize::new(0))),
            peak_active: AtomicUsize::new(0),
            spawned: AtomicUsize::new(0),
            rejected: AtomicUsize::new(0),
        }
    }

    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    pub fn policy(&self) -> AdmissionPolicy {
        self.policy
    }

    pub fn pool(&self) -> &Arc<ThreadPool> {
        &self.pool
    }

    /// The number of execution contexts that are currently active.
    #[inline]
    pub fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Claims a slot if the active count is below the ceiling.
    ///
    /// With [`AdmissionPolicy::Approximate`] the check and the increment are
    /// separate operations, so several racing callers can all be admitted
    /// and the count can briefly exceed the ceiling by up to one per racer.
    /// With [`AdmissionPolicy::Strict`] the ceiling is never exceeded.
    #[inline]
    pub fn try_admit(&self) -> Option<ActiveToken> {
        let now_active = match self.policy {
            AdmissionPolicy::Approximate => {
                if self.active.load(Ordering::Acquire) >= self.ceiling {
                    return None;
                }
                self.active.fetch_add(1, Ordering::AcqRel) + 1
            }
            AdmissionPolicy::Strict => {
                let ceiling = self.ceiling;
                let previous = self
                    .active
                    .fetch_update(Ordering::AcqRel, Ordering::Acquire, |active| {
                        (active < ceiling).then_some(active + 1)
                    })
                    .ok()?;
                previous + 1
            }
        };
        Some(self.issue(now_active))
    }

    /// Claims a slot regardless of the ceiling. The root driver uses this to
    /// count itself as one active context.
    pub fn register(&self) -> ActiveToken {
        let now_active = self.active.fetch_add(1, Ordering::AcqRel) + 1;
        self.issue(now_active)
    }

    #[inline]
    fn issue(&self, now_active: usize) -> ActiveToken {
        self.peak_active.fetch_max(now_active, Ordering::Relaxed);
        ActiveToken {
            active: Arc::clone(&self.active),
        }
    }

    /// Starts a new execution context on the pool that runs `task` and then
    /// releases `token`.
    ///
    /// If the pool refuses the job, the task runs inline on the caller's
    /// context instead (still holding its token) and the refusal is counted.
    pub fn spawn<F>(&self, token: ActiveToken, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let job = move || {
            let _token = token;
            task();
        };
        match self.pool.spawn(job) {
            Ok(()) => {
                self.spawned.fetch_add(1, Ordering::Relaxed);
                trace!(active = self.active(), "spawned execution context");
            }
            Err(Rejected { error, task }) => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                warn!(%error, "could not start an execution context, running inline");
                task();
            }
        }
    }

    /// Runs `task` in a new execution context if one is admitted, or
    /// synchronously on the caller's context otherwise.
    pub fn submit<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut task = Some(task);
        self.try_submit(|| task.take());
        // Still here only if no context was admitted.
        if let Some(task) = task {
            task();
        }
    }

    /// The admission half of [`Governor::submit`]: starts the task built by
    /// `make` in a new execution context if one is admitted, and returns
    /// `false` without calling `make` otherwise. The caller is then expected
    /// to run the work inline itself.
    ///
    /// The fork and join stages go through this so that the task, and the
    /// run state it captures, is only built when a context is started.
    #[inline]
    pub fn try_submit<F, M>(&self, make: M) -> bool
    where
        M: FnOnce() -> Option<F>,
        F: FnOnce() + Send + 'static,
    {
        let Some(token) = self.try_admit() else {
            return false;
        };
        match make() {
            Some(task) => {
                self.spawn(token, task);
                true
            }
            None => false,
        }
    }

    /// Returns the counters accumulated since the previous call and resets
    /// them. The peak restarts from the current active count.
    pub fn take_stats(&self) -> GovernorStats {
        GovernorStats {
            spawned: self.spawned.swap(0, Ordering::Relaxed),
            rejected: self.rejected.swap(0, Ordering::Relaxed),
            peak_active: self.peak_active.swap(self.active(), Ordering::Relaxed),
        }
    }

    /// Clears the counters without reading them. The peak restarts from the
    /// current active count.
    pub fn reset_stats(&self) {
        self.spawned.store(0, Ordering::Relaxed);
        self.rejected.store(0, Ordering::Relaxed);
        self.peak_active.store(self.active(), Ordering::Relaxed);
    }
}
