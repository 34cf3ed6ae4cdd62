use std::{
    sync::atomic::{fence, AtomicUsize, Ordering},
    sync::Arc,
    thread::{self, JoinHandle},
};

use crossbeam_queue::SegQueue;
use crossbeam_utils::CachePadded;
use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use crate::{
    error::{Rejected, TaskCreationError},
    job::{HeapJob, JobRef},
    latch::{AtomicLatch, Latch, Probe},
};

// -----------------------------------------------------------------------------
// Thread pool types

/// A fixed-size pool of worker threads that runs the execution contexts the
/// governor admits.
///
/// Jobs are pushed onto a single lock-free injector queue and claimed by
/// whichever worker gets to them first. Workers that find the queue empty go
/// to sleep until a new job wakes them.
///
/// The pool is sized once, at construction. Dropping the pool shuts it down:
/// every queued job still runs before the drop returns.
pub struct ThreadPool {
    /// State shared with the worker threads.
    shared: Arc<Shared>,
    /// Handles used to join the workers on shutdown.
    handles: Mutex<Vec<JoinHandle<()>>>,
}

/// The part of the pool that worker threads hold on to.
struct Shared {
    /// This contains the sleep controls for each worker thread.
    threads: Box<[CachePadded<ThreadControl>]>,
    /// A queue of pending jobs that can be taken by any thread. It uses the
    /// lock-free queue from crossbeam.
    queue: SegQueue<JobRef>,
    /// The number of workers that started successfully. Written once during
    /// construction.
    running_threads: AtomicUsize,
    /// Opened when the pool begins to shut down.
    should_terminate: AtomicLatch,
}

/// The sleeping and wakeup mechanism for a single worker.
struct ThreadControl {
    /// Set to true when the worker is sleeping. Allows the thread to sleep
    /// until awakened by another thread.
    is_sleeping: Mutex<bool>,
    /// Used to wake a sleeping thread.
    awakened: Condvar,
}

impl ThreadControl {
    const fn new() -> ThreadControl {
        ThreadControl {
            is_sleeping: Mutex::new(false),
            awakened: Condvar::new(),
        }
    }

    /// Wakes the worker if it is sleeping. Returns true if the worker was
    /// woken up, false if it was already awake.
    fn wake(&self) -> bool {
        let mut is_sleeping = self.is_sleeping.lock();
        if *is_sleeping {
            *is_sleeping = false;
            self.awakened.notify_one();
            true
        } else {
            false
        }
    }
}

// -----------------------------------------------------------------------------
// Thread pool creation and shutdown

impl ThreadPool {
    /// Creates a pool and starts `size` worker threads.
    ///
    /// A worker that fails to start is logged and skipped, so the pool may
    /// end up smaller than requested (possibly empty). An empty pool refuses
    /// every job with [`TaskCreationError::NoWorkers`].
    pub fn new(size: usize) -> Arc<ThreadPool> {
        let shared = Arc::new(Shared {
            threads: (0..size)
                .map(|_| CachePadded::new(ThreadControl::new()))
                .collect(),
            queue: SegQueue::new(),
            running_threads: AtomicUsize::new(0),
            should_terminate: AtomicLatch::new(),
        });

        let mut handles = Vec::with_capacity(size);
        for index in 0..size {
            let worker_shared = Arc::clone(&shared);
            let spawned = thread::Builder::new()
                .name(format!("fanout-worker-{index}"))
                .spawn(move || main_loop(worker_shared, index));
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(error) => warn!(index, %error, "failed to start worker thread"),
            }
        }

        shared
            .running_threads
            .store(handles.len(), Ordering::Release);
        debug!(requested = size, running = handles.len(), "thread pool started");

        Arc::new(ThreadPool {
            shared,
            handles: Mutex::new(handles),
        })
    }

    /// Returns the number of worker threads that are running.
    pub fn size(&self) -> usize {
        self.shared.running_threads.load(Ordering::Acquire)
    }

    /// Reports whether the pool would accept a job right now.
    pub fn accepting(&self) -> Result<(), TaskCreationError> {
        if self.shared.should_terminate.probe() {
            Err(TaskCreationError::ShutDown)
        } else if self.size() == 0 {
            Err(TaskCreationError::NoWorkers)
        } else {
            Ok(())
        }
    }

    /// Spawns a closure onto the pool. It will run on one of the workers at
    /// some later point. If the pool cannot take the job, the closure is
    /// handed back untouched.
    ///
    /// A job accepted while the pool is shutting down may run on the calling
    /// thread before this returns, but it always runs.
    pub fn spawn<F>(&self, f: F) -> Result<(), Rejected<F>>
    where
        F: FnOnce() + Send + 'static,
    {
        if let Err(error) = self.accepting() {
            return Err(Rejected { error, task: f });
        }
        let job_ref = HeapJob::new(f).into_static_job_ref();
        self.shared.inject(job_ref);

        // Pairs with the fence in `shutdown`. Either the shutting-down thread
        // sees our job when it drains the queue, or we see the latch here.
        fence(Ordering::SeqCst);
        if self.shared.should_terminate.probe() {
            self.shared.drain();
        }
        Ok(())
    }

    /// Stops the workers and waits for them to exit. Jobs that are still
    /// queued are run first, either by the workers or, if they arrive after
    /// the workers have exited, by the calling thread.
    pub fn shutdown(&self) {
        // SAFETY: The latch is owned by `shared`, which we hold a reference to.
        unsafe { Latch::set(&self.shared.should_terminate) };
        fence(Ordering::SeqCst);
        for control in self.shared.threads.iter() {
            control.wake();
        }

        // A worker can end up dropping the last handle to the pool, in which
        // case it must not try to join itself.
        let current = thread::current().id();
        let handles = std::mem::take(&mut *self.handles.lock());
        let joined = handles.len();
        for handle in handles {
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                warn!("worker thread panicked");
            }
        }

        self.shared.drain();

        if joined > 0 {
            debug!(workers = joined, "thread pool stopped");
        }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Shared {
    /// Pushes a job onto the injector queue and wakes a sleeping worker.
    fn inject(&self, job_ref: JobRef) {
        self.queue.push(job_ref);
        self.wake_any();
    }

    /// Runs every job left in the queue on the calling thread.
    fn drain(&self) {
        while let Some(job) = self.queue.pop() {
            // SAFETY: Every job in the queue was created by `spawn` and is
            // popped (and therefore executed) exactly once.
            unsafe { job.execute() };
        }
    }

    /// Wakes the first sleeping worker found, if any.
    fn wake_any(&self) -> bool {
        self.threads.iter().any(|control| control.wake())
    }
}

// -----------------------------------------------------------------------------
// Worker threads

/// A worker's view of the pool.
struct WorkerThread {
    shared: Arc<Shared>,
    index: usize,
}

impl WorkerThread {
    /// Runs until the provided latch is set. This will put the thread to sleep
    /// when no work can be found and the latch is still unset.
    fn run_until<L: Probe>(&self, latch: &L) {
        let control = &self.shared.threads[self.index];
        while !latch.probe() {
            if let Some(job) = self.shared.queue.pop() {
                // SAFETY: Jobs are popped from the queue exactly once.
                unsafe { job.execute() };
                continue;
            }

            let mut is_sleeping = control.is_sleeping.lock();

            // A job may have been injected (or the latch set) between the
            // failed pop and taking the lock. Injectors take this same lock
            // to wake us, so checking again here cannot miss a wakeup.
            if latch.probe() || !self.shared.queue.is_empty() {
                continue;
            }

            *is_sleeping = true;
            while *is_sleeping {
                control.awakened.wait(&mut is_sleeping);
            }
        }
    }
}

/// The main loop for a worker thread: execute jobs from the injector until
/// the pool shuts down, then drain what is left.
fn main_loop(shared: Arc<Shared>, index: usize) {
    let worker_thread = WorkerThread { shared, index };

    worker_thread.run_until(&worker_thread.shared.should_terminate);
    worker_thread.shared.drain();
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use super::*;
    use crate::latch::LockLatch;

    #[test]
    fn spawned_jobs_run_on_workers() {
        let pool = ThreadPool::new(2);
        assert_eq!(pool.size(), 2);

        let done = Arc::new(LockLatch::new());
        let latch = Arc::clone(&done);
        let spawned = pool.spawn(move || {
            assert!(thread::current()
                .name()
                .is_some_and(|name| name.starts_with("fanout-worker-")));
            // SAFETY: The arc keeps the latch alive for the duration of the call.
            unsafe { Latch::set(&*latch) };
        });
        assert!(spawned.is_ok());
        done.wait();
    }

    #[test]
    fn shutdown_runs_every_queued_job() {
        let pool = ThreadPool::new(3);
        let count = Arc::new(AtomicUsize::new(0));
        for _ in 0..1000 {
            let count = Arc::clone(&count);
            let spawned = pool.spawn(move || {
                count.fetch_add(1, Ordering::Relaxed);
            });
            assert!(spawned.is_ok());
        }
        drop(pool);
        assert_eq!(count.load(Ordering::Relaxed), 1000);
    }

    #[test]
    fn empty_pool_hands_the_job_back() {
        let pool = ThreadPool::new(0);
        let rejected = pool.spawn(|| ()).map_err(|rejected| rejected.error);
        assert!(matches!(rejected, Err(TaskCreationError::NoWorkers)));
    }

    #[test]
    fn jobs_accepted_during_shutdown_still_run() {
        for _ in 0..500 {
            let pool = ThreadPool::new(2);
            let accepted = Arc::new(AtomicUsize::new(0));
            let ran = Arc::new(AtomicUsize::new(0));

            let spawner = {
                let pool = Arc::clone(&pool);
                let accepted = Arc::clone(&accepted);
                let ran = Arc::clone(&ran);
                thread::spawn(move || {
                    for _ in 0..200 {
                        let ran = Arc::clone(&ran);
                        let spawned = pool.spawn(move || {
                            ran.fetch_add(1, Ordering::Relaxed);
                        });
                        if spawned.is_ok() {
                            accepted.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                })
            };
            pool.shutdown();
            spawner.join().unwrap();

            // The pool is still alive, so its drop cannot pick up stragglers.
            assert_eq!(
                ran.load(Ordering::Relaxed),
                accepted.load(Ordering::Relaxed)
            );
            drop(pool);
        }
    }

    #[test]
    fn stopped_pool_refuses_jobs() {
        let pool = ThreadPool::new(1);
        pool.shutdown();
        let Err(rejected) = pool.spawn(|| ()) else {
            panic!("a stopped pool accepted a job");
        };
        assert_eq!(rejected.error, TaskCreationError::ShutDown);
    }
}
