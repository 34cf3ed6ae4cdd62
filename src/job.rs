//! This module defines the executable unit of work the worker pool runs,
//! called a `Job`. After a job is allocated, a type-erased reference
//! (a `JobRef`) is queued, handed to a worker thread, and executed.
//!
//! Every job the scheduler creates outlives the stack frame that spawned it
//! (the spawning stage returns immediately), so there is only one job type
//! here: `HeapJob`.
//!
//! When using a job, one must be careful to ensure that:
//! (a) The job does not outlive anything it closes over.
//! (b) The job remains valid until it is executed.
//! (c) Each job reference is executed exactly once.

// -----------------------------------------------------------------------------
// Job

/// A job is a unit of work that may be executed by a worker thread.
pub trait Job {
    /// Calling this function runs the job.
    ///
    /// # Safety
    ///
    /// This may be called from a different thread than the one which created
    /// the job, so the implementer must ensure the appropriate traits are met,
    /// whether `Send`, `Sync`, or both.
    unsafe fn execute(this: *const ());
}

// -----------------------------------------------------------------------------
// JobRef

/// Effectively a `Job` trait object, without the fat pointer.
pub struct JobRef {
    /// A raw pointer to data that can be executed with the `execute_fn`.
    pointer: *const (),
    /// A function pointer that can execute the job stored at `pointer`.
    execute_fn: unsafe fn(*const ()),
}

impl JobRef {
    /// Creates a new `JobRef` from a `Job`.
    ///
    /// # Safety
    ///
    /// Caller must ensure `job` will remain valid until the job is executed,
    /// and that the job is executed to completion exactly once.
    pub unsafe fn new<J>(job: *const J) -> JobRef
    where
        J: Job,
    {
        JobRef {
            pointer: job as *const (),
            execute_fn: <J as Job>::execute,
        }
    }

    /// Executes a `JobRef`.
    ///
    /// # Safety
    ///
    /// Caller must ensure that `JobRef::pointer` is still valid and that this
    /// job reference has not been executed before.
    #[inline]
    pub unsafe fn execute(self) {
        (self.execute_fn)(self.pointer)
    }
}

// SAFETY: !Send for raw pointers is not for safety, just as a lint
unsafe impl Send for JobRef {}

// SAFETY: !Sync for raw pointers is not for safety, just as a lint
unsafe impl Sync for JobRef {}

// -----------------------------------------------------------------------------
// Heap allocated job

/// Represents a job stored in the heap. The box is reclaimed when the job
/// executes.
pub struct HeapJob<F>
where
    F: FnOnce() + Send,
{
    job: F,
}

impl<F> HeapJob<F>
where
    F: FnOnce() + Send,
{
    /// Allocates a new `HeapJob` on the heap.
    pub fn new(job: F) -> Box<HeapJob<F>> {
        Box::new(HeapJob { job })
    }

    /// Converts the job into a type-erased `JobRef`. This is safe because the
    /// closure has a static lifetime and owns everything it uses.
    pub fn into_static_job_ref(self: Box<Self>) -> JobRef
    where
        F: 'static,
    {
        // SAFETY: The closure has static lifetime, so it will be valid until
        // the `JobRef` is executed, and it cannot close over any non-static
        // data. The box is leaked here and reclaimed in `execute`.
        unsafe { JobRef::new(Box::into_raw(self)) }
    }
}

impl<F> Job for HeapJob<F>
where
    F: FnOnce() + Send,
{
    /// Executes a `HeapJob` from a const pointer, freeing the allocation.
    ///
    /// # Safety
    ///
    /// Caller must ensure that the pointer points to a valid `HeapJob` that
    /// was leaked by `into_static_job_ref`.
    unsafe fn execute(this: *const ()) {
        let this = Box::from_raw(this as *mut Self);
        (this.job)();
    }
}
