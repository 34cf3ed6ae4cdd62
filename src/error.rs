use thiserror::Error;

/// Returned when the worker pool cannot accept a new execution context.
///
/// The governor recovers from this by running the task inline, so it never
/// escapes from [`crate::driver::execute`].
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TaskCreationError {
    #[error("the thread pool is shutting down")]
    ShutDown,
    #[error("the thread pool has no worker threads")]
    NoWorkers,
}

/// A job the pool refused, handed back to the caller together with the reason.
#[derive(Debug)]
pub struct Rejected<F> {
    pub error: TaskCreationError,
    pub task: F,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExecuteError {
    #[error("fibonacci({n}) overflows a 64-bit accumulator (largest supported size is {max})")]
    ProblemTooLarge { n: u32, max: u32 },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown ceiling mode `{0}`, expected `hard` or `soft`")]
    UnknownCeilingMode(String),
}
