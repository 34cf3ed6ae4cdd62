//! The root driver: the only place that blocks.
//!
//! A [`Scheduler`] owns a governor (and through it a worker pool) and can
//! run any number of computations one after another. Each
//! [`Scheduler::execute`] call creates the root node, hands its fork stage to
//! the pool, waits for the root's join stage to signal completion, and then
//! waits for every execution context of the run to unwind before it reports.

use std::{
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use tracing::debug;

use crate::{
    config::Config,
    error::ExecuteError,
    fork::fork,
    governor::Governor,
    node::{NodePtr, TaskNode},
    run::RunContext,
    thread_pool::ThreadPool,
};

/// The largest problem size whose value fits in the 64-bit accumulator.
pub const MAX_PROBLEM_SIZE: u32 = 93;

/// How long the driver sleeps between checks while waiting for the last
/// execution contexts to unwind.
const DRAIN_POLL_INTERVAL: Duration = Duration::from_micros(1);

/// The outcome of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Execution {
    /// fibonacci(n).
    pub value: u64,
    /// Wall-clock time from submitting the root until the run quiesced.
    pub elapsed: Duration,
    /// Number of child nodes the fork stage created.
    pub nodes: usize,
    /// Number of execution contexts started on the pool, including the root's.
    pub spawned: usize,
    /// Number of execution contexts the pool refused.
    pub rejected: usize,
    /// The largest number of simultaneously active contexts, including the
    /// driver itself.
    pub peak_active: usize,
}

/// Runs fork-join computations on a governed worker pool.
pub struct Scheduler {
    config: Config,
    governor: Arc<Governor>,
}

impl Scheduler {
    /// Creates a scheduler with a new pool of `config.parallelism()` workers.
    pub fn new(config: Config) -> Scheduler {
        let pool = ThreadPool::new(config.parallelism().get());
        Scheduler::with_thread_pool(config, pool)
    }

    /// Creates a scheduler that runs on an existing pool. The pool size is
    /// taken as is; only the ceiling and admission policy come from `config`.
    pub fn with_thread_pool(config: Config, pool: Arc<ThreadPool>) -> Scheduler {
        let governor = Governor::new(pool, config.ceiling(), config.admission());
        Scheduler {
            config,
            governor: Arc::new(governor),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn governor(&self) -> &Governor {
        &self.governor
    }

    /// Computes fibonacci(`n`) and blocks until the whole tree has quiesced.
    ///
    /// When this returns, no execution context belonging to the run is
    /// active anymore.
    pub fn execute(&mut self, n: u32) -> Result<Execution, ExecuteError> {
        if n > MAX_PROBLEM_SIZE {
            return Err(ExecuteError::ProblemTooLarge {
                n,
                max: MAX_PROBLEM_SIZE,
            });
        }

        debug!(
            n,
            ceiling = self.governor.ceiling(),
            policy = ?self.governor.policy(),
            "starting run"
        );

        let cx = Arc::new(RunContext::new(
            Arc::clone(&self.governor),
            self.config.serial_cutoff(),
        ));
        let root = NodePtr::allocate(TaskNode::root(n));
        // Counters from a previous run must not leak into this one.
        self.governor.reset_stats();

        let start = Instant::now();

        let token = self.governor.register();
        let root_cx = Arc::clone(&cx);
        self.governor.spawn(token, move || fork(&root_cx, root));

        cx.completed.wait();
        while self.governor.active() > 0 {
            thread::sleep(DRAIN_POLL_INTERVAL);
        }

        let elapsed = start.elapsed();

        // SAFETY: The run has quiesced, so no execution context can still
        // refer to the root.
        let root = unsafe { root.release() };
        let stats = self.governor.take_stats();
        let execution = Execution {
            value: root.result(),
            elapsed,
            nodes: cx.nodes_created(),
            spawned: stats.spawned,
            rejected: stats.rejected,
            peak_active: stats.peak_active,
        };

        debug!(
            n,
            value = execution.value,
            elapsed = ?execution.elapsed,
            spawned = execution.spawned,
            peak_active = execution.peak_active,
            "run finished"
        );
        Ok(execution)
    }
}

/// Computes fibonacci(`n`) on a fresh scheduler built from `config`.
///
#[cfg_attr(not(feature = "loom"), doc = "```")]
#[cfg_attr(feature = "loom", doc = "```ignore")]
/// # use std::num::NonZeroUsize;
/// # use fanout::prelude::*;
/// let config = Config::new(NonZeroUsize::new(2).unwrap());
/// let execution = execute(20, config).unwrap();
/// assert_eq!(execution.value, 6765);
/// ```
pub fn execute(n: u32, config: Config) -> Result<Execution, ExecuteError> {
    Scheduler::new(config).execute(n)
}
