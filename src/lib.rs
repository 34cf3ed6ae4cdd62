//! A bounded fan-out fork-join scheduler.
//!
//! Fanout computes a recursively decomposable value (the fibonacci
//! recurrence) by splitting it into a tree of task nodes. Each node either
//! computes its value directly or forks two children: one child is offered
//! to a new execution context on a worker pool, the other runs inline on the
//! current one. Finished nodes fold their value into their parent with an
//! atomic addition, and the child whose decrement takes the parent's pending
//! count to zero continues with the parent. No locks are taken on the path
//! from the leaves back to the root.
//!
//! Whether a child gets a new execution context is decided by the
//! [`governor::Governor`], which keeps a single count of active contexts and
//! compares it against a ceiling. Once the ceiling is reached, children
//! simply run inline, so the scheduler degrades towards a serial computation
//! rather than queueing work.
//!
//! The example is skipped in `loom` builds, where node atomics only work
//! inside a loom model.
//!
#![cfg_attr(not(feature = "loom"), doc = "```")]
#![cfg_attr(feature = "loom", doc = "```ignore")]
//! # use std::num::NonZeroUsize;
//! use fanout::prelude::*;
//!
//! let config = Config::new(NonZeroUsize::new(4).unwrap()).with_ceiling_mode(CeilingMode::Hard);
//! let mut scheduler = Scheduler::new(config);
//! assert_eq!(scheduler.execute(30).unwrap().value, 832_040);
//! ```

pub mod config;
pub mod driver;
pub mod error;
pub mod governor;
pub mod job;
pub mod latch;
pub mod node;
pub mod thread_pool;

mod fork;
mod join;
mod run;
mod sync;

pub use fork::fib_serial;

pub mod prelude {
    pub use crate::{
        config::{AdmissionPolicy, CeilingMode, Config},
        driver::{execute, Execution, Scheduler},
        error::{ExecuteError, TaskCreationError},
        governor::Governor,
        thread_pool::ThreadPool,
    };
}
